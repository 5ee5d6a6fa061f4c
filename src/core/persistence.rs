//! Dual-format persistence for the classifier state.
//!
//! Both codecs serialize the same canonical [`ClassifierState`] transfer struct, so the
//! two formats cannot drift apart silently:
//!
//! - The *stream* format is ordered, whitespace-delimited, self-describing text:
//!   a start marker, a version integer, the scalar fields, the iteration bookkeeping
//!   (version 1 and later), the step list, the count-prefixed pattern history, the
//!   weight matrices in row-major order, the interleaved bucket value/seen pairs, and
//!   an end marker. Version 0 streams predate explicit iteration tracking; their
//!   iteration history is reconstructed from each pattern's position on load.
//! - The *schema* format encodes the same fields structurally with `serde`/`bincode`,
//!   weight matrices flattened to one row-major list per step. It is written and read
//!   at the current version only.
//!
//! Floats are written with Rust's shortest round-trip `Display` form, so weight cells
//! survive a text round trip bit-exactly. Booleans are written as `1`/`0`.
//!
//! Both codecs fail loudly on structural mismatches; nothing is silently truncated or
//! ignored.

use super::sdr_classifier::VERSION;
use anyhow::{anyhow, bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::str::FromStr;

const START_MARKER: &str = "SDRClassifier";
const END_MARKER: &str = "~SDRClassifier";

/// Canonical state-transfer snapshot serialized by both codecs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ClassifierState {
    pub version: u32,
    pub alpha: f64,
    pub act_value_alpha: f64,
    pub learn_iteration: u32,
    pub record_num_minus_learn_iteration: u32,
    pub record_num_minus_learn_iteration_set: bool,
    pub max_steps: u32,
    pub max_input_idx: usize,
    pub max_bucket_idx: usize,
    pub verbosity: u32,
    pub steps: Vec<u32>,
    /// Learning iterations of the retained patterns, newest first.
    pub iteration_history: Vec<u32>,
    /// Retained patterns, newest first, parallel to `iteration_history`.
    pub pattern_history: Vec<Vec<usize>>,
    /// One flattened matrix per step, aligned with `steps`.
    pub weights: Vec<StepWeights>,
    pub actual_values: Vec<f64>,
    pub actual_values_set: Vec<bool>,
}

/// One step's weight matrix, flattened row-major to
/// `(max_input_idx + 1) * (max_bucket_idx + 1)` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StepWeights {
    pub step: u32,
    pub cells: Vec<f64>,
}

/// Checks the structural invariants a snapshot must satisfy before it may be restored.
pub(crate) fn validate(state: &ClassifierState) -> Result<()> {
    ensure!(!state.steps.is_empty(), "state has no prediction steps");
    ensure!(
        state.steps.windows(2).all(|pair| pair[0] < pair[1]),
        "steps are not strictly ascending: {:?}",
        state.steps
    );
    ensure!(
        state.max_steps == state.steps.last().unwrap() + 1,
        "max_steps {} inconsistent with steps {:?}",
        state.max_steps,
        state.steps
    );
    ensure!(
        state.iteration_history.len() == state.pattern_history.len(),
        "iteration history ({}) and pattern history ({}) lengths differ",
        state.iteration_history.len(),
        state.pattern_history.len()
    );
    ensure!(
        state.pattern_history.len() <= state.max_steps as usize,
        "pattern history of {} entries exceeds max_steps {}",
        state.pattern_history.len(),
        state.max_steps
    );
    ensure!(
        state.weights.len() == state.steps.len(),
        "expected {} weight matrices, found {}",
        state.steps.len(),
        state.weights.len()
    );

    let cells = (state.max_input_idx + 1) * (state.max_bucket_idx + 1);
    for (weights, &step) in state.weights.iter().zip(&state.steps) {
        ensure!(
            weights.step == step,
            "weight matrix for step {} out of order (expected step {})",
            weights.step,
            step
        );
        ensure!(
            weights.cells.len() == cells,
            "weight matrix for step {} holds {} cells, expected {}",
            step,
            weights.cells.len(),
            cells
        );
    }

    ensure!(
        state.actual_values.len() == state.actual_values_set.len(),
        "actual value ({}) and seen flag ({}) lengths differ",
        state.actual_values.len(),
        state.actual_values_set.len()
    );
    ensure!(
        state.actual_values.len() > state.max_bucket_idx,
        "only {} actual values for max bucket index {}",
        state.actual_values.len(),
        state.max_bucket_idx
    );

    Ok(())
}

/// Writes the versioned text stream form of `state`.
pub(crate) fn write_stream<W: Write>(state: &ClassifierState, out: &mut W) -> Result<()> {
    writeln!(out, "{START_MARKER}")?;
    writeln!(out, "{}", state.version)?;

    writeln!(
        out,
        "{} {} {} {} {} {} {} {}",
        state.version,
        state.alpha,
        state.act_value_alpha,
        state.learn_iteration,
        state.max_steps,
        state.max_bucket_idx,
        state.max_input_idx,
        state.verbosity,
    )?;

    write!(
        out,
        "{} {} {}",
        state.record_num_minus_learn_iteration,
        state.record_num_minus_learn_iteration_set as u8,
        state.iteration_history.len(),
    )?;
    for iteration in &state.iteration_history {
        write!(out, " {iteration}")?;
    }
    writeln!(out)?;

    write!(out, "{}", state.steps.len())?;
    for step in &state.steps {
        write!(out, " {step}")?;
    }
    writeln!(out)?;

    write!(out, "{}", state.pattern_history.len())?;
    for pattern in &state.pattern_history {
        write!(out, " {}", pattern.len())?;
        for bit in pattern {
            write!(out, " {bit}")?;
        }
    }
    writeln!(out)?;

    write!(out, "{}", state.weights.len())?;
    for weights in &state.weights {
        write!(out, " {}", weights.step)?;
        for cell in &weights.cells {
            write!(out, " {cell}")?;
        }
    }
    writeln!(out)?;

    write!(out, "{}", state.actual_values.len())?;
    for (value, seen) in state.actual_values.iter().zip(&state.actual_values_set) {
        write!(out, " {} {}", value, *seen as u8)?;
    }
    writeln!(out)?;

    writeln!(out, "{END_MARKER}")?;
    Ok(())
}

/// Parses the versioned text stream form back into a snapshot.
///
/// Accepts versions 0 and 1. For version 0, the iteration history is inferred from
/// each pattern's position: entry `i` of `n` gets iteration `learn_iteration - (n - i)`
/// in the source's wrapping unsigned arithmetic.
pub(crate) fn read_stream<R: Read>(input: &mut R) -> Result<ClassifierState> {
    let mut reader = TokenReader::new(input);

    let marker = reader.next_token()?;
    ensure!(
        marker == START_MARKER,
        "bad start marker `{marker}`, expected `{START_MARKER}`"
    );

    let version: u32 = reader.parse()?;
    ensure!(
        version <= VERSION,
        "unsupported stream version {version} (current is {VERSION})"
    );

    // The version integer is repeated as the first scalar field.
    let _stored_version: u32 = reader.parse()?;
    let alpha: f64 = reader.parse()?;
    let act_value_alpha: f64 = reader.parse()?;
    let learn_iteration: u32 = reader.parse()?;
    let max_steps: u32 = reader.parse()?;
    let max_bucket_idx: usize = reader.parse()?;
    let max_input_idx: usize = reader.parse()?;
    let verbosity: u32 = reader.parse()?;

    let mut record_num_minus_learn_iteration = 0;
    let mut record_num_minus_learn_iteration_set = false;
    let mut iteration_history = Vec::new();

    if version >= 1 {
        record_num_minus_learn_iteration = reader.parse()?;
        record_num_minus_learn_iteration_set = reader.parse_bool()?;

        let history_len: usize = reader.parse()?;
        iteration_history.reserve(history_len);
        for _ in 0..history_len {
            iteration_history.push(reader.parse()?);
        }
    }

    let step_count: usize = reader.parse()?;
    let mut steps = Vec::with_capacity(step_count);
    for _ in 0..step_count {
        steps.push(reader.parse::<u32>()?);
    }

    let pattern_count: usize = reader.parse()?;
    let mut pattern_history = Vec::with_capacity(pattern_count);
    for i in 0..pattern_count {
        let bit_count: usize = reader.parse()?;
        let mut pattern = Vec::with_capacity(bit_count);
        for _ in 0..bit_count {
            pattern.push(reader.parse::<usize>()?);
        }
        pattern_history.push(pattern);

        if version == 0 {
            iteration_history.push(learn_iteration.wrapping_sub((pattern_count - i) as u32));
        }
    }

    let matrix_count: usize = reader.parse()?;
    let cells_per_matrix = (max_input_idx + 1) * (max_bucket_idx + 1);
    let mut weights = Vec::with_capacity(matrix_count);
    for _ in 0..matrix_count {
        let step: u32 = reader.parse()?;
        let mut cells = Vec::with_capacity(cells_per_matrix);
        for _ in 0..cells_per_matrix {
            cells.push(reader.parse::<f64>()?);
        }
        weights.push(StepWeights { step, cells });
    }

    let bucket_count: usize = reader.parse()?;
    let mut actual_values = Vec::with_capacity(bucket_count);
    let mut actual_values_set = Vec::with_capacity(bucket_count);
    for _ in 0..bucket_count {
        actual_values.push(reader.parse::<f64>()?);
        actual_values_set.push(reader.parse_bool()?);
    }

    let marker = reader.next_token()?;
    ensure!(
        marker == END_MARKER,
        "bad end marker `{marker}`, expected `{END_MARKER}`"
    );

    Ok(ClassifierState {
        version,
        alpha,
        act_value_alpha,
        learn_iteration,
        record_num_minus_learn_iteration,
        record_num_minus_learn_iteration_set,
        max_steps,
        max_input_idx,
        max_bucket_idx,
        verbosity,
        steps,
        iteration_history,
        pattern_history,
        weights,
        actual_values,
        actual_values_set,
    })
}

/// Writes the schema-typed binary form of `state`.
pub(crate) fn write_schema<W: Write>(state: &ClassifierState, out: &mut W) -> Result<()> {
    bincode::serialize_into(&mut *out, state).context("failed to encode classifier schema")
}

/// Parses the schema-typed binary form back into a snapshot.
pub(crate) fn read_schema<R: Read>(input: &mut R) -> Result<ClassifierState> {
    bincode::deserialize_from(&mut *input).context("failed to decode classifier schema")
}

/// Whitespace-delimited token reader over any byte stream.
///
/// Reads one byte at a time and never looks past the last token it returns, so the
/// underlying reader is left positioned right after the end marker. Callers with
/// unbuffered sources should wrap them in a `BufReader`.
struct TokenReader<'a, R: Read> {
    input: &'a mut R,
}

impl<'a, R: Read> TokenReader<'a, R> {
    fn new(input: &'a mut R) -> Self {
        Self { input }
    }

    fn next_token(&mut self) -> Result<String> {
        let mut token = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            if self.input.read(&mut byte)? == 0 {
                if token.is_empty() {
                    bail!("unexpected end of stream");
                }
                break;
            }

            if byte[0].is_ascii_whitespace() {
                if token.is_empty() {
                    continue;
                }
                break;
            }

            token.push(byte[0]);
        }

        String::from_utf8(token).context("stream token is not valid UTF-8")
    }

    fn parse<T: FromStr>(&mut self) -> Result<T> {
        let token = self.next_token()?;
        token
            .parse()
            .map_err(|_| anyhow!("cannot parse token `{token}`"))
    }

    fn parse_bool(&mut self) -> Result<bool> {
        Ok(self.parse::<u8>()? != 0)
    }
}
