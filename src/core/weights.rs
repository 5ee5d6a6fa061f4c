//! The `WeightStore` holds one dense weight matrix per configured prediction step.
//!
//! Each matrix associates input bits (rows) with output buckets (columns) and is stored
//! row-major in a single contiguous buffer, so the weights of one input bit across all
//! buckets form one contiguous slice. Projecting a sparse pattern through the matrix is
//! then just summing a handful of row slices, without materializing a dense product.
//!
//! Matrices are addressed by the step's position in the classifier's sorted step list,
//! resolved once at construction. All matrices always share the same dimensions: growing
//! capacity for one step grows every step, which keeps the cross-step shape invariant
//! trivially true at the cost of memory for rarely-hit steps.
//!
//! Growth is monotonic. A grow-and-copy pass allocates the enlarged buffer, copies every
//! existing row into place, and leaves new cells at zero. Previously written cells are
//! never altered.

/// Per-step weight matrices with uniform, monotonically growing dimensions.
#[derive(Debug, Clone)]
pub struct WeightStore {
    /// One flat row-major matrix per step position; all share `num_inputs * num_buckets` cells.
    matrices: Vec<Vec<f64>>,

    /// Number of rows, i.e. `max_input_idx + 1`.
    num_inputs: usize,

    /// Number of columns, i.e. `max_bucket_idx + 1`.
    num_buckets: usize,
}

impl WeightStore {
    /// Creates a store with one 1x1 zeroed matrix per step.
    #[inline]
    pub fn new(num_steps: usize) -> Self {
        Self {
            matrices: vec![vec![0.0]; num_steps],
            num_inputs: 1,
            num_buckets: 1,
        }
    }

    /// The number of input rows every matrix currently holds.
    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// The number of bucket columns every matrix currently holds.
    #[inline]
    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// Grows every matrix so it covers `max_input_idx` rows and `max_bucket_idx` columns,
    /// preserving existing cells and zero-filling new ones. A no-op if the requested
    /// bounds do not exceed the current ones.
    pub fn ensure_capacity(&mut self, max_input_idx: usize, max_bucket_idx: usize) {
        let num_inputs = (max_input_idx + 1).max(self.num_inputs);
        let num_buckets = (max_bucket_idx + 1).max(self.num_buckets);

        if num_inputs == self.num_inputs && num_buckets == self.num_buckets {
            return;
        }

        for matrix in &mut self.matrices {
            let mut grown = vec![0.0; num_inputs * num_buckets];

            for row in 0..self.num_inputs {
                let src = &matrix[row * self.num_buckets..(row + 1) * self.num_buckets];
                grown[row * num_buckets..row * num_buckets + self.num_buckets]
                    .copy_from_slice(src);
            }

            *matrix = grown;
        }

        self.num_inputs = num_inputs;
        self.num_buckets = num_buckets;
    }

    /// The weights of one input bit across all buckets, for the step at `pos`.
    #[inline]
    pub fn row(&self, pos: usize, input_bit: usize) -> &[f64] {
        &self.matrices[pos][input_bit * self.num_buckets..(input_bit + 1) * self.num_buckets]
    }

    /// Mutable variant of [`row`](Self::row).
    #[inline]
    pub fn row_mut(&mut self, pos: usize, input_bit: usize) -> &mut [f64] {
        &mut self.matrices[pos][input_bit * self.num_buckets..(input_bit + 1) * self.num_buckets]
    }

    /// Adds `delta` to a single cell of the step at `pos`.
    #[inline]
    pub fn accumulate(&mut self, pos: usize, input_bit: usize, bucket: usize, delta: f64) {
        self.matrices[pos][input_bit * self.num_buckets + bucket] += delta;
    }

    /// All cells of the step at `pos` in row-major order, as persisted.
    #[inline]
    pub fn cells(&self, pos: usize) -> &[f64] {
        &self.matrices[pos]
    }

    /// Rebuilds a store from flattened row-major matrices, one per step position.
    /// Every matrix must hold exactly `(max_input_idx + 1) * (max_bucket_idx + 1)` cells.
    pub fn from_flat(
        matrices: Vec<Vec<f64>>,
        max_input_idx: usize,
        max_bucket_idx: usize,
    ) -> Self {
        let num_inputs = max_input_idx + 1;
        let num_buckets = max_bucket_idx + 1;

        debug_assert!(matrices.iter().all(|m| m.len() == num_inputs * num_buckets));

        Self {
            matrices,
            num_inputs,
            num_buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_unit_matrices() {
        let store = WeightStore::new(3);
        assert_eq!(store.num_inputs(), 1);
        assert_eq!(store.num_buckets(), 1);
        for pos in 0..3 {
            assert_eq!(store.cells(pos), &[0.0]);
        }
    }

    #[test]
    fn growth_preserves_existing_cells() {
        let mut store = WeightStore::new(2);
        store.ensure_capacity(2, 1);
        store.accumulate(0, 2, 1, 0.5);
        store.accumulate(1, 0, 0, -1.25);

        store.ensure_capacity(4, 3);

        assert_eq!(store.num_inputs(), 5);
        assert_eq!(store.num_buckets(), 4);
        assert_eq!(store.row(0, 2), &[0.0, 0.5, 0.0, 0.0]);
        assert_eq!(store.row(1, 0), &[-1.25, 0.0, 0.0, 0.0]);

        // Every cell not written above is still zero.
        let touched: f64 = store.cells(0).iter().chain(store.cells(1)).sum();
        assert_eq!(touched, -0.75);
    }

    #[test]
    fn growth_is_monotonic() {
        let mut store = WeightStore::new(1);
        store.ensure_capacity(9, 4);
        store.ensure_capacity(3, 2);
        assert_eq!(store.num_inputs(), 10);
        assert_eq!(store.num_buckets(), 5);
    }

    #[test]
    fn row_views_cover_all_buckets() {
        let mut store = WeightStore::new(1);
        store.ensure_capacity(1, 2);
        store.row_mut(0, 1).copy_from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(store.row(0, 1), &[1.0, 2.0, 3.0]);
        assert_eq!(store.row(0, 0), &[0.0, 0.0, 0.0]);
    }
}
