//! `U32RscMatrix` — a columnar store of `u32` values with an explicit
//! per-column NULL bitmap, used for both the tax_id matrix and the counts
//! matrix of a [`super::TaxCollator`].
//!
//! Grounded on `original_source/tools/tax/src/tax_collator.hpp`'s
//! `U32_rsc_matrix`: a list of `rsc_sparse_vector<uint32_t>` columns, each
//! with BitMagic's own null bitvector tracking which rows are populated.
//! This realizes the same contract — left-packed per-row columns, NULL
//! meaning "not yet populated" — with a `roaring::RoaringBitmap` standing in
//! for BitMagic's rank-select bitvector (the pack's `MUSK` tool is the other
//! corpus user of `roaring` for exactly this "is this id present" role).

use roaring::RoaringBitmap;

#[derive(Default)]
struct Column {
    values: Vec<u32>,
    present: RoaringBitmap,
}

impl Column {
    fn with_capacity(num_rows: u32) -> Self {
        Self {
            values: vec![0; num_rows as usize],
            present: RoaringBitmap::new(),
        }
    }

    fn set(&mut self, row: u32, value: u32) {
        if row as usize >= self.values.len() {
            self.values.resize(row as usize + 1, 0);
        }
        self.values[row as usize] = value;
        self.present.insert(row);
    }

    fn get(&self, row: u32) -> Option<u32> {
        if self.present.contains(row) {
            Some(self.values[row as usize])
        } else {
            None
        }
    }
}

/// Matrix of `u32` values, one column per tax-id/count slot, one row per
/// spot. Rows are populated left-to-right (`add_value`/`add_null`) and
/// closed with `end_row`; every row is padded to `num_cols` width.
#[derive(Default)]
pub struct U32RscMatrix {
    columns: Vec<Column>,
    num_rows: u32,
    curr_col: usize,
    /// Telemetry: count of non-null values ever inserted, mirroring the
    /// teacher's `num_values` field.
    pub num_values: u64,
}

impl U32RscMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    /// Grows the matrix by `n` columns, so `add_value`/`add_null` can reach
    /// at least `num_cols() + n` columns for the row under construction.
    pub fn add_columns(&mut self, n: usize) {
        for _ in 0..n {
            self.columns.push(Column::with_capacity(self.num_rows));
        }
    }

    /// Appends `value` at the current column of the row under construction.
    pub fn add_value(&mut self, value: u32) {
        debug_assert!(value > 0, "0 is reserved to mean \"absent\" upstream");
        self.columns[self.curr_col].set(self.num_rows, value);
        self.num_values += 1;
        self.curr_col += 1;
    }

    /// Leaves the current column null (no value this row) and advances.
    pub fn add_null(&mut self) {
        self.curr_col += 1;
    }

    /// Pads any remaining columns with null and closes the row.
    pub fn end_row(&mut self) {
        self.num_rows += 1;
        self.curr_col = 0;
    }

    pub fn get(&self, row: u32, col: usize) -> Option<u32> {
        self.columns.get(col).and_then(|c| c.get(row))
    }

    /// Row `row`'s values from column 0 up to the first null, i.e. its full
    /// left-packed value list.
    pub fn row_values(&self, row: u32) -> Vec<u32> {
        let mut out = Vec::new();
        for col in &self.columns {
            match col.get(row) {
                Some(v) => out.push(v),
                None => break,
            }
        }
        out
    }

    /// Indexes of every row whose cardinality is exactly `col_index + 1`:
    /// present at `col_index`, absent at `col_index + 1` (or `col_index` is
    /// the last column, in which case there is nothing to be absent from).
    ///
    /// Grounded on `U32_rsc_matrix::get_rows`.
    pub fn rows_of_exact_cardinality(&self, col_index: usize) -> Vec<u32> {
        let present = &self.columns[col_index].present;
        match self.columns.get(col_index + 1) {
            Some(next) => (present - &next.present).iter().collect(),
            None => present.iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_packs_values_and_pads_with_null() {
        let mut m = U32RscMatrix::new();
        m.add_columns(3);
        m.add_value(10);
        m.add_value(20);
        m.add_null();
        m.end_row();

        assert_eq!(m.get(0, 0), Some(10));
        assert_eq!(m.get(0, 1), Some(20));
        assert_eq!(m.get(0, 2), None);
        assert_eq!(m.row_values(0), vec![10, 20]);
    }

    #[test]
    fn grows_columns_as_wider_rows_arrive() {
        let mut m = U32RscMatrix::new();
        m.add_columns(1);
        m.add_value(1);
        m.end_row();

        m.add_columns(2); // row 1 needs 3 columns total
        m.add_value(2);
        m.add_value(3);
        m.add_value(4);
        m.end_row();

        assert_eq!(m.row_values(0), vec![1]);
        assert_eq!(m.row_values(1), vec![2, 3, 4]);
    }

    #[test]
    fn rows_of_exact_cardinality_excludes_wider_rows() {
        let mut m = U32RscMatrix::new();
        m.add_columns(2);
        m.add_value(1); // row 0: cardinality 1
        m.add_null();
        m.end_row();
        m.add_value(2); // row 1: cardinality 2
        m.add_value(3);
        m.end_row();

        assert_eq!(m.rows_of_exact_cardinality(0), vec![0]);
        assert_eq!(m.rows_of_exact_cardinality(1), vec![1]);
    }
}
