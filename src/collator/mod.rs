//! Post-hoc aggregation of per-spot taxon-hit rows: merging rows that
//! belong to the same spot (collation) and counting distinct taxon-set
//! fingerprints (compact mode).
//!
//! Grounded on `original_source/tools/tax/src/tax_collator.hpp`'s
//! `Tax_hits<Options>`: a succinct spot-name vector plus two parallel
//! `U32_rsc_matrix` columns (tax_ids, counts), with `sort`+`merge`
//! implementing collation and `group`/`group_columns_bulk` implementing the
//! compact histogram. `rayon` (already the teacher's parallel-iteration
//! crate, see `db.rs::process_k2file`'s `par_iter()`) stands in for the
//! original's `taskflow` task graph.

mod matrix;
mod names;

use crate::error::{ClassifierError, Result};
use matrix::U32RscMatrix;
use names::NameStore;
use rayon::prelude::*;
use std::io::{self, BufRead, Write};

/// One input/output row: a spot id and its tax_id -> count multiset,
/// `tax_ids` held strictly ascending-unique (spec.md §4.6 invariant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotRow {
    pub name: String,
    pub tax_ids: Vec<u32>,
    pub counts: Vec<u32>,
}

impl SpotRow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tax_ids: Vec::new(),
            counts: Vec::new(),
        }
    }

    /// Sorts by tax_id and sums counts of any duplicates, restoring the
    /// "strictly ascending" invariant. Mirrors `Spot::normalize`.
    pub fn normalize(&mut self) {
        if self.tax_ids.is_empty() {
            return;
        }
        let mut idx: Vec<usize> = (0..self.tax_ids.len()).collect();
        idx.sort_by_key(|&i| self.tax_ids[i]);

        let mut new_tax_ids = Vec::with_capacity(self.tax_ids.len());
        let mut new_counts = Vec::with_capacity(self.counts.len());
        for i in idx {
            let (tax_id, count) = (self.tax_ids[i], self.counts[i]);
            if new_tax_ids.last() == Some(&tax_id) {
                *new_counts.last_mut().unwrap() += count;
            } else {
                new_tax_ids.push(tax_id);
                new_counts.push(count);
            }
        }
        self.tax_ids = new_tax_ids;
        self.counts = new_counts;
    }

    /// Appends `other`'s tax_ids/counts and re-normalizes. Mirrors
    /// `Spot::merge` (`add_taxa` followed by `normalize`).
    pub fn merge_from(&mut self, other: &SpotRow) {
        self.tax_ids.extend_from_slice(&other.tax_ids);
        self.counts.extend_from_slice(&other.counts);
        self.normalize();
    }
}

/// Parses one `spot_id \t tax1[xN1] \t tax2[xN2] ...` line. Returns `None`
/// only when the line has no spot id at all; a malformed individual tax
/// field is logged and dropped, matching `Spot::init`'s per-field try/catch.
pub fn parse_spot_line(line: &str) -> Option<SpotRow> {
    let mut fields = line.split('\t');
    let name = fields.next()?;
    if name.is_empty() {
        return None;
    }
    let mut row = SpotRow::new(name);
    for field in fields {
        if field.is_empty() {
            continue;
        }
        let parsed = match field.split_once('x') {
            Some((t, n)) => t.parse::<u32>().ok().zip(n.parse::<u32>().ok()),
            None => field.parse::<u32>().ok().map(|t| (t, 1)),
        };
        match parsed {
            Some((tax_id, count)) => {
                row.tax_ids.push(tax_id);
                row.counts.push(count);
            }
            None => log::warn!("skipping malformed tax field {field:?} in line {line:?}"),
        }
    }
    row.normalize();
    Some(row)
}

/// Succinct columnar store of per-spot taxon vectors (spec.md §4.6).
#[derive(Default)]
pub struct TaxCollator {
    names: NameStore,
    tax_ids: U32RscMatrix,
    counts: U32RscMatrix,
}

impl TaxCollator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Appends one row, growing matrix width as needed, left-packing
    /// tax_ids and padding the remainder of the row with null. Counts equal
    /// to 1 are encoded as null (spec.md §4.6 invariant).
    pub fn add_row(&mut self, spot: &SpotRow) {
        if spot.name.is_empty() {
            return;
        }
        self.names.push(spot.name.clone());

        let width = spot.tax_ids.len();
        if self.tax_ids.num_cols() < width {
            let grow = width - self.tax_ids.num_cols();
            self.tax_ids.add_columns(grow);
            self.counts.add_columns(grow);
        }

        for i in 0..width {
            self.tax_ids.add_value(spot.tax_ids[i]);
            if spot.counts[i] > 1 {
                self.counts.add_value(spot.counts[i]);
            } else {
                self.counts.add_null();
            }
        }
        self.tax_ids.end_row();
        self.counts.end_row();
    }

    fn get_spot(&self, row: u32) -> SpotRow {
        let tax_ids = self.tax_ids.row_values(row);
        let counts = (0..tax_ids.len() as usize)
            .map(|col| self.counts.get(row, col).unwrap_or(1))
            .collect();
        SpotRow {
            name: self.names.get(row).to_string(),
            tax_ids,
            counts,
        }
    }

    /// Row indices sorted by spot-name lexicographic order. Mirrors
    /// `Tax_hits::sort`.
    pub fn sort_index(&self) -> Vec<u32> {
        self.names.sort_index()
    }

    /// Walks `index`, merging consecutive equal-named rows' tax/count
    /// multisets, and writes the result into a fresh collator. Mirrors
    /// `Tax_hits::merge`.
    pub fn merge(&self, index: &[u32]) -> TaxCollator {
        let mut out = TaxCollator::new();
        let mut i = 0;
        while i < index.len() {
            let mut spot = self.get_spot(index[i]);
            let mut j = i + 1;
            while j < index.len() && self.names.get(index[j]) == spot.name {
                let next = self.get_spot(index[j]);
                spot.merge_from(&next);
                j += 1;
            }
            out.add_row(&spot);
            i = j;
        }
        out
    }

    /// Sort then merge: the full collation pass (`Tax_hits::collate`).
    pub fn collate(&self) -> TaxCollator {
        let index = self.sort_index();
        self.merge(&index)
    }

    /// For each cardinality `c = 1..=W`, groups rows of exact width `c` by
    /// their (sorted-ascending, already-normalized) tax_id tuple and counts
    /// runs of identical tuples. Mirrors `Tax_hits::group` /
    /// `group_columns_bulk`, parallelized per cardinality with `rayon`
    /// since each cardinality's row-set is independent.
    pub fn compact_groups(&self) -> Vec<(u64, Vec<u32>)> {
        let num_cols = self.tax_ids.num_cols();
        let per_cardinality: Vec<Vec<(u64, Vec<u32>)>> = (0..num_cols)
            .into_par_iter()
            .map(|col_index| {
                let mut rows = self.tax_ids.rows_of_exact_cardinality(col_index);
                if rows.is_empty() {
                    return Vec::new();
                }
                rows.sort_by_key(|&r| self.tax_ids.row_values(r));

                let mut out = Vec::new();
                let mut iter = rows.into_iter();
                let mut prev = self.tax_ids.row_values(iter.next().expect("non-empty"));
                let mut count = 1u64;
                for r in iter {
                    let cur = self.tax_ids.row_values(r);
                    if cur == prev {
                        count += 1;
                    } else {
                        out.push((count, std::mem::replace(&mut prev, cur)));
                        count = 1;
                    }
                }
                out.push((count, prev));
                out
            })
            .collect();
        per_cardinality.into_iter().flatten().collect()
    }

    /// Writes one collated row per line: `spot_id \t tax1[xN1] \t ...`.
    pub fn write_rows<W: Write>(&self, mut out: W, hide_counts: bool) -> io::Result<()> {
        for row in 0..self.names.len() as u32 {
            let spot = self.get_spot(row);
            write!(out, "{}", spot.name)?;
            for (tax_id, count) in spot.tax_ids.iter().zip(&spot.counts) {
                if hide_counts || *count <= 1 {
                    write!(out, "\t{tax_id}")?;
                } else {
                    write!(out, "\t{tax_id}x{count}")?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Writes the compact histogram: `count \t t1 \t t2 ... \t tc` per line.
    pub fn write_compact<W: Write>(&self, mut out: W) -> io::Result<()> {
        for (count, tax_ids) in self.compact_groups() {
            write!(out, "{count}")?;
            for tax_id in tax_ids {
                write!(out, "\t{tax_id}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Reads `spot_id \t tax...` lines from `input`, collates them (merging
/// repeated spot ids) and writes either the merged rows or the compact
/// histogram to `out`, depending on `compact`.
pub fn run<R: BufRead, W: Write>(input: R, out: W, hide_counts: bool, compact: bool) -> Result<()> {
    let mut collator = TaxCollator::new();
    for line in input.lines() {
        let line = line.map_err(ClassifierError::Io)?;
        if line.is_empty() {
            continue;
        }
        match parse_spot_line(&line) {
            Some(spot) => collator.add_row(&spot),
            None => log::warn!("skipping malformed tax-collator line: {line:?}"),
        }
    }

    let collated = collator.collate();
    if compact {
        collated.write_compact(out).map_err(ClassifierError::Io)
    } else {
        collated.write_rows(out, hide_counts).map_err(ClassifierError::Io)
    }
}
