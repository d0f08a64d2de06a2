//! Triplet accumulator for the per-iteration Newton system `Y·x = J`.
//!
//! Stamps are appended, never overwritten: duplicate `(row, col)` pairs are
//! summed when the triplets are materialized. The linear baseline is kept by
//! recording [`MatrixBuilder::get_usage`] after invariant elements stamp
//! and truncating back to it with [`MatrixBuilder::clear`] at the end of
//! every iteration.

use std::collections::BTreeMap;

use nrpf_core::{Diagnostics, NrpfError, NrpfResult};
use sprs::{CsMat, TriMat};
use thiserror::Error;

/// Problems found in the accumulated stamps
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StampError {
    #[error("stamp ({row}, {col}) outside a {size}x{size} system")]
    OutOfRange { row: usize, col: usize, size: usize },

    #[error("non-finite stamp {value} at ({row}, {col})")]
    NonFinite { row: usize, col: usize, value: f64 },

    #[error("row {0} has no entries")]
    EmptyRow(usize),

    #[error("row {0} has only zero entries")]
    ZeroRow(usize),
}

impl From<StampError> for NrpfError {
    fn from(err: StampError) -> Self {
        NrpfError::Structural(err.to_string())
    }
}

/// Sparse `(row, col, value)` accumulator with checkpoint/reset.
#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    size: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl MatrixBuilder {
    /// Create an empty builder for a `size x size` system.
    pub fn new(size: usize) -> Self {
        // A handful of entries per unknown covers most networks.
        Self::with_capacity(size, size * 8)
    }

    pub fn with_capacity(size: usize, capacity: usize) -> Self {
        Self {
            size,
            rows: Vec::with_capacity(capacity),
            cols: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Accumulate `value` at `(row, col)`.
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
    }

    /// Checkpoint: number of triplets stamped so far.
    pub fn get_usage(&self) -> usize {
        self.values.len()
    }

    /// Discard every triplet added after the `retain_idx` checkpoint.
    pub fn clear(&mut self, retain_idx: usize) {
        self.rows.truncate(retain_idx);
        self.cols.truncate(retain_idx);
        self.values.truncate(retain_idx);
    }

    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.values)
            .map(|((&r, &c), &v)| (r, c, v))
    }

    /// Materialize into CSR, summing duplicate entries.
    pub fn to_matrix(&self) -> NrpfResult<CsMat<f64>> {
        if let Some((row, col, _)) = self
            .triplets()
            .find(|&(r, c, _)| r >= self.size || c >= self.size)
        {
            return Err(StampError::OutOfRange {
                row,
                col,
                size: self.size,
            }
            .into());
        }
        let tri = TriMat::from_triplets(
            (self.size, self.size),
            self.rows.clone(),
            self.cols.clone(),
            self.values.clone(),
        );
        Ok(tri.to_csr())
    }

    /// Collect every structural problem without stopping at the first.
    ///
    /// With `check_zeros`, a row whose summed entries are all exactly zero
    /// counts as empty.
    pub fn validate(&self, check_zeros: bool) -> Diagnostics {
        let mut diag = Diagnostics::new();
        let mut has_entry = vec![false; self.size];
        let mut summed: BTreeMap<(usize, usize), f64> = BTreeMap::new();

        for (row, col, value) in self.triplets() {
            if row >= self.size || col >= self.size {
                let err = StampError::OutOfRange {
                    row,
                    col,
                    size: self.size,
                };
                diag.add_error("stamp", &err.to_string());
                continue;
            }
            if !value.is_finite() {
                let err = StampError::NonFinite { row, col, value };
                diag.add_error_with_entity("stamp", &err.to_string(), &format!("row {}", row));
            }
            has_entry[row] = true;
            *summed.entry((row, col)).or_insert(0.0) += value;
        }

        let mut has_nonzero = vec![false; self.size];
        for (&(row, _), &value) in &summed {
            if value != 0.0 {
                has_nonzero[row] = true;
            }
        }

        for row in 0..self.size {
            let err = if !has_entry[row] {
                StampError::EmptyRow(row)
            } else if check_zeros && !has_nonzero[row] {
                StampError::ZeroRow(row)
            } else {
                continue;
            };
            diag.add_error_with_entity("structure", &err.to_string(), &format!("row {}", row));
        }

        diag
    }

    /// Fail before the solve if the system is obviously singular or malformed.
    pub fn assert_valid(&self, check_zeros: bool) -> NrpfResult<()> {
        let diag = self.validate(check_zeros);
        if diag.has_errors() {
            let first: Vec<String> = diag.errors().take(5).map(|i| i.to_string()).collect();
            return Err(NrpfError::Structural(format!(
                "{}: {}",
                diag.summary(),
                first.join("; ")
            )));
        }
        Ok(())
    }
}
