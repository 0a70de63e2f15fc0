//! Dense containers shared by the controller and its collaborators
//!
//! - [`SquareMatrix`]: row-major node × node matrix (coupling weights, tract lengths)
//! - [`NodeSeries`]: node-major node × sample matrix (trajectories, history)

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

// ============================================================================
// Square matrix
// ============================================================================

/// Dense square matrix stored row-major.
///
/// Serializes as a list of rows so configuration files stay readable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct SquareMatrix {
    size: usize,
    data: Vec<f64>,
}

impl SquareMatrix {
    /// Create an all-zero matrix
    #[must_use]
    pub fn zeros(size: usize) -> Self {
        Self::filled(size, 0.0)
    }

    /// Create a matrix with every entry set to `value`
    #[must_use]
    pub fn filled(size: usize, value: f64) -> Self {
        Self {
            size,
            data: vec![value; size * size],
        }
    }

    /// Build from nested rows, rejecting ragged or non-square input
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when a row length differs from the row count.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> SimResult<Self> {
        let size = rows.len();
        let mut data = Vec::with_capacity(size * size);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != size {
                return Err(SimError::invalid(
                    "matrix",
                    format!("row {i} has {} entries, expected {size}", row.len()),
                ));
            }
            data.extend(row);
        }
        Ok(Self { size, data })
    }

    /// Number of rows (and columns)
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Entry at row `i`, column `j`
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.size + j]
    }

    /// Overwrite the entry at row `i`, column `j`
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.size + j] = value;
    }

    /// Row `i` as a slice
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.size..(i + 1) * self.size]
    }

    /// All entries in row-major order
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.data.iter()
    }

    /// Exact symmetry check
    pub fn is_symmetric(&self) -> bool {
        (0..self.size).all(|i| (i + 1..self.size).all(|j| self.get(i, j) == self.get(j, i)))
    }

    /// Copy out as nested rows
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.size.max(1)).map(<[f64]>::to_vec).collect()
    }
}

impl TryFrom<Vec<Vec<f64>>> for SquareMatrix {
    type Error = SimError;

    fn try_from(rows: Vec<Vec<f64>>) -> SimResult<Self> {
        Self::from_rows(rows)
    }
}

impl From<SquareMatrix> for Vec<Vec<f64>> {
    fn from(matrix: SquareMatrix) -> Self {
        matrix.to_rows()
    }
}

// ============================================================================
// Node series
// ============================================================================

/// Per-node time series with one row per network node.
///
/// All rows always have the same length.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NodeSeries {
    rows: Vec<Vec<f64>>,
}

impl NodeSeries {
    /// Series with `nodes` rows and no samples
    #[must_use]
    pub fn empty(nodes: usize) -> Self {
        Self {
            rows: vec![Vec::new(); nodes],
        }
    }

    /// Series with `nodes` rows of `samples` zeros
    #[must_use]
    pub fn zeros(nodes: usize, samples: usize) -> Self {
        Self {
            rows: vec![vec![0.0; samples]; nodes],
        }
    }

    /// Series where node `n` holds `values[n]` at each of `samples` positions
    #[must_use]
    pub fn constant(values: &[f64], samples: usize) -> Self {
        Self {
            rows: values.iter().map(|&v| vec![v; samples]).collect(),
        }
    }

    /// Build from rows, rejecting ragged input
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when the rows differ in length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> SimResult<Self> {
        if let Some(first) = rows.first() {
            let len = first.len();
            if let Some((node, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != len) {
                return Err(SimError::invalid(
                    "series",
                    format!("node {node} has {} samples, expected {len}", row.len()),
                ));
            }
        }
        Ok(Self { rows })
    }

    /// Number of nodes
    #[inline]
    pub fn nodes(&self) -> usize {
        self.rows.len()
    }

    /// Number of samples per node
    #[inline]
    pub fn samples(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// `true` when no samples are stored
    pub fn is_empty(&self) -> bool {
        self.samples() == 0
    }

    /// Samples of one node
    pub fn row(&self, node: usize) -> &[f64] {
        &self.rows[node]
    }

    /// Mutable samples of one node
    pub fn row_mut(&mut self, node: usize) -> &mut [f64] {
        &mut self.rows[node]
    }

    /// All rows
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Sample `t` of node `node`
    #[inline]
    pub fn get(&self, node: usize, t: usize) -> f64 {
        self.rows[node][t]
    }

    /// Overwrite sample `t` of node `node`
    #[inline]
    pub fn set(&mut self, node: usize, t: usize, value: f64) {
        self.rows[node][t] = value;
    }

    /// Copy of the sample range `range` for every node
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            rows: self.rows.iter().map(|r| r[range.clone()].to_vec()).collect(),
        }
    }

    /// Copy of the last `width` samples for every node
    pub fn tail(&self, width: usize) -> Self {
        let len = self.samples();
        self.slice(len.saturating_sub(width)..len)
    }

    /// Append `other` sample-wise; both series must have the same node count
    pub fn append(&mut self, other: &NodeSeries) {
        debug_assert_eq!(self.nodes(), other.nodes(), "node count mismatch");
        for (dst, src) in self.rows.iter_mut().zip(&other.rows) {
            dst.extend_from_slice(src);
        }
    }

    /// Append one sample per node (`values[node]`)
    pub fn push_sample(&mut self, values: &[f64]) {
        debug_assert_eq!(self.nodes(), values.len(), "node count mismatch");
        for (row, &v) in self.rows.iter_mut().zip(values) {
            row.push(v);
        }
    }

    /// Discard the first `count` samples of every node in place
    pub fn drop_front(&mut self, count: usize) {
        for row in &mut self.rows {
            let count = count.min(row.len());
            row.drain(..count);
        }
    }

    /// Drop all samples, keeping the node count
    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.clear();
        }
    }

    /// Location `(node, sample)` of the first NaN or infinite value
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        self.rows.iter().enumerate().find_map(|(node, row)| {
            row.iter().position(|v| !v.is_finite()).map(|t| (node, t))
        })
    }

    /// Largest absolute value, 0 for an empty series
    pub fn max_abs(&self) -> f64 {
        self.rows
            .iter()
            .flatten()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}
