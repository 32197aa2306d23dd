//! Exact cosine-similarity index.
//!
//! [`FlatIndex`] keeps every row L2-normalized, so a plain inner product
//! against a normalized query is the cosine similarity. Search is a full scan;
//! there is no approximate structure. [`store`] persists an index together with
//! the skill manifest whose positions name its rows.

pub mod store;

use ndarray::{Array2, ArrayView1};

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Normalize every row of `matrix` in place. Zero rows are left as they are.
pub fn normalize_rows(matrix: &mut Array2<f32>) {
    for mut row in matrix.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|x| x / norm);
        }
    }
}

/// Flat inner-product index over unit-length rows.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    rows: Array2<f32>,
}

impl FlatIndex {
    /// Normalize `matrix` and index it. `None` when there is nothing to index.
    pub fn build(mut matrix: Array2<f32>) -> Option<Self> {
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return None;
        }
        normalize_rows(&mut matrix);
        tracing::info!(rows = matrix.nrows(), dimension = matrix.ncols(), "built flat index");
        Some(Self { rows: matrix })
    }

    /// Wrap rows that are already normalized (e.g. read back from disk).
    pub(crate) fn from_normalized(rows: Array2<f32>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.nrows() == 0
    }

    pub fn dimension(&self) -> usize {
        self.rows.ncols()
    }

    pub fn rows(&self) -> &Array2<f32> {
        &self.rows
    }

    /// Top `min(k, len)` rows by inner product with `query`, best first.
    ///
    /// `query` is expected to be normalized already. Equal scores keep row
    /// order. A query of the wrong dimension matches nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dimension() || k == 0 {
            return Vec::new();
        }
        let scores = self.rows.dot(&ArrayView1::from(query));
        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        // stable: ties stay in row order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k.min(self.len()));
        ranked
    }
}
