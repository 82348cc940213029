//! Dense input matrix container.
//!
//! The matrix is immutable during clustering and fully replicated: every
//! worker rank reads the whole array, only the label work is partitioned.

use std::fs::File;
use std::ops::Index;
use std::path::Path;

use ndarray::Array2;
use ndarray_npy::ReadNpyExt;

use crate::config::ConfigError;

/// Row-major dense matrix of `f32` values.
#[derive(Debug, Clone)]
pub struct Matrix {
    /// Underlying array, row-major.
    pub data: Array2<f32>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl Matrix {
    /// Wrap an existing array.
    pub fn new(data: Array2<f32>) -> Matrix {
        let rows = data.nrows();
        let cols = data.ncols();
        Matrix { data, rows, cols }
    }

    /// Read a 2-D `f32` `.npy` file.
    pub fn from_npy<P: AsRef<Path>>(path: P) -> Result<Matrix, ConfigError> {
        let reader = File::open(path.as_ref())?;
        let data = Array2::<f32>::read_npy(reader)?;
        Ok(Matrix::new(data))
    }

    /// Bounds-checked element access.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.rows || col >= self.cols {
            None
        } else {
            Some(self.data[(row, col)])
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f32;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.data[index]
    }
}
