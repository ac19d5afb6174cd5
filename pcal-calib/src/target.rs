//! Calibration target geometry

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A rigid grid of 3-D points indexed row-major.
pub trait GridTarget {
    fn rows(&self) -> usize;

    fn cols(&self) -> usize;

    /// Total number of grid points
    fn size(&self) -> usize {
        self.rows() * self.cols()
    }

    /// Point in the target frame
    fn point(&self, index: usize) -> Vector3<f64>;

    fn grid_index(&self, row: usize, col: usize) -> usize {
        row * self.cols() + col
    }

    fn grid_point(&self, row: usize, col: usize) -> Vector3<f64> {
        self.point(self.grid_index(row, col))
    }
}

/// Planar checkerboard on `z = 0`, corner `(0, 0)` at the origin, columns
/// along x and rows along y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Checkerboard {
    pub rows: usize,
    pub cols: usize,
    pub row_spacing: f64,
    pub col_spacing: f64,
}

impl Checkerboard {
    pub fn new(rows: usize, cols: usize, row_spacing: f64, col_spacing: f64) -> Self {
        Self {
            rows,
            cols,
            row_spacing,
            col_spacing,
        }
    }

    /// Square cells of side `spacing`
    pub fn square(rows: usize, cols: usize, spacing: f64) -> Self {
        Self::new(rows, cols, spacing, spacing)
    }
}

impl GridTarget for Checkerboard {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn point(&self, index: usize) -> Vector3<f64> {
        let (row, col) = if self.cols == 0 {
            (0, 0)
        } else {
            (index / self.cols, index % self.cols)
        };
        Vector3::new(
            col as f64 * self.col_spacing,
            row as f64 * self.row_spacing,
            0.0,
        )
    }
}
