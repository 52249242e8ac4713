//! Execution strategy for the embarrassingly parallel loops
//!
//! A backend is chosen once at startup and handed to the kernels that
//! need it. Kernels never probe for a backend on their own.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::fmt;

pub trait ComputeBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Assemble a matrix column by column
    fn build_columns(
        &self,
        nrows: usize,
        ncols: usize,
        column: &(dyn Fn(usize) -> DVector<f64> + Sync),
    ) -> DMatrix<f64>;

    /// Evaluate `f(0..n)`
    fn map_indices(&self, n: usize, f: &(dyn Fn(usize) -> f64 + Sync)) -> Vec<f64>;

    /// Evaluate a block-valued `f(0..n)`
    fn map_matrices(&self, n: usize, f: &(dyn Fn(usize) -> DMatrix<f64> + Sync)) -> Vec<DMatrix<f64>>;
}

fn assemble(nrows: usize, columns: Vec<DVector<f64>>) -> DMatrix<f64> {
    let mut m = DMatrix::zeros(nrows, columns.len());
    for (j, col) in columns.iter().enumerate() {
        assert_eq!(col.len(), nrows, "column {} has the wrong length", j);
        m.set_column(j, col);
    }
    m
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn build_columns(
        &self,
        nrows: usize,
        ncols: usize,
        column: &(dyn Fn(usize) -> DVector<f64> + Sync),
    ) -> DMatrix<f64> {
        assemble(nrows, (0..ncols).map(column).collect())
    }

    fn map_indices(&self, n: usize, f: &(dyn Fn(usize) -> f64 + Sync)) -> Vec<f64> {
        (0..n).map(f).collect()
    }

    fn map_matrices(&self, n: usize, f: &(dyn Fn(usize) -> DMatrix<f64> + Sync)) -> Vec<DMatrix<f64>> {
        (0..n).map(f).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RayonBackend;

impl ComputeBackend for RayonBackend {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn build_columns(
        &self,
        nrows: usize,
        ncols: usize,
        column: &(dyn Fn(usize) -> DVector<f64> + Sync),
    ) -> DMatrix<f64> {
        assemble(nrows, (0..ncols).into_par_iter().map(column).collect())
    }

    fn map_indices(&self, n: usize, f: &(dyn Fn(usize) -> f64 + Sync)) -> Vec<f64> {
        (0..n).into_par_iter().map(f).collect()
    }

    fn map_matrices(&self, n: usize, f: &(dyn Fn(usize) -> DMatrix<f64> + Sync)) -> Vec<DMatrix<f64>> {
        (0..n).into_par_iter().map(f).collect()
    }
}
