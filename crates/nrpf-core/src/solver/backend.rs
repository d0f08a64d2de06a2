use faer::prelude::*;
use faer::solvers::PartialPivLu;
use faer::sparse::linalg::solvers::{Lu, SymbolicLu};
use faer::sparse::SparseColMat;
use faer::Mat;
use sprs::CsMat;

use crate::error::{NrpfError, NrpfResult};

/// Trait for solving square sparse linear systems (Ax = b).
///
/// Implementations return whatever the factorization produces; a
/// non-finite component is left for the caller to classify.
pub trait LinearSystemBackend: Send + Sync {
    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> NrpfResult<Vec<f64>>;
}

fn check_dimensions(matrix: &CsMat<f64>, rhs: &[f64]) -> NrpfResult<usize> {
    let n = matrix.rows();
    if matrix.cols() != n {
        return Err(NrpfError::Solver(format!(
            "matrix must be square, got {}x{}",
            n,
            matrix.cols()
        )));
    }
    if rhs.len() != n {
        return Err(NrpfError::Solver(format!(
            "rhs length ({}) does not match matrix dimension {}",
            rhs.len(),
            n
        )));
    }
    Ok(n)
}

/// Sparse LU factorization (faer), the default backend.
#[derive(Debug, Clone, Default)]
pub struct SparseLuSolver;

impl LinearSystemBackend for SparseLuSolver {
    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> NrpfResult<Vec<f64>> {
        let n = check_dimensions(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let triplets: Vec<(usize, usize, f64)> = matrix
            .iter()
            .map(|(&value, (row, col))| (row, col, value))
            .collect();

        let a = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| NrpfError::Solver(format!("failed to build sparse matrix: {:?}", e)))?;
        let symbolic = SymbolicLu::try_new(a.symbolic())
            .map_err(|e| NrpfError::Solver(format!("symbolic factorization failed: {:?}", e)))?;
        let lu = Lu::try_new_with_symbolic(symbolic, a.as_ref())
            .map_err(|e| NrpfError::Solver(format!("LU factorization failed: {:?}", e)))?;

        let b = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let x = lu.solve(b.as_ref());
        Ok((0..n).map(|i| x.read(i, 0)).collect())
    }
}

/// Dense LU with partial pivoting; used to cross-check small systems.
#[derive(Debug, Clone, Default)]
pub struct DenseLuSolver;

impl LinearSystemBackend for DenseLuSolver {
    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> NrpfResult<Vec<f64>> {
        let n = check_dimensions(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut mat = Mat::<f64>::zeros(n, n);
        for (&value, (row, col)) in matrix.iter() {
            mat.write(row, col, mat.read(row, col) + value);
        }
        let rhs_mat = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&rhs_mat);

        Ok((0..n).map(|i| sol.read(i, 0)).collect())
    }
}
