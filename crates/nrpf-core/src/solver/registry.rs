use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::backend::{DenseLuSolver, LinearSystemBackend, SparseLuSolver};
use crate::error::{NrpfError, NrpfResult};

/// Selectable linear-system backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    #[default]
    SparseLu,
    DenseLu,
}

impl SolverKind {
    pub fn parse(input: &str) -> NrpfResult<Self> {
        match input.to_ascii_lowercase().as_str() {
            "sparse" | "sparse_lu" | "default" => Ok(SolverKind::SparseLu),
            "dense" | "dense_lu" => Ok(SolverKind::DenseLu),
            other => Err(NrpfError::Config(format!(
                "unknown linear solver '{}'; supported values: {}",
                other,
                Self::available().join(", ")
            ))),
        }
    }

    pub fn build_solver(self) -> Arc<dyn LinearSystemBackend> {
        match self {
            SolverKind::SparseLu => Arc::new(SparseLuSolver),
            SolverKind::DenseLu => Arc::new(DenseLuSolver),
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["sparse_lu", "dense_lu"]
    }
}
