//! # nrpf-core: Shared types for Newton-Raphson power flow
//!
//! Provides the data types every other layer of the solver builds on:
//!
//! - [`NrpfError`] / [`NrpfResult`]: the error taxonomy (modeling bugs,
//!   numeric divergence, structural matrix problems, solver failures)
//! - [`Diagnostics`]: non-fatal issue collection for validation passes
//! - [`NodeMap`]: one-time assignment of every state variable to a dense
//!   index of the unknown vector
//! - [`PowerFlowSettings`]: tolerance, iteration budget, voltage limiting,
//!   infeasibility analysis and homotopy options
//! - [`solver`]: sparse and dense LU backends behind [`LinearSystemBackend`]
//! - [`graph_utils`]: island detection for topology checks
//! - [`units`]: unit newtypes for reported quantities
//!
//! ## Formulation
//!
//! The solver uses the equivalent-circuit (current/voltage) formulation in
//! rectangular coordinates. Every electrical node contributes two unknowns,
//! `Vr` and `Vi`, and two Kirchhoff current-law rows. Devices that need more
//! state (voltage sources, transformers, PV generators) allocate auxiliary
//! unknowns through the [`NodeMap`] and own the rows that go with them.

pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod nodes;
pub mod settings;
pub mod solver;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{NrpfError, NrpfResult};
pub use graph_utils::{Island, Topology};
pub use nodes::{AuxUnknown, NodeMap, NodePair, UnknownKind};
pub use settings::{PowerFlowSettings, VoltageLimits};
pub use solver::*;
pub use units::{Degrees, Megavars, Megawatts, Radians};

use serde::{Deserialize, Serialize};

/// Newtype wrapper for bus ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);

impl BusId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BusId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for BusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bus {}", self.0)
    }
}
