//! Unified error types for power-flow modeling and solving
//!
//! Every fatal condition raised while building a network, assembling the
//! sparse system, or iterating Newton-Raphson is represented by
//! [`NrpfError`]. Non-convergence is *not* an error: it is reported through
//! the solver's result so callers can decide how to retry.
//!
//! # Example
//!
//! ```ignore
//! use nrpf_core::{NrpfError, NrpfResult};
//!
//! fn run(network: &mut NetworkModel) -> NrpfResult<()> {
//!     let results = PowerFlow::new(PowerFlowSettings::default())?.solve(network)?;
//!     if !results.converged {
//!         tracing::warn!("power flow did not converge");
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all power-flow operations.
///
/// The enum is `Clone` so that lazily-built, process-wide resources (such as
/// the compiled Lagrangian evaluators) can hand out their construction error
/// to every caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NrpfError {
    /// Device or derivative setup is inconsistent (a construction-time bug)
    #[error("Modeling error: {0}")]
    Modeling(String),

    /// The linear solve produced a non-finite component
    #[error("Numeric divergence at iteration {iteration}: {message}")]
    Divergence { iteration: usize, message: String },

    /// The assembled system is obviously singular or malformed
    #[error("Structural error: {0}")]
    Structural(String),

    /// Linear solver backend failures (factorization, dimension mismatch)
    #[error("Solver error: {0}")]
    Solver(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using NrpfError.
pub type NrpfResult<T> = Result<T, NrpfError>;

impl NrpfError {
    /// True for the conditions that abort a solve attempt mid-iteration.
    pub fn is_numeric(&self) -> bool {
        matches!(self, NrpfError::Divergence { .. } | NrpfError::Solver(_))
    }
}

// Conversion from anyhow::Error, keeping the context chain
impl From<anyhow::Error> for NrpfError {
    fn from(err: anyhow::Error) -> Self {
        NrpfError::Other(format!("{:#}", err))
    }
}

impl From<String> for NrpfError {
    fn from(s: String) -> Self {
        NrpfError::Other(s)
    }
}

impl From<&str> for NrpfError {
    fn from(s: &str) -> Self {
        NrpfError::Other(s.to_string())
    }
}

// JSON parsing errors
impl From<serde_json::Error> for NrpfError {
    fn from(err: serde_json::Error) -> Self {
        NrpfError::Parse(err.to_string())
    }
}
