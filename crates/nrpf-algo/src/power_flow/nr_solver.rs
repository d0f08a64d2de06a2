//! # Newton-Raphson iteration
//!
//! Each iteration solves the linearized system `Y·x = J` for the next
//! estimate of every unknown. Linear devices are stamped once and kept as a
//! baseline; only the nonlinear devices are re-stamped per iteration.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  INIT     stamp invariant devices at v_init → checkpoint (Y, J)   │
//! │                                                                   │
//! │  ITERATE  J ← J_linear                                            │
//! │           stamp variable devices at v_prev                        │
//! │           validate Y, solve Y·v_next = J                          │
//! │           non-finite v_next          → Divergence error           │
//! │           max |v_next − v_prev| < tol → CONVERGED                 │
//! │           limit step on masked unknowns, v_prev ← v_prev + step   │
//! │           Y ← checkpoint                                          │
//! │                                                                   │
//! │  FAILURE  iteration budget exhausted → not converged              │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Convergence is judged on the infinity norm of the raw Newton step, not
//! on residuals; residuals are available after the solve for diagnostics.

use std::sync::Arc;

use tracing::{debug, info, warn};

use nrpf_core::{LinearSystemBackend, NrpfError, NrpfResult, PowerFlowSettings};

use crate::network::NetworkModel;
use crate::sparse::MatrixBuilder;

/// Result of a single Newton-Raphson run.
#[derive(Debug, Clone, PartialEq)]
pub struct NrOutcome {
    pub converged: bool,
    /// Final estimate (the converged point, or the last iterate)
    pub solution: Vec<f64>,
    /// Newton updates applied before the converging solve
    pub iterations: usize,
}

pub struct NrSolver {
    settings: PowerFlowSettings,
    backend: Arc<dyn LinearSystemBackend>,
}

impl NrSolver {
    /// Solver using the backend selected by `settings.linear_solver`.
    pub fn new(settings: PowerFlowSettings) -> Self {
        let backend = settings.linear_solver.build_solver();
        Self { settings, backend }
    }

    pub fn with_backend(settings: PowerFlowSettings, backend: Arc<dyn LinearSystemBackend>) -> Self {
        Self { settings, backend }
    }

    pub fn settings(&self) -> &PowerFlowSettings {
        &self.settings
    }

    /// Iterate from `v_init` with loads and generation scaled by `tx_factor`.
    pub fn run(&self, network: &NetworkModel, v_init: &[f64], tx_factor: f64) -> NrpfResult<NrOutcome> {
        let size = network.size();
        if v_init.len() != size {
            return Err(NrpfError::Network(format!(
                "initial vector has {} entries, network has {} unknowns",
                v_init.len(),
                size
            )));
        }

        let mut y = MatrixBuilder::new(size);
        let mut j_linear = vec![0.0; size];
        network.stamp(network.invariant(), &mut y, &mut j_linear, v_init, tx_factor)?;
        let linear_index = y.get_usage();

        let mask = network.limiting_mask();
        let limits = self.settings.voltage_limits;
        let mut v_previous = v_init.to_vec();

        for iteration in 0..self.settings.max_iterations {
            let mut j = j_linear.clone();
            network.stamp(network.variable(), &mut y, &mut j, &v_previous, tx_factor)?;

            y.assert_valid(true)?;
            let matrix = y.to_matrix()?;
            let v_next = self.backend.solve(&matrix, &j)?;

            if let Some(pos) = v_next.iter().position(|x| !x.is_finite()) {
                return Err(NrpfError::Divergence {
                    iteration,
                    message: format!(
                        "unknown {} ({:?}) is {}",
                        pos,
                        network.nodes().kind(pos),
                        v_next[pos]
                    ),
                });
            }

            let mut diff: Vec<f64> = v_next
                .iter()
                .zip(&v_previous)
                .map(|(next, prev)| next - prev)
                .collect();
            let err = diff.iter().fold(0.0f64, |acc, d| acc.max(d.abs()));
            debug!(iteration, tx_factor, step_norm = err, "newton iteration");

            if err < self.settings.tolerance {
                info!(iterations = iteration, tx_factor, "newton-raphson converged");
                return Ok(NrOutcome {
                    converged: true,
                    solution: v_next,
                    iterations: iteration,
                });
            }

            if self.settings.voltage_limiting {
                for (k, d) in diff.iter_mut().enumerate() {
                    if mask[k] {
                        *d = d.clamp(-limits.max_step, limits.max_step);
                    }
                }
            }
            for (k, d) in diff.iter().enumerate() {
                let next = v_previous[k] + d;
                v_previous[k] = if self.settings.voltage_limiting && mask[k] {
                    next.clamp(limits.min, limits.max)
                } else {
                    next
                };
            }

            y.clear(linear_index);
        }

        warn!(
            max_iterations = self.settings.max_iterations,
            tx_factor,
            "newton-raphson did not converge"
        );
        Ok(NrOutcome {
            converged: false,
            solution: v_previous,
            iterations: self.settings.max_iterations,
        })
    }
}
