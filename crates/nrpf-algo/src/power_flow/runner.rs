//! Outer power-flow loops around the Newton-Raphson solver.
//!
//! 1. Full-strength solve from the network's initial guess.
//! 2. If that fails and tx-stepping is enabled, ramp loads and generation
//!    from `1/steps` to full strength, warm-starting each step from the
//!    previous solution.
//! 3. After a converged solve, let switchable devices react to the solved
//!    voltages and currents; any change triggers a new solve from the last
//!    solution, up to `max_device_adjustments` rounds.

use std::sync::Arc;

use tracing::{info, warn};
use web_time::Instant;

use nrpf_core::{LinearSystemBackend, NrpfError, NrpfResult, PowerFlowSettings};

use crate::network::NetworkModel;

use super::nr_solver::{NrOutcome, NrSolver};
use super::results::PowerFlowResults;

pub struct PowerFlow {
    solver: NrSolver,
}

impl PowerFlow {
    pub fn new(settings: PowerFlowSettings) -> NrpfResult<Self> {
        settings.validate()?;
        Ok(Self {
            solver: NrSolver::new(settings),
        })
    }

    pub fn with_backend(
        settings: PowerFlowSettings,
        backend: Arc<dyn LinearSystemBackend>,
    ) -> NrpfResult<Self> {
        settings.validate()?;
        Ok(Self {
            solver: NrSolver::with_backend(settings, backend),
        })
    }

    pub fn settings(&self) -> &PowerFlowSettings {
        self.solver.settings()
    }

    /// Solve `network`, applying device control between solves.
    pub fn solve(&self, network: &mut NetworkModel) -> NrpfResult<PowerFlowResults> {
        let settings = self.settings();
        if settings.infeasibility_analysis != network.infeasibility() {
            return Err(NrpfError::Config(format!(
                "infeasibility analysis is {} in the settings but {} in the network model",
                on_off(settings.infeasibility_analysis),
                on_off(network.infeasibility())
            )));
        }

        let diagnostics = network.validate_topology();
        for issue in diagnostics.errors().chain(diagnostics.warnings()) {
            warn!(category = %issue.category, entity = ?issue.entity, "{}", issue.message);
        }

        let start = Instant::now();
        let mut v = network.initial_guess().to_vec();
        let mut adjustments = 0usize;

        let (outcome, tx_factor) = loop {
            let (outcome, tx_factor) = self.solve_with_homotopy(network, &v)?;
            if !outcome.converged {
                break (outcome, tx_factor);
            }
            if adjustments >= settings.max_device_adjustments {
                warn!(adjustments, "device control budget exhausted");
                break (outcome, tx_factor);
            }
            if !network.adjust_devices(&outcome.solution)? {
                break (outcome, tx_factor);
            }
            adjustments += 1;
            info!(round = adjustments, "device states changed, re-solving");
            v = outcome.solution;
        };

        let mut results = PowerFlowResults::from_solution(
            network,
            outcome.solution,
            outcome.converged,
            outcome.iterations,
            start.elapsed(),
        )?;
        results.tx_factor = tx_factor;
        results.device_adjustments = adjustments;
        info!(
            converged = results.converged,
            iterations = results.iterations,
            max_residual = results.max_residual,
            elapsed_ms = results.duration.as_millis() as u64,
            "power flow finished"
        );
        Ok(results)
    }

    /// One full-strength attempt, then the tx-stepping ramp if enabled.
    ///
    /// The ramp starts from the fully relaxed case (`tx_factor = 0`) and
    /// warm-starts each step from the previous converged point.
    fn solve_with_homotopy(&self, network: &NetworkModel, v_init: &[f64]) -> NrpfResult<(NrOutcome, f64)> {
        let settings = self.settings();
        let outcome = self.solver.run(network, v_init, 1.0)?;
        if outcome.converged || !settings.tx_stepping {
            return Ok((outcome, 1.0));
        }

        info!(steps = settings.tx_steps, "full-strength solve failed, ramping loads");
        let mut v = v_init.to_vec();
        let mut total_iterations = outcome.iterations;
        for (step, tx_factor) in ramp(settings.tx_steps).enumerate() {
            let mut stepped = self.solver.run(network, &v, tx_factor)?;
            total_iterations += stepped.iterations;
            if !stepped.converged {
                warn!(step, tx_factor, "tx-stepping failed");
                stepped.iterations = total_iterations;
                return Ok((stepped, tx_factor));
            }
            v = stepped.solution;
        }

        Ok((
            NrOutcome {
                converged: true,
                solution: v,
                iterations: total_iterations,
            },
            1.0,
        ))
    }
}

/// `0, 1/steps, ..., 1`.
fn ramp(steps: usize) -> impl Iterator<Item = f64> {
    (0..=steps).map(move |step| step as f64 / steps as f64)
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}
