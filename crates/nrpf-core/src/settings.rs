//! Numeric settings for the Newton-Raphson power-flow solver.
//!
//! Settings are plain data: they can be built in code with the `with_*`
//! methods or deserialized from JSON (missing fields fall back to the
//! defaults). Call [`PowerFlowSettings::validate`] before handing them to a
//! solver; the runner does this for you.
//!
//! ```
//! use nrpf_core::settings::PowerFlowSettings;
//!
//! let settings = PowerFlowSettings::from_json(r#"{ "tolerance": 1e-9, "V_limiting": true }"#)?;
//! assert!(settings.voltage_limiting);
//! assert_eq!(settings.max_iterations, 50);
//! # Ok::<(), nrpf_core::NrpfError>(())
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{NrpfError, NrpfResult};
use crate::solver::SolverKind;

/// Clamp applied to Newton steps when voltage limiting is on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltageLimits {
    /// Largest allowed change of a limited unknown per iteration
    pub max_step: f64,
    /// Lower bound of a limited unknown after the step
    pub min: f64,
    /// Upper bound of a limited unknown after the step
    pub max: f64,
}

impl Default for VoltageLimits {
    fn default() -> Self {
        Self {
            max_step: 1.0,
            min: -2.0,
            max: 2.0,
        }
    }
}

/// Power-flow solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFlowSettings {
    /// Infinity-norm bound on the Newton step that declares convergence
    pub tolerance: f64,
    /// Iteration budget of a single Newton-Raphson solve
    pub max_iterations: usize,
    /// Clamp steps of masked unknowns to `voltage_limits`
    #[serde(alias = "V_limiting")]
    pub voltage_limiting: bool,
    pub voltage_limits: VoltageLimits,
    /// Solve the augmented primal/dual system with infeasibility currents
    pub infeasibility_analysis: bool,
    /// Ramp loads and generation when the full-strength solve fails
    pub tx_stepping: bool,
    /// Number of homotopy steps used by `tx_stepping`
    pub tx_steps: usize,
    /// Bound on re-solves triggered by capacitor and fuse state changes
    pub max_device_adjustments: usize,
    /// Backend used for each Newton step
    pub linear_solver: SolverKind,
}

impl Default for PowerFlowSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerFlowSettings {
    pub fn new() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 50,
            voltage_limiting: false,
            voltage_limits: VoltageLimits::default(),
            infeasibility_analysis: false,
            tx_stepping: false,
            tx_steps: 1000,
            max_device_adjustments: 10,
            linear_solver: SolverKind::SparseLu,
        }
    }

    /// Parse settings from a JSON document.
    pub fn from_json(text: &str) -> NrpfResult<Self> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a JSON settings file.
    pub fn from_json_file(path: impl AsRef<Path>) -> NrpfResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_voltage_limiting(mut self, enable: bool) -> Self {
        self.voltage_limiting = enable;
        self
    }

    pub fn with_voltage_limits(mut self, limits: VoltageLimits) -> Self {
        self.voltage_limits = limits;
        self
    }

    pub fn with_infeasibility_analysis(mut self, enable: bool) -> Self {
        self.infeasibility_analysis = enable;
        self
    }

    /// Enable tx-factor stepping with the given number of steps
    pub fn with_tx_stepping(mut self, steps: usize) -> Self {
        self.tx_stepping = true;
        self.tx_steps = steps;
        self
    }

    pub fn with_max_device_adjustments(mut self, max: usize) -> Self {
        self.max_device_adjustments = max;
        self
    }

    pub fn with_linear_solver(mut self, kind: SolverKind) -> Self {
        self.linear_solver = kind;
        self
    }

    /// Reject settings the solver cannot run with.
    pub fn validate(&self) -> NrpfResult<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(NrpfError::Config(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(NrpfError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.tx_stepping && self.tx_steps == 0 {
            return Err(NrpfError::Config(
                "tx_steps must be at least 1 when tx_stepping is enabled".to_string(),
            ));
        }
        let limits = &self.voltage_limits;
        if !(limits.max_step > 0.0 && limits.min < limits.max) {
            return Err(NrpfError::Config(format!(
                "invalid voltage limits: step {}, range [{}, {}]",
                limits.max_step, limits.min, limits.max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = PowerFlowSettings::default();
        assert_eq!(settings.tolerance, 1e-6);
        assert_eq!(settings.max_iterations, 50);
        assert_eq!(settings.tx_steps, 1000);
        assert_eq!(settings.voltage_limits.max_step, 1.0);
        assert_eq!(settings.voltage_limits.min, -2.0);
        assert_eq!(settings.voltage_limits.max, 2.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn json_accepts_legacy_limiting_key() {
        let settings =
            PowerFlowSettings::from_json(r#"{"V_limiting": true, "infeasibility_analysis": true}"#)
                .unwrap();
        assert!(settings.voltage_limiting);
        assert!(settings.infeasibility_analysis);
        assert_eq!(settings.max_device_adjustments, 10);
        assert_eq!(settings.linear_solver, SolverKind::SparseLu);
    }

    #[test]
    fn json_round_trip() {
        let settings = PowerFlowSettings::new()
            .with_tolerance(1e-10)
            .with_tx_stepping(20)
            .with_linear_solver(SolverKind::DenseLu);
        let text = serde_json::to_string(&settings).unwrap();
        let back = PowerFlowSettings::from_json(&text).unwrap();
        assert_eq!(settings, back);
    }

    #[test]
    fn invalid_settings_are_config_errors() {
        let err = PowerFlowSettings::new()
            .with_tolerance(0.0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, NrpfError::Config(_)));

        let err = PowerFlowSettings::new()
            .with_max_iterations(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, NrpfError::Config(_)));

        let err = PowerFlowSettings::from_json(r#"{"tolerance": "tight"}"#).unwrap_err();
        assert!(matches!(err, NrpfError::Parse(_)));
    }

    #[test]
    fn settings_file_is_read_and_parsed() {
        let path = std::env::temp_dir().join(format!("nrpf-settings-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"tolerance": 1e-8, "tx_steps": 25}"#).unwrap();
        let settings = PowerFlowSettings::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(settings.tolerance, 1e-8);
        assert_eq!(settings.tx_steps, 25);
    }

    #[test]
    fn missing_settings_file_names_the_path() {
        let path = std::env::temp_dir().join("nrpf-no-such-settings.json");
        let err = PowerFlowSettings::from_json_file(&path).unwrap_err();
        assert!(matches!(err, NrpfError::Other(_)));
        let text = err.to_string();
        assert!(text.contains("reading settings file"), "{}", text);
        assert!(text.contains("nrpf-no-such-settings.json"), "{}", text);
    }
}
