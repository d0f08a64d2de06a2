//! Post-solve reporting: bus voltages, device power, residuals.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use nrpf_core::units::{to_mvar, to_mw};
use nrpf_core::{BusId, Degrees, Megavars, Megawatts, NrpfResult, Radians};

use crate::elements::Element;
use crate::network::NetworkModel;

/// Voltage and multipliers at one bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusResult {
    pub bus: BusId,
    pub name: String,
    pub v_mag: f64,
    pub v_ang: Degrees,
    /// KCL multipliers (infeasibility analysis only)
    pub lambda_r: Option<f64>,
    pub lambda_i: Option<f64>,
}

/// Power delivered to the network by a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectionResult {
    pub name: String,
    pub bus: BusId,
    /// Active power in system units (per unit, or watts for unscaled cases)
    pub p: f64,
    pub q: f64,
    /// `p` on the network's MVA base, when it has one
    pub p_mw: Option<Megawatts>,
    pub q_mvar: Option<Megavars>,
}

impl InjectionResult {
    fn new(name: &str, bus: BusId, p: f64, q: f64, base_mva: Option<f64>) -> Self {
        Self {
            name: name.to_string(),
            bus,
            p,
            q,
            p_mw: base_mva.map(|base| to_mw(p, base)),
            q_mvar: base_mva.map(|base| to_mvar(q, base)),
        }
    }
}

/// Fictitious current needed at a bus to make the case feasible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfeasibilityResult {
    pub bus: BusId,
    pub name: String,
    pub ir: f64,
    pub ii: f64,
    pub injection: InjectionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerFlowResults {
    pub converged: bool,
    pub iterations: usize,
    /// Homotopy factor of the final solve (1.0 unless tx-stepping stopped early)
    pub tx_factor: f64,
    /// Outer device-control rounds that changed a device state
    pub device_adjustments: usize,
    pub duration: Duration,
    pub solution: Vec<f64>,
    pub buses: Vec<BusResult>,
    pub generators: Vec<InjectionResult>,
    pub slacks: Vec<InjectionResult>,
    pub infeasibility: Vec<InfeasibilityResult>,
    /// Largest `|Y·v − J|` over all rows of the full-strength model
    pub max_residual: f64,
}

impl PowerFlowResults {
    pub fn from_solution(
        network: &NetworkModel,
        solution: Vec<f64>,
        converged: bool,
        iterations: usize,
        duration: Duration,
    ) -> NrpfResult<Self> {
        let nodes = network.nodes();
        let v = &solution;
        let base = network.base_mva();

        let buses = nodes
            .buses()
            .map(|(bus, pair)| {
                let (vr, vi) = (v[pair.r], v[pair.i]);
                BusResult {
                    bus,
                    name: network.bus_name(bus).unwrap_or_default().to_string(),
                    v_mag: vr.hypot(vi),
                    v_ang: Radians(vi.atan2(vr)).to_degrees(),
                    lambda_r: pair.lr.map(|k| v[k]),
                    lambda_i: pair.li.map(|k| v[k]),
                }
            })
            .collect();

        let mut generators = Vec::new();
        let mut slacks = Vec::new();
        let mut infeasibility = Vec::new();
        for element in network.elements() {
            match element {
                Element::Generator(g) => {
                    let q = v[g.q_unknown().index];
                    generators.push(InjectionResult::new(&g.name, g.bus, g.p, q, base));
                }
                Element::Source(s) => {
                    let (p, q) = s.power_output(v, nodes)?;
                    slacks.push(InjectionResult::new(&s.name, s.bus, p, q, base));
                }
                Element::Infeasibility(inf) => {
                    let cur = inf.current_unknowns();
                    let (p, q) = inf.power(v, nodes)?;
                    let name = network.bus_name(inf.bus).unwrap_or_default();
                    infeasibility.push(InfeasibilityResult {
                        bus: inf.bus,
                        name: name.to_string(),
                        ir: v[cur.r],
                        ii: v[cur.i],
                        injection: InjectionResult::new(name, inf.bus, p, q, base),
                    });
                }
                _ => {}
            }
        }

        let max_residual = network
            .calculate_residuals(v)?
            .values()
            .fold(0.0f64, |acc, r| acc.max(r.abs()));

        Ok(Self {
            converged,
            iterations,
            tx_factor: 1.0,
            device_adjustments: 0,
            duration,
            solution,
            buses,
            generators,
            slacks,
            infeasibility,
            max_residual,
        })
    }

    pub fn bus(&self, name: &str) -> Option<&BusResult> {
        self.buses.iter().find(|b| b.name == name)
    }

    /// Largest infeasibility current magnitude (zero without the analysis).
    pub fn max_infeasibility_current(&self) -> f64 {
        self.infeasibility
            .iter()
            .map(|inf| inf.ir.hypot(inf.ii))
            .fold(0.0, f64::max)
    }

    /// Human-readable list of buses that need a non-zero infeasibility
    /// current above `threshold`.
    pub fn report_infeasible(&self, threshold: f64) -> String {
        let mut out = String::new();
        let offenders: Vec<&InfeasibilityResult> = self
            .infeasibility
            .iter()
            .filter(|inf| inf.ir.hypot(inf.ii) > threshold)
            .collect();
        if offenders.is_empty() {
            out.push_str("no infeasibility currents above threshold");
            return out;
        }
        let _ = writeln!(out, "{} infeasible bus(es):", offenders.len());
        for inf in offenders {
            let _ = write!(
                out,
                "  {} ({}): I = {:.6} {:+.6}j",
                inf.name, inf.bus, inf.ir, inf.ii
            );
            match (inf.injection.p_mw, inf.injection.q_mvar) {
                (Some(p), Some(q)) => {
                    let _ = writeln!(out, ", S = {:.3} MW {:+.3} Mvar", p.0, q.0);
                }
                _ => {
                    let _ = writeln!(out, ", S = {:.6} {:+.6}j", inf.injection.p, inf.injection.q);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkModelBuilder;
    use num_complex::Complex64;

    #[test]
    fn bus_and_slack_reporting() {
        let mut b = NetworkModelBuilder::new(false).with_base_mva(100.0);
        let bus = b.add_bus("only", Complex64::new(1.0, 0.0)).unwrap();
        b.add_slack("src", bus, 1.0, 0.0);
        b.add_pq_load("ld", bus, None, 0.5, 0.2);
        let net = b.build().unwrap();

        // exact solution: V = 1, source current −(0.5 − 0.2j)
        let v = vec![1.0, 0.0, -0.5, 0.2];
        let res = PowerFlowResults::from_solution(&net, v, true, 1, Duration::ZERO).unwrap();

        let only = res.bus("only").unwrap();
        assert!((only.v_mag - 1.0).abs() < 1e-12);
        assert!(only.v_ang.0.abs() < 1e-12);
        assert_eq!(only.lambda_r, None);

        let slack = &res.slacks[0];
        assert!((slack.p - 0.5).abs() < 1e-12);
        assert!((slack.q - 0.2).abs() < 1e-12);
        assert!((slack.p_mw.unwrap().0 - 50.0).abs() < 1e-9);
        assert!(res.max_residual < 1e-12);
        assert!(res.report_infeasible(1e-6).contains("no infeasibility"));
    }
}
