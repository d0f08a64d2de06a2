//! End-to-end power-flow cases with known answers.

use num_complex::Complex64;

use nrpf_algo::elements::{
    Capacitor, CapacitorMode, Element, ImpedanceLoad, Stamp, TransmissionLine,
};
use nrpf_algo::network::{NetworkModel, NetworkModelBuilder};
use nrpf_algo::power_flow::PowerFlow;
use nrpf_algo::sparse::MatrixBuilder;
use nrpf_core::{BusId, NrpfError, PowerFlowSettings, SolverKind};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const V2_REAL: f64 = 0.9719067704536565;
const V2_IMAG: f64 = -0.048;
const V2_MAG: f64 = 0.9730913474354073;
const V2_ANGLE: f64 = -0.04934735773406931;

/// Slack at 1∠0, line 0.01 + j0.1, load 0.5 + j0.2 at the far end.
fn two_bus_pq(infeasibility: bool) -> NetworkModel {
    two_bus_with_load(infeasibility, 0.5, 0.2)
}

fn two_bus_with_load(infeasibility: bool, p: f64, q: f64) -> NetworkModel {
    let mut b = NetworkModelBuilder::new(infeasibility).with_base_mva(100.0);
    let slack = b.add_bus("slack", Complex64::new(1.0, 0.0)).unwrap();
    let load = b.add_bus("load", Complex64::new(1.0, 0.0)).unwrap();
    b.add_slack("gen", slack, 1.0, 0.0);
    b.add_line(TransmissionLine::single_phase("l1", slack, load, 0.01, 0.1, 0.0).unwrap());
    b.add_pq_load("ld", load, None, p, q);
    b.build().unwrap()
}

fn load_voltage(network: &NetworkModel, v: &[f64], bus: BusId) -> Complex64 {
    let pair = network.nodes().bus(bus).unwrap();
    Complex64::new(v[pair.r], v[pair.i])
}

#[test]
fn two_bus_pq_matches_closed_form() {
    init_tracing();
    let mut net = two_bus_pq(false);
    let settings = PowerFlowSettings::default().with_tolerance(1e-10);
    let res = PowerFlow::new(settings).unwrap().solve(&mut net).unwrap();

    assert!(res.converged);
    assert!(res.iterations <= 10, "took {} iterations", res.iterations);
    assert_eq!(res.tx_factor, 1.0);

    let v2 = load_voltage(&net, &res.solution, BusId::new(1));
    assert!((v2.re - V2_REAL).abs() < 1e-9, "Vr = {}", v2.re);
    assert!((v2.im - V2_IMAG).abs() < 1e-9, "Vi = {}", v2.im);

    let load = res.bus("load").unwrap();
    assert!((load.v_mag - V2_MAG).abs() < 1e-9);
    assert!((load.v_ang.0.to_radians() - V2_ANGLE).abs() < 1e-9);

    // slack covers the load plus I²Z losses
    let slack = &res.slacks[0];
    assert!((slack.p - 0.503063).abs() < 1e-5, "P = {}", slack.p);
    assert!((slack.q - 0.230626).abs() < 1e-5, "Q = {}", slack.q);
    assert!((slack.p_mw.unwrap().0 - 50.3063).abs() < 1e-3);
    assert!(res.max_residual < 1e-8);
}

#[test]
fn pv_generator_holds_voltage_magnitude() {
    init_tracing();
    let mut b = NetworkModelBuilder::new(false);
    let slack = b.add_bus("slack", Complex64::new(1.0, 0.0)).unwrap();
    let pv = b.add_bus("pv", Complex64::new(1.0, 0.0)).unwrap();
    b.add_slack("gen", slack, 1.0, 0.0);
    b.add_line(TransmissionLine::single_phase("l1", slack, pv, 0.01, 0.1, 0.0).unwrap());
    b.add_generator("g2", pv, 0.4, 1.02);
    let mut net = b.build().unwrap();

    let settings = PowerFlowSettings::default().with_tolerance(1e-10);
    let res = PowerFlow::new(settings).unwrap().solve(&mut net).unwrap();
    assert!(res.converged);

    let v = load_voltage(&net, &res.solution, pv);
    assert!((v.re - 1.019281129232156).abs() < 1e-9);
    assert!((v.im - 0.03828811292321561).abs() < 1e-9);
    assert!((res.bus("pv").unwrap().v_mag - 1.02).abs() < 1e-9);

    let g = &res.generators[0];
    assert_eq!(g.p, 0.4);
    assert!((g.q - 0.17118870767843974).abs() < 1e-8, "Q = {}", g.q);
}

#[test]
fn isolated_three_phase_swing_holds_setpoints() {
    init_tracing();
    let mut b = NetworkModelBuilder::new(false);
    let phases = [
        b.add_bus("a", Complex64::new(0.0, 0.0)).unwrap(),
        b.add_bus("b", Complex64::new(0.0, 0.0)).unwrap(),
        b.add_bus("c", Complex64::new(0.0, 0.0)).unwrap(),
    ];
    b.add_infinite_source("sub", phases, 2400.0, 0.0);
    let mut net = b.build().unwrap();

    let res = PowerFlow::new(PowerFlowSettings::default())
        .unwrap()
        .solve(&mut net)
        .unwrap();
    assert!(res.converged);

    let expected = [2400.0, 0.0, -1200.0, -2078.46097, -1200.0, 2078.46097];
    for (k, bus) in phases.into_iter().enumerate() {
        let v = load_voltage(&net, &res.solution, bus);
        assert!((v.re - expected[2 * k]).abs() < 1e-4, "phase {} Vr = {}", k, v.re);
        assert!((v.im - expected[2 * k + 1]).abs() < 1e-4, "phase {} Vi = {}", k, v.im);
    }
    for slack in &res.slacks {
        assert!(slack.p.abs() < 1e-9 && slack.q.abs() < 1e-9);
        assert_eq!(slack.p_mw, None);
    }
}

#[test]
fn balanced_three_phase_line_reproduces_single_phase_case() {
    init_tracing();
    let mut b = NetworkModelBuilder::new(false);
    let mut src = [BusId::new(0); 3];
    let mut far = [BusId::new(0); 3];
    for (k, phase) in ["a", "b", "c"].iter().enumerate() {
        src[k] = b.add_bus(format!("src.{}", phase), Complex64::new(1.0, 0.0)).unwrap();
    }
    let shifts = [0.0, -2.0 * std::f64::consts::PI / 3.0, 2.0 * std::f64::consts::PI / 3.0];
    for (k, phase) in ["a", "b", "c"].iter().enumerate() {
        let init = Complex64::from_polar(1.0, shifts[k]);
        far[k] = b.add_bus(format!("far.{}", phase), init).unwrap();
    }
    b.add_infinite_source("sub", src, 1.0, 0.0);

    let z = Complex64::new(0.01, 0.1);
    let zero = Complex64::new(0.0, 0.0);
    let impedance = vec![vec![z, zero, zero], vec![zero, z, zero], vec![zero, zero, z]];
    b.add_line(TransmissionLine::new("feeder", src.to_vec(), far.to_vec(), impedance, None).unwrap());
    for (k, bus) in far.iter().enumerate() {
        b.add_pq_load(format!("ld{}", k), *bus, None, 0.5, 0.2);
    }
    let mut net = b.build().unwrap();

    let settings = PowerFlowSettings::default().with_tolerance(1e-10);
    let res = PowerFlow::new(settings).unwrap().solve(&mut net).unwrap();
    assert!(res.converged);

    for (k, phase) in ["a", "b", "c"].iter().enumerate() {
        let bus = res.bus(&format!("far.{}", phase)).unwrap();
        assert!((bus.v_mag - V2_MAG).abs() < 1e-9, "phase {} |V| = {}", phase, bus.v_mag);
        let angle = bus.v_ang.0.to_radians() - shifts[k];
        let wrapped = angle.sin().atan2(angle.cos());
        assert!((wrapped - V2_ANGLE).abs() < 1e-9);
    }
}

#[test]
fn resistive_divider_obeys_ohms_law_in_one_update() {
    init_tracing();
    let mut b = NetworkModelBuilder::new(false);
    let src = b.add_bus("src", Complex64::new(1.0, 0.0)).unwrap();
    let load = b.add_bus("load", Complex64::new(1.0, 0.0)).unwrap();
    b.add_slack("s", src, 1.0, 0.0);
    b.add_line(TransmissionLine::single_phase("l", src, load, 0.1, 0.2, 0.0).unwrap());
    b.add(Element::ImpedanceLoad(
        ImpedanceLoad::resistive("r", load, None, 1.0).unwrap(),
    ));
    let mut net = b.build().unwrap();

    let res = PowerFlow::new(PowerFlowSettings::default().with_tolerance(1e-10))
        .unwrap()
        .solve(&mut net)
        .unwrap();
    assert!(res.converged);
    assert_eq!(res.iterations, 1);

    let expected = Complex64::new(1.0, 0.0) / Complex64::new(1.1, 0.2);
    let v = load_voltage(&net, &res.solution, load);
    assert!((v - expected).norm() < 1e-12);
}

#[test]
fn residuals_vanish_only_at_the_solution() {
    init_tracing();
    let mut net = two_bus_pq(false);
    let flat = net.calculate_residuals(net.initial_guess()).unwrap();
    let flat_max = flat.values().fold(0.0f64, |acc, r| acc.max(r.abs()));
    assert!(flat_max > 1e-3);

    let res = PowerFlow::new(PowerFlowSettings::default().with_tolerance(1e-10))
        .unwrap()
        .solve(&mut net)
        .unwrap();
    let solved = net.calculate_residuals(&res.solution).unwrap();
    assert!(solved.values().all(|r| r.abs() < 1e-8));
    assert_eq!(solved.len(), net.size());

    assert!(matches!(
        net.calculate_residuals(&[1.0, 0.0]),
        Err(NrpfError::Network(_))
    ));
}

#[test]
fn clearing_to_the_baseline_reproduces_the_same_system() {
    let net = two_bus_pq(false);
    let v = net.initial_guess().to_vec();
    let mut y = MatrixBuilder::new(net.size());
    let mut j_linear = vec![0.0; net.size()];
    net.stamp(net.invariant(), &mut y, &mut j_linear, &v, 1.0).unwrap();
    let baseline = y.get_usage();

    let mut j1 = j_linear.clone();
    net.stamp(net.variable(), &mut y, &mut j1, &v, 1.0).unwrap();
    let first: Vec<(usize, usize, f64)> = y.triplets().collect();

    y.clear(baseline);
    y.clear(baseline);
    assert_eq!(y.get_usage(), baseline);

    let mut j2 = j_linear.clone();
    net.stamp(net.variable(), &mut y, &mut j2, &v, 1.0).unwrap();
    let second: Vec<(usize, usize, f64)> = y.triplets().collect();

    assert_eq!(first, second);
    assert_eq!(j1, j2);
}

#[test]
fn element_residuals_sum_to_network_residuals() {
    let net = two_bus_pq(false);
    let v = vec![0.99, -0.01, 0.97, -0.05, -0.5, 0.2];
    assert_eq!(v.len(), net.size());

    let total = net.calculate_residuals(&v).unwrap();
    let mut summed = vec![0.0; net.size()];
    for element in net.elements() {
        for (row, value) in element.calculate_residuals(&v, net.nodes()).unwrap() {
            summed[row] += value;
        }
    }
    for (row, value) in total {
        assert!((summed[row] - value).abs() < 1e-12, "row {}", row);
    }
}

#[test]
fn infeasibility_currents_vanish_on_a_feasible_case() {
    init_tracing();
    let mut net = two_bus_pq(true);
    let settings = PowerFlowSettings::default()
        .with_tolerance(1e-10)
        .with_infeasibility_analysis(true);
    let res = PowerFlow::new(settings).unwrap().solve(&mut net).unwrap();

    assert!(res.converged);
    assert_eq!(res.infeasibility.len(), 2);
    assert!(res.max_infeasibility_current() < 1e-8);
    for bus in &res.buses {
        assert!(bus.lambda_r.unwrap().abs() < 1e-8);
        assert!(bus.lambda_i.unwrap().abs() < 1e-8);
    }
    assert!((res.bus("load").unwrap().v_mag - V2_MAG).abs() < 1e-8);
    assert!(res.report_infeasible(1e-6).contains("no infeasibility"));
}

/// `Σ |I_inf|² + Σ λ·g(x)` with the multipliers held at `v`.
fn lagrangian(net: &NetworkModel, v: &[f64], constraints: &[(usize, usize)]) -> f64 {
    let g = net.calculate_residuals(v).unwrap();
    let mut l = 0.0;
    for element in net.elements() {
        if let Element::Infeasibility(inf) = element {
            let cur = inf.current_unknowns();
            l += v[cur.r].powi(2) + v[cur.i].powi(2);
        }
    }
    for &(row, dual) in constraints {
        l += v[dual] * g.get(&row).copied().unwrap_or(0.0);
    }
    l
}

#[test]
fn infeasible_load_reaches_a_stationary_point() {
    init_tracing();
    let mut net = two_bus_with_load(true, 8.0, 3.0);
    let settings = PowerFlowSettings::default()
        .with_tolerance(1e-10)
        .with_infeasibility_analysis(true);
    let res = PowerFlow::new(settings).unwrap().solve(&mut net).unwrap();

    assert!(res.converged);
    assert!(res.max_infeasibility_current() > 1e-3);
    let report = res.report_infeasible(1e-6);
    assert!(report.contains("load"), "{}", report);
    assert!(res
        .buses
        .iter()
        .any(|bus| bus.lambda_r.unwrap().abs() > 1e-6 || bus.lambda_i.unwrap().abs() > 1e-6));

    // constraint rows and their multipliers: bus KCL and slack voltage rows
    let mut constraints = Vec::new();
    let mut primals = Vec::new();
    for (_, pair) in net.nodes().buses() {
        constraints.push((pair.r, pair.lr.unwrap()));
        constraints.push((pair.i, pair.li.unwrap()));
        primals.extend([pair.r, pair.i]);
    }
    for element in net.elements() {
        match element {
            Element::Source(src) => {
                let cur = src.current_unknowns();
                constraints.push((cur.r, cur.lr.unwrap()));
                constraints.push((cur.i, cur.li.unwrap()));
                primals.extend([cur.r, cur.i]);
            }
            Element::Infeasibility(inf) => {
                let cur = inf.current_unknowns();
                primals.extend([cur.r, cur.i]);
            }
            _ => {}
        }
    }

    let h = 1e-6;
    for &k in &primals {
        let mut plus = res.solution.clone();
        let mut minus = res.solution.clone();
        plus[k] += h;
        minus[k] -= h;
        let gradient = (lagrangian(&net, &plus, &constraints)
            - lagrangian(&net, &minus, &constraints))
            / (2.0 * h);
        assert!(gradient.abs() < 1e-5, "dL/dx[{}] = {}", k, gradient);
    }
}

#[test]
fn sparse_and_dense_backends_agree() {
    let solve = |kind: SolverKind| {
        let mut net = two_bus_pq(false);
        let settings = PowerFlowSettings::default()
            .with_tolerance(1e-10)
            .with_linear_solver(kind);
        PowerFlow::new(settings).unwrap().solve(&mut net).unwrap()
    };
    let sparse = solve(SolverKind::SparseLu);
    let dense = solve(SolverKind::DenseLu);
    assert_eq!(sparse.iterations, dense.iterations);
    for (a, b) in sparse.solution.iter().zip(&dense.solution) {
        assert!((a - b).abs() < 1e-10);
    }
}

#[test]
fn tx_stepping_rescues_a_tight_iteration_budget() {
    init_tracing();
    let tight = PowerFlowSettings::default()
        .with_tolerance(1e-6)
        .with_max_iterations(2);

    let mut net = two_bus_pq(false);
    let res = PowerFlow::new(tight.clone()).unwrap().solve(&mut net).unwrap();
    assert!(!res.converged);

    let stepped = tight.with_tx_stepping(100);
    let res = PowerFlow::new(stepped).unwrap().solve(&mut net).unwrap();
    assert!(res.converged);
    assert_eq!(res.tx_factor, 1.0);
    assert!(res.iterations > 2);
    assert!((res.bus("load").unwrap().v_mag - V2_MAG).abs() < 1e-5);
}

#[test]
fn volt_controlled_capacitor_opens_below_band() {
    init_tracing();
    let mut b = NetworkModelBuilder::new(false);
    let slack = b.add_bus("slack", Complex64::new(1.0, 0.0)).unwrap();
    let load = b.add_bus("load", Complex64::new(1.0, 0.0)).unwrap();
    b.add_slack("gen", slack, 1.0, 0.0);
    b.add_line(TransmissionLine::single_phase("l1", slack, load, 0.01, 0.1, 0.0).unwrap());
    b.add_pq_load("ld", load, None, 0.5, 0.2);
    let cap = Capacitor::new("c1", load, None, 0.05, 1.0, CapacitorMode::Volt)
        .unwrap()
        .with_voltage_band(0.985, 1.05);
    b.add(Element::Capacitor(cap));
    let mut net = b.build().unwrap();

    let settings = PowerFlowSettings::default().with_tolerance(1e-10);
    let res = PowerFlow::new(settings).unwrap().solve(&mut net).unwrap();
    assert!(res.converged);
    assert_eq!(res.device_adjustments, 1);

    let cap_closed = net.elements().iter().any(|e| match e {
        Element::Capacitor(c) => c.is_closed(),
        _ => false,
    });
    assert!(!cap_closed);
    // with the capacitor out, the plain two-bus answer comes back
    assert!((res.bus("load").unwrap().v_mag - V2_MAG).abs() < 1e-9);
}

#[test]
fn device_budget_stops_the_outer_loop() {
    let mut b = NetworkModelBuilder::new(false);
    let slack = b.add_bus("slack", Complex64::new(1.0, 0.0)).unwrap();
    let load = b.add_bus("load", Complex64::new(1.0, 0.0)).unwrap();
    b.add_slack("gen", slack, 1.0, 0.0);
    b.add_line(TransmissionLine::single_phase("l1", slack, load, 0.01, 0.1, 0.0).unwrap());
    b.add_pq_load("ld", load, None, 0.5, 0.2);
    let cap = Capacitor::new("c1", load, None, 0.05, 1.0, CapacitorMode::Volt)
        .unwrap()
        .with_voltage_band(0.985, 1.05);
    b.add(Element::Capacitor(cap));
    let mut net = b.build().unwrap();

    let settings = PowerFlowSettings::default().with_max_device_adjustments(0);
    let res = PowerFlow::new(settings).unwrap().solve(&mut net).unwrap();
    assert!(res.converged);
    assert_eq!(res.device_adjustments, 0);
}

#[test]
fn floating_bus_is_a_structural_error() {
    init_tracing();
    let mut b = NetworkModelBuilder::new(false);
    let slack = b.add_bus("slack", Complex64::new(1.0, 0.0)).unwrap();
    b.add_bus("floating", Complex64::new(1.0, 0.0)).unwrap();
    b.add_slack("gen", slack, 1.0, 0.0);
    let mut net = b.build().unwrap();

    let diag = net.validate_topology();
    assert!(!diag.has_errors());
    assert_eq!(diag.warning_count(), 1);

    let err = PowerFlow::new(PowerFlowSettings::default())
        .unwrap()
        .solve(&mut net)
        .unwrap_err();
    assert!(matches!(err, NrpfError::Structural(_)), "{}", err);
}

#[test]
fn non_finite_load_is_rejected_before_the_solve() {
    let mut b = NetworkModelBuilder::new(false);
    let slack = b.add_bus("slack", Complex64::new(1.0, 0.0)).unwrap();
    let load = b.add_bus("load", Complex64::new(1.0, 0.0)).unwrap();
    b.add_slack("gen", slack, 1.0, 0.0);
    b.add_line(TransmissionLine::single_phase("l1", slack, load, 0.01, 0.1, 0.0).unwrap());
    b.add_pq_load("ld", load, None, f64::NAN, 0.2);
    let mut net = b.build().unwrap();

    let err = PowerFlow::new(PowerFlowSettings::default())
        .unwrap()
        .solve(&mut net)
        .unwrap_err();
    assert!(matches!(err, NrpfError::Structural(_)), "{}", err);
}

#[test]
fn settings_from_json_drive_a_solve() {
    let settings = PowerFlowSettings::from_json(
        r#"{ "tolerance": 1e-10, "V_limiting": true, "linear_solver": "dense_lu" }"#,
    )
    .unwrap();
    assert!(settings.voltage_limiting);

    let mut net = two_bus_pq(false);
    let res = PowerFlow::new(settings).unwrap().solve(&mut net).unwrap();
    assert!(res.converged);
    assert!((res.bus("load").unwrap().v_mag - V2_MAG).abs() < 1e-9);

    let json = serde_json::to_value(&res).unwrap();
    assert_eq!(json["converged"], true);
    assert_eq!(json["buses"][1]["name"], "load");
}
