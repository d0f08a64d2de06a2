//! Device models exercised through full solves.

use num_complex::Complex64;

use nrpf_algo::elements::{
    Element, Fuse, ImpedanceLoad, Regulator, RegulatorType, Shunt, Switch, SwitchState,
    TransmissionLine, Transformer,
};
use nrpf_algo::network::{NetworkModel, NetworkModelBuilder};
use nrpf_algo::power_flow::{PowerFlow, PowerFlowResults};
use nrpf_core::{BusId, PowerFlowSettings};

fn solve(net: &mut NetworkModel) -> PowerFlowResults {
    let settings = PowerFlowSettings::default().with_tolerance(1e-10);
    PowerFlow::new(settings).unwrap().solve(net).unwrap()
}

fn voltage(net: &NetworkModel, res: &PowerFlowResults, bus: BusId) -> Complex64 {
    let pair = net.nodes().bus(bus).unwrap();
    Complex64::new(res.solution[pair.r], res.solution[pair.i])
}

/// Slack → device → load bus with a 1 Ω resistive load.
fn through_device(add: impl FnOnce(&mut NetworkModelBuilder, BusId, BusId)) -> (NetworkModel, BusId) {
    let mut b = NetworkModelBuilder::new(false);
    let src = b.add_bus("src", Complex64::new(1.0, 0.0)).unwrap();
    let load = b.add_bus("load", Complex64::new(1.0, 0.0)).unwrap();
    b.add_slack("s", src, 1.0, 0.0);
    add(&mut b, src, load);
    b.add(Element::ImpedanceLoad(
        ImpedanceLoad::resistive("r", load, None, 1.0).unwrap(),
    ));
    (b.build().unwrap(), load)
}

#[test]
fn unity_transformer_behaves_like_its_series_impedance() {
    let mut b = NetworkModelBuilder::new(false);
    let hv = b.add_bus("hv", Complex64::new(1.0, 0.0)).unwrap();
    let lv = b.add_bus("lv", Complex64::new(1.0, 0.0)).unwrap();
    b.add_slack("s", hv, 1.0, 0.0);
    let t = Transformer::new("t1", hv, lv, 1.0, 0.0, 0.01, 0.1, b.nodes_mut()).unwrap();
    b.add(Element::Transformer(t));
    b.add_pq_load("ld", lv, None, 0.5, 0.2);
    let mut net = b.build().unwrap();

    let res = solve(&mut net);
    assert!(res.converged);
    let v = voltage(&net, &res, lv);
    assert!((v.re - 0.9719067704536565).abs() < 1e-9);
    assert!((v.im + 0.048).abs() < 1e-9);
}

#[test]
fn off_nominal_tap_divides_the_primary_voltage() {
    let (mut net, load) = through_device(|b, src, load| {
        let t = Transformer::new("t1", src, load, 1.05, 0.0, 0.0, 0.0, b.nodes_mut()).unwrap();
        b.add(Element::Transformer(t));
    });
    let res = solve(&mut net);
    assert!(res.converged);
    assert_eq!(res.iterations, 1);

    let expected = (1.0 / 1.05) / (1.0 + 1e-4);
    let v = voltage(&net, &res, load);
    assert!((v.re - expected).abs() < 1e-12, "V = {}", v);
    assert!(v.im.abs() < 1e-12);
}

#[test]
fn phase_shift_rotates_the_secondary() {
    let shift = 30f64.to_radians();
    let (mut net, load) = through_device(|b, src, load| {
        let t = Transformer::new("ps", src, load, 1.0, shift, 0.0, 0.0, b.nodes_mut()).unwrap();
        b.add(Element::Transformer(t));
    });
    let res = solve(&mut net);
    assert!(res.converged);
    let angle = res.bus("load").unwrap().v_ang.0.to_radians();
    assert!((angle + shift).abs() < 1e-9, "angle = {}", angle);

    // ideal core is lossless: only the load and the tie resistance draw power
    let v = voltage(&net, &res, load);
    let expected = v.norm_sqr() * (1.0 + 1e-4);
    assert!((res.slacks[0].p - expected).abs() < 1e-9);
}

#[test]
fn regulator_boosts_by_its_tap_ratio() {
    let (mut net, load) = through_device(|b, src, load| {
        let reg = Regulator::new("reg", src, load, RegulatorType::B, -16, b.nodes_mut());
        b.add(Element::Regulator(reg));
    });
    let res = solve(&mut net);
    assert!(res.converged);
    assert_eq!(res.iterations, 1);

    let expected = (1.0 / 1.1) / (1.0 + 1e-4);
    let v = voltage(&net, &res, load);
    assert!((v.re - expected).abs() < 1e-12, "V = {}", v);
}

#[test]
fn closed_switch_is_a_near_ideal_tie() {
    let (mut net, load) = through_device(|b, src, load| {
        b.add(Element::Switch(Switch::new("sw", src, load, SwitchState::Closed)));
    });
    let res = solve(&mut net);
    assert!(res.converged);
    let v = voltage(&net, &res, load);
    assert!((v.re - 1.0 / (1.0 + 1e-4)).abs() < 1e-12);
}

#[test]
fn fuse_within_rating_stays_closed() {
    let (mut net, load) = through_device(|b, src, load| {
        b.add(Element::Fuse(Fuse::new("f", src, load, 2.0).unwrap()));
    });
    let res = solve(&mut net);
    assert!(res.converged);
    assert_eq!(res.device_adjustments, 0);
    assert!(matches!(&net.elements()[1], Element::Fuse(f) if f.is_closed()));
    assert!((voltage(&net, &res, load).re - 1.0 / (1.0 + 1e-4)).abs() < 1e-12);
}

#[test]
fn shunt_capacitance_raises_the_far_end() {
    let mut b = NetworkModelBuilder::new(false);
    let src = b.add_bus("src", Complex64::new(1.0, 0.0)).unwrap();
    let far = b.add_bus("far", Complex64::new(1.0, 0.0)).unwrap();
    b.add_slack("s", src, 1.0, 0.0);
    b.add_line(TransmissionLine::single_phase("l", src, far, 0.01, 0.1, 0.0).unwrap());
    b.add_pq_load("ld", far, None, 0.5, 0.2);
    let mut plain = b.clone().build().unwrap();
    b.add(Element::Shunt(Shunt::from_mw_mvar("cap", far, 0.0, 20.0, 100.0)));
    let mut compensated = b.build().unwrap();

    let base = solve(&mut plain).bus("far").unwrap().v_mag;
    let boosted = solve(&mut compensated).bus("far").unwrap().v_mag;
    assert!(boosted > base, "{} <= {}", boosted, base);
}
