//! Per-device-kind Lagrange handlers.
//!
//! Each handler is differentiated, split and compiled the first time it is
//! requested and shared for the rest of the process.

use nrpf_core::NrpfResult;
use once_cell::sync::Lazy;

use crate::symbolic::{Expr, LagrangeHandler, Symbol};

fn s(name: &'static str) -> Expr {
    Expr::sym(name)
}

/// Coupled admittance: current leaving `a` (entering `b`) is
/// `(G + jB)(V_c − V_d)`.
static BRANCH: Lazy<NrpfResult<LagrangeHandler>> = Lazy::new(|| {
    let (g, b) = (s("G"), s("B"));
    let vr = s("Vr_c") - s("Vr_d");
    let vi = s("Vi_c") - s("Vi_d");
    let lr = s("Lr_a") - s("Lr_b");
    let li = s("Li_a") - s("Li_b");
    let lagrange = lr * (g.clone() * vr.clone() - b.clone() * vi.clone()) + li * (g * vi + b * vr);
    LagrangeHandler::new(
        lagrange,
        &[Symbol("G"), Symbol("B")],
        &[
            Symbol("Vr_a"),
            Symbol("Vi_a"),
            Symbol("Vr_b"),
            Symbol("Vi_b"),
            Symbol("Vr_c"),
            Symbol("Vi_c"),
            Symbol("Vr_d"),
            Symbol("Vi_d"),
        ],
        &[
            Symbol("Lr_a"),
            Symbol("Li_a"),
            Symbol("Lr_b"),
            Symbol("Li_b"),
            Symbol("Lr_c"),
            Symbol("Li_c"),
            Symbol("Lr_d"),
            Symbol("Li_d"),
        ],
    )
});

/// Ideal ratio `V_p = a·V_s` with primary current `I_p` and secondary
/// current `−conj(a)·I_p`.
static IDEAL_TRANSFORMER: Lazy<NrpfResult<LagrangeHandler>> = Lazy::new(|| {
    let (ar, ai) = (s("ar"), s("ai"));
    let (vr_p, vi_p, vr_s, vi_s) = (s("Vr_p"), s("Vi_p"), s("Vr_s"), s("Vi_s"));
    let (ipr, ipi) = (s("Ipr"), s("Ipi"));

    let ratio_r = vr_p - ar.clone() * vr_s.clone() + ai.clone() * vi_s.clone();
    let ratio_i = vi_p - ar.clone() * vi_s - ai.clone() * vr_s;
    let secondary_r = ar.clone() * ipr.clone() + ai.clone() * ipi.clone();
    let secondary_i = ar * ipi.clone() - ai * ipr.clone();

    let lagrange = s("Mr") * ratio_r
        + s("Mi") * ratio_i
        + s("Lr_p") * ipr
        + s("Li_p") * ipi
        - s("Lr_s") * secondary_r
        - s("Li_s") * secondary_i;
    LagrangeHandler::new(
        lagrange,
        &[Symbol("ar"), Symbol("ai")],
        &[
            Symbol("Vr_p"),
            Symbol("Vi_p"),
            Symbol("Vr_s"),
            Symbol("Vi_s"),
            Symbol("Ipr"),
            Symbol("Ipi"),
        ],
        &[
            Symbol("Lr_p"),
            Symbol("Li_p"),
            Symbol("Lr_s"),
            Symbol("Li_s"),
            Symbol("Mr"),
            Symbol("Mi"),
        ],
    )
});

static VOLTAGE_SOURCE: Lazy<NrpfResult<LagrangeHandler>> = Lazy::new(|| {
    let lagrange = s("Lr") * s("Ir")
        + s("Li") * s("Ii")
        + s("Mr") * (s("Vr") - s("Vs_r"))
        + s("Mi") * (s("Vi") - s("Vs_i"));
    LagrangeHandler::new(
        lagrange,
        &[Symbol("Vs_r"), Symbol("Vs_i")],
        &[Symbol("Vr"), Symbol("Vi"), Symbol("Ir"), Symbol("Ii")],
        &[Symbol("Lr"), Symbol("Li"), Symbol("Mr"), Symbol("Mi")],
    )
});

/// Constant-power load between `a` and `b`.
static PQ_LOAD: Lazy<NrpfResult<LagrangeHandler>> = Lazy::new(|| {
    let (p, q) = (s("P"), s("Q"));
    let vr = s("Vr_a") - s("Vr_b");
    let vi = s("Vi_a") - s("Vi_b");
    let inv_d = (vr.clone().powi(2) + vi.clone().powi(2)).powi(-1);
    let ir = (p.clone() * vr.clone() + q.clone() * vi.clone()) * inv_d.clone();
    let ii = (p * vi - q * vr) * inv_d;
    let lagrange = (s("Lr_a") - s("Lr_b")) * ir + (s("Li_a") - s("Li_b")) * ii;
    LagrangeHandler::new(
        lagrange,
        &[Symbol("P"), Symbol("Q")],
        &[Symbol("Vr_a"), Symbol("Vi_a"), Symbol("Vr_b"), Symbol("Vi_b")],
        &[Symbol("Lr_a"), Symbol("Li_a"), Symbol("Lr_b"), Symbol("Li_b")],
    )
});

/// PV generator: fixed active injection, reactive output `Q` holds `|V|`.
static GENERATOR: Lazy<NrpfResult<LagrangeHandler>> = Lazy::new(|| {
    let (p, q, vset) = (s("P"), s("Q"), s("Vset"));
    let (vr, vi) = (s("Vr"), s("Vi"));
    let inv_d = (vr.clone().powi(2) + vi.clone().powi(2)).powi(-1);
    let ir = (p.clone() * vr.clone() + q.clone() * vi.clone()) * inv_d.clone();
    let ii = (p * vi.clone() - q * vr.clone()) * inv_d;
    let lagrange = -(s("Lr") * ir) - s("Li") * ii
        + s("Mq") * (vr.powi(2) + vi.powi(2) - vset.powi(2));
    LagrangeHandler::new(
        lagrange,
        &[Symbol("P"), Symbol("Vset")],
        &[Symbol("Vr"), Symbol("Vi"), Symbol("Q")],
        &[Symbol("Lr"), Symbol("Li"), Symbol("Mq")],
    )
});

/// Squared infeasibility current plus its injection into bus KCL.
static INFEASIBILITY: Lazy<NrpfResult<LagrangeHandler>> = Lazy::new(|| {
    let (ir, ii) = (s("Ir_inf"), s("Ii_inf"));
    let lagrange = ir.clone().powi(2) + ii.clone().powi(2) + s("Lr") * ir + s("Li") * ii;
    LagrangeHandler::new(
        lagrange,
        &[],
        &[Symbol("Ir_inf"), Symbol("Ii_inf")],
        &[Symbol("Lr"), Symbol("Li")],
    )
});

fn get(handler: &'static Lazy<NrpfResult<LagrangeHandler>>) -> NrpfResult<&'static LagrangeHandler> {
    handler.as_ref().map_err(Clone::clone)
}

pub fn branch() -> NrpfResult<&'static LagrangeHandler> {
    get(&BRANCH)
}

pub fn ideal_transformer() -> NrpfResult<&'static LagrangeHandler> {
    get(&IDEAL_TRANSFORMER)
}

pub fn voltage_source() -> NrpfResult<&'static LagrangeHandler> {
    get(&VOLTAGE_SOURCE)
}

pub fn pq_load() -> NrpfResult<&'static LagrangeHandler> {
    get(&PQ_LOAD)
}

pub fn generator() -> NrpfResult<&'static LagrangeHandler> {
    get(&GENERATOR)
}

pub fn infeasibility() -> NrpfResult<&'static LagrangeHandler> {
    get(&INFEASIBILITY)
}
