//! # nrpf-algo: Newton-Raphson AC power flow
//!
//! Solves the equivalent-circuit power-flow problem for single- and
//! multi-phase networks, optionally augmented with infeasibility currents
//! that locate where a case cannot be served.
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`sparse`] | Triplet accumulation of the Newton matrix with baseline checkpoints |
//! | [`symbolic`] | Differentiation and compilation of device Lagrangians |
//! | [`elements`] | Device models and their Newton stamps |
//! | [`network`] | Node indexing, initial guess, limiting mask, device collection |
//! | [`power_flow`] | Newton iteration, tx-stepping, device control, results |
//!
//! ## Example
//!
//! ```
//! use nrpf_algo::elements::TransmissionLine;
//! use nrpf_algo::network::NetworkModelBuilder;
//! use nrpf_algo::power_flow::PowerFlow;
//! use nrpf_core::PowerFlowSettings;
//! use num_complex::Complex64;
//!
//! let mut builder = NetworkModelBuilder::new(false);
//! let slack = builder.add_bus("slack", Complex64::new(1.0, 0.0))?;
//! let load = builder.add_bus("load", Complex64::new(1.0, 0.0))?;
//! builder.add_slack("gen", slack, 1.0, 0.0);
//! builder.add_line(TransmissionLine::single_phase("l1", slack, load, 0.01, 0.1, 0.0)?);
//! builder.add_pq_load("ld", load, None, 0.5, 0.2);
//! let mut network = builder.build()?;
//!
//! let results = PowerFlow::new(PowerFlowSettings::default())?.solve(&mut network)?;
//! assert!(results.converged);
//! assert!((results.bus("load").unwrap().v_mag - 0.9731).abs() < 1e-3);
//! # Ok::<(), nrpf_core::NrpfError>(())
//! ```

pub mod elements;
pub mod network;
pub mod power_flow;
pub mod sparse;
pub mod symbolic;

pub use elements::{Element, Stamp};
pub use network::{NetworkModel, NetworkModelBuilder};
pub use power_flow::{NrSolver, PowerFlow, PowerFlowResults};
pub use sparse::MatrixBuilder;
