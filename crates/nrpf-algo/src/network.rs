//! # Network model
//!
//! Owns the devices of a power-flow case, the node-index map that places
//! every unknown in the system vector, the initial guess, and the mask of
//! unknowns subject to voltage limiting.
//!
//! Networks are assembled with [`NetworkModelBuilder`]. Indices are
//! allocated while devices are added and never change afterwards; the
//! builder finishes by adding one infeasibility current per bus when
//! infeasibility analysis is enabled.
//!
//! ```
//! use nrpf_algo::network::NetworkModelBuilder;
//! use nrpf_algo::elements::TransmissionLine;
//! use num_complex::Complex64;
//!
//! let mut builder = NetworkModelBuilder::new(false);
//! let slack = builder.add_bus("slack", Complex64::new(1.0, 0.0))?;
//! let load = builder.add_bus("load", Complex64::new(1.0, 0.0))?;
//! builder.add_slack("gen", slack, 1.0, 0.0);
//! builder.add_line(TransmissionLine::single_phase("l1", slack, load, 0.01, 0.1, 0.0)?);
//! builder.add_pq_load("ld", load, None, 0.5, 0.2);
//! let network = builder.build()?;
//! assert_eq!(network.bus_count(), 2);
//! # Ok::<(), nrpf_core::NrpfError>(())
//! ```

use std::collections::HashMap;
use std::f64::consts::PI;

use num_complex::Complex64;
use tracing::{debug, info};

use nrpf_core::{BusId, Diagnostics, NodeMap, NrpfError, NrpfResult, Topology};

use crate::elements::{
    residuals_of, Element, Generator, InfeasibilityCurrent, PqLoad, Residuals, Stamp,
    StampContext, TransmissionLine, VoltageSource,
};
use crate::sparse::MatrixBuilder;

/// Incremental construction of a [`NetworkModel`].
#[derive(Debug, Clone)]
pub struct NetworkModelBuilder {
    nodes: NodeMap,
    initial: Vec<f64>,
    bus_names: Vec<String>,
    bus_lookup: HashMap<String, BusId>,
    elements: Vec<Element>,
    limiting_mask: Option<Vec<bool>>,
    base_mva: Option<f64>,
}

impl NetworkModelBuilder {
    /// `infeasibility` allocates dual unknowns for every primal added later.
    pub fn new(infeasibility: bool) -> Self {
        Self {
            nodes: NodeMap::new(infeasibility),
            initial: Vec::new(),
            bus_names: Vec::new(),
            bus_lookup: HashMap::new(),
            elements: Vec::new(),
            limiting_mask: None,
            base_mva: None,
        }
    }

    /// Per-unit system base; results report MW / Mvar on this base.
    pub fn with_base_mva(mut self, base_mva: f64) -> Self {
        self.base_mva = Some(base_mva);
        self
    }

    /// Replace the default limiting mask (node voltages only).
    pub fn with_limiting_mask(mut self, mask: Vec<bool>) -> Self {
        self.limiting_mask = Some(mask);
        self
    }

    /// Node map, for devices that allocate their own auxiliary unknowns.
    pub fn nodes_mut(&mut self) -> &mut NodeMap {
        &mut self.nodes
    }

    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    pub fn add_bus(&mut self, name: impl Into<String>, initial: Complex64) -> NrpfResult<BusId> {
        let name = name.into();
        if self.bus_lookup.contains_key(&name) {
            return Err(NrpfError::Network(format!("duplicate bus '{}'", name)));
        }
        let id = self.nodes.add_bus();
        let pair = self.nodes.bus(id)?;
        self.initial.resize(self.nodes.size(), 0.0);
        self.initial[pair.r] = initial.re;
        self.initial[pair.i] = initial.im;
        self.bus_lookup.insert(name.clone(), id);
        self.bus_names.push(name);
        Ok(id)
    }

    pub fn bus_id(&self, name: &str) -> Option<BusId> {
        self.bus_lookup.get(name).copied()
    }

    /// Add a device; returns its position in the element list.
    pub fn add(&mut self, element: Element) -> usize {
        self.elements.push(element);
        self.elements.len() - 1
    }

    pub fn add_line(&mut self, line: TransmissionLine) -> usize {
        self.add(Element::Line(line))
    }

    /// Slack bus held at `magnitude ∠ angle` (radians).
    pub fn add_slack(&mut self, name: impl Into<String>, bus: BusId, magnitude: f64, angle: f64) -> usize {
        let source = VoltageSource::polar(name, bus, magnitude, angle, &mut self.nodes);
        self.add(Element::Source(source))
    }

    /// Balanced three-phase source: phases at `angle`, `angle − 120°`,
    /// `angle + 120°`.
    pub fn add_infinite_source(
        &mut self,
        name: &str,
        phases: [BusId; 3],
        magnitude: f64,
        angle: f64,
    ) -> [usize; 3] {
        let shifts = [0.0, -2.0 * PI / 3.0, 2.0 * PI / 3.0];
        let mut out = [0usize; 3];
        for (k, (bus, shift)) in phases.into_iter().zip(shifts).enumerate() {
            let phase_name = format!("{}:{}", name, ['a', 'b', 'c'][k]);
            out[k] = self.add_slack(phase_name, bus, magnitude, angle + shift);
        }
        out
    }

    pub fn add_pq_load(
        &mut self,
        name: impl Into<String>,
        from: BusId,
        to: Option<BusId>,
        p: f64,
        q: f64,
    ) -> usize {
        self.add(Element::PqLoad(PqLoad::new(name, from, to, p, q)))
    }

    pub fn add_generator(&mut self, name: impl Into<String>, bus: BusId, p: f64, v_set: f64) -> usize {
        let generator = Generator::new(name, bus, p, v_set, &mut self.nodes);
        self.add(Element::Generator(generator))
    }

    pub fn build(mut self) -> NrpfResult<NetworkModel> {
        if self.nodes.bus_count() == 0 {
            return Err(NrpfError::Network("network has no buses".to_string()));
        }

        if self.nodes.infeasibility() {
            let buses: Vec<BusId> = self.nodes.buses().map(|(id, _)| id).collect();
            for bus in buses {
                let current = InfeasibilityCurrent::new(bus, &mut self.nodes);
                self.elements.push(Element::Infeasibility(current));
            }
        }

        self.initial.resize(self.nodes.size(), 0.0);
        for element in &self.elements {
            // internal nodes start at the voltage of the bus they feed
            let (internal, to) = match element {
                Element::Transformer(t) => (t.internal_node(), t.to),
                Element::Regulator(r) => (r.internal_node(), r.to),
                _ => continue,
            };
            let to = self.nodes.bus(to)?;
            self.initial[internal.r] = self.initial[to.r];
            self.initial[internal.i] = self.initial[to.i];
        }

        let limiting_mask = match self.limiting_mask {
            Some(mask) if mask.len() != self.nodes.size() => {
                return Err(NrpfError::Network(format!(
                    "limiting mask has {} entries, network has {} unknowns",
                    mask.len(),
                    self.nodes.size()
                )));
            }
            Some(mask) => mask,
            None => self.nodes.voltage_mask(),
        };

        let network = NetworkModel {
            nodes: self.nodes,
            initial: self.initial,
            bus_names: self.bus_names,
            elements: self.elements,
            limiting_mask,
            base_mva: self.base_mva,
        };
        info!(
            buses = network.bus_count(),
            unknowns = network.size(),
            invariant = network.invariant().count(),
            variable = network.variable().count(),
            "network model built"
        );
        Ok(network)
    }
}

/// A fully indexed power-flow case.
#[derive(Debug, Clone)]
pub struct NetworkModel {
    nodes: NodeMap,
    initial: Vec<f64>,
    bus_names: Vec<String>,
    elements: Vec<Element>,
    limiting_mask: Vec<bool>,
    base_mva: Option<f64>,
}

impl NetworkModel {
    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    /// Number of unknowns (and equations).
    pub fn size(&self) -> usize {
        self.nodes.size()
    }

    pub fn bus_count(&self) -> usize {
        self.nodes.bus_count()
    }

    pub fn bus_name(&self, bus: BusId) -> Option<&str> {
        self.bus_names.get(bus.value()).map(String::as_str)
    }

    pub fn infeasibility(&self) -> bool {
        self.nodes.infeasibility()
    }

    pub fn base_mva(&self) -> Option<f64> {
        self.base_mva
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Devices stamped once per solve.
    pub fn invariant(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| !e.is_variable())
    }

    /// Devices re-stamped every iteration.
    pub fn variable(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| e.is_variable())
    }

    pub fn initial_guess(&self) -> &[f64] {
        &self.initial
    }

    pub fn limiting_mask(&self) -> &[bool] {
        &self.limiting_mask
    }

    /// Island check: every connected group of buses needs a voltage source.
    pub fn validate_topology(&self) -> Diagnostics {
        let mut diag = Diagnostics::new();
        let mut topology = Topology::new(self.bus_count());
        let mut sources = Vec::new();
        for element in &self.elements {
            for (a, b) in element.connections() {
                topology.connect(a, b);
            }
            sources.extend(element.source_bus());
        }

        if sources.is_empty() {
            diag.add_error("topology", "network has no voltage source");
        }
        for island in topology.unsourced_islands(&sources) {
            let names: Vec<&str> = island
                .buses
                .iter()
                .filter_map(|bus| self.bus_name(*bus))
                .collect();
            diag.add_warning_with_entity(
                "topology",
                &format!("island {} has no voltage source", island.island_id),
                &names.join(", "),
            );
        }
        diag
    }

    /// Run one round of between-solve device control.
    ///
    /// Returns `true` when any capacitor or fuse changed state.
    pub fn adjust_devices(&mut self, v: &[f64]) -> NrpfResult<bool> {
        let mut changed = false;
        for element in &mut self.elements {
            if element.try_adjust(v, &self.nodes)? {
                debug!(element = element.name(), "device state changed");
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Stamp a device set into `y`/`j` (duals too under infeasibility analysis).
    pub fn stamp<'a>(
        &self,
        elements: impl Iterator<Item = &'a Element>,
        y: &mut MatrixBuilder,
        j: &mut [f64],
        v_previous: &[f64],
        tx_factor: f64,
    ) -> NrpfResult<()> {
        let ctx = StampContext::new(&self.nodes, tx_factor);
        for element in elements {
            element.stamp_primal(y, j, v_previous, &ctx)?;
            if self.nodes.infeasibility() {
                element.stamp_dual(y, j, v_previous, &ctx)?;
            }
        }
        Ok(())
    }

    /// Aggregate `Y·v − J` of the full-strength model.
    pub fn calculate_residuals(&self, v: &[f64]) -> NrpfResult<Residuals> {
        if v.len() != self.size() {
            return Err(NrpfError::Network(format!(
                "state vector has {} entries, network has {} unknowns",
                v.len(),
                self.size()
            )));
        }
        let mut y = MatrixBuilder::new(self.size());
        let mut j = vec![0.0; self.size()];
        self.stamp(self.elements.iter(), &mut y, &mut j, v, 1.0)?;
        Ok(residuals_of(&y, &j, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Capacitor, CapacitorMode, ImpedanceLoad, Transformer};
    use nrpf_core::UnknownKind;

    fn two_bus(infeasibility: bool) -> NetworkModel {
        let mut builder = NetworkModelBuilder::new(infeasibility);
        let a = builder.add_bus("a", Complex64::new(1.0, 0.0)).unwrap();
        let b = builder.add_bus("b", Complex64::new(0.9, -0.1)).unwrap();
        builder.add_slack("src", a, 1.0, 0.0);
        builder.add_line(TransmissionLine::single_phase("l", a, b, 0.01, 0.1, 0.02).unwrap());
        builder.add_pq_load("ld", b, None, 0.3, 0.1);
        builder.build().unwrap()
    }

    #[test]
    fn duplicate_bus_is_rejected() {
        let mut builder = NetworkModelBuilder::new(false);
        builder.add_bus("a", Complex64::new(1.0, 0.0)).unwrap();
        let err = builder.add_bus("a", Complex64::new(1.0, 0.0)).unwrap_err();
        assert!(matches!(err, NrpfError::Network(_)));
    }

    #[test]
    fn empty_network_is_rejected() {
        assert!(NetworkModelBuilder::new(false).build().is_err());
    }

    #[test]
    fn partitions_and_initial_guess() {
        let net = two_bus(false);
        assert_eq!(net.invariant().count(), 2);
        assert_eq!(net.variable().count(), 1);
        let init = net.initial_guess();
        assert_eq!(init.len(), net.size());
        assert_eq!(&init[2..4], &[0.9, -0.1]);
        // source currents start at zero and are not limited
        assert_eq!(net.limiting_mask(), &[true, true, true, true, false, false]);
    }

    #[test]
    fn infeasibility_adds_one_current_per_bus() {
        let net = two_bus(true);
        let count = net
            .elements()
            .iter()
            .filter(|e| matches!(e, Element::Infeasibility(_)))
            .count();
        assert_eq!(count, 2);
        assert!((0..net.size()).any(|k| net.nodes().kind(k) == Some(UnknownKind::Dual)));
    }

    #[test]
    fn internal_nodes_start_at_secondary_voltage() {
        let mut builder = NetworkModelBuilder::new(false);
        let a = builder.add_bus("a", Complex64::new(1.0, 0.0)).unwrap();
        let b = builder.add_bus("b", Complex64::new(0.5, 0.25)).unwrap();
        let t = Transformer::new("t", a, b, 2.0, 0.0, 0.0, 0.1, builder.nodes_mut()).unwrap();
        let x = t.internal_node();
        builder.add(Element::Transformer(t));
        let net = builder.build().unwrap();
        assert_eq!(net.initial_guess()[x.r], 0.5);
        assert_eq!(net.initial_guess()[x.i], 0.25);
    }

    #[test]
    fn bad_mask_length_is_rejected() {
        let mut builder = NetworkModelBuilder::new(false).with_limiting_mask(vec![true]);
        builder.add_bus("a", Complex64::new(1.0, 0.0)).unwrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn topology_flags_unsourced_islands() {
        let mut builder = NetworkModelBuilder::new(false);
        let a = builder.add_bus("a", Complex64::new(1.0, 0.0)).unwrap();
        let b = builder.add_bus("b", Complex64::new(1.0, 0.0)).unwrap();
        builder.add_slack("src", a, 1.0, 0.0);
        builder.add(Element::ImpedanceLoad(
            ImpedanceLoad::resistive("r", b, None, 10.0).unwrap(),
        ));
        let net = builder.build().unwrap();
        let diag = net.validate_topology();
        assert!(!diag.has_errors());
        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.warnings().next().and_then(|w| w.entity.as_deref()), Some("b"));
    }

    #[test]
    fn adjust_devices_reports_changes() {
        let mut builder = NetworkModelBuilder::new(false);
        let a = builder.add_bus("a", Complex64::new(1.0, 0.0)).unwrap();
        builder.add_slack("src", a, 1.0, 0.0);
        let cap = Capacitor::new("c", a, None, 0.1, 1.0, CapacitorMode::Volt)
            .unwrap()
            .with_voltage_band(0.95, 1.05);
        builder.add(Element::Capacitor(cap));
        let mut net = builder.build().unwrap();

        let mut v = net.initial_guess().to_vec();
        assert!(!net.adjust_devices(&v).unwrap());
        v[0] = 0.9;
        assert!(net.adjust_devices(&v).unwrap());
        assert!(!net.adjust_devices(&v).unwrap());
    }

    #[test]
    fn residuals_need_matching_length() {
        let net = two_bus(false);
        assert!(net.calculate_residuals(&[1.0]).is_err());
        let r = net.calculate_residuals(net.initial_guess()).unwrap();
        assert!(r.values().all(|x| x.is_finite()));
    }
}
