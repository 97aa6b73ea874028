//! Channels whose gates depend on voltage and a concentration.
//!
//! Each gate slot carries an input index naming which of the channel's three
//! external inputs (membrane voltage, first concentration, second
//! concentration) binds to the `v` and `c` variables of the gate's rate
//! expressions. The routing belongs to the channel and is consulted on every
//! step, the gate itself only sees the two resolved scalars.

use std::str::FromStr;
use std::sync::Arc;
use log::warn;
use parking_lot::RwLock;
use crate::error::ChannelError;
use crate::gate::{ChannelId, GateId, formula::FormulaGate2D};
use super::{
    ChannelDriver, ChannelOutput, GateName, TickInfo,
    integrate, take_power, REINIT_EPSILON,
};


/// One of the three external inputs a 2D channel receives
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InputSource {
    /// Membrane voltage from the compartment
    Volt,
    /// First concentration, from e.g. a calcium pool
    C1,
    /// Second concentration
    C2,
}

/// Assignment of external inputs to the two gate variables. The first
/// source binds to `v`, the second to `c`, a missing second source binds
/// `c` to zero.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InputIndex {
    /// `v` = voltage
    Volt,
    /// `v` = first concentration
    C1,
    /// `v` = second concentration
    C2,
    /// `v` = voltage, `c` = first concentration
    VoltC1,
    /// `v` = voltage, `c` = second concentration
    VoltC2,
    /// `v` = first concentration, `c` = second concentration
    C1C2,
}

impl InputIndex {
    /// The source bound to each gate variable
    pub fn dims(&self) -> (InputSource, Option<InputSource>) {
        match self {
            InputIndex::Volt => (InputSource::Volt, None),
            InputIndex::C1 => (InputSource::C1, None),
            InputIndex::C2 => (InputSource::C2, None),
            InputIndex::VoltC1 => (InputSource::Volt, Some(InputSource::C1)),
            InputIndex::VoltC2 => (InputSource::Volt, Some(InputSource::C2)),
            InputIndex::C1C2 => (InputSource::C1, Some(InputSource::C2)),
        }
    }

    /// Converts index to its configuration string
    pub fn to_str(&self) -> &str {
        match self {
            InputIndex::Volt => "VOLT_INDEX",
            InputIndex::C1 => "C1_INDEX",
            InputIndex::C2 => "C2_INDEX",
            InputIndex::VoltC1 => "VOLT_C1_INDEX",
            InputIndex::VoltC2 => "VOLT_C2_INDEX",
            InputIndex::C1C2 => "C1_C2_INDEX",
        }
    }
}

impl FromStr for InputIndex {
    type Err = ChannelError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "VOLT_INDEX" => Ok(InputIndex::Volt),
            "C1_INDEX" => Ok(InputIndex::C1),
            "C2_INDEX" => Ok(InputIndex::C2),
            "VOLT_C1_INDEX" => Ok(InputIndex::VoltC1),
            "VOLT_C2_INDEX" => Ok(InputIndex::VoltC2),
            "C1_C2_INDEX" => Ok(InputIndex::C1C2),
            _ => Err(ChannelError::UnknownInputIndex(string.to_string())),
        }
    }
}

struct GateSlot2D {
    power: u32,
    state: f64,
    inited: bool,
    index: InputIndex,
    gate: Option<Arc<RwLock<FormulaGate2D>>>,
}

impl Default for GateSlot2D {
    fn default() -> Self {
        GateSlot2D {
            power: 0,
            state: 0.0,
            inited: false,
            index: InputIndex::Volt,
            gate: None,
        }
    }
}

impl Clone for GateSlot2D {
    fn clone(&self) -> Self {
        GateSlot2D {
            power: self.power,
            state: self.state,
            inited: self.inited,
            index: self.index,
            gate: self.gate.clone(),
        }
    }
}

/// An ion channel whose gates are functions of voltage and concentration,
/// evaluated per step through [`FormulaGate2D`]
pub struct IonChannel2D {
    id: ChannelId,
    gbar: f64,
    ek: f64,
    gk: f64,
    ik: f64,
    vm: f64,
    conc1: f64,
    conc2: f64,
    modulation: f64,
    instant: u8,
    driver: ChannelDriver,
    slots: [GateSlot2D; 3],
}

impl Default for IonChannel2D {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for IonChannel2D {
    /// Copies share the original's gates, see [`super::IonChannel`]
    fn clone(&self) -> Self {
        IonChannel2D {
            id: ChannelId::generate(),
            gbar: self.gbar,
            ek: self.ek,
            gk: self.gk,
            ik: self.ik,
            vm: self.vm,
            conc1: self.conc1,
            conc2: self.conc2,
            modulation: self.modulation,
            instant: self.instant,
            driver: self.driver,
            slots: self.slots.clone(),
        }
    }
}

impl IonChannel2D {
    /// Creates an empty channel with no gates attached
    pub fn new() -> Self {
        IonChannel2D {
            id: ChannelId::generate(),
            gbar: 0.0,
            ek: 0.0,
            gk: 0.0,
            ik: 0.0,
            vm: 0.0,
            conc1: 0.0,
            conc2: 0.0,
            modulation: 1.0,
            instant: 0,
            driver: ChannelDriver::SelfStepping,
            slots: [
                GateSlot2D::default(),
                GateSlot2D::default(),
                GateSlot2D::default(),
            ],
        }
    }

    /// This channel's id, the token gate mutations must present
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Whether this channel is the original owner of its attached gates
    pub fn is_original(&self) -> bool {
        for slot in &self.slots {
            if let Some(gate) = &slot.gate {
                return gate.read().is_original(self.id);
            }
        }
        true
    }

    /// Maximum conductance (S)
    pub fn gbar(&self) -> f64 {
        self.gbar
    }

    /// Sets the maximum conductance (S)
    pub fn set_gbar(&mut self, gbar: f64) {
        self.gbar = gbar;
    }

    /// Reversal potential (V)
    pub fn ek(&self) -> f64 {
        self.ek
    }

    /// Sets the reversal potential (V)
    pub fn set_ek(&mut self, ek: f64) {
        self.ek = ek;
    }

    /// Last computed conductance (S)
    pub fn gk(&self) -> f64 {
        self.gk
    }

    /// Last computed driven current (A)
    pub fn ik(&self) -> f64 {
        self.ik
    }

    /// Incoming voltage from the compartment (V)
    pub fn handle_vm(&mut self, vm: f64) {
        self.vm = vm;
    }

    /// Incoming first concentration, e.g. from a calcium pool (mM)
    pub fn handle_conc1(&mut self, conc: f64) {
        self.conc1 = conc;
    }

    /// Incoming second concentration (mM)
    pub fn handle_conc2(&mut self, conc: f64) {
        self.conc2 = conc;
    }

    /// Multiplicative conductance scaling supplied by collaborators,
    /// defaults to 1
    pub fn set_modulation(&mut self, modulation: f64) {
        self.modulation = modulation;
    }

    /// Bitmask of gates clamped to their steady state `A/B` each step,
    /// see [`super::INSTANT_X`]
    pub fn set_instant(&mut self, instant: u8) {
        self.instant = instant;
    }

    /// Who advances the channel, see [`ChannelDriver`]
    pub fn set_driver(&mut self, driver: ChannelDriver) {
        self.driver = driver;
    }

    /// Input routing of the named gate
    pub fn input_index(&self, name: GateName) -> InputIndex {
        self.slots[name.index()].index
    }

    /// Sets which external inputs bind to the named gate's `v` and `c`
    pub fn set_input_index(&mut self, name: GateName, index: InputIndex) {
        self.slots[name.index()].index = index;
    }

    /// As [`IonChannel2D::set_input_index`] but from a configuration string,
    /// rejecting anything outside the recognised set
    pub fn set_input_index_str(
        &mut self,
        name: GateName,
        index: &str,
    ) -> Result<(), ChannelError> {
        self.set_input_index(name, InputIndex::from_str(index)?);
        Ok(())
    }

    /// Integer power of the named gate
    pub fn power(&self, name: GateName) -> u32 {
        self.slots[name.index()].power
    }

    /// Sets the power of the named gate, allocating or destroying the gate
    /// as in [`super::IonChannel::set_power`]
    pub fn set_power(&mut self, name: GateName, power: u32) -> Result<(), ChannelError> {
        let slot = &mut self.slots[name.index()];
        if slot.power == power {
            return Ok(());
        }

        if power > 0 {
            if let Some(gate) = &slot.gate {
                if !gate.read().is_original(self.id) {
                    warn!(
                        "IonChannel2D: changing {} power not allowed from a copied channel",
                        name.to_str(),
                    );
                    return Err(ChannelError::NotOriginal(format!(
                        "{}power", name.to_str(),
                    )));
                }
            } else {
                slot.gate = Some(Arc::new(RwLock::new(FormulaGate2D::attach(
                    self.id,
                    GateId::generate(),
                ))));
            }
        } else if let Some(gate) = &slot.gate {
            if !gate.read().is_original(self.id) {
                warn!(
                    "IonChannel2D: destroying gate {} not allowed from a copied channel",
                    name.to_str(),
                );
                return Err(ChannelError::NotOriginal(format!(
                    "{}power", name.to_str(),
                )));
            }
            slot.gate = None;
            slot.state = 0.0;
            slot.inited = false;
        }

        slot.power = power;
        Ok(())
    }

    /// Shared handle to the named gate, if one is attached
    pub fn gate(&self, name: GateName) -> Option<Arc<RwLock<FormulaGate2D>>> {
        self.slots[name.index()].gate.clone()
    }

    /// State variable of the named gate, the open fraction in [0, 1]
    pub fn state(&self, name: GateName) -> f64 {
        self.slots[name.index()].state
    }

    /// Seeds the named gate's state ahead of `reinit`
    pub fn set_initial_state(&mut self, name: GateName, state: f64) {
        let slot = &mut self.slots[name.index()];
        slot.state = state;
        slot.inited = true;
    }

    fn input_value(&self, source: InputSource) -> f64 {
        match source {
            InputSource::Volt => self.vm,
            InputSource::C1 => self.conc1,
            InputSource::C2 => self.conc2,
        }
    }

    // resolve a slot's routing to the (v, c) pair its gate sees
    fn gate_inputs(&self, index: InputIndex) -> (f64, f64) {
        let (dim0, dim1) = index.dims();
        (
            self.input_value(dim0),
            dim1.map(|source| self.input_value(source)).unwrap_or(0.0),
        )
    }

    fn output(&self) -> ChannelOutput {
        ChannelOutput {
            gk: self.gk,
            ek: self.ek,
            ik: self.ik,
        }
    }

    /// Advances all active gates by one tick and recomputes `Gk` and `Ik`,
    /// routing each gate's inputs through its input index
    pub fn process(&mut self, tick: &TickInfo) -> Result<ChannelOutput, ChannelError> {
        if self.driver == ChannelDriver::SolverDriven {
            return Ok(self.output());
        }

        let instant = self.instant;
        let mut g = self.gbar;

        for slot_index in 0..self.slots.len() {
            let name = GateName::ALL[slot_index];
            if self.slots[slot_index].power == 0 {
                continue;
            }
            let (v, c) = self.gate_inputs(self.slots[slot_index].index);

            let slot = &mut self.slots[slot_index];
            let gate = slot
                .gate
                .as_ref()
                .ok_or_else(|| ChannelError::MissingGate(name.to_str().to_string()))?;

            let (a, b) = gate.read().lookup_both(v, c)?;
            slot.state = if instant & name.instant_bit() != 0 {
                a / b
            } else {
                integrate(slot.state, tick.dt, a, b)
            };
            g *= take_power(slot.state, slot.power);
        }

        self.gk = g * self.modulation;
        self.ik = (self.ek - self.vm) * self.gk;
        Ok(self.output())
    }

    /// Resets the channel to its initial state, seeding each gate's state
    /// with its steady state `A/B` unless pre-seeded
    pub fn reinit(&mut self, _tick: &TickInfo) -> Result<ChannelOutput, ChannelError> {
        if self.driver == ChannelDriver::SolverDriven {
            return Ok(self.output());
        }

        let mut g = self.gbar;

        for slot_index in 0..self.slots.len() {
            let name = GateName::ALL[slot_index];
            if self.slots[slot_index].power == 0 {
                continue;
            }
            let (v, c) = self.gate_inputs(self.slots[slot_index].index);

            let slot = &mut self.slots[slot_index];
            let gate = slot
                .gate
                .as_ref()
                .ok_or_else(|| ChannelError::MissingGate(name.to_str().to_string()))?;

            let (a, b) = gate.read().lookup_both(v, c)?;
            if b < REINIT_EPSILON {
                warn!(
                    "IonChannel2D: B value for gate {} is ~0, check the gate expressions",
                    name.to_str(),
                );
                return Err(ChannelError::SingularActivation(name.to_str().to_string()));
            }
            if !slot.inited {
                slot.state = a / b;
            }
            g *= take_power(slot.state, slot.power);
        }

        self.gk = g * self.modulation;
        self.ik = (self.ek - self.vm) * self.gk;
        Ok(self.output())
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_index_table() {
        let cases = [
            ("VOLT_INDEX", InputSource::Volt, None),
            ("C1_INDEX", InputSource::C1, None),
            ("C2_INDEX", InputSource::C2, None),
            ("VOLT_C1_INDEX", InputSource::Volt, Some(InputSource::C1)),
            ("VOLT_C2_INDEX", InputSource::Volt, Some(InputSource::C2)),
            ("C1_C2_INDEX", InputSource::C1, Some(InputSource::C2)),
        ];

        for (string, dim0, dim1) in cases {
            let index = InputIndex::from_str(string).unwrap();
            assert_eq!(index.dims(), (dim0, dim1));
            assert_eq!(index.to_str(), string);
        }
    }

    #[test]
    fn test_unknown_index_rejected() {
        assert!(matches!(
            InputIndex::from_str("VOLT_C3_INDEX"),
            Err(ChannelError::UnknownInputIndex(_))
        ));
    }
}
