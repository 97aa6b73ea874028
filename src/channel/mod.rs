//! Hodgkin-Huxley type ion channels composing up to three gates into a
//! conductance.
//!
//! A channel owns an ordered sequence of three optional gate slots,
//! conventionally named X, Y and Z. Each active slot carries an integer power
//! and a state variable in [0, 1], the open fraction of that gate. On every
//! step the channel queries each gate for its `(A, B)` pair, advances the
//! state with the exponential Euler rule and composes the conductance
//! `Gk = gBar * X^Xpower * Y^Ypower * Z^Zpower * modulation` along with the
//! driven current `Ik = (Ek - Vm) * Gk`.
//!
//! ```rust
//! use channel_gating::channel::{GateName, TabulatedChannel, TickInfo};
//!
//! let mut channel = TabulatedChannel::new();
//! channel.set_gbar(36.0);
//! channel.set_ek(-12.0);
//! channel.set_power(GateName::X, 4).unwrap();
//!
//! let gate = channel.gate(GateName::X).unwrap();
//! gate.write().setup_alpha(channel.id(), &[
//!     0.1, -0.01, -1.0, -10.0, -10.0,
//!     0.125, 0.0, 0.0, 0.0, 80.0,
//!     150.0, -30.0, 120.0,
//! ]).unwrap();
//!
//! let tick = TickInfo { time: 0.0, dt: 0.01 };
//! channel.handle_vm(0.0);
//! channel.reinit(&tick).unwrap();
//! let output = channel.process(&tick).unwrap();
//! assert!(output.gk > 0.0);
//! ```

use std::sync::Arc;
use log::warn;
use parking_lot::RwLock;
use crate::error::ChannelError;
use crate::gate::{
    ChannelId, GateId, GateKinetics, TabulatedGate,
    formula::FormulaGate,
};

pub mod two_dim;

/// Instant bit for the X gate
pub const INSTANT_X: u8 = 1;
/// Instant bit for the Y gate
pub const INSTANT_Y: u8 = 2;
/// Instant bit for the Z gate
pub const INSTANT_Z: u8 = 4;

/// A reinit refuses to seed a gate whose B value falls below this
pub const REINIT_EPSILON: f64 = 1e-15;

/// Names of the three gate slots
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GateName {
    X,
    Y,
    Z,
}

impl GateName {
    /// All slots in order
    pub const ALL: [GateName; 3] = [GateName::X, GateName::Y, GateName::Z];

    /// Converts name to string
    pub fn to_str(&self) -> &str {
        match self {
            GateName::X => "X",
            GateName::Y => "Y",
            GateName::Z => "Z",
        }
    }

    fn index(&self) -> usize {
        match self {
            GateName::X => 0,
            GateName::Y => 1,
            GateName::Z => 2,
        }
    }

    fn instant_bit(&self) -> u8 {
        match self {
            GateName::X => INSTANT_X,
            GateName::Y => INSTANT_Y,
            GateName::Z => INSTANT_Z,
        }
    }
}

/// One simulator tick as delivered by the scheduler
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickInfo {
    /// Current simulation time (s)
    pub time: f64,
    /// Timestep (s)
    pub dt: f64,
}

/// Conductance and current emitted to the compartment after a step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelOutput {
    /// Channel conductance (S)
    pub gk: f64,
    /// Reversal potential (V)
    pub ek: f64,
    /// Driven current (A)
    pub ik: f64,
}

/// Who advances the channel state on each tick
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChannelDriver {
    /// The channel integrates its own gates on `process`
    SelfStepping,
    /// A solver owns the state, `process` and `reinit` are skipped
    SolverDriven,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ChannelPhase {
    Empty,
    Configured,
    Running,
}

/// Advances a gate state by one timestep with the exponential Euler rule,
/// the standard Hodgkin-Huxley integrator. Stable across the full range of
/// B values produced by realistic channels.
pub fn integrate(state: f64, dt: f64, a: f64, b: f64) -> f64 {
    let x = 2.0 / dt;
    (state * (x - b) + 2.0 * a) / (x + b)
}

/// Raises a gate state to its integer power, with repeated multiplication
/// on the hot small powers
pub fn take_power(state: f64, power: u32) -> f64 {
    match power {
        0 => 1.0,
        1 => state,
        2 => state * state,
        3 => state * state * state,
        4 => {
            let squared = state * state;
            squared * squared
        }
        _ => state.powi(power as i32),
    }
}

struct GateSlot<G> {
    power: u32,
    state: f64,
    inited: bool,
    gate: Option<Arc<RwLock<G>>>,
}

impl<G> Default for GateSlot<G> {
    fn default() -> Self {
        GateSlot {
            power: 0,
            state: 0.0,
            inited: false,
            gate: None,
        }
    }
}

impl<G> Clone for GateSlot<G> {
    fn clone(&self) -> Self {
        GateSlot {
            power: self.power,
            state: self.state,
            inited: self.inited,
            gate: self.gate.clone(),
        }
    }
}

/// An ion channel over a single input variable, generic over the gate
/// backing. [`TabulatedChannel`] queries precomputed tables,
/// [`FormulaChannel`] evaluates rate expressions on every step.
pub struct IonChannel<G: GateKinetics> {
    id: ChannelId,
    gbar: f64,
    ek: f64,
    gk: f64,
    ik: f64,
    vm: f64,
    modulation: f64,
    instant: u8,
    driver: ChannelDriver,
    phase: ChannelPhase,
    warned_unordered: bool,
    slots: [GateSlot<G>; 3],
}

/// Channel whose gates look up precomputed tables
pub type TabulatedChannel = IonChannel<TabulatedGate>;

/// Channel whose gates evaluate rate expressions per step
pub type FormulaChannel = IonChannel<FormulaGate>;

impl<G: GateKinetics> Default for IonChannel<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GateKinetics> Clone for IonChannel<G> {
    /// Copies of a channel share the original's gates. The copy gets its own
    /// id, so mutating gate operations routed through it are refused.
    fn clone(&self) -> Self {
        IonChannel {
            id: ChannelId::generate(),
            gbar: self.gbar,
            ek: self.ek,
            gk: self.gk,
            ik: self.ik,
            vm: self.vm,
            modulation: self.modulation,
            instant: self.instant,
            driver: self.driver,
            phase: self.phase,
            warned_unordered: self.warned_unordered,
            slots: self.slots.clone(),
        }
    }
}

impl<G: GateKinetics> IonChannel<G> {
    /// Creates an empty channel with no gates attached
    pub fn new() -> Self {
        IonChannel {
            id: ChannelId::generate(),
            gbar: 0.0,
            ek: 0.0,
            gk: 0.0,
            ik: 0.0,
            vm: 0.0,
            modulation: 1.0,
            instant: 0,
            driver: ChannelDriver::SelfStepping,
            phase: ChannelPhase::Empty,
            warned_unordered: false,
            slots: [
                GateSlot::default(),
                GateSlot::default(),
                GateSlot::default(),
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

    /// Last voltage presented (V)
    pub fn vm(&self) -> f64 {
        self.vm
    }

    /// Incoming voltage from the compartment (V)
    pub fn handle_vm(&mut self, vm: f64) {
        self.vm = vm;
    }

    /// Multiplicative conductance scaling supplied by collaborators,
    /// defaults to 1
    pub fn set_modulation(&mut self, modulation: f64) {
        self.modulation = modulation;
    }

    /// Bitmask of gates clamped to their steady state `A/B` each step
    /// instead of integrated, see [`INSTANT_X`]
    pub fn set_instant(&mut self, instant: u8) {
        self.instant = instant;
    }

    /// Who advances the channel, see [`ChannelDriver`]
    pub fn set_driver(&mut self, driver: ChannelDriver) {
        self.driver = driver;
    }

    /// Integer power of the named gate
    pub fn power(&self, name: GateName) -> u32 {
        self.slots[name.index()].power
    }

    /// Sets the power of the named gate. Raising a power above zero on an
    /// empty slot allocates a new gate owned by this channel, dropping it to
    /// zero destroys the attached gate. Both are refused through a copy.
    pub fn set_power(&mut self, name: GateName, power: u32) -> Result<(), ChannelError> {
        let slot = &mut self.slots[name.index()];
        if slot.power == power {
            return Ok(());
        }

        if power > 0 {
            if let Some(gate) = &slot.gate {
                if !gate.read().is_original(self.id) {
                    warn!(
                        "IonChannel: changing {} power not allowed from a copied channel",
                        name.to_str(),
                    );
                    return Err(ChannelError::NotOriginal(format!(
                        "{}power", name.to_str(),
                    )));
                }
            } else {
                slot.gate = Some(Arc::new(RwLock::new(G::attach(
                    self.id,
                    GateId::generate(),
                ))));
            }
        } else if let Some(gate) = &slot.gate {
            if !gate.read().is_original(self.id) {
                warn!(
                    "IonChannel: destroying gate {} not allowed from a copied channel",
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
        if self.phase == ChannelPhase::Empty {
            self.phase = ChannelPhase::Configured;
        }
        Ok(())
    }

    /// Shared handle to the named gate, if one is attached
    pub fn gate(&self, name: GateName) -> Option<Arc<RwLock<G>>> {
        self.slots[name.index()].gate.clone()
    }

    /// State variable of the named gate, the open fraction in [0, 1]
    pub fn state(&self, name: GateName) -> f64 {
        self.slots[name.index()].state
    }

    /// Seeds the named gate's state ahead of `reinit`, which then keeps
    /// this value instead of the steady state
    pub fn set_initial_state(&mut self, name: GateName, state: f64) {
        let slot = &mut self.slots[name.index()];
        slot.state = state;
        slot.inited = true;
    }

    fn output(&self) -> ChannelOutput {
        ChannelOutput {
            gk: self.gk,
            ek: self.ek,
            ik: self.ik,
        }
    }

    /// Advances all active gates by one tick and recomputes `Gk` and `Ik`.
    /// Skipped when a solver drives the channel.
    pub fn process(&mut self, tick: &TickInfo) -> Result<ChannelOutput, ChannelError> {
        if self.driver == ChannelDriver::SolverDriven {
            return Ok(self.output());
        }
        if self.phase != ChannelPhase::Running && !self.warned_unordered {
            warn!("IonChannel: process called before reinit");
            self.warned_unordered = true;
        }

        let vm = self.vm;
        let instant = self.instant;
        let mut g = self.gbar;

        for (name, slot) in GateName::ALL.iter().zip(self.slots.iter_mut()) {
            if slot.power == 0 {
                continue;
            }
            let gate = slot
                .gate
                .as_ref()
                .ok_or_else(|| ChannelError::MissingGate(name.to_str().to_string()))?;

            let (a, b) = gate.read().lookup_both(vm)?;
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

    /// Resets the channel to its initial state: fills any stale gate tables,
    /// seeds each gate state with its steady state `A/B` unless pre-seeded,
    /// and recomputes `Gk` and `Ik`. Refuses with a warning when a gate's B
    /// value is effectively zero at the current voltage.
    pub fn reinit(&mut self, _tick: &TickInfo) -> Result<ChannelOutput, ChannelError> {
        if self.driver == ChannelDriver::SolverDriven {
            return Ok(self.output());
        }

        let vm = self.vm;
        let mut g = self.gbar;

        for (name, slot) in GateName::ALL.iter().zip(self.slots.iter_mut()) {
            if slot.power == 0 {
                continue;
            }
            let gate = slot
                .gate
                .as_ref()
                .ok_or_else(|| ChannelError::MissingGate(name.to_str().to_string()))?;

            let (a, b) = {
                let mut gate = gate.write();
                gate.prepare()?;
                gate.lookup_both(vm)?
            };
            if b < REINIT_EPSILON {
                warn!(
                    "IonChannel: B value for gate {} is ~0, check the gate tables",
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
        self.phase = ChannelPhase::Running;
        Ok(self.output())
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_take_power_matches_powi() {
        for power in 0..8 {
            let value = take_power(0.73, power);
            assert!((value - 0.73_f64.powi(power as i32)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_integrate_fixed_point() {
        // the steady state A/B is a fixed point of the update
        let a = 120.0;
        let b = 400.0;
        let state = a / b;
        assert!((integrate(state, 1e-4, a, b) - state).abs() < 1e-12);
    }

    #[test]
    fn test_gate_lifecycle() {
        let mut channel = TabulatedChannel::new();
        assert!(channel.gate(GateName::X).is_none());

        channel.set_power(GateName::X, 3).unwrap();
        assert!(channel.gate(GateName::X).is_some());
        assert_eq!(channel.power(GateName::X), 3);

        channel.set_power(GateName::X, 0).unwrap();
        assert!(channel.gate(GateName::X).is_none());
    }

    #[test]
    fn test_copy_shares_gate() {
        let mut channel = TabulatedChannel::new();
        channel.set_power(GateName::X, 1).unwrap();

        let copy = channel.clone();
        assert!(channel.is_original());
        assert!(!copy.is_original());

        let original_gate = channel.gate(GateName::X).unwrap();
        let copied_gate = copy.gate(GateName::X).unwrap();
        assert!(Arc::ptr_eq(&original_gate, &copied_gate));
    }
}
