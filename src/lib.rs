//! # Channel Gating
//!
//! `channel_gating` is the Hodgkin-Huxley gating core of a multi-scale
//! neuronal simulator: voltage and concentration dependent ion channel gates,
//! their kinetic parameters supplied either as precomputed lookup tables or
//! as compiled rate expressions, and the per-step integration that hands a
//! containing compartment solver the channel conductance. Gates follow the
//! `(A, B)` convention where `A` is the forward rate alpha and `B` is
//! `alpha + beta`, with tau and steady state parameterisations transformed
//! into the same pair, so a channel can integrate every gate with one rule.
//!
//! ## Example Code
//!
//! ### Squid K+ channel from the canonical parametric form
//!
//! ```rust
//! use channel_gating::channel::{GateName, TabulatedChannel, TickInfo};
//!
//! // n gate of the Hodgkin and Huxley K+ channel, voltages in mV
//! // relative to rest as in the 1952 papers
//! let mut channel = TabulatedChannel::new();
//! channel.set_gbar(36.0);
//! channel.set_ek(-12.0);
//! channel.set_power(GateName::X, 4).unwrap();
//!
//! let gate = channel.gate(GateName::X).unwrap();
//! gate.write().setup_alpha(channel.id(), &[
//!     // alpha: 0.01 * (10 - v) / (exp((10 - v) / 10) - 1)
//!     0.1, -0.01, -1.0, -10.0, -10.0,
//!     // beta: 0.125 * exp(-v / 80)
//!     0.125, 0.0, 0.0, 0.0, 80.0,
//!     // divs, min, max
//!     150.0, -30.0, 120.0,
//! ]).unwrap();
//! gate.write().set_use_interpolation(channel.id(), true).unwrap();
//!
//! let tick = TickInfo { time: 0.0, dt: 0.01 };
//! channel.handle_vm(0.0);
//! channel.reinit(&tick).unwrap();
//!
//! // clamp to 25 mV above rest and let the gate respond
//! channel.handle_vm(25.0);
//! for _ in 0..1000 {
//!     let output = channel.process(&tick).unwrap();
//!     assert!(output.gk >= 0.0);
//! }
//! ```
//!
//! ### Gate rates from expressions
//!
//! Formula backed gates compile their expressions once and either fill the
//! lookup tables over the input grid or evaluate per query. The input
//! variable is `v` (plus `c` on two input gates) and the helpers `alpha`,
//! `beta`, `tau` and `inf` are writable inside the expression for staged
//! conditional rate laws:
//!
//! ```rust
//! use channel_gating::channel::{GateName, TabulatedChannel};
//!
//! let mut channel = TabulatedChannel::new();
//! channel.set_power(GateName::X, 1).unwrap();
//!
//! let gate = channel.gate(GateName::X).unwrap();
//! let mut gate = gate.write();
//! gate.set_alpha_expr(
//!     channel.id(),
//!     "alpha = 0.3 * exp(-80.0 * (v - -46e-3)) + 3.5; alpha < 3.8 ? 3.8 : alpha",
//! ).unwrap();
//! gate.set_beta_expr(channel.id(), "0.75 * exp(-55.0 * v)").unwrap();
//! gate.set_min(channel.id(), -0.1).unwrap();
//! gate.set_max(channel.id(), 0.05).unwrap();
//! gate.set_divs(channel.id(), 3000).unwrap();
//! gate.fill_tables().unwrap();
//!
//! let a = gate.lookup_a(-0.065).unwrap();
//! let b = gate.lookup_b(-0.065).unwrap();
//! assert!(a > 0.0 && b > a);
//! ```
//!
//! ### Channels over voltage and concentration
//!
//! Two input channels route their external inputs to the gate variables
//! through per gate input indices:
//!
//! ```rust
//! use channel_gating::channel::{GateName, TickInfo};
//! use channel_gating::channel::two_dim::{InputIndex, IonChannel2D};
//!
//! let mut channel = IonChannel2D::new();
//! channel.set_gbar(1.0);
//! channel.set_power(GateName::Z, 1).unwrap();
//! channel.set_input_index(GateName::Z, InputIndex::VoltC1);
//!
//! let gate = channel.gate(GateName::Z).unwrap();
//! gate.write().set_alpha_expr(
//!     channel.id(),
//!     "1500.0 / (1.0 + (c / 1.5e-4 * exp(-77.0 * v)))",
//! ).unwrap();
//! gate.write().set_beta_expr(channel.id(), "20.0").unwrap();
//!
//! channel.handle_vm(-0.05);
//! channel.handle_conc1(1e-4);
//! let tick = TickInfo { time: 0.0, dt: 1e-4 };
//! channel.reinit(&tick).unwrap();
//! channel.process(&tick).unwrap();
//! ```
//!
//! Copies of a channel share the original's gates and may only read them,
//! mutating operations present the calling channel's id and are refused
//! unless it matches the owner.

pub mod channel;
pub mod error;
pub mod expression;
pub mod gate;
