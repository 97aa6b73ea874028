#[cfg(test)]
mod test {
    use channel_gating::channel::{
        ChannelDriver, GateName, TabulatedChannel, TickInfo, INSTANT_X,
    };
    use channel_gating::error::ChannelError;


    const TICK: TickInfo = TickInfo { time: 0.0, dt: 1e-4 };

    // a gate with constant rates A = 5e3, B = 1e4, steady state 0.5
    fn constant_rate_channel() -> TabulatedChannel {
        let mut channel = TabulatedChannel::new();
        channel.set_gbar(1.0);
        channel.set_power(GateName::X, 1).unwrap();

        let gate = channel.gate(GateName::X).unwrap();
        gate.write().set_table_a(channel.id(), vec![5e3, 5e3]).unwrap();
        gate.write().set_table_b(channel.id(), vec![1e4, 1e4]).unwrap();

        channel.handle_vm(0.5);
        channel
    }

    #[test]
    fn test_exponential_euler_approaches_steady_state() {
        let mut channel = constant_rate_channel();

        // start the gate fully closed
        channel.set_initial_state(GateName::X, 0.0);
        channel.reinit(&TICK).unwrap();

        // with B peaking at 1e4 per second and dt of 1e-4 s the update must
        // approach A/B monotonically to within 1% in at most 10 steps
        let target = 0.5;
        let mut previous = 0.0;
        let mut converged_at = None;
        for step in 1..=10 {
            channel.process(&TICK).unwrap();
            let state = channel.state(GateName::X);

            assert!(state > previous, "not monotone at step {}", step);
            assert!(state < target + 1e-12);
            previous = state;

            if converged_at.is_none() && (state - target).abs() < 0.01 * target {
                converged_at = Some(step);
            }
        }

        assert!(converged_at.is_some(), "did not converge within 10 steps");
    }

    #[test]
    fn test_instant_gate_takes_steady_state() {
        let mut channel = constant_rate_channel();
        channel.set_instant(INSTANT_X);
        channel.set_initial_state(GateName::X, 0.0);
        channel.reinit(&TICK).unwrap();

        channel.process(&TICK).unwrap();
        assert!((channel.state(GateName::X) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_reinit_seeds_steady_state() {
        let mut channel = constant_rate_channel();
        channel.reinit(&TICK).unwrap();

        assert!((channel.state(GateName::X) - 0.5).abs() < 1e-12);
        assert!((channel.gk() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_reinit_keeps_preseeded_state() {
        let mut channel = constant_rate_channel();
        channel.set_initial_state(GateName::X, 0.25);
        channel.reinit(&TICK).unwrap();

        assert!((channel.state(GateName::X) - 0.25).abs() < 1e-12);
        assert!((channel.gk() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_reinit_refuses_singular_activation() {
        let mut channel = TabulatedChannel::new();
        channel.set_power(GateName::X, 1).unwrap();

        let gate = channel.gate(GateName::X).unwrap();
        gate.write().set_table_a(channel.id(), vec![0.0, 0.0]).unwrap();
        gate.write().set_table_b(channel.id(), vec![0.0, 0.0]).unwrap();

        assert!(matches!(
            channel.reinit(&TICK),
            Err(ChannelError::SingularActivation(_))
        ));
    }

    #[test]
    fn test_power_composition() {
        let mut channel = TabulatedChannel::new();
        channel.set_gbar(2.0);
        channel.set_power(GateName::X, 3).unwrap();
        channel.set_power(GateName::Y, 1).unwrap();

        for name in [GateName::X, GateName::Y] {
            let gate = channel.gate(name).unwrap();
            gate.write().set_table_a(channel.id(), vec![5e3, 5e3]).unwrap();
            gate.write().set_table_b(channel.id(), vec![1e4, 1e4]).unwrap();
        }

        channel.handle_vm(0.5);
        channel.reinit(&TICK).unwrap();

        // Gk = gbar * X^3 * Y = 2 * 0.125 * 0.5
        assert!((channel.gk() - 2.0 * 0.5_f64.powi(3) * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_driven_current() {
        let mut channel = constant_rate_channel();
        channel.set_ek(-0.012);
        channel.reinit(&TICK).unwrap();

        let output = channel.process(&TICK).unwrap();
        assert!((output.ik - (channel.ek() - channel.vm()) * output.gk).abs() < 1e-15);
        // clamped above the reversal potential the current flows inward
        assert!(output.ik < 0.0);
    }

    #[test]
    fn test_modulation_scales_conductance() {
        let mut channel = constant_rate_channel();
        channel.reinit(&TICK).unwrap();
        let baseline = channel.process(&TICK).unwrap().gk;

        channel.set_modulation(0.25);
        let modulated = channel.process(&TICK).unwrap().gk;
        assert!((modulated / baseline - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_solver_driven_channel_skips_stepping() {
        let mut channel = constant_rate_channel();
        channel.set_initial_state(GateName::X, 0.125);
        channel.set_driver(ChannelDriver::SolverDriven);

        channel.reinit(&TICK).unwrap();
        channel.process(&TICK).unwrap();

        // neither call touched the gate state or the outputs
        assert!((channel.state(GateName::X) - 0.125).abs() < 1e-15);
        assert_eq!(channel.gk(), 0.0);

        channel.set_driver(ChannelDriver::SelfStepping);
        channel.reinit(&TICK).unwrap();
        assert!(channel.gk() > 0.0);
    }

    #[test]
    fn test_power_zero_removes_gate_from_product() {
        let mut channel = constant_rate_channel();
        channel.reinit(&TICK).unwrap();
        assert!(channel.gk() > 0.0);

        channel.set_power(GateName::X, 0).unwrap();
        assert!(channel.gate(GateName::X).is_none());

        channel.reinit(&TICK).unwrap();
        // no gates left, the conductance is the bare gbar
        assert!((channel.gk() - channel.gbar()).abs() < 1e-15);
    }

    // Hodgkin and Huxley's K+ channel under voltage clamp, mV and ms units
    // as in the 1952 papers with the resting potential at 0
    #[test]
    fn test_k_channel_voltage_clamp_steady_state() {
        let mut channel = TabulatedChannel::new();
        channel.set_gbar(36.0);
        channel.set_ek(-12.0);
        channel.set_power(GateName::X, 4).unwrap();

        let gate = channel.gate(GateName::X).unwrap();
        gate.write().setup_alpha(channel.id(), &[
            0.1, -0.01, -1.0, -10.0, -10.0,
            0.125, 0.0, 0.0, 0.0, 80.0,
            150.0, -30.0, 120.0,
        ]).unwrap();
        gate.write().set_use_interpolation(channel.id(), true).unwrap();

        let tick = TickInfo { time: 0.0, dt: 0.01 };
        channel.handle_vm(0.0);
        channel.reinit(&tick).unwrap();

        // step the command voltage and let the gate settle
        // the slowest time constant here is ~3.4 ms, run well past it
        let hold = 26.0;
        channel.handle_vm(hold);
        for _ in 0..20_000 {
            channel.process(&tick).unwrap();
        }

        let alpha = 0.01 * (10.0 - hold) / (((10.0 - hold) / 10.0_f64).exp() - 1.0);
        let beta = 0.125 * (-hold / 80.0_f64).exp();
        let n_inf = alpha / (alpha + beta);
        let expected = 36.0 * n_inf.powi(4);

        assert!((channel.gk() - expected).abs() < 1e-6);
    }
}
