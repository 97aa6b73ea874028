#[cfg(test)]
mod test {
    use std::sync::Arc;
    use channel_gating::channel::{GateName, TabulatedChannel, TickInfo};
    use channel_gating::error::GateError;
    use channel_gating::gate::{GateForm, GateKinetics};


    const N_ALPHA: &str = "0.01 * (10.0 - v) / (exp((10.0 - v) / 10.0) - 1.0)";
    const N_BETA: &str = "0.125 * exp(-v / 80.0)";

    fn configured_channel() -> TabulatedChannel {
        let mut channel = TabulatedChannel::new();
        channel.set_gbar(36.0);
        channel.set_power(GateName::X, 4).unwrap();

        let gate = channel.gate(GateName::X).unwrap();
        let mut gate = gate.write();
        gate.set_min(channel.id(), -30.0).unwrap();
        gate.set_max(channel.id(), 120.0).unwrap();
        gate.set_divs(channel.id(), 150).unwrap();
        gate.set_alpha_expr(channel.id(), N_ALPHA).unwrap();
        gate.set_beta_expr(channel.id(), N_BETA).unwrap();
        gate.fill_tables().unwrap();
        drop(gate);

        channel
    }

    // everything observable about the gate, for bit identical comparisons
    fn snapshot(channel: &TabulatedChannel) -> (Vec<f64>, Vec<f64>, f64, f64, usize, GateForm, Option<String>, Option<String>) {
        let gate = channel.gate(GateName::X).unwrap();
        let gate = gate.read();
        (
            gate.table_a().to_vec(),
            gate.table_b().to_vec(),
            gate.min(),
            gate.max(),
            gate.divs(),
            gate.form(),
            gate.alpha_expr().map(String::from),
            gate.beta_expr().map(String::from),
        )
    }

    #[test]
    fn test_copy_shares_the_original_tables() {
        let channel = configured_channel();
        let copy = channel.clone();

        let original_gate = channel.gate(GateName::X).unwrap();
        let copied_gate = copy.gate(GateName::X).unwrap();
        assert!(Arc::ptr_eq(&original_gate, &copied_gate));

        // lookups through both see the same values
        let through_original = original_gate.read().lookup_both(20.0).unwrap();
        let through_copy = copied_gate.read().lookup_both(20.0).unwrap();
        assert_eq!(through_original, through_copy);
    }

    #[test]
    fn test_mutation_through_copy_is_refused_bit_identically() {
        let channel = configured_channel();
        let copy = channel.clone();
        let before = snapshot(&channel);

        let gate = copy.gate(GateName::X).unwrap();

        assert!(matches!(
            gate.write().set_alpha_expr(copy.id(), "1.0"),
            Err(GateError::NotOriginal(_))
        ));
        assert!(gate.write().set_divs(copy.id(), 10).is_err());
        assert!(gate.write().set_min(copy.id(), -50.0).is_err());
        assert!(gate.write().set_max(copy.id(), 80.0).is_err());
        assert!(gate.write().set_table_a(copy.id(), vec![1.0, 2.0]).is_err());
        assert!(gate.write().set_use_interpolation(copy.id(), true).is_err());
        assert!(gate
            .write()
            .setup_alpha(copy.id(), &[
                0.1, -0.01, -1.0, -10.0, -10.0,
                0.125, 0.0, 0.0, 0.0, 80.0,
                150.0, -30.0, 120.0,
            ])
            .is_err());

        assert_eq!(snapshot(&channel), before);
        assert_eq!(snapshot(&copy), before);
    }

    #[test]
    fn test_mutation_through_original_is_visible_through_copy() {
        let channel = configured_channel();
        let copy = channel.clone();

        let gate = channel.gate(GateName::X).unwrap();
        gate.write().set_beta_expr(channel.id(), "0.25 * exp(-v / 80.0)").unwrap();
        gate.write().fill_tables().unwrap();

        let copied_gate = copy.gate(GateName::X).unwrap();
        assert_eq!(
            copied_gate.read().beta_expr(),
            Some("0.25 * exp(-v / 80.0)")
        );
        assert_eq!(snapshot(&channel), snapshot(&copy));
    }

    #[test]
    fn test_copy_cannot_destroy_or_reallocate_gates() {
        let channel = configured_channel();
        let mut copy = channel.clone();

        // dropping the power to zero through the copy is refused
        assert!(copy.set_power(GateName::X, 0).is_err());
        assert!(copy.gate(GateName::X).is_some());
        assert_eq!(copy.power(GateName::X), 4);

        // and so is changing it while a shared gate is attached
        assert!(copy.set_power(GateName::X, 2).is_err());
        assert_eq!(copy.power(GateName::X), 4);
    }

    #[test]
    fn test_copy_steps_independently() {
        let channel = configured_channel();
        let mut original = channel;
        let mut copy = original.clone();

        let tick = TickInfo { time: 0.0, dt: 0.01 };
        original.handle_vm(0.0);
        copy.handle_vm(0.0);
        original.reinit(&tick).unwrap();
        copy.reinit(&tick).unwrap();

        // drive only the copy, the original's state is untouched
        copy.handle_vm(40.0);
        for _ in 0..100 {
            copy.process(&tick).unwrap();
        }

        assert!(copy.state(GateName::X) > original.state(GateName::X));
        assert_eq!(
            snapshot(&original).0,
            snapshot(&copy).0,
        );
    }
}
