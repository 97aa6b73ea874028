#[cfg(test)]
mod test {
    use rand::Rng;
    use channel_gating::error::GateError;
    use channel_gating::gate::{ChannelId, GateId, GateKinetics, TabulatedGate};


    fn direct_gate(table_a: Vec<f64>, table_b: Vec<f64>) -> (ChannelId, TabulatedGate) {
        let owner = ChannelId::generate();
        let mut gate = TabulatedGate::new(owner, GateId::generate());
        gate.set_table_a(owner, table_a).unwrap();
        gate.set_table_b(owner, table_b).unwrap();
        (owner, gate)
    }

    #[test]
    fn test_endpoints_clamp() {
        let (_, gate) = direct_gate(
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![10.0, 20.0, 30.0, 40.0, 50.0],
        );

        // default grid is [0, 1]
        assert_eq!(gate.lookup_both(0.0).unwrap(), (1.0, 10.0));
        assert_eq!(gate.lookup_both(1.0).unwrap(), (5.0, 50.0));

        // out of range inputs clamp to the end entries
        assert_eq!(gate.lookup_both(-100.0).unwrap(), (1.0, 10.0));
        assert_eq!(gate.lookup_both(100.0).unwrap(), (5.0, 50.0));
    }

    #[test]
    fn test_direct_index_rule() {
        let (_, gate) = direct_gate(
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![10.0, 20.0, 30.0, 40.0, 50.0],
        );
        let inv_dx = 4.0;

        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let v: f64 = rng.gen_range(0.0001..0.9999);
            let index = (v * inv_dx) as usize;

            let (a, b) = gate.lookup_both(v).unwrap();
            assert_eq!(a, gate.table_a()[index]);
            assert_eq!(b, gate.table_b()[index]);
        }
    }

    #[test]
    fn test_interpolation_is_convex() {
        let (owner, mut gate) = direct_gate(
            vec![1.0, 5.0, 2.0, 8.0, 3.0],
            vec![10.0, 50.0, 20.0, 80.0, 30.0],
        );
        gate.set_use_interpolation(owner, true).unwrap();
        let inv_dx = 4.0;

        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let v: f64 = rng.gen_range(0.0001..0.9999);
            let index = ((v * inv_dx) as usize).min(3);

            let (a, _) = gate.lookup_both(v).unwrap();
            let low = gate.table_a()[index].min(gate.table_a()[index + 1]);
            let high = gate.table_a()[index].max(gate.table_a()[index + 1]);
            assert!(a >= low - 1e-12 && a <= high + 1e-12);
        }
    }

    #[test]
    fn test_interpolation_hits_grid_points() {
        let (owner, mut gate) = direct_gate(
            vec![1.0, 5.0, 2.0, 8.0, 3.0],
            vec![10.0, 50.0, 20.0, 80.0, 30.0],
        );
        gate.set_use_interpolation(owner, true).unwrap();

        for i in 0..5 {
            let v = i as f64 * 0.25;
            let (a, b) = gate.lookup_both(v).unwrap();
            assert!((a - gate.table_a()[i]).abs() < 1e-12);
            assert!((b - gate.table_b()[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_interpolation_midpoint() {
        let (owner, mut gate) = direct_gate(vec![0.0, 1.0], vec![2.0, 4.0]);
        gate.set_use_interpolation(owner, true).unwrap();

        let (a, b) = gate.lookup_both(0.5).unwrap();
        assert!((a - 0.5).abs() < 1e-12);
        assert!((b - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let owner = ChannelId::generate();
        let mut gate = TabulatedGate::new(owner, GateId::generate());
        gate.set_table_a(owner, vec![1.0, 2.0, 3.0]).unwrap();

        let result = gate.set_table_b(owner, vec![1.0, 2.0]);
        assert!(matches!(result, Err(GateError::ShapeMismatch { .. })));

        // prior state untouched
        assert_eq!(gate.table_a(), &[1.0, 2.0, 3.0]);
        gate.set_table_b(owner, vec![10.0, 20.0, 30.0]).unwrap();
        assert_eq!(gate.lookup_both(0.5).unwrap(), (2.0, 20.0));
    }

    #[test]
    fn test_query_unconfigured_gate_rejected() {
        let gate = TabulatedGate::new(ChannelId::generate(), GateId::generate());
        assert!(gate.lookup_both(0.5).is_err());
    }

    #[test]
    fn test_direct_table_resize_resamples() {
        // a linear table stays exact under linear re-sampling
        let (owner, mut gate) = direct_gate(
            (0..=10).map(|i| i as f64).collect(),
            (0..=10).map(|i| 2.0 * i as f64).collect(),
        );

        gate.set_divs(owner, 20).unwrap();
        assert_eq!(gate.divs(), 20);
        for (i, entry) in gate.table_a().iter().enumerate() {
            assert!((entry - i as f64 / 2.0).abs() < 1e-12);
        }
        for (i, entry) in gate.table_b().iter().enumerate() {
            assert!((entry - i as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn test_range_change_resamples_direct_table() {
        // halving the range of a linear table keeps it linear over the
        // surviving half
        let (owner, mut gate) = direct_gate(
            (0..=10).map(|i| i as f64).collect(),
            (0..=10).map(|i| i as f64).collect(),
        );

        gate.set_max(owner, 0.5).unwrap();
        assert_eq!(gate.divs(), 10);
        for (i, entry) in gate.table_a().iter().enumerate() {
            assert!((entry - i as f64 / 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_out_of_range_config_rejected() {
        let owner = ChannelId::generate();
        let mut gate = TabulatedGate::new(owner, GateId::generate());

        assert!(matches!(
            gate.set_divs(owner, 0),
            Err(GateError::OutOfConfigRange(_))
        ));
        // min above the current max
        assert!(matches!(
            gate.set_min(owner, 2.0),
            Err(GateError::OutOfConfigRange(_))
        ));
        // max below the current min
        assert!(matches!(
            gate.set_max(owner, -1.0),
            Err(GateError::OutOfConfigRange(_))
        ));
        assert!(matches!(
            gate.set_table_a(owner, vec![1.0]),
            Err(GateError::OutOfConfigRange(_))
        ));
    }
}
