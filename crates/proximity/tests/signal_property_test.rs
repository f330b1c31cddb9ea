// Property-based tests for RSSI smoothing and the connect gate

use proptest::prelude::*;
use proximity::{
    ConnectionController, LinkAction, LinkEvent, ProximitySample, SignalConfig, SignalFilter,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

fn samples(values: &[i16]) -> Vec<ProximitySample> {
    let start = Instant::now();
    values
        .iter()
        .enumerate()
        .map(|(i, v)| ProximitySample::new(*v, start + Duration::from_millis(100 * i as u64)))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A constant valid reading saturates the stability counter at the
    /// configured requirement
    #[test]
    fn prop_constant_input_saturates(rssi in -100i16..=0i16, count in 1usize..40) {
        let config = SignalConfig::default();
        let required = config.required_stable_readings;
        let mut filter = SignalFilter::new(config);

        let mut last = None;
        for sample in samples(&vec![rssi; count]) {
            last = filter.observe(sample);
        }
        let decision = last.unwrap();

        let expected = ((count - 1) as u32).min(required);
        prop_assert_eq!(decision.stable_readings, expected);
        prop_assert!(decision.stable_readings <= required);
        prop_assert!((decision.smoothed - f64::from(rssi)).abs() < 1e-9);
    }

    /// Invalid readings never move the filter
    #[test]
    fn prop_invalid_samples_leave_state(
        prefix in proptest::collection::vec(-100i16..=0i16, 0..10),
        invalid in prop_oneof![Just(127i16), 1i16..=126i16],
    ) {
        let mut filter = SignalFilter::default();
        for sample in samples(&prefix) {
            filter.observe(sample);
        }
        let before = filter.current();
        prop_assert!(filter.observe(ProximitySample::now(invalid)).is_none());
        prop_assert_eq!(filter.current(), before);
    }

    /// The smoothed value stays within the range of the valid readings seen
    #[test]
    fn prop_smoothed_is_bounded(values in proptest::collection::vec(-100i16..=0i16, 1..50)) {
        let mut filter = SignalFilter::default();
        for sample in samples(&values) {
            filter.observe(sample);
        }
        let min = f64::from(*values.iter().min().unwrap());
        let max = f64::from(*values.iter().max().unwrap());
        let value = filter.current().value;
        prop_assert!(value >= min - 1e-9 && value <= max + 1e-9);
    }

    /// However many discoveries arrive, a link attempt is issued at most
    /// once until that attempt resolves
    #[test]
    fn prop_single_connect_in_flight(
        readings in proptest::collection::vec((0usize..3, -60i16..=0i16), 1..80),
    ) {
        let peers = ["merchant-a", "merchant-b", "merchant-c"];
        let mut controller = ConnectionController::new(SignalConfig::default());
        controller.start_scanning();

        let start = Instant::now();
        let mut connects = 0;
        for (i, (peer, rssi)) in readings.into_iter().enumerate() {
            let actions = controller.handle(LinkEvent::Discovered {
                peer: peers[peer].to_string(),
                sample: ProximitySample::new(rssi, start + Duration::from_millis(20 * i as u64)),
            });
            connects += actions
                .iter()
                .filter(|a| matches!(a, LinkAction::Connect(_)))
                .count();
        }
        prop_assert!(connects <= 1);
    }

    /// A connection only ever targets a peer whose own readings passed the
    /// strength bound and the stable run, whatever the other peers reported
    #[test]
    fn prop_connect_targets_ready_peer(
        readings in proptest::collection::vec((0usize..3, -60i16..=0i16), 1..80),
    ) {
        let peers = ["merchant-a", "merchant-b", "merchant-c"];
        let mut controller = ConnectionController::new(SignalConfig::default());
        controller.start_scanning();
        let mut reference: HashMap<&str, SignalFilter> = HashMap::new();

        let start = Instant::now();
        for (i, (peer, rssi)) in readings.into_iter().enumerate() {
            let sample = ProximitySample::new(rssi, start + Duration::from_millis(20 * i as u64));
            let own = reference
                .entry(peers[peer])
                .or_insert_with(SignalFilter::default)
                .observe(sample)
                .unwrap();
            let actions = controller.handle(LinkEvent::Discovered {
                peer: peers[peer].to_string(),
                sample,
            });
            for action in actions {
                if let LinkAction::Connect(target) = action {
                    prop_assert_eq!(target.as_str(), peers[peer]);
                    prop_assert!(own.connect_ready);
                }
            }
        }
    }
}
