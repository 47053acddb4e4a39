//! Snapshot capture/restore preserves observable dynamics.

use spikelab_core::{run_episode, EmaDetector, Network, NeuronSpec, ScheduleTimeline};

fn build_net() -> Network {
    let mut net = Network::new();
    net.add_neuron(NeuronSpec::new("S0", 0.5, 1.0, 0.0)).unwrap();
    net.add_neuron(NeuronSpec::new("S1", 0.5, 1.0, 0.0)).unwrap();
    net.add_neuron(NeuronSpec::new("H0", 1.5, 0.8, 0.0)).unwrap();
    net.add_neuron(NeuronSpec::new("O0", 1.0, 1.0, 0.0)).unwrap();
    net.add_neuron(NeuronSpec::new("O1", 1.0, 1.0, 0.0)).unwrap();
    net.add_edge("S0", "H0", 2.0).unwrap();
    net.add_edge("S1", "H0", 0.4).unwrap();
    net.add_edge("H0", "O0", 1.2).unwrap();
    net.add_edge("H0", "O1", -0.6).unwrap();
    net
}

fn drive(net: &mut Network) -> (Vec<f32>, Option<String>) {
    let mut timeline = ScheduleTimeline::new();
    for t in 0..60 {
        timeline.push_event(t, "S0", 2.0);
        if t % 3 == 0 {
            timeline.push_event(t, "S1", 1.0);
        }
    }
    let mut detector = EmaDetector::new(0.05).with_threshold(0.01);
    let metrics = run_episode(net, &mut timeline, &mut detector, 10, 50);
    let rates = metrics.rates.values().copied().collect();
    (rates, metrics.winner)
}

#[test]
fn restored_network_behaves_identically() {
    let reference = build_net();
    let snapshot = reference.capture();

    // A fresh copy whose weights and parameters have been perturbed.
    let mut perturbed = build_net();
    perturbed.set_weight("S0", "H0", 0.01).unwrap();
    perturbed.remove_edge("H0", "O1");
    perturbed.add_edge("S1", "O1", 3.0).unwrap();
    perturbed.neuron_mut("H0").unwrap().set_threshold(9.0);

    perturbed.restore(&snapshot);
    assert_eq!(perturbed.capture(), snapshot);

    let mut original = build_net();
    let (rates_a, winner_a) = drive(&mut original);
    let (rates_b, winner_b) = drive(&mut perturbed);
    assert_eq!(winner_a, winner_b);
    for (a, b) in rates_a.iter().zip(rates_b.iter()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn snapshot_edge_order_is_deterministic() {
    let a = build_net().capture();
    let b = build_net().capture();
    assert_eq!(a, b);

    let json_a = serde_json::to_string(&a).unwrap();
    let json_b = serde_json::to_string(&b).unwrap();
    assert_eq!(json_a, json_b);
}
