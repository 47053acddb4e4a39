//! Spike propagation timing: a path of length k delivers no earlier than t + k.

use spikelab_core::{Network, NeuronSpec};

fn eager(id: &str) -> NeuronSpec {
    NeuronSpec::new(id, 0.5, 1.0, 0.0)
}

#[test]
fn injection_reaches_two_hops_no_earlier_than_t_plus_2() {
    let mut net = Network::new();
    net.add_neuron(eager("S0")).unwrap();
    net.add_neuron(eager("H0")).unwrap();
    net.add_neuron(eager("H1")).unwrap();
    net.add_neuron(eager("O0")).unwrap();
    net.add_edge("S0", "H0", 1.0).unwrap();
    net.add_edge("H0", "H1", 1.0).unwrap();
    net.add_edge("H1", "O0", 1.0).unwrap();

    // Single injection at tick 0; record first firing tick per neuron.
    net.inject("S0", 2.0);
    let mut first_fire = [None::<u32>; 4];
    let ids = ["S0", "H0", "H1", "O0"];
    for t in 0..10u32 {
        net.step();
        for (i, id) in ids.iter().enumerate() {
            if first_fire[i].is_none() && net.neuron(id).unwrap().did_fire() {
                first_fire[i] = Some(t);
            }
        }
    }

    // One tick from injection to the source, then one more per hop.
    assert_eq!(first_fire, [Some(1), Some(2), Some(3), Some(4)]);
}

#[test]
fn membrane_stays_non_negative_every_tick() {
    let mut net = Network::new();
    net.add_neuron(eager("S0")).unwrap();
    net.add_neuron(NeuronSpec::new("H0", 100.0, 1.0, 0.0)).unwrap();
    net.add_neuron(NeuronSpec::new("O0", 100.0, 0.5, 0.0)).unwrap();
    net.add_edge("S0", "H0", -30.0).unwrap();
    net.add_edge("S0", "O0", -5.0).unwrap();
    net.add_edge("H0", "O0", 4.0).unwrap();

    for t in 0..50 {
        if t % 2 == 0 {
            net.inject("S0", 2.0);
        }
        net.step();
        for id in ["S0", "H0", "O0"] {
            assert!(net.neuron(id).unwrap().potential() >= 0.0);
        }
    }
}
