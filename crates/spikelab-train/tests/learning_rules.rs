//! End-to-end behavior of the Hebbian update path: pure-decay training,
//! checkpoint capture, and metric-triggered revert.

use spikelab_core::{Episode, Network, NeuronSpec, ScheduleTimeline};
use spikelab_train::{HebbianTrainer, RewardMode, TrainingConfig};

fn driven_pair(threshold: f32, leak: f32, weight: f32) -> (Network, Episode) {
    let mut net = Network::new();
    net.add_neuron(NeuronSpec::new("S0", 0.5, 1.0, 0.0)).unwrap();
    net.add_neuron(NeuronSpec::new("O0", threshold, leak, 0.0)).unwrap();
    net.add_neuron(NeuronSpec::new("O1", threshold, leak, 0.0)).unwrap();
    net.add_edge("S0", "O0", weight).unwrap();

    let mut timeline = ScheduleTimeline::new();
    for t in 0..70 {
        timeline.push_event(t, "S0", 2.0);
    }
    (net, Episode::new(timeline, "O0"))
}

#[test]
fn zero_reward_training_reduces_to_weight_decay() {
    let (mut net, episode) = driven_pair(0.5, 1.0, 2.0);
    let cfg = TrainingConfig {
        reward_mode: RewardMode::Binary,
        reward_pos: 0.0,
        reward_neg: 0.0,
        use_advantage_baseline: false,
        no_update_if_satisfied: false,
        weight_decay: 0.01,
        prune_epsilon: 0.0,
        checkpoints_enable: false,
        ..Default::default()
    };

    let epochs = 4;
    let mut trainer = HebbianTrainer::new(1);
    trainer.train(&mut net, std::slice::from_ref(&episode), epochs, &cfg);

    // One batch per epoch, so exactly (1 - wd)^epochs.
    let expected = 2.0f32 * (1.0f32 - 0.01).powi(epochs as i32);
    let got = net.weight("S0", "O0").unwrap();
    assert!((got - expected).abs() < 1e-6, "got {} expected {}", got, expected);
}

#[test]
fn checkpoints_capture_and_manual_revert_walks_back() {
    let (mut net, episode) = driven_pair(0.5, 1.0, 2.0);
    let cfg = TrainingConfig {
        reward_mode: RewardMode::Binary,
        reward_pos: 0.0,
        reward_neg: 0.0,
        use_advantage_baseline: false,
        no_update_if_satisfied: false,
        weight_decay: 0.0,
        prune_epsilon: 0.0,
        ..Default::default()
    };

    let mut trainer = HebbianTrainer::new(1);
    trainer.train(&mut net, std::slice::from_ref(&episode), 2, &cfg);
    assert_eq!(trainer.checkpoint_count(), 2);
    let captured = net.capture();

    // Perturb every weight, then revert to the newest checkpoint.
    net.set_weight("S0", "O0", 3.0).unwrap();
    assert!(trainer.revert_checkpoint(&mut net));
    assert_eq!(net.capture(), captured);

    // Drain the ladder; underflow reports false and changes nothing.
    assert!(trainer.revert_checkpoint(&mut net));
    assert!(!trainer.revert_checkpoint(&mut net));
    assert_eq!(net.capture(), captured);
}

#[test]
fn accuracy_drop_triggers_automatic_revert() {
    // Strong decay halves the weight every epoch. Epoch 1 classifies
    // correctly (w = 2.0 > threshold), epoch 2 is silent (w = 1.0 < 1.5),
    // so accuracy falls 1.0 -> 0.0 and the revert fires, consuming the
    // snapshot captured that same epoch.
    let (mut net, episode) = driven_pair(1.5, 0.0, 2.0);
    let cfg = TrainingConfig {
        reward_mode: RewardMode::Binary,
        reward_pos: 0.0,
        reward_neg: 0.0,
        use_advantage_baseline: false,
        no_update_if_satisfied: false,
        lr: 0.0,
        weight_decay: 0.5,
        prune_epsilon: 0.0,
        revert_enable: true,
        revert_drop: 0.2,
        ..Default::default()
    };

    let mut trainer = HebbianTrainer::new(1);
    trainer.train(&mut net, std::slice::from_ref(&episode), 2, &cfg);

    assert_eq!(trainer.accuracy_history().to_vec(), vec![1.0, 0.0]);
    // Two pushes, one consumed by the revert.
    assert_eq!(trainer.checkpoint_count(), 1);

    // The remaining checkpoint is the end-of-epoch-1 state.
    assert!(trainer.revert_checkpoint(&mut net));
    let w = net.weight("S0", "O0").unwrap();
    assert!((w - 1.0).abs() < 1e-6);
}
