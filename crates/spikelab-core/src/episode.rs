//! Episode runtime: warm-up plus decision window over one input timeline
//!
//! Both phases advance the simulation identically; the split only matters to
//! callers deciding what to do with the aggregated post-window metrics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::detector::OutputDetector;
use crate::network::Network;
use crate::timeline::{InputTimeline, ScheduleTimeline};

/// Aggregated outcome of one episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    /// Winning output id, `None` when the detector abstained
    pub winner: Option<String>,
    /// Top-1 minus top-2 output rate at episode end
    pub margin: f32,
    /// Final rate per output id
    pub rates: BTreeMap<String, f32>,
    /// Ticks executed
    pub ticks: u32,
}

impl EpisodeMetrics {
    /// Whether the winner matches a target id
    pub fn is_winner(&self, target: &str) -> bool {
        self.winner.as_deref() == Some(target)
    }
}

/// One dataset item: an input timeline paired with a target output id
#[derive(Debug, Clone)]
pub struct Episode {
    /// Scheduled sensory input
    pub timeline: ScheduleTimeline,
    /// Expected winning output id
    pub target: String,
}

impl Episode {
    /// Create an episode
    pub fn new(timeline: ScheduleTimeline, target: impl Into<String>) -> Self {
        Self {
            timeline,
            target: target.into(),
        }
    }
}

/// Run one episode of `warmup + window` ticks and compile metrics
///
/// The detector is reset first and updated on every tick, warm-up included;
/// warm-up activity simply decays out of the EMA by the end of the window.
pub fn run_episode(
    net: &mut Network,
    timeline: &mut dyn InputTimeline,
    detector: &mut dyn OutputDetector,
    warmup: u32,
    window: u32,
) -> EpisodeMetrics {
    let output_ids = net.output_ids();
    detector.reset();
    timeline.reset();

    let ticks = warmup + window;
    for _ in 0..ticks {
        timeline.apply(net);
        net.step();
        for id in &output_ids {
            let fired = net.neuron(id).map(|n| n.did_fire()).unwrap_or(false);
            detector.update(id, fired);
        }
        timeline.advance();
    }

    let mut rates = BTreeMap::new();
    for id in &output_ids {
        rates.insert(id.clone(), detector.rate(id));
    }
    EpisodeMetrics {
        winner: detector.predict(&output_ids),
        margin: detector.margin(&output_ids),
        rates,
        ticks,
    }
}
