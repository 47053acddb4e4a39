//! Scheduled sensory input
//!
//! A timeline produces per-tick (sensor id -> amplitude) events. The episode
//! runtime only needs the injector interface: reset, apply the current
//! tick's events, advance.

use std::collections::BTreeMap;

use crate::network::Network;

/// Per-tick sensory injector consumed by the episode runtime
pub trait InputTimeline {
    /// Restart from the first tick
    fn reset(&mut self);
    /// Inject the current tick's events into the network
    fn apply(&self, net: &mut Network);
    /// Move to the next tick
    fn advance(&mut self);
}

/// A finite, restartable schedule of sensory events keyed by tick
#[derive(Debug, Clone, Default)]
pub struct ScheduleTimeline {
    events: BTreeMap<u32, BTreeMap<String, f32>>,
    tick: u32,
    looping: bool,
}

impl ScheduleTimeline {
    /// Create an empty schedule
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an amplitude for a sensor at a tick; a later push for the
    /// same (tick, sensor) overwrites the earlier one
    pub fn push_event(&mut self, tick: u32, sensor: impl Into<String>, amplitude: f32) {
        self.events
            .entry(tick)
            .or_default()
            .insert(sensor.into(), amplitude);
    }

    /// Restart from tick 0 once the schedule runs past its last event
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Whether the schedule loops
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Highest tick with a scheduled event, 0 when empty
    pub fn max_tick(&self) -> u32 {
        self.events.keys().next_back().copied().unwrap_or(0)
    }

    /// Current tick position
    pub fn current_tick(&self) -> u32 {
        self.tick
    }

    /// Whether no events are scheduled
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop all events and rewind
    pub fn clear(&mut self) {
        self.events.clear();
        self.tick = 0;
    }
}

impl InputTimeline for ScheduleTimeline {
    fn reset(&mut self) {
        self.tick = 0;
    }

    fn apply(&self, net: &mut Network) {
        if let Some(tick_events) = self.events.get(&self.tick) {
            for (sensor, amplitude) in tick_events {
                net.inject(sensor, *amplitude);
            }
        }
    }

    fn advance(&mut self) {
        self.tick += 1;
        if self.looping && self.tick > self.max_tick() {
            self.tick = 0;
        }
    }
}
