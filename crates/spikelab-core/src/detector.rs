//! Output detection over spike indicators
//!
//! Detectors consume only (id, fired-this-tick) pairs; they know nothing
//! about neuron semantics. The EMA variant is the one decision rule the
//! episode runtime requires.

use std::collections::HashMap;

/// Decision rule over per-output spike indicators
pub trait OutputDetector {
    /// Forget all tracked activity
    fn reset(&mut self);
    /// Fold one tick's spike indicator into the tracked rate
    fn update(&mut self, id: &str, fired: bool);
    /// Current rate for an id, 0.0 if untracked
    fn rate(&self, id: &str) -> f32;
    /// Id with the highest rate, the configured default when everything is
    /// below the activity threshold, or `None` to abstain
    fn predict(&self, ids: &[String]) -> Option<String>;
    /// Difference between the top and second-top rates; 0.0 for fewer than
    /// two candidates
    fn margin(&self, ids: &[String]) -> f32;
}

/// Exponential-moving-average firing-rate detector
///
/// Each update applies r <- (1 - alpha) * r + alpha * [fired].
#[derive(Debug, Clone)]
pub struct EmaDetector {
    alpha: f32,
    threshold: f32,
    default_id: Option<String>,
    rates: HashMap<String, f32>,
}

impl EmaDetector {
    /// Create a detector with the given smoothing factor
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            threshold: 0.01,
            default_id: None,
            rates: HashMap::new(),
        }
    }

    /// Set the minimum rate required to pick a winner
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the id returned when every rate is below the threshold
    pub fn with_default(mut self, default_id: Option<String>) -> Self {
        self.default_id = default_id;
        self
    }

    /// Smoothing factor
    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

impl OutputDetector for EmaDetector {
    fn reset(&mut self) {
        self.rates.clear();
    }

    fn update(&mut self, id: &str, fired: bool) {
        let r = self.rates.entry(id.to_string()).or_insert(0.0);
        *r = (1.0 - self.alpha) * *r + self.alpha * if fired { 1.0 } else { 0.0 };
    }

    fn rate(&self, id: &str) -> f32 {
        self.rates.get(id).copied().unwrap_or(0.0)
    }

    fn predict(&self, ids: &[String]) -> Option<String> {
        let mut max_id: Option<&String> = None;
        let mut max_rate = -1.0f32;
        for id in ids {
            let r = self.rate(id);
            if r > max_rate {
                max_rate = r;
                max_id = Some(id);
            }
        }
        if max_rate < self.threshold {
            return self.default_id.clone();
        }
        max_id.cloned()
    }

    fn margin(&self, ids: &[String]) -> f32 {
        if ids.len() < 2 {
            return 0.0;
        }
        let mut rates: Vec<f32> = ids.iter().map(|id| self.rate(id)).collect();
        rates.sort_by(|a, b| b.total_cmp(a));
        rates[0] - rates[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ema_approaches_steady_state() {
        let mut det = EmaDetector::new(0.05);
        for _ in 0..200 {
            det.update("O0", true);
            det.update("O1", false);
        }
        assert!(det.rate("O0") > 0.95);
        assert_eq!(det.rate("O1"), 0.0);

        let outs = ids(&["O0", "O1"]);
        assert_eq!(det.predict(&outs), Some("O0".to_string()));
        assert!(det.margin(&outs) > 0.95);
    }

    #[test]
    fn test_predict_below_threshold_uses_default() {
        let det = EmaDetector::new(0.05)
            .with_threshold(0.01)
            .with_default(Some("O0".to_string()));
        let outs = ids(&["O0", "O1"]);
        assert_eq!(det.predict(&outs), Some("O0".to_string()));

        let silent = EmaDetector::new(0.05).with_threshold(0.01);
        assert_eq!(silent.predict(&outs), None);
    }

    #[test]
    fn test_margin_needs_two_candidates() {
        let mut det = EmaDetector::new(0.5);
        det.update("O0", true);
        assert_eq!(det.margin(&ids(&["O0"])), 0.0);
    }

    #[test]
    fn test_reset_clears_rates() {
        let mut det = EmaDetector::new(0.5);
        det.update("O0", true);
        assert!(det.rate("O0") > 0.0);
        det.reset();
        assert_eq!(det.rate("O0"), 0.0);
    }
}
