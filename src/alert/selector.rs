use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::alert::AlertEvent;
use crate::detect::{Detection, DistanceCategory};

/// Minimum quiet period per distance category before a key may fire again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub very_close: Duration,
    pub default: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            very_close: Duration::from_millis(1500),
            default: Duration::from_millis(3000),
        }
    }
}

impl CooldownPolicy {
    pub fn required(&self, category: DistanceCategory) -> Duration {
        match category {
            DistanceCategory::VeryClose => self.very_close,
            _ => self.default,
        }
    }
}

/// Last alert time per `(class name, category)` key.
#[derive(Clone, Debug, Default)]
pub struct CooldownTable {
    last_fired: HashMap<(String, DistanceCategory), Instant>,
}

impl CooldownTable {
    pub fn last_fired(&self, class_name: &str, category: DistanceCategory) -> Option<Instant> {
        self.last_fired
            .get(&(class_name.to_string(), category))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }

    fn is_eligible(&self, key: &(String, DistanceCategory), now: Instant, cooldown: Duration) -> bool {
        match self.last_fired.get(key) {
            None => true,
            Some(last) => now.saturating_duration_since(*last) > cooldown,
        }
    }

    fn record(&mut self, key: (String, DistanceCategory), now: Instant) {
        self.last_fired.insert(key, now);
    }

    fn clear(&mut self) {
        self.last_fired.clear();
    }
}

/// Picks at most one alert per ranked detection list.
///
/// Walks the list in order; the first detection whose key is past its cooldown
/// fires, and its timestamp is recorded before the event is returned.
#[derive(Clone, Debug, Default)]
pub struct AlertSelector {
    policy: CooldownPolicy,
    table: CooldownTable,
}

impl AlertSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: CooldownPolicy) -> Self {
        Self {
            policy,
            table: CooldownTable::default(),
        }
    }

    pub fn select(&mut self, ranked: &[Detection]) -> Option<AlertEvent> {
        self.select_at(ranked, Instant::now())
    }

    pub fn select_at(&mut self, ranked: &[Detection], now: Instant) -> Option<AlertEvent> {
        for detection in ranked {
            let key = (detection.class_name.clone(), detection.category);
            let cooldown = self.policy.required(detection.category);
            if self.table.is_eligible(&key, now, cooldown) {
                self.table.record(key, now);
                log::debug!(
                    "alert selected: {} {}",
                    detection.class_name,
                    detection.category.label()
                );
                return Some(AlertEvent::new(detection.class_name.clone(), detection.category));
            }
        }
        None
    }

    /// Forget every key; all of them become eligible again.
    pub fn reset(&mut self) {
        self.table.clear();
    }

    pub fn cooldowns(&self) -> &CooldownTable {
        &self.table
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    const BBOX: BoundingBox = BoundingBox {
        x1: 0.4,
        y1: 0.4,
        x2: 0.6,
        y2: 0.6,
    };

    fn seen(class_name: &str, distance: f32) -> Detection {
        Detection::new(class_name, 0.9, BBOX, distance)
    }

    #[test]
    fn same_key_one_second_apart_fires_once() {
        let mut selector = AlertSelector::new();
        let t0 = Instant::now();
        let ranked = [seen("person", 2.0)];

        let first = selector.select_at(&ranked, t0).unwrap();
        assert_eq!(first, AlertEvent::new("person", DistanceCategory::VeryClose));
        assert!(selector.select_at(&ranked, t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn very_close_refires_after_its_short_cooldown() {
        let mut selector = AlertSelector::new();
        let t0 = Instant::now();
        let ranked = [seen("person", 2.0)];

        assert!(selector.select_at(&ranked, t0).is_some());
        assert!(selector
            .select_at(&ranked, t0 + Duration::from_millis(1500))
            .is_none());
        assert!(selector
            .select_at(&ranked, t0 + Duration::from_millis(1600))
            .is_some());
    }

    #[test]
    fn close_waits_the_long_cooldown() {
        let mut selector = AlertSelector::new();
        let t0 = Instant::now();
        let ranked = [seen("car", 5.0)];

        assert!(selector.select_at(&ranked, t0).is_some());
        assert!(selector.select_at(&ranked, t0 + Duration::from_secs(2)).is_none());
        assert!(selector.select_at(&ranked, t0 + Duration::from_secs(3)).is_none());
        assert!(selector
            .select_at(&ranked, t0 + Duration::from_millis(3100))
            .is_some());
    }

    #[test]
    fn at_most_one_event_per_call() {
        let mut selector = AlertSelector::new();
        let t0 = Instant::now();
        let ranked = [
            seen("person", 1.0),
            seen("dog", 2.0),
            seen("car", 4.0),
            seen("bus", 9.0),
            seen("truck", 30.0),
        ];

        let event = selector.select_at(&ranked, t0).unwrap();
        assert_eq!(event.class_name, "person");
        assert_eq!(selector.cooldowns().len(), 1);

        // The next call moves down the list to the next eligible key.
        let event = selector.select_at(&ranked, t0).unwrap();
        assert_eq!(event.class_name, "dog");
        assert_eq!(selector.cooldowns().len(), 2);
    }

    #[test]
    fn category_change_is_a_new_key() {
        let mut selector = AlertSelector::new();
        let t0 = Instant::now();
        assert!(selector.select_at(&[seen("person", 10.0)], t0).is_some());
        let event = selector
            .select_at(&[seen("person", 5.0)], t0 + Duration::from_millis(100))
            .unwrap();
        assert_eq!(event.category, DistanceCategory::Close);
    }

    #[test]
    fn reset_clears_cooldowns() {
        let mut selector = AlertSelector::new();
        let t0 = Instant::now();
        let ranked = [seen("bicycle", 12.0)];

        assert!(selector.select_at(&ranked, t0).is_some());
        assert!(selector
            .cooldowns()
            .last_fired("bicycle", DistanceCategory::Nearby)
            .is_some());
        selector.reset();
        assert!(selector.cooldowns().is_empty());
        assert!(selector.select_at(&ranked, t0).is_some());
    }

    #[test]
    fn empty_list_is_silent() {
        let mut selector = AlertSelector::new();
        assert!(selector.select(&[]).is_none());
    }

    #[test]
    fn custom_policy_applies() {
        let policy = CooldownPolicy {
            very_close: Duration::from_millis(100),
            default: Duration::from_millis(200),
        };
        let mut selector = AlertSelector::with_policy(policy);
        let t0 = Instant::now();
        let ranked = [seen("chair", 6.0)];
        assert!(selector.select_at(&ranked, t0).is_some());
        assert!(selector
            .select_at(&ranked, t0 + Duration::from_millis(250))
            .is_some());
        assert_eq!(selector.policy().required(DistanceCategory::Close), policy.default);
    }
}
