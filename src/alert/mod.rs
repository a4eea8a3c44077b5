//! Alert selection and delivery.
//!
//! The selector picks at most one detection per pipeline run; sinks decide how
//! to render it (speech, vibration, log line).

mod selector;

use std::sync::mpsc::Sender;

use serde::Serialize;

use crate::detect::DistanceCategory;

pub use selector::{AlertSelector, CooldownPolicy, CooldownTable};

/// The one detection chosen for notification in a cycle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct AlertEvent {
    pub class_name: String,
    pub category: DistanceCategory,
}

/// Vibration strength for sinks that render alerts as haptics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticUrgency {
    Strong,
    Medium,
    Light,
}

impl AlertEvent {
    pub fn new(class_name: impl Into<String>, category: DistanceCategory) -> Self {
        Self {
            class_name: class_name.into(),
            category,
        }
    }

    /// Short spoken phrase, e.g. "person very close".
    pub fn message(&self) -> String {
        format!("{} {}", self.class_name, self.category.label())
    }

    pub fn urgency(&self) -> HapticUrgency {
        match self.category {
            DistanceCategory::VeryClose => HapticUrgency::Strong,
            DistanceCategory::Close => HapticUrgency::Medium,
            DistanceCategory::Nearby | DistanceCategory::Far => HapticUrgency::Light,
        }
    }
}

/// Consumer of selected alerts.
///
/// Called at most once per pipeline run from the delivery thread. Must not
/// block for long: the next result waits behind it.
pub trait AlertSink: Send {
    fn notify(&mut self, event: &AlertEvent);
}

impl<F> AlertSink for F
where
    F: FnMut(&AlertEvent) + Send,
{
    fn notify(&mut self, event: &AlertEvent) {
        self(event)
    }
}

/// Writes alerts to the log at info level.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&mut self, event: &AlertEvent) {
        log::info!("alert: {} ({:?})", event.message(), event.urgency());
    }
}

/// Forwards alerts to a channel. A disconnected receiver is ignored.
#[derive(Debug)]
pub struct ChannelAlertSink {
    tx: Sender<AlertEvent>,
}

impl ChannelAlertSink {
    pub fn new(tx: Sender<AlertEvent>) -> Self {
        Self { tx }
    }
}

impl AlertSink for ChannelAlertSink {
    fn notify(&mut self, event: &AlertEvent) {
        if self.tx.send(event.clone()).is_err() {
            log::debug!("alert receiver gone, dropping {}", event.message());
        }
    }
}
