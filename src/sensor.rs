use std::io;
use std::path::PathBuf;

use crate::classify::Tag;

/// A point-in-time sampler driven by the engine's poll loop.
///
/// One cycle is `poll()` followed by any number of `label()` / `tags()` calls.
/// Implementations keep only the latest reading; nothing survives between polls.
pub trait Sensor {
    fn name(&self) -> &str;

    /// Refresh the reading from the OS. On error the reading is still left in a
    /// consistent state, so the caller may render it anyway.
    fn poll(&mut self) -> Result<(), SensorError>;

    /// Short display text for the bar.
    fn label(&self) -> String;

    /// Ordered semantic tags used for styling.
    fn tags(&self) -> Vec<Tag>;
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed value in {}: {value:?}", path.display())]
    Malformed { path: PathBuf, value: String },
}

impl SensorError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SensorError::Unreadable { path: path.into(), source }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, value: impl Into<String>) -> Self {
        SensorError::Malformed { path: path.into(), value: value.into() }
    }

    /// Unreadable telemetry only degrades the reading; malformed telemetry is
    /// left to the caller's policy.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SensorError::Unreadable { .. })
    }
}
