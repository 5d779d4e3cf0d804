use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// A concrete save: how much of the trailing window to persist, and where.
///
/// This is the only shape a `CaptureResource` ever receives. Policy-driven
/// callers build one from [`SaveSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub duration: Duration,
    pub output_path: PathBuf,
}

impl SaveRequest {
    pub fn new(duration: Duration, output_path: impl Into<PathBuf>) -> Self {
        Self {
            duration,
            output_path: output_path.into(),
        }
    }
}

/// Save policy persisted by a host alongside its per-action settings.
///
/// Missing fields in a host payload fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaveSettings {
    /// Length of the trailing window to persist, in seconds (default: 30).
    pub duration_secs: f64,

    /// Directory the clip is written into (default: current directory).
    pub output_directory: PathBuf,

    /// File name prefix (default: "clip").
    pub file_name_prefix: String,

    /// `strftime` pattern for the timestamp part of the file name.
    pub timestamp_format: String,
}

impl SaveSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(format!("duration must be positive: {}", self.duration_secs));
        }
        if self.file_name_prefix.trim().is_empty() {
            return Err("file name prefix must not be empty".into());
        }
        if self.file_name_prefix.contains(['/', '\\']) {
            return Err(format!(
                "file name prefix contains a path separator: {}",
                self.file_name_prefix
            ));
        }
        if self.timestamp_format.contains(['/', '\\']) {
            return Err(format!(
                "timestamp format contains a path separator: {}",
                self.timestamp_format
            ));
        }
        if StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(format!("invalid timestamp format: {}", self.timestamp_format));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_secs).unwrap_or(Duration::ZERO)
    }

    /// Resolve the policy into a concrete request, naming the file
    /// `{prefix}_{timestamp}.wav` inside `output_directory`.
    pub fn to_request(&self, now: DateTime<Utc>) -> Result<SaveRequest, CaptureError> {
        self.validate().map_err(CaptureError::InvalidSaveSettings)?;

        let mut stamp = String::new();
        write!(stamp, "{}", now.format(&self.timestamp_format)).map_err(|_| {
            CaptureError::InvalidSaveSettings(format!(
                "invalid timestamp format: {}",
                self.timestamp_format
            ))
        })?;

        let file_name = if stamp.is_empty() {
            format!("{}.wav", self.file_name_prefix)
        } else {
            format!("{}_{}.wav", self.file_name_prefix, stamp)
        };

        Ok(SaveRequest::new(self.duration(), self.output_directory.join(file_name)))
    }
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self {
            duration_secs: 30.0,
            output_directory: PathBuf::from("."),
            file_name_prefix: "clip".into(),
            timestamp_format: "%Y%m%d_%H%M%S".into(),
        }
    }
}
