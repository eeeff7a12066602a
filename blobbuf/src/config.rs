//! Storage manager configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BlobError, BlobResult};
use crate::limit::{LimitPolicy, LimitType};

/// Construction parameters of a [`StorageManager`](crate::StorageManager)
///
/// Missing fields take their defaults when loaded from JSON:
///
/// ```
/// use blobbuf::{LimitType, StorageConfig};
///
/// let config = StorageConfig::from_json_str(r#"{"limit_type": "count", "limit_capacity": 100}"#).unwrap();
/// assert_eq!(config.limit_type, LimitType::Count);
/// assert!(config.bufferize);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bound on the session handshake
    pub handshake_timeout_secs: f64,
    /// Whether writes go through content queues at all
    pub bufferize: bool,
    pub limit_type: LimitType,
    /// MB for `memory`, items for `count`, seconds for `time`
    pub limit_capacity: f64,
    /// Bound on each backend write during a flush; unbounded if unset
    pub write_timeout_secs: Option<f64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 10.0,
            bufferize: true,
            limit_type: LimitType::None,
            limit_capacity: 10.0,
            write_timeout_secs: None,
        }
    }
}

impl StorageConfig {
    /// Parse and validate a JSON document
    ///
    /// # Errors
    ///
    /// `Config` on malformed JSON or invalid values.
    pub fn from_json_str(text: &str) -> BlobResult<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| BlobError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_limit(mut self, limit_type: LimitType, capacity: f64) -> Self {
        self.limit_type = limit_type;
        self.limit_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_bufferize(mut self, bufferize: bool) -> Self {
        self.bufferize = bufferize;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_secs = timeout.as_secs_f64();
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    /// # Errors
    ///
    /// `Config` if a timeout is not a positive finite number or the capacity is invalid.
    pub fn validate(&self) -> BlobResult<()> {
        positive_duration("handshake_timeout_secs", self.handshake_timeout_secs)?;
        if let Some(secs) = self.write_timeout_secs {
            positive_duration("write_timeout_secs", secs)?;
        }
        self.limit_policy()?;
        Ok(())
    }

    /// # Errors
    ///
    /// `Config` if the handshake timeout is invalid.
    pub fn handshake_timeout(&self) -> BlobResult<Duration> {
        positive_duration("handshake_timeout_secs", self.handshake_timeout_secs)
    }

    /// # Errors
    ///
    /// `Config` if the write timeout is set and invalid.
    pub fn write_timeout(&self) -> BlobResult<Option<Duration>> {
        self.write_timeout_secs
            .map(|secs| positive_duration("write_timeout_secs", secs))
            .transpose()
    }

    /// # Errors
    ///
    /// `Config` if the capacity is invalid.
    pub fn limit_policy(&self) -> BlobResult<LimitPolicy> {
        LimitPolicy::from_capacity(self.limit_type, self.limit_capacity)
    }
}

fn positive_duration(name: &str, secs: f64) -> BlobResult<Duration> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(BlobError::config(format!(
            "{name} must be a positive number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| BlobError::config(format!("{name} out of range ({secs}): {e}")))
}
