//! Limit policy deciding when buffered content must be flushed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{BlobError, BlobResult};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Kind of limit, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    #[default]
    None,
    Memory,
    Count,
    Time,
}

/// Usage counters of buffered content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueUsage {
    /// Estimated bytes of buffered objects
    pub bytes: usize,
    pub items: usize,
    /// When the oldest buffered item was enqueued
    pub oldest: Option<Instant>,
}

impl QueueUsage {
    /// Combine counters of several queues
    #[must_use]
    pub fn merge(self, other: QueueUsage) -> QueueUsage {
        let oldest = match (self.oldest, other.oldest) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        QueueUsage {
            bytes: self.bytes + other.bytes,
            items: self.items + other.items,
            oldest,
        }
    }
}

/// When a flush is due
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitPolicy {
    /// Never auto-flush
    None,
    /// Flush above this many buffered bytes
    Memory(usize),
    /// Flush above this many buffered items
    Count(usize),
    /// Flush when the oldest item is older than this
    Time(Duration),
}

impl LimitPolicy {
    /// Build from a limit type and its capacity (MB, items or seconds).
    ///
    /// # Errors
    ///
    /// `Config` if the capacity is negative or not finite.
    pub fn from_capacity(limit_type: LimitType, capacity: f64) -> BlobResult<Self> {
        if !capacity.is_finite() || capacity < 0.0 {
            return Err(BlobError::config(format!(
                "limit capacity must be a non-negative number, got {capacity}"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let policy = match limit_type {
            LimitType::None => Self::None,
            LimitType::Memory => Self::Memory((capacity * BYTES_PER_MB) as usize),
            LimitType::Count => Self::Count(capacity as usize),
            LimitType::Time => Self::Time(Duration::try_from_secs_f64(capacity).map_err(|e| {
                BlobError::config(format!("time limit out of range ({capacity}): {e}"))
            })?),
        };
        Ok(policy)
    }

    /// Whether usage is over the threshold at `now`
    #[must_use]
    pub fn is_exceeded(&self, usage: &QueueUsage, now: Instant) -> bool {
        match *self {
            Self::None => false,
            Self::Memory(max_bytes) => usage.bytes > max_bytes,
            Self::Count(max_items) => usage.items > max_items,
            Self::Time(max_age) => usage
                .oldest
                .is_some_and(|oldest| now.saturating_duration_since(oldest) >= max_age),
        }
    }
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self::None
    }
}
