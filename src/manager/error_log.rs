//! Rolling error log shared with every surface.

use crate::error::serialize_error;
use crate::replica::{ReplicaNode, ReplicatedValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Replicated value name of the error log.
pub const ERROR_LOG_VALUE: &str = "modulesErrors";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub display_name: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

pub struct ErrorLog {
    value: ReplicatedValue<Vec<ErrorRecord>>,
    capacity: usize,
}

impl ErrorLog {
    pub fn new(node: &ReplicaNode, capacity: usize) -> Self {
        Self {
            value: ReplicatedValue::create(node, ERROR_LOG_VALUE, Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the oldest once capacity is reached.
    pub fn record(&self, display_name: &str, error: &(dyn std::error::Error + 'static)) {
        let record = ErrorRecord {
            display_name: display_name.to_string(),
            error: serialize_error(error),
            at: Utc::now(),
        };
        let capacity = self.capacity;
        self.value.update(|entries| {
            entries.push(record);
            if entries.len() > capacity {
                let excess = entries.len() - capacity;
                entries.drain(..excess);
            }
        });
    }

    pub fn entries(&self) -> Vec<ErrorRecord> {
        self.value.get()
    }

    pub fn clear(&self) {
        self.value.set(Vec::new());
    }

    pub fn value(&self) -> &ReplicatedValue<Vec<ErrorRecord>> {
        &self.value
    }
}
