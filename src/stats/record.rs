//! Statistics records handed to monitoring collaborators

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Named metric in the extensible part of a statistics record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct KeywordMetric {
    pub id: String,
    pub value: Value,
}

impl KeywordMetric {
    pub fn new(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { id: id.into(), value: value.into() }
    }
}

/// Snapshot of one port direction's throughput and queue behavior.
///
/// Field order is part of the wire contract with existing collectors, including
/// the reserved `timestamps` list which is always empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct PortStatistics {
    pub port_name: String,
    pub elements_per_second: f32,
    pub bits_per_second: f32,
    pub calls_per_second: f32,
    pub timestamps: Vec<String>,
    pub average_queue_depth: f32,
    pub time_since_last_call: f32,
    pub keywords: Vec<KeywordMetric>,
}

impl PortStatistics {
    /// All-zero record for a port with nothing recorded.
    pub fn empty(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            elements_per_second: 0.0,
            bits_per_second: 0.0,
            calls_per_second: 0.0,
            timestamps: Vec::new(),
            average_queue_depth: 0.0,
            time_since_last_call: 0.0,
            keywords: Vec::new(),
        }
    }

    pub fn keyword(&self, id: &str) -> Option<&Value> {
        self.keywords.iter().find(|kw| kw.id == id).map(|kw| &kw.value)
    }
}

/// Statistics for one connection of an output port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct UsesPortStatistics {
    pub connection_id: String,
    pub statistics: PortStatistics,
}
