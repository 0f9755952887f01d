// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted and clipboard document format.
//!
//! ```json
//! {
//!   "Nodes": {
//!     "0": { "ID": 0, "NodeTypeName": "Item::Camera", "Bounds": {..},
//!            "InputsPins": { "Video": { "SourceNode": null } } }
//!   },
//!   "Canvas": { "Scroll": { "x": 0.0, "y": 0.0 } }
//! }
//! ```
//!
//! Node records are kept as raw JSON until the node pass parses them one by
//! one, so a malformed record only fails its own node.

use crate::node::NodeError;
use crate::node_host::{NodeHostIndex, DEFAULT_NODE_SIZE};
use crate::patch::PatchError;
use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A serialized patch or patchlet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchDocument {
    /// Node records keyed by host index
    #[serde(rename = "Nodes", default)]
    pub nodes: Map<String, Value>,
    /// Canvas state, only present for whole patches
    #[serde(rename = "Canvas", default, skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasRecord>,
}

impl PatchDocument {
    /// Parse a document, rejecting anything that is not shaped like one
    pub fn from_value(json: &Value) -> Result<Self, PatchError> {
        let Value::Object(object) = json else {
            return Err(PatchError::MalformedPatchlet(
                "document is not an object".to_string(),
            ));
        };
        match object.get("Nodes") {
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(PatchError::MalformedPatchlet(
                    "[Nodes] is not an object".to_string(),
                ))
            }
            None => {
                return Err(PatchError::MalformedPatchlet(
                    "missing [Nodes]".to_string(),
                ))
            }
        }
        serde_json::from_value(json.clone())
            .map_err(|e| PatchError::MalformedPatchlet(e.to_string()))
    }

    /// Parse a document from text
    pub fn from_text(text: &str) -> Result<Self, PatchError> {
        let json: Value = serde_json::from_str(text)
            .map_err(|e| PatchError::MalformedPatchlet(e.to_string()))?;
        Self::from_value(&json)
    }

    /// Add a node record under its own ID
    pub fn insert(&mut self, record: &NodeRecord) -> Result<(), PatchError> {
        self.nodes
            .insert(record.id.to_string(), serde_json::to_value(record)?);
        Ok(())
    }

    /// Node records ordered by numeric key, each parsed independently
    pub fn records(&self) -> Vec<(String, Result<NodeRecord, NodeError>)> {
        let mut records: Vec<_> = self
            .nodes
            .iter()
            .map(|(key, value)| (key.clone(), NodeRecord::parse(key, value)))
            .collect();
        records.sort_by_key(|(key, _)| key.parse::<u32>().unwrap_or(u32::MAX));
        records
    }

    /// Convert to a JSON value
    pub fn to_value(&self) -> Result<Value, PatchError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// One node host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Host index, always equal to the record's key
    #[serde(rename = "ID")]
    pub id: NodeHostIndex,
    /// Registry type name
    #[serde(rename = "NodeTypeName")]
    pub type_name: String,
    /// Canvas rectangle
    #[serde(rename = "Bounds", default = "default_bounds")]
    pub bounds: Rect,
    /// Per input pin connection state
    #[serde(rename = "InputsPins", default)]
    pub input_pins: BTreeMap<String, PinRecord>,
    /// Node-specific fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl NodeRecord {
    /// Parse the record stored under `key`
    pub fn parse(key: &str, value: &Value) -> Result<Self, NodeError> {
        let record: NodeRecord = serde_json::from_value(value.clone())
            .map_err(|e| NodeError::MalformedRecord(e.to_string()))?;
        if record.id.to_string() != key {
            return Err(NodeError::MismatchedId {
                key: key.to_string(),
                id: record.id,
            });
        }
        Ok(record)
    }
}

fn default_bounds() -> Rect {
    Rect::from_min_size(Pos2::ZERO, DEFAULT_NODE_SIZE)
}

/// Connection state of one input pin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    /// Exposed through the owning patch to its parent
    #[serde(rename = "Exposed", default, skip_serializing_if = "is_false")]
    pub exposed: bool,
    /// Source host index, `null` when unconnected
    #[serde(rename = "SourceNode", default)]
    pub source_node: Option<NodeHostIndex>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Canvas state of a whole patch
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasRecord {
    /// Scroll offset
    #[serde(rename = "Scroll", default)]
    pub scroll: Vec2,
}

/// A node or link that failed during a patchlet load
#[derive(Debug)]
pub struct PatchletFailure {
    /// Key of the node record involved
    pub key: String,
    /// What went wrong
    pub error: PatchError,
}

/// Outcome of inserting a patchlet
#[derive(Debug, Default)]
pub struct PatchletReport {
    /// Indices of the hosts that were added
    pub inserted: Vec<NodeHostIndex>,
    /// Isolated failures
    pub failures: Vec<PatchletFailure>,
}

impl PatchletReport {
    /// Whether everything loaded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn fail(&mut self, key: impl Into<String>, error: impl Into<PatchError>) {
        let key = key.into();
        let error = error.into();
        tracing::warn!("Patchlet entry [{key}] failed: {error}");
        self.failures.push(PatchletFailure { key, error });
    }
}
