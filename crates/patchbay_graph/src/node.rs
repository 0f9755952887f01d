// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the patch graph.

use crate::node_host::NodeHostIndex;
use crate::patch::Patch;
use crate::pin::{Pin, PinError, PinType};
use crate::registry::NodeRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

/// Shared handle to a hosted node
pub type NodeRef = Rc<NodeInstance>;

/// A unit of behavior placed in a patch.
///
/// Nodes never store references to their hosts. Anything the patch needs to
/// know about a node goes through this trait.
pub trait Node {
    /// Type name used for registry lookup and serialization
    fn type_name(&self) -> &str;

    /// Input pins, in declaration order
    fn input_pins(&self) -> Vec<Rc<Pin>> {
        Vec::new()
    }

    /// Type offered when this node is used as a connection source
    fn output_type(&self) -> PinType {
        PinType::Any
    }

    /// Write node-specific fields into the node record
    fn serialize_fields(&self, _json: &mut Map<String, Value>) -> Result<(), NodeError> {
        Ok(())
    }

    /// Read node-specific fields from the node record
    fn deserialize_fields(
        &mut self,
        _json: &Map<String, Value>,
        _registry: &NodeRegistry,
    ) -> Result<(), NodeError> {
        Ok(())
    }

    /// Called once per update tick
    fn update(&mut self) {}

    /// Nested graph capability
    fn as_patch(&self) -> Option<&Patch> {
        None
    }

    /// Mutable nested graph capability
    fn as_patch_mut(&mut self) -> Option<&mut Patch> {
        None
    }
}

/// The cell a node lives in once it is created.
///
/// Type name and output type are captured at construction so pins can check
/// compatibility without borrowing the node.
pub struct NodeInstance {
    type_name: String,
    output_type: PinType,
    host_index: Cell<Option<NodeHostIndex>>,
    node: RefCell<Box<dyn Node>>,
}

impl NodeInstance {
    /// Wrap a node into a shared instance
    pub fn new(node: impl Node + 'static) -> NodeRef {
        Self::from_boxed(Box::new(node))
    }

    /// Wrap an already boxed node
    pub fn from_boxed(node: Box<dyn Node>) -> NodeRef {
        Rc::new(Self {
            type_name: node.type_name().to_string(),
            output_type: node.output_type(),
            host_index: Cell::new(None),
            node: RefCell::new(node),
        })
    }

    /// Type name of the wrapped node
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Type offered as a connection source
    pub fn output_type(&self) -> PinType {
        self.output_type
    }

    /// Index of the host currently carrying this node
    pub fn host_index(&self) -> Option<NodeHostIndex> {
        self.host_index.get()
    }

    /// Borrow the node
    pub fn borrow(&self) -> Ref<'_, dyn Node> {
        Ref::map(self.node.borrow(), |node| &**node)
    }

    /// Mutably borrow the node
    pub fn borrow_mut(&self) -> RefMut<'_, dyn Node> {
        RefMut::map(self.node.borrow_mut(), |node| &mut **node)
    }

    /// Input pins of the node
    pub fn input_pins(&self) -> Vec<Rc<Pin>> {
        self.borrow().input_pins()
    }

    /// Find an input pin by name
    pub fn input_pin(&self, name: &str) -> Option<Rc<Pin>> {
        self.input_pins().into_iter().find(|pin| pin.name() == name)
    }

    /// Whether the node is a nested patch
    pub fn is_patch(&self) -> bool {
        self.borrow().as_patch().is_some()
    }

    pub(crate) fn set_host_index(&self, index: Option<NodeHostIndex>) {
        self.host_index.set(index);
    }
}

impl std::fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInstance")
            .field("type_name", &self.type_name)
            .field("host_index", &self.host_index.get())
            .finish_non_exhaustive()
    }
}

/// Node type category, used by node browsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Physical or virtual items (cameras, projectors, boards)
    Item,
    /// Procedures acting on items (calibration)
    Procedure,
    /// Data stores
    Data,
    /// DMX fixtures
    Dmx,
    /// Nested patches
    Patch,
    /// Utility nodes
    Utility,
}

/// Declaration of an input pin on a described node type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinDescriptor {
    /// Pin name
    pub name: String,
    /// Accepted type
    pub pin_type: PinType,
}

impl PinDescriptor {
    /// Create a pin declaration
    pub fn new(name: impl Into<String>, pin_type: PinType) -> Self {
        Self {
            name: name.into(),
            pin_type,
        }
    }

    /// Instantiate the pin
    pub fn build(&self) -> Rc<Pin> {
        Pin::new(self.name.clone(), self.pin_type)
    }
}

/// Node type definition for nodes built from a declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeType {
    /// Type name, e.g. `Item::Camera`
    pub id: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Input pins
    pub inputs: Vec<PinDescriptor>,
    /// Type offered as a source
    pub output: PinType,
    /// Default parameter values
    pub parameters: Map<String, Value>,
}

impl NodeType {
    /// Create a type with no pins and no parameters
    pub fn new(id: impl Into<String>, category: NodeCategory) -> Self {
        let id = id.into();
        let name = id.rsplit("::").next().unwrap_or_default().to_string();
        Self {
            id,
            name,
            category,
            description: String::new(),
            inputs: Vec::new(),
            output: PinType::Any,
            parameters: Map::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an input pin
    pub fn with_input(mut self, name: impl Into<String>, pin_type: PinType) -> Self {
        self.inputs.push(PinDescriptor::new(name, pin_type));
        self
    }

    /// Set the type offered as a source
    pub fn with_output(mut self, output: PinType) -> Self {
        self.output = output;
        self
    }

    /// Add a parameter with its default value
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Generic node whose pins and parameters come from a [`NodeType`]
#[derive(Debug, Clone)]
pub struct DescribedNode {
    type_name: String,
    pins: Vec<Rc<Pin>>,
    output: PinType,
    parameters: Map<String, Value>,
}

impl DescribedNode {
    /// Key under which parameters are stored in the node record
    pub const PARAMETERS_KEY: &'static str = "Parameters";

    /// Instantiate a node from its type definition
    pub fn new(node_type: &NodeType) -> Self {
        Self {
            type_name: node_type.id.clone(),
            pins: node_type.inputs.iter().map(PinDescriptor::build).collect(),
            output: node_type.output,
            parameters: node_type.parameters.clone(),
        }
    }

    /// Current parameter values
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Get a parameter value
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Set a parameter value
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameters.insert(name.into(), value.into());
    }
}

impl Node for DescribedNode {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn input_pins(&self) -> Vec<Rc<Pin>> {
        self.pins.clone()
    }

    fn output_type(&self) -> PinType {
        self.output
    }

    fn serialize_fields(&self, json: &mut Map<String, Value>) -> Result<(), NodeError> {
        json.insert(
            Self::PARAMETERS_KEY.to_string(),
            Value::Object(self.parameters.clone()),
        );
        Ok(())
    }

    fn deserialize_fields(
        &mut self,
        json: &Map<String, Value>,
        _registry: &NodeRegistry,
    ) -> Result<(), NodeError> {
        match json.get(Self::PARAMETERS_KEY) {
            None | Some(Value::Null) => Ok(()),
            Some(Value::Object(parameters)) => {
                for (name, value) in parameters {
                    self.parameters.insert(name.clone(), value.clone());
                }
                Ok(())
            }
            Some(_) => Err(NodeError::InvalidField {
                field: Self::PARAMETERS_KEY.to_string(),
                reason: "expected an object".to_string(),
            }),
        }
    }
}

/// Error when constructing or deserializing a node
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// No factory registered under this type name
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Node record does not have the expected shape
    #[error("Malformed node record: {0}")]
    MalformedRecord(String),

    /// `ID` inside the record differs from its key
    #[error("Node record key [{key}] does not match its ID [{id}]")]
    MismatchedId {
        /// Map key
        key: String,
        /// Recorded ID
        id: NodeHostIndex,
    },

    /// A node-specific field is invalid
    #[error("Invalid field [{field}]: {reason}")]
    InvalidField {
        /// Field name
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Pin error
    #[error(transparent)]
    Pin(#[from] PinError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn camera_type() -> NodeType {
        NodeType::new("Item::Camera", NodeCategory::Item)
            .with_output(PinType::Camera)
            .with_input("Video", PinType::Image)
            .with_parameter("Width", 1920)
    }

    #[test]
    fn test_node_type_display_name() {
        let node_type = camera_type();
        assert_eq!(node_type.name, "Camera");
        assert_eq!(node_type.inputs.len(), 1);
    }

    #[test]
    fn test_described_node_pins_are_distinct_per_instance() {
        let node_type = camera_type();
        let a = DescribedNode::new(&node_type);
        let b = DescribedNode::new(&node_type);
        assert!(!Rc::ptr_eq(&a.input_pins()[0], &b.input_pins()[0]));
    }

    #[test]
    fn test_parameters_round_trip() {
        let registry = NodeRegistry::new();
        let mut node = DescribedNode::new(&camera_type());
        node.set_parameter("Width", 1280);

        let mut json = Map::new();
        node.serialize_fields(&mut json).unwrap();
        assert_eq!(json["Parameters"]["Width"], json!(1280));

        let mut loaded = DescribedNode::new(&camera_type());
        loaded.deserialize_fields(&json, &registry).unwrap();
        assert_eq!(loaded.parameter("Width"), Some(&json!(1280)));
    }

    #[test]
    fn test_invalid_parameters_field() {
        let registry = NodeRegistry::new();
        let mut node = DescribedNode::new(&camera_type());
        let mut json = Map::new();
        json.insert("Parameters".to_string(), json!([1, 2, 3]));

        let err = node.deserialize_fields(&json, &registry).unwrap_err();
        assert!(matches!(err, NodeError::InvalidField { .. }));
    }

    #[test]
    fn test_instance_caches_type_information() {
        let instance = NodeInstance::new(DescribedNode::new(&camera_type()));
        assert_eq!(instance.type_name(), "Item::Camera");
        assert_eq!(instance.output_type(), PinType::Camera);
        assert_eq!(instance.host_index(), None);
        assert!(instance.input_pin("Video").is_some());
        assert!(!instance.is_patch());
    }
}
