// SPDX-License-Identifier: MIT OR Apache-2.0
//! Factory registry mapping type names to node constructors.
//!
//! The registry is an ordinary value owned by the application context and
//! passed to whatever creates or deserializes nodes.

use crate::node::{DescribedNode, Node, NodeCategory, NodeError, NodeInstance, NodeRef, NodeType};
use crate::node_host::NodeHost;
use crate::patchlet::NodeRecord;
use indexmap::IndexMap;

type Constructor = Box<dyn Fn() -> Box<dyn Node>>;

/// Constructor for one node type
pub struct NodeFactory {
    type_name: String,
    category: NodeCategory,
    description: String,
    descriptor: Option<NodeType>,
    constructor: Constructor,
}

impl NodeFactory {
    /// Registered type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Category for node browsers
    pub fn category(&self) -> NodeCategory {
        self.category
    }

    /// Description for node browsers
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declaration, for types registered from a [`NodeType`]
    pub fn descriptor(&self) -> Option<&NodeType> {
        self.descriptor.as_ref()
    }

    /// Build a fresh node
    pub fn make(&self) -> NodeRef {
        NodeInstance::from_boxed((self.constructor)())
    }
}

impl std::fmt::Debug for NodeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeFactory")
            .field("type_name", &self.type_name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Registry of available node types
#[derive(Debug, Default)]
pub struct NodeRegistry {
    factories: IndexMap<String, NodeFactory>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Register a constructor under `type_name`, replacing any previous one
    pub fn register<F, N>(
        &mut self,
        type_name: impl Into<String>,
        category: NodeCategory,
        description: impl Into<String>,
        constructor: F,
    ) where
        F: Fn() -> N + 'static,
        N: Node + 'static,
    {
        let type_name = type_name.into();
        self.factories.insert(
            type_name.clone(),
            NodeFactory {
                type_name,
                category,
                description: description.into(),
                descriptor: None,
                constructor: Box::new(move || Box::new(constructor())),
            },
        );
    }

    /// Register a declared node type
    pub fn register_type(&mut self, node_type: NodeType) {
        let template = node_type.clone();
        self.factories.insert(
            node_type.id.clone(),
            NodeFactory {
                type_name: node_type.id.clone(),
                category: node_type.category,
                description: node_type.description.clone(),
                descriptor: Some(node_type),
                constructor: Box::new(move || Box::new(DescribedNode::new(&template))),
            },
        );
    }

    /// Get a factory by type name
    pub fn get(&self, type_name: &str) -> Option<&NodeFactory> {
        self.factories.get(type_name)
    }

    /// Whether a type name is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// All factories, in registration order
    pub fn factories(&self) -> impl Iterator<Item = &NodeFactory> {
        self.factories.values()
    }

    /// Factories in one category
    pub fn factories_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeFactory> {
        self.factories.values().filter(move |f| f.category == category)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Create a node from a type name
    pub fn create(&self, type_name: &str) -> Result<NodeRef, NodeError> {
        self.get(type_name)
            .map(NodeFactory::make)
            .ok_or_else(|| NodeError::UnknownNodeType(type_name.to_string()))
    }

    /// Build a host from a serialized node record.
    ///
    /// The returned host is not yet part of any patch and has no index.
    pub fn make_node_host(&self, record: &NodeRecord) -> Result<NodeHost, NodeError> {
        let node = self.create(&record.type_name)?;
        node.borrow_mut().deserialize_fields(&record.fields, self)?;
        Ok(NodeHost::new(node).with_bounds(record.bounds))
    }
}
