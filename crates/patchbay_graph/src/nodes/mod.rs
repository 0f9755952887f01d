// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node catalogue.

pub mod data;
pub mod item;
pub mod procedure;

use crate::node::NodeCategory;
use crate::patch::{Patch, PATCH_TYPE_NAME};
use crate::registry::NodeRegistry;

/// Create a registry with every built-in node type
pub fn create_default_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();

    registry.register(
        PATCH_TYPE_NAME,
        NodeCategory::Patch,
        "A nested patch presenting exposed pins to its parent",
        Patch::new,
    );
    item::register_item_nodes(&mut registry);
    procedure::register_procedure_nodes(&mut registry);
    data::register_data_nodes(&mut registry);

    tracing::debug!("Registered {} built-in node types", registry.len());
    registry
}
