// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data stores and DMX fixtures.

use crate::node::{NodeCategory, NodeType};
use crate::pin::PinType;
use crate::registry::NodeRegistry;

/// Register data and DMX nodes
pub fn register_data_nodes(registry: &mut NodeRegistry) {
    registry.register_type(
        NodeType::new("Data::Channels::Database", NodeCategory::Data)
            .with_description("A tree of named value channels")
            .with_output(PinType::Channels),
    );

    registry.register_type(
        NodeType::new("DMX::Sharpy", NodeCategory::Dmx)
            .with_description("A moving head fixture")
            .with_input("Channels", PinType::Channels)
            .with_input("Target", PinType::Vector3)
            .with_output(PinType::Fixture)
            .with_parameter("Universe", 1)
            .with_parameter("Channel", 1),
    );
}
