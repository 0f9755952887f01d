// SPDX-License-Identifier: MIT OR Apache-2.0
//! Items: the physical things a patch describes.

use crate::node::{NodeCategory, NodeType};
use crate::pin::PinType;
use crate::registry::NodeRegistry;

/// Register camera, projector, board and view nodes
pub fn register_item_nodes(registry: &mut NodeRegistry) {
    registry.register_type(
        NodeType::new("Item::Camera", NodeCategory::Item)
            .with_description("A video camera with intrinsics and a rigid body transform")
            .with_output(PinType::Camera)
            .with_parameter("Width", 1920)
            .with_parameter("Height", 1080)
            .with_parameter("FocalLength", 1000.0),
    );

    registry.register_type(
        NodeType::new("Item::Projector", NodeCategory::Item)
            .with_description("A projector modelled as an inverse camera")
            .with_output(PinType::Projector)
            .with_parameter("Width", 1280)
            .with_parameter("Height", 800)
            .with_parameter("ThrowRatio", 1.4)
            .with_parameter("LensOffset", -0.5),
    );

    registry.register_type(
        NodeType::new("Item::Board", NodeCategory::Item)
            .with_description("A printed calibration pattern")
            .with_output(PinType::Board)
            .with_parameter("Type", "Checkerboard")
            .with_parameter("SizeX", 10)
            .with_parameter("SizeY", 7)
            .with_parameter("Spacing", 0.025),
    );

    // Cameras and projectors both offer a view.
    registry.register_type(
        NodeType::new("Item::View", NodeCategory::Item)
            .with_description("The view frustum of a camera or projector")
            .with_input("Source", PinType::View)
            .with_output(PinType::View),
    );
}
