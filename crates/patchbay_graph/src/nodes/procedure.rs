// SPDX-License-Identifier: MIT OR Apache-2.0
//! Calibration procedures.

use crate::node::{NodeCategory, NodeType};
use crate::pin::PinType;
use crate::registry::NodeRegistry;

/// Register calibration procedure nodes
pub fn register_procedure_nodes(registry: &mut NodeRegistry) {
    registry.register_type(
        NodeType::new("Procedure::Calibrate::CameraExtrinsicsFromBoard", NodeCategory::Procedure)
            .with_description("Locate a camera from a board seen in its image")
            .with_input("Camera", PinType::Camera)
            .with_input("Board", PinType::Board)
            .with_output(PinType::Mat4)
            .with_parameter("FindBoardMode", "Optimized"),
    );

    registry.register_type(
        NodeType::new("Procedure::Calibrate::ProjectorFromGraycode", NodeCategory::Procedure)
            .with_description("Solve a projector from structured light captures")
            .with_input("Projector", PinType::Projector)
            .with_input("Camera", PinType::Camera)
            .with_input("Graycode", PinType::Image)
            .with_output(PinType::Projector)
            .with_parameter("Threshold", 10)
            .with_parameter("MinimumCorrespondences", 200),
    );
}
