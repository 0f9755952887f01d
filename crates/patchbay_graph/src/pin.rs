// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed input pins and their connection state.
//!
//! A pin holds at most one upstream source. The source is observed through a
//! [`Weak`] handle, so deleting the source node silently disconnects the pin.

use crate::node::{NodeInstance, NodeRef};
use crate::node_host::NodeHostIndex;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Value type carried by a pin, or offered by a node used as a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinType {
    /// Accepts or offers anything
    Any,
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// 2D vector
    Vector2,
    /// 3D vector
    Vector3,
    /// 4D vector
    Vector4,
    /// Color (RGBA)
    Color,
    /// Matrix 4x4
    Mat4,
    /// Text value
    String,
    /// Image or video frame source
    Image,
    /// Camera item
    Camera,
    /// Projector item
    Projector,
    /// Calibration board item
    Board,
    /// Generic view (camera or projector)
    View,
    /// Channel database
    Channels,
    /// Lighting fixture
    Fixture,
    /// A nested patch
    Patch,
}

impl PinType {
    /// Human-readable name of the type
    pub fn name(&self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Vector2 => "Vector2",
            Self::Vector3 => "Vector3",
            Self::Vector4 => "Vector4",
            Self::Color => "Color",
            Self::Mat4 => "Mat4",
            Self::String => "String",
            Self::Image => "Image",
            Self::Camera => "Camera",
            Self::Projector => "Projector",
            Self::Board => "Board",
            Self::View => "View",
            Self::Channels => "Channels",
            Self::Fixture => "Fixture",
            Self::Patch => "Patch",
        }
    }

    /// Check whether a pin of this type accepts a source offering `found`
    pub fn accepts(&self, found: &PinType) -> bool {
        if matches!(self, Self::Any) || matches!(found, Self::Any) {
            return true;
        }

        if self == found {
            return true;
        }

        match (found, self) {
            // Numeric conversions
            (Self::Int, Self::Float) | (Self::Float, Self::Int) => true,
            // Vector widening
            (Self::Float, Self::Vector2 | Self::Vector3 | Self::Vector4) => true,
            (Self::Vector2, Self::Vector3 | Self::Vector4) => true,
            (Self::Vector3, Self::Vector4) => true,
            (Self::Color, Self::Vector4) | (Self::Vector4, Self::Color) => true,
            // Cameras and projectors are both views
            (Self::Camera | Self::Projector, Self::View) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error when connecting a pin
#[derive(Debug, thiserror::Error)]
pub enum PinError {
    /// The source node does not offer a type this pin accepts
    #[error("Pin [{pin}] expects {expected} but the source offers {found}")]
    IncompatiblePinType {
        /// Pin name
        pin: String,
        /// Type declared by the pin
        expected: PinType,
        /// Type offered by the source node
        found: PinType,
    },
}

/// A named, typed input slot on a node
#[derive(Debug)]
pub struct Pin {
    name: String,
    pin_type: PinType,
    source: RefCell<Weak<NodeInstance>>,
    exposed: Cell<bool>,
    revision: Cell<u64>,
}

impl Pin {
    /// Create a new unconnected pin
    pub fn new(name: impl Into<String>, pin_type: PinType) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            pin_type,
            source: RefCell::new(Weak::new()),
            exposed: Cell::new(false),
            revision: Cell::new(0),
        })
    }

    /// Pin name, unique within the owning node
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared value type
    pub fn pin_type(&self) -> PinType {
        self.pin_type
    }

    /// Connect to a source node, displacing any previous source
    pub fn connect(&self, source: &NodeRef) -> Result<(), PinError> {
        let found = source.output_type();
        if !self.pin_type.accepts(&found) {
            return Err(PinError::IncompatiblePinType {
                pin: self.name.clone(),
                expected: self.pin_type,
                found,
            });
        }

        *self.source.borrow_mut() = Rc::downgrade(source);
        self.mark_changed();
        Ok(())
    }

    /// Drop the current connection, if any
    pub fn disconnect(&self) {
        let was_connected = self.is_connected();
        *self.source.borrow_mut() = Weak::new();
        if was_connected {
            self.mark_changed();
        }
    }

    /// Whether the pin has a live source
    pub fn is_connected(&self) -> bool {
        self.source.borrow().strong_count() > 0
    }

    /// Non-owning handle to the source node, if connected
    pub fn source(&self) -> Option<Weak<NodeInstance>> {
        let source = self.source.borrow();
        (source.strong_count() > 0).then(|| source.clone())
    }

    /// Check whether this pin is fed by `node`
    pub fn is_connected_to(&self, node: &NodeRef) -> bool {
        std::ptr::eq(self.source.borrow().as_ptr(), Rc::as_ptr(node))
            && self.is_connected()
    }

    /// Index of the host carrying the source node, if connected and hosted
    pub fn source_host_index(&self) -> Option<NodeHostIndex> {
        self.source_node().and_then(|node| node.host_index())
    }

    /// Whether the pin is exposed through the owning patch to its parent
    pub fn is_exposed(&self) -> bool {
        self.exposed.get()
    }

    /// Counter bumped on every connection change
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    pub(crate) fn source_node(&self) -> Option<NodeRef> {
        self.source.borrow().upgrade()
    }

    pub(crate) fn set_exposed(&self, exposed: bool) {
        self.exposed.set(exposed);
    }

    fn mark_changed(&self) {
        self.revision.set(self.revision.get().wrapping_add(1));
    }
}
