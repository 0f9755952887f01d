// SPDX-License-Identifier: MIT OR Apache-2.0
//! Placement of a node inside a patch.

use crate::node::NodeRef;
use crate::pin::Pin;
use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Default size of a node created interactively
pub const DEFAULT_NODE_SIZE: Vec2 = Vec2::new(200.0, 100.0);

const HEADER_HEIGHT: f32 = 24.0;
const PIN_ROW_HEIGHT: f32 = 22.0;

/// Identity of a node host, unique within its patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHostIndex(pub u32);

impl std::fmt::Display for NodeHostIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node placed on the canvas of a patch
#[derive(Debug)]
pub struct NodeHost {
    node: NodeRef,
    index: NodeHostIndex,
    bounds: Rect,
}

impl NodeHost {
    /// Host a node at the canvas origin with the default size
    pub fn new(node: NodeRef) -> Self {
        Self {
            node,
            index: NodeHostIndex(0),
            bounds: Rect::from_min_size(Pos2::ZERO, DEFAULT_NODE_SIZE),
        }
    }

    /// Set the canvas rectangle
    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    /// The hosted node
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Index assigned by the owning patch
    pub fn index(&self) -> NodeHostIndex {
        self.index
    }

    /// Canvas rectangle
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Move or resize the host
    pub fn set_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }

    /// Move the host by `offset`
    pub fn translate(&mut self, offset: Vec2) {
        self.bounds = self.bounds.translate(offset);
    }

    /// Hit test in canvas coordinates
    pub fn contains(&self, position: Pos2) -> bool {
        self.bounds.contains(position)
    }

    /// Find an input pin of the hosted node by name
    pub fn input_pin(&self, name: &str) -> Option<Rc<Pin>> {
        self.node.input_pin(name)
    }

    /// Where links leave this host
    pub fn output_anchor(&self) -> Pos2 {
        Pos2::new(self.bounds.right(), self.bounds.top() + HEADER_HEIGHT / 2.0)
    }

    /// Where a link into the `row`-th input arrives
    pub fn input_anchor(&self, row: usize) -> Pos2 {
        let y = self.bounds.top() + HEADER_HEIGHT + row as f32 * PIN_ROW_HEIGHT + PIN_ROW_HEIGHT / 2.0;
        Pos2::new(self.bounds.left(), y)
    }

    /// Anchor for a specific pin.
    ///
    /// Own pins come first, exposed pins of a nested patch follow them.
    pub fn input_anchor_for(&self, pin: &Rc<Pin>) -> Pos2 {
        let own = self.node.input_pins();
        if let Some(row) = own.iter().position(|p| Rc::ptr_eq(p, pin)) {
            return self.input_anchor(row);
        }

        let node = self.node.borrow();
        let row = node
            .as_patch()
            .and_then(|patch| {
                patch
                    .exposed_pins()
                    .position(|exposed| exposed.is_pin(pin))
            })
            .unwrap_or(0);
        self.input_anchor(own.len() + row)
    }

    pub(crate) fn set_index(&mut self, index: Option<NodeHostIndex>) {
        if let Some(index) = index {
            self.index = index;
        }
        self.node.set_host_index(index);
    }
}
