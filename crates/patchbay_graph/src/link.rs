// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link hosts: renderable views of pin connections.

use crate::node_host::NodeHostIndex;
use crate::patch::Patch;
use crate::pin::{Pin, PinError};
use egui::Pos2;
use serde::{Deserialize, Serialize};
use std::rc::{Rc, Weak};

/// Allocation index of a link host within one rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkHostIndex(pub u32);

/// A resolved connection from a source host into a pin of a target host
#[derive(Debug, Clone)]
pub struct ObservedLinkHost {
    source: NodeHostIndex,
    target: NodeHostIndex,
    pin: Weak<Pin>,
    pin_name: String,
}

impl ObservedLinkHost {
    /// Observe the connection of `pin`
    pub fn new(source: NodeHostIndex, target: NodeHostIndex, pin: &Rc<Pin>) -> Self {
        Self {
            source,
            target,
            pin: Rc::downgrade(pin),
            pin_name: pin.name().to_string(),
        }
    }

    /// Host feeding the pin
    pub fn source(&self) -> NodeHostIndex {
        self.source
    }

    /// Host owning (or exposing) the pin
    pub fn target(&self) -> NodeHostIndex {
        self.target
    }

    /// The observed pin, if it still exists
    pub fn pin(&self) -> Option<Rc<Pin>> {
        self.pin.upgrade()
    }

    /// Name of the observed pin
    pub fn pin_name(&self) -> &str {
        &self.pin_name
    }

    /// Check if this link involves a specific host
    pub fn involves_node(&self, index: NodeHostIndex) -> bool {
        self.source == index || self.target == index
    }

    /// Whether the pin is still fed by the source host in `patch`
    pub fn is_live(&self, patch: &Patch) -> bool {
        match (self.pin(), patch.get_node_host(self.source)) {
            (Some(pin), Some(source)) => pin.is_connected_to(source.node()),
            _ => false,
        }
    }

    /// Start and end points on the canvas
    pub fn endpoints(&self, patch: &Patch) -> Option<(Pos2, Pos2)> {
        let source = patch.get_node_host(self.source)?;
        let target = patch.get_node_host(self.target)?;
        let pin = self.pin()?;
        Some((source.output_anchor(), target.input_anchor_for(&pin)))
    }
}

/// The in-progress end of a connection drag.
///
/// The target pin is fixed when the drag begins. The source end floats with
/// the cursor and snaps to whichever host is under it.
#[derive(Debug, Clone)]
pub struct TemporaryLinkHost {
    target: NodeHostIndex,
    pin: Weak<Pin>,
    pin_name: String,
    source: Option<NodeHostIndex>,
    cursor: Pos2,
}

impl TemporaryLinkHost {
    /// Begin a drag from `pin` on the `target` host
    pub fn new(target: NodeHostIndex, pin: &Rc<Pin>, cursor: Pos2) -> Self {
        Self {
            target,
            pin: Rc::downgrade(pin),
            pin_name: pin.name().to_string(),
            source: None,
            cursor,
        }
    }

    /// Host owning the pin being connected
    pub fn target(&self) -> NodeHostIndex {
        self.target
    }

    /// The pin being connected
    pub fn pin(&self) -> Option<Rc<Pin>> {
        self.pin.upgrade()
    }

    /// Name of the pin being connected
    pub fn pin_name(&self) -> &str {
        &self.pin_name
    }

    /// Candidate source under the cursor
    pub fn source(&self) -> Option<NodeHostIndex> {
        self.source
    }

    /// Set the candidate source
    pub fn set_source(&mut self, source: Option<NodeHostIndex>) {
        self.source = source;
    }

    /// Floating end position
    pub fn cursor(&self) -> Pos2 {
        self.cursor
    }

    /// Move the floating end
    pub fn set_cursor_position(&mut self, cursor: Pos2) {
        self.cursor = cursor;
    }

    /// Make the actual pin connection to the candidate source.
    ///
    /// Returns `Ok(false)` when there is no candidate or the pin is gone.
    pub fn flush_connection(&self, patch: &Patch) -> Result<bool, PinError> {
        let Some(pin) = self.pin() else {
            return Ok(false);
        };
        let Some(source) = self.source.and_then(|index| patch.get_node_host(index)) else {
            return Ok(false);
        };
        pin.connect(source.node())?;
        Ok(true)
    }

    /// Start and end points on the canvas
    pub fn endpoints(&self, patch: &Patch) -> Option<(Pos2, Pos2)> {
        let target = patch.get_node_host(self.target)?;
        let pin = self.pin()?;
        let start = self
            .source
            .and_then(|index| patch.get_node_host(index))
            .map_or(self.cursor, |source| source.output_anchor());
        Some((start, target.input_anchor_for(&pin)))
    }
}

/// A link as seen by the view layer
#[derive(Debug, Clone)]
pub enum LinkHost {
    /// Tracks a live pin connection
    Observed(ObservedLinkHost),
    /// The end of a connection being dragged
    Temporary(TemporaryLinkHost),
}

impl LinkHost {
    /// Host owning the target pin
    pub fn target(&self) -> NodeHostIndex {
        match self {
            Self::Observed(link) => link.target(),
            Self::Temporary(link) => link.target(),
        }
    }

    /// Source host, if resolved
    pub fn source(&self) -> Option<NodeHostIndex> {
        match self {
            Self::Observed(link) => Some(link.source()),
            Self::Temporary(link) => link.source(),
        }
    }

    /// Name of the target pin
    pub fn pin_name(&self) -> &str {
        match self {
            Self::Observed(link) => link.pin_name(),
            Self::Temporary(link) => link.pin_name(),
        }
    }

    /// Observed variant
    pub fn as_observed(&self) -> Option<&ObservedLinkHost> {
        match self {
            Self::Observed(link) => Some(link),
            Self::Temporary(_) => None,
        }
    }

    /// Temporary variant
    pub fn as_temporary(&self) -> Option<&TemporaryLinkHost> {
        match self {
            Self::Temporary(link) => Some(link),
            Self::Observed(_) => None,
        }
    }

    /// Start and end points on the canvas
    pub fn endpoints(&self, patch: &Patch) -> Option<(Pos2, Pos2)> {
        match self {
            Self::Observed(link) => link.endpoints(patch),
            Self::Temporary(link) => link.endpoints(patch),
        }
    }
}
