// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph model for the Patchbay node editor.
//!
//! A [`Patch`] owns a set of [`NodeHost`]s, each carrying one node. Nodes
//! declare typed input [`Pin`]s which hold a weak reference to their source
//! node; the links drawn between hosts are derived from that pin state and
//! rebuilt after every structural change.
//!
//! ## Architecture
//!
//! - [`pin`]: typed inputs and the connection protocol
//! - [`node`]: the [`Node`] trait, shared node cells and described nodes
//! - [`node_host`] / [`link`]: canvas placement and link views
//! - [`registry`]: type name to constructor lookup
//! - [`patch`] / [`patchlet`]: the container and its JSON document format
//! - [`nodes`]: the built-in node catalogue
//!
//! Everything is single-threaded; shared ownership uses `Rc`/`Weak`.

pub mod clipboard;
pub mod link;
pub mod node;
pub mod node_host;
pub mod nodes;
pub mod patch;
pub mod patchlet;
pub mod pin;
pub mod registry;

pub use clipboard::{Clipboard, LocalClipboard};
pub use link::{LinkHost, LinkHostIndex, ObservedLinkHost, TemporaryLinkHost};
pub use node::{DescribedNode, Node, NodeCategory, NodeError, NodeInstance, NodeRef, NodeType};
pub use node_host::{NodeHost, NodeHostIndex, DEFAULT_NODE_SIZE};
pub use nodes::create_default_registry;
pub use patch::{
    DuplicateDirection, GestureOutcome, Patch, PatchError, PatchId, DEFAULT_PASTE_OFFSET,
};
pub use patchlet::{PatchDocument, PatchletFailure, PatchletReport};
pub use pin::{Pin, PinError, PinType};
pub use registry::{NodeFactory, NodeRegistry};
