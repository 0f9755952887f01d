// SPDX-License-Identifier: MIT OR Apache-2.0
//! Patch container: hosted nodes, derived links and nesting.

use crate::clipboard::Clipboard;
use crate::link::{LinkHost, LinkHostIndex, ObservedLinkHost, TemporaryLinkHost};
use crate::node::{Node, NodeError, NodeInstance, NodeRef};
use crate::node_host::{NodeHost, NodeHostIndex, DEFAULT_NODE_SIZE};
use crate::patchlet::{CanvasRecord, NodeRecord, PatchDocument, PatchletReport, PinRecord};
use crate::pin::{Pin, PinError, PinType};
use crate::registry::NodeRegistry;
use egui::{PointerButton, Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// Registry type name of a nested patch
pub const PATCH_TYPE_NAME: &str = "Patch";

/// Offset applied to pasted nodes so they never cover their originals
pub const DEFAULT_PASTE_OFFSET: Vec2 = Vec2::new(20.0, 20.0);

/// Unique identifier for a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchId(pub Uuid);

impl PatchId {
    /// Create a new random patch ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A child pin presented by this patch to its parent
#[derive(Debug, Clone)]
pub struct ExposedPin {
    pin: Weak<Pin>,
    node: Weak<NodeInstance>,
}

impl ExposedPin {
    /// The exposed pin, if it still exists
    pub fn pin(&self) -> Option<Rc<Pin>> {
        self.pin.upgrade()
    }

    /// The node owning the pin, if it still exists
    pub fn node(&self) -> Option<NodeRef> {
        self.node.upgrade()
    }

    /// Whether this entry is for `pin`
    pub fn is_pin(&self, pin: &Rc<Pin>) -> bool {
        std::ptr::eq(self.pin.as_ptr(), Rc::as_ptr(pin))
    }
}

/// A pin waiting to be connected to a host index
#[derive(Debug, Clone)]
pub struct DelayedConnection {
    pin: Weak<Pin>,
    source: NodeHostIndex,
}

impl DelayedConnection {
    /// Queue `pin` for connection to the host at `source`
    pub fn new(pin: &Rc<Pin>, source: NodeHostIndex) -> Self {
        Self {
            pin: Rc::downgrade(pin),
            source,
        }
    }

    /// The pin to connect, if it still exists
    pub fn pin(&self) -> Option<Rc<Pin>> {
        self.pin.upgrade()
    }

    /// Index of the source host
    pub fn source(&self) -> NodeHostIndex {
        self.source
    }
}

/// Result of releasing a connection drag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// The pin was connected
    Committed,
    /// The temporary link was discarded
    Cancelled,
    /// Nothing was being dragged, or the button does not end a drag
    Ignored,
}

/// Where a duplicated patch is placed relative to the original
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicateDirection {
    /// Below the current canvas extents
    #[default]
    Down,
    /// Right of the current canvas extents
    Right,
}

/// A graph of hosted nodes
#[derive(Debug)]
pub struct Patch {
    id: PatchId,
    parent: Option<PatchId>,
    node_hosts: BTreeMap<NodeHostIndex, NodeHost>,
    next_node_host_index: u64,
    link_hosts: BTreeMap<LinkHostIndex, LinkHost>,
    observed_revision: u64,
    exposed_pins: Vec<ExposedPin>,
    selection: Option<NodeHostIndex>,
    new_link: Option<TemporaryLinkHost>,
    delayed_connections: Vec<DelayedConnection>,
    parent_connections: Vec<DelayedConnection>,
    scroll: Vec2,
}

impl Patch {
    /// Create an empty root patch
    pub fn new() -> Self {
        Self {
            id: PatchId::new(),
            parent: None,
            node_hosts: BTreeMap::new(),
            next_node_host_index: 0,
            link_hosts: BTreeMap::new(),
            observed_revision: 0,
            exposed_pins: Vec::new(),
            selection: None,
            new_link: None,
            delayed_connections: Vec::new(),
            parent_connections: Vec::new(),
            scroll: Vec2::ZERO,
        }
    }

    /// Patch identity
    pub fn id(&self) -> PatchId {
        self.id
    }

    /// Identity of the patch hosting this one
    pub fn parent(&self) -> Option<PatchId> {
        self.parent
    }

    /// Whether this patch is not nested
    pub fn is_root_patch(&self) -> bool {
        self.parent.is_none()
    }

    // ----------
    // Node hosts
    // ----------

    /// Index the next implicitly placed host will get, `None` once every
    /// index has been handed out
    pub fn next_free_node_host_index(&self) -> Option<NodeHostIndex> {
        u32::try_from(self.next_node_host_index).ok().map(NodeHostIndex)
    }

    fn allocate_node_host_index(&mut self) -> Result<NodeHostIndex, PatchError> {
        let index = self
            .next_free_node_host_index()
            .ok_or(PatchError::IndexSpaceExhausted)?;
        self.next_node_host_index += 1;
        Ok(index)
    }

    /// Take ownership of `host` and place it at `index`
    pub fn add_node_host(&mut self, mut host: NodeHost, index: NodeHostIndex) -> Result<(), PatchError> {
        if self.node_hosts.contains_key(&index) {
            return Err(PatchError::IndexInUse(index));
        }

        host.set_index(Some(index));
        {
            let mut node = host.node().borrow_mut();
            if let Some(child) = node.as_patch_mut() {
                child.parent = Some(self.id);
                self.delayed_connections.append(&mut child.parent_connections);
            }
        }

        self.next_node_host_index = self.next_node_host_index.max(u64::from(index.0) + 1);
        tracing::debug!(
            "Patch {}: added [{}] as node host {index}",
            self.id,
            host.node().type_name()
        );
        self.node_hosts.insert(index, host);
        self.rebuild_link_hosts();
        Ok(())
    }

    /// Add `host` at the next free index
    pub fn push_node_host(&mut self, host: NodeHost) -> Result<NodeHostIndex, PatchError> {
        let index = self
            .next_free_node_host_index()
            .ok_or(PatchError::IndexSpaceExhausted)?;
        self.add_node_host(host, index)?;
        Ok(index)
    }

    /// Host `node` with the given bounds at the next free index
    pub fn add_node(&mut self, node: NodeRef, bounds: Rect) -> Result<NodeHostIndex, PatchError> {
        self.push_node_host(NodeHost::new(node).with_bounds(bounds))
    }

    /// Host `node` with the given bounds at `index`
    pub fn add_node_at(&mut self, index: NodeHostIndex, node: NodeRef, bounds: Rect) -> Result<(), PatchError> {
        self.add_node_host(NodeHost::new(node).with_bounds(bounds), index)
    }

    /// Create a node through the registry and place it at `position`
    pub fn add_new_node(
        &mut self,
        registry: &NodeRegistry,
        type_name: &str,
        position: Pos2,
    ) -> Result<NodeHostIndex, PatchError> {
        let node = registry.create(type_name)?;
        self.add_node(node, Rect::from_min_size(position, DEFAULT_NODE_SIZE))
    }

    /// Get a host by index
    pub fn get_node_host(&self, index: NodeHostIndex) -> Option<&NodeHost> {
        self.node_hosts.get(&index)
    }

    /// Get a mutable host by index
    pub fn get_node_host_mut(&mut self, index: NodeHostIndex) -> Option<&mut NodeHost> {
        self.node_hosts.get_mut(&index)
    }

    /// Find the host carrying `node`
    pub fn find_node_host(&self, node: &NodeRef) -> Option<&NodeHost> {
        self.node_hosts
            .values()
            .find(|host| Rc::ptr_eq(host.node(), node))
    }

    /// All hosts, ordered by index
    pub fn node_hosts(&self) -> &BTreeMap<NodeHostIndex, NodeHost> {
        &self.node_hosts
    }

    /// Topmost host under a canvas position
    pub fn node_host_under(&self, position: Pos2) -> Option<NodeHostIndex> {
        self.node_hosts
            .values()
            .rev()
            .find(|host| host.contains(position))
            .map(NodeHost::index)
    }

    /// Bounding rectangle of every host
    pub fn canvas_extents(&self) -> Rect {
        self.node_hosts
            .values()
            .map(NodeHost::bounds)
            .reduce(|a, b| a.union(b))
            .unwrap_or(Rect::ZERO)
    }

    /// Canvas scroll offset
    pub fn scroll(&self) -> Vec2 {
        self.scroll
    }

    /// Set the canvas scroll offset
    pub fn set_scroll(&mut self, scroll: Vec2) {
        self.scroll = scroll;
    }

    // ----------
    // Links
    // ----------

    /// Current links, ordered by allocation
    pub fn link_hosts(&self) -> &BTreeMap<LinkHostIndex, LinkHost> {
        &self.link_hosts
    }

    /// Rebuild every link from pin state.
    ///
    /// Links are emitted by target host index, then pin declaration order,
    /// then the exposed pins of a nested patch in exposure order.
    pub fn rebuild_link_hosts(&mut self) {
        let mut links = Vec::new();
        for (target_index, target_host) in &self.node_hosts {
            let target_node = target_host.node();
            for pin in target_node.input_pins() {
                links.extend(self.resolve_link(*target_index, &pin));
            }

            let node = target_node.borrow();
            if let Some(child) = node.as_patch() {
                for pin in child.exposed_pins().filter_map(ExposedPin::pin) {
                    links.extend(self.resolve_link(*target_index, &pin));
                }
            }
        }

        self.link_hosts = links
            .into_iter()
            .enumerate()
            .map(|(i, link)| (LinkHostIndex(i as u32), LinkHost::Observed(link)))
            .collect();
        self.observed_revision = self.observed_pin_revision();
        tracing::debug!("Patch {}: rebuilt {} link hosts", self.id, self.link_hosts.len());
    }

    fn resolve_link(&self, target: NodeHostIndex, pin: &Rc<Pin>) -> Option<ObservedLinkHost> {
        let source = pin.source_node()?;
        let source_host = self.find_node_host(&source)?;
        Some(ObservedLinkHost::new(source_host.index(), target, pin))
    }

    fn observed_pin_revision(&self) -> u64 {
        let mut revision = 0u64;
        for host in self.node_hosts.values() {
            for pin in host.node().input_pins() {
                revision = revision.wrapping_add(pin.revision());
            }
            let node = host.node().borrow();
            if let Some(child) = node.as_patch() {
                for pin in child.exposed_pins().filter_map(ExposedPin::pin) {
                    revision = revision.wrapping_add(pin.revision());
                }
            }
        }
        revision
    }

    // ----------
    // Connections
    // ----------

    /// Connect `pin` to the node hosted at `source`.
    ///
    /// With `delay` the request is queued and applied on the next update,
    /// which lets a load wire nodes that do not exist yet.
    pub fn connect_pin(&mut self, pin: &Rc<Pin>, source: NodeHostIndex, delay: bool) -> Result<(), PatchError> {
        if delay {
            self.delayed_connections.push(DelayedConnection::new(pin, source));
            return Ok(());
        }
        self.connect_now(pin, source)?;
        self.rebuild_link_hosts();
        Ok(())
    }

    fn connect_now(&self, pin: &Rc<Pin>, source: NodeHostIndex) -> Result<(), PatchError> {
        let host = self
            .get_node_host(source)
            .ok_or(PatchError::NodeHostNotFound(source))?;
        pin.connect(host.node())?;
        Ok(())
    }

    /// Disconnect `pin`
    pub fn disconnect_pin(&mut self, pin: &Rc<Pin>) {
        pin.disconnect();
        self.rebuild_link_hosts();
    }

    /// Drop the connection of a pin shown on the `target` host
    pub fn drop_input_connection(&mut self, target: NodeHostIndex, pin_name: &str) -> Result<(), PatchError> {
        let pin = self
            .visible_pin(target, pin_name)
            .ok_or_else(|| PatchError::PinNotFound {
                host: target,
                pin: pin_name.to_string(),
            })?;
        self.disconnect_pin(&pin);
        Ok(())
    }

    /// A pin connectable from this patch on the `target` host, by name
    pub fn visible_pin(&self, target: NodeHostIndex, pin_name: &str) -> Option<Rc<Pin>> {
        let host = self.get_node_host(target)?;
        if let Some(pin) = host.input_pin(pin_name).filter(|pin| !pin.is_exposed()) {
            return Some(pin);
        }
        let node = host.node().borrow();
        let child = node.as_patch()?;
        let found = child
            .exposed_pins()
            .filter_map(ExposedPin::pin)
            .find(|pin| pin.name() == pin_name);
        found
    }

    /// Number of queued connections
    pub fn delayed_connection_count(&self) -> usize {
        self.delayed_connections.len()
    }

    /// Number of exposed-pin connections waiting for a parent
    pub fn pending_parent_connections(&self) -> usize {
        self.parent_connections.len()
    }

    /// Hand over the exposed-pin connections that must be made by the parent
    pub fn take_parent_connections(&mut self) -> Vec<DelayedConnection> {
        std::mem::take(&mut self.parent_connections)
    }

    // ----------
    // Exposure
    // ----------

    /// Present `pin` of `node` to the parent patch
    pub fn expose_pin(&mut self, pin: &Rc<Pin>, node: &NodeRef) {
        self.unexpose_pin(pin);
        pin.set_exposed(true);
        self.exposed_pins.push(ExposedPin {
            pin: Rc::downgrade(pin),
            node: Rc::downgrade(node),
        });
        tracing::debug!("Patch {}: exposed pin [{}]", self.id, pin.name());
    }

    /// Stop presenting `pin` to the parent patch
    pub fn unexpose_pin(&mut self, pin: &Rc<Pin>) -> bool {
        let Some(position) = self.exposed_pins.iter().position(|e| e.is_pin(pin)) else {
            return false;
        };
        self.exposed_pins.remove(position);
        pin.set_exposed(false);
        true
    }

    /// Exposed pins, in exposure order
    pub fn exposed_pins(&self) -> impl Iterator<Item = &ExposedPin> + '_ {
        self.exposed_pins.iter()
    }

    /// Whether `pin` is exposed by this patch
    pub fn is_pin_exposed(&self, pin: &Rc<Pin>) -> bool {
        self.exposed_pins.iter().any(|e| e.is_pin(pin))
    }

    // ----------
    // Selection
    // ----------

    /// Select the host at `index`
    pub fn select(&mut self, index: NodeHostIndex) -> bool {
        let exists = self.node_hosts.contains_key(&index);
        self.selection = exists.then_some(index);
        exists
    }

    /// Clear the selection
    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// The selected host, if it still exists
    pub fn selection(&self) -> Option<&NodeHost> {
        self.selection.and_then(|index| self.get_node_host(index))
    }

    /// Delete the selected host
    pub fn delete_selection(&mut self) -> Option<NodeHostIndex> {
        let index = self.selection.take()?;
        let mut host = self.node_hosts.remove(&index)?;
        host.set_index(None);
        drop(host);

        self.exposed_pins.retain(|exposed| exposed.pin().is_some());
        if self.new_link.as_ref().is_some_and(|link| link.target() == index) {
            self.new_link = None;
        }

        tracing::info!("Patch {}: deleted node host {index}", self.id);
        self.rebuild_link_hosts();
        Some(index)
    }

    // ----------
    // Connection gesture
    // ----------

    /// Start dragging a connection from `pin` on the `target` host.
    ///
    /// Ignored unless the pin is connectable from this patch: own pins that
    /// are not exposed, or pins exposed by a nested patch on that host.
    pub fn begin_make_connection(&mut self, target: NodeHostIndex, pin: &Rc<Pin>) -> bool {
        let Some(host) = self.node_hosts.get(&target) else {
            return false;
        };
        if !Self::is_pin_visible(host, pin) {
            tracing::debug!(
                "Patch {}: pin [{}] is not connectable here",
                self.id,
                pin.name()
            );
            return false;
        }

        let cursor = host.input_anchor_for(pin);
        self.new_link = Some(TemporaryLinkHost::new(target, pin, cursor));
        true
    }

    fn is_pin_visible(host: &NodeHost, pin: &Rc<Pin>) -> bool {
        if host.node().input_pins().iter().any(|p| Rc::ptr_eq(p, pin)) {
            return !pin.is_exposed();
        }
        let node = host.node().borrow();
        node.as_patch().is_some_and(|child| child.is_pin_exposed(pin))
    }

    /// Track the cursor while dragging
    pub fn drag_make_connection(&mut self, cursor: Pos2) {
        let candidate = self.node_host_under(cursor);
        if let Some(link) = &mut self.new_link {
            link.set_cursor_position(cursor);
            let target = link.target();
            link.set_source(candidate.filter(|index| *index != target));
        }
    }

    /// Finish dragging.
    ///
    /// Primary commits when a source candidate exists, secondary always
    /// cancels. Other buttons leave the drag in progress.
    pub fn release_make_connection(&mut self, button: PointerButton) -> Result<GestureOutcome, PatchError> {
        match button {
            PointerButton::Secondary => Ok(match self.new_link.take() {
                Some(_) => GestureOutcome::Cancelled,
                None => GestureOutcome::Ignored,
            }),
            PointerButton::Primary => {
                let Some(link) = self.new_link.take() else {
                    return Ok(GestureOutcome::Ignored);
                };
                if link.flush_connection(self)? {
                    self.rebuild_link_hosts();
                    Ok(GestureOutcome::Committed)
                } else {
                    Ok(GestureOutcome::Cancelled)
                }
            }
            _ => Ok(GestureOutcome::Ignored),
        }
    }

    /// The connection being dragged
    pub fn new_link(&self) -> Option<&TemporaryLinkHost> {
        self.new_link.as_ref()
    }

    // ----------
    // Update
    // ----------

    /// Advance one tick: update nodes, collect exposed connections from
    /// nested patches, apply delayed connections, and rebuild links if any
    /// observed pin changed.
    pub fn update(&mut self) {
        // Without a parent, exposed pins are wired in this patch.
        if self.is_root_patch() {
            self.delayed_connections.append(&mut self.parent_connections);
        }

        for host in self.node_hosts.values() {
            let mut node = host.node().borrow_mut();
            node.update();
            if let Some(child) = node.as_patch_mut() {
                self.delayed_connections.append(&mut child.parent_connections);
            }
        }

        if !self.delayed_connections.is_empty() {
            let delayed = std::mem::take(&mut self.delayed_connections);
            for connection in delayed {
                let Some(pin) = connection.pin() else {
                    continue;
                };
                if let Err(e) = self.connect_now(&pin, connection.source()) {
                    tracing::warn!(
                        "Patch {}: dropping delayed connection of [{}]: {e}",
                        self.id,
                        pin.name()
                    );
                }
            }
            self.rebuild_link_hosts();
        } else if self.observed_pin_revision() != self.observed_revision {
            self.rebuild_link_hosts();
        }
    }

    // ----------
    // Serialization
    // ----------

    /// Serialize the whole patch
    pub fn serialize(&self) -> Result<Value, PatchError> {
        self.to_document()?.to_value()
    }

    /// Serialize the whole patch as pretty JSON text
    pub fn to_json_string(&self) -> Result<String, PatchError> {
        Ok(serde_json::to_string_pretty(&self.to_document()?)?)
    }

    /// Build the document for the whole patch
    pub fn to_document(&self) -> Result<PatchDocument, PatchError> {
        let mut document = PatchDocument {
            nodes: Map::new(),
            canvas: Some(CanvasRecord { scroll: self.scroll }),
        };
        for host in self.node_hosts.values() {
            document.insert(&Self::node_record(host)?)?;
        }
        Ok(document)
    }

    fn node_record(host: &NodeHost) -> Result<NodeRecord, PatchError> {
        let node = host.node();
        let mut fields = Map::new();
        node.borrow().serialize_fields(&mut fields)?;

        let input_pins = node
            .input_pins()
            .iter()
            .map(|pin| {
                let record = PinRecord {
                    exposed: pin.is_exposed(),
                    source_node: pin.source_host_index(),
                };
                (pin.name().to_string(), record)
            })
            .collect();

        Ok(NodeRecord {
            id: host.index(),
            type_name: node.type_name().to_string(),
            bounds: host.bounds(),
            input_pins,
            fields,
        })
    }

    /// Replace the contents of this patch with a serialized patch
    pub fn deserialize(&mut self, json: &Value, registry: &NodeRegistry) -> Result<PatchletReport, PatchError> {
        let document = PatchDocument::from_value(json)?;
        self.clear();
        let report = self.insert_document(&document, registry, false, Vec2::ZERO);
        if let Some(canvas) = document.canvas {
            self.scroll = canvas.scroll;
        }
        Ok(report)
    }

    fn clear(&mut self) {
        for host in self.node_hosts.values_mut() {
            host.set_index(None);
        }
        self.node_hosts.clear();
        self.link_hosts.clear();
        self.exposed_pins.clear();
        self.selection = None;
        self.new_link = None;
        self.delayed_connections.clear();
        self.parent_connections.clear();
    }

    /// Insert a serialized patchlet into this patch.
    ///
    /// With `use_new_ids` every node gets a freshly allocated index and
    /// links between inserted nodes are remapped. Bounds are moved by
    /// `offset`. Connections are queued and applied on the next update.
    pub fn insert_patchlet(
        &mut self,
        json: &Value,
        registry: &NodeRegistry,
        use_new_ids: bool,
        offset: Vec2,
    ) -> Result<PatchletReport, PatchError> {
        let document = PatchDocument::from_value(json)?;
        Ok(self.insert_document(&document, registry, use_new_ids, offset))
    }

    /// Insert an already parsed patchlet, see [`Patch::insert_patchlet`]
    pub fn insert_document(
        &mut self,
        document: &PatchDocument,
        registry: &NodeRegistry,
        use_new_ids: bool,
        offset: Vec2,
    ) -> PatchletReport {
        let mut report = PatchletReport::default();
        let mut reassigned: HashMap<NodeHostIndex, NodeHostIndex> = HashMap::new();
        let mut loaded = Vec::new();
        let queued = self.delayed_connections.len();

        for (key, record) in document.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    report.fail(key, e);
                    continue;
                }
            };

            let index = if use_new_ids {
                let index = match self.allocate_node_host_index() {
                    Ok(index) => index,
                    Err(e) => {
                        report.fail(key, e);
                        continue;
                    }
                };
                reassigned.insert(record.id, index);
                index
            } else {
                record.id
            };

            match self.insert_node_record(&record, registry, index, offset) {
                Ok(()) => {
                    report.inserted.push(index);
                    loaded.push((key, index, record));
                }
                Err(e) => report.fail(key, e),
            }
        }

        // Nested patches hand over their exposed connections with the
        // indices they were saved with.
        if use_new_ids {
            for connection in &mut self.delayed_connections[queued..] {
                if let Some(index) = reassigned.get(&connection.source) {
                    connection.source = *index;
                }
            }
        }

        for (key, index, record) in &loaded {
            let Some(node) = self.get_node_host(*index).map(|host| host.node().clone()) else {
                continue;
            };

            for pin in node.input_pins() {
                let Some(pin_record) = record.input_pins.get(pin.name()) else {
                    continue;
                };
                if pin_record.exposed {
                    self.expose_pin(&pin, &node);
                }
                let Some(source) = pin_record.source_node else {
                    continue;
                };

                if !pin_record.exposed {
                    let source = if use_new_ids {
                        reassigned.get(&source).copied().unwrap_or(source)
                    } else {
                        source
                    };
                    self.delayed_connections.push(DelayedConnection::new(&pin, source));
                } else if use_new_ids {
                    tracing::error!(
                        "Patch {}: cannot connect exposed pin [{}] with reassigned IDs",
                        self.id,
                        pin.name()
                    );
                    report.fail(
                        key.clone(),
                        PatchError::ExposedPinRemap {
                            pin: pin.name().to_string(),
                            source_node: source,
                        },
                    );
                } else {
                    self.parent_connections.push(DelayedConnection::new(&pin, source));
                }
            }
        }

        self.rebuild_link_hosts();
        tracing::info!(
            "Patch {}: inserted {} node hosts ({} failed, {} connections queued)",
            self.id,
            report.inserted.len(),
            report.failures.len(),
            self.delayed_connections.len()
        );
        report
    }

    fn insert_node_record(
        &mut self,
        record: &NodeRecord,
        registry: &NodeRegistry,
        index: NodeHostIndex,
        offset: Vec2,
    ) -> Result<(), PatchError> {
        let mut host = registry.make_node_host(record)?;
        if offset != Vec2::ZERO {
            host.translate(offset);
        }
        self.add_node_host(host, index)
    }

    // ----------
    // Clipboard
    // ----------

    /// Copy the selected host to the clipboard as a patchlet
    pub fn copy(&self, clipboard: &mut dyn Clipboard) -> Result<(), PatchError> {
        let host = self.selection().ok_or(PatchError::NothingSelected)?;
        let mut document = PatchDocument::default();
        document.insert(&Self::node_record(host)?)?;
        clipboard.set_text(serde_json::to_string_pretty(&document)?);
        tracing::info!("Patch {}: copied node host {}", self.id, host.index());
        Ok(())
    }

    /// Copy the selected host, then delete it
    pub fn cut(&mut self, clipboard: &mut dyn Clipboard) -> Result<(), PatchError> {
        self.copy(clipboard)?;
        self.delete_selection();
        Ok(())
    }

    /// Paste the clipboard with new IDs at the default offset
    pub fn paste(&mut self, clipboard: &dyn Clipboard, registry: &NodeRegistry) -> Result<PatchletReport, PatchError> {
        self.paste_with_offset(clipboard, registry, DEFAULT_PASTE_OFFSET)
    }

    /// Paste the clipboard with new IDs, moved by `offset`
    pub fn paste_with_offset(
        &mut self,
        clipboard: &dyn Clipboard,
        registry: &NodeRegistry,
        offset: Vec2,
    ) -> Result<PatchletReport, PatchError> {
        let text = clipboard
            .text()
            .ok_or_else(|| PatchError::MalformedPatchlet("clipboard is empty".to_string()))?;
        let document = PatchDocument::from_text(&text)?;
        Ok(self.insert_document(&document, registry, true, offset))
    }

    /// Insert a copy of the whole patch next to itself
    pub fn duplicate(&mut self, registry: &NodeRegistry, direction: DuplicateDirection) -> Result<PatchletReport, PatchError> {
        let extents = self.canvas_extents();
        let offset = match direction {
            DuplicateDirection::Down => Vec2::new(0.0, extents.height()),
            DuplicateDirection::Right => Vec2::new(extents.width(), 0.0),
        };
        self.duplicate_with_offset(registry, offset)
    }

    /// Insert a copy of the whole patch moved by `offset`
    pub fn duplicate_with_offset(&mut self, registry: &NodeRegistry, offset: Vec2) -> Result<PatchletReport, PatchError> {
        let document = self.to_document()?;
        Ok(self.insert_document(&document, registry, true, offset))
    }
}

impl Default for Patch {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for Patch {
    fn type_name(&self) -> &str {
        PATCH_TYPE_NAME
    }

    fn output_type(&self) -> PinType {
        PinType::Patch
    }

    fn serialize_fields(&self, json: &mut Map<String, Value>) -> Result<(), NodeError> {
        let document = self
            .to_document()
            .map_err(|e| NodeError::MalformedRecord(e.to_string()))?;
        json.insert("Nodes".to_string(), Value::Object(document.nodes));
        json.insert("Canvas".to_string(), serde_json::to_value(document.canvas)?);
        Ok(())
    }

    fn deserialize_fields(&mut self, json: &Map<String, Value>, registry: &NodeRegistry) -> Result<(), NodeError> {
        if !json.contains_key("Nodes") {
            return Ok(());
        }
        self.deserialize(&Value::Object(json.clone()), registry)
            .map_err(|e| NodeError::MalformedRecord(e.to_string()))?;
        Ok(())
    }

    fn update(&mut self) {
        Patch::update(self);
    }

    fn as_patch(&self) -> Option<&Patch> {
        Some(self)
    }

    fn as_patch_mut(&mut self) -> Option<&mut Patch> {
        Some(self)
    }
}

/// Error from a patch operation
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// No host at this index
    #[error("Node host with index [{0}] not found")]
    NodeHostNotFound(NodeHostIndex),

    /// Index already taken
    #[error("Node host index [{0}] is already in use")]
    IndexInUse(NodeHostIndex),

    /// No such pin is connectable on this host
    #[error("Pin [{pin}] not found on node host [{host}]")]
    PinNotFound {
        /// Host index
        host: NodeHostIndex,
        /// Pin name
        pin: String,
    },

    /// Exposed pin connections cannot be remapped
    #[error("Connecting exposed pin [{pin}] to [{source_node}] is not supported with reassigned IDs")]
    ExposedPinRemap {
        /// Pin name
        pin: String,
        /// Recorded source index
        source_node: NodeHostIndex,
    },

    /// Every node host index has been handed out
    #[error("No node host index is left to allocate")]
    IndexSpaceExhausted,

    /// Not a patchlet document
    #[error("Malformed patchlet: {0}")]
    MalformedPatchlet(String),

    /// Copy or cut without a selection
    #[error("Nothing is selected")]
    NothingSelected,

    /// Node construction or deserialization failed
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Pin connection failed
    #[error(transparent)]
    Pin(#[from] PinError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::LocalClipboard;
    use crate::node::{NodeCategory, NodeType};
    use serde_json::json;

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register_type(NodeType::new("A", NodeCategory::Utility));
        registry.register_type(NodeType::new("B", NodeCategory::Utility).with_input("in", PinType::Any));
        registry.register_type(
            NodeType::new("Item::Camera", NodeCategory::Item)
                .with_output(PinType::Camera)
                .with_parameter("Width", 1920),
        );
        registry.register_type(NodeType::new("Item::Board", NodeCategory::Item).with_output(PinType::Board));
        registry.register_type(
            NodeType::new("Procedure::Calibrate", NodeCategory::Procedure)
                .with_input("Camera", PinType::Camera)
                .with_input("Board", PinType::Board),
        );
        registry.register(PATCH_TYPE_NAME, NodeCategory::Patch, "Nested patch", Patch::new);
        registry
    }

    fn at(x: f32, y: f32) -> Rect {
        Rect::from_min_size(Pos2::new(x, y), DEFAULT_NODE_SIZE)
    }

    fn triples(patch: &Patch) -> Vec<(NodeHostIndex, NodeHostIndex, String)> {
        patch
            .link_hosts()
            .values()
            .filter_map(LinkHost::as_observed)
            .map(|link| (link.source(), link.target(), link.pin_name().to_string()))
            .collect()
    }

    /// Patch with A at 0 and B at 1, `B.in` fed by A
    fn a_to_b(registry: &NodeRegistry) -> Patch {
        let mut patch = Patch::new();
        let a = patch.add_new_node(registry, "A", Pos2::new(0.0, 0.0)).unwrap();
        let b = patch.add_new_node(registry, "B", Pos2::new(300.0, 0.0)).unwrap();
        let pin = patch.get_node_host(b).unwrap().input_pin("in").unwrap();
        patch.connect_pin(&pin, a, false).unwrap();
        patch
    }

    #[test]
    fn test_indices_increase_and_are_never_reused() {
        let registry = registry();
        let mut patch = Patch::new();
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(patch.add_new_node(&registry, "A", Pos2::ZERO).unwrap());
        }
        assert_eq!(seen, vec![NodeHostIndex(0), NodeHostIndex(1), NodeHostIndex(2)]);

        patch.select(NodeHostIndex(2));
        patch.delete_selection();
        let next = patch.add_new_node(&registry, "A", Pos2::ZERO).unwrap();
        assert_eq!(next, NodeHostIndex(3));

        patch
            .add_node_at(NodeHostIndex(10), registry.create("A").unwrap(), at(0.0, 0.0))
            .unwrap();
        assert_eq!(patch.next_free_node_host_index(), Some(NodeHostIndex(11)));
    }

    #[test]
    fn test_add_node_host_rejects_taken_index() {
        let registry = registry();
        let mut patch = Patch::new();
        patch.add_node_at(NodeHostIndex(0), registry.create("A").unwrap(), at(0.0, 0.0)).unwrap();
        let err = patch
            .add_node_at(NodeHostIndex(0), registry.create("A").unwrap(), at(0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, PatchError::IndexInUse(NodeHostIndex(0))));
        assert_eq!(patch.node_hosts().len(), 1);
    }

    #[test]
    fn test_lookup() {
        let registry = registry();
        let patch = a_to_b(&registry);
        assert!(patch.get_node_host(NodeHostIndex(7)).is_none());

        let b = patch.get_node_host(NodeHostIndex(1)).unwrap().node().clone();
        assert_eq!(patch.find_node_host(&b).unwrap().index(), NodeHostIndex(1));

        let stranger = registry.create("A").unwrap();
        assert!(patch.find_node_host(&stranger).is_none());
    }

    #[test]
    fn test_concrete_scenario() {
        let registry = registry();
        let mut patch = a_to_b(&registry);
        patch.rebuild_link_hosts();
        assert_eq!(
            triples(&patch),
            vec![(NodeHostIndex(0), NodeHostIndex(1), "in".to_string())]
        );

        let json = patch.serialize().unwrap();
        assert_eq!(json["Nodes"]["0"]["ID"], json!(0));
        assert_eq!(json["Nodes"]["1"]["ID"], json!(1));
        assert_eq!(json["Nodes"]["1"]["InputsPins"]["in"]["SourceNode"], json!(0));
        assert!(json["Nodes"]["1"]["InputsPins"]["in"].get("Exposed").is_none());

        let mut loaded = Patch::new();
        let report = loaded.deserialize(&json, &registry).unwrap();
        assert!(report.is_clean());
        assert_eq!(loaded.delayed_connection_count(), 1);
        assert!(loaded.link_hosts().is_empty());

        loaded.update();
        assert_eq!(loaded.delayed_connection_count(), 0);
        assert_eq!(
            triples(&loaded),
            vec![(NodeHostIndex(0), NodeHostIndex(1), "in".to_string())]
        );
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let registry = registry();
        let mut patch = a_to_b(&registry);
        let calibrate = patch.add_new_node(&registry, "Procedure::Calibrate", Pos2::ZERO).unwrap();
        let camera = patch.add_new_node(&registry, "Item::Camera", Pos2::ZERO).unwrap();
        let pin = patch.get_node_host(calibrate).unwrap().input_pin("Camera").unwrap();
        patch.connect_pin(&pin, camera, false).unwrap();

        patch.rebuild_link_hosts();
        let first = triples(&patch);
        patch.rebuild_link_hosts();
        assert_eq!(first, triples(&patch));
        assert_eq!(first.len(), 2);
        assert!(patch.link_hosts().contains_key(&LinkHostIndex(0)));
        assert!(patch.link_hosts().contains_key(&LinkHostIndex(1)));
    }

    #[test]
    fn test_round_trip_preserves_graph() {
        let registry = registry();
        let mut patch = a_to_b(&registry);
        let calibrate = patch.add_new_node(&registry, "Procedure::Calibrate", Pos2::new(50.0, 400.0)).unwrap();
        let node = patch.get_node_host(calibrate).unwrap().node().clone();
        let board_pin = node.input_pin("Board").unwrap();
        patch.expose_pin(&board_pin, &node);
        patch.set_scroll(Vec2::new(-30.0, 12.5));

        let json = patch.serialize().unwrap();
        let mut loaded = Patch::new();
        assert!(loaded.deserialize(&json, &registry).unwrap().is_clean());
        loaded.update();

        assert_eq!(loaded.scroll(), Vec2::new(-30.0, 12.5));
        let indices: Vec<_> = loaded.node_hosts().keys().copied().collect();
        assert_eq!(indices, patch.node_hosts().keys().copied().collect::<Vec<_>>());
        for (index, host) in patch.node_hosts() {
            let other = loaded.get_node_host(*index).unwrap();
            assert_eq!(host.node().type_name(), other.node().type_name());
            assert_eq!(host.bounds(), other.bounds());
            for pin in host.node().input_pins() {
                let other_pin = other.input_pin(pin.name()).unwrap();
                assert_eq!(pin.source_host_index(), other_pin.source_host_index());
                assert_eq!(pin.is_exposed(), other_pin.is_exposed());
            }
        }
        assert_eq!(triples(&patch), triples(&loaded));
        assert_eq!(loaded.serialize().unwrap(), json);
    }

    #[test]
    fn test_paste_single_node() {
        let registry = registry();
        let mut patch = Patch::new();
        let original = patch.add_new_node(&registry, "Item::Camera", Pos2::new(40.0, 60.0)).unwrap();
        let mut clipboard = LocalClipboard::new();

        patch.select(original);
        patch.copy(&mut clipboard).unwrap();
        let report = patch.paste(&clipboard, &registry).unwrap();

        assert_eq!(report.inserted.len(), 1);
        let pasted = report.inserted[0];
        assert_ne!(pasted, original);
        assert_eq!(patch.node_hosts().len(), 2);

        let original_bounds = patch.get_node_host(original).unwrap().bounds();
        let pasted_bounds = patch.get_node_host(pasted).unwrap().bounds();
        assert_eq!(pasted_bounds, original_bounds.translate(DEFAULT_PASTE_OFFSET));
    }

    #[test]
    fn test_paste_keeps_external_source() {
        let registry = registry();
        let mut patch = a_to_b(&registry);
        let mut clipboard = LocalClipboard::new();
        patch.select(NodeHostIndex(1));
        patch.copy(&mut clipboard).unwrap();

        let report = patch.paste(&clipboard, &registry).unwrap();
        patch.update();

        let pasted = patch.get_node_host(report.inserted[0]).unwrap();
        let pin = pasted.input_pin("in").unwrap();
        assert_eq!(pin.source_host_index(), Some(NodeHostIndex(0)));
        assert_eq!(patch.link_hosts().len(), 2);
    }

    #[test]
    fn test_cut_moves_selection_to_clipboard() {
        let registry = registry();
        let mut patch = a_to_b(&registry);
        let mut clipboard = LocalClipboard::new();

        assert!(matches!(patch.cut(&mut clipboard), Err(PatchError::NothingSelected)));
        assert!(clipboard.is_empty());

        patch.select(NodeHostIndex(0));
        patch.cut(&mut clipboard).unwrap();
        assert!(patch.get_node_host(NodeHostIndex(0)).is_none());
        assert!(!clipboard.is_empty());
    }

    #[test]
    fn test_malformed_paste_inserts_nothing() {
        let registry = registry();
        let mut patch = Patch::new();
        let mut clipboard = LocalClipboard::new();

        assert!(patch.paste(&clipboard, &registry).is_err());

        clipboard.set_text("[1, 2, 3]".to_string());
        assert!(matches!(
            patch.paste(&clipboard, &registry),
            Err(PatchError::MalformedPatchlet(_))
        ));

        clipboard.set_text("{ not json".to_string());
        assert!(patch.paste(&clipboard, &registry).is_err());
        assert!(patch.node_hosts().is_empty());
    }

    #[test]
    fn test_delete_selection_removes_links() {
        let registry = registry();
        let mut patch = a_to_b(&registry);
        let b = patch.get_node_host(NodeHostIndex(1)).unwrap().node().clone();
        let pin = b.input_pin("in").unwrap();
        assert_eq!(patch.link_hosts().len(), 1);

        assert!(patch.select(NodeHostIndex(0)));
        assert_eq!(patch.delete_selection(), Some(NodeHostIndex(0)));
        assert!(patch.get_node_host(NodeHostIndex(0)).is_none());
        assert!(patch.selection().is_none());
        assert!(patch.link_hosts().is_empty());
        assert!(!pin.is_connected());

        assert_eq!(patch.delete_selection(), None);
    }

    #[test]
    fn test_exposed_pin_links_resolve_in_parent() {
        let registry = registry();
        let mut child = Patch::new();
        let b = registry.create("B").unwrap();
        let pin = b.input_pin("in").unwrap();
        child.add_node(b.clone(), at(0.0, 0.0)).unwrap();
        child.expose_pin(&pin, &b);
        assert!(pin.is_exposed());

        let mut parent = Patch::new();
        let a = parent.add_new_node(&registry, "A", Pos2::ZERO).unwrap();
        let child_index = parent.add_node(NodeInstance::new(child), at(300.0, 0.0)).unwrap();

        parent.connect_pin(&pin, a, false).unwrap();
        assert_eq!(triples(&parent), vec![(a, child_index, "in".to_string())]);

        let child_host = parent.get_node_host(child_index).unwrap();
        let child_node = child_host.node().borrow();
        let child = child_node.as_patch().unwrap();
        assert!(child.link_hosts().is_empty());
        assert_eq!(child.parent(), Some(parent.id()));
        assert!(!child.is_root_patch());
    }

    #[test]
    fn test_nested_round_trip_connects_exposed_pins_in_parent() {
        let registry = registry();
        let mut child = Patch::new();
        let b = registry.create("B").unwrap();
        let pin = b.input_pin("in").unwrap();
        child.add_node(b.clone(), at(0.0, 0.0)).unwrap();
        child.expose_pin(&pin, &b);

        let mut parent = Patch::new();
        let a = parent.add_new_node(&registry, "A", Pos2::ZERO).unwrap();
        let child_index = parent.add_node(NodeInstance::new(child), at(300.0, 0.0)).unwrap();
        parent.connect_pin(&pin, a, false).unwrap();

        let json = parent.serialize().unwrap();
        let child_pin = &json["Nodes"]["1"]["Nodes"]["0"]["InputsPins"]["in"];
        assert_eq!(child_pin["Exposed"], json!(true));
        assert_eq!(child_pin["SourceNode"], json!(0));

        let mut loaded = Patch::new();
        assert!(loaded.deserialize(&json, &registry).unwrap().is_clean());
        assert_eq!(loaded.delayed_connection_count(), 1);
        loaded.update();
        assert_eq!(triples(&loaded), vec![(a, child_index, "in".to_string())]);
    }

    #[test]
    fn test_exposure_survives_without_connection() {
        let registry = registry();
        let mut patch = Patch::new();
        let b = patch.add_new_node(&registry, "B", Pos2::ZERO).unwrap();
        let node = patch.get_node_host(b).unwrap().node().clone();
        let pin = node.input_pin("in").unwrap();
        patch.expose_pin(&pin, &node);

        let json = patch.serialize().unwrap();
        let mut loaded = Patch::new();
        loaded.deserialize(&json, &registry).unwrap();
        let loaded_pin = loaded.get_node_host(b).unwrap().input_pin("in").unwrap();
        assert!(loaded_pin.is_exposed());
        assert!(loaded.is_pin_exposed(&loaded_pin));
        assert_eq!(loaded.pending_parent_connections(), 0);
    }

    #[test]
    fn test_unexpose_pin() {
        let registry = registry();
        let mut patch = Patch::new();
        let b = registry.create("B").unwrap();
        let pin = b.input_pin("in").unwrap();
        patch.add_node(b.clone(), at(0.0, 0.0)).unwrap();

        patch.expose_pin(&pin, &b);
        patch.expose_pin(&pin, &b);
        assert_eq!(patch.exposed_pins().count(), 1);

        assert!(patch.unexpose_pin(&pin));
        assert!(!pin.is_exposed());
        assert!(!patch.unexpose_pin(&pin));
    }

    #[test]
    fn test_paste_with_exposed_connection_is_rejected() {
        let registry = registry();
        let json = json!({
            "Nodes": {
                "0": {
                    "ID": 0,
                    "NodeTypeName": "B",
                    "InputsPins": { "in": { "Exposed": true, "SourceNode": 4 } }
                }
            }
        });

        let mut patch = Patch::new();
        let report = patch.insert_patchlet(&json, &registry, true, Vec2::ZERO).unwrap();
        assert_eq!(report.inserted.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            PatchError::ExposedPinRemap { source_node: NodeHostIndex(4), .. }
        ));
        assert_eq!(patch.pending_parent_connections(), 0);
        assert_eq!(patch.delayed_connection_count(), 0);
    }

    #[test]
    fn test_duplicate_remaps_nested_exposed_connections() {
        let registry = registry();
        let mut child = Patch::new();
        let b = registry.create("B").unwrap();
        let pin = b.input_pin("in").unwrap();
        child.add_node(b.clone(), at(0.0, 0.0)).unwrap();
        child.expose_pin(&pin, &b);

        let mut parent = Patch::new();
        let a = parent.add_new_node(&registry, "A", Pos2::ZERO).unwrap();
        let child_index = parent.add_node(NodeInstance::new(child), at(300.0, 0.0)).unwrap();
        parent.connect_pin(&pin, a, false).unwrap();

        let report = parent.duplicate(&registry, DuplicateDirection::Down).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.inserted, vec![NodeHostIndex(2), NodeHostIndex(3)]);
        parent.update();

        assert_eq!(
            triples(&parent),
            vec![
                (a, child_index, "in".to_string()),
                (NodeHostIndex(2), NodeHostIndex(3), "in".to_string()),
            ]
        );
    }

    #[test]
    fn test_root_exposed_connection_round_trip() {
        let registry = registry();
        let mut patch = a_to_b(&registry);
        let node = patch.get_node_host(NodeHostIndex(1)).unwrap().node().clone();
        let pin = node.input_pin("in").unwrap();
        patch.expose_pin(&pin, &node);

        let json = patch.serialize().unwrap();
        assert_eq!(
            json["Nodes"]["1"]["InputsPins"]["in"],
            json!({ "Exposed": true, "SourceNode": 0 })
        );

        let mut loaded = Patch::new();
        assert!(loaded.deserialize(&json, &registry).unwrap().is_clean());
        assert_eq!(loaded.pending_parent_connections(), 1);
        loaded.update();
        assert_eq!(loaded.pending_parent_connections(), 0);

        let loaded_pin = loaded.get_node_host(NodeHostIndex(1)).unwrap().input_pin("in").unwrap();
        assert!(loaded_pin.is_exposed());
        assert_eq!(loaded_pin.source_host_index(), Some(NodeHostIndex(0)));
        assert_eq!(loaded.serialize().unwrap(), json);
    }

    #[test]
    fn test_index_space_exhaustion() {
        let registry = registry();
        let json = json!({
            "Nodes": {
                "4294967295": { "ID": 4294967295u32, "NodeTypeName": "A" }
            }
        });

        let mut patch = Patch::new();
        assert!(patch.insert_patchlet(&json, &registry, false, Vec2::ZERO).unwrap().is_clean());
        assert_eq!(patch.next_free_node_host_index(), None);

        let report = patch.duplicate(&registry, DuplicateDirection::Right).unwrap();
        assert!(report.inserted.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, PatchError::IndexSpaceExhausted));

        assert!(matches!(
            patch.add_new_node(&registry, "A", Pos2::ZERO),
            Err(PatchError::IndexSpaceExhausted)
        ));
        assert_eq!(patch.node_hosts().len(), 1);
    }

    #[test]
    fn test_unknown_type_is_isolated() {
        let registry = registry();
        let json = json!({
            "Nodes": {
                "0": { "ID": 0, "NodeTypeName": "A" },
                "1": { "ID": 1, "NodeTypeName": "Z" },
                "2": {
                    "ID": 2,
                    "NodeTypeName": "B",
                    "InputsPins": { "in": { "SourceNode": 0 } }
                }
            }
        });

        let mut patch = Patch::new();
        let report = patch.insert_patchlet(&json, &registry, false, Vec2::ZERO).unwrap();
        assert_eq!(report.inserted, vec![NodeHostIndex(0), NodeHostIndex(2)]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "1");
        assert!(matches!(
            &report.failures[0].error,
            PatchError::Node(NodeError::UnknownNodeType(name)) if name == "Z"
        ));

        patch.update();
        assert_eq!(patch.link_hosts().len(), 1);
    }

    #[test]
    fn test_malformed_node_fields_are_isolated() {
        let registry = registry();
        let json = json!({
            "Nodes": {
                "0": { "ID": 0, "NodeTypeName": "Item::Camera", "Parameters": "wide" },
                "1": { "ID": 1, "NodeTypeName": "Item::Camera" },
                "2": { "ID": 7, "NodeTypeName": "Item::Camera" }
            }
        });

        let mut patch = Patch::new();
        let report = patch.insert_patchlet(&json, &registry, false, Vec2::ZERO).unwrap();
        assert_eq!(report.inserted, vec![NodeHostIndex(1)]);
        assert_eq!(report.failures.len(), 2);
    }

    #[test]
    fn test_eager_connect_to_missing_host_fails() {
        let registry = registry();
        let mut patch = a_to_b(&registry);
        let pin = patch.get_node_host(NodeHostIndex(1)).unwrap().input_pin("in").unwrap();
        let err = patch.connect_pin(&pin, NodeHostIndex(9), false).unwrap_err();
        assert!(matches!(err, PatchError::NodeHostNotFound(NodeHostIndex(9))));
        assert_eq!(pin.source_host_index(), Some(NodeHostIndex(0)));
    }

    #[test]
    fn test_delayed_connection_to_missing_host_is_dropped() {
        let registry = registry();
        let mut patch = Patch::new();
        let b = patch.add_new_node(&registry, "B", Pos2::ZERO).unwrap();
        let pin = patch.get_node_host(b).unwrap().input_pin("in").unwrap();

        patch.connect_pin(&pin, NodeHostIndex(5), true).unwrap();
        assert_eq!(patch.delayed_connection_count(), 1);
        patch.update();
        assert_eq!(patch.delayed_connection_count(), 0);
        assert!(!pin.is_connected());

        let a = patch.add_new_node(&registry, "A", Pos2::ZERO).unwrap();
        patch.connect_pin(&pin, a, true).unwrap();
        patch.update();
        assert!(pin.is_connected());
    }

    #[test]
    fn test_incompatible_connection_is_rejected() {
        let registry = registry();
        let mut patch = Patch::new();
        let calibrate = patch.add_new_node(&registry, "Procedure::Calibrate", Pos2::ZERO).unwrap();
        let board = patch.add_new_node(&registry, "Item::Board", Pos2::ZERO).unwrap();
        let pin = patch.get_node_host(calibrate).unwrap().input_pin("Camera").unwrap();

        let err = patch.connect_pin(&pin, board, false).unwrap_err();
        assert!(matches!(err, PatchError::Pin(PinError::IncompatiblePinType { .. })));
        assert!(patch.link_hosts().is_empty());
    }

    #[test]
    fn test_duplicate_remaps_and_offsets() {
        let registry = registry();
        let mut patch = a_to_b(&registry);
        let extents = patch.canvas_extents();

        let report = patch.duplicate(&registry, DuplicateDirection::Down).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.inserted, vec![NodeHostIndex(2), NodeHostIndex(3)]);
        patch.update();

        let copy_b = patch.get_node_host(NodeHostIndex(3)).unwrap();
        assert_eq!(
            copy_b.input_pin("in").unwrap().source_host_index(),
            Some(NodeHostIndex(2))
        );
        let original_a = patch.get_node_host(NodeHostIndex(0)).unwrap().bounds();
        let copy_a = patch.get_node_host(NodeHostIndex(2)).unwrap().bounds();
        assert_eq!(copy_a.min.y - original_a.min.y, extents.height());
        assert_eq!(patch.link_hosts().len(), 2);
    }

    #[test]
    fn test_pin_change_triggers_rebuild_on_update() {
        let registry = registry();
        let mut patch = Patch::new();
        let a = patch.add_new_node(&registry, "A", Pos2::ZERO).unwrap();
        let b = patch.add_new_node(&registry, "B", Pos2::ZERO).unwrap();
        let source = patch.get_node_host(a).unwrap().node().clone();
        let pin = patch.get_node_host(b).unwrap().input_pin("in").unwrap();

        pin.connect(&source).unwrap();
        assert!(patch.link_hosts().is_empty());
        patch.update();
        assert_eq!(patch.link_hosts().len(), 1);

        patch.drop_input_connection(b, "in").unwrap();
        assert!(patch.link_hosts().is_empty());
        assert!(patch.drop_input_connection(b, "out").is_err());
    }

    #[test]
    fn test_gesture_commit() {
        let registry = registry();
        let mut patch = Patch::new();
        let a = patch.add_new_node(&registry, "A", Pos2::new(0.0, 0.0)).unwrap();
        let b = patch.add_new_node(&registry, "B", Pos2::new(400.0, 0.0)).unwrap();
        let pin = patch.get_node_host(b).unwrap().input_pin("in").unwrap();

        assert!(patch.begin_make_connection(b, &pin));
        patch.drag_make_connection(Pos2::new(450.0, 50.0));
        assert_eq!(patch.new_link().unwrap().source(), None);

        patch.drag_make_connection(Pos2::new(50.0, 50.0));
        let link = patch.new_link().unwrap();
        assert_eq!(link.source(), Some(a));
        assert_eq!(link.cursor(), Pos2::new(50.0, 50.0));

        assert_eq!(
            patch.release_make_connection(PointerButton::Primary).unwrap(),
            GestureOutcome::Committed
        );
        assert!(patch.new_link().is_none());
        assert_eq!(triples(&patch), vec![(a, b, "in".to_string())]);
    }

    #[test]
    fn test_gesture_cancel() {
        let registry = registry();
        let mut patch = Patch::new();
        patch.add_new_node(&registry, "A", Pos2::new(0.0, 0.0)).unwrap();
        let b = patch.add_new_node(&registry, "B", Pos2::new(400.0, 0.0)).unwrap();
        let pin = patch.get_node_host(b).unwrap().input_pin("in").unwrap();

        patch.begin_make_connection(b, &pin);
        patch.drag_make_connection(Pos2::new(50.0, 50.0));
        assert_eq!(
            patch.release_make_connection(PointerButton::Middle).unwrap(),
            GestureOutcome::Ignored
        );
        assert!(patch.new_link().is_some());
        assert_eq!(
            patch.release_make_connection(PointerButton::Secondary).unwrap(),
            GestureOutcome::Cancelled
        );
        assert!(!pin.is_connected());

        patch.begin_make_connection(b, &pin);
        patch.drag_make_connection(Pos2::new(-500.0, -500.0));
        assert_eq!(
            patch.release_make_connection(PointerButton::Primary).unwrap(),
            GestureOutcome::Cancelled
        );
        assert!(!pin.is_connected());
        assert_eq!(
            patch.release_make_connection(PointerButton::Primary).unwrap(),
            GestureOutcome::Ignored
        );
    }

    #[test]
    fn test_gesture_respects_exposure() {
        let registry = registry();
        let mut child = Patch::new();
        let b = registry.create("B").unwrap();
        let pin = b.input_pin("in").unwrap();
        let inner = child.add_node(b.clone(), at(0.0, 0.0)).unwrap();
        child.expose_pin(&pin, &b);
        assert!(!child.begin_make_connection(inner, &pin));
        assert!(child.new_link().is_none());

        let mut parent = Patch::new();
        let a = parent.add_new_node(&registry, "A", Pos2::new(0.0, 0.0)).unwrap();
        let child_index = parent.add_node(NodeInstance::new(child), at(400.0, 0.0)).unwrap();
        assert!(!parent.begin_make_connection(a, &pin));
        assert!(parent.begin_make_connection(child_index, &pin));

        parent.drag_make_connection(Pos2::new(10.0, 10.0));
        assert_eq!(
            parent.release_make_connection(PointerButton::Primary).unwrap(),
            GestureOutcome::Committed
        );
        assert_eq!(triples(&parent), vec![(a, child_index, "in".to_string())]);
        assert!(parent.visible_pin(child_index, "in").is_some());
    }

    #[test]
    fn test_link_endpoints_follow_hosts() {
        let registry = registry();
        let patch = a_to_b(&registry);
        let link = patch.link_hosts().values().next().unwrap();
        let (start, end) = link.endpoints(&patch).unwrap();
        assert_eq!(start.x, 200.0);
        assert_eq!(end.x, 300.0);
        assert!(link.as_observed().unwrap().is_live(&patch));
    }
}
