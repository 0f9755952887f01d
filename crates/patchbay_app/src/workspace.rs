// SPDX-License-Identifier: MIT OR Apache-2.0
//! The editing context: registry, root patch, clipboard and commands.

use crate::settings::AppSettings;
use egui::Pos2;
use patchbay_graph::{
    create_default_registry, LocalClipboard, NodeHostIndex, NodeRegistry, Patch, PatchError,
    PatchletReport, Pin,
};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Error type for the application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// File access failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Patch file is not JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings file could not be parsed
    #[error("Settings error: {0}")]
    Settings(#[from] ron::error::SpannedError),

    /// Settings could not be written
    #[error("Settings error: {0}")]
    SettingsFormat(#[from] ron::Error),

    /// Graph operation failed
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Command id not recognised
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Command arguments missing or invalid
    #[error("Invalid arguments for [{command}]: {reason}")]
    InvalidArguments {
        /// Command id
        command: String,
        /// What is wrong
        reason: String,
    },

    /// Save requested before the patch has a file
    #[error("The patch has no file path")]
    NoPatchPath,
}

/// Owns everything an editor session works on
pub struct Workspace {
    settings: AppSettings,
    registry: NodeRegistry,
    patch: Patch,
    clipboard: LocalClipboard,
    path: Option<PathBuf>,
    dirty: bool,
}

impl Workspace {
    /// Create a workspace with an empty root patch
    pub fn new(settings: AppSettings) -> Self {
        Self {
            settings,
            registry: create_default_registry(),
            patch: Patch::new(),
            clipboard: LocalClipboard::new(),
            path: None,
            dirty: false,
        }
    }

    /// Settings in use
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Node types available to this workspace
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Root patch
    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    /// File the patch was loaded from or last saved to
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether there are unsaved changes
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    /// Replace the root patch with the contents of a file.
    ///
    /// Nodes that fail to load are reported and skipped; the rest of the
    /// document still loads.
    pub fn open(&mut self, path: &Path) -> Result<PatchletReport, AppError> {
        let content = std::fs::read_to_string(path)?;
        let json: serde_json::Value = serde_json::from_str(&content)?;
        let report = self.patch.deserialize(&json, &self.registry)?;

        for _ in 0..self.settings.ticks_per_load {
            self.patch.update();
        }

        tracing::info!(
            "Opened {} ({} node hosts, {} links, {} failures)",
            path.display(),
            self.patch.node_hosts().len(),
            self.patch.link_hosts().len(),
            report.failures.len()
        );
        self.path = Some(path.to_path_buf());
        self.dirty = false;
        Ok(report)
    }

    /// Save to the file the patch came from
    pub fn save(&mut self) -> Result<(), AppError> {
        let path = self.path.clone().ok_or(AppError::NoPatchPath)?;
        self.save_as(&path)
    }

    /// Save to `path` and remember it
    pub fn save_as(&mut self, path: &Path) -> Result<(), AppError> {
        std::fs::write(path, self.patch.to_json_string()?)?;
        tracing::info!("Saved patch to {}", path.display());
        self.path = Some(path.to_path_buf());
        self.dirty = false;
        Ok(())
    }

    /// Run one update tick
    pub fn tick(&mut self) {
        self.patch.update();
    }

    /// Execute an editor command by id, with whitespace separated arguments
    pub fn execute(&mut self, command: &str) -> Result<(), AppError> {
        let mut parts = command.split_whitespace();
        let Some(id) = parts.next() else {
            return Err(AppError::UnknownCommand(String::new()));
        };
        let args: Vec<&str> = parts.collect();

        match id {
            // Edit commands
            "edit.copy" => self.patch.copy(&mut self.clipboard)?,
            "edit.cut" => {
                self.patch.cut(&mut self.clipboard)?;
                self.dirty = true;
            }
            "edit.paste" => {
                let offset = self.settings.paste_offset();
                let report = self
                    .patch
                    .paste_with_offset(&self.clipboard, &self.registry, offset)?;
                tracing::info!("Pasted {} node hosts", report.inserted.len());
                self.dirty = true;
            }
            "edit.delete" => {
                if self.patch.delete_selection().is_some() {
                    self.dirty = true;
                }
            }
            "edit.duplicate" => {
                let direction = self.settings.duplicate_direction;
                let report = self.patch.duplicate(&self.registry, direction)?;
                tracing::info!("Duplicated {} node hosts", report.inserted.len());
                self.dirty = true;
            }
            "edit.select" => {
                let index = parse_index(id, &args, 0)?;
                if !self.patch.select(index) {
                    return Err(PatchError::NodeHostNotFound(index).into());
                }
            }
            "edit.deselect" => self.patch.clear_selection(),

            // Node and link commands
            "node.add" => {
                let type_name = argument(id, &args, 0)?;
                let x = parse_coordinate(id, &args, 1)?;
                let y = parse_coordinate(id, &args, 2)?;
                let index = self
                    .patch
                    .add_new_node(&self.registry, type_name, Pos2::new(x, y))?;
                tracing::info!("Added [{type_name}] as node host {index}");
                self.dirty = true;
            }
            "link.connect" => {
                let target = parse_index(id, &args, 0)?;
                let pin_name = argument(id, &args, 1)?;
                let source = parse_index(id, &args, 2)?;
                let pin = self.visible_pin(target, pin_name)?;
                self.patch.connect_pin(&pin, source, false)?;
                self.dirty = true;
            }
            "link.disconnect" => {
                let target = parse_index(id, &args, 0)?;
                let pin_name = argument(id, &args, 1)?;
                self.patch.drop_input_connection(target, pin_name)?;
                self.dirty = true;
            }

            // Patch commands
            "patch.update" => self.tick(),
            "file.save" => self.save()?,

            _ => {
                tracing::warn!("Unknown command: {}", id);
                return Err(AppError::UnknownCommand(id.to_string()));
            }
        }
        Ok(())
    }

    fn visible_pin(&self, target: NodeHostIndex, pin_name: &str) -> Result<Rc<Pin>, AppError> {
        self.patch
            .visible_pin(target, pin_name)
            .ok_or_else(|| {
                PatchError::PinNotFound {
                    host: target,
                    pin: pin_name.to_string(),
                }
                .into()
            })
    }
}

fn argument<'a>(command: &str, args: &[&'a str], position: usize) -> Result<&'a str, AppError> {
    args.get(position).copied().ok_or_else(|| AppError::InvalidArguments {
        command: command.to_string(),
        reason: format!("missing argument {}", position + 1),
    })
}

fn parse_index(command: &str, args: &[&str], position: usize) -> Result<NodeHostIndex, AppError> {
    let value = argument(command, args, position)?;
    value
        .parse()
        .map(NodeHostIndex)
        .map_err(|_| AppError::InvalidArguments {
            command: command.to_string(),
            reason: format!("[{value}] is not a node host index"),
        })
}

fn parse_coordinate(command: &str, args: &[&str], position: usize) -> Result<f32, AppError> {
    let Some(value) = args.get(position) else {
        return Ok(0.0);
    };
    value.parse().map_err(|_| AppError::InvalidArguments {
        command: command.to_string(),
        reason: format!("[{value}] is not a coordinate"),
    })
}
