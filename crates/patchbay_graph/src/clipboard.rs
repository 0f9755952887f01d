// SPDX-License-Identifier: MIT OR Apache-2.0
//! Text clipboard used by copy/cut/paste.

/// Somewhere to put patchlet text between copy and paste
pub trait Clipboard {
    /// Replace the clipboard contents
    fn set_text(&mut self, text: String);

    /// Current contents, if any
    fn text(&self) -> Option<String>;
}

/// In-process clipboard
#[derive(Debug, Clone, Default)]
pub struct LocalClipboard {
    contents: Option<String>,
}

impl LocalClipboard {
    /// Create an empty clipboard
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything has been copied
    pub fn is_empty(&self) -> bool {
        self.contents.is_none()
    }

    /// Forget the contents
    pub fn clear(&mut self) {
        self.contents = None;
    }
}

impl Clipboard for LocalClipboard {
    fn set_text(&mut self, text: String) {
        self.contents = Some(text);
    }

    fn text(&self) -> Option<String> {
        self.contents.clone()
    }
}
