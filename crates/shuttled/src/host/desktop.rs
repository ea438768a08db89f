//! Editor and clipboard state confined to the UI-owning thread.

use std::time::Duration;

use tracing::warn;

use shuttle_broker::{AffinityError, AffinityExecutor, CapabilityError};

const DESKTOP_TARGET: &str = "shuttled::desktop";

/// The host's view of the editor: open documents and the focused one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EditorState {
    open: Vec<String>,
    current: Option<String>,
}

impl EditorState {
    /// Opens `path`, focusing it. Reopening keeps its original position.
    pub fn open(&mut self, path: &str) {
        if !self.open.iter().any(|open| open == path) {
            self.open.push(path.to_owned());
        }
        self.current = Some(path.to_owned());
    }

    /// Paths of open documents in opening order.
    #[must_use]
    pub fn open_files(&self) -> &[String] {
        &self.open
    }

    /// The focused document.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

/// State owned by the desktop thread.
struct Desktop {
    editor: EditorState,
    clipboard: Option<arboard::Clipboard>,
}

impl Desktop {
    fn clipboard(&mut self) -> Result<&mut arboard::Clipboard, arboard::Error> {
        if self.clipboard.is_none() {
            self.clipboard = Some(arboard::Clipboard::new()?);
        }
        self.clipboard.as_mut().ok_or(arboard::Error::ClipboardNotSupported)
    }
}

/// Handle to the desktop thread.
pub struct DesktopThread {
    executor: AffinityExecutor<Desktop>,
}

impl DesktopThread {
    /// Starts the desktop thread. Hops onto it wait at most `timeout`.
    pub fn spawn(timeout: Duration) -> Result<Self, AffinityError> {
        let executor = AffinityExecutor::spawn("desktop", timeout, || Desktop {
            editor: EditorState::default(),
            clipboard: None,
        })?;
        Ok(Self { executor })
    }

    /// Opens `path` in the editor.
    pub fn open(&self, path: &str) -> Result<(), CapabilityError> {
        let path = path.to_owned();
        self.executor
            .run(move |desktop| desktop.editor.open(&path))
            .map_err(CapabilityError::from)
    }

    /// Snapshot of the editor state.
    pub fn editor(&self) -> Result<EditorState, CapabilityError> {
        self.executor
            .run(|desktop| desktop.editor.clone())
            .map_err(CapabilityError::from)
    }

    /// Places `text` on the system clipboard.
    ///
    /// The clipboard is opened on first use; hosts without a display report
    /// [`CapabilityError::Unavailable`].
    pub fn copy(&self, text: &str) -> Result<(), CapabilityError> {
        let text = text.to_owned();
        self.executor
            .run(move |desktop| {
                desktop
                    .clipboard()
                    .and_then(|clipboard| clipboard.set_text(text))
            })?
            .map_err(|error| {
                warn!(target: DESKTOP_TARGET, error = %error, "clipboard unavailable");
                CapabilityError::Unavailable {
                    capability: "clipboard",
                    message: error.to_string(),
                }
            })
    }

    /// Stops the desktop thread.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}

impl std::fmt::Debug for DesktopThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesktopThread")
            .field("executor", &self.executor.name())
            .finish()
    }
}
