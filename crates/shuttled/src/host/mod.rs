//! The host's implementation of the IDE capability interface.
//!
//! [`LocalIde`] answers capability queries from the local machine: files come
//! from the filesystem, commands run through the platform shell, version
//! control queries shell out to git, and editor or clipboard state lives on a
//! dedicated desktop thread.

mod desktop;
mod identity;
mod paths;
mod shell;

use std::fs;
use std::path::PathBuf;

use tracing::{error, info, warn};

use shuttle_broker::{
    AffinityError, CapabilityError, CurrentFile, IdeCapabilities, IdeInfo, OnLoadPayload,
    ToastLevel, generate_message_id,
};
use shuttle_config::Config;

pub use desktop::EditorState;
pub use paths::{resolve as resolve_path, to_uri};
pub use shell::NO_BRANCH;

use desktop::DesktopThread;

const TOAST_TARGET: &str = "shuttled::toast";

/// IDE family reported to the core.
pub const IDE_TYPE: &str = "jetbrains";

/// Capability provider backed by the local machine.
#[derive(Debug)]
pub struct LocalIde {
    workspace_dirs: Vec<String>,
    media_url: String,
    window_id: String,
    machine_id: String,
    desktop: DesktopThread,
}

impl LocalIde {
    /// Builds a provider for the workspaces named in `config`.
    ///
    /// Without configured workspaces the current directory is used.
    ///
    /// # Errors
    ///
    /// Returns [`AffinityError::Spawn`] when the desktop thread cannot start.
    pub fn from_config(config: &Config) -> Result<Self, AffinityError> {
        let workspace_dirs = if config.workspace_dirs().is_empty() {
            std::env::current_dir()
                .map(|dir| vec![dir.display().to_string()])
                .unwrap_or_default()
        } else {
            config.workspace_dirs().to_vec()
        };
        let window_id = generate_message_id();
        Ok(Self {
            workspace_dirs,
            media_url: config.media_url().to_owned(),
            machine_id: identity::machine_id(&window_id),
            window_id,
            desktop: DesktopThread::spawn(config.affinity_timeout())?,
        })
    }

    /// Snapshot of the editor state.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Affinity`] when the desktop thread is gone.
    pub fn editor(&self) -> Result<EditorState, CapabilityError> {
        self.desktop.editor()
    }

    /// Stops the desktop thread.
    pub fn shutdown(&self) {
        self.desktop.shutdown();
    }

    fn primary_workspace(&self) -> PathBuf {
        self.workspace_dirs
            .first()
            .map_or_else(|| PathBuf::from("."), |dir| resolve_path(dir))
    }
}

impl IdeCapabilities for LocalIde {
    fn ide_info(&self) -> IdeInfo {
        IdeInfo {
            ide_type: String::from(IDE_TYPE),
            name: String::from(env!("CARGO_PKG_NAME")),
            version: String::from(env!("CARGO_PKG_VERSION")),
            remote_name: String::new(),
            extension_version: String::from(env!("CARGO_PKG_VERSION")),
            is_prerelease: false,
        }
    }

    fn workspace_dirs(&self) -> Vec<String> {
        self.workspace_dirs.clone()
    }

    fn unique_id(&self) -> String {
        self.machine_id.clone()
    }

    fn on_load(&self) -> OnLoadPayload {
        OnLoadPayload {
            window_id: self.window_id.clone(),
            workspace_paths: self.workspace_dirs.clone(),
            vsc_machine_id: self.machine_id.clone(),
            vsc_media_url: self.media_url.clone(),
            loaded_at: identity::now_rfc3339(),
        }
    }

    fn file_exists(&self, path: &str) -> bool {
        resolve_path(path).exists()
    }

    fn read_file(&self, path: &str) -> Result<String, CapabilityError> {
        fs::read(resolve_path(path))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|error| CapabilityError::io(path, error))
    }

    fn write_file(&self, path: &str, contents: &str) -> Result<(), CapabilityError> {
        let local = resolve_path(path);
        if let Some(parent) = local.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| CapabilityError::io(path, error))?;
        }
        fs::write(&local, contents).map_err(|error| CapabilityError::io(path, error))
    }

    fn open_file(&self, path: &str) -> Result<(), CapabilityError> {
        self.desktop.open(path)
    }

    fn open_files(&self) -> Result<Vec<String>, CapabilityError> {
        Ok(self.desktop.editor()?.open_files().to_vec())
    }

    fn current_file(&self) -> Result<Option<CurrentFile>, CapabilityError> {
        let editor = self.desktop.editor()?;
        let Some(path) = editor.current() else {
            return Ok(None);
        };
        let local = resolve_path(path);
        let is_untitled = !local.exists();
        let contents = if is_untitled {
            String::new()
        } else {
            self.read_file(path)?
        };
        Ok(Some(CurrentFile {
            is_untitled,
            path: path.to_owned(),
            contents,
        }))
    }

    fn run_command(
        &self,
        command: &str,
        cwd: Option<PathBuf>,
    ) -> Result<Vec<String>, CapabilityError> {
        let cwd = cwd.unwrap_or_else(|| self.primary_workspace());
        shell::run_shell(command, &cwd)
    }

    fn diff(&self, include_unstaged: bool) -> Result<Vec<String>, CapabilityError> {
        shell::git_diff(&self.primary_workspace(), include_unstaged)
    }

    fn branch(&self, dir: &str) -> Result<String, CapabilityError> {
        shell::git_branch(&resolve_path(dir))
    }

    fn repo_name(&self, dir: &str) -> Result<Option<String>, CapabilityError> {
        shell::git_repo_name(&resolve_path(dir))
    }

    fn show_toast(&self, level: ToastLevel, message: &str) -> Result<(), CapabilityError> {
        match level {
            ToastLevel::Info => info!(target: TOAST_TARGET, %level, text = message, "toast"),
            ToastLevel::Warning => warn!(target: TOAST_TARGET, %level, text = message, "toast"),
            ToastLevel::Error => error!(target: TOAST_TARGET, %level, text = message, "toast"),
        }
        Ok(())
    }

    fn copy_text(&self, text: &str) -> Result<(), CapabilityError> {
        self.desktop.copy(text)
    }
}

impl Drop for LocalIde {
    fn drop(&mut self) {
        self.desktop.shutdown();
    }
}
