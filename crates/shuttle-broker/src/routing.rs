//! Static message-type routing tables.
//!
//! A [`RoutingTable`] is built once at startup and shared by `Arc` with the
//! router. Tests construct substitute tables through [`RoutingTable::builder`].

use std::collections::HashSet;

/// Capability queries answered by the local dispatcher.
const IDE_MESSAGE_TYPES: &[&str] = &[
    "getIdeInfo",
    "getIdeSettings",
    "getWorkspaceDirs",
    "getUniqueId",
    "isTelemetryEnabled",
    "isWorkspaceRemote",
    "getOpenFiles",
    "getCurrentFile",
    "fileExists",
    "readFile",
    "readRangeInFile",
    "writeFile",
    "openFile",
    "runCommand",
    "getTerminalContents",
    "getDiff",
    "getBranch",
    "getRepoName",
    "showToast",
    "copyText",
    "toggleDevTools",
    "showTutorial",
];

/// Core-originated types relayed to the UI unmodified.
const PASS_THROUGH_TO_UI: &[&str] = &[
    "configUpdate",
    "configError",
    "indexProgress",
    "indexing/statusUpdate",
    "addContextItem",
    "refreshSubmenuItems",
    "isContinueInputFocused",
    "setTTSActive",
    "getWebviewHistoryLength",
    "getCurrentSessionId",
    "sessionUpdate",
    "toolCallPartialOutput",
    "didCloseFiles",
    "docs/suggestions",
    "didChangeAvailableProfiles",
];

/// UI-originated types relayed to the core unmodified.
const PASS_THROUGH_TO_CORE: &[&str] = &[
    "ping",
    "abort",
    "history/list",
    "history/delete",
    "history/load",
    "history/save",
    "devdata/log",
    "config/addModel",
    "config/newPromptFile",
    "config/ideSettingsUpdate",
    "config/getSerializedProfileInfo",
    "config/deleteModel",
    "config/listProfiles",
    "config/openProfile",
    "config/reload",
    "context/getContextItems",
    "context/getSymbolsForFiles",
    "context/loadSubmenuItems",
    "context/addDocs",
    "context/removeDocs",
    "context/indexDocs",
    "autocomplete/complete",
    "autocomplete/cancel",
    "autocomplete/accept",
    "command/run",
    "tts/kill",
    "llm/complete",
    "llm/streamChat",
    "llm/listModels",
    "streamDiffLines",
    "chatDescriber/describe",
    "stats/getTokensPerDay",
    "stats/getTokensPerModel",
    "index/setPaused",
    "index/forceReIndex",
    "index/indexingProgressBarInitialized",
    "completeOnboarding",
    "didChangeSelectedProfile",
    "didChangeSelectedOrg",
    "tools/call",
    "controlPlane/openUrl",
    "controlPlane/listOrganizations",
    "onboarding/complete",
    "auth/getAuthUrl",
    "files/created",
    "files/changed",
    "files/deleted",
    "files/opened",
    "files/closed",
];

/// Prefix of UI-originated types that are always answered locally.
pub const LOCAL_NAMESPACE: &str = "jetbrains/";

/// Immutable classification tables for message types.
///
/// The sets may overlap: a type can be answered locally and relayed at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    locally_handled: HashSet<String>,
    forward_to_ui: HashSet<String>,
    forward_to_core: HashSet<String>,
    local_namespace: Option<String>,
}

impl RoutingTable {
    /// Starts an empty table.
    #[must_use]
    pub fn builder() -> RoutingTableBuilder {
        RoutingTableBuilder::default()
    }

    /// The protocol's built-in tables.
    #[must_use]
    pub fn standard() -> Self {
        Self::standard_builder().build()
    }

    /// A builder pre-loaded with the built-in tables, for appending extras.
    #[must_use]
    pub fn standard_builder() -> RoutingTableBuilder {
        Self::builder()
            .locally_handled(IDE_MESSAGE_TYPES.iter().copied())
            .forward_to_ui(PASS_THROUGH_TO_UI.iter().copied())
            .forward_to_core(PASS_THROUGH_TO_CORE.iter().copied())
            .local_namespace(LOCAL_NAMESPACE)
    }

    /// Whether a core-originated type is answered by the dispatcher.
    #[must_use]
    pub fn is_locally_handled(&self, message_type: &str) -> bool {
        self.locally_handled.contains(message_type)
    }

    /// Whether a UI-originated type is answered by the dispatcher.
    ///
    /// Matches the locally handled set or the local namespace prefix.
    #[must_use]
    pub fn is_ui_local(&self, message_type: &str) -> bool {
        self.is_locally_handled(message_type)
            || self
                .local_namespace
                .as_deref()
                .is_some_and(|prefix| message_type.starts_with(prefix))
    }

    /// Whether a core-originated type is relayed to the UI.
    #[must_use]
    pub fn forwards_to_ui(&self, message_type: &str) -> bool {
        self.forward_to_ui.contains(message_type)
    }

    /// Whether a UI-originated type is relayed to the core.
    #[must_use]
    pub fn forwards_to_core(&self, message_type: &str) -> bool {
        self.forward_to_core.contains(message_type)
    }

    /// Iterates the locally handled types.
    pub fn locally_handled_types(&self) -> impl Iterator<Item = &str> {
        self.locally_handled.iter().map(String::as_str)
    }
}

/// Builder for [`RoutingTable`].
#[derive(Debug, Default)]
pub struct RoutingTableBuilder {
    table: RoutingTable,
}

impl RoutingTableBuilder {
    /// Adds types answered by the dispatcher.
    #[must_use]
    pub fn locally_handled<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .locally_handled
            .extend(types.into_iter().map(Into::into));
        self
    }

    /// Adds core-originated types relayed to the UI.
    #[must_use]
    pub fn forward_to_ui<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .forward_to_ui
            .extend(types.into_iter().map(Into::into));
        self
    }

    /// Adds UI-originated types relayed to the core.
    #[must_use]
    pub fn forward_to_core<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .forward_to_core
            .extend(types.into_iter().map(Into::into));
        self
    }

    /// Sets the UI-local namespace prefix.
    #[must_use]
    pub fn local_namespace(mut self, prefix: impl Into<String>) -> Self {
        self.table.local_namespace = Some(prefix.into());
        self
    }

    /// Freezes the table.
    #[must_use]
    pub fn build(self) -> RoutingTable {
        self.table
    }
}
