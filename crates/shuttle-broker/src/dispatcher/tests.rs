//! Dispatcher tests against a mocked capability interface.

use std::path::PathBuf;
use std::sync::Arc;

use mockall::mock;
use mockall::predicate::eq;
use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::capability::{CurrentFile, IdeInfo, IdeSettings, OnLoadPayload};
use crate::routing::RoutingTable;

mock! {
    Ide {}
    impl IdeCapabilities for Ide {
        fn ide_info(&self) -> IdeInfo;
        fn ide_settings(&self) -> IdeSettings;
        fn workspace_dirs(&self) -> Vec<String>;
        fn unique_id(&self) -> String;
        fn is_telemetry_enabled(&self) -> bool;
        fn is_workspace_remote(&self) -> bool;
        fn terminal_contents(&self) -> String;
        fn on_load(&self) -> OnLoadPayload;
        fn file_exists(&self, path: &str) -> bool;
        fn read_file(&self, path: &str) -> Result<String, CapabilityError>;
        fn read_range_in_file(
            &self,
            path: &str,
            start_line: usize,
            end_line: usize,
        ) -> Result<String, CapabilityError>;
        fn write_file(&self, path: &str, contents: &str) -> Result<(), CapabilityError>;
        fn open_file(&self, path: &str) -> Result<(), CapabilityError>;
        fn open_files(&self) -> Result<Vec<String>, CapabilityError>;
        fn current_file(&self) -> Result<Option<CurrentFile>, CapabilityError>;
        fn run_command(
            &self,
            command: &str,
            cwd: Option<PathBuf>,
        ) -> Result<Vec<String>, CapabilityError>;
        fn diff(&self, include_unstaged: bool) -> Result<Vec<String>, CapabilityError>;
        fn branch(&self, dir: &str) -> Result<String, CapabilityError>;
        fn repo_name(&self, dir: &str) -> Result<Option<String>, CapabilityError>;
        fn show_toast(&self, level: ToastLevel, message: &str) -> Result<(), CapabilityError>;
        fn copy_text(&self, text: &str) -> Result<(), CapabilityError>;
    }
}

fn dispatcher(ide: MockIde) -> CapabilityDispatcher {
    CapabilityDispatcher::new(Arc::new(ide))
}

#[test]
fn read_file_returns_contents() {
    let mut ide = MockIde::new();
    ide.expect_read_file()
        .with(eq("/tmp/x"))
        .once()
        .returning(|_| Ok(String::from("hi")));

    let result = dispatcher(ide).dispatch("readFile", &json!({"filepath": "/tmp/x"}));
    assert_eq!(result, Some(json!("hi")));
}

#[test]
fn read_failure_answers_null() {
    let mut ide = MockIde::new();
    ide.expect_read_file().once().returning(|path| {
        Err(CapabilityError::io(
            path,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ))
    });

    let result = dispatcher(ide).dispatch("readFile", &json!({"filepath": "/missing"}));
    assert_eq!(result, Some(Value::Null));
}

#[rstest]
#[case::read_file("readFile", json!({}))]
#[case::write_file("writeFile", json!({"filepath": "/tmp/x"}))]
#[case::branch("getBranch", json!({"dir": 7}))]
#[case::range("readRangeInFile", json!({"filepath": "/tmp/x", "range": {"start": {}}}))]
#[case::null_payload("copyText", Value::Null)]
fn missing_fields_answer_null_without_calling_the_ide(
    #[case] message_type: &str,
    #[case] data: Value,
) {
    let ide = MockIde::new();
    assert_eq!(dispatcher(ide).dispatch(message_type, &data), Some(Value::Null));
}

#[test]
fn unknown_types_are_not_dispatched() {
    let ide = MockIde::new();
    assert_eq!(dispatcher(ide).dispatch("made/up", &Value::Null), None);
}

#[test]
fn read_range_passes_line_bounds() {
    let mut ide = MockIde::new();
    ide.expect_read_range_in_file()
        .with(eq("/w/a.rs"), eq(2_usize), eq(5_usize))
        .once()
        .returning(|_, _, _| Ok(String::from("c\nd\ne")));

    let data = json!({
        "filepath": "/w/a.rs",
        "range": {"start": {"line": 2, "character": 0}, "end": {"line": 5, "character": 0}},
    });
    assert_eq!(
        dispatcher(ide).dispatch("readRangeInFile", &data),
        Some(json!("c\nd\ne"))
    );
}

#[test]
fn run_command_joins_output_lines() {
    let mut ide = MockIde::new();
    ide.expect_run_command()
        .withf(|command, cwd| command == "ls" && cwd.is_none())
        .once()
        .returning(|_, _| Ok(vec![String::from("a"), String::from("b")]));

    assert_eq!(
        dispatcher(ide).dispatch("runCommand", &json!({"command": "ls"})),
        Some(json!("a\nb"))
    );
}

#[rstest]
#[case::default_includes_unstaged(json!({}), true)]
#[case::staged_only(json!({"includeUnstaged": false}), false)]
fn diff_defaults_to_unstaged(#[case] data: Value, #[case] expected: bool) {
    let mut ide = MockIde::new();
    ide.expect_diff()
        .with(eq(expected))
        .once()
        .returning(|_| Ok(vec![String::from("+line")]));

    assert_eq!(dispatcher(ide).dispatch("getDiff", &data), Some(json!(["+line"])));
}

#[test]
fn toast_level_is_parsed_from_type() {
    let mut ide = MockIde::new();
    ide.expect_show_toast()
        .with(eq(ToastLevel::Error), eq("broken"))
        .once()
        .returning(|_, _| Ok(()));

    let data = json!({"type": "error", "message": "broken"});
    assert_eq!(dispatcher(ide).dispatch("showToast", &data), Some(Value::Null));
}

#[test]
fn missing_repo_name_is_null() {
    let mut ide = MockIde::new();
    ide.expect_repo_name().once().returning(|_| Ok(None));
    assert_eq!(
        dispatcher(ide).dispatch("getRepoName", &json!({"dir": "/w"})),
        Some(Value::Null)
    );
}

#[test]
fn current_file_is_serialised_with_wire_names() {
    let mut ide = MockIde::new();
    ide.expect_current_file().once().returning(|| {
        Ok(Some(CurrentFile {
            is_untitled: false,
            path: String::from("/w/a.rs"),
            contents: String::from("fn main() {}"),
        }))
    });
    assert_eq!(
        dispatcher(ide).dispatch("getCurrentFile", &Value::Null),
        Some(json!({"isUntitled": false, "path": "/w/a.rs", "contents": "fn main() {}"}))
    );
}

#[rstest]
#[case::os_rendering("jetbrains/isOSREnabled", json!(true))]
#[case::colors("jetbrains/getColors", json!({}))]
#[case::dev_tools("toggleDevTools", Value::Null)]
#[case::tutorial("showTutorial", Value::Null)]
fn static_acknowledgements(#[case] message_type: &str, #[case] expected: Value) {
    let ide = MockIde::new();
    assert_eq!(dispatcher(ide).dispatch(message_type, &Value::Null), Some(expected));
}

#[test]
fn every_standard_capability_type_has_a_handler() {
    let dispatcher = dispatcher(MockIde::new());
    let table = RoutingTable::standard();
    for message_type in table.locally_handled_types() {
        assert!(
            dispatcher.handles(message_type),
            "{message_type} is routed locally but has no handler"
        );
    }
}

#[test]
fn every_handler_is_reachable_from_the_standard_tables() {
    let dispatcher = dispatcher(MockIde::new());
    let table = RoutingTable::standard();
    let mut types: Vec<_> = dispatcher.message_types().collect();
    types.sort_unstable();
    assert_eq!(types.len(), 25);
    for message_type in types {
        assert!(
            table.is_ui_local(message_type),
            "{message_type} has a handler but is never routed to it"
        );
    }
}
