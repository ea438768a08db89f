//! Behaviour-driven tests for envelope routing.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::dispatcher::CapabilityDispatcher;
use crate::envelope::Envelope;
use crate::error::{BrokerError, RegistryError};
use crate::queue::WriteQueue;
use crate::registry::{Continuation, CorrelationRegistry};
use crate::router::{CoreDisposition, MessageRouter, UiDisposition};
use crate::routing::RoutingTable;

use super::{FakeIde, RecordingSink, SharedBuffer, WAIT};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct TestWorld {
    core_input: SharedBuffer,
    queue: WriteQueue,
    registry: Arc<CorrelationRegistry>,
    ui: Arc<RecordingSink>,
    router: MessageRouter,
    deliveries: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    core_result: Option<Option<CoreDisposition>>,
    ui_result: Option<Result<UiDisposition, BrokerError>>,
    temp_dir: TempDir,
}

impl TestWorld {
    fn new() -> Self {
        let core_input = SharedBuffer::default();
        let queue = WriteQueue::spawn("core-stdin", core_input.clone(), 64).expect("queue");
        let registry = Arc::new(CorrelationRegistry::new());
        let ui = Arc::new(RecordingSink::default());
        let router = MessageRouter::new(
            Arc::new(RoutingTable::standard()),
            CapabilityDispatcher::new(Arc::new(FakeIde)),
            Arc::clone(&registry),
            queue.handle(),
            Arc::clone(&ui) as Arc<dyn crate::ui::UiSink>,
        );
        Self {
            core_input,
            queue,
            registry,
            ui,
            router,
            deliveries: Arc::new(Mutex::new(HashMap::new())),
            core_result: None,
            ui_result: None,
            temp_dir: TempDir::new().expect("temp dir"),
        }
    }

    fn recording_continuation(&self, id: &str) -> Continuation {
        let deliveries = Arc::clone(&self.deliveries);
        let id = id.to_owned();
        Box::new(move |data: &Value| {
            deliveries
                .lock()
                .expect("deliveries lock")
                .entry(id.clone())
                .or_default()
                .push(data.clone());
        })
    }

    fn delivery_count(&self, id: &str) -> usize {
        self.deliveries
            .lock()
            .expect("deliveries lock")
            .get(id)
            .map_or(0, Vec::len)
    }

    fn core_lines(&self) -> Vec<Envelope> {
        let handle = self.queue.handle();
        let deadline = Instant::now() + WAIT;
        while handle.backlog() > 0 {
            assert!(Instant::now() < deadline, "core queue did not drain");
            std::thread::yield_now();
        }
        self.core_input
            .lines()
            .iter()
            .map(|line| Envelope::decode(line).expect("core line decodes"))
            .collect()
    }

    fn core_sends(&mut self, data: &Value) {
        let line = data.to_string();
        self.core_result = Some(self.router.handle_core_line(&line));
    }

    fn ui_sends(&mut self, envelope: Envelope) {
        self.ui_result = Some(self.router.handle_ui_message(envelope, None));
    }

    fn ui_disposition(&self) -> &UiDisposition {
        self.ui_result
            .as_ref()
            .expect("no UI message was sent")
            .as_ref()
            .expect("UI message failed")
    }
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::new()
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a pending core request {message_type} with id {id}")]
fn given_pending_core_request(world: &mut TestWorld, message_type: String, id: String) {
    let id = unquote(&id);
    let continuation = world.recording_continuation(id);
    world
        .router
        .send_to_core(
            unquote(&message_type),
            json!({}),
            Some(id.to_owned()),
            Some(continuation),
        )
        .expect("send to core");
}

#[given("a pending UI request {message_type} with id {id}")]
fn given_pending_ui_request(world: &mut TestWorld, message_type: String, id: String) {
    let id = unquote(&id);
    let continuation = world.recording_continuation(id);
    let envelope = Envelope::new(unquote(&message_type), Some(id.to_owned()), json!({}));
    let disposition = world
        .router
        .handle_ui_message(envelope, Some(continuation))
        .expect("forward UI request");
    assert!(matches!(disposition, UiDisposition::ForwardedToCore { .. }));
}

#[given("the broker has shut down")]
fn given_shut_down(world: &mut TestWorld) {
    world.registry.cancel_all();
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the core sends {message_type} with id {id}")]
fn when_core_sends(world: &mut TestWorld, message_type: String, id: String) {
    world.core_sends(&json!({
        "messageType": unquote(&message_type),
        "messageId": unquote(&id),
        "data": {"value": 1},
    }));
}

#[when("the core sends a non-final {message_type} chunk for {id}")]
fn when_core_sends_chunk(world: &mut TestWorld, message_type: String, id: String) {
    world.core_sends(&json!({
        "messageType": unquote(&message_type),
        "messageId": unquote(&id),
        "data": {"content": "partial", "done": false},
    }));
}

#[when("the core sends a final {message_type} chunk for {id}")]
fn when_core_sends_final_chunk(world: &mut TestWorld, message_type: String, id: String) {
    world.core_sends(&json!({
        "messageType": unquote(&message_type),
        "messageId": unquote(&id),
        "data": {"content": "end", "done": true},
    }));
}

#[when("the core sends a malformed line")]
fn when_core_sends_malformed(world: &mut TestWorld) {
    world.core_result = Some(world.router.handle_core_line("{\"messageType\": oops"));
}

#[when("the UI sends {message_type} with id {id}")]
fn when_ui_sends(world: &mut TestWorld, message_type: String, id: String) {
    world.ui_sends(Envelope::new(
        unquote(&message_type),
        Some(unquote(&id).to_owned()),
        json!({}),
    ));
}

#[when("the UI sends {message_type} without an id")]
fn when_ui_sends_without_id(world: &mut TestWorld, message_type: String) {
    world.ui_sends(Envelope::new(unquote(&message_type), None, json!({})));
}

#[when("the UI reads a file containing {contents} with id {id}")]
fn when_ui_reads_file(world: &mut TestWorld, contents: String, id: String) {
    let path = world.temp_dir.path().join("x");
    fs::write(&path, unquote(&contents)).expect("write file");
    world.ui_sends(Envelope::new(
        "readFile",
        Some(unquote(&id).to_owned()),
        json!({"filepath": path.to_string_lossy()}),
    ));
}

#[when("the UI reads a file containing {contents} without an id")]
fn when_ui_reads_file_without_id(world: &mut TestWorld, contents: String) {
    let path = world.temp_dir.path().join("x");
    fs::write(&path, unquote(&contents)).expect("write file");
    world.ui_sends(Envelope::new(
        "readFile",
        None,
        json!({"filepath": path.to_string_lossy()}),
    ));
}

#[when("the UI reuses id {id} for {message_type}")]
fn when_ui_reuses_id(world: &mut TestWorld, id: String, message_type: String) {
    let id = unquote(&id);
    let continuation = world.recording_continuation(id);
    let envelope = Envelope::new(unquote(&message_type), Some(id.to_owned()), json!({}));
    world.ui_result = Some(world.router.handle_ui_message(envelope, Some(continuation)));
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the core receives a {message_type} reply for {id} containing {value}")]
fn then_core_receives_reply(world: &mut TestWorld, message_type: String, id: String, value: String) {
    let lines = world.core_lines();
    let reply = lines
        .iter()
        .find(|envelope| envelope.message_type == unquote(&message_type))
        .expect("no reply queued to the core");
    assert_eq!(reply.message_id.as_deref(), Some(unquote(&id)));
    assert_eq!(reply.data, json!(unquote(&value)));
}

#[then("the UI receives a {message_type} envelope for {id}")]
fn then_ui_receives(world: &mut TestWorld, message_type: String, id: String) {
    let posted = world.ui.posted();
    assert!(
        posted.iter().any(|envelope| {
            envelope.message_type == unquote(&message_type)
                && envelope.message_id.as_deref() == Some(unquote(&id))
        }),
        "expected {message_type} for {id} in {posted:?}"
    );
}

#[then("the delivery count for {id} is {count}")]
fn then_delivery_count(world: &mut TestWorld, id: String, count: usize) {
    assert_eq!(world.delivery_count(unquote(&id)), count);
}

#[then("no correlation is pending for {id}")]
fn then_not_pending(world: &mut TestWorld, id: String) {
    assert!(!world.registry.contains(unquote(&id)));
}

#[then("a correlation is still pending for {id}")]
fn then_pending(world: &mut TestWorld, id: String) {
    assert!(world.registry.contains(unquote(&id)));
}

#[then("the core line is dropped")]
fn then_core_line_dropped(world: &mut TestWorld) {
    assert_eq!(world.core_result, Some(None));
}

#[then("the core message is unhandled")]
fn then_core_unhandled(world: &mut TestWorld) {
    let disposition = world
        .core_result
        .expect("no core message was sent")
        .expect("core line should decode");
    assert!(disposition.is_unhandled());
}

#[then("the UI receives a success reply for {id} with content {contents}")]
fn then_ui_success(world: &mut TestWorld, id: String, contents: String) {
    let reply = world.ui.wait_for("readFile");
    assert_eq!(reply.message_id.as_deref(), Some(unquote(&id)));
    assert_eq!(
        reply.data,
        json!({"status": "success", "content": unquote(&contents), "done": true})
    );
}

#[then("the UI receives a success reply under a generated id with content {contents}")]
fn then_ui_success_generated_id(world: &mut TestWorld, contents: String) {
    let reply = world.ui.wait_for("readFile");
    let message_id = reply.message_id.expect("reply should carry an id");
    assert!(!message_id.is_empty());
    assert_eq!(
        reply.data,
        json!({"status": "success", "content": unquote(&contents), "done": true})
    );
    assert!(world.core_lines().is_empty());
}

#[then("the request is forwarded to the core with a generated id")]
fn then_forwarded_with_generated_id(world: &mut TestWorld) {
    let UiDisposition::ForwardedToCore { message_id } = world.ui_disposition().clone() else {
        panic!("expected the request to be forwarded");
    };
    assert!(!message_id.is_empty());
    let lines = world.core_lines();
    assert!(
        lines
            .iter()
            .any(|envelope| envelope.message_id.as_deref() == Some(message_id.as_str())),
        "forwarded request not found on the core channel"
    );
}

#[then("the UI message is unrecognized")]
fn then_ui_unrecognized(world: &mut TestWorld) {
    assert_eq!(world.ui_disposition(), &UiDisposition::Unrecognized);
}

#[then("nothing is sent to the UI or the core")]
fn then_nothing_sent(world: &mut TestWorld) {
    assert!(world.ui.posted().is_empty());
    assert!(world.core_lines().is_empty());
}

#[then("the UI request is rejected as a duplicate")]
fn then_duplicate(world: &mut TestWorld) {
    let result = world.ui_result.as_ref().expect("no UI message was sent");
    assert!(
        matches!(
            result,
            Err(BrokerError::Registry(RegistryError::DuplicateId { .. }))
        ),
        "expected a duplicate id error, got {result:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/message_routing.feature")]
fn message_routing_behaviour(world: TestWorld) {
    let _ = world;
}
