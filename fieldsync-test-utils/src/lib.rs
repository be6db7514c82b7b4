//! fieldsync Test Utilities
//!
//! Shared test infrastructure for the fieldsync workspace:
//! - An in-memory, scriptable [`EntityApi`] implementation
//! - Proptest generators for field values and raw error payloads
//! - Fixtures for common envelopes and records

pub use fieldsync_core::{
    single_field, EntityApi, Envelope, ErrorItem, FieldState, FieldValue, Record, RequestError,
    SessionId, Status, TransportError, ID_FIELD,
};

use async_trait::async_trait;
use fieldsync_core::request_error::NOT_FOUND_KEY;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// MOCK ENTITY API
// ============================================================================

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Fetch(String),
    Create(Record),
    Patch(String, Record),
    Remove(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Create,
    Patch,
    Remove,
}

/// A scripted answer, optionally delivered after a delay.
#[derive(Debug, Clone)]
pub struct Reply {
    pub result: Result<Envelope, TransportError>,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(envelope: Envelope) -> Self {
        Self {
            result: Ok(envelope),
            delay: Duration::ZERO,
        }
    }

    pub fn fail(err: TransportError) -> Self {
        Self {
            result: Err(err),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// In-memory entity API.
///
/// Unscripted calls behave like a well-mannered backend: creates assign a
/// UUIDv7, patches merge into the stored record and echo it back, and unknown
/// identifiers answer with a not-found error envelope.
#[derive(Debug, Clone, Default)]
pub struct MockEntityApi {
    records: Arc<Mutex<HashMap<String, Record>>>,
    calls: Arc<Mutex<Vec<ApiCall>>>,
    scripted: Arc<Mutex<HashMap<Operation, VecDeque<Reply>>>>,
    fetch_delays: Arc<Mutex<HashMap<String, Duration>>>,
    latency: Duration,
}

impl MockEntityApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every unscripted answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed a stored record. The identifier field is added when missing.
    pub fn with_record(self, id: impl Into<String>, mut record: Record) -> Self {
        let id = id.into();
        record
            .entry(ID_FIELD.to_string())
            .or_insert_with(|| json!(id.clone()));
        self.records.lock().unwrap().insert(id, record);
        self
    }

    /// Queue an answer for the next call of `operation`.
    pub fn script(&self, operation: Operation, reply: Reply) {
        self.scripted
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(reply);
    }

    /// Delay fetches of one identifier.
    pub fn delay_fetch(&self, id: impl Into<String>, delay: Duration) {
        self.fetch_delays.lock().unwrap().insert(id.into(), delay);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Fetch(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn creates(&self) -> Vec<Record> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Create(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn patches(&self) -> Vec<(String, Record)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Patch(id, payload) => Some((id, payload)),
                _ => None,
            })
            .collect()
    }

    /// Number of create and patch calls.
    pub fn write_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ApiCall::Create(_) | ApiCall::Patch(..)))
            .count()
    }

    pub fn record(&self, id: &str) -> Option<Record> {
        self.records.lock().unwrap().get(id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Clear stored records, recorded calls and scripted answers.
    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
        self.calls.lock().unwrap().clear();
        self.scripted.lock().unwrap().clear();
        self.fetch_delays.lock().unwrap().clear();
    }

    fn record_call(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_scripted(&self, operation: Operation) -> Option<Reply> {
        self.scripted
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
    }

    async fn deliver(reply: Reply) -> Result<Envelope, TransportError> {
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }

    fn stored_or_not_found(&self, id: &str) -> Envelope {
        match self.record(id) {
            Some(record) => Envelope::success(record),
            None => fixtures::not_found(),
        }
    }

    fn store_created(&self, mut payload: Record) -> Envelope {
        let id = Uuid::now_v7().to_string();
        payload.insert(ID_FIELD.to_string(), json!(id));
        self.records.lock().unwrap().insert(id, payload.clone());
        Envelope::success(payload)
    }

    fn store_patch(&self, id: &str, payload: Record) -> Envelope {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(id.to_string()).or_insert_with(|| {
            let mut record = Record::new();
            record.insert(ID_FIELD.to_string(), json!(id));
            record
        });
        record.extend(payload);
        Envelope::success(record.clone())
    }
}

#[async_trait]
impl EntityApi for MockEntityApi {
    async fn fetch(&self, id: &str) -> Result<Envelope, TransportError> {
        self.record_call(ApiCall::Fetch(id.to_string()));
        let reply = match self.next_scripted(Operation::Fetch) {
            Some(reply) => reply,
            None => Reply::ok(self.stored_or_not_found(id)).after(self.latency),
        };
        let extra = self.fetch_delays.lock().unwrap().get(id).copied();
        let reply = match extra {
            Some(delay) => {
                let total = reply.delay + delay;
                reply.after(total)
            }
            None => reply,
        };
        Self::deliver(reply).await
    }

    async fn create(&self, payload: Record) -> Result<Envelope, TransportError> {
        self.record_call(ApiCall::Create(payload.clone()));
        let reply = match self.next_scripted(Operation::Create) {
            Some(reply) => reply,
            None => Reply::ok(self.store_created(payload)).after(self.latency),
        };
        Self::deliver(reply).await
    }

    async fn patch(&self, id: &str, payload: Record) -> Result<Envelope, TransportError> {
        self.record_call(ApiCall::Patch(id.to_string(), payload.clone()));
        let reply = match self.next_scripted(Operation::Patch) {
            Some(reply) => reply,
            None => Reply::ok(self.store_patch(id, payload)).after(self.latency),
        };
        Self::deliver(reply).await
    }

    async fn remove(&self, id: &str) -> Result<Envelope, TransportError> {
        self.record_call(ApiCall::Remove(id.to_string()));
        let reply = match self.next_scripted(Operation::Remove) {
            Some(reply) => reply,
            None => {
                let removed = self.records.lock().unwrap().remove(id);
                let envelope = match removed {
                    Some(_) => Envelope::empty_success(),
                    None => fixtures::not_found(),
                };
                Reply::ok(envelope).after(self.latency)
            }
        };
        Self::deliver(reply).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for field values and error payloads.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// A plausible field name.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z]{0,11}"
    }

    /// Short free text, sometimes padded with whitespace.
    pub fn arb_text() -> impl Strategy<Value = String> {
        (" {0,2}", "[A-Za-z0-9 ]{0,16}", " {0,2}").prop_map(|(l, s, r)| format!("{l}{s}{r}"))
    }

    /// Scalar field values, including nulls and reference objects.
    pub fn arb_field_value() -> impl Strategy<Value = FieldValue> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            arb_text().prop_map(Value::String),
            "[a-f0-9]{8}".prop_map(|id| json!({ "uuid": id, "name": "ref" })),
        ]
    }

    /// `(field, value)` edit sequences against a small set of fields.
    pub fn arb_edits(max: usize) -> impl Strategy<Value = Vec<(String, String)>> {
        let field = prop_oneof![Just("name"), Just("shortName"), Just("comment")];
        prop::collection::vec((field.prop_map(str::to_string), arb_text()), 1..=max)
    }

    /// A well-formed error item object.
    pub fn arb_error_item() -> impl Strategy<Value = ErrorItem> {
        ("error\\.[a-z]{1,10}", "[A-Za-z ]{0,20}")
            .prop_map(|(key, message)| ErrorItem::new(key, message))
    }

    /// An already-normalized error shape.
    pub fn arb_request_error() -> impl Strategy<Value = RequestError> {
        (
            prop::collection::vec(arb_error_item(), 0..3),
            prop::collection::btree_map(
                arb_field_name(),
                prop::collection::vec(arb_error_item(), 0..3),
                0..4,
            ),
        )
            .prop_map(|(global, fields)| RequestError { global, fields })
    }

    /// Anything a backend might put in an error body.
    pub fn arb_raw_error() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[A-Za-z .]{0,20}".prop_map(Value::String),
        ];
        let item = prop_oneof![
            arb_error_item().prop_map(|item| json!({ "key": item.key, "message": item.message })),
            "[A-Za-z ]{1,12}".prop_map(|message| json!({ "message": message })),
            leaf.clone(),
        ];
        prop_oneof![
            leaf,
            arb_request_error().prop_map(|error| error.to_value()),
            "[A-Za-z ]{1,20}".prop_map(|message| json!({ "global": { "message": message } })),
            (
                prop::collection::vec(item.clone(), 0..3),
                prop::collection::btree_map(arb_field_name(), item, 0..3),
            )
                .prop_map(|(global, fields)| json!({ "global": global, "fields": fields })),
        ]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built envelopes and records for common scenarios.

    use super::*;

    /// A laboratory as the backend returns it.
    pub fn laboratory(id: &str, name: &str) -> Record {
        let mut record = single_field(ID_FIELD, json!(id));
        record.insert("name".into(), json!(name));
        record.insert("shortName".into(), json!(""));
        record
    }

    /// Validation failure with one message per listed field.
    pub fn validation_error(fields: &[(&str, &str, &str)]) -> Envelope {
        let error = fields
            .iter()
            .fold(RequestError::default(), |error, (field, key, message)| {
                error.with_field(*field, ErrorItem::new(*key, *message))
            });
        Envelope::error(error.to_value()).with_status_code(400)
    }

    /// Global-only failure.
    pub fn global_error(key: &str, message: &str) -> Envelope {
        Envelope::error(RequestError::global_only(ErrorItem::new(key, message)).to_value())
            .with_status_code(500)
    }

    pub fn not_found() -> Envelope {
        Envelope::error(
            RequestError::global_only(ErrorItem::new(NOT_FOUND_KEY, "Resource not found"))
                .to_value(),
        )
        .with_status_code(404)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over recorded mock traffic.

    use super::*;

    /// Assert exactly one patch went out and return it.
    pub fn assert_single_patch(api: &MockEntityApi) -> (String, Record) {
        let patches = api.patches();
        assert_eq!(patches.len(), 1, "Expected one patch, got {patches:?}");
        patches.into_iter().next().unwrap_or_default()
    }

    pub fn assert_no_writes(api: &MockEntityApi) {
        assert_eq!(api.write_count(), 0, "Expected no writes, got {:?}", api.calls());
    }
}
