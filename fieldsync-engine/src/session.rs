//! One editing session: load, optimistic edits, debounced writes, reconciliation.
//!
//! A session is driven from a single task. User edits are applied
//! synchronously; network effects only happen while the owner awaits
//! [`EditSession::next_event`]. Every load and write carries the generation it
//! was started in, and completions from an older generation are dropped.
//!
//! Edits and dispatches share one revision counter. A confirmed record never
//! overwrites a draft field edited after the write it answers was sent, and
//! no-op detection compares against the server record with every in-flight
//! payload laid over it.

use crate::ack::AckSignal;
use crate::binding::FieldSink;
use crate::config::{SessionConfig, SessionOptions};
use crate::error::SessionError;
use crate::events::{SessionEvent, WriteKind};
use crate::reconcile::{FieldBook, Reconciler};
use crate::scheduler::{Offer, PatchScheduler};
use fieldsync_core::{
    single_field, EntityApi, Envelope, FieldState, FieldValue, Record, SessionId,
    TransportError, ID_FIELD,
};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep_until, Instant};

enum Completion {
    Load {
        generation: u64,
        id: String,
        result: Result<Envelope, TransportError>,
    },
    Write {
        generation: u64,
        revision: u64,
        kind: WriteKind,
        payload: Record,
        result: Result<Envelope, TransportError>,
    },
}

enum Step {
    Completed(Completion),
    WindowClosed,
}

pub struct EditSession<A: EntityApi + 'static> {
    api: Arc<A>,
    defaults: Record,
    reconciler: Reconciler,
    scheduler: PatchScheduler,
    generation: u64,
    id: Option<SessionId>,
    draft: Option<Record>,
    server: Option<Record>,
    book: FieldBook,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    revision: u64,
    /// Revision of the last edit per field.
    edited_at: BTreeMap<String, u64>,
    /// Values carried by unanswered writes, tagged with the dispatching revision.
    sent: BTreeMap<String, (u64, FieldValue)>,
    loading: bool,
    writes_in_flight: usize,
    create_in_flight: bool,
    resume_after_create: bool,
    /// A create succeeded without an identifier; nothing more can be written.
    unaddressable: bool,
    session_error: Option<SessionError>,
}

impl<A: EntityApi + 'static> EditSession<A> {
    pub fn new(api: Arc<A>, config: SessionConfig, options: SessionOptions) -> Self {
        Self {
            api,
            reconciler: Reconciler::new(&config, &options),
            scheduler: PatchScheduler::new(config.debounce()),
            defaults: options.defaults,
            generation: 0,
            id: None,
            draft: None,
            server: None,
            book: FieldBook::default(),
            in_flight: FuturesUnordered::new(),
            revision: 0,
            edited_at: BTreeMap::new(),
            sent: BTreeMap::new(),
            loading: false,
            writes_in_flight: 0,
            create_in_flight: false,
            resume_after_create: false,
            unaddressable: false,
            session_error: None,
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Start a session for `id`, discarding everything from the previous one.
    pub fn open(&mut self, id: SessionId) {
        self.reset();
        match &id {
            SessionId::Create => {
                tracing::info!("Opening create session");
                self.draft = Some(self.defaults.clone());
                self.server = Some(self.defaults.clone());
            }
            SessionId::Existing(record_id) => {
                tracing::info!(id = %record_id, generation = self.generation, "Loading record");
                self.loading = true;
                let api = self.api.clone();
                let generation = self.generation;
                let record_id = record_id.clone();
                self.in_flight.push(Box::pin(async move {
                    let result = api.fetch(&record_id).await;
                    Completion::Load {
                        generation,
                        id: record_id,
                        result,
                    }
                }));
            }
        }
        self.id = Some(id);
    }

    /// End the session. Outstanding responses will be ignored.
    pub fn close(&mut self) {
        self.reset();
        self.id = None;
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.draft = None;
        self.server = None;
        self.book.clear();
        self.scheduler.clear();
        self.edited_at.clear();
        self.sent.clear();
        self.loading = false;
        self.writes_in_flight = 0;
        self.create_in_flight = false;
        self.resume_after_create = false;
        self.unaddressable = false;
        self.session_error = None;
    }

    // ========================================================================
    // EDITING
    // ========================================================================

    /// Apply an edit optimistically and schedule it for the next write.
    ///
    /// Ignored while no draft is loaded.
    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        let Some(draft) = self.draft.as_mut() else {
            tracing::debug!(field = %name, "Edit ignored, no draft loaded");
            return;
        };
        self.book.begin_edit(&name);
        draft.insert(name.clone(), value.clone());
        self.revision += 1;
        self.edited_at.insert(name.clone(), self.revision);
        self.schedule(single_field(name, value));
    }

    fn schedule(&mut self, delta: Record) {
        let forced: Record = match &self.draft {
            Some(draft) => self
                .book
                .errored_fields()
                .filter_map(|field| draft.get(field).map(|v| (field.to_string(), v.clone())))
                .collect(),
            None => Record::new(),
        };
        let forced_count = forced.len();
        let baseline = expected_server(self.server.as_ref(), &self.sent);
        let offer = self
            .scheduler
            .offer(delta, baseline.as_deref(), forced, Instant::now());
        tracing::debug!(
            ?offer,
            forced = forced_count,
            pending = self.scheduler.pending().len(),
            "Patch scheduled"
        );
        if offer == Offer::Withdrawn {
            tracing::debug!("Pending patch withdrawn, values match what was sent");
        }
    }

    /// Close the debounce window now.
    pub fn flush(&mut self) {
        self.scheduler.fire_now(Instant::now());
    }

    // ========================================================================
    // DRIVING
    // ========================================================================

    /// Wait for the next observable change.
    ///
    /// Returns `None` once nothing is scheduled and nothing is in flight.
    /// Cancel-safe: pending work is kept in the session.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let deadline = self.scheduler.deadline();
            if deadline.is_none() && self.in_flight.is_empty() {
                return None;
            }

            let window = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            let step = tokio::select! {
                biased;
                Some(done) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    Step::Completed(done)
                }
                _ = window => Step::WindowClosed,
            };

            let event = match step {
                Step::Completed(done) => self.complete(done),
                Step::WindowClosed => self.dispatch_due(Instant::now()),
            };
            if event.is_some() {
                return event;
            }
        }
    }

    /// Drive until idle, collecting every event.
    pub async fn settle(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    fn dispatch_due(&mut self, now: Instant) -> Option<SessionEvent> {
        if self.unaddressable {
            self.scheduler.defer();
            tracing::debug!("Write held back, the created record has no identifier");
            return None;
        }
        if self.create_in_flight {
            // a second create would duplicate the record
            self.scheduler.defer();
            self.resume_after_create = true;
            tracing::debug!("Write held back until the pending create completes");
            return None;
        }
        let payload = self.scheduler.take_due(now)?;
        let fields: Vec<String> = payload.keys().cloned().collect();
        let generation = self.generation;
        self.revision += 1;
        let revision = self.revision;
        let api = self.api.clone();

        let (kind, future): (WriteKind, BoxFuture<'static, Completion>) = match &self.id {
            Some(SessionId::Create) => {
                let body = self.draft.clone().unwrap_or_default();
                self.mark_sent(&body, revision);
                self.create_in_flight = true;
                let future = Box::pin(async move {
                    let result = api.create(body).await;
                    Completion::Write {
                        generation,
                        revision,
                        kind: WriteKind::Create,
                        payload,
                        result,
                    }
                });
                (WriteKind::Create, future)
            }
            Some(SessionId::Existing(record_id)) => {
                let record_id = record_id.clone();
                self.mark_sent(&payload, revision);
                let future = Box::pin(async move {
                    let result = api.patch(&record_id, payload.clone()).await;
                    Completion::Write {
                        generation,
                        revision,
                        kind: WriteKind::Patch,
                        payload,
                        result,
                    }
                });
                (WriteKind::Patch, future)
            }
            None => return None,
        };

        tracing::debug!(?kind, fields = ?fields, "Dispatching write");
        self.writes_in_flight += 1;
        self.in_flight.push(future);
        Some(SessionEvent::Dispatched { kind, fields })
    }

    fn mark_sent(&mut self, body: &Record, revision: u64) {
        for (name, value) in body {
            self.sent.insert(name.clone(), (revision, value.clone()));
        }
    }

    fn complete(&mut self, done: Completion) -> Option<SessionEvent> {
        match done {
            Completion::Load {
                generation,
                id,
                result,
            } => {
                if generation != self.generation {
                    tracing::debug!(id = %id, generation, "Stale load ignored");
                    return None;
                }
                Some(self.complete_load(id, result))
            }
            Completion::Write {
                generation,
                revision,
                kind,
                payload,
                result,
            } => {
                if generation != self.generation {
                    tracing::debug!(?kind, generation, "Stale write ignored");
                    return None;
                }
                Some(self.complete_write(kind, revision, payload, result))
            }
        }
    }

    fn complete_load(
        &mut self,
        id: String,
        result: Result<Envelope, TransportError>,
    ) -> SessionEvent {
        self.loading = false;
        let outcome = match result {
            Err(err) => Err(SessionError::from(err)),
            Ok(envelope) if envelope.is_not_found() => Err(SessionError::NotFound { id: id.clone() }),
            Ok(envelope) => match (envelope.request_error(), envelope.data) {
                (Some(error), _) => {
                    let message = error
                        .global
                        .iter()
                        .map(|item| item.message.as_str())
                        .filter(|message| !message.is_empty())
                        .collect::<Vec<_>>()
                        .join("\n");
                    Err(SessionError::Load { message })
                }
                (None, Some(record)) => Ok(record),
                (None, None) => Err(SessionError::Load {
                    message: "empty response".to_string(),
                }),
            },
        };

        match outcome {
            Ok(record) => {
                tracing::info!(id = %id, fields = record.len(), "Record loaded");
                self.server = Some(record.clone());
                self.draft = Some(record);
                SessionEvent::Loaded
            }
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "Load failed");
                self.draft = None;
                self.server = None;
                self.session_error = Some(err.clone());
                SessionEvent::LoadFailed(err)
            }
        }
    }

    fn complete_write(
        &mut self,
        kind: WriteKind,
        revision: u64,
        payload: Record,
        result: Result<Envelope, TransportError>,
    ) -> SessionEvent {
        self.writes_in_flight = self.writes_in_flight.saturating_sub(1);
        self.sent.retain(|_, (sent_in, _)| *sent_in != revision);
        if kind == WriteKind::Create {
            self.create_in_flight = false;
        }
        let fields: Vec<String> = payload.keys().cloned().collect();

        let envelope = match result {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(?kind, error = %err, "Write got no response, payload requeued");
                self.scheduler.requeue(payload);
                self.resume_held_writes();
                let err = SessionError::from(err);
                self.session_error = Some(err.clone());
                return SessionEvent::WriteFailed(err);
            }
        };

        if let Some(error) = envelope.request_error() {
            tracing::warn!(
                ?kind,
                fields = ?fields,
                field_errors = error.fields.len(),
                global_errors = error.global.len(),
                "Write rejected"
            );
            self.reconciler.apply_rejection(&mut self.book, &error, &fields);
            self.resume_held_writes();
            return SessionEvent::Rejected { fields };
        }

        let data = envelope.data.unwrap_or_default();
        let created = if kind == WriteKind::Create {
            let new_id = data
                .get(ID_FIELD)
                .and_then(FieldValue::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            match &new_id {
                Some(new_id) => {
                    tracing::info!(id = %new_id, "Record created");
                    self.id = Some(SessionId::Existing(new_id.clone()));
                }
                None => {
                    tracing::warn!(fields = ?fields, "Create succeeded without an identifier, holding writes");
                    self.merge_confirmed(data, revision);
                    self.reconciler.apply_success(&mut self.book, &fields);
                    self.unaddressable = true;
                    self.resume_after_create = false;
                    self.scheduler.defer();
                    let err = SessionError::MissingIdentifier;
                    self.session_error = Some(err.clone());
                    return SessionEvent::WriteFailed(err);
                }
            }
            new_id
        } else {
            None
        };

        self.merge_confirmed(data, revision);
        self.reconciler.apply_success(&mut self.book, &fields);
        self.session_error = None;
        self.resume_held_writes();

        match created {
            Some(id) => SessionEvent::Created { id, fields },
            None => SessionEvent::Saved { fields },
        }
    }

    /// Merge a record confirmed by the write sent at `revision`.
    ///
    /// Fields edited after that write, or still pending, keep the user's value.
    fn merge_confirmed(&mut self, data: Record, revision: u64) {
        let pending = self.scheduler.pending();
        let edited_at = &self.edited_at;
        if let Some(draft) = self.draft.as_mut() {
            for (name, value) in &data {
                let newer = edited_at.get(name).is_some_and(|at| *at > revision);
                if !newer && !pending.contains_key(name) {
                    draft.insert(name.clone(), value.clone());
                }
            }
        }
        if let Some(server) = self.server.as_mut() {
            server.extend(data);
        }
    }

    fn resume_held_writes(&mut self) {
        if self.resume_after_create && !self.create_in_flight {
            self.resume_after_create = false;
            self.scheduler.rearm(Instant::now());
        }
    }

    // ========================================================================
    // STATE
    // ========================================================================

    pub fn session_id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    pub fn is_create_mode(&self) -> bool {
        matches!(self.id, Some(SessionId::Create))
    }

    pub fn draft(&self) -> Option<&Record> {
        self.draft.as_ref()
    }

    /// Last known server state of the record.
    pub fn server_record(&self) -> Option<&Record> {
        self.server.as_ref()
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.draft.as_ref().and_then(|draft| draft.get(name))
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        self.book.errors()
    }

    pub fn error_for(&self, name: &str) -> Option<&str> {
        self.book.error_for(name)
    }

    pub fn states(&self) -> &BTreeMap<String, FieldState> {
        self.book.states()
    }

    pub fn state_for(&self, name: &str) -> FieldState {
        self.book.state_for(name)
    }

    /// Current state of `name` for [`crate::SaveAcknowledgment`].
    pub fn ack_signal(&self, name: &str) -> AckSignal {
        AckSignal::new(self.book.answers_for(name), self.book.state_for(name))
    }

    pub fn global_errors(&self) -> &[String] {
        self.book.global()
    }

    pub fn session_error(&self) -> Option<&SessionError> {
        self.session_error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_saving(&self) -> bool {
        self.writes_in_flight > 0
    }

    pub fn pending_fields(&self) -> Vec<&str> {
        self.scheduler.pending().keys().map(String::as_str).collect()
    }
}

/// The server record as it will read once every unanswered write has landed.
fn expected_server<'a>(
    server: Option<&'a Record>,
    sent: &BTreeMap<String, (u64, FieldValue)>,
) -> Option<Cow<'a, Record>> {
    let server = server?;
    if sent.is_empty() {
        return Some(Cow::Borrowed(server));
    }
    let mut expected = server.clone();
    for (name, (_, value)) in sent {
        expected.insert(name.clone(), value.clone());
    }
    Some(Cow::Owned(expected))
}

impl<A: EntityApi + 'static> FieldSink for EditSession<A> {
    fn set_field(&mut self, field: &str, value: FieldValue) {
        EditSession::set_field(self, field, value);
    }

    fn draft_value(&self, field: &str) -> Option<&FieldValue> {
        self.value(field)
    }

    fn server_value(&self, field: &str) -> Option<&FieldValue> {
        self.server.as_ref().and_then(|server| server.get(field))
    }

    fn field_error(&self, field: &str) -> Option<&str> {
        self.error_for(field)
    }

    fn field_state(&self, field: &str) -> FieldState {
        self.state_for(field)
    }

    fn is_loading(&self) -> bool {
        self.loading
    }
}

impl<A: EntityApi + 'static> fmt::Debug for EditSession<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditSession")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("draft", &self.draft)
            .field("errors", self.book.errors())
            .field("pending", self.scheduler.pending())
            .field("loading", &self.loading)
            .field("writes_in_flight", &self.writes_in_flight)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}
