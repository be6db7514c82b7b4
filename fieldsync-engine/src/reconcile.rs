//! Response reconciliation: turns one write outcome into per-field and global error state.

use crate::config::{FieldKeyMapper, MessageRenderer, SessionConfig, SessionOptions};
use fieldsync_core::{FieldState, RequestError};
use std::collections::BTreeMap;

/// Error and state bookkeeping for the fields of one session.
///
/// Only non-empty messages are stored, so presence in `errors` means "flagged".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldBook {
    errors: BTreeMap<String, String>,
    states: BTreeMap<String, FieldState>,
    answers: BTreeMap<String, u64>,
    global: Vec<String>,
}

impl FieldBook {
    /// The user is revising `field`: drop its error and outcome.
    pub fn begin_edit(&mut self, field: &str) {
        self.errors.remove(field);
        self.states.insert(field.to_string(), FieldState::Undefined);
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn error_for(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn states(&self) -> &BTreeMap<String, FieldState> {
        &self.states
    }

    pub fn state_for(&self, field: &str) -> FieldState {
        self.states.get(field).copied().unwrap_or_default()
    }

    /// How many write outcomes have been recorded for `field`.
    pub fn answers_for(&self, field: &str) -> u64 {
        self.answers.get(field).copied().unwrap_or(0)
    }

    pub fn global(&self) -> &[String] {
        &self.global
    }

    /// Fields currently carrying an error message.
    pub fn errored_fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.states.clear();
        self.answers.clear();
        self.global.clear();
    }

    fn record_answer(&mut self, fields: &[String], state: FieldState) {
        for field in fields {
            self.states.insert(field.clone(), state);
            *self.answers.entry(field.clone()).or_insert(0) += 1;
        }
    }
}

/// Applies write outcomes to a [`FieldBook`].
#[derive(Clone)]
pub struct Reconciler {
    map_field_key: FieldKeyMapper,
    to_message: MessageRenderer,
    placeholder: String,
    fallback: String,
}

impl Reconciler {
    pub fn new(config: &SessionConfig, options: &SessionOptions) -> Self {
        Self {
            map_field_key: options.map_field_key.clone(),
            to_message: options.to_message.clone(),
            placeholder: config.placeholder_message.clone(),
            fallback: config.fallback_message.clone(),
        }
    }

    /// Every dispatched field is confirmed and the global list is cleared.
    pub fn apply_success(&self, book: &mut FieldBook, sent: &[String]) {
        for field in sent {
            book.errors.remove(field);
        }
        book.record_answer(sent, FieldState::Success);
        book.global.clear();
    }

    /// Populate field and global errors from a rejected write.
    ///
    /// When any field is named, dispatched fields the server did not name get
    /// the placeholder instead of looking valid. A purely global failure clears
    /// the dispatched fields.
    pub fn apply_rejection(&self, book: &mut FieldBook, error: &RequestError, sent: &[String]) {
        let mut next: BTreeMap<String, Option<String>> = BTreeMap::new();
        let mut named_any = false;

        for (backend_key, items) in &error.fields {
            let Some(field) = (self.map_field_key)(backend_key) else {
                continue;
            };
            let message = items
                .iter()
                .map(|item| (self.to_message)(item))
                .filter(|message| !message.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            let message = if message.is_empty() {
                self.fallback.clone()
            } else {
                message
            };
            next.insert(field, Some(message));
            named_any = true;
        }

        for field in sent {
            if !next.contains_key(field) {
                let replacement = named_any.then(|| self.placeholder.clone());
                next.insert(field.clone(), replacement);
            }
        }

        for (field, message) in next {
            match message {
                Some(message) => {
                    book.errors.insert(field, message);
                }
                None => {
                    book.errors.remove(&field);
                }
            }
        }

        book.global = error
            .global
            .iter()
            .map(|item| (self.to_message)(item))
            .filter(|message| !message.is_empty())
            .collect();
        book.record_answer(sent, FieldState::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::ErrorItem;

    fn reconciler() -> Reconciler {
        Reconciler::new(&SessionConfig::default(), &SessionOptions::default())
    }

    fn sent(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_field_error_and_placeholder() {
        let mut book = FieldBook::default();
        let error = RequestError::default().with_field("name", ErrorItem::new("k", "Too short"));
        reconciler().apply_rejection(&mut book, &error, &sent(&["name", "shortName"]));

        assert_eq!(book.error_for("name"), Some("Too short"));
        assert_eq!(book.error_for("shortName"), Some("Another field has an error."));
        assert_eq!(book.state_for("name"), FieldState::Error);
        assert_eq!(book.state_for("shortName"), FieldState::Error);
        assert!(book.global().is_empty());
    }

    #[test]
    fn test_every_outcome_counts_as_an_answer() {
        let mut book = FieldBook::default();
        let reconciler = reconciler();
        reconciler.apply_success(&mut book, &sent(&["name"]));
        reconciler.apply_success(&mut book, &sent(&["name", "shortName"]));
        let error = RequestError::default().with_field("name", ErrorItem::new("k", "Too short"));
        reconciler.apply_rejection(&mut book, &error, &sent(&["name"]));

        assert_eq!(book.answers_for("name"), 3);
        assert_eq!(book.answers_for("shortName"), 1);
        assert_eq!(book.answers_for("comment"), 0);
        book.begin_edit("name");
        assert_eq!(book.answers_for("name"), 3);
    }

    #[test]
    fn test_messages_are_newline_joined() {
        let mut book = FieldBook::default();
        let error = RequestError::default()
            .with_field("name", ErrorItem::new("a", "Too short"))
            .with_field("name", ErrorItem::new("b", "Must be unique"));
        reconciler().apply_rejection(&mut book, &error, &sent(&["name"]));
        assert_eq!(book.error_for("name"), Some("Too short\nMust be unique"));
    }

    #[test]
    fn test_empty_item_list_gets_fallback() {
        let mut book = FieldBook::default();
        let mut error = RequestError::default();
        error.fields.insert("name".into(), Vec::new());
        reconciler().apply_rejection(&mut book, &error, &sent(&["name"]));
        assert_eq!(book.error_for("name"), Some("Invalid value"));
    }

    #[test]
    fn test_global_only_failure_clears_sent_fields() {
        let mut book = FieldBook::default();
        let prior = RequestError::default().with_field("name", ErrorItem::new("k", "Too short"));
        reconciler().apply_rejection(&mut book, &prior, &sent(&["name"]));

        let global = RequestError::global_only(ErrorItem::new("error.Internal", "Server exploded"));
        reconciler().apply_rejection(&mut book, &global, &sent(&["name"]));

        assert_eq!(book.error_for("name"), None);
        assert_eq!(book.state_for("name"), FieldState::Error);
        assert_eq!(book.global(), ["Server exploded".to_string()]);
    }

    #[test]
    fn test_success_clears_errors_and_globals() {
        let mut book = FieldBook::default();
        let error = RequestError::global_only(ErrorItem::new("g", "Nope"))
            .with_field("name", ErrorItem::new("k", "Too short"));
        reconciler().apply_rejection(&mut book, &error, &sent(&["name"]));
        reconciler().apply_success(&mut book, &sent(&["name"]));

        assert!(book.errors().is_empty());
        assert!(book.global().is_empty());
        assert_eq!(book.state_for("name"), FieldState::Success);
    }

    #[test]
    fn test_key_mapper_renames_and_drops() {
        let options = SessionOptions::default().with_key_mapper(|key| match key {
            "short_name" => Some("shortName".to_string()),
            "internal" => None,
            other => Some(other.to_string()),
        });
        let reconciler = Reconciler::new(&SessionConfig::default(), &options);
        let mut book = FieldBook::default();
        let error = RequestError::default()
            .with_field("short_name", ErrorItem::new("k", "Too long"))
            .with_field("internal", ErrorItem::new("k", "hidden"));
        reconciler.apply_rejection(&mut book, &error, &sent(&["shortName"]));

        assert_eq!(book.error_for("shortName"), Some("Too long"));
        assert_eq!(book.error_for("internal"), None);
    }

    #[test]
    fn test_begin_edit_resets_field() {
        let mut book = FieldBook::default();
        let error = RequestError::default().with_field("name", ErrorItem::new("k", "Too short"));
        reconciler().apply_rejection(&mut book, &error, &sent(&["name"]));
        book.begin_edit("name");
        assert_eq!(book.error_for("name"), None);
        assert_eq!(book.state_for("name"), FieldState::Undefined);
        assert_eq!(book.errored_fields().count(), 0);
    }
}
