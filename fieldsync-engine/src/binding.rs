//! Field value adapter between raw UI input and the session.

use crate::normalize::{self, Comparator, InputFilter, Normalizer};
use fieldsync_core::value::display_text;
use fieldsync_core::{FieldState, FieldValue};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The session surface a binding needs.
pub trait FieldSink {
    fn set_field(&mut self, field: &str, value: FieldValue);
    fn draft_value(&self, field: &str) -> Option<&FieldValue>;
    fn server_value(&self, field: &str) -> Option<&FieldValue>;
    fn field_error(&self, field: &str) -> Option<&str>;
    fn field_state(&self, field: &str) -> FieldState;
    fn is_loading(&self) -> bool;
}

/// When an edit counts as final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditMode {
    /// Every change is forwarded.
    OnChange,
    /// Buffered locally, forwarded on blur or Enter.
    OnBlur,
    /// Buffered locally, forwarded on Enter only.
    OnEnter,
}

impl EditMode {
    pub fn is_deferred(self) -> bool {
        !matches!(self, EditMode::OnChange)
    }
}

/// Render-ready snapshot of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub value: String,
    pub error: Option<String>,
    /// The error, or a single space so the layout keeps its height.
    pub helper_text: String,
    pub state: FieldState,
    pub disabled: bool,
}

pub struct FieldBinding {
    field: String,
    mode: EditMode,
    local: FieldValue,
    mirrored: Option<FieldValue>,
    normalizer: Option<Normalizer>,
    comparator: Comparator,
    filter: Option<InputFilter>,
}

impl FieldBinding {
    pub fn new(field: impl Into<String>, mode: EditMode) -> Self {
        Self {
            field: field.into(),
            mode,
            local: Value::Null,
            mirrored: None,
            normalizer: None,
            comparator: Arc::new(normalize::same_text),
            filter: None,
        }
    }

    pub fn with_normalizer(
        mut self,
        normalizer: impl Fn(&FieldValue) -> FieldValue + Send + Sync + 'static,
    ) -> Self {
        self.normalizer = Some(Arc::new(normalizer));
        self
    }

    pub fn with_comparator(
        mut self,
        comparator: impl Fn(Option<&FieldValue>, &FieldValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.comparator = Arc::new(comparator);
        self
    }

    pub fn with_input_filter(mut self, filter: InputFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    fn normalized(&self, value: FieldValue) -> FieldValue {
        match &self.normalizer {
            Some(normalize) => normalize(&value),
            None => value,
        }
    }

    /// Raw input changed. Returns `false` when the input filter rejected it.
    pub fn on_change<S: FieldSink>(&mut self, sink: &mut S, next: FieldValue) -> bool {
        if let Some(filter) = &self.filter {
            if !filter(&next) {
                return false;
            }
        }
        let normalized = self.normalized(next);
        if self.mode.is_deferred() {
            self.local = normalized;
        } else {
            sink.set_field(&self.field, normalized);
        }
        true
    }

    /// Focus left the input. Commits the buffer in `OnBlur` mode.
    pub fn on_blur<S: FieldSink>(&mut self, sink: &mut S) -> bool {
        if self.mode != EditMode::OnBlur {
            return false;
        }
        self.commit(sink)
    }

    /// Explicit confirmation. Commits the current value in every mode.
    pub fn on_enter<S: FieldSink>(&mut self, sink: &mut S) -> bool {
        self.commit(sink)
    }

    /// Forward the current value unless it equals the known value.
    /// Returns whether `set_field` was called.
    fn commit<S: FieldSink>(&mut self, sink: &mut S) -> bool {
        let candidate = self.normalized(self.value(sink));
        if (self.comparator)(sink.draft_value(&self.field), &candidate) {
            tracing::debug!(field = %self.field, "Unchanged value not forwarded");
            return false;
        }
        sink.set_field(&self.field, candidate);
        true
    }

    /// Mirror the local buffer to the server-confirmed value when it moved.
    pub fn sync<S: FieldSink>(&mut self, sink: &S) {
        let confirmed = sink.server_value(&self.field).cloned();
        if confirmed == self.mirrored {
            return;
        }
        if self.mode.is_deferred() {
            self.local = confirmed.clone().unwrap_or(Value::Null);
        }
        self.mirrored = confirmed;
    }

    /// Value the input shows: the buffer when deferred, the draft otherwise.
    pub fn value<S: FieldSink>(&self, sink: &S) -> FieldValue {
        if self.mode.is_deferred() {
            self.local.clone()
        } else {
            sink.draft_value(&self.field).cloned().unwrap_or(Value::Null)
        }
    }

    pub fn view<S: FieldSink>(&self, sink: &S) -> FieldView {
        let error = sink.field_error(&self.field).map(str::to_string);
        FieldView {
            value: display_text(Some(&self.value(sink))),
            helper_text: error.clone().unwrap_or_else(|| " ".to_string()),
            error,
            state: sink.field_state(&self.field),
            disabled: sink.is_loading(),
        }
    }
}

impl fmt::Debug for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("field", &self.field)
            .field("mode", &self.mode)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::Record;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        draft: Record,
        server: Record,
        calls: Vec<(String, FieldValue)>,
        error: Option<String>,
    }

    impl FieldSink for RecordingSink {
        fn set_field(&mut self, field: &str, value: FieldValue) {
            self.draft.insert(field.to_string(), value.clone());
            self.calls.push((field.to_string(), value));
        }
        fn draft_value(&self, field: &str) -> Option<&FieldValue> {
            self.draft.get(field)
        }
        fn server_value(&self, field: &str) -> Option<&FieldValue> {
            self.server.get(field)
        }
        fn field_error(&self, _field: &str) -> Option<&str> {
            self.error.as_deref()
        }
        fn field_state(&self, _field: &str) -> FieldState {
            FieldState::Undefined
        }
        fn is_loading(&self) -> bool {
            false
        }
    }

    fn loaded(value: FieldValue) -> RecordingSink {
        let mut sink = RecordingSink::default();
        sink.draft.insert("name".into(), value.clone());
        sink.server.insert("name".into(), value);
        sink
    }

    #[test]
    fn test_immediate_mode_forwards_every_change() {
        let mut sink = loaded(json!("Lab A"));
        let mut binding = FieldBinding::new("name", EditMode::OnChange);
        binding.on_change(&mut sink, json!("Lab AB"));
        binding.on_change(&mut sink, json!("Lab ABC"));
        assert_eq!(sink.calls.len(), 2);
        assert_eq!(binding.value(&sink), json!("Lab ABC"));
    }

    #[test]
    fn test_deferred_mode_buffers_until_blur() {
        let mut sink = loaded(json!("Lab A"));
        let mut binding = FieldBinding::new("name", EditMode::OnBlur).with_normalizer(normalize::trim);
        binding.sync(&sink);
        binding.on_change(&mut sink, json!("Lab B "));
        assert!(sink.calls.is_empty());
        assert_eq!(binding.view(&sink).value, "Lab B");
        assert!(binding.on_blur(&mut sink));
        assert_eq!(sink.calls, vec![("name".to_string(), json!("Lab B"))]);
    }

    #[test]
    fn test_unchanged_value_is_suppressed() {
        let mut sink = loaded(json!("Lab A"));
        let mut binding = FieldBinding::new("name", EditMode::OnBlur).with_normalizer(normalize::trim);
        binding.sync(&sink);
        binding.on_change(&mut sink, json!(" Lab A "));
        assert!(!binding.on_blur(&mut sink));
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn test_enter_only_mode_ignores_blur() {
        let mut sink = loaded(json!("Lab A"));
        let mut binding = FieldBinding::new("name", EditMode::OnEnter);
        binding.sync(&sink);
        binding.on_change(&mut sink, json!("Lab C"));
        assert!(!binding.on_blur(&mut sink));
        assert!(binding.on_enter(&mut sink));
        assert_eq!(sink.calls.len(), 1);
    }

    #[test]
    fn test_numeric_compared_by_canonical_text() {
        let mut sink = loaded(json!(3));
        let mut binding = FieldBinding::new("name", EditMode::OnBlur);
        binding.sync(&sink);
        binding.on_change(&mut sink, json!("3"));
        assert!(!binding.on_blur(&mut sink));
    }

    #[test]
    fn test_input_filter_rejects_keystroke() {
        let mut sink = loaded(json!("1"));
        let mut binding = FieldBinding::new("name", EditMode::OnBlur)
            .with_normalizer(normalize::decimal_comma)
            .with_input_filter(normalize::decimal_filter(true, true));
        binding.sync(&sink);
        assert!(!binding.on_change(&mut sink, json!("1a")));
        assert_eq!(binding.value(&sink), json!("1"));
        assert!(binding.on_change(&mut sink, json!("1,5")));
        assert_eq!(binding.value(&sink), json!("1.5"));
    }

    #[test]
    fn test_sync_mirrors_confirmed_value_only_when_it_moves() {
        let mut sink = loaded(json!("Lab A"));
        let mut binding = FieldBinding::new("name", EditMode::OnBlur);
        binding.sync(&sink);
        binding.on_change(&mut sink, json!("typing"));
        binding.sync(&sink);
        assert_eq!(binding.value(&sink), json!("typing"));

        sink.server.insert("name".into(), json!("Lab A (server)"));
        binding.sync(&sink);
        assert_eq!(binding.value(&sink), json!("Lab A (server)"));
    }

    #[test]
    fn test_view_helper_text() {
        let mut sink = loaded(json!("Lab A"));
        let binding = FieldBinding::new("name", EditMode::OnChange);
        assert_eq!(binding.view(&sink).helper_text, " ");
        sink.error = Some("Too short".into());
        let view = binding.view(&sink);
        assert_eq!(view.helper_text, "Too short");
        assert_eq!(view.error.as_deref(), Some("Too short"));
    }
}
