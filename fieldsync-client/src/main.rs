//! fieldsync command-line entry point.
//!
//! Opens one record (or a create session), applies the given edits, waits
//! until every write has been answered and prints the resulting state.

use fieldsync_client::cli::parse_args;
use fieldsync_client::telemetry;
use fieldsync_client::{ClientConfig, ClientError, NoRefresh, RestEntityApi};
use fieldsync_engine::{EditSession, SessionEvent, SessionOptions};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let config = ClientConfig::load()?;
    telemetry::init_tracing(config.log_filter.as_deref())?;
    let invocation = parse_args(std::env::args().skip(1))?;

    let api = RestEntityApi::new(&config, Arc::new(NoRefresh))?;
    let mut session = EditSession::new(
        Arc::new(api),
        config.session.clone(),
        SessionOptions::default(),
    );

    session.open(invocation.target);
    if !session.is_create_mode() {
        match session.next_event().await {
            Some(SessionEvent::LoadFailed(err)) => return Err(err.into()),
            Some(event) => tracing::debug!(?event, "Session event"),
            None => {}
        }
    }

    for (field, value) in invocation.edits {
        session.set_field(field, value);
    }
    session.flush();
    for event in session.settle().await {
        match &event {
            SessionEvent::Rejected { fields } => {
                tracing::warn!(fields = ?fields, "Write rejected");
            }
            SessionEvent::WriteFailed(err) => {
                tracing::error!(error = %err, "Write failed");
            }
            other => tracing::info!(event = ?other, "Session event"),
        }
    }

    let summary = json!({
        "id": session.session_id().map(ToString::to_string),
        "record": session.draft(),
        "errors": session.errors(),
        "global": session.global_errors(),
        "pending": session.pending_fields(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
