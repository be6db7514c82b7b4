//! Command-line argument parsing.
//!
//! `fieldsync-client [--config <path>] <id|create> [field=value ...]`

use crate::error::ClientError;
use fieldsync_core::{FieldValue, SessionId};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub target: SessionId,
    pub edits: Vec<(String, FieldValue)>,
}

pub fn parse_args<I>(args: I) -> Result<Invocation, ClientError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            args.next();
            continue;
        }
        positional.push(arg);
    }

    let mut positional = positional.into_iter();
    let target = positional
        .next()
        .ok_or_else(|| ClientError::InvalidArgument("missing record id or 'create'".to_string()))?;
    let target = SessionId::parse(&target)?;

    let edits = positional
        .map(|assignment| parse_edit(&assignment))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Invocation { target, edits })
}

/// `field=value`; the value is read as JSON and falls back to a plain string.
fn parse_edit(assignment: &str) -> Result<(String, FieldValue), ClientError> {
    let (field, raw) = assignment.split_once('=').ok_or_else(|| {
        ClientError::InvalidArgument(format!("expected field=value, got '{}'", assignment))
    })?;
    let field = field.trim();
    if field.is_empty() {
        return Err(ClientError::InvalidArgument(format!(
            "empty field name in '{}'",
            assignment
        )));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((field.to_string(), value))
}
