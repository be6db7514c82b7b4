//! REST implementation of [`EntityApi`].
//!
//! Every HTTP answer becomes an [`Envelope`]. Only requests that never got a
//! response surface as [`TransportError`].

use crate::config::ClientConfig;
use crate::error::ClientError;
use async_trait::async_trait;
use fieldsync_core::{EntityApi, Envelope, Record, TransportError};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;

/// Called when the backend answers `401 Unauthorized`.
#[async_trait]
pub trait SessionExpiryHandler: Send + Sync {
    /// Returns `true` when the session was refreshed and the request may be retried.
    async fn on_expired(&self) -> bool;
}

/// Never refreshes; a 401 is reported as an ordinary error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefresh;

#[async_trait]
impl SessionExpiryHandler for NoRefresh {
    async fn on_expired(&self) -> bool {
        false
    }
}

#[derive(Clone)]
pub struct RestEntityApi {
    client: reqwest::Client,
    collection: Url,
    on_expired: Arc<dyn SessionExpiryHandler>,
}

impl RestEntityApi {
    pub fn new(
        config: &ClientConfig,
        on_expired: Arc<dyn SessionExpiryHandler>,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let collection = collection_url(&config.api_base_url, &config.entity_path)?;
        Ok(Self {
            client,
            collection,
            on_expired,
        })
    }

    pub fn collection_url(&self) -> &Url {
        &self.collection
    }

    pub fn record_url(&self, id: &str) -> Url {
        let mut url = self.collection.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(id);
        }
        url
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&Record>,
    ) -> Result<Envelope, TransportError> {
        let envelope = self.send(method.clone(), url.clone(), body).await?;
        if envelope.status_code != Some(StatusCode::UNAUTHORIZED.as_u16()) {
            return Ok(envelope);
        }

        tracing::info!(%method, %url, "Session expired");
        if self.on_expired.on_expired().await {
            tracing::debug!(%method, %url, "Retrying after session refresh");
            return self.send(method, url, body).await;
        }
        Ok(envelope)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Record>,
    ) -> Result<Envelope, TransportError> {
        tracing::debug!(%method, %url, "Sending request");
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        Ok(envelope_from_response(status, &text))
    }
}

impl std::fmt::Debug for RestEntityApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestEntityApi")
            .field("collection", &self.collection.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EntityApi for RestEntityApi {
    async fn fetch(&self, id: &str) -> Result<Envelope, TransportError> {
        self.execute(Method::GET, self.record_url(id), None).await
    }

    async fn create(&self, payload: Record) -> Result<Envelope, TransportError> {
        self.execute(Method::POST, self.collection.clone(), Some(&payload))
            .await
    }

    async fn patch(&self, id: &str, payload: Record) -> Result<Envelope, TransportError> {
        self.execute(Method::PATCH, self.record_url(id), Some(&payload))
            .await
    }

    async fn remove(&self, id: &str) -> Result<Envelope, TransportError> {
        self.execute(Method::DELETE, self.record_url(id), None).await
    }
}

/// `{base}/{entity_path}` with empty segments dropped.
pub fn collection_url(base: &str, entity_path: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidBaseUrl {
        url: base.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(entity_path.split('/').filter(|segment| !segment.is_empty()));
    Ok(url)
}

/// Map a status code and raw body to an envelope.
///
/// A 2xx with a JSON object body carries it as data; any other 2xx body is
/// treated as empty. Errors keep the parsed JSON body, or the text wrapped as
/// a JSON string, for later normalization.
pub fn envelope_from_response(status: StatusCode, body: &str) -> Envelope {
    let parsed = if body.trim().is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(body).unwrap_or_else(|_| Value::String(body.to_string())))
    };

    let envelope = if status.is_success() {
        match parsed {
            Some(Value::Object(data)) => Envelope::success(data),
            Some(other) => {
                tracing::debug!(status = status.as_u16(), body = %other, "Non-object success body ignored");
                Envelope::empty_success()
            }
            None => Envelope::empty_success(),
        }
    } else {
        Envelope::error(parsed.unwrap_or(Value::Null))
    };
    envelope.with_status_code(status.as_u16())
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::request_error::{NOT_FOUND_KEY, STRING_WRAPPED_KEY};
    use serde_json::json;

    fn config(base: &str, path: &str) -> ClientConfig {
        ClientConfig::from_toml(&format!(
            "api_base_url = \"{base}\"\nentity_path = \"{path}\"\nrequest_timeout_ms = 1000\n"
        ))
        .unwrap()
    }

    #[test]
    fn test_collection_url_joins_segments() {
        let url = collection_url("http://localhost:8080/", "/api/laboratories/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/laboratories");
        let nested = collection_url("https://example.org/base", "api/labs").unwrap();
        assert_eq!(nested.as_str(), "https://example.org/base/api/labs");
    }

    #[test]
    fn test_collection_url_rejects_garbage() {
        assert!(matches!(
            collection_url("not a url", "labs"),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_record_url_encodes_identifier() {
        let api = RestEntityApi::new(&config("http://localhost:8080", "api/labs"), Arc::new(NoRefresh))
            .unwrap();
        assert_eq!(
            api.record_url("abc-1").as_str(),
            "http://localhost:8080/api/labs/abc-1"
        );
        assert_eq!(
            api.record_url("a b").as_str(),
            "http://localhost:8080/api/labs/a%20b"
        );
    }

    #[test]
    fn test_success_body_becomes_data() {
        let envelope = envelope_from_response(StatusCode::OK, r#"{"uuid":"abc-1","name":"Lab A"}"#);
        assert!(envelope.is_success());
        assert_eq!(envelope.status_code, Some(200));
        assert_eq!(envelope.data.unwrap()["uuid"], json!("abc-1"));
    }

    #[test]
    fn test_no_content_is_empty_success() {
        let envelope = envelope_from_response(StatusCode::NO_CONTENT, "");
        assert!(envelope.is_success());
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_error_body_is_kept_raw() {
        let body = json!({
            "global": [{ "key": NOT_FOUND_KEY, "message": "gone" }],
            "fields": {}
        });
        let envelope = envelope_from_response(StatusCode::NOT_FOUND, &body.to_string());
        assert!(!envelope.is_success());
        assert_eq!(envelope.error, Some(body));
        assert!(envelope.is_not_found());
    }

    #[test]
    fn test_text_error_body_is_wrapped() {
        let envelope = envelope_from_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(envelope.error, Some(json!("upstream down")));
        let error = envelope.request_error().unwrap();
        assert_eq!(error.global[0].key, STRING_WRAPPED_KEY);
        assert_eq!(error.global[0].message, "upstream down");
    }

    #[test]
    fn test_empty_error_body_normalizes_to_generic() {
        let envelope = envelope_from_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(envelope.error, Some(Value::Null));
        let error = envelope.request_error().unwrap();
        assert_eq!(error.global.len(), 1);
        assert!(error.fields.is_empty());
    }

    #[tokio::test]
    async fn test_no_refresh_declines() {
        assert!(!NoRefresh.on_expired().await);
    }
}
