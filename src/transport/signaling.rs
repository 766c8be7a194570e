//! Session negotiation collaborators
//!
//! Fetches the ephemeral credential from the web backend and relays the
//! SDP offer to the realtime service.

use crate::config::EndpointConfig;
use crate::{Result, VoxError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

/// Ephemeral credential authorizing one session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCredential {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClientSecret {
    Object {
        value: String,
        expires_at: Option<i64>,
    },
    Plain(String),
}

#[derive(Debug, Deserialize)]
struct SessionResult {
    client_secret: Option<ClientSecret>,
    credential: Option<String>,
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionBody {
    Wrapped { result: SessionResult },
    Bare(SessionResult),
}

/// Parse `{result: {client_secret: {value}, expires_at}}` and its variants
pub fn parse_credential(body: &str) -> Result<SessionCredential> {
    let body: SessionBody = serde_json::from_str(body)?;
    let result = match body {
        SessionBody::Wrapped { result } => result,
        SessionBody::Bare(result) => result,
    };

    let (value, nested_expiry) = match (result.client_secret, result.credential) {
        (Some(ClientSecret::Object { value, expires_at }), _) => (value, expires_at),
        (Some(ClientSecret::Plain(value)), _) => (value, None),
        (None, Some(value)) => (value, None),
        (None, None) => {
            return Err(VoxError::ExternalService(
                "Session response carries no credential".to_string(),
            ))
        }
    };
    if value.is_empty() {
        return Err(VoxError::ExternalService(
            "Session response carries an empty credential".to_string(),
        ));
    }

    let expires_at = result
        .expires_at
        .or(nested_expiry)
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    Ok(SessionCredential { value, expires_at })
}

/// Credential source and offer relay
#[async_trait]
pub trait Signaling: Send + Sync {
    async fn fetch_credential(&self) -> Result<SessionCredential>;

    /// Send the offer, return the answer
    async fn exchange(&self, credential: &SessionCredential, offer: &str) -> Result<String>;
}

/// HTTP signaling against the web backend and the realtime relay
pub struct HttpSignaling {
    client: reqwest::Client,
    session_url: String,
    relay_url: String,
    api_key: Option<String>,
}

impl HttpSignaling {
    pub fn new(endpoints: &EndpointConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            session_url: endpoints.session_url(),
            relay_url: endpoints.relay_endpoint(),
            api_key: endpoints.api_key.clone(),
        }
    }
}

#[async_trait]
impl Signaling for HttpSignaling {
    async fn fetch_credential(&self) -> Result<SessionCredential> {
        if let Some(key) = &self.api_key {
            debug!("Using configured API key as session credential");
            return Ok(SessionCredential::new(key.clone()));
        }

        let response = self.client.get(&self.session_url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(VoxError::ExternalService(format!(
                "Session request failed ({}): {}",
                status, body
            )));
        }
        let credential = parse_credential(&body)?;
        info!("Obtained session credential");
        Ok(credential)
    }

    async fn exchange(&self, credential: &SessionCredential, offer: &str) -> Result<String> {
        debug!("Relaying offer ({} bytes) to {}", offer.len(), self.relay_url);
        let response = self
            .client
            .post(&self.relay_url)
            .bearer_auth(&credential.value)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer.to_string())
            .send()
            .await?;
        let status = response.status();
        let answer = response.text().await?;
        if !status.is_success() {
            return Err(VoxError::ExternalService(format!(
                "Relay rejected offer ({}): {}",
                status, answer
            )));
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_client_secret() {
        let credential = parse_credential(
            r#"{"result":{"client_secret":{"value":"ek_123"},"expires_at":1700000000}}"#,
        )
        .unwrap();
        assert_eq!(credential.value, "ek_123");
        assert_eq!(credential.expires_at.unwrap().timestamp(), 1_700_000_000);
        assert!(credential.is_expired());
    }

    #[test]
    fn test_parse_nested_expiry_and_plain_credential() {
        let nested = parse_credential(
            r#"{"result":{"client_secret":{"value":"ek_1","expires_at":4102444800}}}"#,
        )
        .unwrap();
        assert!(!nested.is_expired());

        let plain = parse_credential(r#"{"credential":"tok"}"#).unwrap();
        assert_eq!(plain, SessionCredential::new("tok"));
    }

    #[test]
    fn test_parse_missing_credential() {
        assert!(matches!(
            parse_credential(r#"{"result":{}}"#),
            Err(VoxError::ExternalService(_))
        ));
        assert!(matches!(
            parse_credential("not json"),
            Err(VoxError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_static_key_skips_session_route() {
        let endpoints = EndpointConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://127.0.0.1:9".into(),
            ..EndpointConfig::default()
        };
        let credential = HttpSignaling::new(&endpoints).fetch_credential().await.unwrap();
        assert_eq!(credential.value, "sk-test");
    }
}
