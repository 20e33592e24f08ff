use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest {
    identity: String,
    room_name: String,
}

/// Credentials for one media room connection
#[derive(Debug, Clone, Deserialize)]
pub struct CallToken {
    pub token: String,
    pub url: String,
}

/// External token-issuing collaborator, invoked before each room connect
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, identity: &str, room_name: &str) -> Result<CallToken>;
}

/// Production issuer: `POST {endpoint} {identity, roomName} -> {token, url}`
pub struct HttpTokenIssuer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTokenIssuer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self, identity: &str, room_name: &str) -> Result<CallToken> {
        info!("Requesting media token for room {}", room_name);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&TokenRequest {
                identity: identity.to_string(),
                room_name: room_name.to_string(),
            })
            .send()
            .await
            .context("Token request failed")?
            .error_for_status()
            .context("Token issuer rejected the request")?;

        response
            .json::<CallToken>()
            .await
            .context("Malformed token response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_request_uses_camel_case_wire_names() {
        let req = TokenRequest {
            identity: "cust-1".into(),
            room_name: "r1".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"roomName\":\"r1\""));
        assert!(json.contains("\"identity\":\"cust-1\""));
    }

    #[test]
    fn token_response_parses() {
        let token: CallToken =
            serde_json::from_str(r#"{"token":"jwt","url":"wss://media.example"}"#).unwrap();
        assert_eq!(token.token, "jwt");
        assert_eq!(token.url, "wss://media.example");
    }
}
