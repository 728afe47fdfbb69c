use super::FetchError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Tokens are refreshed this long before upstream says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Credentials for the OAuth2 password grant
#[derive(Clone)]
pub(super) struct PasswordGrant {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub(super) struct AccessToken {
    pub value: String,
    refresh_at: Instant,
}

impl AccessToken {
    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

/// Requests a bearer token using the password grant
///
/// Upstream reports bad credentials either with a 401 or with a 200 whose
/// body carries an `error` field; both map to `Authentication`.
pub(super) async fn request_token(
    http: &Client,
    auth_url: &str,
    grant: &PasswordGrant,
) -> Result<AccessToken, FetchError> {
    debug!("Requesting access token from {}", auth_url);

    let response = http
        .post(auth_url)
        .basic_auth(&grant.client_id, Some(&grant.client_secret))
        .form(&[
            ("grant_type", "password"),
            ("username", grant.username.as_str()),
            ("password", grant.password.as_str()),
        ])
        .send()
        .await
        .map_err(|e| FetchError::TransientNetwork(format!("token request failed: {}", e)))?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Authentication(format!(
            "token endpoint returned {}",
            status
        )));
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::TransientNetwork(format!(
            "token endpoint returned {}",
            status
        )));
    }
    if !status.is_success() {
        return Err(FetchError::Authentication(format!(
            "token endpoint returned {}",
            status
        )));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| FetchError::InvalidResponse(format!("token response: {}", e)))?;

    if let Some(error) = body.error {
        return Err(FetchError::Authentication(error));
    }

    let value = body
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| FetchError::InvalidResponse("token response without access_token".into()))?;

    let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
    info!("Obtained access token valid for {}s", lifetime.as_secs());

    Ok(AccessToken {
        value,
        refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn grant() -> PasswordGrant {
        PasswordGrant {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
        }
    }

    #[tokio::test]
    async fn test_request_token_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .and(body_string_contains("grant_type=password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "token_type": "bearer",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let url = format!("{}/api/v1/access_token", server.uri());
        let token = request_token(&Client::new(), &url, &grant()).await.unwrap();

        assert_eq!(token.value, "tok");
        assert!(token.is_fresh());
    }

    #[tokio::test]
    async fn test_request_token_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let result = request_token(&Client::new(), &server.uri(), &grant()).await;
        assert_eq!(
            result.unwrap_err(),
            FetchError::Authentication("invalid_grant".to_string())
        );
    }

    #[tokio::test]
    async fn test_request_token_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = request_token(&Client::new(), &server.uri(), &grant()).await;
        assert!(matches!(result, Err(FetchError::Authentication(_))));
    }

    #[test]
    fn test_short_lifetime_is_stale() {
        let token = AccessToken {
            value: "tok".to_string(),
            refresh_at: Instant::now(),
        };
        assert!(!token.is_fresh());
    }
}
