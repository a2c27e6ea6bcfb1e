//! `AuthApi` over the scoreboard's REST endpoints.
//!
//! Every endpoint answers with the same JSON envelope:
//!
//! ```text
//! { "success": true, "token": "eyJ...", "user": { ... }, "message": "ok" }
//! ```

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use scorelink_protocol::Identity;
use scorelink_session::{AuthApi, AuthGrant, Credential, Renewal, SessionError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct AuthEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<Identity>,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    username: &'a str,
    password: &'a str,
}

/// HTTP client for `/auth/*`.
#[derive(Clone)]
pub struct HttpAuthApi {
    http: Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Creates a client for the API rooted at `base_url`
    /// (e.g. `http://localhost:3000/api`).
    ///
    /// # Errors
    /// [`SessionError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SessionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call(&self, request: RequestBuilder) -> Result<AuthEnvelope, SessionError> {
        let response = request
            .send()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;
        let envelope = serde_json::from_str::<AuthEnvelope>(&body).ok();
        let message = envelope
            .as_ref()
            .map(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.to_string());

        match classify(status, envelope) {
            Classified::Ok(envelope) => Ok(envelope),
            Classified::Unauthorized => Err(SessionError::Unauthorized(message)),
            Classified::Rejected => Err(SessionError::Rejected(message)),
            Classified::Unavailable => {
                tracing::debug!(%status, "auth endpoint failed");
                Err(SessionError::Unavailable(message))
            }
        }
    }

    async fn grant(&self, request: RequestBuilder) -> Result<AuthGrant, SessionError> {
        let envelope = self.call(request).await?;
        let token = envelope
            .token
            .ok_or_else(|| SessionError::Unavailable("response carried no token".into()))?;
        let identity = envelope
            .user
            .ok_or_else(|| SessionError::Unavailable("response carried no user".into()))?;
        Ok(AuthGrant {
            credential: Credential::new(token),
            identity,
        })
    }
}

enum Classified {
    Ok(AuthEnvelope),
    Unauthorized,
    Rejected,
    Unavailable,
}

/// Maps status + envelope onto the outcomes the client distinguishes.
fn classify(status: StatusCode, envelope: Option<AuthEnvelope>) -> Classified {
    if status == StatusCode::UNAUTHORIZED {
        return Classified::Unauthorized;
    }
    if status.is_client_error() {
        return Classified::Rejected;
    }
    if !status.is_success() {
        return Classified::Unavailable;
    }
    match envelope {
        Some(envelope) if envelope.success => Classified::Ok(envelope),
        Some(_) => Classified::Rejected,
        None => Classified::Unavailable,
    }
}

impl AuthApi for HttpAuthApi {
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, SessionError> {
        let request = self
            .http
            .post(self.url("/auth/login"))
            .json(&LoginRequest { email, password });
        self.grant(request).await
    }

    async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthGrant, SessionError> {
        let request = self.http.post(self.url("/auth/register")).json(&RegisterRequest {
            email,
            username,
            password,
        });
        self.grant(request).await
    }

    async fn renew(&self, credential: &Credential) -> Result<Renewal, SessionError> {
        let request = self
            .http
            .post(self.url("/auth/refresh"))
            .bearer_auth(credential.token());
        let envelope = self.call(request).await?;
        let token = envelope
            .token
            .ok_or_else(|| SessionError::Unavailable("refresh carried no token".into()))?;
        Ok(Renewal {
            credential: Credential::new(token),
            identity: envelope.user,
        })
    }

    async fn fetch_profile(&self, credential: &Credential) -> Result<Identity, SessionError> {
        let request = self
            .http
            .get(self.url("/auth/profile"))
            .bearer_auth(credential.token());
        self.call(request)
            .await?
            .user
            .ok_or_else(|| SessionError::Unavailable("profile carried no user".into()))
    }

    async fn revoke(&self, credential: &Credential) -> Result<(), SessionError> {
        let request = self
            .http
            .post(self.url("/auth/logout"))
            .bearer_auth(credential.token());
        self.call(request).await.map(|_| ())
    }
}

impl std::fmt::Debug for HttpAuthApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
