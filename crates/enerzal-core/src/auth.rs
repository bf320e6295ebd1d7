//! Login, signup, and profile against the backend auth endpoints
//!
//! Login is password plus a TOTP code. Signup answers with a base64 PNG QR
//! code that the user scans into an authenticator app.

use std::sync::OnceLock;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::token::TokenStore;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// TOTP code from the authenticator app
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub qrcode: Option<String>,
}

/// Status flag plus parsed body; auth endpoints explain failures in the body
#[derive(Debug, Clone)]
pub struct ApiReply<T> {
    pub ok: bool,
    pub body: T,
}

#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub message: String,
    /// Decoded PNG bytes of the TOTP enrollment QR code
    pub qrcode_png: Option<Vec<u8>>,
}

#[async_trait]
pub trait AuthTransport: Send + Sync {
    async fn post_login(&self, request: &LoginRequest) -> Result<ApiReply<LoginResponse>>;

    async fn post_signup(&self, request: &SignupRequest) -> Result<ApiReply<SignupResponse>>;

    async fn get_profile(&self, token: &str) -> Result<serde_json::Value>;
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"))
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ChatError::Validation("Please provide both email and password.".to_string()));
    }
    if !email_pattern().is_match(email.trim()) {
        return Err(ChatError::Validation(format!("Not a valid email address: {}", email.trim())));
    }
    Ok(())
}

pub struct AuthClient<T> {
    transport: T,
    tokens: TokenStore,
}

impl<T: AuthTransport> AuthClient<T> {
    pub fn new(transport: T, tokens: TokenStore) -> Self {
        Self { transport, tokens }
    }

    /// Authenticate and persist the returned token
    pub async fn login(&self, email: &str, password: &str, totp: &str) -> Result<String> {
        validate_credentials(email, password)?;

        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            token: totp.trim().to_string(),
        };
        let reply = self.transport.post_login(&request).await?;

        match (reply.ok, reply.body.token) {
            (true, Some(token)) if !token.is_empty() => {
                self.tokens.save(&token)?;
                tracing::info!(email = %request.email, "logged in");
                Ok(token)
            }
            _ => Err(ChatError::Server(
                reply.body.msg.unwrap_or_else(|| "Login failed.".to_string()),
            )),
        }
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<SignupOutcome> {
        validate_credentials(email, password)?;

        let request = SignupRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let reply = self.transport.post_signup(&request).await?;

        if !reply.ok {
            return Err(ChatError::Server(
                reply.body.msg.unwrap_or_else(|| "Signup failed.".to_string()),
            ));
        }

        let qrcode_png = match reply.body.qrcode {
            Some(encoded) => Some(
                STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| ChatError::Decode(format!("invalid QR code payload: {}", e)))?,
            ),
            None => None,
        };

        Ok(SignupOutcome {
            message: reply.body.msg.unwrap_or_else(|| "Signup successful.".to_string()),
            qrcode_png,
        })
    }

    pub async fn profile(&self) -> Result<serde_json::Value> {
        let token = self
            .tokens
            .load()
            .ok_or_else(|| ChatError::Validation("Not logged in. Run `enerzal login` first.".to_string()))?;
        self.transport.get_profile(&token).await
    }

    pub fn logout(&self) -> Result<()> {
        self.tokens.clear()?;
        Ok(())
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }
}
