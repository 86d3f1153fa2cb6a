use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tryon_contracts::session::UserProfile;

use crate::http::{error_chain_text, truncate_text};

pub const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Rejected client-side; nothing was sent.
    #[error("{0}")]
    Invalid(String),
    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("{0}")]
    Malformed(String),
    #[error("Could not reach the sign-in service: {0}")]
    Transport(String),
}

/// A successful auth exchange. `token` is absent when the server accepted
/// the request but wants the user to sign in separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthAction {
    Signup,
    Login,
}

impl AuthAction {
    fn path(self) -> &'static str {
        match self {
            AuthAction::Signup => "/api/auth/signup",
            AuthAction::Login => "/api/auth/login",
        }
    }

    fn label(self) -> &'static str {
        match self {
            AuthAction::Signup => "Signup",
            AuthAction::Login => "Login",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AuthResponseBody {
    token: Option<String>,
    user: Option<AuthUserBody>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthUserBody {
    name: Option<String>,
    email: Option<String>,
}

pub struct AuthClient {
    base_url: String,
    http: HttpClient,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            http: HttpClient::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn signup(&self, name: &str, email: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Invalid("Please enter your name.".to_string()));
        }
        let email = validate_credentials(email, password)?;
        let mut body = Map::new();
        body.insert("name".to_string(), json!(name));
        body.insert("email".to_string(), json!(email));
        body.insert("password".to_string(), json!(password));
        self.submit(AuthAction::Signup, email, Value::Object(body))
    }

    pub fn login(&self, email: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let email = validate_credentials(email, password)?;
        let body = json!({ "email": email, "password": password });
        self.submit(AuthAction::Login, email, body)
    }

    fn submit(&self, action: AuthAction, email: &str, body: Value) -> Result<AuthOutcome, AuthError> {
        let url = format!("{}{}", self.base_url, action.path());
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .map_err(|err| AuthError::Transport(error_chain_text(&anyhow::Error::new(err), 512)))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|err| AuthError::Transport(error_chain_text(&anyhow::Error::new(err), 512)))?;
        parse_auth_response(action, status, &text, email)
    }
}

fn validate_credentials<'a>(email: &'a str, password: &str) -> Result<&'a str, AuthError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::Invalid(
            "Please enter a valid email address.".to_string(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::Invalid(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters."
        )));
    }
    Ok(email)
}

fn parse_auth_response(
    action: AuthAction,
    status: u16,
    body: &str,
    email: &str,
) -> Result<AuthOutcome, AuthError> {
    let parsed = serde_json::from_str::<AuthResponseBody>(body);
    let success = (200..300).contains(&status);
    if !success {
        let message = parsed
            .ok()
            .and_then(|payload| payload.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| format!("{} failed (status {status})", action.label()));
        return Err(AuthError::Rejected { status, message });
    }
    let payload = parsed.map_err(|_| {
        AuthError::Malformed(format!(
            "{} returned an unexpected response: {}",
            action.label(),
            truncate_text(body.trim(), 200)
        ))
    })?;
    let user = payload.user.map(|user| UserProfile {
        name: user.name.filter(|name| !name.trim().is_empty()),
        email: user
            .email
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| email.to_string()),
    });
    Ok(AuthOutcome {
        token: payload.token.filter(|token| !token.trim().is_empty()),
        user,
        message: payload.message,
    })
}
