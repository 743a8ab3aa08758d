// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use coinscope_app::{SessionUser, SignUpOutcome};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use time::OffsetDateTime;
use url::Url;

/// Message the auth server returns for a wrong password or unknown email.
pub const INVALID_CREDENTIALS: &str = "Invalid login credentials";

/// Tokens issued by a password sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<OffsetDateTime>,
    pub user: SessionUser,
}

/// Email/password client for a hosted auth service speaking the GoTrue REST
/// dialect (`/auth/v1/...`).
#[derive(Debug, Clone)]
pub struct AuthClient {
    base_url: String,
    anon_key: String,
    http: HttpClient,
}

impl AuthClient {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        Url::parse(&base_url)
            .with_context(|| format!("auth.url {base_url:?} is not a valid URL"))?;
        if anon_key.trim().is_empty() {
            bail!("auth.anon_key must not be empty");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            anon_key: anon_key.trim().to_owned(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = validate_credentials(email, password)?;
        let response = self
            .request(reqwest::Method::POST, "/auth/v1/token?grant_type=password", None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .map_err(|error| self.connection_error(&error))?;

        let token: TokenResponse = parse_response(response)?;
        tracing::info!(email, "signed in");
        Ok(token.into_session())
    }

    /// Creates an account. Returns a session only when the server confirms
    /// the account immediately.
    pub fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let email = validate_credentials(email, password)?;
        let response = self
            .request(reqwest::Method::POST, "/auth/v1/signup", None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .map_err(|error| self.connection_error(&error))?;

        match parse_response::<SignUpResponse>(response)? {
            SignUpResponse::Session(token) => Ok(Some(token.into_session())),
            SignUpResponse::User(_) => Ok(None),
        }
    }

    /// Sign-up that first tries a sign-in so an existing account is
    /// reported instead of silently re-sent a confirmation mail.
    pub fn register(&self, email: &str, password: &str) -> Result<SignUpOutcome> {
        match self.sign_in(email, password) {
            Ok(_) => return Ok(SignUpOutcome::AlreadyRegistered),
            Err(error) if error.to_string().contains(INVALID_CREDENTIALS) => {
                return Ok(SignUpOutcome::AlreadyRegistered);
            }
            Err(error) => {
                tracing::debug!(error = %error, "trial sign-in failed, creating account");
            }
        }

        self.sign_up(email, password)?;
        Ok(SignUpOutcome::Created)
    }

    pub fn sign_out(&self, session: &Session) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::POST,
                "/auth/v1/logout",
                Some(&session.access_token),
            )
            .send()
            .map_err(|error| self.connection_error(&error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        tracing::info!(email = %session.user.email, "signed out");
        Ok(())
    }

    pub fn current_user(&self, session: &Session) -> Result<SessionUser> {
        let response = self
            .request(
                reqwest::Method::GET,
                "/auth/v1/user",
                Some(&session.access_token),
            )
            .send()
            .map_err(|error| self.connection_error(&error))?;

        let user: UserRow = parse_response(response)?;
        Ok(user.into_session_user())
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        bearer: Option<&str>,
    ) -> RequestBuilder {
        let bearer = bearer.unwrap_or(&self.anon_key);
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    fn connection_error(&self, error: &reqwest::Error) -> anyhow::Error {
        anyhow!(
            "cannot reach auth server at {} ({error}) -- check auth.url",
            self.base_url
        )
    }
}

fn validate_credentials<'a>(email: &'a str, password: &str) -> Result<&'a str> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        bail!("email and password are required");
    }
    if !email.contains('@') {
        bail!("{email:?} is not an email address");
    }
    Ok(email)
}

fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(clean_error_response(status, &body));
    }
    response.json().context("decode auth response")
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<AuthErrorBody>(body)
        && let Some(message) = parsed.message()
    {
        return anyhow!("{message}");
    }
    anyhow!("auth server returned {}", status.as_u16())
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl AuthErrorBody {
    fn message(self) -> Option<String> {
        self.msg
            .or(self.error_description)
            .or(self.message)
            .or(self.error)
            .filter(|message| !message.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: UserRow,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => OffsetDateTime::from_unix_timestamp(at).ok(),
            (None, Some(seconds)) => {
                Some(OffsetDateTime::now_utc() + time::Duration::seconds(seconds))
            }
            (None, None) => None,
        };
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into_session_user(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl UserRow {
    fn into_session_user(self) -> SessionUser {
        SessionUser {
            id: self.id,
            email: self.email.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(UserRow),
}

#[cfg(test)]
mod tests {
    use super::{INVALID_CREDENTIALS, clean_error_response, validate_credentials};
    use reqwest::StatusCode;

    #[test]
    fn credentials_are_trimmed_and_checked() {
        assert_eq!(
            validate_credentials("  ada@example.com ", "pw").ok(),
            Some("ada@example.com")
        );
        assert!(validate_credentials("", "pw").is_err());
        assert!(validate_credentials("ada@example.com", "").is_err());
        assert!(validate_credentials("ada", "pw").is_err());
    }

    #[test]
    fn error_body_variants_are_unwrapped() {
        let gotrue = clean_error_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(gotrue.to_string(), INVALID_CREDENTIALS);

        let msg = clean_error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code":422,"msg":"Password should be at least 6 characters"}"#,
        );
        assert_eq!(
            msg.to_string(),
            "Password should be at least 6 characters"
        );

        let opaque = clean_error_response(StatusCode::SERVICE_UNAVAILABLE, "<html/>");
        assert_eq!(opaque.to_string(), "auth server returned 503");
    }
}
