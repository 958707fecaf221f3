//! Google Play Services OAuth exchange.
//!
//! Both tiers go through the Android auth endpoint: a form POST presenting the
//! master credential (`Token`) and the requested `service`, answered with
//! newline-separated `Key=Value` pairs. The credential we want is `Auth`; an
//! `Error` key means the presented credential was refused.
//!
//! The endpoint only accepts a master credential in `Token`, so the session
//! tier is an `OAuthLogin` sign-in that proves the master token is accepted,
//! and every scoped access token is again requested with the master token.

use std::collections::HashMap;
use std::time::Duration;

use super::{MasterToken, TokenExchange};
use crate::error::{Result, SyncError};

const DEFAULT_AUTH_URL: &str = "https://android.clients.google.com/auth";
const USER_AGENT: &str = "GoogleAuth/1.4";
const SESSION_SERVICE: &str = "oauth2:https://www.google.com/accounts/OAuthLogin";
const ACCESS_TOKEN_APP_NAME: &str = "com.google.android.apps.chromecast.app";
const ACCESS_TOKEN_CLIENT_SIGNATURE: &str = "24bb24c05e47e0aefa68a58a766179d9b613a600";
const SDK_VERSION: &str = "17";
const PLAY_SERVICES_VERSION: &str = "240913000";

pub struct GpsOAuthExchange {
    agent: ureq::Agent,
    auth_url: String,
}

impl GpsOAuthExchange {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
        }
    }

    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    fn perform_oauth(
        &self,
        username: &str,
        credential: &str,
        android_id: &str,
        service: &str,
    ) -> Result<String> {
        let email = normalize_username(username);
        let form = [
            ("accountType", "HOSTED_OR_GOOGLE"),
            ("Email", email.as_str()),
            ("has_permission", "1"),
            ("Token", credential),
            ("service", service),
            ("source", "android"),
            ("androidId", android_id),
            ("app", ACCESS_TOKEN_APP_NAME),
            ("client_sig", ACCESS_TOKEN_CLIENT_SIGNATURE),
            ("device_country", "us"),
            ("operatorCountry", "us"),
            ("lang", "en"),
            ("sdk_version", SDK_VERSION),
            ("google_play_services_version", PLAY_SERVICES_VERSION),
        ];

        let body = match self
            .agent
            .post(&self.auth_url)
            .set("User-Agent", USER_AGENT)
            .send_form(&form)
        {
            Ok(response) => response
                .into_string()
                .map_err(|e| SyncError::Auth(format!("failed to read auth response: {}", e)))?,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                let fields = parse_auth_response(&body);
                return Err(match fields.get("Error") {
                    Some(reason) => rejection(reason),
                    None => SyncError::Auth(format!("identity provider returned HTTP {}", code)),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(SyncError::Auth(format!(
                    "identity provider unreachable: {}",
                    transport
                )))
            }
        };

        let fields = parse_auth_response(&body);
        log::debug!(
            "auth response for {} carried fields {:?}",
            service,
            fields.keys().collect::<Vec<_>>()
        );
        extract_auth(&fields)
    }
}

impl TokenExchange for GpsOAuthExchange {
    fn session_token(
        &mut self,
        username: &str,
        master: &MasterToken,
        android_id: &str,
    ) -> Result<String> {
        self.perform_oauth(username, master.expose(), android_id, SESSION_SERVICE)
    }

    fn access_token(
        &mut self,
        username: &str,
        master: &MasterToken,
        _session: &str,
        android_id: &str,
        scope: &str,
    ) -> Result<String> {
        self.perform_oauth(username, master.expose(), android_id, scope)
    }
}

/// Bare account names get the consumer domain appended.
pub fn normalize_username(username: &str) -> String {
    let trimmed = username.trim();
    if trimmed.contains('@') {
        trimmed.to_string()
    } else {
        format!("{}@gmail.com", trimmed)
    }
}

pub fn parse_auth_response(body: &str) -> HashMap<String, String> {
    body.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn extract_auth(fields: &HashMap<String, String>) -> Result<String> {
    if let Some(reason) = fields.get("Error") {
        return Err(rejection(reason));
    }
    match fields.get("Auth") {
        Some(auth) if !auth.is_empty() => Ok(auth.clone()),
        _ => Err(SyncError::Auth(
            "token exchange response lacks the Auth field".to_string(),
        )),
    }
}

fn rejection(reason: &str) -> SyncError {
    if reason == "BadAuthentication" {
        SyncError::Auth("master credential rejected (BadAuthentication)".to_string())
    } else {
        SyncError::Auth(format!("token exchange refused: {}", reason))
    }
}
