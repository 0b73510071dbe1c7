//! Identity provider client.
//!
//! The store itself is identity-agnostic: it receives a [`UserId`] and
//! stays inert without one. This module supplies that identity by
//! authenticating against the backend's login endpoint. Token storage and
//! session persistence are the embedding application's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::http::{HttpChatBackend, opaque_id};
use crate::backend::{BackendError, BackendResult};
use crate::conversations::types::UserId;

/// Role of an authenticated user.
///
/// Deserialized from the backend response; absent means [`Self::User`].
/// The role is never assumed client-side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// May manage users and branding.
    Admin,
    /// Regular chat user.
    #[default]
    User,
}

/// Profile of the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Backend identity; owns the conversations the store manages.
    pub id: UserId,
    /// Login email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Role reported by the backend.
    pub role: UserRole,
    /// Previous login time, when the backend reports one.
    pub last_login: Option<DateTime<Utc>>,
}

/// Authenticate against the backend and return the user profile.
///
/// # Errors
/// Returns [`BackendError::LoginFailed`] when the backend rejects the
/// credentials (non-success status or `success: false`), or the transport
/// failure.
pub async fn login(
    backend: &HttpChatBackend,
    email: &str,
    password: &str,
) -> BackendResult<UserProfile> {
    let url = backend.api_url(&["auth", "login"]);
    let body = LoginRequest { email, password };
    let response = backend.http().post(url).json(&body).send().await?;

    if !response.status().is_success() {
        return Err(BackendError::LoginFailed(email.to_owned()));
    }
    let payload: LoginResponse = response.json().await?;
    if !payload.success {
        return Err(BackendError::LoginFailed(email.to_owned()));
    }
    let Some(user) = payload.user else {
        return Err(BackendError::LoginFailed(email.to_owned()));
    };

    info!("Logged in as {} ({})", user.name, user.id);
    Ok(UserProfile {
        id: UserId::new(user.id),
        email: user.email,
        name: user.name,
        role: user.role,
        last_login: user.last_login,
    })
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    success: bool,
    #[serde(default)]
    user: Option<LoginUser>,
}

#[derive(Debug, Deserialize)]
struct LoginUser {
    #[serde(deserialize_with = "opaque_id")]
    id: String,
    email: String,
    name: String,
    #[serde(default)]
    role: UserRole,
    #[serde(rename = "lastLogin", default)]
    last_login: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_defaults_to_user_when_absent() {
        let json = r#"{
            "success": true,
            "user": {"id": 3, "email": "a@b.de", "name": "Anna", "lastLogin": "2024-05-14T08:00:00Z"}
        }"#;
        let payload: LoginResponse = serde_json::from_str(json).unwrap();
        let user = payload.user.unwrap();
        assert_eq!(user.role, UserRole::User);
        assert_eq!(user.id, "3");
        assert!(user.last_login.is_some());
    }

    #[test]
    fn test_role_is_taken_from_response() {
        let json = r#"{
            "success": true,
            "user": {"id": "3", "email": "a@b.de", "name": "Anna", "role": "admin"}
        }"#;
        let payload: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(payload.user.unwrap().role, UserRole::Admin);
    }

    #[test]
    fn test_missing_user_is_tolerated() {
        let json = r#"{"success": false}"#;
        let payload: LoginResponse = serde_json::from_str(json).unwrap();
        assert!(!payload.success);
        assert!(payload.user.is_none());
    }
}
