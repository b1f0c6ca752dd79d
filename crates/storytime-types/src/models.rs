use serde::{Deserialize, Serialize};

/// Third-party identity providers a user can log in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Google,
    Facebook,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Google => "google",
            AuthProvider::Facebook => "facebook",
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named slots of the server-side login session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginSessionKey {
    State,
    UserId,
    Username,
    Email,
    Picture,
    Provider,
    GoogleCredentialsJson,
    GoogleId,
    FacebookId,
}

impl LoginSessionKey {
    /// Slots that identify the logged-in user. `State` is not one of them:
    /// it carries the anti-forgery token and outlives logout.
    pub const IDENTITY: [LoginSessionKey; 8] = [
        LoginSessionKey::UserId,
        LoginSessionKey::Username,
        LoginSessionKey::Email,
        LoginSessionKey::Picture,
        LoginSessionKey::Provider,
        LoginSessionKey::GoogleCredentialsJson,
        LoginSessionKey::GoogleId,
        LoginSessionKey::FacebookId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoginSessionKey::State => "state",
            LoginSessionKey::UserId => "user_id",
            LoginSessionKey::Username => "username",
            LoginSessionKey::Email => "email",
            LoginSessionKey::Picture => "picture",
            LoginSessionKey::Provider => "provider",
            LoginSessionKey::GoogleCredentialsJson => "google_credentials_json",
            LoginSessionKey::GoogleId => "google_id",
            LoginSessionKey::FacebookId => "facebook_id",
        }
    }
}
