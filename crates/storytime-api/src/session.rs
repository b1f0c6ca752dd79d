//! Per-request login session.
//!
//! The session middleware loads a [`Session`] from the signed
//! `storytime_session` cookie and hands it to handlers through request
//! extensions. Handlers read and write named slots; the middleware persists
//! the slots to the `session` table afterwards if anything changed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use axum::{extract::FromRequestParts, http::request::Parts};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use storytime_types::models::{AuthProvider, LoginSessionKey};

use crate::error::AppError;

pub const SESSION_COOKIE: &str = "storytime_session";

type HmacSha256 = Hmac<Sha256>;

/// Signs session ids so a client can't pick someone else's session.
pub struct SessionSigner {
    key: Vec<u8>,
}

impl SessionSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.key).unwrap_or_else(|_| unreachable!())
    }

    /// Cookie value for a session id: `<id>.<hex hmac>`.
    pub fn sign(&self, id: &str) -> String {
        let mut mac = self.mac();
        mac.update(id.as_bytes());
        format!("{}.{}", id, hex::encode(mac.finalize().into_bytes()))
    }

    /// Returns the session id if the cookie value carries a valid signature.
    pub fn verify(&self, cookie_value: &str) -> Option<String> {
        let (id, signature) = cookie_value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;
        let mut mac = self.mac();
        mac.update(id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(id.to_string())
    }
}

/// 32 random bytes, URL-safe base64.
pub fn random_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

/// Identity written into the session after a successful provider login.
#[derive(Debug, Clone)]
pub struct UserLogin {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub picture: Option<String>,
    pub provider: AuthProvider,
    pub google_credentials_json: Option<String>,
    pub google_id: Option<String>,
    pub facebook_id: Option<String>,
}

/// The logged-in user as seen by handlers and views.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub picture: Option<String>,
    pub provider: Option<AuthProvider>,
}

struct SessionState {
    id: String,
    /// Stored id this session was moved away from by `regenerate`.
    replaced_id: Option<String>,
    slots: BTreeMap<String, Value>,
    dirty: bool,
}

#[derive(Clone)]
pub struct Session {
    is_new: bool,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    /// A brand-new anonymous session with a random id.
    pub fn fresh() -> Self {
        Self::build(random_token(), true, BTreeMap::new())
    }

    /// Rebuild a stored session from its JSON payload. A corrupt payload
    /// yields an empty session under the same id.
    pub fn restore(id: String, payload: &str) -> Self {
        let slots = serde_json::from_str(payload).unwrap_or_default();
        Self::build(id, false, slots)
    }

    fn build(id: String, is_new: bool, slots: BTreeMap<String, Value>) -> Self {
        Self {
            is_new,
            state: Arc::new(Mutex::new(SessionState {
                id,
                replaced_id: None,
                slots,
                dirty: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Move the slots to a fresh random id. The old stored id, if any, is
    /// reported by [`Session::replaced_id`] so it can be dropped.
    pub fn regenerate(&self) {
        let mut state = self.lock();
        let old = std::mem::replace(&mut state.id, random_token());
        if !self.is_new && state.replaced_id.is_none() {
            state.replaced_id = Some(old);
        }
        state.dirty = true;
    }

    pub fn replaced_id(&self) -> Option<String> {
        self.lock().replaced_id.clone()
    }

    /// Whether the client must be sent a cookie for the current id.
    pub fn needs_cookie(&self) -> bool {
        self.is_new || self.lock().replaced_id.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// JSON payload for the session store.
    pub fn to_payload(&self) -> String {
        serde_json::to_string(&self.lock().slots).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn get<T: DeserializeOwned>(&self, key: LoginSessionKey) -> Option<T> {
        let state = self.lock();
        let value = state.slots.get(key.as_str())?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn set<T: Serialize>(&self, key: LoginSessionKey, value: T) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        let mut state = self.lock();
        if value.is_null() {
            if state.slots.remove(key.as_str()).is_some() {
                state.dirty = true;
            }
        } else {
            state.slots.insert(key.as_str().to_string(), value);
            state.dirty = true;
        }
    }

    pub fn remove(&self, key: LoginSessionKey) {
        let mut state = self.lock();
        if state.slots.remove(key.as_str()).is_some() {
            state.dirty = true;
        }
    }

    /// Write the identity slots for a freshly authenticated user under a new
    /// session id.
    ///
    /// Google logins must carry their credentials and Google id; Facebook
    /// logins must carry the Facebook id.
    pub fn store_user_session(&self, login: UserLogin) -> Result<(), AppError> {
        match login.provider {
            AuthProvider::Google => {
                if login.google_credentials_json.is_none() || login.google_id.is_none() {
                    return Err(AppError::Validation(
                        "google_credentials_json and google_id must be provided with Google auth provider"
                            .to_string(),
                    ));
                }
            }
            AuthProvider::Facebook => {
                if login.facebook_id.is_none() {
                    return Err(AppError::Validation(
                        "facebook_id must be provided with Facebook auth provider".to_string(),
                    ));
                }
            }
        }

        self.regenerate();
        self.set(LoginSessionKey::UserId, login.user_id);
        self.set(LoginSessionKey::Username, login.username);
        self.set(LoginSessionKey::Email, login.email);
        self.set(LoginSessionKey::Picture, login.picture);
        self.set(LoginSessionKey::Provider, login.provider);
        self.set(LoginSessionKey::GoogleCredentialsJson, login.google_credentials_json);
        self.set(LoginSessionKey::GoogleId, login.google_id);
        self.set(LoginSessionKey::FacebookId, login.facebook_id);
        Ok(())
    }

    /// Clear every identity slot. Safe to call on an anonymous session.
    pub fn reset_user_session(&self) {
        for key in LoginSessionKey::IDENTITY {
            self.remove(key);
        }
    }

    pub fn is_user_authenticated(&self) -> bool {
        self.lock().slots.contains_key(LoginSessionKey::UserId.as_str())
    }

    pub fn user_id(&self) -> Option<i64> {
        self.get(LoginSessionKey::UserId)
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        Some(SessionUser {
            user_id: self.user_id()?,
            username: self.get(LoginSessionKey::Username).unwrap_or_default(),
            email: self.get(LoginSessionKey::Email).unwrap_or_default(),
            picture: self.get(LoginSessionKey::Picture),
            provider: self.get(LoginSessionKey::Provider),
        })
    }

    /// Fails unless a user is logged in and, when `owner_id` is given, that
    /// user is the owner.
    pub fn do_authorization(&self, owner_id: Option<i64>) -> Result<i64, AppError> {
        let user_id = self
            .user_id()
            .ok_or(AppError::Unauthorized("You must be logged in to do that."))?;
        match owner_id {
            Some(owner_id) if owner_id != user_id => {
                Err(AppError::Unauthorized("You are not allowed to change this story."))
            }
            _ => Ok(user_id),
        }
    }

    /// Anti-forgery token for this session, minted on first use.
    pub fn csrf_token(&self) -> String {
        if let Some(token) = self.get::<String>(LoginSessionKey::State) {
            return token;
        }
        let token = random_token();
        self.set(LoginSessionKey::State, &token);
        token
    }

    pub fn verify_csrf_token(&self, candidate: Option<&str>) -> bool {
        match (self.get::<String>(LoginSessionKey::State), candidate) {
            (Some(expected), Some(candidate)) => {
                !expected.is_empty() && expected.as_bytes().ct_eq(candidate.as_bytes()).into()
            }
            _ => false,
        }
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Unexpected(anyhow!("session layer is not installed")))
    }
}
