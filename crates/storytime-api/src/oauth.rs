//! Google and Facebook login exchanges.
//!
//! Both flows start in the browser: the provider's JS SDK hands the page a
//! one-time code (Google) or a short-lived access token (Facebook), which the
//! page posts to us. We trade it for credentials server-side and fetch the
//! user's profile.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use storytime_types::models::AuthProvider;

use crate::error::AppError;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_TOKENINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/tokeninfo";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/userinfo";
const GOOGLE_REVOKE_URL: &str = "https://accounts.google.com/o/oauth2/revoke";
const FACEBOOK_GRAPH_URL: &str = "https://graph.facebook.com";
const FACEBOOK_API_VERSION: &str = "v2.8";

/// What a provider tells us about the user who just logged in.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub provider: AuthProvider,
    pub provider_user_id: String,
    pub name: String,
    pub email: String,
    pub picture: Option<String>,
    /// Raw token response, kept so logout can revoke it.
    pub credentials_json: Option<String>,
}

pub struct OAuthClients {
    pub google: GoogleOAuth,
    pub facebook: FacebookOAuth,
}

impl OAuthClients {
    pub fn new(
        google_client_id: String,
        google_client_secret: String,
        facebook_app_id: String,
        facebook_app_secret: String,
    ) -> Self {
        let http = reqwest::Client::new();
        Self {
            google: GoogleOAuth {
                client_id: google_client_id,
                client_secret: google_client_secret,
                http: http.clone(),
            },
            facebook: FacebookOAuth {
                app_id: facebook_app_id,
                app_secret: facebook_app_secret,
                http,
            },
        }
    }
}

fn upstream(context: &str, err: impl std::fmt::Display) -> AppError {
    AppError::Upstream(format!("{}: {}", context, err))
}

// ── Google ──────────────────────────────────────────────────────────────

pub struct GoogleOAuth {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleTokenInfo {
    pub user_id: Option<String>,
    pub issued_to: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    name: Option<String>,
    email: String,
    picture: Option<String>,
}

impl GoogleOAuth {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Upgrade a one-time authorization code into credentials and a profile.
    pub async fn authenticate(&self, code: &str) -> Result<ProviderIdentity, AppError> {
        if !self.is_configured() {
            return Err(AppError::Upstream("Google login is not configured".into()));
        }

        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", "postmessage"),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| upstream("Failed to upgrade the authorization code", e))?;
        if !response.status().is_success() {
            return Err(upstream(
                "Failed to upgrade the authorization code",
                response.status(),
            ));
        }
        let credentials: Value = response
            .json()
            .await
            .map_err(|e| upstream("Malformed token response", e))?;
        let token: GoogleTokenResponse = serde_json::from_value(credentials.clone())
            .map_err(|e| upstream("Malformed token response", e))?;

        let id_token = token
            .id_token
            .as_deref()
            .ok_or_else(|| AppError::Upstream("Token response has no id_token".into()))?;
        let google_id = id_token_subject(id_token)?;

        let info: GoogleTokenInfo = self
            .http
            .get(GOOGLE_TOKENINFO_URL)
            .query(&[("access_token", token.access_token.as_str())])
            .send()
            .await
            .map_err(|e| upstream("Token info request failed", e))?
            .json()
            .await
            .map_err(|e| upstream("Malformed token info", e))?;
        check_token_info(&info, &google_id, &self.client_id)?;

        let profile: GoogleUserInfo = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .query(&[("access_token", token.access_token.as_str()), ("alt", "json")])
            .send()
            .await
            .map_err(|e| upstream("User info request failed", e))?
            .json()
            .await
            .map_err(|e| upstream("Malformed user info", e))?;

        info!("Google login verified for {}", profile.email);
        Ok(ProviderIdentity {
            provider: AuthProvider::Google,
            provider_user_id: google_id,
            name: profile.name.unwrap_or_else(|| profile.email.clone()),
            email: profile.email,
            picture: profile.picture,
            credentials_json: Some(credentials.to_string()),
        })
    }

    /// Revoke the access token stored at login. Failures are logged only;
    /// logout proceeds regardless.
    pub async fn revoke(&self, credentials_json: &str) {
        let access_token = serde_json::from_str::<GoogleTokenResponse>(credentials_json)
            .map(|t| t.access_token);
        let Ok(access_token) = access_token else {
            warn!("Stored Google credentials are unreadable; skipping revoke");
            return;
        };

        match self
            .http
            .get(GOOGLE_REVOKE_URL)
            .query(&[("token", access_token.as_str())])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => info!("Google token revoked"),
            Ok(response) => warn!("Google token revoke returned {}", response.status()),
            Err(e) => warn!("Google token revoke failed: {}", e),
        }
    }
}

/// `sub` claim of a Google id token. The token came straight from Google's
/// token endpoint over TLS, so only the payload is read here.
pub fn id_token_subject(id_token: &str) -> Result<String, AppError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| AppError::Upstream("Malformed id_token".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| upstream("Malformed id_token", e))?;
    let claims: Value =
        serde_json::from_slice(&bytes).map_err(|e| upstream("Malformed id_token", e))?;
    claims
        .get("sub")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::Upstream("id_token has no subject".into()))
}

/// The access token must belong to the id token's subject and have been
/// issued to this app.
pub fn check_token_info(
    info: &GoogleTokenInfo,
    google_id: &str,
    client_id: &str,
) -> Result<(), AppError> {
    if let Some(error) = &info.error {
        return Err(AppError::Upstream(format!("Token info error: {}", error)));
    }
    if info.user_id.as_deref() != Some(google_id) {
        return Err(AppError::Upstream(
            "Token's user ID doesn't match given user ID.".into(),
        ));
    }
    if info.issued_to.as_deref() != Some(client_id) {
        return Err(AppError::Upstream(
            "Token's client ID does not match app's.".into(),
        ));
    }
    Ok(())
}

// ── Facebook ────────────────────────────────────────────────────────────

pub struct FacebookOAuth {
    app_id: String,
    app_secret: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FacebookToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct FacebookProfile {
    id: String,
    name: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: String,
}

impl FacebookOAuth {
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.is_empty()
    }

    /// Exchange a short-lived browser token for a long-lived one and load
    /// the profile behind it.
    pub async fn authenticate(&self, short_lived_token: &str) -> Result<ProviderIdentity, AppError> {
        if !self.is_configured() {
            return Err(AppError::Upstream("Facebook login is not configured".into()));
        }

        let token: FacebookToken = self
            .http
            .get(format!("{}/oauth/access_token", FACEBOOK_GRAPH_URL))
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("fb_exchange_token", short_lived_token),
            ])
            .send()
            .await
            .map_err(|e| upstream("Token exchange failed", e))?
            .error_for_status()
            .map_err(|e| upstream("Token exchange rejected", e))?
            .json()
            .await
            .map_err(|e| upstream("Malformed token response", e))?;

        let profile: FacebookProfile = self
            .http
            .get(format!("{}/{}/me", FACEBOOK_GRAPH_URL, FACEBOOK_API_VERSION))
            .query(&[
                ("access_token", token.access_token.as_str()),
                ("fields", "name,id,email"),
            ])
            .send()
            .await
            .map_err(|e| upstream("Profile request failed", e))?
            .error_for_status()
            .map_err(|e| upstream("Profile request rejected", e))?
            .json()
            .await
            .map_err(|e| upstream("Malformed profile", e))?;

        let email = profile
            .email
            .ok_or_else(|| AppError::Upstream("Facebook account has no email address".into()))?;

        // The picture is cosmetic; a failure here doesn't fail the login.
        let picture = match self.picture(&token.access_token).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Facebook picture lookup failed: {}", e);
                None
            }
        };

        info!("Facebook login verified for {}", email);
        Ok(ProviderIdentity {
            provider: AuthProvider::Facebook,
            provider_user_id: profile.id,
            name: profile.name,
            email,
            picture,
            credentials_json: None,
        })
    }

    async fn picture(&self, access_token: &str) -> reqwest::Result<String> {
        let picture: FacebookPicture = self
            .http
            .get(format!("{}/{}/me/picture", FACEBOOK_GRAPH_URL, FACEBOOK_API_VERSION))
            .query(&[
                ("access_token", access_token),
                ("redirect", "0"),
                ("height", "200"),
                ("width", "200"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(picture.data.url)
    }

    /// Remove the app's permissions for a user, signing the request with the
    /// app access token. Failures are logged only.
    pub async fn revoke(&self, facebook_id: &str) {
        if !self.is_configured() {
            return;
        }
        let app_token = format!("{}|{}", self.app_id, self.app_secret);
        match self
            .http
            .delete(format!("{}/{}/permissions", FACEBOOK_GRAPH_URL, facebook_id))
            .query(&[("access_token", app_token.as_str())])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!("Facebook permissions removed for {}", facebook_id)
            }
            Ok(response) => warn!("Facebook permission removal returned {}", response.status()),
            Err(e) => warn!("Facebook permission removal failed: {}", e),
        }
    }
}
