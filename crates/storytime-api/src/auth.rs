use axum::{
    extract::State,
    response::{Html, Redirect},
};
use tracing::info;

use storytime_types::models::{AuthProvider, LoginSessionKey};

use crate::error::AppError;
use crate::oauth::ProviderIdentity;
use crate::session::{Session, UserLogin};
use crate::state::{AppState, run_blocking};
use crate::views;

/// GET /login: provider buttons plus a fresh anti-forgery token.
pub async fn login_page(State(state): State<AppState>, session: Session) -> Html<String> {
    let token = session.csrf_token();
    Html(views::login_page(
        session.current_user().as_ref(),
        &token,
        state.oauth.google.client_id(),
        state.oauth.facebook.app_id(),
    ))
}

/// POST /login-google: body is the one-time authorization code.
pub async fn login_google(
    State(state): State<AppState>,
    session: Session,
    body: String,
) -> Result<Html<String>, AppError> {
    let code = body.trim();
    if code.is_empty() {
        return Err(AppError::Validation("Missing authorization code.".into()));
    }

    let identity = state.oauth.google.authenticate(code).await?;
    complete_login(&state, &session, identity).await
}

/// POST /login-facebook: body is the short-lived access token.
pub async fn login_facebook(
    State(state): State<AppState>,
    session: Session,
    body: String,
) -> Result<Html<String>, AppError> {
    let token = body.trim();
    if token.is_empty() {
        return Err(AppError::Validation("Missing access token.".into()));
    }

    let identity = state.oauth.facebook.authenticate(token).await?;
    complete_login(&state, &session, identity).await
}

/// Find or create the local user behind a provider identity and log them in.
async fn complete_login(
    state: &AppState,
    session: &Session,
    identity: ProviderIdentity,
) -> Result<Html<String>, AppError> {
    let name = identity.name.clone();
    let email = identity.email.clone();
    let user_id = run_blocking(state, move |db| match db.get_user_id_by_email(&email)? {
        Some(id) => Ok(id),
        None => {
            let id = db.create_user(&name, &email, true)?;
            info!("Created user {} for {}", id, email);
            Ok(id)
        }
    })
    .await?;

    let (google_credentials_json, google_id, facebook_id) = match identity.provider {
        AuthProvider::Google => (identity.credentials_json, Some(identity.provider_user_id), None),
        AuthProvider::Facebook => (None, None, Some(identity.provider_user_id)),
    };

    session.store_user_session(UserLogin {
        user_id,
        username: identity.name,
        email: identity.email,
        picture: identity.picture,
        provider: identity.provider,
        google_credentials_json,
        google_id,
        facebook_id,
    })?;
    info!("User {} logged in with {}", user_id, identity.provider);

    let user = session
        .current_user()
        .ok_or(AppError::Unauthorized("Login could not be completed."))?;
    Ok(Html(views::welcome(&user)))
}

/// GET /logout: revoke provider access where possible, then forget the
/// user. Anonymous callers are simply redirected.
pub async fn logout(State(state): State<AppState>, session: Session) -> Redirect {
    match session.get::<AuthProvider>(LoginSessionKey::Provider) {
        Some(AuthProvider::Google) => {
            if let Some(credentials) = session.get::<String>(LoginSessionKey::GoogleCredentialsJson) {
                state.oauth.google.revoke(&credentials).await;
            }
        }
        Some(AuthProvider::Facebook) => {
            if let Some(facebook_id) = session.get::<String>(LoginSessionKey::FacebookId) {
                state.oauth.facebook.revoke(&facebook_id).await;
            }
        }
        None => {}
    }

    if let Some(user_id) = session.user_id() {
        info!("User {} logged out", user_id);
    }
    session.reset_user_session();
    Redirect::to("/")
}
