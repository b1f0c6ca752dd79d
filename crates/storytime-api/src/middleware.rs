use axum::{
    Json,
    extract::{Query, Request, State},
    http::{HeaderMap, HeaderValue, Uri, header},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::{debug, error};

use storytime_types::api::ErrorEnvelope;

use crate::error::{AppError, ErrorReport};
use crate::session::{SESSION_COOKIE, Session};
use crate::state::{AppState, run_blocking};
use crate::views;

const REQUESTED_WITH: &str = "x-requested-with";
const CSRF_HEADER: &str = "x-csrf-token";

/// Load the caller's session from its signed cookie, run the request, then
/// persist the session if the handler changed it.
///
/// Missing, forged or expired cookies get a fresh anonymous session. The
/// cookie is only issued once something has been stored, and again whenever
/// the session moves to a new id.
pub async fn session_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    let session_id = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.signer.verify(cookie.value()));

    let session = match session_id {
        Some(id) => {
            let lookup = id.clone();
            match run_blocking(&state, move |db| db.load_session(&lookup)).await {
                Ok(Some(payload)) => Session::restore(id, &payload),
                Ok(None) => {
                    debug!("Unknown session id, starting a new session");
                    Session::fresh()
                }
                Err(e) => return e.into_response(),
            }
        }
        None => Session::fresh(),
    };

    req.extensions_mut().insert(session.clone());
    let mut response = next.run(req).await;
    response.extensions_mut().insert(session.clone());

    if !session.is_dirty() {
        return response;
    }

    if let Some(old) = session.replaced_id() {
        if let Err(e) = run_blocking(&state, move |db| db.delete_session(&old)).await {
            error!("Failed to drop replaced session: {}", e);
        }
    }

    let id = session.id();
    let result = if session.is_empty() {
        run_blocking(&state, move |db| db.delete_session(&id)).await
    } else {
        let payload = session.to_payload();
        run_blocking(&state, move |db| db.save_session(&id, &payload)).await
    };
    if let Err(e) = result {
        error!("Failed to persist session: {}", e);
        return response;
    }
    if session.is_empty() {
        return response;
    }

    if session.needs_cookie() {
        let cookie = Cookie::build((SESSION_COOKIE, state.signer.sign(&session.id())))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!("Session cookie is not a valid header: {}", e),
        }
    }

    response
}

/// Reject anonymous callers before the wrapped handler runs.
pub async fn login_required(session: Session, req: Request, next: Next) -> Result<Response, AppError> {
    if !session.is_user_authenticated() {
        return Err(AppError::Unauthorized("You must be logged in to view this page."));
    }
    Ok(next.run(req).await)
}

#[derive(Debug, Deserialize)]
struct CsrfQuery {
    state: Option<String>,
}

/// Guard for script-issued POSTs such as the OAuth callbacks.
///
/// The request must carry `X-Requested-With`, come from our own origin, and
/// present the session's anti-forgery token in the `state` query parameter or
/// the `X-CSRF-Token` header.
pub async fn csrf_protect(session: Session, req: Request, next: Next) -> Result<Response, AppError> {
    {
        let headers = req.headers();
        if !headers.contains_key(REQUESTED_WITH) {
            return Err(AppError::Forbidden("Missing X-Requested-With header."));
        }
        check_same_origin(headers)?;

        let token = Query::<CsrfQuery>::try_from_uri(req.uri())
            .ok()
            .and_then(|Query(query)| query.state)
            .or_else(|| header_str(headers, CSRF_HEADER).map(str::to_string));
        if !session.verify_csrf_token(token.as_deref()) {
            return Err(AppError::Forbidden("Invalid state parameter."));
        }
    }
    Ok(next.run(req).await)
}

/// The origin and token checks of [`csrf_protect`] for HTML form posts,
/// whose token arrives as a `csrf_token` form field.
pub fn verify_form_token(session: &Session, headers: &HeaderMap, token: Option<&str>) -> Result<(), AppError> {
    check_same_origin(headers)?;
    if !session.verify_csrf_token(token) {
        return Err(AppError::Forbidden("Invalid form token."));
    }
    Ok(())
}

/// The `Origin` header, or failing that the `Referer`, must name the host
/// the request was sent to.
pub fn check_same_origin(headers: &HeaderMap) -> Result<(), AppError> {
    let host = header_str(headers, header::HOST.as_str())
        .ok_or(AppError::Forbidden("Missing Host header."))?;
    let source = header_str(headers, header::ORIGIN.as_str())
        .or_else(|| header_str(headers, header::REFERER.as_str()))
        .ok_or(AppError::Forbidden("Missing Origin header."))?;

    let matches = source
        .parse::<Uri>()
        .ok()
        .and_then(|uri| uri.authority().map(|a| a.as_str().eq_ignore_ascii_case(host)))
        .unwrap_or(false);
    if !matches {
        return Err(AppError::Forbidden("Cross-origin request rejected."));
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Render failed responses: a JSON envelope under `/api`, an HTML error page
/// everywhere else.
///
/// Runs outside [`session_layer`] so session load failures are rendered too;
/// the session, when there is one, comes back on the response.
pub async fn render_errors(req: Request, next: Next) -> Response {
    let is_api = {
        let path = req.uri().path();
        path == "/api" || path.starts_with("/api/")
    };
    let url = request_url(&req);

    let response = next.run(req).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let user = response
        .extensions()
        .get::<Session>()
        .and_then(Session::current_user);

    let message = match response.extensions().get::<ErrorReport>() {
        Some(report) => report.message.clone(),
        None => status.canonical_reason().unwrap_or("Error").to_string(),
    };

    let mut rendered = if is_api {
        let envelope = ErrorEnvelope {
            status: status.as_u16(),
            message,
            url,
        };
        (status, Json(envelope)).into_response()
    } else {
        (status, Html(views::error_page(status, &message, user.as_ref()))).into_response()
    };
    for cookie in response.headers().get_all(header::SET_COOKIE) {
        rendered.headers_mut().append(header::SET_COOKIE, cookie.clone());
    }
    rendered
}

fn request_url(req: &Request) -> String {
    let headers = req.headers();
    let scheme = header_str(headers, "x-forwarded-proto").unwrap_or("http");
    match header_str(headers, header::HOST.as_str()) {
        Some(host) => format!("{}://{}{}", scheme, host, req.uri()),
        None => req.uri().to_string(),
    }
}
