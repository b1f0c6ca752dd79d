use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use storytime_db::Database;

use crate::error::AppError;
use crate::oauth::OAuthClients;
use crate::session::SessionSigner;
use crate::storage::UploadSet;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub uploads: UploadSet,
    pub signer: SessionSigner,
    pub oauth: OAuthClients,
}

impl AppStateInner {
    pub fn new(db: Database, uploads: UploadSet, signer: SessionSigner, oauth: OAuthClients) -> AppState {
        Arc::new(Self {
            db,
            uploads,
            signer,
            oauth,
        })
    }
}

/// Run blocking DB work off the async runtime.
pub async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::Unexpected(anyhow!("blocking task failed"))
        })?
        .map_err(AppError::from)
}
