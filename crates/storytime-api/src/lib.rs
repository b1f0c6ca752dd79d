pub mod api;
pub mod auth;
pub mod cleanup;
pub mod error;
pub mod middleware;
pub mod oauth;
pub mod router;
pub mod session;
pub mod site;
pub mod state;
pub mod storage;
pub mod stories;
pub mod views;

pub use router::router;
pub use state::{AppState, AppStateInner};
