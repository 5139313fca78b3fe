use crate::config::Config;
use crate::email::Mailer;
use axum::extract::FromRef;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared application state.
///
/// The users store (identities + attempt ledger) and the questions store are
/// separate databases with no cross-store transaction: a commit to one can
/// succeed while a related commit to the other fails.
#[derive(Clone)]
pub struct AppState {
    pub users: SqlitePool,
    pub questions: SqlitePool,
    pub config: Config,
    pub mailer: Arc<dyn Mailer>,
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
