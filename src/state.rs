use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::{
    cookies::SessionCookies,
    jwt::TokenKeys,
    repo::{PgRefreshTokenStore, PgUserStore, RefreshTokenStore, UserStore},
    session::SessionService,
};
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: SessionService,
    pub cookies: SessionCookies,
}

impl AppState {
    /// Connects to PostgreSQL and wires the stores. The pool is returned too
    /// so startup can run migrations against it.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let refresh_ttl = time::Duration::days(config.refresh_ttl_days);
        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;
        let tokens =
            Arc::new(PgRefreshTokenStore::new(db.clone(), refresh_ttl)) as Arc<dyn RefreshTokenStore>;

        Ok((Self::from_parts(Arc::new(config), users, tokens), db))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        let keys = TokenKeys::from_config(&config.jwt);
        let sessions = SessionService::new(
            users,
            tokens,
            keys,
            time::Duration::days(config.refresh_ttl_days),
        );
        let cookies = SessionCookies::new(&config.cookies);
        Self {
            config,
            sessions,
            cookies,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::auth::memory::{MemoryRefreshTokenStore, MemoryUserStore};

        let config = Arc::new(AppConfig::for_tests());
        let users = Arc::new(MemoryUserStore::default());
        let tokens = Arc::new(MemoryRefreshTokenStore::new(
            users.clone(),
            time::Duration::days(config.refresh_ttl_days),
        ));
        Self::from_parts(config, users, tokens)
    }
}
