pub mod api;
pub mod assistant;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;

pub use db::DbPool;

use anyhow::Context;
use config::Config;
use std::sync::Arc;

use crate::assistant::AssistantBridge;
use crate::auth::TokenIssuer;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub tokens: TokenIssuer,
    pub assistant: Arc<dyn AssistantBridge>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        assistant: Arc<dyn AssistantBridge>,
    ) -> anyhow::Result<Self> {
        let secret = config
            .auth
            .secret_key
            .as_deref()
            .context("auth.secret_key is not set")?;
        let tokens = TokenIssuer::new(secret)
            .context("auth.secret_key is not usable for signing tokens")?;

        Ok(Self {
            config,
            db,
            tokens,
            assistant,
        })
    }
}
