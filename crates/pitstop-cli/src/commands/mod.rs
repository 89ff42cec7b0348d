//! CLI command implementations.

mod api;
mod auth;
mod realtime;

pub use api::call;
pub use auth::{login, logout, register, status};
pub use realtime::listen;

use anyhow::{Context as _, Result};
use pitstop_config_and_utils::{Config, Paths};
use pitstop_storage::{CredentialStore, FileStore};
use session_engine::{
    HttpAuthApi, ReqwestTransport, RequestGateway, SessionConfig, SessionController,
};
use std::sync::Arc;
use tracing::debug;

/// Everything a command needs, wired from the on-disk config and credentials.
pub struct Context {
    pub config: Config,
    pub session: Arc<SessionController>,
    pub gateway: RequestGateway,
}

impl Context {
    pub fn load(paths: &Paths, config: Config) -> Result<Self> {
        let store = FileStore::open(paths.credentials_file())
            .context("failed to open credential store")?;
        let store = Arc::new(CredentialStore::new(Box::new(store)));

        let api = HttpAuthApi::new(config.api_base_url()?, config.http_timeout())?;
        let session = Arc::new(SessionController::new(
            store,
            Arc::new(api),
            SessionConfig::from_config(&config),
        ));

        let transport = ReqwestTransport::new(config.api_base_url()?, config.http_timeout())
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
        let gateway = RequestGateway::new(session.clone(), Arc::new(transport));

        debug!(api = %config.api_base_url, "CLI context ready");
        Ok(Self {
            config,
            session,
            gateway,
        })
    }
}
