pub mod auth;
pub mod chat;
pub mod cognito;
pub mod config;
pub mod dynamo;
pub mod error;
pub mod events;
pub mod identity;
pub mod instructions;
pub mod kv;
pub mod memory;
pub mod records;
pub mod responses;
pub mod types;
pub mod users;

#[cfg(test)]
mod testing;

use config::Config;
use identity::IdentityProvider;
use kv::KvStore;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn KvStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn KvStore>,
        identity: Arc<dyn IdentityProvider>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            identity,
            config,
        })
    }
}
