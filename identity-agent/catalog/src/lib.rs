// Copyright (c) Microsoft. All rights reserved.

#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::default_trait_access,
    clippy::let_unit_value,
    clippy::missing_errors_doc,
    clippy::similar_names,
    clippy::too_many_lines
)]

use std::sync::Arc;

use agent_config::KeyManagerConfig;
use key_manager::{disk, KeyManager};

/// Accessor for the plugins the agent was configured with.
pub trait Catalog: Sync + Send {
    fn key_manager(&self) -> Arc<dyn KeyManager>;
}

#[must_use]
pub fn load_catalog(config: &KeyManagerConfig) -> Arc<dyn Catalog> {
    let key_manager: Arc<dyn KeyManager> = match config {
        KeyManagerConfig::Disk(config) => Arc::new(disk::KeyManager::new(config)),
    };

    Arc::new(AgentCatalog { key_manager })
}

pub struct AgentCatalog {
    key_manager: Arc<dyn KeyManager>,
}

impl AgentCatalog {
    #[must_use]
    pub fn with_key_manager(key_manager: Arc<dyn KeyManager>) -> Self {
        AgentCatalog { key_manager }
    }
}

impl Catalog for AgentCatalog {
    fn key_manager(&self) -> Arc<dyn KeyManager> {
        self.key_manager.clone()
    }
}
