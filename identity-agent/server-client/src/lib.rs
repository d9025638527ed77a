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

pub mod http;

use std::sync::Arc;

#[cfg(feature = "tests")]
use mockall::automock;

use agent_config::ServerConfig;
use server_agent_api::{fetch_jwt_svid, fetch_updates, renew_agent_svid};

pub struct ServerClientFactory {}

impl ServerClientFactory {
    pub fn get(
        server_config: &ServerConfig,
    ) -> Result<Arc<dyn Client + Sync + Send>, Box<dyn std::error::Error + Send>> {
        let http_client = http::Client::new(server_config).map_err(|err| Box::new(err) as _)?;

        Ok(Arc::new(http_client))
    }
}

#[cfg_attr(feature = "tests", automock)]
#[async_trait::async_trait]
pub trait Client: Sync + Send {
    async fn fetch_updates(
        &self,
        request: fetch_updates::Request,
    ) -> Result<fetch_updates::Response, Box<dyn std::error::Error + Send>>;

    async fn fetch_jwt_svid(
        &self,
        request: fetch_jwt_svid::Request,
    ) -> Result<fetch_jwt_svid::Response, Box<dyn std::error::Error + Send>>;

    async fn renew_agent_svid(
        &self,
        request: renew_agent_svid::Request,
    ) -> Result<renew_agent_svid::Response, Box<dyn std::error::Error + Send>>;

    /// Drops any connection resources the client holds. Called once by the
    /// owner when it stops using the client.
    fn release(&self);
}
