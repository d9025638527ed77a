// Copyright (c) Microsoft. All rights reserved.

pub mod error;

use crate::Client as ClientTrait;

use agent_config::ServerConfig;
use error::Error;
use hyper::{body, client::HttpConnector, Body, Method, Request, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use server_agent_api::{fetch_jwt_svid, fetch_updates, renew_agent_svid, ApiVersion};
use url::Url;

pub struct Client {
    client: hyper::Client<HttpConnector>,
    address_url: Url,
}

#[must_use]
pub fn fetch_updates_uri() -> String {
    format!("updates?api-version={}", ApiVersion::V2024_01_01)
}

#[must_use]
pub fn fetch_jwt_svid_uri() -> String {
    format!("workload-jwt?api-version={}", ApiVersion::V2024_01_01)
}

#[must_use]
pub fn renew_agent_svid_uri() -> String {
    format!("agent-svid?api-version={}", ApiVersion::V2024_01_01)
}

impl Client {
    pub fn new(server_config: &ServerConfig) -> Result<Self, Error> {
        let address_url = url::Url::parse(&format!(
            "http://{}:{}",
            server_config.address, server_config.port
        ))
        .map_err(Error::InvalidAddress)?;

        Ok(Self {
            client: hyper::Client::new(),
            address_url,
        })
    }

    async fn post_json<TRequest, TResponse>(
        &self,
        uri: &str,
        request: &TRequest,
        expected_status: StatusCode,
    ) -> Result<TResponse, Error>
    where
        TRequest: Serialize,
        TResponse: DeserializeOwned,
    {
        let address_url = format!("{}{}", self.address_url, uri);

        let body = serde_json::to_vec(request).map_err(Error::SerializeRequest)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(address_url.as_str())
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(Error::BuildRequest)?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(Error::Request)?;

        let status = response.status();
        let body = body::to_bytes(response.into_body())
            .await
            .map_err(Error::ReadResponseBody)?;

        if status != expected_status {
            return Err(Error::UnexpectedStatus(status));
        }

        serde_json::from_slice(&body).map_err(Error::DeserializeResponse)
    }
}

#[async_trait::async_trait]
impl ClientTrait for Client {
    async fn fetch_updates(
        &self,
        request: fetch_updates::Request,
    ) -> Result<fetch_updates::Response, Box<dyn std::error::Error + Send>> {
        self.post_json(&fetch_updates_uri(), &request, StatusCode::OK)
            .await
            .map_err(|err| Box::new(err) as _)
    }

    async fn fetch_jwt_svid(
        &self,
        request: fetch_jwt_svid::Request,
    ) -> Result<fetch_jwt_svid::Response, Box<dyn std::error::Error + Send>> {
        self.post_json(&fetch_jwt_svid_uri(), &request, StatusCode::CREATED)
            .await
            .map_err(|err| Box::new(err) as _)
    }

    async fn renew_agent_svid(
        &self,
        request: renew_agent_svid::Request,
    ) -> Result<renew_agent_svid::Response, Box<dyn std::error::Error + Send>> {
        self.post_json(&renew_agent_svid_uri(), &request, StatusCode::CREATED)
            .await
            .map_err(|err| Box::new(err) as _)
    }

    fn release(&self) {
        // Pooled connections are torn down when the inner client drops.
    }
}
