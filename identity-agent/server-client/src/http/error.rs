// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid server address {0}")]
    InvalidAddress(url::ParseError),
    #[error("Could not serialize the request body {0}")]
    SerializeRequest(serde_json::Error),
    #[error("Could not build the request {0}")]
    BuildRequest(hyper::http::Error),
    #[error("Could not reach the server {0}")]
    Request(hyper::Error),
    #[error("Could not read the response body {0}")]
    ReadResponseBody(hyper::Error),
    #[error("Server returned an unexpected status {0}")]
    UnexpectedStatus(hyper::StatusCode),
    #[error("Could not deserialize the response body {0}")]
    DeserializeResponse(serde_json::Error),
}
