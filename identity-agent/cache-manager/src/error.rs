// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Synchronization interval must be greater than zero")]
    InvalidSyncInterval,
    #[error("Could not fetch updates from the server {0}")]
    FetchUpdates(Box<dyn std::error::Error + Send>),
    #[error("Could not store the private key {0}")]
    StorePrivateKey(Box<dyn std::error::Error + Send>),
    #[error("No identity found for {0}")]
    NoEntryFound(String),
    #[error("Could not fetch JWT-SVID {0}")]
    FetchJWTSVID(Box<dyn std::error::Error + Send>),
    #[error("Unable to renew JWT-SVID for {0}: {1}")]
    RenewJWTSVID(String, Box<dyn std::error::Error + Send>),
    #[error("Could not generate a new key pair {0}")]
    KeyGeneration(openssl::error::ErrorStack),
    #[error("Could not build the certificate signing request {0}")]
    CsrGeneration(openssl::error::ErrorStack),
    #[error("Could not renew the agent SVID {0}")]
    RenewAgentSVID(Box<dyn std::error::Error + Send>),
    #[error("Agent SVID expired before it could be renewed {0}")]
    SVIDExpired(Box<dyn std::error::Error + Send>),
}
