// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Error parsing config {0}")]
    ParsingConfig(std::io::Error),
    #[error("Error creating server client {0}")]
    CreatingServerClient(Box<dyn std::error::Error + Send>),
    #[error("Error reading the agent private key {0}")]
    GettingPrivateKey(Box<dyn std::error::Error + Send>),
    #[error("Error generating the agent private key {0}")]
    GeneratingKey(cache_manager::error::Error),
    #[error("Error fetching the initial agent SVID {0}")]
    FetchingInitialSVID(cache_manager::error::Error),
    #[error("Error creating the cache manager {0}")]
    CreatingManager(cache_manager::error::Error),
    #[error("Error initializing the cache manager {0}")]
    InitializingManager(cache_manager::error::Error),
    #[error("Cache manager stopped with an error {0}")]
    RunningManager(cache_manager::error::Error),
}
