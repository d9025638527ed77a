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

pub mod disk;

#[cfg(feature = "tests")]
use mockall::automock;

/// Stores the agent's private key in an opaque byte form. The key material
/// is already marshaled by the caller; plugins never interpret it.
#[cfg_attr(feature = "tests", automock)]
#[async_trait::async_trait]
pub trait KeyManager: Sync + Send {
    async fn store_private_key(
        &self,
        key: Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error + Send>>;

    async fn get_private_key(&self)
        -> Result<Option<Vec<u8>>, Box<dyn std::error::Error + Send>>;
}
