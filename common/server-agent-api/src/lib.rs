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

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum ApiVersion {
    V2024_01_01,
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ApiVersion::V2024_01_01 => "2024-01-01",
        })
    }
}

impl std::str::FromStr for ApiVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2024-01-01" => Ok(ApiVersion::V2024_01_01),
            _ => Err(()),
        }
    }
}

pub mod fetch_updates {
    use std::collections::HashMap;

    use core_objects::{PrivateKey, RegistrationEntry, TrustBundle, X509SVIDCompact, SPIFFEID};

    #[derive(Debug, serde::Deserialize, serde::Serialize, Clone)]
    pub struct Request {
        pub agent_spiffe_id: SPIFFEID,
    }

    /// The X.509 material issued for one registration entry.
    #[derive(Debug, serde::Deserialize, serde::Serialize, Clone)]
    pub struct WorkloadSVID {
        pub svid: X509SVIDCompact,
        pub private_key: PrivateKey,
    }

    #[derive(Debug, serde::Deserialize, serde::Serialize, Clone)]
    pub struct Response {
        pub entries: Vec<RegistrationEntry>,
        /// Keyed by registration entry id.
        pub svids: HashMap<String, WorkloadSVID>,
        pub bundles: Vec<TrustBundle>,
    }
}

pub mod fetch_jwt_svid {
    use core_objects::{JWTSVIDCompact, SPIFFEID};

    #[derive(Debug, serde::Deserialize, serde::Serialize, Clone)]
    pub struct Request {
        pub spiffe_id: SPIFFEID,
        pub audiences: Vec<String>,
        pub entry_id: Option<String>,
    }

    #[derive(Debug, serde::Deserialize, serde::Serialize, Clone)]
    pub struct Response {
        pub jwt_svid: JWTSVIDCompact,
    }
}

pub mod renew_agent_svid {
    use core_objects::X509SVIDCompact;

    #[derive(Debug, serde::Deserialize, serde::Serialize, Clone)]
    pub struct Request {
        pub csr: Vec<u8>,
    }

    #[derive(Debug, serde::Deserialize, serde::Serialize, Clone)]
    pub struct Response {
        pub svid: X509SVIDCompact,
    }
}
