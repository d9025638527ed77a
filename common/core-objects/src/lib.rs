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

use std::collections::BTreeSet;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

#[derive(Debug, serde::Deserialize, serde::Serialize, Clone, PartialEq, Eq, Hash)]
pub struct SPIFFEID {
    pub trust_domain: String,
    pub path: String,
}

impl std::fmt::Display for SPIFFEID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "spiffe://{}/{}", self.trust_domain, self.path)
    }
}

/// One attested property of a workload. Two selectors are equal only when
/// both kind and value are identical; there is no hierarchy or wildcarding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Selector {
    pub kind: String,
    pub value: String,
}

impl Selector {
    #[must_use]
    pub fn new(kind: &str, value: &str) -> Self {
        Selector {
            kind: kind.to_string(),
            value: value.to_string(),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

pub type Selectors = BTreeSet<Selector>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationEntry {
    pub id: String,
    pub spiffe_id: SPIFFEID,
    pub parent_id: SPIFFEID,
    pub selectors: Selectors,
    pub ttl: u64,
    pub admin: bool,
    pub downstream: bool,
    pub federates_with: Vec<String>,
    pub revision_number: u64,
}

/// A single DER-encoded X.509 certificate. Opaque at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Certificate {
    pub der: Vec<u8>,
}

/// DER-encoded private key bytes. Opaque to everything except the rotator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKey {
    pub der: Vec<u8>,
}

/// An issued X.509 identity document. The chain is leaf-to-root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509SVIDCompact {
    pub cert_chain: Vec<Certificate>,
    pub spiffe_id: SPIFFEID,
    pub expiry: u64,
    pub issued_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JWTSVIDCompact {
    pub token: String,
    pub spiffe_id: SPIFFEID,
    pub expiry: u64,
    pub issued_at: u64,
}

/// The root certificates trusted within one trust domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustBundle {
    pub trust_domain: String,
    pub root_cas: Vec<Certificate>,
}

/// A credential issued against one registration entry. Replaced wholesale
/// on renewal, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    pub entry: RegistrationEntry,
    pub svid: X509SVIDCompact,
    pub private_key: PrivateKey,
}

#[must_use]
pub fn get_epoch_time() -> u64 {
    let now = SystemTime::now();
    let epoch = now
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Epoch should succeed");
    epoch.as_secs()
}
