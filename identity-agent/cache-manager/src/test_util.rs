// Copyright (c) Microsoft. All rights reserved.

use core_objects::{
    Certificate, JWTSVIDCompact, PrivateKey, RegistrationEntry, Selector, Selectors,
    WorkloadIdentity, X509SVIDCompact, SPIFFEID,
};

pub(crate) fn spiffe_id(path: &str) -> SPIFFEID {
    SPIFFEID {
        trust_domain: "td".to_string(),
        path: path.to_string(),
    }
}

pub(crate) fn certificate(der: &[u8]) -> Certificate {
    Certificate { der: der.to_vec() }
}

pub(crate) fn selectors(pairs: &[(&str, &str)]) -> Selectors {
    pairs
        .iter()
        .map(|(kind, value)| Selector::new(kind, value))
        .collect()
}

pub(crate) fn entry(id: &str, path: &str, selector_pairs: &[(&str, &str)]) -> RegistrationEntry {
    RegistrationEntry {
        id: id.to_string(),
        spiffe_id: spiffe_id(path),
        parent_id: spiffe_id("agent"),
        selectors: selectors(selector_pairs),
        ttl: 3600,
        admin: false,
        downstream: false,
        federates_with: Vec::new(),
        revision_number: 0,
    }
}

pub(crate) fn identity(
    id: &str,
    path: &str,
    selector_pairs: &[(&str, &str)],
    root: &Certificate,
) -> WorkloadIdentity {
    WorkloadIdentity {
        entry: entry(id, path, selector_pairs),
        svid: X509SVIDCompact {
            cert_chain: vec![certificate(format!("leaf-{id}").as_bytes()), root.clone()],
            spiffe_id: spiffe_id(path),
            expiry: 3600,
            issued_at: 0,
        },
        private_key: PrivateKey {
            der: format!("key-{id}").into_bytes(),
        },
    }
}

pub(crate) fn identity_with_federation(
    id: &str,
    path: &str,
    selector_pairs: &[(&str, &str)],
    root: &Certificate,
    federates_with: &[&str],
) -> WorkloadIdentity {
    let mut identity = identity(id, path, selector_pairs, root);
    identity.entry.federates_with = federates_with
        .iter()
        .map(std::string::ToString::to_string)
        .collect();

    identity
}

pub(crate) fn agent_svid(issued_at: u64, expiry: u64) -> X509SVIDCompact {
    X509SVIDCompact {
        cert_chain: vec![certificate(b"agent-leaf"), certificate(b"root")],
        spiffe_id: spiffe_id("agent"),
        expiry,
        issued_at,
    }
}

pub(crate) fn jwt_svid(path: &str, token: &str, issued_at: u64, expiry: u64) -> JWTSVIDCompact {
    JWTSVIDCompact {
        token: token.to_string(),
        spiffe_id: spiffe_id(path),
        expiry,
        issued_at,
    }
}
