// Copyright (c) Microsoft. All rights reserved.

use std::collections::HashMap;
use std::sync::RwLock;

use core_objects::{JWTSVIDCompact, SPIFFEID};

/// Canonical form of an audience list: lexicographically sorted with
/// duplicates removed.
#[must_use]
pub fn canonical_audiences(audiences: &[String]) -> Vec<String> {
    let mut audiences = audiences.to_vec();
    audiences.sort();
    audiences.dedup();
    audiences
}

/// Cache key for an already-canonical audience list.
#[must_use]
pub fn audience_key(audiences: &[String]) -> String {
    audiences.join("|")
}

/// JWT documents keyed by (spiffe id, canonical audience list). There is no
/// background eviction; readers check expiry themselves.
pub struct JWTSVIDCache {
    svids: RwLock<HashMap<(String, String), JWTSVIDCompact>>,
}

impl JWTSVIDCache {
    #[must_use]
    pub fn new() -> Self {
        JWTSVIDCache {
            svids: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn get(&self, spiffe_id: &SPIFFEID, audiences: &[String]) -> Option<JWTSVIDCompact> {
        let key = (spiffe_id.to_string(), audience_key(audiences));

        self.svids.read().unwrap().get(&key).cloned()
    }

    pub fn set(&self, spiffe_id: &SPIFFEID, audiences: &[String], svid: JWTSVIDCompact) {
        let key = (spiffe_id.to_string(), audience_key(audiences));

        self.svids.write().unwrap().insert(key, svid);
    }
}

impl Default for JWTSVIDCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spiffe_id(path: &str) -> SPIFFEID {
        SPIFFEID {
            trust_domain: "td".to_string(),
            path: path.to_string(),
        }
    }

    fn jwt_svid(token: &str) -> JWTSVIDCompact {
        JWTSVIDCompact {
            token: token.to_string(),
            spiffe_id: spiffe_id("a"),
            expiry: 1000,
            issued_at: 0,
        }
    }

    #[test]
    fn audience_canonicalization_sorts_and_dedups() {
        let audiences = vec![
            "aud2".to_string(),
            "aud1".to_string(),
            "aud2".to_string(),
        ];

        let canonical = canonical_audiences(&audiences);

        assert_eq!(canonical, vec!["aud1".to_string(), "aud2".to_string()]);
        assert_eq!(audience_key(&canonical), "aud1|aud2");
    }

    #[test]
    fn audience_canonicalization_is_idempotent() {
        let audiences = vec!["aud2".to_string(), "aud1".to_string()];

        let canonical = canonical_audiences(&audiences);

        assert_eq!(canonical_audiences(&canonical), canonical);
    }

    #[test]
    fn get_returns_what_set_stored() {
        let cache = JWTSVIDCache::new();
        let audiences = vec!["aud1".to_string(), "aud2".to_string()];

        assert!(cache.get(&spiffe_id("a"), &audiences).is_none());

        cache.set(&spiffe_id("a"), &audiences, jwt_svid("token"));

        let svid = cache.get(&spiffe_id("a"), &audiences).unwrap();
        assert_eq!(svid.token, "token");

        // A different audience set is a different document.
        assert!(cache
            .get(&spiffe_id("a"), &["aud1".to_string()])
            .is_none());
    }

    #[test]
    fn set_replaces_the_previous_document() {
        let cache = JWTSVIDCache::new();
        let audiences = vec!["aud1".to_string()];

        cache.set(&spiffe_id("a"), &audiences, jwt_svid("old"));
        cache.set(&spiffe_id("a"), &audiences, jwt_svid("new"));

        let svid = cache.get(&spiffe_id("a"), &audiences).unwrap();
        assert_eq!(svid.token, "new");
    }
}
