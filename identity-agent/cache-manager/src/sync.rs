// Copyright (c) Microsoft. All rights reserved.

use std::collections::{HashMap, HashSet};

use core_objects::WorkloadIdentity;
use log::warn;
use server_agent_api::fetch_updates;

use crate::cache::CacheUpdate;
use crate::error::Error;
use crate::Manager;

impl Manager {
    /// One reconciliation cycle against the issuer. The bundle snapshot is
    /// committed before the identity delta so incoming identities are
    /// validated against the roots they were issued under. Nothing is
    /// applied unless the issuer call succeeds.
    pub(crate) async fn synchronize(&self) -> Result<(), Error> {
        let request = fetch_updates::Request {
            agent_spiffe_id: self.svid.state().svid.spiffe_id,
        };

        let response = self
            .client
            .fetch_updates(request)
            .await
            .map_err(Error::FetchUpdates)?;

        let snapshot = response
            .bundles
            .iter()
            .map(|bundle| (bundle.trust_domain.clone(), bundle.root_cas.clone()))
            .collect();
        self.bundle_store.update_snapshot(snapshot);

        let current = self.cache.identities_by_entry_id();
        let update = compute_cache_update(&current, response);
        self.cache.update(update);

        Ok(())
    }
}

/// Diffs the issuer's reported state against the cached one, keyed by entry
/// id. An identity is renewed when its chain or its entry's revision number
/// changed.
pub(crate) fn compute_cache_update(
    current: &HashMap<String, WorkloadIdentity>,
    response: fetch_updates::Response,
) -> CacheUpdate {
    let mut to_add = Vec::new();
    let mut to_renew = Vec::new();

    let mut svids = response.svids;
    let mut reported = HashSet::new();
    for entry in response.entries {
        reported.insert(entry.id.clone());

        let Some(issued) = svids.remove(&entry.id) else {
            warn!("Server reported entry {} without an SVID", entry.id);
            continue;
        };

        let identity = WorkloadIdentity {
            entry,
            svid: issued.svid,
            private_key: issued.private_key,
        };

        match current.get(&identity.entry.id) {
            None => to_add.push(identity),
            Some(existing) if should_renew(existing, &identity) => to_renew.push(identity),
            Some(_) => {}
        }
    }

    let to_remove = current
        .keys()
        .filter(|id| !reported.contains(*id))
        .cloned()
        .collect();

    CacheUpdate {
        to_add,
        to_remove,
        to_renew,
    }
}

fn should_renew(existing: &WorkloadIdentity, incoming: &WorkloadIdentity) -> bool {
    existing.svid.cert_chain != incoming.svid.cert_chain
        || existing.entry.revision_number != incoming.entry.revision_number
}
