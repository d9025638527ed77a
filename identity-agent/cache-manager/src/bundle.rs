// Copyright (c) Microsoft. All rights reserved.

use std::collections::{HashMap, HashSet};

use core_objects::Certificate;
use tokio::sync::watch;

/// The full trust-bundle map: trust-domain name to root certificates.
pub type BundleSnapshot = HashMap<String, Vec<Certificate>>;

/// Coalescing stream of bundle snapshots. A subscriber that fell behind
/// observes only the latest snapshot, never a backlog.
pub type BundleStream = watch::Receiver<BundleSnapshot>;

/// Current trust bundle per trust domain. Exactly one domain is local; the
/// others are federated. Snapshots are replaced wholesale so readers never
/// observe a partial bundle.
pub struct BundleStore {
    trust_domain: String,
    bundles: watch::Sender<BundleSnapshot>,
}

impl BundleStore {
    #[must_use]
    pub fn new(trust_domain: &str, roots: Vec<Certificate>) -> Self {
        let mut bundles = HashMap::new();
        bundles.insert(trust_domain.to_string(), roots);

        let (sender, _) = watch::channel(bundles);

        BundleStore {
            trust_domain: trust_domain.to_string(),
            bundles: sender,
        }
    }

    /// Replaces the roots of one trust domain. Publishes only when the new
    /// roots differ from the current ones as a set.
    pub fn set(&self, trust_domain: &str, roots: Vec<Certificate>) {
        self.bundles.send_if_modified(|bundles| {
            if let Some(current) = bundles.get(trust_domain) {
                if same_roots(current, &roots) {
                    return false;
                }
            }

            bundles.insert(trust_domain.to_string(), roots);
            true
        });
    }

    /// Replaces the whole map in one step, as the synchronizer does each
    /// cycle. Publishes only when some domain's root set changed.
    pub fn update_snapshot(&self, snapshot: BundleSnapshot) {
        self.bundles.send_if_modified(|bundles| {
            if snapshots_equal(bundles, &snapshot) {
                return false;
            }

            *bundles = snapshot;
            true
        });
    }

    #[must_use]
    pub fn current(&self) -> BundleSnapshot {
        self.bundles.borrow().clone()
    }

    #[must_use]
    pub fn local_roots(&self) -> Vec<Certificate> {
        self.roots_for(&self.trust_domain).unwrap_or_default()
    }

    #[must_use]
    pub fn roots_for(&self, trust_domain: &str) -> Option<Vec<Certificate>> {
        self.bundles.borrow().get(trust_domain).cloned()
    }

    #[must_use]
    pub fn subscribe(&self) -> BundleStream {
        self.bundles.subscribe()
    }
}

fn same_roots(left: &[Certificate], right: &[Certificate]) -> bool {
    left.iter().collect::<HashSet<_>>() == right.iter().collect::<HashSet<_>>()
}

fn snapshots_equal(left: &BundleSnapshot, right: &BundleSnapshot) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|(domain, roots)| right.get(domain).map_or(false, |other| same_roots(roots, other)))
}
