// Copyright (c) Microsoft. All rights reserved.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use core_objects::{Certificate, Selectors, WorkloadIdentity};
use log::warn;
use tokio::sync::watch;

use crate::bundle::BundleStore;

/// Everything a subscriber needs to serve its workload: the identities
/// matching its selectors, the local trust roots, and the federated roots
/// those identities reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkloadUpdate {
    pub identities: Vec<WorkloadIdentity>,
    pub bundle: Vec<Certificate>,
    pub federated_bundles: HashMap<String, Vec<Certificate>>,
}

/// One reconciliation result, computed by the synchronizer and applied
/// atomically.
#[derive(Debug, Default)]
pub struct CacheUpdate {
    pub to_add: Vec<WorkloadIdentity>,
    pub to_remove: Vec<String>,
    pub to_renew: Vec<WorkloadIdentity>,
}

/// The current identity set plus the registry of live subscriptions.
///
/// Writes are serialized by the identity write lock; subscribers are never
/// called while that lock is held. Each subscription is a single-slot
/// coalescing mailbox, so a slow subscriber observes only the latest
/// update and never blocks a writer.
pub struct Cache {
    trust_domain: String,
    bundles: Arc<BundleStore>,
    identities: RwLock<HashMap<String, WorkloadIdentity>>,
    subscribers: Arc<SubscriberRegistry>,
    next_subscriber_id: AtomicU64,
}

pub(crate) struct SubscriberRegistry {
    entries: Mutex<HashMap<u64, SubscriberEntry>>,
}

struct SubscriberEntry {
    selectors: Selectors,
    sender: watch::Sender<WorkloadUpdate>,
}

/// A live query bound to a selector set. The initial update is delivered on
/// the first `next` call; afterwards an update arrives whenever the cache
/// state projected onto the selector set changes. Dropping the subscriber
/// terminates the subscription.
pub struct WorkloadUpdateSubscriber {
    id: u64,
    pub(crate) receiver: watch::Receiver<WorkloadUpdate>,
    registry: Weak<SubscriberRegistry>,
}

impl WorkloadUpdateSubscriber {
    /// Waits for the next update. Returns `None` once the cache is gone.
    pub async fn next(&mut self) -> Option<WorkloadUpdate> {
        self.receiver.changed().await.ok()?;

        Some(self.receiver.borrow_and_update().clone())
    }
}

impl Drop for WorkloadUpdateSubscriber {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.entries.lock().unwrap().remove(&self.id);
        }
    }
}

impl Cache {
    #[must_use]
    pub fn new(trust_domain: &str, bundles: Arc<BundleStore>) -> Self {
        Cache {
            trust_domain: trust_domain.to_string(),
            bundles,
            identities: RwLock::new(HashMap::new()),
            subscribers: Arc::new(SubscriberRegistry {
                entries: Mutex::new(HashMap::new()),
            }),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// Applies a reconciliation result and re-projects every live
    /// subscription, delivering one composite update per subscription whose
    /// projection changed.
    pub fn update(&self, update: CacheUpdate) {
        {
            let identities = &mut *self.identities.write().unwrap();

            for id in &update.to_remove {
                identities.remove(id);
            }

            for identity in update.to_add.into_iter().chain(update.to_renew) {
                if let Err(reason) = self.validate_identity(&identity) {
                    warn!(
                        "Discarding identity for entry {}: {}",
                        identity.entry.id, reason
                    );
                    continue;
                }

                identities.insert(identity.entry.id.clone(), identity);
            }
        }

        self.notify_subscribers();
    }

    /// Registers a subscription and queues its initial update.
    #[must_use]
    pub fn subscribe(&self, selectors: Selectors) -> WorkloadUpdateSubscriber {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        let snapshot = self.identities.read().unwrap().clone();
        let initial = self.compose_update(&snapshot, &selectors);

        let (sender, mut receiver) = watch::channel(initial);
        receiver.mark_changed();

        self.subscribers
            .entries
            .lock()
            .unwrap()
            .insert(id, SubscriberEntry { selectors, sender });

        WorkloadUpdateSubscriber {
            id,
            receiver,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Identities whose entry selectors are a subset of `selectors`,
    /// ordered by entry id.
    #[must_use]
    pub fn matching_identities(&self, selectors: &Selectors) -> Vec<WorkloadIdentity> {
        let snapshot = self.identities.read().unwrap();

        let mut identities: Vec<_> = snapshot
            .values()
            .filter(|identity| identity.entry.selectors.is_subset(selectors))
            .cloned()
            .collect();
        identities.sort_by(|left, right| left.entry.id.cmp(&right.entry.id));

        identities
    }

    /// As `matching_identities`, plus the local bundle and the federated
    /// bundles referenced by the matching identities.
    #[must_use]
    pub fn fetch_workload_update(&self, selectors: &Selectors) -> WorkloadUpdate {
        let snapshot = self.identities.read().unwrap().clone();

        self.compose_update(&snapshot, selectors)
    }

    /// Full snapshot, ordered by entry id.
    #[must_use]
    pub fn identities(&self) -> Vec<WorkloadIdentity> {
        let snapshot = self.identities.read().unwrap();

        let mut identities: Vec<_> = snapshot.values().cloned().collect();
        identities.sort_by(|left, right| left.entry.id.cmp(&right.entry.id));

        identities
    }

    pub(crate) fn identities_by_entry_id(&self) -> HashMap<String, WorkloadIdentity> {
        self.identities.read().unwrap().clone()
    }

    /// Ingest check: the chain must be non-empty and anchored in the
    /// current roots of the identity's trust domain.
    fn validate_identity(&self, identity: &WorkloadIdentity) -> Result<(), String> {
        let root = identity
            .svid
            .cert_chain
            .last()
            .ok_or_else(|| "empty certificate chain".to_string())?;

        let trust_domain = &identity.entry.spiffe_id.trust_domain;
        let roots = self
            .bundles
            .roots_for(trust_domain)
            .ok_or_else(|| format!("no trust bundle for {trust_domain}"))?;

        if !roots.contains(root) {
            return Err(format!("chain is not anchored in the {trust_domain} bundle"));
        }

        Ok(())
    }

    fn notify_subscribers(&self) {
        let snapshot = self.identities.read().unwrap().clone();

        let entries = self.subscribers.entries.lock().unwrap();
        for entry in entries.values() {
            let update = self.compose_update(&snapshot, &entry.selectors);

            entry.sender.send_if_modified(|current| {
                if *current == update {
                    false
                } else {
                    *current = update;
                    true
                }
            });
        }
    }

    fn compose_update(
        &self,
        snapshot: &HashMap<String, WorkloadIdentity>,
        selectors: &Selectors,
    ) -> WorkloadUpdate {
        let mut identities: Vec<_> = snapshot
            .values()
            .filter(|identity| identity.entry.selectors.is_subset(selectors))
            .cloned()
            .collect();
        identities.sort_by(|left, right| left.entry.id.cmp(&right.entry.id));

        // An unresolvable federation reference is reported as an empty
        // bundle, not an error.
        let mut federated_bundles = HashMap::new();
        for identity in &identities {
            for domain in &identity.entry.federates_with {
                if domain == &self.trust_domain {
                    continue;
                }

                federated_bundles.insert(
                    domain.clone(),
                    self.bundles.roots_for(domain).unwrap_or_default(),
                );
            }
        }

        WorkloadUpdate {
            identities,
            bundle: self.bundles.local_roots(),
            federated_bundles,
        }
    }
}
