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

pub mod bundle;
pub mod cache;
pub mod error;
pub mod rotator;

mod backoff;
mod jwt_cache;
mod rotation;
mod storage;
mod sync;

#[cfg(test)]
pub(crate) mod test_util;

use std::sync::Arc;
use std::time::Duration;

use catalog::Catalog;
use core_objects::{
    get_epoch_time, Certificate, JWTSVIDCompact, PrivateKey, Selectors, WorkloadIdentity,
    X509SVIDCompact, SPIFFEID,
};
use log::{error, info, warn};
use server_agent_api::fetch_jwt_svid;
use server_client::Client;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::bundle::{BundleStore, BundleStream};
use crate::cache::{Cache, WorkloadUpdate, WorkloadUpdateSubscriber};
use crate::error::Error;
use crate::jwt_cache::JWTSVIDCache;
use crate::rotator::{SvidRotator, SvidState};

const DEFAULT_RENEW_MARGIN_PERCENT: u64 = 50;

pub struct Config {
    pub trust_domain: String,
    /// Base period of the synchronizer. Must be positive.
    pub sync_interval: Duration,
    pub svid: X509SVIDCompact,
    pub svid_key: PrivateKey,
    /// Initial roots of the local trust domain.
    pub bundle: Vec<Certificate>,
    pub svid_cache_path: String,
    pub bundle_cache_path: String,
    /// Percentage of the SVID lifetime after which rotation fires.
    /// Defaults to half.
    pub renew_margin_percent: Option<u64>,
    /// Gates entry-id resolution in the JWT path.
    pub experimental_api_enabled: bool,
    pub client: Arc<dyn Client>,
    pub catalog: Arc<dyn Catalog>,
}

/// Composes the identity cache, bundle store, JWT sub-cache, SVID rotator,
/// synchronizer and persistence loops, and exposes the public query and
/// subscription surface.
pub struct Manager {
    cache: Arc<Cache>,
    bundle_store: Arc<BundleStore>,
    jwt_svids: JWTSVIDCache,
    svid: SvidRotator,
    client: Arc<dyn Client>,
    catalog: Arc<dyn Catalog>,
    backoff: tokio::sync::Mutex<Backoff>,
    trust_domain: String,
    svid_cache_path: String,
    bundle_cache_path: String,
    experimental_api_enabled: bool,
}

impl Manager {
    pub fn new(config: Config) -> Result<Self, Error> {
        if config.sync_interval.is_zero() {
            return Err(Error::InvalidSyncInterval);
        }

        let bundle_store = Arc::new(BundleStore::new(&config.trust_domain, config.bundle));
        let cache = Arc::new(Cache::new(&config.trust_domain, bundle_store.clone()));

        let renew_margin_percent = config
            .renew_margin_percent
            .unwrap_or(DEFAULT_RENEW_MARGIN_PERCENT);
        let svid = SvidRotator::new(
            config.client.clone(),
            SvidState {
                svid: config.svid,
                key: config.svid_key,
            },
            renew_margin_percent,
        );

        Ok(Manager {
            cache,
            bundle_store,
            jwt_svids: JWTSVIDCache::new(),
            svid,
            client: config.client,
            catalog: config.catalog,
            backoff: tokio::sync::Mutex::new(Backoff::new(config.sync_interval)),
            trust_domain: config.trust_domain,
            svid_cache_path: config.svid_cache_path,
            bundle_cache_path: config.bundle_cache_path,
            experimental_api_enabled: config.experimental_api_enabled,
        })
    }

    /// Persists the current SVID, bundle and private key, then runs one
    /// synchronous reconciliation. Fails if the key cannot be stored or the
    /// reconciliation fails.
    pub async fn initialize(&self) -> Result<(), Error> {
        let state = self.svid.state();
        self.store_svid(&state.svid.cert_chain).await;
        self.store_bundle(&self.bundle_store.local_roots()).await;

        self.store_private_key(&state.key)
            .await
            .map_err(Error::StorePrivateKey)?;

        self.backoff.lock().await.reset();

        self.synchronize().await
    }

    /// Supervises the synchronizer, both persistence observers and the
    /// rotator until `cancel` fires (success) or one of them fails with a
    /// non-cancellation error. Releases the server client on exit.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), Error> {
        let result = tokio::try_join!(
            self.run_synchronizer(cancel.clone()),
            self.run_svid_observer(cancel.clone()),
            self.run_bundle_observer(cancel.clone()),
            self.svid.run(cancel),
        );

        self.client.release();

        match result {
            Ok(_) => {
                info!("Cache manager stopped");
                Ok(())
            }
            Err(err) => {
                error!("Cache manager crashed: {}", err);
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn subscribe_to_cache_changes(&self, selectors: Selectors) -> WorkloadUpdateSubscriber {
        self.cache.subscribe(selectors)
    }

    #[must_use]
    pub fn subscribe_to_svid_changes(&self) -> watch::Receiver<SvidState> {
        self.svid.subscribe()
    }

    #[must_use]
    pub fn subscribe_to_bundle_changes(&self) -> BundleStream {
        self.bundle_store.subscribe()
    }

    #[must_use]
    pub fn rotation_mtx(&self) -> Arc<tokio::sync::RwLock<()>> {
        self.svid.rotation_mtx()
    }

    #[must_use]
    pub fn current_credentials(&self) -> SvidState {
        self.svid.state()
    }

    pub fn set_rotation_finished_hook(&self, hook: impl Fn() + Send + 'static) {
        self.svid.set_rotation_finished_hook(hook);
    }

    #[must_use]
    pub fn matching_identities(&self, selectors: &Selectors) -> Vec<WorkloadIdentity> {
        self.cache.matching_identities(selectors)
    }

    #[must_use]
    pub fn fetch_workload_update(&self, selectors: &Selectors) -> WorkloadUpdate {
        self.cache.fetch_workload_update(selectors)
    }

    /// Returns a JWT-SVID for the spiffe id and audiences, serving from the
    /// sub-cache when the cached document is not about to expire and
    /// falling back to the cached copy when the server cannot renew a
    /// still-valid one.
    pub async fn fetch_jwt_svid(
        &self,
        spiffe_id: &SPIFFEID,
        audiences: &[String],
    ) -> Result<JWTSVIDCompact, Error> {
        self.fetch_jwt_svid_inner(spiffe_id, audiences, get_epoch_time())
            .await
    }

    async fn fetch_jwt_svid_inner(
        &self,
        spiffe_id: &SPIFFEID,
        audiences: &[String],
        now: u64,
    ) -> Result<JWTSVIDCompact, Error> {
        let audiences = jwt_cache::canonical_audiences(audiences);

        let cached = self.jwt_svids.get(spiffe_id, &audiences);
        if let Some(cached) = &cached {
            if !rotation::jwt_svid_expires_soon(cached, now) {
                return Ok(cached.clone());
            }
        }

        let entry_id = if self.experimental_api_enabled {
            let entry_id = self
                .entry_id_for(spiffe_id)
                .ok_or_else(|| Error::NoEntryFound(spiffe_id.to_string()))?;
            Some(entry_id)
        } else {
            None
        };

        let request = fetch_jwt_svid::Request {
            spiffe_id: spiffe_id.clone(),
            audiences: audiences.clone(),
            entry_id,
        };

        match self.client.fetch_jwt_svid(request).await {
            Ok(response) => {
                self.jwt_svids
                    .set(spiffe_id, &audiences, response.jwt_svid.clone());
                Ok(response.jwt_svid)
            }
            Err(err) => match cached {
                None => Err(Error::FetchJWTSVID(err)),
                Some(cached) if rotation::jwt_svid_expired(&cached, now) => {
                    Err(Error::RenewJWTSVID(spiffe_id.to_string(), err))
                }
                Some(cached) => {
                    warn!(
                        "Unable to renew JWT-SVID for {}, returning cached copy: {}",
                        spiffe_id, err
                    );
                    Ok(cached)
                }
            },
        }
    }

    fn entry_id_for(&self, spiffe_id: &SPIFFEID) -> Option<String> {
        self.cache
            .identities()
            .into_iter()
            .find(|identity| identity.entry.spiffe_id == *spiffe_id)
            .map(|identity| identity.entry.id)
    }

    async fn run_synchronizer(&self, cancel: CancellationToken) -> Result<(), Error> {
        loop {
            let wait = self.backoff.lock().await.next_wait();
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = sleep(wait) => {}
            }

            // Racing the cycle against cancellation drops it mid-call;
            // updates are applied only after the server responded.
            let result = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                result = self.synchronize() => result,
            };

            match result {
                Ok(()) => self.backoff.lock().await.reset(),
                Err(err) => error!("Synchronize failed: {}", err),
            }
        }
    }

    async fn run_svid_observer(&self, cancel: CancellationToken) -> Result<(), Error> {
        let mut svid_stream = self.subscribe_to_svid_changes();
        // Re-persist the state that existed before this loop started.
        svid_stream.mark_changed();

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                changed = svid_stream.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }

                    let state = svid_stream.borrow_and_update().clone();

                    // Keys and chains must stay consistent across restart:
                    // the chain is not written when the key store fails.
                    if let Err(err) = self.store_private_key(&state.key).await {
                        error!("Failed to store the private key: {}", err);
                        continue;
                    }

                    self.store_svid(&state.svid.cert_chain).await;
                }
            }
        }
    }

    async fn run_bundle_observer(&self, cancel: CancellationToken) -> Result<(), Error> {
        let mut bundle_stream = self.subscribe_to_bundle_changes();
        // Re-persist the snapshot that existed before this loop started.
        bundle_stream.mark_changed();

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                changed = bundle_stream.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }

                    let roots = bundle_stream
                        .borrow_and_update()
                        .get(&self.trust_domain)
                        .cloned()
                        .unwrap_or_default();

                    self.store_bundle(&roots).await;
                }
            }
        }
    }

    async fn store_svid(&self, chain: &[Certificate]) {
        if let Err(err) = storage::store_svid(&self.svid_cache_path, chain).await {
            warn!("Could not store the agent SVID: {}", err);
        }
    }

    async fn store_bundle(&self, roots: &[Certificate]) {
        if let Err(err) = storage::store_bundle(&self.bundle_cache_path, roots).await {
            error!("Could not store the trust bundle: {}", err);
        }
    }

    async fn store_private_key(
        &self,
        key: &PrivateKey,
    ) -> Result<(), Box<dyn std::error::Error + Send>> {
        let key_manager = self.catalog.key_manager();

        key_manager.store_private_key(key.der.clone()).await
    }
}
