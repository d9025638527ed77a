// Copyright (c) Microsoft. All rights reserved.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use core_objects::{get_epoch_time, PrivateKey, X509SVIDCompact, SPIFFEID};
use log::{info, warn};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::{X509NameBuilder, X509ReqBuilder};
use server_agent_api::renew_agent_svid;
use server_client::Client;
use tokio::sync::{watch, RwLock};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::error::Error;
use crate::rotation;

const ROTATION_RETRY_BASE: Duration = Duration::from_secs(5);

/// The agent's own credential. Replaced atomically; subscribers observe
/// only the latest generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvidState {
    pub svid: X509SVIDCompact,
    pub key: PrivateKey,
}

/// Owns the agent SVID and its key, and renews them before expiry.
pub struct SvidRotator {
    client: Arc<dyn Client>,
    state: watch::Sender<SvidState>,
    rotation_mtx: Arc<RwLock<()>>,
    rotation_finished_hook: Mutex<Option<Box<dyn Fn() + Send>>>,
    renew_margin_percent: u64,
}

impl SvidRotator {
    #[must_use]
    pub fn new(
        client: Arc<dyn Client>,
        initial_state: SvidState,
        renew_margin_percent: u64,
    ) -> Self {
        let (state, _) = watch::channel(initial_state);

        SvidRotator {
            client,
            state,
            rotation_mtx: Arc::new(RwLock::new(())),
            rotation_finished_hook: Mutex::new(None),
            renew_margin_percent,
        }
    }

    #[must_use]
    pub fn state(&self) -> SvidState {
        self.state.borrow().clone()
    }

    /// Held in write mode while the rotator swaps state; callers that must
    /// observe a consistent (chain, key) pair across multiple reads hold it
    /// in read mode.
    #[must_use]
    pub fn rotation_mtx(&self) -> Arc<RwLock<()>> {
        self.rotation_mtx.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SvidState> {
        self.state.subscribe()
    }

    pub fn set_rotation_finished_hook(&self, hook: impl Fn() + Send + 'static) {
        *self.rotation_finished_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Renews the SVID before each rotation deadline until cancelled. A
    /// renewal failure is retried with backoff bounded by the remaining
    /// validity; once the credential has expired the failure is fatal.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), Error> {
        loop {
            let wait = self.wait_until_rotation(get_epoch_time());
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = sleep(wait) => {}
            }

            let mut backoff = Backoff::new(ROTATION_RETRY_BASE);
            loop {
                let result = tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    result = self.rotate_svid() => result,
                };

                match result {
                    Ok(()) => break,
                    Err(err) => {
                        let now = get_epoch_time();
                        let expiry = self.state().svid.expiry;
                        if now >= expiry {
                            return Err(Error::SVIDExpired(Box::new(err)));
                        }

                        warn!("Could not rotate the agent SVID, retrying: {}", err);
                        let remaining = Duration::from_secs(expiry - now);
                        let wait = backoff.next_wait().min(remaining);
                        tokio::select! {
                            () = cancel.cancelled() => return Ok(()),
                            () = sleep(wait) => {}
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn wait_until_rotation(&self, now: u64) -> Duration {
        let deadline =
            rotation::x509_rotation_deadline(&self.state().svid, self.renew_margin_percent);

        Duration::from_secs(deadline.saturating_sub(now))
    }

    /// One renewal: fresh key, CSR, issuer round-trip, atomic state swap.
    pub(crate) async fn rotate_svid(&self) -> Result<(), Error> {
        info!("Rotating agent SVID");

        let key = generate_key()?;
        let csr = build_csr(&key, &self.state().svid.spiffe_id)?;

        let response = self
            .client
            .renew_agent_svid(renew_agent_svid::Request { csr })
            .await
            .map_err(Error::RenewAgentSVID)?;

        {
            let _rotation = self.rotation_mtx.write().await;
            self.state.send_replace(SvidState {
                svid: response.svid,
                key,
            });
        }

        if let Some(hook) = &*self.rotation_finished_hook.lock().unwrap() {
            hook();
        }

        Ok(())
    }
}

/// Obtains the agent's first SVID from the issuer by signing a CSR with
/// `key`. Used at startup, before a rotator exists.
pub async fn fetch_initial_svid(
    client: &dyn Client,
    spiffe_id: &SPIFFEID,
    key: &PrivateKey,
) -> Result<X509SVIDCompact, Error> {
    let csr = build_csr(key, spiffe_id)?;

    let response = client
        .renew_agent_svid(renew_agent_svid::Request { csr })
        .await
        .map_err(Error::RenewAgentSVID)?;

    Ok(response.svid)
}

/// Generates a fresh EC P-256 key, DER-encoded.
pub fn generate_key() -> Result<PrivateKey, Error> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).map_err(Error::KeyGeneration)?;
    let ec_key = EcKey::generate(&group).map_err(Error::KeyGeneration)?;
    let key = PKey::from_ec_key(ec_key).map_err(Error::KeyGeneration)?;

    let der = key.private_key_to_der().map_err(Error::KeyGeneration)?;

    Ok(PrivateKey { der })
}

/// Builds a DER-encoded certificate signing request for the agent's
/// spiffe id, signed with `key`.
pub fn build_csr(key: &PrivateKey, spiffe_id: &SPIFFEID) -> Result<Vec<u8>, Error> {
    let key = PKey::private_key_from_der(&key.der).map_err(Error::CsrGeneration)?;

    let mut subject = X509NameBuilder::new().map_err(Error::CsrGeneration)?;
    subject
        .append_entry_by_text("CN", &spiffe_id.to_string())
        .map_err(Error::CsrGeneration)?;
    let subject = subject.build();

    let mut request = X509ReqBuilder::new().map_err(Error::CsrGeneration)?;
    request
        .set_subject_name(&subject)
        .map_err(Error::CsrGeneration)?;
    request.set_pubkey(&key).map_err(Error::CsrGeneration)?;
    request
        .sign(&key, MessageDigest::sha256())
        .map_err(Error::CsrGeneration)?;

    request.build().to_der().map_err(Error::CsrGeneration)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use matches::assert_matches;
    use server_client::MockClient;

    use crate::test_util::{agent_svid, spiffe_id};

    use super::*;

    fn init_rotator(mock_client: MockClient, issued_at: u64, expiry: u64) -> SvidRotator {
        let key = generate_key().unwrap();

        SvidRotator::new(
            Arc::new(mock_client),
            SvidState {
                svid: agent_svid(issued_at, expiry),
                key,
            },
            50,
        )
    }

    #[tokio::test]
    async fn rotate_svid_replaces_state_and_publishes() {
        let mut mock_client = MockClient::new();

        let new_svid = agent_svid(600, 1200);
        let response_svid = new_svid.clone();
        mock_client.expect_renew_agent_svid().return_once(move |_| {
            Ok(renew_agent_svid::Response {
                svid: response_svid,
            })
        });

        let rotator = init_rotator(mock_client, 0, 600);
        let old_key = rotator.state().key;
        let mut stream = rotator.subscribe();

        let hook_calls = Arc::new(AtomicUsize::new(0));
        let hook_calls_counter = hook_calls.clone();
        rotator.set_rotation_finished_hook(move || {
            hook_calls_counter.fetch_add(1, Ordering::SeqCst);
        });

        rotator.rotate_svid().await.unwrap();

        let state = rotator.state();
        assert_eq!(state.svid, new_svid);
        assert_ne!(state.key, old_key);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);

        assert!(stream.has_changed().unwrap());
        let published = stream.borrow_and_update().clone();
        assert_eq!(published, state);
    }

    #[tokio::test]
    async fn rotate_svid_failure_leaves_state_untouched() {
        let mut mock_client = MockClient::new();
        mock_client.expect_renew_agent_svid().return_once(|_| {
            Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "dummy",
            )) as _)
        });

        let rotator = init_rotator(mock_client, 0, 600);
        let old_state = rotator.state();

        let error = rotator.rotate_svid().await.unwrap_err();

        assert_matches!(error, Error::RenewAgentSVID(_));
        assert_eq!(rotator.state(), old_state);
    }

    #[tokio::test]
    async fn rotation_waits_for_the_renew_margin() {
        let rotator = init_rotator(MockClient::new(), 1000, 1600);

        // Half of the lifetime is left at 1300.
        assert_eq!(
            rotator.wait_until_rotation(1000),
            Duration::from_secs(300)
        );
        assert_eq!(rotator.wait_until_rotation(1301), Duration::ZERO);
    }

    #[tokio::test]
    async fn run_returns_on_cancellation() {
        let rotator = init_rotator(MockClient::new(), 0, u64::MAX);

        let cancel = CancellationToken::new();
        cancel.cancel();

        rotator.run(cancel).await.unwrap();
    }

    #[test]
    fn generated_keys_are_unique_and_parseable() {
        let first = generate_key().unwrap();
        let second = generate_key().unwrap();

        assert_ne!(first, second);
        PKey::private_key_from_der(&first.der).unwrap();
    }

    #[test]
    fn csr_is_signed_with_the_given_key() {
        let key = generate_key().unwrap();
        let id = spiffe_id("agent");

        let csr = build_csr(&key, &id).unwrap();
        assert!(!csr.is_empty());

        let request = openssl::x509::X509Req::from_der(&csr).unwrap();
        let public_key = PKey::private_key_from_der(&key.der).unwrap();
        assert!(request.verify(&public_key).unwrap());
    }
}
