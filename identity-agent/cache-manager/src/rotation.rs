// Copyright (c) Microsoft. All rights reserved.

use core_objects::{JWTSVIDCompact, X509SVIDCompact};

/// Window before expiry in which a cached JWT-SVID is renewed proactively
/// instead of being served as-is.
pub const JWT_SVID_EXPIRES_SOON_SEC: u64 = 30;

#[must_use]
pub fn jwt_svid_expires_soon(svid: &JWTSVIDCompact, now: u64) -> bool {
    now + JWT_SVID_EXPIRES_SOON_SEC >= svid.expiry
}

#[must_use]
pub fn jwt_svid_expired(svid: &JWTSVIDCompact, now: u64) -> bool {
    now >= svid.expiry
}

/// Epoch second at which the agent SVID is due for renewal: the configured
/// percentage of the document lifetime, measured from issuance.
#[must_use]
pub fn x509_rotation_deadline(svid: &X509SVIDCompact, renew_margin_percent: u64) -> u64 {
    let lifetime = svid.expiry.saturating_sub(svid.issued_at);
    svid.issued_at
        .saturating_add(lifetime.saturating_mul(renew_margin_percent) / 100)
}

#[cfg(test)]
mod tests {
    use core_objects::{Certificate, SPIFFEID};

    use super::*;

    fn jwt_svid(issued_at: u64, expiry: u64) -> JWTSVIDCompact {
        JWTSVIDCompact {
            token: "token".to_string(),
            spiffe_id: SPIFFEID {
                trust_domain: "td".to_string(),
                path: "workload".to_string(),
            },
            expiry,
            issued_at,
        }
    }

    fn x509_svid(issued_at: u64, expiry: u64) -> X509SVIDCompact {
        X509SVIDCompact {
            cert_chain: vec![Certificate { der: vec![1] }],
            spiffe_id: SPIFFEID {
                trust_domain: "td".to_string(),
                path: "agent".to_string(),
            },
            expiry,
            issued_at,
        }
    }

    #[test]
    fn jwt_svid_within_the_soft_expiry_window_expires_soon() {
        let svid = jwt_svid(1000, 1010);

        assert!(jwt_svid_expires_soon(&svid, 1000));
    }

    #[test]
    fn jwt_svid_outside_the_soft_expiry_window_is_fresh() {
        let svid = jwt_svid(1000, 1300);

        assert!(!jwt_svid_expires_soon(&svid, 1000));
        assert!(!jwt_svid_expired(&svid, 1000));
    }

    #[test]
    fn jwt_svid_expiry_is_inclusive() {
        let svid = jwt_svid(1000, 1300);

        assert!(!jwt_svid_expired(&svid, 1299));
        assert!(jwt_svid_expired(&svid, 1300));
        assert!(jwt_svid_expired(&svid, 1301));
    }

    #[test]
    fn rotation_deadline_is_half_life_at_the_default_margin() {
        let svid = x509_svid(1000, 1600);

        assert_eq!(x509_rotation_deadline(&svid, 50), 1300);
    }

    #[test]
    fn rotation_deadline_honors_the_configured_margin() {
        let svid = x509_svid(1000, 1600);

        assert_eq!(x509_rotation_deadline(&svid, 25), 1150);
        assert_eq!(x509_rotation_deadline(&svid, 100), 1600);
    }
}
