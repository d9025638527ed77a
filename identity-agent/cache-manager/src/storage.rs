// Copyright (c) Microsoft. All rights reserved.

use std::path::Path;

use core_objects::Certificate;
use tokio::fs;

/// Writes the SVID chain to `path` as concatenated DER, leaf first.
pub(crate) async fn store_svid(
    path: impl AsRef<Path>,
    chain: &[Certificate],
) -> Result<(), std::io::Error> {
    fs::write(path, concat_der(chain)).await
}

/// Writes the trust roots to `path` as concatenated DER.
pub(crate) async fn store_bundle(
    path: impl AsRef<Path>,
    roots: &[Certificate],
) -> Result<(), std::io::Error> {
    fs::write(path, concat_der(roots)).await
}

fn concat_der(certificates: &[Certificate]) -> Vec<u8> {
    let mut der = Vec::new();
    for certificate in certificates {
        der.extend_from_slice(&certificate.der);
    }

    der
}

#[cfg(test)]
mod tests {
    use crate::test_util::certificate;

    use super::*;

    #[tokio::test]
    async fn store_svid_concatenates_the_chain_leaf_first() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("svid.der");

        store_svid(&path, &[certificate(b"leaf"), certificate(b"root")])
            .await
            .unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, b"leafroot");
    }

    #[tokio::test]
    async fn store_bundle_overwrites_the_previous_roots() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bundle.der");

        store_bundle(&path, &[certificate(b"root1")]).await.unwrap();
        store_bundle(&path, &[certificate(b"root2")]).await.unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, b"root2");
    }

    #[tokio::test]
    async fn store_to_a_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing").join("svid.der");

        let result = store_svid(&path, &[certificate(b"leaf")]).await;

        assert!(result.is_err());
    }
}
