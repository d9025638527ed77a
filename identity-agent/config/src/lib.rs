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

use std::{fs, io, path::Path};

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(alias = "trust-domain")]
    pub trust_domain: String,
    #[serde(alias = "sync-interval-sec")]
    pub sync_interval_sec: u64,
    #[serde(alias = "svid-cache-path")]
    pub svid_cache_path: String,
    #[serde(alias = "bundle-cache-path")]
    pub bundle_cache_path: String,
    #[serde(alias = "rotator-renew-margin-percent")]
    pub rotator_renew_margin_percent: Option<u64>,
    #[serde(alias = "experimental-api-enabled", default)]
    pub experimental_api_enabled: bool,

    #[serde(alias = "server-config")]
    pub server_config: ServerConfig,
    #[serde(alias = "key-manager-config")]
    pub key_manager_config: KeyManagerConfig,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", content = "content", rename_all = "UPPERCASE")]
pub enum KeyManagerConfig {
    Disk(KeyManagerConfigDisk),
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct KeyManagerConfigDisk {
    pub key_base_path: String,
}

impl Config {
    pub fn load_config(filename: impl AsRef<Path>) -> Result<Config, io::Error> {
        let config = fs::read_to_string(&filename)?;

        let config = toml::from_str(&config)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Read};

    use super::*;

    #[test]
    fn test_read_all() {
        let test_files_directory =
            std::path::Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests"));

        for test_file in std::fs::read_dir(test_files_directory).unwrap() {
            let test_file = test_file.unwrap();
            if test_file.file_type().unwrap().is_dir() {
                continue;
            }
            let test_file = test_file.path();

            println!("Parsing deployment file {:#?}", test_file);
            let mut raw_config = File::open(&test_file).unwrap();
            let mut buf = Vec::new();
            raw_config.read_to_end(&mut buf).unwrap();

            let _config: Config = toml::from_slice(&buf).unwrap();
        }
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str(
            r#"
            trust_domain = "example.org"
            sync-interval-sec = 5
            svid-cache-path = "/var/lib/agent/svid.der"
            bundle-cache-path = "/var/lib/agent/bundle.der"

            [server-config]
            address = "localhost"
            port = 8443

            [key-manager-config]
            type = "DISK"
            content = { key_base_path = "/var/lib/agent/keys" }
            "#,
        )
        .unwrap();

        assert!(!config.experimental_api_enabled);
        assert!(config.rotator_renew_margin_percent.is_none());
        assert_eq!(config.sync_interval_sec, 5);
    }
}
