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

mod error;

use std::error::Error as StdError;
use std::time::Duration;

use agent_config::Config;
use cache_manager::{rotator, Manager};
use catalog::load_catalog;
use core_objects::{PrivateKey, SPIFFEID};
use error::Error;
use log::{error, info};
use server_client::ServerClientFactory;
use tokio_util::sync::CancellationToken;

const CONFIG_DEFAULT_PATH: &str = "/etc/identity-agent/Config.toml";
const AGENT_SPIFFE_ID_PATH: &str = "agent";

#[tokio::main]
async fn main() {
    env_logger::try_init()
        .expect("cannot fail to initialize global logger from the process entrypoint");

    info!("Starting workload identity agent");
    if let Err(err) = main_inner().await {
        error!("{}", err);

        let mut source = std::error::Error::source(&*err);
        while let Some(err) = source {
            error!("caused by: {}", err);
            source = std::error::Error::source(err);
        }

        std::process::exit(1);
    }
}

async fn main_inner() -> Result<(), Box<dyn StdError>> {
    let config = Config::load_config(CONFIG_DEFAULT_PATH).map_err(Error::ParsingConfig)?;

    let client =
        ServerClientFactory::get(&config.server_config).map_err(Error::CreatingServerClient)?;
    let catalog = load_catalog(&config.key_manager_config);

    let agent_spiffe_id = SPIFFEID {
        trust_domain: config.trust_domain.clone(),
        path: AGENT_SPIFFE_ID_PATH.to_string(),
    };

    // Reuse the key from a previous run when the key manager still has it.
    let svid_key = match catalog
        .key_manager()
        .get_private_key()
        .await
        .map_err(Error::GettingPrivateKey)?
    {
        Some(der) => PrivateKey { der },
        None => rotator::generate_key().map_err(Error::GeneratingKey)?,
    };

    let svid = rotator::fetch_initial_svid(client.as_ref(), &agent_spiffe_id, &svid_key)
        .await
        .map_err(Error::FetchingInitialSVID)?;
    info!("Attested as {}", svid.spiffe_id);

    let manager = Manager::new(cache_manager::Config {
        trust_domain: config.trust_domain,
        sync_interval: Duration::from_secs(config.sync_interval_sec),
        svid,
        svid_key,
        bundle: Vec::new(),
        svid_cache_path: config.svid_cache_path,
        bundle_cache_path: config.bundle_cache_path,
        renew_margin_percent: config.rotator_renew_margin_percent,
        experimental_api_enabled: config.experimental_api_enabled,
        client,
        catalog,
    })
    .map_err(Error::CreatingManager)?;

    manager.initialize().await.map_err(Error::InitializingManager)?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_cancel.cancel();
        }
    });

    manager.run(cancel).await.map_err(Error::RunningManager)?;

    Ok(())
}
