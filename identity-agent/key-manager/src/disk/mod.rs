// Copyright (c) Microsoft. All rights reserved.

pub mod error;

use std::path::{Path, PathBuf};

use agent_config::KeyManagerConfigDisk;
use error::Error;
use tokio::fs;

use crate::KeyManager as KeyManagerTrait;

const AGENT_KEY_FILE_NAME: &str = "agent-key.der";

pub struct KeyManager {
    key_base_path: PathBuf,
}

impl KeyManager {
    #[must_use]
    pub fn new(config: &KeyManagerConfigDisk) -> Self {
        let key_base_path = Path::new(&config.key_base_path).to_path_buf();
        KeyManager { key_base_path }
    }

    fn get_key_path(&self) -> PathBuf {
        let mut path = self.key_base_path.clone();
        path.push(AGENT_KEY_FILE_NAME);

        path
    }
}

#[async_trait::async_trait]
impl KeyManagerTrait for KeyManager {
    async fn store_private_key(
        &self,
        key: Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error + Send>> {
        fs::create_dir_all(&self.key_base_path)
            .await
            .map_err(|err| Box::new(Error::CreateKeyDirectory(err)) as _)?;

        fs::write(self.get_key_path(), key)
            .await
            .map_err(|err| Box::new(Error::WriteKey(err)) as _)
    }

    async fn get_private_key(
        &self,
    ) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error + Send>> {
        match fs::read(self.get_key_path()).await {
            Ok(key) => Ok(Some(key)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Box::new(Error::ReadKey(err)) as _),
        }
    }
}
