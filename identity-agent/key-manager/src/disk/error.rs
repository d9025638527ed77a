// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not create the key directory {0}")]
    CreateKeyDirectory(std::io::Error),
    #[error("Could not write the private key {0}")]
    WriteKey(std::io::Error),
    #[error("Could not read the private key {0}")]
    ReadKey(std::io::Error),
}
