//! Node errors.

use kestrel_bft::ConsensusError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to install log subscriber: {0}")]
    Logging(String),

    #[error("Consensus runner already started")]
    AlreadyStarted,

    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}
