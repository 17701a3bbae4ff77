/*!
 * Agent Errors
 */

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::bus::BusError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Could not connect to the system bus: {0}")]
    Connect(#[source] BusError),

    #[error("Could not start discovery: {0}")]
    Discovery(#[source] BusError),

    #[error("Invalid configuration {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("Trusted key file {}: {source}", path.display())]
    Keys {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AgentError {
    /// Errors after which the agent has no reason to keep running.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Discovery(_))
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
