use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Kind of compute slot a work unit runs on.
///
/// GPU frames are reported far less often than CPU frames, so several
/// heuristics (hung detection, fallback frame times) branch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    #[default]
    Cpu,
    Gpu,
}

/// How a client is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientDescriptor {
    /// Connection-oriented client reached over the network.
    Network { host: String, port: u16 },
    /// Pull-based client whose log artifacts are read from a directory.
    Path { log_root: String },
}

impl ClientDescriptor {
    /// Stable display/storage form of the connection descriptor.
    pub fn path_string(&self) -> String {
        match self {
            ClientDescriptor::Network { host, port } => format!("{}:{}", host, port),
            ClientDescriptor::Path { log_root } => log_root.clone(),
        }
    }
}

/// Configured identity of one monitored client.
///
/// The name is the unique registry key; renaming a client is an atomic
/// remove-and-reinsert under a single registry write lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub name: String,
    pub descriptor: ClientDescriptor,
    /// Corrective offset applied to client-local timestamps, in minutes.
    #[serde(default)]
    pub clock_offset_minutes: i64,
    /// When set, the machine UTC offset is not applied to log times.
    #[serde(default)]
    pub ignore_utc_offset: bool,
}

impl ClientIdentity {
    /// Validate the settings; rejected settings must leave the registry
    /// untouched, so this runs before any insertion.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;

        match &self.descriptor {
            ClientDescriptor::Network { host, .. } if host.trim().is_empty() => Err(
                Error::InvalidClient("network client requires a host".to_string()),
            ),
            ClientDescriptor::Path { log_root } if log_root.trim().is_empty() => Err(
                Error::InvalidClient("path client requires a log directory".to_string()),
            ),
            _ => Ok(()),
        }
    }

    pub fn path_string(&self) -> String {
        self.descriptor.path_string()
    }
}

/// Client names become file name fragments and registry keys, so path
/// separators and control characters are rejected up front.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidClient("name must not be empty".to_string()));
    }

    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(Error::InvalidClient(format!(
            "name '{}' contains illegal characters",
            name
        )));
    }

    Ok(())
}
