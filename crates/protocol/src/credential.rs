//! Device credentials.
//!
//! Native tokens are five colon-separated fields:
//! `uniqueIdentifier:identifier:pairingIdHex:publicKeyHex:encryptionKeyHex`.
//! Poll credentials are a pair of named sub-credentials.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors from credential parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CredentialError {
    #[error("token is empty")]
    Empty,

    #[error("token has {0} fields, expected 5")]
    FieldCount(usize),

    #[error("token field {field} is not valid hex")]
    InvalidHex { field: &'static str },

    #[error("poll credential needs an airplay or companion token")]
    MissingSubCredential,
}

/// Long-lived credential issued by a native pairing.
#[derive(Clone, PartialEq, Eq)]
pub struct NativeCredential {
    pub unique_identifier: String,
    pub identifier: String,
    pub pairing_id: Vec<u8>,
    pub public_key: Vec<u8>,
    pub encryption_key: Vec<u8>,
}

impl NativeCredential {
    /// The device unique identifier embedded in the token.
    pub fn unique_identifier(&self) -> &str {
        &self.unique_identifier
    }
}

impl FromStr for NativeCredential {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CredentialError::Empty);
        }
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 5 {
            return Err(CredentialError::FieldCount(parts.len()));
        }
        if parts[0].is_empty() {
            return Err(CredentialError::Empty);
        }
        let decode = |field: &'static str, value: &str| {
            hex::decode(value).map_err(|_| CredentialError::InvalidHex { field })
        };
        Ok(Self {
            unique_identifier: parts[0].to_string(),
            identifier: parts[1].to_string(),
            pairing_id: decode("pairingId", parts[2])?,
            public_key: decode("publicKey", parts[3])?,
            encryption_key: decode("encryptionKey", parts[4])?,
        })
    }
}

impl fmt::Display for NativeCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.unique_identifier,
            self.identifier,
            hex::encode(&self.pairing_id),
            hex::encode(&self.public_key),
            hex::encode(&self.encryption_key)
        )
    }
}

// Keys stay out of logs.
impl fmt::Debug for NativeCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCredential")
            .field("unique_identifier", &self.unique_identifier)
            .finish_non_exhaustive()
    }
}

/// Named sub-credentials for the poll backend.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airplay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion: Option<String>,
}

impl PollCredential {
    pub fn new(airplay: Option<String>, companion: Option<String>) -> Result<Self, CredentialError> {
        let airplay = airplay.filter(|s| !s.trim().is_empty());
        let companion = companion.filter(|s| !s.trim().is_empty());
        if airplay.is_none() && companion.is_none() {
            return Err(CredentialError::MissingSubCredential);
        }
        Ok(Self { airplay, companion })
    }
}

impl fmt::Debug for PollCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollCredential")
            .field("airplay", &self.airplay.is_some())
            .field("companion", &self.companion.is_some())
            .finish()
    }
}

/// Backend-specific credential consumed to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Native(NativeCredential),
    Poll(PollCredential),
}
