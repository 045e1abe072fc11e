use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Relay shapes
// ---------------------------------------------------------------------------

/// One entry of a discovery listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub name: String,
    pub uid: String,
}

/// Terminal outcome of one pairing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PairResponse {
    Token { token: String },
    Error { error: String },
}

impl<E: std::fmt::Display> From<Result<String, E>> for PairResponse {
    fn from(result: Result<String, E>) -> Self {
        match result {
            Ok(token) => PairResponse::Token { token },
            Err(e) => PairResponse::Error {
                error: e.to_string(),
            },
        }
    }
}

/// Extracts the uid from a `name:uid` device selector.
///
/// Returns `None` when the selector has no non-empty second field.
pub fn parse_device_selector(selector: &str) -> Option<&str> {
    selector.split(':').nth(1).filter(|uid| !uid.is_empty())
}

// ---------------------------------------------------------------------------
// Backend requests
// ---------------------------------------------------------------------------

/// Playback queue request issued once after a push connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackQueueRequest {
    pub location: u32,
    pub length: u32,
    pub include_metadata: bool,
    pub include_lyrics: bool,
    pub include_language_options: bool,
}

impl Default for PlaybackQueueRequest {
    fn default() -> Self {
        Self {
            location: 0,
            length: 1,
            include_metadata: true,
            include_lyrics: true,
            include_language_options: true,
        }
    }
}
