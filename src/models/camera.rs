use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Camera record returned by the link resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraLink {
    /// Store-assigned identifier; its shape depends on the backing store.
    #[serde(default)]
    pub id: Value,
    pub room: String,
    pub sector: u32,
    pub link: String,
}
