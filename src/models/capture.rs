use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Shift-start snapshot.
    Control,
    /// Shift-end snapshot.
    Current,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::Control => "control",
            CaptureKind::Current => "current",
        }
    }

    /// Directory under the image root.
    pub fn namespace(&self) -> &'static str {
        match self {
            CaptureKind::Control => "control",
            CaptureKind::Current => "captures",
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How captured image files are named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingScheme {
    /// `{room}-{session}-{sector}.png`
    #[default]
    RoomPrefixed,
    /// `{session}-{sector}.png`
    SessionOnly,
}

impl NamingScheme {
    /// File stem shared by every sector of one session. This is also the
    /// identifier handed to the detection API.
    pub fn session_stem(&self, room: &str, session_id: &str) -> String {
        match self {
            NamingScheme::RoomPrefixed => format!("{room}-{session_id}"),
            NamingScheme::SessionOnly => session_id.to_string(),
        }
    }

    pub fn file_name(&self, room: &str, session_id: &str, sector: u32) -> String {
        format!("{}-{sector}.png", self.session_stem(room, session_id))
    }
}

#[derive(Debug, Clone)]
pub struct ImageLayout {
    root: PathBuf,
    naming: NamingScheme,
}

impl ImageLayout {
    pub fn new(root: impl Into<PathBuf>, naming: NamingScheme) -> Self {
        Self {
            root: root.into(),
            naming,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn naming(&self) -> NamingScheme {
        self.naming
    }

    pub fn dir(&self, kind: CaptureKind) -> PathBuf {
        self.root.join(kind.namespace())
    }

    pub fn path_for(&self, kind: CaptureKind, room: &str, session_id: &str, sector: u32) -> PathBuf {
        self.dir(kind)
            .join(self.naming.file_name(room, session_id, sector))
    }
}

/// A frame written to disk by the capturer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}
