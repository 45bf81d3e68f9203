use serde::{Deserialize, Serialize};
use std::fmt;

/// The three artefacts every backup job produces, in stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    #[serde(rename = "En")]
    EncryptedDb,
    #[serde(rename = "De")]
    DecryptedDb,
    #[serde(rename = "Re")]
    ResourceArchive,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [
        ResourceType::EncryptedDb,
        ResourceType::DecryptedDb,
        ResourceType::ResourceArchive,
    ];

    pub fn index(self) -> usize {
        match self {
            ResourceType::EncryptedDb => 0,
            ResourceType::DecryptedDb => 1,
            ResourceType::ResourceArchive => 2,
        }
    }

    /// File-name prefix used by the remote side (`EnMicroMsg.db`, `DeMicroMsg.db`, `Resource`).
    pub fn prefix(self) -> &'static str {
        match self {
            ResourceType::EncryptedDb => "En",
            ResourceType::DecryptedDb => "De",
            ResourceType::ResourceArchive => "Re",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.prefix() == prefix)
    }

    /// Classifies a listed path by the first two characters of its file name.
    pub fn classify_path(path: &str) -> Option<Self> {
        let name = file_name(path);
        name.get(..2).and_then(Self::from_prefix)
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceType::EncryptedDb => "Encryption database",
            ResourceType::DecryptedDb => "Decryption database",
            ResourceType::ResourceArchive => "Resource",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    Queued,
    InProgress,
    Done,
}

/// Status and transfer progress of one resource of one project.
///
/// `status` is only written by the owning [`crate::Pipeline`]; everything
/// else is plain progress data refreshed from reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub resource: ResourceType,
    status: ItemStatus,
    pub path: String,
    pub file_name: String,
    pub byte_total: u64,
    pub byte_current: u64,
    pub progress: f64,
    pub step_label: String,
    /// Only meaningful for [`ResourceType::ResourceArchive`].
    pub step_index: i64,
    pub failed: bool,
}

impl ItemRecord {
    pub fn new(resource: ResourceType) -> Self {
        Self {
            resource,
            status: ItemStatus::Queued,
            path: String::new(),
            file_name: String::new(),
            byte_total: 0,
            byte_current: 0,
            progress: 0.0,
            step_label: String::new(),
            step_index: 0,
            failed: false,
        }
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ItemStatus) {
        self.status = status;
    }

    pub fn set_file(&mut self, path: &str, byte_total: u64) {
        self.file_name = file_name(path).to_string();
        self.path = path.to_string();
        self.byte_total = byte_total;
    }

    pub fn clear_file(&mut self) {
        self.byte_total = 0;
        self.byte_current = 0;
    }

    pub fn size_label(&self) -> String {
        format_megabytes(self.byte_total)
    }

    pub fn current_label(&self) -> String {
        format_megabytes(self.byte_current)
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Formats a byte count as megabytes truncated (not rounded) to two decimals.
pub fn format_megabytes(bytes: u64) -> String {
    let hundredths = bytes.saturating_mul(100) / (1024 * 1024);
    format!("{}.{:02} MB", hundredths / 100, hundredths % 100)
}

/// Formats a completion fraction as a percentage truncated to two decimals.
pub fn format_percent(fraction: f64) -> String {
    let hundredths = (fraction.clamp(0.0, 1.0) * 10_000.0).floor() as u64;
    format!("{}.{:02}%", hundredths / 100, hundredths % 100)
}
