//! Registry Snapshot - Export/Import 포맷

use super::entry::RegistryEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 현재 Export 포맷 버전
pub const EXPORT_VERSION: u32 = 1;

/// 전체 엔트리 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub entries: Vec<RegistryEntry>,
}

impl RegistryExport {
    pub fn new(mut entries: Vec<RegistryEntry>) -> Self {
        entries.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        Self {
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
