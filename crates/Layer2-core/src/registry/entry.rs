//! Registry Entry - 레지스트리 항목, 검색 필터, 통계

use chrono::{DateTime, Utc};
use plugrun_foundation::{PluginMetadata, PluginState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// RegistryEntry
// ============================================================================

/// 등록된 플러그인 한 건
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub metadata: PluginMetadata,

    /// 라이프사이클과 동기화되는 상태
    pub status: PluginState,

    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl RegistryEntry {
    pub fn new(metadata: PluginMetadata) -> Self {
        let now = Utc::now();
        Self {
            metadata,
            status: PluginState::Loaded,
            registered_at: now,
            updated_at: now,
            last_heartbeat: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// 상태 변경 (updated_at 갱신)
    pub fn set_status(&mut self, status: PluginState) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// PluginFilter
// ============================================================================

/// `find` 조건 - 지정된 조건은 모두 만족해야 한다
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginFilter {
    pub category: Option<String>,

    /// 모두 포함해야 함
    #[serde(default)]
    pub tags: Vec<String>,

    pub author: Option<String>,
    pub version: Option<String>,
    pub state: Option<PluginState>,

    /// 모두 선언되어 있어야 함
    #[serde(default)]
    pub permissions: Vec<String>,

    /// 이름/설명/작성자 부분 일치 (대소문자 무시)
    pub search: Option<String>,
}

impl PluginFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn state(mut self, state: PluginState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn matches(&self, entry: &RegistryEntry) -> bool {
        let meta = &entry.metadata;

        if let Some(ref category) = self.category {
            if &meta.category != category {
                return false;
            }
        }

        if !self.tags.iter().all(|t| meta.tags.contains(t)) {
            return false;
        }

        if let Some(ref author) = self.author {
            if &meta.author != author {
                return false;
            }
        }

        if let Some(ref version) = self.version {
            if &meta.version != version {
                return false;
            }
        }

        if let Some(state) = self.state {
            if entry.status != state {
                return false;
            }
        }

        if !self.permissions.iter().all(|p| meta.permissions.contains(p)) {
            return false;
        }

        if let Some(ref text) = self.search {
            let needle = text.to_lowercase();
            let hit = [&meta.name, &meta.description, &meta.author]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }

        true
    }
}

// ============================================================================
// RegistryStats
// ============================================================================

/// 레지스트리 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
    pub by_category: HashMap<String, usize>,
}
