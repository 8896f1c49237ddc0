//! Dependency Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 의존성 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    #[default]
    Plugin,
    Library,
    Service,
    Resource,
    Runtime,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Library => "library",
            Self::Service => "service",
            Self::Resource => "resource",
            Self::Runtime => "runtime",
        }
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 등록된 의존성 (name + version 키)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub name: String,
    pub version: String,

    #[serde(rename = "type", default)]
    pub dep_type: DependencyType,

    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    pub registered_at: DateTime<Utc>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dep_type: DependencyType::default(),
            provider: String::new(),
            description: String::new(),
            tags: Vec::new(),
            metadata: HashMap::new(),
            registered_at: Utc::now(),
        }
    }

    pub fn with_type(mut self, dep_type: DependencyType) -> Self {
        self.dep_type = dep_type;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// `name@version`
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// 의존성 요구사항 (저장하지 않고 요청 시 해석)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRequirement {
    pub name: String,

    /// 버전 제약식 (`*`, `>=1.2.0`, `~1.2.0`, `^1.0.0` ...)
    #[serde(default = "any_version")]
    pub constraint: String,

    #[serde(rename = "type", default)]
    pub dep_type: DependencyType,

    #[serde(default)]
    pub optional: bool,

    /// 예: `runtime`, `build`
    #[serde(default)]
    pub scope: String,
}

fn any_version() -> String {
    "*".to_string()
}

impl DependencyRequirement {
    pub fn new(name: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: constraint.into(),
            dep_type: DependencyType::default(),
            optional: false,
            scope: "runtime".to_string(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_type(mut self, dep_type: DependencyType) -> Self {
        self.dep_type = dep_type;
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// 메타데이터 선언 파싱: `name` 또는 `name@constraint`, 끝의 `?`는 선택적
    pub fn parse(declaration: &str) -> Self {
        let declaration = declaration.trim();
        let (declaration, optional) = match declaration.strip_suffix('?') {
            Some(rest) => (rest, true),
            None => (declaration, false),
        };

        let (name, constraint) = match declaration.split_once('@') {
            Some((name, constraint)) => (name.trim(), constraint.trim()),
            None => (declaration, "*"),
        };

        let mut req = Self::new(name, constraint);
        req.optional = optional;
        req
    }
}
