//! Dependency Manager - 버전 해석, 충돌/순환 검출

use super::types::{Dependency, DependencyRequirement};
use super::version::{compare_versions, VersionConstraint};
use parking_lot::RwLock;
use plugrun_foundation::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// 의존성 매니저
///
/// 해석은 전부 성공하거나 전부 실패한다. 일부만 해석된 목록은 반환하지 않는다.
pub struct DependencyManager {
    /// name -> (version -> Dependency)
    dependencies: RwLock<HashMap<String, HashMap<String, Dependency>>>,

    /// 플러그인별 요구사항 (순환 검사용 그래프)
    requirements: RwLock<HashMap<String, Vec<DependencyRequirement>>>,
}

impl DependencyManager {
    pub fn new() -> Self {
        Self {
            dependencies: RwLock::new(HashMap::new()),
            requirements: RwLock::new(HashMap::new()),
        }
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// 의존성 등록 - 같은 name+version은 `AlreadyExists`
    pub fn register_dependency(&self, dependency: Dependency) -> Result<()> {
        if dependency.name.trim().is_empty() {
            return Err(Error::InvalidInput("dependency name is required".into()));
        }
        if dependency.version.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "dependency {} has no version",
                dependency.name
            )));
        }

        let mut all = self.dependencies.write();
        let versions = all.entry(dependency.name.clone()).or_default();
        if versions.contains_key(&dependency.version) {
            return Err(Error::AlreadyExists(format!("dependency {}", dependency.key())));
        }

        debug!(dependency = %dependency.key(), "Registered dependency");
        versions.insert(dependency.version.clone(), dependency);
        Ok(())
    }

    pub fn unregister_dependency(&self, name: &str, version: &str) -> Result<Dependency> {
        let mut all = self.dependencies.write();
        let versions = all
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("dependency {}@{}", name, version)))?;
        let removed = versions
            .remove(version)
            .ok_or_else(|| Error::NotFound(format!("dependency {}@{}", name, version)))?;

        if versions.is_empty() {
            all.remove(name);
        }
        Ok(removed)
    }

    pub fn get_dependency(&self, name: &str, version: &str) -> Result<Dependency> {
        self.dependencies
            .read()
            .get(name)
            .and_then(|versions| versions.get(version))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("dependency {}@{}", name, version)))
    }

    /// 이름 순, 같은 이름은 버전 오름차순
    pub fn list_dependencies(&self, name: Option<&str>) -> Vec<Dependency> {
        let all = self.dependencies.read();
        let mut list: Vec<Dependency> = all
            .iter()
            .filter(|(n, _)| name.map_or(true, |wanted| wanted == n.as_str()))
            .flat_map(|(_, versions)| versions.values().cloned())
            .collect();

        list.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| compare_versions(&a.version, &b.version))
        });
        list
    }

    // ========================================================================
    // 해석
    // ========================================================================

    /// 요구사항마다 제약을 만족하는 가장 높은 버전 선택
    ///
    /// 필수 요구사항을 못 찾으면 `DependencyNotFound`, 같은 이름이 다른 버전으로
    /// 해석되면 `DependencyConflict`.
    pub fn resolve_dependencies(
        &self,
        requirements: &[DependencyRequirement],
    ) -> Result<Vec<Dependency>> {
        let all = self.dependencies.read();
        let mut resolved: Vec<Dependency> = Vec::new();

        for req in requirements {
            let constraint = VersionConstraint::parse(&req.constraint)?;

            let best = all.get(&req.name).and_then(|versions| {
                versions
                    .values()
                    .filter(|d| constraint.matches(&d.version))
                    .max_by(|a, b| compare_versions(&a.version, &b.version))
            });

            match best {
                Some(dep) => resolved.push(dep.clone()),
                None if req.optional => {
                    warn!(
                        dependency = %req.name,
                        constraint = %req.constraint,
                        "Optional dependency not satisfied, skipping"
                    );
                }
                None => {
                    return Err(Error::DependencyNotFound {
                        name: req.name.clone(),
                        constraint: req.constraint.clone(),
                    });
                }
            }
        }
        drop(all);

        // 같은 이름 -> 서로 다른 버전이면 충돌
        let mut by_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for dep in &resolved {
            let versions = by_name.entry(dep.name.clone()).or_default();
            if !versions.contains(&dep.version) {
                versions.push(dep.version.clone());
            }
        }
        if let Some((name, mut versions)) = by_name.into_iter().find(|(_, v)| v.len() > 1) {
            versions.sort_by(|a, b| compare_versions(a, b));
            return Err(Error::DependencyConflict { name, versions });
        }

        let mut seen = HashSet::new();
        resolved.retain(|d| seen.insert(d.key()));

        info!(count = resolved.len(), "Resolved dependencies");
        Ok(resolved)
    }

    // ========================================================================
    // 요구사항 그래프 / 순환 검사
    // ========================================================================

    /// 플러그인 요구사항 등록 (순환 검사 그래프의 간선)
    pub fn set_plugin_requirements(&self, plugin_id: &str, requirements: Vec<DependencyRequirement>) {
        self.requirements
            .write()
            .insert(plugin_id.to_string(), requirements);
    }

    pub fn get_plugin_requirements(&self, plugin_id: &str) -> Vec<DependencyRequirement> {
        self.requirements
            .read()
            .get(plugin_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn remove_plugin_requirements(&self, plugin_id: &str) -> bool {
        self.requirements.write().remove(plugin_id).is_some()
    }

    /// `root`의 요구사항에서 시작하는 깊이 우선 순환 검사
    ///
    /// 하위 요구사항은 `set_plugin_requirements`로 등록된 그래프에서 찾는다.
    pub fn validate_circular_dependency(
        &self,
        root: &str,
        requirements: &[DependencyRequirement],
    ) -> Result<()> {
        let graph = self.requirements.read();
        let mut visited = HashSet::new();
        let mut path = vec![root.to_string()];

        for req in requirements {
            Self::visit(&graph, &req.name, &mut visited, &mut path)?;
        }
        Ok(())
    }

    fn visit(
        graph: &HashMap<String, Vec<DependencyRequirement>>,
        node: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Result<()> {
        if path.iter().any(|p| p == node) {
            let mut cycle = path.clone();
            cycle.push(node.to_string());
            return Err(Error::CircularDependency(cycle.join(" -> ")));
        }
        if visited.contains(node) {
            return Ok(());
        }

        path.push(node.to_string());
        if let Some(children) = graph.get(node) {
            for child in children {
                Self::visit(graph, &child.name, visited, path)?;
            }
        }
        path.pop();
        visited.insert(node.to_string());
        Ok(())
    }
}

impl Default for DependencyManager {
    fn default() -> Self {
        Self::new()
    }
}
