//! Dependency Injector - 이름으로 공유 인스턴스 주입
//!
//! 버전 해석과는 무관하다. 엔진이 공유 서비스(이벤트 버스 등)를 등록해 두면
//! 플러그인 쪽 코드가 이름과 타입으로 꺼내 쓴다.

use parking_lot::RwLock;
use plugrun_foundation::{Error, Result};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

type Instance = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct DependencyInjector {
    instances: RwLock<HashMap<String, Instance>>,
}

impl DependencyInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 인스턴스 등록 - 기존 값이 있으면 교체하고 `true`
    pub fn register<T: Any + Send + Sync>(&self, name: impl Into<String>, instance: Arc<T>) -> bool {
        self.instances
            .write()
            .insert(name.into(), instance as Instance)
            .is_some()
    }

    /// 이름과 타입으로 조회
    pub fn resolve<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        let instance = self
            .instances
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("injected instance {}", name)))?;

        instance.downcast::<T>().map_err(|_| {
            Error::InvalidInput(format!(
                "injected instance {} is not a {}",
                name,
                type_name::<T>()
            ))
        })
    }

    pub fn remove(&self, name: &str) -> bool {
        self.instances.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.instances.read().keys().cloned().collect();
        names.sort();
        names
    }
}
