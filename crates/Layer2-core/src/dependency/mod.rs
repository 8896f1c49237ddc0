//! # Dependency Manager
//!
//! 이름+버전으로 등록된 의존성에 대해 버전 제약 요구사항을 해석한다.
//!
//! - 요구사항마다 제약을 만족하는 가장 높은 버전 선택
//! - 같은 이름이 서로 다른 버전으로 해석되면 전체 실패
//! - 플러그인 요구사항 그래프를 따라 순환 검출
//!
//! `DependencyInjector`는 별개의 이름 -> 인스턴스 저장소다.

mod injector;
mod manager;
mod types;
mod version;

pub use injector::DependencyInjector;
pub use manager::DependencyManager;
pub use types::{Dependency, DependencyRequirement, DependencyType};
pub use version::{compare_versions, satisfies, VersionConstraint};
