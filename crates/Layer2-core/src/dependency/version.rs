//! Version - 단순 버전 비교와 제약식
//!
//! 점으로 구분된 정수 세그먼트를 앞에서부터 비교한다. 프리릴리즈/빌드 메타데이터는
//! 해석하지 않고 각 세그먼트의 선행 숫자만 사용한다 (`1.2.3-beta` = `1.2.3`).

use plugrun_foundation::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// 세그먼트 파싱 - 숫자가 없으면 0
fn segments(version: &str) -> Vec<u64> {
    version
        .trim()
        .trim_start_matches(['v', 'V'])
        .split('.')
        .map(|seg| {
            let digits: String = seg.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// 버전 비교 (부족한 세그먼트는 0)
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (segments(a), segments(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

// ============================================================================
// VersionConstraint
// ============================================================================

/// 버전 제약식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// `*` 또는 빈 문자열
    Any,
    /// `1.2.0` / `=1.2.0`
    Exact(String),
    GreaterOrEqual(String),
    Greater(String),
    LessOrEqual(String),
    Less(String),
    /// `~1.2.0`: major/minor 동일, 이상
    Tilde(String),
    /// `^1.2.0`: major 동일, 이상
    Caret(String),
}

impl VersionConstraint {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() || expr == "*" {
            return Ok(Self::Any);
        }

        let (ctor, rest): (fn(String) -> Self, &str) = if let Some(v) = expr.strip_prefix(">=") {
            (Self::GreaterOrEqual, v)
        } else if let Some(v) = expr.strip_prefix("<=") {
            (Self::LessOrEqual, v)
        } else if let Some(v) = expr.strip_prefix('>') {
            (Self::Greater, v)
        } else if let Some(v) = expr.strip_prefix('<') {
            (Self::Less, v)
        } else if let Some(v) = expr.strip_prefix('~') {
            (Self::Tilde, v)
        } else if let Some(v) = expr.strip_prefix('^') {
            (Self::Caret, v)
        } else if let Some(v) = expr.strip_prefix('=') {
            (Self::Exact, v)
        } else {
            (Self::Exact, expr)
        };

        let version = rest.trim();
        if version.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit() || c == 'v') {
            return Err(Error::InvalidInput(format!(
                "invalid version constraint: {:?}",
                expr
            )));
        }
        Ok(ctor(version.to_string()))
    }

    pub fn matches(&self, version: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(t) => compare_versions(version, t) == Ordering::Equal,
            Self::GreaterOrEqual(t) => compare_versions(version, t) != Ordering::Less,
            Self::Greater(t) => compare_versions(version, t) == Ordering::Greater,
            Self::LessOrEqual(t) => compare_versions(version, t) != Ordering::Greater,
            Self::Less(t) => compare_versions(version, t) == Ordering::Less,
            Self::Tilde(t) => {
                same_prefix(version, t, 2) && compare_versions(version, t) != Ordering::Less
            }
            Self::Caret(t) => {
                same_prefix(version, t, 1) && compare_versions(version, t) != Ordering::Less
            }
        }
    }
}

/// 앞 `n`개 세그먼트가 같은지
fn same_prefix(a: &str, b: &str, n: usize) -> bool {
    let (a, b) = (segments(a), segments(b));
    (0..n).all(|i| a.get(i).copied().unwrap_or(0) == b.get(i).copied().unwrap_or(0))
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(v) => write!(f, "={}", v),
            Self::GreaterOrEqual(v) => write!(f, ">={}", v),
            Self::Greater(v) => write!(f, ">{}", v),
            Self::LessOrEqual(v) => write!(f, "<={}", v),
            Self::Less(v) => write!(f, "<{}", v),
            Self::Tilde(v) => write!(f, "~{}", v),
            Self::Caret(v) => write!(f, "^{}", v),
        }
    }
}

/// 제약식 문자열로 바로 검사 (파싱 실패 시 에러)
pub fn satisfies(version: &str, constraint: &str) -> Result<bool> {
    Ok(VersionConstraint::parse(constraint)?.matches(version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_is_numeric() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("v2.0.0", "1.99.99"), Ordering::Greater);
        assert_eq!(compare_versions("1.2.3-beta", "1.2.3"), Ordering::Equal);
    }

    #[test]
    fn test_operators() {
        assert!(satisfies("1.3.0", ">=1.2.0").unwrap());
        assert!(satisfies("1.2.0", ">=1.2.0").unwrap());
        assert!(!satisfies("1.2.0", ">1.2.0").unwrap());
        assert!(satisfies("1.1.9", "<1.2.0").unwrap());
        assert!(satisfies("1.2.0", "<=1.2.0").unwrap());
        assert!(satisfies("1.2.0", "1.2.0").unwrap());
        assert!(satisfies("1.2.0", "=1.2").unwrap());
        assert!(satisfies("9.9.9", "*").unwrap());
    }

    #[test]
    fn test_tilde_and_caret() {
        assert!(satisfies("1.2.5", "~1.2.0").unwrap());
        assert!(!satisfies("1.3.0", "~1.2.0").unwrap());
        assert!(!satisfies("1.2.0", "~1.2.3").unwrap());

        assert!(satisfies("1.9.0", "^1.2.0").unwrap());
        assert!(!satisfies("2.0.0", "^1.2.0").unwrap());
        assert!(!satisfies("1.1.0", "^1.2.0").unwrap());
    }

    #[test]
    fn test_invalid_constraint() {
        assert!(VersionConstraint::parse(">=").is_err());
        assert!(VersionConstraint::parse("~abc").is_err());
        assert_eq!(VersionConstraint::parse(" * ").unwrap(), VersionConstraint::Any);
    }
}
