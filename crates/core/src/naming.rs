//! 식별자 생성 -- 충돌에 강한 리소스 이름 생성
//!
//! [`generate`]는 `prefix-token` 형식의 이름을 만드는 순수 함수이고,
//! [`IdentifierGenerator`]는 한 실행(run) 안에서 발급한 이름을 기억하여
//! 중복을 원천적으로 배제합니다.
//!
//! # 사용 예시
//! ```
//! use terraprobe_core::naming::{IdentifierGenerator, NamingRules};
//! use terraprobe_core::types::Platform;
//!
//! let generator = IdentifierGenerator::new();
//! let name = generator.issue("terraprobe-gcs", Platform::Gcs).unwrap();
//! assert!(name.starts_with("terraprobe-gcs-"));
//! NamingRules::for_platform(Platform::Gcs).check(&name).unwrap();
//! ```

use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::NamingError;
use crate::types::Platform;

/// 토큰 길이 (16진수 문자 수)
pub const TOKEN_LEN: usize = 8;

/// 충돌 시 재생성 최대 횟수
const MAX_GENERATION_ATTEMPTS: u32 = 16;

/// `prefix-token` 형식의 이름을 생성합니다.
///
/// 토큰은 UUID v4에서 취한 8자리 소문자 16진수입니다. 접두어는 소문자로 바뀌며,
/// 그 외 플랫폼 규칙 준수는 호출자의 책임입니다.
pub fn generate(prefix: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix.to_ascii_lowercase(), &token[..TOKEN_LEN])
}

/// 플랫폼별 리소스 네이밍 규칙
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingRules {
    platform: Platform,
    min_len: usize,
    max_len: usize,
    extra_chars: &'static [char],
}

impl NamingRules {
    /// GCS 버킷: 3-63자, 소문자/숫자/`-`/`_`/`.`
    pub const GCS_BUCKET: Self = Self {
        platform: Platform::Gcs,
        min_len: 3,
        max_len: 63,
        extra_chars: &['-', '_', '.'],
    };

    /// AKS 클러스터: 1-63자, 소문자/숫자/`-`/`_`
    pub const AKS_CLUSTER: Self = Self {
        platform: Platform::Aks,
        min_len: 1,
        max_len: 63,
        extra_chars: &['-', '_'],
    };

    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Gcs => Self::GCS_BUCKET,
            Platform::Aks => Self::AKS_CLUSTER,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// 이름이 규칙을 만족하는지 검사합니다.
    pub fn check(&self, name: &str) -> Result<(), NamingError> {
        let violation = |reason: String| NamingError::RuleViolation {
            name: name.to_owned(),
            platform: self.platform.to_string(),
            reason,
        };

        if name.len() < self.min_len || name.len() > self.max_len {
            return Err(violation(format!(
                "length {} (must be {}-{})",
                name.len(),
                self.min_len,
                self.max_len
            )));
        }

        if let Some(bad) = name.chars().find(|c| {
            !(c.is_ascii_lowercase() || c.is_ascii_digit() || self.extra_chars.contains(c))
        }) {
            return Err(violation(format!("invalid character '{bad}'")));
        }

        let first_last_ok = |c: Option<char>| {
            c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        };
        if !first_last_ok(name.chars().next()) || !first_last_ok(name.chars().last()) {
            return Err(violation(
                "must start and end with a letter or digit".to_owned(),
            ));
        }

        // GCS는 "goog" 접두어를 예약합니다
        if self.platform == Platform::Gcs && name.starts_with("goog") {
            return Err(violation("must not start with 'goog'".to_owned()));
        }

        Ok(())
    }
}

/// 실행 단위 식별자 발급기
///
/// 여러 시나리오가 병렬로 실행될 때 공유되는 유일한 상태입니다.
#[derive(Debug, Default)]
pub struct IdentifierGenerator {
    issued: Mutex<HashSet<String>>,
}

impl IdentifierGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이번 실행에서 아직 발급되지 않은, 플랫폼 규칙을 만족하는 이름을 발급합니다.
    pub fn issue(&self, prefix: &str, platform: Platform) -> Result<String, NamingError> {
        self.issue_with(prefix, platform, generate)
    }

    /// 토큰 소스를 주입할 수 있는 발급 함수 (테스트용 결정적 소스 지원)
    pub fn issue_with(
        &self,
        prefix: &str,
        platform: Platform,
        mut source: impl FnMut(&str) -> String,
    ) -> Result<String, NamingError> {
        let rules = NamingRules::for_platform(platform);

        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = source(prefix);
            rules.check(&candidate)?;

            let mut issued = self
                .issued
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if issued.insert(candidate.clone()) {
                return Ok(candidate);
            }
            tracing::debug!(candidate = %candidate, "identifier collision, regenerating");
        }

        Err(NamingError::Exhausted {
            prefix: prefix.to_owned(),
            attempts: MAX_GENERATION_ATTEMPTS,
        })
    }

    /// 지금까지 발급한 이름 수
    pub fn issued_count(&self) -> usize {
        self.issued
            .lock()
            .map(|set| set.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}
