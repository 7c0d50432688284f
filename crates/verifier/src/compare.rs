//! Expected-versus-live comparison.
//!
//! A [`Matcher`] decides whether one live attribute is acceptable. An
//! [`Expectation`] binds a matcher to an attribute path, and [`compare`] runs a
//! list of expectations against a [`LiveState`] and collects every mismatch.
//!
//! Platform quirks are handled by [`normalize`] before any string comparison,
//! so `US-WEST1` matches `us-west1` on GCS and `East US` matches `eastus` on AKS.

use serde::{Deserialize, Serialize};
use terraprobe_core::types::{LiveState, Mismatch, Platform, ResourceSpec, SpecValue};

/// Condition on a single attribute value.
///
/// Serialized externally tagged, so a TOML check reads
/// `expect = { equals = "NEARLINE" }` or `expect = "present"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    Equals(String),
    EqualsIgnoreCase(String),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    OneOf(Vec<String>),
    /// Numeric lower bound
    AtLeast(f64),
    /// Numeric upper bound
    AtMost(f64),
    /// Semantic version lower bound. `1.28` is read as `1.28.0`.
    VersionAtLeast(String),
    /// Whole-component version prefix: `1.28` accepts `1.28` and `1.28.3`
    /// but not `1.2` or `1.280.1`.
    VersionPrefix(String),
    Present,
    Absent,
}

impl Matcher {
    /// Human-readable form of the expected value, used in mismatch reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Equals(v) => v.clone(),
            Self::EqualsIgnoreCase(v) => format!("{v} (any case)"),
            Self::Contains(v) => format!("containing '{v}'"),
            Self::StartsWith(v) => format!("starting with '{v}'"),
            Self::EndsWith(v) => format!("ending with '{v}'"),
            Self::OneOf(vs) => format!("one of [{}]", vs.join(", ")),
            Self::AtLeast(n) => format!(">= {n}"),
            Self::AtMost(n) => format!("<= {n}"),
            Self::VersionAtLeast(v) => format!("version >= {v}"),
            Self::VersionPrefix(v) => format!("version {v} or {v}.*"),
            Self::Present => "<present>".to_owned(),
            Self::Absent => "<absent>".to_owned(),
        }
    }

    /// Evaluates the matcher against a normalized attribute value.
    fn accepts(&self, platform: Platform, field: &str, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return matches!(self, Self::Absent);
        };
        let norm = |v: &str| normalize(platform, field, v);
        let actual_norm = norm(actual);

        match self {
            Self::Equals(expected) => norm(expected) == actual_norm,
            Self::EqualsIgnoreCase(expected) => expected.eq_ignore_ascii_case(actual),
            Self::Contains(part) => actual_norm.contains(&norm(part)),
            Self::StartsWith(prefix) => actual_norm.starts_with(&norm(prefix)),
            Self::EndsWith(suffix) => actual_norm.ends_with(&norm(suffix)),
            Self::OneOf(options) => options.iter().any(|o| norm(o) == actual_norm),
            Self::AtLeast(min) => actual.trim().parse::<f64>().is_ok_and(|n| n >= *min),
            Self::AtMost(max) => actual.trim().parse::<f64>().is_ok_and(|n| n <= *max),
            Self::VersionAtLeast(min) => match (parse_version(actual), parse_version(min)) {
                (Some(actual), Some(min)) => actual >= min,
                _ => false,
            },
            Self::VersionPrefix(prefix) => version_has_prefix(actual, prefix),
            Self::Present => true,
            Self::Absent => false,
        }
    }

    /// Applies `f` to every string the matcher carries.
    pub fn map_strings(&self, mut f: impl FnMut(&str) -> String) -> Self {
        match self {
            Self::Equals(v) => Self::Equals(f(v)),
            Self::EqualsIgnoreCase(v) => Self::EqualsIgnoreCase(f(v)),
            Self::Contains(v) => Self::Contains(f(v)),
            Self::StartsWith(v) => Self::StartsWith(f(v)),
            Self::EndsWith(v) => Self::EndsWith(f(v)),
            Self::OneOf(vs) => Self::OneOf(vs.iter().map(|v| f(v)).collect()),
            Self::VersionAtLeast(v) => Self::VersionAtLeast(f(v)),
            Self::VersionPrefix(v) => Self::VersionPrefix(f(v)),
            other => other.clone(),
        }
    }
}

/// `true` when `actual` equals `prefix` or continues it with a `.` component.
fn version_has_prefix(actual: &str, prefix: &str) -> bool {
    let actual = actual.trim().trim_start_matches('v');
    let prefix = prefix.trim().trim_start_matches('v').trim_end_matches('.');
    if prefix.is_empty() {
        return false;
    }
    actual == prefix
        || actual
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Lenient semver parse: strips a leading `v` and pads missing components.
fn parse_version(raw: &str) -> Option<semver::Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(v) = semver::Version::parse(raw) {
        return Some(v);
    }
    let core = raw.split(['-', '+']).next().unwrap_or(raw);
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    if parts.next().is_some() {
        return None;
    }
    Some(semver::Version::new(major, minor, patch))
}

/// One attribute expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    /// Dotted attribute path, e.g. `website.main_page_suffix`
    pub field: String,
    pub matcher: Matcher,
}

impl Expectation {
    pub fn new(field: impl Into<String>, matcher: Matcher) -> Self {
        Self {
            field: field.into(),
            matcher,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Matcher::Equals(value.into()))
    }

    /// Checks `actual` and returns the mismatch, if any.
    pub fn check(&self, platform: Platform, actual: Option<&str>) -> Option<Mismatch> {
        if self.matcher.accepts(platform, &self.field, actual) {
            None
        } else {
            Some(Mismatch::new(
                self.field.clone(),
                self.matcher.describe(),
                actual.map(str::to_owned),
            ))
        }
    }
}

/// Canonical form of `value` for comparison on `platform`.
///
/// - GCS `location` and `storage_class`: uppercase (the API reports uppercase)
/// - AKS `location`: lowercase, spaces removed (`East US` == `eastus`)
pub fn normalize(platform: Platform, field: &str, value: &str) -> String {
    match (platform, field) {
        (Platform::Gcs, "location" | "storage_class") => value.trim().to_ascii_uppercase(),
        (Platform::Aks, "location") => value
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase(),
        _ => value.to_owned(),
    }
}

/// Runs every expectation against `state` and returns all mismatches.
pub fn compare(platform: Platform, state: &LiveState, expectations: &[Expectation]) -> Vec<Mismatch> {
    expectations
        .iter()
        .filter_map(|e| e.check(platform, state.get(&e.field)))
        .collect()
}

/// Expectations implied by the variables of `spec`.
///
/// GCS: `name`, `location`, `storage_class`, `versioning` (from `versioning.enabled`
/// or `enable_versioning`), `uniform_bucket_level_access`, `labels.*`, `website.*`.
/// AKS: `name`, `location`, `kubernetes_version` (version prefix match, the API
/// may report a patch release), `tags.*`.
pub fn spec_expectations(spec: &ResourceSpec) -> Vec<Expectation> {
    let mut out = vec![Expectation::equals("name", spec.identifier())];

    let scalar = |key: &str| spec.var(key).map(SpecValue::render);
    match spec.platform() {
        Platform::Gcs => {
            for key in ["location", "storage_class"] {
                if let Some(v) = scalar(key) {
                    out.push(Expectation::equals(key, v));
                }
            }

            let versioning = spec
                .var("versioning")
                .and_then(SpecValue::as_map)
                .and_then(|m| m.get("enabled"))
                .and_then(SpecValue::as_bool)
                .or_else(|| spec.var("enable_versioning").and_then(SpecValue::as_bool));
            if let Some(enabled) = versioning {
                out.push(Expectation::equals("versioning", enabled.to_string()));
            }

            if let Some(v) = spec
                .var("uniform_bucket_level_access")
                .and_then(SpecValue::as_bool)
            {
                out.push(Expectation::equals("uniform_bucket_level_access", v.to_string()));
            }

            push_map(&mut out, spec, "labels", "labels");
            push_map(&mut out, spec, "website", "website");
        }
        Platform::Aks => {
            if let Some(v) = scalar("location") {
                out.push(Expectation::equals("location", v));
            }
            if let Some(v) = scalar("kubernetes_version") {
                out.push(Expectation::new("kubernetes_version", Matcher::VersionPrefix(v)));
            }
            push_map(&mut out, spec, "tags", "tags");
        }
    }
    out
}

fn push_map(out: &mut Vec<Expectation>, spec: &ResourceSpec, var: &str, prefix: &str) {
    if let Some(map) = spec.var(var).and_then(SpecValue::as_map) {
        for (key, value) in map {
            out.push(Expectation::equals(format!("{prefix}.{key}"), value.render()));
        }
    }
}
