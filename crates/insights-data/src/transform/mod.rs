//! Schema transformers: one per artifact kind.
//!
//! Each kind has a `try_transform` that recognizes the artifact's known
//! shapes (or reports it as malformed) and a total `transform` that accepts
//! an absent or unrecognizable artifact and yields the empty fragment.

pub mod commits;
pub mod developers;
pub mod regional;
pub mod technology;
pub mod vulnerabilities;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::error::SourceFailure;

// ── Artifact names ────────────────────────────────────────────────────────────

pub const COMMITS: &str = "commits.json";
pub const DEVELOPER_RANKINGS: &str = "developer_rankings.json";
pub const GEOGRAPHIC_DISTRIBUTION: &str = "geographic_distribution.json";
pub const TECH_STACK: &str = "techStack.json";
pub const VULNERABILITIES: &str = "vulnerabilities.json";
pub const COMPLEXITY: &str = "complexity.json";

/// The per-repository JSON artifacts, in load order.
pub const JSON_ARTIFACTS: [&str; 6] = [
    COMMITS,
    DEVELOPER_RANKINGS,
    GEOGRAPHIC_DISTRIBUTION,
    TECH_STACK,
    VULNERABILITIES,
    COMPLEXITY,
];

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Run `f` on `raw`, falling back to the empty fragment when the artifact
/// is absent or `f` rejects it.
pub(crate) fn total<T: Default>(
    artifact: &str,
    raw: Option<&Value>,
    f: impl FnOnce(&Value) -> Result<T, SourceFailure>,
) -> T {
    let Some(raw) = raw else {
        return T::default();
    };
    f(raw).unwrap_or_else(|failure| {
        warn!(artifact, %failure, "artifact degraded to empty fragment");
        T::default()
    })
}

/// Deserialize a known document shape, reporting mismatch as malformed.
pub(crate) fn decode<'a, T: Deserialize<'a>>(raw: &'a Value) -> Result<T, SourceFailure> {
    T::deserialize(raw).map_err(|e| SourceFailure::Malformed(e.to_string()))
}

/// Non-negative integer count from a JSON number or numeric string; zero
/// for anything else.
pub(crate) fn count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f > 0.0)
                .map(|f| f.round() as u64)
                .unwrap_or(0)
        }),
        Value::String(s) => s.trim().parse::<f64>().map_or(0, |f| count(&Value::from(f))),
        _ => 0,
    }
}

pub(crate) fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(count(&Value::deserialize(d)?))
}

/// A finite score from a JSON number or numeric string.
pub(crate) fn lenient_score<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let score = match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(score.filter(|f| f.is_finite()))
}

/// A trimmed, non-empty string, or `None` for anything else.
pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// Entries of an array that match `T`; other entries, and non-array values,
/// are dropped.
pub(crate) fn lenient_vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(d)? else {
        return Ok(Vec::new());
    };
    let total = items.len();
    let kept: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if kept.len() < total {
        tracing::debug!(dropped = total - kept.len(), "skipped unrecognized entries");
    }
    Ok(kept)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_accepts_numbers_and_numeric_strings() {
        assert_eq!(count(&json!(7)), 7);
        assert_eq!(count(&json!(2.6)), 3);
        assert_eq!(count(&json!("12")), 12);
        assert_eq!(count(&json!(-4)), 0);
        assert_eq!(count(&json!("many")), 0);
        assert_eq!(count(&json!(null)), 0);
    }

    #[test]
    fn test_lenient_score() {
        #[derive(Deserialize)]
        struct Scored {
            #[serde(default, deserialize_with = "lenient_score")]
            score: Option<f64>,
        }
        let score = |v: Value| serde_json::from_value::<Scored>(v).unwrap().score;
        assert_eq!(score(json!({"score": 41.5})), Some(41.5));
        assert_eq!(score(json!({"score": "12.25"})), Some(12.25));
        assert_eq!(score(json!({"score": "high"})), None);
        assert_eq!(score(json!({})), None);
    }

    #[test]
    fn test_total_falls_back_to_default() {
        let absent: Vec<u8> = total("x", None, |_| Ok(vec![1]));
        assert!(absent.is_empty());
        let rejected: Vec<u8> = total("x", Some(&json!({})), |_| {
            Err(SourceFailure::Malformed("no".into()))
        });
        assert!(rejected.is_empty());
        let accepted: Vec<u8> = total("x", Some(&json!({})), |_| Ok(vec![1]));
        assert_eq!(accepted, vec![1]);
    }
}
