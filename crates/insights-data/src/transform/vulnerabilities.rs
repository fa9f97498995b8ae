//! `vulnerabilities.json` → [`VulnerabilityCounts`].

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use insights_core::models::VulnerabilityCounts;

use super::{count, decode, lenient_count, total, VULNERABILITIES};
use crate::error::SourceFailure;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReportShape {
    Scanner { scan_summary: ScanSummary },
    Flat(FlatCounts),
}

#[derive(Debug, Deserialize)]
struct ScanSummary {
    #[serde(default, deserialize_with = "lenient_count")]
    total_vulnerabilities: u64,
    #[serde(default, deserialize_with = "lenient_tiers")]
    severity_counts: SeverityCounts,
}

/// Scanner tiers, keyed case-insensitively. Tiers other than these four
/// (e.g. `UNKNOWN`) are ignored; a tier spelled twice keeps the larger count.
#[derive(Debug, Default)]
struct SeverityCounts {
    critical: u64,
    high: u64,
    medium: u64,
    low: u64,
}

impl SeverityCounts {
    fn from_map(map: &Map<String, Value>) -> Self {
        let mut tiers = Self::default();
        for (key, value) in map {
            let slot = match key.trim().to_ascii_uppercase().as_str() {
                "CRITICAL" => &mut tiers.critical,
                "HIGH" => &mut tiers.high,
                "MEDIUM" => &mut tiers.medium,
                "LOW" => &mut tiers.low,
                _ => continue,
            };
            *slot = (*slot).max(count(value));
        }
        tiers
    }
}

fn lenient_tiers<'de, D: Deserializer<'de>>(d: D) -> Result<SeverityCounts, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Object(map) => SeverityCounts::from_map(&map),
        _ => SeverityCounts::default(),
    })
}

#[derive(Debug, Deserialize)]
struct FlatCounts {
    #[serde(deserialize_with = "lenient_count")]
    total: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    critical: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    high: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    medium: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    low: u64,
}

fn from_scanner(summary: ScanSummary) -> VulnerabilityCounts {
    let tiers = summary.severity_counts;
    let tier_sum = tiers.critical + tiers.high + tiers.medium + tiers.low;
    VulnerabilityCounts {
        total: if summary.total_vulnerabilities > 0 {
            summary.total_vulnerabilities
        } else {
            tier_sum
        },
        critical: tiers.critical,
        high: tiers.high,
        medium: tiers.medium,
        low: tiers.low,
    }
}

fn from_flat(flat: FlatCounts) -> VulnerabilityCounts {
    VulnerabilityCounts {
        total: flat.total,
        critical: flat.critical,
        high: flat.high,
        medium: flat.medium,
        low: flat.low,
    }
}

pub fn try_transform(raw: &Value) -> Result<VulnerabilityCounts, SourceFailure> {
    Ok(match decode::<ReportShape>(raw)? {
        ReportShape::Scanner { scan_summary } => from_scanner(scan_summary),
        ReportShape::Flat(flat) => from_flat(flat),
    })
}

/// Total form of [`try_transform`].
pub fn transform(raw: Option<&Value>) -> VulnerabilityCounts {
    total(VULNERABILITIES, raw, try_transform)
}
