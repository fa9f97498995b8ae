//! `techStack.json` → [`TechnologyUsage`].
//!
//! Two inventory shapes are published: the `scc` list
//! (`[{Name, Count, Lines, Code, Complexity}]`) and the analyzer object
//! (`{languages: {name: {files, lines, code}}}`). Usage count is the number
//! of files in both.

use serde::Deserialize;
use serde_json::{Map, Value};

use insights_core::classify::categorize_technology;
use insights_core::models::{TechnologyUsage, TechnologyUsageRecord};

use super::{count, decode, lenient_count, lenient_string, total, TECH_STACK};
use crate::error::SourceFailure;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TechStackShape {
    Scc(Vec<Value>),
    Analyzer { languages: Map<String, Value> },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SccEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    lines: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    code: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    complexity: u64,
}

#[derive(Debug, Default, Deserialize)]
struct LanguageStats {
    #[serde(default, deserialize_with = "lenient_count")]
    files: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    lines: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    code: u64,
}

/// A usage record keyed by the lower-cased `name`, categorized.
pub fn usage_record(name: &str, usage_count: u64) -> TechnologyUsageRecord {
    let key = name.trim().to_lowercase();
    TechnologyUsageRecord {
        category: categorize_technology(&key),
        name: key,
        usage_count,
        lines: 0,
        code_lines: 0,
        complexity: 0,
    }
}

fn from_scc(entries: Vec<Value>) -> TechnologyUsage {
    let mut usage = TechnologyUsage::default();
    for entry in entries {
        let Ok(entry) = serde_json::from_value::<SccEntry>(entry) else {
            continue;
        };
        let Some(name) = entry.name else { continue };
        let mut record = usage_record(&name, entry.count);
        record.lines = entry.lines;
        record.code_lines = entry.code;
        record.complexity = entry.complexity;
        insert_used(&mut usage, record);
    }
    usage
}

fn from_analyzer(languages: Map<String, Value>) -> TechnologyUsage {
    let mut usage = TechnologyUsage::default();
    for (name, stats) in languages {
        let stats = match stats {
            Value::Object(_) => serde_json::from_value::<LanguageStats>(stats).unwrap_or_default(),
            other => LanguageStats {
                files: count(&other),
                ..Default::default()
            },
        };
        let mut record = usage_record(&name, stats.files);
        record.lines = stats.lines;
        record.code_lines = stats.code;
        insert_used(&mut usage, record);
    }
    usage
}

fn insert_used(usage: &mut TechnologyUsage, record: TechnologyUsageRecord) {
    if record.usage_count > 0 && !record.name.is_empty() {
        usage.insert(record);
    }
}

pub fn try_transform(raw: &Value) -> Result<TechnologyUsage, SourceFailure> {
    Ok(match decode::<TechStackShape>(raw)? {
        TechStackShape::Scc(entries) => from_scc(entries),
        TechStackShape::Analyzer { languages } => from_analyzer(languages),
    })
}

/// Total form of [`try_transform`].
pub fn transform(raw: Option<&Value>) -> TechnologyUsage {
    total(TECH_STACK, raw, try_transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_core::models::TechCategory;
    use serde_json::json;

    #[test]
    fn test_scc_shape() {
        let raw = json!([
            {"Name": "Rust", "Count": 40, "Lines": 9000, "Code": 7000, "Complexity": 800},
            {"Name": "Dockerfile", "Count": 2, "Lines": 30, "Code": 25, "Complexity": 0},
            {"Name": "Markdown", "Count": 0, "Lines": 0, "Code": 0, "Complexity": 0}
        ]);
        let usage = transform(Some(&raw));

        assert_eq!(usage.len(), 2);
        let rust = usage.get("rust").unwrap();
        assert_eq!(rust.usage_count, 40);
        assert_eq!(rust.code_lines, 7000);
        assert_eq!(rust.category, TechCategory::Language);
        assert!(usage.get("markdown").is_none());
    }

    #[test]
    fn test_analyzer_shape() {
        let raw = json!({"languages": {
            "Python": {"files": 12, "lines": 1500, "code": 1200},
            "PostgreSQL": 3,
            "YAML": {"files": 0}
        }});
        let usage = transform(Some(&raw));

        assert_eq!(usage.len(), 2);
        assert_eq!(usage.get("python").unwrap().lines, 1500);
        assert_eq!(usage.get("postgresql").unwrap().usage_count, 3);
        assert_eq!(usage.get("postgresql").unwrap().category, TechCategory::Database);
    }

    #[test]
    fn test_duplicate_names_are_summed() {
        let raw = json!([
            {"Name": "TypeScript", "Count": 5, "Lines": 100},
            {"Name": "typescript", "Count": 7, "Lines": 50}
        ]);
        let usage = transform(Some(&raw));
        let ts = usage.get("typescript").unwrap();
        assert_eq!(ts.usage_count, 12);
        assert_eq!(ts.lines, 150);
    }

    #[test]
    fn test_unknown_names_are_tools() {
        let usage = transform(Some(&json!([{"Name": "Gherkin", "Count": 1}])));
        assert_eq!(usage.get("gherkin").unwrap().category, TechCategory::Tool);
    }

    #[test]
    fn test_malformed_and_absent_yield_empty() {
        assert!(transform(None).is_empty());
        assert!(transform(Some(&json!({"frameworks": []}))).is_empty());
        assert!(transform(Some(&json!(17))).is_empty());
        assert!(transform(Some(&json!([1, "x", {"Count": 3}]))).is_empty());
        assert!(matches!(
            try_transform(&json!({"files": 3})),
            Err(SourceFailure::Malformed(_))
        ));
    }
}
