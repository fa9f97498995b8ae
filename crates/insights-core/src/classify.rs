//! Keyword and extension tables used to classify technologies, commit
//! messages and file paths.
//!
//! All tables are static; identical input always yields identical output.

use std::collections::BTreeSet;

use crate::models::{TechCategory, WorkType};

// ── Technology categories ─────────────────────────────────────────────────────

const LANGUAGES: &[&str] = &[
    "rust", "python", "javascript", "typescript", "java", "go", "c", "c++", "c#", "ruby",
    "php", "kotlin", "swift", "scala", "shell", "bash", "powershell", "html", "css", "scss",
    "lua", "perl", "r", "dart", "objective-c", "haskell", "elixir", "erlang", "clojure",
    "groovy", "f#", "visual basic", "c header", "c++ header", "jsx", "tsx",
];

const FRAMEWORKS: &[&str] = &[
    "react", "angular", "vue", "svelte", "django", "flask", "fastapi", "spring", "express",
    "next.js", "nuxt", "rails", "laravel", "asp.net", ".net", "jquery", "bootstrap",
    "tailwind", "node.js", "tokio", "actix", "razor", "blazor", "xamarin",
];

const DATABASES: &[&str] = &[
    "sql", "mysql", "postgresql", "postgres", "sqlite", "mongodb", "redis", "cassandra",
    "elasticsearch", "oracle", "mariadb", "dynamodb", "neo4j", "couchdb", "plsql", "tsql",
];

const SECURITY: &[&str] = &[
    "oauth", "jwt", "ssl", "tls", "openssl", "saml", "ldap", "kerberos", "vault", "bcrypt",
    "keycloak", "x509",
];

const NETWORKING: &[&str] = &[
    "http", "https", "grpc", "websocket", "graphql", "rest", "tcp", "udp", "dns", "nginx",
    "haproxy", "protobuf", "protocol buffers", "mqtt", "amqp", "kafka", "rabbitmq",
];

const PLATFORMS: &[&str] = &[
    "docker", "dockerfile", "kubernetes", "aws", "azure", "gcp", "linux", "windows",
    "android", "ios", "heroku", "helm", "openshift", "lambda", "cloudformation",
];

const TOOLS: &[&str] = &[
    "git", "make", "makefile", "cmake", "maven", "gradle", "npm", "yarn", "webpack",
    "jenkins", "terraform", "ansible", "json", "yaml", "xml", "markdown", "toml", "ini",
    "batch", "msbuild", "license", "plain text", "svg",
];

/// Category membership lists in lookup order. The lists are disjoint.
const CATEGORY_TABLE: &[(TechCategory, &[&str])] = &[
    (TechCategory::Language, LANGUAGES),
    (TechCategory::Framework, FRAMEWORKS),
    (TechCategory::Database, DATABASES),
    (TechCategory::Security, SECURITY),
    (TechCategory::Networking, NETWORKING),
    (TechCategory::Platform, PLATFORMS),
    (TechCategory::Tool, TOOLS),
];

/// Map a technology name to its category; unknown names are tools.
pub fn categorize_technology(name: &str) -> TechCategory {
    let key = name.trim().to_lowercase();
    CATEGORY_TABLE
        .iter()
        .find(|(_, members)| members.contains(&key.as_str()))
        .map(|(category, _)| *category)
        .unwrap_or(TechCategory::Tool)
}

// ── Work types ────────────────────────────────────────────────────────────────

/// Keyword rules in precedence order; the first rule with a keyword
/// contained in the lower-cased message wins.
const WORK_TYPE_RULES: &[(WorkType, &[&str])] = &[
    (WorkType::BugFix, &["fix", "bug", "hotfix", "patch", "issue", "resolve"]),
    (WorkType::Feature, &["feat", "feature", "add", "implement", "introduce", "new"]),
    (WorkType::Documentation, &["docs", "documentation", "docstring", "readme", "comment", "changelog"]),
    (WorkType::Testing, &["test", "spec", "coverage"]),
    (WorkType::Refactor, &["refactor", "restructure", "clean", "rename", "simplify"]),
    (WorkType::Merge, &["merge"]),
    (WorkType::Maintenance, &["chore", "bump", "upgrade", "update", "dependenc", "maint", "release"]),
];

/// Classify a commit message into exactly one work type.
pub fn classify_work_type(message: &str) -> WorkType {
    let lower = message.to_lowercase();
    WORK_TYPE_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(work_type, _)| *work_type)
        .unwrap_or(WorkType::Other)
}

// ── Free-text technology tags ─────────────────────────────────────────────────

/// A technology detected in a message or path, with its category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TechTag {
    pub name: String,
    pub category: TechCategory,
}

impl TechTag {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            category: categorize_technology(name),
        }
    }
}

const EXTENSIONS: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("java", "java"),
    ("go", "go"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "c++"),
    ("cc", "c++"),
    ("hpp", "c++"),
    ("cs", "c#"),
    ("rb", "ruby"),
    ("php", "php"),
    ("kt", "kotlin"),
    ("swift", "swift"),
    ("scala", "scala"),
    ("sh", "shell"),
    ("ps1", "powershell"),
    ("html", "html"),
    ("css", "css"),
    ("scss", "css"),
    ("sql", "sql"),
    ("vue", "vue"),
    ("svelte", "svelte"),
    ("tf", "terraform"),
    ("proto", "protobuf"),
    ("gradle", "gradle"),
    ("yml", "yaml"),
    ("yaml", "yaml"),
    ("json", "json"),
    ("md", "markdown"),
    ("toml", "toml"),
    ("xml", "xml"),
    ("csproj", ".net"),
    ("razor", "razor"),
];

/// Special file names that identify a technology regardless of extension.
const FILE_NAMES: &[(&str, &str)] = &[
    ("dockerfile", "docker"),
    ("docker-compose.yml", "docker"),
    ("docker-compose.yaml", "docker"),
    ("makefile", "make"),
    ("cmakelists.txt", "cmake"),
    ("jenkinsfile", "jenkins"),
    ("package.json", "npm"),
    ("cargo.toml", "rust"),
    ("pom.xml", "maven"),
];

/// Message keywords: `(needle, technology)`.
const MESSAGE_KEYWORDS: &[(&str, &str)] = &[
    ("react", "react"),
    ("angular", "angular"),
    ("vue", "vue"),
    ("django", "django"),
    ("flask", "flask"),
    ("spring", "spring"),
    ("express", "express"),
    ("rails", "rails"),
    ("laravel", "laravel"),
    ("postgres", "postgresql"),
    ("mysql", "mysql"),
    ("mongo", "mongodb"),
    ("redis", "redis"),
    ("sqlite", "sqlite"),
    ("elasticsearch", "elasticsearch"),
    ("oauth", "oauth"),
    ("jwt", "jwt"),
    ("ssl", "ssl"),
    ("tls", "tls"),
    ("graphql", "graphql"),
    ("grpc", "grpc"),
    ("websocket", "websocket"),
    ("nginx", "nginx"),
    ("kafka", "kafka"),
    ("docker", "docker"),
    ("kubernetes", "kubernetes"),
    ("k8s", "kubernetes"),
    ("helm", "helm"),
    ("aws", "aws"),
    ("azure", "azure"),
    ("terraform", "terraform"),
    ("ansible", "ansible"),
    ("jenkins", "jenkins"),
    ("webpack", "webpack"),
];

/// Technologies mentioned in a free-text commit message.
pub fn technologies_in_message(message: &str) -> Vec<TechTag> {
    let lower = message.to_lowercase();
    let names: BTreeSet<&str> = MESSAGE_KEYWORDS
        .iter()
        .filter(|(needle, _)| lower.contains(needle))
        .map(|(_, tech)| *tech)
        .collect();
    names.into_iter().map(TechTag::new).collect()
}

/// Technology implied by a file path, from its name or extension.
pub fn technology_for_path(path: &str) -> Option<TechTag> {
    let lower = path.trim().to_lowercase();
    let file_name = lower.rsplit(['/', '\\']).next().unwrap_or(&lower);

    if let Some((_, tech)) = FILE_NAMES.iter().find(|(name, _)| *name == file_name) {
        return Some(TechTag::new(tech));
    }

    let (_, extension) = file_name.rsplit_once('.')?;
    EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, tech)| TechTag::new(tech))
}

/// Every technology tag for one commit: message keywords plus changed-file
/// technologies, deduplicated and sorted by name.
pub fn technologies_for_commit<'a>(
    message: &str,
    files: impl IntoIterator<Item = &'a str>,
) -> Vec<TechTag> {
    let mut tags: BTreeSet<TechTag> = technologies_in_message(message).into_iter().collect();
    tags.extend(files.into_iter().filter_map(technology_for_path));
    tags.into_iter().collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
