use crate::fetch::{FetchMode, HttpConfig, RetryPolicy};
use crate::schema::Severity;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "importer.toml";
pub const SKIP_LISTS_FILE: &str = "skip_lists.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    pub source: SourceConfig,
    pub scan: ScanConfig,
    pub http: HttpSettings,
    pub parser: ParserConfig,
    pub database: DatabaseConfig,
    #[serde(skip)]
    pub skip_lists: SkipLists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub root: String,
    pub max_depth: u32,
    pub data_source: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://openhelsinki.hel.fi".to_string(),
            root: "/files".to_string(),
            max_depth: 9999,
            data_source: "helsinki".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub min_file_size: u64,
    pub language: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_file_size: 500,
            language: crate::filename::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub user_agent: Option<String>,
    pub fetch_mode: FetchMode,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
            max_attempts: retry.max_attempts,
            base_backoff_ms: retry.base_backoff_ms,
            user_agent: None,
            fetch_mode: FetchMode::Whole,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub failure_threshold: Severity,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Severity::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("decisions.db"),
        }
    }
}

/// Curated, reason-annotated exclusions applied by the scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipLists {
    /// Exact listing href → reason.
    pub paths: BTreeMap<String, String>,
    /// Origin id → reason (may be empty).
    pub documents: BTreeMap<String, String>,
}

impl SkipLists {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: SkipListsFile = serde_yaml::from_str(raw)?;
        Ok(parse_skip_lists(file))
    }

    pub fn path_reason(&self, href: &str) -> Option<&str> {
        self.paths.get(href).map(String::as_str)
    }

    pub fn document_reason(&self, origin_id: &str) -> Option<&str> {
        self.documents.get(origin_id).map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SkipListsFile {
    #[serde(default = "default_path_root")]
    path_root: String,
    #[serde(default)]
    paths: Vec<PathSkipEntry>,
    #[serde(default)]
    documents: Vec<DocumentSkipEntry>,
}

fn default_path_root() -> String {
    "/files".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct PathSkipEntry {
    parts: Vec<String>,
    reason: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DocumentSkipEntry {
    origin_id: String,
    reason: Option<String>,
}

fn parse_skip_lists(file: SkipListsFile) -> SkipLists {
    let root = file.path_root.trim_end_matches('/');
    let paths = file
        .paths
        .into_iter()
        .map(|entry| {
            let joined = entry.parts.join("/").replace(' ', "%20");
            (format!("{root}/{joined}"), entry.reason)
        })
        .collect();
    let documents = file
        .documents
        .into_iter()
        .map(|entry| (entry.origin_id, entry.reason.unwrap_or_default()))
        .collect();
    SkipLists { paths, documents }
}

impl ImporterConfig {
    /// Loads `importer.toml` and `skip_lists.yaml` from `path`. Either file
    /// may be absent, in which case defaults (and empty skip lists) apply.
    pub fn load_from_dir(path: &Path) -> Result<Self> {
        let config_path = path.join(CONFIG_FILE);
        let mut config: ImporterConfig = if config_path.exists() {
            let config_str = fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            toml::from_str(&config_str).with_context(|| format!("parsing {}", config_path.display()))?
        } else {
            ImporterConfig::default()
        };

        let skip_path = path.join(SKIP_LISTS_FILE);
        if skip_path.exists() {
            let skip_str = fs::read_to_string(&skip_path)
                .with_context(|| format!("reading {}", skip_path.display()))?;
            config.skip_lists =
                SkipLists::from_yaml_str(&skip_str).with_context(|| format!("parsing {}", skip_path.display()))?;
        }

        Ok(config)
    }

    pub fn http_config(&self) -> HttpConfig {
        let defaults = HttpConfig::default();
        HttpConfig {
            base_url: self.source.base_url.trim_end_matches('/').to_string(),
            user_agent: self.http.user_agent.clone().unwrap_or(defaults.user_agent),
            timeout: Duration::from_secs(self.http.timeout_secs),
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.http.max_attempts,
                base_backoff_ms: self.http.base_backoff_ms,
            },
            fetch_mode: self.http.fetch_mode,
        }
    }
}
