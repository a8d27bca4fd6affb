//! Runtime settings and record-type configuration.
//!
//! Record types are loaded from a `RECORD_TYPES_DIR` directory of JSON files
//! when one is configured, otherwise the built-in set is used.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::tree::DEFAULT_ROOT_SENTINEL;

const DEFAULT_API_BASE_URL: &str = "https://skyronerp.onrender.com/api";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_SESSION_IDLE_SECS: u64 = 8 * 60 * 60;

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base_url: String,
    pub bind_addr: String,
    pub record_types_dir: Option<PathBuf>,
    pub request_timeout: Duration,
    pub page_size: usize,
    pub session_idle_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let api_base_url = std::env::var("ERP_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        let bind_addr = std::env::var("DASHBOARD_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let record_types_dir = std::env::var("RECORD_TYPES_DIR").ok().map(PathBuf::from);

        let request_timeout = match std::env::var("ERP_REQUEST_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("Invalid ERP_REQUEST_TIMEOUT_SECS: {}", raw))?,
            ),
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let page_size = match std::env::var("DASHBOARD_PAGE_SIZE") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("Invalid DASHBOARD_PAGE_SIZE: {}", raw))?,
            Err(_) => DEFAULT_PAGE_SIZE,
        };

        let session_idle_timeout = match std::env::var("DASHBOARD_SESSION_IDLE_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("Invalid DASHBOARD_SESSION_IDLE_SECS: {}", raw))?,
            ),
            Err(_) => Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        };

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            bind_addr,
            record_types_dir,
            request_timeout,
            page_size,
            session_idle_timeout,
        })
    }
}

/// How one ERP record type is fetched, identified, nested, and exported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTypeConfig {
    pub name: String,
    pub label: String,
    /// Path of the list endpoint, relative to the API base URL.
    pub list_path: String,
    /// Envelope key holding the list (e.g. `bomData`). Bare arrays are accepted too.
    #[serde(default)]
    pub list_key: Option<String>,
    /// Single-record path; `{id}` is replaced with the record identifier.
    pub item_path: String,
    pub create_path: String,
    /// Status-change path for reviewable records; `{id}` as in `item_path`.
    #[serde(default)]
    pub status_path: Option<String>,
    #[serde(default = "default_id_fields")]
    pub id_fields: Vec<String>,
    /// Field naming the parent record. Types without one are flat lists.
    #[serde(default)]
    pub parent_field: Option<String>,
    #[serde(default = "default_root_sentinel")]
    pub root_sentinel: String,
    pub export_title: String,
    pub export_file_stem: String,
    /// Worksheet name in the XLSX export.
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

/// A column in the tabular export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub header: String,
    pub field: String,
    #[serde(default)]
    pub kind: ColumnKind,
    /// Prefix the cell with two spaces per depth level.
    #[serde(default)]
    pub indent: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    #[default]
    Text,
    /// Rendered as `Yes` / `No`.
    Bool,
    /// ISO timestamps rendered as `YYYY-MM-DD`.
    Date,
    /// Arrays rendered as their length.
    Count,
}

fn default_id_fields() -> Vec<String> {
    vec!["_id".to_string(), "id".to_string()]
}

fn default_root_sentinel() -> String {
    DEFAULT_ROOT_SENTINEL.to_string()
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

/// All known record types, keyed by name.
#[derive(Debug)]
pub struct ConfigStore {
    configs: BTreeMap<String, RecordTypeConfig>,
}

impl ConfigStore {
    /// Load from `dir` when given, otherwise use the built-in record types.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Self::load_from_dir(dir),
            None => Self::from_configs(builtin_record_types()),
        }
    }

    /// Load all record-type configs from the specified directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            anyhow::bail!("Record type directory does not exist: {:?}", dir);
        }

        let mut configs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read record type: {:?}", path))?;

                let config: RecordTypeConfig = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse record type: {:?}", path))?;

                info!("Loaded record type: {} from {:?}", config.name, path);
                configs.push(config);
            }
        }

        Self::from_configs(configs).with_context(|| format!("Loading {:?}", dir))
    }

    pub fn from_configs(configs: Vec<RecordTypeConfig>) -> Result<Self> {
        if configs.is_empty() {
            anyhow::bail!("No record types configured");
        }

        let mut map = BTreeMap::new();
        for config in configs {
            if config.id_fields.is_empty() {
                anyhow::bail!("Record type {} has no id_fields", config.name);
            }
            if !config.item_path.contains("{id}") {
                anyhow::bail!("Record type {} item_path lacks {{id}}", config.name);
            }
            if let Some(status_path) = &config.status_path {
                if !status_path.contains("{id}") {
                    anyhow::bail!("Record type {} status_path lacks {{id}}", config.name);
                }
            }
            map.insert(config.name.clone(), config);
        }

        Ok(Self { configs: map })
    }

    pub fn get(&self, name: &str) -> Option<&RecordTypeConfig> {
        self.configs.get(name)
    }

    /// List all record type names.
    pub fn list(&self) -> Vec<&str> {
        self.configs.keys().map(String::as_str).collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &RecordTypeConfig> {
        self.configs.values()
    }
}

fn text(header: &str, field: &str) -> ColumnConfig {
    ColumnConfig {
        header: header.to_string(),
        field: field.to_string(),
        kind: ColumnKind::Text,
        indent: false,
    }
}

fn column(header: &str, field: &str, kind: ColumnKind) -> ColumnConfig {
    ColumnConfig {
        kind,
        ..text(header, field)
    }
}

/// The record types served by the Skyron ERP API.
pub fn builtin_record_types() -> Vec<RecordTypeConfig> {
    vec![
        RecordTypeConfig {
            name: "documents".to_string(),
            label: "Documents".to_string(),
            list_path: "/documents/".to_string(),
            list_key: Some("documents".to_string()),
            item_path: "/documents/{id}".to_string(),
            create_path: "/documents/create".to_string(),
            status_path: None,
            id_fields: default_id_fields(),
            parent_field: None,
            root_sentinel: default_root_sentinel(),
            export_title: "Documents Export".to_string(),
            export_file_stem: "documents".to_string(),
            sheet_name: "Documents".to_string(),
            columns: vec![
                text("Name", "name"),
                text("Description", "description"),
                text("File URL", "fileUrl"),
                column("Created", "createdAt", ColumnKind::Date),
                column("Updated", "updatedAt", ColumnKind::Date),
            ],
        },
        RecordTypeConfig {
            name: "ebom".to_string(),
            label: "EBOM".to_string(),
            list_path: "/bom/".to_string(),
            list_key: Some("bomData".to_string()),
            item_path: "/bom/{id}".to_string(),
            create_path: "/bom/create".to_string(),
            status_path: None,
            id_fields: default_id_fields(),
            parent_field: Some("parent_part".to_string()),
            root_sentinel: default_root_sentinel(),
            export_title: "EBOM Export".to_string(),
            export_file_stem: "EBOM_Export".to_string(),
            sheet_name: "EBOM".to_string(),
            columns: vec![
                ColumnConfig {
                    indent: true,
                    ..text("Title", "title")
                },
                text("Position Matrix", "position_matrix"),
                text("Revision", "revision"),
                text("Type", "type"),
                text("Description", "description"),
                text("Owner", "owner"),
                text("Name", "name"),
                column("Lock", "lock", ColumnKind::Bool),
                column("Is Revision", "is_revision", ColumnKind::Bool),
                text("Maturity State", "maturity_state"),
                text("CA", "ca"),
                text("Enterprise Item", "enterprise_item"),
            ],
        },
        RecordTypeConfig {
            name: "parts".to_string(),
            label: "Parts".to_string(),
            list_path: "/parts/".to_string(),
            list_key: Some("parts".to_string()),
            item_path: "/parts/{id}".to_string(),
            create_path: "/parts/create".to_string(),
            status_path: None,
            id_fields: default_id_fields(),
            parent_field: None,
            root_sentinel: default_root_sentinel(),
            export_title: "Parts Export".to_string(),
            export_file_stem: "parts".to_string(),
            sheet_name: "Parts".to_string(),
            columns: vec![
                text("ID", "id"),
                text("Type", "type"),
                text("Title", "title"),
                text("Name", "name"),
                text("Revision", "revision"),
                text("State", "state"),
                column("Created", "created", ColumnKind::Date),
                column("Modified", "modified", ColumnKind::Date),
                text("Owner", "owner"),
                text("Organization", "organization"),
                text("Collabspace", "collabspace"),
            ],
        },
        RecordTypeConfig {
            name: "requests".to_string(),
            label: "Change Requests".to_string(),
            list_path: "/requests/allrequests".to_string(),
            list_key: Some("requests".to_string()),
            item_path: "/requests/request/{id}".to_string(),
            create_path: "/requests/newrequest".to_string(),
            status_path: Some("/requests/request/{id}/status".to_string()),
            id_fields: default_id_fields(),
            parent_field: None,
            root_sentinel: default_root_sentinel(),
            export_title: "Change Requests Export".to_string(),
            export_file_stem: "requests".to_string(),
            sheet_name: "Requests".to_string(),
            columns: vec![
                text("Request ID", "_id"),
                text("User", "user"),
                column("Requested Parts", "requestedParts", ColumnKind::Count),
                text("Status", "status"),
                column("Created", "createdAt", ColumnKind::Date),
                column("Updated", "updatedAt", ColumnKind::Date),
            ],
        },
    ]
}
