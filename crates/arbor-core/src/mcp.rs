//! MCP server toggles in an agent settings file.
//!
//! The settings file is a JSON object with an `mcpServers` map. Only the
//! `disabled` key of individual servers is ever written; every other key,
//! known or not, is preserved as read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::registry::write_atomic;

const SERVERS_KEY: &str = "mcpServers";
const DISABLED_KEY: &str = "disabled";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read settings from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings at {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is not a JSON object")]
    NotAnObject(PathBuf),

    #[error("no MCP server named {0:?}")]
    UnknownServer(String),

    #[error("failed to save settings to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One entry of the `mcpServers` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McpServer {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub env: Option<BTreeMap<String, String>>,
    pub disabled: Option<bool>,
}

impl McpServer {
    pub fn is_enabled(&self) -> bool {
        !self.disabled.unwrap_or(false)
    }

    fn from_entry(id: &str, entry: &Map<String, Value>) -> Self {
        let string = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            id: id.to_string(),
            kind: string("type"),
            command: string("command"),
            args: entry
                .get("args")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            env: entry
                .get("env")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            disabled: entry.get(DISABLED_KEY).and_then(Value::as_bool),
        }
    }
}

/// A loaded settings file.
#[derive(Debug)]
pub struct McpSettings {
    file: PathBuf,
    root: Map<String, Value>,
    servers: Vec<McpServer>,
}

impl McpSettings {
    pub fn load(file: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let file = file.into();
        let contents = match std::fs::read_to_string(&file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SettingsError::NotFound(file));
            }
            Err(source) => return Err(SettingsError::Read { path: file, source }),
        };
        let value: Value = serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: file.clone(),
            source,
        })?;
        let Value::Object(root) = value else {
            return Err(SettingsError::NotAnObject(file));
        };

        let servers = parse_servers(&root);
        Ok(Self {
            file,
            root,
            servers,
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Servers sorted case-insensitively by id.
    pub fn servers(&self) -> &[McpServer] {
        &self.servers
    }

    pub fn server(&self, id: &str) -> Option<&McpServer> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// Enable or disable a server and write the file back.
    ///
    /// Enabling removes the `disabled` key rather than writing `false`.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), SettingsError> {
        // Edit a copy; `self` only changes once the file is written.
        let mut root = self.root.clone();
        let entry = root
            .get_mut(SERVERS_KEY)
            .and_then(Value::as_object_mut)
            .and_then(|servers| servers.get_mut(id))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| SettingsError::UnknownServer(id.to_string()))?;

        if enabled {
            entry.remove(DISABLED_KEY);
        } else {
            entry.insert(DISABLED_KEY.to_string(), Value::Bool(true));
        }

        self.write(&root)?;
        self.servers = parse_servers(&root);
        self.root = root;
        tracing::info!(server = id, enabled, file = %self.file.display(), "updated MCP server");
        Ok(())
    }

    fn write(&self, root: &Map<String, Value>) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: self.file.clone(),
            source,
        };
        // serde_json's Map is ordered by key, so output keys come out sorted.
        let mut contents = serde_json::to_string_pretty(root)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        contents.push('\n');
        write_atomic(&self.file, contents.as_bytes()).map_err(write_err)
    }
}

fn parse_servers(root: &Map<String, Value>) -> Vec<McpServer> {
    let Some(servers) = root.get(SERVERS_KEY).and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut parsed: Vec<McpServer> = servers
        .iter()
        .filter_map(|(id, value)| value.as_object().map(|entry| McpServer::from_entry(id, entry)))
        .collect();
    parsed.sort_by_key(|s| s.id.to_lowercase());
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_settings(dir: &TempDir, value: &Value) -> PathBuf {
        let file = dir.path().join("settings.json");
        std::fs::write(&file, serde_json::to_vec(value).unwrap()).unwrap();
        file
    }

    #[test]
    fn load_parses_servers() {
        let tmp = TempDir::new().unwrap();
        let file = write_settings(
            &tmp,
            &json!({
                "env": { "FOO": "bar" },
                "mcpServers": {
                    "codex": { "type": "stdio", "command": "codex", "args": ["--arg1"] },
                    "Other": { "type": "stdio", "command": "other-cmd", "disabled": true },
                    "broken": "not an object"
                }
            }),
        );

        let settings = McpSettings::load(&file).unwrap();
        let ids: Vec<_> = settings.servers().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["codex", "Other"]);

        let codex = settings.server("codex").unwrap();
        assert!(codex.is_enabled());
        assert_eq!(codex.command.as_deref(), Some("codex"));
        assert_eq!(codex.args.as_deref(), Some(&["--arg1".to_string()][..]));
        assert!(!settings.server("Other").unwrap().is_enabled());
    }

    #[test]
    fn toggle_preserves_unknown_keys() {
        let tmp = TempDir::new().unwrap();
        let file = write_settings(
            &tmp,
            &json!({
                "env": { "API_KEY": "secret" },
                "attribution": { "enabled": true },
                "mcpServers": {
                    "test-server": { "type": "stdio", "command": "test", "timeout": 30 }
                }
            }),
        );

        let mut settings = McpSettings::load(&file).unwrap();
        settings.set_enabled("test-server", false).unwrap();
        assert!(!settings.server("test-server").unwrap().is_enabled());

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(written["env"]["API_KEY"], "secret");
        assert_eq!(written["attribution"]["enabled"], true);
        assert_eq!(written["mcpServers"]["test-server"]["timeout"], 30);
        assert_eq!(written["mcpServers"]["test-server"]["disabled"], true);

        settings.set_enabled("test-server", true).unwrap();
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert!(written["mcpServers"]["test-server"].get("disabled").is_none());
        assert!(McpSettings::load(&file).unwrap().server("test-server").unwrap().is_enabled());
    }

    #[test]
    fn unknown_server_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = write_settings(&tmp, &json!({ "mcpServers": {} }));
        let mut settings = McpSettings::load(&file).unwrap();
        assert!(matches!(
            settings.set_enabled("ghost", false),
            Err(SettingsError::UnknownServer(_))
        ));
    }

    #[test]
    fn failed_write_leaves_settings_unchanged() {
        let tmp = TempDir::new().unwrap();
        let file = write_settings(&tmp, &json!({ "mcpServers": { "docs": { "command": "docs" } } }));
        let before = std::fs::read_to_string(&file).unwrap();
        let mut settings = McpSettings::load(&file).unwrap();

        // The atomic write goes through `settings.json.tmp`; a directory there makes it fail.
        std::fs::create_dir(tmp.path().join("settings.json.tmp")).unwrap();

        assert!(matches!(
            settings.set_enabled("docs", false),
            Err(SettingsError::Write { .. })
        ));
        assert!(settings.server("docs").unwrap().is_enabled());
        assert!(!settings.root[SERVERS_KEY]["docs"]
            .as_object()
            .unwrap()
            .contains_key(DISABLED_KEY));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), before);
    }

    #[test]
    fn missing_and_malformed_files() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            McpSettings::load(tmp.path().join("absent.json")),
            Err(SettingsError::NotFound(_))
        ));

        let file = write_settings(&tmp, &json!([1, 2, 3]));
        assert!(matches!(McpSettings::load(&file), Err(SettingsError::NotAnObject(_))));
    }

    #[test]
    fn settings_without_servers_section() {
        let tmp = TempDir::new().unwrap();
        let file = write_settings(&tmp, &json!({ "theme": "dark" }));
        assert!(McpSettings::load(&file).unwrap().servers().is_empty());
    }
}
