use crate::console::{SetupSource, Tone};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_PORT: u16 = 25565;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("setup aborted: input closed before {0} was entered")]
    SetupAborted(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        field: &'static str,
        reason: String,
    },
    #[error("failed to persist config: {0}")]
    Persistence(#[from] io::Error),
}

/// Bootstrap settings, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "TOKEN")]
    pub token: String,
    #[serde(rename = "IP")]
    pub host: String,
    #[serde(rename = "PORT")]
    pub port: u16,
}

impl Config {
    fn validate(&self) -> Result<(), String> {
        if self.token.trim().is_empty() {
            return Err("TOKEN is empty".into());
        }
        if self.host.trim().is_empty() {
            return Err("IP is empty".into());
        }
        if self.port == 0 {
            return Err("PORT must be between 1 and 65535".into());
        }
        Ok(())
    }
}

pub struct ConfigStore {
    path: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(CONFIG_FILE)
    }
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the config file, running first-run setup when it does not exist.
    pub fn load(&self, source: &mut impl SetupSource) -> Result<Config, ConfigError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => self.parse(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config file found at {}, starting setup", self.path.display());
                source.announce(Tone::Info, "Info", "No config file found. Starting setup...");
                self.setup(source)
            }
            Err(e) => Err(self.corrupt(e)),
        }
    }

    /// Collects token, host and port from `source` and persists them.
    pub fn setup(&self, source: &mut impl SetupSource) -> Result<Config, ConfigError> {
        source.announce(
            Tone::Info,
            "Setup",
            "Welcome to Minecraft Server Status Bot Setup!",
        );
        let token = ask(source, "Enter your Discord bot token", "token")?;
        let host = ask(source, "Enter your Minecraft server IP", "host")?;
        let port = ask(
            source,
            "Enter your Minecraft server port (default: 25565)",
            "port",
        )?;

        let config = Config {
            token: required("token", &token)?,
            host: required("host", &host)?,
            port: parse_port(&port)?,
        };
        self.save(&config)?;
        info!("Configuration saved to {}", self.path.display());
        source.announce(Tone::Success, "Success", "Configuration saved successfully!");
        Ok(config)
    }

    /// Replaces the config file atomically; on failure the previous file is untouched.
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut contents = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::Persistence(e.into()))?;
        contents.push('\n');

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!("Wrote {} bytes to {}", contents.len(), self.path.display());
        Ok(())
    }

    fn parse(&self, contents: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_str(contents).map_err(|e| self.corrupt(e))?;
        config.validate().map_err(|reason| ConfigError::Corrupt {
            path: self.path.clone(),
            reason,
        })?;
        Ok(config)
    }

    fn corrupt(&self, err: impl ToString) -> ConfigError {
        ConfigError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}

fn ask(
    source: &mut impl SetupSource,
    prompt: &str,
    field: &'static str,
) -> Result<String, ConfigError> {
    source
        .ask(prompt)
        .map_err(|_| ConfigError::SetupAborted(field))?
        .ok_or(ConfigError::SetupAborted(field))
}

fn required(field: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidInput {
            field,
            reason: "must not be empty".into(),
        });
    }
    Ok(value.to_string())
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(DEFAULT_PORT);
    }
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidInput {
            field: "port",
            reason: format!("'{value}' is not a port between 1 and 65535"),
        }),
        Ok(port) => Ok(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        answers: VecDeque<&'static str>,
        titles: Vec<String>,
    }

    impl Scripted {
        fn new(answers: &[&'static str]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                titles: Vec::new(),
            }
        }
    }

    impl SetupSource for Scripted {
        fn ask(&mut self, _prompt: &str) -> io::Result<Option<String>> {
            Ok(self.answers.pop_front().map(str::to_string))
        }

        fn announce(&mut self, _tone: Tone, title: &str, _message: &str) {
            self.titles.push(title.to_string());
        }
    }

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join(CONFIG_FILE));
        (dir, store)
    }

    #[test]
    fn first_run_applies_default_port_and_trims() {
        let (_dir, store) = store();
        let config = store
            .load(&mut Scripted::new(&["T", "  play.example.com ", ""]))
            .unwrap();
        assert_eq!(
            config,
            Config {
                token: "T".into(),
                host: "play.example.com".into(),
                port: 25565,
            }
        );

        let written = fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            written,
            "{\n  \"TOKEN\": \"T\",\n  \"IP\": \"play.example.com\",\n  \"PORT\": 25565\n}\n"
        );
    }

    #[test]
    fn missing_file_announces_setup_through_load() {
        let (_dir, store) = store();
        let mut source = Scripted::new(&["T", "host", ""]);
        store.load(&mut source).unwrap();
        assert_eq!(source.titles, ["Info", "Setup", "Success"]);
        assert!(store.path().exists());
    }

    #[test]
    fn failed_setup_does_not_announce_success() {
        let (_dir, store) = store();
        let mut source = Scripted::new(&["T"]);
        store.load(&mut source).unwrap_err();
        assert_eq!(source.titles, ["Info", "Setup"]);
    }

    #[test]
    fn existing_file_skips_setup() {
        let (_dir, store) = store();
        let config = Config {
            token: "abc".into(),
            host: "mc.local".into(),
            port: 25570,
        };
        store.save(&config).unwrap();
        let mut source = Scripted::new(&[]);
        assert_eq!(store.load(&mut source).unwrap(), config);
        assert!(source.titles.is_empty());
    }

    #[test]
    fn setup_twice_writes_identical_bytes() {
        let (_dir, store) = store();
        store
            .setup(&mut Scripted::new(&[" tok", "host ", "25566"]))
            .unwrap();
        let first = fs::read(store.path()).unwrap();
        store
            .setup(&mut Scripted::new(&["tok ", " host", "25566"]))
            .unwrap();
        assert_eq!(first, fs::read(store.path()).unwrap());
    }

    #[test]
    fn closed_input_aborts_without_writing() {
        let (_dir, store) = store();
        let err = store.load(&mut Scripted::new(&["tok"])).unwrap_err();
        assert!(matches!(err, ConfigError::SetupAborted("host")));
        assert!(!store.path().exists());
    }

    #[test]
    fn bad_port_input_is_rejected() {
        let (_dir, store) = store();
        for port in ["abc", "0", "70000", "-1"] {
            let err = store
                .setup(&mut Scripted::new(&["tok", "host", port]))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidInput { field: "port", .. }),
                "{port}"
            );
        }
    }

    #[test]
    fn blank_token_is_rejected() {
        let (_dir, store) = store();
        let err = store
            .setup(&mut Scripted::new(&["   ", "host", ""]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInput { field: "token", .. }));
    }

    #[test]
    fn corrupt_files_are_reported() {
        let (_dir, store) = store();
        for contents in [
            "not json",
            r#"{"TOKEN": "t", "IP": "h"}"#,
            r#"{"TOKEN": "t", "IP": "h", "PORT": "25565"}"#,
            r#"{"TOKEN": "t", "IP": "h", "PORT": 70000}"#,
            r#"{"TOKEN": "t", "IP": "h", "PORT": 0}"#,
            r#"{"TOKEN": "", "IP": "h", "PORT": 25565}"#,
        ] {
            fs::write(store.path(), contents).unwrap();
            let err = store.load(&mut Scripted::new(&[])).unwrap_err();
            assert!(matches!(err, ConfigError::Corrupt { .. }), "{contents}");
        }
    }

    #[test]
    fn save_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("missing").join(CONFIG_FILE));
        let err = store
            .save(&Config {
                token: "t".into(),
                host: "h".into(),
                port: 1,
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Persistence(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
