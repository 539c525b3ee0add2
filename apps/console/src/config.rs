use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use client_core::ReconnectPolicy;
use serde::Deserialize;
use shared::domain::{CaseId, CaseLayout, ChannelLayout};

pub const DEFAULT_CONFIG_FILE: &str = "fire_console.toml";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub origin: String,
    pub log_level: String,
    pub reconnect: ReconnectSettings,
    pub cases: Vec<CaseSettings>,
    pub direct_igniters: DirectIgniterSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:5000".into(),
            log_level: "info".into(),
            reconnect: ReconnectSettings::default(),
            cases: Vec::new(),
            direct_igniters: DirectIgniterSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectMode {
    Fixed,
    Backoff,
}

impl FromStr for ReconnectMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "backoff" => Ok(Self::Backoff),
            other => Err(anyhow!("unknown reconnect mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub mode: ReconnectMode,
    /// Fixed delay, or the first delay when backing off.
    pub delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            mode: ReconnectMode::Backoff,
            delay_ms: 3000,
            max_delay_ms: 30_000,
            jitter: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CaseSettings {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_case_channels")]
    pub channels: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DirectIgniterSettings {
    pub enabled: bool,
    pub count: i64,
}

impl Default for DirectIgniterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            count: 50,
        }
    }
}

fn default_case_channels() -> i64 {
    10
}

fn default_true() -> bool {
    true
}

impl Settings {
    pub fn layout(&self) -> ChannelLayout {
        ChannelLayout {
            cases: self
                .cases
                .iter()
                .filter(|case| case.enabled)
                .map(|case| CaseLayout {
                    id: CaseId(case.id),
                    name: if case.name.is_empty() {
                        format!("Case {}", case.id)
                    } else {
                        case.name.clone()
                    },
                    channels: case.channels,
                })
                .collect(),
            direct_igniters: if self.direct_igniters.enabled {
                self.direct_igniters.count
            } else {
                0
            },
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let reconnect = &self.reconnect;
        match reconnect.mode {
            ReconnectMode::Fixed => ReconnectPolicy::Fixed {
                delay: Duration::from_millis(reconnect.delay_ms),
            },
            ReconnectMode::Backoff => ReconnectPolicy::Backoff {
                initial: Duration::from_millis(reconnect.delay_ms),
                max: Duration::from_millis(reconnect.max_delay_ms),
                jitter: reconnect.jitter,
            },
        }
    }

    /// Collects every problem so the operator can fix them in one go.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            problems.push(format!(
                "log_level '{}' is not one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }

        let mut seen = HashSet::new();
        for case in &self.cases {
            if !seen.insert(case.id) {
                problems.push(format!("case id {} is configured more than once", case.id));
            }
            if case.channels <= 0 {
                problems.push(format!("case {} must have at least one channel", case.id));
            }
        }
        if self.direct_igniters.enabled && self.direct_igniters.count < 0 {
            problems.push("direct_igniters.count must not be negative".into());
        }

        let reconnect = &self.reconnect;
        if reconnect.delay_ms == 0 {
            problems.push("reconnect.delay_ms must be greater than zero".into());
        }
        if reconnect.mode == ReconnectMode::Backoff {
            if reconnect.max_delay_ms < reconnect.delay_ms {
                problems.push("reconnect.max_delay_ms must not be below delay_ms".into());
            }
            if !(0.0..=1.0).contains(&reconnect.jitter) {
                problems.push("reconnect.jitter must be between 0.0 and 1.0".into());
            }
        }
        problems
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            return Ok(());
        }
        bail!("invalid configuration:\n  - {}", problems.join("\n  - "))
    }
}

/// Defaults, then the TOML file, then `FIRE__*` environment overrides.
///
/// An explicitly requested file must exist; the default file is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let mut settings = match fs::read_to_string(&path) {
        Ok(raw) => parse_settings(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if required => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
        Err(_) => Settings::default(),
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    Ok(toml::from_str(raw)?)
}

pub fn apply_env_overrides<F>(settings: &mut Settings, var: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = var("FIRE__ORIGIN") {
        settings.origin = v;
    }
    if let Some(v) = var("FIRE__LOG_LEVEL") {
        settings.log_level = v.trim().to_ascii_lowercase();
    }
    if let Some(v) = var("FIRE__RECONNECT") {
        settings.reconnect.mode = v.parse().context("FIRE__RECONNECT")?;
    }
    Ok(())
}
