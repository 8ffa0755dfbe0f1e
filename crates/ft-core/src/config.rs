use crate::error::Result;
use crate::paths;
use crate::types::ProjectType;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Project type detection rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectTypeSetting {
    #[default]
    Auto,
    Ui,
    NonUi,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathRule {
    #[serde(default)]
    pub any_path_exists: Vec<String>,
    #[serde(default)]
    pub all_paths_exist: Vec<String>,
}

impl PathRule {
    /// Matches when any of `any_path_exists` exists, else when every entry of
    /// a non-empty `all_paths_exist` exists.
    pub fn matches(&self, root: &Path) -> bool {
        if self.any_path_exists.iter().any(|p| root.join(p).exists()) {
            return true;
        }
        !self.all_paths_exist.is_empty()
            && self.all_paths_exist.iter().all(|p| root.join(p).exists())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTypeRules {
    #[serde(default)]
    pub ui: PathRule,
    #[serde(default)]
    pub non_ui: PathRule,
    #[serde(default = "default_project_type")]
    pub default: ProjectType,
}

fn default_project_type() -> ProjectType {
    ProjectType::NonUi
}

impl Default for ProjectTypeRules {
    fn default() -> Self {
        Self {
            ui: PathRule::default(),
            non_ui: PathRule::default(),
            default: default_project_type(),
        }
    }
}

// ---------------------------------------------------------------------------
// GateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub project_type: ProjectTypeSetting,
    #[serde(default)]
    pub project_type_rules: ProjectTypeRules,
    #[serde(default)]
    pub ui_commands: Vec<String>,
    #[serde(default)]
    pub non_ui_commands: Vec<String>,
}

impl GateConfig {
    /// Explicit setting, else the ui rule, else the non_ui rule, else the
    /// configured default.
    pub fn resolve_project_type(&self, root: &Path) -> ProjectType {
        match self.project_type {
            ProjectTypeSetting::Ui => ProjectType::Ui,
            ProjectTypeSetting::NonUi => ProjectType::NonUi,
            ProjectTypeSetting::Auto => {
                if self.project_type_rules.ui.matches(root) {
                    ProjectType::Ui
                } else if self.project_type_rules.non_ui.matches(root) {
                    ProjectType::NonUi
                } else {
                    self.project_type_rules.default
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// StopThresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopThresholds {
    #[serde(default = "default_fail_streak")]
    pub gate_fail_streak: i64,
    #[serde(default = "default_no_progress")]
    pub no_progress_rounds: i64,
    #[serde(default = "default_max_rounds")]
    pub max_round_count: i64,
}

fn default_fail_streak() -> i64 {
    3
}

fn default_no_progress() -> i64 {
    2
}

fn default_max_rounds() -> i64 {
    8
}

impl Default for StopThresholds {
    fn default() -> Self {
        Self {
            gate_fail_streak: default_fail_streak(),
            no_progress_rounds: default_no_progress(),
            max_round_count: default_max_rounds(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub stop_thresholds: StopThresholds,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            gate: GateConfig::default(),
            stop_thresholds: StopThresholds::default(),
        }
    }
}

impl Config {
    /// A missing settings file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Config::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Config::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let warn = |message: String| ConfigWarning {
            level: WarnLevel::Warning,
            message,
        };

        for (key, commands) in [
            ("gate.ui_commands", &self.gate.ui_commands),
            ("gate.non_ui_commands", &self.gate.non_ui_commands),
        ] {
            for (i, cmd) in commands.iter().enumerate() {
                if cmd.trim().is_empty() {
                    warnings.push(warn(format!("{key}[{i}] is an empty command")));
                }
            }
        }

        if self.gate.project_type == ProjectTypeSetting::Ui && self.gate.ui_commands.is_empty() {
            warnings.push(warn(
                "gate.project_type is ui but gate.ui_commands is empty; \
                 only the evidence document will be checked"
                    .to_string(),
            ));
        }

        let t = &self.stop_thresholds;
        for (key, value) in [
            ("gate_fail_streak", t.gate_fail_streak),
            ("no_progress_rounds", t.no_progress_rounds),
            ("max_round_count", t.max_round_count),
        ] {
            if value <= 0 {
                warnings.push(ConfigWarning {
                    level: if value < 0 {
                        WarnLevel::Error
                    } else {
                        WarnLevel::Warning
                    },
                    message: format!(
                        "stop_thresholds.{key}={value}; doctor will warn on every feat"
                    ),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
