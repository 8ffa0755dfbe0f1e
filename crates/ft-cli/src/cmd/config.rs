use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use ft_core::{
    config::{Config, WarnLevel},
    detect::{self, WhichProbe},
};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective settings and the gate commands they resolve to
    Show,

    /// Validate the settings document for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let project_type = config.gate.resolve_project_type(root);
    let detected = detect::detect_commands(root, &detect::default_detectors(), &WhichProbe);

    if json {
        return print_json(&serde_json::json!({
            "config": config,
            "project_type": project_type,
            "detected_commands": detected,
        }));
    }

    print!("{}", serde_yaml::to_string(&config)?);
    println!();
    println!("Resolved project type: {project_type}");
    if detected.is_empty() {
        println!("Detected gate commands: none");
    } else {
        println!("Detected gate commands:");
        for cmd in &detected {
            println!("  - {cmd}");
        }
    }
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
