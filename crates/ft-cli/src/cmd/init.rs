use crate::output::print_json;
use anyhow::Context;
use ft_core::{
    readiness::{ReadinessGate, ReportReadiness},
    store,
};
use std::path::Path;

pub fn run(root: &Path, strict: bool, manifest: Option<&Path>, json: bool) -> anyhow::Result<()> {
    ensure_ready(root, strict, manifest)?;

    let created = store::init(root)
        .with_context(|| format!("failed to initialize harness in {}", root.display()))?;
    let created: Vec<String> = created
        .iter()
        .map(|p| p.strip_prefix(root).unwrap_or(p).display().to_string())
        .collect();

    if json {
        print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "created": created,
        }))?;
    } else {
        println!("Initialized harness in: {}", root.display());
        if created.is_empty() {
            println!("  nothing to do; store already initialized");
        }
        for path in &created {
            println!("  created: {path}");
        }
    }
    Ok(())
}

/// Strict-mode readiness check shared by `init` and `feat create`.
pub(crate) fn ensure_ready(root: &Path, strict: bool, manifest: Option<&Path>) -> anyhow::Result<()> {
    if !strict {
        return Ok(());
    }
    let Some(manifest) = manifest else {
        anyhow::bail!("--strict requires --manifest <path>");
    };
    ReportReadiness::new(manifest).ensure_ready(root)?;
    Ok(())
}
