//! Readiness precondition checked before `init` and `feat create` in strict
//! mode. The report itself is produced by an external reference-reading step;
//! this module only checks it.

use crate::error::{HarnessError, Result};
use crate::paths;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A precondition that must hold before a mutating operation proceeds.
pub trait ReadinessGate {
    /// Problems found; empty means ready.
    fn issues(&self, root: &Path) -> Vec<String>;

    fn ensure_ready(&self, root: &Path) -> Result<()> {
        let issues = self.issues(root);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::NotReady(issues))
        }
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    status: String,
    #[serde(default)]
    manifest_sha256: String,
    #[serde(default)]
    entries: Vec<ReportEntry>,
}

#[derive(Debug, Deserialize)]
struct ReportEntry {
    #[serde(default)]
    id: String,
    #[serde(default = "yes")]
    required: bool,
    #[serde(default)]
    exists: bool,
}

fn yes() -> bool {
    true
}

/// Checks `.harness/artifacts/ref-read-report.json` against a manifest file:
/// status `VALID`, matching manifest sha256, no missing required entry.
pub struct ReportReadiness {
    manifest: PathBuf,
}

impl ReportReadiness {
    pub fn new(manifest: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
        }
    }
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

impl ReadinessGate for ReportReadiness {
    fn issues(&self, root: &Path) -> Vec<String> {
        let manifest = if self.manifest.is_absolute() {
            self.manifest.clone()
        } else {
            root.join(&self.manifest)
        };
        let expected_hash = match sha256_file(&manifest) {
            Ok(h) => h,
            Err(_) => return vec![format!("manifest missing: {}", manifest.display())],
        };

        let report_path = paths::readiness_report_path(root);
        let data = match std::fs::read_to_string(&report_path) {
            Ok(d) => d,
            Err(_) => return vec![format!("missing report: {}", paths::READINESS_REPORT_FILE)],
        };
        let report: Report = match serde_json::from_str(&data) {
            Ok(r) => r,
            Err(e) => return vec![format!("failed to read report json: {e}")],
        };

        let mut issues = Vec::new();
        if report.status != "VALID" {
            issues.push("readiness report status is not VALID".to_string());
        }
        if report.manifest_sha256 != expected_hash {
            issues.push("manifest hash mismatch; regenerate report".to_string());
        }
        let missing: Vec<&str> = report
            .entries
            .iter()
            .filter(|e| e.required && !e.exists)
            .map(|e| e.id.as_str())
            .collect();
        if !missing.is_empty() {
            issues.push(format!("missing required references: {}", missing.join(", ")));
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_report(root: &Path, body: serde_json::Value) {
        let path = paths::readiness_report_path(root);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body.to_string()).unwrap();
    }

    #[test]
    fn valid_report_passes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("refs.toml"), "x").unwrap();
        let hash = sha256_file(&dir.path().join("refs.toml")).unwrap();
        assert_eq!(
            hash,
            "2d711642b726b04401627ca9fbac32f5c8530fb1903cc4db02258717921a4881"
        );
        write_report(
            dir.path(),
            serde_json::json!({
                "status": "VALID",
                "manifest_sha256": hash,
                "entries": [{"id": "a", "required": true, "exists": true},
                            {"id": "b", "required": false, "exists": false}]
            }),
        );
        let gate = ReportReadiness::new("refs.toml");
        assert!(gate.issues(dir.path()).is_empty());
        assert!(gate.ensure_ready(dir.path()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("refs.toml"), "x").unwrap();
        write_report(
            dir.path(),
            serde_json::json!({
                "status": "INVALID",
                "manifest_sha256": "0",
                "entries": [{"id": "core"}]
            }),
        );
        let issues = ReportReadiness::new("refs.toml").issues(dir.path());
        assert_eq!(issues.len(), 3);
        assert!(issues[2].contains("core"));
    }

    #[test]
    fn missing_inputs() {
        let dir = TempDir::new().unwrap();
        let gate = ReportReadiness::new("nope.toml");
        assert!(gate.issues(dir.path())[0].starts_with("manifest missing"));

        std::fs::write(dir.path().join("nope.toml"), "x").unwrap();
        let err = gate.ensure_ready(dir.path()).unwrap_err();
        assert!(err.to_string().contains("missing report"));
    }
}
