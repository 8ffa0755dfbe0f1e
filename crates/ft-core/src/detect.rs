use std::path::Path;

// ---------------------------------------------------------------------------
// ToolProbe
// ---------------------------------------------------------------------------

/// Answers "is this executable on PATH?".
pub trait ToolProbe {
    fn has(&self, tool: &str) -> bool;
}

/// Looks tools up on the real PATH.
pub struct WhichProbe;

impl ToolProbe for WhichProbe {
    fn has(&self, tool: &str) -> bool {
        which::which(tool).is_ok()
    }
}

// ---------------------------------------------------------------------------
// CommandDetector
// ---------------------------------------------------------------------------

/// One ecosystem's way of inferring a verification command from marker files.
pub trait CommandDetector {
    fn name(&self) -> &'static str;
    fn detect(&self, root: &Path, probe: &dyn ToolProbe) -> Option<String>;
}

pub struct PythonDetector;

impl CommandDetector for PythonDetector {
    fn name(&self) -> &'static str {
        "python"
    }

    fn detect(&self, root: &Path, probe: &dyn ToolProbe) -> Option<String> {
        let marked = ["pyproject.toml", "requirements.txt", "pytest.ini"]
            .iter()
            .any(|m| root.join(m).exists());
        (marked && probe.has("pytest")).then(|| "pytest -q".to_string())
    }
}

pub struct GoDetector;

impl CommandDetector for GoDetector {
    fn name(&self) -> &'static str {
        "go"
    }

    fn detect(&self, root: &Path, probe: &dyn ToolProbe) -> Option<String> {
        (root.join("go.mod").exists() && probe.has("go")).then(|| "go test ./...".to_string())
    }
}

pub struct CargoDetector;

impl CommandDetector for CargoDetector {
    fn name(&self) -> &'static str {
        "cargo"
    }

    fn detect(&self, root: &Path, probe: &dyn ToolProbe) -> Option<String> {
        (root.join("Cargo.toml").exists() && probe.has("cargo"))
            .then(|| "cargo test -q".to_string())
    }
}

/// Only when `package.json` declares a `scripts.test` entry.
pub struct NpmDetector;

impl CommandDetector for NpmDetector {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn detect(&self, root: &Path, probe: &dyn ToolProbe) -> Option<String> {
        let manifest = root.join("package.json");
        if !manifest.exists() || !probe.has("npm") {
            return None;
        }
        let data = std::fs::read_to_string(&manifest).ok()?;
        let json: serde_json::Value = serde_json::from_str(&data).ok()?;
        json.get("scripts")?
            .get("test")
            .map(|_| "npm test --silent".to_string())
    }
}

pub fn default_detectors() -> Vec<Box<dyn CommandDetector>> {
    vec![
        Box::new(PythonDetector),
        Box::new(GoDetector),
        Box::new(CargoDetector),
        Box::new(NpmDetector),
    ]
}

/// Every command the detectors infer, in detector order.
pub fn detect_commands(
    root: &Path,
    detectors: &[Box<dyn CommandDetector>],
    probe: &dyn ToolProbe,
) -> Vec<String> {
    detectors
        .iter()
        .filter_map(|d| {
            let cmd = d.detect(root, probe);
            if let Some(c) = &cmd {
                tracing::debug!(detector = d.name(), command = %c, "detected gate command");
            }
            cmd
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::testing::FakeProbe;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn markers_without_tools_detect_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module x").unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let cmds = detect_commands(dir.path(), &default_detectors(), &FakeProbe(&[]));
        assert!(cmds.is_empty());
    }

    #[test]
    fn detects_in_fixed_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pytest.ini"), "").unwrap();
        std::fs::write(dir.path().join("go.mod"), "module x").unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let probe = FakeProbe(&["pytest", "go", "cargo"]);
        let cmds = detect_commands(dir.path(), &default_detectors(), &probe);
        assert_eq!(cmds, vec!["pytest -q", "go test ./...", "cargo test -q"]);
    }

    #[test]
    fn npm_requires_test_script() {
        let dir = TempDir::new().unwrap();
        let probe = FakeProbe(&["npm"]);
        std::fs::write(dir.path().join("package.json"), r#"{"scripts":{"build":"x"}}"#).unwrap();
        assert_eq!(NpmDetector.detect(dir.path(), &probe), None);

        std::fs::write(dir.path().join("package.json"), r#"{"scripts":{"test":"jest"}}"#).unwrap();
        assert_eq!(
            NpmDetector.detect(dir.path(), &probe).as_deref(),
            Some("npm test --silent")
        );

        std::fs::write(dir.path().join("package.json"), "not json").unwrap();
        assert_eq!(NpmDetector.detect(dir.path(), &probe), None);
    }
}
