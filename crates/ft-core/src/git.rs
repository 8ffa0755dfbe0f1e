use crate::error::{HarnessError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Thin wrapper over the `git` binary, always run from the project root.
///
/// Query helpers (`branch_exists`, `is_ancestor`) treat a non-zero exit as
/// "no"; mutating helpers turn a non-zero exit into [`HarnessError::Git`].
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn output(&self, dir: &Path, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .current_dir(dir)
            .args(args)
            .output()
            .map_err(|e| HarnessError::Git {
                command: args.join(" "),
                stderr: e.to_string(),
            })
    }

    fn run_in(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let out = self.output(dir, args)?;
        if !out.status.success() {
            return Err(HarnessError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim_end().to_string())
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        self.run_in(&self.root, args)
    }

    fn succeeds(&self, args: &[&str]) -> Result<bool> {
        Ok(self.output(&self.root, args)?.status.success())
    }

    pub fn ensure_repo(&self) -> Result<()> {
        match self.run(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) if out.trim() == "true" => Ok(()),
            _ => Err(HarnessError::NotARepository(self.root.clone())),
        }
    }

    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        self.succeeds(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ])
    }

    /// True when `branch` is an ancestor of `base` (a real merge check).
    pub fn is_ancestor(&self, branch: &str, base: &str) -> Result<bool> {
        self.succeeds(&["merge-base", "--is-ancestor", branch, base])
    }

    pub fn current_branch(&self) -> Result<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// `main`, else `master`, else the current branch, else `HEAD`.
    pub fn pick_base_branch(&self) -> Result<String> {
        for candidate in ["main", "master"] {
            if self.branch_exists(candidate)? {
                return Ok(candidate.to_string());
            }
        }
        match self.current_branch() {
            Ok(b) if !b.is_empty() => Ok(b),
            _ => Ok("HEAD".to_string()),
        }
    }

    pub fn worktree_add(&self, path: &Path, branch: &str, base: &str) -> Result<()> {
        let path = path.to_string_lossy();
        self.run(&["worktree", "add", &path, "-b", branch, base])?;
        Ok(())
    }

    pub fn worktree_remove(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.run(&["worktree", "remove", &path])?;
        Ok(())
    }

    /// Porcelain status lines of the working copy at `dir`.
    pub fn status_porcelain(&self, dir: &Path) -> Result<Vec<String>> {
        let out = self.run_in(dir, &["status", "--porcelain"])?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn delete_branch(&self, branch: &str) -> Result<()> {
        self.run(&["branch", "-D", branch])?;
        Ok(())
    }

    /// Stage everything and commit with the message in `message_file`.
    /// Returns the new HEAD hash.
    pub fn commit_all(&self, dir: &Path, message_file: &Path) -> Result<String> {
        let file = message_file.to_string_lossy();
        self.run_in(dir, &["add", "-A"])?;
        self.run_in(dir, &["commit", "-F", &file])?;
        self.run_in(dir, &["rev-parse", "HEAD"])
    }

    /// Full message of `hash`, or `None` when the commit does not exist.
    pub fn commit_message(&self, hash: &str) -> Result<Option<String>> {
        let out = self.output(&self.root, &["show", "-s", "--format=%B", hash])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).into_owned()))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{git, init_repo};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn base_branch_prefers_main() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let g = Git::new(dir.path());
        g.ensure_repo().unwrap();
        assert_eq!(g.pick_base_branch().unwrap(), "main");
    }

    #[test]
    fn ancestor_check_is_a_real_merge_check() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let g = Git::new(dir.path());
        git(dir.path(), &["branch", "feat/x"]);
        assert!(g.branch_exists("feat/x").unwrap());
        assert!(g.is_ancestor("feat/x", "main").unwrap());

        git(dir.path(), &["checkout", "-q", "feat/x"]);
        std::fs::write(dir.path().join("new.txt"), "x").unwrap();
        git(dir.path(), &["add", "new.txt"]);
        git(dir.path(), &["commit", "-q", "-m", "work"]);
        git(dir.path(), &["checkout", "-q", "main"]);
        assert!(!g.is_ancestor("feat/x", "main").unwrap());
        assert!(!g.branch_exists("feat/missing").unwrap());
    }

    #[test]
    fn missing_commit_has_no_message() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let g = Git::new(dir.path());
        assert!(g
            .commit_message("0000000000000000000000000000000000000000")
            .unwrap()
            .is_none());
        let head = git(dir.path(), &["rev-parse", "HEAD"]);
        assert_eq!(g.commit_message(&head).unwrap().unwrap().trim(), "initial");
    }

    #[test]
    fn not_a_repository() {
        let dir = TempDir::new().unwrap();
        let err = Git::new(dir.path()).ensure_repo().unwrap_err();
        assert!(matches!(err, HarnessError::NotARepository(_)));
    }
}
