use crate::config::Config;
use crate::error::{HarnessError, Result};
use crate::feat::Feat;
use crate::io;
use crate::paths;
use crate::task::{render_checklist, TaskList};
use crate::types::FeatStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

// ---------------------------------------------------------------------------
// Index (index/feats.yaml)
// ---------------------------------------------------------------------------

/// Denormalized projection of one feat's state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub feat_id: String,
    pub title: String,
    pub status: FeatStatus,
    pub branch: String,
    pub worktree_name: String,
    pub updated_at: DateTime<Utc>,
}

impl IndexEntry {
    pub fn of(feat: &Feat) -> Self {
        Self {
            feat_id: feat.feat_id.clone(),
            title: feat.title.clone(),
            status: feat.status,
            branch: feat.branch.clone(),
            worktree_name: feat.worktree_name.clone(),
            updated_at: feat.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub feats: Vec<IndexEntry>,
}

impl Default for Index {
    fn default() -> Self {
        Self {
            version: 1,
            updated_at: Utc::now(),
            feats: Vec::new(),
        }
    }
}

impl Index {
    pub fn load(root: &Path) -> Result<Self> {
        ensure_initialized(root)?;
        let path = paths::index_path(root);
        if !path.exists() {
            return Ok(Index::default());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&mut self, root: &Path) -> Result<()> {
        self.updated_at = Utc::now();
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&paths::index_path(root), data.as_bytes())
    }

    pub fn find(&self, feat_id: &str) -> Option<&IndexEntry> {
        self.feats.iter().find(|e| e.feat_id == feat_id)
    }

    /// Replace the entry with the same feat_id, else append; keep sorted.
    pub fn upsert(&mut self, entry: IndexEntry) {
        match self.feats.iter_mut().find(|e| e.feat_id == entry.feat_id) {
            Some(existing) => *existing = entry,
            None => self.feats.push(entry),
        }
        self.feats.sort_by(|a, b| a.feat_id.cmp(&b.feat_id));
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Loads and saves a feat's paired documents. Physical location always comes
/// from the index status, never from probing both stores.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Status the index currently records for `feat_id`.
    pub fn indexed_status(&self, feat_id: &str) -> Result<FeatStatus> {
        paths::validate_feat_id(feat_id)?;
        let index = Index::load(&self.root)?;
        index
            .find(feat_id)
            .map(|e| e.status)
            .ok_or_else(|| HarnessError::FeatNotFound(feat_id.to_string()))
    }

    /// Directory of `feat_id` in whichever store the index places it.
    pub fn location(&self, feat_id: &str) -> Result<PathBuf> {
        let status = self.indexed_status(feat_id)?;
        Ok(paths::feat_dir(&self.root, feat_id, status))
    }

    pub fn load(&self, feat_id: &str) -> Result<(Feat, TaskList)> {
        let status = self.indexed_status(feat_id)?;
        let state_path = paths::state_path(&self.root, feat_id, status);
        let tasks_path = paths::tasks_path(&self.root, feat_id, status);
        let feat: Feat = read_yaml(&state_path)?;
        let tasks: TaskList = read_yaml(&tasks_path)?;
        Ok((feat, tasks))
    }

    /// Write both documents, regenerate the checklist, then upsert the index.
    /// Returns the status now recorded in the index; callers resolving the
    /// feat's location afterwards must use this value.
    pub fn save(&self, feat: &mut Feat, tasks: &mut TaskList) -> Result<FeatStatus> {
        self.indexed_status(&feat.feat_id)?;
        self.write(feat, tasks)
    }

    fn write(&self, feat: &mut Feat, tasks: &mut TaskList) -> Result<FeatStatus> {
        let now = Utc::now();
        feat.updated_at = now;
        tasks.updated_at = now;
        tasks.feat_id = feat.feat_id.clone();

        let dir = paths::feat_dir(&self.root, &feat.feat_id, feat.status);
        io::atomic_write(
            &dir.join(paths::STATE_FILE),
            serde_yaml::to_string(&*feat)?.as_bytes(),
        )?;
        io::atomic_write(
            &dir.join(paths::TASKS_FILE),
            serde_yaml::to_string(&*tasks)?.as_bytes(),
        )?;
        io::atomic_write(
            &dir.join(paths::CHECKLIST_FILE),
            render_checklist(&feat.feat_id, &tasks.tasks).as_bytes(),
        )?;

        let mut index = Index::load(&self.root)?;
        index.upsert(IndexEntry::of(feat));
        index.save(&self.root)?;
        debug!(feat = %feat.feat_id, status = %feat.status, "saved feat");
        Ok(feat.status)
    }
}

/// First save of a brand-new feat; the only path that may add an index entry
/// for an unknown feat_id.
pub(crate) fn create(root: &Path, feat: &Feat, tasks: &TaskList) -> Result<()> {
    let mut feat = feat.clone();
    let mut tasks = tasks.clone();
    Store::new(root).write(&mut feat, &mut tasks)?;
    Ok(())
}

pub(crate) fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(HarnessError::DocumentMissing(path.to_path_buf()));
    }
    let data = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&data)?)
}

pub fn ensure_initialized(root: &Path) -> Result<()> {
    if !paths::harness_dir(root).is_dir() {
        return Err(HarnessError::NotInitialized);
    }
    Ok(())
}

/// Directory names present in the active and archived stores, sorted.
pub fn feat_dirs(root: &Path) -> Result<(Vec<String>, Vec<String>)> {
    Ok((
        list_dirs(&paths::active_feats_dir(root))?,
        list_dirs(&paths::archived_feats_dir(root))?,
    ))
}

fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !dir.is_dir() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

const README: &str = "\
# .harness

Feat/task state for this repository. Managed by `ft`.

- `index/feats.yaml`: one entry per feat (derived, rebuild with `ft reindex`)
- `feats/<feat_id>/`: active feats (`state.yaml`, `tasks.yaml`, gate logs)
- `feats-archived/<feat_id>/`: archived feats with `summary.md`
- `config.yaml`: gate commands, project type rules, stop thresholds

Run `ft validate` after editing any document by hand.
";

const INNER_GITIGNORE: &str = "artifacts/*.log\n";

/// Create the store layout. Idempotent: existing files are left untouched.
/// Returns the paths that were newly written.
pub fn init(root: &Path) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    for dir in [
        paths::FEATS_DIR,
        paths::FEATS_ARCHIVED_DIR,
        paths::INDEX_DIR,
        paths::ARTIFACTS_DIR,
    ] {
        io::ensure_dir(&root.join(dir))?;
    }

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        Config::default().save(root)?;
        created.push(config_path);
    }

    let index_path = paths::index_path(root);
    if !index_path.exists() {
        Index::default().save(root)?;
        created.push(index_path);
    }

    for (rel, content) in [("README.md", README), (".gitignore", INNER_GITIGNORE)] {
        let path = paths::harness_dir(root).join(rel);
        if io::write_if_missing(&path, content.as_bytes())? {
            created.push(path);
        }
    }

    if io::ensure_gitignore_entry(root, paths::WORKTREES_DIR)? {
        created.push(root.join(".gitignore"));
    }
    Ok(created)
}

/// Regenerate the index from the state documents in both stores. Directories
/// without a readable state document, or whose status belongs in the other
/// store, are skipped and returned. An id present in both stores is skipped
/// from each.
pub fn rebuild_index(root: &Path) -> Result<(Index, Vec<String>)> {
    ensure_initialized(root)?;
    let (active, archived) = feat_dirs(root)?;
    let mut index = Index::default();
    let mut skipped = Vec::new();

    let in_both: HashSet<String> = active
        .iter()
        .filter(|id| archived.contains(id))
        .cloned()
        .collect();
    let stores = [
        (paths::active_feats_dir(root), active, false),
        (paths::archived_feats_dir(root), archived, true),
    ];
    for (base, ids, archived_store) in stores {
        for id in ids {
            if in_both.contains(&id) {
                skipped.push(id);
                continue;
            }
            match read_yaml::<Feat>(&base.join(&id).join(paths::STATE_FILE)) {
                Ok(feat)
                    if feat.feat_id == id
                        && (feat.status == FeatStatus::Archived) == archived_store =>
                {
                    index.upsert(IndexEntry::of(&feat))
                }
                _ => skipped.push(id),
            }
        }
    }
    index.save(root)?;
    Ok((index, skipped))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::task::Task;

    /// Persist a feat with a single todo task `T-001`, without touching git.
    pub fn seed(root: &Path, id: &str) -> (Feat, TaskList) {
        let feat = Feat::new(id, "Seed", "seed", "goal", "main");
        let tasks = TaskList::new(id, vec![Task::new("T-001", "first")]);
        create(root, &feat, &tasks).unwrap();
        Store::new(root).load(id).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::seed;
    use super::*;
    use crate::types::TaskStatus;
    use tempfile::TempDir;

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let first = init(dir.path()).unwrap();
        assert!(!first.is_empty());
        assert!(dir.path().join(".harness/config.yaml").exists());
        assert!(dir.path().join(".harness/index/feats.yaml").exists());
        let second = init(dir.path()).unwrap();
        assert!(second.is_empty());
        let gi = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gi.matches(".worktrees").count(), 1);
    }

    #[test]
    fn load_unknown_feat_is_not_found() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        let err = Store::new(dir.path()).load("f-20250101-nope").unwrap_err();
        assert!(matches!(err, HarnessError::FeatNotFound(_)));
    }

    #[test]
    fn load_before_init_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        let err = Store::new(dir.path()).load("f-20250101-nope").unwrap_err();
        assert!(matches!(err, HarnessError::NotInitialized));
    }

    #[test]
    fn missing_tasks_document_is_reported() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        seed(dir.path(), "f-20250101-a");
        std::fs::remove_file(dir.path().join(".harness/feats/f-20250101-a/tasks.yaml")).unwrap();
        let err = Store::new(dir.path()).load("f-20250101-a").unwrap_err();
        assert!(matches!(err, HarnessError::DocumentMissing(_)));
    }

    #[test]
    fn save_mirrors_status_into_index_and_checklist() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        let (mut feat, mut tasks) = seed(dir.path(), "f-20250101-a");
        feat.status = FeatStatus::Ready;
        tasks.tasks[0].status = TaskStatus::Done;

        let status = Store::new(dir.path()).save(&mut feat, &mut tasks).unwrap();
        assert_eq!(status, FeatStatus::Ready);
        let index = Index::load(dir.path()).unwrap();
        assert_eq!(index.find("f-20250101-a").unwrap().status, FeatStatus::Ready);
        let md = std::fs::read_to_string(
            dir.path().join(".harness/feats/f-20250101-a/tasks.md"),
        )
        .unwrap();
        assert!(md.contains("- [x] T-001 first"));
    }

    #[test]
    fn upsert_keeps_entries_sorted() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        seed(dir.path(), "f-20250102-b");
        seed(dir.path(), "f-20250101-a");
        let index = Index::load(dir.path()).unwrap();
        let ids: Vec<_> = index.feats.iter().map(|e| e.feat_id.as_str()).collect();
        assert_eq!(ids, vec!["f-20250101-a", "f-20250102-b"]);
    }

    #[test]
    fn rebuild_recovers_lost_index() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        seed(dir.path(), "f-20250101-a");
        seed(dir.path(), "f-20250101-b");
        std::fs::create_dir_all(dir.path().join(".harness/feats/f-20250101-junk")).unwrap();
        Index::default().save(dir.path()).unwrap();

        let (index, skipped) = rebuild_index(dir.path()).unwrap();
        assert_eq!(index.feats.len(), 2);
        assert_eq!(skipped, vec!["f-20250101-junk".to_string()]);
        assert!(Store::new(dir.path()).load("f-20250101-b").is_ok());
    }

    #[test]
    fn rebuild_skips_dirs_in_the_wrong_store() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        seed(dir.path(), "f-20250101-a");
        seed(dir.path(), "f-20250101-b");
        seed(dir.path(), "f-20250101-c");
        seed(dir.path(), "f-20250101-d");
        let active = paths::active_feats_dir(dir.path());
        let archived = paths::archived_feats_dir(dir.path());

        // Non-archived state sitting in the archived store.
        std::fs::rename(active.join("f-20250101-b"), archived.join("f-20250101-b")).unwrap();

        // Archived state sitting in the active store.
        let state = active.join("f-20250101-c").join(paths::STATE_FILE);
        let mut feat: Feat = read_yaml(&state).unwrap();
        feat.status = FeatStatus::Archived;
        std::fs::write(&state, serde_yaml::to_string(&feat).unwrap()).unwrap();

        // Same id in both stores.
        let copy = archived.join("f-20250101-d");
        std::fs::create_dir_all(&copy).unwrap();
        std::fs::copy(
            active.join("f-20250101-d").join(paths::STATE_FILE),
            copy.join(paths::STATE_FILE),
        )
        .unwrap();

        let (index, mut skipped) = rebuild_index(dir.path()).unwrap();
        let ids: Vec<_> = index.feats.iter().map(|e| e.feat_id.as_str()).collect();
        assert_eq!(ids, vec!["f-20250101-a"]);
        skipped.sort();
        assert_eq!(
            skipped,
            vec![
                "f-20250101-b".to_string(),
                "f-20250101-c".to_string(),
                "f-20250101-d".to_string(),
                "f-20250101-d".to_string(),
            ]
        );
    }
}
