//! Run history and persistent revert.
//!
//! Every applied run records per-file blake3 hashes and a whole-file backup
//! of the previous content, so `linecraft revert <run_id>` can restore the
//! exact bytes even after the process (and its in-memory undo stack) is
//! gone.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Generates a short unique run ID (7 characters, like git)
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    let hash = blake3::hash(&timestamp.to_le_bytes());
    let hex = hash.to_hex();
    hex.as_str()[..7].to_string()
}

/// Get the state directory path
///
/// Priority order:
/// 1. Environment variable LINECRAFT_STATE_DIR (highest priority)
/// 2. --local-state flag (uses ./.linecraft)
/// 3. Global default (uses system data directory)
pub fn get_state_dir(local: bool) -> Result<PathBuf> {
    if let Ok(custom_dir) = std::env::var("LINECRAFT_STATE_DIR") {
        return Ok(PathBuf::from(custom_dir));
    }

    if local {
        let current_dir = std::env::current_dir()?;
        Ok(current_dir.join(".linecraft"))
    } else {
        let proj_dirs = ProjectDirs::from("com", "linecraft", "linecraft")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }
}

/// Compute blake3 hash of a file
pub fn hash_file(path: &Path) -> Result<String> {
    let content = fs::read(path)
        .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
    Ok(blake3::hash(&content).to_hex().to_string())
}

/// One file touched by a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileModification {
    pub path: PathBuf,
    /// `None` when the file did not exist before the run.
    pub hash_before: Option<String>,
    /// `None` when the run removed the file.
    pub hash_after: Option<String>,
    /// Backup of the previous content under `<state>/<run_id>/`.
    pub backup_file: Option<String>,
}

/// Status of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Applied,
    Reverted,
}

/// Metadata about a single run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub operation: String,
    pub files_modified: Vec<FileModification>,
    pub status: RunStatus,
    pub can_revert: bool,
}

/// Index of all runs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunsIndex {
    pub runs: HashMap<String, RunMetadata>,
}

impl RunsIndex {
    pub fn load(state_dir: &Path) -> Result<Self> {
        let index_path = state_dir.join("runs.json");
        if !index_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&index_path).context("Failed to read runs index")?;
        let index: RunsIndex =
            serde_json::from_str(&content).context("Failed to parse runs index")?;
        Ok(index)
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        fs::create_dir_all(state_dir)?;
        let content = serde_json::to_string_pretty(self)?;
        atomic_write(state_dir, "runs.json", &content)
    }

    pub fn add_run(&mut self, run: RunMetadata) {
        self.runs.insert(run.run_id.clone(), run);
    }

    pub fn get_run(&self, run_id: &str) -> Option<&RunMetadata> {
        self.runs.get(run_id)
    }

    pub fn get_run_mut(&mut self, run_id: &str) -> Option<&mut RunMetadata> {
        self.runs.get_mut(run_id)
    }

    pub fn get_sorted_runs(&self) -> Vec<&RunMetadata> {
        let mut runs: Vec<_> = self.runs.values().collect();
        runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        runs
    }
}

/// Save the previous content of a file about to be mutated. Returns the
/// backup file name recorded in [`FileModification`].
pub fn save_backup(
    file_path: &Path,
    previous_content: &str,
    seq: usize,
    run_id: &str,
    state_dir: &Path,
) -> Result<String> {
    let backup_dir = state_dir.join(run_id);
    fs::create_dir_all(&backup_dir)?;

    let safe_name = file_path
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("_");

    let backup_name = format!("{safe_name}__{seq}.prev");
    fs::write(backup_dir.join(&backup_name), previous_content)
        .with_context(|| format!("Failed to write backup for {}", file_path.display()))?;
    Ok(backup_name)
}

/// Save run metadata
pub fn save_run_metadata(run: &RunMetadata, state_dir: &Path) -> Result<()> {
    fs::create_dir_all(state_dir)?;
    let content = serde_json::to_string_pretty(run)?;
    atomic_write(state_dir, &format!("{}.json", run.run_id), &content)?;

    let mut index = RunsIndex::load(state_dir)?;
    index.add_run(run.clone());
    index.save(state_dir)?;
    Ok(())
}

/// Load run metadata
pub fn load_run_metadata(run_id: &str, state_dir: &Path) -> Result<RunMetadata> {
    let metadata_path = state_dir.join(format!("{run_id}.json"));
    if !metadata_path.exists() {
        bail!("Run {} not found", run_id);
    }

    let content = fs::read_to_string(&metadata_path).context("Failed to read run metadata")?;
    let metadata: RunMetadata =
        serde_json::from_str(&content).context("Failed to parse run metadata")?;
    Ok(metadata)
}

/// Revert a run by restoring whole-file backups.
pub fn revert_run(run_id: &str, force: bool, state_dir: &Path) -> Result<()> {
    let run = load_run_metadata(run_id, state_dir)?;

    if run.status == RunStatus::Reverted {
        bail!("Run {} has already been reverted", run_id);
    }
    if !run.can_revert {
        bail!("Run {} cannot be reverted", run_id);
    }

    // Verify files haven't changed since the run (unless --force)
    if !force {
        for file in &run.files_modified {
            match &file.hash_after {
                Some(expected) => {
                    if !file.path.exists() {
                        bail!(
                            "File {} no longer exists (use --force to ignore)",
                            file.path.display()
                        );
                    }
                    let current = hash_file(&file.path)?;
                    if &current != expected {
                        bail!(
                            "File {} has changed since run {} (use --force to ignore)\nExpected hash: {}\nCurrent hash: {}",
                            file.path.display(),
                            run_id,
                            expected,
                            current
                        );
                    }
                }
                None => {
                    if file.path.exists() {
                        bail!(
                            "File {} was removed by run {} but exists again (use --force to ignore)",
                            file.path.display(),
                            run_id
                        );
                    }
                }
            }
        }
    }

    println!("Reverting {} file(s)...", run.files_modified.len());
    // Restore in reverse order so chained operations unwind cleanly.
    for file in run.files_modified.iter().rev() {
        match &file.backup_file {
            Some(backup_name) => {
                let backup_path = state_dir.join(run_id).join(backup_name);
                let previous = fs::read_to_string(&backup_path)
                    .with_context(|| format!("Failed to read backup {}", backup_path.display()))?;
                if let Some(parent) = file.path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)?;
                    }
                }
                fs::write(&file.path, previous)
                    .with_context(|| format!("Failed to restore {}", file.path.display()))?;
            }
            None => {
                // No backup means the run created this file.
                if file.path.exists() {
                    fs::remove_file(&file.path).with_context(|| {
                        format!("Failed to remove created file {}", file.path.display())
                    })?;
                }
            }
        }
        println!("  ✓ Restored: {}", file.path.display());
    }

    let mut index = RunsIndex::load(state_dir)?;
    if let Some(run_meta) = index.get_run_mut(run_id) {
        run_meta.status = RunStatus::Reverted;
        run_meta.can_revert = false;
    }
    index.save(state_dir)?;

    let mut run = run;
    run.status = RunStatus::Reverted;
    run.can_revert = false;
    save_run_metadata(&run, state_dir)?;

    println!("✓ Run {} reverted successfully", run_id);
    Ok(())
}

/// Display run history
pub fn show_history(limit: usize, state_dir: &Path) -> Result<()> {
    let index = RunsIndex::load(state_dir)?;
    let runs = index.get_sorted_runs();

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("Recent runs (showing up to {}):\n", limit);
    for run in runs.iter().take(limit) {
        let status_str = match run.status {
            RunStatus::Applied => {
                if run.can_revert {
                    "[can revert]"
                } else {
                    "[applied]"
                }
            }
            RunStatus::Reverted => "[reverted]",
        };

        let files_str = if run.files_modified.len() == 1 {
            "1 file".to_string()
        } else {
            format!("{} files", run.files_modified.len())
        };

        println!(
            "{}  {}  {:20}  {:10}  {}",
            run.run_id,
            run.timestamp.format("%Y-%m-%d %H:%M"),
            truncate_str(&run.operation, 20),
            files_str,
            status_str
        );
    }

    Ok(())
}

/// Clean old state data
pub fn clean_old_state(keep_days: u32, state_dir: &Path) -> Result<()> {
    let index = RunsIndex::load(state_dir)?;
    let cutoff = Utc::now() - Duration::days(keep_days as i64);

    let mut cleaned = 0;
    let mut new_index = RunsIndex::default();

    for run in index.runs.values() {
        if run.timestamp < cutoff {
            let backup_dir = state_dir.join(&run.run_id);
            if backup_dir.exists() {
                fs::remove_dir_all(&backup_dir)?;
            }
            let metadata_path = state_dir.join(format!("{}.json", run.run_id));
            if metadata_path.exists() {
                fs::remove_file(&metadata_path)?;
            }
            cleaned += 1;
        } else {
            new_index.add_run(run.clone());
        }
    }

    new_index.save(state_dir)?;
    println!("✓ Cleaned {} old run(s)", cleaned);
    Ok(())
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

fn atomic_write(dir: &Path, name: &str, content: &str) -> Result<()> {
    let temp_path = dir.join(format!("{name}.tmp"));
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, dir.join(name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();
        assert_eq!(id1.len(), 7);
        assert_eq!(id2.len(), 7);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_hash_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let file_path = temp_dir.path().join("test.txt");

        fs::write(&file_path, "hello world")?;
        let hash1 = hash_file(&file_path)?;

        fs::write(&file_path, "hello world")?;
        assert_eq!(hash1, hash_file(&file_path)?);

        fs::write(&file_path, "goodbye world")?;
        assert_ne!(hash1, hash_file(&file_path)?);
        Ok(())
    }

    #[test]
    fn test_backup_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let state_dir = temp_dir.path().join("state");
        let file_path = PathBuf::from("src/app.py");

        let backup_name = save_backup(&file_path, "previous content\n", 0, "abc1234", &state_dir)?;
        let stored = fs::read_to_string(state_dir.join("abc1234").join(&backup_name))?;
        assert_eq!(stored, "previous content\n");
        assert!(backup_name.contains("src_app.py"));
        Ok(())
    }

    #[test]
    fn test_runs_index() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let state_dir = temp_dir.path().join("state");

        let run = RunMetadata {
            run_id: "abc1234".to_string(),
            timestamp: Utc::now(),
            command: "linecraft apply changes.txt --apply".to_string(),
            operation: "modify".to_string(),
            files_modified: vec![],
            status: RunStatus::Applied,
            can_revert: true,
        };
        save_run_metadata(&run, &state_dir)?;

        let loaded = load_run_metadata("abc1234", &state_dir)?;
        assert_eq!(loaded.run_id, "abc1234");
        assert_eq!(loaded.operation, "modify");

        let index = RunsIndex::load(&state_dir)?;
        assert_eq!(index.runs.len(), 1);
        assert!(index.get_run("abc1234").is_some());
        Ok(())
    }

    #[test]
    fn test_revert_restores_content_and_removes_created() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let state_dir = temp_dir.path().join("state");
        let modified = temp_dir.path().join("mod.txt");
        let created = temp_dir.path().join("new.txt");

        // Simulate a run: mod.txt changed, new.txt created.
        fs::write(&modified, "after\n")?;
        fs::write(&created, "fresh\n")?;
        let backup = save_backup(&modified, "before\n", 0, "run0001", &state_dir)?;

        let run = RunMetadata {
            run_id: "run0001".to_string(),
            timestamp: Utc::now(),
            command: "linecraft apply changes.txt --apply".to_string(),
            operation: "modify, create".to_string(),
            files_modified: vec![
                FileModification {
                    path: modified.clone(),
                    hash_before: Some("x".to_string()),
                    hash_after: Some(hash_file(&modified)?),
                    backup_file: Some(backup),
                },
                FileModification {
                    path: created.clone(),
                    hash_before: None,
                    hash_after: Some(hash_file(&created)?),
                    backup_file: None,
                },
            ],
            status: RunStatus::Applied,
            can_revert: true,
        };
        save_run_metadata(&run, &state_dir)?;

        revert_run("run0001", false, &state_dir)?;

        assert_eq!(fs::read_to_string(&modified)?, "before\n");
        assert!(!created.exists());

        let reloaded = load_run_metadata("run0001", &state_dir)?;
        assert_eq!(reloaded.status, RunStatus::Reverted);
        assert!(!reloaded.can_revert);

        // A second revert is refused.
        assert!(revert_run("run0001", false, &state_dir).is_err());
        Ok(())
    }

    #[test]
    fn test_revert_detects_outside_changes() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let state_dir = temp_dir.path().join("state");
        let file = temp_dir.path().join("f.txt");

        fs::write(&file, "after\n")?;
        let backup = save_backup(&file, "before\n", 0, "run0002", &state_dir)?;
        let run = RunMetadata {
            run_id: "run0002".to_string(),
            timestamp: Utc::now(),
            command: String::new(),
            operation: "modify".to_string(),
            files_modified: vec![FileModification {
                path: file.clone(),
                hash_before: Some("x".to_string()),
                hash_after: Some(hash_file(&file)?),
                backup_file: Some(backup),
            }],
            status: RunStatus::Applied,
            can_revert: true,
        };
        save_run_metadata(&run, &state_dir)?;

        // Someone edits the file after the run.
        fs::write(&file, "tampered\n")?;
        assert!(revert_run("run0002", false, &state_dir).is_err());

        // --force restores anyway.
        revert_run("run0002", true, &state_dir)?;
        assert_eq!(fs::read_to_string(&file)?, "before\n");
        Ok(())
    }
}
