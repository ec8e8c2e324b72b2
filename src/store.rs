use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::prompt::PromptSource;
use crate::runner::RunStatus;
use crate::types::AgentEvent;

pub const DEFAULT_RUNS_DIR: &str = ".ralfinho/runs";
pub const META_FILE: &str = "meta.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const RAW_OUTPUT_FILE: &str = "raw-output.log";
pub const SESSION_FILE: &str = "session.log";
pub const PROMPT_FILE: &str = "effective-prompt.md";
pub const LOG_FILE: &str = "ralfinho.log";

/// Metadata written to `meta.json` when a run starts and again when it ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub agent: String,
    pub prompt_source: PromptSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_file: Option<PathBuf>,
    pub max_iterations: u32,
    pub iterations_completed: u32,
    #[serde(default)]
    pub events_count: usize,
}

impl RunMeta {
    pub fn started_local(&self) -> DateTime<Local> {
        self.started_at.with_timezone(&Local)
    }
}

/// A run directory that was just created.
#[derive(Debug, Clone)]
pub struct RunDir {
    pub id: String,
    pub path: PathBuf,
}

/// Root directory holding one sub-directory per run.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_run(&self) -> Result<RunDir> {
        if self.root.as_os_str().is_empty() {
            bail!("runs directory cannot be empty");
        }
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create runs directory {}", self.root.display()))?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = self.root.join(&id);
        fs::create_dir_all(&path)
            .with_context(|| format!("create run directory {}", path.display()))?;
        Ok(RunDir { id, path })
    }

    /// Resolves a unique run-id prefix to the full id.
    pub fn resolve_run_id(&self, prefix: &str) -> Result<String> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("read runs directory {}", self.root.display()))?;

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(prefix) {
                matches.push(name);
            }
        }
        matches.sort();

        match matches.len() {
            0 => bail!("no run found matching {prefix:?}"),
            1 => Ok(matches.remove(0)),
            count => bail!(
                "ambiguous run id {prefix:?} matches {count} runs:\n  {}",
                matches.join("\n  ")
            ),
        }
    }

    /// Runs with a readable `meta.json`, newest first.
    pub fn list_runs(&self) -> Result<Vec<RunMeta>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read runs directory {}", self.root.display()))
            }
        };

        let mut runs = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                continue;
            }
            match read_meta(&entry.path()) {
                Ok(meta) => runs.push(meta),
                Err(err) => tracing::debug!(path = %entry.path().display(), error = %err, "skipping run"),
            }
        }
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    pub fn load_run(&self, prefix: &str) -> Result<SavedRun> {
        let id = self.resolve_run_id(prefix)?;
        let dir = self.root.join(&id);
        let meta = read_meta(&dir)?;
        let events = read_events(&dir)?;
        let prompt = fs::read_to_string(dir.join(PROMPT_FILE)).ok();
        Ok(SavedRun {
            meta,
            events,
            prompt,
        })
    }
}

/// A persisted run loaded for the read-only viewer.
#[derive(Debug, Clone)]
pub struct SavedRun {
    pub meta: RunMeta,
    pub events: Vec<AgentEvent>,
    pub prompt: Option<String>,
}

/// Append-only files of one live run.
#[derive(Debug)]
pub struct Artifacts {
    dir: PathBuf,
    events: File,
    raw_output: File,
    session: File,
    events_count: usize,
}

impl Artifacts {
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            events: open_append(&dir.join(EVENTS_FILE))?,
            raw_output: open_append(&dir.join(RAW_OUTPUT_FILE))?,
            session: open_append(&dir.join(SESSION_FILE))?,
            events_count: 0,
        })
    }

    pub fn events_count(&self) -> usize {
        self.events_count
    }

    pub fn append_raw_output(&mut self, iteration: u32, output: &str) -> Result<()> {
        write!(
            self.raw_output,
            "\n=== iteration {iteration} ({}) ===\n{output}",
            Local::now().to_rfc3339()
        )
        .context("write raw output")
    }

    pub fn append_session_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.session, "{} {line}", Local::now().to_rfc3339())
            .context("write session log")
    }

    pub fn append_events(&mut self, events: &[AgentEvent]) -> Result<()> {
        for event in events {
            let mut line = serde_json::to_vec(event).context("serialize event")?;
            line.push(b'\n');
            self.events.write_all(&line).context("write event")?;
            self.events_count += 1;
        }
        Ok(())
    }

    pub fn write_meta(&self, meta: &RunMeta) -> Result<()> {
        write_meta(&self.dir, meta)
    }

    pub fn write_prompt(&self, prompt: &str) -> Result<()> {
        let path = self.dir.join(PROMPT_FILE);
        fs::write(&path, prompt).with_context(|| format!("write {}", path.display()))
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))
}

pub fn write_meta(dir: &Path, meta: &RunMeta) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(meta).context("serialize meta")?;
    json.push(b'\n');
    let path = dir.join(META_FILE);
    fs::write(&path, json).with_context(|| format!("write {}", path.display()))
}

pub fn read_meta(dir: &Path) -> Result<RunMeta> {
    let path = dir.join(META_FILE);
    let data = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parse {}", path.display()))
}

/// Reads `events.jsonl`, skipping blank lines.
pub fn read_events(dir: &Path) -> Result<Vec<AgentEvent>> {
    let path = dir.join(EVENTS_FILE);
    let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;

    let mut events = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .with_context(|| format!("parse {} line {}", path.display(), idx + 1))?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_meta(id: &str, started_at: DateTime<Utc>) -> RunMeta {
        RunMeta {
            run_id: id.to_string(),
            started_at,
            ended_at: None,
            status: RunStatus::Running,
            agent: "pi".to_string(),
            prompt_source: PromptSource::Default,
            prompt_file: None,
            plan_file: None,
            max_iterations: 0,
            iterations_completed: 0,
            events_count: 0,
        }
    }

    #[test]
    fn test_create_run_makes_unique_hex_directories() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path().join("runs"));
        let first = store.create_run().unwrap();
        let second = store.create_run().unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.id.len(), 32);
        assert!(first.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(first.path.is_dir());
    }

    #[test]
    fn test_empty_root_is_rejected() {
        assert!(RunStore::new("").create_run().is_err());
    }

    #[test]
    fn test_artifacts_round_trip_events_and_meta() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        let run = store.create_run().unwrap();
        let mut artifacts = Artifacts::open(&run.path).unwrap();

        let events = vec![
            AgentEvent::Iteration { iteration: 1 },
            AgentEvent::TurnStart,
            AgentEvent::RawLine {
                line: "hello".to_string(),
            },
        ];
        artifacts.append_events(&events).unwrap();
        artifacts.append_raw_output(1, "hello\n").unwrap();
        artifacts.append_session_line("iteration 1 ok").unwrap();
        assert_eq!(artifacts.events_count(), 3);

        let mut meta = sample_meta(&run.id, Utc::now());
        meta.events_count = artifacts.events_count();
        artifacts.write_meta(&meta).unwrap();

        let loaded = store.load_run(&run.id[..6]).unwrap();
        assert_eq!(loaded.events, events);
        assert_eq!(loaded.meta, meta);
        assert_eq!(loaded.prompt, None);

        let raw = fs::read_to_string(run.path.join(RAW_OUTPUT_FILE)).unwrap();
        assert!(raw.contains("=== iteration 1 ("));
        assert!(raw.ends_with("hello\n"));
    }

    #[test]
    fn test_read_events_reports_bad_line_number() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(EVENTS_FILE),
            "{\"type\":\"turn_start\"}\n\nnot json\n",
        )
        .unwrap();
        let err = read_events(tmp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("line 3"));
    }

    #[test]
    fn test_resolve_run_id_prefix_rules() {
        let tmp = TempDir::new().unwrap();
        for name in ["abc111", "abc222", "def333"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }
        fs::write(tmp.path().join("abc-file"), "").unwrap();
        let store = RunStore::new(tmp.path());

        assert_eq!(store.resolve_run_id("def").unwrap(), "def333");
        assert_eq!(store.resolve_run_id("abc1").unwrap(), "abc111");
        let ambiguous = store.resolve_run_id("abc").unwrap_err().to_string();
        assert!(ambiguous.contains("matches 2 runs"));
        assert!(store
            .resolve_run_id("zzz")
            .unwrap_err()
            .to_string()
            .contains("no run found"));
    }

    #[test]
    fn test_list_runs_newest_first_and_skips_broken() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        let older = store.create_run().unwrap();
        let newer = store.create_run().unwrap();
        let broken = store.create_run().unwrap();

        let now = Utc::now();
        write_meta(&older.path, &sample_meta(&older.id, now - chrono::Duration::hours(1))).unwrap();
        write_meta(&newer.path, &sample_meta(&newer.id, now)).unwrap();
        fs::write(broken.path.join(META_FILE), "{").unwrap();

        let runs = store.list_runs().unwrap();
        let ids: Vec<&str> = runs.iter().map(|meta| meta.run_id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
    }

    #[test]
    fn test_list_runs_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path().join("nope"));
        assert!(store.list_runs().unwrap().is_empty());
    }
}
