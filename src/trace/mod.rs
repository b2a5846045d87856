use anyhow::{Context, Result, anyhow, bail};
use reqwest::header::HeaderMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::agent::transcript::{Role, Transcript};

const KIND_WIDTH: usize = 9;

/// Where a session keeps its files: `$XDG_STATE_HOME/datachat` or
/// `~/.local/state/datachat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDirs {
    root: PathBuf,
}

impl StateDirs {
    pub fn from_env() -> Result<Self> {
        let xdg_state = std::env::var("XDG_STATE_HOME").ok();
        Self::resolve(xdg_state.as_deref(), dirs::home_dir().as_deref())
    }

    fn resolve(xdg_state_home: Option<&str>, home_dir: Option<&Path>) -> Result<Self> {
        let base = match xdg_state_home.map(str::trim) {
            Some("") => bail!("Failed to resolve state path: XDG_STATE_HOME is set but empty"),
            Some(xdg) => PathBuf::from(xdg),
            None => home_dir
                .ok_or_else(|| anyhow!("Failed to resolve state path: HOME directory is unavailable"))?
                .join(".local")
                .join("state"),
        };
        Ok(Self {
            root: base.join("datachat"),
        })
    }

    pub fn traces(&self) -> PathBuf {
        self.root.join("traces")
    }

    pub fn figures(&self) -> PathBuf {
        self.root.join("figures")
    }
}

/// Append-only per-session log. Clones write to the same file.
///
/// Every line is `[timestamp] [kind     ] text`. Multi-line text becomes one
/// line per source line under the same kind.
#[derive(Clone)]
pub struct SessionTrace {
    shared: Arc<Shared>,
}

struct Shared {
    path: PathBuf,
    // None once a write has failed; the session carries on untraced.
    writer: Mutex<Option<BufWriter<File>>>,
}

impl SessionTrace {
    pub fn create(session_id: &str, dirs: &StateDirs) -> Result<Self> {
        Self::create_in_dir(session_id, &dirs.traces())
    }

    fn create_in_dir(session_id: &str, trace_dir: &Path) -> Result<Self> {
        fs::create_dir_all(trace_dir).with_context(|| {
            format!("Failed to create trace directory {}", trace_dir.display())
        })?;

        let started = OffsetDateTime::now_utc().unix_timestamp();
        let path = trace_dir.join(format!("session-{session_id}-{started}.log"));
        let file = open_private(&path)
            .with_context(|| format!("Failed to create trace file {}", path.display()))?;

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                writer: Mutex::new(Some(BufWriter::new(file))),
            }),
        })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn create_in_temp_dir(session_id: &str, trace_dir: &Path) -> Result<Self> {
        Self::create_in_dir(session_id, trace_dir)
    }

    pub fn file_path(&self) -> &Path {
        &self.shared.path
    }

    pub fn log_question(&self, text: &str) {
        self.log_output("chat.in", text);
    }

    pub fn log_output(&self, kind: &str, text: &str) {
        if text.is_empty() {
            self.write_entry(kind, "<empty>");
        }
        for line in text.lines() {
            self.write_entry(kind, line);
        }
    }

    pub fn log_turn_failure(&self, message: &str) {
        self.log_output("turn.err", message);
    }

    /// One conversation as the agents saw it: the executor speaks as the
    /// user, the solver as the assistant.
    pub fn log_transcript(&self, transcript: &Transcript) {
        self.write_entry("turn", &format!("conversation {}", transcript.conversation_id));
        for message in &transcript.messages {
            let agent = match message.role {
                Role::User => "executor",
                Role::Assistant => "solver",
            };
            self.log_output(agent, &message.content);
        }
    }

    /// Records an HTTP message verbatim under `kind` (`http.in` for what was
    /// sent, `http.out` for what came back).
    pub fn log_http(&self, kind: &str, start_line: &str, headers: &HeaderMap, body: &str) {
        self.write_entry(kind, start_line);
        for (name, value) in headers {
            let value = value.to_str().unwrap_or("<non-utf8>");
            self.write_entry(kind, &format!("{name}: {value}"));
        }
        self.log_output(kind, body);
    }

    pub fn log_http_error(&self, message: &str) {
        self.write_entry("http.err", message);
    }

    fn write_entry(&self, kind: &str, text: &str) {
        let line = format!("[{}] [{kind:<KIND_WIDTH$}] {text}\n", timestamp());
        let Ok(mut guard) = self.shared.writer.lock() else {
            return;
        };
        let Some(writer) = guard.as_mut() else {
            return;
        };
        let written = writer.write_all(line.as_bytes()).and_then(|()| writer.flush());
        if let Err(err) = written {
            *guard = None;
            eprintln!(
                "DataChat.ai trace warning: {} is no longer written: {err}",
                self.shared.path.display()
            );
        }
    }
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
