use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use super::{CodeExecutor, ExecutionReport};
use crate::agent::code_blocks::CodeBlock;
use crate::config::ExecutionConfig;

static FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptKind {
    Python,
    Shell,
}

impl ScriptKind {
    fn from_language(language: Option<&str>) -> Option<Self> {
        match language {
            None | Some("python" | "py" | "python3") => Some(Self::Python),
            Some("sh" | "bash" | "shell" | "console") => Some(Self::Shell),
            Some(_) => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::Shell => "sh",
        }
    }
}

/// Runs code blocks as child processes inside the working directory.
#[derive(Debug, Clone)]
pub struct LocalCodeExecutor {
    python_bin: String,
    work_dir: PathBuf,
    timeout: Duration,
}

impl LocalCodeExecutor {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            python_bin: config.python_bin.clone(),
            work_dir: config.work_dir.clone(),
            timeout: config.timeout,
        }
    }

    async fn run_block(&self, block: &CodeBlock) -> ExecutionReport {
        let Some(kind) = ScriptKind::from_language(block.language.as_deref()) else {
            return ExecutionReport {
                exit_code: 1,
                logs: format!(
                    "unknown language {}",
                    block.language.as_deref().unwrap_or_default()
                ),
            };
        };

        if let Err(err) = tokio::fs::create_dir_all(&self.work_dir).await {
            return ExecutionReport {
                exit_code: 1,
                logs: format!(
                    "failed to create work dir {}: {err}",
                    self.work_dir.display()
                ),
            };
        }

        let file_name = format!(
            "tmp_code_{}_{}.{}",
            std::process::id(),
            FILE_COUNTER.fetch_add(1, Ordering::Relaxed),
            kind.extension()
        );
        if let Err(err) = tokio::fs::write(self.work_dir.join(&file_name), &block.code).await {
            return ExecutionReport {
                exit_code: 1,
                logs: format!("failed to write {file_name}: {err}"),
            };
        }

        let program = match kind {
            ScriptKind::Python => self.python_bin.as_str(),
            ScriptKind::Shell => "sh",
        };
        let mut cmd = Command::new(program);
        cmd.arg(&file_name)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ExecutionReport {
                    exit_code: 1,
                    logs: format!("failed to start {program}: {err}"),
                };
            }
        };

        match timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => ExecutionReport {
                exit_code: 1,
                logs: "Timeout".to_string(),
            },
            Ok(Err(err)) => ExecutionReport {
                exit_code: 1,
                logs: format!("{program} failed: {err}"),
            },
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if output.status.success() {
                    ExecutionReport {
                        exit_code: 0,
                        logs: stdout,
                    }
                } else {
                    ExecutionReport {
                        exit_code: output.status.code().unwrap_or(1),
                        logs: if stderr.is_empty() { stdout } else { stderr },
                    }
                }
            }
        }
    }
}

impl CodeExecutor for LocalCodeExecutor {
    async fn execute(&self, blocks: &[CodeBlock]) -> ExecutionReport {
        let mut logs = String::new();

        for block in blocks {
            let report = self.run_block(block).await;
            logs.push('\n');
            logs.push_str(&report.logs);
            if !report.succeeded() {
                return ExecutionReport {
                    exit_code: report.exit_code,
                    logs,
                };
            }
        }

        ExecutionReport { exit_code: 0, logs }
    }
}
