mod local;

pub use local::LocalCodeExecutor;

use crate::agent::code_blocks::CodeBlock;

const SUCCESS_LABEL: &str = "execution succeeded";
const FAILURE_LABEL: &str = "execution failed";

/// Outcome of running one solver message's code blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub exit_code: i32,
    pub logs: String,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// The executor's reply as it appears in the transcript.
    pub fn to_message(&self) -> String {
        let label = if self.succeeded() {
            SUCCESS_LABEL
        } else {
            FAILURE_LABEL
        };
        format!(
            "exitcode: {} ({label})\nCode output: {}",
            self.exit_code, self.logs
        )
    }
}

pub trait CodeExecutor {
    fn execute(
        &self,
        blocks: &[CodeBlock],
    ) -> impl std::future::Future<Output = ExecutionReport> + Send;
}
