//! Turns a finished conversation into the single result shown to the user.
//!
//! The executor's reports are plain text, so everything here keys off a few
//! literal markers. They are kept together so a change in report format only
//! touches this file.

use super::code_blocks::first_code_block;
use super::transcript::Transcript;

pub const SUCCESS_MARKER: &str = "exitcode: 0 (execution succeeded)";
pub const CODE_OUTPUT_MARKER: &str = "Code output:";
pub const FIGURE_TOKEN: &str = "Figure";
pub const TERMINATION_TOKEN: &str = "TERMINATE";
pub const FALLBACK_MESSAGE: &str = "Unable to process your request now. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Text,
    Code,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedResult {
    pub kind: ResultKind,
    pub payload: String,
}

impl ClassifiedResult {
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Text,
            payload: payload.into(),
        }
    }

    pub fn code(payload: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Code,
            payload: payload.into(),
        }
    }

    pub fn fallback() -> Self {
        Self {
            kind: ResultKind::Error,
            payload: FALLBACK_MESSAGE.to_string(),
        }
    }
}

/// Classifies a completed transcript. Only the first successful execution
/// report is consulted.
pub fn classify_transcript(transcript: &Transcript) -> ClassifiedResult {
    let Some(output) = first_success_output(transcript) else {
        return ClassifiedResult::fallback();
    };

    if !output.contains(FIGURE_TOKEN) {
        return ClassifiedResult::text(output);
    }

    match first_code_block(&transcript.concatenated()) {
        Some(block) => ClassifiedResult::code(block.code),
        None => ClassifiedResult::fallback(),
    }
}

/// Best-effort text from a transcript cut short by rate limiting. Figures are
/// not reconstructed on this path.
pub fn salvage_text(transcript: &Transcript) -> Option<ClassifiedResult> {
    first_success_output(transcript).map(ClassifiedResult::text)
}

fn first_success_output(transcript: &Transcript) -> Option<&str> {
    transcript
        .executor_messages()
        .find(|message| message.content.starts_with(SUCCESS_MARKER))
        .map(|message| output_after_marker(&message.content))
}

fn output_after_marker(content: &str) -> &str {
    content
        .rsplit_once(CODE_OUTPUT_MARKER)
        .map_or(content, |(_, output)| output)
}
