use crate::agent::ConversationEvent;
use crate::cli::theme::Theme;
use crate::config::ThemeToken;
use crate::llm::provider::LlmTokenUsageTotals;
use ratatui::text::{Line, Span};
use std::path::PathBuf;

pub(crate) const STREAM_CURSOR: &str = "▌";
const STEP_PADDING: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputKind {
    AssistantText,
    FigureInfo,
    SystemInfo,
    SystemError,
}

#[derive(Debug, Clone)]
pub(crate) enum TimelineEntry {
    UserCommand(String),
    OutputLine { kind: OutputKind, text: String },
    AssistantTurn(AssistantTurn),
}

#[derive(Debug, Clone)]
pub(crate) struct AssistantTurn {
    pub(crate) question: String,
    pub(crate) steps: Vec<StepEvent>,
    pub(crate) state: AssistantTurnState,
    pub(crate) token_usage: Option<LlmTokenUsageTotals>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AssistantTurnState {
    InFlight,
    /// Text being revealed one word at a time.
    Streaming { text: String, revealed_words: usize },
    CompletedText(String),
    CompletedFigure(PathBuf),
    CompletedError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepEvent {
    Solver(String),
    Executor(String),
}

impl StepEvent {
    pub(crate) fn from_conversation(event: &ConversationEvent) -> Self {
        match event {
            ConversationEvent::SolverReplied {
                round,
                code_blocks,
                terminated,
            } => {
                let blocks = match code_blocks {
                    0 => "no code".to_string(),
                    1 => "1 code block".to_string(),
                    n => format!("{n} code blocks"),
                };
                let suffix = if *terminated { ", done" } else { "" };
                Self::Solver(format!("-> solver #{round}: {blocks}{suffix}"))
            }
            ConversationEvent::ExecutorReplied { round, exit_code } => match exit_code {
                Some(0) => Self::Executor(format!("<- executor #{round}: execution succeeded")),
                Some(code) => Self::Executor(format!(
                    "<- executor #{round}: execution failed (exit code {code})"
                )),
                None => Self::Executor(format!("<- executor #{round}: nothing to run")),
            },
        }
    }
}

impl AssistantTurn {
    /// Reveals one more word. Returns false once the whole text is shown, at
    /// which point the turn settles into `CompletedText`.
    pub(crate) fn advance_stream(&mut self) -> bool {
        let AssistantTurnState::Streaming {
            text,
            revealed_words,
        } = &mut self.state
        else {
            return false;
        };

        if *revealed_words < word_count(text) {
            *revealed_words += 1;
            return true;
        }

        self.state = AssistantTurnState::CompletedText(std::mem::take(text));
        false
    }

    pub(crate) fn finish_stream(&mut self) {
        if let AssistantTurnState::Streaming { text, .. } = &mut self.state {
            self.state = AssistantTurnState::CompletedText(std::mem::take(text));
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_output(&mut self, kind: OutputKind, text: &str) {
        for line in split_output_lines(text) {
            self.entries.push(TimelineEntry::OutputLine {
                kind,
                text: line.to_string(),
            });
        }
    }

    pub(crate) fn push_user_command(&mut self, text: &str) {
        for line in split_output_lines(text) {
            self.entries
                .push(TimelineEntry::UserCommand(line.to_string()));
        }
    }

    pub(crate) fn push_assistant_turn(&mut self, question: String) -> usize {
        let index = self.entries.len();
        self.entries
            .push(TimelineEntry::AssistantTurn(AssistantTurn {
                question,
                steps: Vec::new(),
                state: AssistantTurnState::InFlight,
                token_usage: None,
            }));
        index
    }

    pub(crate) fn assistant_turn_mut(&mut self, index: usize) -> Option<&mut AssistantTurn> {
        match self.entries.get_mut(index) {
            Some(TimelineEntry::AssistantTurn(turn)) => Some(turn),
            _ => None,
        }
    }

    pub(crate) fn render_lines(&self, theme: &Theme, show_steps: bool) -> Vec<Line<'static>> {
        if self.entries.is_empty() {
            return vec![Line::from(Span::styled(
                "Welcome to DataChat.ai. Ask a question about your dataset, or type /help. Ctrl-T toggles showing agent steps.",
                theme.style(ThemeToken::SystemInfo),
            ))];
        }

        let mut lines = Vec::new();
        for entry in &self.entries {
            match entry {
                TimelineEntry::UserCommand(text) => lines.push(Line::from(vec![
                    Span::styled("cmd> ", theme.style(ThemeToken::CommandPrompt)),
                    Span::styled(text.clone(), theme.style(ThemeToken::UserInput)),
                ])),
                TimelineEntry::OutputLine { kind, text } => lines.push(Line::from(
                    Span::styled(text.clone(), theme.style(output_token_for(*kind))),
                )),
                TimelineEntry::AssistantTurn(turn) => {
                    render_assistant_turn(turn, theme, show_steps, &mut lines);
                }
            }
        }

        lines
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

fn render_assistant_turn(
    turn: &AssistantTurn,
    theme: &Theme,
    show_steps: bool,
    lines: &mut Vec<Line<'static>>,
) {
    for (idx, line) in split_output_lines(&turn.question).into_iter().enumerate() {
        let prompt = if idx == 0 { "ask> " } else { "     " };
        lines.push(Line::from(vec![
            Span::styled(prompt, theme.style(ThemeToken::AskPrompt)),
            Span::styled(line.to_string(), theme.style(ThemeToken::UserInput)),
        ]));
    }

    if show_steps {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::raw(STEP_PADDING),
            Span::styled("Working...", theme.style(ThemeToken::AssistantWaiting)),
        ]));
        for step in &turn.steps {
            let (token, text) = match step {
                StepEvent::Solver(text) => (ThemeToken::SolverStep, text),
                StepEvent::Executor(text) => (ThemeToken::ExecutorStep, text),
            };
            lines.push(Line::from(Span::styled(
                format!("{STEP_PADDING}{text}"),
                theme.style(token),
            )));
        }
        lines.push(Line::from(""));
    } else if turn.state == AssistantTurnState::InFlight {
        lines.push(Line::from(Span::styled(
            format!("{STEP_PADDING}Working..."),
            theme.style(ThemeToken::AssistantWaiting),
        )));
    }

    match &turn.state {
        AssistantTurnState::InFlight => {}
        AssistantTurnState::Streaming {
            text,
            revealed_words,
        } => {
            let shown = format!("{}{STREAM_CURSOR}", revealed_prefix(text, *revealed_words));
            push_styled_lines(lines, &shown, theme, ThemeToken::AssistantText);
        }
        AssistantTurnState::CompletedText(text) => {
            push_styled_lines(lines, text, theme, ThemeToken::AssistantText);
            render_turn_token_total(theme, lines, turn.token_usage.as_ref());
        }
        AssistantTurnState::CompletedFigure(path) => {
            lines.push(Line::from(Span::styled(
                format!("Figure saved to {}", path.display()),
                theme.style(ThemeToken::FigureInfo),
            )));
            render_turn_token_total(theme, lines, turn.token_usage.as_ref());
        }
        AssistantTurnState::CompletedError(message) => {
            push_styled_lines(lines, message, theme, ThemeToken::SystemError);
            render_turn_token_total(theme, lines, turn.token_usage.as_ref());
        }
    }
}

fn push_styled_lines(lines: &mut Vec<Line<'static>>, text: &str, theme: &Theme, token: ThemeToken) {
    for line in split_output_lines(text) {
        lines.push(Line::from(Span::styled(line.to_string(), theme.style(token))));
    }
}

fn render_turn_token_total(
    theme: &Theme,
    lines: &mut Vec<Line<'static>>,
    usage: Option<&LlmTokenUsageTotals>,
) {
    let Some(usage) = usage else {
        return;
    };
    if usage.requests == 0 {
        return;
    }

    let total_text = if usage.total_tokens == 0 {
        "?".to_string()
    } else {
        usage.total_tokens.to_string()
    };
    lines.push(Line::from(Span::styled(
        format!(
            "{STEP_PADDING}Tokens (turn): {total_text} over {} requests",
            usage.requests
        ),
        theme.style(ThemeToken::SystemInfo),
    )));
}

pub(crate) fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The first `words` words of `text`, keeping the original spacing and line
/// breaks between them.
pub(crate) fn revealed_prefix(text: &str, words: usize) -> &str {
    if words == 0 {
        return "";
    }

    let mut seen = 0;
    let mut in_word = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                seen += 1;
                if seen == words {
                    return &text[..idx];
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }

    text
}

fn split_output_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }

    text.lines().collect()
}

fn output_token_for(kind: OutputKind) -> ThemeToken {
    match kind {
        OutputKind::AssistantText => ThemeToken::AssistantText,
        OutputKind::FigureInfo => ThemeToken::FigureInfo,
        OutputKind::SystemInfo => ThemeToken::SystemInfo,
        OutputKind::SystemError => ThemeToken::SystemError,
    }
}
