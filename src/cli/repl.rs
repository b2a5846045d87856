use crate::agent::{
    AnsweredTurn, ConversationEvent, ConversationFactory, FALLBACK_MESSAGE, answer_question,
};
use crate::cli::commands::{Command, help_text, is_command_line};
use crate::cli::render::{Rendered, figure_path, render_result};
use crate::cli::theme::Theme;
use crate::cli::timeline::{AssistantTurnState, OutputKind, StepEvent, Timeline};
use crate::config::{ThemeConfig, ThemeToken};
use crate::dataset::Dataset;
use crate::llm::openai::OpenAiProvider;
use crate::python::PythonSession;
use crate::trace::SessionTrace;
use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Frame;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Position, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, error::TryRecvError};
use tokio::task::JoinHandle;

pub const MISSING_API_KEY_MESSAGE: &str = "Assistant unavailable: missing OPENAI_API_KEY. Configure it in your shell or .env file (example: OPENAI_API_KEY=your_key).";
const BUSY_MESSAGE: &str = "A question is still being answered. Please wait for it to finish.";

const STREAM_WORD_INTERVAL: Duration = Duration::from_millis(100);
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const MAX_VISIBLE_INPUT_LINES: usize = 6;
const MOUSE_SCROLL_ROWS: usize = 3;

/// Everything a chat session is started with.
pub struct AppState {
    pub session_id: String,
    pub dataset: Dataset,
    pub system_prompt: String,
    /// `None` when no API key is configured. Questions are then answered
    /// with a notice instead of a conversation.
    pub assistant: Option<Arc<ConversationFactory<OpenAiProvider>>>,
    /// Interpreter used to draw figures. `None` if it failed to start or
    /// could not load the dataset.
    pub python: Option<PythonSession>,
    pub figure_dir: PathBuf,
    pub theme_config: ThemeConfig,
    pub startup_notices: Vec<String>,
    pub trace: SessionTrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutRegions {
    pub timeline: Rect,
    pub input: Rect,
    pub status: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    fn label(self) -> &'static str {
        match self {
            Self::User => "you",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChatEntry {
    pub(crate) role: ChatRole,
    pub(crate) content: String,
}

enum TurnUpdate {
    Progress(ConversationEvent),
    Finished(Box<AnsweredTurn>),
}

struct ActiveTurn {
    question: String,
    timeline_index: usize,
    receiver: UnboundedReceiver<TurnUpdate>,
    handle: JoinHandle<()>,
}

struct StreamingTurn {
    timeline_index: usize,
    last_word_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct InputBuffer {
    text: String,
    /// Byte offset, always on a char boundary.
    cursor: usize,
}

impl InputBuffer {
    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    fn set(&mut self, text: String) {
        self.cursor = text.len();
        self.text = text;
    }

    fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    fn insert(&mut self, ch: char) {
        self.text.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn backspace(&mut self) {
        if let Some((idx, _)) = self.text[..self.cursor].char_indices().next_back() {
            self.text.remove(idx);
            self.cursor = idx;
        }
    }

    fn delete(&mut self) {
        if self.cursor < self.text.len() {
            self.text.remove(self.cursor);
        }
    }

    fn move_left(&mut self) {
        if let Some((idx, _)) = self.text[..self.cursor].char_indices().next_back() {
            self.cursor = idx;
        }
    }

    fn move_right(&mut self) {
        if let Some(ch) = self.text[self.cursor..].chars().next() {
            self.cursor += ch.len_utf8();
        }
    }

    fn move_home(&mut self) {
        self.cursor = self.text[..self.cursor].rfind('\n').map_or(0, |idx| idx + 1);
    }

    fn move_end(&mut self) {
        self.cursor += self.text[self.cursor..]
            .find('\n')
            .unwrap_or(self.text.len() - self.cursor);
    }

    fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    fn cursor_line_col(&self) -> (usize, usize) {
        let before = &self.text[..self.cursor];
        let line = before.matches('\n').count();
        let col = before.rsplit('\n').next().unwrap_or("").chars().count();
        (line, col)
    }
}

/// Submitted lines, walked with Up/Down. Whatever was being typed before the
/// walk started comes back after the newest entry.
#[derive(Debug, Clone, Default)]
pub(crate) struct InputHistory {
    entries: Vec<String>,
    position: Option<usize>,
    draft: String,
}

impl InputHistory {
    fn push(&mut self, line: &str) {
        if self.entries.last().map(String::as_str) != Some(line) {
            self.entries.push(line.to_string());
        }
        self.position = None;
        self.draft.clear();
    }

    fn previous(&mut self, current: &str) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }

        let next = match self.position {
            None => {
                self.draft = current.to_string();
                self.entries.len() - 1
            }
            Some(idx) => idx.saturating_sub(1),
        };
        self.position = Some(next);
        Some(self.entries[next].clone())
    }

    fn next(&mut self) -> Option<String> {
        let idx = self.position?;
        if idx + 1 < self.entries.len() {
            self.position = Some(idx + 1);
            Some(self.entries[idx + 1].clone())
        } else {
            self.position = None;
            Some(std::mem::take(&mut self.draft))
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct UiState {
    pub(crate) input: InputBuffer,
    pub(crate) input_history: InputHistory,
    pub(crate) show_steps: bool,
    /// Rows scrolled up from the bottom of the timeline. Zero follows new
    /// output.
    pub(crate) timeline_scroll: usize,
    pub(crate) regions: Option<LayoutRegions>,
    timeline_rows: usize,
}

impl UiState {
    fn new() -> Self {
        Self {
            input: InputBuffer::default(),
            input_history: InputHistory::default(),
            show_steps: true,
            timeline_scroll: 0,
            regions: None,
            timeline_rows: 0,
        }
    }

    fn max_timeline_scroll(&self) -> usize {
        let height = self
            .regions
            .map_or(0, |regions| usize::from(regions.timeline.height));
        self.timeline_rows.saturating_sub(height)
    }

    fn scroll_up(&mut self, rows: usize) {
        self.timeline_scroll = (self.timeline_scroll + rows).min(self.max_timeline_scroll());
    }

    fn scroll_down(&mut self, rows: usize) {
        self.timeline_scroll = self.timeline_scroll.saturating_sub(rows);
    }

    fn page_rows(&self) -> usize {
        self.regions
            .map_or(1, |regions| usize::from(regions.timeline.height.max(2) - 1))
    }
}

pub(crate) fn prompt_for(input: &str) -> &'static str {
    if is_command_line(input) {
        "cmd> "
    } else {
        "ask> "
    }
}

pub(crate) struct App {
    state: AppState,
    theme: Theme,
    pub(crate) timeline: Timeline,
    pub(crate) ui: UiState,
    history: Vec<ChatEntry>,
    active_turn: Option<ActiveTurn>,
    streaming: Option<StreamingTurn>,
    last_figure_code: Option<String>,
    figure_count: usize,
    should_quit: bool,
}

impl App {
    pub(crate) fn new(state: AppState) -> Self {
        let color_enabled = std::env::var_os("NO_COLOR").is_none();
        let theme = Theme::from_config(color_enabled, &state.theme_config);
        let mut timeline = Timeline::new();
        for notice in &state.startup_notices {
            timeline.push_output(OutputKind::SystemInfo, notice);
        }

        Self {
            state,
            theme,
            timeline,
            ui: UiState::new(),
            history: Vec::new(),
            active_turn: None,
            streaming: None,
            last_figure_code: None,
            figure_count: 0,
            should_quit: false,
        }
    }

    pub(crate) fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.active_turn.is_some()
    }

    pub(crate) fn prompt(&self) -> &'static str {
        prompt_for(self.ui.input.text())
    }

    pub(crate) fn shutdown(&mut self) {
        if let Some(turn) = self.active_turn.take() {
            turn.handle.abort();
            self.state
                .trace
                .log_turn_failure("session ended while a question was in flight");
        }
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('d') if ctrl => self.should_quit = true,
            KeyCode::Char('t') if ctrl => self.ui.show_steps = !self.ui.show_steps,
            KeyCode::Char('j') if ctrl => self.ui.input.insert('\n'),
            KeyCode::Char(ch) if !ctrl => self.ui.input.insert(ch),
            KeyCode::Enter => self.submit_input(),
            KeyCode::Backspace => self.ui.input.backspace(),
            KeyCode::Delete => self.ui.input.delete(),
            KeyCode::Left => self.ui.input.move_left(),
            KeyCode::Right => self.ui.input.move_right(),
            KeyCode::Home => self.ui.input.move_home(),
            KeyCode::End => self.ui.input.move_end(),
            KeyCode::Up => {
                if let Some(line) = self.ui.input_history.previous(self.ui.input.text()) {
                    self.ui.input.set(line);
                }
            }
            KeyCode::Down => {
                if let Some(line) = self.ui.input_history.next() {
                    self.ui.input.set(line);
                }
            }
            KeyCode::PageUp => {
                let rows = self.ui.page_rows();
                self.ui.scroll_up(rows);
            }
            KeyCode::PageDown => {
                let rows = self.ui.page_rows();
                self.ui.scroll_down(rows);
            }
            _ => {}
        }
    }

    pub(crate) fn handle_mouse(&mut self, mouse: MouseEvent) {
        let Some(regions) = self.ui.regions else {
            return;
        };
        if !regions
            .timeline
            .contains(Position::new(mouse.column, mouse.row))
        {
            return;
        }

        match mouse.kind {
            MouseEventKind::ScrollUp => self.ui.scroll_up(MOUSE_SCROLL_ROWS),
            MouseEventKind::ScrollDown => self.ui.scroll_down(MOUSE_SCROLL_ROWS),
            _ => {}
        }
    }

    fn handle_paste(&mut self, text: &str) {
        for ch in text.replace("\r\n", "\n").chars() {
            self.ui.input.insert(ch);
        }
    }

    fn submit_input(&mut self) {
        let line = self.ui.input.text().trim().to_string();
        if line.is_empty() {
            self.ui.input.clear();
            return;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            self.should_quit = true;
            return;
        }

        if !is_command_line(&line) && self.active_turn.is_some() {
            self.timeline.push_output(OutputKind::SystemInfo, BUSY_MESSAGE);
            return;
        }

        self.ui.input.clear();
        self.ui.input_history.push(&line);
        self.ui.timeline_scroll = 0;

        if is_command_line(&line) {
            self.run_command(&line);
        } else {
            self.start_turn(line);
        }
    }

    fn run_command(&mut self, line: &str) {
        self.timeline.push_user_command(line);
        self.state.trace.log_output("cmd.in", line);

        match line.parse::<Command>() {
            Ok(command) => self.apply_command(command),
            Err(err) => self.push_command_error(&err.to_string()),
        }
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::Help => self.push_command_output(&help_text()),
            Command::Clear => {
                self.finish_streaming();
                self.timeline.clear();
                if let Some(turn) = self.active_turn.as_mut() {
                    turn.timeline_index = self.timeline.push_assistant_turn(turn.question.clone());
                }
                self.state.trace.log_output("cmd.out", "timeline cleared");
            }
            Command::History(limit) => {
                let text = self.history_text(limit);
                self.push_command_output(&text);
            }
            Command::Trace => {
                let text = format!("Trace file: {}", self.state.trace.file_path().display());
                self.push_command_output(&text);
            }
            Command::Columns => {
                let dataset = &self.state.dataset;
                let text = format!(
                    "Dataset: {}\nColumns: {}",
                    dataset.describe(),
                    dataset.columns.join(", ")
                );
                self.push_command_output(&text);
            }
            Command::Prompt => {
                let text = self.state.system_prompt.clone();
                self.push_command_output(&text);
            }
            Command::Steps(value) => {
                self.ui.show_steps = value.unwrap_or(!self.ui.show_steps);
                let text = if self.ui.show_steps {
                    "steps: on"
                } else {
                    "steps: off"
                };
                self.push_command_output(text);
            }
            Command::Code => match self.last_figure_code.clone() {
                Some(code) => self.push_command_output(&code),
                None => self.push_command_output("No figure has been drawn yet."),
            },
        }
    }

    fn history_text(&self, limit: Option<usize>) -> String {
        if self.history.is_empty() {
            return "No chat history yet.".to_string();
        }

        let skip = limit.map_or(0, |n| self.history.len().saturating_sub(n));
        self.history
            .iter()
            .skip(skip)
            .map(|entry| format!("{}: {}", entry.role.label(), entry.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push_command_output(&mut self, text: &str) {
        self.timeline.push_output(OutputKind::SystemInfo, text);
        self.state.trace.log_output("cmd.out", text);
    }

    fn push_command_error(&mut self, text: &str) {
        self.timeline.push_output(OutputKind::SystemError, text);
        self.state.trace.log_output("cmd.err", text);
    }

    fn start_turn(&mut self, question: String) {
        self.finish_streaming();
        self.state.trace.log_question(&question);
        self.history.push(ChatEntry {
            role: ChatRole::User,
            content: question.clone(),
        });
        let timeline_index = self.timeline.push_assistant_turn(question.clone());

        let Some(factory) = self.state.assistant.as_ref() else {
            if let Some(turn) = self.timeline.assistant_turn_mut(timeline_index) {
                turn.state = AssistantTurnState::CompletedError(MISSING_API_KEY_MESSAGE.to_string());
            }
            self.state.trace.log_output("chat.out", MISSING_API_KEY_MESSAGE);
            self.history.push(ChatEntry {
                role: ChatRole::Assistant,
                content: MISSING_API_KEY_MESSAGE.to_string(),
            });
            return;
        };

        let driver = factory.create();
        let (sender, receiver) = mpsc::unbounded_channel();
        let task_question = question.clone();
        let handle = tokio::spawn(async move {
            let mut on_event = |event: ConversationEvent| {
                let _ = sender.send(TurnUpdate::Progress(event));
            };
            let answered = answer_question(driver, &task_question, &mut on_event).await;
            let _ = sender.send(TurnUpdate::Finished(Box::new(answered)));
        });

        self.active_turn = Some(ActiveTurn {
            question,
            timeline_index,
            receiver,
            handle,
        });
    }

    /// Drains progress from the turn in flight without blocking.
    pub(crate) fn poll_turn(&mut self) {
        let Some(active) = self.active_turn.as_mut() else {
            return;
        };

        let mut steps = Vec::new();
        let mut finished = None;
        let mut lost = false;
        loop {
            match active.receiver.try_recv() {
                Ok(TurnUpdate::Progress(event)) => steps.push(StepEvent::from_conversation(&event)),
                Ok(TurnUpdate::Finished(answered)) => {
                    finished = Some(answered);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    lost = true;
                    break;
                }
            }
        }

        let index = active.timeline_index;
        if let Some(turn) = self.timeline.assistant_turn_mut(index) {
            turn.steps.extend(steps);
        }

        if let Some(answered) = finished {
            self.active_turn = None;
            self.complete_turn(index, *answered);
        } else if lost {
            self.active_turn = None;
            self.state
                .trace
                .log_turn_failure("turn task ended without a result");
            self.show_fallback(index);
        }
    }

    fn complete_turn(&mut self, index: usize, answered: AnsweredTurn) {
        let trace = &self.state.trace;
        trace.log_transcript(&answered.transcript);
        if let Some(failure) = &answered.failure {
            trace.log_turn_failure(failure);
        }

        let out_path = figure_path(
            &self.state.figure_dir,
            &self.state.session_id,
            self.figure_count + 1,
        );
        let rendered = render_result(
            &answered.result,
            self.state.python.as_ref(),
            &out_path,
            trace,
        );

        let (state, history_text) = match rendered {
            Rendered::Text(text) => {
                trace.log_output("chat.out", &text);
                self.streaming = Some(StreamingTurn {
                    timeline_index: index,
                    last_word_at: Instant::now(),
                });
                (
                    AssistantTurnState::Streaming {
                        text: text.clone(),
                        revealed_words: 0,
                    },
                    text,
                )
            }
            Rendered::Figure { path, code } => {
                let text = format!("[figure] {}", path.display());
                trace.log_output("chat.out", &text);
                self.figure_count += 1;
                self.last_figure_code = Some(code);
                (AssistantTurnState::CompletedFigure(path), text)
            }
            Rendered::Fallback => {
                trace.log_output("chat.out", FALLBACK_MESSAGE);
                (
                    AssistantTurnState::CompletedError(FALLBACK_MESSAGE.to_string()),
                    FALLBACK_MESSAGE.to_string(),
                )
            }
        };

        if let Some(turn) = self.timeline.assistant_turn_mut(index) {
            turn.state = state;
            turn.token_usage = Some(answered.usage);
        }
        self.history.push(ChatEntry {
            role: ChatRole::Assistant,
            content: history_text,
        });
    }

    fn show_fallback(&mut self, index: usize) {
        if let Some(turn) = self.timeline.assistant_turn_mut(index) {
            turn.state = AssistantTurnState::CompletedError(FALLBACK_MESSAGE.to_string());
        }
        self.history.push(ChatEntry {
            role: ChatRole::Assistant,
            content: FALLBACK_MESSAGE.to_string(),
        });
    }

    /// Advances the word-by-word reveal of the latest text answer.
    pub(crate) fn tick(&mut self, now: Instant) {
        self.poll_turn();

        let Some(stream) = self.streaming.as_mut() else {
            return;
        };
        if now.duration_since(stream.last_word_at) < STREAM_WORD_INTERVAL {
            return;
        }
        stream.last_word_at = now;

        let index = stream.timeline_index;
        let more = self
            .timeline
            .assistant_turn_mut(index)
            .is_some_and(|turn| turn.advance_stream());
        if !more {
            self.streaming = None;
        }
    }

    pub(crate) fn finish_streaming(&mut self) {
        let Some(stream) = self.streaming.take() else {
            return;
        };
        if let Some(turn) = self.timeline.assistant_turn_mut(stream.timeline_index) {
            turn.finish_stream();
        }
    }

    pub(crate) fn draw(&mut self, frame: &mut Frame<'_>) {
        let visible_input = self.ui.input.line_count().clamp(1, MAX_VISIBLE_INPUT_LINES);
        let chunks = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(visible_input as u16 + 2),
            Constraint::Length(1),
        ])
        .split(frame.area());
        let regions = LayoutRegions {
            timeline: chunks[0],
            input: chunks[1],
            status: chunks[2],
        };
        self.ui.regions = Some(regions);

        self.draw_timeline(frame, regions.timeline);
        self.draw_input(frame, regions.input);
        self.draw_status(frame, regions.status);
    }

    fn draw_timeline(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let lines = self.timeline.render_lines(&self.theme, self.ui.show_steps);
        let rows = wrap_lines(lines, usize::from(area.width));
        let height = usize::from(area.height);

        self.ui.timeline_rows = rows.len();
        let max_scroll = rows.len().saturating_sub(height);
        self.ui.timeline_scroll = self.ui.timeline_scroll.min(max_scroll);
        let top = max_scroll - self.ui.timeline_scroll;

        let visible = rows.into_iter().skip(top).take(height).collect::<Vec<_>>();
        frame.render_widget(Paragraph::new(visible), area);
    }

    fn draw_input(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::bordered().style(self.theme.style(ThemeToken::InputBlock));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let prompt = self.prompt();
        let prompt_token = if is_command_line(self.ui.input.text()) {
            ThemeToken::CommandPrompt
        } else {
            ThemeToken::AskPrompt
        };
        let indent = " ".repeat(prompt.len());

        let (cursor_line, cursor_col) = self.ui.input.cursor_line_col();
        let height = usize::from(inner.height).max(1);
        let first = (cursor_line + 1).saturating_sub(height);

        let lines = self
            .ui
            .input
            .text()
            .split('\n')
            .enumerate()
            .skip(first)
            .take(height)
            .map(|(idx, text)| {
                let lead = if idx == 0 {
                    Span::styled(prompt, self.theme.style(prompt_token))
                } else {
                    Span::raw(indent.clone())
                };
                Line::from(vec![
                    lead,
                    Span::styled(text.to_string(), self.theme.style(ThemeToken::UserInput)),
                ])
            })
            .collect::<Vec<_>>();
        frame.render_widget(Paragraph::new(lines), inner);

        let column = prompt.len().saturating_add(cursor_col);
        frame.set_cursor_position(cursor_cell(inner, column, cursor_line - first));
    }

    fn draw_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let dataset = &self.state.dataset;
        let dataset_name = dataset
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dataset.path.display().to_string());
        let steps = if self.ui.show_steps { "On" } else { "Off" };

        let mut text = format!(
            "DataChat.ai | Session: {} | {} ({} rows) | Steps: {steps} (Ctrl-T)",
            self.state.session_id, dataset_name, dataset.row_count
        );
        if self.state.assistant.is_none() {
            text.push_str(" | offline");
        } else if self.is_busy() {
            text.push_str(" | working");
        }

        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                text,
                self.theme.style(ThemeToken::Status),
            ))),
            area,
        );
    }
}

/// Hard-wraps styled lines to `width` columns, one column per char.
fn wrap_lines(lines: Vec<Line<'static>>, width: usize) -> Vec<Line<'static>> {
    if width == 0 {
        return lines;
    }

    let mut rows = Vec::with_capacity(lines.len());
    for line in lines {
        let mut current: Vec<Span<'static>> = Vec::new();
        let mut used = 0;
        for span in line.spans {
            let style = span.style;
            let mut chunk = String::new();
            for ch in span.content.chars() {
                if used == width {
                    if !chunk.is_empty() {
                        current.push(Span::styled(std::mem::take(&mut chunk), style));
                    }
                    rows.push(Line::from(std::mem::take(&mut current)));
                    used = 0;
                }
                chunk.push(ch);
                used += 1;
            }
            if !chunk.is_empty() {
                current.push(Span::styled(chunk, style));
            }
        }
        rows.push(Line::from(current));
    }

    rows
}

pub async fn run_repl(state: AppState) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(state);
    let result = event_loop(&mut terminal, &mut app).await;
    app.shutdown();
    restore_terminal(&mut terminal)?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        app.tick(Instant::now());
        terminal.draw(|frame| app.draw(frame))?;
        if app.should_quit() {
            return Ok(());
        }

        if event::poll(EVENT_POLL_INTERVAL)? {
            match event::read()? {
                Event::Key(key) => app.handle_key(key),
                Event::Mouse(mouse) => app.handle_mouse(mouse),
                Event::Paste(text) => app.handle_paste(&text),
                _ => {}
            }
        } else {
            tokio::task::yield_now().await;
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Screen cell for a cursor `column` characters right of and `row` lines
/// below the top-left of `area`, clamped to its last column.
fn cursor_cell(area: Rect, column: usize, row: usize) -> Position {
    let offset = |n: usize| u16::try_from(n).unwrap_or(u16::MAX);
    let x = area
        .x
        .saturating_add(offset(column))
        .min(area.right().saturating_sub(1));
    Position::new(x, area.y.saturating_add(offset(row)))
}
