use crate::agent::ConversationFactory;
use crate::agent::prompt::build_system_prompt;
use crate::cli::repl::{App, AppState, LayoutRegions};
use crate::cli::timeline::{AssistantTurnState, StepEvent};
use crate::config::{ExecutionConfig, ModelServiceConfig, ThemeConfig};
use crate::dataset::Dataset;
use crate::http::client::HttpClient;
use crate::http::debug::HttpDebugConfig;
use crate::llm::openai::OpenAiProvider;
use crate::llm::provider::LlmTokenUsageTotals;
use crate::trace::SessionTrace;
use anyhow::{Result, anyhow};
use crossterm::event::{KeyEvent, MouseEvent};
use ratatui::Terminal;
use ratatui::backend::TestBackend;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const TURN_WAIT_LIMIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiStateView {
    pub prompt: String,
    pub input: String,
    pub timeline_scroll: usize,
    pub show_steps: bool,
    pub busy: bool,
}

/// Drives the chat surface against ratatui's `TestBackend`.
pub struct UiHarness {
    terminal: Terminal<TestBackend>,
    app: App,
}

impl UiHarness {
    pub fn new(width: u16, height: u16, state: AppState) -> Result<Self> {
        Ok(Self {
            terminal: Terminal::new(TestBackend::new(width, height))?,
            app: App::new(state),
        })
    }

    pub fn render(&mut self) -> Result<()> {
        let Self { terminal, app } = self;
        terminal.draw(|frame| app.draw(frame))?;
        Ok(())
    }

    pub async fn send_key(&mut self, key: KeyEvent) -> Result<()> {
        self.app.handle_key(key);
        self.app.poll_turn();
        self.render()
    }

    pub fn send_mouse(&mut self, mouse: MouseEvent) -> Result<()> {
        self.app.handle_mouse(mouse);
        self.render()
    }

    /// Waits for the question in flight, then shows its full answer.
    pub async fn wait_for_turn(&mut self) -> Result<()> {
        let waited = tokio::time::timeout(TURN_WAIT_LIMIT, async {
            loop {
                self.app.poll_turn();
                if !self.app.is_busy() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if waited.is_err() {
            return Err(anyhow!("turn did not finish within {TURN_WAIT_LIMIT:?}"));
        }

        self.app.finish_streaming();
        self.render()
    }

    pub fn should_quit(&self) -> bool {
        self.app.should_quit()
    }

    pub fn regions(&self) -> Result<LayoutRegions> {
        self.app
            .ui
            .regions
            .ok_or_else(|| anyhow!("render the harness before reading its layout"))
    }

    pub fn buffer_lines(&self) -> Vec<String> {
        let buffer = self.terminal.backend().buffer();
        let area = buffer.area;
        (area.y..area.y + area.height)
            .map(|y| {
                (area.x..area.x + area.width)
                    .map(|x| buffer.cell((x, y)).map_or(" ", |cell| cell.symbol()))
                    .collect::<String>()
            })
            .collect()
    }

    pub fn line(&self, row: u16) -> Option<String> {
        self.buffer_lines().into_iter().nth(usize::from(row))
    }

    pub fn ui_state_view(&self) -> UiStateView {
        UiStateView {
            prompt: self.app.prompt().to_string(),
            input: self.app.ui.input.text().to_string(),
            timeline_scroll: self.app.ui.timeline_scroll,
            show_steps: self.app.ui.show_steps,
            busy: self.app.is_busy(),
        }
    }

    /// Adds a finished text turn without talking to a model service. Steps
    /// are `("solver" | "executor", text)` pairs.
    pub fn seed_assistant_turn_completed(
        &mut self,
        question: &str,
        steps: &[(&str, &str)],
        answer: &str,
    ) -> Result<()> {
        let index = self.app.timeline.push_assistant_turn(question.to_string());
        let turn = self
            .app
            .timeline
            .assistant_turn_mut(index)
            .ok_or_else(|| anyhow!("seeded turn is missing"))?;

        for (kind, text) in steps {
            let step = match *kind {
                "solver" => StepEvent::Solver((*text).to_string()),
                "executor" => StepEvent::Executor((*text).to_string()),
                other => return Err(anyhow!("unknown step kind {other:?}")),
            };
            turn.steps.push(step);
        }
        turn.state = AssistantTurnState::CompletedText(answer.to_string());
        turn.token_usage = Some(LlmTokenUsageTotals::default());
        Ok(())
    }
}

fn harness_dir(session_id: &str) -> PathBuf {
    std::env::temp_dir()
        .join("datachat-ui-harness")
        .join(session_id)
}

fn base_state(session_id: &str) -> Result<AppState> {
    let dir = harness_dir(session_id);
    let dataset = Dataset::from_parts(
        "/data/sales.csv",
        &["region", "product", "amount"],
        3,
    );
    let trace = SessionTrace::create_in_temp_dir(session_id, &dir.join("traces"))?;

    Ok(AppState {
        session_id: session_id.to_string(),
        system_prompt: build_system_prompt(&dataset.path, &dataset.columns),
        dataset,
        assistant: None,
        python: None,
        figure_dir: dir.join("figures"),
        theme_config: ThemeConfig::default(),
        startup_notices: Vec::new(),
        trace,
    })
}

/// A session with a fixed dataset and no model service.
pub fn deterministic_app_state(session_id: &str) -> Result<AppState> {
    base_state(session_id)
}

/// Like [`deterministic_app_state`], but questions go to the
/// OpenAI-compatible server at `base_url` with the key `test-key`.
pub fn deterministic_app_state_with_model(session_id: &str, base_url: &str) -> Result<AppState> {
    let mut state = base_state(session_id)?;
    let model = ModelServiceConfig {
        api_key: Some("test-key".to_string()),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        ..ModelServiceConfig::default()
    };
    let execution = ExecutionConfig {
        work_dir: harness_dir(session_id).join("coding"),
        timeout: Duration::from_secs(10),
        ..ExecutionConfig::default()
    };

    let client = reqwest::Client::builder().timeout(model.timeout).build()?;
    let http = HttpClient::new(client, HttpDebugConfig::from_flag(false))
        .with_trace(state.trace.clone());
    let provider = OpenAiProvider::new(http, &model)?;
    state.assistant = Some(Arc::new(ConversationFactory::new(
        provider,
        &model,
        execution,
        state.system_prompt.clone(),
        session_id,
    )));
    Ok(state)
}
