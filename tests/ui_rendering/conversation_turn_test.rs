use anyhow::Result;
use datachat_ai::cli::test_support::{UiHarness, deterministic_app_state_with_model};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use crossterm::event::KeyCode;

use crate::ui_rendering::common::{
    press, press_enter, status_snapshot, submit_line, timeline_snapshot, type_text,
};

const SUCCESS_REPORT: &str = "exitcode: 0 (execution succeeded)";

struct BodyLacks(&'static str);

impl Match for BodyLacks {
    fn matches(&self, request: &Request) -> bool {
        !String::from_utf8_lossy(&request.body).contains(self.0)
    }
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
    }))
}

async fn model_harness(session_id: &str, server: &MockServer) -> Result<UiHarness> {
    let state = deterministic_app_state_with_model(session_id, &server.uri())?;
    let mut harness = UiHarness::new(100, 30, state)?;
    harness.render()?;
    Ok(harness)
}

#[tokio::test]
async fn terminate_without_execution_shows_fallback() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("TERMINATE"))
        .mount(&server)
        .await;

    let mut harness = model_harness("turn-terminate", &server).await?;
    submit_line(&mut harness, "what is the mean amount?").await?;
    harness.wait_for_turn().await?;

    let timeline = timeline_snapshot(&harness)?;
    assert!(timeline.contains("ask> what is the mean amount?"), "{timeline}");
    assert!(
        timeline.contains("Unable to process your request now. Please try again later."),
        "{timeline}"
    );
    assert!(timeline.contains("Tokens (turn): 16 over 1 requests"), "{timeline}");
    assert!(!harness.ui_state_view().busy);

    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn executed_output_streams_into_the_timeline() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(BodyLacks(SUCCESS_REPORT))
        .respond_with(completion("```sh\necho \"sales has 3 rows\"\n```"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains(SUCCESS_REPORT))
        .respond_with(completion("TERMINATE"))
        .mount(&server)
        .await;

    let mut harness = model_harness("turn-executed", &server).await?;
    submit_line(&mut harness, "how many rows?").await?;
    harness.wait_for_turn().await?;

    let timeline = timeline_snapshot(&harness)?;
    assert!(timeline.contains("  -> solver #1: 1 code block"), "{timeline}");
    assert!(
        timeline.contains("  <- executor #1: execution succeeded"),
        "{timeline}"
    );
    assert!(timeline.contains("sales has 3 rows"), "{timeline}");
    assert!(!timeline.contains('▌'), "{timeline}");

    submit_line(&mut harness, "/history").await?;
    let timeline = timeline_snapshot(&harness)?;
    assert!(timeline.contains("you: how many rows?"), "{timeline}");

    Ok(())
}

#[tokio::test]
async fn questions_are_rejected_while_one_is_in_flight() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("TERMINATE").set_delay(Duration::from_millis(400)))
        .mount(&server)
        .await;

    let mut harness = model_harness("turn-busy", &server).await?;
    submit_line(&mut harness, "first question").await?;
    assert!(harness.ui_state_view().busy);
    assert!(status_snapshot(&harness)?.ends_with("| working"));

    submit_line(&mut harness, "second question").await?;
    let view = harness.ui_state_view();
    assert_eq!(view.input, "second question");
    let timeline = timeline_snapshot(&harness)?;
    assert!(
        timeline.contains("A question is still being answered."),
        "{timeline}"
    );
    assert!(!timeline.contains("ask> second question"), "{timeline}");

    // Commands still run while the turn is in flight.
    for _ in 0.."second question".len() {
        press(&mut harness, KeyCode::Backspace).await?;
    }
    type_text(&mut harness, "/steps off").await?;
    press_enter(&mut harness).await?;
    assert!(!harness.ui_state_view().show_steps);

    harness.wait_for_turn().await?;
    assert!(!harness.ui_state_view().busy);
    let timeline = timeline_snapshot(&harness)?;
    assert!(
        timeline.contains("Unable to process your request now."),
        "{timeline}"
    );

    Ok(())
}
