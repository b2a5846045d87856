use anyhow::Result;

use crate::ui_rendering::common::{
    new_harness, press_ctrl, press_down, press_enter, press_up, status_snapshot, submit_line,
    timeline_snapshot, type_text,
};

#[tokio::test]
async fn ctrl_j_continues_a_question_and_enter_submits_it() -> Result<()> {
    let mut harness = new_harness("keys-multiline", 100, 24)?;

    type_text(&mut harness, "average amount").await?;
    press_ctrl(&mut harness, 'j').await?;
    type_text(&mut harness, "per region").await?;
    let view = harness.ui_state_view();
    assert_eq!(view.prompt, "ask> ");
    assert_eq!(view.input, "average amount\nper region");

    press_enter(&mut harness).await?;
    assert_eq!(harness.ui_state_view().input, "");

    let timeline = timeline_snapshot(&harness)?;
    assert!(timeline.contains("ask> average amount\n     per region"), "{timeline}");
    assert!(
        timeline.contains("Assistant unavailable: missing OPENAI_API_KEY."),
        "{timeline}"
    );

    Ok(())
}

#[tokio::test]
async fn up_down_history_navigation_restores_the_draft() -> Result<()> {
    let mut harness = new_harness("keys-history-nav", 100, 24)?;

    submit_line(&mut harness, "how many rows?").await?;
    submit_line(&mut harness, "/help").await?;
    type_text(&mut harness, "half typed").await?;

    press_up(&mut harness).await?;
    let view = harness.ui_state_view();
    assert_eq!(view.input, "/help");
    assert_eq!(view.prompt, "cmd> ");

    press_up(&mut harness).await?;
    let view = harness.ui_state_view();
    assert_eq!(view.input, "how many rows?");
    assert_eq!(view.prompt, "ask> ");

    press_up(&mut harness).await?;
    assert_eq!(harness.ui_state_view().input, "how many rows?");

    press_down(&mut harness).await?;
    assert_eq!(harness.ui_state_view().input, "/help");
    press_down(&mut harness).await?;
    assert_eq!(harness.ui_state_view().input, "half typed");

    Ok(())
}

#[tokio::test]
async fn history_command_lists_both_roles() -> Result<()> {
    let mut harness = new_harness("keys-history-command", 100, 24)?;

    submit_line(&mut harness, "/history").await?;
    assert!(timeline_snapshot(&harness)?.contains("No chat history yet."));

    submit_line(&mut harness, "how many rows?").await?;
    submit_line(&mut harness, "/history 2").await?;

    let timeline = timeline_snapshot(&harness)?;
    assert!(timeline.contains("you: how many rows?"), "{timeline}");
    assert!(
        timeline.contains("assistant: Assistant unavailable: missing OPENAI_API_KEY."),
        "{timeline}"
    );

    Ok(())
}

#[tokio::test]
async fn invalid_command_reports_usage_and_keeps_running() -> Result<()> {
    let mut harness = new_harness("keys-invalid-command", 100, 24)?;

    submit_line(&mut harness, "/columns all").await?;
    submit_line(&mut harness, "/nope").await?;
    submit_line(&mut harness, "/code").await?;

    let timeline = timeline_snapshot(&harness)?;
    assert!(timeline.contains("cmd> /columns all\nusage: /columns"), "{timeline}");
    assert!(timeline.contains("cmd> /nope"), "{timeline}");
    assert!(
        timeline.contains("cmd> /code\nNo figure has been drawn yet."),
        "{timeline}"
    );
    assert!(!harness.should_quit());

    Ok(())
}

#[tokio::test]
async fn ctrl_t_toggles_steps_in_the_status_line() -> Result<()> {
    let mut harness = new_harness("keys-ctrl-t", 120, 24)?;

    assert!(status_snapshot(&harness)?.contains("Steps: On (Ctrl-T)"));
    assert!(harness.ui_state_view().show_steps);

    press_ctrl(&mut harness, 't').await?;
    assert!(!harness.ui_state_view().show_steps);
    assert!(status_snapshot(&harness)?.contains("Steps: Off (Ctrl-T)"));

    submit_line(&mut harness, "/steps on").await?;
    assert!(harness.ui_state_view().show_steps);

    Ok(())
}

#[tokio::test]
async fn exit_words_and_ctrl_keys_quit() -> Result<()> {
    let mut harness = new_harness("keys-exit-word", 100, 24)?;
    submit_line(&mut harness, "  QUIT ").await?;
    assert!(harness.should_quit());

    let mut harness = new_harness("keys-exit-ctrl-d", 100, 24)?;
    press_ctrl(&mut harness, 'd').await?;
    assert!(harness.should_quit());

    let mut harness = new_harness("keys-exit-ctrl-c", 100, 24)?;
    type_text(&mut harness, "partial").await?;
    press_ctrl(&mut harness, 'c').await?;
    assert!(harness.should_quit());

    Ok(())
}
