use anyhow::Result;

use crate::ui_rendering::common::{
    input_snapshot, new_harness, press_ctrl, status_snapshot, submit_line, timeline_snapshot,
    type_text,
};

#[tokio::test]
async fn initial_render_shows_welcome_and_status_with_session() -> Result<()> {
    let mut harness = new_harness("render-welcome", 120, 24)?;
    harness.render()?;

    let timeline = timeline_snapshot(&harness)?;
    assert!(timeline.starts_with("Welcome to DataChat.ai."));

    insta::assert_snapshot!(
        status_snapshot(&harness)?,
        @"DataChat.ai | Session: render-welcome | sales.csv (3 rows) | Steps: On (Ctrl-T) | offline"
    );

    Ok(())
}

#[tokio::test]
async fn prompt_changes_for_questions_and_commands() -> Result<()> {
    let mut harness = new_harness("render-prompt", 100, 24)?;
    assert_eq!(harness.ui_state_view().prompt, "ask> ");

    type_text(&mut harness, "/trace").await?;
    assert_eq!(harness.ui_state_view().prompt, "cmd> ");
    assert!(input_snapshot(&harness)?.contains("cmd> /trace"));

    submit_line(&mut harness, "").await?;
    let timeline = timeline_snapshot(&harness)?;
    assert!(timeline.contains("cmd> /trace\nTrace file: "), "{timeline}");
    assert_eq!(harness.ui_state_view().prompt, "ask> ");

    Ok(())
}

#[tokio::test]
async fn multiline_input_scroll_keeps_latest_lines_visible() -> Result<()> {
    let mut harness = new_harness("render-multiline", 100, 24)?;

    for line_no in 1..=8 {
        type_text(&mut harness, &format!("line-{line_no}")).await?;
        if line_no < 8 {
            press_ctrl(&mut harness, 'j').await?;
        }
    }
    harness.render()?;

    let view = harness.ui_state_view();
    assert!(view.input.starts_with("line-1\nline-2\nline-3"));
    assert!(view.input.ends_with("line-8"));

    let input = input_snapshot(&harness)?;
    assert!(!input.contains("line-1"));
    assert!(input.contains("line-8"));

    let regions = harness.regions()?;
    let last_content_row = regions.input.y + regions.input.height.saturating_sub(2);
    let last_row = harness.line(last_content_row).unwrap_or_default();
    assert!(last_row.contains("line-8"));

    Ok(())
}

#[tokio::test]
async fn steps_toggle_is_retroactive() -> Result<()> {
    let mut harness = new_harness("render-steps", 100, 24)?;

    harness.seed_assistant_turn_completed(
        "total amount?",
        &[
            ("solver", "-> solver #1: 1 code block"),
            ("executor", "<- executor #1: execution succeeded"),
            ("solver", "-> solver #2: no code, done"),
        ],
        "The total amount is 420",
    )?;
    harness.render()?;

    let shown = timeline_snapshot(&harness)?;
    assert!(shown.contains("  Working..."));
    assert!(shown.contains("  -> solver #1: 1 code block"));
    assert!(shown.contains("  <- executor #1: execution succeeded"));
    assert!(shown.contains("The total amount is 420"));

    press_ctrl(&mut harness, 't').await?;

    let hidden = timeline_snapshot(&harness)?;
    assert!(!hidden.contains("Working..."));
    assert!(!hidden.contains("-> solver #1"));
    assert!(!hidden.contains("<- executor #1"));
    assert!(hidden.contains("The total amount is 420"));

    Ok(())
}

#[tokio::test]
async fn commands_and_turns_render_in_order() -> Result<()> {
    let mut harness = new_harness("render-mixed", 100, 24)?;

    submit_line(&mut harness, "/columns").await?;
    harness.seed_assistant_turn_completed(
        "summarize amount",
        &[
            ("solver", "-> solver #1: 1 code block"),
            ("executor", "<- executor #1: execution succeeded"),
        ],
        "amount totals 420",
    )?;
    harness.render()?;

    let timeline = timeline_snapshot(&harness)?;
    insta::assert_snapshot!(timeline.trim_end(), @r"
    cmd> /columns
    Dataset: /data/sales.csv (3 rows, 3 columns)
    Columns: region, product, amount
    ask> summarize amount

      Working...
      -> solver #1: 1 code block
      <- executor #1: execution succeeded

    amount totals 420
    ");

    Ok(())
}

#[tokio::test]
async fn clear_empties_the_timeline() -> Result<()> {
    let mut harness = new_harness("render-clear", 100, 24)?;

    submit_line(&mut harness, "/columns").await?;
    submit_line(&mut harness, "/clear").await?;

    let timeline = timeline_snapshot(&harness)?;
    assert!(timeline.starts_with("Welcome to DataChat.ai."), "{timeline}");
    assert!(!timeline.contains("Columns:"));

    Ok(())
}
