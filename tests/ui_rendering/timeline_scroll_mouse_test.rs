use anyhow::Result;

use crate::ui_rendering::common::{
    new_harness, press, scroll_down, scroll_up, submit_line, timeline_snapshot,
};
use crossterm::event::KeyCode;

fn seed_turns(harness: &mut datachat_ai::cli::test_support::UiHarness, count: usize) -> Result<()> {
    for i in 0..count {
        harness.seed_assistant_turn_completed(
            &format!("total amount for region_{i}?"),
            &[
                ("solver", "-> solver #1: 1 code block"),
                ("executor", "<- executor #1: execution succeeded"),
            ],
            "ok",
        )?;
    }
    harness.render()
}

#[tokio::test]
async fn mouse_wheel_scroll_only_applies_inside_timeline_region() -> Result<()> {
    let mut harness = new_harness("scroll-mouse-area", 100, 24)?;
    seed_turns(&mut harness, 24)?;

    let regions = harness.regions()?;
    assert_eq!(harness.ui_state_view().timeline_scroll, 0);

    scroll_up(&mut harness, regions.input.x + 1, regions.input.y + 1)?;
    assert_eq!(harness.ui_state_view().timeline_scroll, 0);

    scroll_up(&mut harness, regions.timeline.x + 1, regions.timeline.y + 1)?;
    let after_timeline_up = harness.ui_state_view().timeline_scroll;
    assert!(after_timeline_up > 0);

    scroll_down(&mut harness, regions.status.x + 1, regions.status.y)?;
    assert_eq!(harness.ui_state_view().timeline_scroll, after_timeline_up);

    scroll_down(&mut harness, regions.timeline.x + 1, regions.timeline.y + 1)?;
    assert!(harness.ui_state_view().timeline_scroll < after_timeline_up);

    Ok(())
}

#[tokio::test]
async fn timeline_scroll_clamps_to_valid_bounds() -> Result<()> {
    let mut harness = new_harness("scroll-mouse-clamp", 100, 24)?;
    seed_turns(&mut harness, 32)?;

    let regions = harness.regions()?;
    for _ in 0..200 {
        scroll_up(&mut harness, regions.timeline.x + 1, regions.timeline.y + 1)?;
    }

    let max_reached = harness.ui_state_view().timeline_scroll;
    assert!(max_reached > 0);

    scroll_up(&mut harness, regions.timeline.x + 1, regions.timeline.y + 1)?;
    assert_eq!(harness.ui_state_view().timeline_scroll, max_reached);

    let top = timeline_snapshot(&harness)?;
    assert!(
        top.starts_with("ask> total amount for region_0?"),
        "fully scrolled timeline should start at the first turn:\n{top}"
    );

    for _ in 0..200 {
        scroll_down(&mut harness, regions.timeline.x + 1, regions.timeline.y + 1)?;
    }
    assert_eq!(harness.ui_state_view().timeline_scroll, 0);

    Ok(())
}

#[tokio::test]
async fn page_keys_scroll_and_submitting_returns_to_bottom() -> Result<()> {
    let mut harness = new_harness("scroll-page-keys", 100, 24)?;
    seed_turns(&mut harness, 24)?;

    press(&mut harness, KeyCode::PageUp).await?;
    let paged = harness.ui_state_view().timeline_scroll;
    assert!(paged > 0);

    press(&mut harness, KeyCode::PageDown).await?;
    assert_eq!(harness.ui_state_view().timeline_scroll, 0);

    press(&mut harness, KeyCode::PageUp).await?;
    assert!(harness.ui_state_view().timeline_scroll > 0);

    submit_line(&mut harness, "/steps").await?;
    assert_eq!(harness.ui_state_view().timeline_scroll, 0);
    let timeline = timeline_snapshot(&harness)?;
    assert!(timeline.ends_with("cmd> /steps\nsteps: off"), "{timeline}");

    Ok(())
}
