use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use datachat_ai::cli::test_support::{UiHarness, deterministic_app_state};
use ratatui::layout::Rect;

/// A rendered harness over the fixed `sales.csv` session without a model.
pub fn new_harness(session_id: &str, width: u16, height: u16) -> Result<UiHarness> {
    let mut harness = UiHarness::new(width, height, deterministic_app_state(session_id)?)?;
    harness.render()?;
    Ok(harness)
}

async fn key(harness: &mut UiHarness, code: KeyCode, modifiers: KeyModifiers) -> Result<()> {
    harness.send_key(KeyEvent::new(code, modifiers)).await
}

pub async fn press(harness: &mut UiHarness, code: KeyCode) -> Result<()> {
    key(harness, code, KeyModifiers::NONE).await
}

pub async fn press_ctrl(harness: &mut UiHarness, ch: char) -> Result<()> {
    key(harness, KeyCode::Char(ch), KeyModifiers::CONTROL).await
}

pub async fn press_enter(harness: &mut UiHarness) -> Result<()> {
    press(harness, KeyCode::Enter).await
}

pub async fn press_up(harness: &mut UiHarness) -> Result<()> {
    press(harness, KeyCode::Up).await
}

pub async fn press_down(harness: &mut UiHarness) -> Result<()> {
    press(harness, KeyCode::Down).await
}

pub async fn type_text(harness: &mut UiHarness, text: &str) -> Result<()> {
    for ch in text.chars() {
        press(harness, KeyCode::Char(ch)).await?;
    }
    Ok(())
}

pub async fn submit_line(harness: &mut UiHarness, line: &str) -> Result<()> {
    type_text(harness, line).await?;
    press_enter(harness).await
}

fn wheel(harness: &mut UiHarness, kind: MouseEventKind, column: u16, row: u16) -> Result<()> {
    harness.send_mouse(MouseEvent {
        kind,
        column,
        row,
        modifiers: KeyModifiers::NONE,
    })
}

pub fn scroll_up(harness: &mut UiHarness, column: u16, row: u16) -> Result<()> {
    wheel(harness, MouseEventKind::ScrollUp, column, row)
}

pub fn scroll_down(harness: &mut UiHarness, column: u16, row: u16) -> Result<()> {
    wheel(harness, MouseEventKind::ScrollDown, column, row)
}

/// Drops `\r` and trailing padding so snapshots only hold visible text.
fn normalized_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim_end_matches(['\r', ' ']))
        .collect::<Vec<_>>()
        .join("\n")
}

fn region_text(harness: &UiHarness, area: Rect) -> String {
    let columns = usize::from(area.x)..usize::from(area.right());
    let clipped = harness
        .buffer_lines()
        .into_iter()
        .skip(usize::from(area.y))
        .take(usize::from(area.height))
        .map(|line| {
            line.chars()
                .enumerate()
                .filter(|(at, _)| columns.contains(at))
                .map(|(_, ch)| ch)
                .collect::<String>()
        })
        .collect::<Vec<_>>();
    normalized_text(&clipped.join("\n"))
}

pub fn timeline_snapshot(harness: &UiHarness) -> Result<String> {
    Ok(region_text(harness, harness.regions()?.timeline))
}

pub fn input_snapshot(harness: &UiHarness) -> Result<String> {
    Ok(region_text(harness, harness.regions()?.input))
}

pub fn status_snapshot(harness: &UiHarness) -> Result<String> {
    Ok(region_text(harness, harness.regions()?.status))
}
