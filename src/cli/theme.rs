use crate::config::{
    HexColor, StyleOverride, ThemeConfig as UserThemeConfig, ThemeModifier, ThemePreset, ThemeToken,
};
use ratatui::style::{Color, Modifier, Style};
use std::collections::HashMap;

/// The handful of colours a preset is made of. Every token style is derived
/// from one of these.
struct Palette {
    question: Color,
    command: Color,
    text: Color,
    answer: Color,
    waiting: Color,
    step: Color,
    figure: Color,
    info: Color,
    error: Color,
    input_bg: Color,
}

const DEFAULT_PALETTE: Palette = Palette {
    question: Color::Rgb(122, 162, 247),
    command: Color::Rgb(224, 175, 104),
    text: Color::White,
    answer: Color::Rgb(158, 206, 106),
    waiting: Color::Rgb(125, 207, 255),
    step: Color::Rgb(138, 138, 138),
    figure: Color::Rgb(187, 154, 247),
    info: Color::Rgb(86, 95, 137),
    error: Color::Rgb(247, 118, 142),
    input_bg: Color::Rgb(22, 22, 30),
};

const LIGHT_PALETTE: Palette = Palette {
    question: Color::Rgb(31, 111, 235),
    command: Color::Rgb(176, 64, 0),
    text: Color::Rgb(36, 41, 47),
    answer: Color::Rgb(5, 80, 40),
    waiting: Color::Rgb(9, 105, 218),
    step: Color::Rgb(80, 90, 110),
    figure: Color::Rgb(130, 80, 223),
    info: Color::Rgb(36, 70, 120),
    error: Color::Rgb(176, 0, 32),
    input_bg: Color::Rgb(246, 248, 250),
};

const HIGH_CONTRAST_PALETTE: Palette = Palette {
    question: Color::Rgb(0, 255, 255),
    command: Color::Rgb(255, 215, 0),
    text: Color::Rgb(255, 255, 255),
    answer: Color::Rgb(0, 255, 127),
    waiting: Color::Rgb(255, 255, 0),
    step: Color::Rgb(220, 220, 220),
    figure: Color::Rgb(255, 0, 255),
    info: Color::Rgb(173, 216, 230),
    error: Color::Rgb(255, 64, 64),
    input_bg: Color::Rgb(0, 0, 0),
};

impl Palette {
    fn for_preset(preset: ThemePreset) -> &'static Self {
        match preset {
            ThemePreset::Default => &DEFAULT_PALETTE,
            ThemePreset::Light => &LIGHT_PALETTE,
            ThemePreset::HighContrast => &HIGH_CONTRAST_PALETTE,
        }
    }

    fn style(&self, token: ThemeToken) -> Style {
        let fg = |color: Color| Style::default().fg(color);
        match token {
            ThemeToken::AskPrompt => fg(self.question).add_modifier(Modifier::BOLD),
            ThemeToken::CommandPrompt => fg(self.command).add_modifier(Modifier::BOLD),
            ThemeToken::UserInput => fg(self.text),
            ThemeToken::AssistantText => fg(self.answer),
            ThemeToken::AssistantWaiting => {
                fg(self.waiting).add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            }
            ThemeToken::SolverStep => fg(self.step).add_modifier(Modifier::ITALIC),
            ThemeToken::ExecutorStep => fg(self.step),
            ThemeToken::FigureInfo => fg(self.figure).add_modifier(Modifier::BOLD),
            ThemeToken::SystemInfo | ThemeToken::Status => fg(self.info),
            ThemeToken::SystemError => fg(self.error).add_modifier(Modifier::BOLD),
            ThemeToken::InputBlock => fg(self.text).bg(self.input_bg),
        }
    }
}

/// Resolved styles for the chat surface. With colour disabled (`NO_COLOR`)
/// only the prompts keep their weight.
#[derive(Debug, Clone)]
pub struct Theme {
    enabled: bool,
    styles: HashMap<ThemeToken, Style>,
}

impl Theme {
    #[cfg(test)]
    pub fn new(enabled: bool) -> Self {
        Self::from_config(enabled, &UserThemeConfig::default())
    }

    pub fn from_config(enabled: bool, config: &UserThemeConfig) -> Self {
        let palette = Palette::for_preset(config.preset);
        let styles = ThemeToken::all()
            .iter()
            .map(|&token| {
                let base = palette.style(token);
                let style = config
                    .styles
                    .get(&token)
                    .map_or(base, |custom| apply_override(base, custom));
                (token, style)
            })
            .collect();

        Self { enabled, styles }
    }

    pub fn style(&self, token: ThemeToken) -> Style {
        if self.enabled {
            return self.styles.get(&token).copied().unwrap_or_default();
        }
        match token {
            ThemeToken::AskPrompt | ThemeToken::CommandPrompt => {
                Style::default().add_modifier(Modifier::BOLD)
            }
            _ => Style::default(),
        }
    }
}

/// Colours replace the preset's when given. A modifier list replaces the
/// preset's modifiers entirely.
fn apply_override(base: Style, custom: &StyleOverride) -> Style {
    let mut style = base;
    if let Some(color) = custom.fg {
        style = style.fg(color.into());
    }
    if let Some(color) = custom.bg {
        style = style.bg(color.into());
    }
    if let Some(modifiers) = &custom.modifiers {
        let combined = modifiers
            .iter()
            .fold(Modifier::empty(), |acc, &modifier| acc | Modifier::from(modifier));
        style = style.remove_modifier(Modifier::all()).add_modifier(combined);
    }
    style
}

impl From<HexColor> for Color {
    fn from(color: HexColor) -> Self {
        Color::Rgb(color.r, color.g, color.b)
    }
}

impl From<ThemeModifier> for Modifier {
    fn from(modifier: ThemeModifier) -> Self {
        match modifier {
            ThemeModifier::Bold => Modifier::BOLD,
            ThemeModifier::Dim => Modifier::DIM,
            ThemeModifier::Italic => Modifier::ITALIC,
            ThemeModifier::Underlined => Modifier::UNDERLINED,
            ThemeModifier::Reversed => Modifier::REVERSED,
            ThemeModifier::CrossedOut => Modifier::CROSSED_OUT,
        }
    }
}
