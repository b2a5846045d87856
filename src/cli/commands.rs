use std::error::Error;
use std::fmt::{Display, Formatter, Write as _};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Help,
    Clear,
    History(Option<usize>),
    Trace,
    Columns,
    Prompt,
    Steps(Option<bool>),
    Code,
}

/// Name, argument synopsis and summary of every slash command. Help and
/// usage messages are both built from this table.
const COMMANDS: &[(&str, &str, &str)] = &[
    ("help", "", "Show this command list"),
    ("clear", "", "Clear the timeline output"),
    ("history", "[n]", "Show the chat history (or last n entries)"),
    ("trace", "", "Show path to the current trace file"),
    ("columns", "", "Show the dataset path and its columns"),
    ("prompt", "", "Show the instructions given to the code-writing agent"),
    ("steps", "[on|off]", "Show or hide the agents' intermediate steps"),
    ("code", "", "Show the code behind the last chart"),
];

const SYNOPSIS_WIDTH: usize = 21;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseError(String);

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for ParseError {}

pub(crate) fn is_command_line(line: &str) -> bool {
    line.starts_with('/')
}

pub(crate) fn help_text() -> String {
    let mut text = String::from("Available commands:");
    for (name, args, summary) in COMMANDS {
        let _ = write!(text, "\n  {:<SYNOPSIS_WIDTH$}{summary}", synopsis(name, args));
    }
    text.push_str("\n\nType a question to ask about the dataset. exit or quit leaves.");
    text
}

fn synopsis(name: &str, args: &str) -> String {
    if args.is_empty() {
        format!("/{name}")
    } else {
        format!("/{name} {args}")
    }
}

fn usage(name: &str) -> String {
    COMMANDS
        .iter()
        .find(|(known, ..)| *known == name)
        .map_or_else(
            || "Try /help".to_string(),
            |(name, args, _)| format!("usage: {}", synopsis(name, args)),
        )
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let body = line
            .strip_prefix('/')
            .ok_or_else(|| ParseError::new("not a command"))?
            .trim_end();
        let (name, arg) = body
            .split_once(char::is_whitespace)
            .map_or((body, ""), |(name, arg)| (name, arg.trim()));
        if name.is_empty() {
            return Err(ParseError::new("empty command. Try /help"));
        }

        let name = name.to_ascii_lowercase();
        let command = match (name.as_str(), arg) {
            ("help", "") => Self::Help,
            ("clear", "") => Self::Clear,
            ("trace", "") => Self::Trace,
            ("columns", "") => Self::Columns,
            ("prompt", "") => Self::Prompt,
            ("code", "") => Self::Code,
            ("history", "") => Self::History(None),
            ("history", n) => Self::History(Some(history_len(n)?)),
            ("steps", "") => Self::Steps(None),
            ("steps", "on") => Self::Steps(Some(true)),
            ("steps", "off") => Self::Steps(Some(false)),
            (known, _) if COMMANDS.iter().any(|(listed, ..)| *listed == known) => {
                return Err(ParseError::new(usage(known)));
            }
            (unknown, _) => {
                return Err(ParseError::new(format!(
                    "unknown command '/{unknown}'. Try /help"
                )));
            }
        };
        Ok(command)
    }
}

fn history_len(arg: &str) -> Result<usize, ParseError> {
    match arg.parse::<usize>() {
        Ok(0) => Err(ParseError::new(format!(
            "{} (n must be >= 1)",
            usage("history")
        ))),
        Ok(n) => Ok(n),
        Err(_) => Err(ParseError::new(usage("history"))),
    }
}
