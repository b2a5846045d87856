use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde::de::IntoDeserializer;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL_NAME: &str = "gpt-4o";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_PYTHON_BIN: &str = "python3";
pub const DEFAULT_WORK_DIR: &str = "coding";
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 600;
pub const MAX_AUTO_REPLIES: usize = 3;

/// Everything a session needs before it starts. Environment variables win
/// over `config.toml`, which wins over the built-in defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub model: ModelServiceConfig,
    pub dataset_path: Option<PathBuf>,
    pub execution: ExecutionConfig,
    pub theme: ThemeConfig,
    pub config_path: PathBuf,
}

/// Settings for every call to the model service. Temperature and the
/// auto-reply cap are fixed; they are fields so tests can vary them.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelServiceConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub seed: u64,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_auto_replies: usize,
}

impl Default for ModelServiceConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL_NAME.to_string(),
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            seed: DEFAULT_SEED,
            temperature: 0.0,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_auto_replies: MAX_AUTO_REPLIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub python_bin: String,
    pub work_dir: PathBuf,
    pub timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            python_bin: DEFAULT_PYTHON_BIN.to_string(),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            timeout: Duration::from_secs(DEFAULT_EXECUTION_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeConfig {
    pub preset: ThemePreset,
    pub styles: HashMap<ThemeToken, StyleOverride>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThemePreset {
    #[default]
    Default,
    Light,
    HighContrast,
}

/// Every styled element of the chat surface, named in `[theme.styles]` by
/// its snake_case form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeToken {
    AskPrompt,
    CommandPrompt,
    UserInput,
    AssistantText,
    AssistantWaiting,
    SolverStep,
    ExecutorStep,
    FigureInfo,
    SystemInfo,
    SystemError,
    Status,
    InputBlock,
}

impl ThemeToken {
    pub fn all() -> &'static [ThemeToken] {
        &[
            Self::AskPrompt,
            Self::CommandPrompt,
            Self::UserInput,
            Self::AssistantText,
            Self::AssistantWaiting,
            Self::SolverStep,
            Self::ExecutorStep,
            Self::FigureInfo,
            Self::SystemInfo,
            Self::SystemError,
            Self::Status,
            Self::InputBlock,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleOverride {
    #[serde(default)]
    pub fg: Option<HexColor>,
    #[serde(default)]
    pub bg: Option<HexColor>,
    #[serde(default)]
    pub modifiers: Option<Vec<ThemeModifier>>,
}

/// A `#RRGGBB` colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl FromStr for HexColor {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || format!("invalid hex color '{value}', expected #RRGGBB");
        let digits = value
            .strip_prefix('#')
            .filter(|digits| digits.len() == 6 && digits.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(invalid)?;
        let channel = |at: usize| u8::from_str_radix(&digits[at..at + 2], 16).map_err(|_| invalid());

        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeModifier {
    Bold,
    Dim,
    Italic,
    Underlined,
    Reversed,
    CrossedOut,
}

/// The on-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    openai_api_key: Option<String>,
    model_name: Option<String>,
    openai_base_url: Option<String>,
    dataset_path: Option<String>,
    seed: Option<u64>,
    request_timeout_secs: Option<u64>,
    python_bin: Option<String>,
    work_dir: Option<String>,
    execution_timeout_secs: Option<u64>,
    theme: Option<FileTheme>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileTheme {
    name: Option<ThemePreset>,
    styles: BTreeMap<String, StyleOverride>,
}

impl AppConfig {
    #[cfg(test)]
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    /// Loads `explicit_path` when given (it must exist), otherwise
    /// `$XDG_CONFIG_HOME/datachat/config.toml` or
    /// `~/.config/datachat/config.toml` when present. A `.env` file in the
    /// working directory feeds the environment first.
    pub fn load_with_path(explicit_path: Option<&Path>) -> Result<Self> {
        let config_path = match explicit_path {
            Some(path) if !path.is_file() => bail!(
                "Failed to load config {}: file does not exist",
                path.display()
            ),
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        let file = read_file_config(&config_path)?.unwrap_or_default();

        dotenvy::dotenv().ok();

        let request_timeout = positive_secs(
            file.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT_SECS,
            "request_timeout_secs",
            &config_path,
        )?;
        let execution_timeout = positive_secs(
            file.execution_timeout_secs,
            DEFAULT_EXECUTION_TIMEOUT_SECS,
            "execution_timeout_secs",
            &config_path,
        )?;

        let model = ModelServiceConfig {
            model: layered("MODEL_NAME", file.model_name.as_deref())
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            api_key: layered("OPENAI_API_KEY", file.openai_api_key.as_deref()),
            base_url: layered("OPENAI_BASE_URL", file.openai_base_url.as_deref())
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            seed: file.seed.unwrap_or(DEFAULT_SEED),
            timeout: request_timeout,
            ..ModelServiceConfig::default()
        };

        let execution = ExecutionConfig {
            python_bin: file
                .python_bin
                .as_deref()
                .and_then(non_empty)
                .unwrap_or(DEFAULT_PYTHON_BIN)
                .to_string(),
            work_dir: PathBuf::from(file.work_dir.as_deref().and_then(non_empty).unwrap_or(DEFAULT_WORK_DIR)),
            timeout: execution_timeout,
        };

        let theme = match &file.theme {
            Some(section) => theme_from_file(section, &config_path)?,
            None => ThemeConfig::default(),
        };

        Ok(Self {
            model,
            dataset_path: layered("DATASET_PATH", file.dataset_path.as_deref()).map(PathBuf::from),
            execution,
            theme,
            config_path,
        })
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = match env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if xdg.trim().is_empty() => {
            bail!("Failed to resolve config path: XDG_CONFIG_HOME is set but empty")
        }
        Ok(xdg) => PathBuf::from(xdg.trim()),
        Err(_) => dirs::home_dir()
            .ok_or_else(|| anyhow!("Failed to resolve config path: HOME directory is unavailable"))?
            .join(".config"),
    };
    Ok(base.join("datachat").join("config.toml"))
}

fn read_file_config(config_path: &Path) -> Result<Option<FileConfig>> {
    if !config_path.is_file() {
        return Ok(None);
    }

    let text = fs::read_to_string(config_path).with_context(|| {
        format!("Failed to load config {}: unable to read file", config_path.display())
    })?;
    toml::from_str(&text)
        .map(Some)
        .map_err(|err| anyhow!("Failed to load config {}: {err}", config_path.display()))
}

fn theme_from_file(section: &FileTheme, config_path: &Path) -> Result<ThemeConfig> {
    let mut styles = HashMap::with_capacity(section.styles.len());
    for (name, style) in &section.styles {
        let token = ThemeToken::deserialize(name.as_str().into_deserializer()).map_err(
            |err: serde::de::value::Error| {
                config_error(config_path, &format!("theme.styles.{name}"), &err.to_string())
            },
        )?;
        styles.insert(token, style.clone());
    }

    Ok(ThemeConfig {
        preset: section.name.unwrap_or_default(),
        styles,
    })
}

fn positive_secs(
    value: Option<u64>,
    default: u64,
    key: &str,
    config_path: &Path,
) -> Result<Duration> {
    match value {
        Some(0) => Err(config_error(config_path, key, "must be >= 1")),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(Duration::from_secs(default)),
    }
}

/// The environment variable `key` when set to something non-blank,
/// otherwise the file's value when non-blank.
fn layered(key: &str, file_value: Option<&str>) -> Option<String> {
    env::var(key)
        .ok()
        .as_deref()
        .and_then(non_empty)
        .or_else(|| file_value.and_then(non_empty))
        .map(str::to_string)
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn config_error(config_path: &Path, key_path: &str, reason: &str) -> anyhow::Error {
    anyhow!(
        "Failed to load config {}: {key_path}: {reason}",
        config_path.display()
    )
}
