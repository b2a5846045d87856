pub mod agent;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod executor;
pub mod http;
pub mod llm;
pub mod python;
pub mod trace;

use agent::prompt::build_system_prompt;
use agent::{ConversationEvent, ConversationFactory, FALLBACK_MESSAGE, answer_question};
use anyhow::{Result, bail};
use cli::{AppState, CliArgs, MISSING_API_KEY_MESSAGE, Rendered, figure_path, render_result, run_repl};
use config::AppConfig;
use dataset::{Dataset, require_dataset_path};
use http::client::HttpClient;
use http::debug::HttpDebugConfig;
use llm::openai::OpenAiProvider;
use python::PythonSession;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use trace::{SessionTrace, StateDirs};

type Assistant = Arc<ConversationFactory<OpenAiProvider>>;

pub async fn run(args: CliArgs) -> Result<()> {
    if args.smoke_python {
        return smoke_python();
    }

    let config = AppConfig::load_with_path(args.config.as_deref())?;
    let dataset_path =
        require_dataset_path(args.dataset.as_deref(), config.dataset_path.as_deref())?;
    let mut dataset = Dataset::load(&dataset_path)?;

    let session_id = generate_session_id();
    let state_dirs = StateDirs::from_env()?;
    let trace = SessionTrace::create(&session_id, &state_dirs)?;

    let mut startup_notices = Vec::new();
    let python = match start_python(&mut dataset) {
        Ok(python) => Some(python),
        Err(reason) => {
            trace.log_output("python", &reason);
            startup_notices.push(format!("Charts are unavailable: {reason}"));
            None
        }
    };
    trace.log_output("session", &format!("dataset {}", dataset.describe()));

    let system_prompt = build_system_prompt(&dataset.path, &dataset.columns);
    let assistant = build_assistant(&config, &trace, &session_id, &system_prompt, args.http_debug)?;
    let figure_dir = state_dirs.figures();

    if let Some(question) = args.ask {
        let Some(assistant) = assistant else {
            println!("{MISSING_API_KEY_MESSAGE}");
            return Ok(());
        };
        let output = answer_once(
            &assistant,
            &question,
            python.as_ref(),
            &trace,
            &figure_dir,
            &session_id,
        )
        .await;
        println!("{output}");
        return Ok(());
    }

    let state = AppState {
        session_id,
        dataset,
        system_prompt,
        assistant,
        python,
        figure_dir,
        theme_config: config.theme.clone(),
        startup_notices,
        trace,
    };

    run_repl(state).await
}

fn smoke_python() -> Result<()> {
    let python = PythonSession::initialize()?;
    if !python.is_healthy() {
        bail!("smoke-python: embedded interpreter failed its health check");
    }
    println!("smoke-python: ok");
    Ok(())
}

fn build_assistant(
    config: &AppConfig,
    trace: &SessionTrace,
    session_id: &str,
    system_prompt: &str,
    http_debug: bool,
) -> Result<Option<Assistant>> {
    let client = reqwest::Client::builder()
        .timeout(config.model.timeout)
        .build()?;
    let http =
        HttpClient::new(client, HttpDebugConfig::from_flag(http_debug)).with_trace(trace.clone());

    Ok(OpenAiProvider::new(http, &config.model).ok().map(|provider| {
        Arc::new(ConversationFactory::new(
            provider,
            &config.model,
            config.execution.clone(),
            system_prompt.to_string(),
            session_id,
        ))
    }))
}

/// Starts the interpreter used for charts and loads the dataset into it.
/// On success the dataset takes pandas' column names, which are the ones
/// the generated code will see.
fn start_python(dataset: &mut Dataset) -> Result<PythonSession, String> {
    let python = PythonSession::initialize().map_err(|err| format!("Python failed to start: {err}"))?;
    match python.has_modules(&["pandas", "matplotlib"]) {
        Ok(true) => {}
        Ok(false) => return Err("pandas and matplotlib must be installed".to_string()),
        Err(err) => return Err(format!("cannot inspect Python modules: {err}")),
    }
    let frame = python
        .load_dataset(&dataset.path)
        .map_err(|err| format!("pandas could not read the dataset: {err}"))?;
    dataset.adopt_pandas_shape(frame.columns, frame.rows);
    Ok(python)
}

async fn answer_once(
    assistant: &Assistant,
    question: &str,
    python: Option<&PythonSession>,
    trace: &SessionTrace,
    figure_dir: &Path,
    session_id: &str,
) -> String {
    trace.log_question(question);
    let answered =
        answer_question(assistant.create(), question, &mut |_: ConversationEvent| {}).await;
    trace.log_transcript(&answered.transcript);
    if let Some(failure) = &answered.failure {
        trace.log_turn_failure(failure);
    }

    let out_path = figure_path(figure_dir, session_id, 1);
    let output = one_shot_output(render_result(&answered.result, python, &out_path, trace));
    trace.log_output("chat.out", &output);
    output
}

fn one_shot_output(rendered: Rendered) -> String {
    match rendered {
        Rendered::Text(text) => text,
        Rendered::Figure { path, .. } => path.display().to_string(),
        Rendered::Fallback => FALLBACK_MESSAGE.to_string(),
    }
}

fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    format!("{millis:x}-{:x}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::{generate_session_id, one_shot_output, start_python};
    use crate::agent::FALLBACK_MESSAGE;
    use crate::agent::prompt::build_system_prompt;
    use crate::cli::Rendered;
    use crate::dataset::Dataset;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn prompt_lists_the_columns_pandas_will_use() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv = dir.path().join("export.csv");
        fs::write(&csv, ",amount,amount\n0,1,2\n\n1,3,4\n").expect("write csv");
        let mut dataset = Dataset::load(&csv).expect("load dataset");

        if let Err(reason) = start_python(&mut dataset) {
            eprintln!("skipping pandas check: {reason}");
        } else {
            assert_eq!(dataset.row_count, 2);
        }

        let prompt = build_system_prompt(&dataset.path, &dataset.columns);
        assert!(prompt.contains("`['Unnamed: 0', 'amount', 'amount.1']`"));
    }

    #[test]
    fn generated_session_id_has_expected_shape() {
        let session_id = generate_session_id();
        let mut parts = session_id.split('-');
        let ts = parts.next().expect("timestamp segment");
        let pid = parts.next().expect("pid segment");
        assert!(
            parts.next().is_none(),
            "session id should contain one delimiter"
        );
        assert!(
            ts.chars().all(|ch| ch.is_ascii_hexdigit()),
            "timestamp segment should be hex"
        );
        assert!(
            pid.chars().all(|ch| ch.is_ascii_hexdigit()),
            "pid segment should be hex"
        );
    }

    #[test]
    fn one_shot_prints_text_path_or_fallback() {
        assert_eq!(
            one_shot_output(Rendered::Text("\nThe mean is 4".to_string())),
            "\nThe mean is 4"
        );
        assert_eq!(
            one_shot_output(Rendered::Figure {
                path: PathBuf::from("/state/figures/figure-s-1.png"),
                code: "df.plot()".to_string(),
            }),
            "/state/figures/figure-s-1.png"
        );
        assert_eq!(one_shot_output(Rendered::Fallback), FALLBACK_MESSAGE);
    }
}
