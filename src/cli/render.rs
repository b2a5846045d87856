use crate::agent::{ClassifiedResult, ResultKind};
use crate::python::{PythonSession, RenderOutcome};
use crate::trace::SessionTrace;
use std::fs;
use std::path::{Path, PathBuf};

/// What the user gets to see for one classified result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rendered {
    Text(String),
    Figure { path: PathBuf, code: String },
    Fallback,
}

pub(crate) fn figure_path(figure_dir: &Path, session_id: &str, n: usize) -> PathBuf {
    figure_dir.join(format!("figure-{session_id}-{n}.png"))
}

/// Turns a classified result into something displayable. Code is drawn with
/// the embedded interpreter; anything it prints goes to the trace. Every way
/// drawing can fail ends up as `Fallback` with the reason traced.
pub(crate) fn render_result(
    result: &ClassifiedResult,
    python: Option<&PythonSession>,
    out_path: &Path,
    trace: &SessionTrace,
) -> Rendered {
    match result.kind {
        ResultKind::Text => Rendered::Text(result.payload.clone()),
        ResultKind::Error => Rendered::Fallback,
        ResultKind::Code => {
            let Some(python) = python else {
                trace.log_output("render.err", "python interpreter is unavailable");
                return Rendered::Fallback;
            };
            match draw_figure(python, &result.payload, out_path) {
                Ok((path, printed)) => {
                    if !printed.is_empty() {
                        trace.log_output("render.out", &printed);
                    }
                    Rendered::Figure {
                        path,
                        code: result.payload.clone(),
                    }
                }
                Err(reason) => {
                    trace.log_output("render.err", &reason);
                    Rendered::Fallback
                }
            }
        }
    }
}

/// The saved figure and whatever the code printed while drawing it.
fn draw_figure(
    python: &PythonSession,
    code: &str,
    out_path: &Path,
) -> Result<(PathBuf, String), String> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("cannot create {}: {err}", parent.display()))?;
    }

    match python.render_figure(code, out_path) {
        Ok(RenderOutcome::Figure { path, stdout }) => Ok((path, stdout)),
        Ok(RenderOutcome::Failed { exception }) => Err(exception.traceback),
        Err(err) => Err(err.to_string()),
    }
}
