mod args;
mod commands;
mod render;
mod repl;
#[cfg(feature = "test-support")]
pub mod test_support;
pub(crate) mod theme;
mod timeline;

pub use args::CliArgs;
pub use repl::{AppState, LayoutRegions, MISSING_API_KEY_MESSAGE, run_repl};
pub(crate) use render::{Rendered, figure_path, render_result};
