mod interpreter;

pub use interpreter::{ExceptionInfo, LoadedFrame, PythonSession, RenderOutcome};
