use anyhow::{Result, anyhow};
use pyo3::prelude::*;
use pyo3::types::PyModuleMethods;
use pyo3::types::{PyAnyMethods, PyDict, PyDictMethods, PyModule};
use std::ffi::CString;
use std::path::{Path, PathBuf};

const RUNTIME_MODULE_NAME: &str = "datachat_runtime";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub exc_type: String,
    pub message: String,
    pub traceback: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFrame {
    pub rows: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Figure { path: PathBuf, stdout: String },
    Failed { exception: ExceptionInfo },
}

/// Embedded interpreter used to draw figures from returned code. Each render
/// runs in a throwaway namespace that only sees `df` and `plt`. Sessions keep
/// their helpers and dataset in a private module, never in `__main__`.
pub struct PythonSession {
    runtime_module: Py<PyModule>,
}

impl PythonSession {
    pub fn initialize() -> Result<Self> {
        Python::attach(|py| -> Result<Self> {
            let runtime_module = PyModule::new(py, RUNTIME_MODULE_NAME)?;
            Self::install_runtime_helpers(py, &runtime_module)?;
            Self::health_check(py, &runtime_module)?;

            Ok(Self {
                runtime_module: runtime_module.unbind(),
            })
        })
    }

    pub fn has_modules(&self, names: &[&str]) -> Result<bool> {
        Python::attach(|py| -> Result<bool> {
            let module = self.runtime_module.bind(py);
            let names = names.to_vec();
            let result = Self::call_runtime_helper(module, "_datachat_has_modules", (names,))?;
            Ok(result.extract()?)
        })
    }

    /// Reads the dataset with pandas and keeps it as the `df` handed to
    /// every later render.
    pub fn load_dataset(&self, path: &Path) -> Result<LoadedFrame> {
        Python::attach(|py| -> Result<LoadedFrame> {
            let module = self.runtime_module.bind(py);
            let path = path.to_string_lossy().into_owned();
            let result = Self::call_runtime_helper(module, "_datachat_load_dataset", (path,))?;
            if !Self::result_ok(&result)? {
                let exception = Self::dict_exception(&result)?;
                anyhow::bail!("{}: {}", exception.exc_type, exception.message)
            }

            let dict = Self::cast_dict(&result)?;
            Ok(LoadedFrame {
                rows: dict
                    .get_item("rows")?
                    .ok_or_else(|| anyhow!("missing rows in helper result"))?
                    .extract()?,
                columns: dict
                    .get_item("columns")?
                    .ok_or_else(|| anyhow!("missing columns in helper result"))?
                    .extract()?,
            })
        })
    }

    /// Runs `code` against the loaded dataset and saves the current figure
    /// to `out_path`. Failures inside the code come back as
    /// `RenderOutcome::Failed`; `Err` means the interpreter itself misbehaved.
    pub fn render_figure(&self, code: &str, out_path: &Path) -> Result<RenderOutcome> {
        Python::attach(|py| -> Result<RenderOutcome> {
            let module = self.runtime_module.bind(py);
            let target = out_path.to_string_lossy().into_owned();
            let result =
                Self::call_runtime_helper(module, "_datachat_render_figure", (code, target))?;
            if Self::result_ok(&result)? {
                Ok(RenderOutcome::Figure {
                    path: out_path.to_path_buf(),
                    stdout: Self::dict_string(&result, "stdout")?,
                })
            } else {
                Ok(RenderOutcome::Failed {
                    exception: Self::dict_exception(&result)?,
                })
            }
        })
    }

    pub fn is_healthy(&self) -> bool {
        Python::attach(|py| {
            let module = self.runtime_module.bind(py);
            Self::health_check(py, module).is_ok()
        })
    }

    fn health_check(py: Python<'_>, runtime_module: &Bound<'_, PyModule>) -> PyResult<()> {
        let globals = runtime_module.dict();
        let _ = py.eval(c"1 + 1", Some(&globals), Some(&globals))?;
        Ok(())
    }

    fn install_runtime_helpers(py: Python<'_>, runtime_module: &Bound<'_, PyModule>) -> Result<()> {
        let globals = runtime_module.dict();
        let helper_code = CString::new(include_str!("runtime_helpers.py"))?;
        py.run(helper_code.as_c_str(), Some(&globals), Some(&globals))?;
        Ok(())
    }

    fn call_runtime_helper<'py, A>(
        runtime_module: &Bound<'py, PyModule>,
        helper_name: &str,
        args: A,
    ) -> Result<Bound<'py, pyo3::types::PyAny>>
    where
        A: pyo3::call::PyCallArgs<'py>,
    {
        let helper = runtime_module.getattr(helper_name)?;
        let result = helper.call1(args)?;
        Ok(result)
    }

    fn result_ok(result: &Bound<'_, pyo3::types::PyAny>) -> Result<bool> {
        let dict = Self::cast_dict(result)?;
        Ok(dict
            .get_item("ok")?
            .ok_or_else(|| anyhow!("missing ok in helper result"))?
            .extract()?)
    }

    fn dict_string(result: &Bound<'_, pyo3::types::PyAny>, key: &str) -> Result<String> {
        let dict = Self::cast_dict(result)?;
        Ok(dict
            .get_item(key)?
            .ok_or_else(|| anyhow!("missing {key} in helper result"))?
            .extract()?)
    }

    fn dict_exception(result: &Bound<'_, pyo3::types::PyAny>) -> Result<ExceptionInfo> {
        let dict = Self::cast_dict(result)?;
        let exception = dict
            .get_item("exception")?
            .ok_or_else(|| anyhow!("missing exception in helper result"))?;
        let exception = Self::cast_dict(&exception)?;
        Ok(ExceptionInfo {
            exc_type: exception
                .get_item("exc_type")?
                .ok_or_else(|| anyhow!("missing exc_type"))?
                .extract()?,
            message: exception
                .get_item("message")?
                .ok_or_else(|| anyhow!("missing message"))?
                .extract()?,
            traceback: exception
                .get_item("traceback")?
                .ok_or_else(|| anyhow!("missing traceback"))?
                .extract()?,
        })
    }

    fn cast_dict<'a>(value: &'a Bound<'a, pyo3::types::PyAny>) -> Result<&'a Bound<'a, PyDict>> {
        value
            .cast::<PyDict>()
            .map_err(|err| anyhow!(err.to_string()))
    }
}
