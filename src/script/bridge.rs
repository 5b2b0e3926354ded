//! Python Bridge - Rust <-> Python communication via PyO3
//!
//! Loads user scripts and instantiates the platform classes they define.
//! The resulting objects are driven through `PlatformHandler`: each trait
//! method calls the Python method of the same name.

use std::ffi::CString;
use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};

use super::{HandlerError, HandlerHandle, HandlerResult, PlatformHandler, ScriptBridge, ScriptError};
use crate::core::{Dictionary, ExecutionContextRef, GenericObject, Pid, StructuredValue};

use std::sync::Arc;

fn python_error(err: PyErr) -> ScriptError {
    ScriptError::PythonError(err.to_string())
}

fn raised(err: PyErr) -> HandlerError {
    HandlerError::Raised(err.to_string())
}

fn c_string(text: &str) -> Result<CString, ScriptError> {
    CString::new(text).map_err(|_| ScriptError::PythonError("embedded NUL byte in source".into()))
}

/// Convert a structured value into a Python object
pub fn to_python<'py>(py: Python<'py>, value: &StructuredValue) -> PyResult<Bound<'py, PyAny>> {
    Ok(match value {
        StructuredValue::Invalid | StructuredValue::Null => py.None().into_bound(py),
        StructuredValue::Boolean(b) => PyBool::new(py, *b).to_owned().into_any(),
        StructuredValue::Integer(i) => i.into_pyobject(py)?.into_any(),
        StructuredValue::Unsigned(u) => u.into_pyobject(py)?.into_any(),
        StructuredValue::Float(f) => PyFloat::new(py, *f).into_any(),
        StructuredValue::String(s) => PyString::new(py, s).into_any(),
        StructuredValue::Array(items) => {
            let items = items
                .iter()
                .map(|item| to_python(py, item))
                .collect::<PyResult<Vec<_>>>()?;
            PyList::new(py, items)?.into_any()
        }
        StructuredValue::Dictionary(dict) => {
            let py_dict = PyDict::new(py);
            for (key, item) in dict.iter() {
                py_dict.set_item(key, to_python(py, item)?)?;
            }
            py_dict.into_any()
        }
        StructuredValue::Generic(generic) => match generic.downcast_ref::<Py<PyAny>>() {
            Some(object) => object.bind(py).clone(),
            None => py.None().into_bound(py),
        },
    })
}

/// Convert a Python object into a structured value.
///
/// Objects with no structured equivalent are wrapped as `Generic`.
pub fn from_python(object: &Bound<'_, PyAny>) -> PyResult<StructuredValue> {
    if object.is_none() {
        return Ok(StructuredValue::Null);
    }
    // bool is a subclass of int, check it first
    if let Ok(b) = object.downcast::<PyBool>() {
        return Ok(StructuredValue::Boolean(b.is_true()));
    }
    if object.is_instance_of::<PyInt>() {
        if let Ok(i) = object.extract::<i64>() {
            return Ok(StructuredValue::Integer(i));
        }
        return Ok(match object.extract::<u64>() {
            Ok(u) => StructuredValue::Unsigned(u),
            Err(_) => StructuredValue::Generic(GenericObject::new(object.clone().unbind())),
        });
    }
    if object.is_instance_of::<PyFloat>() {
        return Ok(StructuredValue::Float(object.extract::<f64>()?));
    }
    if let Ok(s) = object.downcast::<PyString>() {
        return Ok(StructuredValue::String(s.to_str()?.to_string()));
    }
    if let Ok(dict) = object.downcast::<PyDict>() {
        let mut result = Dictionary::new();
        for (key, item) in dict.iter() {
            // pids are commonly int keys on the Python side
            let key = key.str()?.to_str()?.to_string();
            result.insert(key, from_python(&item)?);
        }
        return Ok(StructuredValue::Dictionary(result));
    }
    if let Ok(list) = object.downcast::<PyList>() {
        return list
            .iter()
            .map(|item| from_python(&item))
            .collect::<PyResult<Vec<_>>>()
            .map(StructuredValue::Array);
    }
    if let Ok(tuple) = object.downcast::<PyTuple>() {
        return tuple
            .iter()
            .map(|item| from_python(&item))
            .collect::<PyResult<Vec<_>>>()
            .map(StructuredValue::Array);
    }

    Ok(StructuredValue::Generic(GenericObject::new(object.clone().unbind())))
}

/// A Python object acting as a platform
pub struct PythonHandler {
    object: Py<PyAny>,
}

impl PythonHandler {
    pub fn new(object: Py<PyAny>) -> Self {
        Self { object }
    }

    /// Call `method` with positional arguments
    fn call_method(&self, method: &'static str, args: &[StructuredValue]) -> HandlerResult {
        Python::with_gil(|py| {
            let object = self.object.bind(py);
            if !object.hasattr(method).map_err(raised)? {
                return Err(HandlerError::MissingMethod(method));
            }

            let py_args = args
                .iter()
                .map(|arg| to_python(py, arg))
                .collect::<PyResult<Vec<_>>>()
                .map_err(raised)?;
            let py_args = PyTuple::new(py, py_args).map_err(raised)?;

            let ret = object.call_method1(method, py_args).map_err(raised)?;
            from_python(&ret).map_err(raised)
        })
    }
}

impl PlatformHandler for PythonHandler {
    fn list_processes(&self) -> HandlerResult {
        self.call_method("list_processes", &[])
    }

    fn get_process_info(&self, pid: Pid) -> HandlerResult {
        self.call_method("get_process_info", &[StructuredValue::from(pid)])
    }

    fn attach_to_process(&self, attach_info: &Dictionary) -> HandlerResult {
        self.call_method(
            "attach_to_process",
            &[StructuredValue::Dictionary(attach_info.clone())],
        )
    }

    fn launch_process(&self, launch_info: &Dictionary) -> HandlerResult {
        self.call_method(
            "launch_process",
            &[StructuredValue::Dictionary(launch_info.clone())],
        )
    }

    fn kill_process(&self, pid: Pid) -> HandlerResult {
        self.call_method("kill_process", &[StructuredValue::from(pid)])
    }
}

/// Main Python bridge interface
pub struct PythonBridge {
    /// Whether Python has been initialized
    initialized: bool,
}

impl PythonBridge {
    /// Create a new Python bridge
    pub fn new() -> Self {
        Self { initialized: false }
    }

    /// Initialize the Python interpreter
    pub fn initialize(&mut self) -> Result<(), ScriptError> {
        if self.initialized {
            return Ok(());
        }

        pyo3::prepare_freethreaded_python();
        self.initialized = true;

        log::info!("Python interpreter initialized");
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), ScriptError> {
        if self.initialized {
            Ok(())
        } else {
            Err(ScriptError::InitError("Python not initialized".into()))
        }
    }

    /// Execute `code` as module `module_name` and register it in `sys.modules`
    pub fn load_source(&self, module_name: &str, code: &str) -> Result<(), ScriptError> {
        self.ensure_initialized()?;

        let code = c_string(code)?;
        let file_name = c_string(&format!("{}.py", module_name))?;
        let c_module = c_string(module_name)?;

        Python::with_gil(|py| {
            let module = PyModule::from_code(py, &code, &file_name, &c_module).map_err(python_error)?;
            py.import("sys")
                .and_then(|sys| sys.getattr("modules"))
                .and_then(|modules| modules.set_item(module_name, &module))
                .map_err(python_error)
        })?;

        log::info!("Loaded Python module {}", module_name);
        Ok(())
    }

    /// Load a Python file; the module is named after the file stem.
    /// Returns the module name.
    pub fn load_script(&self, path: &str) -> Result<String, ScriptError> {
        let code = std::fs::read_to_string(path)
            .map_err(|_| ScriptError::ScriptNotFound(path.to_string()))?;
        let module_name = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| ScriptError::ScriptNotFound(path.to_string()))?;

        self.load_source(&module_name, &code)?;
        Ok(module_name)
    }
}

impl Default for PythonBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptBridge for PythonBridge {
    fn name(&self) -> &str {
        "python"
    }

    fn create_scripted_object(
        &self,
        class_name: &str,
        session_dictionary: &str,
        exe_ctx: ExecutionContextRef,
        args: &Dictionary,
    ) -> Result<HandlerHandle, ScriptError> {
        self.ensure_initialized()?;

        let (module_name, attr) = match class_name.rsplit_once('.') {
            Some((module, attr)) => (module, attr),
            None => (session_dictionary, class_name),
        };

        let object = Python::with_gil(|py| -> Result<Py<PyAny>, ScriptError> {
            let module = py.import(module_name).map_err(python_error)?;
            let class = module
                .getattr(attr)
                .map_err(|_| ScriptError::UnknownClass(class_name.to_string()))?;

            let py_ctx = to_python(py, &StructuredValue::Dictionary(exe_ctx.to_dictionary()))
                .map_err(python_error)?;
            let py_args =
                to_python(py, &StructuredValue::Dictionary(args.clone())).map_err(python_error)?;

            let instance = class.call1((py_ctx, py_args)).map_err(python_error)?;
            Ok(instance.unbind())
        })?;

        Ok(HandlerHandle::new(
            class_name,
            Arc::new(PythonHandler::new(object)),
        ))
    }
}
