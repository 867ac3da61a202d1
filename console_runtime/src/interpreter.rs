//! Command interpreter: variable, preset and function tables around the
//! evaluator.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::catalog::{GenericDef, TypeCatalog};
use crate::error::{ErrorCode, EvalError, HostError};
use crate::eval::Evaluator;
use crate::resolver::TypeResolver;
use crate::scan;
use crate::types::{ClassDef, Invocation, MethodDef, Param, TypeHandle};
use crate::value::{HostFunction, Value};

/// Zero-argument getter behind a `#preset`; called on every access.
pub type PresetGetter = Rc<dyn Fn() -> Result<Value, HostError>>;

/// Text printed for a statement that produced no value.
pub const VOID_MARKER: &str = "ok";

/// Result of [`Interpreter::execute_detailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub output: String,
    pub failed: bool,
}

/// Evaluates expressions and executes command lines against host-registered
/// variables, presets, functions and types.
///
/// Single-threaded: all calls happen on the thread that owns the host
/// objects (the simulation thread).
#[derive(Default)]
pub struct Interpreter {
    catalog: TypeCatalog,
    resolver: TypeResolver,
    variables: HashMap<String, Value>,
    presets: HashMap<String, PresetGetter>,
    functions: HashMap<String, HostFunction>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator {
            catalog: &self.catalog,
            resolver: &self.resolver,
            variables: &self.variables,
            presets: &self.presets,
            functions: &self.functions,
            depth: Cell::new(0),
        }
    }

    /// Evaluates one expression. Never writes the variable table; failures
    /// come back as `Value::Error`.
    pub fn evaluate(&self, expression: &str) -> Value {
        let result = scan::find_assignment(expression).and_then(|assignment| match assignment {
            Some(_) => Err(EvalError::parse("assignment is only allowed in execute")),
            None => self.evaluator().evaluate(expression),
        });
        result.unwrap_or_else(Value::Error)
    }

    /// Runs a `;`-separated command line and formats the outcome.
    pub fn execute(&mut self, line: &str) -> String {
        self.execute_detailed(line).output
    }

    pub fn execute_detailed(&mut self, line: &str) -> ExecOutcome {
        let statements = match scan::split_top_level(line, b';') {
            Ok(statements) => statements,
            Err(err) => return failure(err),
        };
        let mut lines = Vec::new();
        let mut ran = 0usize;
        for statement in statements.into_iter().map(str::trim) {
            if statement.is_empty() {
                continue;
            }
            ran += 1;
            debug!(statement, "executing");
            match self.run_statement(statement) {
                Ok(output) => lines.push(output),
                Err(err) => {
                    debug!(statement, code = %err.code, message = %err.message, "statement failed");
                    lines.push(err.to_string());
                    return ExecOutcome {
                        output: lines.join("\n"),
                        failed: true,
                    };
                }
            }
        }
        if ran == 0 {
            return failure(EvalError::parse("empty command"));
        }
        ExecOutcome {
            output: lines.join("\n"),
            failed: false,
        }
    }

    fn run_statement(&mut self, statement: &str) -> Result<String, EvalError> {
        let Some(at) = scan::find_assignment(statement)? else {
            return Ok(match self.evaluator().evaluate(statement)? {
                Value::Void => VOID_MARKER.to_string(),
                value => value.format(),
            });
        };
        let target = statement[..at].trim();
        let value = self.evaluator().evaluate(&statement[at + 1..])?;
        if matches!(value, Value::Void) {
            return Err(EvalError::wrong_type(format!(
                "cannot assign a void result to '{target}'"
            )));
        }
        let rendered = value.format();
        self.assign(target, value)?;
        Ok(format!("{target} = {rendered}"))
    }

    fn assign(&mut self, target: &str, value: Value) -> Result<(), EvalError> {
        if target.strip_prefix('#').is_some_and(scan::is_identifier) {
            return Err(EvalError::read_only(target));
        }
        if scan::is_identifier(target) {
            self.variables.insert(target.to_string(), value);
            return Ok(());
        }
        self.evaluator().assign_member(target, value)
    }

    pub fn register_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Exposes a host instance whose Rust type was registered with
    /// [`Interpreter::register_type`].
    pub fn register_object<T: Any>(
        &mut self,
        name: impl Into<String>,
        instance: Rc<T>,
    ) -> Result<(), EvalError> {
        let value = self.catalog.object_value(instance).ok_or_else(|| {
            EvalError::new(
                ErrorCode::TypeNotFound,
                format!("{} is not a registered type", std::any::type_name::<T>()),
            )
        })?;
        self.variables.insert(name.into(), value);
        Ok(())
    }

    /// Registers a computed read-only variable; `#` is prepended when absent.
    pub fn register_preset_variable<F>(&mut self, name: &str, getter: F)
    where
        F: Fn() -> Result<Value, HostError> + 'static,
    {
        let name = if name.starts_with('#') {
            name.to_string()
        } else {
            format!("#{name}")
        };
        self.presets.insert(name, Rc::new(getter));
    }

    /// Adds an overload to the function `name`, callable as `name(args)`.
    pub fn register_preset_func<F>(&mut self, name: &str, params: Vec<Param>, body: F)
    where
        F: Fn(&Invocation<'_>) -> Result<Value, HostError> + 'static,
    {
        self.functions
            .entry(name.to_string())
            .or_insert_with(|| HostFunction::new(name))
            .overloads
            .push(Rc::new(MethodDef::new(name, params, body)));
    }

    pub fn register_type(&mut self, def: ClassDef) -> TypeHandle {
        self.catalog.register_class(def)
    }

    pub fn register_generic_type(&mut self, def: GenericDef) {
        self.catalog.register_generic(def);
    }

    pub fn resolve_type(&self, name: &str) -> Option<TypeHandle> {
        self.resolver.resolve(name, &self.catalog)
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn clear_variables(&mut self) {
        self.variables.clear();
    }

    pub fn variable_names(&self) -> Vec<String> {
        sorted_keys(&self.variables)
    }

    pub fn preset_variable_names(&self) -> Vec<String> {
        sorted_keys(&self.presets)
    }

    pub fn function_names(&self) -> Vec<String> {
        sorted_keys(&self.functions)
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }
}

fn sorted_keys<V>(table: &HashMap<String, V>) -> Vec<String> {
    let mut names: Vec<String> = table.keys().cloned().collect();
    names.sort();
    names
}

fn failure(err: EvalError) -> ExecOutcome {
    ExecOutcome {
        output: err.to_string(),
        failed: true,
    }
}
