//! Tagged value model and the capability interfaces values may expose.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::catalog::TypeCatalog;
use crate::dispatch;
use crate::error::{ErrorCode, EvalError};
use crate::types::{MethodDef, PrimitiveKind, TypeHandle};

/// Integer or float; an integer never carries a fractional part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn is_integer(self) -> bool {
        matches!(self, Numeric::Int(_))
    }

    pub fn to_i64(self) -> i64 {
        match self {
            Numeric::Int(value) => value,
            Numeric::Float(value) => value as i64,
        }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Numeric::Int(value) => value as f64,
            Numeric::Float(value) => value,
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Int(value) => write!(f, "{value}"),
            Numeric::Float(value) => write!(f, "{value}"),
        }
    }
}

/// Reference to a host instance. The interpreter shares the instance but the
/// host decides how long it lives.
#[derive(Clone)]
pub struct ObjectRef {
    ty: TypeHandle,
    instance: Rc<dyn Any>,
}

impl ObjectRef {
    pub fn new(ty: TypeHandle, instance: Rc<dyn Any>) -> Self {
        Self { ty, instance }
    }

    pub fn type_handle(&self) -> &TypeHandle {
        &self.ty
    }

    pub fn instance(&self) -> &Rc<dyn Any> {
        &self.instance
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.instance.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.instance, &other.instance)
    }

    fn render(&self) -> String {
        let Some(_guard) = RenderGuard::enter(&self.instance) else {
            return ELIDED.to_string();
        };
        self.ty
            .class_def()
            .and_then(|class| class.display.as_ref())
            .and_then(|display| display(self.instance.as_ref()))
            .unwrap_or_else(|| format!("<{}>", self.ty.full_name()))
    }
}

/// Stands in for an object that is already being rendered further out, or
/// that sits deeper than [`MAX_RENDER_DEPTH`].
pub(crate) const ELIDED: &str = "<...>";

const MAX_RENDER_DEPTH: usize = 16;

thread_local! {
    static RENDERING: RefCell<Vec<*const ()>> = const { RefCell::new(Vec::new()) };
}

/// Marks an instance as being rendered on this thread until dropped.
struct RenderGuard;

impl RenderGuard {
    fn enter(instance: &Rc<dyn Any>) -> Option<Self> {
        let id = Rc::as_ptr(instance) as *const ();
        RENDERING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.len() >= MAX_RENDER_DEPTH || stack.contains(&id) {
                return None;
            }
            stack.push(id);
            Some(RenderGuard)
        })
    }
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        RENDERING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.ty.full_name()).finish()
    }
}

/// Overload set found by member lookup, optionally bound to a receiver and
/// carrying explicit generic arguments.
#[derive(Clone)]
pub struct MethodGroup {
    pub name: String,
    pub owner: TypeHandle,
    pub candidates: Vec<Rc<MethodDef>>,
    pub target: Option<Box<Value>>,
    pub type_args: Vec<TypeHandle>,
}

impl MethodGroup {
    pub fn with_type_args(mut self, type_args: Vec<TypeHandle>) -> Self {
        self.type_args = type_args;
        self
    }
}

impl fmt::Debug for MethodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodGroup")
            .field("name", &self.name)
            .field("owner", &self.owner.full_name())
            .field("overloads", &self.candidates.len())
            .finish()
    }
}

/// Host function registered directly with the interpreter.
#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub overloads: Vec<Rc<MethodDef>>,
    pub(crate) owner: TypeHandle,
}

impl HostFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
            owner: PrimitiveKind::Object.handle(),
        }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("overloads", &self.overloads.len())
            .finish()
    }
}

/// Plain host data behind a value, as returned by [`Value::raw_value`].
#[derive(Debug, Clone)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(Rc<dyn Any>),
    Type(TypeHandle),
}

impl PartialEq for RawValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RawValue::Bool(a), RawValue::Bool(b)) => a == b,
            (RawValue::Int(a), RawValue::Int(b)) => a == b,
            (RawValue::Float(a), RawValue::Float(b)) => a == b,
            (RawValue::Str(a), RawValue::Str(b)) => a == b,
            (RawValue::Object(a), RawValue::Object(b)) => Rc::ptr_eq(a, b),
            (RawValue::Type(a), RawValue::Type(b)) => a.same_as(b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Numeric(Numeric),
    Str(String),
    Error(EvalError),
    Void,
    Object(ObjectRef),
    Type(TypeHandle),
    MethodGroup(MethodGroup),
    Function(HostFunction),
}

pub trait StringLike {
    fn as_str(&self) -> &str;
}

pub trait Indexable {
    fn get_at(&self, index: &Value, catalog: &TypeCatalog) -> Result<Value, EvalError>;
    fn set_at(&self, index: &Value, value: Value, catalog: &TypeCatalog) -> Result<(), EvalError>;
}

pub trait MemberAccessible {
    fn get_member(&self, name: &str, catalog: &TypeCatalog) -> Result<Value, EvalError>;
    fn set_member(&self, name: &str, value: Value, catalog: &TypeCatalog)
        -> Result<(), EvalError>;
}

pub trait Callable {
    fn call(&self, args: &[Value], catalog: &TypeCatalog) -> Result<Value, EvalError>;
}

impl Value {
    pub fn object(ty: TypeHandle, instance: Rc<dyn Any>) -> Self {
        Value::Object(ObjectRef::new(ty, instance))
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Value::Error(EvalError::new(code, message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Turns an error value back into an `Err` so `?` can short-circuit.
    pub fn into_result(self) -> Result<Value, EvalError> {
        match self {
            Value::Error(err) => Err(err),
            other => Ok(other),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Numeric(Numeric::Int(_)) => "integer",
            Value::Numeric(Numeric::Float(_)) => "float",
            Value::Str(_) => "string",
            Value::Error(_) => "error",
            Value::Void => "void",
            Value::Object(_) => "object",
            Value::Type(_) => "type",
            Value::MethodGroup(_) => "method group",
            Value::Function(_) => "function",
        }
    }

    /// Runtime type used by exact/assignable overload matching.
    pub fn runtime_type(&self, catalog: &TypeCatalog) -> Option<TypeHandle> {
        match self {
            Value::Bool(_) => Some(PrimitiveKind::Bool.handle()),
            Value::Numeric(Numeric::Int(_)) => Some(PrimitiveKind::Long.handle()),
            Value::Numeric(Numeric::Float(_)) => Some(PrimitiveKind::Double.handle()),
            Value::Str(_) => Some(catalog.string_type().clone()),
            Value::Object(object) => Some(object.type_handle().clone()),
            _ => None,
        }
    }

    pub fn as_numeric(&self) -> Option<Numeric> {
        match self {
            Value::Numeric(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_string_like(&self) -> Option<&dyn StringLike> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_indexable(&self) -> Option<&dyn Indexable> {
        match self {
            Value::Str(text) => Some(text),
            Value::Object(object)
                if object
                    .type_handle()
                    .class_def()
                    .is_some_and(|class| class.has_indexer()) =>
            {
                Some(object)
            }
            _ => None,
        }
    }

    pub fn as_member_accessible(&self) -> Option<&dyn MemberAccessible> {
        match self {
            Value::Str(text) => Some(text),
            Value::Object(object) => Some(object),
            Value::Type(ty)
                if ty.class_def().is_some() || ty.primitive() == Some(PrimitiveKind::String) =>
            {
                Some(ty)
            }
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&dyn Callable> {
        match self {
            Value::MethodGroup(group) => Some(group),
            Value::Function(function) => Some(function),
            Value::Type(ty) if ty.class_def().is_some() => Some(ty),
            _ => None,
        }
    }

    pub fn raw_value(&self) -> Option<RawValue> {
        match self {
            Value::Bool(flag) => Some(RawValue::Bool(*flag)),
            Value::Numeric(Numeric::Int(value)) => Some(RawValue::Int(*value)),
            Value::Numeric(Numeric::Float(value)) => Some(RawValue::Float(*value)),
            Value::Str(text) => Some(RawValue::Str(text.clone())),
            Value::Object(object) => Some(RawValue::Object(object.instance().clone())),
            Value::Type(ty) => Some(RawValue::Type(ty.clone())),
            Value::Null
            | Value::Error(_)
            | Value::Void
            | Value::MethodGroup(_)
            | Value::Function(_) => None,
        }
    }

    /// Human readable rendering used for command results.
    pub fn format(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Numeric(number) => number.to_string(),
            Value::Str(text) => text.clone(),
            Value::Error(err) => err.to_string(),
            Value::Void => "void".to_string(),
            Value::Object(object) => object.render(),
            Value::Type(ty) => format!("type {}", ty.full_name()),
            Value::MethodGroup(group) => format!(
                "method {}.{} ({} overloads)",
                group.owner.name(),
                group.name,
                group.candidates.len()
            ),
            Value::Function(function) => format!("function {}", function.name),
        }
    }

    /// Like [`Value::format`] but quotes strings; used inside collections.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(text) => format!("{text:?}"),
            other => other.format(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Numeric(Numeric::Int(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Numeric(Numeric::Int(value.into()))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Numeric(Numeric::Int(value.into()))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(value) => Value::Numeric(Numeric::Int(value)),
            Err(_) => Value::Numeric(Numeric::Float(value as f64)),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Numeric(Numeric::Float(value))
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Numeric(Numeric::Float(value.into()))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<EvalError> for Value {
    fn from(err: EvalError) -> Self {
        Value::Error(err)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Equality used by `==`/`!=` and by collection lookups.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Numeric(Numeric::Int(a)), Value::Numeric(Numeric::Int(b))) => a == b,
        (Value::Numeric(a), Value::Numeric(b)) => a.to_f64() == b.to_f64(),
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        (Value::Type(a), Value::Type(b)) => a.same_as(b),
        _ => false,
    }
}

impl StringLike for String {
    fn as_str(&self) -> &str {
        self
    }
}

impl Indexable for String {
    fn get_at(&self, index: &Value, _catalog: &TypeCatalog) -> Result<Value, EvalError> {
        let position = match index {
            Value::Numeric(Numeric::Int(position)) => *position,
            other => {
                return Err(EvalError::wrong_type(format!(
                    "string index must be an integer, got {}",
                    other.kind_name()
                )))
            }
        };
        usize::try_from(position)
            .ok()
            .and_then(|position| self.chars().nth(position))
            .map(|ch| Value::Str(ch.to_string()))
            .ok_or_else(|| {
                EvalError::new(
                    ErrorCode::IndexOutOfRange,
                    format!("index {position} is outside string of length {}", self.chars().count()),
                )
            })
    }

    fn set_at(&self, _index: &Value, _value: Value, _catalog: &TypeCatalog) -> Result<(), EvalError> {
        Err(EvalError::read_only("string"))
    }
}

impl MemberAccessible for String {
    fn get_member(&self, name: &str, catalog: &TypeCatalog) -> Result<Value, EvalError> {
        let target = Value::Str(self.clone());
        dispatch::get_instance_member(catalog.string_type(), catalog.string_class(), &target, name, catalog)
    }

    fn set_member(&self, name: &str, _value: Value, _catalog: &TypeCatalog) -> Result<(), EvalError> {
        Err(EvalError::read_only(&format!("string.{name}")))
    }
}

impl Indexable for ObjectRef {
    fn get_at(&self, index: &Value, catalog: &TypeCatalog) -> Result<Value, EvalError> {
        dispatch::index_get(self, index, catalog)
    }

    fn set_at(&self, index: &Value, value: Value, catalog: &TypeCatalog) -> Result<(), EvalError> {
        dispatch::index_set(self, index, value, catalog)
    }
}

impl MemberAccessible for ObjectRef {
    fn get_member(&self, name: &str, catalog: &TypeCatalog) -> Result<Value, EvalError> {
        let class = self
            .type_handle()
            .class_def()
            .ok_or_else(|| EvalError::member_not_found(self.type_handle(), name))?;
        let target = Value::Object(self.clone());
        dispatch::get_instance_member(self.type_handle(), class, &target, name, catalog)
    }

    fn set_member(&self, name: &str, value: Value, catalog: &TypeCatalog) -> Result<(), EvalError> {
        let target = Value::Object(self.clone());
        dispatch::set_field(self.type_handle(), Some(&target), name, value, catalog)
    }
}

impl MemberAccessible for TypeHandle {
    fn get_member(&self, name: &str, catalog: &TypeCatalog) -> Result<Value, EvalError> {
        dispatch::get_static_member(self, name, catalog)
    }

    fn set_member(&self, name: &str, value: Value, catalog: &TypeCatalog) -> Result<(), EvalError> {
        dispatch::set_field(self, None, name, value, catalog)
    }
}

impl Callable for MethodGroup {
    fn call(&self, args: &[Value], catalog: &TypeCatalog) -> Result<Value, EvalError> {
        dispatch::call_overloaded(
            &self.owner,
            &self.name,
            &self.candidates,
            self.target.as_deref(),
            args,
            &self.type_args,
            catalog,
        )
    }
}

impl Callable for HostFunction {
    fn call(&self, args: &[Value], catalog: &TypeCatalog) -> Result<Value, EvalError> {
        dispatch::call_function(&self.owner, &self.name, &self.overloads, args, catalog)
    }
}

impl Callable for TypeHandle {
    fn call(&self, args: &[Value], catalog: &TypeCatalog) -> Result<Value, EvalError> {
        dispatch::construct(self, args, catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_expose_no_capabilities() {
        let err = Value::error(ErrorCode::ParseError, "bad");
        assert!(err.as_numeric().is_none());
        assert!(err.as_string_like().is_none());
        assert!(err.as_indexable().is_none());
        assert!(err.as_member_accessible().is_none());
        assert!(err.as_callable().is_none());
        assert!(err.raw_value().is_none());
    }

    #[test]
    fn strings_are_indexable_and_string_like() {
        let catalog = TypeCatalog::new();
        let text = Value::from("abc");
        assert_eq!(text.as_string_like().map(|s| s.as_str()), Some("abc"));
        let indexable = text.as_indexable().expect("strings index");
        let ch = indexable.get_at(&Value::from(1i64), &catalog).unwrap();
        assert_eq!(ch.raw_value(), Some(RawValue::Str("b".into())));
        let err = indexable.get_at(&Value::from(9i64), &catalog).unwrap_err();
        assert_eq!(err.code, ErrorCode::IndexOutOfRange);
    }

    #[test]
    fn numeric_equality_crosses_representations() {
        assert!(values_equal(&Value::from(2i64), &Value::from(2.0f64)));
        assert!(!values_equal(&Value::from(2i64), &Value::from("2")));
        assert!(values_equal(&Value::Null, &Value::Null));
    }

    #[test]
    fn formatting_is_human_readable() {
        assert_eq!(Value::from(42i64).format(), "42");
        assert_eq!(Value::from(2.5f64).format(), "2.5");
        assert_eq!(Value::Null.format(), "null");
        assert_eq!(Value::from("hi").repr(), "\"hi\"");
    }
}
