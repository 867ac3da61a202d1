//! Type descriptors and the registration model for host types.
//!
//! Host types are described once at startup through [`ClassBuilder`], which
//! produces a [`ClassDef`]: a static table of fields, methods, constructors and
//! an optional indexer. The evaluator and the overload resolver only ever see
//! these tables.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::catalog::TypeCatalog;
use crate::error::{ErrorCode, HostError};
use crate::value::{ObjectRef, Value};

pub type TypeHandle = Rc<TypeInfo>;

/// Host callback used for every member kind. Fields receive no arguments,
/// setters receive the new value, indexers receive the index (and value).
pub type HostFn = Rc<dyn Fn(&Invocation<'_>) -> Result<Value, HostError>>;

pub(crate) type DisplayFn = Rc<dyn Fn(&dyn Any) -> Option<String>>;

/// Built-in scalar types addressable by keyword or `System.*` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    SByte,
    Byte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    String,
    Object,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 13] = [
        PrimitiveKind::Bool,
        PrimitiveKind::SByte,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::UShort,
        PrimitiveKind::Int,
        PrimitiveKind::UInt,
        PrimitiveKind::Long,
        PrimitiveKind::ULong,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
        PrimitiveKind::String,
        PrimitiveKind::Object,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::SByte => "sbyte",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::UShort => "ushort",
            PrimitiveKind::Int => "int",
            PrimitiveKind::UInt => "uint",
            PrimitiveKind::Long => "long",
            PrimitiveKind::ULong => "ulong",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "string",
            PrimitiveKind::Object => "object",
        }
    }

    pub fn system_name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "Boolean",
            PrimitiveKind::SByte => "SByte",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Short => "Int16",
            PrimitiveKind::UShort => "UInt16",
            PrimitiveKind::Int => "Int32",
            PrimitiveKind::UInt => "UInt32",
            PrimitiveKind::Long => "Int64",
            PrimitiveKind::ULong => "UInt64",
            PrimitiveKind::Float => "Single",
            PrimitiveKind::Double => "Double",
            PrimitiveKind::String => "String",
            PrimitiveKind::Object => "Object",
        }
    }

    pub fn from_keyword(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.keyword() == name)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_integer(self) -> bool {
        self.integer_range().is_some()
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double)
    }

    /// Inclusive bounds of an integer width.
    pub fn integer_range(self) -> Option<(i128, i128)> {
        let range = match self {
            PrimitiveKind::SByte => (i8::MIN as i128, i8::MAX as i128),
            PrimitiveKind::Byte => (u8::MIN as i128, u8::MAX as i128),
            PrimitiveKind::Short => (i16::MIN as i128, i16::MAX as i128),
            PrimitiveKind::UShort => (u16::MIN as i128, u16::MAX as i128),
            PrimitiveKind::Int => (i32::MIN as i128, i32::MAX as i128),
            PrimitiveKind::UInt => (u32::MIN as i128, u32::MAX as i128),
            PrimitiveKind::Long => (i64::MIN as i128, i64::MAX as i128),
            PrimitiveKind::ULong => (u64::MIN as i128, u64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }

    pub fn is_value_type(self) -> bool {
        !matches!(self, PrimitiveKind::String | PrimitiveKind::Object)
    }

    pub fn handle(self) -> TypeHandle {
        Rc::new(TypeInfo {
            name: self.keyword().to_string(),
            full_name: format!("System.{}", self.system_name()),
            kind: TypeKind::Primitive(self),
        })
    }
}

pub enum TypeKind {
    Primitive(PrimitiveKind),
    Class(Rc<ClassDef>),
    Generic {
        base: String,
        args: Vec<TypeHandle>,
        class: Rc<ClassDef>,
    },
    Array {
        element: TypeHandle,
        class: Rc<ClassDef>,
    },
}

/// Resolved type descriptor. Two descriptors denote the same type when their
/// full names match.
pub struct TypeInfo {
    name: String,
    full_name: String,
    kind: TypeKind,
}

impl TypeInfo {
    pub(crate) fn class(def: Rc<ClassDef>) -> TypeHandle {
        Rc::new(TypeInfo {
            name: def.name.clone(),
            full_name: def.full_name(),
            kind: TypeKind::Class(def),
        })
    }

    pub(crate) fn generic(
        base: &str,
        namespace: Option<&str>,
        args: Vec<TypeHandle>,
        class: Rc<ClassDef>,
    ) -> TypeHandle {
        let short_args: Vec<&str> = args.iter().map(|arg| arg.name()).collect();
        let full_args: Vec<&str> = args.iter().map(|arg| arg.full_name()).collect();
        let qualified = match namespace {
            Some(ns) => format!("{ns}.{base}"),
            None => base.to_string(),
        };
        Rc::new(TypeInfo {
            name: format!("{base}<{}>", short_args.join(", ")),
            full_name: format!("{qualified}<{}>", full_args.join(",")),
            kind: TypeKind::Generic {
                base: base.to_string(),
                args,
                class,
            },
        })
    }

    pub(crate) fn array(element: TypeHandle, class: Rc<ClassDef>) -> TypeHandle {
        Rc::new(TypeInfo {
            name: format!("{}[]", element.name()),
            full_name: format!("{}[]", element.full_name()),
            kind: TypeKind::Array { element, class },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self.kind {
            TypeKind::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn class_def(&self) -> Option<&Rc<ClassDef>> {
        match &self.kind {
            TypeKind::Primitive(_) => None,
            TypeKind::Class(class)
            | TypeKind::Generic { class, .. }
            | TypeKind::Array { class, .. } => Some(class),
        }
    }

    pub fn type_args(&self) -> &[TypeHandle] {
        match &self.kind {
            TypeKind::Generic { args, .. } => args,
            _ => &[],
        }
    }

    pub fn element_type(&self) -> Option<&TypeHandle> {
        match &self.kind {
            TypeKind::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.primitive().is_some_and(PrimitiveKind::is_numeric)
    }

    pub fn is_value_type(&self) -> bool {
        match &self.kind {
            TypeKind::Primitive(kind) => kind.is_value_type(),
            TypeKind::Class(class) | TypeKind::Generic { class, .. } => class.value_type,
            TypeKind::Array { .. } => false,
        }
    }

    pub fn same_as(&self, other: &TypeInfo) -> bool {
        self.full_name == other.full_name
    }

    /// Whether a value whose runtime type is `other` can be passed where
    /// `self` is expected without being the exact same type.
    pub fn is_assignable_from(&self, other: &TypeInfo) -> bool {
        if self.same_as(other) || self.primitive() == Some(PrimitiveKind::Object) {
            return true;
        }
        other
            .class_def()
            .is_some_and(|class| class.supertypes.iter().any(|s| s == &self.full_name))
    }

    /// Value an uninitialised slot of this type holds (array elements).
    pub fn default_value(&self) -> Value {
        match self.primitive() {
            Some(kind) if kind.is_integer() => Value::from(0i64),
            Some(kind) if kind.is_float() => Value::from(0.0f64),
            Some(PrimitiveKind::Bool) => Value::Bool(false),
            _ => Value::Null,
        }
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeInfo").field(&self.full_name).finish()
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Parameter type as declared: concrete, or the n-th generic argument of a
/// generic method.
#[derive(Clone)]
pub enum TypeSlot {
    Concrete(TypeHandle),
    Generic(usize),
}

#[derive(Clone)]
pub struct Param {
    pub slot: TypeSlot,
    pub default: Option<Value>,
}

impl Param {
    pub fn new(ty: TypeHandle) -> Self {
        Self {
            slot: TypeSlot::Concrete(ty),
            default: None,
        }
    }

    pub fn of(kind: PrimitiveKind) -> Self {
        Self::new(kind.handle())
    }

    pub fn generic(index: usize) -> Self {
        Self {
            slot: TypeSlot::Generic(index),
            default: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A parameter after generic substitution; what the overload resolver scores.
#[derive(Clone)]
pub struct ResolvedParam {
    pub ty: TypeHandle,
    pub default: Option<Value>,
}

pub struct FieldDef {
    pub name: String,
    pub ty: TypeHandle,
    pub is_static: bool,
    pub(crate) getter: HostFn,
    pub(crate) setter: Option<HostFn>,
}

/// One callable overload: a method, a static method, a constructor or a
/// preset function.
pub struct MethodDef {
    pub name: String,
    pub params: Vec<Param>,
    pub generic_arity: usize,
    pub is_static: bool,
    pub(crate) invoke: HostFn,
}

impl MethodDef {
    pub fn new(
        name: impl Into<String>,
        params: Vec<Param>,
        invoke: impl Fn(&Invocation<'_>) -> Result<Value, HostError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            generic_arity: 0,
            is_static: true,
            invoke: Rc::new(invoke),
        }
    }

    pub fn resolve_params(&self, type_args: &[TypeHandle]) -> Option<Vec<ResolvedParam>> {
        self.params
            .iter()
            .map(|param| {
                let ty = match &param.slot {
                    TypeSlot::Concrete(ty) => ty.clone(),
                    TypeSlot::Generic(index) => type_args.get(*index)?.clone(),
                };
                Some(ResolvedParam {
                    ty,
                    default: param.default.clone(),
                })
            })
            .collect()
    }
}

pub struct IndexerDef {
    pub(crate) get: HostFn,
    pub(crate) set: Option<HostFn>,
}

/// Member table of one host type.
pub struct ClassDef {
    pub name: String,
    pub namespace: Option<String>,
    pub value_type: bool,
    pub supertypes: Vec<String>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<Rc<MethodDef>>,
    pub constructors: Vec<Rc<MethodDef>>,
    pub(crate) indexer: Option<IndexerDef>,
    pub(crate) display: Option<DisplayFn>,
    pub(crate) rust_type: Option<TypeId>,
}

impl ClassDef {
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn field(&self, name: &str, is_static: bool) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|field| field.name == name && field.is_static == is_static)
    }

    pub fn methods_named(&self, name: &str, is_static: bool) -> Vec<Rc<MethodDef>> {
        self.methods
            .iter()
            .filter(|method| method.name == name && method.is_static == is_static)
            .cloned()
            .collect()
    }

    pub fn has_indexer(&self) -> bool {
        self.indexer.is_some()
    }
}

/// Arguments and context handed to every host callback.
pub struct Invocation<'a> {
    pub(crate) owner: &'a TypeHandle,
    pub(crate) target: Option<&'a Value>,
    pub(crate) args: &'a [Value],
    pub(crate) type_args: &'a [TypeHandle],
    pub(crate) catalog: &'a TypeCatalog,
}

impl<'a> Invocation<'a> {
    /// The type declaring the member being invoked (or being constructed).
    pub fn owner(&self) -> &TypeHandle {
        self.owner
    }

    pub fn target(&self) -> Option<&Value> {
        self.target
    }

    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn type_args(&self) -> &[TypeHandle] {
        self.type_args
    }

    pub fn catalog(&self) -> &TypeCatalog {
        self.catalog
    }

    pub fn this<T: Any>(&self) -> Result<&'a T, HostError> {
        match self.target {
            Some(Value::Object(object)) => object.downcast_ref::<T>().ok_or_else(|| {
                HostError::new(format!("receiver is not a {}", self.owner.name()))
            }),
            _ => Err(HostError::with_code(
                ErrorCode::NullReference,
                "missing receiver",
            )),
        }
    }

    pub fn arg(&self, index: usize) -> Result<&'a Value, HostError> {
        self.args.get(index).ok_or_else(|| {
            HostError::with_code(
                ErrorCode::InvalidArgumentCount,
                format!("missing argument {index}"),
            )
        })
    }

    pub fn int_arg(&self, index: usize) -> Result<i64, HostError> {
        match self.arg(index)? {
            Value::Numeric(number) if number.is_integer() => Ok(number.to_i64()),
            other => Err(argument_mismatch(index, "an integer", other)),
        }
    }

    pub fn float_arg(&self, index: usize) -> Result<f64, HostError> {
        match self.arg(index)? {
            Value::Numeric(number) => Ok(number.to_f64()),
            other => Err(argument_mismatch(index, "a number", other)),
        }
    }

    pub fn bool_arg(&self, index: usize) -> Result<bool, HostError> {
        match self.arg(index)? {
            Value::Bool(flag) => Ok(*flag),
            other => Err(argument_mismatch(index, "a bool", other)),
        }
    }

    pub fn str_arg(&self, index: usize) -> Result<&'a str, HostError> {
        match self.arg(index)? {
            Value::Str(text) => Ok(text.as_str()),
            other => Err(argument_mismatch(index, "a string", other)),
        }
    }

    /// Wraps a host instance whose Rust type was registered with the catalog.
    pub fn wrap<T: Any>(&self, instance: Rc<T>) -> Result<Value, HostError> {
        self.catalog.object_value(instance).ok_or_else(|| {
            HostError::with_code(
                ErrorCode::TypeNotFound,
                format!("{} is not a registered type", std::any::type_name::<T>()),
            )
        })
    }
}

fn argument_mismatch(index: usize, expected: &str, actual: &Value) -> HostError {
    HostError::with_code(
        ErrorCode::InvalidArgumentType,
        format!("argument {index} must be {expected}, got {}", actual.kind_name()),
    )
}

/// Builds the member table for the host type `T`.
///
/// Member callbacks receive `&T`; mutation goes through interior mutability
/// on the host side, since the host owns the instance's lifetime.
pub struct ClassBuilder<T> {
    def: ClassDef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> ClassBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            def: ClassDef {
                name: name.into(),
                namespace: None,
                value_type: false,
                supertypes: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                constructors: Vec::new(),
                indexer: None,
                display: None,
                rust_type: Some(TypeId::of::<T>()),
            },
            _marker: PhantomData,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.def.namespace = Some(namespace.into());
        self
    }

    pub fn value_type(mut self) -> Self {
        self.def.value_type = true;
        self
    }

    /// Declares a base class or interface by full name for assignability.
    pub fn implements(mut self, full_name: impl Into<String>) -> Self {
        self.def.supertypes.push(full_name.into());
        self
    }

    /// Excludes the Rust type from object wrapping lookups; used by generic
    /// instantiations that share one Rust type.
    pub(crate) fn anonymous(mut self) -> Self {
        self.def.rust_type = None;
        self
    }

    /// Instance field whose receiver is not a host object, such as the
    /// members of `Value::Str`.
    pub(crate) fn instance_hook<G>(mut self, name: &str, ty: TypeHandle, get: G) -> Self
    where
        G: Fn(&Invocation<'_>) -> Result<Value, HostError> + 'static,
    {
        self.def.fields.push(FieldDef {
            name: name.to_string(),
            ty,
            is_static: false,
            getter: Rc::new(get),
            setter: None,
        });
        self
    }

    pub(crate) fn instance_method_hook<F>(mut self, name: &str, params: Vec<Param>, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, HostError> + 'static,
    {
        let mut method = MethodDef::new(name, params, body);
        method.is_static = false;
        self.def.methods.push(Rc::new(method));
        self
    }

    pub fn field<G>(self, name: impl Into<String>, ty: TypeHandle, get: G) -> Self
    where
        G: Fn(&T) -> Value + 'static,
    {
        self.property(name, ty, move |this: &T, _call: &Invocation<'_>| Ok(get(this)))
    }

    pub fn field_rw<G, S>(self, name: impl Into<String>, ty: TypeHandle, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + 'static,
        S: Fn(&T, Value) -> Result<(), HostError> + 'static,
    {
        let mut builder = self.field(name, ty, get);
        let setter: HostFn = Rc::new(move |call: &Invocation<'_>| {
            let this = call.this::<T>()?;
            set(this, call.arg(0)?.clone())?;
            Ok(Value::Void)
        });
        if let Some(field) = builder.def.fields.last_mut() {
            field.setter = Some(setter);
        }
        builder
    }

    /// Read-only member computed with access to the invocation context.
    pub fn property<G>(mut self, name: impl Into<String>, ty: TypeHandle, get: G) -> Self
    where
        G: Fn(&T, &Invocation<'_>) -> Result<Value, HostError> + 'static,
    {
        let getter: HostFn = Rc::new(move |call: &Invocation<'_>| get(call.this::<T>()?, call));
        self.def.fields.push(FieldDef {
            name: name.into(),
            ty,
            is_static: false,
            getter,
            setter: None,
        });
        self
    }

    pub fn static_field<G>(mut self, name: impl Into<String>, ty: TypeHandle, get: G) -> Self
    where
        G: Fn() -> Value + 'static,
    {
        self.def.fields.push(FieldDef {
            name: name.into(),
            ty,
            is_static: true,
            getter: Rc::new(move |_call: &Invocation<'_>| Ok(get())),
            setter: None,
        });
        self
    }

    pub fn method<F>(self, name: impl Into<String>, params: Vec<Param>, body: F) -> Self
    where
        F: Fn(&T, &Invocation<'_>) -> Result<Value, HostError> + 'static,
    {
        self.generic_method(name, 0, params, body)
    }

    pub fn generic_method<F>(
        mut self,
        name: impl Into<String>,
        generic_arity: usize,
        params: Vec<Param>,
        body: F,
    ) -> Self
    where
        F: Fn(&T, &Invocation<'_>) -> Result<Value, HostError> + 'static,
    {
        self.def.methods.push(Rc::new(MethodDef {
            name: name.into(),
            params,
            generic_arity,
            is_static: false,
            invoke: Rc::new(move |call: &Invocation<'_>| body(call.this::<T>()?, call)),
        }));
        self
    }

    pub fn static_method<F>(self, name: impl Into<String>, params: Vec<Param>, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, HostError> + 'static,
    {
        self.static_generic_method(name, 0, params, body)
    }

    pub fn static_generic_method<F>(
        mut self,
        name: impl Into<String>,
        generic_arity: usize,
        params: Vec<Param>,
        body: F,
    ) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, HostError> + 'static,
    {
        let mut method = MethodDef::new(name, params, body);
        method.generic_arity = generic_arity;
        self.def.methods.push(Rc::new(method));
        self
    }

    pub fn constructor<F>(mut self, params: Vec<Param>, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<T, HostError> + 'static,
    {
        let name = self.def.name.clone();
        self.def.constructors.push(Rc::new(MethodDef::new(
            name,
            params,
            move |call: &Invocation<'_>| {
                let instance = body(call)?;
                Ok(Value::Object(ObjectRef::new(
                    call.owner().clone(),
                    Rc::new(instance),
                )))
            },
        )));
        self
    }

    pub fn indexer<G>(mut self, get: G) -> Self
    where
        G: Fn(&T, &Value, &Invocation<'_>) -> Result<Value, HostError> + 'static,
    {
        self.def.indexer = Some(IndexerDef {
            get: Rc::new(move |call: &Invocation<'_>| get(call.this::<T>()?, call.arg(0)?, call)),
            set: None,
        });
        self
    }

    pub fn indexer_rw<G, S>(self, get: G, set: S) -> Self
    where
        G: Fn(&T, &Value, &Invocation<'_>) -> Result<Value, HostError> + 'static,
        S: Fn(&T, &Value, Value, &Invocation<'_>) -> Result<(), HostError> + 'static,
    {
        let mut builder = self.indexer(get);
        if let Some(indexer) = builder.def.indexer.as_mut() {
            indexer.set = Some(Rc::new(move |call: &Invocation<'_>| {
                set(call.this::<T>()?, call.arg(0)?, call.arg(1)?.clone(), call)?;
                Ok(Value::Void)
            }));
        }
        builder
    }

    pub fn display<F>(mut self, render: F) -> Self
    where
        F: Fn(&T) -> String + 'static,
    {
        self.def.display = Some(Rc::new(move |instance: &dyn Any| {
            instance.downcast_ref::<T>().map(&render)
        }));
        self
    }

    pub fn build(self) -> ClassDef {
        self.def
    }
}
