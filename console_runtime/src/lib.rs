//! Embedded command interpreter for the frame-synchronized console.
//!
//! Hosts describe their types once through [`ClassBuilder`], expose instances
//! and computed `#presets` to an [`Interpreter`], then feed it command lines:
//!
//! ```
//! use console_runtime::{Interpreter, Value};
//!
//! let mut console = Interpreter::new();
//! console.register_variable("speed", 4);
//! assert_eq!(console.execute("speed = speed * 2.5"), "speed = 10");
//! assert_eq!(console.evaluate("speed > 3").format(), "true");
//! assert!(matches!(console.evaluate("1 / 0"), Value::Error(_)));
//! ```

mod builtins;
mod catalog;
mod collections;
mod dispatch;
mod error;
mod eval;
mod interpreter;
pub mod overload;
mod ops;
mod resolver;
mod scan;
mod types;
mod value;

pub use catalog::{GenericDef, GenericFactory, TypeCatalog};
pub use error::{panic_message, ErrorCode, EvalError, HostError};
pub use interpreter::{ExecOutcome, Interpreter, PresetGetter, VOID_MARKER};
pub use resolver::TypeResolver;
pub use types::{
    ClassBuilder, ClassDef, FieldDef, Invocation, MethodDef, Param, PrimitiveKind, ResolvedParam,
    TypeHandle, TypeInfo, TypeKind, TypeSlot,
};
pub use value::{
    values_equal, Callable, HostFunction, Indexable, MemberAccessible, MethodGroup, Numeric,
    ObjectRef, RawValue, StringLike, Value,
};
