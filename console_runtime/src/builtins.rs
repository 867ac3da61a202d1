//! Members available on string values.

use crate::error::{ErrorCode, HostError};
use crate::types::{ClassBuilder, ClassDef, Invocation, Param, PrimitiveKind};
use crate::value::Value;

/// Marker Rust type for the string member table; strings themselves are
/// `Value::Str`, so members read the receiver from the invocation target.
struct StringMembers;

fn receiver<'a>(call: &Invocation<'a>) -> Result<&'a str, HostError> {
    match call.target {
        Some(Value::Str(text)) => Ok(text.as_str()),
        _ => Err(HostError::with_code(
            ErrorCode::NullReference,
            "string member called without a string receiver",
        )),
    }
}

fn char_offset(text: &str, index: i64) -> Result<usize, HostError> {
    let count = text.chars().count();
    usize::try_from(index)
        .ok()
        .filter(|index| *index <= count)
        .ok_or_else(|| {
            HostError::with_code(
                ErrorCode::IndexOutOfRange,
                format!("index {index} is outside string of length {count}"),
            )
        })
}

pub(crate) fn string_class() -> ClassDef {
    let int = || Param::of(PrimitiveKind::Int);
    let string = || Param::of(PrimitiveKind::String);
    ClassBuilder::<StringMembers>::new("String")
        .namespace("System")
        .anonymous()
        .static_method("IsNullOrEmpty", vec![string()], |call| {
            Ok(Value::Bool(match call.arg(0)? {
                Value::Null => true,
                Value::Str(text) => text.is_empty(),
                _ => false,
            }))
        })
        .instance_hook("Length", PrimitiveKind::Int.handle(), |call| {
            Ok(Value::from(receiver(call)?.chars().count()))
        })
        .instance_method_hook("ToUpper", vec![], |call| {
            Ok(Value::from(receiver(call)?.to_uppercase()))
        })
        .instance_method_hook("ToLower", vec![], |call| {
            Ok(Value::from(receiver(call)?.to_lowercase()))
        })
        .instance_method_hook("Trim", vec![], |call| Ok(Value::from(receiver(call)?.trim())))
        .instance_method_hook("Contains", vec![string()], |call| {
            Ok(Value::Bool(receiver(call)?.contains(call.str_arg(0)?)))
        })
        .instance_method_hook("StartsWith", vec![string()], |call| {
            Ok(Value::Bool(receiver(call)?.starts_with(call.str_arg(0)?)))
        })
        .instance_method_hook("EndsWith", vec![string()], |call| {
            Ok(Value::Bool(receiver(call)?.ends_with(call.str_arg(0)?)))
        })
        .instance_method_hook("IndexOf", vec![string()], |call| {
            let text = receiver(call)?;
            Ok(match text.find(call.str_arg(0)?) {
                Some(byte) => Value::from(text[..byte].chars().count()),
                None => Value::from(-1i64),
            })
        })
        .instance_method_hook("Substring", vec![int()], |call| {
            let text = receiver(call)?;
            let start = char_offset(text, call.int_arg(0)?)?;
            Ok(Value::from(text.chars().skip(start).collect::<String>()))
        })
        .instance_method_hook("Substring", vec![int(), int()], |call| {
            let text = receiver(call)?;
            let start = char_offset(text, call.int_arg(0)?)?;
            let length = call.int_arg(1)?;
            if length < 0 {
                return Err(HostError::with_code(
                    ErrorCode::IndexOutOfRange,
                    "length cannot be negative",
                ));
            }
            let end = (start as i64)
                .checked_add(length)
                .ok_or_else(|| {
                    HostError::with_code(ErrorCode::IndexOutOfRange, "substring end overflows")
                })
                .and_then(|end| char_offset(text, end))?;
            Ok(Value::from(
                text.chars().skip(start).take(end - start).collect::<String>(),
            ))
        })
        .build()
}
