//! Built-in generic collections (`List<T>`, `Dictionary<K,V>`, `HashSet<T>`)
//! and single-dimension arrays.
//!
//! Elements are stored as [`Value`]s already coerced to the declared element
//! type, so `List<double>` holds floats even when fed integer literals.

use std::cell::RefCell;
use std::rc::Rc;

use crate::catalog::GenericDef;
use crate::error::{ErrorCode, EvalError, HostError};
use crate::overload;
use crate::types::{ClassBuilder, ClassDef, Invocation, Param, PrimitiveKind, TypeHandle};
use crate::value::{values_equal, Numeric, Value};

const NAMESPACE: &str = "System.Collections.Generic";

/// Largest length `new T[n]` will allocate.
pub(crate) const MAX_ARRAY_LENGTH: usize = 1 << 20;

fn position(index: &Value, len: usize) -> Result<usize, HostError> {
    let Value::Numeric(Numeric::Int(raw)) = index else {
        return Err(HostError::with_code(
            ErrorCode::InvalidArgumentType,
            format!("index must be an integer, got {}", index.kind_name()),
        ));
    };
    usize::try_from(*raw)
        .ok()
        .filter(|at| *at < len)
        .ok_or_else(|| {
            HostError::with_code(
                ErrorCode::IndexOutOfRange,
                format!("index {raw} is outside collection of length {len}"),
            )
        })
}

fn render(items: impl Iterator<Item = String>, open: &str, close: &str) -> String {
    format!("{open}{}{close}", items.collect::<Vec<_>>().join(", "))
}

#[derive(Default)]
pub(crate) struct ListObject {
    items: RefCell<Vec<Value>>,
}

fn list_class(args: &[TypeHandle]) -> ClassDef {
    let element = args[0].clone();
    let slot = element.clone();
    ClassBuilder::<ListObject>::new("List")
        .namespace(NAMESPACE)
        .anonymous()
        .constructor(vec![], |_call| Ok(ListObject::default()))
        .field("Count", PrimitiveKind::Int.handle(), |list| {
            Value::from(list.items.borrow().len())
        })
        .method("Add", vec![Param::new(element.clone())], |list, call| {
            list.items.borrow_mut().push(call.arg(0)?.clone());
            Ok(Value::Void)
        })
        .method(
            "Insert",
            vec![Param::of(PrimitiveKind::Int), Param::new(element.clone())],
            |list, call| {
                let mut items = list.items.borrow_mut();
                let at = position(call.arg(0)?, items.len() + 1)?;
                items.insert(at, call.arg(1)?.clone());
                Ok(Value::Void)
            },
        )
        .method("RemoveAt", vec![Param::of(PrimitiveKind::Int)], |list, call| {
            let mut items = list.items.borrow_mut();
            let at = position(call.arg(0)?, items.len())?;
            items.remove(at);
            Ok(Value::Void)
        })
        .method("Remove", vec![Param::new(element.clone())], |list, call| {
            let mut items = list.items.borrow_mut();
            let needle = call.arg(0)?;
            let found = items.iter().position(|item| values_equal(item, needle));
            if let Some(at) = found {
                items.remove(at);
            }
            Ok(Value::Bool(found.is_some()))
        })
        .method("Contains", vec![Param::new(element.clone())], |list, call| {
            let needle = call.arg(0)?;
            Ok(Value::Bool(
                list.items.borrow().iter().any(|item| values_equal(item, needle)),
            ))
        })
        .method("IndexOf", vec![Param::new(element)], |list, call| {
            let needle = call.arg(0)?;
            Ok(match list.items.borrow().iter().position(|item| values_equal(item, needle)) {
                Some(at) => Value::from(at),
                None => Value::from(-1i64),
            })
        })
        .method("Clear", vec![], |list, _call| {
            list.items.borrow_mut().clear();
            Ok(Value::Void)
        })
        .indexer_rw(
            |list, index, _call| {
                let items = list.items.borrow();
                Ok(items[position(index, items.len())?].clone())
            },
            move |list, index, value, call| {
                let value = overload::coerce(&slot, value, call.catalog())?;
                let mut items = list.items.borrow_mut();
                let at = position(index, items.len())?;
                items[at] = value;
                Ok(())
            },
        )
        .display(|list| render(list.items.borrow().iter().map(Value::repr), "[", "]"))
        .build()
}

#[derive(Default)]
pub(crate) struct DictionaryObject {
    entries: RefCell<Vec<(Value, Value)>>,
}

impl DictionaryObject {
    fn find(&self, key: &Value) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|(existing, _)| values_equal(existing, key))
    }
}

fn dictionary_class(args: &[TypeHandle]) -> ClassDef {
    let key = args[0].clone();
    let value = args[1].clone();
    let (key_slot, value_slot) = (key.clone(), value.clone());
    ClassBuilder::<DictionaryObject>::new("Dictionary")
        .namespace(NAMESPACE)
        .anonymous()
        .constructor(vec![], |_call| Ok(DictionaryObject::default()))
        .field("Count", PrimitiveKind::Int.handle(), |dict| {
            Value::from(dict.entries.borrow().len())
        })
        .method(
            "Add",
            vec![Param::new(key.clone()), Param::new(value)],
            |dict, call| {
                let key = call.arg(0)?;
                if dict.find(key).is_some() {
                    return Err(HostError::with_code(
                        ErrorCode::InvalidArgumentType,
                        format!("key {} is already present", key.repr()),
                    ));
                }
                dict.entries.borrow_mut().push((key.clone(), call.arg(1)?.clone()));
                Ok(Value::Void)
            },
        )
        .method("ContainsKey", vec![Param::new(key.clone())], |dict, call| {
            Ok(Value::Bool(dict.find(call.arg(0)?).is_some()))
        })
        .method("Remove", vec![Param::new(key)], |dict, call| {
            let found = dict.find(call.arg(0)?);
            if let Some(at) = found {
                dict.entries.borrow_mut().remove(at);
            }
            Ok(Value::Bool(found.is_some()))
        })
        .method("Clear", vec![], |dict, _call| {
            dict.entries.borrow_mut().clear();
            Ok(Value::Void)
        })
        .indexer_rw(
            |dict, key, _call| {
                let at = dict.find(key).ok_or_else(|| {
                    HostError::with_code(
                        ErrorCode::IndexOutOfRange,
                        format!("key {} is not present", key.repr()),
                    )
                })?;
                Ok(dict.entries.borrow()[at].1.clone())
            },
            move |dict, key, value, call| {
                let key = overload::coerce(&key_slot, key.clone(), call.catalog())?;
                let value = overload::coerce(&value_slot, value, call.catalog())?;
                match dict.find(&key) {
                    Some(at) => dict.entries.borrow_mut()[at].1 = value,
                    None => dict.entries.borrow_mut().push((key, value)),
                }
                Ok(())
            },
        )
        .display(|dict| {
            render(
                dict.entries
                    .borrow()
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key.repr(), value.repr())),
                "{",
                "}",
            )
        })
        .build()
}

#[derive(Default)]
pub(crate) struct HashSetObject {
    items: RefCell<Vec<Value>>,
}

impl HashSetObject {
    fn contains(&self, needle: &Value) -> bool {
        self.items.borrow().iter().any(|item| values_equal(item, needle))
    }
}

fn hash_set_class(args: &[TypeHandle]) -> ClassDef {
    let element = args[0].clone();
    ClassBuilder::<HashSetObject>::new("HashSet")
        .namespace(NAMESPACE)
        .anonymous()
        .constructor(vec![], |_call| Ok(HashSetObject::default()))
        .field("Count", PrimitiveKind::Int.handle(), |set| {
            Value::from(set.items.borrow().len())
        })
        .method("Add", vec![Param::new(element.clone())], |set, call| {
            let item = call.arg(0)?;
            if set.contains(item) {
                return Ok(Value::Bool(false));
            }
            set.items.borrow_mut().push(item.clone());
            Ok(Value::Bool(true))
        })
        .method("Remove", vec![Param::new(element.clone())], |set, call| {
            let needle = call.arg(0)?;
            let mut items = set.items.borrow_mut();
            let before = items.len();
            items.retain(|item| !values_equal(item, needle));
            Ok(Value::Bool(items.len() != before))
        })
        .method("Contains", vec![Param::new(element)], |set, call| {
            Ok(Value::Bool(set.contains(call.arg(0)?)))
        })
        .method("Clear", vec![], |set, _call| {
            set.items.borrow_mut().clear();
            Ok(Value::Void)
        })
        .display(|set| render(set.items.borrow().iter().map(Value::repr), "{", "}"))
        .build()
}

pub(crate) fn builtin_generics() -> Vec<GenericDef> {
    vec![
        GenericDef::new("List", 1, list_class).with_namespace(NAMESPACE),
        GenericDef::new("Dictionary", 2, dictionary_class).with_namespace(NAMESPACE),
        GenericDef::new("HashSet", 1, hash_set_class).with_namespace(NAMESPACE),
    ]
}

/// Fixed-length array; the element type comes from the array type handle.
pub(crate) struct ArrayObject {
    items: RefCell<Vec<Value>>,
}

fn element_of(call: &Invocation<'_>) -> Result<TypeHandle, HostError> {
    call.owner()
        .element_type()
        .cloned()
        .ok_or_else(|| HostError::new(format!("{} is not an array type", call.owner().name())))
}

pub(crate) fn array_class() -> ClassDef {
    ClassBuilder::<ArrayObject>::new("Array")
        .namespace("System")
        .anonymous()
        .field("Length", PrimitiveKind::Int.handle(), |array| {
            Value::from(array.items.borrow().len())
        })
        .indexer_rw(
            |array, index, _call| {
                let items = array.items.borrow();
                Ok(items[position(index, items.len())?].clone())
            },
            |array, index, value, call| {
                let element = element_of(call)?;
                let value = overload::coerce(&element, value, call.catalog())?;
                let mut items = array.items.borrow_mut();
                let at = position(index, items.len())?;
                items[at] = value;
                Ok(())
            },
        )
        .display(|array| render(array.items.borrow().iter().map(Value::repr), "[", "]"))
        .build()
}

/// `new T[n]`: an array of `n` default-valued elements of `array_type`'s
/// element type.
pub(crate) fn new_array(array_type: &TypeHandle, length: &Value) -> Result<Value, EvalError> {
    let element = array_type.element_type().ok_or_else(|| {
        EvalError::wrong_type(format!("{} is not an array type", array_type.name()))
    })?;
    let length = match length {
        Value::Numeric(Numeric::Int(length)) => usize::try_from(*length).map_err(|_| {
            EvalError::new(
                ErrorCode::Overflow,
                format!("array length {length} is negative"),
            )
        })?,
        other => {
            return Err(EvalError::wrong_type(format!(
                "array length must be an integer, got {}",
                other.kind_name()
            )))
        }
    };
    if length > MAX_ARRAY_LENGTH {
        return Err(EvalError::new(
            ErrorCode::Overflow,
            format!("array length {length} exceeds the limit of {MAX_ARRAY_LENGTH}"),
        ));
    }
    let mut items = Vec::new();
    items.try_reserve_exact(length).map_err(|_| {
        EvalError::new(
            ErrorCode::Overflow,
            format!("cannot allocate an array of length {length}"),
        )
    })?;
    items.resize(length, element.default_value());
    Ok(Value::object(
        array_type.clone(),
        Rc::new(ArrayObject {
            items: RefCell::new(items),
        }),
    ))
}
