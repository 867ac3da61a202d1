//! Member lookup and host invocation over registered member tables.
//!
//! Every call into host code goes through [`guarded`], which turns returned
//! host errors and panics into evaluation errors.

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::debug;

use crate::catalog::TypeCatalog;
use crate::error::{panic_message, ErrorCode, EvalError, HostError};
use crate::overload;
use crate::types::{
    ClassDef, HostFn, Invocation, MethodDef, PrimitiveKind, ResolvedParam, TypeHandle,
};
use crate::value::{MethodGroup, ObjectRef, Value};

/// Runs host code, converting failures and panics into `UnknownError`
/// (or the code the host chose).
pub(crate) fn guarded<R>(
    what: &str,
    body: impl FnOnce() -> Result<R, HostError>,
) -> Result<R, EvalError> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into()),
        Err(payload) => Err(EvalError::new(
            ErrorCode::UnknownError,
            format!("{what} failed: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn invoke_host(
    what: &str,
    function: &HostFn,
    owner: &TypeHandle,
    target: Option<&Value>,
    args: &[Value],
    type_args: &[TypeHandle],
    catalog: &TypeCatalog,
) -> Result<Value, EvalError> {
    let call = Invocation {
        owner,
        target,
        args,
        type_args,
        catalog,
    };
    guarded(what, || function(&call))?.into_result()
}

pub(crate) fn get_instance_member(
    owner: &TypeHandle,
    class: &ClassDef,
    target: &Value,
    name: &str,
    catalog: &TypeCatalog,
) -> Result<Value, EvalError> {
    if let Some(field) = class.field(name, false) {
        return invoke_host(
            &format!("{}.{}", owner.name(), name),
            &field.getter,
            owner,
            Some(target),
            &[],
            &[],
            catalog,
        );
    }
    let candidates = class.methods_named(name, false);
    if candidates.is_empty() {
        return Err(EvalError::member_not_found(owner, name));
    }
    Ok(Value::MethodGroup(MethodGroup {
        name: name.to_string(),
        owner: owner.clone(),
        candidates,
        target: Some(Box::new(target.clone())),
        type_args: Vec::new(),
    }))
}

pub(crate) fn get_static_member(
    owner: &TypeHandle,
    name: &str,
    catalog: &TypeCatalog,
) -> Result<Value, EvalError> {
    let class = match owner.primitive() {
        Some(PrimitiveKind::String) => catalog.string_class(),
        _ => owner
            .class_def()
            .ok_or_else(|| EvalError::member_not_found(owner, name))?,
    };
    if let Some(field) = class.field(name, true) {
        return invoke_host(
            &format!("{}.{}", owner.name(), name),
            &field.getter,
            owner,
            None,
            &[],
            &[],
            catalog,
        );
    }
    let candidates = class.methods_named(name, true);
    if candidates.is_empty() {
        return Err(EvalError::member_not_found(owner, name));
    }
    Ok(Value::MethodGroup(MethodGroup {
        name: name.to_string(),
        owner: owner.clone(),
        candidates,
        target: None,
        type_args: Vec::new(),
    }))
}

/// Writes a field through its setter after coercing to the declared type.
/// `target` is `None` for static fields.
pub(crate) fn set_field(
    owner: &TypeHandle,
    target: Option<&Value>,
    name: &str,
    value: Value,
    catalog: &TypeCatalog,
) -> Result<(), EvalError> {
    let class = owner
        .class_def()
        .ok_or_else(|| EvalError::member_not_found(owner, name))?;
    let field = class
        .field(name, target.is_none())
        .ok_or_else(|| EvalError::member_not_found(owner, name))?;
    let setter = field
        .setter
        .as_ref()
        .ok_or_else(|| EvalError::read_only(&format!("{}.{}", owner.name(), name)))?;
    let value = overload::coerce(&field.ty, value, catalog)?;
    invoke_host(
        &format!("{}.{} setter", owner.name(), name),
        setter,
        owner,
        target,
        std::slice::from_ref(&value),
        &[],
        catalog,
    )?;
    Ok(())
}

pub(crate) fn index_get(
    object: &ObjectRef,
    index: &Value,
    catalog: &TypeCatalog,
) -> Result<Value, EvalError> {
    let owner = object.type_handle();
    let indexer = owner
        .class_def()
        .and_then(|class| class.indexer.as_ref())
        .ok_or_else(|| EvalError::wrong_type(format!("{} is not indexable", owner.name())))?;
    let target = Value::Object(object.clone());
    invoke_host(
        &format!("{} indexer", owner.name()),
        &indexer.get,
        owner,
        Some(&target),
        std::slice::from_ref(index),
        &[],
        catalog,
    )
}

pub(crate) fn index_set(
    object: &ObjectRef,
    index: &Value,
    value: Value,
    catalog: &TypeCatalog,
) -> Result<(), EvalError> {
    let owner = object.type_handle();
    let setter = owner
        .class_def()
        .and_then(|class| class.indexer.as_ref())
        .and_then(|indexer| indexer.set.as_ref())
        .ok_or_else(|| EvalError::read_only(&format!("{} indexer", owner.name())))?;
    let target = Value::Object(object.clone());
    invoke_host(
        &format!("{} indexer", owner.name()),
        setter,
        owner,
        Some(&target),
        &[index.clone(), value],
        &[],
        catalog,
    )?;
    Ok(())
}

/// Picks an overload for `args` and invokes it.
pub(crate) fn call_overloaded(
    owner: &TypeHandle,
    name: &str,
    candidates: &[Rc<MethodDef>],
    target: Option<&Value>,
    args: &[Value],
    type_args: &[TypeHandle],
    catalog: &TypeCatalog,
) -> Result<Value, EvalError> {
    let label = format!("{}.{name}", owner.name());
    select_and_invoke(&label, owner, name, candidates, target, args, type_args, catalog)
}

/// Free functions registered on the interpreter; messages name only the
/// function.
pub(crate) fn call_function(
    owner: &TypeHandle,
    name: &str,
    candidates: &[Rc<MethodDef>],
    args: &[Value],
    catalog: &TypeCatalog,
) -> Result<Value, EvalError> {
    select_and_invoke(name, owner, name, candidates, None, args, &[], catalog)
}

#[allow(clippy::too_many_arguments)]
fn select_and_invoke(
    label: &str,
    owner: &TypeHandle,
    name: &str,
    candidates: &[Rc<MethodDef>],
    target: Option<&Value>,
    args: &[Value],
    type_args: &[TypeHandle],
    catalog: &TypeCatalog,
) -> Result<Value, EvalError> {
    let shaped: Vec<(&Rc<MethodDef>, Vec<ResolvedParam>)> = candidates
        .iter()
        .filter(|method| method.generic_arity == type_args.len())
        .filter_map(|method| Some((method, method.resolve_params(type_args)?)))
        .collect();
    if shaped.is_empty() {
        return Err(EvalError::new(
            ErrorCode::InvalidArgumentCount,
            format!(
                "no overload of {label} takes {} type arguments",
                type_args.len()
            ),
        ));
    }
    let signatures: Vec<&[ResolvedParam]> =
        shaped.iter().map(|(_, params)| params.as_slice()).collect();
    let Some(chosen) = overload::select_best(&signatures, args, catalog) else {
        return Err(no_overload(label, &signatures, args));
    };
    let (method, params) = &shaped[chosen];
    debug!(
        owner = owner.full_name(),
        method = name,
        overload = chosen,
        "overload selected"
    );
    let prepared = overload::prepare_arguments(params, args, catalog)?;
    invoke_host(
        label,
        &method.invoke,
        owner,
        target,
        &prepared,
        type_args,
        catalog,
    )
}

fn no_overload(
    label: &str,
    signatures: &[&[ResolvedParam]],
    args: &[Value],
) -> EvalError {
    let arity_fits = signatures.iter().any(|params| {
        params.len() >= args.len() && params[args.len()..].iter().all(|p| p.default.is_some())
    });
    let kinds: Vec<&str> = args.iter().map(Value::kind_name).collect();
    if arity_fits {
        EvalError::wrong_type(format!("no overload of {label} accepts ({})", kinds.join(", ")))
    } else {
        EvalError::new(
            ErrorCode::InvalidArgumentCount,
            format!("no overload of {label} takes {} arguments", args.len()),
        )
    }
}

pub(crate) fn construct(
    ty: &TypeHandle,
    args: &[Value],
    catalog: &TypeCatalog,
) -> Result<Value, EvalError> {
    let class = ty.class_def().ok_or_else(|| {
        EvalError::new(ErrorCode::NotCallable, format!("{} cannot be constructed", ty.name()))
    })?;
    if class.constructors.is_empty() {
        return Err(EvalError::new(
            ErrorCode::NotCallable,
            format!("{} has no constructors", ty.name()),
        ));
    }
    call_overloaded(ty, ty.name(), &class.constructors, None, args, &[], catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassBuilder, Param, PrimitiveKind};
    use std::cell::Cell;

    struct Gauge {
        level: Cell<i64>,
    }

    fn gauge_type(catalog: &mut TypeCatalog) -> TypeHandle {
        catalog.register_class(
            ClassBuilder::<Gauge>::new("Gauge")
                .constructor(vec![Param::of(PrimitiveKind::Int).with_default(0i64)], |call| {
                    Ok(Gauge {
                        level: Cell::new(call.int_arg(0)?),
                    })
                })
                .field_rw(
                    "Level",
                    PrimitiveKind::Int.handle(),
                    |g| Value::from(g.level.get()),
                    |g, value| {
                        g.level.set(value.as_numeric().map_or(0, |n| n.to_i64()));
                        Ok(())
                    },
                )
                .method("Explode", vec![], |_g, _call| panic!("gauge exploded"))
                .method("Fail", vec![], |_g, _call| Err(HostError::new("sensor offline")))
                .build(),
        )
    }

    #[test]
    fn constructor_defaults_apply() {
        let mut catalog = TypeCatalog::new();
        let ty = gauge_type(&mut catalog);
        let value = construct(&ty, &[], &catalog).unwrap();
        let Value::Object(object) = value else {
            panic!("expected object");
        };
        assert_eq!(object.downcast_ref::<Gauge>().unwrap().level.get(), 0);
    }

    #[test]
    fn panics_in_host_methods_become_unknown_errors() {
        let mut catalog = TypeCatalog::new();
        let ty = gauge_type(&mut catalog);
        let gauge = construct(&ty, &[Value::from(3i64)], &catalog).unwrap();
        let Value::Object(object) = &gauge else {
            panic!("expected object");
        };
        let class = ty.class_def().unwrap();
        let method = get_instance_member(&ty, class, &gauge, "Explode", &catalog).unwrap();
        let Value::MethodGroup(group) = method else {
            panic!("expected method group");
        };
        let err = crate::value::Callable::call(&group, &[], &catalog).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownError);
        assert!(err.message.contains("gauge exploded"));

        let failing = get_instance_member(&ty, class, &gauge, "Fail", &catalog).unwrap();
        let Value::MethodGroup(group) = failing else {
            panic!("expected method group");
        };
        let err = crate::value::Callable::call(&group, &[], &catalog).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownError);
        assert_eq!(err.message, "sensor offline");
        assert_eq!(object.downcast_ref::<Gauge>().unwrap().level.get(), 3);
    }

    #[test]
    fn setters_coerce_and_reject_wrong_types() {
        let mut catalog = TypeCatalog::new();
        let ty = gauge_type(&mut catalog);
        let gauge = construct(&ty, &[], &catalog).unwrap();
        set_field(&ty, Some(&gauge), "Level", Value::from(12i64), &catalog).unwrap();
        let err = set_field(&ty, Some(&gauge), "Level", Value::from("x"), &catalog).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgumentType);
        let class = ty.class_def().unwrap();
        let level = get_instance_member(&ty, class, &gauge, "Level", &catalog).unwrap();
        assert_eq!(level.format(), "12");
    }

    #[test]
    fn wrong_arity_is_reported_as_count_error() {
        let mut catalog = TypeCatalog::new();
        let ty = gauge_type(&mut catalog);
        let err = construct(&ty, &[Value::from(1i64), Value::from(2i64)], &catalog).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgumentCount);
        let err = construct(&ty, &[Value::from("one")], &catalog).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgumentType);
    }
}
