//! Overload selection by penalty score.
//!
//! Each candidate starts at zero, loses one point per default parameter it
//! needs and loses each argument's match score. The highest total wins and
//! ties keep the earliest candidate. Integer arguments are only checked for
//! range against integer parameters; width is otherwise not preferred.

use crate::catalog::TypeCatalog;
use crate::error::{ErrorCode, EvalError};
use crate::types::{ResolvedParam, TypeInfo};
use crate::value::{Numeric, Value};

/// Penalty for passing an integer where a floating-point parameter is declared.
pub const INT_TO_FLOAT_PENALTY: i64 = 1000;
/// Penalty for a subtype/interface match instead of an exact one.
pub const ASSIGNABLE_PENALTY: i64 = 500;
/// Penalty per parameter filled from its default value.
pub const DEFAULT_PARAM_PENALTY: i64 = 1;

/// Score of one argument against one parameter type; `None` rejects the
/// candidate.
pub fn match_score(param: &TypeInfo, arg: &Value, catalog: &TypeCatalog) -> Option<i64> {
    match (param.primitive().filter(|kind| kind.is_numeric()), arg) {
        (Some(kind), Value::Numeric(Numeric::Int(value))) => {
            if kind.is_float() {
                return Some(INT_TO_FLOAT_PENALTY);
            }
            let (min, max) = kind.integer_range()?;
            let value = i128::from(*value);
            (min..=max).contains(&value).then_some(0)
        }
        (Some(kind), Value::Numeric(Numeric::Float(_))) => kind.is_float().then_some(0),
        (Some(_), _) | (None, Value::Numeric(_)) => None,
        (None, Value::Null) => (!param.is_value_type()).then_some(0),
        (None, other) => {
            let actual = other.runtime_type(catalog)?;
            if param.same_as(&actual) {
                Some(0)
            } else if param.is_assignable_from(&actual) {
                Some(ASSIGNABLE_PENALTY)
            } else {
                None
            }
        }
    }
}

/// Total score of a candidate, or `None` when it cannot accept the arguments.
pub fn candidate_score(params: &[ResolvedParam], args: &[Value], catalog: &TypeCatalog) -> Option<i64> {
    if params.len() < args.len() {
        return None;
    }
    let mut total = 0i64;
    for param in &params[args.len()..] {
        param.default.as_ref()?;
        total -= DEFAULT_PARAM_PENALTY;
    }
    for (param, arg) in params.iter().zip(args) {
        total -= match_score(&param.ty, arg, catalog)?;
    }
    Some(total)
}

/// Index of the best candidate; ties resolve to the first in input order.
pub fn select_best<P>(candidates: &[P], args: &[Value], catalog: &TypeCatalog) -> Option<usize>
where
    P: AsRef<[ResolvedParam]>,
{
    let mut best: Option<(usize, i64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let Some(score) = candidate_score(candidate.as_ref(), args, catalog) else {
            continue;
        };
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}

/// Converts `value` to what a slot of type `ty` stores, or explains why it
/// cannot be stored there.
pub fn coerce(ty: &TypeInfo, value: Value, catalog: &TypeCatalog) -> Result<Value, EvalError> {
    if match_score(ty, &value, catalog).is_none() {
        return Err(EvalError::wrong_type(format!(
            "cannot convert {} to {}",
            value.kind_name(),
            ty.name()
        )));
    }
    Ok(match value {
        Value::Numeric(Numeric::Int(int)) if ty.primitive().is_some_and(|kind| kind.is_float()) => {
            Value::Numeric(Numeric::Float(int as f64))
        }
        other => other,
    })
}

/// Coerces supplied arguments and appends defaults for the rest.
pub fn prepare_arguments(
    params: &[ResolvedParam],
    args: &[Value],
    catalog: &TypeCatalog,
) -> Result<Vec<Value>, EvalError> {
    let mut prepared = Vec::with_capacity(params.len());
    for (index, param) in params.iter().enumerate() {
        let value = match args.get(index) {
            Some(arg) => coerce(&param.ty, arg.clone(), catalog)?,
            None => param.default.clone().ok_or_else(|| {
                EvalError::new(
                    ErrorCode::InvalidArgumentCount,
                    format!("missing argument {index}"),
                )
            })?,
        };
        prepared.push(value);
    }
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PrimitiveKind, TypeHandle};

    fn param(kind: PrimitiveKind) -> ResolvedParam {
        ResolvedParam {
            ty: kind.handle(),
            default: None,
        }
    }

    fn defaulted(kind: PrimitiveKind, value: impl Into<Value>) -> ResolvedParam {
        ResolvedParam {
            ty: kind.handle(),
            default: Some(value.into()),
        }
    }

    fn ty(kind: PrimitiveKind) -> TypeHandle {
        kind.handle()
    }

    #[test]
    fn integer_into_float_is_legal_but_discouraged() {
        let catalog = TypeCatalog::new();
        assert_eq!(
            match_score(&ty(PrimitiveKind::Double), &Value::from(3i64), &catalog),
            Some(INT_TO_FLOAT_PENALTY)
        );
        assert_eq!(
            match_score(&ty(PrimitiveKind::Int), &Value::from(3i64), &catalog),
            Some(0)
        );
    }

    #[test]
    fn narrow_integer_parameters_reject_overflow() {
        let catalog = TypeCatalog::new();
        assert_eq!(match_score(&ty(PrimitiveKind::Byte), &Value::from(255i64), &catalog), Some(0));
        assert_eq!(match_score(&ty(PrimitiveKind::Byte), &Value::from(256i64), &catalog), None);
        assert_eq!(match_score(&ty(PrimitiveKind::Byte), &Value::from(-1i64), &catalog), None);
        assert_eq!(
            match_score(&ty(PrimitiveKind::Int), &Value::from(i64::from(i32::MAX) + 1), &catalog),
            None
        );
    }

    #[test]
    fn float_never_fits_integer_parameter() {
        let catalog = TypeCatalog::new();
        assert_eq!(match_score(&ty(PrimitiveKind::Int), &Value::from(1.0f64), &catalog), None);
        assert_eq!(match_score(&ty(PrimitiveKind::Float), &Value::from(1.5f64), &catalog), Some(0));
    }

    #[test]
    fn numeric_and_non_numeric_never_mix() {
        let catalog = TypeCatalog::new();
        assert_eq!(match_score(&ty(PrimitiveKind::Int), &Value::from("1"), &catalog), None);
        assert_eq!(match_score(&ty(PrimitiveKind::String), &Value::from(1i64), &catalog), None);
        assert_eq!(match_score(&ty(PrimitiveKind::Object), &Value::from(1i64), &catalog), None);
    }

    #[test]
    fn null_only_fits_reference_types() {
        let catalog = TypeCatalog::new();
        assert_eq!(match_score(&ty(PrimitiveKind::String), &Value::Null, &catalog), Some(0));
        assert_eq!(match_score(&ty(PrimitiveKind::Bool), &Value::Null, &catalog), None);
    }

    #[test]
    fn exact_beats_assignable() {
        let catalog = TypeCatalog::new();
        let candidates = vec![
            vec![param(PrimitiveKind::Object)],
            vec![param(PrimitiveKind::String)],
        ];
        assert_eq!(select_best(&candidates, &[Value::from("x")], &catalog), Some(1));
    }

    #[test]
    fn exact_arity_beats_default_filled() {
        let catalog = TypeCatalog::new();
        let candidates = vec![
            vec![param(PrimitiveKind::Int), defaulted(PrimitiveKind::Int, 5i64)],
            vec![param(PrimitiveKind::Int)],
        ];
        assert_eq!(select_best(&candidates, &[Value::from(1i64)], &catalog), Some(1));
    }

    #[test]
    fn ties_keep_input_order() {
        let catalog = TypeCatalog::new();
        let candidates = vec![vec![param(PrimitiveKind::Short)], vec![param(PrimitiveKind::Long)]];
        assert_eq!(select_best(&candidates, &[Value::from(7i64)], &catalog), Some(0));
        let reversed = vec![vec![param(PrimitiveKind::Long)], vec![param(PrimitiveKind::Short)]];
        assert_eq!(select_best(&reversed, &[Value::from(7i64)], &catalog), Some(0));
    }

    #[test]
    fn missing_defaults_reject_candidate() {
        let catalog = TypeCatalog::new();
        let candidates = vec![vec![param(PrimitiveKind::Int), param(PrimitiveKind::Int)]];
        assert_eq!(select_best(&candidates, &[Value::from(1i64)], &catalog), None);
    }

    #[test]
    fn integer_prefers_integer_parameter_over_float() {
        let catalog = TypeCatalog::new();
        let candidates = vec![vec![param(PrimitiveKind::Double)], vec![param(PrimitiveKind::Int)]];
        assert_eq!(select_best(&candidates, &[Value::from(2i64)], &catalog), Some(1));
    }

    #[test]
    fn prepare_fills_defaults_and_widens_integers() {
        let catalog = TypeCatalog::new();
        let params = vec![param(PrimitiveKind::Double), defaulted(PrimitiveKind::String, "x")];
        let prepared = prepare_arguments(&params, &[Value::from(2i64)], &catalog).unwrap();
        assert_eq!(prepared[0].as_numeric(), Some(Numeric::Float(2.0)));
        assert_eq!(prepared[1].format(), "x");
    }
}
