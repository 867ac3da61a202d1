//! Recursive string-scanning evaluator.
//!
//! An expression is evaluated by re-scanning substrings: outer parentheses
//! are stripped, literals are tried, then the text is split at the loosest
//! top-level binary operator. What is left is a unary operator, a `new`
//! expression or a reference chain such as `Game.World.Actors[0].Name`.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::catalog::TypeCatalog;
use crate::collections;
use crate::dispatch;
use crate::error::{ErrorCode, EvalError};
use crate::interpreter::PresetGetter;
use crate::ops::{self, BinaryOp};
use crate::resolver::TypeResolver;
use crate::scan;
use crate::types::{MethodDef, TypeHandle};
use crate::value::{HostFunction, Value};

/// One `.`-separated piece of a reference chain.
struct Segment<'s> {
    text: &'s str,
    base: Base<'s>,
    generic: Option<&'s str>,
    suffixes: Vec<Suffix<'s>>,
}

enum Base<'s> {
    Name(&'s str),
    Group(&'s str),
    Literal(&'s str),
    /// Suffixes applied straight to the previous value, as in `new T[2][0]`.
    Empty,
}

enum Suffix<'s> {
    Call(&'s str),
    Index(&'s str),
}

impl<'s> Segment<'s> {
    fn parse(raw: &'s str) -> Result<Self, EvalError> {
        let text = raw.trim();
        let bytes = text.as_bytes();
        let Some(&first) = bytes.first() else {
            return Err(EvalError::parse("empty member name"));
        };
        let (base, mut at) = match first {
            b'(' => {
                let close = scan::find_matching(text, 0)
                    .ok_or_else(|| EvalError::parse(format!("missing ')' in '{text}'")))?;
                (Base::Group(&text[1..close]), close + 1)
            }
            b'"' => {
                let end = scan::string_end(bytes, 0)
                    .ok_or_else(|| EvalError::parse(format!("unterminated string in '{text}'")))?;
                (Base::Literal(&text[..=end]), end + 1)
            }
            b'[' => (Base::Empty, 0),
            digit if digit.is_ascii_digit() => {
                let end = bytes
                    .iter()
                    .take_while(|b| scan::is_ident_byte(**b) || **b == b'.')
                    .count();
                (Base::Literal(&text[..end]), end)
            }
            _ => {
                let start = usize::from(first == b'#');
                let end = start
                    + bytes[start..]
                        .iter()
                        .take_while(|b| scan::is_ident_byte(**b))
                        .count();
                if end == start {
                    return Err(unexpected(text, 0));
                }
                match &text[..end] {
                    keyword @ ("true" | "false" | "null") => (Base::Literal(keyword), end),
                    name => (Base::Name(name), end),
                }
            }
        };
        let mut generic = None;
        if matches!(base, Base::Name(_)) && bytes.get(at) == Some(&b'<') {
            let close = scan::generic_close(text, at).ok_or_else(|| unexpected(text, at))?;
            generic = Some(&text[at + 1..close]);
            at = close + 1;
        }
        let mut suffixes = Vec::new();
        while at < bytes.len() {
            match bytes[at] {
                byte if byte.is_ascii_whitespace() => at += 1,
                opener @ (b'(' | b'[') => {
                    let close = scan::find_matching(text, at).ok_or_else(|| {
                        EvalError::parse(format!("unbalanced '{}' in '{text}'", opener as char))
                    })?;
                    let inner = &text[at + 1..close];
                    suffixes.push(if opener == b'(' {
                        Suffix::Call(inner)
                    } else {
                        Suffix::Index(inner)
                    });
                    at = close + 1;
                }
                _ => return Err(unexpected(text, at)),
            }
        }
        Ok(Self {
            text,
            base,
            generic,
            suffixes,
        })
    }

    fn is_plain_name(&self) -> bool {
        matches!(self.base, Base::Name(name) if !name.starts_with('#'))
    }
}

fn unexpected(text: &str, at: usize) -> EvalError {
    let found = text[at..].chars().next().unwrap_or(' ');
    EvalError::parse(format!("unexpected '{found}' in '{text}'"))
}

fn null_reference(what: &str) -> EvalError {
    EvalError::new(ErrorCode::NullReference, format!("{what} on null"))
}

/// Deepest chain of nested sub-expressions (operands, groups, arguments,
/// indices) one evaluation may open.
pub(crate) const MAX_NESTING: usize = 128;

/// Read-only view of an interpreter's tables for the duration of one
/// evaluation.
pub(crate) struct Evaluator<'a> {
    pub(crate) catalog: &'a TypeCatalog,
    pub(crate) resolver: &'a TypeResolver,
    pub(crate) variables: &'a HashMap<String, Value>,
    pub(crate) presets: &'a HashMap<String, PresetGetter>,
    pub(crate) functions: &'a HashMap<String, HostFunction>,
    pub(crate) depth: Cell<usize>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn evaluate(&self, src: &str) -> Result<Value, EvalError> {
        let depth = self.depth.get();
        if depth >= MAX_NESTING {
            return Err(EvalError::parse(format!(
                "expression nests deeper than {MAX_NESTING} levels"
            )));
        }
        self.depth.set(depth + 1);
        let result = self.evaluate_nested(src);
        self.depth.set(depth);
        result
    }

    fn evaluate_nested(&self, src: &str) -> Result<Value, EvalError> {
        let text = scan::strip_outer_parens(src);
        if text.is_empty() {
            return Err(EvalError::parse("empty expression"));
        }
        if let Some(literal) = scan::parse_literal(text) {
            return literal;
        }
        let mask = scan::top_level_mask(text)?;
        if let Some((at, op)) = ops::find_split(text, &mask) {
            return self.binary(op, &text[..at], &text[at + op.symbol().len()..]);
        }
        if let Some(operand) = text.strip_prefix('!') {
            return ops::not(self.evaluate(operand)?);
        }
        if let Some(operand) = text.strip_prefix('-') {
            return ops::negate(self.evaluate(operand)?);
        }
        if let Some(rest) = text
            .strip_prefix("new")
            .filter(|rest| rest.starts_with(|c: char| c.is_whitespace()))
        {
            return self.construct(rest.trim());
        }
        self.reference(text)
    }

    fn binary(&self, op: BinaryOp, left: &str, right: &str) -> Result<Value, EvalError> {
        let left = self.evaluate(left)?;
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let Value::Bool(flag) = left else {
                return Err(ops::logic_operand(op, &left, &Value::Void));
            };
            if flag == (op == BinaryOp::Or) {
                return Ok(Value::Bool(flag));
            }
        }
        ops::binary(op, left, self.evaluate(right)?)
    }

    /// `new T(args)`, `new T`, `new T[n]`, optionally followed by a chain.
    fn construct(&self, rest: &str) -> Result<Value, EvalError> {
        let mask = scan::top_level_mask(rest)?;
        let opener = rest
            .bytes()
            .enumerate()
            .find(|(at, byte)| mask[*at] && matches!(byte, b'(' | b'['));
        let Some((open, opener)) = opener else {
            let ty = self.require_type(rest)?;
            return dispatch::construct(&ty, &[], self.catalog);
        };
        let close = scan::find_matching(rest, open)
            .ok_or_else(|| EvalError::parse(format!("unbalanced '{}' in '{rest}'", opener as char)))?;
        let type_name = rest[..open].trim();
        let inner = &rest[open + 1..close];
        let created = if opener == b'(' {
            let ty = self.require_type(type_name)?;
            let args = self.arguments(inner)?;
            dispatch::construct(&ty, &args, self.catalog)?
        } else {
            if inner.trim().is_empty() {
                return Err(EvalError::parse(format!("array length missing in 'new {rest}'")));
            }
            let array_type = self.require_type(&format!("{type_name}[]"))?;
            let length = self.evaluate(inner)?;
            collections::new_array(&array_type, &length)?
        };
        self.continue_chain(created, &rest[close + 1..])
    }

    fn continue_chain(&self, value: Value, tail: &str) -> Result<Value, EvalError> {
        let tail = tail.trim();
        if tail.is_empty() {
            return Ok(value);
        }
        let chain = match tail.strip_prefix('.') {
            Some(members) => members,
            None if tail.starts_with('[') => tail,
            None => return Err(unexpected(tail, 0)),
        };
        let mut value = value;
        for piece in scan::split_chain(chain)? {
            value = self.apply_segment(value, &Segment::parse(piece)?)?;
        }
        Ok(value)
    }

    fn reference(&self, text: &str) -> Result<Value, EvalError> {
        let segments = scan::split_chain(text)?
            .into_iter()
            .map(Segment::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let (mut value, consumed) = self.head(&segments)?;
        for segment in &segments[consumed..] {
            value = self.apply_segment(value, segment)?;
        }
        value.into_result()
    }

    /// Resolves the start of a chain and reports how many segments it used.
    fn head(&self, segments: &[Segment<'_>]) -> Result<(Value, usize), EvalError> {
        let first = &segments[0];
        let name = match first.base {
            Base::Group(inner) => {
                let value = self.evaluate(inner)?;
                return Ok((self.apply_suffixes(value, &first.suffixes)?, 1));
            }
            Base::Literal(text) => {
                let value = scan::parse_literal(text)
                    .unwrap_or_else(|| Err(EvalError::parse(format!("invalid literal '{text}'"))))?;
                return Ok((self.apply_suffixes(value, &first.suffixes)?, 1));
            }
            Base::Empty => return Err(unexpected(first.text, 0)),
            Base::Name(name) => name,
        };

        // `Type(args)` constructs before a callable of the same name is tried.
        if first.is_plain_name() && matches!(first.suffixes.first(), Some(Suffix::Call(_))) {
            if let Some(ty) = self.resolver.resolve(&type_text(&segments[..1]), self.catalog) {
                return Ok((self.apply_suffixes(Value::Type(ty), &first.suffixes)?, 1));
            }
        }
        if first.generic.is_none() {
            if let Some(value) = self.lookup(name)? {
                return Ok((self.apply_suffixes(value, &first.suffixes)?, 1));
            }
        }
        if name.starts_with('#') {
            return Err(EvalError::member_not_found("presets", name));
        }
        for count in (1..=segments.len()).rev() {
            let prefix = &segments[..count];
            let qualifies = prefix.iter().all(Segment::is_plain_name)
                && prefix[..count - 1]
                    .iter()
                    .all(|segment| segment.generic.is_none() && segment.suffixes.is_empty());
            if !qualifies {
                continue;
            }
            if let Some(ty) = self.resolver.resolve(&type_text(prefix), self.catalog) {
                let value = self.apply_suffixes(Value::Type(ty), &prefix[count - 1].suffixes)?;
                return Ok((value, count));
            }
        }
        Err(EvalError::new(
            ErrorCode::MemberNotFound,
            format!("'{name}' is not a variable, function or type"),
        ))
    }

    /// Variables, then presets, then registered functions.
    fn lookup(&self, name: &str) -> Result<Option<Value>, EvalError> {
        if let Some(value) = self.variables.get(name) {
            return Ok(Some(value.clone()));
        }
        if let Some(getter) = self.presets.get(name) {
            let value = dispatch::guarded(name, || getter())?;
            return value.into_result().map(Some);
        }
        Ok(self.functions.get(name).cloned().map(Value::Function))
    }

    fn apply_segment(&self, value: Value, segment: &Segment<'_>) -> Result<Value, EvalError> {
        let name = match segment.base {
            Base::Empty => return self.apply_suffixes(value, &segment.suffixes),
            Base::Name(name) => name,
            Base::Group(_) | Base::Literal(_) => return Err(unexpected(segment.text, 0)),
        };
        let mut member = self.member(&value, name)?;
        if let Some(generic) = segment.generic {
            let type_args = self.type_arguments(generic)?;
            member = match member {
                Value::MethodGroup(group) => Value::MethodGroup(group.with_type_args(type_args)),
                other => {
                    return Err(EvalError::new(
                        ErrorCode::NotCallable,
                        format!("'{name}' is a {}, not a generic method", other.kind_name()),
                    ))
                }
            };
        }
        self.apply_suffixes(member, &segment.suffixes)
    }

    fn member(&self, value: &Value, name: &str) -> Result<Value, EvalError> {
        if value.is_null() {
            return Err(null_reference(&format!("reading '{name}'")));
        }
        let found = match value.as_member_accessible() {
            Some(accessible) => accessible.get_member(name, self.catalog),
            None => Err(EvalError::member_not_found(value.kind_name(), name)),
        };
        match found {
            Err(err) if err.code == ErrorCode::MemberNotFound && name == "ToString" => {
                Ok(to_string_function(value))
            }
            other => other,
        }
    }

    fn apply_suffixes(&self, value: Value, suffixes: &[Suffix<'_>]) -> Result<Value, EvalError> {
        let mut value = value;
        for suffix in suffixes {
            value = match suffix {
                Suffix::Call(args) => self.call(value, args)?,
                Suffix::Index(index) => self.index(value, index)?,
            };
        }
        Ok(value)
    }

    fn call(&self, callee: Value, args: &str) -> Result<Value, EvalError> {
        if callee.is_null() {
            return Err(null_reference("call"));
        }
        let args = self.arguments(args)?;
        let callable = callee.as_callable().ok_or_else(|| {
            EvalError::new(
                ErrorCode::NotCallable,
                format!("{} is not callable", callee.kind_name()),
            )
        })?;
        callable.call(&args, self.catalog)
    }

    fn index(&self, container: Value, index: &str) -> Result<Value, EvalError> {
        if container.is_null() {
            return Err(null_reference("indexing"));
        }
        let index = self.evaluate(index)?;
        let indexable = container.as_indexable().ok_or_else(|| {
            EvalError::wrong_type(format!("{} is not indexable", container.kind_name()))
        })?;
        indexable.get_at(&index, self.catalog)
    }

    pub(crate) fn arguments(&self, text: &str) -> Result<Vec<Value>, EvalError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        scan::split_top_level(text, b',')?
            .into_iter()
            .map(|arg| self.evaluate(arg))
            .collect()
    }

    fn type_arguments(&self, text: &str) -> Result<Vec<TypeHandle>, EvalError> {
        scan::split_top_level(text, b',')?
            .into_iter()
            .map(|arg| self.require_type(arg.trim()))
            .collect()
    }

    pub(crate) fn require_type(&self, name: &str) -> Result<TypeHandle, EvalError> {
        self.resolver
            .resolve(name, self.catalog)
            .ok_or_else(|| EvalError::new(ErrorCode::TypeNotFound, format!("unknown type '{name}'")))
    }

    /// Evaluates the left-hand side of an assignment and writes `value`
    /// through it. Variable targets are handled by the interpreter.
    pub(crate) fn assign_member(&self, target: &str, value: Value) -> Result<(), EvalError> {
        if target.ends_with(']') {
            let open = scan::find_opening(target, target.len() - 1)
                .ok_or_else(|| EvalError::parse(format!("unbalanced ']' in '{target}'")))?;
            let container = self.evaluate(&target[..open])?;
            if container.is_null() {
                return Err(null_reference("indexing"));
            }
            let index = self.evaluate(&target[open + 1..target.len() - 1])?;
            let indexable = container.as_indexable().ok_or_else(|| {
                EvalError::wrong_type(format!("{} is not indexable", container.kind_name()))
            })?;
            return indexable.set_at(&index, value, self.catalog);
        }
        let pieces = scan::split_chain(target)?;
        let Some((member, receiver)) = pieces.split_last().filter(|(_, rest)| !rest.is_empty()) else {
            return Err(EvalError::parse(format!("cannot assign to '{target}'")));
        };
        let member = member.trim();
        if !scan::is_identifier(member) {
            return Err(EvalError::parse(format!("cannot assign to '{target}'")));
        }
        let receiver_text = &target[..receiver.iter().map(|p| p.len() + 1).sum::<usize>() - 1];
        let receiver = self.evaluate(receiver_text)?;
        if receiver.is_null() {
            return Err(null_reference(&format!("writing '{member}'")));
        }
        let accessible = receiver
            .as_member_accessible()
            .ok_or_else(|| EvalError::member_not_found(receiver.kind_name(), member))?;
        accessible.set_member(member, value, self.catalog)
    }
}

/// Dotted name of a run of plain segments, with the last one's generic
/// arguments.
fn type_text(segments: &[Segment<'_>]) -> String {
    let mut text = segments
        .iter()
        .filter_map(|segment| match segment.base {
            Base::Name(name) => Some(name),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".");
    if let Some(generic) = segments.last().and_then(|segment| segment.generic) {
        text.push('<');
        text.push_str(generic);
        text.push('>');
    }
    text
}

/// Universal `ToString()` for values whose type declares none.
fn to_string_function(value: &Value) -> Value {
    let text = value.format();
    let mut function = HostFunction::new("ToString");
    function.overloads.push(Rc::new(MethodDef::new(
        "ToString",
        Vec::new(),
        move |_call| Ok(Value::Str(text.clone())),
    )));
    Value::Function(function)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_evaluator<R>(f: impl FnOnce(&Evaluator<'_>) -> R) -> R {
        let catalog = TypeCatalog::new();
        let resolver = TypeResolver::new();
        let mut variables = HashMap::new();
        variables.insert("x".to_string(), Value::from(5i64));
        variables.insert("name".to_string(), Value::from("probe"));
        let presets = HashMap::new();
        let functions = HashMap::new();
        let evaluator = Evaluator {
            catalog: &catalog,
            resolver: &resolver,
            variables: &variables,
            presets: &presets,
            functions: &functions,
            depth: Cell::new(0),
        };
        f(&evaluator)
    }

    fn eval(text: &str) -> Result<Value, EvalError> {
        with_evaluator(|evaluator| evaluator.evaluate(text))
    }

    #[test]
    fn segments_capture_generics_and_suffixes() {
        let segment = Segment::parse("Make<int, string>(1)[0]").unwrap();
        assert!(matches!(segment.base, Base::Name("Make")));
        assert_eq!(segment.generic, Some("int, string"));
        assert_eq!(segment.suffixes.len(), 2);
        assert!(Segment::parse("a b").is_err());
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        assert_eq!(eval("-x + 10").unwrap().format(), "5");
        assert_eq!(eval("!true == false").unwrap().format(), "true");
        assert_eq!(eval("-(2 * 3)").unwrap().format(), "-6");
    }

    #[test]
    fn logic_short_circuits() {
        assert_eq!(eval("false && missing").unwrap().format(), "false");
        assert_eq!(eval("true || 1 / 0").unwrap().format(), "true");
        assert_eq!(eval("1 && true").unwrap_err().code, ErrorCode::InvalidArgumentType);
    }

    #[test]
    fn string_members_and_to_string() {
        assert_eq!(eval("name.Length").unwrap().format(), "5");
        assert_eq!(eval("name.ToUpper().Substring(1, 2)").unwrap().format(), "RO");
        assert_eq!(eval("x.ToString() + \"!\"").unwrap().format(), "5!");
        assert_eq!(eval("\"abc\"[1]").unwrap().format(), "b");
        assert_eq!(eval("string.IsNullOrEmpty(\"\")").unwrap().format(), "true");
    }

    #[test]
    fn unknown_names_and_null_receivers() {
        assert_eq!(eval("nothing").unwrap_err().code, ErrorCode::MemberNotFound);
        assert_eq!(eval("null.Length").unwrap_err().code, ErrorCode::NullReference);
        assert_eq!(eval("x(1)").unwrap_err().code, ErrorCode::NotCallable);
        assert_eq!(eval("new Missing()").unwrap_err().code, ErrorCode::TypeNotFound);
        assert_eq!(eval("#nope").unwrap_err().code, ErrorCode::MemberNotFound);
    }

    #[test]
    fn arrays_and_generic_collections() {
        assert_eq!(eval("new int[3].Length").unwrap().format(), "3");
        assert_eq!(eval("new double[2][1]").unwrap().format(), "0");
        assert_eq!(eval("new List<int>().Count").unwrap().format(), "0");
        assert_eq!(eval("List<string>().Count").unwrap().format(), "0");
    }

    #[test]
    fn runaway_nesting_is_a_parse_error() {
        let bangs = format!("{}true", "!".repeat(65_000));
        assert_eq!(eval(&bangs).unwrap_err().code, ErrorCode::ParseError);
        let groups = format!("{}1{}", "x + (".repeat(5_000), ")".repeat(5_000));
        assert_eq!(eval(&groups).unwrap_err().code, ErrorCode::ParseError);
        let calls = format!("{}\"a\"{}", "name.Contains(".repeat(2_000), ")".repeat(2_000));
        assert_eq!(eval(&calls).unwrap_err().code, ErrorCode::ParseError);
        assert_eq!(eval(&"-".repeat(100)).unwrap_err().code, ErrorCode::ParseError);
    }

    #[test]
    fn moderate_nesting_still_evaluates() {
        let even = format!("{}true", "!".repeat(60));
        assert_eq!(eval(&even).unwrap().format(), "true");
        let sum = vec!["1"; 100].join(" + ");
        assert_eq!(eval(&sum).unwrap().format(), "100");
    }
}
