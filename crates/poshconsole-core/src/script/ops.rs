use std::cmp::Ordering;

use poshconsole_types::{
    ErrorCategory, ErrorCategoryKind, ErrorRecord, PsPrimitiveValue, PsValue,
};

use super::ast::{BinaryOp, UnaryOp};

pub(crate) fn runtime_error(
    message: impl Into<String>,
    error_id: &str,
    kind: ErrorCategoryKind,
) -> ErrorRecord {
    ErrorRecord::builder()
        .message(message)
        .fully_qualified_error_id(error_id)
        .category(
            ErrorCategory::builder()
                .kind(kind)
                .reason("RuntimeException")
                .build(),
        )
        .build()
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &PsValue) -> Option<Self> {
        match value {
            PsValue::Primitive(p) => match p {
                PsPrimitiveValue::I32(v) => Some(Self::Int(i64::from(*v))),
                PsPrimitiveValue::I64(v) => Some(Self::Int(*v)),
                PsPrimitiveValue::Double(v) => Some(Self::Float(*v)),
                PsPrimitiveValue::Bool(b) => Some(Self::Int(i64::from(*b))),
                PsPrimitiveValue::Nil => Some(Self::Int(0)),
                PsPrimitiveValue::Str(s) => {
                    let s = s.trim();
                    if s.is_empty() {
                        Some(Self::Int(0))
                    } else {
                        s.parse::<i64>()
                            .map(Self::Int)
                            .ok()
                            .or_else(|| s.parse::<f64>().ok().map(Self::Float))
                    }
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    fn into_value(self) -> PsValue {
        match self {
            Self::Int(v) => i32::try_from(v).map_or_else(|_| PsValue::from(v), PsValue::from),
            Self::Float(v) => PsValue::from(v),
        }
    }
}

fn cannot_convert(value: &PsValue) -> ErrorRecord {
    runtime_error(
        format!(
            "Cannot convert value \"{value}\" to type \"System.Int32\". Error: \"Input string was not in a correct format.\""
        ),
        "InvalidArgument",
        ErrorCategoryKind::InvalidArgument,
    )
}

fn no_operator(value: &PsValue, op: &str) -> ErrorRecord {
    runtime_error(
        format!(
            "Method invocation failed because [{}] does not contain a method named '{op}'.",
            value.type_name()
        ),
        "MethodNotFound",
        ErrorCategoryKind::InvalidOperation,
    )
}

fn arithmetic(op: BinaryOp, left: &PsValue, right: &PsValue) -> Result<PsValue, ErrorRecord> {
    let l = Number::of(left).ok_or_else(|| no_operator(left, op_method(op)))?;
    let r = Number::of(right).ok_or_else(|| cannot_convert(right))?;

    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && r.as_f64() == 0.0 {
        return Err(runtime_error(
            "Attempted to divide by zero.",
            "RuntimeException",
            ErrorCategoryKind::NotSpecified,
        ));
    }

    let result = match (l, r) {
        (Number::Int(a), Number::Int(b)) => {
            let exact = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div if a.checked_rem(b) == Some(0) => a.checked_div(b),
                BinaryOp::Div => None,
                BinaryOp::Rem => a.checked_rem(b),
                _ => None,
            };
            match exact {
                Some(v) => Number::Int(v),
                None => Number::Float(float_op(op, a as f64, b as f64)),
            }
        }
        (a, b) => Number::Float(float_op(op, a.as_f64(), b.as_f64())),
    };
    Ok(result.into_value())
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => f64::NAN,
    }
}

fn op_method(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "op_Addition",
        BinaryOp::Sub => "op_Subtraction",
        BinaryOp::Mul => "op_Multiply",
        BinaryOp::Div => "op_Division",
        _ => "op_Modulus",
    }
}

/// Evaluates a non-short-circuit binary operator.
pub(crate) fn binary(op: BinaryOp, left: PsValue, right: PsValue) -> Result<PsValue, ErrorRecord> {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Mul => multiply(left, right),
        BinaryOp::Sub | BinaryOp::Div | BinaryOp::Rem => arithmetic(op, &left, &right),
        BinaryOp::And => Ok(PsValue::from(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(PsValue::from(left.is_truthy() || right.is_truthy())),
        BinaryOp::Contains => Ok(PsValue::from(contains(&left, &right))),
        BinaryOp::NotContains => Ok(PsValue::from(!contains(&left, &right))),
        _ => compare_op(op, left, &right),
    }
}

fn add(left: PsValue, right: PsValue) -> Result<PsValue, ErrorRecord> {
    match left {
        PsValue::List(mut items) => {
            items.extend(right.into_items());
            Ok(PsValue::List(items))
        }
        PsValue::Primitive(PsPrimitiveValue::Str(mut s)) => {
            s.push_str(&right.to_string());
            Ok(PsValue::from(s))
        }
        PsValue::Primitive(PsPrimitiveValue::Nil) => Ok(right),
        left => arithmetic(BinaryOp::Add, &left, &right),
    }
}

/// Upper bound on the length of a repeated string or array.
const MAX_REPEATED_LEN: usize = 1 << 26;

/// How many copies `len * right` asks for, refusing results past `MAX_REPEATED_LEN`.
fn repeat_count(len: usize, right: &PsValue) -> Result<usize, ErrorRecord> {
    let count = Number::of(right).ok_or_else(|| cannot_convert(right))?.as_f64();
    if !count.is_finite() {
        return Err(cannot_convert(right));
    }
    let count = count.max(0.0).round();
    if len == 0 || count < 1.0 {
        return Ok(0);
    }
    if count > MAX_REPEATED_LEN as f64 || len.saturating_mul(count as usize) > MAX_REPEATED_LEN {
        return Err(runtime_error(
            format!("The result of repeating {len} items {count} times would exceed {MAX_REPEATED_LEN} items."),
            "RepeatTooLarge",
            ErrorCategoryKind::InvalidOperation,
        ));
    }
    Ok(count as usize)
}

fn multiply(left: PsValue, right: PsValue) -> Result<PsValue, ErrorRecord> {
    match &left {
        PsValue::Primitive(PsPrimitiveValue::Str(s)) => {
            Ok(PsValue::from(s.repeat(repeat_count(s.len(), &right)?)))
        }
        PsValue::List(items) => {
            let n = repeat_count(items.len(), &right)?;
            Ok(PsValue::List(
                std::iter::repeat_n(items.clone(), n).flatten().collect(),
            ))
        }
        _ => arithmetic(BinaryOp::Mul, &left, &right),
    }
}

pub(crate) fn unary(op: UnaryOp, operand: PsValue) -> Result<PsValue, ErrorRecord> {
    match op {
        UnaryOp::Not => Ok(PsValue::from(!operand.is_truthy())),
        UnaryOp::Neg => match Number::of(&operand) {
            Some(Number::Int(v)) => Ok(v
                .checked_neg()
                .map_or_else(|| Number::Float(-(v as f64)), Number::Int)
                .into_value()),
            Some(Number::Float(v)) => Ok(PsValue::from(-v)),
            None => Err(no_operator(&operand, "op_UnaryNegation")),
        },
    }
}

/// Equality the way the language compares: the right side converts to the
/// left side's type, strings compare case-insensitively.
pub(crate) fn equals(left: &PsValue, right: &PsValue) -> bool {
    match left {
        PsValue::Primitive(PsPrimitiveValue::Nil) => right.is_null(),
        PsValue::Primitive(PsPrimitiveValue::Str(s)) => {
            !right.is_null() && s.eq_ignore_ascii_case(&right.to_string())
        }
        PsValue::Primitive(PsPrimitiveValue::Char(c)) => {
            let other = right.to_string();
            let mut chars = other.chars();
            chars.next().is_some_and(|o| o.eq_ignore_ascii_case(c)) && chars.next().is_none()
        }
        PsValue::Primitive(PsPrimitiveValue::Bool(b)) => *b == right.is_truthy(),
        _ if left.is_numeric() => match (Number::of(left), Number::of(right)) {
            (Some(a), Some(b)) if !right.is_null() => a.as_f64() == b.as_f64(),
            _ => false,
        },
        _ => left == right,
    }
}

fn compare(left: &PsValue, right: &PsValue) -> Option<Ordering> {
    if left.is_numeric() {
        let a = Number::of(left)?.as_f64();
        let b = Number::of(right)?.as_f64();
        return a.partial_cmp(&b);
    }
    match left {
        PsValue::Primitive(PsPrimitiveValue::Str(s)) => {
            Some(s.to_lowercase().cmp(&right.to_string().to_lowercase()))
        }
        PsValue::Primitive(PsPrimitiveValue::Nil) if right.is_null() => Some(Ordering::Equal),
        PsValue::Primitive(PsPrimitiveValue::Nil) => Some(Ordering::Less),
        PsValue::Primitive(PsPrimitiveValue::Bool(a)) => Some(a.cmp(&right.is_truthy())),
        PsValue::Primitive(PsPrimitiveValue::Char(c)) => {
            Some(c.to_string().to_lowercase().cmp(&right.to_string().to_lowercase()))
        }
        _ => None,
    }
}

fn scalar_compare(op: BinaryOp, left: &PsValue, right: &PsValue) -> Result<bool, ErrorRecord> {
    let ordered = |test: fn(Ordering) -> bool| {
        compare(left, right).map(test).ok_or_else(|| {
            runtime_error(
                format!(
                    "Cannot compare \"{left}\" because it is not IComparable."
                ),
                "NotIcomparable",
                ErrorCategoryKind::InvalidOperation,
            )
        })
    };
    match op {
        BinaryOp::Eq => Ok(equals(left, right)),
        BinaryOp::Ne => Ok(!equals(left, right)),
        BinaryOp::Gt => ordered(Ordering::is_gt),
        BinaryOp::Ge => ordered(Ordering::is_ge),
        BinaryOp::Lt => ordered(Ordering::is_lt),
        BinaryOp::Le => ordered(Ordering::is_le),
        BinaryOp::Like => Ok(wildcard_match(&right.to_string(), &left.to_string())),
        BinaryOp::NotLike => Ok(!wildcard_match(&right.to_string(), &left.to_string())),
        _ => Ok(false),
    }
}

/// Comparison operators filter when the left side is a list.
fn compare_op(op: BinaryOp, left: PsValue, right: &PsValue) -> Result<PsValue, ErrorRecord> {
    match left {
        PsValue::List(items) => {
            let mut kept = Vec::new();
            for item in items {
                if scalar_compare(op, &item, right)? {
                    kept.push(item);
                }
            }
            Ok(PsValue::List(kept))
        }
        left => scalar_compare(op, &left, right).map(PsValue::from),
    }
}

fn contains(collection: &PsValue, item: &PsValue) -> bool {
    match collection {
        PsValue::List(items) => items.iter().any(|i| equals(i, item)),
        other => equals(other, item),
    }
}

/// Case-insensitive `*`, `?` and `[set]` matching.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();
    matches_from(&pattern, &text)
}

fn matches_from(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => (0..=text.len()).any(|skip| matches_from(rest, &text[skip..])),
        Some(('?', rest)) => !text.is_empty() && matches_from(rest, &text[1..]),
        Some(('[', rest)) if rest.contains(&']') => {
            let Some(close) = rest.iter().position(|&c| c == ']') else {
                return false;
            };
            let Some((&first, tail)) = text.split_first() else {
                return false;
            };
            let set = &rest[..close];
            let mut hit = false;
            let mut i = 0;
            while i < set.len() {
                if i + 2 < set.len() && set[i + 1] == '-' {
                    hit |= (set[i]..=set[i + 2]).contains(&first);
                    i += 3;
                } else {
                    hit |= set[i] == first;
                    i += 1;
                }
            }
            hit && matches_from(&rest[close + 1..], tail)
        }
        Some((c, rest)) => text.first() == Some(c) && matches_from(rest, &text[1..]),
    }
}

/// `$value.Name`. Lists enumerate the member over their items.
pub(crate) fn member(value: &PsValue, name: &str) -> PsValue {
    let is = |n: &str| name.eq_ignore_ascii_case(n);
    match value {
        PsValue::Object(obj) => obj.get(name).cloned().unwrap_or(PsValue::NULL),
        PsValue::List(items) if is("Count") || is("Length") => {
            PsValue::from(i32::try_from(items.len()).unwrap_or(i32::MAX))
        }
        PsValue::List(items) => PsValue::from_output(
            items
                .iter()
                .map(|item| member(item, name))
                .filter(|v| !v.is_null())
                .collect(),
        ),
        PsValue::Primitive(PsPrimitiveValue::Str(s)) if is("Length") => {
            PsValue::from(i32::try_from(s.chars().count()).unwrap_or(i32::MAX))
        }
        PsValue::Primitive(PsPrimitiveValue::Nil) if is("Count") || is("Length") => PsValue::from(0),
        PsValue::Primitive(_) if is("Count") => PsValue::from(1),
        _ => PsValue::NULL,
    }
}

fn arg_str(args: &[PsValue], i: usize) -> String {
    args.get(i).map(ToString::to_string).unwrap_or_default()
}

fn arg_usize(args: &[PsValue], i: usize) -> Result<usize, ErrorRecord> {
    let value = args.get(i).cloned().unwrap_or(PsValue::NULL);
    match Number::of(&value) {
        Some(n) if n.as_f64() >= 0.0 => Ok(n.as_f64() as usize),
        _ => Err(cannot_convert(&value)),
    }
}

fn index_of(haystack: &str, needle: &str) -> i32 {
    let lower = haystack.to_lowercase();
    lower
        .find(&needle.to_lowercase())
        .map_or(-1, |byte| {
            i32::try_from(lower[..byte].chars().count()).unwrap_or(i32::MAX)
        })
}

/// `$value.Name(args)` for the string and list methods scripts commonly use.
pub(crate) fn method(value: &PsValue, name: &str, args: &[PsValue]) -> Result<PsValue, ErrorRecord> {
    let lower = name.to_ascii_lowercase();
    if lower == "tostring" {
        return Ok(PsValue::from(value.to_string()));
    }

    match value {
        PsValue::Primitive(PsPrimitiveValue::Str(s)) => {
            let result = match lower.as_str() {
                "toupper" => PsValue::from(s.to_uppercase()),
                "tolower" => PsValue::from(s.to_lowercase()),
                "trim" => PsValue::from(s.trim()),
                "trimstart" => PsValue::from(s.trim_start()),
                "trimend" => PsValue::from(s.trim_end()),
                "replace" => PsValue::from(s.replace(&arg_str(args, 0), &arg_str(args, 1))),
                "split" => {
                    let sep = arg_str(args, 0);
                    let parts: Vec<PsValue> = if sep.is_empty() {
                        s.split_whitespace().map(PsValue::from).collect()
                    } else {
                        s.split(|c: char| sep.contains(c)).map(PsValue::from).collect()
                    };
                    PsValue::List(parts)
                }
                "contains" => PsValue::from(s.contains(&arg_str(args, 0))),
                "startswith" => PsValue::from(s.to_lowercase().starts_with(&arg_str(args, 0).to_lowercase())),
                "endswith" => PsValue::from(s.to_lowercase().ends_with(&arg_str(args, 0).to_lowercase())),
                "indexof" => PsValue::from(index_of(s, &arg_str(args, 0))),
                "substring" => {
                    let chars: Vec<char> = s.chars().collect();
                    let start = arg_usize(args, 0)?;
                    let len = if args.len() > 1 {
                        arg_usize(args, 1)?
                    } else {
                        chars.len().saturating_sub(start)
                    };
                    if start + len > chars.len() {
                        return Err(runtime_error(
                            "Exception calling \"Substring\": \"Index and length must refer to a location within the string.\"",
                            "ArgumentOutOfRangeException",
                            ErrorCategoryKind::NotSpecified,
                        ));
                    }
                    PsValue::from(chars[start..start + len].iter().collect::<String>())
                }
                _ => return Err(no_operator(value, name)),
            };
            Ok(result)
        }
        PsValue::List(items) => match lower.as_str() {
            "contains" => Ok(PsValue::from(contains(
                value,
                &args.first().cloned().unwrap_or(PsValue::NULL),
            ))),
            "indexof" => {
                let needle = args.first().cloned().unwrap_or(PsValue::NULL);
                Ok(PsValue::from(
                    items
                        .iter()
                        .position(|i| equals(i, &needle))
                        .and_then(|p| i32::try_from(p).ok())
                        .unwrap_or(-1),
                ))
            }
            _ => Err(no_operator(value, name)),
        },
        PsValue::Primitive(PsPrimitiveValue::Nil) => Err(runtime_error(
            "You cannot call a method on a null-valued expression.",
            "InvokeMethodOnNull",
            ErrorCategoryKind::InvalidOperation,
        )),
        _ => Err(no_operator(value, name)),
    }
}

/// `$value[index]`. Negative indices count from the end; out of range is `$null`.
pub(crate) fn index(value: &PsValue, index: &PsValue) -> Result<PsValue, ErrorRecord> {
    let position = |len: usize| -> Option<usize> {
        let i = index.as_i64().or_else(|| index.as_f64().map(|f| f as i64))?;
        let len = i64::try_from(len).ok()?;
        let i = if i < 0 { len + i } else { i };
        usize::try_from(i).ok().filter(|&i| i64::try_from(i).is_ok_and(|i| i < len))
    };
    match value {
        PsValue::List(items) => Ok(position(items.len())
            .map_or(PsValue::NULL, |i| items[i].clone())),
        PsValue::Primitive(PsPrimitiveValue::Str(s)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(position(chars.len()).map_or(PsValue::NULL, |i| PsValue::from(chars[i])))
        }
        PsValue::Object(obj) => Ok(obj.get(&index.to_string()).cloned().unwrap_or(PsValue::NULL)),
        PsValue::Primitive(PsPrimitiveValue::Nil) => Err(runtime_error(
            "Cannot index into a null array.",
            "NullArray",
            ErrorCategoryKind::InvalidOperation,
        )),
        scalar => Ok(position(1).map_or(PsValue::NULL, |_| scalar.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_keeps_integers_when_exact() {
        assert_eq!(
            binary(BinaryOp::Add, PsValue::from(2), PsValue::from(3)).unwrap(),
            PsValue::from(5)
        );
        assert_eq!(
            binary(BinaryOp::Div, PsValue::from(7), PsValue::from(2)).unwrap(),
            PsValue::from(3.5)
        );
        assert_eq!(
            binary(BinaryOp::Mul, PsValue::from(i32::MAX), PsValue::from(2)).unwrap(),
            PsValue::from(i64::from(i32::MAX) * 2)
        );
    }

    #[test]
    fn oversized_repeats_are_errors() {
        let err = binary(BinaryOp::Mul, PsValue::from("ab"), PsValue::from(9999999999999999999.0))
            .unwrap_err();
        assert_eq!(err.fully_qualified_error_id.as_deref(), Some("RepeatTooLarge"));

        let list = PsValue::List(vec![PsValue::from(1)]);
        let err = binary(BinaryOp::Mul, list, PsValue::from(i64::MAX)).unwrap_err();
        assert_eq!(err.fully_qualified_error_id.as_deref(), Some("RepeatTooLarge"));

        assert_eq!(
            binary(BinaryOp::Mul, PsValue::from(""), PsValue::from(i64::MAX)).unwrap(),
            PsValue::from("")
        );
        assert_eq!(
            binary(BinaryOp::Mul, PsValue::List(Vec::new()), PsValue::from(f64::MAX)).unwrap(),
            PsValue::List(Vec::new())
        );
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = binary(BinaryOp::Div, PsValue::from(1), PsValue::from(0)).unwrap_err();
        assert_eq!(err.message, "Attempted to divide by zero.");
    }

    #[test]
    fn left_operand_decides_string_or_list() {
        assert_eq!(
            binary(BinaryOp::Add, PsValue::from("a"), PsValue::from(1)).unwrap(),
            PsValue::from("a1")
        );
        assert_eq!(
            binary(BinaryOp::Add, PsValue::from(1), PsValue::from("2")).unwrap(),
            PsValue::from(3)
        );
        assert_eq!(
            binary(BinaryOp::Mul, PsValue::from("ab"), PsValue::from(2)).unwrap(),
            PsValue::from("abab")
        );
        assert_eq!(
            binary(
                BinaryOp::Add,
                PsValue::List(vec![PsValue::from(1)]),
                PsValue::from(2)
            )
            .unwrap(),
            PsValue::List(vec![PsValue::from(1), PsValue::from(2)])
        );
    }

    #[test]
    fn comparisons_ignore_case_and_filter_lists() {
        assert!(equals(&PsValue::from("ABC"), &PsValue::from("abc")));
        assert!(equals(&PsValue::from(1), &PsValue::from("1")));
        let filtered = binary(
            BinaryOp::Gt,
            PsValue::List(vec![PsValue::from(1), PsValue::from(5), PsValue::from(9)]),
            PsValue::from(4),
        )
        .unwrap();
        assert_eq!(
            filtered,
            PsValue::List(vec![PsValue::from(5), PsValue::from(9)])
        );
    }

    #[test]
    fn wildcards() {
        assert!(wildcard_match("get-*", "Get-Command"));
        assert!(wildcard_match("?et-[a-c]*", "Set-Banner"));
        assert!(!wildcard_match("Out-*", "Write-Host"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn members_and_methods() {
        let list = PsValue::List(vec![PsValue::from("ab"), PsValue::from("cde")]);
        assert_eq!(member(&list, "Count"), PsValue::from(2));
        assert_eq!(
            member(&list, "Length"),
            PsValue::from(2),
            "Length on a list is its count"
        );
        assert_eq!(
            method(&PsValue::from("Hello"), "Substring", &[PsValue::from(1), PsValue::from(3)])
                .unwrap(),
            PsValue::from("ell")
        );
        assert!(method(&PsValue::NULL, "Trim", &[]).is_err());
    }

    #[test]
    fn negative_index_counts_from_end() {
        let list = PsValue::List(vec![PsValue::from(1), PsValue::from(2), PsValue::from(3)]);
        assert_eq!(index(&list, &PsValue::from(-1)).unwrap(), PsValue::from(3));
        assert_eq!(index(&list, &PsValue::from(5)).unwrap(), PsValue::NULL);
    }
}
