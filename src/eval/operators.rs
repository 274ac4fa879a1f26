//! Operator semantics over forced values.
//!
//! Callers force promise operands before calling in here; a promise reaching
//! these functions is a type mismatch.

use std::cmp::Ordering;

use super::evaluator::{EvalError, EvalResult};
use super::value::{dict_get, dict_insert, scalar_key_eq, scalar_repr, Heap, HeapObject, Value};
use crate::ast::{BinaryOperator, UnaryOperator};

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Boolean(b) => Some(Number::Int(*b as i64)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn unsupported(op: impl std::fmt::Display, left: &Value, right: &Value, heap: &Heap) -> EvalError {
    EvalError::type_mismatch(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        heap.type_name(left),
        heap.type_name(right)
    ))
}

fn overflow() -> EvalError {
    EvalError::invalid("integer overflow")
}

fn division_by_zero() -> EvalError {
    EvalError::invalid("division by zero")
}

pub fn binary(op: BinaryOperator, left: &Value, right: &Value, heap: &Heap) -> EvalResult<Value> {
    use BinaryOperator::*;
    match op {
        Add => add(left, right, heap),
        Subtract | Multiply | Divide | FloorDivide | Modulo | Power => {
            if op == Multiply {
                if let Some(repeated) = repeat(left, right, heap)? {
                    return Ok(repeated);
                }
            }
            arithmetic(op, left, right, heap)
        }
        Equal => Ok(Value::Boolean(heap.deep_equal(left, right)?)),
        NotEqual => Ok(Value::Boolean(!heap.deep_equal(left, right)?)),
        LessThan => Ok(Value::Boolean(compare(left, right, heap, op)? == Ordering::Less)),
        LessThanEqual => Ok(Value::Boolean(compare(left, right, heap, op)? != Ordering::Greater)),
        GreaterThan => Ok(Value::Boolean(compare(left, right, heap, op)? == Ordering::Greater)),
        GreaterThanEqual => Ok(Value::Boolean(compare(left, right, heap, op)? != Ordering::Less)),
        And => Ok(if heap.truthy(left)? { right.clone() } else { left.clone() }),
        Or => Ok(if heap.truthy(left)? { left.clone() } else { right.clone() }),
        In => Ok(Value::Boolean(contains(right, left, heap)?)),
        NotIn => Ok(Value::Boolean(!contains(right, left, heap)?)),
    }
}

fn add(left: &Value, right: &Value, heap: &Heap) -> EvalResult<Value> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(Value::String(format!("{}{}", l, r))),
        (Value::Tuple(l), Value::Tuple(r)) => {
            Ok(Value::Tuple(l.iter().chain(r.iter()).cloned().collect()))
        }
        (Value::Object(l), Value::Object(r)) => match (l.snapshot(), r.snapshot()) {
            (HeapObject::List(mut l_items), HeapObject::List(r_items)) => {
                l_items.extend(r_items);
                Ok(heap.alloc_list(l_items))
            }
            _ => Err(unsupported(BinaryOperator::Add, left, right, heap)),
        },
        _ => arithmetic(BinaryOperator::Add, left, right, heap),
    }
}

/// `str * int`, `list * int` and the mirrored forms.
fn repeat(left: &Value, right: &Value, heap: &Heap) -> EvalResult<Option<Value>> {
    let (sequence, count) = match (left, right) {
        (Value::Integer(n), other) | (other, Value::Integer(n)) => (other, *n),
        _ => return Ok(None),
    };
    let count = count.max(0) as usize;
    match sequence {
        Value::String(s) => Ok(Some(Value::String(s.repeat(count)))),
        Value::Tuple(items) => Ok(Some(Value::Tuple(
            (0..count).flat_map(|_| items.iter().cloned()).collect(),
        ))),
        Value::Object(object) => match object.snapshot() {
            HeapObject::List(items) => Ok(Some(
                heap.alloc_list((0..count).flat_map(|_| items.iter().cloned()).collect()),
            )),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value, heap: &Heap) -> EvalResult<Value> {
    let (Some(l), Some(r)) = (Number::from_value(left), Number::from_value(right)) else {
        return Err(unsupported(op, left, right, heap));
    };
    match (l, r) {
        (Number::Int(a), Number::Int(b)) => int_arithmetic(op, a, b),
        (a, b) => float_arithmetic(op, a.as_f64(), b.as_f64()),
    }
}

fn int_arithmetic(op: BinaryOperator, a: i64, b: i64) -> EvalResult<Value> {
    use BinaryOperator::*;
    let value = match op {
        Add => a.checked_add(b).ok_or_else(overflow)?,
        Subtract => a.checked_sub(b).ok_or_else(overflow)?,
        Multiply => a.checked_mul(b).ok_or_else(overflow)?,
        Divide => {
            if b == 0 {
                return Err(division_by_zero());
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        FloorDivide => {
            if b == 0 {
                return Err(division_by_zero());
            }
            floor_div(a, b).ok_or_else(overflow)?
        }
        Modulo => {
            if b == 0 {
                return Err(division_by_zero());
            }
            // MIN % -1 wraps to 0, which is also the floored result
            let remainder = a.wrapping_rem(b);
            if remainder != 0 && (remainder < 0) != (b < 0) {
                remainder + b
            } else {
                remainder
            }
        }
        Power => {
            if b < 0 {
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exponent = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exponent).ok_or_else(overflow)?
        }
        _ => return Err(EvalError::Internal(format!("'{}' is not arithmetic", op))),
    };
    Ok(Value::Integer(value))
}

/// Rounds toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let quotient = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(quotient - 1)
    } else {
        Some(quotient)
    }
}

fn float_arithmetic(op: BinaryOperator, a: f64, b: f64) -> EvalResult<Value> {
    use BinaryOperator::*;
    let value = match op {
        Add => a + b,
        Subtract => a - b,
        Multiply => a * b,
        Divide => {
            if b == 0.0 {
                return Err(division_by_zero());
            }
            a / b
        }
        FloorDivide => {
            if b == 0.0 {
                return Err(division_by_zero());
            }
            (a / b).floor()
        }
        Modulo => {
            if b == 0.0 {
                return Err(division_by_zero());
            }
            a - b * (a / b).floor()
        }
        Power => a.powf(b),
        _ => return Err(EvalError::Internal(format!("'{}' is not arithmetic", op))),
    };
    Ok(Value::Float(value))
}

/// Ordering for `<`, `sorted`, `min` and `max`.
pub fn compare(
    left: &Value,
    right: &Value,
    heap: &Heap,
    op: impl std::fmt::Display + Copy,
) -> EvalResult<Ordering> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        (Value::Tuple(l), Value::Tuple(r)) => compare_sequences(l, r, heap, op),
        (Value::Object(l), Value::Object(r)) => match (l.snapshot(), r.snapshot()) {
            (HeapObject::List(l_items), HeapObject::List(r_items)) => {
                compare_sequences(&l_items, &r_items, heap, op)
            }
            _ => Err(unorderable(op, left, right, heap)),
        },
        _ => match (Number::from_value(left), Number::from_value(right)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => Ok(a.cmp(&b)),
            (Some(a), Some(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| EvalError::invalid("cannot order NaN")),
            _ => Err(unorderable(op, left, right, heap)),
        },
    }
}

fn compare_sequences(
    left: &[Value],
    right: &[Value],
    heap: &Heap,
    op: impl std::fmt::Display + Copy,
) -> EvalResult<Ordering> {
    for (l, r) in left.iter().zip(right) {
        if heap.deep_equal(l, r)? {
            continue;
        }
        return compare(l, r, heap, op);
    }
    Ok(left.len().cmp(&right.len()))
}

fn unorderable(op: impl std::fmt::Display, left: &Value, right: &Value, heap: &Heap) -> EvalError {
    EvalError::type_mismatch(format!(
        "'{}' not supported between instances of '{}' and '{}'",
        op,
        heap.type_name(left),
        heap.type_name(right)
    ))
}

/// Membership test, `item in container`.
pub fn contains(container: &Value, item: &Value, heap: &Heap) -> EvalResult<bool> {
    match container {
        Value::String(haystack) => match item {
            Value::String(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(EvalError::type_mismatch(format!(
                "'in <string>' requires string as left operand, not {}",
                heap.type_name(other)
            ))),
        },
        Value::Tuple(items) => any_equal(items, item, heap),
        Value::Object(object) => match object.snapshot() {
            HeapObject::List(items) => any_equal(&items, item, heap),
            HeapObject::Dict(entries) => Ok(entries.iter().any(|(key, _)| scalar_key_eq(key, item))),
            HeapObject::Struct { type_name, .. } => Err(EvalError::type_mismatch(format!(
                "argument of type '{}' is not iterable",
                type_name
            ))),
        },
        other => Err(EvalError::type_mismatch(format!(
            "argument of type '{}' is not iterable",
            heap.type_name(other)
        ))),
    }
}

fn any_equal(items: &[Value], item: &Value, heap: &Heap) -> EvalResult<bool> {
    for candidate in items {
        if heap.deep_equal(candidate, item)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn position(index: &Value, length: usize) -> EvalResult<usize> {
    let Value::Integer(raw) = index else {
        return Err(EvalError::type_mismatch(format!(
            "indices must be integers, not '{}'",
            index.scalar_type_name()
        )));
    };
    let resolved = if *raw < 0 { *raw + length as i64 } else { *raw };
    if resolved < 0 || resolved >= length as i64 {
        return Err(EvalError::IndexOutOfRange {
            index: *raw,
            length,
        });
    }
    Ok(resolved as usize)
}

/// `container[index]`.
pub fn index(container: &Value, index: &Value, heap: &Heap) -> EvalResult<Value> {
    match container {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let at = position(index, chars.len())?;
            Ok(Value::String(chars[at].to_string()))
        }
        Value::Tuple(items) => Ok(items[position(index, items.len())?].clone()),
        Value::Object(object) => match object.snapshot() {
            HeapObject::List(items) => Ok(items[position(index, items.len())?].clone()),
            HeapObject::Dict(entries) => dict_get(&entries, index)
                .cloned()
                .ok_or_else(|| EvalError::KeyNotFound(scalar_repr(index))),
            HeapObject::Struct { type_name, .. } => Err(EvalError::type_mismatch(format!(
                "'{}' object is not subscriptable",
                type_name
            ))),
        },
        other => Err(EvalError::type_mismatch(format!(
            "'{}' object is not subscriptable",
            heap.type_name(other)
        ))),
    }
}

/// `container[index] = value`.
pub fn set_index(container: &Value, index: Value, value: Value, heap: &Heap) -> EvalResult<()> {
    let Value::Object(target) = container else {
        return Err(EvalError::type_mismatch(format!(
            "'{}' object does not support item assignment",
            heap.type_name(container)
        )));
    };
    target.with_mut(|object| match object {
        HeapObject::List(items) => {
            let at = position(&index, items.len())?;
            items[at] = value;
            Ok(())
        }
        HeapObject::Dict(entries) => dict_insert(entries, index, value),
        HeapObject::Struct { type_name, .. } => Err(EvalError::type_mismatch(format!(
            "'{}' object does not support item assignment",
            type_name
        ))),
    })
}

fn slice_positions(length: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
    let len = length as i64;
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };
    let mut positions = Vec::new();
    if step > 0 {
        let mut at = start.map_or(0, |s| clamp(s, 0, len));
        let stop = end.map_or(len, |e| clamp(e, 0, len));
        while at < stop {
            positions.push(at as usize);
            at += step;
        }
    } else {
        let mut at = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let stop = end.map_or(-1, |e| clamp(e, -1, len - 1));
        while at > stop {
            positions.push(at as usize);
            at += step;
        }
    }
    positions
}

/// `container[start:end:step]`. Always yields a new value.
pub fn slice(
    container: &Value,
    start: Option<i64>,
    end: Option<i64>,
    step: Option<i64>,
    heap: &Heap,
) -> EvalResult<Value> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(EvalError::invalid("slice step cannot be zero"));
    }
    match container {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::String(
                slice_positions(chars.len(), start, end, step)
                    .into_iter()
                    .map(|at| chars[at])
                    .collect(),
            ))
        }
        Value::Tuple(items) => Ok(Value::Tuple(
            slice_positions(items.len(), start, end, step)
                .into_iter()
                .map(|at| items[at].clone())
                .collect(),
        )),
        Value::Object(object) => match object.snapshot() {
            HeapObject::List(items) => Ok(heap.alloc_list(
                slice_positions(items.len(), start, end, step)
                    .into_iter()
                    .map(|at| items[at].clone())
                    .collect(),
            )),
            other => Err(EvalError::type_mismatch(format!(
                "'{}' object is not sliceable",
                other.type_name()
            ))),
        },
        other => Err(EvalError::type_mismatch(format!(
            "'{}' object is not sliceable",
            heap.type_name(other)
        ))),
    }
}

pub fn unary(op: UnaryOperator, operand: &Value, heap: &Heap) -> EvalResult<Value> {
    match op {
        UnaryOperator::Not => Ok(Value::Boolean(!heap.truthy(operand)?)),
        UnaryOperator::Negate => match operand {
            Value::Integer(i) => i.checked_neg().map(Value::Integer).ok_or_else(overflow),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Boolean(b) => Ok(Value::Integer(-(*b as i64))),
            other => Err(EvalError::type_mismatch(format!(
                "bad operand type for unary -: '{}'",
                heap.type_name(other)
            ))),
        },
    }
}
