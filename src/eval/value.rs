//! Runtime values and heap objects.
//!
//! Scalars are stored inline in [`Value`]. Lists, dicts and struct instances
//! are mutable and may reference each other (or themselves), so they live
//! behind reference-counted [`ObjectRef`] handles allocated through a
//! [`Heap`]. Every traversal of object graphs goes through a
//! [`CycleDetector`] or a memo table, never through native recursion alone.

use core::fmt;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Number;

use super::evaluator::{EvalError, EvalResult};
use crate::ast::{FunctionDef, StructDef};
use crate::guard::CycleDetector;
use crate::promise::Promise;

/// Identity of a live heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

struct HeapCell {
    object: RwLock<HeapObject>,
    live: Arc<AtomicUsize>,
}

impl Drop for HeapCell {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Shared handle to a heap object. Cloning shares the object; the object is
/// freed with its last handle.
#[derive(Clone)]
pub struct ObjectRef(Arc<HeapCell>);

impl ObjectRef {
    pub fn id(&self) -> ObjectId {
        ObjectId(Arc::as_ptr(&self.0) as usize)
    }

    /// Copy of the object's current contents.
    pub fn snapshot(&self) -> HeapObject {
        self.with(HeapObject::clone)
    }

    /// Runs `f` with the object read-locked. `f` must not lock other objects.
    pub fn with<R>(&self, f: impl FnOnce(&HeapObject) -> R) -> R {
        let object = self.0.object.read().unwrap_or_else(PoisonError::into_inner);
        f(&*object)
    }

    /// Runs `f` with the object write-locked. `f` must not lock other objects.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut HeapObject) -> R) -> R {
        let mut object = self.0.object.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *object)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// contents may be cyclic, so only the identity is printed
impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObjectRef({})", self.id())
    }
}

#[derive(Debug, Clone)]
pub enum FunctionRef {
    /// User-defined function, interpreted and promise-wrapped at call sites.
    Dana(Arc<FunctionDef>),
    /// Host function looked up in the native registry.
    Native(String),
    /// Struct constructor.
    Struct(Arc<StructDef>),
}

impl FunctionRef {
    pub fn name(&self) -> &str {
        match self {
            FunctionRef::Dana(def) => &def.name,
            FunctionRef::Native(name) => name,
            FunctionRef::Struct(def) => &def.name,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Tuple(Vec<Value>),
    Object(ObjectRef),
    Function(FunctionRef),
    Promise(Promise),
}

/// Shallow equality: scalars by value, heap objects and promises by identity.
/// Structural equality lives in [`Heap::deep_equal`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Boolean(l), Value::Boolean(r)) => l == r,
            (Value::Integer(l), Value::Integer(r)) => l == r,
            (Value::Float(l), Value::Float(r)) => l == r,
            (Value::String(l), Value::String(r)) => l == r,
            (Value::Tuple(l), Value::Tuple(r)) => l == r,
            (Value::Object(l), Value::Object(r)) => l == r,
            (Value::Function(l), Value::Function(r)) => match (l, r) {
                (FunctionRef::Dana(l), FunctionRef::Dana(r)) => Arc::ptr_eq(l, r),
                (FunctionRef::Native(l), FunctionRef::Native(r)) => l == r,
                (FunctionRef::Struct(l), FunctionRef::Struct(r)) => Arc::ptr_eq(l, r),
                _ => false,
            },
            (Value::Promise(l), Value::Promise(r)) => l.id() == r.id(),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl Value {
    pub fn is_promise(&self) -> bool {
        matches!(self, Value::Promise(_))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Scalar values can be hashed, cached and used as dict keys without
    /// consulting the heap.
    pub fn is_scalar(&self) -> bool {
        match self {
            Value::None
            | Value::Boolean(_)
            | Value::Integer(_)
            | Value::Float(_)
            | Value::String(_) => true,
            Value::Tuple(items) => items.iter().all(Value::is_scalar),
            _ => false,
        }
    }

    /// Type name as seen by programs. Heap objects need the heap, see
    /// [`Heap::type_name`].
    pub fn scalar_type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Boolean(_) => "bool",
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Promise(_) => "promise",
        }
    }
}

#[derive(Debug, Clone)]
pub enum HeapObject {
    List(Vec<Value>),
    /// Insertion ordered. Keys are scalars.
    Dict(Vec<(Value, Value)>),
    Struct {
        type_name: String,
        fields: Vec<(String, Value)>,
    },
}

impl HeapObject {
    pub fn type_name(&self) -> &str {
        match self {
            HeapObject::List(_) => "list",
            HeapObject::Dict(_) => "dict",
            HeapObject::Struct { type_name, .. } => type_name,
        }
    }

    /// Outgoing edges, labelled for cycle reports.
    fn children(&self) -> Vec<(String, Value)> {
        match self {
            HeapObject::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("[{}]", i), v.clone()))
                .collect(),
            HeapObject::Dict(entries) => entries
                .iter()
                .map(|(k, v)| (format!("[{}]", scalar_repr(k)), v.clone()))
                .collect(),
            HeapObject::Struct { fields, .. } => fields
                .iter()
                .map(|(name, v)| (format!(".{}", name), v.clone()))
                .collect(),
        }
    }
}

/// Allocator for heap objects shared by a family of contexts.
///
/// Objects are reference counted and freed with their last handle, so the
/// copies made for a call go away once the call settles. Objects kept alive
/// only by a reference cycle are never reclaimed.
#[derive(Debug, Default)]
pub struct Heap {
    live: Arc<AtomicUsize>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&self, object: HeapObject) -> ObjectRef {
        self.live.fetch_add(1, Ordering::Relaxed);
        ObjectRef(Arc::new(HeapCell {
            object: RwLock::new(object),
            live: self.live.clone(),
        }))
    }

    pub fn alloc_list(&self, items: Vec<Value>) -> Value {
        Value::Object(self.alloc(HeapObject::List(items)))
    }

    pub fn alloc_struct(&self, type_name: impl Into<String>, fields: Vec<(String, Value)>) -> Value {
        Value::Object(self.alloc(HeapObject::Struct {
            type_name: type_name.into(),
            fields,
        }))
    }

    pub fn alloc_dict(&self, entries: Vec<(Value, Value)>) -> Value {
        Value::Object(self.alloc(HeapObject::Dict(entries)))
    }

    /// Number of live objects allocated here.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self, value: &Value) -> String {
        match value {
            Value::Object(object) => object.with(|object| object.type_name().to_string()),
            other => other.scalar_type_name().to_string(),
        }
    }

    pub fn truthy(&self, value: &Value) -> EvalResult<bool> {
        Ok(match value {
            Value::None => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Object(object) => object.with(|object| match object {
                HeapObject::List(items) => !items.is_empty(),
                HeapObject::Dict(entries) => !entries.is_empty(),
                HeapObject::Struct { .. } => true,
            }),
            Value::Function(_) => true,
            Value::Promise(_) => {
                return Err(EvalError::Internal(
                    "truthiness of an unforced promise".to_string(),
                ))
            }
        })
    }

    /// Copies every object reachable from `value` into fresh objects. `memo`
    /// maps already-copied objects so aliasing and cycles are preserved.
    pub fn deep_copy(&self, value: &Value, memo: &mut HashMap<ObjectId, ObjectRef>) -> Value {
        match value {
            Value::Object(original) => {
                if let Some(copied) = memo.get(&original.id()) {
                    return Value::Object(copied.clone());
                }
                let contents = original.snapshot();
                // allocate first so self references resolve to the copy
                let copy = self.alloc(HeapObject::List(Vec::new()));
                memo.insert(original.id(), copy.clone());
                let copied = match contents {
                    HeapObject::List(items) => HeapObject::List(
                        items.iter().map(|item| self.deep_copy(item, memo)).collect(),
                    ),
                    HeapObject::Dict(entries) => HeapObject::Dict(
                        entries
                            .iter()
                            .map(|(k, v)| (k.clone(), self.deep_copy(v, memo)))
                            .collect(),
                    ),
                    HeapObject::Struct { type_name, fields } => HeapObject::Struct {
                        type_name,
                        fields: fields
                            .iter()
                            .map(|(name, v)| (name.clone(), self.deep_copy(v, memo)))
                            .collect(),
                    },
                };
                copy.with_mut(|slot| *slot = copied);
                Value::Object(copy)
            }
            Value::Tuple(items) => Value::Tuple(
                items.iter().map(|item| self.deep_copy(item, memo)).collect(),
            ),
            other => other.clone(),
        }
    }

    /// Human readable form: strings unquoted at top level, quoted inside
    /// containers.
    pub fn display(&self, value: &Value) -> EvalResult<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => self.repr(other),
        }
    }

    pub fn repr(&self, value: &Value) -> EvalResult<String> {
        let mut detector = CycleDetector::new();
        let mut out = String::new();
        self.write_repr(value, "root", &mut detector, &mut out)?;
        Ok(out)
    }

    fn write_repr(
        &self,
        value: &Value,
        label: &str,
        detector: &mut CycleDetector,
        out: &mut String,
    ) -> EvalResult<()> {
        match value {
            Value::Object(handle) => {
                detector.enter(handle.id(), label)?;
                let object = handle.snapshot();
                match &object {
                    HeapObject::List(items) => {
                        out.push('[');
                        for (i, item) in items.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            self.write_repr(item, &format!("[{}]", i), detector, out)?;
                        }
                        out.push(']');
                    }
                    HeapObject::Dict(entries) => {
                        out.push('{');
                        for (i, (key, item)) in entries.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            let key_repr = scalar_repr(key);
                            out.push_str(&key_repr);
                            out.push_str(": ");
                            self.write_repr(item, &format!("[{}]", key_repr), detector, out)?;
                        }
                        out.push('}');
                    }
                    HeapObject::Struct { type_name, fields } => {
                        out.push_str(type_name);
                        out.push('(');
                        for (i, (name, item)) in fields.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            out.push_str(name);
                            out.push('=');
                            self.write_repr(item, &format!(".{}", name), detector, out)?;
                        }
                        out.push(')');
                    }
                }
                detector.exit(handle.id());
            }
            Value::Tuple(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_repr(item, &format!("[{}]", i), detector, out)?;
                }
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Promise(promise) => match promise.peek() {
                Some(Ok(resolved)) => self.write_repr(&resolved, label, detector, out)?,
                Some(Err(_)) => out.push_str("<promise failed>"),
                None => out.push_str("<promise pending>"),
            },
            scalar => out.push_str(&scalar_repr(scalar)),
        }
        Ok(())
    }

    /// Structural equality. Cycles on the left-hand side are an error.
    pub fn deep_equal(&self, left: &Value, right: &Value) -> EvalResult<bool> {
        let mut detector = CycleDetector::new();
        self.deep_equal_inner(left, right, "root", &mut detector)
    }

    fn deep_equal_inner(
        &self,
        left: &Value,
        right: &Value,
        label: &str,
        detector: &mut CycleDetector,
    ) -> EvalResult<bool> {
        match (left, right) {
            (Value::Integer(l), Value::Float(r)) => Ok((*l as f64) == *r),
            (Value::Float(l), Value::Integer(r)) => Ok(*l == (*r as f64)),
            (Value::Tuple(l), Value::Tuple(r)) => {
                if l.len() != r.len() {
                    return Ok(false);
                }
                for (i, (l, r)) in l.iter().zip(r).enumerate() {
                    if !self.deep_equal_inner(l, r, &format!("[{}]", i), detector)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Value::Object(l), Value::Object(r)) => {
                if l == r {
                    return Ok(true);
                }
                detector.enter(l.id(), label)?;
                let (left_object, right_object) = (l.snapshot(), r.snapshot());
                let equal = match (&left_object, &right_object) {
                    (HeapObject::List(l_items), HeapObject::List(r_items)) => {
                        l_items.len() == r_items.len()
                            && self.all_equal(
                                l_items.iter().enumerate().map(|(i, v)| (format!("[{}]", i), v)),
                                r_items.iter(),
                                detector,
                            )?
                    }
                    (HeapObject::Dict(l_entries), HeapObject::Dict(r_entries)) => {
                        if l_entries.len() != r_entries.len() {
                            false
                        } else {
                            let mut equal = true;
                            for (key, l_value) in l_entries {
                                match r_entries.iter().find(|(k, _)| scalar_key_eq(k, key)) {
                                    Some((_, r_value)) => {
                                        let label = format!("[{}]", scalar_repr(key));
                                        if !self.deep_equal_inner(
                                            l_value, r_value, &label, detector,
                                        )? {
                                            equal = false;
                                            break;
                                        }
                                    }
                                    None => {
                                        equal = false;
                                        break;
                                    }
                                }
                            }
                            equal
                        }
                    }
                    (
                        HeapObject::Struct {
                            type_name: l_name,
                            fields: l_fields,
                        },
                        HeapObject::Struct {
                            type_name: r_name,
                            fields: r_fields,
                        },
                    ) => {
                        l_name == r_name
                            && l_fields.len() == r_fields.len()
                            && self.all_equal(
                                l_fields.iter().map(|(n, v)| (format!(".{}", n), v)),
                                r_fields.iter().map(|(_, v)| v),
                                detector,
                            )?
                    }
                    _ => false,
                };
                detector.exit(l.id());
                Ok(equal)
            }
            (l, r) => Ok(l == r),
        }
    }

    fn all_equal<'a>(
        &self,
        left: impl Iterator<Item = (String, &'a Value)>,
        right: impl Iterator<Item = &'a Value>,
        detector: &mut CycleDetector,
    ) -> EvalResult<bool> {
        for ((label, l), r) in left.zip(right) {
            if !self.deep_equal_inner(l, r, &label, detector)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Feeds a structural hash of `value` into `state`.
    pub fn hash_into<H: Hasher>(&self, value: &Value, state: &mut H) -> EvalResult<()> {
        let mut detector = CycleDetector::new();
        self.hash_inner(value, "root", state, &mut detector)
    }

    fn hash_inner<H: Hasher>(
        &self,
        value: &Value,
        label: &str,
        state: &mut H,
        detector: &mut CycleDetector,
    ) -> EvalResult<()> {
        match value {
            Value::None => 0u8.hash(state),
            Value::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Integer(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Value::Float(f) => {
                3u8.hash(state);
                f.to_bits().hash(state);
            }
            Value::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Value::Tuple(items) => {
                5u8.hash(state);
                items.len().hash(state);
                for (i, item) in items.iter().enumerate() {
                    self.hash_inner(item, &format!("[{}]", i), state, detector)?;
                }
            }
            Value::Object(handle) => {
                6u8.hash(state);
                detector.enter(handle.id(), label)?;
                let object = handle.snapshot();
                object.type_name().hash(state);
                for (child_label, child) in object.children() {
                    child_label.hash(state);
                    self.hash_inner(&child, &child_label, state, detector)?;
                }
                detector.exit(handle.id());
            }
            Value::Function(function) => {
                7u8.hash(state);
                function.name().hash(state);
            }
            Value::Promise(_) => {
                return Err(EvalError::Internal(
                    "cannot hash an unforced promise".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Converts to JSON for capability inputs. Fails on cycles, functions and
    /// unforced promises.
    pub fn to_json(&self, value: &Value) -> EvalResult<serde_json::Value> {
        let mut detector = CycleDetector::new();
        self.to_json_inner(value, "root", &mut detector)
    }

    fn to_json_inner(
        &self,
        value: &Value,
        label: &str,
        detector: &mut CycleDetector,
    ) -> EvalResult<serde_json::Value> {
        Ok(match value {
            Value::None => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Tuple(items) => serde_json::Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.to_json_inner(item, &format!("[{}]", i), detector))
                    .collect::<EvalResult<_>>()?,
            ),
            Value::Object(handle) => {
                detector.enter(handle.id(), label)?;
                let object = handle.snapshot();
                let json = match &object {
                    HeapObject::List(items) => serde_json::Value::Array(
                        items
                            .iter()
                            .enumerate()
                            .map(|(i, item)| {
                                self.to_json_inner(item, &format!("[{}]", i), detector)
                            })
                            .collect::<EvalResult<_>>()?,
                    ),
                    HeapObject::Dict(_) | HeapObject::Struct { .. } => {
                        let mut map = serde_json::Map::new();
                        for (child_label, child) in object.children() {
                            let key = match &object {
                                HeapObject::Struct { .. } => child_label[1..].to_string(),
                                _ => json_key(&child_label),
                            };
                            map.insert(key, self.to_json_inner(&child, &child_label, detector)?);
                        }
                        serde_json::Value::Object(map)
                    }
                };
                detector.exit(handle.id());
                json
            }
            Value::Function(function) => {
                return Err(EvalError::TypeMismatch(format!(
                    "function '{}' cannot be passed to a capability",
                    function.name()
                )))
            }
            Value::Promise(_) => {
                return Err(EvalError::Internal(
                    "unforced promise in capability input".to_string(),
                ))
            }
        })
    }

    /// Converts capability output into heap values.
    pub fn from_json(&self, json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN))),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                let items = items.iter().map(|item| self.from_json(item)).collect();
                self.alloc_list(items)
            }
            serde_json::Value::Object(map) => {
                let entries = map
                    .iter()
                    .map(|(k, v)| (Value::String(k.clone()), self.from_json(v)))
                    .collect();
                self.alloc_dict(entries)
            }
        }
    }
}

pub fn dict_get<'a>(entries: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    entries
        .iter()
        .find(|(k, _)| scalar_key_eq(k, key))
        .map(|(_, v)| v)
}

/// Inserts or replaces, keeping first-insertion order.
pub fn dict_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) -> EvalResult<()> {
    if !key.is_scalar() {
        return Err(EvalError::TypeMismatch(format!(
            "unhashable type: '{}'",
            key.scalar_type_name()
        )));
    }
    match entries.iter_mut().find(|(k, _)| scalar_key_eq(k, &key)) {
        Some((_, slot)) => *slot = value,
        None => entries.push((key, value)),
    }
    Ok(())
}

/// Dict keys compare by value, with `1 == 1.0` as in arithmetic.
pub fn scalar_key_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(l), Value::Float(r)) => (*l as f64) == *r,
        (Value::Float(l), Value::Integer(r)) => *l == (*r as f64),
        (l, r) => l == r,
    }
}

pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        let text = if f > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else {
        format!("{}", f)
    }
}

/// Repr of a value that needs no heap access. Heap objects print as their id.
pub fn scalar_repr(value: &Value) -> String {
    match value {
        Value::None => "None".to_string(),
        Value::Boolean(true) => "True".to_string(),
        Value::Boolean(false) => "False".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        Value::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(scalar_repr).collect();
            if items.len() == 1 {
                format!("({},)", inner[0])
            } else {
                format!("({})", inner.join(", "))
            }
        }
        Value::Object(object) => format!("<object {}>", object.id()),
        Value::Function(function) => format!("<function {}>", function.name()),
        Value::Promise(promise) => format!("<promise {}>", promise.id()),
    }
}

fn json_key(label: &str) -> String {
    // labels look like "['key']" or "[3]"
    let inner = &label[1..label.len() - 1];
    inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("\\'", "'"))
        .unwrap_or_else(|| inner.to_string())
}
