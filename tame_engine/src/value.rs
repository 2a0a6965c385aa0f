// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime value model.
//!
//! [`Value`] is a closed tagged union. Every kind except [`Value::List`] is copied by value when a
//! `Value` is cloned; lists are shared mutable instances and clone as another handle to the same
//! list. That distinction is visible to scripts (assignment aliases lists) and to the save-state
//! codec, which preserves list aliasing across a save/load cycle.

use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::element::ElementKind;

/// A shared, mutable list instance.
pub type ListRef = Rc<RefCell<Vec<Value>>>;

type ListCell = RefCell<Vec<Value>>;

/// The kind of a [`Value`], used for dispatch and as the wire tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    /// `true` / `false`.
    Boolean,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    String,
    /// Shared list.
    List,
    /// Object reference.
    Object,
    /// Player reference.
    Player,
    /// Room reference.
    Room,
    /// Container reference.
    Container,
    /// World reference.
    World,
    /// Action reference.
    Action,
    /// Variable name (operands only).
    Variable,
}

impl ValueKind {
    /// Returns the stable wire tag for this kind.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Boolean,
            1 => Self::Integer,
            2 => Self::Float,
            3 => Self::String,
            4 => Self::List,
            5 => Self::Object,
            6 => Self::Player,
            7 => Self::Room,
            8 => Self::Container,
            9 => Self::World,
            10 => Self::Action,
            11 => Self::Variable,
            _ => return None,
        })
    }

    /// Returns the script-facing name of this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::String => "STRING",
            Self::List => "LIST",
            Self::Object => "OBJECT",
            Self::Player => "PLAYER",
            Self::Room => "ROOM",
            Self::Container => "CONTAINER",
            Self::World => "WORLD",
            Self::Action => "ACTION",
            Self::Variable => "VARIABLE",
        }
    }
}

/// A runtime value.
///
/// Build floats through [`Value::float`] so that `-0.0` is normalized, and element references
/// through the kind-specific constructors so that identities are case-folded.
///
/// A list may contain itself, directly or through other lists. Equality, formatting and hashing
/// all terminate on such lists.
#[derive(Clone)]
pub enum Value {
    /// Boolean.
    Boolean(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// A shared list; cloning the value shares the list.
    List(ListRef),
    /// Reference to an object by identity.
    Object(String),
    /// Reference to a player by identity.
    Player(String),
    /// Reference to a room by identity.
    Room(String),
    /// Reference to a container by identity.
    Container(String),
    /// Reference to the world.
    World(String),
    /// Reference to an action by identity.
    Action(String),
    /// A variable name. Only ever appears as an operation operand.
    Variable(String),
}

/// Case-folds an element, action or variable identity.
#[must_use]
pub fn fold_identity(identity: &str) -> String {
    identity.to_lowercase()
}

impl Value {
    /// Creates a float value, normalizing `-0.0` to `0.0`.
    #[must_use]
    pub fn float(v: f64) -> Self {
        Self::Float(if v == 0.0 { 0.0 } else { v })
    }

    /// Creates a string value.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Creates a new list instance holding `values`.
    #[must_use]
    pub fn list(values: Vec<Self>) -> Self {
        Self::List(Rc::new(RefCell::new(values)))
    }

    /// Creates a new, empty list instance.
    #[must_use]
    pub fn new_list() -> Self {
        Self::list(Vec::new())
    }

    /// Creates an object reference.
    #[must_use]
    pub fn object(identity: &str) -> Self {
        Self::Object(fold_identity(identity))
    }

    /// Creates a player reference.
    #[must_use]
    pub fn player(identity: &str) -> Self {
        Self::Player(fold_identity(identity))
    }

    /// Creates a room reference.
    #[must_use]
    pub fn room(identity: &str) -> Self {
        Self::Room(fold_identity(identity))
    }

    /// Creates a container reference.
    #[must_use]
    pub fn container(identity: &str) -> Self {
        Self::Container(fold_identity(identity))
    }

    /// Creates the world reference.
    #[must_use]
    pub fn world() -> Self {
        Self::World(String::from(crate::element::WORLD_IDENTITY))
    }

    /// Creates an action reference.
    #[must_use]
    pub fn action(identity: &str) -> Self {
        Self::Action(fold_identity(identity))
    }

    /// Creates a variable operand.
    #[must_use]
    pub fn variable(name: &str) -> Self {
        Self::Variable(fold_identity(name))
    }

    /// Creates a reference to the element `identity` of `kind`.
    #[must_use]
    pub fn element(kind: ElementKind, identity: &str) -> Self {
        match kind {
            ElementKind::World => Self::world(),
            ElementKind::Player => Self::player(identity),
            ElementKind::Room => Self::room(identity),
            ElementKind::Object => Self::object(identity),
            ElementKind::Container => Self::container(identity),
        }
    }

    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::List(_) => ValueKind::List,
            Self::Object(_) => ValueKind::Object,
            Self::Player(_) => ValueKind::Player,
            Self::Room(_) => ValueKind::Room,
            Self::Container(_) => ValueKind::Container,
            Self::World(_) => ValueKind::World,
            Self::Action(_) => ValueKind::Action,
            Self::Variable(_) => ValueKind::Variable,
        }
    }

    /// Returns `true` for booleans, integers, floats and strings.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Boolean(_) | Self::Integer(_) | Self::Float(_) | Self::String(_)
        )
    }

    /// Returns `true` for integers and floats.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    /// Returns `true` for the NaN float.
    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Float(f) if f.is_nan())
    }

    /// Returns `true` if cloning this value shares state instead of copying it.
    #[must_use]
    pub fn is_reference_kind(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Returns the element kind if this value references an element.
    #[must_use]
    pub fn element_kind(&self) -> Option<ElementKind> {
        match self {
            Self::Object(_) => Some(ElementKind::Object),
            Self::Player(_) => Some(ElementKind::Player),
            Self::Room(_) => Some(ElementKind::Room),
            Self::Container(_) => Some(ElementKind::Container),
            Self::World(_) => Some(ElementKind::World),
            _ => None,
        }
    }

    /// Returns the identity carried by element, action and variable values.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Object(id)
            | Self::Player(id)
            | Self::Room(id)
            | Self::Container(id)
            | Self::World(id)
            | Self::Action(id)
            | Self::Variable(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the list handle if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// Converts to a boolean.
    #[must_use]
    pub fn as_boolean(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0 && !f.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::List(list) => !list.borrow().is_empty(),
            Self::Object(_)
            | Self::Player(_)
            | Self::Room(_)
            | Self::Container(_)
            | Self::World(_)
            | Self::Action(_)
            | Self::Variable(_) => true,
        }
    }

    /// Converts to an integer. Floats truncate toward zero and saturate; NaN becomes `0`.
    #[must_use]
    pub fn as_long(&self) -> i64 {
        match self {
            Self::Boolean(b) => i64::from(*b),
            Self::Integer(i) => *i,
            Self::Float(f) => *f as i64,
            Self::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .or_else(|_| s.parse::<f64>().map(|f| f as i64))
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Converts to a float. Strings that do not parse become NaN.
    #[must_use]
    pub fn as_double(&self) -> f64 {
        match self {
            Self::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Integer(i) => *i as f64,
            Self::Float(f) => *f,
            Self::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    /// Converts to a string.
    #[must_use]
    pub fn as_string(&self) -> String {
        self.to_string()
    }

    /// Returns the list length, string character count, or `1` for anything else.
    #[must_use]
    pub fn length(&self) -> usize {
        match self {
            Self::List(list) => list.borrow().len(),
            Self::String(s) => s.chars().count(),
            _ => 1,
        }
    }

    /// Strict equality: same kind and same payload. NaN is never equal to anything.
    ///
    /// Lists compare element by element. A pair of lists met again while already being compared
    /// further out counts as equal, so cyclic lists compare by shape.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self == other
    }

    /// Loose equality for literals: strings compare as text, everything else numerically.
    ///
    /// Lists, non-literals and NaN fall back to [`Value::equals`], so NaN stays unequal to
    /// itself here as well.
    #[must_use]
    pub fn equals_ignore_type(&self, other: &Self) -> bool {
        if !self.is_literal() || !other.is_literal() || self.is_nan() || other.is_nan() {
            return self.equals(other);
        }
        if matches!(self, Self::String(_)) || matches!(other, Self::String(_)) {
            return self.as_string() == other.as_string();
        }
        self.as_double() == other.as_double()
    }

    /// Orders two literals. Returns `None` for non-literals, lists and NaN.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        if !self.is_literal() || !other.is_literal() || self.is_nan() || other.is_nan() {
            return None;
        }
        if matches!(self, Self::String(_)) || matches!(other, Self::String(_)) {
            return Some(self.as_string().cmp(&other.as_string()));
        }
        self.as_double().partial_cmp(&other.as_double())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equal_guarded(self, other, &mut Vec::new())
    }
}

fn equal_guarded(
    a: &Value,
    b: &Value,
    open: &mut Vec<(*const ListCell, *const ListCell)>,
) -> bool {
    match (a, b) {
        (Value::List(x), Value::List(y)) => {
            let pair = (Rc::as_ptr(x), Rc::as_ptr(y));
            if open.contains(&pair) {
                return true;
            }
            let (xs, ys) = (x.borrow(), y.borrow());
            if xs.len() != ys.len() {
                return false;
            }
            open.push(pair);
            let equal = xs
                .iter()
                .zip(ys.iter())
                .all(|(p, q)| equal_guarded(p, q, open));
            open.pop();
            equal
        }
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::String(x), Value::String(y))
        | (Value::Object(x), Value::Object(y))
        | (Value::Player(x), Value::Player(y))
        | (Value::Room(x), Value::Room(y))
        | (Value::Container(x), Value::Container(y))
        | (Value::World(x), Value::World(y))
        | (Value::Action(x), Value::Action(y))
        | (Value::Variable(x), Value::Variable(y)) => x == y,
        _ => false,
    }
}

/// Formats a value, printing a list that is already being printed further out as `[...]`.
struct Guarded<'a> {
    value: &'a Value,
    open: &'a RefCell<Vec<*const ListCell>>,
}

impl Guarded<'_> {
    fn nested<'b>(&'b self, value: &'b Value) -> Guarded<'b> {
        Guarded {
            value,
            open: self.open,
        }
    }

    fn fmt_list(&self, list: &ListRef, f: &mut fmt::Formatter<'_>, debug: bool) -> fmt::Result {
        let ptr = Rc::as_ptr(list);
        if self.open.borrow().contains(&ptr) {
            return f.write_str("[...]");
        }
        self.open.borrow_mut().push(ptr);
        let result = self.fmt_items(&list.borrow(), f, debug);
        self.open.borrow_mut().pop();
        result
    }

    fn fmt_items(&self, items: &[Value], f: &mut fmt::Formatter<'_>, debug: bool) -> fmt::Result {
        if debug {
            return f
                .debug_list()
                .entries(items.iter().map(|v| self.nested(v)))
                .finish();
        }
        f.write_str("[")?;
        for (i, v) in items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            fmt::Display::fmt(&self.nested(v), f)?;
        }
        f.write_str("]")
    }
}

impl fmt::Display for Guarded<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => fmt_float(*v, f),
            Value::String(s) => f.write_str(s),
            Value::List(list) => self.fmt_list(list, f, false),
            Value::Object(id)
            | Value::Player(id)
            | Value::Room(id)
            | Value::Container(id)
            | Value::World(id)
            | Value::Action(id)
            | Value::Variable(id) => f.write_str(id),
        }
    }
}

impl fmt::Debug for Guarded<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.value {
            Value::Boolean(b) => return f.debug_tuple("Boolean").field(b).finish(),
            Value::Integer(i) => return f.debug_tuple("Integer").field(i).finish(),
            Value::Float(v) => return f.debug_tuple("Float").field(v).finish(),
            Value::List(list) => {
                f.write_str("List(")?;
                self.fmt_list(list, f, true)?;
                return f.write_str(")");
            }
            Value::String(_) => "String",
            Value::Object(_) => "Object",
            Value::Player(_) => "Player",
            Value::Room(_) => "Room",
            Value::Container(_) => "Container",
            Value::World(_) => "World",
            Value::Action(_) => "Action",
            Value::Variable(_) => "Variable",
        };
        let text = match self.value {
            Value::String(s) => s.as_str(),
            other => other.identity().unwrap_or_default(),
        };
        f.debug_tuple(name).field(&text).finish()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = RefCell::new(Vec::new());
        fmt::Display::fmt(&Guarded { value: self, open: &open }, f)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = RefCell::new(Vec::new());
        fmt::Debug::fmt(&Guarded { value: self, open: &open }, f)
    }
}

fn fmt_float(v: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if v.is_nan() {
        f.write_str("NaN")
    } else if v.is_infinite() {
        f.write_str(if v > 0.0 { "Infinity" } else { "-Infinity" })
    } else if v.fract() == 0.0 && v.abs() < 1e16 {
        write!(f, "{v:.1}")
    } else {
        write!(f, "{v}")
    }
}

// Nested lists contribute only their length, which equal lists always share.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Self::List(list) => {
                let items = list.borrow();
                items.len().hash(state);
                for v in items.iter() {
                    match v {
                        Self::List(inner) => {
                            v.kind().hash(state);
                            inner.borrow().len().hash(state);
                        }
                        _ => v.hash(state),
                    }
                }
            }
            _ => self.hash_scalar(state),
        }
    }
}

impl Value {
    fn hash_scalar<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Boolean(b) => b.hash(state),
            Self::Integer(i) => i.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::String(s) => s.hash(state),
            Self::List(_) => {}
            Self::Object(id)
            | Self::Player(id)
            | Self::Room(id)
            | Self::Container(id)
            | Self::World(id)
            | Self::Action(id)
            | Self::Variable(id) => id.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_zero_is_normalized() {
        let v = Value::float(-0.0);
        assert!(matches!(v, Value::Float(f) if f.is_sign_positive()));
    }

    #[test]
    fn lists_clone_by_reference() {
        let a = Value::list(vec![Value::Integer(1)]);
        let b = a.clone();
        a.as_list().unwrap().borrow_mut().push(Value::Integer(2));
        assert_eq!(b.length(), 2);
        assert!(a.is_reference_kind());
        assert!(!Value::string("x").is_reference_kind());
    }

    #[test]
    fn nan_is_never_equal() {
        let nan = Value::float(f64::NAN);
        assert!(!nan.equals(&nan));
        assert!(!nan.equals_ignore_type(&nan));
        assert_eq!(nan.compare(&Value::Integer(1)), None);
    }

    #[test]
    fn loose_equality_crosses_numeric_kinds() {
        assert!(Value::Integer(1).equals_ignore_type(&Value::float(1.0)));
        assert!(Value::Boolean(true).equals_ignore_type(&Value::Integer(1)));
        assert!(Value::string("1").equals_ignore_type(&Value::Integer(1)));
        assert!(!Value::Integer(1).equals(&Value::float(1.0)));
    }

    #[test]
    fn distinct_equal_lists_are_equal_but_not_shared() {
        let a = Value::list(vec![Value::Integer(1)]);
        let b = Value::list(vec![Value::Integer(1)]);
        assert!(a.equals(&b));
        assert!(!Rc::ptr_eq(a.as_list().unwrap(), b.as_list().unwrap()));
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::string(" 42 ").as_long(), 42);
        assert_eq!(Value::string("4.9").as_long(), 4);
        assert_eq!(Value::string("pear").as_long(), 0);
        assert!(Value::string("pear").as_double().is_nan());
        assert_eq!(Value::float(-3.7).as_long(), -3);
        assert_eq!(Value::float(f64::NAN).as_long(), 0);
        assert!(!Value::string("").as_boolean());
        assert!(Value::object("lamp").as_boolean());
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::float(3.0).as_string(), "3.0");
        assert_eq!(Value::float(0.5).as_string(), "0.5");
        assert_eq!(Value::float(f64::INFINITY).as_string(), "Infinity");
        assert_eq!(Value::float(f64::NAN).as_string(), "NaN");
        let l = Value::list(vec![Value::Integer(1), Value::string("a"), Value::Boolean(false)]);
        assert_eq!(l.as_string(), "[1, a, false]");
    }

    #[test]
    fn cyclic_lists_terminate() {
        use std::hash::DefaultHasher;

        let a = Value::new_list();
        a.as_list().unwrap().borrow_mut().push(a.clone());
        let b = Value::list(vec![Value::new_list()]);
        b.as_list().unwrap().borrow()[0]
            .as_list()
            .unwrap()
            .borrow_mut()
            .push(b.clone());

        assert_eq!(a.as_string(), "[[...]]");
        assert_eq!(b.as_string(), "[[[...]]]");
        assert_eq!(format!("{a:?}"), "List([List([...])])");
        assert!(a.equals(&b));
        assert!(!a.equals(&Value::list(vec![Value::Integer(1)])));

        let hash = |v: &Value| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&a), hash(&b));

        a.as_list().unwrap().borrow_mut().clear();
        b.as_list().unwrap().borrow_mut().clear();
    }

    #[test]
    fn identities_are_case_folded() {
        assert_eq!(Value::object("Lamp"), Value::object("lAMP"));
        assert_eq!(Value::object("Lamp").identity(), Some("lamp"));
    }

    #[test]
    fn ordering_of_literals() {
        assert_eq!(
            Value::string("apple").compare(&Value::string("banana")),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Integer(3).compare(&Value::float(2.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::new_list().compare(&Value::Integer(0)), None);
    }
}
