// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arithmetic, logical and comparison operators.
//!
//! Operators never fail. Operands that an operator cannot make sense of produce a NaN float, and
//! division by zero produces NaN or a signed infinity instead of trapping. Scripts rely on this,
//! so each rule below is part of the engine's observable behavior.

use core::cmp::Ordering;

use crate::value::Value;

/// Static description of an operator, used by expression compilers to build blocks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OperatorDescriptor {
    /// Source symbol.
    pub symbol: &'static str,
    /// Upper-case name.
    pub name: &'static str,
    /// `true` for two-operand operators.
    pub binary: bool,
    /// Binding strength; higher binds tighter.
    pub precedence: u8,
    /// `true` if the operator associates right-to-left.
    pub right_associative: bool,
}

const fn unary(symbol: &'static str, name: &'static str) -> OperatorDescriptor {
    OperatorDescriptor {
        symbol,
        name,
        binary: false,
        precedence: 20,
        right_associative: true,
    }
}

const fn binary(symbol: &'static str, name: &'static str, precedence: u8) -> OperatorDescriptor {
    OperatorDescriptor {
        symbol,
        name,
        binary: true,
        precedence,
        right_associative: false,
    }
}

/// An arithmetic operator. The discriminant is the operator's wire ordinal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArithmeticOperator {
    /// Unary `+`: absolute value.
    Absolute = 0,
    /// Unary `-`.
    Negate = 1,
    /// Unary `!`.
    LogicalNot = 2,
    /// Unary `~`: bitwise complement.
    Not = 3,
    /// `+`.
    Add = 4,
    /// `-`.
    Subtract = 5,
    /// `*`.
    Multiply = 6,
    /// `/`.
    Divide = 7,
    /// `%`.
    Modulo = 8,
    /// `**`.
    Power = 9,
    /// `&`.
    And = 10,
    /// `|`.
    Or = 11,
    /// `^`.
    Xor = 12,
    /// `<<`.
    LeftShift = 13,
    /// `>>`, sign-extending.
    RightShift = 14,
    /// `>>>`, zero-filling.
    RightShiftPadded = 15,
    /// `&&`.
    LogicalAnd = 16,
    /// `||`.
    LogicalOr = 17,
    /// `^^`.
    LogicalXor = 18,
    /// `==`.
    Equals = 19,
    /// `!=`.
    NotEquals = 20,
    /// `===`.
    StrictEquals = 21,
    /// `!==`.
    StrictNotEquals = 22,
    /// `<`.
    Less = 23,
    /// `<=`.
    LessOrEqual = 24,
    /// `>`.
    Greater = 25,
    /// `>=`.
    GreaterOrEqual = 26,
}

impl ArithmeticOperator {
    /// Every operator in ordinal order.
    pub const ALL: [Self; 27] = [
        Self::Absolute,
        Self::Negate,
        Self::LogicalNot,
        Self::Not,
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Modulo,
        Self::Power,
        Self::And,
        Self::Or,
        Self::Xor,
        Self::LeftShift,
        Self::RightShift,
        Self::RightShiftPadded,
        Self::LogicalAnd,
        Self::LogicalOr,
        Self::LogicalXor,
        Self::Equals,
        Self::NotEquals,
        Self::StrictEquals,
        Self::StrictNotEquals,
        Self::Less,
        Self::LessOrEqual,
        Self::Greater,
        Self::GreaterOrEqual,
    ];

    /// Returns the wire ordinal.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Looks up an operator by wire ordinal.
    #[must_use]
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Returns the descriptor for this operator.
    #[must_use]
    pub const fn descriptor(self) -> OperatorDescriptor {
        match self {
            Self::Absolute => unary("+", "ABSOLUTE"),
            Self::Negate => unary("-", "NEGATE"),
            Self::LogicalNot => unary("!", "LOGICAL_NOT"),
            Self::Not => unary("~", "NOT"),
            Self::Add => binary("+", "ADD", 15),
            Self::Subtract => binary("-", "SUBTRACT", 15),
            Self::Multiply => binary("*", "MULTIPLY", 16),
            Self::Divide => binary("/", "DIVIDE", 16),
            Self::Modulo => binary("%", "MODULO", 16),
            Self::Power => OperatorDescriptor {
                symbol: "**",
                name: "POWER",
                binary: true,
                precedence: 17,
                right_associative: true,
            },
            Self::And => binary("&", "AND", 9),
            Self::Or => binary("|", "OR", 7),
            Self::Xor => binary("^", "XOR", 8),
            Self::LeftShift => binary("<<", "LSHIFT", 14),
            Self::RightShift => binary(">>", "RSHIFT", 14),
            Self::RightShiftPadded => binary(">>>", "RSHIFTPAD", 14),
            Self::LogicalAnd => binary("&&", "LOGICAL_AND", 6),
            Self::LogicalOr => binary("||", "LOGICAL_OR", 4),
            Self::LogicalXor => binary("^^", "LOGICAL_XOR", 5),
            Self::Equals => binary("==", "EQUALS", 10),
            Self::NotEquals => binary("!=", "NOT_EQUALS", 10),
            Self::StrictEquals => binary("===", "STRICT_EQUALS", 10),
            Self::StrictNotEquals => binary("!==", "STRICT_NOT_EQUALS", 10),
            Self::Less => binary("<", "LESS", 12),
            Self::LessOrEqual => binary("<=", "LESS_OR_EQUAL", 12),
            Self::Greater => binary(">", "GREATER", 12),
            Self::GreaterOrEqual => binary(">=", "GREATER_OR_EQUAL", 12),
        }
    }

    /// Returns `true` if this operator takes two operands.
    #[must_use]
    pub const fn is_binary(self) -> bool {
        self.descriptor().binary
    }

    /// Applies a unary operator. Binary operators given one operand yield NaN.
    #[must_use]
    pub fn apply_unary(self, v: &Value) -> Value {
        match self {
            Self::Absolute => absolute(v),
            Self::Negate => negate(v),
            Self::LogicalNot => logical_not(v),
            Self::Not => not(v),
            _ => nan(),
        }
    }

    /// Applies a binary operator to `a` (left) and `b` (right).
    #[must_use]
    pub fn apply_binary(self, a: &Value, b: &Value) -> Value {
        match self {
            Self::Absolute | Self::Negate | Self::LogicalNot | Self::Not => nan(),
            Self::Add => add(a, b),
            Self::Subtract => subtract(a, b),
            Self::Multiply => multiply(a, b),
            Self::Divide => divide(a, b),
            Self::Modulo => modulo(a, b),
            Self::Power => power(a, b),
            Self::And => bitwise(a, b, |x, y| x & y, |x, y| x & y),
            Self::Or => bitwise(a, b, |x, y| x | y, |x, y| x | y),
            Self::Xor => bitwise(a, b, |x, y| x ^ y, |x, y| x ^ y),
            Self::LeftShift => shift(a, b, |x, n| x.wrapping_shl(n)),
            Self::RightShift => shift(a, b, |x, n| x.wrapping_shr(n)),
            Self::RightShiftPadded => shift(a, b, |x, n| (x as u64).wrapping_shr(n) as i64),
            Self::LogicalAnd => logical(a, b, |x, y| x && y),
            Self::LogicalOr => logical(a, b, |x, y| x || y),
            Self::LogicalXor => logical(a, b, |x, y| x ^ y),
            Self::Equals => Value::Boolean(a.equals_ignore_type(b)),
            Self::NotEquals => Value::Boolean(!a.equals_ignore_type(b)),
            Self::StrictEquals => Value::Boolean(a.equals(b)),
            Self::StrictNotEquals => Value::Boolean(!a.equals(b)),
            Self::Less => ordered(a, b, Ordering::is_lt),
            Self::LessOrEqual => ordered(a, b, Ordering::is_le),
            Self::Greater => ordered(a, b, Ordering::is_gt),
            Self::GreaterOrEqual => ordered(a, b, Ordering::is_ge),
        }
    }
}

fn nan() -> Value {
    Value::Float(f64::NAN)
}

fn both_bool(a: &Value, b: &Value) -> Option<(bool, bool)> {
    match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => Some((*x, *y)),
        _ => None,
    }
}

fn both_int(a: &Value, b: &Value) -> Option<(i64, i64)> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some((*x, *y)),
        _ => None,
    }
}

/// Absolute value of a literal.
#[must_use]
pub fn absolute(v: &Value) -> Value {
    match v {
        Value::Integer(i) => Value::Integer(i.wrapping_abs()),
        v if v.is_literal() => Value::float(v.as_double().abs()),
        _ => nan(),
    }
}

/// Arithmetic negation; booleans are inverted.
#[must_use]
pub fn negate(v: &Value) -> Value {
    match v {
        Value::Boolean(b) => Value::Boolean(!b),
        Value::Integer(i) => Value::Integer(i.wrapping_neg()),
        v if v.is_literal() => Value::float(-v.as_double()),
        _ => nan(),
    }
}

/// Logical negation of a literal.
#[must_use]
pub fn logical_not(v: &Value) -> Value {
    if v.is_literal() {
        Value::Boolean(!v.as_boolean())
    } else {
        nan()
    }
}

/// Bitwise complement; booleans are inverted.
#[must_use]
pub fn not(v: &Value) -> Value {
    match v {
        Value::Boolean(b) => Value::Boolean(!b),
        v if v.is_literal() => Value::Integer(!v.as_long()),
        _ => nan(),
    }
}

/// Addition. Two booleans combine with *or*; any string makes this a concatenation.
#[must_use]
pub fn add(a: &Value, b: &Value) -> Value {
    if let Some((x, y)) = both_bool(a, b) {
        return Value::Boolean(x || y);
    }
    if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
        let mut s = a.as_string();
        s.push_str(&b.as_string());
        return Value::String(s);
    }
    if !a.is_literal() || !b.is_literal() {
        return nan();
    }
    match both_int(a, b) {
        Some((x, y)) => Value::Integer(x.wrapping_add(y)),
        None => Value::float(a.as_double() + b.as_double()),
    }
}

/// Subtraction. Two booleans combine with *and-not*.
#[must_use]
pub fn subtract(a: &Value, b: &Value) -> Value {
    if let Some((x, y)) = both_bool(a, b) {
        return Value::Boolean(x && !y);
    }
    if !a.is_literal() || !b.is_literal() {
        return nan();
    }
    match both_int(a, b) {
        Some((x, y)) => Value::Integer(x.wrapping_sub(y)),
        None => Value::float(a.as_double() - b.as_double()),
    }
}

/// Multiplication. Two booleans combine with *and*.
#[must_use]
pub fn multiply(a: &Value, b: &Value) -> Value {
    if let Some((x, y)) = both_bool(a, b) {
        return Value::Boolean(x && y);
    }
    if !a.is_literal() || !b.is_literal() {
        return nan();
    }
    match both_int(a, b) {
        Some((x, y)) => Value::Integer(x.wrapping_mul(y)),
        None => Value::float(a.as_double() * b.as_double()),
    }
}

fn divide_by_zero(dividend: f64) -> Value {
    if dividend == 0.0 || dividend.is_nan() {
        nan()
    } else if dividend > 0.0 {
        Value::Float(f64::INFINITY)
    } else {
        Value::Float(f64::NEG_INFINITY)
    }
}

/// Division. Integer division by zero yields NaN for `0 / 0` and a signed infinity otherwise.
#[must_use]
pub fn divide(a: &Value, b: &Value) -> Value {
    if !a.is_literal() || !b.is_literal() {
        return nan();
    }
    match both_int(a, b) {
        Some((x, 0)) => divide_by_zero(x as f64),
        Some((x, y)) => Value::Integer(x.wrapping_div(y)),
        None => {
            let y = b.as_double();
            if y == 0.0 {
                divide_by_zero(a.as_double())
            } else {
                Value::float(a.as_double() / y)
            }
        }
    }
}

/// Remainder, with the sign of the dividend. A zero divisor behaves like [`divide`].
#[must_use]
pub fn modulo(a: &Value, b: &Value) -> Value {
    if !a.is_literal() || !b.is_literal() {
        return nan();
    }
    match both_int(a, b) {
        Some((x, 0)) => divide_by_zero(x as f64),
        Some((x, y)) => Value::Integer(x.wrapping_rem(y)),
        None => {
            let y = b.as_double();
            if y == 0.0 {
                divide_by_zero(a.as_double())
            } else {
                Value::float(a.as_double() % y)
            }
        }
    }
}

/// Exponentiation. Integer base and non-negative integer exponent stay integral (saturating).
#[must_use]
pub fn power(a: &Value, b: &Value) -> Value {
    if !a.is_literal() || !b.is_literal() {
        return nan();
    }
    let p = || a.as_double().powf(b.as_double());
    match both_int(a, b) {
        // Exact while it fits; saturates through the float result past that.
        Some((x, y)) if y >= 0 => u32::try_from(y)
            .ok()
            .and_then(|e| x.checked_pow(e))
            .map_or_else(|| Value::Integer(p() as i64), Value::Integer),
        _ => Value::float(p()),
    }
}

fn bitwise(
    a: &Value,
    b: &Value,
    on_bool: fn(bool, bool) -> bool,
    on_int: fn(i64, i64) -> i64,
) -> Value {
    if let Some((x, y)) = both_bool(a, b) {
        return Value::Boolean(on_bool(x, y));
    }
    if !a.is_literal() || !b.is_literal() {
        return nan();
    }
    Value::Integer(on_int(a.as_long(), b.as_long()))
}

fn shift(a: &Value, b: &Value, op: fn(i64, u32) -> i64) -> Value {
    if !a.is_literal() || !b.is_literal() {
        return nan();
    }
    // Shift distances use the low six bits, as on the hardware.
    let n = (b.as_long() & 0x3f) as u32;
    Value::Integer(op(a.as_long(), n))
}

fn logical(a: &Value, b: &Value, op: fn(bool, bool) -> bool) -> Value {
    if !a.is_literal() || !b.is_literal() {
        return nan();
    }
    Value::Boolean(op(a.as_boolean(), b.as_boolean()))
}

fn ordered(a: &Value, b: &Value, test: fn(Ordering) -> bool) -> Value {
    Value::Boolean(a.compare(b).is_some_and(test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ArithmeticOperator as Op;

    fn float_of(v: &Value) -> f64 {
        match v {
            Value::Float(f) => *f,
            other => panic!("expected a float, got {other:?}"),
        }
    }

    #[test]
    fn ordinals_round_trip_through_the_table() {
        for (i, op) in Op::ALL.iter().enumerate() {
            assert_eq!(usize::from(op.ordinal()), i);
            assert_eq!(Op::from_ordinal(i as i64), Some(*op));
        }
        assert_eq!(Op::from_ordinal(27), None);
        assert_eq!(Op::from_ordinal(-1), None);
    }

    #[test]
    fn integer_pairs_stay_integral() {
        assert_eq!(add(&Value::Integer(2), &Value::Integer(3)), Value::Integer(5));
        assert_eq!(
            multiply(&Value::Integer(i64::MAX), &Value::Integer(2)),
            Value::Integer(-2)
        );
        assert_eq!(divide(&Value::Integer(7), &Value::Integer(2)), Value::Integer(3));
        assert_eq!(modulo(&Value::Integer(-7), &Value::Integer(3)), Value::Integer(-1));
    }

    #[test]
    fn floats_promote() {
        assert_eq!(add(&Value::float(1.5), &Value::Integer(1)), Value::float(2.5));
        assert_eq!(add(&Value::Integer(1), &Value::Boolean(true)), Value::float(2.0));
    }

    #[test]
    fn strings_concatenate() {
        assert_eq!(
            add(&Value::string("n="), &Value::Integer(4)),
            Value::string("n=4")
        );
        assert_eq!(
            add(&Value::float(1.0), &Value::string("!")),
            Value::string("1.0!")
        );
    }

    #[test]
    fn boolean_pairs_are_logical() {
        let t = Value::Boolean(true);
        let f = Value::Boolean(false);
        assert_eq!(add(&t, &f), t);
        assert_eq!(subtract(&t, &t), f);
        assert_eq!(subtract(&t, &f), t);
        assert_eq!(multiply(&t, &f), f);
        assert_eq!(Op::Xor.apply_binary(&t, &t), f);
    }

    #[test]
    fn division_by_zero_does_not_trap() {
        assert!(divide(&Value::Integer(0), &Value::Integer(0)).is_nan());
        assert_eq!(
            float_of(&divide(&Value::Integer(5), &Value::Integer(0))),
            f64::INFINITY
        );
        assert_eq!(
            float_of(&divide(&Value::Integer(-5), &Value::Integer(0))),
            f64::NEG_INFINITY
        );
        assert!(modulo(&Value::float(0.0), &Value::float(0.0)).is_nan());
        assert_eq!(
            float_of(&divide(&Value::float(1.0), &Value::float(0.0))),
            f64::INFINITY
        );
    }

    #[test]
    fn non_literals_produce_nan() {
        let obj = Value::object("lamp");
        assert!(negate(&obj).is_nan());
        assert!(absolute(&Value::new_list()).is_nan());
        assert!(subtract(&obj, &Value::Integer(1)).is_nan());
        assert!(Op::LogicalAnd.apply_binary(&obj, &Value::Boolean(true)).is_nan());
    }

    #[test]
    fn power_rules() {
        assert_eq!(power(&Value::Integer(2), &Value::Integer(10)), Value::Integer(1024));
        assert_eq!(power(&Value::Integer(2), &Value::Integer(-1)), Value::float(0.5));
        assert_eq!(
            power(&Value::Integer(10), &Value::Integer(40)),
            Value::Integer(i64::MAX)
        );
        assert_eq!(
            power(&Value::Integer(3), &Value::Integer(39)),
            Value::Integer(4_052_555_153_018_976_267)
        );
        assert_eq!(
            power(&Value::Integer(-2), &Value::Integer(63)),
            Value::Integer(i64::MIN)
        );
        assert_eq!(
            power(&Value::Integer(-10), &Value::Integer(41)),
            Value::Integer(i64::MIN)
        );
    }

    #[test]
    fn shifts() {
        assert_eq!(
            Op::LeftShift.apply_binary(&Value::Integer(1), &Value::Integer(4)),
            Value::Integer(16)
        );
        assert_eq!(
            Op::RightShift.apply_binary(&Value::Integer(-16), &Value::Integer(2)),
            Value::Integer(-4)
        );
        assert_eq!(
            Op::RightShiftPadded.apply_binary(&Value::Integer(-1), &Value::Integer(60)),
            Value::Integer(15)
        );
    }

    #[test]
    fn comparisons() {
        let nan = Value::float(f64::NAN);
        assert_eq!(Op::Less.apply_binary(&Value::Integer(1), &Value::float(1.5)), Value::Boolean(true));
        assert_eq!(Op::GreaterOrEqual.apply_binary(&nan, &nan), Value::Boolean(false));
        assert_eq!(Op::Less.apply_binary(&nan, &Value::Integer(1)), Value::Boolean(false));
        assert_eq!(
            Op::Greater.apply_binary(&Value::object("a"), &Value::object("b")),
            Value::Boolean(false)
        );
        assert_eq!(Op::Equals.apply_binary(&nan, &nan), Value::Boolean(false));
        assert_eq!(Op::NotEquals.apply_binary(&nan, &nan), Value::Boolean(true));
        assert_eq!(
            Op::StrictEquals.apply_binary(&Value::Integer(1), &Value::float(1.0)),
            Value::Boolean(false)
        );
        assert_eq!(
            Op::Equals.apply_binary(&Value::Integer(1), &Value::float(1.0)),
            Value::Boolean(true)
        );
    }

    #[test]
    fn descriptors_carry_precedence() {
        assert!(Op::Multiply.descriptor().precedence > Op::Add.descriptor().precedence);
        assert!(Op::Power.descriptor().right_associative);
        assert!(!Op::Negate.is_binary());
        assert_eq!(Op::RightShiftPadded.descriptor().symbol, ">>>");
    }
}
