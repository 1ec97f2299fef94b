// (C) 2020 Brandon Lewis
//
// The value model.
//
// A Value is either an immediate (nil, int, float, bool), an immutable
// refcounted string, or a handle into the collector's object arena.
// Handles compare by identity; strings compare by contents; everything
// else compares structurally.
//
// Arithmetic, ordering, and logic all live here, so that the engine's
// dispatch table stays a thin layer over Value semantics.
//
// *Promotion*
//
// Binary arithmetic accepts any {int,float} pair and produces a float
// as soon as either operand is a float. There is no other coercion.
//
// *Ordering*
//
// Ordered comparison is defined on numbers (with promotion), on bools
// (false < true), and on strings -- which compare by byte LENGTH, not
// lexicographically. That last rule is deliberate minimal semantics:
// full lexical ordering is available through STRING_COMPARE. Any other
// operand pair compares as false rather than raising an error.

use std::rc::Rc;

use enumflags2::BitFlags;

use crate::error::{Error, Result};
use crate::heap::Heap;

// Index into the heap's object arena. The object header is directly
// addressable from the handle, which keeps marking O(live).
pub type Handle = usize;

#[derive(BitFlags, Copy, Clone, Debug, PartialEq)]
#[repr(u16)]
pub enum TypeTag {
    Nil      = 0b0000000001,
    Int      = 0b0000000010,
    Float    = 0b0000000100,
    Bool     = 0b0000001000,
    Str      = 0b0000010000,
    Array    = 0b0000100000,
    Map      = 0b0001000000,
    Record   = 0b0010000000,
    Function = 0b0100000000,
    Closure  = 0b1000000000,
}

pub type TypeSet = BitFlags<TypeTag>;

// All valid values.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Rc<str>),
    Array(Handle),
    Map(Handle),
    Record(Handle),
    Function(Handle),
    Closure(Handle),
}

// Construct an Error::TypeError from a value.
pub fn expected(expect: TypeSet, got: &Value) -> Error {
    Error::TypeError {
        expect,
        got: got.get_type(),
    }
}

// Construct an Error::TypeMismatch from a pair of values.
pub fn type_mismatch(a: &Value, b: &Value) -> Error {
    Error::TypeMismatch(a.get_type(), b.get_type())
}

// The heap handle behind a value, if it has one.
pub fn value_handle(v: &Value) -> Option<Handle> {
    match v {
        Value::Array(h)
        | Value::Map(h)
        | Value::Record(h)
        | Value::Function(h)
        | Value::Closure(h) => Some(*h),
        _ => None,
    }
}

// Factors out the boiler plate in the arithmetic methods: int pairs
// use the wrapping integer op, anything touching a float promotes.
macro_rules! arith {
    ($name:ident, $int:ident, $op:tt) => {
        pub fn $name(&self, other: &Value) -> Result<Value> {
            use Value::*;
            match (self, other) {
                (Int(a),   Int(b))   => Ok(Int(a.$int(*b))),
                (Int(a),   Float(b)) => Ok(Float((*a as f64) $op *b)),
                (Float(a), Int(b))   => Ok(Float(*a $op (*b as f64))),
                (Float(a), Float(b)) => Ok(Float(*a $op *b)),
                (a, b)               => Err(type_mismatch(a, b)),
            }
        }
    };
}

// Factors out the ordered comparisons. These never fail: a pair that
// has no defined ordering compares as false.
macro_rules! ordered {
    ($name:ident, $op:tt) => {
        pub fn $name(&self, other: &Value) -> Value {
            use Value::*;
            Bool(match (self, other) {
                (Int(a),   Int(b))   => a $op b,
                (Int(a),   Float(b)) => (*a as f64) $op *b,
                (Float(a), Int(b))   => *a $op (*b as f64),
                (Float(a), Float(b)) => a $op b,
                (Bool(a),  Bool(b))  => a $op b,
                (Str(a),   Str(b))   => a.len() $op b.len(),
                (_,        _)        => false,
            })
        }
    };
}

impl Value {
    pub fn get_type(&self) -> TypeTag {
        match self {
            Value::Nil => TypeTag::Nil,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Bool(_) => TypeTag::Bool,
            Value::Str(_) => TypeTag::Str,
            Value::Array(_) => TypeTag::Array,
            Value::Map(_) => TypeTag::Map,
            Value::Record(_) => TypeTag::Record,
            Value::Function(_) => TypeTag::Function,
            Value::Closure(_) => TypeTag::Closure,
        }
    }

    // Truthiness. Arrays and maps are true when non-empty, which
    // requires a look through the handle; records, functions and
    // closures are always true.
    pub fn is_truthy(&self, heap: &Heap) -> bool {
        match self {
            Value::Nil => false,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Array(h) | Value::Map(h) => heap.container_len(*h).unwrap_or(0) > 0,
            Value::Record(_) | Value::Function(_) | Value::Closure(_) => true,
        }
    }

    arith! { add, wrapping_add, + }
    arith! { sub, wrapping_sub, - }
    arith! { mul, wrapping_mul, * }

    // Division checks the divisor before dividing. Integer division
    // truncates toward zero.
    pub fn div(&self, other: &Value) -> Result<Value> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => {
                if *b == 0 {
                    Err(Error::DivisionByZero)
                } else {
                    Ok(Int(a.wrapping_div(*b)))
                }
            }
            (Int(a), Float(b)) => {
                if *b == 0.0 {
                    Err(Error::DivisionByZero)
                } else {
                    Ok(Float((*a as f64) / *b))
                }
            }
            (Float(a), Int(b)) => {
                if *b == 0 {
                    Err(Error::DivisionByZero)
                } else {
                    Ok(Float(*a / (*b as f64)))
                }
            }
            (Float(a), Float(b)) => {
                if *b == 0.0 {
                    Err(Error::DivisionByZero)
                } else {
                    Ok(Float(*a / *b))
                }
            }
            (a, b) => Err(type_mismatch(a, b)),
        }
    }

    // Mathematical modulo on int pairs only: the result is never
    // negative when the divisor is positive.
    pub fn rem(&self, other: &Value) -> Result<Value> {
        use Value::*;
        match (self, other) {
            (Int(_), Int(0)) => Err(Error::DivisionByZero),
            (Int(a), Int(b)) => Ok(Int(a.rem_euclid(*b))),
            (a, b) => Err(type_mismatch(a, b)),
        }
    }

    pub fn neg(&self) -> Result<Value> {
        use Value::*;
        match self {
            Int(a) => Ok(Int(a.wrapping_neg())),
            Float(a) => Ok(Float(-*a)),
            v => Err(expected(TypeTag::Int | TypeTag::Float, v)),
        }
    }

    ordered! { lt, < }
    ordered! { le, <= }
    ordered! { gt, > }
    ordered! { ge, >= }
}

// Like core::Into, except that it returns a Result, because the
// conversion is checked at runtime.
pub trait TryInto<T> {
    fn try_into(self) -> Result<T>;
}

// Factor out boilerplate for the implementation of TryInto.
macro_rules! impl_try_into {
    ($variant:ident => $type:ty) => {
        impl TryInto<$type> for Value {
            fn try_into(self) -> Result<$type> {
                match self {
                    Value::$variant(value) => Ok(value),
                    v => Err(expected(BitFlags::from_flag(TypeTag::$variant), &v)),
                }
            }
        }
    };
}

impl_try_into! { Int   => i64 }
impl_try_into! { Float => f64 }
impl_try_into! { Bool  => bool }
impl_try_into! { Str   => Rc<str> }
