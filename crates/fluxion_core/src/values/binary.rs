use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, LazyLock};

use fluxion_error::{DbError, Result};
use hashbrown::HashMap;

use super::time::{Duration, Time};
use super::types::Type;
use super::{Regexp, Value};
use crate::compiler::evaluator::{
    BinaryEvaluator, BinaryKernel, BoolKind, DurationKind, Evaluator, FloatKind, IntKind, Kind,
    RegexpKind, StringKind, TimeKind, UIntKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    RegexMatch,
    NotRegexMatch,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::RegexMatch => "=~",
            Self::NotRegexMatch => "!~",
        };
        write!(f, "{s}")
    }
}

pub type BinaryFn = Arc<dyn Fn(&Value, &Value) -> Result<Value> + Send + Sync>;

type BuildFn =
    Arc<dyn Fn(Box<dyn Evaluator>, Box<dyn Evaluator>) -> Box<dyn Evaluator> + Send + Sync>;

/// A resolved binary operation for a concrete pair of operand types.
///
/// The operation is defined once over native operand types. `func` applies
/// it to dynamic values, `evaluator` builds a node reading both operands
/// through their typed `eval_*` methods.
#[derive(Clone)]
pub struct BinaryFunction {
    pub return_type: ReturnType,
    pub func: BinaryFn,
    build: BuildFn,
}

impl BinaryFunction {
    pub fn evaluator(&self, left: Box<dyn Evaluator>, right: Box<dyn Evaluator>) -> Box<dyn Evaluator> {
        (self.build)(left, right)
    }
}

impl fmt::Debug for BinaryFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryFunction")
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

fn binary<L, R, O, F>(return_type: ReturnType, kernel: F) -> BinaryFunction
where
    L: Kind,
    R: Kind,
    O: Kind,
    F: Fn(L::Native, R::Native) -> Result<O::Native> + Send + Sync + 'static,
    BinaryEvaluator<L, R, O>: Evaluator,
{
    let kernel: BinaryKernel<L, R, O> = Arc::new(kernel);
    let dynamic = kernel.clone();
    BinaryFunction {
        return_type,
        func: Arc::new(move |l: &Value, r: &Value| {
            let out = dynamic(L::from_value(l)?, R::from_value(r)?)?;
            Ok(O::into_value(out))
        }),
        build: Arc::new(
            move |left: Box<dyn Evaluator>, right: Box<dyn Evaluator>| -> Box<dyn Evaluator> {
                Box::new(BinaryEvaluator::<L, R, O>::new(
                    return_type.as_type(),
                    left,
                    right,
                    kernel.clone(),
                ))
            },
        ),
    }
}

/// Binary operators only ever return scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Bool,
    Int,
    UInt,
    Float,
    String,
    Time,
    Duration,
}

impl ReturnType {
    pub fn as_type(&self) -> Type {
        match self {
            Self::Bool => Type::Bool,
            Self::Int => Type::Int,
            Self::UInt => Type::UInt,
            Self::Float => Type::Float,
            Self::String => Type::String,
            Self::Time => Type::Time,
            Self::Duration => Type::Duration,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct BinaryKey {
    op: Operator,
    left: Type,
    right: Type,
}

static BINARY_FUNCTIONS: LazyLock<HashMap<BinaryKey, BinaryFunction>> =
    LazyLock::new(build_binary_functions);

/// Look up the implementation of `op` for the given operand types.
pub fn lookup_binary(op: Operator, left: &Type, right: &Type) -> Option<BinaryFunction> {
    BINARY_FUNCTIONS
        .get(&BinaryKey {
            op,
            left: left.clone(),
            right: right.clone(),
        })
        .cloned()
}

fn insert(
    m: &mut HashMap<BinaryKey, BinaryFunction>,
    op: Operator,
    left: Type,
    right: Type,
    func: BinaryFunction,
) {
    m.insert(BinaryKey { op, left, right }, func);
}

macro_rules! arith {
    ($m:ident, $variant:ident, $kind:ident, $op:ident, $f:expr) => {
        insert(
            &mut $m,
            Operator::$op,
            Type::$variant,
            Type::$variant,
            binary::<$kind, $kind, $kind, _>(ReturnType::$variant, $f),
        );
    };
}

macro_rules! compare {
    ($m:ident, $left:ident, $lkind:ident, $right:ident, $rkind:ident, $cmp:expr) => {
        for op in [
            Operator::Eq,
            Operator::NotEq,
            Operator::Lt,
            Operator::LtEq,
            Operator::Gt,
            Operator::GtEq,
        ] {
            insert(
                &mut $m,
                op,
                Type::$left,
                Type::$right,
                binary::<$lkind, $rkind, BoolKind, _>(ReturnType::Bool, move |a, b| {
                    let ord: Option<Ordering> = ($cmp)(&a, &b);
                    Ok(ordering_satisfies(op, ord))
                }),
            );
        }
    };
}

fn build_binary_functions() -> HashMap<BinaryKey, BinaryFunction> {
    let mut m = HashMap::new();

    arith!(m, Int, IntKind, Add, |l: i64, r: i64| Ok(l.wrapping_add(r)));
    arith!(m, Int, IntKind, Sub, |l: i64, r: i64| Ok(l.wrapping_sub(r)));
    arith!(m, Int, IntKind, Mul, |l: i64, r: i64| Ok(l.wrapping_mul(r)));
    arith!(m, Int, IntKind, Div, |l: i64, r: i64| l
        .checked_div(r)
        .ok_or_else(division_by_zero));
    arith!(m, Int, IntKind, Mod, |l: i64, r: i64| l
        .checked_rem(r)
        .ok_or_else(division_by_zero));

    arith!(m, UInt, UIntKind, Add, |l: u64, r: u64| Ok(l.wrapping_add(r)));
    arith!(m, UInt, UIntKind, Sub, |l: u64, r: u64| Ok(l.wrapping_sub(r)));
    arith!(m, UInt, UIntKind, Mul, |l: u64, r: u64| Ok(l.wrapping_mul(r)));
    arith!(m, UInt, UIntKind, Div, |l: u64, r: u64| l
        .checked_div(r)
        .ok_or_else(division_by_zero));
    arith!(m, UInt, UIntKind, Mod, |l: u64, r: u64| l
        .checked_rem(r)
        .ok_or_else(division_by_zero));

    arith!(m, Float, FloatKind, Add, |l: f64, r: f64| Ok(l + r));
    arith!(m, Float, FloatKind, Sub, |l: f64, r: f64| Ok(l - r));
    arith!(m, Float, FloatKind, Mul, |l: f64, r: f64| Ok(l * r));
    arith!(m, Float, FloatKind, Div, |l: f64, r: f64| Ok(l / r));
    arith!(m, Float, FloatKind, Mod, |l: f64, r: f64| Ok(l % r));

    arith!(m, Duration, DurationKind, Add, |l: Duration, r: Duration| Ok(l + r));
    arith!(m, Duration, DurationKind, Sub, |l: Duration, r: Duration| Ok(l - r));

    insert(
        &mut m,
        Operator::Add,
        Type::String,
        Type::String,
        binary::<StringKind, StringKind, StringKind, _>(ReturnType::String, |a: String, b: String| {
            Ok(a + &b)
        }),
    );
    insert(
        &mut m,
        Operator::Add,
        Type::Time,
        Type::Duration,
        binary::<TimeKind, DurationKind, TimeKind, _>(ReturnType::Time, |t: Time, d: Duration| {
            Ok(t + d)
        }),
    );
    insert(
        &mut m,
        Operator::Sub,
        Type::Time,
        Type::Duration,
        binary::<TimeKind, DurationKind, TimeKind, _>(ReturnType::Time, |t: Time, d: Duration| {
            Ok(t - d)
        }),
    );
    insert(
        &mut m,
        Operator::Sub,
        Type::Time,
        Type::Time,
        binary::<TimeKind, TimeKind, DurationKind, _>(ReturnType::Duration, |a: Time, b: Time| {
            Ok(a - b)
        }),
    );

    compare!(m, Int, IntKind, Int, IntKind, |a: &i64, b: &i64| Some(a.cmp(b)));
    compare!(m, UInt, UIntKind, UInt, UIntKind, |a: &u64, b: &u64| Some(a.cmp(b)));
    compare!(m, Float, FloatKind, Float, FloatKind, |a: &f64, b: &f64| a.partial_cmp(b));
    compare!(m, Int, IntKind, UInt, UIntKind, |a: &i64, b: &u64| Some(int_uint_cmp(*a, *b)));
    compare!(m, UInt, UIntKind, Int, IntKind, |a: &u64, b: &i64| Some(
        int_uint_cmp(*b, *a).reverse()
    ));
    compare!(m, Int, IntKind, Float, FloatKind, |a: &i64, b: &f64| (*a as f64).partial_cmp(b));
    compare!(m, Float, FloatKind, Int, IntKind, |a: &f64, b: &i64| a.partial_cmp(&(*b as f64)));
    compare!(m, UInt, UIntKind, Float, FloatKind, |a: &u64, b: &f64| (*a as f64).partial_cmp(b));
    compare!(m, Float, FloatKind, UInt, UIntKind, |a: &f64, b: &u64| a.partial_cmp(&(*b as f64)));
    compare!(m, String, StringKind, String, StringKind, |a: &String, b: &String| Some(a.cmp(b)));
    compare!(m, Time, TimeKind, Time, TimeKind, |a: &Time, b: &Time| Some(a.cmp(b)));
    compare!(m, Duration, DurationKind, Duration, DurationKind, |a: &Duration, b: &Duration| {
        Some(a.cmp(b))
    });
    compare!(m, Bool, BoolKind, Bool, BoolKind, |a: &bool, b: &bool| Some(a.cmp(b)));

    for (op, negate) in [
        (Operator::RegexMatch, false),
        (Operator::NotRegexMatch, true),
    ] {
        insert(
            &mut m,
            op,
            Type::String,
            Type::Regexp,
            binary::<StringKind, RegexpKind, BoolKind, _>(
                ReturnType::Bool,
                move |s: String, re: Regexp| Ok(re.is_match(&s) != negate),
            ),
        );
    }

    m
}

/// An absent ordering means the operands are incomparable (NaN), which only
/// satisfies `!=`.
fn ordering_satisfies(op: Operator, ord: Option<Ordering>) -> bool {
    match (op, ord) {
        (Operator::NotEq, None) => true,
        (_, None) => false,
        (Operator::Eq, Some(o)) => o == Ordering::Equal,
        (Operator::NotEq, Some(o)) => o != Ordering::Equal,
        (Operator::Lt, Some(o)) => o == Ordering::Less,
        (Operator::LtEq, Some(o)) => o != Ordering::Greater,
        (Operator::Gt, Some(o)) => o == Ordering::Greater,
        (Operator::GtEq, Some(o)) => o != Ordering::Less,
        _ => false,
    }
}

fn int_uint_cmp(l: i64, r: u64) -> Ordering {
    if l < 0 {
        Ordering::Less
    } else {
        (l as u64).cmp(&r)
    }
}

fn division_by_zero() -> DbError {
    DbError::new("Division by zero")
}
