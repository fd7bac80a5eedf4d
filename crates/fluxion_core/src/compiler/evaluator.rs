use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use fluxion_error::{DbError, ErrorKind, Result};

use super::scope::Scope;
use super::semantic::{LogicalOperator, UnaryOperator};
use crate::values::time::{Duration, Time};
use crate::values::types::{FunctionSignature, Type};
use crate::values::{Array, Function, Object, Regexp, Value, wrong_kind};

/// A compiled, type-specialized node.
///
/// Each node produces exactly one kind of value, reported by `typ`. Only
/// the matching `eval_*` method may be called, every other one fails with
/// a `WrongKind` error.
pub trait Evaluator: Debug + Sync + Send {
    fn typ(&self) -> &Type;

    fn eval_bool(&self, _scope: &mut Scope) -> Result<bool> {
        Err(wrong_kind(&Type::Bool, self.typ()))
    }

    fn eval_int(&self, _scope: &mut Scope) -> Result<i64> {
        Err(wrong_kind(&Type::Int, self.typ()))
    }

    fn eval_uint(&self, _scope: &mut Scope) -> Result<u64> {
        Err(wrong_kind(&Type::UInt, self.typ()))
    }

    fn eval_float(&self, _scope: &mut Scope) -> Result<f64> {
        Err(wrong_kind(&Type::Float, self.typ()))
    }

    fn eval_string(&self, _scope: &mut Scope) -> Result<String> {
        Err(wrong_kind(&Type::String, self.typ()))
    }

    fn eval_time(&self, _scope: &mut Scope) -> Result<Time> {
        Err(wrong_kind(&Type::Time, self.typ()))
    }

    fn eval_duration(&self, _scope: &mut Scope) -> Result<Duration> {
        Err(wrong_kind(&Type::Duration, self.typ()))
    }

    fn eval_regexp(&self, _scope: &mut Scope) -> Result<Regexp> {
        Err(wrong_kind(&Type::Regexp, self.typ()))
    }

    fn eval_array(&self, _scope: &mut Scope) -> Result<Array> {
        Err(wrong_kind(&Type::array(Type::Var(0)), self.typ()))
    }

    fn eval_object(&self, _scope: &mut Scope) -> Result<Object> {
        Err(wrong_kind(&Type::Object(Default::default()), self.typ()))
    }

    fn eval_function(&self, _scope: &mut Scope) -> Result<Arc<dyn Function>> {
        Err(DbError::new("Evaluator does not produce a function")
            .with_kind(ErrorKind::WrongKind)
            .with_field("got", self.typ()))
    }
}

/// Evaluate any evaluator into a dynamic value.
pub fn eval(e: &dyn Evaluator, scope: &mut Scope) -> Result<Value> {
    Ok(match e.typ() {
        Type::Bool => Value::Bool(e.eval_bool(scope)?),
        Type::Int => Value::Int(e.eval_int(scope)?),
        Type::UInt => Value::UInt(e.eval_uint(scope)?),
        Type::Float => Value::Float(e.eval_float(scope)?),
        Type::String => Value::String(e.eval_string(scope)?),
        Type::Time => Value::Time(e.eval_time(scope)?),
        Type::Duration => Value::Duration(e.eval_duration(scope)?),
        Type::Regexp => Value::Regexp(e.eval_regexp(scope)?),
        Type::Array(_) => Value::Array(e.eval_array(scope)?),
        Type::Object(_) => Value::Object(e.eval_object(scope)?),
        Type::Function(_) => Value::Function(e.eval_function(scope)?),
        Type::Var(_) => return Err(polymorphic_type(e.typ())),
    })
}

/// Ties a native Rust type to the value variant and the `eval_*` method
/// producing it.
pub trait Kind: Debug + Send + Sync + 'static {
    type Native: Debug + Clone + Send + Sync + 'static;

    fn from_value(v: &Value) -> Result<Self::Native>;

    fn into_value(v: Self::Native) -> Value;

    fn eval(e: &dyn Evaluator, scope: &mut Scope) -> Result<Self::Native>;
}

macro_rules! value_kind {
    ($name:ident, $native:ty, $variant:ident, $method:ident, $want:expr) => {
        #[derive(Debug)]
        pub struct $name;

        impl Kind for $name {
            type Native = $native;

            #[allow(clippy::clone_on_copy)]
            fn from_value(v: &Value) -> Result<$native> {
                match v {
                    Value::$variant(v) => Ok(v.clone()),
                    other => Err(wrong_kind(&$want, &other.typ())),
                }
            }

            fn into_value(v: $native) -> Value {
                Value::$variant(v)
            }

            fn eval(e: &dyn Evaluator, scope: &mut Scope) -> Result<$native> {
                e.$method(scope)
            }
        }
    };
}

value_kind!(BoolKind, bool, Bool, eval_bool, Type::Bool);
value_kind!(IntKind, i64, Int, eval_int, Type::Int);
value_kind!(UIntKind, u64, UInt, eval_uint, Type::UInt);
value_kind!(FloatKind, f64, Float, eval_float, Type::Float);
value_kind!(StringKind, String, String, eval_string, Type::String);
value_kind!(TimeKind, Time, Time, eval_time, Type::Time);
value_kind!(DurationKind, Duration, Duration, eval_duration, Type::Duration);
value_kind!(RegexpKind, Regexp, Regexp, eval_regexp, Type::Regexp);
value_kind!(ArrayKind, Array, Array, eval_array, Type::array(Type::Var(0)));
value_kind!(ObjectKind, Object, Object, eval_object, Type::Object(Default::default()));

#[derive(Debug)]
pub struct FunctionKind;

impl Kind for FunctionKind {
    type Native = Arc<dyn Function>;

    fn from_value(v: &Value) -> Result<Arc<dyn Function>> {
        v.try_as_function().cloned()
    }

    fn into_value(v: Arc<dyn Function>) -> Value {
        Value::Function(v)
    }

    fn eval(e: &dyn Evaluator, scope: &mut Scope) -> Result<Arc<dyn Function>> {
        e.eval_function(scope)
    }
}

pub(crate) fn polymorphic_type(typ: &Type) -> DbError {
    DbError::new("Cannot evaluate expression with polymorphic type")
        .with_kind(ErrorKind::TypeError)
        .with_field("type", typ)
}

/// Evaluate `$body` with `$k` bound to the kind of `$typ`.
macro_rules! with_kind {
    ($typ:expr, $k:ident => $body:expr) => {
        match $typ {
            $crate::values::types::Type::Bool => {
                type $k = $crate::compiler::evaluator::BoolKind;
                $body
            }
            $crate::values::types::Type::Int => {
                type $k = $crate::compiler::evaluator::IntKind;
                $body
            }
            $crate::values::types::Type::UInt => {
                type $k = $crate::compiler::evaluator::UIntKind;
                $body
            }
            $crate::values::types::Type::Float => {
                type $k = $crate::compiler::evaluator::FloatKind;
                $body
            }
            $crate::values::types::Type::String => {
                type $k = $crate::compiler::evaluator::StringKind;
                $body
            }
            $crate::values::types::Type::Time => {
                type $k = $crate::compiler::evaluator::TimeKind;
                $body
            }
            $crate::values::types::Type::Duration => {
                type $k = $crate::compiler::evaluator::DurationKind;
                $body
            }
            $crate::values::types::Type::Regexp => {
                type $k = $crate::compiler::evaluator::RegexpKind;
                $body
            }
            $crate::values::types::Type::Array(_) => {
                type $k = $crate::compiler::evaluator::ArrayKind;
                $body
            }
            $crate::values::types::Type::Object(_) => {
                type $k = $crate::compiler::evaluator::ObjectKind;
                $body
            }
            $crate::values::types::Type::Function(_) => {
                type $k = $crate::compiler::evaluator::FunctionKind;
                $body
            }
            other @ $crate::values::types::Type::Var(_) => {
                Err($crate::compiler::evaluator::polymorphic_type(other))
            }
        }
    };
}

pub(crate) use with_kind;

/// Implements `Evaluator` for every kind of a node generic over its output
/// kind. Each implementation provides only the matching `eval_*` method.
macro_rules! impl_typed_evaluator {
    ($name:ident $(, $g:ident)*) => {
        impl_typed_evaluator!(@one $name [$($g),*] BoolKind, eval_bool);
        impl_typed_evaluator!(@one $name [$($g),*] IntKind, eval_int);
        impl_typed_evaluator!(@one $name [$($g),*] UIntKind, eval_uint);
        impl_typed_evaluator!(@one $name [$($g),*] FloatKind, eval_float);
        impl_typed_evaluator!(@one $name [$($g),*] StringKind, eval_string);
        impl_typed_evaluator!(@one $name [$($g),*] TimeKind, eval_time);
        impl_typed_evaluator!(@one $name [$($g),*] DurationKind, eval_duration);
        impl_typed_evaluator!(@one $name [$($g),*] RegexpKind, eval_regexp);
        impl_typed_evaluator!(@one $name [$($g),*] ArrayKind, eval_array);
        impl_typed_evaluator!(@one $name [$($g),*] ObjectKind, eval_object);
        impl_typed_evaluator!(@one $name [$($g),*] FunctionKind, eval_function);
    };
    (@one $name:ident [$($g:ident),*] $kind:ident, $method:ident) => {
        impl<$($g: Kind),*> Evaluator for $name<$($g,)* $kind> {
            fn typ(&self) -> &Type {
                &self.typ
            }

            fn $method(&self, scope: &mut Scope) -> Result<<$kind as Kind>::Native> {
                self.eval_native(scope)
            }
        }
    };
}

#[derive(Debug)]
pub struct LiteralEvaluator<K: Kind> {
    typ: Type,
    value: K::Native,
}

impl<K: Kind> LiteralEvaluator<K> {
    fn eval_native(&self, _scope: &mut Scope) -> Result<K::Native> {
        Ok(self.value.clone())
    }
}

impl_typed_evaluator!(LiteralEvaluator);

/// Build a constant evaluator for `value`.
pub fn literal(value: Value) -> Result<Box<dyn Evaluator>> {
    let typ = value.typ();
    with_kind!(&typ, K => {
        let value = K::from_value(&value)?;
        Ok(Box::new(LiteralEvaluator::<K> { typ: typ.clone(), value }) as Box<dyn Evaluator>)
    })
}

#[derive(Debug)]
pub struct IdentifierEvaluator<K: Kind> {
    typ: Type,
    name: String,
    kind: PhantomData<K>,
}

impl<K: Kind> IdentifierEvaluator<K> {
    pub fn new(typ: Type, name: impl Into<String>) -> Self {
        IdentifierEvaluator {
            typ,
            name: name.into(),
            kind: PhantomData,
        }
    }

    fn eval_native(&self, scope: &mut Scope) -> Result<K::Native> {
        K::from_value(scope.lookup(&self.name)?)
    }
}

impl_typed_evaluator!(IdentifierEvaluator);

/// What a member access reads its object from.
#[derive(Debug)]
pub enum MemberBase {
    /// A variable holding an object, read in place.
    Identifier(String),
    Expr(Box<dyn Evaluator>),
}

#[derive(Debug)]
pub struct MemberEvaluator<K: Kind> {
    typ: Type,
    base: MemberBase,
    property: String,
    kind: PhantomData<K>,
}

impl<K: Kind> MemberEvaluator<K> {
    pub fn new(typ: Type, base: MemberBase, property: impl Into<String>) -> Self {
        MemberEvaluator {
            typ,
            base,
            property: property.into(),
            kind: PhantomData,
        }
    }

    fn eval_native(&self, scope: &mut Scope) -> Result<K::Native> {
        match &self.base {
            MemberBase::Identifier(name) => {
                let obj = scope.lookup(name)?.try_as_object()?;
                K::from_value(obj.try_get(&self.property)?)
            }
            MemberBase::Expr(object) => {
                let obj = object.eval_object(scope)?;
                K::from_value(obj.try_get(&self.property)?)
            }
        }
    }
}

impl_typed_evaluator!(MemberEvaluator);

#[derive(Debug)]
pub struct IndexEvaluator<K: Kind> {
    typ: Type,
    array: Box<dyn Evaluator>,
    index: Box<dyn Evaluator>,
    kind: PhantomData<K>,
}

impl<K: Kind> IndexEvaluator<K> {
    pub fn new(typ: Type, array: Box<dyn Evaluator>, index: Box<dyn Evaluator>) -> Self {
        IndexEvaluator {
            typ,
            array,
            index,
            kind: PhantomData,
        }
    }

    fn eval_native(&self, scope: &mut Scope) -> Result<K::Native> {
        let arr = self.array.eval_array(scope)?;
        let idx = self.index.eval_int(scope)?;
        K::from_value(arr.get(idx)?)
    }
}

impl_typed_evaluator!(IndexEvaluator);

pub type BinaryKernel<L, R, O> = Arc<
    dyn Fn(<L as Kind>::Native, <R as Kind>::Native) -> Result<<O as Kind>::Native> + Send + Sync,
>;

/// Applies a binary operation resolved for the operand kinds `L` and `R`.
pub struct BinaryEvaluator<L: Kind, R: Kind, O: Kind> {
    typ: Type,
    left: Box<dyn Evaluator>,
    right: Box<dyn Evaluator>,
    kernel: BinaryKernel<L, R, O>,
}

impl<L: Kind, R: Kind, O: Kind> BinaryEvaluator<L, R, O> {
    pub fn new(
        typ: Type,
        left: Box<dyn Evaluator>,
        right: Box<dyn Evaluator>,
        kernel: BinaryKernel<L, R, O>,
    ) -> Self {
        BinaryEvaluator {
            typ,
            left,
            right,
            kernel,
        }
    }

    fn eval_native(&self, scope: &mut Scope) -> Result<O::Native> {
        let l = L::eval(self.left.as_ref(), scope)?;
        let r = R::eval(self.right.as_ref(), scope)?;
        (self.kernel)(l, r)
    }
}

impl<L: Kind, R: Kind, O: Kind> Debug for BinaryEvaluator<L, R, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryEvaluator")
            .field("typ", &self.typ)
            .field("left", &self.left)
            .field("right", &self.right)
            .finish_non_exhaustive()
    }
}

impl_typed_evaluator!(BinaryEvaluator, L, R);

#[derive(Debug)]
pub struct ConditionalEvaluator<K: Kind> {
    typ: Type,
    test: Box<dyn Evaluator>,
    consequent: Box<dyn Evaluator>,
    alternate: Box<dyn Evaluator>,
    kind: PhantomData<K>,
}

impl<K: Kind> ConditionalEvaluator<K> {
    pub fn new(
        typ: Type,
        test: Box<dyn Evaluator>,
        consequent: Box<dyn Evaluator>,
        alternate: Box<dyn Evaluator>,
    ) -> Self {
        ConditionalEvaluator {
            typ,
            test,
            consequent,
            alternate,
            kind: PhantomData,
        }
    }

    fn eval_native(&self, scope: &mut Scope) -> Result<K::Native> {
        if self.test.eval_bool(scope)? {
            K::eval(self.consequent.as_ref(), scope)
        } else {
            K::eval(self.alternate.as_ref(), scope)
        }
    }
}

impl_typed_evaluator!(ConditionalEvaluator);

#[derive(Debug)]
pub struct ArrayEvaluator {
    pub(crate) typ: Type,
    pub(crate) elem: Type,
    pub(crate) values: Vec<Box<dyn Evaluator>>,
}

impl Evaluator for ArrayEvaluator {
    fn typ(&self) -> &Type {
        &self.typ
    }

    fn eval_array(&self, scope: &mut Scope) -> Result<Array> {
        let values = self
            .values
            .iter()
            .map(|e| eval(e.as_ref(), scope))
            .collect::<Result<Vec<_>>>()?;
        Array::try_new(self.elem.clone(), values)
    }
}

#[derive(Debug)]
pub struct ObjectEvaluator {
    pub(crate) typ: Type,
    pub(crate) properties: Vec<(String, Box<dyn Evaluator>)>,
}

impl Evaluator for ObjectEvaluator {
    fn typ(&self) -> &Type {
        &self.typ
    }

    fn eval_object(&self, scope: &mut Scope) -> Result<Object> {
        let mut obj = Object::new();
        for (key, e) in &self.properties {
            obj.set(key.clone(), eval(e.as_ref(), scope)?);
        }
        Ok(obj)
    }
}

#[derive(Debug)]
pub struct LogicalEvaluator {
    pub(crate) typ: Type,
    pub(crate) op: LogicalOperator,
    pub(crate) left: Box<dyn Evaluator>,
    pub(crate) right: Box<dyn Evaluator>,
}

impl Evaluator for LogicalEvaluator {
    fn typ(&self) -> &Type {
        &self.typ
    }

    fn eval_bool(&self, scope: &mut Scope) -> Result<bool> {
        let l = self.left.eval_bool(scope)?;
        match self.op {
            LogicalOperator::And if !l => Ok(false),
            LogicalOperator::Or if l => Ok(true),
            _ => self.right.eval_bool(scope),
        }
    }
}

#[derive(Debug)]
pub struct UnaryEvaluator {
    pub(crate) typ: Type,
    pub(crate) op: UnaryOperator,
    pub(crate) argument: Box<dyn Evaluator>,
}

impl Evaluator for UnaryEvaluator {
    fn typ(&self) -> &Type {
        &self.typ
    }

    fn eval_bool(&self, scope: &mut Scope) -> Result<bool> {
        match self.op {
            UnaryOperator::Not => Ok(!self.argument.eval_bool(scope)?),
            UnaryOperator::Negate => Err(wrong_kind(&Type::Bool, self.typ())),
        }
    }

    fn eval_int(&self, scope: &mut Scope) -> Result<i64> {
        Ok(self.argument.eval_int(scope)?.wrapping_neg())
    }

    fn eval_float(&self, scope: &mut Scope) -> Result<f64> {
        Ok(-self.argument.eval_float(scope)?)
    }

    fn eval_duration(&self, scope: &mut Scope) -> Result<Duration> {
        Ok(Duration(self.argument.eval_duration(scope)?.0.wrapping_neg()))
    }
}

/// A statement evaluated for its effect on the scope.
#[derive(Debug)]
pub enum StatementEvaluator {
    /// Bind the value of an expression to a name.
    Declaration {
        name: String,
        init: Box<dyn Evaluator>,
    },
    /// Record the current scope for a named function declared here.
    FunctionDeclaration { name: String },
}

#[derive(Debug)]
pub struct BlockEvaluator<K: Kind> {
    typ: Type,
    statements: Vec<StatementEvaluator>,
    ret: Box<dyn Evaluator>,
    kind: PhantomData<K>,
}

impl<K: Kind> BlockEvaluator<K> {
    pub fn new(statements: Vec<StatementEvaluator>, ret: Box<dyn Evaluator>) -> Self {
        BlockEvaluator {
            typ: ret.typ().clone(),
            statements,
            ret,
            kind: PhantomData,
        }
    }

    fn eval_native(&self, scope: &mut Scope) -> Result<K::Native> {
        for stmt in &self.statements {
            match stmt {
                StatementEvaluator::Declaration { name, init } => {
                    let v = eval(init.as_ref(), scope)?;
                    scope.set(name.clone(), v);
                }
                StatementEvaluator::FunctionDeclaration { name } => scope.capture(name.clone()),
            }
        }
        K::eval(self.ret.as_ref(), scope)
    }
}

impl_typed_evaluator!(BlockEvaluator);

/// A parameter of a compiled function.
#[derive(Debug, Clone)]
pub struct CompiledParam {
    pub key: String,
    pub typ: Type,
    pub default: Option<Arc<dyn Evaluator>>,
}

/// Bind call arguments into `scope`, evaluating defaults for parameters
/// that were not supplied.
pub(crate) fn bind_params(params: &[CompiledParam], args: &Object, scope: &mut Scope) -> Result<()> {
    for (key, _) in args.iter() {
        if !params.iter().any(|p| &p.key == key) {
            return Err(DbError::new("Unexpected argument")
                .with_kind(ErrorKind::TypeError)
                .with_field("argument", key));
        }
    }
    for param in params {
        match args.get(&param.key) {
            Some(v) => {
                let typ = v.typ();
                if typ != param.typ {
                    return Err(DbError::new("Argument has wrong type")
                        .with_kind(ErrorKind::TypeError)
                        .with_field("argument", &param.key)
                        .with_field("want", &param.typ)
                        .with_field("got", typ));
                }
                scope.set(param.key.clone(), v.clone());
            }
            None => match &param.default {
                Some(default) => {
                    let v = eval(default.as_ref(), scope)?;
                    scope.set(param.key.clone(), v);
                }
                None => {
                    return Err(DbError::new("Missing required argument")
                        .with_kind(ErrorKind::TypeError)
                        .with_field("argument", &param.key));
                }
            },
        }
    }
    Ok(())
}

/// Function value closing over a scope snapshot.
#[derive(Debug)]
pub struct Closure {
    signature: FunctionSignature,
    params: Vec<CompiledParam>,
    body: Arc<dyn Evaluator>,
    scope: Arc<Scope>,
}

impl Function for Closure {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn call(&self, args: &Object) -> Result<Value> {
        let mut scope = Scope::nested(self.scope.clone());
        bind_params(&self.params, args, &mut scope)?;
        eval(self.body.as_ref(), &mut scope)
    }
}

/// Produces a closure over the scope it is evaluated in.
#[derive(Debug)]
pub struct FunctionEvaluator {
    pub(crate) typ: Type,
    pub(crate) signature: FunctionSignature,
    pub(crate) params: Vec<CompiledParam>,
    pub(crate) body: Arc<dyn Evaluator>,
}

impl Evaluator for FunctionEvaluator {
    fn typ(&self) -> &Type {
        &self.typ
    }

    fn eval_function(&self, scope: &mut Scope) -> Result<Arc<dyn Function>> {
        Ok(Arc::new(Closure {
            signature: self.signature.clone(),
            params: self.params.clone(),
            body: self.body.clone(),
            scope: Arc::new(scope.clone()),
        }))
    }
}

/// Which scope a monomorphized function body runs in.
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// The snapshot taken when the named function was declared.
    Declared(String),
    /// The scope at the call site, for function literals called in place.
    CallSite,
}

#[derive(Debug)]
pub enum Callee {
    /// A function expression specialized for the argument types at this
    /// call site.
    Monomorphized {
        capture: CaptureSource,
        params: Vec<CompiledParam>,
        body: Arc<dyn Evaluator>,
    },
    /// A function value, called dynamically.
    Value(Box<dyn Evaluator>),
}

#[derive(Debug)]
pub struct CallEvaluator<K: Kind> {
    typ: Type,
    callee: Callee,
    args: Vec<(String, Box<dyn Evaluator>)>,
    kind: PhantomData<K>,
}

impl<K: Kind> CallEvaluator<K> {
    pub fn new(typ: Type, callee: Callee, args: Vec<(String, Box<dyn Evaluator>)>) -> Self {
        CallEvaluator {
            typ,
            callee,
            args,
            kind: PhantomData,
        }
    }

    fn eval_native(&self, scope: &mut Scope) -> Result<K::Native> {
        let mut args = Object::new();
        for (key, e) in &self.args {
            args.set(key.clone(), eval(e.as_ref(), scope)?);
        }

        match &self.callee {
            Callee::Monomorphized {
                capture,
                params,
                body,
            } => {
                let base = match capture {
                    CaptureSource::Declared(name) => scope.captured(name)?,
                    CaptureSource::CallSite => Arc::new(scope.clone()),
                };
                let mut call_scope = Scope::nested(base);
                bind_params(params, &args, &mut call_scope)?;
                K::eval(body.as_ref(), &mut call_scope)
            }
            // Function values return a dynamic value.
            Callee::Value(callee) => {
                let f = callee.eval_function(scope)?;
                K::from_value(&f.call(&args)?)
            }
        }
    }
}

impl_typed_evaluator!(CallEvaluator);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_kind_is_error() {
        let lit = literal(Value::Int(4)).unwrap();
        let mut scope = Scope::new();
        assert_eq!(4, lit.eval_int(&mut scope).unwrap());
        let err = lit.eval_bool(&mut scope).unwrap_err();
        assert_eq!(ErrorKind::WrongKind, err.kind());
    }

    #[test]
    fn logical_short_circuit() {
        // Right side would fail if evaluated.
        let e = LogicalEvaluator {
            typ: Type::Bool,
            op: LogicalOperator::Or,
            left: literal(Value::Bool(true)).unwrap(),
            right: Box::new(IdentifierEvaluator::<BoolKind>::new(Type::Bool, "missing")),
        };
        assert!(e.eval_bool(&mut Scope::new()).unwrap());
    }

    #[test]
    fn member_of_identifier_reads_in_place() {
        let mut scope = Scope::new();
        let row: Object = [("_value", Value::Float(1.5)), ("host", Value::from("a"))]
            .into_iter()
            .collect();
        scope.set("r", Value::Object(row));

        let value =
            MemberEvaluator::<FloatKind>::new(Type::Float, MemberBase::Identifier("r".to_string()), "_value");
        assert_eq!(1.5, value.eval_float(&mut scope).unwrap());
        assert_eq!(ErrorKind::WrongKind, value.eval_int(&mut scope).unwrap_err().kind());

        // Declared float, holds a string.
        let host =
            MemberEvaluator::<FloatKind>::new(Type::Float, MemberBase::Identifier("r".to_string()), "host");
        assert_eq!(ErrorKind::WrongKind, host.eval_float(&mut scope).unwrap_err().kind());
    }

    #[test]
    fn conditional_selects_typed_branch() {
        let e = ConditionalEvaluator::<StringKind>::new(
            Type::String,
            literal(Value::Bool(false)).unwrap(),
            literal(Value::from("yes")).unwrap(),
            literal(Value::from("no")).unwrap(),
        );
        assert_eq!("no", e.eval_string(&mut Scope::new()).unwrap());
    }

    #[test]
    fn polymorphic_literal_rejected() {
        let typ = Type::Var(3);
        let res: Result<Box<dyn Evaluator>> = with_kind!(&typ, K => {
            Ok(Box::new(IdentifierEvaluator::<K>::new(typ.clone(), "x")) as Box<dyn Evaluator>)
        });
        assert_eq!(ErrorKind::TypeError, res.unwrap_err().kind());
    }

    #[test]
    fn bind_params_defaults() {
        let params = vec![
            CompiledParam {
                key: "a".to_string(),
                typ: Type::Int,
                default: None,
            },
            CompiledParam {
                key: "b".to_string(),
                typ: Type::Int,
                default: Some(Arc::from(literal(Value::Int(7)).unwrap())),
            },
        ];
        let mut scope = Scope::new();
        let args: Object = [("a", Value::Int(1))].into_iter().collect();
        bind_params(&params, &args, &mut scope).unwrap();
        assert_eq!(&Value::Int(7), scope.lookup("b").unwrap());

        let args: Object = [("b", Value::Int(1))].into_iter().collect();
        bind_params(&params, &args, &mut Scope::new()).unwrap_err();

        let args: Object = [("a", Value::Float(1.0))].into_iter().collect();
        bind_params(&params, &args, &mut Scope::new()).unwrap_err();
    }
}
