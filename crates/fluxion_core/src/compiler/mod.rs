//! Compiles semantic function expressions into evaluator trees.
//!
//! Compilation is driven by a concrete input shape: every parameter gets
//! the type found in the shape (or the type of its default), and all
//! expressions below are lowered to evaluators specialized for their
//! resolved type. Named functions declared inside a body are compiled at
//! each call site for the argument types used there.

pub mod builtins;
pub mod evaluator;
pub mod scope;
pub mod semantic;
pub mod unify;

use std::collections::BTreeMap;
use std::sync::Arc;

use evaluator::{
    ArrayEvaluator, BlockEvaluator, CallEvaluator, Callee, CaptureSource, CompiledParam,
    ConditionalEvaluator, Evaluator, FunctionEvaluator, IdentifierEvaluator, IndexEvaluator,
    LogicalEvaluator, MemberBase, MemberEvaluator, ObjectEvaluator, StatementEvaluator,
    UnaryEvaluator, bind_params, literal, with_kind,
};
use fluxion_error::{DbError, ErrorKind, Result};
use hashbrown::HashMap;
use scope::Scope;
use semantic::{Expression, FunctionBody, FunctionExpression, Statement, UnaryOperator};
use tracing::trace;
use unify::{Substitution, type_error};

use crate::values::binary::lookup_binary;
use crate::values::types::{FunctionSignature, Type};
use crate::values::{Array, Object, Regexp, Value};

/// A function compiled for one input shape.
#[derive(Debug)]
pub struct CompiledFunction {
    signature: FunctionSignature,
    params: Vec<CompiledParam>,
    root: Arc<dyn Evaluator>,
    builtins: Arc<Scope>,
}

impl CompiledFunction {
    /// Type of the value the function returns.
    pub fn typ(&self) -> &Type {
        self.root.typ()
    }

    pub fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn scope_for(&self, input: &Object) -> Result<Scope> {
        let mut scope = Scope::nested(self.builtins.clone());
        bind_params(&self.params, input, &mut scope)?;
        Ok(scope)
    }

    pub fn eval(&self, input: &Object) -> Result<Value> {
        let mut scope = self.scope_for(input)?;
        evaluator::eval(self.root.as_ref(), &mut scope)
    }

    pub fn eval_bool(&self, input: &Object) -> Result<bool> {
        self.root.eval_bool(&mut self.scope_for(input)?)
    }

    pub fn eval_int(&self, input: &Object) -> Result<i64> {
        self.root.eval_int(&mut self.scope_for(input)?)
    }

    pub fn eval_uint(&self, input: &Object) -> Result<u64> {
        self.root.eval_uint(&mut self.scope_for(input)?)
    }

    pub fn eval_float(&self, input: &Object) -> Result<f64> {
        self.root.eval_float(&mut self.scope_for(input)?)
    }

    pub fn eval_string(&self, input: &Object) -> Result<String> {
        self.root.eval_string(&mut self.scope_for(input)?)
    }

    pub fn eval_object(&self, input: &Object) -> Result<Object> {
        self.root.eval_object(&mut self.scope_for(input)?)
    }
}

/// Compile a function for a concrete input shape.
///
/// `input` must be an object type with one property per supplied
/// parameter. `builtins` provides values visible to the function body.
pub fn compile(
    func: &FunctionExpression,
    input: &Type,
    builtins: Arc<Scope>,
) -> Result<CompiledFunction> {
    let props = match input {
        Type::Object(props) => props,
        other => {
            return Err(DbError::new("Function input must be an object type")
                .with_kind(ErrorKind::TypeError)
                .with_field("type", other));
        }
    };

    let mut compiler = Compiler {
        builtins: &builtins,
        subst: Substitution::new(),
    };
    let (params, root, signature) =
        compiler.compile_function(func, props, &TypeEnv::default())?;

    Ok(CompiledFunction {
        signature,
        params,
        root,
        builtins,
    })
}

/// Memoizes compilation of one function per input shape.
///
/// Failures are cached too, a shape that failed to compile fails again
/// without recompiling.
#[derive(Debug)]
pub struct CompilationCache {
    func: Arc<FunctionExpression>,
    builtins: Arc<Scope>,
    compiled: HashMap<Type, Result<Arc<CompiledFunction>>>,
}

impl CompilationCache {
    pub fn new(func: Arc<FunctionExpression>, builtins: Arc<Scope>) -> Self {
        CompilationCache {
            func,
            builtins,
            compiled: HashMap::new(),
        }
    }

    pub fn compile(&mut self, input: &Type) -> Result<Arc<CompiledFunction>> {
        if let Some(result) = self.compiled.get(input) {
            return result.clone();
        }
        trace!(%input, "compiling function for new input shape");
        let result = compile(&self.func, input, self.builtins.clone()).map(Arc::new);
        self.compiled.insert(input.clone(), result.clone());
        result
    }

    /// Number of distinct shapes compiled.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Binding {
    Value(Type),
    /// A named function expression, compiled at each call site within the
    /// type environment it was declared in.
    Function {
        expr: Arc<FunctionExpression>,
        env: TypeEnv,
    },
}

#[derive(Debug, Clone, Default)]
struct TypeEnv {
    bindings: HashMap<String, Binding>,
}

struct Compiler<'a> {
    builtins: &'a Scope,
    subst: Substitution,
}

fn unsupported(node: &str) -> DbError {
    DbError::new("Unsupported node")
        .with_kind(ErrorKind::UnsupportedNode)
        .with_field("node", node)
}

fn compile_type_error(msg: &str) -> DbError {
    DbError::new(msg).with_kind(ErrorKind::TypeError)
}

impl Compiler<'_> {
    /// Compile a function body for the given argument types.
    fn compile_function(
        &mut self,
        func: &FunctionExpression,
        args: &BTreeMap<String, Type>,
        env: &TypeEnv,
    ) -> Result<(Vec<CompiledParam>, Arc<dyn Evaluator>, FunctionSignature)> {
        for key in args.keys() {
            if !func.params.iter().any(|p| &p.key == key) {
                return Err(compile_type_error("Unexpected argument").with_field("argument", key));
            }
        }

        let mut local = env.clone();
        let mut params = Vec::with_capacity(func.params.len());
        let mut parameters = BTreeMap::new();
        let mut required = Vec::new();

        for param in &func.params {
            let default = match &param.default {
                Some(expr) => Some(self.compile_expr(expr, &local)?),
                None => None,
            };

            let typ = match (args.get(&param.key), &default) {
                (Some(arg), Some(default)) => {
                    self.subst.unify(arg, default.typ())?;
                    arg.clone()
                }
                (Some(arg), None) => arg.clone(),
                (None, Some(default)) => default.typ().clone(),
                (None, None) => {
                    return Err(compile_type_error("Missing required parameter")
                        .with_field("parameter", &param.key));
                }
            };

            if let Some(annotation) = &param.annotation {
                let annotation = self.subst.instantiate(annotation);
                self.subst.unify(&annotation, &typ)?;
            }
            let typ = self.subst.apply(&typ);

            if param.default.is_none() {
                required.push(param.key.clone());
            }
            parameters.insert(param.key.clone(), typ.clone());
            local
                .bindings
                .insert(param.key.clone(), Binding::Value(typ.clone()));
            params.push(CompiledParam {
                key: param.key.clone(),
                typ,
                default: default.map(Arc::from),
            });
        }

        let body: Arc<dyn Evaluator> = Arc::from(self.compile_body(&func.body, &mut local)?);
        let signature = FunctionSignature {
            parameters,
            required,
            return_type: body.typ().clone(),
        };
        Ok((params, body, signature))
    }

    fn compile_body(&mut self, body: &FunctionBody, env: &mut TypeEnv) -> Result<Box<dyn Evaluator>> {
        match body {
            FunctionBody::Expression(expr) => self.compile_expr(expr, env),
            FunctionBody::Block(stmts) => self.compile_block(stmts, env),
        }
    }

    fn compile_block(&mut self, stmts: &[Statement], env: &mut TypeEnv) -> Result<Box<dyn Evaluator>> {
        let mut statements = Vec::new();
        for (idx, stmt) in stmts.iter().enumerate() {
            match stmt {
                Statement::Variable {
                    name,
                    init: Expression::Function(func),
                } => {
                    let binding = Binding::Function {
                        expr: func.clone(),
                        env: env.clone(),
                    };
                    env.bindings.insert(name.clone(), binding);
                    statements.push(StatementEvaluator::FunctionDeclaration { name: name.clone() });
                }
                Statement::Variable { name, init } => {
                    let init = self.compile_expr(init, env)?;
                    env.bindings
                        .insert(name.clone(), Binding::Value(init.typ().clone()));
                    statements.push(StatementEvaluator::Declaration {
                        name: name.clone(),
                        init,
                    });
                }
                Statement::Expression(_) => {
                    return Err(DbError::new("Expression statement has no side effects")
                        .with_kind(ErrorKind::NoSideEffects)
                        .with_field("statement", idx));
                }
                Statement::Option { name, .. } => {
                    return Err(unsupported("option statement").with_field("option", name));
                }
                Statement::Return(expr) => {
                    if idx != stmts.len() - 1 {
                        return Err(unsupported("return before end of block"));
                    }
                    let ret = self.compile_expr(expr, env)?;
                    let typ = ret.typ().clone();
                    return with_kind!(&typ, K => {
                        Ok(Box::new(BlockEvaluator::<K>::new(statements, ret)) as Box<dyn Evaluator>)
                    });
                }
            }
        }
        Err(compile_type_error("Function block has no return statement"))
    }

    fn compile_expr(&mut self, expr: &Expression, env: &TypeEnv) -> Result<Box<dyn Evaluator>> {
        Ok(match expr {
            Expression::Bool(v) => literal(Value::Bool(*v))?,
            Expression::Int(v) => literal(Value::Int(*v))?,
            Expression::UInt(v) => literal(Value::UInt(*v))?,
            Expression::Float(v) => literal(Value::Float(*v))?,
            Expression::String(v) => literal(Value::String(v.clone()))?,
            Expression::Regexp(pattern) => literal(Value::Regexp(Regexp::new(pattern)?))?,
            Expression::DateTime(v) => literal(Value::Time(*v))?,
            Expression::Duration(v) => literal(Value::Duration(*v))?,
            Expression::Identifier(name) => self.compile_identifier(name, env)?,
            Expression::Member {
                object: object_expr,
                property,
            } => {
                let object = self.compile_expr(object_expr, env)?;
                let typ = match object.typ() {
                    Type::Object(props) => props.get(property).cloned().ok_or_else(|| {
                        compile_type_error("Object has no such property")
                            .with_field("property", property)
                            .with_field("type", object.typ())
                    })?,
                    other => {
                        return Err(compile_type_error("Member access on non-object")
                            .with_field("property", property)
                            .with_field("type", other));
                    }
                };
                let base = match object_expr.as_ref() {
                    Expression::Identifier(name) => MemberBase::Identifier(name.clone()),
                    _ => MemberBase::Expr(object),
                };
                with_kind!(&typ, K => {
                    Ok(Box::new(MemberEvaluator::<K>::new(typ.clone(), base, property.clone()))
                        as Box<dyn Evaluator>)
                })?
            }
            Expression::Index { array, index } => {
                let array = self.compile_expr(array, env)?;
                let index = self.compile_expr(index, env)?;
                let typ = match array.typ() {
                    Type::Array(elem) => elem.as_ref().clone(),
                    other => {
                        return Err(compile_type_error("Index access on non-array")
                            .with_field("type", other));
                    }
                };
                self.subst.unify(index.typ(), &Type::Int)?;
                with_kind!(&typ, K => {
                    Ok(Box::new(IndexEvaluator::<K>::new(typ.clone(), array, index))
                        as Box<dyn Evaluator>)
                })?
            }
            Expression::Array(elems) => {
                if elems.is_empty() {
                    return Err(compile_type_error("Cannot infer element type of empty array"));
                }
                let values = elems
                    .iter()
                    .map(|e| self.compile_expr(e, env))
                    .collect::<Result<Vec<_>>>()?;
                let elem = values[0].typ().clone();
                for v in &values[1..] {
                    self.subst.unify(&elem, v.typ())?;
                }
                Box::new(ArrayEvaluator {
                    typ: Type::array(elem.clone()),
                    elem,
                    values,
                })
            }
            Expression::Object(props) => {
                let mut types = BTreeMap::new();
                let mut properties: Vec<(String, Box<dyn Evaluator>)> = Vec::new();
                for prop in props {
                    let value = self.compile_expr(&prop.value, env)?;
                    types.insert(prop.key.clone(), value.typ().clone());
                    properties.retain(|(k, _)| k != &prop.key);
                    properties.push((prop.key.clone(), value));
                }
                Box::new(ObjectEvaluator {
                    typ: Type::Object(types),
                    properties,
                })
            }
            Expression::Unary { op, argument } => {
                let argument = self.compile_expr(argument, env)?;
                let typ = match (op, argument.typ()) {
                    (UnaryOperator::Not, Type::Bool) => Type::Bool,
                    (UnaryOperator::Negate, Type::Int) => Type::Int,
                    (UnaryOperator::Negate, Type::Float) => Type::Float,
                    (UnaryOperator::Negate, Type::Duration) => Type::Duration,
                    (_, other) => {
                        return Err(compile_type_error("Unsupported unary operand")
                            .with_field("operator", format!("{op:?}"))
                            .with_field("type", other));
                    }
                };
                Box::new(UnaryEvaluator {
                    typ,
                    op: *op,
                    argument,
                })
            }
            Expression::Logical { op, left, right } => {
                let left = self.compile_expr(left, env)?;
                let right = self.compile_expr(right, env)?;
                self.subst.unify(left.typ(), &Type::Bool)?;
                self.subst.unify(right.typ(), &Type::Bool)?;
                Box::new(LogicalEvaluator {
                    typ: Type::Bool,
                    op: *op,
                    left,
                    right,
                })
            }
            Expression::Binary { op, left, right } => {
                let left = self.compile_expr(left, env)?;
                let right = self.compile_expr(right, env)?;
                let func = lookup_binary(*op, left.typ(), right.typ()).ok_or_else(|| {
                    type_error("Unsupported binary operation", left.typ(), right.typ())
                        .with_field("operator", op)
                })?;
                func.evaluator(left, right)
            }
            Expression::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.compile_expr(test, env)?;
                self.subst.unify(test.typ(), &Type::Bool)?;
                let consequent = self.compile_expr(consequent, env)?;
                let alternate = self.compile_expr(alternate, env)?;
                self.subst.unify(consequent.typ(), alternate.typ())?;
                let typ = consequent.typ().clone();
                with_kind!(&typ, K => {
                    Ok(Box::new(ConditionalEvaluator::<K>::new(
                        typ.clone(),
                        test,
                        consequent,
                        alternate,
                    )) as Box<dyn Evaluator>)
                })?
            }
            Expression::Call { callee, arguments } => self.compile_call(callee, arguments, env)?,
            Expression::Function(func) => self.compile_function_value(func, env)?,
            Expression::Pipe { .. } => return Err(unsupported("pipe expression")),
        })
    }

    fn compile_identifier(&mut self, name: &str, env: &TypeEnv) -> Result<Box<dyn Evaluator>> {
        let typ = match env.bindings.get(name) {
            Some(Binding::Value(typ)) => typ.clone(),
            Some(Binding::Function { .. }) => {
                return Err(compile_type_error(
                    "Named function can only be called, not used as a value",
                )
                .with_field("name", name));
            }
            None => match self.builtins.get(name) {
                Some(v) => v.typ(),
                None => {
                    return Err(compile_type_error("Undefined identifier").with_field("name", name));
                }
            },
        };
        with_kind!(&typ, K => {
            Ok(Box::new(IdentifierEvaluator::<K>::new(typ.clone(), name)) as Box<dyn Evaluator>)
        })
    }

    fn compile_call(
        &mut self,
        callee: &Expression,
        arguments: &[semantic::Property],
        env: &TypeEnv,
    ) -> Result<Box<dyn Evaluator>> {
        let mut args = Vec::with_capacity(arguments.len());
        let mut arg_types = BTreeMap::new();
        for prop in arguments {
            let value = self.compile_expr(&prop.value, env)?;
            arg_types.insert(prop.key.clone(), value.typ().clone());
            args.push((prop.key.clone(), value));
        }

        if let Expression::Identifier(name) = callee {
            if let Some(Binding::Function { expr, env: decl_env }) = env.bindings.get(name) {
                let (params, body, _) = self.compile_function(expr, &arg_types, decl_env)?;
                let typ = body.typ().clone();
                let callee = Callee::Monomorphized {
                    capture: CaptureSource::Declared(name.clone()),
                    params,
                    body,
                };
                return call_evaluator(typ, callee, args);
            }
        }

        if let Expression::Function(func) = callee {
            let (params, body, _) = self.compile_function(func, &arg_types, env)?;
            let typ = body.typ().clone();
            let callee = Callee::Monomorphized {
                capture: CaptureSource::CallSite,
                params,
                body,
            };
            return call_evaluator(typ, callee, args);
        }

        let callee = self.compile_expr(callee, env)?;
        let sig = match self.subst.instantiate(callee.typ()) {
            Type::Function(sig) => sig,
            other => {
                return Err(compile_type_error("Called value is not a function")
                    .with_field("type", other));
            }
        };
        for (key, typ) in &arg_types {
            let param = sig.parameters.get(key).ok_or_else(|| {
                compile_type_error("Unexpected argument").with_field("argument", key)
            })?;
            self.subst.unify(param, typ)?;
        }
        for key in &sig.required {
            if !arg_types.contains_key(key) {
                return Err(compile_type_error("Missing required argument").with_field("argument", key));
            }
        }
        let typ = self.subst.apply(&sig.return_type);
        if !typ.is_mono() {
            return Err(compile_type_error("Could not infer monomorphic return type")
                .with_field("type", typ));
        }

        call_evaluator(typ, Callee::Value(callee), args)
    }

    /// Compile a function literal used as a value.
    ///
    /// Every parameter needs a monomorphic annotation or a default, there is
    /// no call site to infer types from.
    fn compile_function_value(
        &mut self,
        func: &Arc<FunctionExpression>,
        env: &TypeEnv,
    ) -> Result<Box<dyn Evaluator>> {
        let mut args = BTreeMap::new();
        for param in &func.params {
            match &param.annotation {
                Some(typ) if typ.is_mono() => {
                    args.insert(param.key.clone(), typ.clone());
                }
                Some(typ) => {
                    return Err(compile_type_error("Cannot compile polymorphic function value")
                        .with_field("parameter", &param.key)
                        .with_field("type", typ));
                }
                None if param.default.is_some() => (),
                None => {
                    return Err(compile_type_error("Cannot infer parameter type of function value")
                        .with_field("parameter", &param.key));
                }
            }
        }

        let (params, body, signature) = self.compile_function(func, &args, env)?;
        Ok(Box::new(FunctionEvaluator {
            typ: Type::function(signature.clone()),
            signature,
            params,
            body,
        }))
    }
}

fn call_evaluator(
    typ: Type,
    callee: Callee,
    args: Vec<(String, Box<dyn Evaluator>)>,
) -> Result<Box<dyn Evaluator>> {
    with_kind!(&typ, K => {
        Ok(Box::new(CallEvaluator::<K>::new(typ.clone(), callee, args)) as Box<dyn Evaluator>)
    })
}

/// Build the input object for a function whose single parameter is a row
/// record, e.g. `(r) => ...`.
pub fn record_input(param: &str, record: Object) -> Object {
    [(param, Value::Object(record))].into_iter().collect()
}

/// Type of an array value built from homogeneous values.
pub fn array_value(elem: Type, values: Vec<Value>) -> Result<Value> {
    Ok(Value::Array(Array::try_new(elem, values)?))
}

#[cfg(test)]
mod tests {
    use semantic::{
        FunctionParameter, LogicalOperator, Property, binary, call, function, ident, logical,
        member,
    };

    use super::*;
    use crate::values::binary::Operator;

    fn row_shape(props: &[(&str, Type)]) -> Type {
        Type::object([(
            "r",
            Type::object(props.iter().map(|(k, t)| (k.to_string(), t.clone()))),
        )])
    }

    fn row_input(props: &[(&str, Value)]) -> Object {
        record_input(
            "r",
            props
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn builtins() -> Arc<Scope> {
        Arc::new(builtins::default_builtins())
    }

    fn predicate() -> FunctionExpression {
        // (r) => r._value > 2.0 and r.host == "a"
        FunctionExpression::new(
            vec![FunctionParameter::new("r")],
            FunctionBody::Expression(logical(
                LogicalOperator::And,
                binary(Operator::Gt, member(ident("r"), "_value"), Expression::Float(2.0)),
                binary(
                    Operator::Eq,
                    member(ident("r"), "host"),
                    Expression::String("a".to_string()),
                ),
            )),
        )
    }

    #[test]
    fn compile_and_eval_predicate() {
        let shape = row_shape(&[("_value", Type::Float), ("host", Type::String)]);
        let f = compile(&predicate(), &shape, builtins()).unwrap();
        assert_eq!(&Type::Bool, f.typ());

        let input = row_input(&[("_value", Value::Float(3.0)), ("host", Value::from("a"))]);
        assert!(f.eval_bool(&input).unwrap());
        let input = row_input(&[("_value", Value::Float(1.0)), ("host", Value::from("a"))]);
        assert!(!f.eval_bool(&input).unwrap());

        // Wrong kind for a bool-typed function.
        let err = f.eval_float(&input).unwrap_err();
        assert_eq!(ErrorKind::WrongKind, err.kind());
    }

    #[test]
    fn type_error_names_conflicting_types() {
        let shape = row_shape(&[("_value", Type::String), ("host", Type::String)]);
        let err = compile(&predicate(), &shape, builtins()).unwrap_err();
        assert_eq!(ErrorKind::TypeError, err.kind());
        assert!(err.is_compile_error());
        assert_eq!(Some("string"), err.field("left"));
        assert_eq!(Some("float"), err.field("right"));
    }

    #[test]
    fn missing_property_is_type_error() {
        let shape = row_shape(&[("_value", Type::Float)]);
        let err = compile(&predicate(), &shape, builtins()).unwrap_err();
        assert_eq!(ErrorKind::TypeError, err.kind());
    }

    #[test]
    fn expression_statement_rejected() {
        let f = FunctionExpression::new(
            vec![FunctionParameter::new("r")],
            FunctionBody::Block(vec![
                Statement::Expression(member(ident("r"), "_value")),
                Statement::Return(Expression::Bool(true)),
            ]),
        );
        let err = compile(&f, &row_shape(&[("_value", Type::Float)]), builtins()).unwrap_err();
        assert_eq!(ErrorKind::NoSideEffects, err.kind());
    }

    #[test]
    fn pipe_unsupported() {
        let f = FunctionExpression::new(
            vec![],
            FunctionBody::Expression(Expression::Pipe {
                argument: Box::new(Expression::Int(1)),
                call: Box::new(call::<&str>(ident("f"), [])),
            }),
        );
        let err = compile(&f, &Type::object::<&str, _>([]), builtins()).unwrap_err();
        assert_eq!(ErrorKind::UnsupportedNode, err.kind());
    }

    #[test]
    fn block_with_declared_function() {
        // (r) => {
        //   scale = 10.0
        //   f = (x) => x * scale
        //   scale = 100.0
        //   return f(x: r._value)
        // }
        let f = FunctionExpression::new(
            vec![FunctionParameter::new("r")],
            FunctionBody::Block(vec![
                Statement::Variable {
                    name: "scale".to_string(),
                    init: Expression::Float(10.0),
                },
                Statement::Variable {
                    name: "f".to_string(),
                    init: function(
                        vec![FunctionParameter::new("x")],
                        FunctionBody::Expression(binary(Operator::Mul, ident("x"), ident("scale"))),
                    ),
                },
                Statement::Variable {
                    name: "scale".to_string(),
                    init: Expression::Float(100.0),
                },
                Statement::Return(call(ident("f"), [("x", member(ident("r"), "_value"))])),
            ]),
        );

        let compiled = compile(&f, &row_shape(&[("_value", Type::Float)]), builtins()).unwrap();
        let out = compiled
            .eval_float(&row_input(&[("_value", Value::Float(2.0))]))
            .unwrap();
        // Captured at declaration time.
        assert_eq!(20.0, out);
    }

    #[test]
    fn declared_function_monomorphized_per_call() {
        // (r) => {
        //   double = (x) => x + x
        //   return {a: double(x: r.i), b: double(x: r.s)}
        // }
        let f = FunctionExpression::new(
            vec![FunctionParameter::new("r")],
            FunctionBody::Block(vec![
                Statement::Variable {
                    name: "double".to_string(),
                    init: function(
                        vec![FunctionParameter::new("x")],
                        FunctionBody::Expression(binary(Operator::Add, ident("x"), ident("x"))),
                    ),
                },
                Statement::Return(Expression::Object(vec![
                    Property {
                        key: "a".to_string(),
                        value: call(ident("double"), [("x", member(ident("r"), "i"))]),
                    },
                    Property {
                        key: "b".to_string(),
                        value: call(ident("double"), [("x", member(ident("r"), "s"))]),
                    },
                ])),
            ]),
        );

        let shape = row_shape(&[("i", Type::Int), ("s", Type::String)]);
        let compiled = compile(&f, &shape, builtins()).unwrap();
        assert_eq!(
            &Type::object([("a", Type::Int), ("b", Type::String)]),
            compiled.typ()
        );
        let out = compiled
            .eval_object(&row_input(&[("i", Value::Int(4)), ("s", Value::from("ab"))]))
            .unwrap();
        assert_eq!(Some(&Value::Int(8)), out.get("a"));
        assert_eq!(Some(&Value::from("abab")), out.get("b"));
    }

    #[test]
    fn default_parameter_values() {
        // (r, threshold=5) => r.v > threshold
        let f = FunctionExpression::new(
            vec![
                FunctionParameter::new("r"),
                FunctionParameter::new("threshold").with_default(Expression::Int(5)),
            ],
            FunctionBody::Expression(binary(
                Operator::Gt,
                member(ident("r"), "v"),
                ident("threshold"),
            )),
        );

        let compiled = compile(&f, &row_shape(&[("v", Type::Int)]), builtins()).unwrap();
        assert!(compiled.eval_bool(&row_input(&[("v", Value::Int(6))])).unwrap());
        assert!(!compiled.eval_bool(&row_input(&[("v", Value::Int(5))])).unwrap());

        let shape = Type::object([
            ("r", Type::object([("v", Type::Int)])),
            ("threshold", Type::Int),
        ]);
        let compiled = compile(&f, &shape, builtins()).unwrap();
        let mut input = row_input(&[("v", Value::Int(6))]);
        input.set("threshold", Value::Int(10));
        assert!(!compiled.eval_bool(&input).unwrap());
    }

    #[test]
    fn missing_required_parameter() {
        let shape = Type::object::<&str, _>([]);
        let err = compile(&predicate(), &shape, builtins()).unwrap_err();
        assert_eq!(ErrorKind::TypeError, err.kind());
    }

    #[test]
    fn annotation_unifies_with_shape() {
        let f = FunctionExpression::new(
            vec![FunctionParameter::new("xs").with_annotation(Type::array(Type::Var(0)))],
            FunctionBody::Expression(Expression::Index {
                array: Box::new(ident("xs")),
                index: Box::new(Expression::Int(1)),
            }),
        );
        let compiled = compile(
            &f,
            &Type::object([("xs", Type::array(Type::String))]),
            builtins(),
        )
        .unwrap();
        assert_eq!(&Type::String, compiled.typ());

        let input: Object = [(
            "xs",
            array_value(Type::String, vec![Value::from("a"), Value::from("b")]).unwrap(),
        )]
        .into_iter()
        .collect();
        assert_eq!("b", compiled.eval_string(&input).unwrap());

        compile(&f, &Type::object([("xs", Type::Int)]), builtins()).unwrap_err();
    }

    #[test]
    fn builtin_polymorphic_call() {
        // (r) => length(arr: r.tags) + 1
        let f = FunctionExpression::new(
            vec![FunctionParameter::new("r")],
            FunctionBody::Expression(binary(
                Operator::Add,
                call(ident("length"), [("arr", member(ident("r"), "tags"))]),
                Expression::Int(1),
            )),
        );
        let compiled = compile(
            &f,
            &row_shape(&[("tags", Type::array(Type::String))]),
            builtins(),
        )
        .unwrap();
        let tags = array_value(Type::String, vec![Value::from("a"), Value::from("b")]).unwrap();
        assert_eq!(3, compiled.eval_int(&row_input(&[("tags", tags)])).unwrap());
    }

    #[test]
    fn function_value_closure() {
        // () => ((x: int) => x + 1)
        let f = FunctionExpression::new(
            vec![],
            FunctionBody::Expression(function(
                vec![FunctionParameter::new("x").with_annotation(Type::Int)],
                FunctionBody::Expression(binary(Operator::Add, ident("x"), Expression::Int(1))),
            )),
        );
        let compiled = compile(&f, &Type::object::<&str, _>([]), builtins()).unwrap();
        let value = compiled.eval(&Object::new()).unwrap();
        let func = value.try_as_function().unwrap();
        let args: Object = [("x", Value::Int(41))].into_iter().collect();
        assert_eq!(Value::Int(42), func.call(&args).unwrap());

        // Unannotated parameters cannot be compiled as a value.
        let f = FunctionExpression::new(
            vec![],
            FunctionBody::Expression(function(
                vec![FunctionParameter::new("x")],
                FunctionBody::Expression(ident("x")),
            )),
        );
        compile(&f, &Type::object::<&str, _>([]), builtins()).unwrap_err();
    }

    #[test]
    fn regex_and_conditional() {
        // (r) => if r.host =~ /^web/ then "web" else "other"
        let f = FunctionExpression::new(
            vec![FunctionParameter::new("r")],
            FunctionBody::Expression(Expression::Conditional {
                test: Box::new(binary(
                    Operator::RegexMatch,
                    member(ident("r"), "host"),
                    Expression::Regexp("^web".to_string()),
                )),
                consequent: Box::new(Expression::String("web".to_string())),
                alternate: Box::new(Expression::String("other".to_string())),
            }),
        );
        let compiled = compile(&f, &row_shape(&[("host", Type::String)]), builtins()).unwrap();
        assert_eq!(
            "web",
            compiled
                .eval_string(&row_input(&[("host", Value::from("web01"))]))
                .unwrap()
        );
        assert_eq!(
            "other",
            compiled
                .eval_string(&row_input(&[("host", Value::from("db01"))]))
                .unwrap()
        );
    }

    #[test]
    fn cache_memoizes_per_shape() {
        let mut cache = CompilationCache::new(Arc::new(predicate()), builtins());
        let shape = row_shape(&[("_value", Type::Float), ("host", Type::String)]);
        let a = cache.compile(&shape).unwrap();
        let b = cache.compile(&shape).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(1, cache.len());

        let bad = row_shape(&[("_value", Type::Bool), ("host", Type::String)]);
        cache.compile(&bad).unwrap_err();
        cache.compile(&bad).unwrap_err();
        assert_eq!(2, cache.len());
    }

    #[test]
    fn undefined_identifier() {
        let f = FunctionExpression::new(vec![], FunctionBody::Expression(ident("nope")));
        let err = compile(&f, &Type::object::<&str, _>([]), builtins()).unwrap_err();
        assert_eq!(ErrorKind::TypeError, err.kind());
    }

    #[test]
    fn declared_function_cannot_call_itself() {
        // (r) => {
        //   f = (x) => f(x: x)
        //   return f(x: r._value)
        // }
        let f = FunctionExpression::new(
            vec![FunctionParameter::new("r")],
            FunctionBody::Block(vec![
                Statement::Variable {
                    name: "f".to_string(),
                    init: function(
                        vec![FunctionParameter::new("x")],
                        FunctionBody::Expression(call(ident("f"), [("x", ident("x"))])),
                    ),
                },
                Statement::Return(call(ident("f"), [("x", member(ident("r"), "_value"))])),
            ]),
        );
        let err = compile(&f, &row_shape(&[("_value", Type::Float)]), builtins()).unwrap_err();
        assert_eq!(ErrorKind::TypeError, err.kind());
        assert_eq!(Some("f"), err.field("name"));
    }
}
