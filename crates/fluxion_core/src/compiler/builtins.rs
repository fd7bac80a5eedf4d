//! Native functions visible to every compiled function.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use fluxion_error::Result;

use super::scope::Scope;
use crate::values::types::{FunctionSignature, Type};
use crate::values::{Function, Object, Value};

type NativeFn = fn(&Object) -> Result<Value>;

/// A function implemented in Rust.
pub struct NativeFunction {
    name: &'static str,
    signature: FunctionSignature,
    func: NativeFn,
}

impl NativeFunction {
    pub fn new(
        name: &'static str,
        params: &[(&str, Type)],
        return_type: Type,
        func: NativeFn,
    ) -> Self {
        let parameters: BTreeMap<String, Type> = params
            .iter()
            .map(|(k, t)| (k.to_string(), t.clone()))
            .collect();
        NativeFunction {
            name,
            signature: FunctionSignature {
                required: parameters.keys().cloned().collect(),
                parameters,
                return_type,
            },
            func,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl Function for NativeFunction {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn call(&self, args: &Object) -> Result<Value> {
        (self.func)(args)
    }
}

fn length(args: &Object) -> Result<Value> {
    let arr = args.try_get("arr")?.try_as_array()?;
    Ok(Value::Int(arr.len() as i64))
}

fn abs(args: &Object) -> Result<Value> {
    Ok(Value::Float(args.try_get("x")?.try_as_float()?.abs()))
}

fn has_prefix(args: &Object) -> Result<Value> {
    let v = args.try_get("v")?.try_as_str()?;
    let prefix = args.try_get("prefix")?.try_as_str()?;
    Ok(Value::Bool(v.starts_with(prefix)))
}

fn to_string(args: &Object) -> Result<Value> {
    let v = args.try_get("v")?;
    Ok(match v {
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    })
}

/// Scope holding the default native functions.
pub fn default_builtins() -> Scope {
    let funcs = [
        NativeFunction::new("length", &[("arr", Type::array(Type::Var(0)))], Type::Int, length),
        NativeFunction::new("abs", &[("x", Type::Float)], Type::Float, abs),
        NativeFunction::new(
            "hasPrefix",
            &[("v", Type::String), ("prefix", Type::String)],
            Type::Bool,
            has_prefix,
        ),
        NativeFunction::new("string", &[("v", Type::Var(0))], Type::String, to_string),
    ];

    let mut scope = Scope::new();
    for f in funcs {
        scope.set(f.name(), Value::Function(Arc::new(f)));
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_callable() {
        let scope = default_builtins();
        let f = scope.lookup("hasPrefix").unwrap().try_as_function().unwrap();
        let args: Object = [("v", Value::from("web01")), ("prefix", Value::from("web"))]
            .into_iter()
            .collect();
        assert_eq!(Value::Bool(true), f.call(&args).unwrap());

        let f = scope.lookup("string").unwrap().try_as_function().unwrap();
        let args: Object = [("v", Value::Int(12))].into_iter().collect();
        assert_eq!(Value::from("12"), f.call(&args).unwrap());
    }

    #[test]
    fn signature_is_polymorphic() {
        let scope = default_builtins();
        let typ = scope.lookup("length").unwrap().typ();
        assert!(!typ.is_mono());
    }
}
