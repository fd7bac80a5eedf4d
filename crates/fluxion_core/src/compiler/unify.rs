use fluxion_error::{DbError, ErrorKind, Result};
use hashbrown::HashMap;

use crate::values::types::{FunctionSignature, Type, TypeVar};

/// Mapping from type variables to the types they have been unified with.
#[derive(Debug, Default)]
pub struct Substitution {
    bindings: HashMap<TypeVar, Type>,
    next_var: TypeVar,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_var(&mut self) -> Type {
        let var = self.next_var;
        self.next_var += 1;
        Type::Var(var)
    }

    /// Apply all known bindings to a type.
    pub fn apply(&self, typ: &Type) -> Type {
        match typ {
            Type::Var(v) => match self.bindings.get(v) {
                Some(bound) => self.apply(bound),
                None => typ.clone(),
            },
            Type::Array(elem) => Type::array(self.apply(elem)),
            Type::Object(props) => Type::Object(
                props
                    .iter()
                    .map(|(k, t)| (k.clone(), self.apply(t)))
                    .collect(),
            ),
            Type::Function(sig) => Type::function(FunctionSignature {
                parameters: sig
                    .parameters
                    .iter()
                    .map(|(k, t)| (k.clone(), self.apply(t)))
                    .collect(),
                required: sig.required.clone(),
                return_type: self.apply(&sig.return_type),
            }),
            other => other.clone(),
        }
    }

    /// Unify two types, extending the substitution.
    pub fn unify(&mut self, left: &Type, right: &Type) -> Result<()> {
        let left = self.apply(left);
        let right = self.apply(right);
        match (&left, &right) {
            (Type::Var(a), Type::Var(b)) if a == b => Ok(()),
            (Type::Var(v), other) | (other, Type::Var(v)) => {
                if other.contains_var(*v) {
                    return Err(type_error("Recursive type", &left, &right));
                }
                self.bindings.insert(*v, other.clone());
                Ok(())
            }
            (Type::Array(a), Type::Array(b)) => self.unify(a, b),
            (Type::Object(a), Type::Object(b)) => {
                if a.len() != b.len() || a.keys().zip(b.keys()).any(|(x, y)| x != y) {
                    return Err(type_error("Object types have different properties", &left, &right));
                }
                for (ta, tb) in a.values().zip(b.values()) {
                    self.unify(ta, tb)?;
                }
                Ok(())
            }
            (Type::Function(a), Type::Function(b)) => {
                if a.parameters.len() != b.parameters.len()
                    || a.parameters.keys().zip(b.parameters.keys()).any(|(x, y)| x != y)
                {
                    return Err(type_error("Function types have different parameters", &left, &right));
                }
                for (ta, tb) in a.parameters.values().zip(b.parameters.values()) {
                    self.unify(ta, tb)?;
                }
                self.unify(&a.return_type, &b.return_type)
            }
            (a, b) if a == b => Ok(()),
            _ => Err(type_error("Type mismatch", &left, &right)),
        }
    }

    /// Replace the type variables of a type with fresh ones.
    pub fn instantiate(&mut self, typ: &Type) -> Type {
        let mut renames = HashMap::new();
        self.instantiate_inner(typ, &mut renames)
    }

    fn instantiate_inner(&mut self, typ: &Type, renames: &mut HashMap<TypeVar, Type>) -> Type {
        match typ {
            Type::Var(v) => {
                if let Some(t) = renames.get(v) {
                    return t.clone();
                }
                let fresh = self.fresh_var();
                renames.insert(*v, fresh.clone());
                fresh
            }
            Type::Array(elem) => Type::array(self.instantiate_inner(elem, renames)),
            Type::Object(props) => Type::Object(
                props
                    .iter()
                    .map(|(k, t)| (k.clone(), self.instantiate_inner(t, renames)))
                    .collect(),
            ),
            Type::Function(sig) => Type::function(FunctionSignature {
                parameters: sig
                    .parameters
                    .iter()
                    .map(|(k, t)| (k.clone(), self.instantiate_inner(t, renames)))
                    .collect(),
                required: sig.required.clone(),
                return_type: self.instantiate_inner(&sig.return_type, renames),
            }),
            other => other.clone(),
        }
    }
}

pub(crate) fn type_error(msg: &str, left: &Type, right: &Type) -> DbError {
    DbError::new(msg)
        .with_kind(ErrorKind::TypeError)
        .with_field("left", left)
        .with_field("right", right)
}
