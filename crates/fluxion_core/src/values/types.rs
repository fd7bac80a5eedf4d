use std::collections::BTreeMap;
use std::fmt;

/// Identifier for a type variable in a polymorphic type.
pub type TypeVar = u64;

/// Semantic type of a value or expression.
///
/// A type without any `Var` is monomorphic. Only monomorphic types are
/// lowered into evaluators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Bool,
    Int,
    UInt,
    Float,
    String,
    Time,
    Duration,
    Regexp,
    Array(Box<Type>),
    Object(BTreeMap<String, Type>),
    Function(Box<FunctionSignature>),
    Var(TypeVar),
}

impl Type {
    pub fn array(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    pub fn object<S, I>(props: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Type)>,
    {
        Type::Object(props.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn function(sig: FunctionSignature) -> Self {
        Type::Function(Box::new(sig))
    }

    /// Returns true if the type contains no type variables.
    pub fn is_mono(&self) -> bool {
        match self {
            Type::Var(_) => false,
            Type::Array(elem) => elem.is_mono(),
            Type::Object(props) => props.values().all(|t| t.is_mono()),
            Type::Function(sig) => sig.is_mono(),
            _ => true,
        }
    }

    /// Check if a type variable occurs anywhere in this type.
    pub fn contains_var(&self, var: TypeVar) -> bool {
        match self {
            Type::Var(v) => *v == var,
            Type::Array(elem) => elem.contains_var(var),
            Type::Object(props) => props.values().any(|t| t.contains_var(var)),
            Type::Function(sig) => {
                sig.parameters.values().any(|t| t.contains_var(var))
                    || sig.return_type.contains_var(var)
            }
            _ => false,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Object(props) => props.get(name),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::UInt => write!(f, "uint"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Time => write!(f, "time"),
            Type::Duration => write!(f, "duration"),
            Type::Regexp => write!(f, "regexp"),
            Type::Array(elem) => write!(f, "[{elem}]"),
            Type::Object(props) => {
                write!(f, "{{")?;
                for (idx, (k, v)) in props.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Type::Function(sig) => write!(f, "{sig}"),
            Type::Var(v) => write!(f, "t{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionSignature {
    pub parameters: BTreeMap<String, Type>,
    /// Parameters that must be supplied by the caller.
    pub required: Vec<String>,
    pub return_type: Type,
}

impl FunctionSignature {
    pub fn is_mono(&self) -> bool {
        self.parameters.values().all(|t| t.is_mono()) && self.return_type.is_mono()
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, (k, v)) in self.parameters.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            if self.required.contains(k) {
                write!(f, "{k}: {v}")?;
            } else {
                write!(f, "?{k}: {v}")?;
            }
        }
        write!(f, ") -> {}", self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nested() {
        let typ = Type::object([
            ("r", Type::object([("_value", Type::Float)])),
            ("tags", Type::array(Type::String)),
        ]);
        assert_eq!("{r: {_value: float}, tags: [string]}", typ.to_string());
    }

    #[test]
    fn mono_detection() {
        assert!(Type::array(Type::Int).is_mono());
        assert!(!Type::array(Type::Var(1)).is_mono());
        assert!(Type::array(Type::Var(1)).contains_var(1));

        let sig = FunctionSignature {
            parameters: [("x".to_string(), Type::Var(0))].into_iter().collect(),
            required: vec!["x".to_string()],
            return_type: Type::Var(0),
        };
        assert!(!Type::function(sig.clone()).is_mono());
        assert_eq!("(x: t0) -> t0", sig.to_string());
    }
}
