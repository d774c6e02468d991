//! Type terms, the vocabulary that unification, inference and
//! specialization all share.
//!
//! A closed, exhaustively-matched enum stands in for the tagged union the
//! spec describes (`TVar`/`TCon`/`TApp`/`TFun`): the same tagged-variant
//! idiom the teacher uses for its own IR (`aot::ir::aot_types::AotExpr`)
//! rather than a class hierarchy with `isinstance` checks.

use std::collections::HashSet;
use std::fmt;

/// A type term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTerm {
    /// A type variable, e.g. the fresh `$a` introduced for an unannotated
    /// parameter.
    Variable(String),
    /// A nullary type constant: `Int64`, `Int32`, `Float64`, `Float32`,
    /// `Bool`.
    Constant(&'static str),
    /// A type constructor applied to argument types, e.g. `Array(Int64)`.
    Application(&'static str, Vec<TypeTerm>),
    /// A function type from parameter types to a return type.
    Function(Vec<TypeTerm>, Box<TypeTerm>),
}

/// The four scalar constants the inference engine ever produces or
/// consumes, plus helpers for the one array constructor.
impl TypeTerm {
    /// `Int64`.
    pub fn int64() -> Self {
        TypeTerm::Constant("Int64")
    }

    /// `Int32`.
    pub fn int32() -> Self {
        TypeTerm::Constant("Int32")
    }

    /// `Float64`.
    pub fn float64() -> Self {
        TypeTerm::Constant("Float64")
    }

    /// `Float32`.
    pub fn float32() -> Self {
        TypeTerm::Constant("Float32")
    }

    /// `Bool`.
    pub fn bool_() -> Self {
        TypeTerm::Constant("Bool")
    }

    /// `Array(elem)`.
    pub fn array(elem: TypeTerm) -> Self {
        TypeTerm::Application("Array", vec![elem])
    }

    /// `true` if this is `Array(_)`.
    pub fn is_array(&self) -> bool {
        matches!(self, TypeTerm::Application("Array", _))
    }

    /// The element type of `Array(elem)`, if this is one.
    pub fn array_element(&self) -> Option<&TypeTerm> {
        match self {
            TypeTerm::Application("Array", args) => args.first(),
            _ => None,
        }
    }

    /// `true` if this term contains no type variables.
    pub fn is_concrete(&self) -> bool {
        self.free_vars().is_empty()
    }

    /// The set of free type variables occurring in this term.
    pub fn free_vars(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        self.collect_free_vars(&mut out);
        out
    }

    fn collect_free_vars(&self, out: &mut HashSet<String>) {
        match self {
            TypeTerm::Variable(name) => {
                out.insert(name.clone());
            }
            TypeTerm::Constant(_) => {}
            TypeTerm::Application(_, args) => {
                for arg in args {
                    arg.collect_free_vars(out);
                }
            }
            TypeTerm::Function(params, ret) => {
                for p in params {
                    p.collect_free_vars(out);
                }
                ret.collect_free_vars(out);
            }
        }
    }
}

impl fmt::Display for TypeTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTerm::Variable(name) => write!(f, "${name}"),
            TypeTerm::Constant(name) => write!(f, "{name}"),
            TypeTerm::Application(name, args) => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            TypeTerm::Function(params, ret) => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
        }
    }
}

/// A source of fresh type variables, named `$a, $b, ..., $z, $a0, $b0, ...`
/// in allocation order.
///
/// Matches the fresh-variable policy spec.md §4.3 specifies: 26 letters
/// before falling back to a numbered second generation, rather than a
/// monotonic counter like `$t0, $t1, ...`.
#[derive(Debug, Default)]
pub struct FreshVarSource {
    next: usize,
}

impl FreshVarSource {
    /// Create a source starting at `$a`.
    pub fn new() -> Self {
        FreshVarSource { next: 0 }
    }

    /// Allocate the next fresh type variable.
    pub fn fresh(&mut self) -> TypeTerm {
        let letter = (b'a' + (self.next % 26) as u8) as char;
        let generation = self.next / 26;
        let name = if generation == 0 {
            letter.to_string()
        } else {
            format!("{letter}{}", generation - 1)
        };
        self.next += 1;
        TypeTerm::Variable(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_var_naming_wraps_after_z() {
        let mut src = FreshVarSource::new();
        let names: Vec<String> = (0..28)
            .map(|_| match src.fresh() {
                TypeTerm::Variable(n) => n,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names[0], "a");
        assert_eq!(names[25], "z");
        assert_eq!(names[26], "a0");
        assert_eq!(names[27], "b0");
    }

    #[test]
    fn free_vars_collects_through_application_and_function() {
        let t = TypeTerm::Function(
            vec![TypeTerm::Variable("a".into()), TypeTerm::array(TypeTerm::Variable("b".into()))],
            Box::new(TypeTerm::Variable("c".into())),
        );
        let fv = t.free_vars();
        assert_eq!(fv.len(), 3);
        assert!(fv.contains("a"));
        assert!(fv.contains("b"));
        assert!(fv.contains("c"));
    }

    #[test]
    fn concrete_term_has_no_free_vars() {
        assert!(TypeTerm::int64().is_concrete());
        assert!(TypeTerm::array(TypeTerm::float64()).is_concrete());
        assert!(!TypeTerm::Variable("a".into()).is_concrete());
    }
}
