//! Robinson first-order syntactic unification over [`TypeTerm`].
//!
//! Straight Hindley-Milner machinery: `apply` pushes a substitution through
//! a term, `unify` computes the most general unifier of two terms, `bind`
//! does the occurs-checked variable binding, and `compose` combines two
//! substitutions left-to-right. `solve` drains a worklist of equality
//! constraints LIFO, the order spec.md §4.1 specifies.

use std::collections::HashMap;

use crate::error::FastpyError;
use crate::types::TypeTerm;

/// A mapping from type variable names to the terms they stand for.
#[derive(Debug, Clone, Default)]
pub struct Substitution(HashMap<String, TypeTerm>);

impl Substitution {
    /// The empty substitution.
    pub fn empty() -> Self {
        Substitution(HashMap::new())
    }

    /// A substitution binding a single variable.
    pub fn singleton(name: String, term: TypeTerm) -> Self {
        let mut map = HashMap::new();
        map.insert(name, term);
        Substitution(map)
    }

    /// Push this substitution through a type term, replacing every bound
    /// variable with what it maps to (recursively, so a chain of bindings
    /// resolves fully).
    pub fn apply(&self, term: &TypeTerm) -> TypeTerm {
        match term {
            TypeTerm::Variable(name) => match self.0.get(name) {
                Some(bound) if bound != term => self.apply(bound),
                _ => term.clone(),
            },
            TypeTerm::Constant(_) => term.clone(),
            TypeTerm::Application(name, args) => {
                TypeTerm::Application(name, args.iter().map(|a| self.apply(a)).collect())
            }
            TypeTerm::Function(params, ret) => TypeTerm::Function(
                params.iter().map(|p| self.apply(p)).collect(),
                Box::new(self.apply(ret)),
            ),
        }
    }

    /// Compose `self` after `other`: applying the result to a term is
    /// equivalent to applying `other` then `self`.
    pub fn compose(&self, other: &Substitution) -> Substitution {
        let mut map: HashMap<String, TypeTerm> =
            other.0.iter().map(|(k, v)| (k.clone(), self.apply(v))).collect();
        for (k, v) in &self.0 {
            map.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Substitution(map)
    }
}

/// Bind a type variable to a term, occurs-checked.
fn bind(name: &str, term: &TypeTerm) -> Result<Substitution, FastpyError> {
    if let TypeTerm::Variable(other) = term {
        if other == name {
            return Ok(Substitution::empty());
        }
    }
    if term.free_vars().contains(name) {
        return Err(FastpyError::InfiniteType(
            TypeTerm::Variable(name.to_string()),
            term.clone(),
        ));
    }
    Ok(Substitution::singleton(name.to_string(), term.clone()))
}

/// Compute the most general unifier of two type terms.
pub fn unify(a: &TypeTerm, b: &TypeTerm) -> Result<Substitution, FastpyError> {
    match (a, b) {
        (TypeTerm::Variable(name), other) | (other, TypeTerm::Variable(name)) => bind(name, other),
        (TypeTerm::Constant(x), TypeTerm::Constant(y)) if x == y => Ok(Substitution::empty()),
        (TypeTerm::Application(xn, xargs), TypeTerm::Application(yn, yargs))
            if xn == yn && xargs.len() == yargs.len() =>
        {
            unify_seq(xargs, yargs)
        }
        (TypeTerm::Function(xparams, xret), TypeTerm::Function(yparams, yret)) => {
            if xparams.len() != yparams.len() {
                return Err(FastpyError::UnifyArityMismatch {
                    lhs: a.clone(),
                    rhs: b.clone(),
                    expected: xparams.len(),
                    got: yparams.len(),
                });
            }
            let params_subst = unify_seq(xparams, yparams)?;
            let ret_subst = unify(&params_subst.apply(xret), &params_subst.apply(yret))?;
            Ok(ret_subst.compose(&params_subst))
        }
        _ => Err(FastpyError::TypeMismatch(a.clone(), b.clone())),
    }
}

fn unify_seq(xs: &[TypeTerm], ys: &[TypeTerm]) -> Result<Substitution, FastpyError> {
    let mut subst = Substitution::empty();
    for (x, y) in xs.iter().zip(ys.iter()) {
        let s = unify(&subst.apply(x), &subst.apply(y))?;
        subst = s.compose(&subst);
    }
    Ok(subst)
}

/// Drain a worklist of equality constraints LIFO, composing unifiers as
/// they're found, and return the combined substitution.
///
/// The LIFO order matters only for which constraint surfaces first in a
/// `TypeMismatch`/`InfiniteType` error when more than one is unsatisfiable;
/// it has no effect on the final substitution for a satisfiable constraint
/// set, since unification is confluent.
pub fn solve(mut constraints: Vec<(TypeTerm, TypeTerm)>) -> Result<Substitution, FastpyError> {
    let mut subst = Substitution::empty();
    while let Some((lhs, rhs)) = constraints.pop() {
        let lhs = subst.apply(&lhs);
        let rhs = subst.apply(&rhs);
        let next = unify(&lhs, &rhs)?;
        subst = next.compose(&subst);
    }
    Ok(subst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unify_identical_constants() {
        let s = unify(&TypeTerm::int64(), &TypeTerm::int64()).unwrap();
        assert_eq!(s.apply(&TypeTerm::int64()), TypeTerm::int64());
    }

    #[test]
    fn unify_mismatched_constants_fails() {
        assert!(unify(&TypeTerm::int64(), &TypeTerm::float64()).is_err());
    }

    #[test]
    fn unify_variable_with_constant_binds_it() {
        let a = TypeTerm::Variable("a".into());
        let s = unify(&a, &TypeTerm::int64()).unwrap();
        assert_eq!(s.apply(&a), TypeTerm::int64());
    }

    #[test]
    fn occurs_check_rejects_self_referential_binding() {
        let a = TypeTerm::Variable("a".into());
        let arr = TypeTerm::array(a.clone());
        assert!(matches!(unify(&a, &arr), Err(FastpyError::InfiniteType(_, _))));
    }

    #[test]
    fn solve_chains_constraints_through_shared_variables() {
        let a = TypeTerm::Variable("a".into());
        let b = TypeTerm::Variable("b".into());
        let constraints = vec![(a.clone(), b.clone()), (b.clone(), TypeTerm::int64())];
        let s = solve(constraints).unwrap();
        assert_eq!(s.apply(&a), TypeTerm::int64());
        assert_eq!(s.apply(&b), TypeTerm::int64());
    }

    #[test]
    fn unify_functions_with_different_arity_raises_dedicated_error() {
        let f2 = TypeTerm::Function(vec![TypeTerm::int64(), TypeTerm::int64()], Box::new(TypeTerm::int64()));
        let f1 = TypeTerm::Function(vec![TypeTerm::int64()], Box::new(TypeTerm::int64()));
        let err = unify(&f2, &f1).unwrap_err();
        assert!(matches!(
            err,
            FastpyError::UnifyArityMismatch { expected: 2, got: 1, .. }
        ));
    }

    #[test]
    fn solve_detects_conflicting_constraints() {
        let a = TypeTerm::Variable("a".into());
        let constraints = vec![(a.clone(), TypeTerm::int64()), (a, TypeTerm::float64())];
        assert!(solve(constraints).is_err());
    }
}
