//! Core IR: the small, typed-after-inference representation that lowering
//! produces, inference annotates, and codegen consumes.
//!
//! A closed enum again, in the same spirit as [`crate::types::TypeTerm`] —
//! exhaustive `match`es replace the teacher's heavier `AotStmt`/`AotExpr`
//! split (`aot::ir::aot_types`), because this IR only ever needs to express
//! the small numeric subset the spec covers, not a general SSA form.

use crate::types::TypeTerm;

/// A Core IR node.
///
/// Every node owns an inference-assigned type slot; before inference runs
/// it holds a fresh type variable, and after `solve` it holds whatever the
/// final substitution resolves that variable to (possibly still a variable,
/// in which case the function is underdetermined — see
/// [`crate::error::FastpyError::Underdetermined`]).
#[derive(Debug, Clone)]
pub enum Node {
    /// A variable reference.
    Var { name: String, ty: TypeTerm },
    /// `target = value`.
    Assign { target: String, value: Box<Node>, ty: TypeTerm },
    /// `return value`.
    Return { value: Box<Node>, ty: TypeTerm },
    /// `for loop_var in range(begin, end): body`.
    ///
    /// Preserves the asymmetric constraint the original lowering applies:
    /// `begin` is constrained against `Int64` while the literal `end`
    /// bound, when it's a bare literal, keeps the `Int32` type lowering
    /// assigns int literals by default. This is a known quirk of the
    /// system being modeled, not a bug to fix here.
    Loop {
        loop_var: String,
        /// The type variable bound to `loop_var` for the duration of the
        /// loop body, so inference can tie it to `begin`'s type even
        /// though no `Var` node for it need appear at this level.
        loop_var_ty: TypeTerm,
        begin: Box<Node>,
        end: Box<Node>,
        body: Vec<Node>,
        ty: TypeTerm,
    },
    /// A function call `func(args...)`.
    App { func: Box<Node>, args: Vec<Node>, ty: TypeTerm },
    /// A function definition.
    Fun { name: String, params: Vec<String>, body: Vec<Node>, ty: TypeTerm },
    /// An integer literal.
    LitInt { value: i64, ty: TypeTerm },
    /// A float literal.
    ///
    /// Lowering always seeds this with a fresh `Float64` constant
    /// regardless of the literal's lexical form (no separate `Float32`
    /// literal syntax); see spec.md §9's note on `LitFloat`'s type-reset
    /// quirk, preserved as-is.
    LitFloat { value: f64, ty: TypeTerm },
    /// A boolean literal.
    LitBool { value: bool, ty: TypeTerm },
    /// A primitive operator application, e.g. `+`/`*` on two operands.
    ///
    /// `op` is kept as a plain string tag rather than a closed operator
    /// enum, mirroring spec.md §9's note that `Prim.fn` is treated
    /// uniformly as a string rather than distinguished by arity or fixity.
    Prim { op: String, args: Vec<Node>, ty: TypeTerm },
    /// `base[index]`.
    Index { base: Box<Node>, index: Box<Node>, ty: TypeTerm },
    /// No-op placeholder, produced by lowering a bare `pass` statement.
    Noop { ty: TypeTerm },
}

impl Node {
    /// The type slot carried by this node.
    pub fn ty(&self) -> &TypeTerm {
        match self {
            Node::Var { ty, .. }
            | Node::Assign { ty, .. }
            | Node::Return { ty, .. }
            | Node::Loop { ty, .. }
            | Node::App { ty, .. }
            | Node::Fun { ty, .. }
            | Node::LitInt { ty, .. }
            | Node::LitFloat { ty, .. }
            | Node::LitBool { ty, .. }
            | Node::Prim { ty, .. }
            | Node::Index { ty, .. }
            | Node::Noop { ty } => ty,
        }
    }

    /// Replace this node's type slot in place.
    pub fn set_ty(&mut self, new_ty: TypeTerm) {
        let slot = match self {
            Node::Var { ty, .. }
            | Node::Assign { ty, .. }
            | Node::Return { ty, .. }
            | Node::Loop { ty, .. }
            | Node::App { ty, .. }
            | Node::Fun { ty, .. }
            | Node::LitInt { ty, .. }
            | Node::LitFloat { ty, .. }
            | Node::LitBool { ty, .. }
            | Node::Prim { ty, .. }
            | Node::Index { ty, .. }
            | Node::Noop { ty } => ty,
        };
        *slot = new_ty;
    }
}
