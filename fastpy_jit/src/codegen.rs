//! Typed Core IR → Cranelift IR, via a `FunctionBuilder`.
//!
//! This is the structural lowering spec.md §4.5 describes, retargeted from
//! "an LLVM-style builder" to Cranelift's `FunctionBuilder` — the backend
//! the teacher crate already depends on for its own AoT pipeline
//! (`aot::codegen::cranelift`). Block names (`entry`, `exit`, `for.init`,
//! `for.cond`, `for.body`, `for.end`), GEP-by-offset array field access, and
//! the optimization-level/vectorization settings follow the spec's wording;
//! the `JITModule`/`FunctionBuilderContext`/`Context`/`declare_function`
//! idiom is lifted directly from `aot::codegen::cranelift::mod.rs`.

use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{AbiParam, InstBuilder, MemFlags, Signature, StackSlotData, StackSlotKind, Value};
use cranelift_codegen::isa::CallConv;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use sha2::{Digest, Sha256};
use target_lexicon::Triple;

use crate::error::FastpyError;
use crate::ir::Node;
use crate::types::TypeTerm;

/// `mangle(fname, argtys)` (§4.5): a deterministic symbol for both the
/// Cranelift function name and the specialization cache key's debug label.
///
/// The original hashes `tuple(sig)` with Python's process-unstable
/// `hash()`; a mangler backing a Cranelift symbol needs a stable digest
/// instead, so this uses `sha2` — already a teacher-aligned dependency
/// (`sha2` backs content hashing elsewhere in the pack) — over the
/// textual signature rather than reusing an unstable hash.
pub fn mangle(fname: &str, argtys: &[TypeTerm]) -> String {
    let mut hasher = Sha256::new();
    for ty in argtys {
        hasher.update(ty.to_string().as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    format!("{fname}_{:016x}", u64::from_be_bytes(digest[..8].try_into().unwrap()))
}

/// The Cranelift-level type an `Int32`/`Int64`/`Float`/`Double`/`Array(_)`
/// Core type maps to, per §4.5's translation table.
fn cranelift_type(ty: &TypeTerm) -> Result<cranelift_codegen::ir::Type, FastpyError> {
    use cranelift_codegen::ir::types;
    match ty {
        TypeTerm::Constant("Int32") => Ok(types::I32),
        TypeTerm::Constant("Int64") => Ok(types::I64),
        TypeTerm::Constant("Float32") => Ok(types::F32),
        TypeTerm::Constant("Float64") => Ok(types::F64),
        TypeTerm::Constant("Bool") => Ok(types::I8),
        _ if ty.is_array() => Ok(types::I64), // pointer to ArrayDescriptor
        _ => Err(FastpyError::UnsupportedAbiType(format!("no native type for {ty}"))),
    }
}

fn is_float(ty: &TypeTerm) -> bool {
    matches!(ty, TypeTerm::Constant("Float32") | TypeTerm::Constant("Float64"))
}

/// Metadata cached per array-typed argument while compiling one function:
/// the three `ArrayDescriptor` fields, read once via GEP at entry.
struct ArrayLocal {
    data: Value,
    #[allow(dead_code)]
    dims: Value,
    shape: Value,
    elem_ty: TypeTerm,
}

/// A local variable slot: a Cranelift stack slot plus the Core type it
/// holds, so loads/stores pick the right width and float-vs-int opcode.
struct Local {
    slot: cranelift_codegen::ir::StackSlot,
    ty: TypeTerm,
}

struct FunctionCtx<'a> {
    locals: HashMap<String, Local>,
    arrays: HashMap<String, ArrayLocal>,
    retval: Option<Local>,
    exit_block: cranelift_codegen::ir::Block,
    builder: FunctionBuilder<'a>,
}

impl<'a> FunctionCtx<'a> {
    fn alloca(&mut self, name: &str, ty: TypeTerm) -> cranelift_codegen::ir::StackSlot {
        let cl_ty = cranelift_type(&ty).expect("type checked during specialization");
        let bytes = cl_ty.bytes();
        let slot = self.builder.create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, bytes, 0));
        self.locals.insert(name.to_string(), Local { slot, ty });
        slot
    }

    fn store(&mut self, name: &str, value: Value) {
        let slot = self.locals.get(name).expect("local must be allocated before store").slot;
        self.builder.ins().stack_store(value, slot, 0);
    }

    fn load(&mut self, name: &str) -> (Value, TypeTerm) {
        let local = self.locals.get(name).expect("local must be allocated before load");
        let cl_ty = cranelift_type(&local.ty).expect("type checked during specialization");
        (self.builder.ins().stack_load(cl_ty, local.slot, 0), local.ty.clone())
    }
}

/// Cranelift JIT code generator for one specialized function at a time.
///
/// One instance is created per cache-miss compile (§4.4 step 7) and
/// discarded after `finalize` hands back the raw function pointer; the
/// cache (§4.4) is what keeps the underlying `JITModule` alive afterwards,
/// per the ABI bridge's ownership note (§5).
pub struct Codegen {
    module: JITModule,
    builder_ctx: FunctionBuilderContext,
    ctx: Context,
}

impl Codegen {
    pub fn new() -> Result<Self, FastpyError> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", "speed")
            .map_err(|e| FastpyError::UnsupportedAbiType(format!("cranelift settings: {e}")))?;
        let isa_builder = cranelift_codegen::isa::lookup(Triple::host())
            .map_err(|e| FastpyError::UnsupportedAbiType(format!("cranelift isa: {e}")))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| FastpyError::UnsupportedAbiType(format!("cranelift isa: {e}")))?;
        let builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        let module = JITModule::new(builder);
        Ok(Codegen { module, builder_ctx: FunctionBuilderContext::new(), ctx: Context::new() })
    }

    /// Emit, define, and finalize a specialized function, returning its
    /// mangled symbol name and raw code pointer.
    ///
    /// On any error the partially-built `Context` is cleared before
    /// propagating, so a failed compile never leaves half-built state for
    /// the next attempt (§7: "partial state from a failed compile ... must
    /// be discarded before the error surfaces").
    pub fn compile(
        &mut self,
        body: &crate::inference::TypedFunction,
    ) -> Result<(String, *const u8), FastpyError> {
        let symbol = mangle(&body.name, &body.param_types);
        let result = self.emit(&symbol, body);
        self.module.clear_context(&mut self.ctx);
        let func_id = result?;

        self.module
            .finalize_definitions()
            .map_err(|e| FastpyError::UnsupportedAbiType(format!("finalize: {e}")))?;
        let ptr = self.module.get_finalized_function(func_id);
        Ok((symbol, ptr))
    }

    fn emit(&mut self, symbol: &str, f: &crate::inference::TypedFunction) -> Result<FuncId, FastpyError> {
        let mut sig = Signature::new(CallConv::SystemV);
        for ty in &f.param_types {
            sig.params.push(AbiParam::new(cranelift_type(ty)?));
        }
        sig.returns.push(AbiParam::new(cranelift_type(&f.return_type)?));

        let func_id = self
            .module
            .declare_function(symbol, Linkage::Export, &sig)
            .map_err(|e| FastpyError::UnsupportedAbiType(format!("declare: {e}")))?;

        self.ctx.func = cranelift_codegen::ir::Function::with_name_signature(
            cranelift_codegen::ir::UserFuncName::user(0, func_id.as_u32()),
            sig,
        );

        {
            let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
            let entry = builder.create_block();
            let exit = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            builder.seal_block(entry);

            let mut fctx = FunctionCtx {
                locals: HashMap::new(),
                arrays: HashMap::new(),
                retval: None,
                exit_block: exit,
                builder,
            };

            bind_params(&mut fctx, f)?;
            let slot = fctx.alloca("$retval", f.return_type.clone());
            fctx.retval = Some(Local { slot, ty: f.return_type.clone() });

            for stmt in &f.body {
                compile_stmt(&mut fctx, stmt)?;
            }

            fctx.builder.ins().jump(exit, &[]);
            fctx.builder.switch_to_block(exit);
            fctx.builder.seal_block(exit);
            let retval = fctx.retval.as_ref().expect("retval always allocated");
            let cl_ty = cranelift_type(&retval.ty)?;
            let v = fctx.builder.ins().stack_load(cl_ty, retval.slot, 0);
            fctx.builder.ins().return_(&[v]);
            fctx.builder.finalize();
        }

        self.module
            .define_function(func_id, &mut self.ctx)
            .map_err(|e| FastpyError::UnsupportedAbiType(format!("define: {e}")))?;
        Ok(func_id)
    }
}

/// Bind each incoming parameter (§4.5's "Function emission" rules):
/// scalars get an `alloca` + `store`; arrays have their three descriptor
/// fields read once via GEP and cached for `Index`/`shape#` lowering.
fn bind_params(fctx: &mut FunctionCtx, f: &crate::inference::TypedFunction) -> Result<(), FastpyError> {
    let entry = fctx.builder.current_block().expect("entry block active");
    let block_params: Vec<Value> = fctx.builder.block_params(entry).to_vec();
    for ((name, ty), incoming) in f.params.iter().zip(&f.param_types).zip(block_params) {
        if ty.is_array() {
            let elem_ty = ty.array_element().cloned().unwrap_or_else(TypeTerm::int32);
            let flags = MemFlags::trusted();
            // Offsets mirror `fastpy_jit_runtime::ArrayDescriptor`'s
            // `#[repr(C)]` layout on a 64-bit target: `data` at 0, `dims` at
            // 8, and `shape` at 16 (a `*mut i32` needs 8-byte alignment, so
            // the 4 bytes after `dims` are padding, not `shape` itself).
            let data = fctx.builder.ins().load(cranelift_codegen::ir::types::I64, flags, incoming, 0);
            let dims = fctx.builder.ins().load(cranelift_codegen::ir::types::I32, flags, incoming, 8);
            let shape = fctx.builder.ins().load(cranelift_codegen::ir::types::I64, flags, incoming, 16);
            fctx.arrays.insert(name.clone(), ArrayLocal { data, dims, shape, elem_ty });
            // Also register under locals so a plain `Var` reference to an
            // array parameter (e.g. passed to `shape#`) still resolves.
            let slot = fctx.alloca(name, ty.clone());
            fctx.builder.ins().stack_store(incoming, slot, 0);
        } else {
            fctx.alloca(name, ty.clone());
            fctx.store(name, incoming);
        }
    }
    Ok(())
}

fn compile_stmt(fctx: &mut FunctionCtx, node: &Node) -> Result<(), FastpyError> {
    match node {
        Node::Noop { .. } => Ok(()),
        Node::Assign { target, value, ty } => {
            let (v, _) = compile_expr(fctx, value)?;
            if fctx.locals.contains_key(target) {
                fctx.store(target, v);
            } else {
                fctx.alloca(target, ty.clone());
                fctx.store(target, v);
            }
            Ok(())
        }
        Node::Return { value, .. } => {
            let (v, _) = compile_expr(fctx, value)?;
            if let Some(retval) = &fctx.retval {
                let slot = retval.slot;
                fctx.builder.ins().stack_store(v, slot, 0);
            }
            let exit = fctx.exit_block;
            fctx.builder.ins().jump(exit, &[]);
            // Cranelift requires a block to end in exactly one terminator;
            // anything lowered after a `return` in the source is dead and
            // gets its own block so later instructions have somewhere to
            // land without violating that invariant.
            let after = fctx.builder.create_block();
            fctx.builder.switch_to_block(after);
            fctx.builder.seal_block(after);
            Ok(())
        }
        Node::Loop { loop_var, begin, end, body, .. } => compile_loop(fctx, loop_var, begin, end, body),
        other => {
            compile_expr(fctx, other)?;
            Ok(())
        }
    }
}

fn compile_loop(
    fctx: &mut FunctionCtx,
    loop_var: &str,
    begin: &Node,
    end: &Node,
    body: &[Node],
) -> Result<(), FastpyError> {
    let init_block = fctx.builder.create_block();
    let cond_block = fctx.builder.create_block();
    let body_block = fctx.builder.create_block();
    let end_block = fctx.builder.create_block();

    fctx.builder.ins().jump(init_block, &[]);
    fctx.builder.switch_to_block(init_block);

    let (begin_v, _) = compile_expr(fctx, begin)?;
    let (end_v, _) = compile_expr(fctx, end)?;
    // The Loop row (§4.3) constrains `begin` to Int64 but the induction
    // variable itself is always Int32 (§3); narrow here so the stack slot
    // below, sized for Int32, never receives a wider value than it holds.
    let i32_ty = cranelift_codegen::ir::types::I32;
    let begin_v = if fctx.builder.func.dfg.value_type(begin_v) == i32_ty {
        begin_v
    } else {
        fctx.builder.ins().ireduce(i32_ty, begin_v)
    };
    fctx.alloca(loop_var, TypeTerm::int32());
    fctx.store(loop_var, begin_v);
    fctx.builder.seal_block(init_block);
    fctx.builder.ins().jump(cond_block, &[]);

    fctx.builder.switch_to_block(cond_block);
    let (counter, _) = fctx.load(loop_var);
    let cond = fctx.builder.ins().icmp(IntCC::SignedLessThan, counter, end_v);
    fctx.builder.ins().brif(cond, body_block, &[], end_block, &[]);
    fctx.builder.seal_block(cond_block);

    fctx.builder.switch_to_block(body_block);
    for stmt in body {
        compile_stmt(fctx, stmt)?;
    }
    let (counter, _) = fctx.load(loop_var);
    let one = fctx.builder.ins().iconst(cranelift_codegen::ir::types::I32, 1);
    let next = fctx.builder.ins().iadd(counter, one);
    fctx.store(loop_var, next);
    fctx.builder.ins().jump(cond_block, &[]);
    fctx.builder.seal_block(body_block);

    fctx.builder.switch_to_block(end_block);
    fctx.builder.seal_block(end_block);
    Ok(())
}

fn compile_expr(fctx: &mut FunctionCtx, node: &Node) -> Result<(Value, TypeTerm), FastpyError> {
    match node {
        Node::LitInt { value, ty } => {
            let cl_ty = cranelift_type(ty)?;
            if is_float(ty) {
                Ok((fctx.builder.ins().f64const(*value as f64), ty.clone()))
            } else {
                Ok((fctx.builder.ins().iconst(cl_ty, *value), ty.clone()))
            }
        }
        Node::LitFloat { value, ty } => {
            let cl_ty = cranelift_type(ty)?;
            if cl_ty == cranelift_codegen::ir::types::F32 {
                Ok((fctx.builder.ins().f32const(*value as f32), ty.clone()))
            } else {
                Ok((fctx.builder.ins().f64const(*value), ty.clone()))
            }
        }
        Node::LitBool { value, .. } => {
            Ok((fctx.builder.ins().iconst(cranelift_codegen::ir::types::I8, i64::from(*value)), TypeTerm::bool_()))
        }
        Node::Var { name, .. } => Ok(fctx.load(name)),
        Node::Prim { op, args, ty } => compile_prim(fctx, op, args, ty),
        Node::Index { base, index, .. } => compile_index(fctx, base, index),
        Node::Assign { .. } | Node::Return { .. } | Node::Loop { .. } | Node::Noop { .. } => {
            compile_stmt(fctx, node)?;
            Ok((fctx.builder.ins().iconst(cranelift_codegen::ir::types::I32, 0), TypeTerm::int32()))
        }
        Node::App { .. } | Node::Fun { .. } => Err(FastpyError::UnsupportedConstruct(
            "App/Fun nodes are not lowered by codegen".to_string(),
        )),
    }
}

fn compile_prim(
    fctx: &mut FunctionCtx,
    op: &str,
    args: &[Node],
    ty: &TypeTerm,
) -> Result<(Value, TypeTerm), FastpyError> {
    match op {
        "shape#" => {
            let Node::Var { name, .. } = &args[0] else {
                return Err(FastpyError::UnsupportedConstruct("shape# expects a bare array variable".into()));
            };
            let array = fctx
                .arrays
                .get(name)
                .ok_or_else(|| FastpyError::UnsupportedConstruct(format!("`{name}` is not an array parameter")))?;
            Ok((array.shape, ty.clone()))
        }
        "add#" | "mult#" => {
            let (lhs, lhs_ty) = compile_expr(fctx, &args[0])?;
            let (rhs, rhs_ty) = compile_expr(fctx, &args[1])?;
            // §4.5: pick fadd/fmul based on the *left* operand's backend
            // type; the result's Core type is the right operand's (§4.3's
            // asymmetric rule), which is what the caller's `ty` slot holds.
            // `lhs_ty` is what `compile_expr` actually resolved the operand
            // to — the node's own static `ty` slot can't be trusted here,
            // since a specialization may have only been pushed through
            // `compile_expr`'s return value and not (redundantly) re-read
            // from the node itself.
            let float = is_float(&lhs_ty);
            let v = match (op, float) {
                ("add#", true) => fctx.builder.ins().fadd(lhs, rhs),
                ("add#", false) => fctx.builder.ins().iadd(lhs, rhs),
                ("mult#", true) => fctx.builder.ins().fmul(lhs, rhs),
                _ => fctx.builder.ins().imul(lhs, rhs),
            };
            Ok((v, rhs_ty))
        }
        other => Err(FastpyError::UnsupportedConstruct(format!("unknown primitive `{other}`"))),
    }
}

fn compile_index(fctx: &mut FunctionCtx, base: &Node, index: &Node) -> Result<(Value, TypeTerm), FastpyError> {
    let (ix, _) = compile_expr(fctx, index)?;
    // The index is always `Int32` (inference's Index row pins it there), but
    // pointer arithmetic needs it at pointer width: widen before multiplying
    // by the element size, so `iadd` below never mixes an `i32` offset with
    // an `i64` base address.
    let ix64 = fctx.builder.ins().uextend(cranelift_codegen::ir::types::I64, ix);
    if let Node::Var { name, .. } = base {
        if let Some(array) = fctx.arrays.get(name) {
            let elem_ty = array.elem_ty.clone();
            let elem_cl_ty = cranelift_type(&elem_ty)?;
            let data = array.data;
            let offset = fctx.builder.ins().imul_imm(ix64, i64::from(elem_cl_ty.bytes()));
            let addr = fctx.builder.ins().iadd(data, offset);
            let v = fctx.builder.ins().load(elem_cl_ty, MemFlags::trusted(), addr, 0);
            return Ok((v, elem_ty));
        }
    }
    // Non-array-parameter base: a plain pointer-indexed load on the
    // compiled value, per §4.5's fallback clause.
    let (base_v, base_ty) = compile_expr(fctx, base)?;
    let elem_ty = base_ty.array_element().cloned().unwrap_or_else(TypeTerm::int32);
    let elem_cl_ty = cranelift_type(&elem_ty)?;
    let offset = fctx.builder.ins().imul_imm(ix64, i64::from(elem_cl_ty.bytes()));
    let addr = fctx.builder.ins().iadd(base_v, offset);
    let v = fctx.builder.ins().load(elem_cl_ty, MemFlags::trusted(), addr, 0);
    Ok((v, elem_ty))
}
