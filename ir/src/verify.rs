//! Structural module verification.
//!
//! The verifier is the last line of defense after a transformation: it
//! type-checks every live constant and instruction, enforces def-before-use
//! and block termination, and rejects dangling references to erased globals.

use std::collections::HashSet;

use anyhow::{bail, ensure, Context, Result};

use crate::func::{Function, Inst, InstId, Value};
use crate::module::Module;
use crate::types::Ty;

pub fn verify_module(module: &Module) -> Result<()> {
    let mut global_names = HashSet::new();
    for (_, g) in module.globals() {
        ensure!(global_names.insert(&g.name), "duplicate global @{}", g.name);
        if let Some(init) = g.init {
            let init_ty = module
                .try_const_ty(init)
                .with_context(|| format!("initializer of @{}", g.name))?;
            ensure!(
                init_ty == g.ty,
                "@{}: initializer type {init_ty} does not match value type {}",
                g.name,
                g.ty
            );
        } else {
            ensure!(!g.is_constant, "constant global @{} lacks an initializer", g.name);
        }
    }

    let mut func_names = HashSet::new();
    for (_, f) in module.funcs() {
        ensure!(func_names.insert(&f.name), "duplicate function @{}", f.name);
        verify_function(module, f).with_context(|| format!("in function @{}", f.name))?;
    }
    Ok(())
}

fn verify_function(module: &Module, func: &Function) -> Result<()> {
    use crate::module::Linkage;

    if func.is_declaration() {
        ensure!(
            func.linkage == Linkage::External,
            "declaration must have external linkage"
        );
        return Ok(());
    }

    let mut seen: HashSet<InstId> = HashSet::new();
    for block in func.blocks() {
        ensure!(!block.insts.is_empty(), "empty block '{}'", block.label);
        for (pos, &id) in block.insts.iter().enumerate() {
            let inst = func.inst(id);
            let last = pos + 1 == block.insts.len();
            ensure!(
                inst.is_terminator() == last,
                "block '{}' must end with its only terminator",
                block.label
            );
            for op in inst.operands() {
                check_operand(module, func, &seen, op)?;
            }
            check_inst(module, func, inst)?;
            seen.insert(id);
        }
    }
    Ok(())
}

fn check_operand(
    module: &Module,
    func: &Function,
    seen: &HashSet<InstId>,
    op: Value,
) -> Result<()> {
    match op {
        Value::Arg(i) => ensure!(i < func.params.len(), "argument {i} out of range"),
        Value::Inst(id) => ensure!(
            seen.contains(&id),
            "operand %{} used before definition",
            id.0
        ),
        Value::Const(c) => {
            module
                .try_const_ty(c)
                .with_context(|| format!("constant operand #{}", c.0))?;
        }
    }
    Ok(())
}

fn check_inst(module: &Module, func: &Function, inst: &Inst) -> Result<()> {
    let ty_of = |v: Value| module.try_value_ty(func, v);
    match inst {
        Inst::Gep { base, indices } => {
            let base_ty = ty_of(*base)?;
            let Some(Ty::Array(..)) = base_ty.pointee() else {
                bail!("element address into non-array type {base_ty}");
            };
            ensure!(
                indices.len() == 2,
                "element address takes exactly two indices"
            );
            for &idx in indices {
                let idx_ty = ty_of(idx)?;
                ensure!(idx_ty.is_int(), "element index of type {idx_ty}");
            }
        }
        Inst::Load { ptr } => {
            let ptr_ty = ty_of(*ptr)?;
            match ptr_ty.pointee() {
                Some(t) => ensure!(t.is_int(), "load of non-integer type {t}"),
                None => bail!("load through non-pointer type {ptr_ty}"),
            }
        }
        Inst::Store { ptr, value } => {
            let ptr_ty = ty_of(*ptr)?;
            let Some(pointee) = ptr_ty.pointee() else {
                bail!("store through non-pointer type {ptr_ty}");
            };
            let value_ty = ty_of(*value)?;
            ensure!(
                value_ty == *pointee,
                "storing {value_ty} through {ptr_ty}"
            );
        }
        Inst::Call { callee, args } => {
            let Some((_, target)) = module.funcs().find(|(id, _)| id == callee) else {
                bail!("call to unknown function #{}", callee.0);
            };
            ensure!(
                args.len() == target.params.len(),
                "call to @{} with {} arguments, expected {}",
                target.name,
                args.len(),
                target.params.len()
            );
            for (arg, param) in args.iter().zip(&target.params) {
                let arg_ty = ty_of(*arg)?;
                ensure!(
                    arg_ty == *param,
                    "argument of type {arg_ty} passed to @{} parameter of type {param}",
                    target.name
                );
            }
        }
        Inst::Bin { lhs, rhs, .. } => {
            let lhs_ty = ty_of(*lhs)?;
            let rhs_ty = ty_of(*rhs)?;
            ensure!(
                lhs_ty == rhs_ty && matches!(lhs_ty, Ty::I32 | Ty::I64),
                "binary operation on {lhs_ty} and {rhs_ty}"
            );
        }
        Inst::Sext { value, to } => {
            let from = ty_of(*value)?;
            ensure!(
                from == Ty::I32 && *to == Ty::I64,
                "sign extension from {from} to {to}"
            );
        }
        Inst::Trunc { value, to } => {
            let from = ty_of(*value)?;
            ensure!(
                from == Ty::I64 && *to == Ty::I32,
                "truncation from {from} to {to}"
            );
        }
        Inst::Ret(value) => match (value, &func.ret) {
            (None, Ty::Void) => {}
            (None, ret) => bail!("missing return value of type {ret}"),
            (Some(v), ret) => {
                let ty = ty_of(*v)?;
                ensure!(ty == *ret, "returning {ty} from a function of type {ret}");
            }
        },
    }
    Ok(())
}
