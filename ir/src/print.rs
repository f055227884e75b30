//! Stable textual form for modules.
//!
//! The output is deterministic for a given module state; tests rely on that
//! to assert that a rejected candidate leaves the module byte-identical.

use std::fmt;

use itertools::Itertools;

use crate::consts::{Const, ConstId};
use crate::func::{BinOp, Function, Inst, InstId, Value};
use crate::module::{Linkage, Module};

fn linkage(l: Linkage) -> &'static str {
    match l {
        Linkage::External => "",
        Linkage::Internal => "internal ",
        Linkage::Private => "private ",
    }
}

fn const_text(m: &Module, id: ConstId) -> String {
    match m.get_const(id) {
        Const::Int { value, .. } => value.to_string(),
        Const::Str(s) => format!("c\"{}\\00\"", s.escape_default()),
        Const::DataArray(elems) => format!("[{}]", elems.iter().join(", ")),
        Const::Array { elems, .. } => {
            format!("[{}]", elems.iter().map(|&e| const_text(m, e)).join(", "))
        }
        Const::Struct(fields) => {
            format!(
                "{{ {} }}",
                fields.iter().map(|&f| const_text(m, f)).join(", ")
            )
        }
        Const::GlobalRef(gid) => format!("@{}", m.global(*gid).name),
        Const::Gep { base, indices } => format!(
            "gep ({}, {})",
            const_text(m, *base),
            indices.iter().join(", ")
        ),
        Const::Bitcast { value, ty } => {
            format!("bitcast ({} to {ty})", const_text(m, *value))
        }
    }
}

fn value_text(m: &Module, v: Value) -> String {
    match v {
        Value::Arg(i) => format!("%a{i}"),
        Value::Inst(id) => format!("%{}", id.0),
        Value::Const(c) => {
            let ty = m.const_ty(c);
            format!("{ty} {}", const_text(m, c))
        }
    }
}

fn inst_text(m: &Module, f: &Function, id: InstId) -> String {
    let v = |val: Value| value_text(m, val);
    match f.inst(id) {
        Inst::Gep { base, indices } => format!(
            "%{} = gep {}, {}",
            id.0,
            v(*base),
            indices.iter().map(|&i| v(i)).join(", ")
        ),
        Inst::Load { ptr } => format!("%{} = load {}", id.0, v(*ptr)),
        Inst::Store { ptr, value } => format!("store {}, {}", v(*value), v(*ptr)),
        Inst::Call { callee, args } => format!(
            "%{} = call @{}({})",
            id.0,
            m.func(*callee).name,
            args.iter().map(|&a| v(a)).join(", ")
        ),
        Inst::Bin { op, lhs, rhs } => {
            let name = match op {
                BinOp::Add => "add",
                BinOp::Mul => "mul",
                BinOp::URem => "urem",
            };
            format!("%{} = {name} {}, {}", id.0, v(*lhs), v(*rhs))
        }
        Inst::Sext { value, to } => format!("%{} = sext {} to {to}", id.0, v(*value)),
        Inst::Trunc { value, to } => format!("%{} = trunc {} to {to}", id.0, v(*value)),
        Inst::Ret(None) => "ret void".to_string(),
        Inst::Ret(Some(value)) => format!("ret {}", v(*value)),
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module \"{}\"", self.name)?;
        for (_, g) in self.globals() {
            let kind = if g.is_constant { "constant" } else { "global" };
            match g.init {
                Some(init) => writeln!(
                    f,
                    "@{} = {}{kind} {} {}",
                    g.name,
                    linkage(g.linkage),
                    g.ty,
                    const_text(self, init)
                )?,
                None => writeln!(f, "@{} = {}{kind} {}", g.name, linkage(g.linkage), g.ty)?,
            }
        }
        for (_, func) in self.funcs() {
            let params = func.params.iter().join(", ");
            if func.is_declaration() {
                writeln!(f, "declare @{}({params}) -> {}", func.name, func.ret)?;
                continue;
            }
            writeln!(
                f,
                "define {}@{}({params}) -> {} {{",
                linkage(func.linkage),
                func.name,
                func.ret
            )?;
            for block in func.blocks() {
                writeln!(f, "{}:", block.label)?;
                for &id in &block.insts {
                    writeln!(f, "  {}", inst_text(self, func, id))?;
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
