//! Splicing the synthesized evaluator over the table's load sites.

use polymask_ir::{FuncId, Inst, Module, Ty, Value};

use crate::eligibility::{RewritePlan, TableIndex};

/// Applies a collected plan: every load becomes a call to `poly_fn` on its
/// index, then the now-redundant address instructions are erased.
/// Constant-form addresses need no explicit deletion; they die with the
/// table global.
pub fn apply_rewrite(module: &mut Module, plan: &RewritePlan, poly_fn: FuncId) {
    for &(fid, load, index) in &plan.loads {
        let arg = match index {
            TableIndex::Literal(i) => Value::Const(module.const_int(Ty::I64, i)),
            TableIndex::Value(v) => {
                // Address operands may be narrower than the evaluator's i64
                // parameter; widen in front of the rewritten load.
                if module.value_ty(module.func(fid), v) == Ty::I64 {
                    v
                } else {
                    let sext = module
                        .func_mut(fid)
                        .insert_before(load, Inst::Sext { value: v, to: Ty::I64 });
                    Value::Inst(sext)
                }
            }
        };
        module.func_mut(fid).replace(
            load,
            Inst::Call {
                callee: poly_fn,
                args: vec![arg],
            },
        );
    }
    for &(fid, gep) in &plan.geps {
        module.func_mut(fid).erase(gep);
    }
}
