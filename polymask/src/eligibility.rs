//! Candidate validity and rewritability.
//!
//! Both checks are pure: they walk uses and mutate nothing, producing a
//! complete worklist up front so the rewrite never iterates a use list it is
//! also editing.

use polymask_ir::{
    Const, ConstId, FuncId, GlobalId, Inst, InstId, Module, Ty, Use, Value, GLOBAL_ANNOTATIONS,
};

/// The index feeding a rewritten load: a runtime operand taken from an
/// address instruction, or a literal from a constant-form address.
#[derive(Clone, Copy, Debug)]
pub enum TableIndex {
    Value(Value),
    Literal(i64),
}

/// Everything the rewrite needs, collected before any mutation.
#[derive(Debug, Default)]
pub struct RewritePlan {
    /// Loads to replace, each with the index feeding its address.
    pub loads: Vec<(FuncId, InstId, TableIndex)>,
    /// Instruction-form element addresses that become redundant.
    pub geps: Vec<(FuncId, InstId)>,
}

/// Whether the global has the shape the transformation covers: a constant
/// array of 32-bit integers with a packed initializer of matching length.
pub fn table_shape(module: &Module, gid: GlobalId) -> bool {
    let g = module.global(gid);
    let Ty::Array(elem, len) = &g.ty else {
        return false;
    };
    if **elem != Ty::I32 || !g.is_constant {
        return false;
    }
    match g.init.map(|init| module.get_const(init)) {
        Some(Const::DataArray(elems)) => elems.len() == *len,
        _ => false,
    }
}

/// The `(index, value)` points of a valid table; values are the
/// zero-extended 32-bit patterns of the initializer.
pub fn extract_points(module: &Module, gid: GlobalId) -> Vec<(i64, i64)> {
    debug_assert!(table_shape(module, gid));
    let init = module.global(gid).init.expect("validated table");
    let Const::DataArray(elems) = module.get_const(init) else {
        unreachable!("validated table initializer");
    };
    elems
        .iter()
        .enumerate()
        .map(|(i, &y)| (i as i64, y))
        .collect()
}

/// Decides whether every use of the table is rewritable and, if so, returns
/// the worklist. `None` means some use falls outside the permitted shapes.
pub fn plan_rewrite(module: &Module, gid: GlobalId) -> Option<RewritePlan> {
    let mut plan = RewritePlan::default();
    for table_use in module.uses_of_global(gid) {
        match table_use {
            Use::Inst(fid, iid) => {
                let func = module.func(fid);
                let Inst::Gep { indices, .. } = func.inst(iid) else {
                    return None;
                };
                if indices.len() != 2 || !is_const_zero(module, indices[0]) {
                    return None;
                }
                let index = indices[1];
                for user in module.inst_users(fid, iid) {
                    match func.inst(user) {
                        Inst::Load { .. } => {
                            plan.loads.push((fid, user, TableIndex::Value(index)));
                        }
                        // Stores and unknown instructions disqualify.
                        _ => return None,
                    }
                }
                plan.geps.push((fid, iid));
            }
            Use::Const(cid) => match module.get_const(cid) {
                Const::Gep { indices, .. } => {
                    if indices.len() != 2 || indices[0] != 0 {
                        return None;
                    }
                    let users = module.const_users(cid);
                    let [Use::Inst(fid, iid)] = users.as_slice() else {
                        return None;
                    };
                    match module.func(*fid).inst(*iid) {
                        Inst::Load { .. } => {
                            plan.loads
                                .push((*fid, *iid, TableIndex::Literal(indices[1])));
                        }
                        _ => return None,
                    }
                }
                Const::Bitcast { .. } | Const::Struct(_) => {
                    if !is_annotation_wiring(module, cid) {
                        return None;
                    }
                }
                _ => return None,
            },
            Use::Global(_) => return None,
        }
    }
    Some(plan)
}

fn is_const_zero(module: &Module, v: Value) -> bool {
    matches!(
        v,
        Value::Const(c) if matches!(module.get_const(c), Const::Int { value: 0, .. })
    )
}

/// Recognizes the annotation plumbing: the cast of the table (or, from front
/// ends that skip the cast, the entry struct itself) must feed exactly one
/// struct, which feeds exactly one array, which initializes the annotations
/// variable. Anything off that spine disqualifies the table.
fn is_annotation_wiring(module: &Module, cid: ConstId) -> bool {
    let entry = match module.get_const(cid) {
        Const::Bitcast { .. } => {
            let users = module.const_users(cid);
            let [Use::Const(entry)] = users.as_slice() else {
                return false;
            };
            if !matches!(module.get_const(*entry), Const::Struct(_)) {
                return false;
            }
            *entry
        }
        Const::Struct(_) => cid,
        _ => return false,
    };
    let users = module.const_users(entry);
    let [Use::Const(array)] = users.as_slice() else {
        return false;
    };
    if !matches!(module.get_const(*array), Const::Array { .. }) {
        return false;
    }
    let users = module.const_users(*array);
    let [Use::Global(gid)] = users.as_slice() else {
        return false;
    };
    module.global(*gid).name == GLOBAL_ANNOTATIONS
}

#[cfg(test)]
mod tests {
    use polymask_ir::{FunctionBuilder, Linkage};

    use super::*;

    fn annotated_table(m: &mut Module, name: &str, values: Vec<i64>) -> GlobalId {
        let len = values.len();
        let data = m.const_data_array(values);
        let gid = m.add_global(name, Ty::I32.array_of(len), true, Linkage::Private, Some(data));
        m.annotate_global(gid, "interpolate");
        gid
    }

    fn add_lookup(m: &mut Module, table: GlobalId) {
        let base = m.global_ref(table);
        let mut b = FunctionBuilder::new(m, "lookup", vec![Ty::I64], Ty::I32, Linkage::External);
        let zero = b.const_i64(0);
        let idx = b.arg(0);
        let ptr = b.gep(Value::Const(base), zero, idx);
        let v = b.load(ptr);
        b.ret(Some(v));
        b.finish();
    }

    #[test]
    fn shape_accepts_packed_i32_tables() {
        let mut m = Module::new("t");
        let table = annotated_table(&mut m, "T", vec![1, 2, 3]);
        assert!(table_shape(&m, table));
        assert_eq!(extract_points(&m, table), vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn shape_rejects_non_i32_and_non_constant() {
        let mut m = Module::new("t");
        let i64s = m.add_global("A", Ty::I64.array_of(2), true, Linkage::Private, None);
        assert!(!table_shape(&m, i64s));
        let data = m.const_data_array(vec![1]);
        let mutable = m.add_global("B", Ty::I32.array_of(1), false, Linkage::Private, Some(data));
        assert!(!table_shape(&m, mutable));
    }

    #[test]
    fn plan_covers_annotated_lookup() {
        let mut m = Module::new("t");
        let table = annotated_table(&mut m, "T", vec![1, 2, 3]);
        add_lookup(&mut m, table);
        let plan = plan_rewrite(&m, table).expect("rewritable");
        assert_eq!(plan.loads.len(), 1);
        assert_eq!(plan.geps.len(), 1);
    }

    #[test]
    fn store_through_address_disqualifies() {
        let mut m = Module::new("t");
        let table = annotated_table(&mut m, "T", vec![1, 2, 3]);
        let base = m.global_ref(table);
        let mut b = FunctionBuilder::new(&mut m, "poke", vec![], Ty::Void, Linkage::External);
        let zero = b.const_i64(0);
        let ptr = b.gep(Value::Const(base), zero, zero);
        let five = b.const_i32(5);
        b.store(five, ptr);
        b.ret(None);
        b.finish();
        assert!(plan_rewrite(&m, table).is_none());
    }

    #[test]
    fn constant_form_address_with_one_load_qualifies() {
        let mut m = Module::new("t");
        let table = annotated_table(&mut m, "T", vec![9, 8]);
        let base = m.global_ref(table);
        let addr = m.const_gep(base, vec![0, 1]);
        let mut b = FunctionBuilder::new(&mut m, "first", vec![], Ty::I32, Linkage::External);
        let v = b.load(Value::Const(addr));
        b.ret(Some(v));
        b.finish();
        let plan = plan_rewrite(&m, table).expect("rewritable");
        assert_eq!(plan.loads.len(), 1);
        assert!(matches!(plan.loads[0].2, TableIndex::Literal(1)));
        assert!(plan.geps.is_empty());
    }

    #[test]
    fn annotation_wiring_alone_is_rewritable() {
        let mut m = Module::new("t");
        let table = annotated_table(&mut m, "T", vec![1]);
        let plan = plan_rewrite(&m, table).expect("rewritable");
        assert!(plan.loads.is_empty() && plan.geps.is_empty());
    }
}
