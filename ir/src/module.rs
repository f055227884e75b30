//! Modules: globals, interned constants, functions, annotations.

use std::collections::HashMap;

use anyhow::{bail, ensure, Result};

use crate::consts::{Const, ConstId};
use crate::func::{FuncId, Function, Inst, InstId, Value};
use crate::types::Ty;

/// Name of the conventional array carrying variable annotations from the
/// front end: its entries are `(pointer-to-global, pointer-to-tag-string)`
/// structs.
pub const GLOBAL_ANNOTATIONS: &str = "module.annotations";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlobalId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Linkage {
    External,
    Internal,
    Private,
}

#[derive(Clone, Debug)]
pub struct Global {
    pub name: String,
    /// The value type; the global's address has type `ty*`.
    pub ty: Ty,
    pub is_constant: bool,
    pub linkage: Linkage,
    pub init: Option<ConstId>,
}

/// A reference to a value from somewhere in the live module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Use {
    /// Operand of another live constant expression.
    Const(ConstId),
    /// Operand of a placed instruction.
    Inst(FuncId, InstId),
    /// Initializer of a global.
    Global(GlobalId),
}

#[derive(Default)]
pub struct Module {
    pub name: String,
    globals: Vec<Option<Global>>,
    functions: Vec<Function>,
    consts: Vec<Const>,
    interner: HashMap<Const, ConstId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Default::default()
        }
    }

    // ---- constants ----

    fn intern(&mut self, c: Const) -> ConstId {
        if let Some(&id) = self.interner.get(&c) {
            return id;
        }
        let id = ConstId(self.consts.len());
        self.consts.push(c.clone());
        self.interner.insert(c, id);
        id
    }

    pub fn get_const(&self, id: ConstId) -> &Const {
        &self.consts[id.0]
    }

    pub fn const_int(&mut self, ty: Ty, value: i64) -> ConstId {
        debug_assert!(ty.is_int());
        self.intern(Const::Int { ty, value })
    }

    pub fn const_str(&mut self, s: impl Into<String>) -> ConstId {
        self.intern(Const::Str(s.into()))
    }

    /// Packed 32-bit data array; elements are zero-extended bit patterns.
    pub fn const_data_array(&mut self, elems: Vec<i64>) -> ConstId {
        debug_assert!(elems.iter().all(|&e| (0..=u32::MAX as i64).contains(&e)));
        self.intern(Const::DataArray(elems))
    }

    pub fn const_array(&mut self, elem_ty: Ty, elems: Vec<ConstId>) -> ConstId {
        self.intern(Const::Array { elem_ty, elems })
    }

    pub fn const_struct(&mut self, fields: Vec<ConstId>) -> ConstId {
        self.intern(Const::Struct(fields))
    }

    pub fn global_ref(&mut self, global: GlobalId) -> ConstId {
        self.intern(Const::GlobalRef(global))
    }

    pub fn const_gep(&mut self, base: ConstId, indices: Vec<i64>) -> ConstId {
        self.intern(Const::Gep { base, indices })
    }

    pub fn const_bitcast(&mut self, value: ConstId, ty: Ty) -> ConstId {
        self.intern(Const::Bitcast { value, ty })
    }

    /// The type of a constant, or an error describing how it is ill-formed.
    pub fn try_const_ty(&self, id: ConstId) -> Result<Ty> {
        match self.get_const(id) {
            Const::Int { ty, .. } => {
                ensure!(ty.is_int(), "integer constant with non-integer type {ty}");
                Ok(ty.clone())
            }
            Const::Str(s) => Ok(Ty::I8.array_of(s.len() + 1)),
            Const::DataArray(elems) => Ok(Ty::I32.array_of(elems.len())),
            Const::Array { elem_ty, elems } => {
                for &e in elems {
                    let ty = self.try_const_ty(e)?;
                    ensure!(
                        ty == *elem_ty,
                        "array element of type {ty} in an array of {elem_ty}"
                    );
                }
                Ok(elem_ty.clone().array_of(elems.len()))
            }
            Const::Struct(fields) => {
                let tys = fields
                    .iter()
                    .map(|&f| self.try_const_ty(f))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Ty::Struct(tys))
            }
            Const::GlobalRef(gid) => match self.try_global(*gid) {
                Some(g) => Ok(g.ty.clone().ptr_to()),
                None => bail!("reference to erased global #{}", gid.0),
            },
            Const::Gep { base, indices } => {
                let base_ty = self.try_const_ty(*base)?;
                let Some(Ty::Array(elem, len)) = base_ty.pointee() else {
                    bail!("constant element address into non-array type {base_ty}");
                };
                ensure!(
                    indices.len() == 2,
                    "constant element address takes exactly two indices"
                );
                ensure!(
                    (0..*len as i64).contains(&indices[1]),
                    "constant element index {} out of bounds for {base_ty}",
                    indices[1]
                );
                Ok((**elem).clone().ptr_to())
            }
            Const::Bitcast { value, ty } => {
                let from = self.try_const_ty(*value)?;
                ensure!(
                    from.is_ptr() && ty.is_ptr(),
                    "bitcast is pointer-to-pointer only, got {from} to {ty}"
                );
                Ok(ty.clone())
            }
        }
    }

    /// The type of a constant; panics on ill-formed constants, which the
    /// typed constructors do not produce.
    pub fn const_ty(&self, id: ConstId) -> Ty {
        self.try_const_ty(id).expect("ill-formed constant")
    }

    // ---- globals ----

    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        ty: Ty,
        is_constant: bool,
        linkage: Linkage,
        init: Option<ConstId>,
    ) -> GlobalId {
        let id = GlobalId(self.globals.len());
        self.globals.push(Some(Global {
            name: name.into(),
            ty,
            is_constant,
            linkage,
            init,
        }));
        id
    }

    pub fn try_global(&self, id: GlobalId) -> Option<&Global> {
        self.globals.get(id.0).and_then(|g| g.as_ref())
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        self.try_global(id).expect("use of erased global")
    }

    pub fn global_mut(&mut self, id: GlobalId) -> &mut Global {
        self.globals[id.0].as_mut().expect("use of erased global")
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals()
            .find(|(_, g)| g.name == name)
            .map(|(id, _)| id)
    }

    /// Live globals in id order.
    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &Global)> {
        self.globals
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.as_ref().map(|g| (GlobalId(i), g)))
    }

    /// Removes a global. Its slot becomes a tombstone; surviving references
    /// to its address are caught by the verifier.
    pub fn erase_global(&mut self, id: GlobalId) {
        assert!(self.globals[id.0].take().is_some(), "double global erasure");
    }

    // ---- functions ----

    pub fn add_function(&mut self, func: Function) -> FuncId {
        let id = FuncId(self.functions.len());
        self.functions.push(func);
        id
    }

    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<Ty>,
        ret: Ty,
    ) -> FuncId {
        self.add_function(Function::new_declaration(name, params, ret))
    }

    /// The function named `name`, declaring it if absent.
    pub fn get_or_declare_function(&mut self, name: &str, params: Vec<Ty>, ret: Ty) -> FuncId {
        match self.func_by_name(name) {
            Some(id) => id,
            None => self.declare_function(name, params, ret),
        }
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.functions[id.0]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0]
    }

    pub fn func_by_name(&self, name: &str) -> Option<FuncId> {
        self.funcs().find(|(_, f)| f.name == name).map(|(id, _)| id)
    }

    pub fn funcs(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i), f))
    }

    // ---- typing ----

    pub fn try_value_ty(&self, func: &Function, value: Value) -> Result<Ty> {
        match value {
            Value::Arg(i) => match func.params.get(i) {
                Some(ty) => Ok(ty.clone()),
                None => bail!("argument {i} out of range in @{}", func.name),
            },
            Value::Const(c) => self.try_const_ty(c),
            Value::Inst(id) => self.try_inst_ty(func, func.inst(id)),
        }
    }

    pub fn try_inst_ty(&self, func: &Function, inst: &Inst) -> Result<Ty> {
        match inst {
            Inst::Gep { base, .. } => {
                let base_ty = self.try_value_ty(func, *base)?;
                let Some(Ty::Array(elem, _)) = base_ty.pointee() else {
                    bail!("element address into non-array type {base_ty}");
                };
                Ok((**elem).clone().ptr_to())
            }
            Inst::Load { ptr } => {
                let ptr_ty = self.try_value_ty(func, *ptr)?;
                match ptr_ty.pointee() {
                    Some(t) => Ok(t.clone()),
                    None => bail!("load through non-pointer type {ptr_ty}"),
                }
            }
            Inst::Store { .. } | Inst::Ret(_) => Ok(Ty::Void),
            Inst::Call { callee, .. } => match self.functions.get(callee.0) {
                Some(f) => Ok(f.ret.clone()),
                None => bail!("call to unknown function #{}", callee.0),
            },
            Inst::Bin { lhs, .. } => self.try_value_ty(func, *lhs),
            Inst::Sext { to, .. } | Inst::Trunc { to, .. } => Ok(to.clone()),
        }
    }

    /// The type of a value; panics on ill-formed IR.
    pub fn value_ty(&self, func: &Function, value: Value) -> Ty {
        self.try_value_ty(func, value).expect("ill-formed value")
    }

    // ---- uses ----

    /// Constants reachable from the live roots: global initializers and
    /// placed instruction operands.
    fn live_consts(&self) -> Vec<ConstId> {
        let mut seen = vec![false; self.consts.len()];
        let mut work: Vec<ConstId> = Vec::new();
        for (_, g) in self.globals() {
            work.extend(g.init);
        }
        for (_, f) in self.funcs() {
            for id in f.placed() {
                for op in f.inst(id).operands() {
                    if let Value::Const(c) = op {
                        work.push(c);
                    }
                }
            }
        }
        let mut live = Vec::new();
        while let Some(c) = work.pop() {
            if seen[c.0] {
                continue;
            }
            seen[c.0] = true;
            live.push(c);
            work.extend(self.get_const(c).operands());
        }
        live
    }

    /// Everything in the live module that mentions `id` as a direct operand.
    pub fn const_users(&self, id: ConstId) -> Vec<Use> {
        let mut users = Vec::new();
        for c in self.live_consts() {
            if self.get_const(c).operands().contains(&id) {
                users.push(Use::Const(c));
            }
        }
        for (gid, g) in self.globals() {
            if g.init == Some(id) {
                users.push(Use::Global(gid));
            }
        }
        for (fid, f) in self.funcs() {
            for iid in f.placed() {
                if f.inst(iid).operands().contains(&Value::Const(id)) {
                    users.push(Use::Inst(fid, iid));
                }
            }
        }
        users
    }

    /// Uses of a global's address throughout the live module.
    pub fn uses_of_global(&self, id: GlobalId) -> Vec<Use> {
        match self.interner.get(&Const::GlobalRef(id)) {
            Some(&addr) => self.const_users(addr),
            None => Vec::new(),
        }
    }

    /// Users of an instruction's result within its function.
    pub fn inst_users(&self, fid: FuncId, id: InstId) -> Vec<InstId> {
        let f = self.func(fid);
        f.placed()
            .filter(|&other| f.inst(other).operands().contains(&Value::Inst(id)))
            .collect()
    }

    // ---- annotations ----

    /// Attaches `tag` to a global through the conventional annotations
    /// array, wiring the entry the way front ends do: the global's address
    /// bitcast to `i8*`, paired with a pointer to the tag's string data.
    pub fn annotate_global(&mut self, target: GlobalId, tag: &str) {
        let tag_global = self.tag_string_global(tag);
        let target_ref = self.global_ref(target);
        let cast = self.const_bitcast(target_ref, Ty::I8.ptr_to());
        let tag_ref = self.global_ref(tag_global);
        let tag_ptr = self.const_gep(tag_ref, vec![0, 0]);
        let entry = self.const_struct(vec![cast, tag_ptr]);

        let mut entries = self.annotation_entries();
        entries.push(entry);
        let entry_ty = self.const_ty(entry);
        let array_ty = entry_ty.clone().array_of(entries.len());
        let array = self.const_array(entry_ty, entries);
        match self.global_by_name(GLOBAL_ANNOTATIONS) {
            Some(gid) => {
                let g = self.global_mut(gid);
                g.ty = array_ty;
                g.init = Some(array);
            }
            None => {
                self.add_global(
                    GLOBAL_ANNOTATIONS,
                    array_ty,
                    false,
                    Linkage::External,
                    Some(array),
                );
            }
        }
    }

    /// The entry structs of the annotations array, in order.
    pub fn annotation_entries(&self) -> Vec<ConstId> {
        let Some(gid) = self.global_by_name(GLOBAL_ANNOTATIONS) else {
            return Vec::new();
        };
        match self.global(gid).init.map(|c| self.get_const(c)) {
            Some(Const::Array { elems, .. }) => elems.clone(),
            _ => Vec::new(),
        }
    }

    fn tag_string_global(&mut self, tag: &str) -> GlobalId {
        let name = format!("anno.{tag}");
        if let Some(gid) = self.global_by_name(&name) {
            return gid;
        }
        let data = self.const_str(tag);
        self.add_global(
            name,
            Ty::I8.array_of(tag.len() + 1),
            true,
            Linkage::Private,
            Some(data),
        )
    }
}
