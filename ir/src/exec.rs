//! A small evaluator for modules.
//!
//! Exists so tests can run a module before and after transformation and
//! compare observable behavior. Memory is modeled per global as a flat
//! vector of 32-bit words, which covers the substrate's loadable globals
//! (packed i32 data arrays). External declarations are resolved through a
//! host-function table; transformed modules bind `modpow` there.

use std::collections::HashMap;

use anyhow::{bail, ensure, Context, Result};

use crate::consts::{Const, ConstId};
use crate::func::{BinOp, FuncId, Inst, InstId, Value};
use crate::module::{GlobalId, Module};

/// An external symbol implementation: flat `i64` arguments, `i64` result.
pub type HostFn = fn(&[i64]) -> i64;

#[derive(Clone, Copy, Debug)]
enum Val {
    Int(i64),
    /// Pointer to element `index` of a global's memory image.
    Elem(GlobalId, i64),
}

pub struct Machine<'a> {
    module: &'a Module,
    host: HashMap<String, HostFn>,
    mem: HashMap<usize, Vec<i64>>,
}

impl<'a> Machine<'a> {
    pub fn new(module: &'a Module) -> Self {
        Machine {
            module,
            host: HashMap::new(),
            mem: HashMap::new(),
        }
    }

    /// Binds an external declaration to a host implementation.
    pub fn bind(&mut self, name: impl Into<String>, f: HostFn) -> &mut Self {
        self.host.insert(name.into(), f);
        self
    }

    /// Calls the named function with integer arguments.
    pub fn call(&mut self, name: &str, args: &[i64]) -> Result<i64> {
        let fid = self
            .module
            .func_by_name(name)
            .with_context(|| format!("no function @{name}"))?;
        let vals = args.iter().map(|&a| Val::Int(a)).collect();
        match self.run(fid, vals)? {
            Some(Val::Int(v)) => Ok(v),
            Some(Val::Elem(..)) => bail!("@{name} returned a pointer"),
            None => bail!("@{name} returned void"),
        }
    }

    fn run(&mut self, fid: FuncId, args: Vec<Val>) -> Result<Option<Val>> {
        let func = self.module.func(fid);
        if func.is_declaration() {
            let host = self
                .host
                .get(&func.name)
                .copied()
                .with_context(|| format!("unbound external @{}", func.name))?;
            let ints = args
                .iter()
                .map(|v| match v {
                    Val::Int(i) => Ok(*i),
                    Val::Elem(..) => bail!("pointer passed to external @{}", func.name),
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Some(Val::Int(host(&ints))));
        }

        let module = self.module;
        let mut locals: HashMap<InstId, Val> = HashMap::new();
        for id in func.placed() {
            let value = |v: Value, locals: &HashMap<InstId, Val>| -> Result<Val> {
                match v {
                    Value::Arg(i) => Ok(args[i]),
                    Value::Inst(inst) => Ok(locals[&inst]),
                    Value::Const(c) => const_val(module, c),
                }
            };
            match func.inst(id) {
                Inst::Gep { base, indices } => {
                    let Val::Elem(gid, 0) = value(*base, &locals)? else {
                        bail!("element address through a non-base pointer");
                    };
                    let Val::Int(first) = value(indices[0], &locals)? else {
                        bail!("pointer used as index");
                    };
                    ensure!(first == 0, "first element-address index must be 0");
                    let Val::Int(idx) = value(indices[1], &locals)? else {
                        bail!("pointer used as index");
                    };
                    locals.insert(id, Val::Elem(gid, idx));
                }
                Inst::Load { ptr } => {
                    let Val::Elem(gid, idx) = value(*ptr, &locals)? else {
                        bail!("load through a non-pointer");
                    };
                    let word = self.read(gid, idx)?;
                    // Loadable memory holds 32-bit words; produce the
                    // sign-extended value.
                    locals.insert(id, Val::Int((word as u32) as i32 as i64));
                }
                Inst::Store { ptr, value: v } => {
                    let stored = value(*v, &locals)?;
                    let Val::Elem(gid, idx) = value(*ptr, &locals)? else {
                        bail!("store through a non-pointer");
                    };
                    let Val::Int(word) = stored else {
                        bail!("storing a pointer");
                    };
                    self.write(gid, idx, (word as u64 & 0xffff_ffff) as i64)?;
                }
                Inst::Call { callee, args: call_args } => {
                    let vals = call_args
                        .iter()
                        .map(|&a| value(a, &locals))
                        .collect::<Result<Vec<_>>>()?;
                    if let Some(v) = self.run(*callee, vals)? {
                        locals.insert(id, v);
                    }
                }
                Inst::Bin { op, lhs, rhs } => {
                    let (Val::Int(a), Val::Int(b)) =
                        (value(*lhs, &locals)?, value(*rhs, &locals)?)
                    else {
                        bail!("arithmetic on pointers");
                    };
                    let r = match op {
                        BinOp::Add => a.wrapping_add(b),
                        BinOp::Mul => a.wrapping_mul(b),
                        BinOp::URem => {
                            ensure!(b != 0, "unsigned remainder by zero");
                            ((a as u64) % (b as u64)) as i64
                        }
                    };
                    locals.insert(id, Val::Int(r));
                }
                // Values are held sign-extended, so widening is the identity.
                Inst::Sext { value: v, .. } => {
                    let val = value(*v, &locals)?;
                    locals.insert(id, val);
                }
                Inst::Trunc { value: v, .. } => {
                    let Val::Int(word) = value(*v, &locals)? else {
                        bail!("truncating a pointer");
                    };
                    locals.insert(id, Val::Int(word as i32 as i64));
                }
                Inst::Ret(None) => return Ok(None),
                Inst::Ret(Some(v)) => return Ok(Some(value(*v, &locals)?)),
            }
        }
        bail!("function fell off the end without returning")
    }

    fn image(&mut self, gid: GlobalId) -> Result<&mut Vec<i64>> {
        if !self.mem.contains_key(&gid.0) {
            let g = self
                .module
                .try_global(gid)
                .context("memory access to an erased global")?;
            let Some(Const::DataArray(elems)) = g.init.map(|c| self.module.get_const(c)) else {
                bail!("@{} has no loadable memory image", g.name);
            };
            self.mem.insert(gid.0, elems.clone());
        }
        Ok(self.mem.get_mut(&gid.0).unwrap())
    }

    fn read(&mut self, gid: GlobalId, idx: i64) -> Result<i64> {
        let image = self.image(gid)?;
        ensure!(
            (0..image.len() as i64).contains(&idx),
            "element index {idx} out of bounds"
        );
        Ok(image[idx as usize])
    }

    fn write(&mut self, gid: GlobalId, idx: i64, word: i64) -> Result<()> {
        ensure!(
            !self.module.global(gid).is_constant,
            "store to constant global @{}",
            self.module.global(gid).name
        );
        let image = self.image(gid)?;
        ensure!(
            (0..image.len() as i64).contains(&idx),
            "element index {idx} out of bounds"
        );
        image[idx as usize] = word;
        Ok(())
    }
}

fn const_val(module: &Module, id: ConstId) -> Result<Val> {
    match module.get_const(id) {
        Const::Int { value, .. } => Ok(Val::Int(*value)),
        Const::GlobalRef(gid) => Ok(Val::Elem(*gid, 0)),
        Const::Bitcast { value, .. } => const_val(module, *value),
        Const::Gep { base, indices } => {
            let Val::Elem(gid, 0) = const_val(module, *base)? else {
                bail!("constant element address through a non-base pointer");
            };
            ensure!(indices[0] == 0, "first element-address index must be 0");
            Ok(Val::Elem(gid, indices[1]))
        }
        c => bail!("aggregate constant {c:?} used as an operand"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::FunctionBuilder;
    use crate::module::Linkage;
    use crate::types::Ty;

    fn lookup_module(values: Vec<i64>) -> Module {
        let mut m = Module::new("t");
        let len = values.len();
        let data = m.const_data_array(values);
        let table = m.add_global("T", Ty::I32.array_of(len), true, Linkage::Private, Some(data));
        let base = m.global_ref(table);
        let mut b = FunctionBuilder::new(&mut m, "lookup", vec![Ty::I64], Ty::I32, Linkage::External);
        let zero = b.const_i64(0);
        let idx = b.arg(0);
        let ptr = b.gep(Value::Const(base), zero, idx);
        let v = b.load(ptr);
        b.ret(Some(v));
        b.finish();
        m
    }

    #[test]
    fn loads_read_the_initializer() {
        let m = lookup_module(vec![10, 20, 30]);
        let mut machine = Machine::new(&m);
        assert_eq!(machine.call("lookup", &[0]).unwrap(), 10);
        assert_eq!(machine.call("lookup", &[2]).unwrap(), 30);
        assert!(machine.call("lookup", &[3]).is_err());
    }

    #[test]
    fn i32_loads_sign_extend() {
        // 0xffffffff as a table word reads back as -1.
        let m = lookup_module(vec![u32::MAX as i64]);
        let mut machine = Machine::new(&m);
        assert_eq!(machine.call("lookup", &[0]).unwrap(), -1);
    }

    #[test]
    fn externals_dispatch_to_host() {
        let mut m = Module::new("t");
        let pow = m.declare_function("modpow", vec![Ty::I64, Ty::I64, Ty::I64], Ty::I64);
        let mut b = FunctionBuilder::new(&mut m, "f", vec![Ty::I64], Ty::I64, Linkage::External);
        let x = b.arg(0);
        let e = b.const_i64(2);
        let modulus = b.const_i64(97);
        let r = b.call(pow, vec![x, e, modulus]);
        b.ret(Some(r));
        b.finish();

        fn square_mod(args: &[i64]) -> i64 {
            (args[0] * args[0]) % args[2]
        }
        let mut machine = Machine::new(&m);
        machine.bind("modpow", square_mod);
        assert_eq!(machine.call("f", &[12]).unwrap(), 144 % 97);
    }

    #[test]
    fn unbound_external_is_an_error() {
        let mut m = Module::new("t");
        let pow = m.declare_function("modpow", vec![Ty::I64, Ty::I64, Ty::I64], Ty::I64);
        let mut b = FunctionBuilder::new(&mut m, "f", vec![], Ty::I64, Linkage::External);
        let zero = b.const_i64(0);
        let one = b.const_i64(1);
        let two = b.const_i64(2);
        let r = b.call(pow, vec![zero, one, two]);
        b.ret(Some(r));
        b.finish();
        let mut machine = Machine::new(&m);
        assert!(machine.call("f", &[]).is_err());
    }

    #[test]
    fn stores_update_memory() {
        let mut m = Module::new("t");
        let data = m.const_data_array(vec![1, 2]);
        let table = m.add_global("M", Ty::I32.array_of(2), false, Linkage::Private, Some(data));
        let base = m.global_ref(table);

        let mut b = FunctionBuilder::new(&mut m, "poke", vec![], Ty::I32, Linkage::External);
        let zero = b.const_i64(0);
        let ptr = b.gep(Value::Const(base), zero, zero);
        let five = b.const_i32(5);
        b.store(five, ptr);
        let v = b.load(ptr);
        b.ret(Some(v));
        b.finish();

        let mut machine = Machine::new(&m);
        assert_eq!(machine.call("poke", &[]).unwrap(), 5);
    }
}
