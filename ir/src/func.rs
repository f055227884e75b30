//! Functions, instructions, and the function builder.

use crate::consts::ConstId;
use crate::module::{Linkage, Module};
use crate::types::Ty;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FuncId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstId(pub usize);

/// An SSA value: a function argument, the result of an instruction, or a
/// module constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Arg(usize),
    Inst(InstId),
    Const(ConstId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Mul,
    URem,
}

/// The instruction set.
///
/// Arithmetic wraps at the operand width; `URem` is remainder on the
/// unsigned interpretation of the bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inst {
    /// Element address: pointer to aggregate plus two indices, the first
    /// through the pointer, the second into the array.
    Gep { base: Value, indices: Vec<Value> },
    Load { ptr: Value },
    Store { ptr: Value, value: Value },
    Call { callee: FuncId, args: Vec<Value> },
    Bin { op: BinOp, lhs: Value, rhs: Value },
    Sext { value: Value, to: Ty },
    Trunc { value: Value, to: Ty },
    Ret(Option<Value>),
}

impl Inst {
    /// The values this instruction consumes.
    pub fn operands(&self) -> Vec<Value> {
        match self {
            Inst::Gep { base, indices } => {
                let mut ops = vec![*base];
                ops.extend(indices.iter().copied());
                ops
            }
            Inst::Load { ptr } => vec![*ptr],
            Inst::Store { ptr, value } => vec![*ptr, *value],
            Inst::Call { args, .. } => args.clone(),
            Inst::Bin { lhs, rhs, .. } => vec![*lhs, *rhs],
            Inst::Sext { value, .. } | Inst::Trunc { value, .. } => vec![*value],
            Inst::Ret(value) => value.iter().copied().collect(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Ret(_))
    }
}

#[derive(Clone, Debug)]
pub struct Block {
    pub label: String,
    pub insts: Vec<InstId>,
}

/// A function: a declaration (no blocks) of an external symbol, or a
/// definition with a body.
///
/// Instructions live in an arena indexed by [`InstId`]; blocks hold the
/// placement order. Replacing an instruction in place keeps its id, so users
/// of the old result see the new one. Erasing removes the placement but
/// leaves the arena slot behind; unplaced slots are unreachable from blocks
/// and rejected by the verifier if still referenced.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub linkage: Linkage,
    blocks: Vec<Block>,
    insts: Vec<Inst>,
}

impl Function {
    pub fn new_declaration(name: impl Into<String>, params: Vec<Ty>, ret: Ty) -> Self {
        Function {
            name: name.into(),
            params,
            ret,
            linkage: Linkage::External,
            blocks: Vec::new(),
            insts: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.0]
    }

    /// All placed instructions in layout order.
    pub fn placed(&self) -> impl Iterator<Item = InstId> + '_ {
        self.blocks.iter().flat_map(|b| b.insts.iter().copied())
    }

    fn position_of(&self, id: InstId) -> Option<(usize, usize)> {
        self.blocks.iter().enumerate().find_map(|(b, block)| {
            block.insts.iter().position(|&i| i == id).map(|p| (b, p))
        })
    }

    /// Appends an instruction to the last block.
    pub fn append(&mut self, inst: Inst) -> InstId {
        let id = InstId(self.insts.len());
        self.insts.push(inst);
        self.blocks
            .last_mut()
            .expect("cannot append to a declaration")
            .insts
            .push(id);
        id
    }

    /// Overwrites the definition of a placed instruction, keeping its id and
    /// position. Users of the old result now consume the new one.
    pub fn replace(&mut self, id: InstId, inst: Inst) {
        assert!(
            self.position_of(id).is_some(),
            "replacing an unplaced instruction"
        );
        self.insts[id.0] = inst;
    }

    /// Removes an instruction from its block. The arena slot stays behind
    /// but is no longer reachable.
    pub fn erase(&mut self, id: InstId) {
        let (b, p) = self.position_of(id).expect("erasing an unplaced instruction");
        self.blocks[b].insts.remove(p);
    }

    /// Places a new instruction immediately before `target`.
    pub fn insert_before(&mut self, target: InstId, inst: Inst) -> InstId {
        let (b, p) = self
            .position_of(target)
            .expect("insertion target is not placed");
        let id = InstId(self.insts.len());
        self.insts.push(inst);
        self.blocks[b].insts.insert(p, id);
        id
    }
}

/// Builds a function definition one instruction at a time, in the style of a
/// straight-line entry block, then hands it to the module.
pub struct FunctionBuilder<'a> {
    module: &'a mut Module,
    func: Function,
}

impl<'a> FunctionBuilder<'a> {
    pub fn new(
        module: &'a mut Module,
        name: impl Into<String>,
        params: Vec<Ty>,
        ret: Ty,
        linkage: Linkage,
    ) -> Self {
        let mut func = Function::new_declaration(name, params, ret);
        func.linkage = linkage;
        func.blocks.push(Block {
            label: "entry".into(),
            insts: Vec::new(),
        });
        FunctionBuilder { module, func }
    }

    pub fn arg(&self, index: usize) -> Value {
        assert!(index < self.func.params.len(), "argument out of range");
        Value::Arg(index)
    }

    pub fn const_i64(&mut self, value: i64) -> Value {
        Value::Const(self.module.const_int(Ty::I64, value))
    }

    pub fn const_i32(&mut self, value: i32) -> Value {
        Value::Const(self.module.const_int(Ty::I32, value as i64))
    }

    fn push(&mut self, inst: Inst) -> Value {
        Value::Inst(self.func.append(inst))
    }

    pub fn gep(&mut self, base: Value, first: Value, index: Value) -> Value {
        self.push(Inst::Gep {
            base,
            indices: vec![first, index],
        })
    }

    pub fn load(&mut self, ptr: Value) -> Value {
        self.push(Inst::Load { ptr })
    }

    pub fn store(&mut self, value: Value, ptr: Value) {
        self.push(Inst::Store { ptr, value });
    }

    pub fn call(&mut self, callee: FuncId, args: Vec<Value>) -> Value {
        self.push(Inst::Call { callee, args })
    }

    pub fn add(&mut self, lhs: Value, rhs: Value) -> Value {
        self.push(Inst::Bin {
            op: BinOp::Add,
            lhs,
            rhs,
        })
    }

    pub fn mul(&mut self, lhs: Value, rhs: Value) -> Value {
        self.push(Inst::Bin {
            op: BinOp::Mul,
            lhs,
            rhs,
        })
    }

    pub fn urem(&mut self, lhs: Value, rhs: Value) -> Value {
        self.push(Inst::Bin {
            op: BinOp::URem,
            lhs,
            rhs,
        })
    }

    pub fn sext(&mut self, value: Value, to: Ty) -> Value {
        self.push(Inst::Sext { value, to })
    }

    pub fn trunc(&mut self, value: Value, to: Ty) -> Value {
        self.push(Inst::Trunc { value, to })
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.push(Inst::Ret(value));
    }

    /// Adds the finished function to the module.
    pub fn finish(self) -> FuncId {
        self.module.add_function(self.func)
    }
}
