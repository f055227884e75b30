//! A small typed IR substrate.
//!
//! Modules hold globals, hash-consed constants, and functions over a compact
//! instruction set (element addresses, loads and stores, calls, integer
//! arithmetic, width casts). The crate also provides a function builder, a
//! structural verifier, a stable textual form, and an evaluator so tests can
//! run modules before and after transformation.
//!
//! Instruction ids are stable across in-place replacement: rewriting a load
//! into a call keeps the id, so every user transparently consumes the call's
//! result. Use information is recomputed from live roots on demand rather
//! than maintained incrementally, which keeps mutation simple; callers are
//! expected to collect their worklists before mutating.

pub mod consts;
pub mod exec;
pub mod func;
pub mod module;
mod print;
pub mod types;
pub mod verify;

pub use consts::{Const, ConstId};
pub use exec::{HostFn, Machine};
pub use func::{BinOp, Block, FuncId, Function, FunctionBuilder, Inst, InstId, Value};
pub use module::{Global, GlobalId, Linkage, Module, Use, GLOBAL_ANNOTATIONS};
pub use types::Ty;
pub use verify::verify_module;
