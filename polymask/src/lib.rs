//! polymask replaces user-annotated constant lookup tables with calls to a
//! synthesized polynomial.
//!
//! A table marked with the `"interpolate"` annotation, such as
//! `int32 T[5] = {7, 2, 9, 4, 1}`, is absorbed: the pass reconstructs the
//! unique polynomial through the points `(i, T[i])` over a prime field chosen
//! just above the table's values, emits a private function that evaluates it
//! modulo that prime (delegating monomial powers to an external `modpow`
//! helper), and rewrites every `T[i]` load into a call. The table itself, now
//! unreferenced, is erased, along with its annotation entry.
//!
//! Candidates whose type or uses fall outside the rewritable shapes are
//! skipped with a diagnostic and left untouched; the pass either produces a
//! verified module or leaves a candidate alone.

pub mod annotations;
pub mod config;
pub mod eligibility;
pub mod pass;
pub mod rewrite;
pub mod synthesis;

#[cfg(test)]
mod transform_test;

pub use config::PassConfig;
pub use pass::{transform_module, transform_module_with_config};
