//! Synthesis of the polynomial evaluator function.

use polymask_field::polynomial::Polynomial;
use polymask_ir::{FuncId, FunctionBuilder, Linkage, Module, Ty};

/// Emits a private function `poly_<table>(i64) -> i32` evaluating the
/// interpolating polynomial modulo `modulus`, and returns its id.
///
/// Monomial powers are delegated to the external `modpow(i64, i64, i64) ->
/// i64` helper, declared on first use; the runtime linking that symbol makes
/// the transformed module whole. The accumulator is reduced by `urem
/// modulus` after every addition, so no partial sum ever leaves `[0,
/// modulus)` ahead of a product term; summing everything first and reducing
/// once would silently wrap for higher-degree tables.
pub fn build_poly_fn(
    module: &mut Module,
    table_name: &str,
    poly: &Polynomial,
    modulus: i64,
) -> FuncId {
    let modpow = module.get_or_declare_function(
        "modpow",
        vec![Ty::I64, Ty::I64, Ty::I64],
        Ty::I64,
    );

    let mut b = FunctionBuilder::new(
        module,
        format!("poly_{table_name}"),
        vec![Ty::I64],
        Ty::I32,
        Linkage::Private,
    );
    let index = b.arg(0);
    let m = b.const_i64(modulus);

    let mut acc = b.const_i64(poly.coeffs[0]);
    for (i, &coeff) in poly.coeffs.iter().enumerate().skip(1) {
        let exp = b.const_i64(i as i64);
        let power = b.call(modpow, vec![index, exp, m]);
        let c = b.const_i64(coeff);
        let term = b.mul(power, c);
        acc = b.add(acc, term);
        acc = b.urem(acc, m);
    }
    if poly.coeffs.len() == 1 {
        // Constant table: still reduce, so every body ends the same way.
        acc = b.urem(acc, m);
    }

    let result = b.trunc(acc, Ty::I32);
    b.ret(Some(result));
    b.finish()
}
