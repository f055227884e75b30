//! Lagrange interpolation over a prime field chosen from the data.

use itertools::Itertools;

use crate::ntheory::{inverse, is_prime, modulo, mul_mod};
use crate::polynomial::Polynomial;

/// Head-room added above the largest table value before the prime search, so
/// every value sits well below the modulus and small perturbations of the
/// data cannot alias across the field boundary.
pub const MODULUS_HEADROOM: i64 = 100;

/// Miller-Rabin rounds used during the modulus search.
pub const PRIMALITY_ROUNDS: usize = 20;

/// The smallest prime `>= max(y) + headroom`.
///
/// Using a prime strictly greater than every value makes each `y` its own
/// canonical field representative, so the interpolant reproduces the values
/// exactly on integer inputs.
pub fn choose_modulus(points: &[(i64, i64)], headroom: i64, rounds: usize) -> i64 {
    let max_y = points
        .iter()
        .map(|&(_, y)| y)
        .max()
        .expect("empty point set");
    let mut modulus = max_y + headroom;
    while !is_prime(modulus, rounds) {
        modulus += 1;
    }
    modulus
}

/// Lagrange basis polynomial for point `j`: evaluates to 1 at `x_j` and to 0
/// at every other x-coordinate.
fn lagrange_basis(points: &[(i64, i64)], j: usize, m: i64) -> Polynomial {
    let xj = points[j].0;
    let mut basis = Polynomial::one();
    let mut divisor = 1i64;
    for (i, &(xi, _)) in points.iter().enumerate() {
        if i == j {
            continue;
        }
        // Multiply in the factor (X - x_i).
        basis = basis.mul(&Polynomial::new(vec![modulo(m - modulo(xi, m), m), 1]), m);
        divisor = mul_mod(divisor, modulo(xj - xi, m), m);
    }
    basis.mul(&Polynomial::constant(inverse(divisor, m)), m)
}

/// Computes the unique degree < n polynomial passing through the `n` given
/// points, together with the prime modulus it lives under.
pub fn interpolant(points: &[(i64, i64)]) -> (Polynomial, i64) {
    interpolant_with_options(points, MODULUS_HEADROOM, PRIMALITY_ROUNDS)
}

/// [`interpolant`] with explicit modulus head-room and primality rounds.
///
/// The point set must be nonempty with pairwise distinct x-coordinates; the
/// pass only calls this for validated tables, so violations panic.
pub fn interpolant_with_options(
    points: &[(i64, i64)],
    headroom: i64,
    rounds: usize,
) -> (Polynomial, i64) {
    assert!(!points.is_empty(), "cannot interpolate an empty point set");
    assert!(
        points.iter().map(|&(x, _)| x).duplicates().next().is_none(),
        "interpolation points must have distinct x-coordinates"
    );

    let modulus = choose_modulus(points, headroom, rounds);
    let mut poly = Polynomial::zero();
    for (j, &(_, yj)) in points.iter().enumerate() {
        let basis = lagrange_basis(points, j, modulus);
        let term = basis.mul(&Polynomial::constant(modulo(yj, modulus)), modulus);
        poly = poly.add(&term, modulus);
    }
    (poly, modulus)
}
