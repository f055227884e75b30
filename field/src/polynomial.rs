//! Dense polynomials with coefficients reduced modulo a prime.

use std::cmp::max;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::ntheory::mul_mod;

/// A polynomial in coefficient form; `coeffs[i]` is the coefficient of `x^i`.
///
/// Coefficients are canonical representatives in `[0, m)` for the modulus the
/// polynomial was built under. The vector is always trimmed: either it is
/// exactly `[0]`, or the last coefficient is nonzero.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    pub coeffs: Vec<i64>,
}

impl Polynomial {
    /// Builds a polynomial from raw coefficients, trimming trailing zeros.
    pub fn new(coeffs: Vec<i64>) -> Self {
        let mut poly = Polynomial { coeffs };
        poly.trim();
        poly
    }

    /// The constant polynomial `c`.
    pub fn constant(c: i64) -> Self {
        Polynomial { coeffs: vec![c] }
    }

    pub fn zero() -> Self {
        Self::constant(0)
    }

    pub fn one() -> Self {
        Self::constant(1)
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs == [0]
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    /// Drops trailing zero coefficients; the all-zero polynomial stays `[0]`.
    pub fn trim(&mut self) {
        while self.coeffs.len() > 1 && self.coeffs.last() == Some(&0) {
            self.coeffs.pop();
        }
        if self.coeffs.is_empty() {
            self.coeffs.push(0);
        }
    }

    /// Coefficient-wise sum modulo `m`. Inputs must already be reduced.
    pub fn add(&self, other: &Self, m: i64) -> Self {
        let len = max(self.coeffs.len(), other.coeffs.len());
        let coeffs = (0..len)
            .map(|i| {
                let a = self.coeffs.get(i).copied().unwrap_or(0);
                let b = other.coeffs.get(i).copied().unwrap_or(0);
                (a + b) % m
            })
            .collect();
        Self::new(coeffs)
    }

    /// Schoolbook product modulo `m`. Inputs must already be reduced.
    pub fn mul(&self, other: &Self, m: i64) -> Self {
        let mut coeffs = vec![0i64; self.coeffs.len() + other.coeffs.len() - 1];
        for (i, &a) in self.coeffs.iter().enumerate() {
            for (j, &b) in other.coeffs.iter().enumerate() {
                coeffs[i + j] = (coeffs[i + j] + mul_mod(a, b, m)) % m;
            }
        }
        Self::new(coeffs)
    }

    /// Horner evaluation at `x`, reduced modulo `m`.
    pub fn eval_mod(&self, x: i64, m: i64) -> i64 {
        self.coeffs
            .iter()
            .rev()
            .fold(0, |acc, &c| (mul_mod(acc, x, m) + c) % m)
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let terms = self
            .coeffs
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c != 0)
            .map(|(i, c)| {
                if i == 0 {
                    c.to_string()
                } else {
                    format!("{c}*x^{i}")
                }
            })
            .join(" + ");
        write!(f, "{terms}")
    }
}
