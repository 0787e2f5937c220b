//! GF(2^8) arithmetic for Shamir's Secret Sharing
//!
//! Reduction polynomial x^8 + x^4 + x^3 + x^2 + 1 (0x11D) with generator 2.
//! The log/exp tables are built at compile time.

const POLY: u16 = 0x11D;

const fn build_tables() -> ([u8; 256], [u8; 510]) {
    let mut log = [0u8; 256];
    let mut exp = [0u8; 510];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        exp[i + 255] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= POLY;
        }
        i += 1;
    }
    (log, exp)
}

const TABLES: ([u8; 256], [u8; 510]) = build_tables();

/// log[x] for x != 0. log[0] is unused.
static LOG: [u8; 256] = TABLES.0;

/// exp[i] = 2^i, doubled so sums of two logs never need a modulo.
static EXP: [u8; 510] = TABLES.1;

/// Field addition (and subtraction): XOR
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

#[inline]
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    EXP[LOG[a as usize] as usize + LOG[b as usize] as usize]
}

/// Field division. `b` must be non-zero; callers guarantee distinct share
/// indices so Lagrange denominators never vanish.
#[inline]
pub fn div(a: u8, b: u8) -> u8 {
    debug_assert!(b != 0, "division by zero in GF(256)");
    if a == 0 || b == 0 {
        return 0;
    }
    EXP[LOG[a as usize] as usize + 255 - LOG[b as usize] as usize]
}

/// Horner evaluation; `coefficients[0]` is the constant term.
pub fn eval_poly(coefficients: &[u8], x: u8) -> u8 {
    coefficients
        .iter()
        .rev()
        .fold(0u8, |acc, &coef| add(mul(acc, x), coef))
}

/// Lagrange basis weights for evaluating at x = 0.
///
/// `weights[i] = prod_{j != i} x_j / (x_i - x_j)`. Computed once per share
/// set and reused for every byte position.
pub fn basis_at_zero(xs: &[u8]) -> Vec<u8> {
    xs.iter()
        .enumerate()
        .map(|(i, &xi)| {
            let mut num = 1u8;
            let mut den = 1u8;
            for (j, &xj) in xs.iter().enumerate() {
                if i != j {
                    num = mul(num, xj);
                    den = mul(den, add(xi, xj));
                }
            }
            div(num, den)
        })
        .collect()
}

/// Interpolate the constant term from pre-computed basis weights.
pub fn interpolate_with(weights: &[u8], ys: impl Iterator<Item = u8>) -> u8 {
    weights
        .iter()
        .zip(ys)
        .fold(0u8, |acc, (&w, y)| add(acc, mul(w, y)))
}
