// mesh-core/src/fixed.rs

//! Fixed-point helpers.
//!
//! Every ratio in the engine is an integer with an explicit scale of 1000.
//! Products saturate instead of wrapping and every divisor is floored at 1.

use num_traits::PrimInt;

/// Fixed-point scale: 1000 = 1.0
pub const SCALE: u64 = 1000;

/// Integer square root by Babylonian iteration
pub fn isqrt<T: PrimInt>(n: T) -> T {
    let one = T::one();
    let two = one + one;
    if n <= one {
        return n;
    }

    // ceil(n / 2) avoids the overflow of (n + 1) / 2 at T::max_value()
    let mut x = n / two + n % two;
    let mut y = (x + n / x) / two;
    while y < x {
        x = y;
        y = (x + n / x) / two;
    }
    x
}

/// `a * b / d` in u128, saturating on overflow, `d` floored at 1
pub fn mul_div(a: u128, b: u128, d: u128) -> u128 {
    let d = d.max(1);
    match a.checked_mul(b) {
        Some(product) => product / d,
        // Split a to keep precision before giving up
        None => (a / d).saturating_mul(b).saturating_add((a % d).saturating_mul(b) / d),
    }
}

/// Same as [`mul_div`] for u64 operands, saturating at `u64::MAX`
pub fn mul_div_u64(a: u64, b: u64, d: u64) -> u64 {
    mul_div(a as u128, b as u128, d as u128).min(u64::MAX as u128) as u64
}

/// Exponential moving average with 9:1 old:new weighting
pub fn ema(old: u64, sample: u64) -> u64 {
    (old.saturating_mul(9).saturating_add(sample)) / 10
}

/// `min(observed * 1000 / target, 1000)` with the target floored at 1
pub fn capped_ratio(observed: u64, target: u64) -> u64 {
    mul_div_u64(observed, SCALE, target).min(SCALE)
}
