//! Integer math with 128-bit intermediates and explicit rounding.
//!
//! Every amount computation in the exchange engine goes through these
//! helpers: products of two 64-bit amounts are formed in 128 bits, divisions
//! state their rounding direction explicitly, and overflow is an error rather
//! than a wrap. The rounding convention is load-bearing: amounts charged to a
//! payer round up, amounts credited to a payee round down, so the ledger
//! never pays out more value than it takes in.
//!
//! # Example
//!
//! ```
//! use meridian_common::math::{big_divide, Rounding};
//!
//! // (large_a * large_b) / divisor without overflow
//! let result = big_divide(1_000_000_000, 1_000_000, 1000, Rounding::Down);
//! assert_eq!(result, Ok(1_000_000_000_000));
//! ```

/// Rounding mode for division operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round toward zero (truncate).
    Down,
    /// Round away from zero (ceiling for positive results).
    Up,
}

/// Error type for math operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    /// The result overflows the target type.
    Overflow,
    /// Division by zero was attempted.
    DivisionByZero,
    /// An input was negative where non-negative was required.
    NegativeInput,
}

impl std::fmt::Display for MathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MathError::Overflow => write!(f, "overflow in wide integer arithmetic"),
            MathError::DivisionByZero => write!(f, "division by zero"),
            MathError::NegativeInput => write!(f, "negative input where non-negative required"),
        }
    }
}

impl std::error::Error for MathError {}

/// Calculates `a * b / c` when `a * b` might overflow 64 bits.
///
/// Uses 128-bit intermediate arithmetic; the result must fit in `i64`.
pub fn big_divide(a: i64, b: i64, c: i64, rounding: Rounding) -> Result<i64, MathError> {
    if a < 0 || b < 0 {
        return Err(MathError::NegativeInput);
    }
    if c <= 0 {
        return Err(MathError::DivisionByZero);
    }

    let result = big_divide_unsigned(a as u64, b as u64, c as u64, rounding)?;

    if result > i64::MAX as u64 {
        return Err(MathError::Overflow);
    }

    Ok(result as i64)
}

/// Calculates `a * b / c` using unsigned arithmetic with a 128-bit product.
pub fn big_divide_unsigned(a: u64, b: u64, c: u64, rounding: Rounding) -> Result<u64, MathError> {
    if c == 0 {
        return Err(MathError::DivisionByZero);
    }
    big_divide_unsigned_128((a as u128) * (b as u128), c, rounding)
}

/// Divides a 128-bit value by a 64-bit divisor, returning an `i64`.
///
/// Used when the numerator is already a 128-bit product.
pub fn big_divide_128(a: u128, b: i64, rounding: Rounding) -> Result<i64, MathError> {
    if b <= 0 {
        return Err(MathError::DivisionByZero);
    }

    let result = big_divide_unsigned_128(a, b as u64, rounding)?;

    if result > i64::MAX as u64 {
        return Err(MathError::Overflow);
    }

    Ok(result as i64)
}

/// Divides a 128-bit value by a 64-bit unsigned divisor.
pub fn big_divide_unsigned_128(a: u128, b: u64, rounding: Rounding) -> Result<u64, MathError> {
    if b == 0 {
        return Err(MathError::DivisionByZero);
    }

    let b128 = b as u128;

    let result = match rounding {
        Rounding::Down => a / b128,
        Rounding::Up => {
            if a > u128::MAX - (b128 - 1) {
                return Err(MathError::Overflow);
            }
            a.div_ceil(b128)
        }
    };

    if result > u64::MAX as u128 {
        return Err(MathError::Overflow);
    }

    Ok(result as u64)
}

/// Multiplies two u64 values, returning a u128 result.
///
/// Cannot overflow since `u64 * u64` always fits in `u128`.
#[inline]
pub fn big_multiply_unsigned(a: u64, b: u64) -> u128 {
    (a as u128) * (b as u128)
}

/// Multiplies two non-negative i64 values, returning a u128 result.
///
/// # Panics
///
/// Panics if either input is negative.
#[inline]
pub fn big_multiply(a: i64, b: i64) -> u128 {
    assert!(a >= 0 && b >= 0, "big_multiply requires non-negative inputs");
    big_multiply_unsigned(a as u64, b as u64)
}

/// Computes the integer square root of `a * b`.
///
/// Returns x such that `x * x <= a * b < (x + 1) * (x + 1)`. Used to issue
/// initial pool shares at the geometric mean of the deposited reserves.
///
/// Uses the modified Babylonian method with 128-bit precision.
pub fn big_square_root(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        return 0;
    }

    let sqrt_ceil = big_square_root_ceil(a, b);

    // Check if sqrt_ceil is exact
    if big_multiply_unsigned(sqrt_ceil, sqrt_ceil) <= big_multiply_unsigned(a, b) {
        return sqrt_ceil;
    }

    // sqrt_ceil > 0 because 0*0 <= a*b for all a, b
    sqrt_ceil - 1
}

/// Computes ceil(sqrt(a * b)) using the modified Babylonian method.
fn big_square_root_ceil(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        return 0;
    }

    // R = a * b - 1
    let r = big_multiply_unsigned(a, b) - 1;

    // Seed with a reasonable estimate: 2^(ceil(bits/2))
    let num_bits = 128 - r.leading_zeros();
    let seed_bits = num_bits.div_ceil(2);
    let mut x = if seed_bits >= 64 {
        u64::MAX
    } else {
        1u64 << seed_bits
    };

    let mut prev = 0u64;
    while x != prev {
        prev = x;

        // y = ceil(R / x)
        let y = match big_divide_unsigned_128(r, x, Rounding::Up) {
            Ok(v) => v,
            Err(_) => return x, // Overflow means we're done
        };

        // x = ceil((x + y) / 2)
        if u64::MAX - x <= y {
            let temp = (x as u128) + (y as u128);
            x = temp.div_ceil(2) as u64;
        } else {
            x = (x + y).div_ceil(2);
        }
    }

    x
}
