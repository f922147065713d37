//! Deterministic Python-compatible hash helpers.
//!
//! ## Cross-type hash invariant
//!
//! Python guarantees that if `a == b` then `hash(a) == hash(b)`. Since
//! `0 == 0.0 == False` and `1 == 1.0 == True`, the hash functions for int,
//! float, and bool must produce identical values for equivalent inputs. The
//! numeric helpers here use the same Mersenne-prime modular algorithm as
//! CPython's `Objects/longobject.c` and `Objects/floatobject.c`, so dict keys
//! like `1`, `1.0` and `True` land in the same slot.
//!
//! String hashing is deterministic FNV-1a: the sandbox has no
//! `PYTHONHASHSEED` equivalent, and hash values never leak to user code.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

/// Mersenne prime used by CPython for numeric hashing: `2^61 - 1`.
const MODULUS: u64 = (1 << 61) - 1;

/// Hashes an arbitrary-precision integer with CPython's modular algorithm.
///
/// The result is `n % (2^61 - 1)` preserving sign, with `-1` remapped to `-2`
/// (CPython reserves `-1` as an internal error sentinel).
#[must_use]
pub(crate) fn hash_int(value: &BigInt) -> u64 {
    if value.is_zero() {
        return 0;
    }
    let modulus = BigInt::from(MODULUS);
    let abs_mod = (value.abs() % &modulus)
        .to_u64()
        .unwrap_or(0);
    let signed = if value.is_negative() {
        -(abs_mod as i64)
    } else {
        abs_mod as i64
    };
    let adjusted = if signed == -1 { -2 } else { signed };
    u64::from_ne_bytes(adjusted.to_ne_bytes())
}

/// Hashes an f64 such that integral floats hash like the equal integer.
///
/// Follows CPython's `_Py_HashDouble`: decompose into mantissa and exponent,
/// fold the mantissa into the Mersenne modulus 28 bits at a time, then rotate
/// by the exponent.
#[must_use]
pub(crate) fn hash_float(value: f64) -> u64 {
    if value.is_nan() {
        // CPython hashes NaN by object identity; a fixed value is fine for a
        // sandbox where NaN keys are pathological anyway.
        return u64::from_ne_bytes(0i64.to_ne_bytes());
    }
    if value.is_infinite() {
        let v: i64 = if value > 0.0 { 314_159 } else { -314_159 };
        return u64::from_ne_bytes(v.to_ne_bytes());
    }
    if value == 0.0 {
        return 0;
    }

    let negative = value < 0.0;
    let (mut mantissa, mut exponent) = frexp(value.abs());

    let mut result: u64 = 0;
    while mantissa != 0.0 {
        result = ((result << 28) & MODULUS) | (result >> (61 - 28));
        mantissa *= 268_435_456.0; // 2**28
        exponent -= 28;
        let digit = mantissa as u64;
        mantissa -= digit as f64;
        result += digit;
        if result >= MODULUS {
            result -= MODULUS;
        }
    }
    let e = exponent.rem_euclid(61) as u32;
    result = ((result << e) & MODULUS) | (result >> (61 - e).min(63));

    let mut signed = result as i64;
    if negative {
        signed = -signed;
    }
    if signed == -1 {
        signed = -2;
    }
    u64::from_ne_bytes(signed.to_ne_bytes())
}

/// Decomposes `x` into `(mantissa, exponent)` with `0.5 <= mantissa < 1`.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let raw_exp = ((bits >> 52) & 0x7ff) as i32;
    if raw_exp == 0 {
        // Subnormal: scale up first.
        let scaled = x * f64::from_bits(0x4330_0000_0000_0000); // 2**52
        let (m, e) = frexp(scaled);
        return (m, e - 52);
    }
    let exponent = raw_exp - 1022;
    let mantissa_bits = (bits & !(0x7ffu64 << 52)) | (1022u64 << 52);
    (f64::from_bits(mantissa_bits), exponent)
}

/// Deterministic FNV-1a over UTF-8 bytes, with CPython's empty-string and
/// `-1` conventions.
#[must_use]
pub(crate) fn hash_str(value: &str) -> u64 {
    if value.is_empty() {
        return 0;
    }
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in value.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    let signed = i64::from_ne_bytes(hash.to_ne_bytes());
    let adjusted = if signed == -1 { -2 } else { signed };
    u64::from_ne_bytes(adjusted.to_ne_bytes())
}

/// Combines element hashes for a tuple, mixing like CPython's xxHash-based
/// tuple hash (simplified to one lane).
#[must_use]
pub(crate) fn hash_tuple(parts: impl Iterator<Item = u64>) -> u64 {
    const PRIME1: u64 = 0x9e37_79b1_85eb_ca87;
    const PRIME2: u64 = 0xc2b2_ae3d_27d4_eb4f;
    let mut acc: u64 = PRIME1;
    let mut len: u64 = 0;
    for part in parts {
        acc = acc.wrapping_add(part.wrapping_mul(PRIME2));
        acc = acc.rotate_left(31);
        acc = acc.wrapping_mul(PRIME1);
        len += 1;
    }
    acc ^= len;
    let signed = i64::from_ne_bytes(acc.to_ne_bytes());
    let adjusted = if signed == -1 { -2 } else { signed };
    u64::from_ne_bytes(adjusted.to_ne_bytes())
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn int_float_bool_collide() {
        assert_eq!(hash_int(&BigInt::from(1)), hash_float(1.0));
        assert_eq!(hash_int(&BigInt::from(0)), hash_float(0.0));
        assert_eq!(hash_int(&BigInt::from(-7)), hash_float(-7.0));
        assert_eq!(hash_int(&BigInt::from(1_000_000)), hash_float(1_000_000.0));
    }

    #[test]
    fn large_int_wraps_modulus() {
        let big = BigInt::from(2u64).pow(61) - 1 + 5;
        // (2^61 - 1 + 5) % (2^61 - 1) == 5
        assert_eq!(hash_int(&big), hash_int(&BigInt::from(5)));
    }

    #[test]
    fn fractional_floats_differ_from_ints() {
        assert_ne!(hash_float(1.5), hash_int(&BigInt::from(1)));
        assert_ne!(hash_float(1.5), hash_int(&BigInt::from(2)));
    }

    #[test]
    fn str_hash_is_deterministic() {
        assert_eq!(hash_str("hello"), hash_str("hello"));
        assert_ne!(hash_str("hello"), hash_str("world"));
        assert_eq!(hash_str(""), 0);
    }

    #[test]
    fn tuple_hash_depends_on_order() {
        let a = hash_tuple([hash_str("a"), hash_str("b")].into_iter());
        let b = hash_tuple([hash_str("b"), hash_str("a")].into_iter());
        assert_ne!(a, b);
    }
}
