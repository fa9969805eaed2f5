use core::mem;

use num::bigint::{BigInt, BigUint, Sign};
use num::{Integer, One, Zero};

/// Number of bytes needed to hold `x` big-endian (zero needs none)
pub fn byte_len(x: &BigUint) -> usize {
    ((x.bits() + 7) / 8) as usize
}

/// Ceiling division: ceil(num / den)
///
/// Panics if `den` is zero
pub fn ceil_div(num: &BigUint, den: &BigUint) -> BigUint {
    let (q, r) = num.div_rem(den);
    if r.is_zero() {
        q
    } else {
        q + 1_u32
    }
}

/// Floor division: floor(num / den)
///
/// Panics if `den` is zero
pub fn floor_div(num: &BigUint, den: &BigUint) -> BigUint {
    num.div_floor(den)
}

/// (a * b) mod n
pub fn mul_mod(a: &BigUint, b: &BigUint, n: &BigUint) -> BigUint {
    (a * b).mod_floor(n)
}

/// (base ** exp) mod n
pub fn mod_pow(base: &BigUint, exp: &BigUint, n: &BigUint) -> BigUint {
    base.modpow(exp, n)
}

/// Inverse of `a` modulo `n` using the extended Euclidean algorithm
///
/// Returns None if gcd(a, n) != 1
pub fn inv_mod(a: &BigUint, n: &BigUint) -> Option<BigUint> {
    if n.is_zero() {
        return None;
    }

    let modulus = BigInt::from_biguint(Sign::Plus, n.clone());

    // invariant: old_r == old_t * a (mod n)
    let mut old_r = BigInt::from_biguint(Sign::Plus, a.mod_floor(n));
    let mut r = modulus.clone();
    let mut old_t = BigInt::one();
    let mut t = BigInt::zero();

    while !r.is_zero() {
        let q = &old_r / &r;

        let next_r = &old_r - &q * &r;
        old_r = mem::replace(&mut r, next_r);

        let next_t = &old_t - &q * &t;
        old_t = mem::replace(&mut t, next_t);
    }

    if !old_r.is_one() {
        return None;
    }

    old_t.mod_floor(&modulus).to_biguint()
}

/// Big-endian encoding of `x`, left-padded with zeros to `len` bytes
///
/// Values wider than `len` are returned unpadded
pub fn to_fixed_be(x: &BigUint, len: usize) -> Vec<u8> {
    let bytes = x.to_bytes_be();
    if bytes.len() >= len {
        return bytes;
    }

    let mut res = vec![0_u8; len - bytes.len()];
    res.extend_from_slice(&bytes);
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_ceil_div() {
        let ten = BigUint::from(10_u8);

        assert_eq!(ceil_div(&ten, &BigUint::from(5_u8)), BigUint::from(2_u8));
        assert_eq!(ceil_div(&ten, &BigUint::from(3_u8)), BigUint::from(4_u8));
        assert_eq!(ceil_div(&BigUint::zero(), &ten), BigUint::zero());
        assert_eq!(floor_div(&ten, &BigUint::from(3_u8)), BigUint::from(3_u8));
    }

    #[test]
    #[should_panic]
    fn check_ceil_div_by_zero() {
        ceil_div(&BigUint::one(), &BigUint::zero());
    }

    #[test]
    fn check_inv_mod() {
        let n = BigUint::from(3233_u32);

        for a in [2_u32, 7, 17, 65537, 3232].iter() {
            let a = BigUint::from(*a);
            let inv = inv_mod(&a, &n).unwrap();
            assert_eq!(mul_mod(&a, &inv, &n), BigUint::one());
        }

        // 3233 = 61 * 53
        assert!(inv_mod(&BigUint::from(61_u32), &n).is_none());
        assert!(inv_mod(&BigUint::zero(), &n).is_none());
        assert!(inv_mod(&BigUint::from(5_u32), &BigUint::zero()).is_none());
    }

    #[test]
    fn check_inv_mod_large() {
        // 2**127 - 1 is prime
        let p = (BigUint::one() << 127_usize) - 1_u32;
        let a = BigUint::parse_bytes(b"deadbeefcafebabe0123456789abcdef", 16).unwrap() % &p;
        let inv = inv_mod(&a, &p).unwrap();

        assert_eq!(mul_mod(&a, &inv, &p), BigUint::one());
        assert_eq!(inv, mod_pow(&a, &(&p - 2_u32), &p));
    }

    #[test]
    fn check_to_fixed_be() {
        let x = BigUint::from(0x0102_u16);

        assert_eq!(to_fixed_be(&x, 4), [0x00, 0x00, 0x01, 0x02].to_vec());
        assert_eq!(to_fixed_be(&x, 2), [0x01, 0x02].to_vec());
        assert_eq!(to_fixed_be(&BigUint::zero(), 3), [0x00; 3].to_vec());
        assert_eq!(byte_len(&x), 2);
        assert_eq!(byte_len(&BigUint::zero()), 0);
    }
}
