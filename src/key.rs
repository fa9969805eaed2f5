use num::bigint::BigUint;
use num::{Integer, One, Zero};

use crate::bignat::{byte_len, mod_pow, mul_mod, to_fixed_be};
use crate::error::Error;
use crate::interval::Interval;

/// Minimum modulus length in bytes for a PKCS#1 v1.5 encryption block
///
/// Two header bytes, eight padding bytes and the zero separator
pub const MIN_MODULUS_LEN: usize = 11;

/// RSA public key of the attacked target
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    n: BigUint,
    e: BigUint,
    k: usize,
}

impl PublicKey {
    /// Create a public key from modulus `n` and public exponent `e`
    pub fn new(n: BigUint, e: BigUint) -> Result<Self, Error> {
        let k = byte_len(&n);

        if k < MIN_MODULUS_LEN {
            return Err(Error::InvalidKey("modulus is shorter than 11 bytes"));
        }

        if n.is_even() {
            return Err(Error::InvalidKey("modulus is even"));
        }

        if e.is_zero() || e.is_even() {
            return Err(Error::InvalidKey("public exponent must be odd"));
        }

        Ok(Self { n, e, k })
    }

    /// Create a public key from big-endian modulus and exponent bytes
    ///
    /// These are the decoded `n` and `e` members of an RSA JWK
    pub fn from_be_bytes(n: &[u8], e: &[u8]) -> Result<Self, Error> {
        Self::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
    }

    /// Get the modulus N
    pub fn n(&self) -> &BigUint {
        &self.n
    }

    /// Get the public exponent e
    pub fn e(&self) -> &BigUint {
        &self.e
    }

    /// Byte length of the modulus
    pub fn k(&self) -> usize {
        self.k
    }

    /// Bit length of the modulus
    pub fn bits(&self) -> u64 {
        self.n.bits()
    }

    /// Bleichenbacher bounds for this modulus
    pub fn bounds(&self) -> Bounds {
        Bounds::for_len(self.k)
    }

    /// Multiply a ciphertext by an encrypted multiplier: c * (s**e) mod n
    ///
    /// The result decrypts to m * s mod n
    pub fn blind(&self, c: &BigUint, s: &BigUint) -> BigUint {
        mul_mod(c, &mod_pow(s, &self.e, &self.n), &self.n)
    }

    /// Fixed-width (k bytes) big-endian encoding, as the target expects it on the wire
    pub fn to_octets(&self, x: &BigUint) -> Vec<u8> {
        to_fixed_be(x, self.k)
    }
}

/// Bleichenbacher bounds: B = 2**(8 * (k - 2)), plus the derived 2B and 3B
///
/// A conforming plaintext m satisfies 2B <= m < 3B
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub b: BigUint,
    pub two_b: BigUint,
    pub three_b: BigUint,
}

impl Bounds {
    /// Bounds for a modulus of `k` bytes
    ///
    /// `k` must be at least 2
    pub fn for_len(k: usize) -> Self {
        let b = BigUint::one() << (8 * (k - 2));
        let two_b = &b << 1_usize;
        let three_b = &two_b + &b;

        Self { b, two_b, three_b }
    }

    /// The interval every conforming plaintext lies in: [2B, 3B - 1]
    pub fn initial_interval(&self) -> Interval {
        Interval {
            a: self.two_b.clone(),
            b: &self.three_b - 1_u32,
        }
    }
}

/// Target ciphertext: the JWE encrypted key as an integer less than N
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ciphertext(BigUint);

impl Ciphertext {
    /// Create a ciphertext, checking it is in range for the key
    pub fn new(c: BigUint, key: &PublicKey) -> Result<Self, Error> {
        if &c >= key.n() {
            return Err(Error::CiphertextOutOfRange);
        }

        Ok(Self(c))
    }

    /// Create a ciphertext from the raw JWE encrypted key octets
    pub fn from_be_bytes(bytes: &[u8], key: &PublicKey) -> Result<Self, Error> {
        Self::new(BigUint::from_bytes_be(bytes), key)
    }

    /// Get the ciphertext as an integer
    pub fn value(&self) -> &BigUint {
        &self.0
    }
}
