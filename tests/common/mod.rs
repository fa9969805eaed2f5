use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use num::bigint::BigUint;
use num::Num;
use rand::Rng;

use pkcs1_oracle::{pkcs1, Ciphertext, Oracle, PublicKey, Response};

// 377-bit RSA modulus with a small top byte, so n / 3B stays low and
// step 2.a ends after a few hundred queries
pub const N_SMALL: &str = "1c9f498d8174cc1578d9611adb50257f07662bd3f592b6846843fe06e2dc12b4a06d1a8ce108958ddc43156c748690b";
pub const D_SMALL: &str = "54d85a50fed01baa0af358c72418110ede00212bd16b7757d950152596362c2d1a026d9614e1b84250694cd84f5881";
pub const E: u32 = 65537;

// odd 2048-bit modulus, only used with e = 1
pub const N_2048: &str = "cf9fd585079c75133d4abf778e7a7dd507d2e0029af6c9dfc8a280b36cd589fafee9b69e669fb24b4cd51bb6f97b37f2460ad24170d76600dc4479a0001ec447d8847b9e2586bdfaaa1f8959dfd76bed6348a42efce83dd218bf600514b709f28b31a0fd7882d6f17b5133d28761dc0bb8b3504afe018b1cbfa3d667c4c8968fb082b7258a7ce54ed4810576d0810ce1df33c8548476ad1633fd1304fd8a5c75f4ceeb16e0b52a58ae587a9bd4cd8a3b7fe68b70b6e817b8fbaf9c13ee31a4bdb7ddd1c76582d82223691dd0952019a7fdeb06a8eb456e7bdfe855eda50f6111618d2c60cf28703243dbb1c16467147e40879498f4247f675a474e27c3455473";

pub const AES_KEY: [u8; 16] = [
    0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f, 0x3c,
];

pub fn hex(s: &str) -> BigUint {
    BigUint::from_str_radix(s, 16).unwrap()
}

#[allow(dead_code)]
pub fn small_key() -> PublicKey {
    PublicKey::new(hex(N_SMALL), BigUint::from(E)).unwrap()
}

// with e = 1 encryption is the identity, ciphertext and plaintext coincide
#[allow(dead_code)]
pub fn identity_key() -> PublicKey {
    PublicKey::new(hex(N_2048), BigUint::from(1_u8)).unwrap()
}

// PKCS#1 v1.5 encryption block: 00 02 || non-zero padding || 00 || msg
pub fn pkcs1_pad<R: Rng>(msg: &[u8], k: usize, rng: &mut R) -> Vec<u8> {
    let mut em = [0x00, 0x02].to_vec();
    for _i in 0..k - 3 - msg.len() {
        em.push(rng.gen_range(1_u8, 255_u8));
    }
    em.push(0x00);
    em.extend_from_slice(msg);
    em
}

#[allow(dead_code)]
pub fn encrypt(key: &PublicKey, em: &[u8]) -> Ciphertext {
    let m = BigUint::from_bytes_be(em);
    Ciphertext::new(m.modpow(key.e(), key.n()), key).unwrap()
}

/// Decrypting padding oracle, by default with a loose 00 02 check like most vulnerable targets
#[derive(Clone)]
pub struct LabOracle {
    n: BigUint,
    // None means e = 1, the ciphertext is the plaintext
    d: Option<BigUint>,
    k: usize,
    replayed: Option<Vec<u8>>,
    strict: bool,
    probes: Arc<AtomicU64>,
}

#[allow(dead_code)]
impl LabOracle {
    pub fn new(key: &PublicKey, d: Option<BigUint>) -> Self {
        Self {
            n: key.n().clone(),
            d,
            k: key.k(),
            replayed: None,
            strict: false,
            probes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Reject the exact original ciphertext, as a target with replay detection would
    pub fn reject_replay(mut self, ciphertext: &Ciphertext) -> Self {
        self.replayed = Some(to_fixed(ciphertext.value(), self.k));
        self
    }

    /// Only accept fully well-formed blocks, not just the 00 02 prefix
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Counter of probes received, shared with clones
    pub fn probes(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.probes)
    }
}

impl Oracle for LabOracle {
    fn probe(&self, ciphertext: &[u8]) -> Response {
        self.probes.fetch_add(1, Ordering::SeqCst);

        if self.replayed.as_deref() == Some(ciphertext) {
            return Response::NotConforming;
        }

        let c = BigUint::from_bytes_be(ciphertext);
        let m = match &self.d {
            Some(d) => c.modpow(d, &self.n),
            None => c,
        };
        let em = to_fixed(&m, self.k);

        let conforming = if self.strict {
            pkcs1::decode(&em, self.k).is_ok()
        } else {
            em[0] == 0x00 && em[1] == 0x02
        };

        if conforming {
            Response::Conforming
        } else {
            Response::NotConforming
        }
    }
}

fn to_fixed(x: &BigUint, k: usize) -> Vec<u8> {
    let bytes = x.to_bytes_be();
    let mut res = vec![0_u8; k - bytes.len()];
    res.extend_from_slice(&bytes);
    res
}
