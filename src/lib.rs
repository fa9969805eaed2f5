//! Bleichenbacher adaptive chosen-ciphertext attack on RSA PKCS#1 v1.5
//! encrypted JWE content encryption keys.
//!
//! The caller supplies the target's public key, the encrypted key octets and
//! an [`Oracle`] telling conforming ciphertexts apart. The engine recovers
//! the content encryption key.

pub mod bignat;
pub mod config;
pub mod error;
pub mod extract;
pub mod handle;
pub mod interval;
pub mod key;
pub mod oracle;
pub mod pkcs1;
pub mod session;

mod scheduler;

pub use config::AttackConfig;
pub use error::{AbortReason, Error};
pub use extract::{CekClass, Recovery};
pub use handle::{run_attack, start_attack, AttackHandle, CancelToken, Event};
pub use interval::{Interval, IntervalSet};
pub use key::{Bounds, Ciphertext, PublicKey};
pub use oracle::{Oracle, QueryOutcome, Response};
pub use session::{AttackResult, Phase};
