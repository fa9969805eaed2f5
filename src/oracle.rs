use num::bigint::BigUint;

/// Answer of the target to one submitted ciphertext
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// The ciphertext decrypted to a PKCS#1 v1.5 conforming block
    Conforming,
    /// The ciphertext did not decrypt to a conforming block
    NotConforming,
    /// The probe could not be delivered or classified
    TransportFailure(String),
}

/// Padding oracle for the attacked target
///
/// Implementations wrap the transport, response comparison and any timing
/// classification into a single answer per ciphertext. The engine may call
/// `probe` from several threads at once.
pub trait Oracle: Send + Sync {
    /// Submit a k-byte big-endian ciphertext to the target
    fn probe(&self, ciphertext: &[u8]) -> Response;
}

impl<F> Oracle for F
where
    F: Fn(&[u8]) -> Response + Send + Sync,
{
    fn probe(&self, ciphertext: &[u8]) -> Response {
        self(ciphertext)
    }
}

/// Result of probing the ciphertext for multiplier `s`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryOutcome {
    Conforming(BigUint),
    NotConforming(BigUint),
    TransportFailure(String),
}

impl QueryOutcome {
    /// Tag an oracle response with the multiplier that was probed
    pub fn new(s: BigUint, response: Response) -> Self {
        match response {
            Response::Conforming => QueryOutcome::Conforming(s),
            Response::NotConforming => QueryOutcome::NotConforming(s),
            Response::TransportFailure(reason) => QueryOutcome::TransportFailure(reason),
        }
    }
}
