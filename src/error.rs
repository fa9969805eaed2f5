use thiserror::Error;

/// Errors rejecting an attack before it starts
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid public key: {0}")]
    InvalidKey(&'static str),

    #[error("ciphertext is not smaller than the modulus")]
    CiphertextOutOfRange,

    #[error("invalid attack configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("failed to spawn attack thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Reasons an attack session terminates without recovering the plaintext
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// No conforming blinded ciphertext within `max_blinding_attempts`
    #[error("no conforming blinded ciphertext found")]
    BlindingFailed,

    /// The attack did not converge within `max_queries`
    #[error("query budget exceeded")]
    QueryBudgetExceeded,

    /// Transport failures exceeded `probe_retries`
    #[error("oracle unreachable")]
    OracleUnreachable,

    /// The oracle contradicted itself: narrowing emptied the interval set,
    /// or the converged plaintext is not a valid PKCS#1 v1.5 block
    #[error("oracle answers are inconsistent")]
    InconsistentOracle,
}
