use thiserror::Error;

/// Leading bytes of a PKCS#1 v1.5 encryption block (block type 2)
pub const HEADER: [u8; 2] = [0x00, 0x02];

/// Minimum number of non-zero padding bytes (RFC 8017, 7.2.1)
pub const MIN_PADDING_LEN: usize = 8;

/// Structural errors in a PKCS#1 v1.5 encryption block
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("encoded block is {0} bytes, expected {1}")]
    InvalidLength(usize, usize),

    #[error("encoded block does not start with 00 02")]
    InvalidHeader,

    #[error("padding string is {0} bytes, at least 8 are required")]
    ShortPadding(usize),

    #[error("no zero separator after the padding string")]
    MissingSeparator,
}

/// A well-formed encryption block, split into its parts
#[derive(Debug, PartialEq, Eq)]
pub struct Decoded<'a> {
    pub padding_len: usize,
    pub message: &'a [u8],
}

/// Validate a k-byte encryption block: 00 02 || PS || 00 || M
///
/// PS must be at least eight non-zero bytes
pub fn decode(em: &[u8], k: usize) -> Result<Decoded<'_>, Error> {
    if em.len() != k || k < HEADER.len() + MIN_PADDING_LEN + 1 {
        return Err(Error::InvalidLength(em.len(), k));
    }

    if em[..HEADER.len()] != HEADER {
        return Err(Error::InvalidHeader);
    }

    let body = &em[HEADER.len()..];
    let sep = body
        .iter()
        .position(|&b| b == 0x00)
        .ok_or(Error::MissingSeparator)?;

    if sep < MIN_PADDING_LEN {
        return Err(Error::ShortPadding(sep));
    }

    Ok(Decoded {
        padding_len: sep,
        message: &body[sep + 1..],
    })
}
