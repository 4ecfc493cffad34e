//! Random artifact tokens.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::Result;

/// Random bytes per token (128 bits).
pub const TOKEN_BYTES: usize = 16;
/// Length of the hex-encoded token.
pub const TOKEN_HEX_LEN: usize = TOKEN_BYTES * 2;

/// Generates a token of 32 lowercase hex characters from the OS CSPRNG.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}
