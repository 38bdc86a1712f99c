use rand::RngCore;

use crate::error::{Error, Result};

/// Number of random bytes in a generated filename (hex-encoded to twice as many characters).
const TOKEN_BYTES: usize = 10;

/// Replace the stem of an uploaded filename with a random hex token, keeping
/// the extension after the last `.`.
///
/// The extension must be ASCII alphanumeric so the name survives as the last
/// segment of an address without escaping.
pub fn generate_filename(original: &str) -> Result<String> {
    let extension = match original.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => ext,
        _ => return Err(Error::InvalidFilename(original.to_string())),
    };

    let mut token = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut token);
    Ok(format!("{}.{}", hex::encode(token), extension))
}

/// Public URL a stored file is served at.
pub fn build_address(host: &str, port: u16, static_url: &str, filename: &str) -> String {
    format!(
        "http://{}:{}/{}/images/{}",
        host,
        port,
        static_url.trim_matches('/'),
        filename
    )
}

/// Last path segment of an address, if it is usable as a filename.
pub fn filename_from_address(address: &str) -> Option<&str> {
    let path = address.split(['?', '#']).next().unwrap_or(address);
    let name = path.rsplit('/').next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}
