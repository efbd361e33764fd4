//! Secret input helpers
//!
//! Authenticator apps hand out secrets as RFC 4648 base32 strings. These
//! helpers turn such strings into raw bytes for enrollment and produce fresh
//! random seeds in the same format.

use crate::error::{Error, Result};
use crate::types::Algorithm;

use rand::RngCore;

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

fn symbol_value(c: u8) -> Option<u8> {
    match c {
        b'A'..=b'Z' => Some(c - b'A'),
        b'a'..=b'z' => Some(c - b'a'),
        b'2'..=b'7' => Some(c - b'2' + 26),
        _ => None,
    }
}

/// Decode an RFC 4648 base32 string
///
/// Case-insensitive; spaces and `=` padding are ignored.
pub fn decode_base32(input: &str) -> Result<Vec<u8>> {
    let symbols: Vec<u8> = input
        .bytes()
        .filter(|c| !c.is_ascii_whitespace() && *c != b'=')
        .collect();

    if symbols.is_empty() {
        return Err(Error::InvalidSecret("secret is empty".into()));
    }

    // 1, 3 or 6 trailing symbols can't come from whole bytes
    if matches!(symbols.len() % 8, 1 | 3 | 6) {
        return Err(Error::InvalidSecret(format!(
            "invalid base32 length {}",
            symbols.len()
        )));
    }

    let mut result = Vec::with_capacity(symbols.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits_in_buffer = 0;

    for (position, &c) in symbols.iter().enumerate() {
        let value = symbol_value(c).ok_or_else(|| {
            Error::InvalidSecret(format!(
                "invalid base32 character {:?} at position {}",
                c as char, position
            ))
        })?;

        buffer = (buffer << 5) | value as u32;
        bits_in_buffer += 5;

        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            result.push((buffer >> bits_in_buffer) as u8);
            buffer &= (1 << bits_in_buffer) - 1;
        }
    }

    Ok(result)
}

/// Encode bytes as unpadded RFC 4648 base32
pub fn encode_base32(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits_in_buffer = 0;

    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits_in_buffer += 8;

        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = ((buffer >> bits_in_buffer) & 0x1f) as usize;
            result.push(ALPHABET[index] as char);
        }
        buffer &= (1 << bits_in_buffer) - 1;
    }

    if bits_in_buffer > 0 {
        let index = ((buffer << (5 - bits_in_buffer)) & 0x1f) as usize;
        result.push(ALPHABET[index] as char);
    }

    result
}

/// Generate a random seed sized for `algorithm`, as unpadded base32
pub fn generate_seed(algorithm: Algorithm) -> String {
    let mut seed = vec![0u8; algorithm.seed_len()];
    rand::thread_rng().fill_bytes(&mut seed);
    encode_base32(&seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc4648_vectors() {
        let vectors: [(&[u8], &str); 6] = [
            (b"f", "MY"),
            (b"fo", "MZXQ"),
            (b"foo", "MZXW6"),
            (b"foob", "MZXW6YQ"),
            (b"fooba", "MZXW6YTB"),
            (b"foobar", "MZXW6YTBOI"),
        ];
        for (raw, encoded) in vectors {
            assert_eq!(encode_base32(raw), encoded);
            assert_eq!(decode_base32(encoded).unwrap(), raw);
        }
    }

    #[test]
    fn test_decode_is_lenient() {
        assert_eq!(decode_base32("mzxw 6ytb oi======").unwrap(), b"foobar");
        assert_eq!(
            decode_base32("JBSWY3DPEHPK3PXP").unwrap(),
            b"Hello!\xDE\xAD\xBE\xEF"
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_base32(""), Err(Error::InvalidSecret(_))));
        assert!(matches!(decode_base32("===="), Err(Error::InvalidSecret(_))));
        assert!(matches!(decode_base32("MZXW1"), Err(Error::InvalidSecret(_))));
        assert!(matches!(decode_base32("MZX"), Err(Error::InvalidSecret(_))));
    }

    #[test]
    fn test_generate_seed_length() {
        for (algorithm, bytes) in [
            (Algorithm::Sha1, 20),
            (Algorithm::Sha256, 32),
            (Algorithm::Sha512, 64),
        ] {
            let seed = generate_seed(algorithm);
            assert!(!seed.contains('='));
            assert_eq!(decode_base32(&seed).unwrap().len(), bytes);
        }
        assert_ne!(generate_seed(Algorithm::Sha1), generate_seed(Algorithm::Sha1));
    }
}
