// Storage-layer helpers for script and symbol resources.
//
// Text resources may be stored XOR-"encrypted": the file starts with the
// marker 0xFFFF and every following byte is XORed with a repeating key.

use std::{fs, io::Write, path::Path};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{BcsError, Result};

const ENCRYPTED_MARKER: u16 = 0xFFFF;

pub fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && LittleEndian::read_u16(&bytes[..2]) == ENCRYPTED_MARKER
}

fn xor_with(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

/// Plain bytes of a resource; encrypted input needs a non-empty `key`.
pub fn decode(bytes: &[u8], key: Option<&[u8]>) -> Result<Vec<u8>> {
    if !is_encrypted(bytes) {
        return Ok(bytes.to_vec());
    }
    match key {
        Some(key) if !key.is_empty() => Ok(xor_with(&bytes[2..], key)),
        _ => Err(BcsError::MissingKey),
    }
}

/// Encrypts `plain` in the same format `decode` reads.
pub fn encode(plain: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.is_empty() {
        return Err(BcsError::MissingKey);
    }
    let mut out = Vec::with_capacity(plain.len() + 2);
    out.write_u16::<LittleEndian>(ENCRYPTED_MARKER)?;
    out.write_all(&xor_with(plain, key))?;
    Ok(out)
}

/// Resource text is single-byte; every byte maps to the same code point.
pub fn decode_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

pub fn read_text(path: &Path, key: Option<&[u8]>) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(decode_text(&decode(&bytes, key)?))
}
