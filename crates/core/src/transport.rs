//! 64-symbol printable transport alphabet (standard base64 with `=` padding).
//!
//! Decoding tolerates noise: anything outside the alphabet is dropped before
//! symbols are read, so text mangled by manual copy/paste still decodes.

use crate::error::CodecError;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const PAD: u8 = b'=';

fn symbol_value(b: u8) -> Option<u8> {
    match b {
        b'A'..=b'Z' => Some(b - b'A'),
        b'a'..=b'z' => Some(b - b'a' + 26),
        b'0'..=b'9' => Some(b - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

pub fn is_transport_char(c: char) -> bool {
    c.is_ascii() && (symbol_value(c as u8).is_some() || c as u8 == PAD)
}

/// Drops every character that cannot be part of an encoded payload.
pub fn strip_noise(input: &str) -> String {
    input.chars().filter(|c| is_transport_char(*c)).collect()
}

pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for group in bytes.chunks(3) {
        let b0 = group[0];
        let b1 = group.get(1).copied().unwrap_or(0);
        let b2 = group.get(2).copied().unwrap_or(0);
        let triple = (u32::from(b0) << 16) | (u32::from(b1) << 8) | u32::from(b2);

        out.push(ALPHABET[(triple >> 18) as usize & 0x3F] as char);
        out.push(ALPHABET[(triple >> 12) as usize & 0x3F] as char);
        if group.len() > 1 {
            out.push(ALPHABET[(triple >> 6) as usize & 0x3F] as char);
        } else {
            out.push(PAD as char);
        }
        if group.len() > 2 {
            out.push(ALPHABET[triple as usize & 0x3F] as char);
        } else {
            out.push(PAD as char);
        }
    }
    out
}

pub fn decode(input: &str) -> Result<Vec<u8>, CodecError> {
    let cleaned = strip_noise(input);
    let symbols = cleaned.trim_end_matches(PAD as char).as_bytes();
    let padding = cleaned.len() - symbols.len();

    if symbols.is_empty() {
        return Err(CodecError::InvalidEncoding("no payload symbols".into()));
    }
    if padding > 2 {
        return Err(CodecError::InvalidEncoding("too much padding".into()));
    }
    if symbols.len() % 4 == 1 {
        return Err(CodecError::InvalidEncoding(
            "payload truncated: dangling symbol".into(),
        ));
    }

    let mut out = Vec::with_capacity(symbols.len() / 4 * 3 + 2);
    for group in symbols.chunks(4) {
        let mut acc = 0u32;
        for (i, &b) in group.iter().enumerate() {
            let v = symbol_value(b).ok_or_else(|| {
                CodecError::InvalidEncoding("padding inside payload".into())
            })?;
            acc |= u32::from(v) << (18 - 6 * i);
        }
        out.push((acc >> 16) as u8);
        if group.len() > 2 {
            out.push((acc >> 8) as u8);
        }
        if group.len() > 3 {
            out.push(acc as u8);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn known_vectors() {
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"M"), "TQ==");
        assert_eq!(encode(b"Ma"), "TWE=");
        assert_eq!(encode(b"Man"), "TWFu");
        assert_eq!(decode("TWFu").unwrap(), b"Man");
        assert_eq!(decode("TWE=").unwrap(), b"Ma");
        assert_eq!(decode("TQ==").unwrap(), b"M");
    }

    #[test]
    fn agrees_with_reference_implementation() {
        let samples: [&[u8]; 4] = [
            b"{\"id\":42}",
            "Þórunn ☃ 😀".as_bytes(),
            &[0, 255, 128, 7, 64],
            &[0xFB, 0xFF],
        ];
        for sample in samples {
            let ours = encode(sample);
            assert_eq!(ours, STANDARD.encode(sample));
            assert_eq!(decode(&ours).unwrap(), sample);
        }
    }

    #[test]
    fn strips_transport_noise() {
        assert_eq!(decode(" TW\nFu \t").unwrap(), b"Man");
        assert_eq!(decode("`TWE=`").unwrap(), b"Ma");
        assert_eq!(decode("T-W-F-u!").unwrap(), b"Man");
    }

    #[test]
    fn tolerates_missing_padding() {
        assert_eq!(decode("TWE").unwrap(), b"Ma");
        assert_eq!(decode("TQ").unwrap(), b"M");
    }

    #[test]
    fn rejects_undecodable_input() {
        assert!(matches!(decode(""), Err(CodecError::InvalidEncoding(_))));
        assert!(matches!(decode("!!!"), Err(CodecError::InvalidEncoding(_))));
        assert!(matches!(decode("===="), Err(CodecError::InvalidEncoding(_))));
        assert!(matches!(decode("TWFuT"), Err(CodecError::InvalidEncoding(_))));
        assert!(matches!(decode("TW=Fu"), Err(CodecError::InvalidEncoding(_))));
        assert!(matches!(decode("TQ==="), Err(CodecError::InvalidEncoding(_))));
    }
}
