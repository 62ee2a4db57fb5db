//! Whitespace-tolerant hexadecimal decoding for cipher keys.

use crate::errors::ParseError;

fn is_ignorable(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Decode `text` into bytes, skipping spaces, tabs, CR and LF.
///
/// Character validity is checked before length, so `"zz"` reports
/// [`ParseError::InvalidHexCharacter`] and `"abc"` reports [`ParseError::OddLength`].
/// An empty (or all-whitespace) input decodes to an empty buffer.
pub fn decode(text: &str) -> Result<Vec<u8>, ParseError> {
    let mut digits = String::with_capacity(text.len());
    for (index, c) in text.chars().enumerate() {
        if is_ignorable(c) {
            continue;
        }
        if !c.is_ascii_hexdigit() {
            return Err(ParseError::InvalidHexCharacter { c, index });
        }
        digits.push(c);
    }
    if digits.len() % 2 != 0 {
        return Err(ParseError::OddLength);
    }
    hex::decode(&digits).map_err(|e| match e {
        hex::FromHexError::InvalidHexCharacter { c, index } => {
            ParseError::InvalidHexCharacter { c, index }
        }
        hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
            ParseError::OddLength
        }
    })
}

/// Lowercase hex encoding, used when handing key material to the engine.
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_case_with_whitespace() {
        let out = decode(" 01 02\tAb\r\ncD ").unwrap();
        assert_eq!(out, vec![0x01, 0x02, 0xab, 0xcd]);
    }

    #[test]
    fn empty_input_is_empty_buffer() {
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode(" \n\t ").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn odd_length_is_rejected() {
        assert_eq!(decode("abc"), Err(ParseError::OddLength));
        assert_eq!(decode("a b c"), Err(ParseError::OddLength));
    }

    #[test]
    fn invalid_character_is_rejected() {
        assert!(matches!(decode("zz"), Err(ParseError::InvalidHexCharacter { c: 'z', index: 0 })));
        // invalid characters win over odd length
        assert!(matches!(decode("0g1"), Err(ParseError::InvalidHexCharacter { c: 'g', .. })));
    }

    #[test]
    fn prefix_is_not_accepted() {
        assert!(matches!(decode("0x0102"), Err(ParseError::InvalidHexCharacter { c: 'x', .. })));
    }
}
