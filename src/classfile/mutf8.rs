//! Modified UTF-8 as used by `CONSTANT_Utf8` entries: NUL is written as
//! `C0 80` and supplementary characters as two three-byte surrogates.

pub(crate) fn decode(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let first = bytes[index] as u16;
        if first & 0x80 == 0 {
            units.push(first);
            index += 1;
        } else if first & 0xE0 == 0xC0 {
            let second = continuation(bytes, index + 1)?;
            units.push(((first & 0x1F) << 6) | second);
            index += 2;
        } else if first & 0xF0 == 0xE0 {
            let second = continuation(bytes, index + 1)?;
            let third = continuation(bytes, index + 2)?;
            units.push(((first & 0x0F) << 12) | (second << 6) | third);
            index += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

fn continuation(bytes: &[u8], index: usize) -> Option<u16> {
    let byte = *bytes.get(index)?;
    if byte & 0xC0 != 0x80 {
        return None;
    }
    Some((byte & 0x3F) as u16)
}

pub(crate) fn encode(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        if unit != 0 && unit < 0x80 {
            out.push(unit as u8);
        } else if unit < 0x800 {
            out.push(0xC0 | (unit >> 6) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        } else {
            out.push(0xE0 | (unit >> 12) as u8);
            out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_and_supplementary_characters_use_modified_forms() {
        let value = "a\0\u{e9}\u{1F600}";
        let encoded = encode(value);
        assert_eq!(&encoded[..3], &[b'a', 0xC0, 0x80]);
        // Two surrogates, three bytes each.
        assert_eq!(encoded.len(), 1 + 2 + 2 + 6);
        assert_eq!(decode(&encoded).as_deref(), Some(value));
    }

    #[test]
    fn truncated_and_lone_surrogate_sequences_are_rejected() {
        assert_eq!(decode(&[0xE0, 0x80]), None);
        assert_eq!(decode(&[0xED, 0xA0, 0x80]), None);
        assert_eq!(decode(&[0xFF]), None);
    }
}
