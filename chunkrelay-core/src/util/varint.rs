use std::io::Read;

use crate::error::{RelayError, Result};

pub fn put_uvarint(out: &mut Vec<u8>, mut x: u64) {
    while x >= 0x80 {
        out.push((x as u8) | 0x80);
        x >>= 7;
    }
    out.push(x as u8);
}

/// `Ok(None)` on a clean end of input before the first byte.
pub fn get_uvarint<R: Read>(r: &mut R) -> Result<Option<u64>> {
    let mut x: u64 = 0;
    let mut s: u32 = 0;
    for i in 0..10 {
        let mut b = [0u8; 1];
        match r.read(&mut b) {
            Ok(0) if i == 0 => return Ok(None),
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "truncated varint",
                )
                .into());
            }
            Ok(_) => {
                let byte = b[0];
                if byte < 0x80 {
                    x |= (byte as u64) << s;
                    return Ok(Some(x));
                }
                x |= ((byte & 0x7f) as u64) << s;
                s += 7;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(RelayError::Journal("varint too long".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings() {
        let mut out = Vec::new();
        put_uvarint(&mut out, 300);
        assert_eq!(out, [0xac, 0x02]);
        assert_eq!(get_uvarint(&mut &out[..]).unwrap(), Some(300));
    }

    #[test]
    fn empty_input_is_none_and_cut_input_is_error() {
        assert_eq!(get_uvarint(&mut &[][..]).unwrap(), None);
        assert!(get_uvarint(&mut &[0x80u8][..]).is_err());
    }
}
