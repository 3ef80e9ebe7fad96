use std::io;

use positioned_io::ReadAt;

/// Read a null-terminated ASCII string from a byte slice.
///
/// Stops at the first null byte, filters out non-printable characters,
/// and returns the result. No trimming is performed.
pub fn read_ascii(buf: &[u8]) -> String {
    buf.iter()
        .take_while(|&&b| b != 0)
        .filter(|&&b| (0x20..0x7F).contains(&b))
        .map(|&b| b as char)
        .collect()
}

/// Read a fixed-length, space-padded ASCII field.
///
/// Non-printable bytes become spaces and the result is trimmed on both ends.
/// The whole buffer is processed, so fields padded with 0x00 or 0x20 both work.
pub fn read_ascii_fixed(buf: &[u8]) -> String {
    let s: String = buf
        .iter()
        .map(|&b| {
            if (0x20..0x7F).contains(&b) {
                b as char
            } else {
                ' '
            }
        })
        .collect();
    s.trim().to_string()
}

/// Decode an unsigned big-endian integer of up to 8 bytes.
pub fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Render a four-character code, replacing non-printable bytes with `.`.
pub fn fourcc(tag: u32) -> String {
    tag.to_be_bytes()
        .iter()
        .map(|&b| {
            if (0x20..0x7F).contains(&b) {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// Fill as much of `buf` as the source has from `pos`.
///
/// Returns the number of bytes read, which is short only at end of source.
pub fn read_up_to<R: ReadAt + ?Sized>(source: &R, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read_at(pos + filled as u64, &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_ascii() {
        assert_eq!(read_ascii(b"HELLO\0WORLD"), "HELLO");
        assert_eq!(read_ascii(b"\x01\x02ABC"), "ABC");
        assert_eq!(read_ascii(b""), "");
    }

    #[test]
    fn test_read_ascii_fixed() {
        assert_eq!(read_ascii_fixed(b"TESTVOL                         "), "TESTVOL");
        assert_eq!(read_ascii_fixed(b"AB\0\0CD\0"), "AB  CD");
    }

    #[test]
    fn test_be_uint() {
        assert_eq!(be_uint(&[0x01, 0x02, 0x03]), 0x010203);
        assert_eq!(be_uint(&[0, 0, 0, 0, 0x12, 0x34]), 0x1234);
        assert_eq!(be_uint(&[]), 0);
    }

    #[test]
    fn test_fourcc() {
        assert_eq!(fourcc(u32::from_be_bytes(*b"zlib")), "zlib");
        assert_eq!(fourcc(0x7A7A_0000), "zz..");
    }

    #[test]
    fn test_read_up_to_stops_at_end() {
        let source = vec![1u8, 2, 3, 4, 5];
        let mut buf = [0u8; 4];
        assert_eq!(read_up_to(&source, 3, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(read_up_to(&source, 0, &mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(read_up_to(&source, 9, &mut buf).unwrap(), 0);
    }
}
