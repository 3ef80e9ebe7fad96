/// MSB-first bit reader over a byte slice.
///
/// Reads past the end yield zero bits; [`BitReader::overflowed`] reports
/// whether that happened.
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Next byte to load into `buffer`.
    offset: usize,
    /// Pending bits, left-aligned.
    buffer: u64,
    bits: u32,
    consumed: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            buffer: 0,
            bits: 0,
            consumed: 0,
        }
    }

    /// Return the next `count` bits (at most 32) without consuming them.
    pub fn peek(&mut self, count: u32) -> u32 {
        debug_assert!(count <= 32);
        if count == 0 {
            return 0;
        }
        while self.bits < count {
            let byte = self.data.get(self.offset).copied().unwrap_or(0);
            self.offset += 1;
            self.buffer |= u64::from(byte) << (56 - self.bits);
            self.bits += 8;
        }
        (self.buffer >> (64 - count)) as u32
    }

    /// Drop `count` bits previously peeked.
    pub fn remove(&mut self, count: u32) {
        if count == 0 {
            return;
        }
        self.buffer <<= count;
        self.bits -= count;
        self.consumed += u64::from(count);
    }

    /// Read `count` bits (at most 32) as an unsigned value.
    pub fn read(&mut self, count: u32) -> u32 {
        let value = self.peek(count);
        self.remove(count);
        value
    }

    /// Whether more bits were consumed than the input holds.
    pub fn overflowed(&self) -> bool {
        self.consumed > self.data.len() as u64 * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_msb_first() {
        let mut reader = BitReader::new(&[0b1010_0101, 0xFF]);
        assert_eq!(reader.read(1), 1);
        assert_eq!(reader.read(3), 0b010);
        assert_eq!(reader.read(4), 0b0101);
        assert_eq!(reader.read(8), 0xFF);
        assert!(!reader.overflowed());
    }

    #[test]
    fn wide_reads_span_bytes() {
        let mut reader = BitReader::new(&[0x12, 0x34, 0x56, 0x78, 0x9A]);
        assert_eq!(reader.read(4), 0x1);
        assert_eq!(reader.read(32), 0x2345_6789);
        assert_eq!(reader.read(4), 0xA);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut reader = BitReader::new(&[0xC0]);
        assert_eq!(reader.peek(2), 0b11);
        assert_eq!(reader.peek(2), 0b11);
        assert_eq!(reader.read(0), 0);
        assert_eq!(reader.read(2), 0b11);
    }

    #[test]
    fn past_end_reads_zero_and_flags_overflow() {
        let mut reader = BitReader::new(&[0xFF]);
        assert_eq!(reader.read(8), 0xFF);
        assert!(!reader.overflowed());
        assert_eq!(reader.read(8), 0);
        assert!(reader.overflowed());
    }
}
