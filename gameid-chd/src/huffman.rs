//! Canonical Huffman decoder for the compressed hunk map.
//!
//! Code lengths are transmitted with a small run-length scheme, then codes
//! are assigned canonically from the longest length down, and decoding uses
//! a direct lookup table indexed by the next `max_bits` input bits.

use crate::bitstream::BitReader;
use crate::error::{ChdError, Result};

pub struct HuffmanDecoder {
    num_codes: usize,
    max_bits: u32,
    lengths: Vec<u8>,
    /// `(symbol << 5) | code_length`, indexed by the next `max_bits` bits.
    lookup: Vec<u32>,
}

impl HuffmanDecoder {
    pub fn new(num_codes: usize, max_bits: u32) -> Self {
        Self {
            num_codes,
            max_bits,
            lengths: vec![0; num_codes],
            lookup: vec![0; 1 << max_bits],
        }
    }

    /// Read RLE-encoded code lengths from `bits` and build the decode table.
    ///
    /// Each length is a fixed-width field. A field of 1 escapes: if the next
    /// field is also 1 it is a literal length of 1, otherwise it is a length
    /// repeated `next field + 3` times.
    pub fn import_tree_rle(&mut self, bits: &mut BitReader<'_>) -> Result<()> {
        let field = if self.max_bits >= 16 {
            5
        } else if self.max_bits >= 8 {
            4
        } else {
            3
        };

        let mut node = 0;
        while node < self.num_codes {
            let length = bits.read(field);
            if length != 1 {
                self.lengths[node] = length as u8;
                node += 1;
                continue;
            }
            let length = bits.read(field);
            if length == 1 {
                self.lengths[node] = 1;
                node += 1;
                continue;
            }
            let repeat = bits.read(field) as usize + 3;
            if node + repeat > self.num_codes {
                return Err(ChdError::invalid_map("huffman tree run overflows code table"));
            }
            self.lengths[node..node + repeat].fill(length as u8);
            node += repeat;
        }

        let codes = self.assign_canonical_codes()?;
        self.build_lookup(&codes)?;
        if bits.overflowed() {
            return Err(ChdError::invalid_map("huffman tree truncated"));
        }
        Ok(())
    }

    /// Decode one symbol.
    pub fn decode_one(&self, bits: &mut BitReader<'_>) -> u32 {
        let entry = self.lookup[bits.peek(self.max_bits) as usize];
        bits.remove(entry & 0x1f);
        entry >> 5
    }

    fn assign_canonical_codes(&self) -> Result<Vec<u32>> {
        let mut histogram = [0u32; 33];
        for &length in &self.lengths {
            if u32::from(length) > self.max_bits {
                return Err(ChdError::invalid_map(format!(
                    "huffman code length {} exceeds {}",
                    length, self.max_bits
                )));
            }
            histogram[length as usize] += 1;
        }

        // Longest codes first; each length's first code is half the next start.
        let mut start = 0u32;
        for length in (1..=32).rev() {
            let next = (start + histogram[length]) >> 1;
            if length != 1 && next * 2 != start + histogram[length] {
                return Err(ChdError::invalid_map("inconsistent huffman code lengths"));
            }
            histogram[length] = start;
            start = next;
        }

        Ok(self
            .lengths
            .iter()
            .map(|&length| {
                if length == 0 {
                    0
                } else {
                    let code = histogram[length as usize];
                    histogram[length as usize] += 1;
                    code
                }
            })
            .collect())
    }

    fn build_lookup(&mut self, codes: &[u32]) -> Result<()> {
        for (symbol, (&length, &code)) in self.lengths.iter().zip(codes).enumerate() {
            if length == 0 {
                continue;
            }
            let shift = self.max_bits - u32::from(length);
            let first = (code << shift) as usize;
            let last = (((code + 1) << shift) - 1) as usize;
            if last >= self.lookup.len() {
                return Err(ChdError::invalid_map("huffman codes overflow lookup table"));
            }
            let value = ((symbol as u32) << 5) | u32::from(length);
            self.lookup[first..=last].fill(value);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/huffman_tests.rs"]
mod tests;
