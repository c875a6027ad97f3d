//! LZ4 block compression. Output is a bare block, no frame, no checksum; the reader has to know the size
//! of the decompressed data.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

/// Inputs this large or larger are refused.
pub const MAX_INPUT_SIZE: usize = 0x7E00_0000;

const HASH_SIZE: usize = 1 << 16;
/// Empty hash slot. Far enough behind any position that it can never pass the offset check.
const EMPTY_SLOT: i32 = -65536;
const MIN_MATCH: usize = 4;
/// The last match has to start this many bytes before the end of the block.
const MATCH_MARGIN: usize = 12;
/// The last bytes of a block are always literals.
const LITERAL_MARGIN: usize = 5;
const MAX_OFFSET: usize = 65535;

#[derive(Debug, Clone, PartialEq)]
pub enum Lz4Error {
    RangeExceeded(usize),
    Corrupt(&'static str),
}

impl fmt::Display for Lz4Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Lz4Error::RangeExceeded(size) => write!(f, "input of {} bytes is too large to compress", size),
            Lz4Error::Corrupt(why) => write!(f, "corrupt LZ4 block: {}", why),
        }
    }
}

impl std::error::Error for Lz4Error {}

/// Worst-case compressed size of `size` bytes, `None` for sizes `encode` refuses.
pub fn encode_bound(size: usize) -> Option<usize> {
    if size >= MAX_INPUT_SIZE {
        None
    } else {
        Some(size + size / 255 + 16)
    }
}

fn hash(sequence: u32) -> usize {
    let a = sequence.wrapping_mul(0x9E37) & 0xFFFF;
    let b = sequence.wrapping_mul(0x79B1) >> 16;
    (a.wrapping_add(b) & 0xFFFF) as usize
}

/// Writes a length that didn't fit in its token nibble: runs of 255 then the rest.
fn write_length(output: &mut Vec<u8>, mut len: usize) {
    while len >= 255 {
        output.push(255);
        len -= 255;
    }
    output.push(len as u8);
}

fn write_literals(output: &mut Vec<u8>, literals: &[u8], match_token: u8) {
    if literals.len() >= 15 {
        output.push(0xF0 | match_token);
        write_length(output, literals.len() - 15);
    } else {
        output.push(((literals.len() as u8) << 4) | match_token);
    }
    output.extend_from_slice(literals);
}

/// Compressor state. The hash table is kept between calls so repeated compressions don't reallocate it.
pub struct Lz4 {
    table: Box<[i32]>,
}

impl Default for Lz4 {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lz4 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Lz4").finish()
    }
}

impl Lz4 {
    pub fn new() -> Self {
        Self {
            table: vec![EMPTY_SLOT; HASH_SIZE].into_boxed_slice(),
        }
    }

    /// Compresses `input` into one block. Matching is greedy with a single candidate per hash slot.
    pub fn encode(&mut self, input: &[u8]) -> Result<Vec<u8>, Lz4Error> {
        let len = input.len();
        let bound = encode_bound(len).ok_or(Lz4Error::RangeExceeded(len))?;

        for slot in self.table.iter_mut() {
            *slot = EMPTY_SLOT;
        }

        let mut output = Vec::with_capacity(bound);
        let mut anchor = 0;

        if len >= MATCH_MARGIN {
            let last_match = len - MATCH_MARGIN;
            let last_literal = len - LITERAL_MARGIN;
            let mut pos = 0;

            'sequences: loop {
                let (start, reference) = loop {
                    if pos > last_match {
                        break 'sequences;
                    }

                    let sequence = LittleEndian::read_u32(&input[pos..]);
                    let slot = hash(sequence);
                    let candidate = self.table[slot];
                    self.table[slot] = pos as i32;

                    let offset = pos as i64 - candidate as i64;
                    if offset < HASH_SIZE as i64 && candidate >= 0 {
                        let candidate = candidate as usize;
                        if input[candidate..candidate + MIN_MATCH] == input[pos..pos + MIN_MATCH] {
                            break (pos, candidate);
                        }
                    }
                    pos += 1;
                };

                let mut end = start + MIN_MATCH;
                let mut from = reference + MIN_MATCH;
                while end < last_literal && input[end] == input[from] {
                    end += 1;
                    from += 1;
                }

                let match_len = end - start;
                let token = if match_len < 15 + MIN_MATCH {
                    (match_len - MIN_MATCH) as u8
                } else {
                    15
                };

                write_literals(&mut output, &input[anchor..start], token);

                let offset = (start - reference) as u16;
                output.push(offset as u8);
                output.push((offset >> 8) as u8);

                if match_len >= 15 + MIN_MATCH {
                    write_length(&mut output, match_len - 15 - MIN_MATCH);
                }

                pos = end;
                anchor = end;
            }
        }

        write_literals(&mut output, &input[anchor..], 0);
        Ok(output)
    }
}

/// Compresses `input` with a fresh hash table.
pub fn encode(input: &[u8]) -> Result<Vec<u8>, Lz4Error> {
    Lz4::new().encode(input)
}

fn read_length(input: &[u8], pos: &mut usize, nibble: usize) -> Result<usize, Lz4Error> {
    let mut len = nibble;
    if nibble == 15 {
        loop {
            let byte = *input.get(*pos).ok_or(Lz4Error::Corrupt("truncated length"))?;
            *pos += 1;
            len += byte as usize;
            if byte != 255 {
                break;
            }
        }
    }
    Ok(len)
}

/// Decompresses a block produced by `encode` or any other LZ4 block compressor. `output_len` is the exact
/// size of the decompressed data.
pub fn decode(input: &[u8], output_len: usize) -> Result<Vec<u8>, Lz4Error> {
    let mut output = Vec::with_capacity(output_len);
    let mut pos = 0;

    loop {
        let token = *input.get(pos).ok_or(Lz4Error::Corrupt("missing token"))?;
        pos += 1;

        let literals = read_length(input, &mut pos, (token >> 4) as usize)?;
        let literal_end = pos
            .checked_add(literals)
            .filter(|&end| end <= input.len())
            .ok_or(Lz4Error::Corrupt("literals run past the end of the block"))?;
        if output.len() + literals > output_len {
            return Err(Lz4Error::Corrupt("output larger than expected"));
        }
        output.extend_from_slice(&input[pos..literal_end]);
        pos = literal_end;

        if pos == input.len() {
            break;
        }

        if pos + 2 > input.len() {
            return Err(Lz4Error::Corrupt("truncated match offset"));
        }
        let offset = LittleEndian::read_u16(&input[pos..]) as usize;
        pos += 2;
        if offset == 0 || offset > output.len() || offset > MAX_OFFSET {
            return Err(Lz4Error::Corrupt("match offset out of range"));
        }

        let match_len = read_length(input, &mut pos, (token & 0x0F) as usize)? + MIN_MATCH;
        if output.len() + match_len > output_len {
            return Err(Lz4Error::Corrupt("output larger than expected"));
        }

        let start = output.len() - offset;
        for i in 0..match_len {
            let byte = output[start + i];
            output.push(byte);
        }
    }

    if output.len() != output_len {
        return Err(Lz4Error::Corrupt("output smaller than expected"));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_F491u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    fn round_trip(input: &[u8]) -> Vec<u8> {
        let encoded = encode(input).unwrap();
        assert!(encoded.len() <= encode_bound(input.len()).unwrap());
        let decoded = decode(&encoded, input.len()).unwrap();
        assert_eq!(decoded, input);
        encoded
    }

    #[test]
    fn bounds() {
        assert_eq!(encode_bound(0), Some(16));
        assert_eq!(encode_bound(255), Some(255 + 1 + 16));
        assert!(encode_bound(MAX_INPUT_SIZE - 1).is_some());
        assert_eq!(encode_bound(MAX_INPUT_SIZE), None);
    }

    #[test]
    fn empty_and_short_inputs() {
        assert_eq!(round_trip(&[]), vec![0x00]);
        assert_eq!(round_trip(b"abc"), vec![0x30, b'a', b'b', b'c']);
        round_trip(b"aaaaaaaaaaa");
    }

    #[test]
    fn repetitive_input_compresses() {
        let input: Vec<u8> = b"uniform sampler2D tex;\n".iter().cycle().take(4096).cloned().collect();
        let encoded = round_trip(&input);
        assert!(encoded.len() < input.len() / 10);
    }

    #[test]
    fn long_runs_use_length_continuation() {
        let input = vec![7u8; 1000];
        let encoded = round_trip(&input);
        // one literal, then a match running up to the literal tail
        assert_eq!(encoded[0], 0x1F);
        assert_eq!(encoded[1], 7);
        assert_eq!(&encoded[2..4], &[1, 0]);
    }

    #[test]
    fn incompressible_input() {
        let input = noise(5000);
        round_trip(&input);
    }

    #[test]
    fn tail_is_literal() {
        let input = vec![0u8; 64];
        let encoded = round_trip(&input);
        // the final sequence carries the last five bytes as literals
        assert_eq!(&encoded[encoded.len() - 6..], &[0x50, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn table_is_reused() {
        let mut lz4 = Lz4::new();
        let first = lz4.encode(b"abcdabcdabcdabcdabcdabcd").unwrap();
        let second = lz4.encode(b"abcdabcdabcdabcdabcdabcd").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_blocks() {
        assert_eq!(decode(&[], 0), Err(Lz4Error::Corrupt("missing token")));
        assert!(decode(&[0x40, b'a'], 4).is_err());
        assert!(decode(&[0x10, b'a', 0x05, 0x00], 10).is_err());
        assert!(decode(&[0x00], 3).is_err());
    }
}
