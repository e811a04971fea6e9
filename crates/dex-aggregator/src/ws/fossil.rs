/*
[INPUT]:  Previous publication bytes and a fossil delta
[OUTPUT]: Reconstructed publication bytes (checksum verified)
[POS]:    WebSocket layer - delta decoding for compressed subscriptions
[UPDATE]: Only if the delta encoding changes
*/

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FossilError {
    #[error("size integer not terminated by newline")]
    UnterminatedSize,
    #[error("copy command not terminated by ','")]
    UnterminatedCopy,
    #[error("copy extends past end of source")]
    CopyOutOfBounds,
    #[error("insert extends past end of delta")]
    InsertOutOfBounds,
    #[error("output larger than declared size")]
    OutputTooLarge,
    #[error("output size does not match declared size")]
    SizeMismatch,
    #[error("bad checksum")]
    BadChecksum,
    #[error("unknown delta operator {0:?}")]
    UnknownOperator(char),
    #[error("unterminated delta")]
    Unterminated,
}

fn digit_value(byte: u8) -> Option<u32> {
    match byte {
        b'0'..=b'9' => Some((byte - b'0') as u32),
        b'A'..=b'Z' => Some((byte - b'A') as u32 + 10),
        b'_' => Some(36),
        b'a'..=b'z' => Some((byte - b'a') as u32 + 37),
        b'~' => Some(63),
        _ => None,
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn has_bytes(&self) -> bool {
        self.pos < self.bytes.len()
    }

    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.bytes.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        byte
    }

    fn read_int(&mut self) -> usize {
        let mut value: u32 = 0;
        while let Some(digit) = self.bytes.get(self.pos).and_then(|b| digit_value(*b)) {
            value = (value << 6).wrapping_add(digit);
            self.pos += 1;
        }
        value as usize
    }

    fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(count)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut sums = [0u32; 4];
    let mut chunks = bytes.chunks_exact(4);
    for chunk in &mut chunks {
        for (sum, byte) in sums.iter_mut().zip(chunk) {
            *sum = sum.wrapping_add(*byte as u32);
        }
    }

    let mut total = sums[3]
        .wrapping_add(sums[2] << 8)
        .wrapping_add(sums[1] << 16)
        .wrapping_add(sums[0] << 24);
    for (index, byte) in chunks.remainder().iter().enumerate() {
        total = total.wrapping_add((*byte as u32) << (24 - 8 * index));
    }
    total
}

/// Apply a fossil delta to `source`.
pub fn apply_delta(source: &[u8], delta: &[u8]) -> Result<Vec<u8>, FossilError> {
    let mut reader = Reader {
        bytes: delta,
        pos: 0,
    };

    let limit = reader.read_int();
    if reader.next_byte() != Some(b'\n') {
        return Err(FossilError::UnterminatedSize);
    }

    let mut out = Vec::with_capacity(limit);
    while reader.has_bytes() {
        let count = reader.read_int();
        let Some(op) = reader.next_byte() else {
            break;
        };
        match op {
            b'@' => {
                let offset = reader.read_int();
                if reader.has_bytes() && reader.next_byte() != Some(b',') {
                    return Err(FossilError::UnterminatedCopy);
                }
                if out.len() + count > limit {
                    return Err(FossilError::OutputTooLarge);
                }
                let chunk = offset
                    .checked_add(count)
                    .and_then(|end| source.get(offset..end))
                    .ok_or(FossilError::CopyOutOfBounds)?;
                out.extend_from_slice(chunk);
            }
            b':' => {
                if out.len() + count > limit {
                    return Err(FossilError::OutputTooLarge);
                }
                let chunk = reader.take(count).ok_or(FossilError::InsertOutOfBounds)?;
                out.extend_from_slice(chunk);
            }
            b';' => {
                if count as u32 != checksum(&out) {
                    return Err(FossilError::BadChecksum);
                }
                if out.len() != limit {
                    return Err(FossilError::SizeMismatch);
                }
                return Ok(out);
            }
            other => return Err(FossilError::UnknownOperator(other as char)),
        }
    }

    Err(FossilError::Unterminated)
}
