//! Low-level wire primitives shared by framing and payload encoding.

use crate::ProtocolError;

/// Appends an unsigned LEB128 varint.
pub(crate) fn put_uvarint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Reads an unsigned LEB128 varint, advancing `input`.
pub(crate) fn read_uvarint(input: &mut &[u8]) -> Result<u64, ProtocolError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let (&byte, rest) = input.split_first().ok_or_else(|| {
            ProtocolError::MalformedMessage("truncated varint".into())
        })?;
        *input = rest;
        if shift >= 64 {
            return Err(ProtocolError::MalformedMessage(
                "varint exceeds 64 bits".into(),
            ));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Zigzag encoding maps signed to unsigned so small negatives stay short.
pub(crate) fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub(crate) fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Takes exactly `len` bytes from the front of `input`.
pub(crate) fn take(
    input: &mut &[u8],
    len: usize,
) -> Result<Vec<u8>, ProtocolError> {
    if input.len() < len {
        return Err(ProtocolError::MalformedMessage(format!(
            "need {len} bytes, have {}",
            input.len()
        )));
    }
    let (head, rest) = input.split_at(len);
    *input = rest;
    Ok(head.to_vec())
}

/// Appends a varint-length-delimited byte run.
pub(crate) fn put_delimited(out: &mut Vec<u8>, bytes: &[u8]) {
    put_uvarint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Reads a varint-length-delimited byte run.
pub(crate) fn read_delimited(
    input: &mut &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let len = read_uvarint(input)?;
    take(input, len as usize)
}
