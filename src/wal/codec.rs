//! Entry Codec
//!
//! Frames and unframes a single opaque payload:
//! `[length: u64 LE][payload]`.

use std::fs::File;
use std::io::{self, Read, Seek, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WalError};

/// Size of the length prefix in front of every payload
pub const HEADER_SIZE: u64 = 8;

/// Total on-disk size of a record carrying `payload_len` bytes
pub fn frame_len(payload_len: usize) -> u64 {
    HEADER_SIZE + payload_len as u64
}

/// Write one record at the writer's current position.
///
/// Returns the offset at which the record starts. Header and payload go
/// out in a single `write_all`.
pub fn encode<W: Write + Seek>(writer: &mut W, payload: &[u8]) -> Result<u64> {
    let offset = writer.stream_position()?;

    let mut frame = BytesMut::with_capacity(frame_len(payload.len()) as usize);
    frame.put_u64_le(payload.len() as u64);
    frame.put_slice(payload);

    writer.write_all(&frame)?;
    Ok(offset)
}

/// Read the next record from a stream.
///
/// Returns:
/// - `Ok(Some(payload))`: a complete record
/// - `Ok(None)`: clean end of stream (no bytes left)
/// - `Err(UnexpectedEof)`: the stream ended inside a record
pub fn decode<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_SIZE as usize];
    let filled = read_full(reader, &mut header)?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < header.len() {
        return Err(WalError::UnexpectedEof);
    }

    let len = (&header[..]).get_u64_le();

    // Bounded read: a garbage length must not turn into a huge allocation
    let mut payload = Vec::new();
    reader.take(len).read_to_end(&mut payload)?;
    if (payload.len() as u64) < len {
        return Err(WalError::UnexpectedEof);
    }

    Ok(Some(payload))
}

/// Read the record starting at `offset` without touching the file cursor.
///
/// Safe to call on the active segment's handle while it is being appended
/// to.
pub fn decode_at(file: &File, offset: u64) -> Result<Vec<u8>> {
    let file_len = file.metadata()?.len();
    if offset.saturating_add(HEADER_SIZE) > file_len {
        return Err(WalError::UnexpectedEof);
    }

    let mut header = [0u8; HEADER_SIZE as usize];
    read_exact_at_offset(file, &mut header, offset)?;
    let len = (&header[..]).get_u64_le();

    let payload_start = offset + HEADER_SIZE;
    if payload_start.saturating_add(len) > file_len {
        return Err(WalError::UnexpectedEof);
    }
    let len = usize::try_from(len)
        .map_err(|_| WalError::Decode(format!("record length {} does not fit in memory", len)))?;

    let mut payload = vec![0u8; len];
    read_exact_at_offset(file, &mut payload, payload_start)?;
    Ok(payload)
}

/// Fill `buf` as far as the reader allows; returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Positional read via `pread(2)`; leaves the file cursor alone.
#[cfg(unix)]
fn read_exact_at_offset(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    use std::os::unix::fs::FileExt;

    file.read_exact_at(buf, offset).map_err(map_eof)
}

/// Windows fallback: `seek_read` moves the cursor, so callers appending
/// through the same handle must track their own write position.
#[cfg(windows)]
fn read_exact_at_offset(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    use std::os::windows::fs::FileExt;

    let mut pos = 0;
    while pos < buf.len() {
        let n = file.seek_read(&mut buf[pos..], offset + pos as u64)?;
        if n == 0 {
            return Err(WalError::UnexpectedEof);
        }
        pos += n;
    }
    Ok(())
}

#[cfg(unix)]
fn map_eof(e: io::Error) -> WalError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        WalError::UnexpectedEof
    } else {
        WalError::Io(e)
    }
}
