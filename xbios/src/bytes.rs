//! Field-by-field little-endian reads/writes over packed structs: tables of
//! `(offset, width, field)` over a byte range, rather than host structural
//! overlays.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{XbiosError, XbiosResult};

pub fn read_u32(buf: &[u8], off: usize) -> XbiosResult<u32> {
    let bytes = buf.get(off..off + 4).ok_or_else(|| out_of_bounds(off, 4, buf.len()))?;
    Ok(LittleEndian::read_u32(bytes))
}

pub fn read_u16(buf: &[u8], off: usize) -> XbiosResult<u16> {
    let bytes = buf.get(off..off + 2).ok_or_else(|| out_of_bounds(off, 2, buf.len()))?;
    Ok(LittleEndian::read_u16(bytes))
}

pub fn read_array<const N: usize>(buf: &[u8], off: usize) -> XbiosResult<[u8; N]> {
    let bytes = buf.get(off..off + N).ok_or_else(|| out_of_bounds(off, N, buf.len()))?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

pub fn write_u32(buf: &mut [u8], off: usize, value: u32) -> XbiosResult<()> {
    let len = buf.len();
    let slice = buf.get_mut(off..off + 4).ok_or_else(|| out_of_bounds(off, 4, len))?;
    LittleEndian::write_u32(slice, value);
    Ok(())
}

pub fn write_bytes(buf: &mut [u8], off: usize, data: &[u8]) -> XbiosResult<()> {
    let len = buf.len();
    let slice = buf.get_mut(off..off + data.len()).ok_or_else(|| out_of_bounds(off, data.len(), len))?;
    slice.copy_from_slice(data);
    Ok(())
}

fn out_of_bounds(off: usize, width: usize, buf_len: usize) -> XbiosError {
    XbiosError::Fatal(format!("read of {width} bytes at offset {off:#x} exceeds buffer of length {buf_len:#x}"))
}
