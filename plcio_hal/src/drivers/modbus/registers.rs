//! Process bytes ↔ Modbus registers.
//!
//! Byte `b` of an area lives in register `b / 2`: even bytes in the low
//! half, odd bytes in the high half. Bit `i` of byte `b` is therefore
//! register bit `(b % 2) * 8 + i`.

/// Registers covering bytes `byte..byte + width`, as `(first, count)`.
pub fn register_span(byte: usize, width: usize) -> (usize, usize) {
    let first = byte / 2;
    let last = (byte + width.max(1) - 1) / 2;
    (first, last - first + 1)
}

/// Write `registers` into `out`, two bytes each, low byte first.
pub fn unpack(registers: &[u16], out: &mut [u8]) {
    for (pair, register) in out.chunks_exact_mut(2).zip(registers) {
        pair.copy_from_slice(&register.to_le_bytes());
    }
}

/// Registers made from `bytes`, low byte first. `bytes` has even length.
pub fn pack(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Split `count` registers into requests of at most `max` registers.
pub fn chunks(count: u16, max: u16) -> impl Iterator<Item = (u16, u16)> {
    (0..count)
        .step_by(usize::from(max.max(1)))
        .map(move |start| (start, max.min(count - start)))
}
