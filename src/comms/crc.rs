//! CRC16-CCITT (poly 0x1021, init 0xFFFF, no reflection).
//!
//! Used for the RICSerial frame check sequence and for whole-image checks
//! on uploads that declare a `CRC16`.

pub const CRC16_INIT: u16 = 0xffff;

/// Fold one byte into a running CRC.
pub const fn update(mut crc: u16, byte: u8) -> u16 {
    crc ^= (byte as u16) << 8;
    let mut i = 0;
    while i < 8 {
        crc = if crc & 0x8000 != 0 {
            (crc << 1) ^ 0x1021
        } else {
            crc << 1
        };
        i += 1;
    }
    crc
}

/// Fold a slice into a running CRC.
pub fn update_slice(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |acc, &b| update(acc, b))
}

/// CRC of a complete buffer.
pub fn crc16(data: &[u8]) -> u16 {
    update_slice(CRC16_INIT, data)
}
