//! Frame checksum.
//!
//! CRC-8 with polynomial `0x31`, initial value `0x00`, MSB-first and no final
//! XOR. The thermostat rejects frames whose trailing byte does not match.

/// Generator polynomial (x^8 + x^5 + x^4 + 1).
const POLYNOMIAL: u8 = 0x31;

/// Lookup table built at compile time.
static TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the checksum of `data`.
///
/// # Example
///
/// ```
/// use aprilaire_client::protocol::checksum;
///
/// // READ_REQUEST for CONTROL/1 with sequence 1
/// assert_eq!(checksum(&[1, 1, 0, 3, 2, 2, 1]), 0x46);
/// ```
pub fn checksum(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &byte| TABLE[usize::from(crc ^ byte)])
}
