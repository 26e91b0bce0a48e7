/// Reflected form of the Dallas/Maxim polynomial x^8 + x^5 + x^4 + 1 (0x31)
const POLY_REFLECTED: u8 = 0x8C;

/// Incremental 1-Wire CRC-8.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Crc8(u8);

impl Crc8 {
    pub const fn new() -> Self {
        Crc8(0)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn update(&mut self, byte: u8) {
        let mut crc = self.0 ^ byte;
        for _ in 0..8 {
            if crc & 0x01 == 0x01 {
                crc = (crc >> 1) ^ POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
        self.0 = crc;
    }

    pub fn update_slice(&mut self, data: &[u8]) {
        for byte in data {
            self.update(*byte);
        }
    }

    /// Checks a sequence whose last byte is the CRC of the bytes before it.
    ///
    /// Running the CRC over such a sequence, checksum included, yields zero.
    pub fn validate(sequence: &[u8]) -> bool {
        !sequence.is_empty() && crc8(sequence) == 0
    }
}

/// CRC-8 over `data`, starting from zero.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = Crc8::new();
    crc.update_slice(data);
    crc.value()
}
