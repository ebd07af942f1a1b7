/// A named, framed sub-record of a MIDAS event carrying one or more FERA
/// streams. The payload is held as 32-bit words; the FERA electronics write
/// 16-bit words, with the first of each pair in the high half.
#[derive(Debug, Clone, Default)]
pub struct Bank {
    pub name: [u8; 4],
    pub bank_type: u32,
    /// Declared payload size in bytes.
    pub size: u32,
    pub data: Vec<u32>,
    /// Padding bytes consumed after the payload to reach the 8-byte boundary.
    pub nof_extra_bytes: usize,
    /// Position of this bank within its event.
    pub number: usize,
    pub event_number: u32,
}

impl Bank {
    /// The bank name packed big-endian, as the frontend writes it.
    pub fn int_name(&self) -> u32 {
        u32::from_be_bytes(self.name)
    }

    pub fn is_bank(&self, name: &str) -> bool {
        self.name == name.as_bytes()
    }

    pub fn cursor(&self) -> BankCursor<'_> {
        BankCursor {
            bank: self,
            read_point: 0,
        }
    }
}

/// Byte-addressed 16-bit word stream over a bank payload. Reads past the end
/// return None; this is the normal out-of-data signal, not an error.
#[derive(Debug)]
pub struct BankCursor<'a> {
    bank: &'a Bank,
    /// Counts 16-bit words; the public interface is in bytes.
    read_point: usize,
}

impl<'a> BankCursor<'a> {
    pub fn got_data(&self) -> bool {
        self.read_point / 2 < self.bank.data.len()
    }

    pub fn got_bytes(&self, bytes: usize) -> bool {
        (self.read_point + bytes / 2) / 2 < self.bank.data.len()
    }

    /// Current position in bytes.
    pub fn read_point(&self) -> usize {
        2 * self.read_point
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.bank.size as usize
    }

    pub fn set_read_point(&mut self, bytes: usize) {
        self.read_point = bytes / 2;
    }

    /// Move the read point backwards, used to un-read a header word.
    pub fn rewind(&mut self, bytes: usize) {
        self.read_point = self.read_point.saturating_sub(bytes / 2);
    }

    pub fn skip_to_end(&mut self) {
        self.read_point = 2 * self.bank.data.len();
    }

    pub fn peek_u16(&self) -> Option<u16> {
        let word = self.bank.data.get(self.read_point / 2)?;
        if self.read_point % 2 == 0 {
            Some((word >> 16) as u16)
        } else {
            Some((word & 0xffff) as u16)
        }
    }

    pub fn get_u16(&mut self) -> Option<u16> {
        let value = self.peek_u16()?;
        self.read_point += 1;
        Some(value)
    }

    pub fn get_u32(&mut self) -> Option<u32> {
        let value = *self.bank.data.get(self.read_point / 2)?;
        self.read_point += 2;
        Some(value)
    }

    pub fn get_f32(&mut self) -> Option<f32> {
        Some(f32::from_bits(self.get_u32()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_from_words(words: &[u16]) -> Bank {
        let mut data = Vec::new();
        for pair in words.chunks(2) {
            let high = pair[0] as u32;
            let low = *pair.get(1).unwrap_or(&0) as u32;
            data.push((high << 16) | low);
        }
        Bank {
            name: *b"FME0",
            size: (2 * words.len()) as u32,
            data,
            ..Default::default()
        }
    }

    #[test]
    fn test_word_order() {
        let bank = bank_from_words(&[0x8040, 0x1234, 0xbeef, 0x0001]);
        let mut cursor = bank.cursor();
        assert_eq!(cursor.get_u16(), Some(0x8040));
        assert_eq!(cursor.get_u16(), Some(0x1234));
        assert_eq!(cursor.read_point(), 4);
        assert_eq!(cursor.get_u16(), Some(0xbeef));
        assert_eq!(cursor.get_u16(), Some(0x0001));
        assert_eq!(cursor.get_u16(), None);
        assert!(!cursor.got_data());
    }

    #[test]
    fn test_peek_and_rewind() {
        let bank = bank_from_words(&[0x00aa, 0x00bb]);
        let mut cursor = bank.cursor();
        assert_eq!(cursor.peek_u16(), Some(0x00aa));
        assert_eq!(cursor.get_u16(), Some(0x00aa));
        assert_eq!(cursor.get_u16(), Some(0x00bb));
        cursor.rewind(2);
        assert_eq!(cursor.get_u16(), Some(0x00bb));
    }

    #[test]
    fn test_u32_reads_aligned_word() {
        let bank = bank_from_words(&[0x1111, 0x2222, 0x3333, 0x4444]);
        let mut cursor = bank.cursor();
        assert_eq!(cursor.get_u32(), Some(0x11112222));
        assert_eq!(cursor.get_u32(), Some(0x33334444));
        assert_eq!(cursor.get_u32(), None);
    }

    #[test]
    fn test_skip_to_end() {
        let bank = bank_from_words(&[1, 2, 3, 4]);
        let mut cursor = bank.cursor();
        assert_eq!(cursor.size(), 8);
        cursor.skip_to_end();
        assert_eq!(cursor.read_point(), 8);
        assert!(!cursor.got_data());
    }

    #[test]
    fn test_int_name() {
        let bank = bank_from_words(&[0]);
        assert_eq!(bank.int_name(), 0x464d4530); // "FME0"
        assert!(bank.is_bank("FME0"));
        assert!(!bank.is_bank("MCS0"));
    }
}
