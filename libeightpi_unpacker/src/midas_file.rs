use byteorder::{LittleEndian, ReadBytesExt};
use std::path::Path;

use super::bank::Bank;
use super::constants::*;
use super::error::FileError;

/// The 16-byte MIDAS file header plus the metadata block that follows it.
/// The metadata is an ASCII ODB dump; the core only needs to skip past it.
#[derive(Debug, Clone, Default)]
pub struct MidasFileHeader {
    pub run_number: u32,
    pub start_time: u32,
    /// Raw 16-bit words of the metadata block, kept for external consumers.
    pub information: Vec<u16>,
}

/// One framed MIDAS event: a 24-byte header followed by its banks.
#[derive(Debug, Clone, Default)]
pub struct MidasEvent {
    pub event_type: u16,
    pub mask: u16,
    pub number: u32,
    pub time: u32,
    pub nof_bytes: u32,
    pub total_bank_bytes: u32,
    pub flags: u32,
    pub banks: Vec<Bank>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Okay,
    EndOfFile,
}

/// Outcome of a single bank read. Running out of bytes is the normal end of
/// file signal, distinguishable from a mid-stream short record by the caller
/// comparing declared sizes.
#[derive(Debug)]
enum BankReadResult {
    Bank(Bank, usize),
    ShortRecord,
    EndOfFile,
}

/// Walks a raw MIDAS byte buffer and yields framed events.
///
/// The whole file is held in memory; runs are small enough that mapping or
/// streaming buys nothing.
#[derive(Debug)]
pub struct MidasFileManager {
    buffer: Vec<u8>,
    position: usize,
    status: FileStatus,
    resynchronizations: u64,
}

impl MidasFileManager {
    pub fn open(path: &Path) -> Result<Self, FileError> {
        if !path.exists() {
            return Err(FileError::BadFilePath(path.to_path_buf()));
        }
        let buffer = std::fs::read(path)?;
        Ok(Self::from_bytes(buffer))
    }

    pub fn from_bytes(buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            position: 0,
            status: FileStatus::Okay,
            resynchronizations: 0,
        }
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Number of header-mismatch recovery scans performed so far.
    pub fn resynchronizations(&self) -> u64 {
        self.resynchronizations
    }

    fn bytes_left(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Read the 16-byte file header and the metadata block behind it.
    /// A malformed file header is fatal; continuing would corrupt all framing.
    pub fn read_file_header(&mut self) -> Result<MidasFileHeader, FileError> {
        if self.bytes_left() < FILE_HEADER_BYTES {
            return Err(FileError::ShortFileHeader(self.bytes_left()));
        }

        let mut slice = &self.buffer[self.position..];
        let magic = slice.read_u32::<LittleEndian>()?;
        if magic & 0xffff != MIDAS_FILE_MAGIC {
            return Err(FileError::BadMagic(magic));
        }
        let run_number = slice.read_u32::<LittleEndian>()?;
        let start_time = slice.read_u32::<LittleEndian>()?;
        let info_bytes = slice.read_u32::<LittleEndian>()? as usize;
        self.position += FILE_HEADER_BYTES;

        if self.bytes_left() < info_bytes {
            return Err(FileError::ShortHeaderInfo(self.bytes_left(), info_bytes));
        }

        // the metadata block is stored as 16-bit words
        let mut information = Vec::with_capacity(info_bytes / 2);
        let mut slice = &self.buffer[self.position..self.position + info_bytes];
        while slice.len() >= 2 {
            information.push(slice.read_u16::<LittleEndian>()?);
        }
        self.position += info_bytes;

        Ok(MidasFileHeader {
            run_number,
            start_time,
            information,
        })
    }

    /// Read the next 24-byte event header. Returns false when fewer bytes
    /// remain, which is the end-of-file condition.
    fn read_event_header(&mut self, event: &mut MidasEvent) -> Result<bool, FileError> {
        if self.bytes_left() < EVENT_HEADER_BYTES {
            if self.bytes_left() > 0 {
                spdlog::warn!(
                    "only {} bytes left reading an event header; assuming end of file",
                    self.bytes_left()
                );
            }
            self.status = FileStatus::EndOfFile;
            return Ok(false);
        }

        let mut slice = &self.buffer[self.position..];
        event.event_type = slice.read_u16::<LittleEndian>()?;
        event.mask = slice.read_u16::<LittleEndian>()?;
        event.number = slice.read_u32::<LittleEndian>()?;
        event.time = slice.read_u32::<LittleEndian>()?;
        event.nof_bytes = slice.read_u32::<LittleEndian>()?;
        event.total_bank_bytes = slice.read_u32::<LittleEndian>()?;
        event.flags = slice.read_u32::<LittleEndian>()?;
        self.position += EVENT_HEADER_BYTES;

        Ok(true)
    }

    /// Read the next well-framed event, resynchronizing over corrupt headers.
    ///
    /// Returns `Ok(None)` at the end of the file. Events whose banks cannot be
    /// read completely are skipped with a diagnostic.
    pub fn next_event(&mut self) -> Result<Option<MidasEvent>, FileError> {
        'events: loop {
            if self.status == FileStatus::EndOfFile {
                return Ok(None);
            }

            let mut event = MidasEvent::default();
            if !self.read_event_header(&mut event)? {
                return Ok(None);
            }

            // The event's own byte count must equal the bank bytes plus the
            // two trailing size words; a mismatch means the header is corrupt.
            // Checked subtraction: a corrupt count near u32::MAX must not
            // overflow the comparison.
            if event.nof_bytes.checked_sub(8) != Some(event.total_bank_bytes) {
                spdlog::error!(
                    "event {}: {} total bank bytes and {} event bytes do not agree; scanning for the next good header",
                    event.number,
                    event.total_bank_bytes,
                    event.nof_bytes
                );
                self.resynchronizations += 1;
                while event.nof_bytes.checked_sub(8) != Some(event.total_bank_bytes) {
                    // return all but 4 of the 24 event header bytes
                    self.position -= EVENT_HEADER_BYTES - RESYNC_KEEP_BYTES;
                    if !self.read_event_header(&mut event)? {
                        spdlog::error!("failed to find a good event header before the end of the file");
                        return Ok(None);
                    }
                }
                spdlog::info!("recovered, found the next good event header");
            }

            if event.flags != 0x11 && event.flags != 0x1 {
                spdlog::warn!("bad flags 0x{:x} in event {}", event.flags, event.number);
            }

            let mut nof_bank_bytes_read = 0usize;
            while nof_bank_bytes_read < event.total_bank_bytes as usize {
                let remaining = event.total_bank_bytes as usize - nof_bank_bytes_read;
                match self.read_bank(remaining, event.flags) {
                    BankReadResult::Bank(mut bank, bytes_read) => {
                        bank.number = event.banks.len();
                        bank.event_number = event.number;
                        event.banks.push(bank);
                        nof_bank_bytes_read += bytes_read;
                    }
                    BankReadResult::ShortRecord => {
                        spdlog::error!(
                            "short bank record in event {}, skipping the event",
                            event.number
                        );
                        // skip whatever remains of the declared bank bytes
                        let skip = remaining.min(self.bytes_left());
                        self.position += skip;
                        continue 'events;
                    }
                    BankReadResult::EndOfFile => {
                        spdlog::error!("unexpected end of file inside event {}", event.number);
                        self.status = FileStatus::EndOfFile;
                        return Ok(None);
                    }
                }
            }

            return Ok(Some(event));
        }
    }

    /// Read one bank: an 8 or 12 byte header depending on the BANK32 event
    /// flag, the payload, and the padding to the 8-byte boundary.
    fn read_bank(&mut self, max_bytes: usize, flags: u32) -> BankReadResult {
        let mut bank = Bank::default();
        let nof_header_bytes: usize = if flags & BANK32 != 0 { 12 } else { 8 };

        if max_bytes < nof_header_bytes {
            spdlog::error!("not enough bytes left in the event to read a bank header");
            return BankReadResult::ShortRecord;
        }
        if self.bytes_left() < nof_header_bytes {
            return BankReadResult::EndOfFile;
        }

        bank.name
            .copy_from_slice(&self.buffer[self.position..self.position + 4]);
        let mut slice = &self.buffer[self.position + 4..];
        if flags & BANK32 != 0 {
            bank.bank_type = slice.read_u32::<LittleEndian>().unwrap_or(0);
            bank.size = slice.read_u32::<LittleEndian>().unwrap_or(0);
        } else {
            bank.bank_type = slice.read_u16::<LittleEndian>().unwrap_or(0) as u32;
            bank.size = slice.read_u16::<LittleEndian>().unwrap_or(0) as u32;
        }
        self.position += nof_header_bytes;

        if bank.size as usize > max_bytes - nof_header_bytes {
            spdlog::error!("not enough bytes left in the event to read the bank payload");
            self.position += max_bytes - nof_header_bytes;
            return BankReadResult::ShortRecord;
        }
        if self.bytes_left() < bank.size as usize {
            return BankReadResult::EndOfFile;
        }

        // payload is consumed as 32-bit words
        bank.data.reserve(bank.size as usize / 4);
        let mut slice = &self.buffer[self.position..self.position + bank.size as usize];
        while slice.len() >= 4 {
            bank.data.push(slice.read_u32::<LittleEndian>().unwrap_or(0));
        }
        self.position += bank.size as usize;

        // skip the padding to the 8-byte boundary
        if bank.size % BANK_ALIGNMENT != 0 {
            bank.nof_extra_bytes = (BANK_ALIGNMENT - bank.size % BANK_ALIGNMENT) as usize;
            if bank.nof_extra_bytes > max_bytes - nof_header_bytes - bank.size as usize {
                spdlog::error!("not enough bytes left in the event to skip the bank padding");
                return BankReadResult::ShortRecord;
            }
            if self.bytes_left() < bank.nof_extra_bytes {
                return BankReadResult::EndOfFile;
            }
            self.position += bank.nof_extra_bytes;
        }

        let bytes_read = nof_header_bytes + bank.size as usize + bank.nof_extra_bytes;
        BankReadResult::Bank(bank, bytes_read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pack a 16-bit FERA word sequence the way the frontend does: the first
    /// word of each pair in the high half of a little-endian 32-bit word.
    fn pack_words(words: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for pair in words.chunks(2) {
            let high = pair[0] as u32;
            let low = *pair.get(1).unwrap_or(&0) as u32;
            bytes.extend_from_slice(&((high << 16) | low).to_le_bytes());
        }
        bytes
    }

    fn file_header(run: u32, start: u32, info: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1234_8000u32.to_le_bytes());
        bytes.extend_from_slice(&run.to_le_bytes());
        bytes.extend_from_slice(&start.to_le_bytes());
        bytes.extend_from_slice(&(info.len() as u32).to_le_bytes());
        bytes.extend_from_slice(info);
        bytes
    }

    fn bank_bytes(name: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(name);
        bytes.extend_from_slice(&0u16.to_le_bytes()); // type
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(payload);
        if payload.len() % 8 != 0 {
            bytes.extend_from_slice(&vec![0u8; 8 - payload.len() % 8]);
        }
        bytes
    }

    fn event_bytes(event_type: u16, number: u32, time: u32, banks: &[Vec<u8>]) -> Vec<u8> {
        let total: usize = banks.iter().map(|b| b.len()).sum();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&event_type.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes()); // mask
        bytes.extend_from_slice(&number.to_le_bytes());
        bytes.extend_from_slice(&time.to_le_bytes());
        bytes.extend_from_slice(&((total + 8) as u32).to_le_bytes());
        bytes.extend_from_slice(&(total as u32).to_le_bytes());
        bytes.extend_from_slice(&0x1u32.to_le_bytes()); // flags, 16-bit banks
        for bank in banks {
            bytes.extend_from_slice(bank);
        }
        bytes
    }

    #[test]
    fn test_file_header() {
        let bytes = file_header(1234, 5678, &[0u8; 32]);
        let mut manager = MidasFileManager::from_bytes(bytes);
        let header = manager.read_file_header().unwrap();
        assert_eq!(header.run_number, 1234);
        assert_eq!(header.start_time, 5678);
        assert_eq!(header.information.len(), 16);
        assert!(manager.next_event().unwrap().is_none());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = file_header(1, 2, &[]);
        bytes[0] = 0x01; // break the magic
        let mut manager = MidasFileManager::from_bytes(bytes);
        assert!(matches!(
            manager.read_file_header(),
            Err(FileError::BadMagic(_))
        ));
    }

    #[test]
    fn test_event_and_bank_round_trip() {
        let payload = pack_words(&[0x8040, 0x0123, 0x8020, 0x0001, 0x0002, 0x0003, 0x0004, 0x0005]);
        let bank = bank_bytes(b"FME0", &payload);
        let bytes = event_bytes(FIFO_EVENT, 7, 1000, &[bank]);
        let mut manager = MidasFileManager::from_bytes(bytes);

        let event = manager.next_event().unwrap().unwrap();
        assert_eq!(event.event_type, FIFO_EVENT);
        assert_eq!(event.number, 7);
        assert_eq!(event.nof_bytes, event.total_bank_bytes + 8);
        assert_eq!(event.banks.len(), 1);
        assert_eq!(event.banks[0].int_name(), FME_ZERO);
        assert_eq!(event.banks[0].size as usize, payload.len());
        let mut cursor = event.banks[0].cursor();
        assert_eq!(cursor.get_u16(), Some(0x8040));

        assert!(manager.next_event().unwrap().is_none());
        assert_eq!(manager.resynchronizations(), 0);
    }

    #[test]
    fn test_bank_padding_skipped() {
        // 12-byte payload pads to 16
        let payload = pack_words(&[1, 2, 3, 4, 5, 6]);
        let bank = bank_bytes(b"FME1", &payload);
        assert_eq!(bank.len(), 8 + 12 + 4);
        let bytes = event_bytes(FIFO_EVENT, 1, 0, &[bank.clone(), bank]);
        let mut manager = MidasFileManager::from_bytes(bytes);
        let event = manager.next_event().unwrap().unwrap();
        assert_eq!(event.banks.len(), 2);
        assert_eq!(event.banks[1].nof_extra_bytes, 4);
    }

    #[test]
    fn test_resynchronization_recovers() {
        let payload = pack_words(&[1, 2, 3, 4]);
        let good1 = event_bytes(FIFO_EVENT, 1, 0, &[bank_bytes(b"FME0", &payload)]);
        let good2 = event_bytes(FIFO_EVENT, 2, 0, &[bank_bytes(b"FME0", &payload)]);

        let mut corrupted = good1.clone();
        // break the nof_bytes field so the consistency check fails
        corrupted[12] = 0xff;

        let mut bytes = corrupted;
        bytes.extend_from_slice(&good2);
        let mut manager = MidasFileManager::from_bytes(bytes);

        let event = manager.next_event().unwrap().unwrap();
        assert_eq!(event.number, 2);
        assert_eq!(manager.resynchronizations(), 1);
        assert!(manager.next_event().unwrap().is_none());
    }

    #[test]
    fn test_resynchronization_survives_huge_bank_count() {
        let payload = pack_words(&[1, 2, 3, 4]);
        let good = event_bytes(FIFO_EVENT, 2, 0, &[bank_bytes(b"FME0", &payload)]);

        let mut corrupted = event_bytes(FIFO_EVENT, 1, 0, &[bank_bytes(b"FME0", &payload)]);
        // a corrupt total_bank_bytes near u32::MAX must trigger the scan, not
        // an arithmetic overflow
        corrupted[16..20].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut bytes = corrupted;
        bytes.extend_from_slice(&good);
        let mut manager = MidasFileManager::from_bytes(bytes);

        let event = manager.next_event().unwrap().unwrap();
        assert_eq!(event.number, 2);
        assert_eq!(manager.resynchronizations(), 1);
    }
}
