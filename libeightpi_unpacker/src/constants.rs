//! Bit-exact constants of the 8pi MIDAS/FERA data format.

/// Low 16 bits of the first word of a MIDAS file (event id 'MI' + trigger mask).
pub const MIDAS_FILE_MAGIC: u32 = 0x8000;

/// A MIDAS event header is always 24 bytes.
pub const EVENT_HEADER_BYTES: usize = 24;
/// A MIDAS file header is always 16 bytes.
pub const FILE_HEADER_BYTES: usize = 16;
/// Bytes kept when rewinding a mismatched event header during resynchronization.
pub const RESYNC_KEEP_BYTES: usize = 4;

/// Event flags bit marking 32-bit bank headers.
pub const BANK32: u32 = 0x10;
/// Bank payloads are padded to this boundary.
pub const BANK_ALIGNMENT: u32 = 8;

// MIDAS event type codes.
pub const FIFO_EVENT: u16 = 1;
pub const CAMAC_SCALER_EVENT: u16 = 2;
pub const SCALER_SCALER_EVENT: u16 = 3;
pub const I_SCALER_EVENT: u16 = 4;
pub const EPICS_EVENT: u16 = 5;
pub const FRONT_END_EVENT: u16 = 8;
pub const FILE_END_EVENT: u16 = 0x8001;

// Bank names, packed big-endian as the frontend writes them.
pub const FME_ZERO: u32 = 0x464d4530; // "FME0", germanium
pub const FME_ONE: u32 = 0x464d4531; // "FME1", plastic
pub const FME_TWO: u32 = 0x464d4532; // "FME2", BaF2
pub const FME_THREE: u32 = 0x464d4533; // "FME3", silicon
pub const MCS_ZERO: u32 = 0x4d435330; // "MCS0", multichannel scaler
pub const NOF_MCS_CHANNELS: usize = 32;

// FIFO stream header words.
pub const GOOD_FIFO_1: u32 = 0xff06;
pub const GOOD_FIFO_2: u32 = 0xff16;
/// Mask to extract the number of FERA words from the FIFO word count.
pub const FERA_WORDS_MASK: u32 = 0x1fff;
/// Overflow and timeout bits in the FIFO word count.
pub const FIFO_FLAG_BITS: u32 = 0x0000c000;

// FERA virtual station header layout: | valid | type | vsn |.
pub const FERA_VALID_BIT: u16 = 0x8000;
pub const FERA_VSN_MASK: u16 = 0x000f;
pub const FERA_TYPE_MASK: u16 = 0x00f0;

// FERA module type codes (already masked with FERA_TYPE_MASK).
pub const VH_AD413: u16 = 0x0000; // 413 ADC, silicon (vsn 13/14) and BaF2 (vsn 0-4)
pub const VH_3377: u16 = 0x0010; // 3377 TDC
pub const VH_FULM: u16 = 0x0020; // universal logic module
pub const VH_4300: u16 = 0x0030; // SCEPTAR QDC
pub const VH_AD114_1: u16 = 0x0040; // 114 ADC, germanium 0-15
pub const VH_AD114_2: u16 = 0x0050; // 114 ADC, germanium 16-19
pub const VH_AD114_SI: u16 = 0x0060; // 114 ADC, silicon
/// Artificial type used when the valid bit is clear.
pub const BAD_FERA: u16 = 0x0070;

// ADC 114.
pub const AD114_ENERGY_MASK: u16 = 0x3fff;
/// Module numbers of the second 114 ADC bank are offset by 16 detectors.
pub const AD114_SECOND_BANK_OFFSET: u16 = 16;

// ADC 413.
pub const AD413_DATA_WORDS_MASK: u16 = 0x1800;
pub const AD413_DATA_WORDS_OFFSET: u16 = 11;
pub const AD413_SUB_ADDRESS_MASK: u16 = 0x6000;
pub const AD413_SUB_ADDRESS_OFFSET: u16 = 13;
pub const AD413_ENERGY_MASK: u16 = 0x1fff;
/// Silicon 413 ADCs sit at vsn 13 and 14.
pub const AD413_SILICON_VSN_BASE: u16 = 13;

// TDC 3377.
pub const TDC3377_IDENTIFIER_MASK: u16 = 0x7c00;
pub const TDC3377_IDENTIFIER_OFFSET: u16 = 10;
pub const TDC3377_TIME_MASK: u16 = 0x00ff;

// ADC 4300 (SCEPTAR QDC).
pub const AD4300_WORDS_MASK: u16 = 0x7800;
pub const AD4300_WORDS_OFFSET: u16 = 11;
pub const AD4300_IDENTIFIER_MASK: u16 = 0x7800;
pub const AD4300_IDENTIFIER_OFFSET: u16 = 11;
pub const AD4300_ENERGY_MASK: u16 = 0x07ff;
/// Channels per 4300 module; a word count of zero means all of them fired.
pub const AD4300_CHANNELS: u16 = 16;

// ULM status word layout.
pub const ULM_CYCLE_MASK: u16 = 0x03ff;
pub const ULM_BEAM_STATUS_BIT: u16 = 0x0400;
pub const ULM_TRIGGER_MASK_OFFSET: u16 = 11;

/// ULM clock ticks per second (100 ns ticks).
pub const ULM_TICKS_PER_SECOND: u64 = 10_000_000;
/// The raw ULM clock field is 32 bits; it wraps every 2^32 ticks.
pub const ULM_CLOCK_MODULUS: u64 = 1 << 32;
