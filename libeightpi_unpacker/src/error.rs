use std::path::PathBuf;
use thiserror::Error;

use super::constants::*;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("Could not open MIDAS file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Bad MIDAS magic 0x{0:x}; the low 16 bits of the first word must equal 0x{exp:x}", exp=MIDAS_FILE_MAGIC)]
    BadMagic(u32),
    #[error("Not enough bytes left for the MIDAS file header: {0} < {exp}", exp=FILE_HEADER_BYTES)]
    ShortFileHeader(usize),
    #[error("Not enough bytes left for the header information block: {0} < {1}")]
    ShortHeaderInfo(usize, usize),
    #[error("MIDAS file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

/// Module-level decode failures. These abort a single module read and are
/// counted; they never abort the run.
#[derive(Debug, Clone, Error)]
pub enum FeraError {
    #[error("ADC 413 sub-address {0} is outside [0,3]")]
    BadSubAddress(u16),
    #[error("TDC 3377 identifier mismatch: 0x{0:x} != 0x{1:x}")]
    IdentifierMismatch(u16, u16),
    #[error("Module data truncated at the end of the FERA stream")]
    Truncated,
}

#[derive(Debug, Clone, Error)]
pub enum BufferError {
    #[error("The {0} buffer is at its maximum capacity of {1} and retries were exhausted")]
    Exhausted(&'static str, usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load settings as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Settings failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Settings failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to file error: {0}")]
    FileError(#[from] FileError),
    #[error("Processor failed due to buffer error: {0}")]
    BufferError(#[from] BufferError),
    #[error("Processor failed due to settings error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}
