use fxhash::FxHashMap;

use super::bank::{Bank, BankCursor};
use super::clock::ClockState;
use super::config::Settings;
use super::constants::*;
use super::error::FeraError;
use super::event::{DetectorType, Hit, Ulm};

/// Running decode bookkeeping, reported at the end of the run.
#[derive(Debug, Default)]
pub struct DecodeStats {
    /// Decoded module records keyed by FERA type.
    pub module_counter: FxHashMap<u16, u64>,
    /// Zero filler words skipped, keyed by bank name.
    pub nof_zeros: FxHashMap<u32, u64>,
    /// TDC hits keyed by sub-address.
    pub tdc_sub_addresses: FxHashMap<u16, u64>,
    pub dropped_inactive: u64,
    /// Raw energies above the configured per-type maximum channel.
    pub energy_overflows: u64,
    pub discarded_banks: u64,
    pub decode_errors: u64,
    pub nof_hits: u64,
}

/// Walks the FERA stream of one bank and turns it into hits.
///
/// Each detector family multiplexes a fixed set of module types; a header that
/// is legal for a different family aborts the bank, matching the frontend
/// contract that a stream never mixes families.
#[derive(Debug, Default)]
pub struct FeraDecoder {
    stats: DecodeStats,
    last_cycle: [u16; 4],
    events_in_cycle: [u32; 4],
}

impl FeraDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Decode one FERA stream, from the cursor position up to fera_end
    /// (bytes). Returns the hits of this stream; a stream without a usable
    /// ULM record is discarded entirely because its hits cannot be ordered.
    #[allow(clippy::too_many_arguments)]
    pub fn decode(
        &mut self,
        settings: &Settings,
        bank: &Bank,
        cursor: &mut BankCursor<'_>,
        fera_end: usize,
        detector_type: DetectorType,
        event_time: u32,
        event_number: u32,
        clock_state: &mut ClockState,
    ) -> Vec<Hit> {
        let mut energies: Vec<(u16, u16)> = Vec::new();
        let mut times: FxHashMap<u16, Vec<u16>> = FxHashMap::default();
        let mut ulm = Ulm::default();
        let mut saw_ulm = false;

        'stream: while cursor.read_point() < fera_end {
            let mut header = match cursor.get_u16() {
                Some(word) => word,
                None => break,
            };

            // zero words are filler between modules
            while header == 0 && cursor.read_point() < fera_end {
                *self.stats.nof_zeros.entry(bank.int_name()).or_default() += 1;
                match cursor.get_u16() {
                    Some(word) => header = word,
                    None => break 'stream,
                }
            }

            let vsn = header & FERA_VSN_MASK;
            let fera_type = if header & FERA_VALID_BIT != 0 {
                header & FERA_TYPE_MASK
            } else {
                BAD_FERA
            };

            let result = match (fera_type, detector_type) {
                (VH_AD114_1, DetectorType::Germanium) => {
                    self.read_adc114_with_tdc(settings, cursor, fera_end, vsn, detector_type, &mut energies, &mut times)
                }
                (VH_AD114_2, DetectorType::Germanium) => self.read_adc114_with_tdc(
                    settings,
                    cursor,
                    fera_end,
                    vsn + AD114_SECOND_BANK_OFFSET,
                    detector_type,
                    &mut energies,
                    &mut times,
                ),
                (VH_AD114_SI, DetectorType::Silicon) => {
                    self.read_adc114_with_tdc(settings, cursor, fera_end, vsn, detector_type, &mut energies, &mut times)
                }
                (VH_AD413, DetectorType::Silicon) => {
                    // silicon 413s carry vsn 13 and 14
                    let nof_words = (header & AD413_DATA_WORDS_MASK) >> AD413_DATA_WORDS_OFFSET;
                    self.get_adc413(cursor, vsn.wrapping_sub(AD413_SILICON_VSN_BASE), nof_words, &mut energies)
                }
                (VH_AD413, DetectorType::BaF2) => {
                    let nof_words = (header & AD413_DATA_WORDS_MASK) >> AD413_DATA_WORDS_OFFSET;
                    self.get_adc413(cursor, vsn, nof_words, &mut energies)
                }
                (VH_4300, DetectorType::Plastic) => {
                    self.get_adc4300(settings, cursor, bank, header, vsn, &mut energies)
                }
                (VH_3377, _) => self.get_tdc3377(cursor, bank, fera_end, &mut times),
                (VH_FULM, _) => match self.get_ulm(cursor) {
                    Ok(decoded) => {
                        ulm = decoded;
                        saw_ulm = true;
                        clock_state.correct_overflow(detector_type, event_time, &mut ulm);
                        self.track_cycle(detector_type, ulm.cycle_number);
                        Ok(())
                    }
                    Err(error) => Err(error),
                },
                (BAD_FERA, _) => {
                    spdlog::debug!(
                        "bad fera word 0x{:04x} in {} stream, event {}, bank {}",
                        header,
                        detector_type,
                        event_number,
                        bank.number
                    );
                    *self.stats.module_counter.entry(BAD_FERA).or_default() += 1;
                    cursor.set_read_point(fera_end);
                    continue;
                }
                _ => {
                    spdlog::error!(
                        "failed to find a FERA header for the {} stream in event {}, found 0x{:04x} instead",
                        detector_type,
                        event_number,
                        fera_type
                    );
                    cursor.set_read_point(fera_end);
                    return Vec::new();
                }
            };

            match result {
                Ok(()) => {
                    *self.stats.module_counter.entry(fera_type).or_default() += 1;
                }
                Err(error) => {
                    spdlog::error!("{} in event {}, bank {}", error, event_number, bank.number);
                    self.stats.decode_errors += 1;
                    if matches!(error, FeraError::Truncated) {
                        cursor.set_read_point(fera_end);
                    }
                }
            }
        }

        if !saw_ulm || (ulm.clock == 0 && ulm.cycle_number == 0) {
            if !energies.is_empty() {
                spdlog::warn!(
                    "discarding {} hits without a usable ULM record in event {}, bank {}",
                    energies.len(),
                    event_number,
                    bank.number
                );
            }
            self.stats.discarded_banks += 1;
            return Vec::new();
        }

        self.construct_hits(settings, detector_type, event_time, event_number, energies, times, ulm)
    }

    /// End-of-stream hit construction: drop switched-off detectors and attach
    /// the selected TDC time to each surviving energy.
    fn construct_hits(
        &mut self,
        settings: &Settings,
        detector_type: DetectorType,
        event_time: u32,
        event_number: u32,
        energies: Vec<(u16, u16)>,
        times: FxHashMap<u16, Vec<u16>>,
        ulm: Ulm,
    ) -> Vec<Hit> {
        let mut hits = Vec::with_capacity(energies.len());

        for (detector_number, raw_energy) in energies {
            if !settings.is_active(detector_type, detector_number) {
                self.stats.dropped_inactive += 1;
                continue;
            }

            if raw_energy >= settings.detector(detector_type).max_channel {
                spdlog::warn!(
                    "{} detector {} energy {} above the configured maximum channel {} in event {}",
                    detector_type,
                    detector_number,
                    raw_energy,
                    settings.detector(detector_type).max_channel,
                    event_number
                );
                self.stats.energy_overflows += 1;
            }

            let mut hit = Hit::new(event_time, event_number, detector_type, detector_number, raw_energy, ulm);

            match times.get(&detector_number) {
                Some(channel_times) if !channel_times.is_empty() => {
                    hit.tdc_hit_count = channel_times.len();
                    // the last time inside the coarse window wins; with none
                    // inside, fall back to the first time
                    for &time in channel_times {
                        if settings.coarse_tdc_window(detector_type, time) {
                            hit.selected_time = time;
                        }
                    }
                    if hit.selected_time == 0 {
                        hit.selected_time = channel_times[0];
                    }
                }
                _ => {
                    spdlog::debug!(
                        "no tdc hits for {} detector {} in event {}",
                        detector_type,
                        detector_number,
                        event_number
                    );
                }
            }

            hits.push(hit);
        }

        self.stats.nof_hits += hits.len() as u64;
        hits
    }

    /// ADC 114: one energy word per record. When the next word has the valid
    /// bit clear the record is immediately followed by its TDC data.
    #[allow(clippy::too_many_arguments)]
    fn read_adc114_with_tdc(
        &mut self,
        settings: &Settings,
        cursor: &mut BankCursor<'_>,
        fera_end: usize,
        detector_number: u16,
        detector_type: DetectorType,
        energies: &mut Vec<(u16, u16)>,
        times: &mut FxHashMap<u16, Vec<u16>>,
    ) -> Result<(), FeraError> {
        if detector_number >= settings.channel_count(detector_type) {
            spdlog::error!(
                "invalid {} detector number {} (only {} configured)",
                detector_type,
                detector_number,
                settings.channel_count(detector_type)
            );
        }

        let energy = cursor.get_u16().ok_or(FeraError::Truncated)?;
        if energy > AD114_ENERGY_MASK {
            spdlog::warn!("ADC 114 energy {} > {}", energy, AD114_ENERGY_MASK);
        }

        let tdc_follows = cursor.read_point() < fera_end
            && cursor
                .peek_u16()
                .is_some_and(|word| word & FERA_VALID_BIT == 0);
        if tdc_follows {
            // a failed TDC read must not lose the energy already decoded
            if let Err(error) = self.get_tdc3377_inner(cursor, fera_end, times) {
                spdlog::error!("{} following an ADC 114 record", error);
                self.stats.decode_errors += 1;
            }
            *self.stats.module_counter.entry(VH_3377).or_default() += 1;
        }

        energies.push((detector_number, energy));
        Ok(())
    }

    /// ADC 413: the header announces up to four data words, each carrying a
    /// two-bit sub-address and a 13-bit energy.
    fn get_adc413(
        &mut self,
        cursor: &mut BankCursor<'_>,
        module: u16,
        nof_data_words: u16,
        energies: &mut Vec<(u16, u16)>,
    ) -> Result<(), FeraError> {
        for _ in 0..nof_data_words {
            let data = cursor.get_u16().ok_or(FeraError::Truncated)?;
            let sub_address = (data & AD413_SUB_ADDRESS_MASK) >> AD413_SUB_ADDRESS_OFFSET;
            if sub_address > 3 {
                return Err(FeraError::BadSubAddress(sub_address));
            }
            energies.push((module * 4 + sub_address, data & AD413_ENERGY_MASK));
        }
        Ok(())
    }

    fn get_tdc3377(
        &mut self,
        cursor: &mut BankCursor<'_>,
        bank: &Bank,
        fera_end: usize,
        times: &mut FxHashMap<u16, Vec<u16>>,
    ) -> Result<(), FeraError> {
        self.get_tdc3377_inner(cursor, fera_end, times)
            .map_err(|error| {
                if let FeraError::IdentifierMismatch(high, low) = error {
                    spdlog::error!(
                        "tdc identifier mismatch in event {}, bank {}: 0x{:x} != 0x{:x}",
                        bank.event_number,
                        bank.number,
                        high,
                        low
                    );
                }
                error
            })
    }

    /// TDC 3377: word pairs until a word with the valid bit appears (the next
    /// module header, rewound for the outer loop) or the stream ends. Both
    /// words of a pair must name the same channel.
    fn get_tdc3377_inner(
        &mut self,
        cursor: &mut BankCursor<'_>,
        fera_end: usize,
        times: &mut FxHashMap<u16, Vec<u16>>,
    ) -> Result<(), FeraError> {
        while cursor.read_point() < fera_end {
            let high_word = cursor.get_u16().ok_or(FeraError::Truncated)?;
            let low_word = cursor.get_u16().ok_or(FeraError::Truncated)?;

            if high_word & FERA_VALID_BIT != 0 || low_word & FERA_VALID_BIT != 0 {
                cursor.rewind(4);
                return Ok(());
            }

            if high_word & TDC3377_IDENTIFIER_MASK != low_word & TDC3377_IDENTIFIER_MASK {
                return Err(FeraError::IdentifierMismatch(
                    high_word & TDC3377_IDENTIFIER_MASK,
                    low_word & TDC3377_IDENTIFIER_MASK,
                ));
            }

            let sub_address = (high_word & TDC3377_IDENTIFIER_MASK) >> TDC3377_IDENTIFIER_OFFSET;
            let time = ((high_word & TDC3377_TIME_MASK) << 8) | (low_word & TDC3377_TIME_MASK);
            times.entry(sub_address).or_default().push(time);
            *self.stats.tdc_sub_addresses.entry(sub_address).or_default() += 1;
        }
        Ok(())
    }

    /// ADC 4300 (SCEPTAR QDC): the header announces the word count, zero
    /// meaning all sixteen channels fired.
    fn get_adc4300(
        &mut self,
        settings: &Settings,
        cursor: &mut BankCursor<'_>,
        bank: &Bank,
        header: u16,
        vsn: u16,
        energies: &mut Vec<(u16, u16)>,
    ) -> Result<(), FeraError> {
        let mut nof_adc_words = (header & AD4300_WORDS_MASK) >> AD4300_WORDS_OFFSET;
        if nof_adc_words == 0 {
            nof_adc_words = AD4300_CHANNELS;
        }

        for i in 0..nof_adc_words {
            let word = cursor.get_u16().ok_or(FeraError::Truncated)?;

            if word & FERA_VALID_BIT != 0 {
                spdlog::error!(
                    "reached premature end of adc 4300 data: word {} of {}",
                    i,
                    nof_adc_words
                );
                cursor.rewind(2);
                break;
            }

            let sub_address = (word & AD4300_IDENTIFIER_MASK) >> AD4300_IDENTIFIER_OFFSET;
            let detector_number = vsn * AD4300_CHANNELS + sub_address;

            if detector_number >= settings.channel_count(DetectorType::Plastic) {
                spdlog::warn!(
                    "found plastic detector {} in event {}, bank {}, but only {} are configured",
                    detector_number,
                    bank.event_number,
                    bank.number,
                    settings.channel_count(DetectorType::Plastic)
                );
                continue;
            }

            energies.push((detector_number, word & AD4300_ENERGY_MASK));
        }
        Ok(())
    }

    /// ULM end-of-event record: status word, then clock, live clock and
    /// master count as 32-bit words.
    fn get_ulm(&mut self, cursor: &mut BankCursor<'_>) -> Result<Ulm, FeraError> {
        let mut ulm = Ulm::default();
        ulm.set_header(cursor.get_u16().ok_or(FeraError::Truncated)?);
        ulm.set_clock(cursor.get_u32().ok_or(FeraError::Truncated)?);
        ulm.live_clock = cursor.get_u32().ok_or(FeraError::Truncated)?;
        ulm.master_count = cursor.get_u32().ok_or(FeraError::Truncated)?;
        Ok(ulm)
    }

    fn track_cycle(&mut self, detector_type: DetectorType, cycle_number: u16) {
        let index = detector_type.index();
        if cycle_number != self.last_cycle[index] && self.last_cycle[index] != 0 {
            spdlog::debug!(
                "{}. cycle: {} {} events in last cycle",
                cycle_number,
                self.events_in_cycle[index],
                detector_type
            );
            self.events_in_cycle[index] = 0;
        } else {
            self.events_in_cycle[index] += 1;
        }
        self.last_cycle[index] = cycle_number;
    }
}
