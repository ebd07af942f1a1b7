use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use fxhash::FxHashMap;
use human_bytes::human_bytes;

use super::buffer::BuiltQueue;
use super::calibrate::Calibrator;
use super::clock::ClockState;
use super::config::Settings;
use super::constants::*;
use super::error::{BufferError, ProcessorError};
use super::event::{DetectorType, Hit};
use super::event_builder::EventBuilder;
use super::fera::FeraDecoder;
use super::midas_file::MidasEvent;
use super::sink::EventSink;

/// Lifecycle of the pipeline. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PipelineState {
    /// Normal operation, hits keep arriving.
    Run = 0,
    /// No more input; the builder drains the pending set ignoring the
    /// waiting window.
    FlushReadBuffer = 1,
    /// Pending set empty; the sink drains the built queue.
    FlushBuiltBuffer = 2,
    Done = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Run,
            1 => PipelineState::FlushReadBuffer,
            2 => PipelineState::FlushBuiltBuffer,
            _ => PipelineState::Done,
        }
    }
}

/// State shared between the producer (the caller of `process`) and the
/// worker threads. All waiting is condvar-based; nothing busy-polls.
struct Shared {
    settings: Settings,
    state: AtomicU8,
    builder: Mutex<EventBuilder>,
    builder_condvar: Condvar,
    built: Mutex<BuiltQueue>,
    built_condvar: Condvar,
    nof_built: AtomicU64,
    nof_written: AtomicU64,
    nof_written_hits: AtomicU64,
    nof_sink_errors: AtomicU64,
}

impl Shared {
    fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// The orchestrator: feeds decoded hits into the shared pending set and runs
/// the event-building and sink threads until the run is flushed.
pub struct MidasEventProcessor {
    settings: Settings,
    shared: Arc<Shared>,
    decoder: FeraDecoder,
    clock_state: ClockState,
    event_counter: FxHashMap<u16, u64>,
    bank_counter: FxHashMap<u32, u64>,
    last_fifo_serial: FxHashMap<u32, u32>,
    last_event_number: u32,
    last_event_time: u32,
    nof_bad_fifo_status: u64,
    total_bytes: u64,
    mcs: Vec<Vec<u32>>,
    temperatures: Vec<f32>,
    calibrator: Option<Box<dyn Calibrator>>,
    threads: Vec<JoinHandle<()>>,
    flushed: bool,
}

impl MidasEventProcessor {
    pub fn new(settings: Settings, sink: Box<dyn EventSink>) -> Self {
        let shared = Arc::new(Shared {
            builder: Mutex::new(EventBuilder::new(
                settings.read_buffer_size,
                settings.max_read_buffer_size,
            )),
            builder_condvar: Condvar::new(),
            built: Mutex::new(BuiltQueue::new(
                settings.built_buffer_size,
                settings.max_built_buffer_size,
            )),
            built_condvar: Condvar::new(),
            state: AtomicU8::new(PipelineState::Run as u8),
            nof_built: AtomicU64::new(0),
            nof_written: AtomicU64::new(0),
            nof_written_hits: AtomicU64::new(0),
            nof_sink_errors: AtomicU64::new(0),
            settings: settings.clone(),
        });

        let mut threads = Vec::new();

        let build_shared = shared.clone();
        threads.push(std::thread::spawn(move || Self::build_loop(build_shared)));

        let sink_shared = shared.clone();
        threads.push(std::thread::spawn(move || {
            Self::sink_loop(sink_shared, sink)
        }));

        if settings.status_update {
            let status_shared = shared.clone();
            threads.push(std::thread::spawn(move || {
                Self::status_loop(status_shared)
            }));
        }

        Self {
            settings,
            shared,
            decoder: FeraDecoder::new(),
            clock_state: ClockState::new(),
            event_counter: FxHashMap::default(),
            bank_counter: FxHashMap::default(),
            last_fifo_serial: FxHashMap::default(),
            last_event_number: 0,
            last_event_time: 0,
            nof_bad_fifo_status: 0,
            total_bytes: 0,
            mcs: Vec::new(),
            temperatures: Vec::new(),
            calibrator: None,
            threads,
            flushed: false,
        }
    }

    /// Attach an energy calibration collaborator. Hits decoded from this
    /// point on carry a calibrated energy.
    pub fn set_calibrator(&mut self, calibrator: Box<dyn Calibrator>) {
        self.calibrator = Some(calibrator);
    }

    /// Handle one MIDAS event. Returns Ok(false) once the file-end event has
    /// been seen; the caller should then call `flush`.
    pub fn process(&mut self, event: &MidasEvent) -> Result<bool, ProcessorError> {
        *self.event_counter.entry(event.event_type).or_default() += 1;
        self.total_bytes += event.nof_bytes as u64;

        match event.event_type {
            FIFO_EVENT => self.fifo_event(event)?,
            CAMAC_SCALER_EVENT => {
                self.camac_scaler_event(event);
                // a scaler readout marks the end of a tape cycle
                self.clock_state.update(event.time);
            }
            SCALER_SCALER_EVENT => self.camac_scaler_event(event),
            I_SCALER_EVENT | FRONT_END_EVENT => {}
            EPICS_EVENT => self.epics_event(event),
            FILE_END_EVENT => {
                spdlog::info!(
                    "reached file end, got {} cycles",
                    self.clock_state.nof_stored_cycles()
                );
                return Ok(false);
            }
            unknown => {
                spdlog::error!(
                    "unknown event type 0x{:x} for midas event {}",
                    unknown,
                    event.number
                );
            }
        }

        Ok(true)
    }

    /// Walk the FERA streams of a FIFO event and feed the decoded hits into
    /// the pending set.
    fn fifo_event(&mut self, event: &MidasEvent) -> Result<(), ProcessorError> {
        if self.last_event_number != 0 && event.number > self.last_event_number + 1 {
            spdlog::debug!(
                "missed {} FIFO data events between events {} and {}",
                event.number - self.last_event_number - 1,
                self.last_event_number,
                event.number
            );
        }
        if event.time < self.last_event_time {
            spdlog::warn!(
                "FIFO event {} occured before the last event {} ({} < {})",
                event.number,
                self.last_event_number,
                event.time,
                self.last_event_time
            );
        }
        self.last_event_number = event.number;
        self.last_event_time = event.time;

        for bank in &event.banks {
            if bank.size == 0 {
                continue;
            }
            let mut cursor = bank.cursor();

            // a bank can carry several FERA streams back to back
            while cursor.got_data() {
                let fera_start = cursor.read_point();

                let fifo_status = match cursor.get_u32() {
                    Some(status) => status,
                    None => break,
                };
                if fifo_status != GOOD_FIFO_1 && fifo_status != GOOD_FIFO_2 {
                    spdlog::warn!(
                        "invalid FIFO status 0x{:08x} in event {}",
                        fifo_status,
                        event.number
                    );
                    self.nof_bad_fifo_status += 1;
                    continue;
                }

                let fera_words_raw = match cursor.get_u32() {
                    Some(words) => words,
                    None => break,
                };
                if fera_words_raw & FIFO_FLAG_BITS != 0 {
                    spdlog::debug!(
                        "event {}, bank {}: FIFO overflow or timeout bit set: {}",
                        event.number,
                        bank.number,
                        (fera_words_raw >> 14) & 0x3
                    );
                }
                let fera_words = (fera_words_raw & FERA_WORDS_MASK) as usize;

                // stream end: the data words plus the not-yet-read serial
                let fera_end = cursor.read_point() + 2 * fera_words + 4;
                if fera_end > cursor.size() {
                    spdlog::warn!(
                        "FERA stream of {} words does not fit in bank {} of event {}",
                        fera_words,
                        bank.number,
                        event.number
                    );
                    cursor.skip_to_end();
                    continue;
                }

                let fifo_serial = match cursor.get_u32() {
                    Some(serial) => serial & 0xff,
                    None => break,
                };
                *self.bank_counter.entry(bank.int_name()).or_default() += 1;
                if let Some(&last_serial) = self.last_fifo_serial.get(&bank.int_name()) {
                    if fifo_serial != (last_serial + 1) & 0xff {
                        spdlog::debug!(
                            "missed a FIFO serial in event {}, bank {}: serial {}, last {}",
                            event.number,
                            bank.number,
                            fifo_serial,
                            last_serial
                        );
                    }
                }
                self.last_fifo_serial.insert(bank.int_name(), fifo_serial);

                match DetectorType::from_bank_name(bank.int_name()) {
                    Some(detector_type) => {
                        let hits = self.decoder.decode(
                            &self.settings,
                            bank,
                            &mut cursor,
                            fera_end,
                            detector_type,
                            event.time,
                            event.number,
                            &mut self.clock_state,
                        );
                        for mut hit in hits {
                            if let Some(calibrator) = self.calibrator.as_mut() {
                                hit.calibrated_energy = calibrator.calibrate(
                                    hit.detector_type,
                                    hit.detector_number,
                                    hit.raw_energy,
                                );
                            }
                            self.insert_hit(hit)?;
                        }
                    }
                    None => {
                        spdlog::error!(
                            "unknown bank name 0x{:x} for bank {} in midas event {}",
                            bank.int_name(),
                            bank.number,
                            event.number
                        );
                    }
                }

                // the stream is padded to a whole number of 32-bit words;
                // 12 bytes cover the status, word count and serial
                cursor.set_read_point(fera_start + 2 * (fera_words + fera_words % 2) + 12);

                // two trailing junk bytes can remain at the bank end
                if cursor.read_point() + 2 == cursor.size() {
                    cursor.skip_to_end();
                }
            }
        }

        Ok(())
    }

    /// Capture the multichannel scaler readout from the MCS0 bank.
    fn camac_scaler_event(&mut self, event: &MidasEvent) {
        for bank in &event.banks {
            if !bank.is_bank("MCS0") {
                continue;
            }
            self.mcs = vec![Vec::new(); NOF_MCS_CHANNELS];
            let mut cursor = bank.cursor();
            let mut channel = 0;
            while cursor.got_bytes(2) {
                match cursor.get_u32() {
                    Some(value) => {
                        self.mcs[channel % NOF_MCS_CHANNELS].push(value);
                        channel += 1;
                    }
                    None => break,
                }
            }
            break;
        }
    }

    /// EPICS slow-control readout: sample 15 of the float bank is the
    /// experiment temperature.
    fn epics_event(&mut self, event: &MidasEvent) {
        let Some(bank) = event.banks.get(1) else {
            spdlog::warn!("EPICS event {} without a data bank", event.number);
            return;
        };
        let mut cursor = bank.cursor();
        for _ in 0..14 {
            if cursor.get_f32().is_none() {
                return;
            }
        }
        if let Some(temperature) = cursor.get_f32() {
            spdlog::debug!("temperature reading {}", temperature);
            self.temperatures.push(temperature);
        }
    }

    /// Insert one hit, growing the pending buffer when full and falling back
    /// to bounded condvar waits once it cannot grow further.
    fn insert_hit(&self, hit: Hit) -> Result<(), ProcessorError> {
        let mut builder = match self.shared.builder.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut retries = 0;
        while builder.is_full() {
            if builder.try_grow() {
                spdlog::debug!("grew the pending hit buffer to {}", builder.capacity());
                break;
            }
            if retries >= self.settings.buffer_retries {
                return Err(BufferError::Exhausted("pending hit", builder.capacity()).into());
            }
            let (guard, _) = match self.shared.builder_condvar.wait_timeout(
                builder,
                Duration::from_millis(self.settings.buffer_retry_millis),
            ) {
                Ok(result) => result,
                Err(poisoned) => poisoned.into_inner(),
            };
            builder = guard;
            retries += 1;
        }

        builder.insert(hit);
        drop(builder);
        self.shared.builder_condvar.notify_all();
        Ok(())
    }

    /// End the run: drain the pending set and the built queue in order, join
    /// the workers and return the run report. A drain that exceeds the
    /// configured timeout is forced.
    pub fn flush(&mut self) -> String {
        if !self.flushed {
            self.flushed = true;
            if self.shared.state() == PipelineState::Run {
                self.shared.set_state(PipelineState::FlushReadBuffer);
            }
            self.shared.builder_condvar.notify_all();
            self.shared.built_condvar.notify_all();

            let deadline = Instant::now() + Duration::from_secs(self.settings.flush_timeout_secs);
            let mut forced = false;
            while !self.threads.iter().all(|thread| thread.is_finished()) {
                if !forced && Instant::now() > deadline {
                    spdlog::error!(
                        "flush did not drain within {} s, forcing shutdown",
                        self.settings.flush_timeout_secs
                    );
                    self.shared.set_state(PipelineState::Done);
                    self.shared.builder_condvar.notify_all();
                    self.shared.built_condvar.notify_all();
                    forced = true;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            for thread in self.threads.drain(..) {
                if thread.join().is_err() {
                    spdlog::error!("failed to join a worker thread");
                }
            }
            if forced {
                spdlog::error!(
                    "forced flush dropped {} pending hits and {} built events",
                    self.pending_hits(),
                    self.built_events_queued()
                );
            }
        }
        self.report()
    }

    fn pending_hits(&self) -> usize {
        match self.shared.builder.lock() {
            Ok(builder) => builder.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn built_events_queued(&self) -> usize {
        match self.shared.built.lock() {
            Ok(built) => built.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    pub fn nof_built_events(&self) -> u64 {
        self.shared.nof_built.load(Ordering::SeqCst)
    }

    pub fn nof_written_events(&self) -> u64 {
        self.shared.nof_written.load(Ordering::SeqCst)
    }

    pub fn nof_written_hits(&self) -> u64 {
        self.shared.nof_written_hits.load(Ordering::SeqCst)
    }

    /// One-line snapshot of the pipeline.
    pub fn status(&self) -> String {
        format!(
            "pending hits: {}, built queue: {}, built: {}, written: {}, processed: {}",
            self.pending_hits(),
            self.built_events_queued(),
            self.nof_built_events(),
            self.nof_written_events(),
            human_bytes(self.total_bytes as f64)
        )
    }

    /// End-of-run summary.
    pub fn report(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "processed {}", human_bytes(self.total_bytes as f64));
        let _ = writeln!(report, "events found:");
        let mut event_types: Vec<_> = self.event_counter.iter().collect();
        event_types.sort();
        for (&event_type, &count) in event_types {
            let label = match event_type {
                FIFO_EVENT => "fifo",
                CAMAC_SCALER_EVENT => "camac",
                SCALER_SCALER_EVENT => "scaler",
                I_SCALER_EVENT => "i-scaler",
                EPICS_EVENT => "epics",
                FRONT_END_EVENT => "frontend",
                FILE_END_EVENT => "file-end",
                _ => "unknown",
            };
            let _ = writeln!(report, "  {label}:\t{count:7}");
        }
        let _ = writeln!(report, "fera modules decoded:");
        let stats = self.decoder.stats();
        let mut fera_types: Vec<_> = stats.module_counter.iter().collect();
        fera_types.sort();
        for (&fera_type, &count) in fera_types {
            let _ = writeln!(report, "  {}:\t{count:7}", fera_type_label(fera_type));
        }
        let _ = writeln!(
            report,
            "hits: {} decoded, {} dropped (inactive), {} energy overflows, {} banks discarded, {} decode errors",
            stats.nof_hits,
            stats.dropped_inactive,
            stats.energy_overflows,
            stats.discarded_banks,
            stats.decode_errors
        );
        let nof_zeros: u64 = stats.nof_zeros.values().sum();
        if nof_zeros > 0 {
            let _ = writeln!(
                report,
                "zero words skipped: {} across {} bank names",
                nof_zeros,
                stats.nof_zeros.len()
            );
        }
        let _ = writeln!(
            report,
            "events: {} built, {} written ({} hits), {} sink errors",
            self.nof_built_events(),
            self.nof_written_events(),
            self.nof_written_hits(),
            self.shared.nof_sink_errors.load(Ordering::SeqCst)
        );
        let _ = writeln!(
            report,
            "bad FIFO status words: {}, temperature samples: {}, cycles: {}",
            self.nof_bad_fifo_status,
            self.temperatures.len(),
            self.clock_state.nof_stored_cycles()
        );
        report
    }

    pub fn temperatures(&self) -> &[f32] {
        &self.temperatures
    }

    pub fn mcs(&self) -> &[Vec<u32>] {
        &self.mcs
    }

    /// Event-building thread: extracts settled coincident groups from the
    /// pending set and hands them to the built queue.
    fn build_loop(shared: Arc<Shared>) {
        loop {
            let state = shared.state();
            if state == PipelineState::Done {
                break;
            }
            let flushing = state != PipelineState::Run;

            let event = {
                let mut builder = match shared.builder.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                builder.next_event(&shared.settings, flushing)
            };

            match event {
                Some(event) => {
                    // the producer may be waiting for pending space
                    shared.builder_condvar.notify_all();
                    Self::push_built(&shared, event);
                }
                None => {
                    if flushing {
                        // the built event (if any) was pushed before this
                        // check, so an empty pending set really is drained
                        let empty = match shared.builder.lock() {
                            Ok(builder) => builder.is_empty(),
                            Err(poisoned) => poisoned.into_inner().is_empty(),
                        };
                        if empty {
                            if shared.state() == PipelineState::FlushReadBuffer {
                                shared.set_state(PipelineState::FlushBuiltBuffer);
                            }
                            shared.built_condvar.notify_all();
                            break;
                        }
                    }
                    let builder = match shared.builder.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    let _ = shared.builder_condvar.wait_timeout(
                        builder,
                        Duration::from_millis(shared.settings.buffer_retry_millis),
                    );
                }
            }
        }
    }

    fn push_built(shared: &Arc<Shared>, event: crate::event::BuiltEvent) {
        let mut built = match shared.built.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut reported = false;
        while built.is_full() {
            if built.try_grow() {
                spdlog::debug!("grew the built event buffer to {}", built.capacity());
                break;
            }
            if !reported {
                spdlog::error!(
                    "{}",
                    BufferError::Exhausted("built event", built.capacity())
                );
                reported = true;
            }
            let (guard, _) = match shared.built_condvar.wait_timeout(
                built,
                Duration::from_millis(shared.settings.buffer_retry_millis),
            ) {
                Ok(result) => result,
                Err(poisoned) => poisoned.into_inner(),
            };
            built = guard;
            if shared.state() == PipelineState::Done {
                return;
            }
        }
        built.push(event);
        drop(built);
        shared.nof_built.fetch_add(1, Ordering::SeqCst);
        shared.built_condvar.notify_all();
    }

    /// Sink thread: writes built events in order.
    fn sink_loop(shared: Arc<Shared>, mut sink: Box<dyn EventSink>) {
        loop {
            let event = {
                let mut built = match shared.built.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                built.pop()
            };

            match event {
                Some(event) => {
                    // the builder may be waiting for queue space
                    shared.built_condvar.notify_all();
                    match sink.write(&event) {
                        Ok(()) => {
                            shared.nof_written.fetch_add(1, Ordering::SeqCst);
                            shared
                                .nof_written_hits
                                .fetch_add(event.nof_hits() as u64, Ordering::SeqCst);
                        }
                        Err(error) => {
                            spdlog::error!("sink write failed: {}", error);
                            shared.nof_sink_errors.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
                None => {
                    let state = shared.state();
                    if state >= PipelineState::FlushBuiltBuffer {
                        shared.set_state(PipelineState::Done);
                        break;
                    }
                    let built = match shared.built.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    let _ = shared.built_condvar.wait_timeout(
                        built,
                        Duration::from_millis(shared.settings.buffer_retry_millis),
                    );
                }
            }
        }
        if let Err(error) = sink.finish() {
            spdlog::error!("sink finish failed: {}", error);
            shared.nof_sink_errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Periodic status log, enabled by the status_update setting.
    fn status_loop(shared: Arc<Shared>) {
        let mut ticks = 0u32;
        while shared.state() != PipelineState::Done {
            std::thread::sleep(Duration::from_millis(500));
            ticks += 1;
            if ticks % 20 == 0 {
                let pending = match shared.builder.lock() {
                    Ok(builder) => builder.len(),
                    Err(poisoned) => poisoned.into_inner().len(),
                };
                let queued = match shared.built.lock() {
                    Ok(built) => built.len(),
                    Err(poisoned) => poisoned.into_inner().len(),
                };
                spdlog::info!(
                    "pending hits: {}, built queue: {}, built: {}, written: {}",
                    pending,
                    queued,
                    shared.nof_built.load(Ordering::SeqCst),
                    shared.nof_written.load(Ordering::SeqCst)
                );
            }
        }
    }
}

impl Drop for MidasEventProcessor {
    fn drop(&mut self) {
        if !self.flushed {
            self.flush();
        }
    }
}

fn fera_type_label(fera_type: u16) -> &'static str {
    match fera_type {
        VH_AD413 => "adc 413",
        VH_3377 => "tdc 3377",
        VH_FULM => "ulm",
        VH_4300 => "adc 4300",
        VH_AD114_1 => "adc 114 (1)",
        VH_AD114_2 => "adc 114 (2)",
        VH_AD114_SI => "adc 114 (si)",
        BAD_FERA => "bad fera",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::Bank;
    use crate::sink::CountingSink;

    fn pack_words(words: &[u16]) -> Vec<u32> {
        words
            .chunks(2)
            .map(|pair| ((pair[0] as u32) << 16) | (*pair.get(1).unwrap_or(&0) as u32))
            .collect()
    }

    /// One complete FIFO FERA stream for a germanium bank: status, word
    /// count, serial, one ADC 114 record and a ULM with the given clock.
    fn germanium_bank(event_number: u32, serial: u16, detector: u16, clock: u32) -> Bank {
        let fera: Vec<u16> = vec![
            FERA_VALID_BIT | VH_AD114_1 | detector,
            0x0123,
            FERA_VALID_BIT | VH_FULM,
            0x0001,
            (clock >> 16) as u16,
            (clock & 0xffff) as u16,
            0,
            100,
            0,
            7,
        ];
        let nof_fera_words = fera.len() as u16;
        let mut words: Vec<u16> = vec![0x0000, 0xff06, 0x0000, nof_fera_words, 0x0000, serial];
        words.extend(&fera);
        // pad to a whole number of 32-bit words
        if words.len() % 2 == 1 {
            words.push(0);
        }
        let data = pack_words(&words);
        Bank {
            name: FME_ZERO.to_be_bytes(),
            bank_type: 1,
            size: (2 * words.len()) as u32,
            data,
            nof_extra_bytes: 0,
            number: 0,
            event_number,
        }
    }

    fn fifo_event(number: u32, time: u32, banks: Vec<Bank>) -> MidasEvent {
        MidasEvent {
            event_type: FIFO_EVENT,
            mask: 0,
            number,
            time,
            nof_bytes: 0,
            total_bank_bytes: 0,
            flags: 0,
            banks,
        }
    }

    fn small_settings() -> Settings {
        let mut settings = Settings::default();
        settings.waiting_window = 1000;
        settings.coincidence_window = 10;
        settings.buffer_retry_millis = 1;
        settings.flush_timeout_secs = 10;
        settings
    }

    #[test]
    fn test_pipeline_builds_and_writes() {
        let settings = small_settings();
        let mut processor =
            MidasEventProcessor::new(settings, Box::new(CountingSink::default()));

        // two hits 5 ticks apart, then one far away
        for (number, clock) in [(1u32, 1000u32), (2, 1005), (3, 90000)] {
            let event = fifo_event(number, 100 + number, vec![germanium_bank(number, number as u16, 1, clock)]);
            assert!(processor.process(&event).unwrap());
        }

        let report = processor.flush();
        assert_eq!(processor.state(), PipelineState::Done);
        assert_eq!(processor.nof_built_events(), 2);
        assert_eq!(processor.nof_written_events(), 2);
        assert_eq!(processor.nof_written_hits(), 3);
        assert!(report.contains("fifo"));
    }

    #[test]
    fn test_file_end_stops_processing() {
        let settings = small_settings();
        let mut processor =
            MidasEventProcessor::new(settings, Box::new(CountingSink::default()));
        let end = MidasEvent {
            event_type: FILE_END_EVENT,
            ..MidasEvent::default()
        };
        assert!(!processor.process(&end).unwrap());
        processor.flush();
    }

    #[test]
    fn test_bad_fifo_status_is_skipped() {
        let settings = small_settings();
        let mut processor =
            MidasEventProcessor::new(settings, Box::new(CountingSink::default()));

        let mut bank = germanium_bank(1, 1, 1, 1000);
        // corrupt the FIFO status word
        bank.data[0] = 0xdead_beef;
        let event = fifo_event(1, 100, vec![bank]);
        processor.process(&event).unwrap();
        processor.flush();
        // every following word is re-tried as a status and fails too
        assert!(processor.nof_bad_fifo_status >= 1);
        assert_eq!(processor.nof_built_events(), 0);
    }

    #[test]
    fn test_scaler_capture() {
        let settings = small_settings();
        let mut processor =
            MidasEventProcessor::new(settings, Box::new(CountingSink::default()));

        let values: Vec<u32> = (0..64).collect();
        let bank = Bank {
            name: *b"MCS0",
            bank_type: 6,
            size: (4 * values.len()) as u32,
            data: values,
            nof_extra_bytes: 0,
            number: 0,
            event_number: 1,
        };
        let event = MidasEvent {
            event_type: CAMAC_SCALER_EVENT,
            number: 1,
            banks: vec![bank],
            ..MidasEvent::default()
        };
        processor.process(&event).unwrap();
        assert_eq!(processor.mcs().len(), NOF_MCS_CHANNELS);
        assert_eq!(processor.mcs()[0], vec![0, 32]);
        assert_eq!(processor.clock_state.nof_stored_cycles(), 1);
        processor.flush();
    }

    #[test]
    fn test_epics_temperature_capture() {
        let settings = small_settings();
        let mut processor =
            MidasEventProcessor::new(settings, Box::new(CountingSink::default()));

        let mut samples = vec![0.0f32; 16];
        samples[14] = 21.5;
        let data: Vec<u32> = samples.iter().map(|sample| sample.to_bits()).collect();
        let bank = Bank {
            name: *b"EPIC",
            bank_type: 9,
            size: (4 * data.len()) as u32,
            data,
            nof_extra_bytes: 0,
            number: 1,
            event_number: 1,
        };
        let event = MidasEvent {
            event_type: EPICS_EVENT,
            number: 1,
            banks: vec![Bank::default(), bank],
            ..MidasEvent::default()
        };
        processor.process(&event).unwrap();
        assert_eq!(processor.temperatures(), &[21.5]);
        processor.flush();
    }
}
