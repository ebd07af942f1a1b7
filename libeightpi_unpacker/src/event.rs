use super::constants::*;

/// The four detector families of the array. The frontend multiplexes one FERA
/// stream per family, identified by the bank name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorType {
    Germanium,
    Plastic,
    Silicon,
    BaF2,
}

impl DetectorType {
    pub const ALL: [DetectorType; 4] = [
        DetectorType::Germanium,
        DetectorType::Plastic,
        DetectorType::Silicon,
        DetectorType::BaF2,
    ];

    /// Index for fixed-size per-type arrays.
    pub fn index(&self) -> usize {
        match self {
            DetectorType::Germanium => 0,
            DetectorType::Plastic => 1,
            DetectorType::Silicon => 2,
            DetectorType::BaF2 => 3,
        }
    }

    /// Map a FIFO bank name to its detector family.
    pub fn from_bank_name(name: u32) -> Option<DetectorType> {
        match name {
            FME_ZERO => Some(DetectorType::Germanium),
            FME_ONE => Some(DetectorType::Plastic),
            FME_TWO => Some(DetectorType::BaF2),
            FME_THREE => Some(DetectorType::Silicon),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DetectorType::Germanium => "Germanium",
            DetectorType::Plastic => "Plastic",
            DetectorType::Silicon => "Silicon",
            DetectorType::BaF2 => "BaF2",
        }
    }
}

impl std::fmt::Display for DetectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Decoded universal logic module record: the end-of-event marker carrying the
/// cycle number, trigger status and the hardware clocks. Exactly one is
/// expected per decoded bank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ulm {
    pub cycle_number: u16,
    pub trigger_mask: u16,
    pub beam_on: bool,
    /// 100 ns ticks, overflow-corrected to 64 bits; the raw field is 32 bits.
    pub clock: u64,
    pub live_clock: u32,
    pub master_count: u32,
}

impl Ulm {
    /// Unpack the ULM status word.
    pub fn set_header(&mut self, header: u16) {
        self.cycle_number = header & ULM_CYCLE_MASK;
        self.trigger_mask = header >> ULM_TRIGGER_MASK_OFFSET;
        self.beam_on = header & ULM_BEAM_STATUS_BIT != 0;
    }

    pub fn set_clock(&mut self, clock: u32) {
        self.clock = clock as u64;
    }

    /// Shift the wrap count into the high bits of the stored clock.
    pub fn set_clock_overflow(&mut self, overflow: u32) {
        self.clock |= (overflow as u64) << 32;
    }
}

/// One decoded detector observation: a (detector, energy) pair stamped with
/// the ULM record of its bank and the TDC time selected for its channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Wall-clock arrival time of the enclosing MIDAS event, in seconds.
    pub event_time: u32,
    pub event_number: u32,
    pub detector_type: DetectorType,
    pub detector_number: u16,
    pub raw_energy: u16,
    /// Filled by a Calibrator collaborator when one is configured.
    pub calibrated_energy: Option<f32>,
    pub tdc_hit_count: usize,
    pub selected_time: u16,
    pub ulm: Ulm,
}

impl Hit {
    pub fn new(
        event_time: u32,
        event_number: u32,
        detector_type: DetectorType,
        detector_number: u16,
        raw_energy: u16,
        ulm: Ulm,
    ) -> Self {
        Self {
            event_time,
            event_number,
            detector_type,
            detector_number,
            raw_energy,
            calibrated_energy: None,
            tdc_hit_count: 0,
            selected_time: 0,
            ulm,
        }
    }

    /// Ordering key within the pending set.
    pub fn clock(&self) -> u64 {
        self.ulm.clock
    }
}

/// An ordered group of time-coincident hits, with per-type multiplicities
/// derived at construction.
#[derive(Debug, Clone)]
pub struct BuiltEvent {
    hits: Vec<Hit>,
    multiplicity: [u32; 4],
}

impl BuiltEvent {
    /// A built event always contains at least the anchor hit.
    pub fn new(hits: Vec<Hit>) -> Self {
        debug_assert!(!hits.is_empty());
        let mut multiplicity = [0u32; 4];
        for hit in &hits {
            multiplicity[hit.detector_type.index()] += 1;
        }
        Self { hits, multiplicity }
    }

    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    pub fn nof_hits(&self) -> usize {
        self.hits.len()
    }

    pub fn multiplicity(&self, detector_type: DetectorType) -> u32 {
        self.multiplicity[detector_type.index()]
    }

    /// Clock of the anchor (oldest) hit.
    pub fn anchor_clock(&self) -> u64 {
        self.hits[0].clock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ulm_header() {
        let mut ulm = Ulm::default();
        // cycle 5, beam on, trigger mask 0b10110
        ulm.set_header(5 | 0x0400 | (0b10110 << 11));
        assert_eq!(ulm.cycle_number, 5);
        assert!(ulm.beam_on);
        assert_eq!(ulm.trigger_mask, 0b10110);
    }

    #[test]
    fn test_ulm_overflow() {
        let mut ulm = Ulm::default();
        ulm.set_clock(0x1234);
        ulm.set_clock_overflow(2);
        assert_eq!(ulm.clock, (2u64 << 32) | 0x1234);
    }

    #[test]
    fn test_built_event_multiplicity() {
        let ulm = Ulm::default();
        let hits = vec![
            Hit::new(0, 0, DetectorType::Germanium, 1, 100, ulm),
            Hit::new(0, 0, DetectorType::Germanium, 2, 200, ulm),
            Hit::new(0, 0, DetectorType::Plastic, 0, 50, ulm),
        ];
        let event = BuiltEvent::new(hits);
        assert_eq!(event.nof_hits(), 3);
        assert_eq!(event.multiplicity(DetectorType::Germanium), 2);
        assert_eq!(event.multiplicity(DetectorType::Plastic), 1);
        assert_eq!(event.multiplicity(DetectorType::BaF2), 0);
    }
}
