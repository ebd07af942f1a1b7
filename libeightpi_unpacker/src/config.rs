use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::ConfigError;
use super::event::DetectorType;

/// Per-detector-type configuration: how many detectors this type has, the
/// largest legal raw channel, which detectors are switched off, and the coarse
/// TDC window used to select the reported TDC time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSettings {
    pub nof_detectors: u16,
    pub max_channel: u16,
    pub inactive_detectors: Vec<u16>,
    pub coarse_tdc_window: (u16, u16),
}

impl DetectorSettings {
    fn new(nof_detectors: u16) -> Self {
        Self {
            nof_detectors,
            max_channel: 16384,
            inactive_detectors: Vec::new(),
            coarse_tdc_window: (0, u16::MAX),
        }
    }
}

/// Structure representing the run configuration. Contains the detector layout,
/// the event-building windows and the pipeline buffer policy.
/// Settings are serializable and deserializable to YAML using serde and serde_yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub germanium: DetectorSettings,
    pub plastic: DetectorSettings,
    pub silicon: DetectorSettings,
    pub baf2: DetectorSettings,
    /// Minimum clock span (100 ns ticks) between the oldest and newest pending
    /// hit before the oldest is considered settled.
    pub waiting_window: u64,
    /// Maximum clock spread (100 ns ticks) within one built event.
    pub coincidence_window: u64,
    /// Initial capacity of the pending-hit buffer; also the growth step.
    pub read_buffer_size: usize,
    pub max_read_buffer_size: usize,
    /// Initial capacity of the built-event buffer; also the growth step.
    pub built_buffer_size: usize,
    pub max_built_buffer_size: usize,
    /// Sleep between retries when a buffer cannot grow, in milliseconds.
    pub buffer_retry_millis: u64,
    pub buffer_retries: u32,
    /// Maximum time a flush may spend draining before it is forced, in seconds.
    pub flush_timeout_secs: u64,
    /// Run the periodic status-update thread.
    pub status_update: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            germanium: DetectorSettings::new(20),
            plastic: DetectorSettings::new(20),
            silicon: DetectorSettings::new(5),
            baf2: DetectorSettings::new(10),
            waiting_window: 10_000_000, // 1 s
            coincidence_window: 20,     // 2 us
            read_buffer_size: 16384,
            max_read_buffer_size: 1 << 22,
            built_buffer_size: 1024,
            max_built_buffer_size: 1 << 20,
            buffer_retry_millis: 10,
            buffer_retries: 10,
            flush_timeout_secs: 60,
            status_update: false,
        }
    }
}

impl Settings {
    /// Read the settings from a YAML file
    /// Returns a Settings if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    pub fn detector(&self, detector_type: DetectorType) -> &DetectorSettings {
        match detector_type {
            DetectorType::Germanium => &self.germanium,
            DetectorType::Plastic => &self.plastic,
            DetectorType::Silicon => &self.silicon,
            DetectorType::BaF2 => &self.baf2,
        }
    }

    /// Number of configured detectors of this type.
    pub fn channel_count(&self, detector_type: DetectorType) -> u16 {
        self.detector(detector_type).nof_detectors
    }

    /// Whether a detector number is configured and not switched off.
    pub fn is_active(&self, detector_type: DetectorType, detector_number: u16) -> bool {
        let det = self.detector(detector_type);
        detector_number < det.nof_detectors
            && !det.inactive_detectors.contains(&detector_number)
    }

    /// Whether a TDC time falls inside the coarse window of this detector type.
    pub fn coarse_tdc_window(&self, detector_type: DetectorType, time: u16) -> bool {
        let (low, high) = self.detector(detector_type).coarse_tdc_window;
        low <= time && time <= high
    }

    /// True while the span between the oldest and newest pending clock is too
    /// small to finalize the oldest hit.
    pub fn in_waiting_window(&self, first_clock: u64, second_clock: u64) -> bool {
        second_clock.saturating_sub(first_clock) < self.waiting_window
    }

    /// True when two clocks are close enough to belong to one built event.
    /// The pending set is ordered, so the second clock is never smaller.
    pub fn is_coincident(&self, first_clock: u64, second_clock: u64) -> bool {
        if second_clock < first_clock {
            spdlog::warn!(
                "second clock {} smaller than first clock {} in coincidence check",
                second_clock,
                first_clock
            );
            return false;
        }
        second_clock - first_clock < self.coincidence_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows() {
        let mut settings = Settings::default();
        settings.waiting_window = 100;
        settings.coincidence_window = 10;

        assert!(settings.in_waiting_window(0, 99));
        assert!(!settings.in_waiting_window(0, 100));
        assert!(settings.is_coincident(500, 509));
        assert!(!settings.is_coincident(500, 510));
        assert!(!settings.is_coincident(500, 499));
    }

    #[test]
    fn test_active_detectors() {
        let mut settings = Settings::default();
        settings.silicon.inactive_detectors = vec![2];

        assert!(settings.is_active(DetectorType::Silicon, 0));
        assert!(!settings.is_active(DetectorType::Silicon, 2));
        // outside the configured detector count
        assert!(!settings.is_active(DetectorType::Silicon, 5));
    }

    #[test]
    fn test_yaml_round_trip() {
        let settings = Settings::default();
        let yaml = serde_yaml::to_string(&settings).unwrap();
        let back: Settings = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.waiting_window, settings.waiting_window);
        assert_eq!(back.germanium.nof_detectors, settings.germanium.nof_detectors);
    }
}
