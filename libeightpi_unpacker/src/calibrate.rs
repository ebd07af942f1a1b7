use super::event::DetectorType;

/// Energy calibration seam. The unpacker itself never fits calibrations;
/// a collaborator implementing this trait can fill `Hit::calibrated_energy`
/// as hits pass through the pipeline. Returning None leaves the hit
/// uncalibrated.
pub trait Calibrator: Send {
    fn calibrate(&mut self, detector_type: DetectorType, detector_number: u16, raw_energy: u16)
        -> Option<f32>;
}

/// Identity calibration: the raw channel as a float.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCalibrator;

impl Calibrator for PassthroughCalibrator {
    fn calibrate(&mut self, _: DetectorType, _: u16, raw_energy: u16) -> Option<f32> {
        Some(raw_energy as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let mut calibrator = PassthroughCalibrator;
        assert_eq!(
            calibrator.calibrate(DetectorType::Germanium, 3, 1024),
            Some(1024.0)
        );
    }
}
