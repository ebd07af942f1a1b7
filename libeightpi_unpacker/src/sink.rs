use std::io::Write;

use super::event::{BuiltEvent, DetectorType};

/// Consumer of built events, driven by the sink worker thread.
pub trait EventSink: Send {
    fn write(&mut self, event: &BuiltEvent) -> Result<(), std::io::Error>;

    /// Called once after the last event of the run.
    fn finish(&mut self) -> Result<(), std::io::Error> {
        Ok(())
    }
}

/// Sink that only keeps totals. Used by tests and as the default when no
/// output file is requested.
#[derive(Debug, Default)]
pub struct CountingSink {
    pub nof_events: u64,
    pub nof_hits: u64,
    pub multiplicity: [u64; 4],
}

impl EventSink for CountingSink {
    fn write(&mut self, event: &BuiltEvent) -> Result<(), std::io::Error> {
        self.nof_events += 1;
        self.nof_hits += event.nof_hits() as u64;
        for detector_type in DetectorType::ALL {
            self.multiplicity[detector_type.index()] +=
                event.multiplicity(detector_type) as u64;
        }
        Ok(())
    }
}

/// Tab-separated output, one row per hit, prefixed with the index of its
/// built event.
pub struct TsvSink<W: Write + Send> {
    writer: W,
    nof_events: u64,
}

impl<W: Write + Send> TsvSink<W> {
    pub fn new(mut writer: W) -> Result<Self, std::io::Error> {
        writeln!(
            writer,
            "event\tclock\ttype\tdetector\traw_energy\tcalibrated\ttime\ttdc_hits\tcycle\tbeam_on"
        )?;
        Ok(Self {
            writer,
            nof_events: 0,
        })
    }

    pub fn nof_events(&self) -> u64 {
        self.nof_events
    }
}

impl<W: Write + Send> EventSink for TsvSink<W> {
    fn write(&mut self, event: &BuiltEvent) -> Result<(), std::io::Error> {
        for hit in event.hits() {
            writeln!(
                self.writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                self.nof_events,
                hit.clock(),
                hit.detector_type.label(),
                hit.detector_number,
                hit.raw_energy,
                hit.calibrated_energy
                    .map_or_else(|| "-".to_string(), |energy| format!("{energy:.2}")),
                hit.selected_time,
                hit.tdc_hit_count,
                hit.ulm.cycle_number,
                hit.ulm.beam_on as u8,
            )?;
        }
        self.nof_events += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), std::io::Error> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Hit, Ulm};

    fn event(clocks: &[u64]) -> BuiltEvent {
        let hits = clocks
            .iter()
            .map(|&clock| {
                let mut ulm = Ulm::default();
                ulm.clock = clock;
                Hit::new(0, 0, DetectorType::BaF2, 1, 512, ulm)
            })
            .collect();
        BuiltEvent::new(hits)
    }

    #[test]
    fn test_counting_sink() {
        let mut sink = CountingSink::default();
        sink.write(&event(&[1, 2])).unwrap();
        sink.write(&event(&[5])).unwrap();
        assert_eq!(sink.nof_events, 2);
        assert_eq!(sink.nof_hits, 3);
        assert_eq!(sink.multiplicity[DetectorType::BaF2.index()], 3);
    }

    #[test]
    fn test_tsv_sink_rows() {
        let mut buffer = Vec::new();
        {
            let mut sink = TsvSink::new(&mut buffer).unwrap();
            sink.write(&event(&[7, 8])).unwrap();
            sink.finish().unwrap();
        }
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("event\tclock"));
        assert!(lines[1].starts_with("0\t7\tBaF2\t1\t512"));
        assert!(lines[2].starts_with("0\t8\tBaF2"));
    }
}
