//! Render statistics exposed to the application and tooling.

/// Per-frame statistics of the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RendererInfo {
    /// GPU time of the frame, averaged over the frames in flight.
    pub draw_time_ms: f64,
    /// Vertices (or indices) submitted in the last recorded frame.
    pub vertices_drawn: u64,
    /// Draw calls issued in the last recorded frame.
    pub meshes_drawn: u32,
}

/// Rolling average of GPU frame times, one sample per frame slot.
///
/// A slot keeps its last sample until a newer one is polled, so the average
/// is stable while timestamps are not ready yet.
#[derive(Debug, Clone)]
pub struct DrawTimeStats {
    samples: Vec<Option<f64>>,
}

impl DrawTimeStats {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            samples: vec![None; frames_in_flight.max(1)],
        }
    }

    /// Store the latest measurement of a slot.
    pub fn record(&mut self, slot: usize, ms: f64) {
        if let Some(sample) = self.samples.get_mut(slot) {
            *sample = Some(ms);
        }
    }

    /// Mean over slots that have produced a sample; 0 before the first one.
    pub fn average_ms(&self) -> f64 {
        let (sum, count) = self
            .samples
            .iter()
            .flatten()
            .fold((0.0, 0u32), |(sum, count), ms| (sum + ms, count + 1));
        if count == 0 {
            0.0
        } else {
            sum / f64::from(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn average_ignores_empty_slots() {
        let mut stats = DrawTimeStats::new(3);
        assert_relative_eq!(stats.average_ms(), 0.0);
        stats.record(0, 2.0);
        stats.record(2, 4.0);
        assert_relative_eq!(stats.average_ms(), 3.0);
    }

    #[test]
    fn newer_sample_replaces_slot() {
        let mut stats = DrawTimeStats::new(2);
        stats.record(0, 10.0);
        stats.record(1, 2.0);
        stats.record(0, 4.0);
        assert_relative_eq!(stats.average_ms(), 3.0);
        // Out of range slots are ignored.
        stats.record(7, 100.0);
        assert_relative_eq!(stats.average_ms(), 3.0);
    }
}
