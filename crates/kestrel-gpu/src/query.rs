//! GPU timestamp queries.
//!
//! One start/end pair per frame slot. Results are polled without waiting;
//! a pair that is not ready yet is simply read again on a later frame.

use ash::vk;

use crate::error::Result;

/// Elapsed milliseconds between two raw timestamps.
///
/// Only the low `valid_bits` of each value are meaningful, and the counter
/// may wrap between the two writes.
pub fn ticks_to_ms(start: u64, end: u64, period_ns: f32, valid_bits: u32) -> f64 {
    let mask = if valid_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << valid_bits) - 1
    };
    let ticks = (end & mask).wrapping_sub(start & mask) & mask;
    ticks as f64 * f64::from(period_ns) / 1_000_000.0
}

/// A timestamp query pool with one start/end pair per frame slot.
pub struct TimestampQueries {
    pool: vk::QueryPool,
    pairs: u32,
    written: Vec<bool>,
    period_ns: f32,
    valid_bits: u32,
}

impl TimestampQueries {
    /// Create `pairs` start/end pairs.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        pairs: u32,
        period_ns: f32,
        valid_bits: u32,
    ) -> Result<Self> {
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(pairs * 2);
        let pool = unsafe { device.create_query_pool(&create_info, None) }?;

        Ok(Self {
            pool,
            pairs,
            written: vec![false; pairs as usize],
            period_ns,
            valid_bits,
        })
    }

    pub fn pairs(&self) -> u32 {
        self.pairs
    }

    /// Record the reset of a pair. Must precede its writes in the same buffer.
    ///
    /// # Safety
    /// `cmd` must be recording outside a render pass.
    pub unsafe fn record_reset(&self, device: &ash::Device, cmd: vk::CommandBuffer, pair: u32) {
        unsafe { device.cmd_reset_query_pool(cmd, self.pool, pair * 2, 2) };
    }

    /// Record the start timestamp of a pair.
    ///
    /// # Safety
    /// `cmd` must be recording and the pair must have been reset in it.
    pub unsafe fn write_start(&self, device: &ash::Device, cmd: vk::CommandBuffer, pair: u32) {
        unsafe {
            device.cmd_write_timestamp2(
                cmd,
                vk::PipelineStageFlags2::TOP_OF_PIPE,
                self.pool,
                pair * 2,
            );
        }
    }

    /// Record the end timestamp of a pair and mark it pollable.
    ///
    /// # Safety
    /// `cmd` must be recording and contain the matching start write.
    pub unsafe fn write_end(&mut self, device: &ash::Device, cmd: vk::CommandBuffer, pair: u32) {
        unsafe {
            device.cmd_write_timestamp2(
                cmd,
                vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
                self.pool,
                pair * 2 + 1,
            );
        }
        if let Some(written) = self.written.get_mut(pair as usize) {
            *written = true;
        }
    }

    /// Read a pair without blocking.
    ///
    /// `None` when the pair was never written or the GPU has not produced
    /// both values yet.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn poll(&self, device: &ash::Device, pair: u32) -> Result<Option<f64>> {
        if !self.written.get(pair as usize).copied().unwrap_or(false) {
            return Ok(None);
        }

        let mut results = [0u64; 2];
        let fetched = unsafe {
            device.get_query_pool_results(
                self.pool,
                pair * 2,
                &mut results,
                vk::QueryResultFlags::TYPE_64,
            )
        };
        match fetched {
            Ok(()) => Ok(Some(ticks_to_ms(
                results[0],
                results[1],
                self.period_ns,
                self.valid_bits,
            ))),
            Err(vk::Result::NOT_READY) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// # Safety
    /// No command buffer referencing the pool may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_query_pool(self.pool, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn converts_ticks_with_period() {
        // 2,000,000 ticks of 1.5 ns
        assert_relative_eq!(ticks_to_ms(1_000, 2_001_000, 1.5, 64), 3.0);
    }

    #[test]
    fn masks_invalid_bits_and_handles_wrap() {
        let bits = 36;
        let top = (1u64 << bits) - 100;
        assert_relative_eq!(ticks_to_ms(top, 900, 1.0, bits), 1_000.0 / 1_000_000.0);
        // Garbage above the valid bits is ignored.
        let noisy = (0xdead_u64 << bits) | 500;
        assert_relative_eq!(ticks_to_ms(0, noisy, 1.0, bits), 500.0 / 1_000_000.0);
    }
}
