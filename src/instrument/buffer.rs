//! Caller-owned measurement buffers.

use super::platform::{self, ThreadUsage};
use crate::metrics::clock::monotonic_nanos;
use crate::taxonomy::{BitFlag, MeasurementKind, MeasurementStyle};
use std::fmt;

/// Header slots: mask and owner hash
const HEADER: usize = 2;
const CAPACITY: usize = HEADER + 14;

/// Fixed-size sample buffer for one measured invocation.
///
/// Layout is `[mask, owner_hash, v0, v1, ...]` with one value per enabled
/// measurement, in measurement ordinal order. Lives on the caller's stack
/// and is never shared, so `enter` and `exit` take no locks and never allocate.
#[derive(Clone, Copy)]
pub struct MeasurementBuffer {
    slots: [u64; CAPACITY],
    len: u8,
}

impl MeasurementBuffer {
    /// Buffer for the measurements of `mask` that the platform supports
    pub fn new(owner: u64, mask: u32) -> Self {
        let mask = mask & MeasurementKind::all_mask() & !platform::platform_disabled();
        let mut slots = [0u64; CAPACITY];
        slots[0] = mask as u64;
        slots[1] = owner;
        Self {
            slots,
            len: (HEADER + mask.count_ones() as usize) as u8,
        }
    }

    #[inline(always)]
    pub fn mask(&self) -> u32 {
        self.slots[0] as u32
    }

    #[inline(always)]
    pub fn owner(&self) -> u64 {
        self.slots[1]
    }

    /// Header plus value slots
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True if no measurement is enabled
    pub fn is_empty(&self) -> bool {
        self.len as usize == HEADER
    }

    /// Raw layout, header included
    pub fn as_slice(&self) -> &[u64] {
        &self.slots[..self.len()]
    }

    #[inline]
    fn slot(&self, kind: MeasurementKind) -> Option<usize> {
        let mask = self.mask();
        if !kind.is_enabled(mask) {
            return None;
        }
        let before = mask & (kind.bit() - 1);
        Some(HEADER + before.count_ones() as usize)
    }

    /// Value captured for `kind`, if it is enabled
    pub fn get(&self, kind: MeasurementKind) -> Option<u64> {
        self.slot(kind).map(|i| self.slots[i])
    }

    /// Enabled measurements with their values, in ordinal order
    pub fn values(&self) -> impl Iterator<Item = (MeasurementKind, u64)> + '_ {
        enabled(self.mask())
            .enumerate()
            .map(move |(i, kind)| (kind, self.slots[HEADER + i]))
    }

    /// Writes each enabled measurement's starting value
    pub fn enter(&mut self) {
        let mask = self.mask();
        let sample = Sample::capture(mask);
        for (i, kind) in enabled(mask).enumerate() {
            self.slots[HEADER + i] = match kind.style() {
                MeasurementStyle::Delta => sample.read(kind),
                MeasurementStyle::CountOnEnter => 1,
                MeasurementStyle::CountOnReturn | MeasurementStyle::CountOnError => 0,
            };
        }
    }

    /// Completes a normal return
    pub fn exit(&mut self) {
        self.finish(MeasurementKind::EXIT_MASK, MeasurementStyle::CountOnReturn);
    }

    /// Completes an invocation that failed
    pub fn error_exit(&mut self) {
        self.finish(MeasurementKind::ERROR_EXIT_MASK, MeasurementStyle::CountOnError);
    }

    fn finish(&mut self, exit_mask: u32, counted: MeasurementStyle) {
        let mask = self.mask();
        let sample = Sample::capture(mask);
        for (i, kind) in enabled(mask).enumerate() {
            if !kind.is_enabled(exit_mask) {
                continue;
            }
            let slot = &mut self.slots[HEADER + i];
            match kind.style() {
                MeasurementStyle::Delta => *slot = sample.read(kind).saturating_sub(*slot),
                style if style == counted => *slot = 1,
                _ => {},
            }
        }
    }
}

#[inline]
fn enabled(mask: u32) -> impl Iterator<Item = MeasurementKind> {
    MeasurementKind::ALL
        .iter()
        .copied()
        .filter(move |kind| kind.is_enabled(mask))
}

/// Clock and thread counters read once per `enter`/`exit`
struct Sample {
    elapsed: u64,
    cpu: u64,
    usage: ThreadUsage,
}

impl Sample {
    const USAGE_KINDS: u32 = (1 << MeasurementKind::UserCpu as u32)
        | (1 << MeasurementKind::TotalCpu as u32)
        | (1 << MeasurementKind::WaitCount as u32)
        | (1 << MeasurementKind::BlockCount as u32);

    #[inline]
    fn capture(mask: u32) -> Self {
        let usage = if mask & Self::USAGE_KINDS != 0 {
            platform::thread_usage().unwrap_or_default()
        } else {
            ThreadUsage::default()
        };
        let cpu = if MeasurementKind::Cpu.is_enabled(mask) {
            platform::thread_cpu_nanos().unwrap_or(0)
        } else {
            0
        };
        let elapsed = if MeasurementKind::Elapsed.is_enabled(mask) {
            monotonic_nanos()
        } else {
            0
        };
        Self {
            elapsed,
            cpu,
            usage,
        }
    }

    #[inline]
    fn read(&self, kind: MeasurementKind) -> u64 {
        match kind {
            MeasurementKind::Elapsed => self.elapsed,
            MeasurementKind::Cpu => self.cpu,
            MeasurementKind::UserCpu => self.usage.user_nanos,
            MeasurementKind::TotalCpu => self.usage.user_nanos + self.usage.system_nanos,
            MeasurementKind::WaitCount => self.usage.voluntary_switches,
            MeasurementKind::BlockCount => self.usage.involuntary_switches,
            _ => 0,
        }
    }
}

impl fmt::Debug for MeasurementBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementBuffer")
            .field("mask", &MeasurementKind::names_for(self.mask()))
            .field("owner", &format_args!("{:#018x}", self.owner()))
            .field("values", &&self.slots[HEADER..self.len()])
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn mask(kinds: &[MeasurementKind]) -> u32 {
        MeasurementKind::mask_for(kinds)
    }

    #[test]
    fn test_layout() {
        let buffer = MeasurementBuffer::new(
            0xabc,
            mask(&[MeasurementKind::InvokeCount, MeasurementKind::Elapsed]),
        );
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.owner(), 0xabc);
        assert_eq!(buffer.slot(MeasurementKind::Elapsed), Some(2));
        assert_eq!(buffer.slot(MeasurementKind::InvokeCount), Some(3));
        assert_eq!(buffer.get(MeasurementKind::ErrorCount), None);
    }

    #[test]
    fn test_platform_disabled_kinds_are_stripped() {
        let buffer = MeasurementBuffer::new(1, mask(&[MeasurementKind::WaitTime, MeasurementKind::Elapsed]));
        assert_eq!(buffer.mask(), MeasurementKind::Elapsed.bit());
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_enter_exit_elapsed_and_invocations() {
        let mut buffer = MeasurementBuffer::new(
            1,
            mask(&[MeasurementKind::Elapsed, MeasurementKind::InvokeCount]),
        );
        buffer.enter();
        std::thread::sleep(Duration::from_millis(20));
        buffer.exit();

        let elapsed = buffer.get(MeasurementKind::Elapsed).unwrap();
        assert!(elapsed >= 20_000_000, "elapsed {}ns", elapsed);
        assert!(elapsed < 2_000_000_000, "elapsed {}ns", elapsed);
        assert_eq!(buffer.get(MeasurementKind::InvokeCount), Some(1));
    }

    #[test]
    fn test_return_and_error_counts() {
        let kinds = mask(&[
            MeasurementKind::ReturnCount,
            MeasurementKind::ErrorCount,
            MeasurementKind::ErrorRate,
        ]);

        let mut ok = MeasurementBuffer::new(1, kinds);
        ok.enter();
        ok.exit();
        assert_eq!(ok.get(MeasurementKind::ReturnCount), Some(1));
        assert_eq!(ok.get(MeasurementKind::ErrorCount), Some(0));

        let mut failed = MeasurementBuffer::new(1, kinds);
        failed.enter();
        failed.error_exit();
        assert_eq!(failed.get(MeasurementKind::ReturnCount), Some(0));
        assert_eq!(failed.get(MeasurementKind::ErrorCount), Some(1));
        assert_eq!(failed.get(MeasurementKind::ErrorRate), Some(1));
    }

    #[test]
    fn test_values_in_ordinal_order() {
        let mut buffer = MeasurementBuffer::new(
            1,
            mask(&[MeasurementKind::ReturnCount, MeasurementKind::InvokeCount]),
        );
        buffer.enter();
        buffer.exit();
        let values: Vec<_> = buffer.values().collect();
        assert_eq!(
            values,
            vec![(MeasurementKind::InvokeCount, 1), (MeasurementKind::ReturnCount, 1)]
        );
    }
}
