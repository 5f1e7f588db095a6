//! Per-thread CPU and scheduling counters from the host OS.
//!
//! Linux provides everything through `clock_gettime(CLOCK_THREAD_CPUTIME_ID)`
//! and `getrusage(RUSAGE_THREAD)`; voluntary and involuntary context switches
//! stand in for wait and block counts. No platform exposes per-thread wait or
//! block *time*, so those measurements are always disabled.

use crate::taxonomy::{BitFlag, MeasurementKind};
use once_cell::sync::Lazy;

/// Resource usage of the calling thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadUsage {
    pub user_nanos: u64,
    pub system_nanos: u64,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
}

/// Measurements this host cannot provide, computed once per process
pub static PLATFORM_DISABLED: Lazy<u32> = Lazy::new(|| {
    let mut disabled = MeasurementKind::mask_for(&[MeasurementKind::WaitTime, MeasurementKind::BlockTime]);
    if thread_cpu_nanos().is_none() {
        disabled |= MeasurementKind::Cpu.bit();
    }
    if thread_usage().is_none() {
        disabled |= MeasurementKind::mask_for(&[
            MeasurementKind::UserCpu,
            MeasurementKind::TotalCpu,
            MeasurementKind::WaitCount,
            MeasurementKind::BlockCount,
        ]);
    }
    tracing::debug!(
        disabled = %MeasurementKind::names_for(disabled),
        "Probed platform measurement support"
    );
    disabled
});

/// Platform-disabled measurement mask
#[inline]
pub fn platform_disabled() -> u32 {
    *PLATFORM_DISABLED
}

/// CPU time consumed by the calling thread
#[cfg(unix)]
pub fn thread_cpu_nanos() -> Option<u64> {
    let mut ts = std::mem::MaybeUninit::<libc::timespec>::zeroed();
    // SAFETY: ts points to writable memory large enough for a timespec
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, ts.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: zero-initialised and fully written on success
    let ts = unsafe { ts.assume_init() };
    Some(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
}

#[cfg(not(unix))]
pub fn thread_cpu_nanos() -> Option<u64> {
    None
}

/// Resource usage of the calling thread
#[cfg(target_os = "linux")]
pub fn thread_usage() -> Option<ThreadUsage> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: usage points to writable memory large enough for an rusage
    let rc = unsafe { libc::getrusage(libc::RUSAGE_THREAD, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: zero-initialised and fully written on success
    let usage = unsafe { usage.assume_init() };
    Some(ThreadUsage {
        user_nanos: timeval_nanos(usage.ru_utime),
        system_nanos: timeval_nanos(usage.ru_stime),
        voluntary_switches: usage.ru_nvcsw.max(0) as u64,
        involuntary_switches: usage.ru_nivcsw.max(0) as u64,
    })
}

#[cfg(not(target_os = "linux"))]
pub fn thread_usage() -> Option<ThreadUsage> {
    None
}

#[cfg(target_os = "linux")]
fn timeval_nanos(tv: libc::timeval) -> u64 {
    tv.tv_sec.max(0) as u64 * 1_000_000_000 + tv.tv_usec.max(0) as u64 * 1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_kinds_always_disabled() {
        let disabled = platform_disabled();
        assert!(MeasurementKind::WaitTime.is_enabled(disabled));
        assert!(MeasurementKind::BlockTime.is_enabled(disabled));
        assert!(!MeasurementKind::Elapsed.is_enabled(disabled));
        assert!(!MeasurementKind::InvokeCount.is_enabled(disabled));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_thread_accounting() {
        let before = thread_cpu_nanos().unwrap();
        let mut x = 0u64;
        for i in 0..200_000u64 {
            x = x.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(x);
        assert!(thread_cpu_nanos().unwrap() >= before);

        assert!(thread_usage().is_some());
        assert!(!MeasurementKind::Cpu.is_enabled(platform_disabled()));
        assert!(!MeasurementKind::WaitCount.is_enabled(platform_disabled()));
    }
}
