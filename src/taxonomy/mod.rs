//! Closed bit-flag sets describing metric kinds, derived sub-values and
//! per-invocation measurements.
//!
//! Every member owns one power-of-two bit. A `u32` mask plus a static member
//! table replaces per-metric dynamic dispatch: reporting and instrumentation
//! iterate the enabled members of a mask and `match` on each one.

pub mod measurement;
pub mod metric_kind;
pub mod sub_value;

pub use measurement::{MeasurementKind, MeasurementStyle};
pub use metric_kind::MetricKind;
pub use sub_value::{Reading, SubValue, Units};

use crate::core::{Result, VigilError};
use smallvec::SmallVec;

/// How [`BitFlag::mask_for_names`] treats names that match no member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMode {
    /// Unknown names are skipped
    Lenient,
    /// The first unknown name fails the whole call
    Strict,
}

/// Members of a closed flag set, each owning one bit of a `u32` mask.
pub trait BitFlag: Copy + Eq + Sized + 'static {
    /// Set name used in error messages
    const SET: &'static str;

    /// Every member, in ordinal order
    const ALL: &'static [Self];

    fn ordinal(self) -> u32;

    fn name(self) -> &'static str;

    #[inline(always)]
    fn bit(self) -> u32 {
        1 << self.ordinal()
    }

    /// Mask with every member's bit set
    fn all_mask() -> u32 {
        Self::ALL.iter().fold(0, |mask, m| mask | m.bit())
    }

    #[inline(always)]
    fn is_enabled(self, mask: u32) -> bool {
        mask & self.bit() != 0
    }

    /// Mask covering the given members; duplicates and order are irrelevant
    fn mask_for(members: &[Self]) -> u32 {
        members.iter().fold(0, |mask, m| mask | m.bit())
    }

    /// Members enabled in `mask`, in ordinal order. Bits outside the set are ignored.
    fn enabled_for(mask: u32) -> SmallVec<[Self; 24]> {
        Self::ALL.iter().copied().filter(|m| m.is_enabled(mask)).collect()
    }

    /// Case-insensitive lookup by member name
    fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }

    /// Mask covering the named members
    fn mask_for_names<S: AsRef<str>>(names: &[S], mode: NameMode) -> Result<u32> {
        let mut mask = 0;
        for name in names {
            let name = name.as_ref();
            if name.trim().is_empty() {
                continue;
            }
            match (Self::from_name(name), mode) {
                (Some(member), _) => mask |= member.bit(),
                (None, NameMode::Lenient) => {
                    tracing::debug!(set = Self::SET, name, "Ignoring unknown member name");
                },
                (None, NameMode::Strict) => return Err(VigilError::invalid_member(Self::SET, name)),
            }
        }
        Ok(mask)
    }

    /// Rejects masks carrying bits that belong to no member
    fn validate_mask(mask: u32) -> Result<u32> {
        if mask & !Self::all_mask() != 0 {
            return Err(VigilError::InvalidMask {
                set: Self::SET,
                mask,
            });
        }
        Ok(mask)
    }

    /// Comma-separated member names of `mask`
    fn names_for(mask: u32) -> String {
        Self::enabled_for(mask)
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join(",")
    }
}
