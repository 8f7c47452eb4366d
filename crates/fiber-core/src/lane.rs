#![forbid(unsafe_code)]

//! Priority lanes.
//!
//! A lane is a single bit; a set of lanes is a bitmask. Lower bits carry
//! higher priority, so the highest-priority lane of a set is its lowest set
//! bit.
//!
//! # Invariants
//!
//! 1. Every named lane is exactly one bit.
//! 2. `get_highest_priority_lane` of a non-empty set is a single lane that is
//!    a member of the set; of the empty set it is [`NO_LANE`].
//! 3. The empty lane is a subset of every set: updates tagged with it are
//!    applied by every render pass.

use core::fmt;

bitflags::bitflags! {
    /// A set of priority lanes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        /// Immediate work, flushed in the same-tick batch.
        const SYNC = 1 << 0;
        /// Continuous input (drag, scroll).
        const INPUT_CONTINUOUS = 1 << 1;
        /// Default priority for work that does not need to be immediate.
        const DEFAULT = 1 << 2;
        /// Transitions.
        const TRANSITION = 1 << 3;
        /// Work that may wait until nothing else is pending.
        const IDLE = 1 << 4;
    }
}

/// A single lane. Same representation as [`Lanes`]; by convention holds at
/// most one bit.
pub type Lane = Lanes;

/// The empty lane.
pub const NO_LANE: Lane = Lanes::empty();

/// Union of two lane sets.
#[inline]
#[must_use]
pub const fn merge_lanes(a: Lanes, b: Lanes) -> Lanes {
    Lanes::from_bits_retain(a.bits() | b.bits())
}

/// Remove `subset` from `set`.
#[inline]
#[must_use]
pub const fn remove_lanes(set: Lanes, subset: Lanes) -> Lanes {
    Lanes::from_bits_retain(set.bits() & !subset.bits())
}

/// Lowest set bit of `lanes`, i.e. the most urgent lane in the set.
#[inline]
#[must_use]
pub const fn get_highest_priority_lane(lanes: Lanes) -> Lane {
    let bits = lanes.bits();
    Lanes::from_bits_retain(bits & bits.wrapping_neg())
}

/// Whether every lane of `subset` is in `set`.
#[inline]
#[must_use]
pub const fn is_subset_of_lanes(set: Lanes, subset: Lanes) -> bool {
    set.bits() & subset.bits() == subset.bits()
}

/// Whether lane `a` is strictly more urgent than lane `b`.
///
/// The empty lane is less urgent than everything.
#[inline]
#[must_use]
pub const fn is_higher_priority(a: Lane, b: Lane) -> bool {
    !a.is_empty() && (b.is_empty() || a.bits() < b.bits())
}

/// Stable lowercase name of a single lane, used in logs and config files.
#[must_use]
pub fn lane_name(lane: Lane) -> &'static str {
    if lane == Lanes::SYNC {
        "sync"
    } else if lane == Lanes::INPUT_CONTINUOUS {
        "input-continuous"
    } else if lane == Lanes::DEFAULT {
        "default"
    } else if lane == Lanes::TRANSITION {
        "transition"
    } else if lane == Lanes::IDLE {
        "idle"
    } else if lane.is_empty() {
        "none"
    } else {
        "mixed"
    }
}

/// Parse a lane name produced by [`lane_name`].
#[must_use]
pub fn lane_from_name(name: &str) -> Option<Lane> {
    match name.trim().to_ascii_lowercase().as_str() {
        "sync" | "immediate" => Some(Lanes::SYNC),
        "input-continuous" | "input_continuous" => Some(Lanes::INPUT_CONTINUOUS),
        "default" => Some(Lanes::DEFAULT),
        "transition" => Some(Lanes::TRANSITION),
        "idle" => Some(Lanes::IDLE),
        _ => None,
    }
}

/// Display adapter for a lane set: `sync|default`.
pub struct LanesDisplay(pub Lanes);

impl fmt::Display for LanesDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for lane in self.0.iter() {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            f.write_str(lane_name(lane))?;
        }
        Ok(())
    }
}
