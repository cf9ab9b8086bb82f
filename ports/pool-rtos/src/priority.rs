//! Translation of caller priorities to native priorities.
//!
//! Callers use "larger is more urgent" with 0 as the default; the kernel
//! uses "smaller is more urgent" over `0..prio_max`. Priority 0 maps to the
//! lowest application priority and each step up moves one native level
//! towards urgency, stopping at the reserved band.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityMap {
    highest: u8,
    lowest: u8,
}

impl PriorityMap {
    /// Map for a kernel with `prio_max` levels.
    ///
    /// If the reserved bands leave no room, every caller priority maps to
    /// the single level just above the low band.
    pub fn new(prio_max: u8, reserved_high: u8, reserved_low: u8) -> Self {
        let lowest = prio_max.saturating_sub(1).saturating_sub(reserved_low);
        Self {
            highest: reserved_high.min(lowest),
            lowest,
        }
    }

    /// Most urgent native priority available to applications.
    pub fn highest(&self) -> u8 {
        self.highest
    }

    /// Least urgent native priority available to applications.
    pub fn lowest(&self) -> u8 {
        self.lowest
    }

    /// Native priority for a caller priority.
    ///
    /// Unlike a fixed `prio_max - 30 - p` band, the map spans every level
    /// between the reserved bands, one native level per caller step.
    pub fn remap(&self, priority: i32) -> u8 {
        let lowest = i64::from(self.lowest);
        let native = lowest - i64::from(priority.max(0));
        native.clamp(i64::from(self.highest), lowest) as u8
    }
}
