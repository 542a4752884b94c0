//! CE reactivation timer (C4): bounded wait for listen-side reappearance.
//!
//! Grounded in `nci_adapter_start_ce_reactivation_timer()` and
//! `nci_adapter_ce_reactivation_timeout()` in
//! `original_source/nci_adapter.c`, plus the CE tech-lock mapping in
//! `nci_adapter_deactivation()`. Same persistent-`Sleep`-reset idiom as
//! `presence.rs` and `nci.rs::dispatch`.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::{Technology, TechMask};

/// Timeout before a lost CE initiator is given up on (§4.4: "1500 ms").
pub const CE_REACTIVATION_TIMEOUT: Duration = Duration::from_millis(1500);

/// Maps an initiator's technology to the NCI listen-tech bit it must be
/// locked to during CE reactivation (`nci_adapter_deactivation`'s
/// `switch (priv->initiator->technology)`). Per the Open Question in §9(b),
/// this mapping has no case for `F`/`Unknown`: they fall through to
/// "no lock", preserved here rather than treated as a gap.
pub fn ce_tech_lock(technology: Technology) -> Option<TechMask> {
    match technology {
        Technology::A => Some(TechMask::A_LISTEN),
        Technology::B => Some(TechMask::B_LISTEN),
        Technology::F | Technology::Unknown => None,
    }
}

/// Tracks whether the CE-reactivation timer is currently armed.
pub struct CeReactivationTimer {
    armed: bool,
}

impl CeReactivationTimer {
    pub fn new() -> Self {
        CeReactivationTimer { armed: false }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Starts or restarts the timer, returning the deadline the caller
    /// should reset its persistent `Sleep` to. Invariant 6 (§8): any
    /// subsequent activation must cancel this before it fires again, which
    /// `adapter.rs` achieves by calling `cancel` unconditionally at the top
    /// of its activation handler.
    pub fn start(&mut self) -> Instant {
        self.armed = true;
        Instant::now() + CE_REACTIVATION_TIMEOUT
    }

    /// Cancels the timer. A no-op if it wasn't armed, matching
    /// `gutil_source_clear`'s tolerance of an already-cleared source.
    pub fn cancel(&mut self) {
        self.armed = false;
    }

    /// Called when the persistent `Sleep` fires while armed. Consumes the
    /// armed state (one-shot: the caller must `start()` again to rearm).
    pub fn fire(&mut self) {
        self.armed = false;
    }
}

impl Default for CeReactivationTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tech_lock_mapping_has_no_case_for_f_or_unknown() {
        assert_eq!(ce_tech_lock(Technology::A), Some(TechMask::A_LISTEN));
        assert_eq!(ce_tech_lock(Technology::B), Some(TechMask::B_LISTEN));
        assert_eq!(ce_tech_lock(Technology::F), None);
        assert_eq!(ce_tech_lock(Technology::Unknown), None);
    }

    #[test]
    fn start_arms_and_cancel_disarms() {
        let mut t = CeReactivationTimer::new();
        assert!(!t.is_armed());
        t.start();
        assert!(t.is_armed());
        t.cancel();
        assert!(!t.is_armed());
    }

    #[test]
    fn fire_disarms_one_shot() {
        let mut t = CeReactivationTimer::new();
        t.start();
        t.fire();
        assert!(!t.is_armed());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut t = CeReactivationTimer::new();
        t.cancel();
        t.cancel();
        assert!(!t.is_armed());
    }
}
