//! Presence-check scheduler (C3): periodic liveness probes on a polled
//! target.
//!
//! Grounded in `nci_adapter_presence_check_timer()`,
//! `nci_adapter_need_presence_checks()`, `nci_adapter_presence_check_done()`
//! in `original_source/nci_adapter.c`. Uses a persistent-resettable `Sleep`
//! idiom: a single `Sleep` future that is reset to `now + PERIOD` while
//! armed and parked far in the future while disarmed, so one
//! `tokio::select!` branch in `adapter.rs::run` drives it without a
//! separate timer task.

use std::time::Duration;

use tokio::time::Instant;

/// Period between presence-check probes (§4.3: "250 ms").
pub const PRESENCE_CHECK_PERIOD: Duration = Duration::from_millis(250);

/// Tracks whether the scheduler is armed and whether a probe is currently
/// outstanding. `PresenceState` in the data model (§3): `{timer?,
/// in_flight_probe_id?}`.
pub struct PresenceScheduler {
    armed: bool,
    in_flight: bool,
}

impl PresenceScheduler {
    pub fn new() -> Self {
        PresenceScheduler {
            armed: false,
            in_flight: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_probe_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Arms the scheduler, returning the deadline the caller should reset
    /// its persistent `Sleep` to. Idempotent: re-arming an already-armed
    /// scheduler does not reset the in-flight flag (`nci_adapter_activation`
    /// only starts the timer `if (!priv->presence_check_timer)`).
    pub fn arm(&mut self) -> Instant {
        self.armed = true;
        Instant::now() + PRESENCE_CHECK_PERIOD
    }

    /// Disarms the scheduler (`gutil_source_clear(&priv->presence_check_timer)`),
    /// called on deactivation, target-gone, or entry to reactivation.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.in_flight = false;
    }

    /// Whether a tick should start a new probe. `nci_adapter_presence_check_timer`
    /// skips the tick (without stopping the timer) when a probe is already
    /// outstanding or the sequence forbids one; invariant 5 (§8) depends on
    /// this never overlapping an in-flight probe.
    pub fn should_probe(&self, sequence_allows_presence_check: bool) -> bool {
        self.armed && !self.in_flight && sequence_allows_presence_check
    }

    /// Marks a probe as dispatched. Returns the next tick deadline.
    pub fn probe_started(&mut self) -> Instant {
        self.in_flight = true;
        Instant::now() + PRESENCE_CHECK_PERIOD
    }

    /// `nci_adapter_presence_check_done`: clears the in-flight marker and
    /// reports whether the target is still alive.
    pub fn probe_done(&mut self, ok: bool) -> bool {
        self.in_flight = false;
        ok
    }

    /// `nci_adapter_presence_check_timer`'s failure-to-start path: disarm
    /// and signal that the caller should fall back to `DISCOVERY`.
    pub fn probe_failed_to_start(&mut self) {
        self.disarm();
    }
}

impl Default for PresenceScheduler {
    fn default() -> Self {
        Self::new()
    }
}
