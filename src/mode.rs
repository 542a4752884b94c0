//! Mode / technology coordinator (C5).
//!
//! Grounded in `nci_adapter_submit_mode_request()`,
//! `nci_adapter_cancel_mode_request()`, `nci_adapter_mode_check()`,
//! `nci_adapter_schedule_mode_check()`, `nci_adapter_set_allowed_techs()` in
//! `original_source/nci_adapter.c`.

use crate::nci_core::NciCoreHandle;
use crate::service::NfcService;
use crate::types::{NciState, TechMask, UserMode};

/// `ModeState` (§3): `{desired_mode, current_mode, mode_change_pending,
/// supported_techs, active_techs, active_tech_mask}`.
pub struct ModeCoordinator {
    desired_mode: UserMode,
    current_mode: UserMode,
    mode_change_pending: bool,
    supported_techs: TechMask,
    active_techs: TechMask,
    active_tech_mask: TechMask,
    /// Mirrors `priv->mode_check_id`: a deferred check is scheduled but
    /// hasn't run this loop turn yet. The adapter event loop polls this via
    /// `take_pending_check` once per turn, coalescing repeat requests the
    /// way `g_idle_add`'s "already scheduled" guard does.
    check_pending: bool,
}

impl ModeCoordinator {
    pub fn new(supported_techs: TechMask) -> Self {
        ModeCoordinator {
            desired_mode: UserMode::NONE,
            current_mode: UserMode::NONE,
            mode_change_pending: false,
            supported_techs,
            active_techs: supported_techs,
            active_tech_mask: TechMask::ALL,
            check_pending: false,
        }
    }

    pub fn current_mode(&self) -> UserMode {
        self.current_mode
    }

    pub fn active_tech_mask(&self) -> TechMask {
        self.active_tech_mask
    }

    pub fn active_techs(&self) -> TechMask {
        self.active_techs
    }

    fn effective_tech(&self) -> TechMask {
        self.active_techs & self.active_tech_mask
    }

    /// `nci_adapter_submit_mode_request`.
    pub fn submit_mode_request(&mut self, mode: UserMode, powered: bool, core: &impl NciCoreHandle) {
        self.desired_mode = mode;
        self.mode_change_pending = true;
        core.set_op_mode(mode.to_op_mode());
        if !mode.to_op_mode().is_empty() && powered {
            core.set_state(NciState::Discovery);
        }
        self.schedule_check();
    }

    /// `nci_adapter_cancel_mode_request`.
    pub fn cancel_mode_request(&mut self) {
        self.mode_change_pending = false;
        self.schedule_check();
    }

    fn schedule_check(&mut self) {
        self.check_pending = true;
    }

    /// Drains the deferred-check flag, returning whether a check should run
    /// this turn. Called once per event-loop turn from `adapter.rs`.
    pub fn take_pending_check(&mut self) -> bool {
        std::mem::take(&mut self.check_pending)
    }

    /// `nci_adapter_mode_check`: reconciles `desired_mode`/`current_mode`
    /// against whether the NCI core has left `IDLE`, emitting
    /// *mode-confirmed* or *mode-spontaneous* as appropriate.
    pub fn mode_check(&mut self, current_state: NciState, service: &dyn NfcService) {
        let mode = if current_state.is_idle() {
            UserMode::NONE
        } else {
            self.desired_mode
        };

        if self.mode_change_pending {
            if mode == self.desired_mode {
                self.mode_change_pending = false;
                self.current_mode = mode;
                service.mode_confirmed(mode);
            }
        } else if self.current_mode != mode {
            self.current_mode = mode;
            service.mode_spontaneous(mode);
        }
    }

    /// `nci_adapter_set_allowed_techs`.
    pub fn set_allowed_techs(&mut self, techs: TechMask, core: &impl NciCoreHandle) {
        let affected = TechMask::A | TechMask::B | TechMask::F;
        self.active_techs = self.supported_techs & !affected;
        if techs.contains(TechMask::A) {
            self.active_techs |= self.supported_techs & TechMask::A;
        }
        if techs.contains(TechMask::B) {
            self.active_techs |= self.supported_techs & TechMask::B;
        }
        if techs.contains(TechMask::F) {
            self.active_techs |= self.supported_techs & TechMask::F;
        }
        core.set_tech(self.effective_tech());
    }

    /// Narrows `active_tech_mask` to `ce_tech` and pushes the effective
    /// tech set, entering the CE reactivation tech lock
    /// (`nci_adapter_deactivation`'s `if (ce_tech)` branch).
    pub fn lock_ce_tech(&mut self, ce_tech: TechMask, core: &impl NciCoreHandle) {
        self.active_tech_mask = ce_tech;
        core.set_tech(self.active_techs & ce_tech);
    }

    /// Releases the CE tech lock (`active_tech_mask = ALL`), e.g. on
    /// `drop_initiator`.
    pub fn unlock_ce_tech(&mut self) {
        self.active_tech_mask = TechMask::ALL;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nci_core::fake::FakeNciCore;
    use crate::service::fake::FakeService;

    #[test]
    fn submit_mode_request_pushes_op_mode_and_discovery_when_powered() {
        let core = FakeNciCore::default();
        let mut m = ModeCoordinator::new(TechMask::ALL);
        m.submit_mode_request(UserMode::READER_WRITER, true, &core);
        assert_eq!(core.op_modes.borrow().last().copied(), Some(UserMode::READER_WRITER.to_op_mode()));
        assert_eq!(core.last_state(), Some(NciState::Discovery));
    }

    #[test]
    fn mode_check_confirms_pending_request_once_state_leaves_idle() {
        let svc = FakeService::default();
        let mut m = ModeCoordinator::new(TechMask::ALL);
        let core = FakeNciCore::default();
        m.submit_mode_request(UserMode::CARD_EMULATION, true, &core);

        m.mode_check(NciState::Idle, &svc);
        assert!(svc.mode_confirmed.borrow().is_empty());

        m.mode_check(NciState::Discovery, &svc);
        assert_eq!(svc.mode_confirmed.borrow().as_slice(), &[UserMode::CARD_EMULATION]);
        assert_eq!(m.current_mode(), UserMode::CARD_EMULATION);
    }

    #[test]
    fn mode_check_signals_spontaneous_drift_when_nothing_pending() {
        let svc = FakeService::default();
        let mut m = ModeCoordinator::new(TechMask::ALL);
        let core = FakeNciCore::default();
        m.submit_mode_request(UserMode::READER_WRITER, true, &core);
        m.mode_check(NciState::Discovery, &svc);
        svc.mode_confirmed.borrow_mut().clear();

        // State drifts back to IDLE with nothing pending this time.
        m.mode_check(NciState::Idle, &svc);
        assert_eq!(svc.mode_spontaneous.borrow().as_slice(), &[UserMode::NONE]);
    }

    #[test]
    fn set_allowed_techs_only_touches_abf_bits() {
        let core = FakeNciCore::default();
        let mut m = ModeCoordinator::new(TechMask::ALL);
        m.set_allowed_techs(TechMask::A, &core);
        assert!(m.active_techs().contains(TechMask::A));
        assert!(!m.active_techs().contains(TechMask::B));
        assert!(!m.active_techs().contains(TechMask::F));
        // Reserved bits beyond A/B/F survive untouched.
        assert!(m.active_techs().contains(TechMask::A_LISTEN));
    }

    #[test]
    fn ce_tech_lock_narrows_effective_mask() {
        let core = FakeNciCore::default();
        let mut m = ModeCoordinator::new(TechMask::ALL);
        m.lock_ce_tech(TechMask::A_LISTEN, &core);
        assert_eq!(m.active_tech_mask(), TechMask::A_LISTEN);
        m.unlock_ce_tech();
        assert_eq!(m.active_tech_mask(), TechMask::ALL);
    }
}
