//! Adapter state machine (C6): the core correlator between NCI activation /
//! deactivation events and the higher-level object lifecycle.
//!
//! Grounded in `nci_adapter_activation()`, `nci_adapter_deactivation()`,
//! `nci_adapter_state_check()`, `nci_adapter_next_state_changed()`,
//! `nci_adapter_current_state_changed()`, `nci_adapter_reactivate()`,
//! `nci_adapter_deactivate_target/initiator()` in
//! `original_source/nci_adapter.c`. The event loop itself follows the
//! `tokio::select!` + persistent-resettable-`Sleep` structure used by an
//! NCI dispatch loop: park each timer far in the future while disarmed, and
//! reset it to a real deadline only on the armed/disarmed edge.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::ce_reactivation::{ce_tech_lock, CeReactivationTimer};
use crate::mode::ModeCoordinator;
use crate::nci_core::{NciCoreEvent, NciCoreHandle};
use crate::presence::PresenceScheduler;
use crate::registry::{ActiveObjects, InitiatorSession};
use crate::rf_interface::{intf_info_matches, IntfActivation};
use crate::service::NfcService;
use crate::target_session::TargetSession;
use crate::types::{NciState, TechMask, UserMode};

/// `InternalState` (§3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InternalState {
    Idle,
    HaveTarget,
    HaveInitiator,
    ReactivatingTarget,
    ReactivatingCe,
    ReactivatedCe,
}

/// The adapter core. Generic over its two collaborators so no `dyn`/
/// `async-trait` indirection is needed on the hot path (`core.send_data`).
pub struct Adapter<C, S> {
    core: C,
    service: S,
    internal_state: InternalState,
    active_intf: Option<IntfActivation>,
    objects: ActiveObjects,
    mode: ModeCoordinator,
    presence: PresenceScheduler,
    ce_timer: CeReactivationTimer,
    powered: bool,
    enabled: bool,
    power_requested: bool,
}

impl<C: NciCoreHandle, S: NfcService> Adapter<C, S> {
    pub fn new(core: C, service: S, supported_techs: TechMask) -> Self {
        Adapter {
            core,
            service,
            internal_state: InternalState::Idle,
            active_intf: None,
            objects: ActiveObjects::new(),
            mode: ModeCoordinator::new(supported_techs),
            presence: PresenceScheduler::new(),
            ce_timer: CeReactivationTimer::new(),
            powered: false,
            enabled: false,
            power_requested: false,
        }
    }

    pub fn internal_state(&self) -> InternalState {
        self.internal_state
    }

    pub fn set_power(&mut self, enabled: bool, powered: bool, power_requested: bool) {
        self.enabled = enabled;
        self.powered = powered;
        self.power_requested = power_requested;
    }

    fn set_internal_state(&mut self, state: InternalState) {
        self.internal_state = state;
    }

    fn need_presence_checks(&self) -> bool {
        self.objects
            .target
            .as_ref()
            .map(|t| t.presence_check_payload().is_some())
            .unwrap_or(false)
    }

    /// `nci_adapter_drop_target`: the housekeeping (clearing the cached
    /// interface info, disarming presence checks) only applies `if (target)`,
    /// same guard `ActiveObjects::drop_target` uses internally for the
    /// gone-signal, so check `has_target` here rather than taking the option
    /// ourselves — the actual removal and signal belong to the registry.
    fn drop_target(&mut self) {
        if self.objects.has_target() {
            self.active_intf = None;
            self.presence.disarm();
            info!("Target is gone");
        }
        self.objects.drop_target(&self.service);
    }

    fn drop_initiator(&mut self) {
        if self.objects.has_initiator() {
            self.active_intf = None;
            self.ce_timer.cancel();
            self.mode.unlock_ce_tech();
            info!("Initiator is gone");
            self.objects.drop_initiator(&self.service);
            self.core.set_tech(self.mode.active_techs() & self.mode.active_tech_mask());
        } else {
            self.objects.drop_initiator(&self.service);
        }
    }

    fn drop_all(&mut self) {
        self.drop_target();
        self.drop_initiator();
    }

    /// `nci_adapter_activation`.
    fn on_intf_activated(&mut self, ntf: IntfActivation) {
        self.ce_timer.cancel();

        match self.internal_state {
            InternalState::Idle => {}
            InternalState::HaveTarget => {
                self.set_internal_state(InternalState::Idle);
                self.drop_target();
            }
            InternalState::HaveInitiator => {
                if intf_info_matches(self.active_intf.as_ref(), &ntf) {
                    if self.objects.is_bound_host() {
                        debug!("CE host spontaneously reactivated");
                        self.set_internal_state(InternalState::ReactivatedCe);
                        self.service.initiator_reactivated();
                    } else {
                        debug!("Keeping initiator alive");
                    }
                    return;
                }
                debug!("Different initiator has arrived, dropping the old one");
                self.set_internal_state(InternalState::Idle);
                self.drop_initiator();
            }
            InternalState::ReactivatingCe | InternalState::ReactivatedCe => {
                if intf_info_matches(self.active_intf.as_ref(), &ntf) {
                    if self.internal_state == InternalState::ReactivatedCe {
                        debug!("Keeping CE initiator alive");
                    } else {
                        debug!("CE initiator reactivated");
                        self.set_internal_state(InternalState::ReactivatedCe);
                    }
                    self.service.initiator_reactivated();
                    return;
                }
                debug!("Different initiator has arrived, dropping the old one");
                self.set_internal_state(InternalState::Idle);
                self.drop_initiator();
            }
            InternalState::ReactivatingTarget => {
                if intf_info_matches(self.active_intf.as_ref(), &ntf) {
                    debug!("Target reactivated");
                    self.set_internal_state(InternalState::HaveTarget);
                    self.service.target_reactivated();
                    self.rearm_presence_if_needed();
                    return;
                }
                debug!("Different tag has arrived, dropping the old one");
                self.set_internal_state(InternalState::Idle);
                self.drop_target();
            }
        }

        self.detect_objects(ntf);
        self.rearm_presence_if_needed();

        if !self.objects.has_target() && !self.objects.has_initiator() {
            debug!("No idea what this is");
            self.core.set_state(NciState::Idle);
        }
    }

    fn rearm_presence_if_needed(&mut self) {
        if self.need_presence_checks() {
            if !self.presence.is_armed() {
                self.presence.arm();
            }
        } else {
            self.presence.disarm();
        }
    }

    /// Object detection (§4.1.1, steps 1-2). The actual typed-object
    /// factories (peer/tag/host construction) are the NFC service's
    /// responsibility; this only decides which factory to try and in what
    /// order, mirroring the cascading `if`s in `nci_adapter_activation`.
    fn detect_objects(&mut self, ntf: IntfActivation) {
        if self.objects.has_target() || self.objects.has_initiator() {
            return;
        }

        if let Some(session) = TargetSession::from_activation(&ntf) {
            let target = Arc::new(session);
            self.objects.target = Some(target);
            self.set_internal_state(InternalState::HaveTarget);
            self.active_intf = Some(ntf.clone());

            if let Some(peer) = self.try_create_peer_initiator(&ntf) {
                self.objects.set_peer(&peer);
            } else if let Some(tag) = self.try_create_known_tag(&ntf) {
                self.objects.set_tag(&tag);
            } else if let Some(tag) = self.service.add_other_tag(ntf.mode_param.as_ref()) {
                self.objects.set_tag(&tag);
            }
            return;
        }

        let initiator = InitiatorSession::new(ntf.mode.technology());
        if let Some(peer) = self.try_create_peer_target(&ntf) {
            self.objects.initiator = Some(initiator);
            self.objects.set_peer(&peer);
            self.active_intf = Some(ntf);
            self.set_internal_state(InternalState::HaveInitiator);
        } else if let Some(host) = self.try_create_host(&ntf) {
            self.objects.initiator = Some(initiator);
            self.objects.set_host(&host);
            self.active_intf = Some(ntf);
            self.set_internal_state(InternalState::HaveInitiator);
        }
    }

    fn try_create_peer_initiator(&self, ntf: &IntfActivation) -> Option<Arc<dyn crate::service::Peer>> {
        use crate::rf_interface::ModeParam;
        use crate::types::{Mode, Protocol, RfIntf};
        if ntf.protocol != Protocol::NfcDep || ntf.rf_intf != RfIntf::NfcDep {
            return None;
        }
        match (ntf.mode, &ntf.mode_param, &ntf.activation_param) {
            (Mode::PassivePollA | Mode::ActivePollA, Some(mp @ ModeParam::PollA { .. }), Some(ap)) => {
                self.service.add_peer_initiator_a(mp, ap)
            }
            (Mode::PassivePollF | Mode::ActivePollF, Some(mp @ ModeParam::PollF { .. }), Some(ap)) => {
                self.service.add_peer_initiator_f(mp, ap)
            }
            _ => None,
        }
    }

    fn try_create_known_tag(&self, ntf: &IntfActivation) -> Option<Arc<dyn crate::service::Tag>> {
        use crate::rf_interface::ModeParam;
        use crate::types::{Mode, Protocol, RfIntf};
        match ntf.protocol {
            Protocol::T2T if ntf.rf_intf == RfIntf::Frame => match (ntf.mode, &ntf.mode_param) {
                (Mode::PassivePollA | Mode::ActivePollA, Some(mp @ ModeParam::PollA { .. })) => {
                    self.service.add_tag_t2(mp)
                }
                _ => None,
            },
            Protocol::IsoDep if ntf.rf_intf == RfIntf::IsoDep => match (ntf.mode, &ntf.mode_param, &ntf.activation_param) {
                (Mode::PassivePollA, Some(mp @ ModeParam::PollA { .. }), Some(ap)) => self.service.add_tag_t4a(mp, ap),
                (Mode::PassivePollB, Some(mp @ ModeParam::PollB { .. }), Some(ap)) => self.service.add_tag_t4b(mp, ap),
                _ => None,
            },
            _ => None,
        }
    }

    fn try_create_peer_target(&self, ntf: &IntfActivation) -> Option<Arc<dyn crate::service::Peer>> {
        use crate::rf_interface::ModeParam;
        use crate::types::{Mode, RfIntf};
        if ntf.rf_intf != RfIntf::NfcDep {
            return None;
        }
        match (ntf.mode, &ntf.mode_param, &ntf.activation_param) {
            (Mode::PassiveListenA | Mode::ActiveListenA, _, Some(ap)) => self.service.add_peer_target_a(ap),
            (Mode::PassiveListenF | Mode::ActiveListenF, Some(mp @ ModeParam::ListenF { .. }), Some(ap)) => {
                self.service.add_peer_target_f(mp, ap)
            }
            _ => None,
        }
    }

    fn try_create_host(&self, ntf: &IntfActivation) -> Option<Arc<dyn crate::service::Host>> {
        use crate::types::RfIntf;
        if ntf.rf_intf == RfIntf::IsoDep {
            self.service.add_host()
        } else {
            None
        }
    }

    /// `nci_adapter_deactivation`.
    fn on_deactivation(&mut self) {
        match self.internal_state {
            InternalState::ReactivatingTarget => {}
            InternalState::ReactivatingCe => {}
            InternalState::ReactivatedCe => {
                self.set_internal_state(InternalState::ReactivatingCe);
                self.ce_timer.start();
            }
            InternalState::HaveInitiator => {
                if self.objects.is_bound_host() {
                    let technology = self.objects.initiator.as_ref().map(|i| i.technology);
                    self.set_internal_state(InternalState::ReactivatingCe);
                    self.ce_timer.start();
                    if let Some(technology) = technology {
                        if let Some(ce_tech) = ce_tech_lock(technology) {
                            self.mode.lock_ce_tech(ce_tech, &self.core);
                        }
                    }
                } else {
                    self.set_internal_state(InternalState::Idle);
                    self.drop_all();
                }
            }
            InternalState::Idle | InternalState::HaveTarget => {
                self.set_internal_state(InternalState::Idle);
                self.drop_all();
            }
        }
    }

    /// `nci_adapter_state_check`.
    fn state_check(&mut self, current_state: NciState, next_state: NciState) {
        if current_state.is_idle() && next_state.is_idle() && self.enabled && self.powered && self.power_requested {
            self.core.set_state(NciState::Discovery);
        }
    }

    fn mode_check(&mut self, current_state: NciState) {
        self.mode.mode_check(current_state, &self.service);
    }

    /// `nci_adapter_current_state_changed`.
    pub fn on_current_state_changed(&mut self, current_state: NciState, next_state: NciState) {
        self.state_check(current_state, next_state);
        self.mode_check(current_state);
    }

    /// `nci_adapter_next_state_changed`.
    pub fn on_next_state_changed(&mut self, current_state: NciState, next_state: NciState) {
        match next_state {
            NciState::Idle => {
                if !current_state.is_idle() {
                    self.on_deactivation();
                }
            }
            NciState::Discovery => {
                if !current_state.is_idle() {
                    self.on_deactivation();
                }
            }
            NciState::W4AllDiscoveries
            | NciState::W4HostSelect
            | NciState::PollActive
            | NciState::ListenActive
            | NciState::ListenSleep => {}
            NciState::Unknown(code) => {
                warn!("Unrecognized next state {:#04x}", code);
                self.set_internal_state(InternalState::Idle);
                self.drop_all();
            }
        }
        self.state_check(current_state, next_state);
        self.mode_check(current_state);
    }

    /// `nci_adapter_reactivate`: guarded by `self->target == target && target`
    /// in the original, translated here as an `Arc::ptr_eq` identity check so
    /// a caller holding a stale handle from an earlier target can't reactivate
    /// whatever has since replaced it.
    pub fn reactivate(&mut self, target: &Arc<TargetSession>, current_state: NciState, next_state: NciState) -> bool {
        let is_current = self.objects.target.as_ref().is_some_and(|t| Arc::ptr_eq(t, target));
        if is_current
            && self.active_intf.is_some()
            && self.internal_state == InternalState::HaveTarget
            && ((current_state == NciState::PollActive && next_state == NciState::PollActive)
                || (current_state == NciState::ListenActive && next_state == NciState::ListenActive))
        {
            debug!("Reactivating the interface");
            self.set_internal_state(InternalState::ReactivatingTarget);
            self.presence.disarm();
            self.core.set_state(NciState::Discovery);
            true
        } else {
            warn!("Can't reactivate the tag in this state");
            false
        }
    }

    /// `nci_adapter_deactivate_target`, guarded the same way as `reactivate`.
    pub fn deactivate_target(&mut self, target: &Arc<TargetSession>) {
        if !self.objects.target.as_ref().is_some_and(|t| Arc::ptr_eq(t, target)) {
            return;
        }
        self.drop_target();
        if self.powered {
            self.core.set_state(NciState::Discovery);
        }
    }

    /// `nci_adapter_deactivate_initiator`, guarded the same way as
    /// `reactivate`.
    pub fn deactivate_initiator(&mut self, initiator: &Arc<InitiatorSession>) {
        if !self.objects.initiator.as_ref().is_some_and(|i| Arc::ptr_eq(i, initiator)) {
            return;
        }
        self.drop_initiator();
        if self.powered {
            self.core.set_state(NciState::Discovery);
        }
    }

    /// `nci_adapter_submit_mode_request`.
    pub fn submit_mode_request(&mut self, mode: UserMode) {
        self.mode.submit_mode_request(mode, self.powered, &self.core);
    }

    /// `nci_adapter_cancel_mode_request`.
    pub fn cancel_mode_request(&mut self) {
        self.mode.cancel_mode_request();
    }

    /// `nci_adapter_set_allowed_techs`.
    pub fn set_allowed_techs(&mut self, techs: TechMask) {
        self.mode.set_allowed_techs(techs, &self.core);
    }

    /// `nci_adapter_presence_check_done`, called by the caller once a probe
    /// dispatched via `TargetSession::presence_check_payload` completes.
    pub fn on_presence_check_done(&mut self, target: &Arc<TargetSession>, ok: bool) {
        debug!("Presence check {}", if ok { "ok" } else { "failed" });
        let still_alive = self.presence.probe_done(ok);
        if !still_alive {
            self.deactivate_target(target);
        }
    }

    /// `nci_adapter_presence_check_timer`'s failure-to-start branch.
    pub fn on_presence_check_start_failed(&mut self) {
        debug!("Failed to start presence check");
        self.presence.probe_failed_to_start();
        self.core.set_state(NciState::Discovery);
    }

    pub fn presence_scheduler(&self) -> &PresenceScheduler {
        &self.presence
    }

    pub fn ce_reactivation_timer_armed(&self) -> bool {
        self.ce_timer.is_armed()
    }

    /// CE reactivation timer expiry (`nci_adapter_ce_reactivation_timeout`).
    pub fn on_ce_reactivation_timeout(&mut self) {
        debug!("CE reactivation timeout has expired");
        self.ce_timer.fire();
        self.set_internal_state(InternalState::Idle);
        self.drop_all();
    }

    pub fn target(&self) -> Option<Arc<TargetSession>> {
        self.objects.target.clone()
    }

    /// Drains the deferred mode-check flag; called once per loop turn.
    fn take_pending_mode_check(&mut self) -> bool {
        self.mode.take_pending_check()
    }
}

/// Runs the single cooperative event loop: one `tokio::select!` over
/// inbound NCI-core events plus the two adapter timers, with persistent
/// resettable `Sleep`s parked far in the future while disarmed.
pub async fn run<C: NciCoreHandle, S: NfcService>(adapter: &mut Adapter<C, S>, mut events: mpsc::Receiver<NciCoreEvent>) {
    let far_future = || Instant::now() + std::time::Duration::from_secs(365 * 24 * 3600);

    let presence_sleep = sleep_until(far_future());
    tokio::pin!(presence_sleep);
    let ce_sleep = sleep_until(far_future());
    tokio::pin!(ce_sleep);

    let mut current_state = NciState::Idle;
    let mut next_state = NciState::Idle;
    let mut presence_armed = false;
    let mut ce_armed = false;

    loop {
        if adapter.take_pending_mode_check() {
            adapter.mode_check(current_state);
        }

        // Only touch the sleep deadline on an armed/disarmed edge: resetting
        // every turn while already armed would keep pushing the deadline out
        // and the probe would never fire.
        match (adapter.presence_scheduler().is_armed(), presence_armed) {
            (true, false) => {
                presence_sleep.as_mut().reset(Instant::now() + crate::presence::PRESENCE_CHECK_PERIOD);
                presence_armed = true;
            }
            (false, true) => {
                presence_sleep.as_mut().reset(far_future());
                presence_armed = false;
            }
            _ => {}
        }
        match (adapter.ce_reactivation_timer_armed(), ce_armed) {
            (true, false) => {
                ce_sleep.as_mut().reset(Instant::now() + crate::ce_reactivation::CE_REACTIVATION_TIMEOUT);
                ce_armed = true;
            }
            (false, true) => {
                ce_sleep.as_mut().reset(far_future());
                ce_armed = false;
            }
            _ => {}
        }

        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(NciCoreEvent::IntfActivated(ntf)) => adapter.on_intf_activated(ntf),
                    Some(NciCoreEvent::CurrentStateChanged(s)) => {
                        current_state = s;
                        adapter.on_current_state_changed(current_state, next_state);
                    }
                    Some(NciCoreEvent::NextStateChanged(s)) => {
                        next_state = s;
                        adapter.on_next_state_changed(current_state, next_state);
                    }
                    Some(NciCoreEvent::ParamChanged(key)) => {
                        adapter.service.param_changed(key);
                    }
                    Some(NciCoreEvent::DataReceived { payload, .. }) => {
                        if let Some(target) = adapter.target() {
                            target.on_data_received(payload);
                        }
                    }
                    Some(NciCoreEvent::DataSent { id, ok }) => {
                        if let Some(target) = adapter.target() {
                            target.on_data_sent(id, ok);
                        }
                    }
                    None => break,
                }
            }
            () = &mut presence_sleep, if presence_armed => {
                presence_armed = false; // forces the top-of-loop block to re-arm the deadline
                if let Some(target) = adapter.target() {
                    if adapter.presence.should_probe(target.allows_presence_check()) {
                        if let Some(payload) = target.presence_check_payload() {
                            adapter.presence.probe_started();
                            let ok = target.transmit(&adapter.core, &payload).await.is_ok();
                            adapter.on_presence_check_done(&target, ok);
                        } else {
                            adapter.on_presence_check_start_failed();
                        }
                    }
                }
            }
            () = &mut ce_sleep, if ce_armed => {
                ce_armed = false;
                adapter.on_ce_reactivation_timeout();
            }
        }
    }
}
