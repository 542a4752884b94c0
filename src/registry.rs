//! Object registry (C2): tracks the single active target/initiator and the
//! weak service-object handles bound to it.
//!
//! Grounded in `NciAdapterPriv`'s `target`/`initiator`/`tag`/`peer`/`host`
//! fields and `nci_adapter_set_active_tag/peer/host`,
//! `nci_adapter_drop_target`, `nci_adapter_drop_initiator`,
//! `nci_adapter_drop_all` in `original_source/nci_adapter.c`.

use std::sync::Arc;

use crate::service::{ActiveObject, Host, NfcService, Peer, Tag};
use crate::target_session::TargetSession;
use crate::types::Technology;

/// Listen-side counterpart to `TargetSession`. The original source's
/// `NfcInitiator` carries little state the adapter itself inspects beyond
/// its technology (used to pick the CE reactivation tech lock) — its own
/// session bookkeeping belongs to the service, not this core.
pub struct InitiatorSession {
    pub technology: Technology,
}

impl InitiatorSession {
    pub fn new(technology: Technology) -> Arc<Self> {
        Arc::new(InitiatorSession { technology })
    }
}

/// Tracks at most one of `target`/`initiator`, plus the weak handle to
/// whichever service object (tag, peer, host) is currently bound to it.
/// Invariant 1 in §8 ("object_cardinality(S) ≤ 1") is upheld by construction:
/// nothing in this module ever sets both `target` and `initiator` at once.
#[derive(Default)]
pub struct ActiveObjects {
    pub target: Option<Arc<TargetSession>>,
    pub initiator: Option<Arc<InitiatorSession>>,
    active: Option<ActiveObject>,
}

impl ActiveObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn has_initiator(&self) -> bool {
        self.initiator.is_some()
    }

    /// Binds the weak handle for a newly created tag, replacing whatever
    /// was bound before (`nci_adapter_set_active_tag`).
    pub fn set_tag(&mut self, tag: &Arc<dyn Tag>) {
        self.active = Some(ActiveObject::Tag(Arc::downgrade(tag)));
    }

    pub fn set_peer(&mut self, peer: &Arc<dyn Peer>) {
        self.active = Some(ActiveObject::Peer(Arc::downgrade(peer)));
    }

    pub fn set_host(&mut self, host: &Arc<dyn Host>) {
        self.active = Some(ActiveObject::Host(Arc::downgrade(host)));
    }

    pub fn is_bound_host(&self) -> bool {
        matches!(&self.active, Some(ActiveObject::Host(w)) if w.strong_count() > 0)
    }

    fn clear_binding(&mut self) {
        self.active = None;
    }

    /// `nci_adapter_drop_target`: removes the target, clears its bound
    /// handle, and signals *target-gone* exactly once.
    pub fn drop_target(&mut self, service: &dyn NfcService) {
        if self.target.take().is_some() {
            self.clear_binding();
            service.target_gone();
        }
    }

    /// `nci_adapter_drop_initiator`: removes the initiator, clears its
    /// bound handle, and signals *initiator-gone* exactly once.
    pub fn drop_initiator(&mut self, service: &dyn NfcService) {
        if self.initiator.take().is_some() {
            self.clear_binding();
            service.initiator_gone();
        }
    }

    /// `nci_adapter_drop_all`.
    pub fn drop_all(&mut self, service: &dyn NfcService) {
        self.drop_target(service);
        self.drop_initiator(service);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fake::{FakeHost, FakePeer, FakeService, FakeTag};
    use crate::target_session::TargetSession;
    use crate::types::RfIntf;

    fn target() -> Arc<TargetSession> {
        Arc::new(TargetSession::for_tests(RfIntf::Frame))
    }

    #[test]
    fn drop_target_signals_gone_once() {
        let svc = FakeService::default();
        let mut objs = ActiveObjects::new();
        objs.target = Some(target());
        let tag: Arc<dyn Tag> = Arc::new(FakeTag);
        objs.set_tag(&tag);

        objs.drop_target(&svc);
        objs.drop_target(&svc);

        assert_eq!(*svc.target_gone_count.borrow(), 1);
        assert!(objs.target.is_none());
    }

    #[test]
    fn drop_initiator_signals_gone_once() {
        let svc = FakeService::default();
        let mut objs = ActiveObjects::new();
        objs.initiator = Some(InitiatorSession::new(Technology::A));
        let host: Arc<dyn Host> = Arc::new(FakeHost);
        objs.set_host(&host);

        objs.drop_initiator(&svc);
        objs.drop_initiator(&svc);

        assert_eq!(*svc.initiator_gone_count.borrow(), 1);
    }

    #[test]
    fn weak_handle_self_nulls_when_service_drops_it() {
        let mut objs = ActiveObjects::new();
        let peer: Arc<dyn Peer> = Arc::new(FakePeer);
        objs.set_peer(&peer);
        assert!(!objs.is_bound_host());
        drop(peer);
        // is_bound_host specifically checks the Host variant; ensure a
        // non-host binding never reports as one even while alive.
        assert!(!objs.is_bound_host());
    }

    #[test]
    fn cardinality_never_exceeds_one() {
        let svc = FakeService::default();
        let mut objs = ActiveObjects::new();
        objs.target = Some(target());
        assert!(objs.has_target());
        objs.drop_target(&svc);
        objs.initiator = Some(InitiatorSession::new(Technology::B));
        assert!(!objs.has_target());
        assert!(objs.has_initiator());
    }
}
