//! The outbound-to-NFC-service collaborator surface.
//!
//! Grounded in the `nfc_adapter_add_*` factory calls and the
//! `nfc_target_gone`/`nfc_initiator_gone`/`nfc_target_reactivated`/
//! `nfc_initiator_reactivated`/`nfc_adapter_mode_notify`/
//! `nfc_adapter_param_change_notify` notifications in
//! `original_source/nci_adapter.c`. The service owns the `Tag`/`Peer`/`Host`
//! objects; the adapter only ever holds a `Weak` reference to the active
//! one, modeled directly with `std::sync::Weak` rather than a GObject
//! weak-pointer registration.

use std::sync::{Arc, Weak};

use crate::rf_interface::{ActivationParam, ModeParam};
use crate::types::{ParamKey, UserMode};

/// Marker trait for a detected tag object (`NfcTag`). The adapter never
/// calls methods on it directly beyond liveness checks; all tag protocol
/// handling lives in the service.
pub trait Tag: Send + Sync {}

/// Marker trait for a detected peer object (`NfcPeer`, NFC-DEP initiator or
/// target side).
pub trait Peer: Send + Sync {}

/// Marker trait for a detected host object (`NfcHost`, ISO-DEP listen side
/// with no tag interpretation).
pub trait Host: Send + Sync {}

/// A handle to one of the three object kinds the adapter can create,
/// tracked as `Weak` so the adapter self-nulls once the service drops its
/// `Arc` without needing an explicit "gone" callback from this side.
#[derive(Clone)]
pub enum ActiveObject {
    Tag(Weak<dyn Tag>),
    Peer(Weak<dyn Peer>),
    Host(Weak<dyn Host>),
}

impl ActiveObject {
    pub fn is_alive(&self) -> bool {
        match self {
            ActiveObject::Tag(w) => w.strong_count() > 0,
            ActiveObject::Peer(w) => w.strong_count() > 0,
            ActiveObject::Host(w) => w.strong_count() > 0,
        }
    }
}

/// The outbound half of the NFC service collaborator interface (§6,
/// "Outbound to NFC service"). Object-detection factories return `None`
/// when the activation doesn't match that factory's shape, mirroring the
/// C functions' `NULL`-on-mismatch convention so the adapter can fall
/// through to the next candidate exactly as `nci_adapter_activation` does.
pub trait NfcService {
    /// `nfc_adapter_add_tag_t2`.
    fn add_tag_t2(&self, poll_a: &ModeParam) -> Option<Arc<dyn Tag>>;
    /// `nfc_adapter_add_tag_t4a`.
    fn add_tag_t4a(&self, poll_a: &ModeParam, iso_dep: &ActivationParam) -> Option<Arc<dyn Tag>>;
    /// `nfc_adapter_add_tag_t4b`.
    fn add_tag_t4b(&self, poll_b: &ModeParam, iso_dep: &ActivationParam) -> Option<Arc<dyn Tag>>;
    /// `nfc_adapter_add_other_tag2`, the generic fallback when no known
    /// protocol/interface combination claimed the target.
    fn add_other_tag(&self, poll: Option<&ModeParam>) -> Option<Arc<dyn Tag>>;

    /// `nfc_adapter_add_peer_initiator_a`.
    fn add_peer_initiator_a(&self, poll_a: &ModeParam, nfc_dep: &ActivationParam) -> Option<Arc<dyn Peer>>;
    /// `nfc_adapter_add_peer_initiator_f`.
    fn add_peer_initiator_f(&self, poll_f: &ModeParam, nfc_dep: &ActivationParam) -> Option<Arc<dyn Peer>>;
    /// `nfc_adapter_add_peer_target_a`.
    fn add_peer_target_a(&self, nfc_dep: &ActivationParam) -> Option<Arc<dyn Peer>>;
    /// `nfc_adapter_add_peer_target_f`.
    fn add_peer_target_f(&self, listen_f: &ModeParam, nfc_dep: &ActivationParam) -> Option<Arc<dyn Peer>>;

    /// `nfc_adapter_add_host`.
    fn add_host(&self) -> Option<Arc<dyn Host>>;

    /// `nfc_target_gone`.
    fn target_gone(&self);
    /// `nfc_initiator_gone`.
    fn initiator_gone(&self);
    /// `nfc_target_reactivated`.
    fn target_reactivated(&self);
    /// `nfc_initiator_reactivated`.
    fn initiator_reactivated(&self);
    /// `nfc_adapter_mode_notify`.
    fn mode_confirmed(&self, mode: UserMode);
    /// `nfc_adapter_mode_notify` with the spontaneous (not-pending) branch.
    fn mode_spontaneous(&self, mode: UserMode);
    /// `nfc_adapter_param_change_notify`.
    fn param_changed(&self, key: ParamKey);
}
