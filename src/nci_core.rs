//! The outbound-to-NCI-core collaborator surface.
//!
//! Grounded in the `NciCore`/`nci_core_*` calls used throughout
//! `original_source/nci_adapter.c` (`nci_core_set_state`, `nci_core_set_op_mode`,
//! `nci_core_set_tech`, `nci_core_set_params`, `nci_core_get_param`). The
//! collaborator is a concrete generic type parameter rather than a trait
//! object: the one method that needs to be async (`send_data`, used by
//! target transmits) is expressed as a native async fn in a generic trait
//! bound, so no `async-trait` dependency is needed anywhere in the crate.

use crate::rf_interface::IntfActivation;
use crate::types::{NciState, OpMode, ParamKey, ParamValue, TechMask};

/// A static RF connection transmit id, returned by `send_data` and echoed
/// back on completion. Mirrors `nci_target_transmit`'s dispatch-id return
/// value in `original_source/nci_target.c`.
pub type TransmitId = u32;

/// Notifications the NCI core collaborator delivers to the adapter. These
/// are the inbound events referenced throughout §4 of the full
/// specification: `nci_adapter_nci_intf_activated`,
/// `nci_adapter_nci_current_state_changed`, `nci_adapter_nci_next_state_changed`,
/// `nci_adapter_nci_param_changed`, plus the static-connection data/sent
/// events consumed by the target session (`nci_target_data_packet_handler`,
/// `nci_target_data_sent`).
#[derive(Clone, Debug)]
pub enum NciCoreEvent {
    /// `NFC_INTF_ACTIVATED_NTF`.
    IntfActivated(IntfActivation),
    /// `current_state` transitioned to a new value.
    CurrentStateChanged(NciState),
    /// `next_state` transitioned to a new value (the state the RF state
    /// machine is about to enter).
    NextStateChanged(NciState),
    /// A core parameter changed out from under the adapter (e.g. set by a
    /// lower layer rather than through `set_params`).
    ParamChanged(ParamKey),
    /// Data arrived on the static RF connection, tagged with the NCI
    /// conn-id-derived framing status byte (`nci_target_data_packet_handler`).
    DataReceived { status: u8, payload: Vec<u8> },
    /// A previously submitted `send_data` completed.
    DataSent { id: TransmitId, ok: bool },
}

/// The outbound half of the NCI core collaborator interface (§6, "Outbound
/// to NCI core").
///
/// Implementors drive the real NCI state machine; a unit test provides a
/// hand-rolled fake recording calls instead.
pub trait NciCoreHandle {
    /// `nci_core_set_state`.
    fn set_state(&self, state: NciState);

    /// `nci_core_set_op_mode`.
    fn set_op_mode(&self, mode: OpMode);

    /// `nci_core_set_tech`.
    fn set_tech(&self, techs: TechMask);

    /// `nci_core_set_params` / `nci_core_get_param`.
    fn set_param(&self, key: ParamKey, value: Option<ParamValue>);
    fn get_param(&self, key: ParamKey) -> Option<ParamValue>;

    /// `nci_target_cancel_transmit` / `nfc_target_cancel_transmit`.
    fn cancel(&self, id: TransmitId);

    /// Submit data on the static RF connection, returning the id used to
    /// correlate the eventual `DataSent` event. `None` means the lower layer
    /// rejected the send outright (`nci_target_transmit`'s "no id" case).
    ///
    /// Not `Send`-bound: the whole adapter runs on one cooperative event
    /// loop task (§5), so nothing here ever crosses a thread.
    fn send_data(&self, payload: &[u8]) -> impl std::future::Future<Output = Option<TransmitId>>;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Records every call made against it; used by every other module's
    /// test suite as the `NciCoreHandle` test double.
    #[derive(Default)]
    pub struct FakeNciCore {
        pub states: RefCell<Vec<NciState>>,
        pub op_modes: RefCell<Vec<OpMode>>,
        pub techs: RefCell<Vec<TechMask>>,
        pub params: RefCell<HashMap<ParamKey, Option<ParamValue>>>,
        pub canceled: RefCell<Vec<TransmitId>>,
        pub next_send_id: RefCell<Option<TransmitId>>,
        pub sent: RefCell<Vec<Vec<u8>>>,
    }

    impl FakeNciCore {
        pub fn last_state(&self) -> Option<NciState> {
            self.states.borrow().last().copied()
        }
    }

    impl NciCoreHandle for FakeNciCore {
        fn set_state(&self, state: NciState) {
            self.states.borrow_mut().push(state);
        }

        fn set_op_mode(&self, mode: OpMode) {
            self.op_modes.borrow_mut().push(mode);
        }

        fn set_tech(&self, techs: TechMask) {
            self.techs.borrow_mut().push(techs);
        }

        fn set_param(&self, key: ParamKey, value: Option<ParamValue>) {
            self.params.borrow_mut().insert(key, value);
        }

        fn get_param(&self, key: ParamKey) -> Option<ParamValue> {
            self.params.borrow().get(&key).cloned().flatten()
        }

        fn cancel(&self, id: TransmitId) {
            self.canceled.borrow_mut().push(id);
        }

        async fn send_data(&self, payload: &[u8]) -> Option<TransmitId> {
            self.sent.borrow_mut().push(payload.to_vec());
            *self.next_send_id.borrow()
        }
    }
}
