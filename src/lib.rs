//! NCI adapter core: the coordination layer between an NCI protocol engine
//! and a higher-level NFC service.
//!
//! See [`adapter::Adapter`] for the entry point; [`nci_core::NciCoreHandle`]
//! and [`service::NfcService`] are the two collaborator traits a caller
//! implements to wire this crate to a concrete NCI stack and a concrete
//! tag/peer/host object model.

pub mod adapter;
pub mod ce_reactivation;
pub mod error;
pub mod mode;
pub mod nci_core;
pub mod presence;
pub mod registry;
pub mod rf_interface;
pub mod service;
pub mod target_session;
pub mod types;

pub use adapter::{Adapter, InternalState};
pub use error::AdapterError;
pub use nci_core::{NciCoreEvent, NciCoreHandle, TransmitId};
pub use rf_interface::{ActivationParam, IntfActivation, ModeParam};
pub use service::{ActiveObject, Host, NfcService, Peer, Tag};
pub use types::{Mode, NciState, OpMode, ParamKey, ParamValue, Protocol, RfIntf, TechMask, Technology, UserMode};
