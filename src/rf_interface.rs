//! Interface-info snapshot and the reactivation matcher.
//!
//! Grounded in `original_source/nci_adapter.c`: `NciAdapterIntfInfo`,
//! `nci_adapter_intf_info_matches()`, `mode_param_match_poll_a()`,
//! `mode_param_match_poll_b()`, `nci_adapter_info_mode_params_matches()`.

use crate::types::{Mode, Protocol, RfIntf};

/// Parsed `mode_param` payload, keyed by the mode it was reported under.
/// Only poll A/B carry semantics the matcher cares about; every other mode
/// falls back to a raw byte compare (`nci_adapter_info_mode_params_matches`'s
/// default case).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModeParam {
    PollA {
        sens_res: [u8; 2],
        nfcid1: Vec<u8>,
        sel_res: u8,
        sel_res_len: u8,
    },
    PollB {
        nfcid0: [u8; 4],
        app_data: [u8; 4],
        prot_info: Vec<u8>,
        fsc: u16,
    },
    PollF {
        bitrate: u16,
        nfcid2: [u8; 8],
    },
    ListenF {
        nfcid2: [u8; 8],
    },
}

/// Parsed `activation_param` payload. Opaque beyond the raw bytes for the
/// matcher's purposes (it only ever compares `activation_param` by length +
/// byte equality), but typed here since §3 asks for the structured shapes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivationParam {
    IsoDepPollA {
        fsc: u16,
        t0: u8,
        ta: u8,
        tb: u8,
        tc: u8,
        t1: u8,
    },
    IsoDepPollB {
        mbli: u8,
        did: u8,
        hlr: Vec<u8>,
    },
    NfcDepPoll {
        atr_res_g: Vec<u8>,
    },
    NfcDepListen {
        atr_req_g: Vec<u8>,
    },
}

/// An `NFC_INTF_ACTIVATED_NTF` snapshot, as received from the NCI core.
/// `mode_param`/`activation_param` keep both the parsed view (used by the
/// matcher's mode-aware branches) and the raw bytes (used by its fallback
/// byte-for-byte comparison and by the factory calls in the adapter).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntfActivation {
    pub rf_intf: RfIntf,
    pub protocol: Protocol,
    pub mode: Mode,
    pub mode_param_bytes: Vec<u8>,
    pub mode_param: Option<ModeParam>,
    pub activation_param_bytes: Vec<u8>,
    pub activation_param: Option<ActivationParam>,
}

/// NFCID1 marker byte meaning "the remaining bytes are dynamically
/// generated" for 4-byte UIDs (NFCForum-TS-DigitalProtocol-1.0).
const RANDOM_UID_START_BYTE: u8 = 0x08;
const RANDOM_UID_SIZE: usize = 4;

fn mode_param_match_poll_a(
    sens_res1: &[u8; 2],
    nfcid1_1: &[u8],
    sel_res1: u8,
    sel_res_len1: u8,
    sens_res2: &[u8; 2],
    nfcid1_2: &[u8],
    sel_res2: u8,
    sel_res_len2: u8,
) -> bool {
    if sel_res1 != sel_res2
        || sel_res_len1 != sel_res_len2
        || nfcid1_1.len() != nfcid1_2.len()
        || sens_res1 != sens_res2
    {
        return false;
    }
    if nfcid1_1.len() == RANDOM_UID_SIZE
        && nfcid1_1[0] == nfcid1_2[0]
        && nfcid1_2[0] == RANDOM_UID_START_BYTE
    {
        true
    } else {
        nfcid1_1 == nfcid1_2
    }
}

fn mode_param_match_poll_b(
    app_data1: &[u8; 4],
    prot_info1: &[u8],
    fsc1: u16,
    app_data2: &[u8; 4],
    prot_info2: &[u8],
    fsc2: u16,
) -> bool {
    fsc1 == fsc2 && app_data1 == app_data2 && prot_info1 == prot_info2
}

fn mode_params_match(info: &IntfActivation, ntf: &IntfActivation) -> bool {
    if let (Some(mp1), Some(mp2)) = (&info.mode_param, &ntf.mode_param) {
        match (ntf.mode, ntf.rf_intf, mp1, mp2) {
            (
                Mode::PassivePollA,
                RfIntf::Frame | RfIntf::IsoDep,
                ModeParam::PollA {
                    sens_res: sr1,
                    nfcid1: id1,
                    sel_res: s1,
                    sel_res_len: sl1,
                },
                ModeParam::PollA {
                    sens_res: sr2,
                    nfcid1: id2,
                    sel_res: s2,
                    sel_res_len: sl2,
                },
            ) => {
                return mode_param_match_poll_a(sr1, id1, *s1, *sl1, sr2, id2, *s2, *sl2);
            }
            (
                Mode::PassivePollB,
                RfIntf::IsoDep,
                ModeParam::PollB {
                    app_data: ad1,
                    prot_info: pi1,
                    fsc: f1,
                    ..
                },
                ModeParam::PollB {
                    app_data: ad2,
                    prot_info: pi2,
                    fsc: f2,
                    ..
                },
            ) => {
                return mode_param_match_poll_b(ad1, pi1, *f1, ad2, pi2, *f2);
            }
            _ => {}
        }
    }
    /* Full match is expected in other cases */
    info.mode_param_bytes == ntf.mode_param_bytes
}

/// Whether a freshly-activated interface (`ntf`) matches the interface an
/// already-known target/initiator was last activated on (`info`). Returns
/// `false` if `info` is absent, matching `nci_adapter_intf_info_matches`'s
/// `info &&` guard.
pub fn intf_info_matches(info: Option<&IntfActivation>, ntf: &IntfActivation) -> bool {
    match info {
        Some(info) => {
            info.rf_intf == ntf.rf_intf
                && info.protocol == ntf.protocol
                && info.mode == ntf.mode
                && mode_params_match(info, ntf)
                && info.activation_param_bytes == ntf.activation_param_bytes
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> IntfActivation {
        IntfActivation {
            rf_intf: RfIntf::Frame,
            protocol: Protocol::T2T,
            mode: Mode::PassivePollA,
            mode_param_bytes: vec![1, 2, 3],
            mode_param: Some(ModeParam::PollA {
                sens_res: [0x00, 0x04],
                nfcid1: vec![0x08, 0x11, 0x22, 0x33],
                sel_res: 0x00,
                sel_res_len: 1,
            }),
            activation_param_bytes: vec![],
            activation_param: None,
        }
    }

    #[test]
    fn identical_interfaces_match() {
        let a = base();
        let b = base();
        assert!(intf_info_matches(Some(&a), &b));
    }

    #[test]
    fn dynamic_uid_poll_a_matches_despite_different_uid_tail() {
        let a = base();
        let mut b = base();
        if let Some(ModeParam::PollA { nfcid1, .. }) = &mut b.mode_param {
            *nfcid1 = vec![0x08, 0xaa, 0xbb, 0xcc];
        }
        assert!(intf_info_matches(Some(&a), &b));
    }

    #[test]
    fn non_dynamic_uid_poll_a_requires_full_match() {
        let mut a = base();
        if let Some(ModeParam::PollA { nfcid1, .. }) = &mut a.mode_param {
            *nfcid1 = vec![0x01, 0x11, 0x22, 0x33];
        }
        let mut b = base();
        if let Some(ModeParam::PollA { nfcid1, .. }) = &mut b.mode_param {
            *nfcid1 = vec![0x01, 0xaa, 0xbb, 0xcc];
        }
        assert!(!intf_info_matches(Some(&a), &b));
    }

    #[test]
    fn poll_b_ignores_uid_change() {
        let a = IntfActivation {
            rf_intf: RfIntf::IsoDep,
            protocol: Protocol::IsoDep,
            mode: Mode::PassivePollB,
            mode_param_bytes: vec![],
            mode_param: Some(ModeParam::PollB {
                nfcid0: [1, 2, 3, 4],
                app_data: [5, 6, 7, 8],
                prot_info: vec![9, 9],
                fsc: 256,
            }),
            activation_param_bytes: vec![],
            activation_param: None,
        };
        let mut b = a.clone();
        if let Some(ModeParam::PollB { nfcid0, .. }) = &mut b.mode_param {
            *nfcid0 = [0xaa, 0xbb, 0xcc, 0xdd];
        }
        assert!(intf_info_matches(Some(&a), &b));
    }

    #[test]
    fn no_prior_interface_never_matches() {
        let b = base();
        assert!(!intf_info_matches(None, &b));
    }

    #[test]
    fn different_rf_intf_never_matches() {
        let a = base();
        let mut b = base();
        b.rf_intf = RfIntf::IsoDep;
        assert!(!intf_info_matches(Some(&a), &b));
    }
}
