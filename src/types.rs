//! Shared NCI/NFC vocabulary.
//!
//! The original C core (`original_source/nci_adapter.c`) represents
//! `NCI_RF_INTERFACE`, `NCI_PROTOCOL`, `NCI_MODE`, `NCI_TECH`, `NFC_MODE` and
//! friends as plain integer typedefs with `#define`-d bit constants. The
//! idiomatic Rust translation is a closed `enum` for the one-of-N values and
//! a small hand-rolled bitmask newtype for the flag sets, rather than
//! pulling in a full code generator for a handful of bits.

use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// `NCI_RF_INTERFACE`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RfIntf {
    Frame,
    IsoDep,
    NfcDep,
    NfceeDirect,
    Proprietary,
}

/// `NCI_PROTOCOL`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    T1T,
    T2T,
    T3T,
    T5T,
    IsoDep,
    NfcDep,
    Proprietary,
    Undetermined,
}

/// `NCI_MODE`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    PassivePollA,
    ActivePollA,
    PassivePollB,
    PassivePollF,
    ActivePollF,
    PassivePoll15693,
    PassiveListenA,
    PassiveListenB,
    PassiveListenF,
    ActiveListenA,
    ActiveListenF,
    PassiveListen15693,
}

impl Mode {
    /// The over-the-air technology this mode operates on, per
    /// `nci_target_new()`'s `tech` switch in `original_source/nci_target.c`.
    pub fn technology(self) -> Technology {
        match self {
            Mode::PassivePollA | Mode::ActivePollA => Technology::A,
            Mode::PassivePollB => Technology::B,
            Mode::PassivePollF | Mode::ActivePollF => Technology::F,
            Mode::PassiveListenA | Mode::ActiveListenA => Technology::A,
            Mode::PassiveListenB => Technology::B,
            Mode::PassiveListenF | Mode::ActiveListenF => Technology::F,
            Mode::PassivePoll15693 | Mode::PassiveListen15693 => Technology::Unknown,
        }
    }
}

/// `NFC_TECHNOLOGY` as carried by an activated initiator/target (single
/// value, as opposed to the `TechMask` bitmask used for NCI-level requests).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Technology {
    A,
    B,
    F,
    Unknown,
}

/// NCI RF state machine states exposed by the NCI core collaborator
/// (`NCI_RFST_*`). `Unknown` carries the raw value for states this adapter
/// does not recognize, which is itself meaningful: §4.1.2 treats any
/// unrecognized next-state as a hard reset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NciState {
    Idle,
    Discovery,
    W4AllDiscoveries,
    W4HostSelect,
    PollActive,
    ListenActive,
    ListenSleep,
    Unknown(u8),
}

impl NciState {
    pub fn is_idle(self) -> bool {
        matches!(self, NciState::Idle)
    }
}

macro_rules! bitmask {
    ($(#[$meta:meta])* $name:ident($repr:ty) { $($(#[$vmeta:meta])* $variant:ident = $val:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name(pub $repr);

        impl $name {
            $($(#[$vmeta])* pub const $variant: $name = $name($val);)+
            /// No bits set.
            pub const NONE: $name = $name(0);

            /// Raw bit representation.
            pub const fn bits(self) -> $repr {
                self.0
            }

            /// Whether `self` has every bit of `other` set.
            pub const fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = $name;
            fn bitand(self, rhs: $name) -> $name {
                $name(self.0 & rhs.0)
            }
        }

        impl Not for $name {
            type Output = $name;
            fn not(self) -> $name {
                $name(!self.0)
            }
        }
    };
}

bitmask!(
    /// `NCI_TECH`: bitmask over polled/listened technologies.
    ///
    /// Bits beyond A/B/F are implementation-reserved and are preserved by
    /// `ModeCoordinator::set_allowed_techs`, which only ever touches the
    /// A/B/F bits.
    TechMask(u8) {
        A = 0x01,
        B = 0x02,
        F = 0x04,
        A_LISTEN = 0x10,
        B_LISTEN = 0x20,
        F_LISTEN = 0x40,
    }
);

impl TechMask {
    /// All bits set; the default tech mask outside of a CE-reactivation lock.
    pub const ALL: TechMask = TechMask(0xff);
}

bitmask!(
    /// `NFC_OP_MODE`: the flags pushed to the NCI core via `set_op_mode`.
    OpMode(u8) {
        RW = 0x01,
        POLL = 0x02,
        PEER = 0x04,
        LISTEN = 0x08,
        CE = 0x10,
    }
);

bitmask!(
    /// `NFC_MODE`: the user-facing operating modes requested by the service.
    UserMode(u8) {
        READER_WRITER = 0x01,
        P2P_INITIATOR = 0x02,
        P2P_TARGET = 0x04,
        CARD_EMULATION = 0x08,
    }
);

impl UserMode {
    /// Translates a user-requested operating mode into the NCI op-mode
    /// flags that drive it.
    pub fn to_op_mode(self) -> OpMode {
        let mut op = OpMode::NONE;
        if self.contains(UserMode::READER_WRITER) {
            op |= OpMode::RW | OpMode::POLL;
        }
        if self.contains(UserMode::P2P_INITIATOR) {
            op |= OpMode::PEER | OpMode::POLL;
        }
        if self.contains(UserMode::P2P_TARGET) {
            op |= OpMode::PEER | OpMode::LISTEN;
        }
        if self.contains(UserMode::CARD_EMULATION) {
            op |= OpMode::CE | OpMode::LISTEN;
        }
        op
    }
}

/// `NFC_ADAPTER_PARAM` / `NCI_CORE_PARAM` key space. Only one member today,
/// modeled as an enum so the set can grow without widening every call site
/// to a raw integer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamKey {
    LaNfcid1,
}

/// A parameter value, keyed by `ParamKey`. Only the NFCID1 shape exists
/// today, matching `NfcAdapterParamValue`/`NciCoreParamValue` in
/// `nci_adapter.c`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamValue {
    Nfcid1(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_mode_table_matches_spec() {
        assert_eq!(UserMode::READER_WRITER.to_op_mode(), OpMode::RW | OpMode::POLL);
        assert_eq!(UserMode::P2P_INITIATOR.to_op_mode(), OpMode::PEER | OpMode::POLL);
        assert_eq!(UserMode::P2P_TARGET.to_op_mode(), OpMode::PEER | OpMode::LISTEN);
        assert_eq!(UserMode::CARD_EMULATION.to_op_mode(), OpMode::CE | OpMode::LISTEN);
        let combo = UserMode::READER_WRITER | UserMode::CARD_EMULATION;
        assert_eq!(combo.to_op_mode(), OpMode::RW | OpMode::POLL | OpMode::CE | OpMode::LISTEN);
    }

    #[test]
    fn techmask_bitops() {
        let t = TechMask::A | TechMask::B;
        assert!(t.contains(TechMask::A));
        assert!(!t.contains(TechMask::F));
        assert!((t & TechMask::F).is_empty());
    }

    #[test]
    fn mode_technology_mapping() {
        assert_eq!(Mode::PassivePollA.technology(), Technology::A);
        assert_eq!(Mode::PassivePollB.technology(), Technology::B);
        assert_eq!(Mode::PassivePollF.technology(), Technology::F);
        assert_eq!(Mode::PassivePoll15693.technology(), Technology::Unknown);
    }
}
