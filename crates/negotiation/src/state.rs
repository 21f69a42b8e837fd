use std::fmt;

use serde::{Deserialize, Serialize};

/// Negotiation state of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterJobState {
    /// Negotiation switched off; the instance never becomes master.
    Disabled,
    /// Not negotiating: either not started yet, or standing by for a master.
    Inactive,
    /// Waiting for the channel to deliver the comms check.
    VerifyingComms,
    /// Comms confirmed; watching for a master before claiming.
    Starting,
    Requesting1,
    Requesting2,
    TakingControl,
    Active,
}

impl MasterJobState {
    /// States in which this instance holds a claim on the master role.
    pub fn is_claiming(&self) -> bool {
        matches!(self, Self::Requesting1 | Self::Requesting2 | Self::TakingControl)
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for MasterJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disabled => "disabled",
            Self::Inactive => "inactive",
            Self::VerifyingComms => "verifying_comms",
            Self::Starting => "starting",
            Self::Requesting1 => "requesting_1",
            Self::Requesting2 => "requesting_2",
            Self::TakingControl => "taking_control",
            Self::Active => "active",
        };
        f.write_str(s)
    }
}
