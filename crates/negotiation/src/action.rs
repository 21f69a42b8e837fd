use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;

/// Actions exchanged on the negotiation channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationAction {
    /// Query: asks the current master to announce itself. Also used to verify
    /// that the channel delivers messages at all.
    WhoIsMaster,
    RequestingControl1,
    RequestingControl2,
    TakingControl,
    IAmMaster,
    IAmStandby,
    /// Asks the master to re-run the claim protocol.
    ResyncMaster,
}

impl NegotiationAction {
    pub const WHO_IS_MASTER: &'static str = "WhoIsMaster";
    pub const REQUESTING_CONTROL_1: &'static str = "RequestingControl1";
    pub const REQUESTING_CONTROL_2: &'static str = "RequestingControl2";
    pub const TAKING_CONTROL: &'static str = "TakingControl";
    pub const I_AM_MASTER: &'static str = "IAmMaster";
    pub const I_AM_STANDBY: &'static str = "IAmStandby";
    pub const RESYNC_MASTER: &'static str = "ResyncMaster";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhoIsMaster => Self::WHO_IS_MASTER,
            Self::RequestingControl1 => Self::REQUESTING_CONTROL_1,
            Self::RequestingControl2 => Self::REQUESTING_CONTROL_2,
            Self::TakingControl => Self::TAKING_CONTROL,
            Self::IAmMaster => Self::I_AM_MASTER,
            Self::IAmStandby => Self::I_AM_STANDBY,
            Self::ResyncMaster => Self::RESYNC_MASTER,
        }
    }

    /// Whether the action is part of a peer's claim on the master role.
    pub fn is_claim(&self) -> bool {
        matches!(
            self,
            Self::RequestingControl1 | Self::RequestingControl2 | Self::TakingControl
        )
    }
}

impl fmt::Display for NegotiationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NegotiationAction {
    type Err = NegotiationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            Self::WHO_IS_MASTER => Ok(Self::WhoIsMaster),
            Self::REQUESTING_CONTROL_1 => Ok(Self::RequestingControl1),
            Self::REQUESTING_CONTROL_2 => Ok(Self::RequestingControl2),
            Self::TAKING_CONTROL => Ok(Self::TakingControl),
            Self::I_AM_MASTER => Ok(Self::IAmMaster),
            Self::I_AM_STANDBY => Ok(Self::IAmStandby),
            Self::RESYNC_MASTER => Ok(Self::ResyncMaster),
            other => Err(NegotiationError::UnknownAction(other.to_string())),
        }
    }
}

/// Negotiation payload as it travels on the wire. The action stays a string
/// so that peers running a newer action set can still be decoded, then
/// rejected explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireNegotiation {
    pub action: String,
    pub service_id: String,
    /// When the sender started its claim on the master role.
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: DateTime<Utc>,
}

/// A decoded negotiation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationMessage {
    pub action: NegotiationAction,
    pub service_id: String,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: DateTime<Utc>,
}

impl NegotiationMessage {
    pub fn new(
        action: NegotiationAction,
        service_id: impl Into<String>,
        claimed_at: Option<DateTime<Utc>>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            service_id: service_id.into(),
            claimed_at,
            sent_at,
        }
    }

    /// Claim used for precedence: the claim timestamp, or the send time when
    /// the sender did not state one.
    pub fn claim(&self) -> DateTime<Utc> {
        self.claimed_at.unwrap_or(self.sent_at)
    }
}

impl TryFrom<WireNegotiation> for NegotiationMessage {
    type Error = NegotiationError;

    fn try_from(wire: WireNegotiation) -> Result<Self, Self::Error> {
        Ok(Self {
            action: wire.action.parse()?,
            service_id: wire.service_id,
            claimed_at: wire.claimed_at,
            sent_at: wire.sent_at,
        })
    }
}

impl From<&NegotiationMessage> for WireNegotiation {
    fn from(msg: &NegotiationMessage) -> Self {
        Self {
            action: msg.action.as_str().to_string(),
            service_id: msg.service_id.clone(),
            claimed_at: msg.claimed_at,
            sent_at: msg.sent_at,
        }
    }
}
