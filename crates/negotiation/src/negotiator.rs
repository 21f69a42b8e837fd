//! The election state machine.
//!
//! [`Negotiator`] is pure: it never touches a socket or a clock. Callers feed
//! it ticks and received messages with an explicit `now`, and publish the
//! messages it returns. That keeps every transition reproducible in tests.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::action::{NegotiationAction, NegotiationMessage};
use crate::config::NegotiationConfig;
use crate::partner::{PartnerStatus, StandbyPartners};
use crate::state::MasterJobState;

/// A state transition, passed to the registered callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: MasterJobState,
    pub to: MasterJobState,
}

/// The master currently observed by a standby instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterRecord {
    pub service_id: String,
    pub claimed_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Serializable view of the negotiation.
#[derive(Debug, Clone, Serialize)]
pub struct NegotiationStatistics {
    pub service_id: String,
    pub state: MasterJobState,
    pub is_master: bool,
    pub comms_confirmed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub master: Option<MasterRecord>,
    pub partners: Vec<PartnerStatus>,
}

type StateCallback = Box<dyn Fn(StateChange) + Send + Sync>;
type CommandCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Per-instance master-job negotiation.
pub struct Negotiator {
    service_id: String,
    config: NegotiationConfig,
    state: MasterJobState,
    /// When the current state was entered.
    state_since: Option<DateTime<Utc>>,
    started: bool,
    comms_confirmed: bool,
    last_received: Option<DateTime<Utc>>,
    claimed_at: Option<DateTime<Utc>>,
    master: Option<MasterRecord>,
    partners: StandbyPartners,
    on_state_change: Vec<StateCallback>,
    on_command_change: Vec<CommandCallback>,
}

impl Negotiator {
    pub fn new(service_id: impl Into<String>, config: NegotiationConfig) -> Self {
        let state = if config.enabled {
            MasterJobState::Inactive
        } else {
            MasterJobState::Disabled
        };
        Self {
            service_id: service_id.into(),
            config,
            state,
            state_since: None,
            started: false,
            comms_confirmed: false,
            last_received: None,
            claimed_at: None,
            master: None,
            partners: StandbyPartners::new(),
            on_state_change: Vec::new(),
            on_command_change: Vec::new(),
        }
    }

    /// Called on every state transition.
    pub fn on_state_change(mut self, callback: impl Fn(StateChange) + Send + Sync + 'static) -> Self {
        self.on_state_change.push(Box::new(callback));
        self
    }

    /// Called with `true` when this instance becomes master and `false` when
    /// it stops being master.
    pub fn on_command_change(mut self, callback: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_command_change.push(Box::new(callback));
        self
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    pub fn state(&self) -> MasterJobState {
        self.state
    }

    pub fn is_master(&self) -> bool {
        self.state.is_master()
    }

    pub fn master(&self) -> Option<&MasterRecord> {
        self.master.as_ref()
    }

    pub fn partners(&self) -> &StandbyPartners {
        &self.partners
    }

    pub fn claimed_at(&self) -> Option<DateTime<Utc>> {
        self.claimed_at
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Begin negotiating: query the channel with `WhoIsMaster`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Vec<NegotiationMessage> {
        if self.state == MasterJobState::Disabled || self.started {
            return Vec::new();
        }
        self.started = true;
        self.comms_confirmed = false;
        self.transition(MasterJobState::VerifyingComms, now);
        vec![self.outgoing(NegotiationAction::WhoIsMaster, now)]
    }

    /// Stop negotiating. A master hands the role back with `ResyncMaster` so
    /// standbys re-negotiate without waiting for the master timeout.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Vec<NegotiationMessage> {
        if !self.started {
            return Vec::new();
        }
        let out = if self.state.is_master() {
            vec![self.outgoing(NegotiationAction::ResyncMaster, now)]
        } else {
            Vec::new()
        };
        self.started = false;
        self.claimed_at = None;
        self.master = None;
        self.partners.clear();
        if self.state != MasterJobState::Disabled {
            self.transition(MasterJobState::Inactive, now);
        }
        out
    }

    /// Switch negotiation off. A master steps down first.
    pub fn disable(&mut self, now: DateTime<Utc>) -> Vec<NegotiationMessage> {
        let out = self.stop(now);
        self.transition(MasterJobState::Disabled, now);
        out
    }

    pub fn enable(&mut self, now: DateTime<Utc>) {
        if self.state == MasterJobState::Disabled {
            self.transition(MasterJobState::Inactive, now);
        }
    }

    /// Publishing failed: the channel cannot be trusted, so a master or an
    /// instance taking control goes back to re-claim.
    pub fn comms_failed(&mut self, now: DateTime<Utc>) -> Vec<NegotiationMessage> {
        self.comms_confirmed = false;
        if matches!(self.state, MasterJobState::TakingControl | MasterJobState::Active) {
            warn!(service_id = %self.service_id, state = %self.state, "comms lost, re-claiming");
            self.transition(MasterJobState::Requesting1, now);
            return vec![self.outgoing(NegotiationAction::RequestingControl1, now)];
        }
        Vec::new()
    }

    // ── Timer ────────────────────────────────────────────────────

    /// Advance the state machine on a timer tick.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<NegotiationMessage> {
        if !self.started {
            return Vec::new();
        }

        let pruned = self.partners.prune(now, self.config.partner_timeout());
        for id in pruned {
            warn!(service_id = %self.service_id, partner = %id, "standby partner dead");
        }

        let elapsed = self
            .state_since
            .map(|since| now.signed_duration_since(since))
            .unwrap_or_else(chrono::Duration::zero);

        match self.state {
            MasterJobState::Disabled => Vec::new(),

            MasterJobState::Inactive => {
                if self.master_alive(now) {
                    return vec![self.outgoing(NegotiationAction::IAmStandby, now)];
                }
                if let Some(master) = self.master.take() {
                    warn!(
                        service_id = %self.service_id,
                        master = %master.service_id,
                        "master silent past timeout, re-negotiating"
                    );
                }
                self.transition(MasterJobState::Starting, now);
                Vec::new()
            }

            MasterJobState::VerifyingComms => {
                if self.comms_confirmed {
                    self.transition(MasterJobState::Starting, now);
                    Vec::new()
                } else if elapsed >= self.config.comms_timeout() {
                    warn!(service_id = %self.service_id, "no traffic on negotiation channel, probing again");
                    self.state_since = Some(now);
                    vec![self.outgoing(NegotiationAction::WhoIsMaster, now)]
                } else {
                    Vec::new()
                }
            }

            MasterJobState::Starting => {
                if self.master_alive(now) {
                    self.transition(MasterJobState::Inactive, now);
                    return vec![self.outgoing(NegotiationAction::IAmStandby, now)];
                }
                if elapsed >= self.config.initial_wait() {
                    self.claimed_at = Some(now);
                    self.transition(MasterJobState::Requesting1, now);
                    return vec![self.outgoing(NegotiationAction::RequestingControl1, now)];
                }
                Vec::new()
            }

            MasterJobState::Requesting1 => {
                if elapsed >= self.config.request_interval() {
                    self.transition(MasterJobState::Requesting2, now);
                    return vec![self.outgoing(NegotiationAction::RequestingControl2, now)];
                }
                Vec::new()
            }

            MasterJobState::Requesting2 => {
                if elapsed >= self.config.request_interval() {
                    self.transition(MasterJobState::TakingControl, now);
                    return vec![self.outgoing(NegotiationAction::TakingControl, now)];
                }
                Vec::new()
            }

            MasterJobState::TakingControl | MasterJobState::Active => {
                if self.comms_silent(now) {
                    return self.comms_failed(now);
                }
                if self.state == MasterJobState::TakingControl {
                    self.master = None;
                    self.transition(MasterJobState::Active, now);
                }
                vec![self.outgoing(NegotiationAction::IAmMaster, now)]
            }
        }
    }

    // ── Receive ──────────────────────────────────────────────────

    /// Note that something arrived on the channel, decodable or not.
    pub fn note_received(&mut self, now: DateTime<Utc>) {
        if !self.comms_confirmed {
            debug!(service_id = %self.service_id, "negotiation comms confirmed");
        }
        self.comms_confirmed = true;
        self.last_received = Some(now);
    }

    /// React to a message from the channel, including this instance's own
    /// echoes.
    pub fn handle(&mut self, msg: &NegotiationMessage, now: DateTime<Utc>) -> Vec<NegotiationMessage> {
        if self.state == MasterJobState::Disabled || !self.started {
            return Vec::new();
        }
        self.note_received(now);
        if msg.service_id == self.service_id {
            return Vec::new();
        }

        match msg.action {
            NegotiationAction::WhoIsMaster => {
                if self.state.is_master() {
                    vec![self.outgoing(NegotiationAction::IAmMaster, now)]
                } else {
                    Vec::new()
                }
            }

            NegotiationAction::RequestingControl1
            | NegotiationAction::RequestingControl2
            | NegotiationAction::TakingControl => self.handle_claim(msg, now),

            NegotiationAction::IAmMaster => self.handle_master(msg, now),

            NegotiationAction::IAmStandby => {
                if self.partners.record(&msg.service_id, now) {
                    info!(service_id = %self.service_id, partner = %msg.service_id, "standby partner joined");
                }
                Vec::new()
            }

            NegotiationAction::ResyncMaster => {
                if matches!(self.state, MasterJobState::TakingControl | MasterJobState::Active) {
                    info!(service_id = %self.service_id, from = %msg.service_id, "resync requested, re-claiming");
                    self.transition(MasterJobState::Requesting1, now);
                    return vec![self.outgoing(NegotiationAction::RequestingControl1, now)];
                }
                if self
                    .master
                    .as_ref()
                    .is_some_and(|m| m.service_id == msg.service_id)
                {
                    self.master = None;
                    self.transition(MasterJobState::Starting, now);
                }
                Vec::new()
            }
        }
    }

    fn handle_claim(&mut self, msg: &NegotiationMessage, now: DateTime<Utc>) -> Vec<NegotiationMessage> {
        match self.state {
            MasterJobState::Active => vec![self.outgoing(NegotiationAction::IAmMaster, now)],
            MasterJobState::Requesting1 | MasterJobState::Requesting2 | MasterJobState::TakingControl => {
                if self.peer_precedes(msg.claim(), &msg.service_id) {
                    info!(
                        service_id = %self.service_id,
                        contender = %msg.service_id,
                        "yielding to earlier claim"
                    );
                    self.claimed_at = None;
                    self.transition(MasterJobState::Starting, now);
                }
                Vec::new()
            }
            MasterJobState::Starting => {
                // Someone is claiming: wait a full initial period again.
                self.state_since = Some(now);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn handle_master(&mut self, msg: &NegotiationMessage, now: DateTime<Utc>) -> Vec<NegotiationMessage> {
        let claim = msg.claim();
        if self.state.is_claiming() || self.state.is_master() {
            if !self.peer_precedes(claim, &msg.service_id) {
                // Ours is the earlier claim: assert it.
                return if self.state.is_master() {
                    vec![self.outgoing(NegotiationAction::IAmMaster, now)]
                } else {
                    Vec::new()
                };
            }
            warn!(
                service_id = %self.service_id,
                master = %msg.service_id,
                state = %self.state,
                "peer master has precedence, standing down"
            );
            self.claimed_at = None;
        }

        let known = self
            .master
            .as_ref()
            .is_some_and(|m| m.service_id == msg.service_id);
        self.master = Some(MasterRecord {
            service_id: msg.service_id.clone(),
            claimed_at: claim,
            last_seen: now,
        });

        if self.state == MasterJobState::Inactive && known {
            return Vec::new();
        }
        if self.state != MasterJobState::Inactive {
            self.transition(MasterJobState::Inactive, now);
        }
        info!(service_id = %self.service_id, master = %msg.service_id, "standing by for master");
        vec![self.outgoing(NegotiationAction::IAmStandby, now)]
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// Earlier claim wins; equal claims go to the lower service id. An
    /// instance without a claim never precedes anyone.
    fn peer_precedes(&self, peer_claim: DateTime<Utc>, peer_id: &str) -> bool {
        match self.claimed_at {
            Some(ours) => (peer_claim, peer_id) < (ours, self.service_id.as_str()),
            None => true,
        }
    }

    fn master_alive(&self, now: DateTime<Utc>) -> bool {
        self.master
            .as_ref()
            .is_some_and(|m| now.signed_duration_since(m.last_seen) <= self.config.master_timeout())
    }

    fn comms_silent(&self, now: DateTime<Utc>) -> bool {
        self.last_received
            .map_or(true, |last| now.signed_duration_since(last) > self.config.comms_timeout())
    }

    fn outgoing(&self, action: NegotiationAction, now: DateTime<Utc>) -> NegotiationMessage {
        let claimed_at = match action {
            NegotiationAction::RequestingControl1
            | NegotiationAction::RequestingControl2
            | NegotiationAction::TakingControl
            | NegotiationAction::IAmMaster => self.claimed_at,
            _ => None,
        };
        NegotiationMessage::new(action, self.service_id.clone(), claimed_at, now)
    }

    fn transition(&mut self, to: MasterJobState, now: DateTime<Utc>) {
        self.state_since = Some(now);
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(service_id = %self.service_id, %from, %to, "negotiation state changed");

        let change = StateChange { from, to };
        for callback in &self.on_state_change {
            callback(change);
        }
        if from.is_master() != to.is_master() {
            for callback in &self.on_command_change {
                callback(to.is_master());
            }
        }
    }

    pub fn statistics(&self, now: DateTime<Utc>) -> NegotiationStatistics {
        NegotiationStatistics {
            service_id: self.service_id.clone(),
            state: self.state,
            is_master: self.is_master(),
            comms_confirmed: self.comms_confirmed,
            claimed_at: self.claimed_at,
            master: self.master.clone(),
            partners: self.partners.statuses(now, self.config.partner_timeout()),
        }
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("service_id", &self.service_id)
            .field("state", &self.state)
            .field("comms_confirmed", &self.comms_confirmed)
            .field("claimed_at", &self.claimed_at)
            .field("master", &self.master)
            .field("partners", &self.partners.len())
            .finish()
    }
}
