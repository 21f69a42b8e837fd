//! Master-job negotiation: elects one active master among the instances of a
//! service over a broadcast channel, and runs the singleton jobs registered
//! for the master only while this instance holds the role.

pub mod action;
pub mod bus;
pub mod config;
pub mod error;
pub mod message;
pub mod negotiator;
pub mod partner;
pub mod pubsub;
pub mod runner;
pub mod state;
pub mod traits;
pub mod transport;

pub use action::{NegotiationAction, NegotiationMessage, WireNegotiation};
pub use bus::{LocalBus, LocalEndpoint};
pub use config::NegotiationConfig;
pub use error::NegotiationError;
pub use message::Message;
pub use negotiator::{MasterRecord, NegotiationStatistics, Negotiator, StateChange};
pub use partner::{PartnerStatus, StandbyPartners};
pub use pubsub::{ZmqPublisher, ZmqSubscriber};
pub use runner::{MasterJob, MasterJobRegistry, NegotiationRunner};
pub use state::MasterJobState;
pub use traits::{EventPublisher, EventSubscriber};
pub use transport::Transport;
