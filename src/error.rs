//! Error taxonomy for offer negotiation
use crate::types::{NegotiationStatus, PartyRole};
use chrono::{DateTime, Utc};

/// Every domain rule violation the negotiation engine can refuse a request
/// with. All variants are detected before any state is written.
#[derive(thiserror::Error, Debug)]
pub enum NegotiationError {
    #[error("property {0} not found")]
    PropertyNotFound(String),

    #[error("negotiation {0} not found")]
    NegotiationNotFound(String),

    #[error("user {user_id} is neither the buyer nor the seller on this negotiation")]
    Unauthorized { user_id: String },

    #[error("cannot make an offer on your own property")]
    OwnProperty,

    #[error("an active negotiation for this buyer and property already exists")]
    ActiveNegotiationExists,

    #[error("cannot {action} your own offer, awaiting {waiting_on} response")]
    WrongTurn {
        action: &'static str,
        waiting_on: PartyRole,
    },

    #[error("only the author of the most recent offer may cancel it")]
    NotLastOfferer,

    #[error("cannot update: negotiation is already {status}")]
    AlreadyTerminal { status: NegotiationStatus },

    #[error("negotiation {negotiation_id} does not belong to property {property_id}")]
    PropertyMismatch {
        negotiation_id: String,
        property_id: String,
    },

    #[error("cooling-off window elapsed: accepted at {accepted_at}, expired at {expires_at}")]
    CoolingOffExpired {
        accepted_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },

    #[error("accepted negotiation is missing its acceptance timestamp")]
    CorruptAcceptance,

    #[error("negotiation has no offer transactions")]
    EmptyLog,

    #[error("action must be 'accept', 'reject', or 'cancel', got '{0}'")]
    InvalidAction(String),
}
