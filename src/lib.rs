//! Offer-negotiation engine for a property-listing marketplace
//!
//! Buyers open negotiations on listed properties, both parties trade
//! counter-offers through an append-only transaction log, and acceptance,
//! rejection, cancellation-with-rollback, and the post-acceptance
//! cooling-off window are all driven by the state machine in
//! [`negotiation`], persisted through [`service`].

pub mod error;
pub mod negotiation;
pub mod property;
pub mod service;
pub mod transaction;
pub mod types;
pub mod utils;
