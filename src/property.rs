//! Property records and the sale-status gate
//!
//! The property's sale status is not an independent state machine: it is
//! mutated only as a side effect of negotiation transitions (acceptance,
//! cancellation, cooling-off reversal). Listing CRUD beyond the minimal
//! record the negotiation core needs lives outside this crate.
use crate::types::{PropertyStatus, TimeStamp};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    #[n(0)]
    pub property_id: String,
    #[n(1)]
    pub seller_id: String,
    #[n(2)]
    pub price: u64,
    #[n(3)]
    pub status: PropertyStatus,
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
}

impl PropertyRecord {
    pub fn new(property_id: String, seller_id: String, price: u64) -> Self {
        Self {
            property_id,
            seller_id,
            price,
            status: PropertyStatus::ForSale,
            created_at: TimeStamp::new(),
        }
    }
}
