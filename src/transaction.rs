//! Append-only offer transaction log entries
use crate::types::TimeStamp;
use chrono::Utc;

/// A single offer event in a negotiation. Immutable once appended; the log
/// is ordered by `created_at` with insertion order as the tiebreak, so
/// entries are only ever created sequentially under the property lock.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OfferTransaction {
    #[n(0)]
    pub negotiation_id: String,
    #[n(1)]
    pub offer_amount: u64,
    #[n(2)]
    pub made_by: String,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
}

impl OfferTransaction {
    pub fn new(negotiation_id: String, offer_amount: u64, made_by: String) -> Self {
        Self::new_at(negotiation_id, offer_amount, made_by, TimeStamp::new())
    }

    pub fn new_at(
        negotiation_id: String,
        offer_amount: u64,
        made_by: String,
        created_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            negotiation_id,
            offer_amount,
            made_by,
            created_at,
        }
    }
}
