//! Shared status, role, and timestamp types for the negotiation engine
use chrono::{DateTime, TimeZone, Utc};

/// Sale status of a property listing. Driven by negotiation transitions,
/// never edited directly through this crate.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyStatus {
    #[n(0)]
    ForSale,
    #[n(1)]
    UnderOffer,
    #[n(2)]
    Sold,
}

/// Lifecycle status of a negotiation. `Withdrawn` and `Expired` are part of
/// the taxonomy for withdrawal/timeout flows; the offer-action path never
/// sets them, but a counter-offer reactivates them like any other
/// non-accepted terminal status.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStatus {
    #[n(0)]
    Active,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Cancelled,
    #[n(4)]
    Withdrawn,
    #[n(5)]
    Expired,
}

impl NegotiationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NegotiationStatus::Active)
    }
}

/// Which side of the negotiation a user is on.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyRole {
    #[n(0)]
    Buyer,
    #[n(1)]
    Seller,
}

impl PartyRole {
    pub fn other(&self) -> PartyRole {
        match self {
            PartyRole::Buyer => PartyRole::Seller,
            PartyRole::Seller => PartyRole::Buyer,
        }
    }
}

/// Action requested against an existing negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferAction {
    Accept,
    Reject,
    Cancel,
}

impl OfferAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferAction::Accept => "accept",
            OfferAction::Reject => "reject",
            OfferAction::Cancel => "cancel",
        }
    }
}

impl std::str::FromStr for OfferAction {
    type Err = crate::error::NegotiationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(OfferAction::Accept),
            "reject" => Ok(OfferAction::Reject),
            "cancel" => Ok(OfferAction::Cancel),
            other => Err(crate::error::NegotiationError::InvalidAction(
                other.to_string(),
            )),
        }
    }
}

/// Distinguishes an ordinary rejection from the acceptance-superseded and
/// cooling-off paths in the audit trail.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    #[n(0)]
    Declined,
    #[n(1)]
    Superseded,
    #[n(2)]
    CoolingOff,
}

/// Resolve which role `actor_id` plays on a negotiation. The seller
/// comparison wins if a user somehow holds both ids.
pub fn role_of(seller_id: &str, buyer_id: &str, actor_id: &str) -> Option<PartyRole> {
    if actor_id == seller_id {
        Some(PartyRole::Seller)
    } else if actor_id == buyer_id {
        Some(PartyRole::Buyer)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl std::fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PropertyStatus::ForSale => "for_sale",
            PropertyStatus::UnderOffer => "under_offer",
            PropertyStatus::Sold => "sold",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NegotiationStatus::Active => "active",
            NegotiationStatus::Accepted => "accepted",
            NegotiationStatus::Rejected => "rejected",
            NegotiationStatus::Cancelled => "cancelled",
            NegotiationStatus::Withdrawn => "withdrawn",
            NegotiationStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PartyRole::Buyer => "buyer",
            PartyRole::Seller => "seller",
        };
        f.write_str(s)
    }
}
