//! Negotiation aggregate and its transition logic
//!
//! A negotiation and its offer transaction log are stored and mutated as one
//! aggregate. All transition rules live here as pure methods so they can be
//! exercised without a database; the service layer only adds loading, the
//! property-status side effects, and persistence.
use crate::error::NegotiationError;
use crate::transaction::OfferTransaction;
use crate::types::{role_of, NegotiationStatus, PartyRole, RejectionReason, TimeStamp};
use chrono::Utc;

/// Informational buyer context carried on a negotiation. No transition
/// logic reads these fields.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct BuyerTerms {
    #[n(0)]
    pub move_in_date: Option<TimeStamp<Utc>>,
    #[n(1)]
    pub financing: Option<FinancingStatus>,
    #[n(2)]
    pub notes: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinancingStatus {
    #[n(0)]
    CashBuyer,
    #[n(1)]
    MortgageInPrinciple,
    #[n(2)]
    MortgageRequired,
}

/// How a cancel request resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The whole negotiation was cancelled.
    Cancelled,
    /// The cancelled counter-offer was rolled back to the most recent offer
    /// from the opposing party, which is now `last_offer_by`.
    RolledBack { to: String },
}

/// One negotiation between a buyer and the seller of a property, embedding
/// its full append-only offer log.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct NegotiationRecord {
    #[n(0)]
    pub negotiation_id: String,
    #[n(1)]
    pub property_id: String,
    #[n(2)]
    pub buyer_id: String,
    #[n(3)]
    pub status: NegotiationStatus,
    #[n(4)]
    pub last_offer_by: String,
    #[n(5)]
    pub accepted_by: Option<String>,
    #[n(6)]
    pub accepted_at: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub rejected_by: Option<String>,
    #[n(8)]
    pub rejected_at: Option<TimeStamp<Utc>>,
    #[n(9)]
    pub rejection_reason: Option<RejectionReason>,
    #[n(10)]
    pub cancelled_at: Option<TimeStamp<Utc>>,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
    #[n(12)]
    pub updated_at: TimeStamp<Utc>,
    #[n(13)]
    pub terms: Option<BuyerTerms>,
    #[n(14)]
    pub transactions: Vec<OfferTransaction>,
    /// Indices into `transactions` of offers that were cancelled. The log
    /// itself is append-only and its entries immutable, so cancellation is
    /// recorded here on the aggregate instead of on the entries.
    #[n(15)]
    pub cancelled_offers: Vec<u32>,
}

impl NegotiationRecord {
    /// Open a new negotiation with its first offer. The first transaction is
    /// always the buyer's, so `last_offer_by` starts as the buyer.
    pub fn open(
        negotiation_id: String,
        property_id: String,
        buyer_id: String,
        offer_amount: u64,
        terms: Option<BuyerTerms>,
    ) -> Self {
        let now = TimeStamp::new();
        let first = OfferTransaction::new_at(
            negotiation_id.clone(),
            offer_amount,
            buyer_id.clone(),
            now.clone(),
        );

        Self {
            negotiation_id,
            property_id,
            buyer_id: buyer_id.clone(),
            status: NegotiationStatus::Active,
            last_offer_by: buyer_id,
            accepted_by: None,
            accepted_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            cancelled_at: None,
            created_at: now.clone(),
            updated_at: now,
            terms,
            transactions: vec![first],
            cancelled_offers: Vec::new(),
        }
    }

    /// Role of `actor_id` on this negotiation, given the property's seller.
    pub fn role_of(&self, seller_id: &str, actor_id: &str) -> Option<PartyRole> {
        role_of(seller_id, &self.buyer_id, actor_id)
    }

    /// Whether the log entry at `idx` has been cancelled.
    pub fn is_cancelled(&self, idx: usize) -> bool {
        self.cancelled_offers.contains(&(idx as u32))
    }

    /// The log entries still in play, oldest first.
    pub fn live_transactions(&self) -> impl Iterator<Item = &OfferTransaction> {
        self.transactions
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.is_cancelled(*idx))
            .map(|(_, t)| t)
    }

    fn latest_live_transaction(&self) -> Option<(usize, &OfferTransaction)> {
        self.transactions
            .iter()
            .enumerate()
            .rev()
            .find(|(idx, _)| !self.is_cancelled(*idx))
    }

    /// The offer currently on the table: the latest transaction that has not
    /// been cancelled. After a cancel-rollback this is the prior opposing
    /// offer, not the log tail. When the whole negotiation was cancelled off
    /// its only live offer, the raw tail is reported as history.
    pub fn current_offer(&self) -> Option<&OfferTransaction> {
        self.latest_live_transaction()
            .map(|(_, t)| t)
            .or_else(|| self.transactions.last())
    }

    /// Who the negotiation is waiting on: the party opposite `last_offer_by`.
    pub fn awaiting_response_from(&self, seller_id: &str) -> Option<PartyRole> {
        self.role_of(seller_id, &self.last_offer_by)
            .map(|role| role.other())
    }

    /// Append a counter-offer from either party. Any terminal status other
    /// than `Accepted` is reactivated: submitting a counter implicitly
    /// resumes the negotiation. An accepted negotiation can only be exited
    /// through the cooling-off reject.
    pub fn counter_offer(
        &mut self,
        seller_id: &str,
        actor_id: &str,
        offer_amount: u64,
        now: TimeStamp<Utc>,
    ) -> Result<(), NegotiationError> {
        self.role_of(seller_id, actor_id)
            .ok_or_else(|| NegotiationError::Unauthorized {
                user_id: actor_id.to_string(),
            })?;

        if self.status == NegotiationStatus::Accepted {
            return Err(NegotiationError::AlreadyTerminal {
                status: self.status,
            });
        }

        self.transactions.push(OfferTransaction::new_at(
            self.negotiation_id.clone(),
            offer_amount,
            actor_id.to_string(),
            now.clone(),
        ));
        self.last_offer_by = actor_id.to_string();
        self.status = NegotiationStatus::Active;
        self.updated_at = now;

        Ok(())
    }

    /// Accept the offer currently on the table. Property status and sibling
    /// rejection side effects are applied by the service.
    pub fn accept(
        &mut self,
        seller_id: &str,
        actor_id: &str,
        now: TimeStamp<Utc>,
    ) -> Result<(), NegotiationError> {
        self.respond_guard(seller_id, actor_id, "accept")?;

        self.status = NegotiationStatus::Accepted;
        self.accepted_by = Some(actor_id.to_string());
        self.accepted_at = Some(now.clone());
        self.updated_at = now;

        Ok(())
    }

    /// Reject the offer currently on the table.
    pub fn reject(
        &mut self,
        seller_id: &str,
        actor_id: &str,
        now: TimeStamp<Utc>,
    ) -> Result<(), NegotiationError> {
        self.respond_guard(seller_id, actor_id, "reject")?;

        self.status = NegotiationStatus::Rejected;
        self.rejected_by = Some(actor_id.to_string());
        self.rejected_at = Some(now.clone());
        self.rejection_reason = Some(RejectionReason::Declined);
        self.updated_at = now;

        Ok(())
    }

    /// Force-reject an active negotiation because a sibling negotiation on
    /// the same property was accepted. Attributed to the seller. No-op
    /// guards apply at the call site, not here.
    pub fn supersede(&mut self, seller_id: &str, now: TimeStamp<Utc>) {
        self.status = NegotiationStatus::Rejected;
        self.rejected_by = Some(seller_id.to_string());
        self.rejected_at = Some(now.clone());
        self.rejection_reason = Some(RejectionReason::Superseded);
        self.updated_at = now;
    }

    /// Reject an already-accepted negotiation inside the cooling-off
    /// window. The only edge out of `Accepted`, open to either party
    /// regardless of whose offer was last.
    pub fn reject_accepted(
        &mut self,
        seller_id: &str,
        actor_id: &str,
        window: chrono::Duration,
        now: TimeStamp<Utc>,
    ) -> Result<(), NegotiationError> {
        self.role_of(seller_id, actor_id)
            .ok_or_else(|| NegotiationError::Unauthorized {
                user_id: actor_id.to_string(),
            })?;

        let accepted_at = self
            .accepted_at
            .as_ref()
            .ok_or(NegotiationError::CorruptAcceptance)?
            .to_datetime_utc();
        let expires_at = accepted_at + window;

        if now.to_datetime_utc() > expires_at {
            return Err(NegotiationError::CoolingOffExpired {
                accepted_at,
                expires_at,
            });
        }

        self.status = NegotiationStatus::Rejected;
        self.rejected_by = Some(actor_id.to_string());
        self.rejected_at = Some(now.clone());
        self.rejection_reason = Some(RejectionReason::CoolingOff);
        self.updated_at = now;

        Ok(())
    }

    /// Cancel the actor's own most recent live offer.
    ///
    /// If the cancelled offer is the negotiation's first (and therefore the
    /// buyer's), the whole negotiation is cancelled. Otherwise the
    /// negotiation rolls back to the most recent offer from the opposing
    /// party and stays active. A missing opposing offer falls back to
    /// cancelling the negotiation.
    pub fn cancel(
        &mut self,
        seller_id: &str,
        actor_id: &str,
        now: TimeStamp<Utc>,
    ) -> Result<CancelOutcome, NegotiationError> {
        let role = self
            .role_of(seller_id, actor_id)
            .ok_or_else(|| NegotiationError::Unauthorized {
                user_id: actor_id.to_string(),
            })?;

        if self.status.is_terminal() {
            return Err(NegotiationError::AlreadyTerminal {
                status: self.status,
            });
        }

        let last_role = self
            .role_of(seller_id, &self.last_offer_by)
            .ok_or(NegotiationError::EmptyLog)?;
        if role != last_role {
            return Err(NegotiationError::NotLastOfferer);
        }

        let (cancel_idx, _) = self
            .latest_live_transaction()
            .ok_or(NegotiationError::EmptyLog)?;

        // A chain of cancels unwinds the log one live entry at a time, so
        // the buyer taking back the opening offer means the opening offer is
        // the last one standing, not that the log has a single entry.
        if cancel_idx == 0 && role == PartyRole::Buyer {
            self.status = NegotiationStatus::Cancelled;
            self.cancelled_at = Some(now.clone());
            self.updated_at = now;
            return Ok(CancelOutcome::Cancelled);
        }

        self.cancelled_offers.push(cancel_idx as u32);

        // Roll back to the most recent live offer by the other party. The
        // log is append-only, so the cancelled entry stays; its index lands
        // in `cancelled_offers` and `last_offer_by` moves.
        let prior = self
            .transactions
            .iter()
            .enumerate()
            .rev()
            .filter(|(idx, _)| !self.is_cancelled(*idx))
            .find(|(_, t)| role_of(seller_id, &self.buyer_id, &t.made_by) == Some(role.other()))
            .map(|(_, t)| t.made_by.clone());

        match prior {
            Some(made_by) => {
                self.last_offer_by = made_by.clone();
                self.status = NegotiationStatus::Active;
                self.updated_at = now;
                Ok(CancelOutcome::RolledBack { to: made_by })
            }
            None => {
                // No live opposing offer to fall back to. Should not occur
                // in a well-formed log, since the alternative above catches
                // the buyer unwinding back to the opening offer.
                self.status = NegotiationStatus::Cancelled;
                self.cancelled_at = Some(now.clone());
                self.updated_at = now;
                Ok(CancelOutcome::Cancelled)
            }
        }
    }

    /// Common accept/reject preconditions: the actor must be a party to the
    /// negotiation, the negotiation must still be active, and the actor must
    /// not be responding to their own offer.
    fn respond_guard(
        &self,
        seller_id: &str,
        actor_id: &str,
        action: &'static str,
    ) -> Result<PartyRole, NegotiationError> {
        let role = self
            .role_of(seller_id, actor_id)
            .ok_or_else(|| NegotiationError::Unauthorized {
                user_id: actor_id.to_string(),
            })?;

        if self.status != NegotiationStatus::Active {
            return Err(NegotiationError::AlreadyTerminal {
                status: self.status,
            });
        }

        let last_role = self
            .role_of(seller_id, &self.last_offer_by)
            .ok_or(NegotiationError::EmptyLog)?;
        if role == last_role {
            return Err(NegotiationError::WrongTurn {
                action,
                waiting_on: role.other(),
            });
        }

        Ok(role)
    }
}
