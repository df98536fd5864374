//! Service layer API for negotiation workflow operations
//!
//! Orchestrates the pure transition logic in [`crate::negotiation`] against
//! a sled database. Every read-modify-write runs under a per-property lock
//! so that turn checks and the at-most-one-accepted invariant are evaluated
//! against a consistent snapshot, and multi-record transitions (acceptance
//! side effects, property reversion) are applied with a single batch.
use crate::error::NegotiationError;
use crate::negotiation::{BuyerTerms, CancelOutcome, NegotiationRecord};
use crate::property::PropertyRecord;
use crate::transaction::OfferTransaction;
use crate::types::{NegotiationStatus, OfferAction, PartyRole, PropertyStatus, TimeStamp};
use crate::utils;
use chrono::Utc;
use sled::Batch;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Tunable negotiation constraints.
pub struct NegotiationPolicy {
    /// How long after acceptance either party may still back out.
    pub cooling_off: chrono::Duration,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            cooling_off: chrono::Duration::hours(24),
        }
    }
}

pub struct NegotiationService {
    instance: Arc<sled::Db>,
    policy: NegotiationPolicy,
    property_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Response to a submitted or countered offer.
#[derive(Debug, Clone)]
pub struct OfferOutcome {
    pub negotiation_id: String,
    pub property_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub current_offer: u64,
    pub status: NegotiationStatus,
    pub last_offer_by: String,
    pub awaiting_response_from: Option<PartyRole>,
}

/// Response to an accept/reject/cancel action.
#[derive(Debug, Clone)]
pub struct StatusOutcome {
    pub negotiation_id: String,
    pub property_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub status: NegotiationStatus,
    pub property_status: PropertyStatus,
    pub current_offer: u64,
    pub last_offer_by: String,
    pub action_by: String,
    pub updated_at: TimeStamp<Utc>,
}

/// One negotiation as shown on a user's dashboard, with its full
/// chronological offer history.
#[derive(Debug, Clone)]
pub struct DashboardEntry {
    pub negotiation_id: String,
    pub property_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub status: NegotiationStatus,
    pub current_offer: u64,
    pub awaiting_response_from: Option<PartyRole>,
    pub transactions: Vec<OfferTransaction>,
}

#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    pub user_id: String,
    pub listed_properties: Vec<PropertyRecord>,
    pub negotiations_as_buyer: Vec<DashboardEntry>,
    pub negotiations_as_seller: Vec<DashboardEntry>,
}

impl NegotiationService {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self::with_policy(instance, NegotiationPolicy::default())
    }

    pub fn with_policy(instance: Arc<sled::Db>, policy: NegotiationPolicy) -> Self {
        Self {
            instance,
            policy,
            property_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a property listing for a seller.
    pub fn list_property(&self, seller_id: &str, price: u64) -> anyhow::Result<PropertyRecord> {
        let property_id = utils::new_uuid_to_bech32(utils::PROPERTY_PREFIX)?;
        let record = PropertyRecord::new(property_id, seller_id.to_string(), price);

        self.instance
            .insert(record.property_id.as_bytes(), minicbor::to_vec(&record)?)?;

        tracing::info!(
            "listed property {} for seller {}",
            record.property_id,
            record.seller_id
        );

        Ok(record)
    }

    pub fn get_property(&self, property_id: &str) -> anyhow::Result<PropertyRecord> {
        self.load_property(property_id)
    }

    pub fn get_negotiation(&self, negotiation_id: &str) -> anyhow::Result<NegotiationRecord> {
        self.load_negotiation(negotiation_id)
    }

    /// Submit a new offer on a property, or a counter-offer into an
    /// existing negotiation when `negotiation_id` is given.
    pub fn submit_offer(
        &self,
        actor_id: &str,
        property_id: &str,
        offer_amount: u64,
        negotiation_id: Option<&str>,
        terms: Option<BuyerTerms>,
    ) -> anyhow::Result<OfferOutcome> {
        let lock = self.property_lock(property_id);
        let _guard = lock.lock().expect("property lock poisoned");

        let property = self.load_property(property_id)?;

        let negotiation = match negotiation_id {
            Some(id) => {
                let mut negotiation = self.load_negotiation(id)?;
                if negotiation.property_id != property_id {
                    return Err(NegotiationError::PropertyMismatch {
                        negotiation_id: id.to_string(),
                        property_id: property_id.to_string(),
                    }
                    .into());
                }

                negotiation.counter_offer(
                    &property.seller_id,
                    actor_id,
                    offer_amount,
                    TimeStamp::new(),
                )?;
                self.save_negotiation(&negotiation)?;

                tracing::info!(
                    "counter-offer of {} by {} on negotiation {}",
                    offer_amount,
                    actor_id,
                    negotiation.negotiation_id
                );

                negotiation
            }
            None => {
                if actor_id == property.seller_id {
                    return Err(NegotiationError::OwnProperty.into());
                }
                if self
                    .find_active_negotiation(property_id, actor_id)?
                    .is_some()
                {
                    return Err(NegotiationError::ActiveNegotiationExists.into());
                }

                let negotiation_id = utils::new_uuid_to_bech32(utils::NEGOTIATION_PREFIX)?;
                let negotiation = NegotiationRecord::open(
                    negotiation_id,
                    property_id.to_string(),
                    actor_id.to_string(),
                    offer_amount,
                    terms,
                );
                self.save_negotiation(&negotiation)?;

                tracing::info!(
                    "opened negotiation {} on property {} with offer {}",
                    negotiation.negotiation_id,
                    property_id,
                    offer_amount
                );

                negotiation
            }
        };

        Self::offer_outcome(&negotiation, &property)
    }

    /// Accept, reject, or cancel the offer currently on the table.
    pub fn update_offer_status(
        &self,
        actor_id: &str,
        negotiation_id: &str,
        action: OfferAction,
    ) -> anyhow::Result<StatusOutcome> {
        // First read only locates the property; the authoritative re-read
        // happens under the property lock.
        let property_id = self.load_negotiation(negotiation_id)?.property_id;
        let lock = self.property_lock(&property_id);
        let _guard = lock.lock().expect("property lock poisoned");

        let mut negotiation = self.load_negotiation(negotiation_id)?;
        let mut property = self.load_property(&negotiation.property_id)?;
        let now = TimeStamp::new();
        let mut batch = Batch::default();

        match action {
            OfferAction::Accept => {
                negotiation.accept(&property.seller_id, actor_id, now.clone())?;
                property.status = PropertyStatus::UnderOffer;

                // At most one accepted negotiation per property: every other
                // active negotiation is force-rejected by the seller.
                for mut sibling in self.negotiations_for_property(&property.property_id)? {
                    if sibling.negotiation_id != negotiation.negotiation_id
                        && sibling.status == NegotiationStatus::Active
                    {
                        sibling.supersede(&property.seller_id, now.clone());
                        batch.insert(
                            sibling.negotiation_id.as_bytes(),
                            minicbor::to_vec(&sibling)?,
                        );
                        tracing::info!(
                            "negotiation {} superseded by acceptance of {}",
                            sibling.negotiation_id,
                            negotiation.negotiation_id
                        );
                    }
                }

                batch.insert(property.property_id.as_bytes(), minicbor::to_vec(&property)?);
                tracing::info!(
                    "negotiation {} accepted by {}, property {} under offer",
                    negotiation.negotiation_id,
                    actor_id,
                    property.property_id
                );
            }
            OfferAction::Reject => {
                if negotiation.status == NegotiationStatus::Accepted {
                    negotiation.reject_accepted(
                        &property.seller_id,
                        actor_id,
                        self.policy.cooling_off,
                        now.clone(),
                    )?;
                    if property.status == PropertyStatus::UnderOffer
                        && !self.has_accepted_sibling(
                            &property.property_id,
                            &negotiation.negotiation_id,
                        )?
                    {
                        property.status = PropertyStatus::ForSale;
                        batch.insert(
                            property.property_id.as_bytes(),
                            minicbor::to_vec(&property)?,
                        );
                    }
                    tracing::info!(
                        "accepted negotiation {} reversed by {} within cooling-off window",
                        negotiation.negotiation_id,
                        actor_id
                    );
                } else {
                    negotiation.reject(&property.seller_id, actor_id, now.clone())?;
                    tracing::info!(
                        "negotiation {} rejected by {}",
                        negotiation.negotiation_id,
                        actor_id
                    );
                }
            }
            OfferAction::Cancel => {
                let outcome = negotiation.cancel(&property.seller_id, actor_id, now.clone())?;
                match outcome {
                    CancelOutcome::Cancelled => {
                        if property.status == PropertyStatus::UnderOffer
                            && !self.has_accepted_sibling(
                                &property.property_id,
                                &negotiation.negotiation_id,
                            )?
                        {
                            property.status = PropertyStatus::ForSale;
                            batch.insert(
                                property.property_id.as_bytes(),
                                minicbor::to_vec(&property)?,
                            );
                        }
                        tracing::info!(
                            "negotiation {} cancelled by {}",
                            negotiation.negotiation_id,
                            actor_id
                        );
                    }
                    CancelOutcome::RolledBack { ref to } => {
                        tracing::info!(
                            "counter-offer on negotiation {} cancelled by {}, reverted to offer by {}",
                            negotiation.negotiation_id,
                            actor_id,
                            to
                        );
                    }
                }
            }
        }

        batch.insert(
            negotiation.negotiation_id.as_bytes(),
            minicbor::to_vec(&negotiation)?,
        );
        self.instance.apply_batch(batch)?;

        let current_offer = negotiation
            .current_offer()
            .ok_or(NegotiationError::EmptyLog)?
            .offer_amount;

        Ok(StatusOutcome {
            negotiation_id: negotiation.negotiation_id.clone(),
            property_id: property.property_id.clone(),
            buyer_id: negotiation.buyer_id.clone(),
            seller_id: property.seller_id.clone(),
            status: negotiation.status,
            property_status: property.status,
            current_offer,
            last_offer_by: negotiation.last_offer_by.clone(),
            action_by: actor_id.to_string(),
            updated_at: negotiation.updated_at.clone(),
        })
    }

    /// Everything a user sees on their dashboard: the properties they have
    /// listed and every negotiation they are a party to, with full offer
    /// histories.
    pub fn dashboard(&self, user_id: &str) -> anyhow::Result<Dashboard> {
        let mut dashboard = Dashboard {
            user_id: user_id.to_string(),
            ..Dashboard::default()
        };

        let mut sellers: HashMap<String, String> = HashMap::new();
        for entry in self.instance.scan_prefix(utils::PROPERTY_PREFIX.as_bytes()) {
            let (_, bytes) = entry?;
            let property: PropertyRecord = minicbor::decode(bytes.as_ref())?;
            sellers.insert(property.property_id.clone(), property.seller_id.clone());
            if property.seller_id == user_id {
                dashboard.listed_properties.push(property);
            }
        }

        for entry in self
            .instance
            .scan_prefix(utils::NEGOTIATION_PREFIX.as_bytes())
        {
            let (_, bytes) = entry?;
            let negotiation: NegotiationRecord = minicbor::decode(bytes.as_ref())?;
            let Some(seller_id) = sellers.get(&negotiation.property_id) else {
                tracing::warn!(
                    "negotiation {} references missing property {}",
                    negotiation.negotiation_id,
                    negotiation.property_id
                );
                continue;
            };

            let is_buyer = negotiation.buyer_id == user_id;
            let is_seller = seller_id == user_id;
            if !is_buyer && !is_seller {
                continue;
            }

            let entry = DashboardEntry {
                negotiation_id: negotiation.negotiation_id.clone(),
                property_id: negotiation.property_id.clone(),
                buyer_id: negotiation.buyer_id.clone(),
                seller_id: seller_id.clone(),
                status: negotiation.status,
                current_offer: negotiation
                    .current_offer()
                    .ok_or(NegotiationError::EmptyLog)?
                    .offer_amount,
                awaiting_response_from: negotiation.awaiting_response_from(seller_id),
                transactions: negotiation.transactions.clone(),
            };

            if is_buyer {
                dashboard.negotiations_as_buyer.push(entry);
            } else {
                dashboard.negotiations_as_seller.push(entry);
            }
        }

        Ok(dashboard)
    }

    /// All negotiations ever opened on a property.
    pub fn negotiations_for_property(
        &self,
        property_id: &str,
    ) -> anyhow::Result<Vec<NegotiationRecord>> {
        let mut out = Vec::new();
        for entry in self
            .instance
            .scan_prefix(utils::NEGOTIATION_PREFIX.as_bytes())
        {
            let (_, bytes) = entry?;
            let record: NegotiationRecord = minicbor::decode(bytes.as_ref())?;
            if record.property_id == property_id {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn find_active_negotiation(
        &self,
        property_id: &str,
        buyer_id: &str,
    ) -> anyhow::Result<Option<NegotiationRecord>> {
        Ok(self
            .negotiations_for_property(property_id)?
            .into_iter()
            .find(|n| n.buyer_id == buyer_id && n.status == NegotiationStatus::Active))
    }

    fn has_accepted_sibling(
        &self,
        property_id: &str,
        negotiation_id: &str,
    ) -> anyhow::Result<bool> {
        Ok(self
            .negotiations_for_property(property_id)?
            .iter()
            .any(|n| {
                n.negotiation_id != negotiation_id && n.status == NegotiationStatus::Accepted
            }))
    }

    fn load_property(&self, property_id: &str) -> anyhow::Result<PropertyRecord> {
        let bytes = self
            .instance
            .get(property_id.as_bytes())?
            .ok_or_else(|| NegotiationError::PropertyNotFound(property_id.to_string()))?;
        Ok(minicbor::decode(bytes.as_ref())?)
    }

    fn load_negotiation(&self, negotiation_id: &str) -> anyhow::Result<NegotiationRecord> {
        let bytes = self
            .instance
            .get(negotiation_id.as_bytes())?
            .ok_or_else(|| NegotiationError::NegotiationNotFound(negotiation_id.to_string()))?;
        Ok(minicbor::decode(bytes.as_ref())?)
    }

    fn save_negotiation(&self, negotiation: &NegotiationRecord) -> anyhow::Result<()> {
        self.instance.insert(
            negotiation.negotiation_id.as_bytes(),
            minicbor::to_vec(negotiation)?,
        )?;
        Ok(())
    }

    /// One lock per property id. The lock scopes the negotiation, its log,
    /// its siblings, and the property status together, which is what the
    /// at-most-one-accepted invariant needs.
    fn property_lock(&self, property_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .property_locks
            .lock()
            .expect("property lock registry poisoned");
        locks.entry(property_id.to_string()).or_default().clone()
    }

    fn offer_outcome(
        negotiation: &NegotiationRecord,
        property: &PropertyRecord,
    ) -> anyhow::Result<OfferOutcome> {
        let current_offer = negotiation
            .current_offer()
            .ok_or(NegotiationError::EmptyLog)?
            .offer_amount;

        Ok(OfferOutcome {
            negotiation_id: negotiation.negotiation_id.clone(),
            property_id: property.property_id.clone(),
            buyer_id: negotiation.buyer_id.clone(),
            seller_id: property.seller_id.clone(),
            current_offer,
            status: negotiation.status,
            last_offer_by: negotiation.last_offer_by.clone(),
            awaiting_response_from: negotiation.awaiting_response_from(&property.seller_id),
        })
    }
}
