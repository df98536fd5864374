//! End-to-end negotiation scenarios against a real sled database.

use anyhow::Context;
use property_negotiation::{
    error::NegotiationError,
    service::{NegotiationPolicy, NegotiationService},
    types::{NegotiationStatus, OfferAction, PartyRole, PropertyStatus},
    utils,
};
use sled::open;
use std::sync::Arc;

use tempfile::tempdir; // Use for test db cleanup.

/// Sled uses file-based locking to prevent concurrent access, so as is good
/// practice in testing each test gets its own database on temp storage for
/// simplified cleanup.
fn test_service(name: &str) -> anyhow::Result<(NegotiationService, tempfile::TempDir)> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join(name);
    let db = Arc::new(open(db_path)?);
    db.clear()?;

    Ok((NegotiationService::new(db), temp_dir))
}

#[test]
fn buyer_opens_negotiation_on_listed_property() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_open_negotiation.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;
    assert_eq!(property.status, PropertyStatus::ForSale);

    let outcome = service
        .submit_offer(&buyer_id, &property.property_id, 300_000, None, None)
        .context("Offer failed on submit: ")?;

    assert_eq!(outcome.status, NegotiationStatus::Active);
    assert_eq!(outcome.current_offer, 300_000);
    assert_eq!(outcome.buyer_id, buyer_id);
    assert_eq!(outcome.seller_id, seller_id);
    assert_eq!(outcome.last_offer_by, buyer_id);
    assert_eq!(outcome.awaiting_response_from, Some(PartyRole::Seller));

    Ok(())
}

#[test]
fn seller_counters_buyer_offer() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_counter_offer.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;

    let countered = service
        .submit_offer(
            &seller_id,
            &property.property_id,
            310_000,
            Some(&opened.negotiation_id),
            None,
        )
        .context("Offer failed on counter: ")?;

    assert_eq!(countered.negotiation_id, opened.negotiation_id);
    assert_eq!(countered.current_offer, 310_000);
    assert_eq!(countered.last_offer_by, seller_id);
    assert_eq!(countered.awaiting_response_from, Some(PartyRole::Buyer));

    let record = service.get_negotiation(&opened.negotiation_id)?;
    assert_eq!(record.transactions.len(), 2);

    Ok(())
}

#[test]
fn buyer_accepts_counter_and_competing_negotiations_are_rejected() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_accept.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let rival_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let rival = service.submit_offer(&rival_id, &property.property_id, 280_000, None, None)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;
    service.submit_offer(
        &seller_id,
        &property.property_id,
        310_000,
        Some(&opened.negotiation_id),
        None,
    )?;

    let outcome = service
        .update_offer_status(&buyer_id, &opened.negotiation_id, OfferAction::Accept)
        .context("Offer failed on accept: ")?;

    assert_eq!(outcome.status, NegotiationStatus::Accepted);
    assert_eq!(outcome.property_status, PropertyStatus::UnderOffer);
    assert_eq!(outcome.current_offer, 310_000);
    assert_eq!(outcome.action_by, buyer_id);

    // the rival's active negotiation was force-rejected by the seller
    let rival_record = service.get_negotiation(&rival.negotiation_id)?;
    assert_eq!(rival_record.status, NegotiationStatus::Rejected);
    assert_eq!(rival_record.rejected_by.as_deref(), Some(seller_id.as_str()));

    let accepted = service.get_negotiation(&opened.negotiation_id)?;
    assert_eq!(accepted.accepted_by.as_deref(), Some(buyer_id.as_str()));
    assert!(accepted.accepted_at.is_some());

    Ok(())
}

#[test]
fn seller_cannot_reject_own_counter_offer() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_wrong_turn.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;
    service.submit_offer(
        &seller_id,
        &property.property_id,
        310_000,
        Some(&opened.negotiation_id),
        None,
    )?;

    let err = service
        .update_offer_status(&seller_id, &opened.negotiation_id, OfferAction::Reject)
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<NegotiationError>(),
        Some(NegotiationError::WrongTurn {
            waiting_on: PartyRole::Buyer,
            ..
        })
    ));

    Ok(())
}

#[test]
fn seller_reverses_acceptance_within_cooling_off_window() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_cooling_off.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;
    service.update_offer_status(&seller_id, &opened.negotiation_id, OfferAction::Accept)?;

    assert_eq!(
        service.get_property(&property.property_id)?.status,
        PropertyStatus::UnderOffer
    );

    // inside the 24h window either party may back out, turn rules waived
    let outcome = service
        .update_offer_status(&seller_id, &opened.negotiation_id, OfferAction::Reject)
        .context("Cooling-off reject failed: ")?;

    assert_eq!(outcome.status, NegotiationStatus::Rejected);
    assert_eq!(outcome.property_status, PropertyStatus::ForSale);

    Ok(())
}

#[test]
fn cooling_off_reject_fails_once_window_elapsed() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("test_cooling_off_expired.db"))?);
    db.clear()?;

    // a zero-length window makes any reject-after-accept arrive too late
    let service = NegotiationService::with_policy(
        db,
        NegotiationPolicy {
            cooling_off: chrono::Duration::zero(),
        },
    );

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;
    service.update_offer_status(&seller_id, &opened.negotiation_id, OfferAction::Accept)?;

    let err = service
        .update_offer_status(&seller_id, &opened.negotiation_id, OfferAction::Reject)
        .unwrap_err();

    match err.downcast_ref::<NegotiationError>() {
        Some(NegotiationError::CoolingOffExpired {
            accepted_at,
            expires_at,
        }) => assert_eq!(accepted_at, expires_at),
        other => panic!("expected CoolingOffExpired, got {other:?}"),
    }

    // the failed reject must not have touched any state
    assert_eq!(
        service.get_negotiation(&opened.negotiation_id)?.status,
        NegotiationStatus::Accepted
    );
    assert_eq!(
        service.get_property(&property.property_id)?.status,
        PropertyStatus::UnderOffer
    );

    Ok(())
}

#[test]
fn buyer_cancels_first_offer_and_property_reverts() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_cancel_first.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;

    let outcome = service
        .update_offer_status(&buyer_id, &opened.negotiation_id, OfferAction::Cancel)
        .context("Offer failed on cancel: ")?;

    assert_eq!(outcome.status, NegotiationStatus::Cancelled);
    assert_eq!(outcome.property_status, PropertyStatus::ForSale);

    Ok(())
}

#[test]
fn cancelling_counter_offer_rolls_back_to_prior_offer() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_cancel_rollback.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;
    service.submit_offer(
        &seller_id,
        &property.property_id,
        310_000,
        Some(&opened.negotiation_id),
        None,
    )?;

    // only the author of the latest offer may cancel it
    let err = service
        .update_offer_status(&buyer_id, &opened.negotiation_id, OfferAction::Cancel)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NegotiationError>(),
        Some(NegotiationError::NotLastOfferer)
    ));

    let outcome =
        service.update_offer_status(&seller_id, &opened.negotiation_id, OfferAction::Cancel)?;

    assert_eq!(outcome.status, NegotiationStatus::Active);
    assert_eq!(outcome.last_offer_by, buyer_id);
    assert_eq!(outcome.current_offer, 300_000);

    Ok(())
}

#[test]
fn cancelling_after_a_rollback_ends_the_negotiation() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_cancel_chain.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;
    service.submit_offer(
        &seller_id,
        &property.property_id,
        310_000,
        Some(&opened.negotiation_id),
        None,
    )?;
    service.update_offer_status(&seller_id, &opened.negotiation_id, OfferAction::Cancel)?;

    // the buyer's opening offer is now the only live one; taking it back
    // must cancel the negotiation outright, not reinstate the seller's
    // cancelled 310k counter
    let outcome =
        service.update_offer_status(&buyer_id, &opened.negotiation_id, OfferAction::Cancel)?;

    assert_eq!(outcome.status, NegotiationStatus::Cancelled);
    assert_eq!(outcome.property_status, PropertyStatus::ForSale);

    // and the cancelled counter stays dead
    let err = service
        .update_offer_status(&buyer_id, &opened.negotiation_id, OfferAction::Accept)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NegotiationError>(),
        Some(NegotiationError::AlreadyTerminal { .. })
    ));

    Ok(())
}

#[test]
fn counter_offer_reactivates_rejected_negotiation() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_reactivate.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;
    service.update_offer_status(&seller_id, &opened.negotiation_id, OfferAction::Reject)?;

    let resumed = service.submit_offer(
        &buyer_id,
        &property.property_id,
        305_000,
        Some(&opened.negotiation_id),
        None,
    )?;

    assert_eq!(resumed.status, NegotiationStatus::Active);
    assert_eq!(resumed.current_offer, 305_000);

    Ok(())
}

#[test]
fn offer_on_own_property_is_refused() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_own_property.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let err = service
        .submit_offer(&seller_id, &property.property_id, 300_000, None, None)
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<NegotiationError>(),
        Some(NegotiationError::OwnProperty)
    ));

    Ok(())
}

#[test]
fn second_active_negotiation_by_same_buyer_is_refused() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_duplicate_negotiation.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;
    let err = service
        .submit_offer(&buyer_id, &property.property_id, 310_000, None, None)
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<NegotiationError>(),
        Some(NegotiationError::ActiveNegotiationExists)
    ));

    Ok(())
}

#[test]
fn unknown_property_and_negotiation_are_not_found() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_not_found.db")?;

    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let ghost_property = utils::new_uuid_to_bech32("prop_")?;
    let ghost_negotiation = utils::new_uuid_to_bech32("neg_")?;

    let err = service
        .submit_offer(&buyer_id, &ghost_property, 300_000, None, None)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NegotiationError>(),
        Some(NegotiationError::PropertyNotFound(_))
    ));

    let err = service
        .update_offer_status(&buyer_id, &ghost_negotiation, OfferAction::Accept)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NegotiationError>(),
        Some(NegotiationError::NegotiationNotFound(_))
    ));

    Ok(())
}

#[test]
fn counter_against_the_wrong_property_is_refused() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_property_mismatch.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;
    let other_property = service.list_property(&seller_id, 275_000)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;

    let err = service
        .submit_offer(
            &seller_id,
            &other_property.property_id,
            310_000,
            Some(&opened.negotiation_id),
            None,
        )
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<NegotiationError>(),
        Some(NegotiationError::PropertyMismatch { .. })
    ));

    Ok(())
}

#[test]
fn dashboard_shows_both_sides_with_full_history() -> anyhow::Result<()> {
    let (service, _tmp) = test_service("test_dashboard.db")?;

    let seller_id = utils::new_uuid_to_bech32("user_")?;
    let buyer_id = utils::new_uuid_to_bech32("user_")?;
    let property = service.list_property(&seller_id, 350_000)?;

    let opened = service.submit_offer(&buyer_id, &property.property_id, 300_000, None, None)?;
    service.submit_offer(
        &seller_id,
        &property.property_id,
        310_000,
        Some(&opened.negotiation_id),
        None,
    )?;

    let buyer_view = service.dashboard(&buyer_id)?;
    assert!(buyer_view.listed_properties.is_empty());
    assert_eq!(buyer_view.negotiations_as_buyer.len(), 1);
    let entry = &buyer_view.negotiations_as_buyer[0];
    assert_eq!(entry.transactions.len(), 2);
    assert_eq!(entry.current_offer, 310_000);
    assert_eq!(entry.awaiting_response_from, Some(PartyRole::Buyer));

    let seller_view = service.dashboard(&seller_id)?;
    assert_eq!(seller_view.listed_properties.len(), 1);
    assert_eq!(seller_view.negotiations_as_seller.len(), 1);
    assert!(seller_view.negotiations_as_buyer.is_empty());

    // offer history is chronological
    let history = &seller_view.negotiations_as_seller[0].transactions;
    assert!(history[0].created_at <= history[1].created_at);

    Ok(())
}
