mod common;

use anyhow::Result;
use common::{refs, Outgoing, TestHarness};
use pointmove::engine::AckOutcome;
use pointmove::error::EngineError;
use pointmove::models::{CorrectionStatus, Endpoint, MoveStatus};
use pointmove::notify::MoveAction;

const OPERATOR: i64 = 1000;

#[tokio::test]
async fn draft_routed_invoiced_move_dispatches_to_both_endpoints() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;
    h.bind(22, to)?;

    let mv = h.engine.create(OPERATOR)?;
    assert_eq!(mv.status, MoveStatus::Draft);
    assert_eq!(mv.invoice_version, 1);
    assert_eq!(mv.operator_id, OPERATOR);

    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;
    h.engine.attach_photos(mv.id, &refs(&["img1"]))?;

    let report = h.engine.send(mv.id).await?;
    assert_eq!(report.invoice_version, 1);
    assert_eq!(report.source.succeeded, 1);
    assert_eq!(report.source.attempted, 1);
    assert_eq!(report.destination.succeeded, 2);
    assert_eq!(report.destination.attempted, 2);

    let sent = h.engine.get(mv.id)?;
    assert_eq!(sent.status, MoveStatus::Sent);

    // Source staff get the handed action, destination staff the received one.
    let to_sender = h.channel.sent_to(11).await;
    assert!(matches!(
        &to_sender[..],
        [Outgoing::Photo { photo, actions, .. }]
            if photo == "img1"
                && actions == &[MoveAction::ConfirmHanded, MoveAction::RaiseCorrection]
    ));
    let to_receiver = h.channel.sent_to(21).await;
    assert!(matches!(
        &to_receiver[..],
        [Outgoing::Photo { actions, .. }]
            if actions == &[MoveAction::ConfirmReceived, MoveAction::RaiseCorrection]
    ));

    // The operator gets a delivery summary.
    let to_operator = h.channel.sent_to(OPERATOR).await;
    assert!(to_operator
        .iter()
        .any(|message| matches!(message, Outgoing::Text { text, .. } if text.contains("dispatched"))));
    Ok(())
}

#[tokio::test]
async fn several_photos_go_out_as_an_album_with_a_prompt() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;

    let mv = h.engine.create(OPERATOR)?;
    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;
    h.engine.attach_photos(mv.id, &refs(&["img1", "img2", "img3"]))?;
    h.engine.send(mv.id).await?;

    let to_sender = h.channel.sent_to(11).await;
    assert!(matches!(
        &to_sender[..],
        [Outgoing::Album { photos, .. }, Outgoing::Prompt { actions, .. }]
            if photos == &refs(&["img1", "img2", "img3"])
                && actions == &[MoveAction::ConfirmHanded, MoveAction::RaiseCorrection]
    ));
    Ok(())
}

#[tokio::test]
async fn send_preconditions_are_checked_before_any_mutation() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;

    let mv = h.engine.create(OPERATOR)?;

    // No route yet.
    let err = h.engine.send(mv.id).await.unwrap_err();
    assert!(matches!(err, EngineError::IncompleteRoute(id) if id == mv.id));

    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;

    // Route set, but nobody is bound at the source point.
    let err = h.engine.send(mv.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NoRecipients(Endpoint::Source)));

    h.bind(11, from)?;
    let err = h.engine.send(mv.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::NoRecipients(Endpoint::Destination)
    ));

    h.bind(21, to)?;
    // Recipients are fine now, but there is no invoice yet.
    let err = h.engine.send(mv.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NoPhotos(id) if id == mv.id));

    // None of the failed attempts may have touched the status.
    assert_eq!(h.engine.get(mv.id)?.status, MoveStatus::Draft);
    assert!(h.channel.outgoing().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn both_acknowledgements_close_the_move_in_either_order() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;

    let mv = h.engine.create(OPERATOR)?;
    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;
    h.engine.attach_photos(mv.id, &refs(&["img1"]))?;
    h.engine.send(mv.id).await?;

    let ack = h.engine.mark_handed(mv.id, 11).await?;
    assert_eq!(ack.outcome, AckOutcome::Confirmed);
    assert!(!ack.completed);

    let after_one = h.engine.get(mv.id)?;
    assert_eq!(after_one.status, MoveStatus::Sent);
    assert_eq!(after_one.handed_by, Some(11));
    assert!(after_one.handed_at.is_some());
    assert!(after_one.received_at.is_none());

    let ack = h.engine.mark_received(mv.id, 21).await?;
    assert_eq!(ack.outcome, AckOutcome::Confirmed);
    assert!(ack.completed);

    let done = h.engine.get(mv.id)?;
    assert_eq!(done.status, MoveStatus::Done);
    assert_eq!(done.received_by, Some(21));
    assert!(done.handed_at.is_some() && done.received_at.is_some());

    // Operator heard about each confirmation and the completion.
    let to_operator = h.channel.sent_to(OPERATOR).await;
    assert!(to_operator
        .iter()
        .any(|m| matches!(m, Outgoing::Text { text, .. } if text.contains("confirmed by both points"))));
    Ok(())
}

#[tokio::test]
async fn repeated_acknowledgement_is_a_reported_noop() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;

    let mv = h.engine.create(OPERATOR)?;
    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;
    h.engine.attach_photos(mv.id, &refs(&["img1"]))?;
    h.engine.send(mv.id).await?;

    let first = h.engine.mark_handed(mv.id, 11).await?;
    assert_eq!(first.outcome, AckOutcome::Confirmed);
    let recorded = h.engine.get(mv.id)?;

    let second = h.engine.mark_handed(mv.id, 11).await?;
    assert_eq!(second.outcome, AckOutcome::AlreadyConfirmed);
    assert!(!second.completed);

    let unchanged = h.engine.get(mv.id)?;
    assert_eq!(unchanged.handed_at, recorded.handed_at);
    assert_eq!(unchanged.handed_by, recorded.handed_by);
    Ok(())
}

#[tokio::test]
async fn acknowledgement_requires_the_matching_point_binding() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;

    let mv = h.engine.create(OPERATOR)?;
    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;
    h.engine.attach_photos(mv.id, &refs(&["img1"]))?;
    h.engine.send(mv.id).await?;

    // Bound to the wrong point.
    let err = h.engine.mark_handed(mv.id, 21).await.unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized { actor: 21 }));

    // Not bound at all.
    let err = h.engine.mark_received(mv.id, 99).await.unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized { actor: 99 }));

    let unchanged = h.engine.get(mv.id)?;
    assert!(unchanged.handed_at.is_none());
    assert!(unchanged.received_at.is_none());
    assert_eq!(unchanged.status, MoveStatus::Sent);
    Ok(())
}

#[tokio::test]
async fn correction_then_reinvoice_resets_the_acknowledgement_gate() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;

    let mv = h.engine.create(OPERATOR)?;
    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;
    h.engine.attach_photos(mv.id, &refs(&["img1"]))?;
    h.engine.send(mv.id).await?;
    h.engine.mark_handed(mv.id, 11).await?;
    h.engine.mark_received(mv.id, 21).await?;
    assert_eq!(h.engine.get(mv.id)?.status, MoveStatus::Done);

    // A correction flags the problem but does not reopen the move.
    h.engine
        .request_correction(mv.id, 21, "wrong quantity", None)
        .await?;
    let flagged = h.engine.get(mv.id)?;
    assert_eq!(flagged.status, MoveStatus::Done);
    assert_eq!(flagged.correction_status, CorrectionStatus::Requested);
    assert_eq!(flagged.correction_by, Some(21));
    assert_eq!(flagged.correction_note.as_deref(), Some("wrong quantity"));

    // Re-invoicing supersedes the photo set and resets both confirmations.
    let report = h.engine.reinvoice(mv.id, &refs(&["img2"])).await?;
    assert_eq!(report.invoice_version, 2);

    let reopened = h.engine.get(mv.id)?;
    assert_eq!(reopened.status, MoveStatus::Sent);
    assert_eq!(reopened.invoice_version, 2);
    assert!(reopened.handed_at.is_none() && reopened.handed_by.is_none());
    assert!(reopened.received_at.is_none() && reopened.received_by.is_none());
    assert_eq!(reopened.correction_status, CorrectionStatus::Resolved);

    assert_eq!(h.engine.invoice_photos(mv.id, 1)?, refs(&["img1"]));
    assert_eq!(h.engine.invoice_photos(mv.id, 2)?, refs(&["img2"]));
    assert_eq!(h.engine.invoice_versions(mv.id)?, vec![1, 2]);

    // The version only ever climbs.
    let report = h.engine.reinvoice(mv.id, &refs(&["img3"])).await?;
    assert_eq!(report.invoice_version, 3);
    assert_eq!(h.engine.invoice_versions(mv.id)?, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn correction_requires_a_binding_to_either_endpoint() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;

    let mv = h.engine.create(OPERATOR)?;
    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;

    let err = h
        .engine
        .request_correction(mv.id, 99, "not mine", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized { actor: 99 }));
    assert_eq!(
        h.engine.get(mv.id)?.correction_status,
        CorrectionStatus::None
    );

    // The source side may raise one too, with a photo the operator receives.
    h.engine
        .request_correction(mv.id, 11, "label torn", Some("corr-photo"))
        .await?;
    let flagged = h.engine.get(mv.id)?;
    assert_eq!(flagged.correction_status, CorrectionStatus::Requested);
    assert_eq!(flagged.correction_photo.as_deref(), Some("corr-photo"));

    let to_operator = h.channel.sent_to(OPERATOR).await;
    assert!(to_operator.iter().any(|m| matches!(
        m,
        Outgoing::Photo { photo, caption, .. }
            if photo == "corr-photo" && caption.contains("label torn")
    )));
    Ok(())
}

#[tokio::test]
async fn reattaching_before_send_overwrites_the_set() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;

    let mv = h.engine.create(OPERATOR)?;
    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;
    h.engine.attach_photos(mv.id, &refs(&["img1", "img2"]))?;
    h.engine.attach_photos(mv.id, &refs(&["img3"]))?;

    assert_eq!(h.engine.invoice_photos(mv.id, 1)?, refs(&["img3"]));

    h.engine.send(mv.id).await?;
    let to_sender = h.channel.sent_to(11).await;
    assert!(matches!(
        &to_sender[..],
        [Outgoing::Photo { photo, .. }] if photo == "img3"
    ));
    Ok(())
}

#[tokio::test]
async fn empty_photo_sets_are_rejected() -> Result<()> {
    let h = TestHarness::new()?;
    let mv = h.engine.create(OPERATOR)?;

    let err = h.engine.attach_photos(mv.id, &[]).unwrap_err();
    assert!(matches!(err, EngineError::EmptyPhotoSet));

    let err = h.engine.reinvoice(mv.id, &[]).await.unwrap_err();
    assert!(matches!(err, EngineError::EmptyPhotoSet));
    Ok(())
}

#[tokio::test]
async fn legacy_preview_photo_satisfies_send() -> Result<()> {
    use pointmove::store::MoveStore;

    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;

    let mv = h.engine.create(OPERATOR)?;
    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;
    // A move written before versioned sets existed: only the single
    // preview photo is present.
    h.store.set_preview(mv.id, "legacy-photo")?;

    h.engine.send(mv.id).await?;
    let to_sender = h.channel.sent_to(11).await;
    assert!(matches!(
        &to_sender[..],
        [Outgoing::Photo { photo, .. }] if photo == "legacy-photo"
    ));
    Ok(())
}

#[tokio::test]
async fn resending_clears_stale_acknowledgements() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;

    let mv = h.engine.create(OPERATOR)?;
    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;
    h.engine.attach_photos(mv.id, &refs(&["img1"]))?;
    h.engine.send(mv.id).await?;
    h.engine.mark_handed(mv.id, 11).await?;

    h.engine.send(mv.id).await?;
    let resent = h.engine.get(mv.id)?;
    assert_eq!(resent.status, MoveStatus::Sent);
    assert!(resent.handed_at.is_none() && resent.handed_by.is_none());
    Ok(())
}

#[tokio::test]
async fn partial_delivery_failure_does_not_fail_the_transition() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, to) = h.seed_route()?;
    h.bind(11, from)?;
    h.bind(21, to)?;
    h.bind(22, to)?;
    h.channel.mark_unreachable(22).await;

    let mv = h.engine.create(OPERATOR)?;
    h.engine.set_from(mv.id, from)?;
    h.engine.set_to(mv.id, to)?;
    h.engine.attach_photos(mv.id, &refs(&["img1"]))?;

    let report = h.engine.send(mv.id).await?;
    assert_eq!(report.source.succeeded, 1);
    assert_eq!(report.destination.attempted, 2);
    assert_eq!(report.destination.succeeded, 1);
    assert_eq!(h.engine.get(mv.id)?.status, MoveStatus::Sent);
    Ok(())
}

#[tokio::test]
async fn operator_can_force_close_or_cancel() -> Result<()> {
    let h = TestHarness::new()?;
    let mv = h.engine.create(OPERATOR)?;

    // Force-close does not require any acknowledgement.
    h.engine.close(mv.id)?;
    let closed = h.engine.get(mv.id)?;
    assert_eq!(closed.status, MoveStatus::Done);
    assert!(closed.handed_at.is_none() && closed.received_at.is_none());

    let other = h.engine.create(OPERATOR)?;
    h.engine.cancel(other.id)?;
    assert_eq!(h.engine.get(other.id)?.status, MoveStatus::Canceled);

    let err = h.engine.close(9999).unwrap_err();
    assert!(matches!(err, EngineError::NotFound(9999)));
    Ok(())
}

#[tokio::test]
async fn note_is_set_and_cleared_and_listed_moves_sort_newest_first() -> Result<()> {
    let h = TestHarness::new()?;
    let first = h.engine.create(OPERATOR)?;
    let second = h.engine.create(OPERATOR)?;
    assert!(second.id > first.id);

    h.engine.set_note(first.id, "  fragile  ")?;
    assert_eq!(h.engine.get(first.id)?.note.as_deref(), Some("fragile"));
    h.engine.set_note(first.id, "")?;
    assert_eq!(h.engine.get(first.id)?.note, None);

    h.engine.close(first.id)?;
    let recent = h.engine.list_recent(10)?;
    assert_eq!(
        recent.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
    let active = h.engine.list_active(10)?;
    assert_eq!(active.iter().map(|m| m.id).collect::<Vec<_>>(), vec![second.id]);
    let closed = h.engine.list_closed(10)?;
    assert_eq!(closed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first.id]);
    Ok(())
}

#[tokio::test]
async fn missing_moves_surface_not_found() -> Result<()> {
    let h = TestHarness::new()?;
    let (from, _) = h.seed_route()?;

    assert!(matches!(
        h.engine.get(42).unwrap_err(),
        EngineError::NotFound(42)
    ));
    assert!(matches!(
        h.engine.set_from(42, from).unwrap_err(),
        EngineError::NotFound(42)
    ));
    assert!(matches!(
        h.engine.attach_photos(42, &refs(&["img1"])).unwrap_err(),
        EngineError::NotFound(42)
    ));
    assert!(matches!(
        h.engine.reinvoice(42, &refs(&["img1"])).await.unwrap_err(),
        EngineError::NotFound(42)
    ));
    Ok(())
}
