use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::directory::{BindingService, DirectoryService};
use crate::error::{EngineError, EngineResult};
use crate::models::{Endpoint, Move, MoveId, MoveStatus, PointId, UserId};
use crate::notify::{Delivery, NotificationChannel, Notifier};
use crate::render;
use crate::store::{AckWrite, MoveStore, PhotoStore, Stores};

/// Result of a `send` or `reinvoice` dispatch round.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SendReport {
    pub move_id: MoveId,
    pub invoice_version: i32,
    pub source: Delivery,
    pub destination: Delivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// This call recorded the confirmation.
    Confirmed,
    /// The actor had already confirmed; nothing changed.
    AlreadyConfirmed,
}

#[derive(Debug, Clone, Copy)]
pub struct Acknowledgement {
    pub outcome: AckOutcome,
    /// Whether this call closed the move (both sides now confirmed).
    pub completed: bool,
}

/// The move lifecycle state machine. Every mutation of a move or its photo
/// sets funnels through a named transition here; no other component writes
/// them.
pub struct MoveEngine {
    moves: Arc<dyn MoveStore>,
    photos: Arc<dyn PhotoStore>,
    directory: Arc<dyn DirectoryService>,
    bindings: Arc<dyn BindingService>,
    channel: Arc<dyn NotificationChannel>,
    notifier: Notifier,
}

impl MoveEngine {
    pub fn new(stores: Stores, channel: Arc<dyn NotificationChannel>) -> Self {
        Self {
            moves: stores.moves,
            photos: stores.photos,
            directory: stores.directory,
            bindings: stores.bindings,
            notifier: Notifier::new(channel.clone()),
            channel,
        }
    }

    // ---- creation and routing ----

    pub fn create(&self, operator: UserId) -> EngineResult<Move> {
        let created = self.moves.create(operator)?;
        info!(move_id = created.id, operator, "created move draft");
        Ok(created)
    }

    pub fn set_from(&self, id: MoveId, point: PointId) -> EngineResult<()> {
        if !self.moves.set_from_point(id, point)? {
            return Err(EngineError::NotFound(id));
        }
        Ok(())
    }

    pub fn set_to(&self, id: MoveId, point: PointId) -> EngineResult<()> {
        if !self.moves.set_to_point(id, point)? {
            return Err(EngineError::NotFound(id));
        }
        Ok(())
    }

    pub fn set_note(&self, id: MoveId, note: &str) -> EngineResult<()> {
        let trimmed = note.trim();
        let value = (!trimmed.is_empty()).then_some(trimmed);
        if !self.moves.set_note(id, value)? {
            return Err(EngineError::NotFound(id));
        }
        Ok(())
    }

    // ---- invoicing ----

    pub fn attach_photos(&self, id: MoveId, refs: &[String]) -> EngineResult<()> {
        if refs.is_empty() {
            return Err(EngineError::EmptyPhotoSet);
        }
        let mv = self.require(id)?;
        self.photos.replace_photos(id, mv.invoice_version, refs)?;
        self.mirror_preview(id, &refs[0]);
        info!(
            move_id = id,
            version = mv.invoice_version,
            count = refs.len(),
            "attached invoice photos"
        );
        Ok(())
    }

    // ---- dispatch ----

    pub async fn send(&self, id: MoveId) -> EngineResult<SendReport> {
        let mv = self.require(id)?;
        let (from_point, to_point) = mv.route().ok_or(EngineError::IncompleteRoute(id))?;

        // Both endpoints must be reachable before anything is mutated.
        let from_recipients = self.bindings.bound_identities(from_point)?;
        if from_recipients.is_empty() {
            return Err(EngineError::NoRecipients(Endpoint::Source));
        }
        let to_recipients = self.bindings.bound_identities(to_point)?;
        if to_recipients.is_empty() {
            return Err(EngineError::NoRecipients(Endpoint::Destination));
        }

        let photos = self.current_photos(&mv)?;
        if photos.is_empty() {
            return Err(EngineError::NoPhotos(id));
        }

        // A fresh dispatch invalidates acknowledgements from any earlier
        // round against an older invoice.
        self.moves.clear_handoff_state(id)?;
        self.moves.set_status(id, MoveStatus::Sent)?;

        let mv = self.require(id)?;
        let caption = self.card_for(&mv)?;

        let source = self
            .notifier
            .notify(id, &from_recipients, &photos, &caption, Endpoint::Source)
            .await;
        let destination = self
            .notifier
            .notify(id, &to_recipients, &photos, &caption, Endpoint::Destination)
            .await;

        let report = SendReport {
            move_id: id,
            invoice_version: mv.invoice_version,
            source,
            destination,
        };
        info!(
            move_id = id,
            version = report.invoice_version,
            source_reached = source.succeeded,
            source_attempted = source.attempted,
            destination_reached = destination.succeeded,
            destination_attempted = destination.attempted,
            "dispatched move to both endpoints"
        );
        self.notify_operator(&mv, &render::delivery_summary(&mv, &report))
            .await;
        Ok(report)
    }

    // ---- acknowledgement ----

    pub async fn mark_handed(&self, id: MoveId, actor: UserId) -> EngineResult<Acknowledgement> {
        self.acknowledge(id, actor, Endpoint::Source).await
    }

    pub async fn mark_received(&self, id: MoveId, actor: UserId) -> EngineResult<Acknowledgement> {
        self.acknowledge(id, actor, Endpoint::Destination).await
    }

    async fn acknowledge(
        &self,
        id: MoveId,
        actor: UserId,
        endpoint: Endpoint,
    ) -> EngineResult<Acknowledgement> {
        let mv = self.require(id)?;
        let required = match endpoint {
            Endpoint::Source => mv.from_point_id,
            Endpoint::Destination => mv.to_point_id,
        };
        self.authorize(actor, required)?;

        let write = match endpoint {
            Endpoint::Source => self.moves.mark_handed(id, actor)?,
            Endpoint::Destination => self.moves.mark_received(id, actor)?,
        };

        match write {
            AckWrite::Missing => Err(EngineError::NotFound(id)),
            AckWrite::AlreadyAcked => {
                info!(move_id = id, actor, side = %endpoint, "acknowledgement repeated; no-op");
                Ok(Acknowledgement {
                    outcome: AckOutcome::AlreadyConfirmed,
                    completed: false,
                })
            }
            AckWrite::Applied => {
                let mv = self.require(id)?;
                let point_name = self.point_name(required)?;
                self.notify_operator(
                    &mv,
                    &render::acknowledgement_card(&mv, endpoint, point_name.as_deref(), actor),
                )
                .await;

                let completed = match endpoint {
                    Endpoint::Source => mv.received_at.is_some(),
                    Endpoint::Destination => mv.handed_at.is_some(),
                };
                if completed {
                    self.moves.set_status(id, MoveStatus::Done)?;
                    let closed = self.require(id)?;
                    let from_name = self.point_name(closed.from_point_id)?;
                    let to_name = self.point_name(closed.to_point_id)?;
                    self.notify_operator(
                        &closed,
                        &render::completion_card(&closed, from_name.as_deref(), to_name.as_deref()),
                    )
                    .await;
                    info!(move_id = id, "both endpoints confirmed; move closed");
                }
                Ok(Acknowledgement {
                    outcome: AckOutcome::Confirmed,
                    completed,
                })
            }
        }
    }

    // ---- correction and re-invoicing ----

    pub async fn request_correction(
        &self,
        id: MoveId,
        actor: UserId,
        note: &str,
        photo: Option<&str>,
    ) -> EngineResult<()> {
        let mv = self.require(id)?;
        let bound = self.bindings.bound_point(actor)?;
        let endpoint = match bound {
            Some(point) if Some(point) == mv.from_point_id => Endpoint::Source,
            Some(point) if Some(point) == mv.to_point_id => Endpoint::Destination,
            _ => return Err(EngineError::Unauthorized { actor }),
        };

        if !self.moves.request_correction(id, actor, note, photo)? {
            return Err(EngineError::NotFound(id));
        }

        let mv = self.require(id)?;
        let point_name = self.point_name(bound)?;
        let card = render::correction_card(&mv, endpoint, point_name.as_deref(), actor, note);
        match photo {
            Some(photo) => {
                if let Err(err) = self
                    .channel
                    .send_photo(mv.operator_id, photo, &card, &[])
                    .await
                {
                    warn!(
                        move_id = id,
                        operator = mv.operator_id,
                        error = %err,
                        "operator correction notification failed"
                    );
                }
            }
            None => self.notify_operator(&mv, &card).await,
        }
        info!(move_id = id, actor, side = %endpoint, "correction requested");
        Ok(())
    }

    pub async fn reinvoice(&self, id: MoveId, refs: &[String]) -> EngineResult<SendReport> {
        if refs.is_empty() {
            return Err(EngineError::EmptyPhotoSet);
        }

        let version = self
            .moves
            .bump_invoice_version(id)?
            .ok_or(EngineError::NotFound(id))?;
        self.photos.replace_photos(id, version, refs)?;
        self.mirror_preview(id, &refs[0]);
        self.moves.reset_for_reinvoice(id)?;

        let mv = self.require(id)?;
        let caption = self.card_for(&mv)?;

        // Unlike `send`, an empty endpoint is not an error here: the round
        // simply reports zero reached and the operator can rebind and resend.
        let from_recipients = match mv.from_point_id {
            Some(point) => self.bindings.bound_identities(point)?,
            None => Vec::new(),
        };
        let to_recipients = match mv.to_point_id {
            Some(point) => self.bindings.bound_identities(point)?,
            None => Vec::new(),
        };

        let source = self
            .notifier
            .notify(id, &from_recipients, refs, &caption, Endpoint::Source)
            .await;
        let destination = self
            .notifier
            .notify(id, &to_recipients, refs, &caption, Endpoint::Destination)
            .await;

        let report = SendReport {
            move_id: id,
            invoice_version: version,
            source,
            destination,
        };
        info!(
            move_id = id,
            version, "reissued invoice and reset acknowledgements"
        );
        self.notify_operator(&mv, &render::delivery_summary(&mv, &report))
            .await;
        Ok(report)
    }

    // ---- closing ----

    pub fn close(&self, id: MoveId) -> EngineResult<()> {
        if !self.moves.set_status(id, MoveStatus::Done)? {
            return Err(EngineError::NotFound(id));
        }
        info!(move_id = id, "move force-closed by operator");
        Ok(())
    }

    pub fn cancel(&self, id: MoveId) -> EngineResult<()> {
        if !self.moves.set_status(id, MoveStatus::Canceled)? {
            return Err(EngineError::NotFound(id));
        }
        info!(move_id = id, "move canceled");
        Ok(())
    }

    // ---- reads ----

    pub fn get(&self, id: MoveId) -> EngineResult<Move> {
        self.require(id)
    }

    pub fn list_recent(&self, limit: i64) -> EngineResult<Vec<Move>> {
        Ok(self.moves.list_recent(limit)?)
    }

    pub fn list_active(&self, limit: i64) -> EngineResult<Vec<Move>> {
        Ok(self.moves.list_active(limit)?)
    }

    pub fn list_closed(&self, limit: i64) -> EngineResult<Vec<Move>> {
        Ok(self.moves.list_closed(limit)?)
    }

    pub fn invoice_versions(&self, id: MoveId) -> EngineResult<Vec<i32>> {
        Ok(self.photos.list_versions(id)?)
    }

    pub fn invoice_photos(&self, id: MoveId, version: i32) -> EngineResult<Vec<String>> {
        Ok(self.photos.list_photos(id, version)?)
    }

    /// The rendered card for one move, as shown to operators on demand.
    pub fn card(&self, id: MoveId) -> EngineResult<String> {
        let mv = self.require(id)?;
        self.card_for(&mv)
    }

    // ---- helpers ----

    fn require(&self, id: MoveId) -> EngineResult<Move> {
        self.moves.get(id)?.ok_or(EngineError::NotFound(id))
    }

    fn authorize(&self, actor: UserId, required: Option<PointId>) -> EngineResult<()> {
        let bound = self.bindings.bound_point(actor)?;
        match (bound, required) {
            (Some(bound), Some(required)) if bound == required => Ok(()),
            _ => Err(EngineError::Unauthorized { actor }),
        }
    }

    /// Current version's photo set, falling back to the legacy single
    /// preview photo for moves that predate versioned sets.
    fn current_photos(&self, mv: &Move) -> EngineResult<Vec<String>> {
        let photos = self.photos.list_photos(mv.id, mv.invoice_version)?;
        if !photos.is_empty() {
            return Ok(photos);
        }
        Ok(mv.preview_photo.clone().into_iter().collect())
    }

    fn card_for(&self, mv: &Move) -> EngineResult<String> {
        let from_name = self.point_name(mv.from_point_id)?;
        let to_name = self.point_name(mv.to_point_id)?;
        Ok(render::move_card(
            mv,
            from_name.as_deref(),
            to_name.as_deref(),
        ))
    }

    fn point_name(&self, point: Option<PointId>) -> EngineResult<Option<String>> {
        Ok(match point {
            Some(point) => self.directory.point_name(point)?,
            None => None,
        })
    }

    /// The preview photo is a best-effort mirror for legacy readers; its
    /// failure never invalidates the transition that wrote the real set.
    fn mirror_preview(&self, id: MoveId, photo: &str) {
        if let Err(err) = self.moves.set_preview(id, photo) {
            warn!(move_id = id, error = %err, "preview mirror write failed");
        }
    }

    async fn notify_operator(&self, mv: &Move, text: &str) {
        if let Err(err) = self.channel.send_text(mv.operator_id, text).await {
            warn!(
                move_id = mv.id,
                operator = mv.operator_id,
                error = %err,
                "operator notification failed"
            );
        }
    }
}
