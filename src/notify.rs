use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::models::{Endpoint, MoveId, UserId};

/// One labeled action a delivered message can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveAction {
    ConfirmHanded,
    ConfirmReceived,
    RaiseCorrection,
}

impl MoveAction {
    pub fn label(&self) -> &'static str {
        match self {
            MoveAction::ConfirmHanded => "Confirm handed over",
            MoveAction::ConfirmReceived => "Confirm received",
            MoveAction::RaiseCorrection => "Raise a correction",
        }
    }

    /// Encodes the action plus its move id into the callback string a
    /// channel button carries.
    pub fn callback_data(&self, move_id: MoveId) -> String {
        let tag = match self {
            MoveAction::ConfirmHanded => "handed",
            MoveAction::ConfirmReceived => "received",
            MoveAction::RaiseCorrection => "correction",
        };
        format!("mv:{tag}:{move_id}")
    }

    /// Decodes a callback string back into `(action, move id)`. The channel
    /// adapter feeds these, together with the pressing actor, back into the
    /// engine.
    pub fn parse(data: &str) -> Option<(MoveAction, MoveId)> {
        let rest = data.strip_prefix("mv:")?;
        let (tag, id) = rest.split_once(':')?;
        let action = match tag {
            "handed" => MoveAction::ConfirmHanded,
            "received" => MoveAction::ConfirmReceived,
            "correction" => MoveAction::RaiseCorrection,
            _ => return None,
        };
        Some((action, id.parse().ok()?))
    }
}

impl Endpoint {
    /// The action pair offered to recipients on this side of the move.
    pub fn actions(&self) -> [MoveAction; 2] {
        match self {
            Endpoint::Source => [MoveAction::ConfirmHanded, MoveAction::RaiseCorrection],
            Endpoint::Destination => [MoveAction::ConfirmReceived, MoveAction::RaiseCorrection],
        }
    }
}

/// Delivery seam to whatever chat transport fronts the system.
#[async_trait]
pub trait NotificationChannel: Send + Sync + 'static {
    async fn send_text(&self, to: UserId, text: &str) -> anyhow::Result<()>;

    async fn send_photo(
        &self,
        to: UserId,
        photo: &str,
        caption: &str,
        actions: &[MoveAction],
    ) -> anyhow::Result<()>;

    /// Ordered photo group. Grouped delivery cannot carry actions in the
    /// target channel; callers follow up with `send_prompt`.
    async fn send_album(&self, to: UserId, photos: &[String], caption: &str)
        -> anyhow::Result<()>;

    async fn send_prompt(
        &self,
        to: UserId,
        text: &str,
        actions: &[MoveAction],
    ) -> anyhow::Result<()>;
}

/// Per-endpoint fan-out result.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Delivery {
    pub succeeded: usize,
    pub attempted: usize,
}

/// Fans a move notification out to every recipient at one endpoint,
/// best-effort per recipient.
pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
}

impl Notifier {
    pub fn new(channel: Arc<dyn NotificationChannel>) -> Self {
        Self { channel }
    }

    pub async fn notify(
        &self,
        move_id: MoveId,
        recipients: &[UserId],
        photos: &[String],
        caption: &str,
        endpoint: Endpoint,
    ) -> Delivery {
        let actions = endpoint.actions();
        let mut delivery = Delivery {
            succeeded: 0,
            attempted: recipients.len(),
        };
        for &recipient in recipients {
            match self.deliver(recipient, photos, caption, &actions).await {
                Ok(()) => delivery.succeeded += 1,
                Err(err) => warn!(
                    move_id,
                    recipient,
                    side = %endpoint,
                    error = %err,
                    "notification delivery failed"
                ),
            }
        }
        delivery
    }

    async fn deliver(
        &self,
        to: UserId,
        photos: &[String],
        caption: &str,
        actions: &[MoveAction],
    ) -> anyhow::Result<()> {
        match photos {
            [] => self.channel.send_prompt(to, caption, actions).await,
            [single] => self.channel.send_photo(to, single, caption, actions).await,
            many => {
                self.channel.send_album(to, many, caption).await?;
                self.channel
                    .send_prompt(to, "Confirm with the actions below.", actions)
                    .await
            }
        }
    }
}
