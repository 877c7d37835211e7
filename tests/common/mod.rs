use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use pointmove::engine::MoveEngine;
use pointmove::models::{PointId, UserId};
use pointmove::notify::{MoveAction, NotificationChannel};
use pointmove::store::sqlite::SqliteStore;
use pointmove::store::Stores;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

static TRACING: Lazy<()> = Lazy::new(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
});

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Text {
        to: UserId,
        text: String,
    },
    Photo {
        to: UserId,
        photo: String,
        caption: String,
        actions: Vec<MoveAction>,
    },
    Album {
        to: UserId,
        photos: Vec<String>,
        caption: String,
    },
    Prompt {
        to: UserId,
        text: String,
        actions: Vec<MoveAction>,
    },
}

#[allow(dead_code)]
impl Outgoing {
    pub fn to(&self) -> UserId {
        match self {
            Outgoing::Text { to, .. }
            | Outgoing::Photo { to, .. }
            | Outgoing::Album { to, .. }
            | Outgoing::Prompt { to, .. } => *to,
        }
    }
}

/// Channel fake: records everything, optionally failing for chosen
/// recipients.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeChannel {
    outgoing: Mutex<Vec<Outgoing>>,
    unreachable: Mutex<HashSet<UserId>>,
}

#[allow(dead_code)]
impl FakeChannel {
    pub async fn mark_unreachable(&self, recipient: UserId) {
        self.unreachable.lock().await.insert(recipient);
    }

    pub async fn outgoing(&self) -> Vec<Outgoing> {
        self.outgoing.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.outgoing.lock().await.clear();
    }

    pub async fn sent_to(&self, recipient: UserId) -> Vec<Outgoing> {
        self.outgoing()
            .await
            .into_iter()
            .filter(|message| message.to() == recipient)
            .collect()
    }

    async fn record(&self, message: Outgoing) -> Result<()> {
        if self.unreachable.lock().await.contains(&message.to()) {
            anyhow::bail!("recipient {} is unreachable", message.to());
        }
        self.outgoing.lock().await.push(message);
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for FakeChannel {
    async fn send_text(&self, to: UserId, text: &str) -> Result<()> {
        self.record(Outgoing::Text {
            to,
            text: text.to_string(),
        })
        .await
    }

    async fn send_photo(
        &self,
        to: UserId,
        photo: &str,
        caption: &str,
        actions: &[MoveAction],
    ) -> Result<()> {
        self.record(Outgoing::Photo {
            to,
            photo: photo.to_string(),
            caption: caption.to_string(),
            actions: actions.to_vec(),
        })
        .await
    }

    async fn send_album(&self, to: UserId, photos: &[String], caption: &str) -> Result<()> {
        self.record(Outgoing::Album {
            to,
            photos: photos.to_vec(),
            caption: caption.to_string(),
        })
        .await
    }

    async fn send_prompt(&self, to: UserId, text: &str, actions: &[MoveAction]) -> Result<()> {
        self.record(Outgoing::Prompt {
            to,
            text: text.to_string(),
            actions: actions.to_vec(),
        })
        .await
    }
}

/// Engine over a fresh single-file store plus the recording channel.
#[allow(dead_code)]
pub struct TestHarness {
    pub engine: MoveEngine,
    pub store: Arc<SqliteStore>,
    pub channel: Arc<FakeChannel>,
    _tmp: TempDir,
}

#[allow(dead_code)]
impl TestHarness {
    pub fn new() -> Result<Self> {
        Lazy::force(&TRACING);

        let tmp = tempfile::tempdir()?;
        let db_path = tmp.path().join("moves.db");
        let store = Arc::new(SqliteStore::connect(
            db_path.to_str().expect("temp dir path is valid utf-8"),
            1,
        )?);
        let channel = Arc::new(FakeChannel::default());
        let engine = MoveEngine::new(Stores::from_backend(store.clone()), channel.clone());

        Ok(Self {
            engine,
            store,
            channel,
            _tmp: tmp,
        })
    }

    /// One city with two points, the default route used by most tests.
    pub fn seed_route(&self) -> Result<(PointId, PointId)> {
        let city = self.store.add_city("Kyiv")?;
        let from = self.store.add_point(city, "Central")?;
        let to = self.store.add_point(city, "Depot")?;
        Ok((from, to))
    }

    pub fn bind(&self, identity: UserId, point: PointId) -> Result<()> {
        self.store.bind_identity(identity, point)?;
        Ok(())
    }
}

/// Bare store on a fresh temp file, for store-contract tests.
#[allow(dead_code)]
pub fn open_store() -> Result<(Arc<SqliteStore>, TempDir)> {
    Lazy::force(&TRACING);
    let tmp = tempfile::tempdir()?;
    let db_path = tmp.path().join("moves.db");
    let store = Arc::new(SqliteStore::connect(
        db_path.to_str().expect("temp dir path is valid utf-8"),
        1,
    )?);
    Ok((store, tmp))
}

#[allow(dead_code)]
pub fn refs(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
