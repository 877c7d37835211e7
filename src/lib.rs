//! Core of a multi-party goods-transfer workflow between retail points:
//! an operator drafts a move, attaches proof-of-shipment photos, routes it
//! between two points, and each point confirms handoff/receipt. A
//! correction loop lets either point dispute the current invoice, after
//! which the operator issues a version-incremented replacement that resets
//! both confirmations.
//!
//! The chat front end (menus, keyboards, transport) lives outside this
//! crate and talks to [`engine::MoveEngine`] through the traits in
//! [`store`], [`directory`] and [`notify`].

pub mod config;
pub mod db;
pub mod directory;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod render;
pub mod schema;
pub mod store;

pub use config::{BackendKind, Config};
pub use engine::{AckOutcome, Acknowledgement, MoveEngine, SendReport};
pub use error::{EngineError, EngineResult, StorageError};
pub use models::{CorrectionStatus, Endpoint, Move, MoveStatus};
pub use notify::{Delivery, MoveAction, NotificationChannel, Notifier};
pub use store::{AckWrite, MoveStore, PhotoStore, Stores};
