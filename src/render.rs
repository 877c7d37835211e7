//! Plain-text cards for notifications and operator messages. The
//! presentation layer only reads state the engine produced; nothing here
//! mutates anything.

use chrono::NaiveDateTime;

use crate::engine::SendReport;
use crate::models::{Endpoint, Move, MoveStatus, UserId};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn status_label(status: MoveStatus) -> &'static str {
    match status {
        MoveStatus::Draft => "draft",
        MoveStatus::Sent => "sent",
        MoveStatus::Done => "completed",
        MoveStatus::Canceled => "canceled",
    }
}

fn endpoint_label(endpoint: Endpoint) -> &'static str {
    match endpoint {
        Endpoint::Source => "Sender",
        Endpoint::Destination => "Receiver",
    }
}

fn ack_line(by: Option<UserId>, at: Option<NaiveDateTime>) -> String {
    match (by, at) {
        (Some(by), Some(at)) => format!("{by} at {}", at.format(TIME_FORMAT)),
        _ => "pending".to_string(),
    }
}

/// The move card attached to every dispatch and shown on demand.
pub fn move_card(mv: &Move, from_name: Option<&str>, to_name: Option<&str>) -> String {
    let mut lines = vec![
        format!("Move #{} (V{})", mv.id, mv.invoice_version),
        format!("Status: {}", status_label(mv.status)),
        format!("From: {}", from_name.unwrap_or("—")),
        format!("To: {}", to_name.unwrap_or("—")),
        String::new(),
        format!("Handed over: {}", ack_line(mv.handed_by, mv.handed_at)),
        format!("Received: {}", ack_line(mv.received_by, mv.received_at)),
    ];
    if let Some(note) = mv.note.as_deref().filter(|note| !note.is_empty()) {
        lines.push(String::new());
        lines.push(format!("Note: {note}"));
    }
    lines.push(String::new());
    lines.push(format!("Created: {}", mv.created_at.format(TIME_FORMAT)));
    lines.join("\n")
}

/// Operator message after one side confirms.
pub fn acknowledgement_card(
    mv: &Move,
    endpoint: Endpoint,
    point_name: Option<&str>,
    actor: UserId,
) -> String {
    let at = match endpoint {
        Endpoint::Source => mv.handed_at,
        Endpoint::Destination => mv.received_at,
    };
    let when = at
        .map(|at| at.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "—".to_string());
    format!(
        "{} {} confirmed.\nBy: {actor}\nAt: {when}\nMove: #{}",
        endpoint_label(endpoint),
        point_name.unwrap_or("—"),
        mv.id
    )
}

/// Operator message once both sides have confirmed.
pub fn completion_card(mv: &Move, from_name: Option<&str>, to_name: Option<&str>) -> String {
    format!(
        "Move #{} confirmed by both points.\nSender {}: {}\nReceiver {}: {}",
        mv.id,
        from_name.unwrap_or("—"),
        ack_line(mv.handed_by, mv.handed_at),
        to_name.unwrap_or("—"),
        ack_line(mv.received_by, mv.received_at),
    )
}

/// Operator message when a point disputes the current invoice.
pub fn correction_card(
    mv: &Move,
    endpoint: Endpoint,
    point_name: Option<&str>,
    actor: UserId,
    note: &str,
) -> String {
    format!(
        "Correction requested on move #{} (V{}).\n{} {} ({actor})\nNote: {note}",
        mv.id,
        mv.invoice_version,
        endpoint_label(endpoint),
        point_name.unwrap_or("—"),
    )
}

/// Operator summary after a dispatch round.
pub fn delivery_summary(mv: &Move, report: &SendReport) -> String {
    format!(
        "Move #{} (V{}) dispatched.\nSender side: reached {}/{}\nReceiver side: reached {}/{}",
        mv.id,
        report.invoice_version,
        report.source.succeeded,
        report.source.attempted,
        report.destination.succeeded,
        report.destination.attempted,
    )
}
