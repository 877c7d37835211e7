use std::fmt;

use chrono::NaiveDateTime;
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::Serialize;

use crate::schema::*;

pub type MoveId = i64;
pub type CityId = i64;
pub type PointId = i64;
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum MoveStatus {
    Draft,
    Sent,
    Done,
    Canceled,
}

impl MoveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveStatus::Draft => "draft",
            MoveStatus::Sent => "sent",
            MoveStatus::Done => "done",
            MoveStatus::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(MoveStatus::Draft),
            "sent" => Some(MoveStatus::Sent),
            "done" => Some(MoveStatus::Done),
            "canceled" => Some(MoveStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MoveStatus::Done | MoveStatus::Canceled)
    }
}

impl fmt::Display for MoveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<DB> ToSql<Text, DB> for MoveStatus
where
    DB: Backend,
    str: ToSql<Text, DB>,
{
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, DB>) -> serialize::Result {
        self.as_str().to_sql(out)
    }
}

impl<DB> FromSql<Text, DB> for MoveStatus
where
    DB: Backend,
    String: FromSql<Text, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
        let value = String::from_sql(bytes)?;
        MoveStatus::parse(&value)
            .ok_or_else(|| format!("unrecognized move status: {value}").into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionStatus {
    None,
    Requested,
    Resolved,
}

impl CorrectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionStatus::None => "none",
            CorrectionStatus::Requested => "requested",
            CorrectionStatus::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(CorrectionStatus::None),
            "requested" => Some(CorrectionStatus::Requested),
            "resolved" => Some(CorrectionStatus::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for CorrectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<DB> ToSql<Text, DB> for CorrectionStatus
where
    DB: Backend,
    str: ToSql<Text, DB>,
{
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, DB>) -> serialize::Result {
        self.as_str().to_sql(out)
    }
}

impl<DB> FromSql<Text, DB> for CorrectionStatus
where
    DB: Backend,
    String: FromSql<Text, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
        let value = String::from_sql(bytes)?;
        CorrectionStatus::parse(&value)
            .ok_or_else(|| format!("unrecognized correction status: {value}").into())
    }
}

/// Which side of a move an actor or notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Source,
    Destination,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Source => "source",
            Endpoint::Destination => "destination",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = moves)]
pub struct Move {
    pub id: MoveId,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub created_by: UserId,
    pub operator_id: UserId,
    pub status: MoveStatus,
    pub from_point_id: Option<PointId>,
    pub to_point_id: Option<PointId>,
    pub preview_photo: Option<String>,
    pub note: Option<String>,
    pub invoice_version: i32,
    pub handed_at: Option<NaiveDateTime>,
    pub handed_by: Option<UserId>,
    pub received_at: Option<NaiveDateTime>,
    pub received_by: Option<UserId>,
    pub correction_status: CorrectionStatus,
    pub correction_note: Option<String>,
    pub correction_photo: Option<String>,
    pub correction_by: Option<UserId>,
    pub correction_at: Option<NaiveDateTime>,
}

impl Move {
    /// A route is complete once both endpoints are chosen.
    pub fn route(&self) -> Option<(PointId, PointId)> {
        match (self.from_point_id, self.to_point_id) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = moves)]
pub struct NewMove {
    pub created_by: UserId,
    pub operator_id: UserId,
    pub status: MoveStatus,
    pub invoice_version: i32,
    pub correction_status: CorrectionStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = move_photos)]
pub struct InvoicePhoto {
    pub move_id: MoveId,
    pub version: i32,
    pub position: i32,
    pub photo_ref: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = points)]
pub struct Point {
    pub id: PointId,
    pub city_id: CityId,
    pub name: String,
}

/// The `(id, name)` shape the directory hands to routing menus.
#[derive(Debug, Clone, Queryable, Serialize)]
pub struct PointSummary {
    pub id: PointId,
    pub name: String,
}
