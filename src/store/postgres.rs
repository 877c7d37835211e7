use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::{dsl::exists, prelude::*, select};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::db::{self, PgPool};
use crate::directory::{BindingService, DirectoryService};
use crate::error::StorageError;
use crate::models::{
    CityId, CorrectionStatus, InvoicePhoto, Move, MoveId, MoveStatus, NewMove, PointId,
    PointSummary, UserId,
};
use crate::schema::{cities, move_photos, moves, point_users, points};
use crate::store::{AckWrite, MoveStore, PhotoStore};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");

type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

/// Networked relational store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect(database_url: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        let pool = db::init_pg_pool(database_url, max_pool_size)?;
        let mut conn = pool
            .get()
            .context("failed to acquire connection for migrations")?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow::anyhow!("failed to run postgres migrations: {err}"))?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PgPooled, StorageError> {
        Ok(self.pool.get()?)
    }

    pub fn add_city(&self, name: &str) -> Result<CityId, StorageError> {
        let mut conn = self.conn()?;
        diesel::insert_into(cities::table)
            .values(cities::name.eq(name))
            .on_conflict(cities::name)
            .do_nothing()
            .execute(&mut conn)?;
        let id = cities::table
            .filter(cities::name.eq(name))
            .select(cities::id)
            .first(&mut conn)?;
        Ok(id)
    }

    pub fn add_point(&self, city: CityId, name: &str) -> Result<PointId, StorageError> {
        let mut conn = self.conn()?;
        diesel::insert_into(points::table)
            .values((points::city_id.eq(city), points::name.eq(name)))
            .on_conflict((points::city_id, points::name))
            .do_nothing()
            .execute(&mut conn)?;
        let id = points::table
            .filter(points::city_id.eq(city))
            .filter(points::name.eq(name))
            .select(points::id)
            .first(&mut conn)?;
        Ok(id)
    }

    pub fn bind_identity(&self, identity: UserId, point: PointId) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        diesel::insert_into(point_users::table)
            .values((
                point_users::user_id.eq(identity),
                point_users::point_id.eq(point),
                point_users::created_at.eq(now()),
            ))
            .on_conflict(point_users::user_id)
            .do_update()
            .set(point_users::point_id.eq(point))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn unbind_identity(&self, identity: UserId) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(point_users::table.find(identity)).execute(&mut conn)?;
        Ok(deleted > 0)
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl MoveStore for PgStore {
    fn create(&self, created_by: UserId) -> Result<Move, StorageError> {
        let mut conn = self.conn()?;
        let stamp = now();
        let new_move = NewMove {
            created_by,
            operator_id: created_by,
            status: MoveStatus::Draft,
            invoice_version: 1,
            correction_status: CorrectionStatus::None,
            created_at: stamp,
            updated_at: stamp,
        };
        let created = diesel::insert_into(moves::table)
            .values(&new_move)
            .get_result(&mut conn)?;
        Ok(created)
    }

    fn get(&self, id: MoveId) -> Result<Option<Move>, StorageError> {
        let mut conn = self.conn()?;
        let found = moves::table.find(id).first(&mut conn).optional()?;
        Ok(found)
    }

    fn list_recent(&self, limit: i64) -> Result<Vec<Move>, StorageError> {
        let mut conn = self.conn()?;
        let rows = moves::table
            .order(moves::id.desc())
            .limit(limit)
            .load(&mut conn)?;
        Ok(rows)
    }

    fn list_active(&self, limit: i64) -> Result<Vec<Move>, StorageError> {
        let mut conn = self.conn()?;
        let rows = moves::table
            .filter(moves::status.ne_all(vec![MoveStatus::Done, MoveStatus::Canceled]))
            .order(moves::id.desc())
            .limit(limit)
            .load(&mut conn)?;
        Ok(rows)
    }

    fn list_closed(&self, limit: i64) -> Result<Vec<Move>, StorageError> {
        let mut conn = self.conn()?;
        let rows = moves::table
            .filter(moves::status.eq_any(vec![MoveStatus::Done, MoveStatus::Canceled]))
            .order(moves::id.desc())
            .limit(limit)
            .load(&mut conn)?;
        Ok(rows)
    }

    fn set_from_point(&self, id: MoveId, point: PointId) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let updated = diesel::update(moves::table.find(id))
            .set((
                moves::from_point_id.eq(Some(point)),
                moves::updated_at.eq(now()),
            ))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn set_to_point(&self, id: MoveId, point: PointId) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let updated = diesel::update(moves::table.find(id))
            .set((
                moves::to_point_id.eq(Some(point)),
                moves::updated_at.eq(now()),
            ))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn set_note(&self, id: MoveId, note: Option<&str>) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let updated = diesel::update(moves::table.find(id))
            .set((moves::note.eq(note), moves::updated_at.eq(now())))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn set_preview(&self, id: MoveId, photo: &str) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let updated = diesel::update(moves::table.find(id))
            .set((
                moves::preview_photo.eq(Some(photo)),
                moves::updated_at.eq(now()),
            ))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn set_status(&self, id: MoveId, status: MoveStatus) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let updated = diesel::update(moves::table.find(id))
            .set((moves::status.eq(status), moves::updated_at.eq(now())))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn clear_handoff_state(&self, id: MoveId) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let updated = diesel::update(moves::table.find(id))
            .set((
                moves::handed_at.eq(None::<NaiveDateTime>),
                moves::handed_by.eq(None::<UserId>),
                moves::received_at.eq(None::<NaiveDateTime>),
                moves::received_by.eq(None::<UserId>),
                moves::updated_at.eq(now()),
            ))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn mark_handed(&self, id: MoveId, actor: UserId) -> Result<AckWrite, StorageError> {
        let mut conn = self.conn()?;
        let stamp = now();
        let updated = diesel::update(
            moves::table
                .filter(moves::id.eq(id))
                .filter(moves::handed_at.is_null()),
        )
        .set((
            moves::handed_at.eq(stamp),
            moves::handed_by.eq(actor),
            moves::updated_at.eq(stamp),
        ))
        .execute(&mut conn)?;
        if updated > 0 {
            return Ok(AckWrite::Applied);
        }
        let found: bool = select(exists(moves::table.find(id))).get_result(&mut conn)?;
        Ok(if found {
            AckWrite::AlreadyAcked
        } else {
            AckWrite::Missing
        })
    }

    fn mark_received(&self, id: MoveId, actor: UserId) -> Result<AckWrite, StorageError> {
        let mut conn = self.conn()?;
        let stamp = now();
        let updated = diesel::update(
            moves::table
                .filter(moves::id.eq(id))
                .filter(moves::received_at.is_null()),
        )
        .set((
            moves::received_at.eq(stamp),
            moves::received_by.eq(actor),
            moves::updated_at.eq(stamp),
        ))
        .execute(&mut conn)?;
        if updated > 0 {
            return Ok(AckWrite::Applied);
        }
        let found: bool = select(exists(moves::table.find(id))).get_result(&mut conn)?;
        Ok(if found {
            AckWrite::AlreadyAcked
        } else {
            AckWrite::Missing
        })
    }

    fn request_correction(
        &self,
        id: MoveId,
        actor: UserId,
        note: &str,
        photo: Option<&str>,
    ) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let stamp = now();
        let updated = diesel::update(moves::table.find(id))
            .set((
                moves::correction_status.eq(CorrectionStatus::Requested),
                moves::correction_note.eq(Some(note)),
                moves::correction_photo.eq(photo),
                moves::correction_by.eq(Some(actor)),
                moves::correction_at.eq(Some(stamp)),
                moves::updated_at.eq(stamp),
            ))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn resolve_correction(&self, id: MoveId) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let updated = diesel::update(moves::table.find(id))
            .set((
                moves::correction_status.eq(CorrectionStatus::Resolved),
                moves::updated_at.eq(now()),
            ))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }

    fn bump_invoice_version(&self, id: MoveId) -> Result<Option<i32>, StorageError> {
        let mut conn = self.conn()?;
        let version = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let updated = diesel::update(moves::table.find(id))
                .set((
                    moves::invoice_version.eq(moves::invoice_version + 1),
                    moves::updated_at.eq(now()),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Ok(None);
            }
            moves::table
                .find(id)
                .select(moves::invoice_version)
                .first(conn)
                .map(Some)
        })?;
        Ok(version)
    }

    fn reset_for_reinvoice(&self, id: MoveId) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let updated = diesel::update(moves::table.find(id))
            .set((
                moves::status.eq(MoveStatus::Sent),
                moves::handed_at.eq(None::<NaiveDateTime>),
                moves::handed_by.eq(None::<UserId>),
                moves::received_at.eq(None::<NaiveDateTime>),
                moves::received_by.eq(None::<UserId>),
                moves::correction_status.eq(CorrectionStatus::Resolved),
                moves::updated_at.eq(now()),
            ))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }
}

impl PhotoStore for PgStore {
    fn replace_photos(
        &self,
        move_id: MoveId,
        version: i32,
        refs: &[String],
    ) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(
                move_photos::table
                    .filter(move_photos::move_id.eq(move_id))
                    .filter(move_photos::version.eq(version)),
            )
            .execute(conn)?;
            let rows: Vec<InvoicePhoto> = refs
                .iter()
                .enumerate()
                .map(|(position, photo_ref)| InvoicePhoto {
                    move_id,
                    version,
                    position: position as i32,
                    photo_ref: photo_ref.clone(),
                })
                .collect();
            diesel::insert_into(move_photos::table)
                .values(&rows)
                .execute(conn)?;
            Ok(())
        })?;
        Ok(())
    }

    fn list_photos(&self, move_id: MoveId, version: i32) -> Result<Vec<String>, StorageError> {
        let mut conn = self.conn()?;
        let refs = move_photos::table
            .filter(move_photos::move_id.eq(move_id))
            .filter(move_photos::version.eq(version))
            .order(move_photos::position.asc())
            .select(move_photos::photo_ref)
            .load(&mut conn)?;
        Ok(refs)
    }

    fn list_versions(&self, move_id: MoveId) -> Result<Vec<i32>, StorageError> {
        let mut conn = self.conn()?;
        let versions = move_photos::table
            .filter(move_photos::move_id.eq(move_id))
            .select(move_photos::version)
            .distinct()
            .order(move_photos::version.asc())
            .load(&mut conn)?;
        Ok(versions)
    }
}

impl DirectoryService for PgStore {
    fn list_points(&self, city: CityId) -> Result<Vec<PointSummary>, StorageError> {
        let mut conn = self.conn()?;
        let rows = points::table
            .filter(points::city_id.eq(city))
            .order(points::name.asc())
            .select((points::id, points::name))
            .load(&mut conn)?;
        Ok(rows)
    }

    fn point_name(&self, point: PointId) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn()?;
        let name = points::table
            .find(point)
            .select(points::name)
            .first(&mut conn)
            .optional()?;
        Ok(name)
    }
}

impl BindingService for PgStore {
    fn bound_point(&self, identity: UserId) -> Result<Option<PointId>, StorageError> {
        let mut conn = self.conn()?;
        let point = point_users::table
            .find(identity)
            .select(point_users::point_id)
            .first(&mut conn)
            .optional()?;
        Ok(point)
    }

    fn bound_identities(&self, point: PointId) -> Result<Vec<UserId>, StorageError> {
        let mut conn = self.conn()?;
        let identities = point_users::table
            .filter(point_users::point_id.eq(point))
            .order(point_users::created_at.desc())
            .select(point_users::user_id)
            .load(&mut conn)?;
        Ok(identities)
    }
}
