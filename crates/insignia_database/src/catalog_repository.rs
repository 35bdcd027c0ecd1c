//! PostgreSQL implementation of MediaCatalog.

use crate::connection::{with_connection, DbPool};
use crate::schema::{media_blobs, media_links};
use crate::{BlobRow, DatabaseResult, LinkRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use insignia_core::{BlobId, BlobRecord, LinkRecord};
use insignia_error::{
    CoordinationError, CoordinationErrorKind, DatabaseError, DatabaseErrorKind, InsigniaResult,
    NotFoundError, NotFoundErrorKind, ValidationError, ValidationErrorKind,
};
use insignia_interface::{BlobClaim, LinkBinding, LinkCursor, MediaCatalog, Unbound};
use std::time::Duration;
use uuid::Uuid;

const PENDING: &str = "pending";
const STORED: &str = "stored";

/// PostgreSQL implementation of [`MediaCatalog`] using Diesel ORM.
///
/// Every operation runs in its own transaction on a pooled connection:
///
/// - claims insert against the `(media_class, digest)` unique index and lock
///   the existing row on conflict
/// - `bind_link` holds the blob `FOR SHARE` while inserting the link
/// - `unbind_link` and `release_blob` hold the blob `FOR UPDATE` while they
///   count its links
///
/// A release therefore never observes a count that a concurrent bind is about
/// to invalidate, and a bind never commits against a released blob.
#[derive(Clone)]
pub struct PostgresMediaCatalog {
    pool: DbPool,
}

impl std::fmt::Debug for PostgresMediaCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresMediaCatalog")
            .field("pool", &self.pool.state())
            .finish()
    }
}

impl PostgresMediaCatalog {
    /// Create a catalog over a connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// What `bind_link` found, decided inside the transaction and mapped to the
/// caller-facing error outside it.
enum BindOutcome {
    Created(LinkRecord),
    AlreadyBound(LinkRecord),
    TakenByOther,
    BlobReleased,
}

fn stale_cutoff(now: DateTime<Utc>, stale_after: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(stale_after)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
}

fn count_links(conn: &mut PgConnection, blob_id: Uuid) -> DatabaseResult<u64> {
    let count: i64 = media_links::table
        .filter(media_links::blob_id.eq(blob_id))
        .count()
        .get_result(conn)?;
    Ok(u64::try_from(count).unwrap_or_default())
}

fn claim(
    conn: &mut PgConnection,
    candidate: &BlobRecord,
    stale_after: Duration,
) -> DatabaseResult<BlobClaim> {
    let row = BlobRow::from(candidate);

    let inserted: Option<BlobRow> = diesel::insert_into(media_blobs::table)
        .values(&row)
        .on_conflict((media_blobs::media_class, media_blobs::digest))
        .do_nothing()
        .returning(BlobRow::as_returning())
        .get_result(conn)
        .optional()?;
    if let Some(inserted) = inserted {
        return Ok(BlobClaim::Claimed(inserted.try_into()?));
    }

    let existing: Option<BlobRow> = media_blobs::table
        .filter(media_blobs::media_class.eq(&row.media_class))
        .filter(media_blobs::digest.eq(&row.digest))
        .select(BlobRow::as_select())
        .for_update()
        .get_result(conn)
        .optional()?;
    let Some(existing) = existing else {
        // Released between our insert attempt and the lock.
        return Err(DatabaseError::new(DatabaseErrorKind::Conflict(format!(
            "blob claim for {}/{} changed concurrently",
            row.media_class, row.digest
        ))));
    };

    if existing.state == STORED {
        return Ok(BlobClaim::Stored(existing.try_into()?));
    }
    let fresh = stale_cutoff(row.created_at, stale_after).is_none_or(|cutoff| existing.created_at > cutoff);
    if fresh {
        return Ok(BlobClaim::InFlight(existing.try_into()?));
    }

    tracing::warn!(
        stale_id = %existing.id,
        media_class = %existing.media_class,
        "Taking over stale blob claim"
    );
    let taken: BlobRow = diesel::update(media_blobs::table.find(existing.id))
        .set((
            media_blobs::id.eq(row.id),
            media_blobs::location.eq(&row.location),
            media_blobs::size_bytes.eq(row.size_bytes),
            media_blobs::created_at.eq(row.created_at),
        ))
        .returning(BlobRow::as_returning())
        .get_result(conn)?;
    Ok(BlobClaim::Claimed(taken.try_into()?))
}

fn bind(conn: &mut PgConnection, link: &LinkRecord) -> DatabaseResult<BindOutcome> {
    let row = LinkRow::from(link);

    let blob: Option<Uuid> = media_blobs::table
        .filter(media_blobs::id.eq(row.blob_id))
        .filter(media_blobs::state.eq(STORED))
        .select(media_blobs::id)
        .for_share()
        .get_result(conn)
        .optional()?;
    if blob.is_none() {
        return Ok(BindOutcome::BlobReleased);
    }

    let inserted: Option<LinkRow> = diesel::insert_into(media_links::table)
        .values(&row)
        .on_conflict((media_links::media_class, media_links::name))
        .do_nothing()
        .returning(LinkRow::as_returning())
        .get_result(conn)
        .optional()?;
    if let Some(inserted) = inserted {
        return Ok(BindOutcome::Created(inserted.into()));
    }

    let existing: Option<LinkRow> = media_links::table
        .find((&row.media_class, &row.name))
        .select(LinkRow::as_select())
        .get_result(conn)
        .optional()?;
    match existing {
        Some(existing) if existing.blob_id == row.blob_id => {
            Ok(BindOutcome::AlreadyBound(existing.into()))
        }
        Some(_) => Ok(BindOutcome::TakenByOther),
        None => Err(DatabaseError::new(DatabaseErrorKind::Conflict(format!(
            "link {}/{} changed concurrently",
            row.media_class, row.name
        )))),
    }
}

fn unbind(conn: &mut PgConnection, media_class: &str, name: &str) -> DatabaseResult<Option<Unbound>> {
    let link: Option<LinkRow> = media_links::table
        .find((media_class, name))
        .select(LinkRow::as_select())
        .for_update()
        .get_result(conn)
        .optional()?;
    let Some(link) = link else {
        return Ok(None);
    };

    // Serialize against release_blob and bind_link on the same blob.
    media_blobs::table
        .find(link.blob_id)
        .select(media_blobs::id)
        .for_update()
        .get_result::<Uuid>(conn)
        .optional()?;

    diesel::delete(media_links::table.find((media_class, name))).execute(conn)?;
    let remaining = count_links(conn, link.blob_id)?;
    Ok(Some(Unbound::new(link.into(), remaining)))
}

fn release(conn: &mut PgConnection, id: Uuid) -> DatabaseResult<Option<BlobRecord>> {
    let blob: Option<BlobRow> = media_blobs::table
        .find(id)
        .filter(media_blobs::state.eq(STORED))
        .select(BlobRow::as_select())
        .for_update()
        .get_result(conn)
        .optional()?;
    let Some(blob) = blob else {
        return Ok(None);
    };

    if count_links(conn, id)? > 0 {
        return Ok(None);
    }
    diesel::delete(media_blobs::table.find(id)).execute(conn)?;
    Ok(Some(blob.try_into()?))
}

fn expired_page(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
    after: Option<LinkCursor>,
    limit: usize,
) -> DatabaseResult<Vec<LinkRecord>> {
    let mut query = media_links::table
        .filter(media_links::expires_at.lt(now))
        .select(LinkRow::as_select())
        .into_boxed();

    if let Some(cursor) = after {
        query = query.filter(
            media_links::expires_at
                .gt(cursor.expires_at)
                .or(media_links::expires_at
                    .eq(cursor.expires_at)
                    .and(media_links::media_class.gt(cursor.media_class.clone())))
                .or(media_links::expires_at
                    .eq(cursor.expires_at)
                    .and(media_links::media_class.eq(cursor.media_class))
                    .and(media_links::name.gt(cursor.name))),
        );
    }

    let rows: Vec<LinkRow> = query
        .order((
            media_links::expires_at.asc(),
            media_links::media_class.asc(),
            media_links::name.asc(),
        ))
        .limit(i64::try_from(limit).unwrap_or(i64::MAX))
        .load(conn)?;
    Ok(rows.into_iter().map(Into::into).collect())
}

fn unreferenced_page(
    conn: &mut PgConnection,
    created_before: DateTime<Utc>,
    after: Option<Uuid>,
    limit: usize,
) -> DatabaseResult<Vec<BlobRecord>> {
    let mut query = media_blobs::table
        .filter(media_blobs::state.eq(STORED))
        .filter(media_blobs::created_at.lt(created_before))
        .filter(diesel::dsl::not(
            media_blobs::id.eq_any(media_links::table.select(media_links::blob_id)),
        ))
        .select(BlobRow::as_select())
        .into_boxed();

    if let Some(after) = after {
        query = query.filter(media_blobs::id.gt(after));
    }

    let rows: Vec<BlobRow> = query
        .order(media_blobs::id.asc())
        .limit(i64::try_from(limit).unwrap_or(i64::MAX))
        .load(conn)?;
    rows.into_iter().map(BlobRecord::try_from).collect()
}

#[async_trait]
impl MediaCatalog for PostgresMediaCatalog {
    #[tracing::instrument(skip(self, candidate), fields(media_class = %candidate.media_class(), digest = %candidate.digest()))]
    async fn claim_blob(
        &self,
        candidate: BlobRecord,
        stale_after: Duration,
    ) -> InsigniaResult<BlobClaim> {
        with_connection(&self.pool, move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| claim(conn, &candidate, stale_after))
        })
        .await
    }

    async fn confirm_blob(&self, id: &BlobId) -> InsigniaResult<BlobRecord> {
        let uuid = *id.as_uuid();
        let confirmed = with_connection(&self.pool, move |conn| {
            let row: Option<BlobRow> = diesel::update(media_blobs::table.find(uuid))
                .set(media_blobs::state.eq(STORED))
                .returning(BlobRow::as_returning())
                .get_result(conn)
                .optional()?;
            row.map(BlobRecord::try_from).transpose()
        })
        .await?;

        confirmed.ok_or_else(|| NotFoundError::new(NotFoundErrorKind::Blob(id.to_string())).into())
    }

    async fn abandon_blob(&self, id: &BlobId) -> InsigniaResult<()> {
        let uuid = *id.as_uuid();
        with_connection(&self.pool, move |conn| {
            diesel::delete(
                media_blobs::table
                    .find(uuid)
                    .filter(media_blobs::state.eq(PENDING)),
            )
            .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn find_blob(&self, id: &BlobId) -> InsigniaResult<Option<BlobRecord>> {
        let uuid = *id.as_uuid();
        with_connection(&self.pool, move |conn| {
            let row: Option<BlobRow> = media_blobs::table
                .find(uuid)
                .filter(media_blobs::state.eq(STORED))
                .select(BlobRow::as_select())
                .get_result(conn)
                .optional()?;
            row.map(BlobRecord::try_from).transpose()
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn release_blob(&self, id: &BlobId) -> InsigniaResult<Option<BlobRecord>> {
        let uuid = *id.as_uuid();
        with_connection(&self.pool, move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| release(conn, uuid))
        })
        .await
    }

    #[tracing::instrument(skip(self, link), fields(media_class = %link.media_class(), name = %link.name()))]
    async fn bind_link(&self, link: LinkRecord) -> InsigniaResult<LinkBinding> {
        let (media_class, name, blob_id) =
            (link.media_class().clone(), link.name().clone(), *link.blob_id());
        let outcome = with_connection(&self.pool, move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| bind(conn, &link))
        })
        .await?;

        match outcome {
            BindOutcome::Created(link) => Ok(LinkBinding::Created(link)),
            BindOutcome::AlreadyBound(link) => Ok(LinkBinding::AlreadyBound(link)),
            BindOutcome::TakenByOther => Err(ValidationError::new(
                ValidationErrorKind::LinkAlreadyExists { media_class, name },
            )
            .into()),
            BindOutcome::BlobReleased => Err(CoordinationError::new(
                CoordinationErrorKind::BlobReleased(blob_id.to_string()),
            )
            .into()),
        }
    }

    async fn find_link(&self, media_class: &str, name: &str) -> InsigniaResult<Option<LinkRecord>> {
        let (media_class, name) = (media_class.to_string(), name.to_string());
        with_connection(&self.pool, move |conn| {
            let row: Option<LinkRow> = media_links::table
                .find((&media_class, &name))
                .select(LinkRow::as_select())
                .get_result(conn)
                .optional()?;
            Ok(row.map(Into::into))
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn unbind_link(&self, media_class: &str, name: &str) -> InsigniaResult<Option<Unbound>> {
        let (media_class, name) = (media_class.to_string(), name.to_string());
        with_connection(&self.pool, move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| unbind(conn, &media_class, &name))
        })
        .await
    }

    async fn count_links(&self, id: &BlobId) -> InsigniaResult<u64> {
        let uuid = *id.as_uuid();
        with_connection(&self.pool, move |conn| count_links(conn, uuid)).await
    }

    async fn expired_links(
        &self,
        now: DateTime<Utc>,
        after: Option<LinkCursor>,
        limit: usize,
    ) -> InsigniaResult<Vec<LinkRecord>> {
        with_connection(&self.pool, move |conn| expired_page(conn, now, after, limit)).await
    }

    async fn unreferenced_blobs(
        &self,
        created_before: DateTime<Utc>,
        after: Option<BlobId>,
        limit: usize,
    ) -> InsigniaResult<Vec<BlobRecord>> {
        let after = after.map(|id| *id.as_uuid());
        with_connection(&self.pool, move |conn| {
            unreferenced_page(conn, created_before, after, limit)
        })
        .await
    }
}
