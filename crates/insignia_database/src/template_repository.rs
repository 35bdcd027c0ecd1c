//! PostgreSQL implementation of TemplateRepository.

use crate::connection::{with_connection, DbPool};
use crate::schema::gfx_templates;
use crate::{DatabaseResult, TemplateRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use insignia_core::{Placeholder, TemplateKey, TemplateRecord};
use insignia_error::{DatabaseError, InsigniaResult};
use insignia_interface::TemplateRepository;

/// PostgreSQL implementation of [`TemplateRepository`].
#[derive(Clone)]
pub struct PostgresTemplateRepository {
    pool: DbPool,
}

impl std::fmt::Debug for PostgresTemplateRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTemplateRepository")
            .field("pool", &self.pool.state())
            .finish()
    }
}

impl PostgresTemplateRepository {
    /// Create a repository over a connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn into_record(row: Option<TemplateRow>) -> DatabaseResult<Option<TemplateRecord>> {
    row.map(TemplateRecord::try_from).transpose()
}

#[async_trait]
impl TemplateRepository for PostgresTemplateRepository {
    #[tracing::instrument(skip(self, record), fields(key = ?record.key()))]
    async fn save(&self, record: TemplateRecord) -> InsigniaResult<Option<TemplateRecord>> {
        with_connection(&self.pool, move |conn| {
            let row = TemplateRow::try_from(&record)?;
            conn.transaction::<_, DatabaseError, _>(|conn| {
                let previous: Option<TemplateRow> = gfx_templates::table
                    .find((&row.template_type, row.tournament_id))
                    .select(TemplateRow::as_select())
                    .for_update()
                    .get_result(conn)
                    .optional()?;

                diesel::insert_into(gfx_templates::table)
                    .values(&row)
                    .on_conflict((gfx_templates::template_type, gfx_templates::tournament_id))
                    .do_update()
                    .set(&row)
                    .execute(conn)?;

                into_record(previous)
            })
        })
        .await
    }

    async fn find(&self, key: &TemplateKey) -> InsigniaResult<Option<TemplateRecord>> {
        let key = key.clone();
        with_connection(&self.pool, move |conn| {
            let row: Option<TemplateRow> = gfx_templates::table
                .find((&key.template_type, key.tournament_id))
                .select(TemplateRow::as_select())
                .get_result(conn)
                .optional()?;
            into_record(row)
        })
        .await
    }

    async fn update_placeholders(
        &self,
        key: &TemplateKey,
        placeholders: Vec<Placeholder>,
        updated_at: DateTime<Utc>,
    ) -> InsigniaResult<Option<TemplateRecord>> {
        let key = key.clone();
        with_connection(&self.pool, move |conn| {
            let placeholders = serde_json::to_value(&placeholders)?;
            let row: Option<TemplateRow> =
                diesel::update(gfx_templates::table.find((&key.template_type, key.tournament_id)))
                    .set((
                        gfx_templates::placeholders.eq(placeholders),
                        gfx_templates::updated_at.eq(updated_at),
                    ))
                    .returning(TemplateRow::as_returning())
                    .get_result(conn)
                    .optional()?;
            into_record(row)
        })
        .await
    }

    async fn remove(&self, key: &TemplateKey) -> InsigniaResult<Option<TemplateRecord>> {
        let key = key.clone();
        with_connection(&self.pool, move |conn| {
            let row: Option<TemplateRow> =
                diesel::delete(gfx_templates::table.find((&key.template_type, key.tournament_id)))
                    .returning(TemplateRow::as_returning())
                    .get_result(conn)
                    .optional()?;
            into_record(row)
        })
        .await
    }
}
