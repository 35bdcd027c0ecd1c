//! Row types and conversions to the core records.

use crate::schema::{gfx_templates, media_blobs, media_links};
use crate::DatabaseResult;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use insignia_core::{
    BlobId, BlobRecord, BlobState, ContentDigest, LinkRecord, Placeholder, TemplateKey,
    TemplateRecord,
};
use insignia_error::{DatabaseError, DatabaseErrorKind};
use std::path::PathBuf;
use uuid::Uuid;

/// A row of `media_blobs`.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = media_blobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BlobRow {
    /// Blob identifier
    pub id: Uuid,
    /// Media class
    pub media_class: String,
    /// Hex content digest
    pub digest: String,
    /// Path relative to the blob root
    pub location: String,
    /// Stored size
    pub size_bytes: i64,
    /// `pending` or `stored`
    pub state: String,
    /// Claim time
    pub created_at: DateTime<Utc>,
}

impl From<&BlobRecord> for BlobRow {
    fn from(record: &BlobRecord) -> Self {
        Self {
            id: *record.id().as_uuid(),
            media_class: record.media_class().clone(),
            digest: record.digest().as_str().to_string(),
            location: record.location().to_string_lossy().into_owned(),
            size_bytes: i64::try_from(*record.size_bytes()).unwrap_or(i64::MAX),
            state: record.state().to_string(),
            created_at: *record.created_at(),
        }
    }
}

impl TryFrom<BlobRow> for BlobRecord {
    type Error = DatabaseError;

    fn try_from(row: BlobRow) -> DatabaseResult<Self> {
        let state: BlobState = row
            .state
            .parse()
            .map_err(|e: String| DatabaseError::new(DatabaseErrorKind::Serialization(e)))?;
        Ok(BlobRecord::from_parts(
            BlobId::from(row.id),
            row.media_class,
            ContentDigest::new(row.digest),
            PathBuf::from(row.location),
            u64::try_from(row.size_bytes).unwrap_or_default(),
            state,
            row.created_at,
        ))
    }
}

/// A row of `media_links`.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = media_links)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LinkRow {
    /// Namespace
    pub media_class: String,
    /// Link name
    pub name: String,
    /// Referenced blob
    pub blob_id: Uuid,
    /// Optional expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl From<&LinkRecord> for LinkRow {
    fn from(link: &LinkRecord) -> Self {
        Self {
            media_class: link.media_class().clone(),
            name: link.name().clone(),
            blob_id: *link.blob_id().as_uuid(),
            expires_at: *link.expires_at(),
            created_at: *link.created_at(),
        }
    }
}

impl From<LinkRow> for LinkRecord {
    fn from(row: LinkRow) -> Self {
        LinkRecord::new(
            row.media_class,
            row.name,
            BlobId::from(row.blob_id),
            row.expires_at,
            row.created_at,
        )
    }
}

/// A row of `gfx_templates`.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = gfx_templates)]
#[diesel(primary_key(template_type, tournament_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TemplateRow {
    /// Template type
    pub template_type: String,
    /// Owning tournament
    pub tournament_id: i64,
    /// Background link name
    pub link_name: String,
    /// Background blob
    pub blob_id: Uuid,
    /// Placeholders as a JSON array
    pub placeholders: serde_json::Value,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&TemplateRecord> for TemplateRow {
    type Error = DatabaseError;

    fn try_from(record: &TemplateRecord) -> DatabaseResult<Self> {
        Ok(Self {
            template_type: record.key().template_type.clone(),
            tournament_id: record.key().tournament_id,
            link_name: record.link_name().clone(),
            blob_id: *record.blob_id().as_uuid(),
            placeholders: serde_json::to_value(record.placeholders())?,
            updated_at: *record.updated_at(),
        })
    }
}

impl TryFrom<TemplateRow> for TemplateRecord {
    type Error = DatabaseError;

    fn try_from(row: TemplateRow) -> DatabaseResult<Self> {
        let placeholders: Vec<Placeholder> = serde_json::from_value(row.placeholders)?;
        Ok(TemplateRecord::new(
            TemplateKey::new(row.template_type, row.tournament_id),
            BlobId::from(row.blob_id),
            placeholders,
            row.updated_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insignia_core::{ImagePlaceholder, Offset, Size};

    #[test]
    fn blob_row_round_trips_state() {
        let record = BlobRecord::pending(
            BlobId::new(),
            "font",
            ContentDigest::new("ab"),
            "font/x.ttf",
            42,
            Utc::now(),
        )
        .into_stored();

        let row = BlobRow::from(&record);
        assert_eq!(row.state, "stored");
        assert_eq!(row.location, "font/x.ttf");
        assert_eq!(BlobRecord::try_from(row).unwrap(), record);
    }

    #[test]
    fn unknown_state_is_a_serialization_error() {
        let row = BlobRow {
            id: Uuid::new_v4(),
            media_class: "font".into(),
            digest: "ab".into(),
            location: "font/x.ttf".into(),
            size_bytes: 1,
            state: "deleting".into(),
            created_at: Utc::now(),
        };
        let err = BlobRecord::try_from(row).unwrap_err();
        assert!(matches!(err.kind, DatabaseErrorKind::Serialization(_)));
    }

    #[test]
    fn template_placeholders_are_stored_as_json() {
        let record = TemplateRecord::new(
            TemplateKey::new("standings", 3),
            BlobId::new(),
            vec![Placeholder::Image(ImagePlaceholder {
                key: "logo".into(),
                offset: Offset { x: 1, y: 2 },
                size: Size { width: 3, height: 4 },
            })],
            Utc::now(),
        );

        let row = TemplateRow::try_from(&record).unwrap();
        assert_eq!(row.link_name, "3-standings");
        assert_eq!(row.placeholders[0]["kind"], "image");
        assert_eq!(TemplateRecord::try_from(row).unwrap(), record);
    }
}
