//! Template backgrounds and placeholder metadata.

use crate::{DeletionContext, MediaService};
use chrono::Utc;
use insignia_core::{Placeholder, TemplateKey, TemplateRecord, TEMPLATE_MEDIA_CLASS};
use insignia_error::{InsigniaResult, NotFoundError, NotFoundErrorKind};
use insignia_interface::{TemplateRenderer, TemplateRepository};
use std::sync::Arc;

/// Template lifecycle on top of the media store.
///
/// A template's background is ordinary media in class `template`, linked as
/// `{tournament_id}-{template_type}`; its lifetime follows that link through
/// the deletion protocol like any other.
#[derive(Clone)]
pub struct TemplateService {
    media: Arc<MediaService>,
    templates: Arc<dyn TemplateRepository>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl std::fmt::Debug for TemplateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateService")
            .field("media", &self.media)
            .finish_non_exhaustive()
    }
}

fn template_not_found(key: &TemplateKey) -> insignia_error::InsigniaError {
    NotFoundError::new(NotFoundErrorKind::Template {
        template_type: key.template_type.clone(),
        tournament_id: key.tournament_id,
    })
    .into()
}

impl TemplateService {
    /// Create the service.
    pub fn new(
        media: Arc<MediaService>,
        templates: Arc<dyn TemplateRepository>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            media,
            templates,
            renderer,
        }
    }

    /// Create a template, replacing any existing one for the same type and
    /// tournament.
    ///
    /// The background is validated and hashed before anything changes. Only
    /// then is the previous background link released and the new one stored.
    /// If storing fails after the release, the template is removed rather
    /// than left pointing at a released background.
    #[tracing::instrument(skip(self, background, placeholders), fields(size = background.len()))]
    pub async fn create_template(
        &self,
        template_type: &str,
        tournament_id: i64,
        background: Vec<u8>,
        placeholders: Vec<Placeholder>,
    ) -> InsigniaResult<TemplateRecord> {
        let key = TemplateKey::new(template_type, tournament_id);
        let link_name = key.link_name();
        let prepared = self
            .media
            .prepare(background, TEMPLATE_MEDIA_CLASS, &link_name)
            .await?;

        self.media
            .remove_link(TEMPLATE_MEDIA_CLASS, &link_name, DeletionContext::Sweep)
            .await?;
        let stored = match self.media.store_prepared(&prepared).await {
            Ok(stored) => stored,
            Err(e) => {
                match self.templates.remove(&key).await {
                    Ok(Some(_)) => {
                        tracing::warn!(error = %e, "Background could not be stored; removed template");
                    }
                    Ok(None) => {}
                    Err(remove_err) => {
                        tracing::warn!(error = %remove_err, "Failed to remove template without background");
                    }
                }
                return Err(e);
            }
        };

        let record = TemplateRecord::new(key, *stored.blob_id(), placeholders, Utc::now());
        if self.templates.save(record.clone()).await?.is_some() {
            tracing::debug!("Replaced existing template");
        }
        tracing::info!(link = %link_name, blob_id = %stored.blob_id(), "Created template");
        Ok(record)
    }

    /// Replace a template's placeholders.
    ///
    /// # Errors
    ///
    /// `TemplateNotFound` if there is no such template.
    pub async fn update_template(
        &self,
        template_type: &str,
        tournament_id: i64,
        placeholders: Vec<Placeholder>,
    ) -> InsigniaResult<TemplateRecord> {
        let key = TemplateKey::new(template_type, tournament_id);
        self.templates
            .update_placeholders(&key, placeholders, Utc::now())
            .await?
            .ok_or_else(|| template_not_found(&key))
    }

    /// Remove a template and release its background.
    ///
    /// Removing a template that does not exist is a no-op and returns `None`.
    #[tracing::instrument(skip(self))]
    pub async fn remove_template(
        &self,
        template_type: &str,
        tournament_id: i64,
    ) -> InsigniaResult<Option<TemplateRecord>> {
        let key = TemplateKey::new(template_type, tournament_id);
        let Some(removed) = self.templates.remove(&key).await? else {
            return Ok(None);
        };

        let outcome = self
            .media
            .remove_link(TEMPLATE_MEDIA_CLASS, removed.link_name(), DeletionContext::Sweep)
            .await?;
        tracing::info!(blob_deleted = outcome.blob_deleted(), "Removed template");
        Ok(Some(removed))
    }

    /// Render the template with every placeholder blanked.
    ///
    /// # Errors
    ///
    /// `TemplateNotFound`, `BlobNotFound` if the background is gone, or a
    /// `RenderError` from the renderer.
    pub async fn render_mock(&self, template_type: &str, tournament_id: i64) -> InsigniaResult<Vec<u8>> {
        let key = TemplateKey::new(template_type, tournament_id);
        let record = self
            .templates
            .find(&key)
            .await?
            .ok_or_else(|| template_not_found(&key))?;

        let background = self.media.blob_path(record.blob_id()).await?;
        self.renderer.render(&background, record.placeholders()).await
    }
}
