//! Placeholder mock renderer.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use insignia_core::Placeholder;
use insignia_error::{InsigniaResult, RenderError, StorageError, StorageErrorKind};
use insignia_interface::TemplateRenderer;
use std::io::Cursor;
use std::path::{Path, PathBuf};

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Stand-in for the real compositor.
///
/// Clears every image placeholder to transparent and fills every text
/// placeholder with its text color, so a template's layout can be checked
/// without the compositing engine. Output is PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderMockRenderer;

impl PlaceholderMockRenderer {
    /// Create the renderer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TemplateRenderer for PlaceholderMockRenderer {
    #[tracing::instrument(skip(self, placeholders), fields(background = %background.display(), placeholders = placeholders.len()))]
    async fn render(&self, background: &Path, placeholders: &[Placeholder]) -> InsigniaResult<Vec<u8>> {
        let background: PathBuf = background.to_path_buf();
        let placeholders = placeholders.to_vec();
        tokio::task::spawn_blocking(move || render_blocking(&background, &placeholders))
            .await
            .map_err(|e| StorageError::new(StorageErrorKind::Task(e.to_string())))?
    }
}

fn render_blocking(background: &Path, placeholders: &[Placeholder]) -> InsigniaResult<Vec<u8>> {
    let mut canvas = image::open(background)
        .map_err(|e| RenderError::new(format!("failed to load background {}: {e}", background.display())))?
        .to_rgba8();

    for placeholder in placeholders {
        let fill = match placeholder {
            Placeholder::Image(_) => CLEAR,
            Placeholder::Text(text) => Rgba([text.color.r, text.color.g, text.color.b, 255]),
        };
        fill_rect(&mut canvas, placeholder, fill);
    }

    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| RenderError::new(format!("failed to encode PNG: {e}")))?;
    Ok(png.into_inner())
}

/// Fill the placeholder's box, clipped to the canvas.
fn fill_rect(canvas: &mut RgbaImage, placeholder: &Placeholder, fill: Rgba<u8>) {
    let (offset, size) = (placeholder.offset(), placeholder.size());
    let clip = |start: i64, len: u32, bound: u32| {
        let from = start.clamp(0, i64::from(bound));
        let to = (start + i64::from(len)).clamp(0, i64::from(bound));
        (from as u32, to as u32)
    };
    let (x0, x1) = clip(i64::from(offset.x), size.width, canvas.width());
    let (y0, y1) = clip(i64::from(offset.y), size.height, canvas.height());

    for y in y0..y1 {
        for x in x0..x1 {
            canvas.put_pixel(x, y, fill);
        }
    }
}
