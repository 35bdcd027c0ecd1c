//! Test utilities for Insignia service tests.
//!
//! A [`Harness`] wires the services over the in-memory adapters and a
//! temporary directory; the image helpers generate PNGs whose perceptual
//! digests differ per seed.

#![allow(dead_code)]

use image::{ImageFormat, Rgb, RgbImage};
use insignia_core::{MediaClassifier, PolicyTable};
use insignia_interface::MediaCatalog;
use insignia_service::{
    ExpirySweeper, MediaService, PlaceholderMockRenderer, RetryPolicy, TemplateService,
};
use insignia_storage::{
    BlobFiles, ContentStore, InMemoryMediaCatalog, InMemoryTemplateRepository, IoLimits,
    LinkNamespace, LinkTable,
};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Services over in-memory adapters rooted in a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub catalog: InMemoryMediaCatalog,
    pub templates: InMemoryTemplateRepository,
    pub media: Arc<MediaService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policies(PolicyTable::builtin())
    }

    pub fn with_policies(policies: PolicyTable) -> Self {
        let catalog = InMemoryMediaCatalog::new();
        Self::build(policies, catalog.clone(), Arc::new(catalog))
    }

    /// Services over `shared`, which must be backed by `catalog`.
    pub fn over_catalog(catalog: InMemoryMediaCatalog, shared: Arc<dyn MediaCatalog>) -> Self {
        Self::build(PolicyTable::builtin(), catalog, shared)
    }

    fn build(policies: PolicyTable, catalog: InMemoryMediaCatalog, shared: Arc<dyn MediaCatalog>) -> Self {
        let dir = TempDir::new().unwrap();
        let files = BlobFiles::new(dir.path().join("blobs")).unwrap();
        let namespace = LinkNamespace::new(dir.path().join("links")).unwrap();
        let limits = IoLimits::default();

        let media = MediaService::new(
            MediaClassifier::new(policies),
            ContentStore::new(shared.clone(), files.clone(), limits),
            LinkTable::new(shared, namespace, files, limits).with_page_size(2),
            RetryPolicy::new(20, Duration::from_millis(5), Duration::from_millis(50)),
        );

        Self {
            dir,
            catalog,
            templates: InMemoryTemplateRepository::new(),
            media: Arc::new(media),
        }
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(self.media.clone())
    }

    pub fn template_service(&self) -> TemplateService {
        TemplateService::new(
            self.media.clone(),
            Arc::new(self.templates.clone()),
            Arc::new(PlaceholderMockRenderer::new()),
        )
    }

    /// Physical link entry for `name` in `media_class`.
    pub fn link_entry(&self, media_class: &str, name: &str) -> PathBuf {
        self.dir.path().join("links").join(format!("{media_class}s")).join(name)
    }

    /// Number of blob files stored for `media_class`.
    pub fn blob_files(&self, media_class: &str) -> usize {
        std::fs::read_dir(self.dir.path().join("blobs").join(media_class))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn lcg(state: &mut u32) -> u8 {
    *state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    (*state >> 24) as u8
}

fn encode(image: RgbImage) -> Vec<u8> {
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png).unwrap();
    png.into_inner()
}

/// A 64×64 PNG of 16×16 flat blocks whose shades are drawn from `seed`.
pub fn png(seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_add(1);
    let shades: Vec<u8> = (0..256).map(|_| lcg(&mut state)).collect();
    encode(RgbImage::from_fn(64, 64, |x, y| {
        let shade = shades[((y / 4) * 16 + x / 4) as usize];
        Rgb([shade, shade, shade])
    }))
}

/// A noisy PNG of roughly `bytes` bytes (noise does not compress).
pub fn large_png(bytes: usize, seed: u32) -> Vec<u8> {
    let side = ((bytes / 3) as f64).sqrt().ceil() as u32;
    let mut state = seed;
    encode(RgbImage::from_fn(side, side, |_, _| {
        Rgb([lcg(&mut state), lcg(&mut state), lcg(&mut state)])
    }))
}

/// Bytes that start like a TrueType font.
pub fn ttf(body: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x0a, 0x00, 0x80];
    bytes.extend_from_slice(body);
    bytes
}
