//! Graphic template metadata.
//!
//! A template is a background image (stored as media class `template`) plus an
//! ordered list of placeholders that an external compositor fills in.

use crate::BlobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pixel offset of a placeholder's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Offset {
    /// Horizontal offset
    pub x: i32,
    /// Vertical offset
    pub y: i32,
}

/// Placeholder dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// RGB text color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

/// Horizontal text anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HorizontalAlign {
    /// Left
    #[serde(rename = "l")]
    #[default]
    Left,
    /// Center
    #[serde(rename = "m")]
    Middle,
    /// Right
    #[serde(rename = "r")]
    Right,
}

/// Vertical text anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VerticalAlign {
    /// Top
    #[serde(rename = "t")]
    #[default]
    Top,
    /// Center
    #[serde(rename = "m")]
    Middle,
    /// Bottom
    #[serde(rename = "b")]
    Bottom,
}

/// Text alignment within the placeholder box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextAlignment {
    /// Horizontal anchor
    pub x: HorizontalAlign,
    /// Vertical anchor
    pub y: VerticalAlign,
}

/// Line wrapping mode for text placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextWrap {
    /// Break on word boundaries
    #[default]
    Word,
    /// Single line
    #[serde(rename = "none")]
    NoWrap,
}

/// A rectangle filled with an image at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePlaceholder {
    /// Key the compositor uses to look up the image
    pub key: String,
    /// Top-left corner
    pub offset: Offset,
    /// Box dimensions
    pub size: Size,
}

/// A rectangle filled with text at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPlaceholder {
    /// Key the compositor uses to look up the text
    pub key: String,
    /// Top-left corner
    pub offset: Offset,
    /// Box dimensions
    pub size: Size,
    /// Text color
    pub color: Color,
    /// Smallest font size the compositor may shrink to
    pub min_font_size: u32,
    /// Starting font size
    pub max_font_size: u32,
    /// Anchor within the box
    #[serde(default)]
    pub text_align: TextAlignment,
    /// Wrapping mode
    #[serde(default)]
    pub wrap: TextWrap,
}

/// One slot of a template.
///
/// # Examples
///
/// ```
/// use insignia_core::{ImagePlaceholder, Offset, Placeholder, Size};
///
/// let json = r#"{"kind":"image","key":"logo","offset":{"x":10,"y":20},"size":{"width":64,"height":64}}"#;
/// let placeholder: Placeholder = serde_json::from_str(json).unwrap();
/// assert_eq!(
///     placeholder,
///     Placeholder::Image(ImagePlaceholder {
///         key: "logo".to_string(),
///         offset: Offset { x: 10, y: 20 },
///         size: Size { width: 64, height: 64 },
///     })
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Placeholder {
    /// Image slot
    Image(ImagePlaceholder),
    /// Text slot
    Text(TextPlaceholder),
}

impl Placeholder {
    /// Lookup key.
    pub fn key(&self) -> &str {
        match self {
            Self::Image(p) => &p.key,
            Self::Text(p) => &p.key,
        }
    }

    /// Top-left corner.
    pub fn offset(&self) -> Offset {
        match self {
            Self::Image(p) => p.offset,
            Self::Text(p) => p.offset,
        }
    }

    /// Box dimensions.
    pub fn size(&self) -> Size {
        match self {
            Self::Image(p) => p.size,
            Self::Text(p) => p.size,
        }
    }
}

/// Media class of template backgrounds.
pub const TEMPLATE_MEDIA_CLASS: &str = "template";

/// Identity of a template: one per type per tournament.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[display("{template_type} template for tournament {tournament_id}")]
pub struct TemplateKey {
    /// Template type, e.g. `match-result`
    pub template_type: String,
    /// Owning tournament
    pub tournament_id: i64,
}

impl TemplateKey {
    /// Create a key.
    pub fn new(template_type: impl Into<String>, tournament_id: i64) -> Self {
        Self {
            template_type: template_type.into(),
            tournament_id,
        }
    }

    /// Name of the background link in the `template` class.
    ///
    /// ```
    /// use insignia_core::TemplateKey;
    ///
    /// assert_eq!(TemplateKey::new("standings", 42).link_name(), "42-standings");
    /// ```
    pub fn link_name(&self) -> String {
        format!("{}-{}", self.tournament_id, self.template_type)
    }
}

/// Persisted template metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct TemplateRecord {
    /// Template identity
    key: TemplateKey,
    /// Background link name in class `template`
    link_name: String,
    /// Background blob
    blob_id: BlobId,
    /// Ordered placeholders
    placeholders: Vec<Placeholder>,
    /// Last modification time
    updated_at: DateTime<Utc>,
}

impl TemplateRecord {
    /// Create a record whose link name is derived from the key.
    pub fn new(
        key: TemplateKey,
        blob_id: BlobId,
        placeholders: Vec<Placeholder>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let link_name = key.link_name();
        Self {
            key,
            link_name,
            blob_id,
            placeholders,
            updated_at,
        }
    }

    /// Same record with new placeholders.
    pub fn with_placeholders(self, placeholders: Vec<Placeholder>, updated_at: DateTime<Utc>) -> Self {
        Self {
            placeholders,
            updated_at,
            ..self
        }
    }
}
