use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use chrono::NaiveDate;
use civic_types::{IdNumber, Theme};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use tracing::warn;

use crate::canvas::RasterCanvas;
use crate::error::{CardError, CardWarning};
use crate::layout::{self, PHOTO_SIZE};
use crate::template::CardTemplates;

/// Everything printed on a card.
#[derive(Debug, Clone, Copy)]
pub struct CardFields<'a> {
    pub full_name: &'a str,
    pub date_of_birth: NaiveDate,
    pub id_number: IdNumber,
    /// Issue date; callers pass today's date.
    pub issued: NaiveDate,
    pub theme: Theme,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CardFormat {
    #[default]
    Jpeg,
    Png,
}

impl CardFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }
}

impl fmt::Display for CardFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for CardFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(format!("unsupported card format '{other}' (expected jpeg or png)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedCard {
    pub bytes: Vec<u8>,
    pub format: CardFormat,
    pub warnings: Vec<CardWarning>,
}

impl RenderedCard {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    pub fn file_name(&self) -> String {
        format!("civic_id.{}", self.format.extension())
    }
}

pub struct CardRenderer {
    templates: CardTemplates,
    format: CardFormat,
}

impl CardRenderer {
    pub fn new(templates: CardTemplates, format: CardFormat) -> Self {
        Self { templates, format }
    }

    /// Render and encode a card. A photo that fails to decode is reported as
    /// a warning and the card is produced without it.
    pub fn render_card(
        &self,
        fields: &CardFields<'_>,
        photo: Option<&[u8]>,
    ) -> Result<RenderedCard, CardError> {
        let (raster, warnings) = self.raster(fields, photo);

        let mut bytes = Cursor::new(Vec::new());
        raster.write_to(&mut bytes, self.format.image_format())?;

        Ok(RenderedCard {
            bytes: bytes.into_inner(),
            format: self.format,
            warnings,
        })
    }

    /// The card as an unencoded raster.
    pub fn raster(&self, fields: &CardFields<'_>, photo: Option<&[u8]>) -> (RgbImage, Vec<CardWarning>) {
        let mut warnings = Vec::new();
        let thumbnail = photo.and_then(|bytes| match decode_photo(bytes) {
            Ok(thumbnail) => Some(thumbnail),
            Err(e) => {
                warn!("Photo decode failed, rendering card without it: {}", e);
                warnings.push(CardWarning::PhotoDecode(e.to_string()));
                None
            }
        });

        let mut canvas = RasterCanvas::new(self.templates.background(fields.theme).clone());
        layout::compose(&mut canvas, fields, thumbnail.as_ref());
        (canvas.into_image(), warnings)
    }
}

fn decode_photo(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    let photo = image::load_from_memory(bytes)?;
    Ok(imageops::resize(&photo.to_rgb8(), PHOTO_SIZE, PHOTO_SIZE, FilterType::Triangle))
}
