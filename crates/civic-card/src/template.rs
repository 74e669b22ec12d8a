use std::path::Path;

use civic_types::Theme;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use tracing::info;

use crate::error::CardError;
use crate::layout::{CARD_HEIGHT, CARD_WIDTH};

/// Themed card backgrounds, already scaled to the card canvas.
#[derive(Clone)]
pub struct CardTemplates {
    light: RgbImage,
    dark: RgbImage,
}

impl CardTemplates {
    /// Generated backgrounds, used when no template image is configured.
    pub fn builtin() -> Self {
        Self {
            light: gradient([250, 246, 238], [222, 232, 250], [66, 99, 235]),
            dark: gradient([40, 34, 64], [12, 12, 22], [142, 110, 255]),
        }
    }

    /// Load template images from disk. A theme without a path falls back to
    /// its built-in background.
    pub fn load(light: Option<&Path>, dark: Option<&Path>) -> Result<Self, CardError> {
        let builtin = Self::builtin();
        Ok(Self {
            light: match light {
                Some(path) => load_scaled(path)?,
                None => builtin.light,
            },
            dark: match dark {
                Some(path) => load_scaled(path)?,
                None => builtin.dark,
            },
        })
    }

    pub fn background(&self, theme: Theme) -> &RgbImage {
        match theme {
            Theme::Light => &self.light,
            Theme::Dark => &self.dark,
        }
    }
}

fn load_scaled(path: &Path) -> Result<RgbImage, CardError> {
    let image = image::open(path).map_err(|source| CardError::Template {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        "Loaded card template {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(fit_to_card(&image))
}

/// Stretch to the card canvas, ignoring aspect ratio.
pub fn fit_to_card(image: &DynamicImage) -> RgbImage {
    imageops::resize(&image.to_rgb8(), CARD_WIDTH, CARD_HEIGHT, FilterType::Triangle)
}

/// Vertical gradient with a solid header band.
fn gradient(top: [u8; 3], bottom: [u8; 3], band: [u8; 3]) -> RgbImage {
    const BAND_HEIGHT: u32 = 60;
    let span = (CARD_HEIGHT - 1) as f32;

    RgbImage::from_fn(CARD_WIDTH, CARD_HEIGHT, |_, y| {
        if y < BAND_HEIGHT {
            return Rgb(band);
        }
        let t = y as f32 / span;
        Rgb(std::array::from_fn(|i| {
            (top[i] as f32 + (bottom[i] as f32 - top[i] as f32) * t).round() as u8
        }))
    })
}
