use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage, imageops};

/// Width and height of one unscaled glyph cell.
pub const GLYPH_SIZE: u32 = 8;

/// Drawing surface the card layout is written against.
pub trait Canvas {
    /// Draw `text` with its top-left corner at (`x`, `y`). Each font pixel
    /// becomes a `scale` x `scale` block.
    fn draw_text(&mut self, x: u32, y: u32, text: &str, scale: u32, color: Rgb<u8>);

    /// Paste `image` with its top-left corner at (`x`, `y`), clipped to the canvas.
    fn overlay(&mut self, image: &RgbImage, x: u32, y: u32);
}

/// Canvas backed by an in-memory RGB raster.
pub struct RasterCanvas {
    image: RgbImage,
}

impl RasterCanvas {
    pub fn new(background: RgbImage) -> Self {
        Self { image: background }
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

impl Canvas for RasterCanvas {
    fn draw_text(&mut self, x: u32, y: u32, text: &str, scale: u32, color: Rgb<u8>) {
        let (width, height) = self.image.dimensions();
        let cell = GLYPH_SIZE * scale;

        for (i, ch) in text.chars().enumerate() {
            let origin_x = x + i as u32 * cell;
            if origin_x >= width {
                break;
            }

            // Row bytes run top to bottom; bit N is column N from the left.
            for (row, bits) in glyph(ch).iter().enumerate() {
                for col in 0..GLYPH_SIZE {
                    if bits & (1 << col) == 0 {
                        continue;
                    }
                    let px = origin_x + col * scale;
                    let py = y + row as u32 * scale;
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let (tx, ty) = (px + dx, py + dy);
                            if tx < width && ty < height {
                                self.image.put_pixel(tx, ty, color);
                            }
                        }
                    }
                }
            }
        }
    }

    fn overlay(&mut self, image: &RgbImage, x: u32, y: u32) {
        imageops::replace(&mut self.image, image, i64::from(x), i64::from(y));
    }
}
