use civic_types::Theme;
use image::{Rgb, RgbImage};

use crate::canvas::{Canvas, GLYPH_SIZE};
use crate::render::CardFields;

pub const CARD_WIDTH: u32 = 800;
pub const CARD_HEIGHT: u32 = 500;

pub const TEXT_X: u32 = 50;
pub const TEXT_TOP: u32 = 300;
pub const LINE_SPACING: u32 = 50;
/// Largest scale for the name line; long names step down from here.
pub const NAME_SCALE: u32 = 4;
pub const INFO_SCALE: u32 = 3;

pub const PHOTO_SIZE: u32 = 150;
pub const PHOTO_X: u32 = 600;
pub const PHOTO_Y: u32 = 300;

/// Gap kept between the end of any text run and the photo column.
pub const PHOTO_GAP: u32 = 10;
/// Widest a text run may be without reaching the photo.
pub const TEXT_WIDTH: u32 = PHOTO_X - PHOTO_GAP - TEXT_X;
/// Height the (possibly wrapped) name may take before the DOB line.
pub const NAME_BLOCK_HEIGHT: u32 = LINE_SPACING - 4;

pub fn text_color(theme: Theme) -> Rgb<u8> {
    match theme {
        Theme::Light => Rgb([0, 0, 0]),
        Theme::Dark => Rgb([255, 255, 255]),
    }
}

/// Pixel width of `text` drawn at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_SIZE * scale
}

/// The name line as drawn: its scale and the rows it wraps onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameBlock {
    pub scale: u32,
    pub lines: Vec<String>,
}

impl NameBlock {
    pub fn line_height(&self) -> u32 {
        (GLYPH_SIZE + 1) * self.scale
    }
}

/// Pick the largest scale at which `text` fits the name block, wrapping onto
/// more rows as the scale drops. Text that does not fit even at scale 1 is
/// cut at the last row that fits.
pub fn fit_name(text: &str) -> NameBlock {
    let layout = |scale: u32| {
        let columns = (TEXT_WIDTH / (GLYPH_SIZE * scale)) as usize;
        let rows = (NAME_BLOCK_HEIGHT / ((GLYPH_SIZE + 1) * scale)).max(1) as usize;
        (wrap(text, columns), rows)
    };

    for scale in (2..=NAME_SCALE).rev() {
        let (lines, rows) = layout(scale);
        if lines.len() <= rows {
            return NameBlock { scale, lines };
        }
    }

    let (lines, rows) = layout(1);
    NameBlock {
        scale: 1,
        lines: lines.into_iter().take(rows).collect(),
    }
}

/// Greedy word wrap to at most `columns` characters per row. Words longer
/// than a row are split.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        loop {
            let used = current.chars().count();
            let needed = if used == 0 { word.len() } else { used + 1 + word.len() };
            if needed <= columns {
                if used > 0 {
                    current.push(' ');
                }
                current.extend(word.iter());
                break;
            }
            if used > 0 {
                lines.push(std::mem::take(&mut current));
                continue;
            }
            let rest = word.split_off(columns);
            lines.push(word.into_iter().collect());
            word = rest;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Lay out the identity fields, then the photo, on a canvas that already
/// holds the themed background. No text run reaches the photo column.
pub fn compose<C: Canvas>(canvas: &mut C, fields: &CardFields<'_>, photo: Option<&RgbImage>) {
    let color = text_color(fields.theme);

    let name = fit_name(&format!("Name: {}", fields.full_name));
    let mut y = TEXT_TOP;
    for line in &name.lines {
        canvas.draw_text(TEXT_X, y, line, name.scale, color);
        y += name.line_height();
    }

    let info = [
        format!("DOB: {}", fields.date_of_birth),
        format!("ID#: {}", fields.id_number),
        format!("Issued: {}", fields.issued),
    ];
    let mut y = TEXT_TOP + LINE_SPACING;
    for text in &info {
        canvas.draw_text(TEXT_X, y, text, INFO_SCALE, color);
        y += LINE_SPACING;
    }

    if let Some(photo) = photo {
        canvas.overlay(photo, PHOTO_X, PHOTO_Y);
    }
}
