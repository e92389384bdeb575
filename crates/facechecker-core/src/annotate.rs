//! Draw boxes and captions for recognized faces.

use crate::types::{FaceLocation, RecognizedFace};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};

pub const BOUNDING_BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const GLYPH_SIZE: u32 = 8;
const CAPTION_PADDING: u32 = 1;

/// Annotated copy of `frame`, or `None` when no face carries a label.
///
/// Every labelled face gets an outline at its location and a filled caption
/// box with the label directly under the box's bottom edge. Unlabelled faces
/// are left undrawn.
pub fn annotate(frame: &RgbImage, faces: &[RecognizedFace]) -> Option<RgbImage> {
    let labelled: Vec<(&FaceLocation, &str)> = faces
        .iter()
        .filter_map(|f| f.result.label.as_deref().map(|label| (&f.face.location, label)))
        .collect();

    if labelled.is_empty() {
        return None;
    }

    let mut out = frame.clone();
    for (location, label) in labelled {
        draw_face(&mut out, location, label);
    }
    Some(out)
}

fn draw_face(img: &mut RgbImage, loc: &FaceLocation, label: &str) {
    draw_outline(img, loc, BOUNDING_BOX_COLOR);

    let (caption_w, caption_h) = caption_size(label);
    let caption = FaceLocation {
        top: loc.bottom,
        left: loc.left,
        right: loc.left.saturating_add(caption_w - 1),
        bottom: loc.bottom.saturating_add(caption_h - 1),
    };
    fill(img, &caption, BOUNDING_BOX_COLOR);
    draw_text(
        img,
        caption.left.saturating_add(CAPTION_PADDING),
        caption.top.saturating_add(CAPTION_PADDING),
        label,
        TEXT_COLOR,
    );
}

/// Width and height in pixels of the caption box for `label`.
fn caption_size(label: &str) -> (u32, u32) {
    let chars = label.chars().count() as u32;
    (
        chars * GLYPH_SIZE + 2 * CAPTION_PADDING,
        GLYPH_SIZE + 2 * CAPTION_PADDING,
    )
}

fn put(img: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < img.width() && y < img.height() {
        img.put_pixel(x, y, color);
    }
}

fn draw_outline(img: &mut RgbImage, r: &FaceLocation, color: Rgb<u8>) {
    for x in r.left..=r.right {
        put(img, x, r.top, color);
        put(img, x, r.bottom, color);
    }
    for y in r.top..=r.bottom {
        put(img, r.left, y, color);
        put(img, r.right, y, color);
    }
}

fn fill(img: &mut RgbImage, r: &FaceLocation, color: Rgb<u8>) {
    let right = r.right.min(img.width().saturating_sub(1));
    let bottom = r.bottom.min(img.height().saturating_sub(1));
    for y in r.top..=bottom {
        for x in r.left..=right {
            put(img, x, y, color);
        }
    }
}

fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            continue;
        };
        let origin_x = x.saturating_add(i as u32 * GLYPH_SIZE);
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                // bit 0 is the leftmost pixel
                if (*bits >> col) & 1 == 1 {
                    put(img, origin_x.saturating_add(col), y.saturating_add(row as u32), color);
                }
            }
        }
    }
}
