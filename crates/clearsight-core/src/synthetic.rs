//! Drawn test faces: an oval with eyes, brows, nose and mouth over a shaded
//! background, plus per-pixel noise. Geometry is in fractions of the image side.

use image::{Rgb, RgbImage};

#[derive(Debug, Clone, Copy)]
pub struct FaceGeometry {
    pub cx: f64,
    pub cy: f64,
    pub rx: f64,
    pub ry: f64,
    pub eye_dx: f64,
    pub eye_y: f64,
    pub nose: f64,
    pub mouth_y: f64,
    pub mouth_w: f64,
    pub skin: i32,
    pub background: i32,
}

/// Wide oval, wide-set eyes, long nose.
pub const FACE_A: FaceGeometry = FaceGeometry {
    cx: 0.5,
    cy: 0.5,
    rx: 0.34,
    ry: 0.44,
    eye_dx: 0.15,
    eye_y: 0.12,
    nose: 0.10,
    mouth_y: 0.22,
    mouth_w: 0.12,
    skin: 175,
    background: 60,
};

/// Narrow oval, close-set eyes, short nose, darker skin on a lighter background.
pub const FACE_B: FaceGeometry = FaceGeometry {
    cx: 0.5,
    cy: 0.53,
    rx: 0.27,
    ry: 0.38,
    eye_dx: 0.10,
    eye_y: 0.06,
    nose: 0.05,
    mouth_y: 0.17,
    mouth_w: 0.07,
    skin: 150,
    background: 95,
};

/// Render a `size` × `size` gray face. `brightness` is added to every pixel
/// before clamping.
pub fn render_face(size: u32, g: &FaceGeometry, seed: u32, brightness: i32) -> RgbImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1).max(1);
    let s = size as f64;
    let (cx, cy) = (s * g.cx, s * g.cy);
    let (rx, ry) = (s * g.rx, s * g.ry);
    let eye_y = cy - s * g.eye_y;
    let mouth_y = cy + s * g.mouth_y;

    RgbImage::from_fn(size, size, |x, y| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let noise = (state % 21) as i32 - 10;

        let (fx, fy) = (x as f64, y as f64);
        let mut v = g.background + (x * 40 / size) as i32;
        let (dx, dy) = ((fx - cx) / rx, (fy - cy) / ry);
        if dx * dx + dy * dy <= 1.0 {
            v = g.skin;
            for side in [-1.0, 1.0] {
                let eye_x = cx + side * s * g.eye_dx;
                let (ex, ey) = ((fx - eye_x) / (s * 0.07), (fy - eye_y) / (s * 0.035));
                if ex * ex + ey * ey <= 1.0 {
                    v = 40;
                }
                if (fy - (eye_y - s * 0.07)).abs() <= s * 0.012 && (fx - eye_x).abs() <= s * 0.08 {
                    v = 60;
                }
            }
            if (fx - cx).abs() <= s * 0.015 && fy >= cy - s * 0.05 && fy <= cy + s * g.nose {
                v = g.skin - 50;
            }
            if (fy - mouth_y).abs() <= s * 0.02 && (fx - cx).abs() <= s * g.mouth_w {
                v = 70;
            }
        }

        let level = (v + noise + brightness).clamp(0, 255) as u8;
        Rgb([level, level, level])
    })
}
