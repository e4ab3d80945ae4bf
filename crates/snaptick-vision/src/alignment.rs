//! Face alignment onto the ArcFace canonical 112×112 crop.
//!
//! A 4-DOF similarity (scale, rotation, translation) is fitted from the five
//! detected landmarks to the InsightFace reference landmarks in closed form,
//! then the RGB image is resampled through its inverse.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
pub(crate) const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub(crate) const ALIGNED_SIZE: u32 = 112;

/// `dst = [[a, -b], [b, a]] * src + [tx, ty]`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` points onto `dst` points.
    fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut var = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - msx, sy - msy);
            let (dx, dy) = (dx - mdx, dy - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            var += sx * sx + sy * sy;
        }

        if var < 1e-12 {
            // Degenerate landmarks: translate only.
            return Self {
                a: 1.0,
                b: 0.0,
                tx: mdx - msx,
                ty: mdy - msy,
            };
        }

        let a = dot / var;
        let b = cross / var;
        Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        }
    }

    fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let a = self.a / det;
        let b = -self.b / det;
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Bilinear sample of one RGB pixel; outside the image reads as black.
fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> [f32; 3] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (w, h) = (image.width() as i64, image.height() as i64);

    let px = |xi: i64, yi: i64| -> [f32; 3] {
        if xi >= 0 && xi < w && yi >= 0 && yi < h {
            let Rgb(c) = *image.get_pixel(xi as u32, yi as u32);
            [c[0] as f32, c[1] as f32, c[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    let (xi, yi) = (x0 as i64, y0 as i64);
    let tl = px(xi, yi);
    let tr = px(xi + 1, yi);
    let bl = px(xi, yi + 1);
    let br = px(xi + 1, yi + 1);

    std::array::from_fn(|c| {
        tl[c] * (1.0 - fx) * (1.0 - fy) + tr[c] * fx * (1.0 - fy) + bl[c] * (1.0 - fx) * fy + br[c] * fx * fy
    })
}

/// Warp the face described by `landmarks` into a 112×112 RGB crop.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let forward = Similarity::fit(landmarks, &REFERENCE_LANDMARKS);
    let Some(inverse) = forward.inverse() else {
        return RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    };

    RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        let (sx, sy) = inverse.apply((ox as f32, oy as f32));
        let c = sample_bilinear(image, sx, sy);
        Rgb(c.map(|v| v.round().clamp(0.0, 255.0) as u8))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_identity() {
        let t = Similarity::fit(&REFERENCE_LANDMARKS, &REFERENCE_LANDMARKS);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_fit_half_scale() {
        let src = REFERENCE_LANDMARKS.map(|(x, y)| (x * 2.0, y * 2.0));
        let t = Similarity::fit(&src, &REFERENCE_LANDMARKS);
        assert!((t.a - 0.5).abs() < 1e-3, "a = {}", t.a);
        assert!(t.b.abs() < 1e-3);
    }

    #[test]
    fn test_fit_recovers_rotation() {
        // 90° rotation about the origin: (x, y) -> (-y, x)
        let src = REFERENCE_LANDMARKS.map(|(x, y)| (y, -x));
        let t = Similarity::fit(&src, &REFERENCE_LANDMARKS);
        for (s, d) in src.iter().zip(REFERENCE_LANDMARKS.iter()) {
            let (x, y) = t.apply(*s);
            assert!((x - d.0).abs() < 1e-2 && (y - d.1).abs() < 1e-2);
        }
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = Similarity {
            a: 0.8,
            b: 0.3,
            tx: 12.0,
            ty: -4.0,
        };
        let inv = t.inverse().unwrap();
        let (x, y) = inv.apply(t.apply((37.0, 81.0)));
        assert!((x - 37.0).abs() < 1e-3 && (y - 81.0).abs() < 1e-3);
    }

    #[test]
    fn test_align_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        let aligned = align_face(&image, &REFERENCE_LANDMARKS);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        let mut image = RgbImage::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        // Bright red patch around the left eye.
        for dy in 0..5 {
            for dx in 0..5 {
                image.put_pixel(78 + dx, 58 + dy, Rgb([255, 0, 0]));
            }
        }

        let aligned = align_face(&image, &src);
        let rx = REFERENCE_LANDMARKS[0].0.round() as u32;
        let ry = REFERENCE_LANDMARKS[0].1.round() as u32;

        let mut max_red = 0u8;
        for y in ry - 1..=ry + 1 {
            for x in rx - 1..=rx + 1 {
                max_red = max_red.max(aligned.get_pixel(x, y)[0]);
            }
        }
        assert!(max_red > 100, "expected red near ({rx}, {ry}), max={max_red}");
        assert_eq!(aligned.get_pixel(rx, ry)[1], 0);
    }
}
