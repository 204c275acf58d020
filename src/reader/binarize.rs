use std::collections::VecDeque;

use image::GrayImage;

use super::utils::geometry::Point;
use crate::common::metadata::Color;

// Pixel
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Pixel {
    Visited(usize, Color), // Carries the id of the associated region
    Unvisited(Color),
}

impl From<Pixel> for Color {
    fn from(p: Pixel) -> Self {
        match p {
            Pixel::Visited(_, c) => c,
            Pixel::Unvisited(c) => c,
        }
    }
}

// Region
//------------------------------------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Region {
    pub src: (u32, u32),
    pub centre: Point,
    pub area: u32,
    pub color: Color,
    pub is_finder: bool,
}

// Running totals over the filled spans of a region; the centroid is the
// pixel-count weighted mean of the span midpoints
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct RegionStats {
    pub area: u32,
    sum_x: f64,
    sum_y: f64,
}

impl RegionStats {
    fn add_span(&mut self, left: u32, right: u32, y: u32) {
        let width = right - left + 1;
        self.area += width;
        self.sum_x += (left + right) as f64 / 2.0 * width as f64;
        self.sum_y += y as f64 * width as f64;
    }

    pub fn centre(&self) -> Point {
        debug_assert!(self.area > 0, "Centroid of an empty region");
        Point {
            x: (self.sum_x / self.area as f64).round() as i32,
            y: (self.sum_y / self.area as f64).round() as i32,
        }
    }
}

// Binarized image
//------------------------------------------------------------------------------

// Luma buffer thresholded by Otsu's method into dark and light pixels, with
// flood-fillable connected regions on top
#[derive(Debug)]
pub(crate) struct BinaryImage {
    pub buffer: Vec<Pixel>,
    regions: Vec<Region>,
    pub w: u32,
    pub h: u32,
}

impl BinaryImage {
    pub fn binarize(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        Self::from_luma(img.as_raw(), w, h)
    }

    // Luminance of 0.30 R + 0.59 G + 0.11 B per pixel; fully transparent
    // pixels read as white
    pub fn binarize_rgba(pixels: &[u8], w: u32, h: u32) -> Self {
        debug_assert!(
            pixels.len() == w as usize * h as usize * 4,
            "Pixel buffer size mismatch"
        );

        let luma: Vec<u8> = pixels
            .chunks_exact(4)
            .map(|p| {
                if p[3] == 0 {
                    255
                } else {
                    (0.30 * p[0] as f64 + 0.59 * p[1] as f64 + 0.11 * p[2] as f64).round() as u8
                }
            })
            .collect();
        Self::from_luma(&luma, w, h)
    }

    fn from_luma(luma: &[u8], w: u32, h: u32) -> Self {
        let mut hist = [0u32; 256];
        for &l in luma {
            hist[l as usize] += 1;
        }
        let threshold = otsu_threshold(&hist, w * h);

        let buffer = luma
            .iter()
            .map(|&l| Pixel::Unvisited(if l <= threshold { Color::Dark } else { Color::Light }))
            .collect();
        Self { buffer, regions: Vec::with_capacity(100), w, h }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.w || y >= self.h {
            return None;
        }
        Some(self.buffer[(y * self.w + x) as usize])
    }

    pub fn get_at_point(&self, pt: &Point) -> Option<Pixel> {
        if pt.x < 0 || pt.y < 0 {
            return None;
        }
        self.get(pt.x as u32, pt.y as u32)
    }

    pub fn set(&mut self, x: u32, y: u32, px: Pixel) {
        if x < self.w && y < self.h {
            self.buffer[(y * self.w + x) as usize] = px;
        }
    }

    // Flood fills the region containing src on first use and memoizes it
    pub(crate) fn get_region(&mut self, src: (u32, u32)) -> Option<&mut Region> {
        let px = self.get(src.0, src.1)?;

        match px {
            Pixel::Unvisited(color) => {
                let reg_id = self.regions.len();

                let stats = self.fill_region(src, Pixel::Visited(reg_id, color));
                let new_reg = Region {
                    src,
                    color,
                    area: stats.area,
                    centre: stats.centre(),
                    is_finder: false,
                };

                self.regions.push(new_reg);

                Some(self.regions.get_mut(reg_id).expect("Region not found after saving"))
            }
            Pixel::Visited(id, _) => {
                Some(self.regions.get_mut(id).expect("No region found for visited pixel"))
            }
        }
    }

    /// Fills the connected region containing src with the target pixel,
    /// folding every filled span into the returned area and centroid totals
    pub fn fill_region(&mut self, src: (u32, u32), target: Pixel) -> RegionStats {
        let from = self.get(src.0, src.1).unwrap();

        debug_assert!(from != target, "Cannot fill with the same pixel: {from:?}");

        let w = self.w;
        let h = self.h;
        let mut stats = RegionStats::default();
        let mut queue = VecDeque::new();
        queue.push_back(src);

        while let Some((x, y)) = queue.pop_front() {
            if self.get(x, y) != Some(from) {
                continue;
            }
            let mut left = x;
            let mut right = x;
            self.set(x, y, target);

            // Travel left till the region boundary
            while left > 0 && self.get(left - 1, y) == Some(from) {
                left -= 1;
                self.set(left, y, target);
            }

            // Travel right till the region boundary
            while right < w - 1 && self.get(right + 1, y) == Some(from) {
                right += 1;
                self.set(right, y, target);
            }

            stats.add_span(left, right, y);

            for ny in [y.wrapping_sub(1), y + 1] {
                if ny < h {
                    let mut seg_len = 0;
                    for x in left..=right {
                        if self.get(x, ny) == Some(from) {
                            seg_len += 1;
                        } else if seg_len > 0 {
                            queue.push_back((x - 1, ny));
                            seg_len = 0;
                        }
                    }
                    if seg_len > 0 {
                        queue.push_back((right, ny));
                    }
                }
            }
        }
        stats
    }
}

// Otsu's threshold: maximizes between-class variance over the histogram
fn otsu_threshold(hist: &[u32; 256], total: u32) -> u8 {
    let sum: f64 = hist.iter().enumerate().map(|(i, &n)| i as f64 * n as f64).sum();

    let mut sum_b = 0.0;
    let mut weight_b = 0u32;
    let mut best_var = -1.0;
    let mut threshold = 0u8;

    for t in 0..256 {
        weight_b += hist[t];
        if weight_b == 0 {
            continue;
        }
        let weight_f = total - weight_b;
        if weight_f == 0 {
            break;
        }
        sum_b += t as f64 * hist[t] as f64;

        let mean_b = sum_b / weight_b as f64;
        let mean_f = (sum - sum_b) / weight_f as f64;
        let var = weight_b as f64 * weight_f as f64 * (mean_b - mean_f).powi(2);
        if var > best_var {
            best_var = var;
            threshold = t as u8;
        }
    }
    threshold
}
