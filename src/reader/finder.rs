use super::binarize::{BinaryImage, Pixel};
use super::utils::{geometry::Point, verify_pattern};
use super::Window;
use crate::common::metadata::Color;

// A confirmed finder pattern
//------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Finder {
    pub centre: Point,
    // Estimated module pitch in pixels
    pub module: f64,
}

// Finder line
//------------------------------------------------------------------------------

// **   ******   **  <- Finder line
// ^    ^        ^
// left |        right
//      stone
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct DatumLine {
    left: u32,
    stone: u32,
    right: u32,
    y: u32,
}

// Line scanner to detect finder lines
//------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct LineScanner {
    buffer: [u32; 6], // Run length of the last six runs
    prev: Option<Color>,
    flips: u32, // Count of color changes
    pos: u32,   // Current position
    y: u32,
}

impl LineScanner {
    fn new() -> Self {
        Self { buffer: [0; 6], prev: None, flips: 0, pos: 0, y: 0 }
    }

    fn reset(&mut self, x: u32, y: u32) {
        self.buffer[5] = 0;
        self.prev = None;
        self.flips = 0;
        self.pos = x;
        self.y = y;
    }

    fn advance(&mut self, color: Color) -> Option<DatumLine> {
        self.pos += 1;

        if self.prev.is_some() && self.prev == Some(color) {
            self.buffer[5] += 1;
            return None;
        }

        let dark_run_ended = self.prev == Some(Color::Dark);
        self.buffer.rotate_left(1);
        self.buffer[5] = 1;
        self.prev = Some(color);
        self.flips += 1;

        // The five completed runs form the candidate only when the run that
        // just ended was dark
        if dark_run_ended && self.is_finder_line() {
            Some(DatumLine {
                left: self.pos - 1 - self.buffer[..5].iter().sum::<u32>(),
                stone: self.pos - 1 - self.buffer[2..5].iter().sum::<u32>(),
                right: self.pos - 1 - self.buffer[4],
                y: self.y,
            })
        } else {
            None
        }
    }

    // Whether the last five completed runs are in the 1:1:3:1:1 ratio, with a
    // half-module tolerance per run
    fn is_finder_line(&self) -> bool {
        if self.flips < 6 {
            return false;
        }

        let avg = (self.buffer[..5].iter().sum::<u32>() as f64) / 7.0;
        let tol = avg * 0.5;

        let ratio: [f64; 5] = [1.0, 1.0, 3.0, 1.0, 1.0];
        for (r, &run) in ratio.iter().zip(self.buffer[..5].iter()) {
            let run = run as f64;
            if run < r * avg - tol || run > r * avg + tol {
                return false;
            }
        }

        true
    }
}

// Locate finders
//------------------------------------------------------------------------------

// Scans the window row by row for 1:1:3:1:1 runs, confirms candidates along
// the vertical and diagonal axes, and clusters them by connected region.
// Returns the centre and module pitch of every confirmed finder.
pub(crate) fn locate_finders(img: &mut BinaryImage, window: &Window) -> Vec<Finder> {
    let mut finders = Vec::new();
    let mut scanner = LineScanner::new();

    for y in window.y0..window.y1 {
        scanner.reset(window.x0, y);
        for x in window.x0..window.x1 {
            let color = Color::from(img.get(x, y).unwrap());
            if let Some(datum) = scanner.advance(color) {
                if let Some(finder) = verify_and_mark_finder(img, &datum) {
                    finders.push(finder);
                }
            }
        }

        // Flush the scanner in case the symbol touches the right edge
        if let Some(datum) = scanner.advance(Color::Light) {
            if let Some(finder) = verify_and_mark_finder(img, &datum) {
                finders.push(finder);
            }
        }
    }

    finders
}

// Checks multiple conditions to confirm a finder candidate:
// 1. The 1:1:3:1:1 ratio holds along the vertical and diagonal axes
// 2. The left and right datum points belong to the same ring region
// 3. The ring and stone regions are distinct
// 4. The stone region area is roughly 37.5% of the ring area
// Marks the regions so later scan lines don't report the same finder again.
fn verify_and_mark_finder(img: &mut BinaryImage, datum: &DatumLine) -> Option<Finder> {
    let (l, s, r, y) = (datum.left, datum.stone, datum.right, datum.y);

    // Skip regions already confirmed on an earlier scan line
    if matches!(img.get(s, y), Some(Pixel::Visited(..))) {
        let stone = img.get_region((s, y))?;
        if stone.is_finder {
            return None;
        }
    }

    let module = (r - l) as f64 / 6.0;
    let centre_x = (r as f64 - 2.5 * module) as i32;
    let seed = Point { x: centre_x, y: y as i32 };
    let pattern = [1.0, 1.0, 3.0, 1.0, 1.0];
    let max_run = (r - l) * 2;

    // Confirm the ratio through the putative centre on the other axes
    if !verify_pattern(img, &seed, &pattern, (0, 1), max_run) {
        return None;
    }
    if !verify_pattern(img, &seed, &pattern, (1, 1), max_run) {
        return None;
    }

    let stone = img.get_region((s, y))?.clone();
    let ring = img.get_region((r, y))?.clone();

    // Left and right points must connect through the same ring
    if img.get(l, y) != img.get(r, y) {
        return None;
    }

    // Ring and stone must be distinct, with a plausible area ratio
    let ratio = stone.area * 100 / ring.area;
    if img.get(r, y) == img.get(s, y) || ratio <= 10 || 70 <= ratio {
        return None;
    }

    img.get_region((r, y))?.is_finder = true;
    img.get_region((s, y))?.is_finder = true;

    Some(Finder { centre: stone.centre, module })
}

#[cfg(test)]
mod finder_tests {
    use super::super::Window;
    use super::*;
    use crate::builder::QRBuilder;
    use crate::common::codec::Mode;
    use crate::common::mask::MaskPattern;
    use crate::common::metadata::{ECLevel, Version};

    fn locate(data: &str, ver: Version, module_size: u32) -> (Vec<Finder>, u32) {
        let qr = QRBuilder::new(data.as_bytes())
            .mode(Mode::Byte)
            .version(ver)
            .ec_level(ECLevel::L)
            .mask(MaskPattern::new(1))
            .build()
            .unwrap();
        let img = qr.render(module_size);
        let (w, h) = img.dimensions();
        let mut bin = BinaryImage::binarize(&img);
        (locate_finders(&mut bin, &Window { x0: 0, y0: 0, x1: w, y1: h }), w)
    }

    #[test]
    fn test_locate_finders_v4() {
        let (finders, _) = locate("Hello, world!", Version::Normal(4), 10);
        assert_eq!(finders.len(), 3);

        // Quiet zone of 4 plus finder centre offset of 3.5 modules
        let centres =
            [Point { x: 75, y: 75 }, Point { x: 335, y: 75 }, Point { x: 75, y: 335 }];
        for f in finders.iter() {
            assert!(
                centres.iter().any(|c| c.dist(&f.centre) < 2.0),
                "Unexpected finder centre {:?}",
                f.centre
            );
            assert!((f.module - 10.0).abs() < 1.5, "Module pitch off: {}", f.module);
        }
    }

    #[test]
    fn test_locate_finders_v1_small_modules() {
        let (finders, _) = locate("ping", Version::Normal(1), 4);
        assert_eq!(finders.len(), 3);
    }

    #[test]
    fn test_no_finders_in_blank_image() {
        let img = image::GrayImage::from_pixel(128, 128, image::Luma([255]));
        let mut bin = BinaryImage::binarize(&img);
        let finders = locate_finders(&mut bin, &Window { x0: 0, y0: 0, x1: 128, y1: 128 });
        assert!(finders.is_empty());
    }
}
