use std::f64::consts::FRAC_PI_2;

use super::binarize::BinaryImage;
use super::finder::Finder;
use super::utils::{
    geometry::{angle, Point, Slope},
    homography::Homography,
};
use crate::builder::{BitGrid, Module, QR};
use crate::common::error::QRResult;
use crate::common::metadata::{Color, ECLevel, Version, VERSION_MAX, VERSION_MIN};

// Orientation
//------------------------------------------------------------------------------

// Reorders the three finders as [top-left, top-right, bottom-left]. The
// top-left finder is the corner where the other two subtend a right angle;
// the cross product settles which of the remaining two is which.
pub(crate) fn orient(finders: &mut [Finder; 3]) {
    let mut best = 0;
    let mut best_dev = f64::MAX;
    for i in 0..3 {
        let a = finders[(i + 1) % 3].centre;
        let b = finders[i].centre;
        let c = finders[(i + 2) % 3].centre;
        let dev = (angle(&a, &b, &c) - FRAC_PI_2).abs();
        if dev < best_dev {
            best_dev = dev;
            best = i;
        }
    }
    finders.swap(0, best);

    let v1 = Slope::new(&finders[0].centre, &finders[1].centre);
    let v2 = Slope::new(&finders[0].centre, &finders[2].centre);
    if v1.cross(&v2) < 0 {
        finders.swap(1, 2);
    }
}

// Version estimate
//------------------------------------------------------------------------------

// Estimated from the finder spacing in units of the module pitch
pub(crate) fn estimate_version(finders: &[Finder; 3], max_version: usize) -> Version {
    let pitch = (finders[0].module + finders[1].module + finders[2].module) / 3.0;
    let dist = (finders[0].centre.dist(&finders[1].centre)
        + finders[0].centre.dist(&finders[2].centre))
        / 2.0;
    let est = ((dist / pitch - 10.0) / 4.0).round();
    let cap = max_version.clamp(VERSION_MIN, VERSION_MAX) as f64;
    Version::Normal(est.clamp(VERSION_MIN as f64, cap) as usize)
}

// Symbol location
//------------------------------------------------------------------------------

// Anchors a perspective transform on the three finder centres plus the
// bottom-right alignment pattern (or the projected fourth corner for
// version 1), then refines it against the function patterns.
pub(crate) fn locate_symbol(
    img: &mut BinaryImage,
    finders: &[Finder; 3],
    ver: Version,
) -> QRResult<Homography> {
    let size = ver.width() as f64;
    let c_tl = finders[0].centre;
    let c_tr = finders[1].centre;
    let c_bl = finders[2].centre;

    // Per-module steps along the top and left edges
    let span = size - 7.0;
    let ux = (c_tr.x - c_tl.x) as f64 / span;
    let uy = (c_tr.y - c_tl.y) as f64 / span;
    let vx = (c_bl.x - c_tl.x) as f64 / span;
    let vy = (c_bl.y - c_tl.y) as f64 / span;

    let project = |d: f64| Point {
        x: (c_tl.x as f64 + (ux + vx) * d).round() as i32,
        y: (c_tl.y as f64 + (uy + vy) * d).round() as i32,
    };

    let (br_off, anchor) = if *ver == 1 {
        // No alignment pattern; the mirrored finder centre anchors the fit
        (3.5, project(span))
    } else {
        let pitch = (finders[0].module + finders[1].module + finders[2].module) / 3.0;
        let seed = project(size - 10.0);
        // A missed alignment pattern degrades the fit but is not fatal
        let centre = locate_alignment_pattern(img, pitch, seed).unwrap_or(seed);
        (6.5, centre)
    };

    let src =
        [(3.5, 3.5), (size - 3.5, 3.5), (size - br_off, size - br_off), (3.5, size - 3.5)];
    let dst = [
        (c_tl.x as f64, c_tl.y as f64),
        (c_tr.x as f64, c_tr.y as f64),
        (anchor.x as f64, anchor.y as f64),
        (c_bl.x as f64, c_bl.y as f64),
    ];

    let h = Homography::compute(src, dst)?;
    Ok(jiggle_homography(img, h, ver))
}

// Spirals outward from the projected location until a dark region of roughly
// one module lands under the cursor
fn locate_alignment_pattern(img: &mut BinaryImage, pitch: f64, mut seed: Point) -> Option<Point> {
    let mod_area = ((pitch * pitch) as u32).max(1);

    const DX: [i32; 4] = [1, 0, -1, 0];
    const DY: [i32; 4] = [0, -1, 0, 1];

    let mut dir = 0;
    let mut run_len = 1u32;

    while run_len * run_len < mod_area * 64 {
        for _ in 0..run_len {
            if let Some(px) = img.get_at_point(&seed) {
                if Color::from(px) == Color::Dark {
                    if let Some(reg) = img.get_region((seed.x as u32, seed.y as u32)) {
                        if !reg.is_finder && reg.area <= mod_area * 2 {
                            return Some(reg.centre);
                        }
                    }
                }
            }
            seed.x += DX[dir];
            seed.y += DY[dir];
        }

        dir = (dir + 1) & 3;
        if dir & 1 == 0 {
            run_len += 1;
        }
    }

    None
}

// Homography refinement
//------------------------------------------------------------------------------

// Coordinate descent on the eight homography parameters, scored against the
// function patterns the symbol is known to contain
fn jiggle_homography(img: &BinaryImage, mut h: Homography, ver: Version) -> Homography {
    let mut best = symbol_fitness(img, &h, ver);

    let mut adjustments = h.0.map(|x| x * 0.02);

    for _pass in 0..5 {
        for i in 0..16 {
            let j = i >> 1;
            let old = h[j];
            let step = adjustments[j];

            h[j] = if i & 1 == 0 { old - step } else { old + step };

            let test = symbol_fitness(img, &h, ver);
            if test > best {
                best = test;
            } else {
                h[j] = old;
            }
        }

        adjustments = adjustments.map(|x| x * 0.5);
    }
    h
}

fn symbol_fitness(img: &BinaryImage, h: &Homography, ver: Version) -> i32 {
    let mut score = 0;
    let size = ver.width() as i32;

    // Timing patterns alternate, starting dark on even indices
    for i in 7..size - 7 {
        let flip = if i & 1 == 0 { 1 } else { -1 };
        score += cell_fitness(img, h, i, 6) * flip;
        score += cell_fitness(img, h, 6, i) * flip;
    }

    // Finders
    score += finder_fitness(img, h, 0, 0);
    score += finder_fitness(img, h, size - 7, 0);
    score += finder_fitness(img, h, 0, size - 7);

    // Alignment patterns
    if *ver == 1 {
        return score;
    }
    let aps = ver.alignment_pattern();
    let last = *aps.last().unwrap() as i32;
    for &a in aps.iter() {
        for &b in aps.iter() {
            let (a, b) = (a as i32, b as i32);
            if (a == 6 && (b == 6 || b == last)) || (a == last && b == 6) {
                continue;
            }
            score += alignment_fitness(img, h, a, b);
        }
    }

    score
}

fn finder_fitness(img: &BinaryImage, h: &Homography, x: i32, y: i32) -> i32 {
    let (x, y) = (x + 3, y + 3);
    cell_fitness(img, h, x, y) + ring_fitness(img, h, x, y, 1) - ring_fitness(img, h, x, y, 2)
        + ring_fitness(img, h, x, y, 3)
}

fn alignment_fitness(img: &BinaryImage, h: &Homography, x: i32, y: i32) -> i32 {
    cell_fitness(img, h, x, y) - ring_fitness(img, h, x, y, 1) + ring_fitness(img, h, x, y, 2)
}

fn ring_fitness(img: &BinaryImage, h: &Homography, cx: i32, cy: i32, r: i32) -> i32 {
    let mut score = 0;

    for i in 0..r * 2 {
        score += cell_fitness(img, h, cx - r + i, cy - r);
        score += cell_fitness(img, h, cx + r, cy - r + i);
        score += cell_fitness(img, h, cx + r - i, cy + r);
        score += cell_fitness(img, h, cx - r, cy + r - i);
    }

    score
}

fn cell_fitness(img: &BinaryImage, h: &Homography, x: i32, y: i32) -> i32 {
    const OFFSETS: [f64; 3] = [0.3, 0.5, 0.7];
    let mut score = 0;

    for dy in OFFSETS.iter() {
        for dx in OFFSETS.iter() {
            let Ok(pt) = h.map(x as f64 + dx, y as f64 + dy) else {
                continue;
            };
            if let Some(px) = img.get_at_point(&pt) {
                match Color::from(px) {
                    Color::Dark => score += 1,
                    Color::Light => score -= 1,
                }
            }
        }
    }
    score
}

// Sampling
//------------------------------------------------------------------------------

// Majority vote over five sample points spread across each module
pub(crate) fn sample_grid(img: &BinaryImage, h: &Homography, ver: Version) -> BitGrid {
    const OFFSETS: [(f64, f64); 5] = [(0.5, 0.5), (0.3, 0.3), (0.7, 0.3), (0.3, 0.7), (0.7, 0.7)];

    let w = ver.width();
    let mut grid = BitGrid::new(w);
    for r in 0..w {
        for c in 0..w {
            let mut vote = 0i32;
            for (dx, dy) in OFFSETS {
                let Ok(pt) = h.map(c as f64 + dx, r as f64 + dy) else {
                    continue;
                };
                if let Some(px) = img.get_at_point(&pt) {
                    match Color::from(px) {
                        Color::Dark => vote += 1,
                        Color::Light => vote -= 1,
                    }
                }
            }
            grid.set(r, c, vote > 0);
        }
    }
    grid
}

// Functional grading
//------------------------------------------------------------------------------

// Grades how well the sampled finder, timing and alignment zones agree with
// the patterns the symbol must contain. 4 means every zone is within 5% of
// ideal; heavier damage drops toward 0.
pub(crate) fn functional_grade(grid: &BitGrid) -> u8 {
    let Some(ver) = Version::from_grid_size(grid.width()) else {
        return 0;
    };

    let mut reference = QR::new(ver, ECLevel::L);
    reference.draw_all_function_patterns();

    let w = grid.width();
    // (damage, total) for finder, timing and alignment zones
    let mut zones = [(0u32, 0u32); 3];

    for r in 0..w {
        for c in 0..w {
            let Module::Func(clr) = reference.get(r as i16, c as i16) else {
                continue;
            };
            let in_finder =
                (r < 8 && c < 8) || (r < 8 && c >= w - 8) || (r >= w - 8 && c < 8);
            let zone = if in_finder {
                0
            } else if r == 6 || c == 6 {
                1
            } else {
                2
            };
            zones[zone].1 += 1;
            if grid.get(r, c) != matches!(clr, Color::Dark) {
                zones[zone].0 += 1;
            }
        }
    }

    zones.iter().map(|&(damage, total)| grade_band(damage, total)).min().unwrap()
}

fn grade_band(damage: u32, total: u32) -> u8 {
    if total == 0 || damage == 0 {
        return 4;
    }
    let pct = damage as f64 / total as f64;
    if pct <= 0.05 {
        4
    } else if pct <= 0.07 {
        3
    } else if pct <= 0.11 {
        2
    } else if pct <= 0.14 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod symbol_tests {
    use test_case::test_case;

    use super::super::binarize::BinaryImage;
    use super::super::finder::locate_finders;
    use super::super::Window;
    use super::*;
    use crate::builder::QRBuilder;
    use crate::common::codec::Mode;
    use crate::common::metadata::{ECLevel, Version, VERSION_MAX};

    fn sample_symbol(data: &str, ver: Version, module_size: u32) -> BitGrid {
        let qr = QRBuilder::new(data.as_bytes())
            .mode(Mode::Byte)
            .version(ver)
            .ec_level(ECLevel::M)
            .build()
            .unwrap();
        let exp_bits = qr.to_bits();

        let img = qr.render(module_size);
        let (w, h) = img.dimensions();
        let mut bin = BinaryImage::binarize(&img);
        let finders = locate_finders(&mut bin, &Window { x0: 0, y0: 0, x1: w, y1: h });
        assert_eq!(finders.len(), 3, "Finders not located");

        let mut trio = [finders[0], finders[1], finders[2]];
        orient(&mut trio);
        let est = estimate_version(&trio, VERSION_MAX);
        assert_eq!(est, ver, "Version estimate off");

        let h = locate_symbol(&mut bin, &trio, est).unwrap();
        let grid = sample_grid(&bin, &h, est);
        assert_eq!(grid, exp_bits, "Sampled grid differs from rendered symbol");
        grid
    }

    #[test_case("Hello, world!", Version::Normal(1), 8)]
    #[test_case("Hello, world!", Version::Normal(2), 6)]
    #[test_case("Sampling a bigger symbol with alignment refinement", Version::Normal(7), 5)]
    fn test_sample_roundtrip(data: &str, ver: Version, module_size: u32) {
        sample_symbol(data, ver, module_size);
    }

    #[test]
    fn test_functional_grade_perfect() {
        let grid = sample_symbol("GRADE ME", Version::Normal(2), 8);
        assert_eq!(functional_grade(&grid), 4);
    }

    #[test]
    fn test_functional_grade_damaged_timing() {
        let qr = QRBuilder::new(b"GRADE ME").version(Version::Normal(2)).build().unwrap();
        let mut grid = qr.to_bits();
        // Break half the horizontal timing cells
        for c in (8..17).step_by(2) {
            grid.set(6, c, !grid.get(6, c));
        }
        assert!(functional_grade(&grid) < 2);
    }

    #[test]
    fn test_functional_grade_rejects_bad_size() {
        let grid = BitGrid::new(20);
        assert_eq!(functional_grade(&grid), 0);
    }

    #[test]
    fn test_orient_handedness() {
        use crate::reader::finder::Finder;
        use crate::reader::utils::geometry::Point;

        let tl = Finder { centre: Point { x: 50, y: 50 }, module: 5.0 };
        let tr = Finder { centre: Point { x: 250, y: 50 }, module: 5.0 };
        let bl = Finder { centre: Point { x: 50, y: 250 }, module: 5.0 };

        for perm in [[tr, tl, bl], [bl, tr, tl], [tl, bl, tr]] {
            let mut trio = perm;
            orient(&mut trio);
            assert_eq!(trio[0], tl);
            assert_eq!(trio[1], tr);
            assert_eq!(trio[2], bl);
        }
    }
}
