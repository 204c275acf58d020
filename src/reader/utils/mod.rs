pub mod geometry;
pub mod homography;

use geometry::Point;

use super::binarize::BinaryImage;
use crate::common::metadata::Color;

// Walks outward from a seed along a step direction, counting runs of
// alternating color, and checks them against an expected ratio pattern with a
// half-module tolerance per run. Used to confirm the 1:1:3:1:1 finder ratio
// along the vertical and diagonal axes.
//------------------------------------------------------------------------------

pub(crate) fn verify_pattern(
    img: &BinaryImage,
    seed: &Point,
    pattern: &[f64],
    step: (i32, i32),
    max_run: u32,
) -> bool {
    let Some(px) = img.get_at_point(seed) else {
        return false;
    };
    let pat_len = pattern.len();

    let mut run_len = vec![0u32; pat_len];
    run_len[pat_len / 2] = 1;

    // Count backwards
    let mut pos = *seed;
    let mut flips = pat_len / 2;
    let mut current = Color::from(px);
    while run_len[flips] <= max_run {
        pos.x -= step.0;
        pos.y -= step.1;
        let Some(p) = img.get_at_point(&pos) else {
            break;
        };

        let color = Color::from(p);
        if current != color {
            if flips == 0 {
                break;
            }
            current = color;
            flips -= 1;
        }
        run_len[flips] += 1;
    }

    // Count forwards
    let mut pos = *seed;
    let mut flips = pat_len / 2;
    let mut current = Color::from(px);
    while run_len[flips] <= max_run {
        pos.x += step.0;
        pos.y += step.1;
        let Some(p) = img.get_at_point(&pos) else {
            break;
        };

        let color = Color::from(p);
        if current != color {
            if flips == pat_len - 1 {
                break;
            }
            current = color;
            flips += 1;
        }
        run_len[flips] += 1;
    }

    let total: f64 = pattern.iter().sum();
    let avg = run_len.iter().sum::<u32>() as f64 / total;
    let tol = avg * PATTERN_TOLERANCE;

    pattern.iter().zip(run_len.iter()).all(|(&r, &rl)| {
        let rl = rl as f64;
        r * avg - tol <= rl && rl <= r * avg + tol
    })
}

// Global constants
//------------------------------------------------------------------------------

pub(crate) const PATTERN_TOLERANCE: f64 = 0.5;
