use std::ops::Deref;

use rayon::prelude::*;

use super::metadata::Color;
use crate::builder::QR;

// Mask pattern
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Copy, Clone, PartialOrd, Ord)]
pub struct MaskPattern(u8);

impl MaskPattern {
    pub fn new(pattern: u8) -> Self {
        debug_assert!(pattern < 8, "Invalid mask pattern");
        Self(pattern)
    }
}

impl Deref for MaskPattern {
    type Target = u8;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

mod mask_functions {
    pub fn checkerboard(r: i16, c: i16) -> bool {
        (r + c) & 1 == 0
    }

    pub fn horizontal_lines(r: i16, _: i16) -> bool {
        r & 1 == 0
    }

    pub fn vertical_lines(_: i16, c: i16) -> bool {
        c % 3 == 0
    }

    pub fn diagonal_lines(r: i16, c: i16) -> bool {
        (r + c) % 3 == 0
    }

    pub fn large_checkerboard(r: i16, c: i16) -> bool {
        ((r >> 1) + (c / 3)) & 1 == 0
    }

    pub fn fields(r: i16, c: i16) -> bool {
        ((r * c) & 1) + ((r * c) % 3) == 0
    }

    pub fn diamonds(r: i16, c: i16) -> bool {
        (((r * c) & 1) + ((r * c) % 3)) & 1 == 0
    }

    pub fn meadow(r: i16, c: i16) -> bool {
        (((r + c) & 1) + ((r * c) % 3)) & 1 == 0
    }
}

impl MaskPattern {
    pub fn mask_function(self) -> fn(i16, i16) -> bool {
        debug_assert!(*self < 8, "Invalid mask pattern");

        match *self {
            0b000 => mask_functions::checkerboard,
            0b001 => mask_functions::horizontal_lines,
            0b010 => mask_functions::vertical_lines,
            0b011 => mask_functions::diagonal_lines,
            0b100 => mask_functions::large_checkerboard,
            0b101 => mask_functions::fields,
            0b110 => mask_functions::diamonds,
            0b111 => mask_functions::meadow,
            _ => unreachable!(),
        }
    }
}

// Mask evaluation
//------------------------------------------------------------------------------

// Scores all eight masks and applies the best one. Ties resolve to the lowest
// pattern index.
pub fn apply_best_mask(qr: &mut QR) -> MaskPattern {
    let base: &QR = qr;
    let (_, best) = (0..8u8)
        .into_par_iter()
        .map(|m| {
            let mut candidate = base.clone();
            candidate.apply_mask(MaskPattern(m));
            (compute_total_penalty(&candidate), m)
        })
        .min()
        .expect("Eight masks to score");

    let best = MaskPattern(best);
    qr.apply_mask(best);
    best
}

pub fn compute_total_penalty(qr: &QR) -> u32 {
    compute_run_penalty(qr)
        + compute_block_penalty(qr)
        + compute_finder_pattern_penalty(qr)
        + compute_balance_penalty(qr)
}

// Rule 1: every run of 5 or more same-colored modules in a row or column
// scores 3 + (run length - 5)
fn compute_run_penalty(qr: &QR) -> u32 {
    let mut pen = 0;
    let w = qr.width() as i16;

    for i in 0..w {
        let mut row_run = (Color::Light, 0u32);
        let mut col_run = (Color::Light, 0u32);
        for j in 0..w {
            let row_clr = *qr.get(i, j);
            if row_run.0 == row_clr {
                row_run.1 += 1;
            } else {
                pen += finished_run_penalty(row_run.1);
                row_run = (row_clr, 1);
            }

            let col_clr = *qr.get(j, i);
            if col_run.0 == col_clr {
                col_run.1 += 1;
            } else {
                pen += finished_run_penalty(col_run.1);
                col_run = (col_clr, 1);
            }
        }
        pen += finished_run_penalty(row_run.1) + finished_run_penalty(col_run.1);
    }
    pen
}

fn finished_run_penalty(run: u32) -> u32 {
    if run >= 5 {
        3 + (run - 5)
    } else {
        0
    }
}

// Rule 2: every 2x2 block of same-colored modules scores 3
fn compute_block_penalty(qr: &QR) -> u32 {
    let mut pen = 0;
    let w = qr.width() as i16;
    for r in 0..w - 1 {
        for c in 0..w - 1 {
            let clr = *qr.get(r, c);
            if clr == *qr.get(r + 1, c) && clr == *qr.get(r, c + 1) && clr == *qr.get(r + 1, c + 1)
            {
                pen += 3;
            }
        }
    }
    pen
}

// Rule 3: a 1:1:3:1:1 dark-light sequence with 4 light modules on either side
// scores 40, in any row or column
fn compute_finder_pattern_penalty(qr: &QR) -> u32 {
    use Color::{Dark, Light};
    static PATTERN: [Color; 7] = [Dark, Light, Dark, Dark, Dark, Light, Dark];

    let mut pen = 0;
    let w = qr.width() as i16;

    for i in 0..w {
        for j in 0..w - 6 {
            for horizontal in [true, false] {
                let get = |k: i16| if horizontal { *qr.get(i, k) } else { *qr.get(k, i) };
                if (j..j + 7).map(get).ne(PATTERN.iter().copied()) {
                    continue;
                }
                let light_margin = |mut range: std::ops::Range<i16>| {
                    range.all(|k| k < 0 || k >= w || get(k) == Light)
                };
                if light_margin(j - 4..j) || light_margin(j + 7..j + 11) {
                    pen += 40;
                }
            }
        }
    }
    pen
}

// Rule 4: 10 points for every 5% the dark-module ratio deviates from 50%
fn compute_balance_penalty(qr: &QR) -> u32 {
    let dark_cnt = qr.count_dark_modules();
    let w = qr.width();
    let pct = (dark_cnt * 100 / (w * w)) as i32;
    10 * ((pct - 50).unsigned_abs() / 5)
}
