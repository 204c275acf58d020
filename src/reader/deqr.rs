use std::ops::Not;

use crate::builder::BitGrid;
use crate::common::{
    bitstream::BitStream,
    ec::rectify_info,
    error::{QRError, QRResult},
    iter::EncRegionIter,
    mask::MaskPattern,
    metadata::{
        parse_format_info, Color, ECLevel, Version, FORMAT_ERROR_CAPACITY, FORMAT_INFOS_QR,
        FORMAT_INFO_COORDS_MAIN, FORMAT_INFO_COORDS_SIDE, FORMAT_MASK, VERSION_ERROR_BIT_LEN,
        VERSION_ERROR_CAPACITY, VERSION_INFOS, VERSION_INFO_COORDS_BL, VERSION_INFO_COORDS_TR,
    },
};

// Module state while reading a sampled grid
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum DeModule {
    Unmarked(Color),
    // Consumed by a function pattern or an info field
    Marked,
}

impl Not for DeModule {
    type Output = Self;
    fn not(self) -> Self::Output {
        match self {
            Self::Unmarked(c) => Self::Unmarked(!c),
            Self::Marked => Self::Marked,
        }
    }
}

// Sampled-grid reader
//------------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct DeQR {
    grid: Vec<DeModule>,
    w: usize,
    ver: Version,
}

impl DeQR {
    pub fn from_grid(bits: &BitGrid, ver: Version) -> Self {
        debug_assert!(bits.width() == ver.width(), "Grid size doesn't match version");

        let w = bits.width();
        let mut grid = Vec::with_capacity(w * w);
        for r in 0..w {
            for c in 0..w {
                grid.push(DeModule::Unmarked(Color::from(bits.get(r, c))));
            }
        }
        Self { grid, w, ver }
    }

    fn coord_to_index(&self, r: i16, c: i16) -> usize {
        let w = self.w as i16;
        debug_assert!(-w <= r && r < w, "Row out of bounds");
        debug_assert!(-w <= c && c < w, "Column out of bounds");

        let r = if r < 0 { r + w } else { r };
        let c = if c < 0 { c + w } else { c };
        (r * w + c) as _
    }

    fn get(&self, r: i16, c: i16) -> DeModule {
        self.grid[self.coord_to_index(r, c)]
    }

    fn set(&mut self, r: i16, c: i16, module: DeModule) {
        let index = self.coord_to_index(r, c);
        self.grid[index] = module;
    }

    fn get_number(&self, coords: &[(i16, i16)]) -> u32 {
        let mut num = 0;
        for (r, c) in coords {
            let bit = match self.get(*r, *c) {
                DeModule::Unmarked(clr) => u32::from(clr),
                DeModule::Marked => 0,
            };
            num = (num << 1) | bit;
        }
        num
    }
}

// Format & version info
//------------------------------------------------------------------------------

impl DeQR {
    // Reads both format info copies and keeps the one closer to a valid
    // codeword; the main copy wins ties. Also reports the per-copy BCH
    // distance, None when a copy is beyond correction.
    pub fn read_format_info(&self) -> QRResult<(ECLevel, MaskPattern, [Option<u32>; 2])> {
        let main = self.get_number(&FORMAT_INFO_COORDS_MAIN);
        let side = self.get_number(&FORMAT_INFO_COORDS_SIDE);
        let main_fix = rectify_info(main, &FORMAT_INFOS_QR, FORMAT_ERROR_CAPACITY);
        let side_fix = rectify_info(side, &FORMAT_INFOS_QR, FORMAT_ERROR_CAPACITY);

        let value = match (main_fix, side_fix) {
            (Some((m, dm)), Some((s, ds))) => {
                if ds < dm {
                    s
                } else {
                    m
                }
            }
            (Some((m, _)), None) => m,
            (None, Some((s, _))) => s,
            (None, None) => return Err(QRError::FormatInfoUnreadable),
        };

        let (ecl, mask) = parse_format_info(value ^ FORMAT_MASK);
        let dists = [main_fix.map(|(_, d)| d), side_fix.map(|(_, d)| d)];
        Ok((ecl, mask, dists))
    }

    pub fn read_version_info(&self) -> QRResult<(Version, [Option<u32>; 2])> {
        debug_assert!(
            matches!(self.ver, Version::Normal(7..=40)),
            "Version too small to carry version info"
        );

        let bl = self.get_number(&VERSION_INFO_COORDS_BL);
        let tr = self.get_number(&VERSION_INFO_COORDS_TR);
        let bl_fix = rectify_info(bl, &VERSION_INFOS, VERSION_ERROR_CAPACITY);
        let tr_fix = rectify_info(tr, &VERSION_INFOS, VERSION_ERROR_CAPACITY);

        let value = match (bl_fix, tr_fix) {
            (Some((b, db)), Some((t, dt))) => {
                if dt < db {
                    t
                } else {
                    b
                }
            }
            (Some((b, _)), None) => b,
            (None, Some((t, _))) => t,
            (None, None) => return Err(QRError::VersionInfoUnreadable),
        };

        let ver = Version::Normal(value as usize >> VERSION_ERROR_BIT_LEN);
        let dists = [bl_fix.map(|(_, d)| d), tr_fix.map(|(_, d)| d)];
        Ok((ver, dists))
    }
}

// Function patterns
//------------------------------------------------------------------------------

// Marks every cell the data traversal must skip: finders with separators,
// timing lines, alignment patterns, both info areas and the dark module
impl DeQR {
    pub fn mark_all_function_patterns(&mut self) {
        self.mark_finder_patterns();
        self.mark_timing_patterns();
        self.mark_alignment_patterns();
        self.mark_coords(&FORMAT_INFO_COORDS_MAIN);
        self.mark_coords(&FORMAT_INFO_COORDS_SIDE);
        self.set(-8, 8, DeModule::Marked);
        if matches!(self.ver, Version::Normal(7..=40)) {
            self.mark_coords(&VERSION_INFO_COORDS_BL);
            self.mark_coords(&VERSION_INFO_COORDS_TR);
        }
    }

    fn mark_coords(&mut self, coords: &[(i16, i16)]) {
        for (r, c) in coords {
            self.set(*r, *c, DeModule::Marked);
        }
    }

    fn mark_finder_patterns(&mut self) {
        self.mark_rect(0, 0, 8, 8);
        self.mark_rect(0, -8, 8, 8);
        self.mark_rect(-8, 0, 8, 8);
    }

    fn mark_rect(&mut self, r: i16, c: i16, height: i16, width: i16) {
        for i in 0..height {
            for j in 0..width {
                self.set(r + i, c + j, DeModule::Marked);
            }
        }
    }

    fn mark_timing_patterns(&mut self) {
        let w = self.w as i16;
        for i in 8..w - 8 {
            self.set(6, i, DeModule::Marked);
            self.set(i, 6, DeModule::Marked);
        }
    }

    fn mark_alignment_patterns(&mut self) {
        let positions = self.ver.alignment_pattern();
        for &r in positions {
            for &c in positions {
                self.mark_alignment_pattern_at(r, c);
            }
        }
    }

    fn mark_alignment_pattern_at(&mut self, r: i16, c: i16) {
        let w = self.w as i16;
        if (r == 6 && (c == 6 || c - w == -7)) || (r - w == -7 && c == 6) {
            return;
        }
        for i in -2..=2 {
            for j in -2..=2 {
                self.set(r + i, c + j, DeModule::Marked);
            }
        }
    }
}

// Unmask & payload extraction
//------------------------------------------------------------------------------

impl DeQR {
    pub fn unmask(&mut self, pattern: MaskPattern) {
        let mask_fn = pattern.mask_function();
        let w = self.w as i16;
        for r in 0..w {
            for c in 0..w {
                if mask_fn(r, c) {
                    self.set(r, c, !self.get(r, c));
                }
            }
        }
    }

    // Walks the encoding region in placement order and collects the codeword
    // bits, dropping the remainder bits at the tail
    pub fn extract_payload(&mut self, ecl: ECLevel) -> BitStream {
        let n_bits = self.ver.total_codewords(ecl) << 3;
        let mut payload = BitStream::new(n_bits);
        let mut taken = 0;

        for (r, c) in EncRegionIter::new(self.ver) {
            if taken == n_bits {
                break;
            }
            if let DeModule::Unmarked(clr) = self.get(r, c) {
                payload.push(clr == Color::Dark);
                taken += 1;
            }
        }

        debug_assert!(taken == n_bits, "Encoding region too small: {taken} < {n_bits}");
        payload
    }
}
