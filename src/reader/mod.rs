mod binarize;
mod deqr;
mod finder;
mod symbol;
mod utils;

use image::RgbaImage;

use binarize::BinaryImage;
use deqr::DeQR;
use finder::locate_finders;
use symbol::{estimate_version, functional_grade, locate_symbol, orient, sample_grid};

use crate::builder::BitGrid;
use crate::common::{
    bitstream::BitStream,
    codec::{decode_payload, Mode},
    ec::Block,
    error::{QRError, QRResult},
    mask::MaskPattern,
    metadata::{ECLevel, Version, VERSION_MAX},
};

// Decode result
//------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeResult {
    pub data: Vec<u8>,
    pub text: String,
    pub mode: Mode,
    pub version: Version,
    pub ec_level: ECLevel,
    pub mask: MaskPattern,
    // 0..4, how cleanly the function patterns sampled
    pub functional_grade: u8,
    // 0..4, headroom left in the strongest-hit block
    pub error_grade: u8,
    pub per_block_errors: Vec<usize>,
}

// Diagnostic sink
//------------------------------------------------------------------------------

// Checkpoints the decoder reports while working through a symbol. The sink is
// borrowed for the duration of one decode call; no global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEvent {
    FinderLocated { x: i32, y: i32 },
    VersionResolved(Version),
    VersionInfoDamaged,
    // side is false for the top-left copy
    FormatCopyDamaged { side: bool },
    MaskIdentified(MaskPattern),
    BlockCorrected { block: usize, errors: usize },
}

pub trait DecodeSink {
    fn note(&mut self, event: DecodeEvent);
    fn warn(&mut self, event: DecodeEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DecodeSink for NullSink {
    fn note(&mut self, _: DecodeEvent) {}
    fn warn(&mut self, _: DecodeEvent) {}
}

// Scan window in image pixels, half-open on the high edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

// Reader
//------------------------------------------------------------------------------

pub struct QRReader;

impl QRReader {
    pub fn decode(img: &RgbaImage) -> QRResult<DecodeResult> {
        Self::decode_with_sink(img, &mut NullSink)
    }

    pub fn decode_with_sink(img: &RgbaImage, sink: &mut dyn DecodeSink) -> QRResult<DecodeResult> {
        let (w, h) = img.dimensions();
        Self::decode_raw_region(img.as_raw(), w, h, 0, w, 0, h, VERSION_MAX, sink)
    }

    pub fn decode_raw(pixels: &[u8], width: u32, height: u32) -> QRResult<DecodeResult> {
        Self::decode_raw_region(
            pixels,
            width,
            height,
            0,
            width,
            0,
            height,
            VERSION_MAX,
            &mut NullSink,
        )
    }

    // Restricts the finder scan to a pixel rectangle and caps the version
    // estimate
    #[allow(clippy::too_many_arguments)]
    pub fn decode_region(
        pixels: &[u8],
        width: u32,
        height: u32,
        x0: u32,
        x1: u32,
        y0: u32,
        y1: u32,
        max_version: usize,
    ) -> QRResult<DecodeResult> {
        Self::decode_raw_region(pixels, width, height, x0, x1, y0, y1, max_version, &mut NullSink)
    }

    #[allow(clippy::too_many_arguments)]
    fn decode_raw_region(
        pixels: &[u8],
        width: u32,
        height: u32,
        x0: u32,
        x1: u32,
        y0: u32,
        y1: u32,
        max_version: usize,
        sink: &mut dyn DecodeSink,
    ) -> QRResult<DecodeResult> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(QRError::InvalidInput);
        }
        let window =
            Window { x0, y0, x1: x1.min(width), y1: y1.min(height) };
        if window.x0 >= window.x1 || window.y0 >= window.y1 {
            return Err(QRError::InvalidInput);
        }

        let mut img = BinaryImage::binarize_rgba(pixels, width, height);

        let finders = locate_finders(&mut img, &window);
        if finders.len() != 3 {
            return Err(QRError::FinderNotFound);
        }
        for f in finders.iter() {
            sink.note(DecodeEvent::FinderLocated { x: f.centre.x, y: f.centre.y });
        }

        let mut trio = [finders[0], finders[1], finders[2]];
        orient(&mut trio);
        let mut ver = estimate_version(&trio, max_version);

        let mut h = locate_symbol(&mut img, &trio, ver)?;
        let mut grid = sample_grid(&img, &h, ver);

        // For version 7 and up the version info bits are authoritative over
        // the pitch estimate; a disagreement forces a resample
        if *ver >= 7 {
            match DeQR::from_grid(&grid, ver).read_version_info() {
                Ok((decoded, _)) => {
                    if decoded != ver {
                        if *decoded > max_version {
                            return Err(QRError::VersionInfoUnreadable);
                        }
                        ver = decoded;
                        h = locate_symbol(&mut img, &trio, ver)?;
                        grid = sample_grid(&img, &h, ver);
                    }
                }
                Err(_) => {
                    // Both copies are gone. Keep the pitch estimate only if
                    // the sampled function patterns back it up.
                    if functional_grade(&grid) == 0 {
                        return Err(QRError::VersionInfoUnreadable);
                    }
                    sink.warn(DecodeEvent::VersionInfoDamaged);
                }
            }
        }
        sink.note(DecodeEvent::VersionResolved(ver));

        Self::read_grid_with_sink(&grid, sink)
    }

    // Decodes an already-sampled module matrix
    pub fn read_grid(grid: &BitGrid) -> QRResult<DecodeResult> {
        Self::read_grid_with_sink(grid, &mut NullSink)
    }

    pub fn read_grid_with_sink(
        grid: &BitGrid,
        sink: &mut dyn DecodeSink,
    ) -> QRResult<DecodeResult> {
        let ver = Version::from_grid_size(grid.width()).ok_or(QRError::SamplingFailed)?;
        let functional_grade = functional_grade(grid);

        let mut deqr = DeQR::from_grid(grid, ver);
        let (ecl, mask, fmt_dists) = deqr.read_format_info()?;
        for (side, dist) in fmt_dists.iter().enumerate() {
            if *dist != Some(0) {
                sink.warn(DecodeEvent::FormatCopyDamaged { side: side == 1 });
            }
        }
        sink.note(DecodeEvent::MaskIdentified(mask));

        deqr.mark_all_function_patterns();
        deqr.unmask(mask);
        let payload = deqr.extract_payload(ecl);

        // De-interleave into blocks and correct each one
        let blk_info = ver.data_codewords_per_block(ecl);
        let ec_len = ver.ecc_per_block(ecl);
        let n_codewords = ver.total_codewords(ecl);
        let mut blocks = Self::deinterleave(&payload.data()[..n_codewords], blk_info, ec_len);

        let mut per_block_errors = Vec::with_capacity(blocks.len());
        let mut data = Vec::with_capacity(ver.data_bit_capacity(ecl) >> 3);
        for (i, blk) in blocks.iter_mut().enumerate() {
            let fixed = blk.rectify()?;
            if fixed > 0 {
                sink.note(DecodeEvent::BlockCorrected { block: i, errors: fixed });
            }
            per_block_errors.push(fixed);
            data.extend_from_slice(blk.data());
        }
        let error_grade = error_grade(&per_block_errors, ec_len);

        let mut enc = BitStream::from_bytes(&data);
        let (mode, bytes) = decode_payload(&mut enc, ver)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        Ok(DecodeResult {
            data: bytes,
            text,
            mode,
            version: ver,
            ec_level: ecl,
            mask,
            functional_grade,
            error_grade,
            per_block_errors,
        })
    }

    fn deinterleave(
        data: &[u8],
        blk_info: (usize, usize, usize, usize),
        ec_len: usize,
    ) -> Vec<Block> {
        // b1s = group1 block size, b1c = group1 block count
        let (b1s, b1c, b2s, b2c) = blk_info;

        let total_blks = b1c + b2c;
        let spl = b1s * total_blks;
        let data_sz = b1s * b1c + b2s * b2c;

        let mut blks = vec![Vec::with_capacity(b1s.max(b2s) + ec_len); total_blks];

        // Data codewords, column-major until the short blocks run out
        data[..spl]
            .chunks(total_blks)
            .for_each(|ch| ch.iter().enumerate().for_each(|(i, v)| blks[i].push(*v)));
        if b2c > 0 {
            data[spl..data_sz]
                .chunks(b2c)
                .for_each(|ch| ch.iter().enumerate().for_each(|(i, v)| blks[b1c + i].push(*v)));
        }

        // Parity codewords
        data[data_sz..]
            .chunks(total_blks)
            .for_each(|ch| ch.iter().enumerate().for_each(|(i, v)| blks[i].push(*v)));

        blks.iter().map(|b| Block::with_encoded(b, b.len() - ec_len)).collect()
    }
}

// 4 minus the fraction of the correction capacity the worst block consumed
fn error_grade(errors: &[usize], ec_len: usize) -> u8 {
    let t = (ec_len / 2).max(1);
    let max_err = errors.iter().copied().max().unwrap_or(0);
    4u8.saturating_sub((max_err * 4 / t) as u8)
}

#[cfg(test)]
mod reader_tests {
    use test_case::test_case;

    use super::*;
    use crate::builder::QRBuilder;
    use crate::common::codec::Mode;

    #[test]
    fn test_deinterleave() {
        let data = "Interleaving fixture!!!".as_bytes();
        let ver = Version::Normal(3);
        let ecl = ECLevel::Q;

        let padded = {
            let bs =
                crate::common::codec::encode_payload(data, Mode::Byte, ver, ecl).unwrap();
            bs.data()[..ver.data_bit_capacity(ecl) >> 3].to_vec()
        };
        let data_blocks = QRBuilder::blockify(&padded, ver, ecl);
        let ec_len = ver.ecc_per_block(ecl);
        let exp_blocks: Vec<Block> = data_blocks
            .iter()
            .map(|b| Block::new(b, b.len() + ec_len))
            .collect();

        let mut wire = QRBuilder::interleave(&data_blocks);
        let ecc_blocks: Vec<Vec<u8>> =
            exp_blocks.iter().map(|b| b.ecc().to_vec()).collect();
        wire.extend(QRBuilder::interleave(&ecc_blocks));

        let blocks = QRReader::deinterleave(&wire, ver.data_codewords_per_block(ecl), ec_len);
        assert_eq!(blocks, exp_blocks);
    }

    #[test_case(0, 10, 4)]
    #[test_case(1, 10, 4)]
    #[test_case(2, 10, 3)]
    #[test_case(5, 10, 0)]
    #[test_case(3, 14, 3)]
    fn test_error_grade(max_err: usize, ec_len: usize, exp: u8) {
        assert_eq!(error_grade(&[0, max_err], ec_len), exp);
    }

    #[test_case("01234567", Mode::Numeric, Version::Normal(1), ECLevel::M)]
    #[test_case("HELLO WORLD", Mode::Alphanumeric, Version::Normal(1), ECLevel::Q)]
    #[test_case("Hello, world!", Mode::Byte, Version::Normal(2), ECLevel::L)]
    #[test_case("https://example.com/some/longer/path?q=42", Mode::Byte, Version::Normal(5), ECLevel::H)]
    #[test_case("VERSION SEVEN CARRIES VERSION INFO", Mode::Alphanumeric, Version::Normal(7), ECLevel::Q)]
    fn test_read_grid_roundtrip(data: &str, mode: Mode, ver: Version, ecl: ECLevel) {
        let qr = QRBuilder::new(data.as_bytes())
            .mode(mode)
            .version(ver)
            .ec_level(ecl)
            .build()
            .unwrap();

        let res = QRReader::read_grid(&qr.to_bits()).unwrap();
        assert_eq!(res.text, data);
        assert_eq!(res.mode, mode);
        assert_eq!(res.version, ver);
        assert_eq!(res.ec_level, ecl);
        assert_eq!(res.mask, qr.mask().unwrap());
        assert_eq!(res.functional_grade, 4);
        assert_eq!(res.error_grade, 4);
        assert!(res.per_block_errors.iter().all(|&e| e == 0));
    }

    #[test]
    fn test_read_grid_reports_corrected_blocks() {
        let data = "Block correction fixture";
        let ver = Version::Normal(2);
        let ecl = ECLevel::H;
        let qr = QRBuilder::new(data.as_bytes())
            .mode(Mode::Byte)
            .version(ver)
            .ec_level(ecl)
            .build()
            .unwrap();

        let mut grid = qr.to_bits();
        // Flip one whole codeword worth of modules in the data region
        let w = grid.width();
        for c in w - 9..w - 1 {
            grid.set(w - 2, c, !grid.get(w - 2, c));
        }

        let res = QRReader::read_grid(&grid).unwrap();
        assert_eq!(res.text, data);
        assert!(res.per_block_errors.iter().sum::<usize>() > 0);
        assert!(res.error_grade < 4);
    }
}
