//! A QR code engine: encodes text into module grids and decodes symbols back
//! out of raster images, tolerating noise and damage up to the Reed-Solomon
//! capacity of the code.
//!
//! ```
//! use qrlens::{ECLevel, Mode, QRReader};
//!
//! let qr = qrlens::encode("HELLO WORLD", Mode::Alphanumeric, ECLevel::Q, None).unwrap();
//! let image = qr.render(8);
//!
//! let rgba = image::DynamicImage::ImageLuma8(image).to_rgba8();
//! let result = QRReader::decode(&rgba).unwrap();
//! assert_eq!(result.text, "HELLO WORLD");
//! ```

pub mod builder;
mod common;
pub mod reader;

pub use builder::{BitGrid, QRBuilder, QR};
pub use common::codec::Mode;
pub use common::error::{QRError, QRResult};
pub use common::mask::MaskPattern;
pub use common::metadata::{ECLevel, Version};
pub use reader::{DecodeEvent, DecodeResult, DecodeSink, NullSink, QRReader};

/// Encodes text into a QR symbol. The smallest version that fits is chosen
/// when none is given; the mask is always chosen by penalty scoring.
pub fn encode(text: &str, mode: Mode, ec: ECLevel, version: Option<Version>) -> QRResult<QR> {
    let mut builder = QRBuilder::new(text.as_bytes());
    builder.mode(mode).ec_level(ec);
    if let Some(v) = version {
        builder.version(v);
    }
    builder.build()
}

/// Decodes the QR symbol in an RGBA pixel buffer
pub fn decode(pixels: &[u8], width: u32, height: u32) -> QRResult<DecodeResult> {
    QRReader::decode_raw(pixels, width, height)
}

/// Decodes with the finder scan restricted to a pixel rectangle and the
/// version estimate capped
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
    QRReader::decode_region(pixels, width, height, x0, x1, y0, y1, max_version)
}

/// The smallest version able to hold `len` characters of the given mode
pub fn version_for_length(ec: ECLevel, mode: Mode, len: usize) -> QRResult<Version> {
    common::metadata::version_for_length(ec, mode, len)
}

/// Data capacity in bits, before error correction overhead
pub fn data_capacity_bits(version: Version, ec: ECLevel) -> usize {
    version.data_bit_capacity(ec)
}
