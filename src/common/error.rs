use std::fmt::{Display, Error, Formatter};

// Error
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum QRError {
    // Encoder
    InvalidInput,
    CapacityExceeded,

    // Reader
    FinderNotFound,
    FormatInfoUnreadable,
    VersionInfoUnreadable,
    SamplingFailed,
    Uncorrectable,
    DecodingMismatch,
}

impl Display for QRError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        let msg = match *self {
            // Encoder
            Self::InvalidInput => "Input not permitted by the chosen mode or version",
            Self::CapacityExceeded => "Payload does not fit the chosen version, ec level and mode",

            // Reader
            Self::FinderNotFound => "Could not confirm exactly three finder patterns",
            Self::FormatInfoUnreadable => "Format info unreadable at both locations",
            Self::VersionInfoUnreadable => "Version info unreadable at both locations",
            Self::SamplingFailed => "Perspective fit degenerate",
            Self::Uncorrectable => "Too many errors to correct successfully",
            Self::DecodingMismatch => "Decoded bitstream violates segment structure",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for QRError {}

pub type QRResult<T> = Result<T, QRError>;
