mod qr;

pub use qr::{BitGrid, Module, QR, QUIET_ZONE};

use crate::common::{
    codec::{encode_payload, Mode},
    ec::ecc,
    error::QRResult,
    mask::{apply_best_mask, MaskPattern},
    metadata::{version_for_length, ECLevel, Version},
};

// Builder
//------------------------------------------------------------------------------

pub struct QRBuilder<'a> {
    data: &'a [u8],
    mode: Mode,
    version: Option<Version>,
    ec_level: ECLevel,
    mask: Option<MaskPattern>,
}

impl<'a> QRBuilder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, mode: Mode::Byte, version: None, ec_level: ECLevel::M, mask: None }
    }

    pub fn mode(&mut self, mode: Mode) -> &mut Self {
        self.mode = mode;
        self
    }

    pub fn version(&mut self, version: Version) -> &mut Self {
        self.version = Some(version);
        self
    }

    pub fn ec_level(&mut self, ec_level: ECLevel) -> &mut Self {
        self.ec_level = ec_level;
        self
    }

    pub fn mask(&mut self, mask: MaskPattern) -> &mut Self {
        self.mask = Some(mask);
        self
    }

    pub fn build(&self) -> QRResult<QR> {
        let version = match self.version {
            Some(v) => v,
            None => version_for_length(self.ec_level, self.mode, self.data.len())?,
        };

        // Encode data and split into blocks with parity
        let encoded = encode_payload(self.data, self.mode, version, self.ec_level)?;
        let data_len = version.data_bit_capacity(self.ec_level) >> 3;
        let (data_blocks, ecc_blocks) =
            Self::compute_ecc(&encoded.data()[..data_len], version, self.ec_level);

        // Interleave data codewords first, then parity codewords
        let mut payload = Vec::with_capacity(version.total_codewords(self.ec_level));
        payload.extend(Self::interleave(&data_blocks));
        payload.extend(Self::interleave(&ecc_blocks));

        // Lay out the symbol
        let mut qr = QR::new(version, self.ec_level);
        qr.draw_all_function_patterns();
        qr.draw_encoding_region(&payload);

        match self.mask {
            Some(m) => qr.apply_mask(m),
            None => {
                apply_best_mask(&mut qr);
            }
        };

        Ok(qr)
    }

    fn compute_ecc(
        data: &[u8],
        version: Version,
        ec_level: ECLevel,
    ) -> (Vec<&[u8]>, Vec<Vec<u8>>) {
        let data_blocks = Self::blockify(data, version, ec_level);
        let ec_len = version.ecc_per_block(ec_level);
        let ecc_blocks = data_blocks.iter().map(|b| ecc(b, ec_len)).collect::<Vec<_>>();
        (data_blocks, ecc_blocks)
    }

    pub(crate) fn blockify(data: &[u8], version: Version, ec_level: ECLevel) -> Vec<&[u8]> {
        let (block1_size, block1_count, block2_size, block2_count) =
            version.data_codewords_per_block(ec_level);

        let total_block1_size = block1_size * block1_count;
        let total_size = total_block1_size + block2_size * block2_count;

        debug_assert!(
            total_size == data.len(),
            "Data length doesn't match block layout: Data {}, Blocks {}",
            data.len(),
            total_size
        );

        let mut data_blocks = Vec::with_capacity(block1_count + block2_count);
        data_blocks.extend(data[..total_block1_size].chunks(block1_size));
        if block2_size > 0 {
            data_blocks.extend(data[total_block1_size..].chunks(block2_size));
        }
        data_blocks
    }

    pub(crate) fn interleave<T: Copy, V: std::ops::Deref<Target = [T]>>(blocks: &[V]) -> Vec<T> {
        let max_len = blocks.iter().map(|b| b.len()).max().expect("At least one block");
        let total = blocks.iter().map(|b| b.len()).sum::<usize>();
        let mut res = Vec::with_capacity(total);
        for i in 0..max_len {
            for b in blocks {
                if i < b.len() {
                    res.push(b[i]);
                }
            }
        }
        res
    }
}

#[cfg(test)]
mod builder_tests {
    use test_case::test_case;

    use super::QRBuilder;
    use crate::common::codec::Mode;
    use crate::common::error::QRError;
    use crate::common::metadata::{ECLevel, Version};

    #[test]
    fn test_compute_ecc_simple() {
        let msg = b" [\x0bx\xd1r\xdcMC@\xec\x11\xec\x11\xec\x11";
        let expected_ecc = [b"\xc4\x23\x27\x77\xeb\xd7\xe7\xe2\x5d\x17"];
        let (_, ecc) = QRBuilder::compute_ecc(msg, Version::Normal(1), ECLevel::M);
        assert_eq!(&*ecc, expected_ecc);
    }

    #[test]
    fn test_compute_ecc_multiblock() {
        let msg = b"CUF\x86W&U\xc2w2\x06\x12\x06g&\xf6\xf6B\x07v\x86\xf2\x07&V\x16\xc6\xc7\x92\x06\
                    \xb6\xe6\xf7w2\x07v\x86W&R\x06\x86\x972\x07F\xf7vV\xc2\x06\x972\x10\xec\x11\xec\
                    \x11\xec\x11\xec";
        let expected_ecc = [
            b"\xd5\xc7\x0b\x2d\x73\xf7\xf1\xdf\xe5\xf8\x9a\x75\x9a\x6f\x56\xa1\x6f\x27",
            b"\x57\xcc\x60\x3c\xca\xb6\x7c\x9d\xc8\x86\x1b\x81\xd1\x11\xa3\xa3\x78\x85",
            b"\x94\x74\xb1\xd4\x4c\x85\x4b\xf2\xee\x4c\xc3\xe6\xbd\x0a\x6c\xf0\xc0\x8d",
            b"\xeb\x9f\x05\xad\x18\x93\x3b\x21\x6a\x28\xff\xac\x52\x02\x83\x20\xb2\xec",
        ];
        let (_, ecc) = QRBuilder::compute_ecc(msg, Version::Normal(5), ECLevel::Q);
        assert_eq!(&*ecc, &expected_ecc[..]);
    }

    #[test]
    fn test_interleave() {
        let blocks = vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9, 0]];
        let interleaved = QRBuilder::interleave(&blocks);
        assert_eq!(interleaved, vec![1, 4, 7, 2, 5, 8, 3, 6, 9, 0]);
    }

    #[test]
    fn test_build_rejects_bad_mode_data() {
        let res = QRBuilder::new(b"hello").mode(Mode::Alphanumeric).build();
        assert_eq!(res.unwrap_err(), QRError::InvalidInput);
    }

    #[test]
    fn test_build_rejects_overflow() {
        let data = "1".repeat(42);
        let res = QRBuilder::new(data.as_bytes())
            .mode(Mode::Numeric)
            .version(Version::Normal(1))
            .ec_level(ECLevel::M)
            .build();
        assert_eq!(res.unwrap_err(), QRError::CapacityExceeded);
    }

    #[test_case("1234567890", Mode::Numeric, Version::Normal(1), ECLevel::H)]
    #[test_case("HELLO WORLD", Mode::Alphanumeric, Version::Normal(1), ECLevel::Q)]
    #[test_case("Hello, world!", Mode::Byte, Version::Normal(2), ECLevel::M)]
    #[test_case("http://qrlogo.kaarposoft.dk", Mode::Byte, Version::Normal(4), ECLevel::H)]
    #[test_case("A11111111111111", Mode::Alphanumeric, Version::Normal(7), ECLevel::L)]
    fn test_build_cross_checked(data: &str, mode: Mode, version: Version, ec_level: ECLevel) {
        let img = QRBuilder::new(data.as_bytes())
            .mode(mode)
            .version(version)
            .ec_level(ec_level)
            .build()
            .unwrap()
            .render(8);

        let (w, h) = img.dimensions();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
            img.get_pixel(x as u32, y as u32)[0]
        });
        let grids = prepared.detect_grids();
        assert_eq!(grids.len(), 1);
        let (meta, content) = grids[0].decode().unwrap();

        assert_eq!(*version, meta.version.0);
        assert_eq!(data, content);
    }
}
