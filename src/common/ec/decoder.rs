use super::galois::G;
use super::{Block, MAX_BLOCK_SIZE, MAX_EC_SIZE};
use crate::common::error::{QRError, QRResult};

// Rectifier
//------------------------------------------------------------------------------

impl Block {
    // Corrects in-place and returns the number of codewords that were fixed.
    // Fails without touching the data when the error count exceeds the
    // correction capacity of the block.
    pub fn rectify(&mut self) -> QRResult<usize> {
        let synd = match self.syndromes() {
            Ok(()) => return Ok(0),
            Err(s) => s,
        };

        // Error locator polynomial
        let (sig, deg) = self.berlekamp_massey(&synd);
        if deg > self.ec_len() / 2 {
            return Err(QRError::Uncorrectable);
        }

        let err_loc = self.chien_search(&sig);
        let n_errors = err_loc[..self.len].iter().filter(|&&e| e).count();
        if n_errors != deg {
            return Err(QRError::Uncorrectable);
        }

        // Sigma derivative
        let mut dsig = [G(0); MAX_EC_SIZE];
        for i in (1..MAX_EC_SIZE).step_by(2) {
            dsig[i - 1] = sig[i];
        }

        // Error evaluator
        let omg = self.omega(&synd, &sig);

        // Error magnitude
        let err_mag = self.forney(&omg, &dsig, &err_loc);

        // Rectify errors by XORing data with magnitude
        for (i, &g) in err_mag.iter().take(self.len).enumerate() {
            self.data[i] = (G(self.data[i]) + g).into();
        }

        match self.syndromes() {
            Ok(()) => Ok(n_errors),
            Err(_) => Err(QRError::Uncorrectable),
        }
    }

    fn syndromes(&self) -> Result<(), [G; MAX_EC_SIZE]> {
        let ec_len = self.ec_len();
        let mut synd = [G(0); MAX_EC_SIZE];

        let mut gdata = [G(0); MAX_BLOCK_SIZE];
        for (i, &b) in self.data.iter().take(self.len).enumerate() {
            gdata[i] = G(b);
        }
        for (i, s) in synd.iter_mut().take(ec_len).enumerate() {
            *s = eval_poly(gdata.iter().take(self.len).rev(), G::gen_pow(i));
        }

        if synd.iter().all(|&s| s.0 == 0) {
            Ok(())
        } else {
            Err(synd)
        }
    }

    // Sigma polynomial and its degree
    fn berlekamp_massey(&self, synd: &[G]) -> ([G; MAX_EC_SIZE], usize) {
        let mut l = 0usize;
        let mut m = 1usize;
        let mut b = G(1);
        let mut cx = [G(0); MAX_EC_SIZE];
        let mut bx = [G(0); MAX_EC_SIZE];
        let mut tx = [G(0); MAX_EC_SIZE];
        cx[0] = G(1);
        bx[0] = G(1);

        for n in 0..self.ec_len() {
            // Discrepancy
            let mut d = synd[n];
            for i in 1..=l {
                d += cx[i] * synd[n - i];
            }

            if d.0 != 0 {
                tx.copy_from_slice(&cx);

                let scale = d / b;
                for i in 0..MAX_EC_SIZE - m {
                    cx[i + m] += scale * bx[i];
                }

                if 2 * l <= n {
                    bx.copy_from_slice(&tx);
                    l = n + 1 - l;
                    b = d;
                    m = 1;
                } else {
                    m += 1;
                }
            } else {
                m += 1;
            }
        }
        (cx, l)
    }

    // Error locations, indexed by codeword position
    fn chien_search(&self, sig: &[G; MAX_EC_SIZE]) -> [bool; MAX_BLOCK_SIZE] {
        let ec_len = self.ec_len();
        let mut err_loc = [false; MAX_BLOCK_SIZE];
        for (i, e) in err_loc[..self.len].iter_mut().rev().enumerate() {
            *e = eval_poly(sig.iter().take(ec_len), G::gen_pow(255 - i)).0 == 0;
        }
        err_loc
    }

    // Error evaluator polynomial
    fn omega(&self, synd: &[G; MAX_EC_SIZE], sig: &[G; MAX_EC_SIZE]) -> [G; MAX_EC_SIZE] {
        let t = self.ec_len() - 1;
        let mut omg = [G(0); MAX_EC_SIZE];
        for i in 0..t {
            let sy = synd[i + 1];
            for j in 0..t - i {
                omg[i + j] += sy * sig[j];
            }
        }
        omg
    }

    fn forney(
        &self,
        omg: &[G; MAX_EC_SIZE],
        dsig: &[G; MAX_EC_SIZE],
        err_loc: &[bool; MAX_BLOCK_SIZE],
    ) -> [G; MAX_BLOCK_SIZE] {
        let mut mag = [G(0); MAX_BLOCK_SIZE];
        for (i, &is_err) in err_loc.iter().take(self.len).rev().enumerate() {
            if !is_err {
                continue;
            }
            let xinv = G::gen_pow(255 - i);
            let omg_x = eval_poly(omg.iter(), xinv);
            let sig_x = eval_poly(dsig.iter(), xinv);
            mag[self.len - 1 - i] += omg_x / sig_x;
        }
        mag
    }
}

fn eval_poly<'a>(poly: impl Iterator<Item = &'a G>, x: G) -> G {
    let mut res = G(0);
    let mut xpow = G(1);
    for &coeff in poly {
        res += coeff * xpow;
        xpow *= x;
    }
    res
}

#[cfg(test)]
mod rectifier_tests {
    use test_case::test_case;

    use super::super::Block;
    use crate::common::error::QRError;

    #[test_case(&[0, 3])]
    #[test_case(&[5])]
    #[test_case(&[2, 7, 10])]
    fn test_rectify(positions: &[usize]) {
        let data = [32, 91, 11, 45, 89, 123, 77, 44, 56, 99, 202];
        let mut blk = Block::new(&data, 21);
        let original = blk;
        for &p in positions {
            blk.data[p] ^= 0xA5;
        }
        let fixed = blk.rectify().unwrap();
        assert_eq!(fixed, positions.len());
        assert_eq!(blk.full(), original.full());
    }

    #[test]
    fn test_rectify_clean_block() {
        let data = [7, 0, 0, 1, 255, 14];
        let mut blk = Block::new(&data, 16);
        assert_eq!(blk.rectify(), Ok(0));
        assert_eq!(blk.data(), data);
    }

    #[test]
    fn test_rectify_ecc_damage() {
        let data = [32, 91, 11, 45, 89, 123, 77, 44, 56, 99, 202];
        let mut blk = Block::new(&data, 21);
        let original = blk;
        blk.data[12] ^= 0xFF;
        blk.data[20] ^= 0x0F;
        assert_eq!(blk.rectify(), Ok(2));
        assert_eq!(blk.full(), original.full());
    }

    #[test]
    fn test_rectify_too_many_errors() {
        let data = [32, 91, 11, 45, 89, 123, 77, 44, 56, 99, 202];
        let mut blk = Block::new(&data, 21);
        // Five errors against a capacity of five pass, six must not
        for p in [0, 2, 4, 6, 8, 10] {
            blk.data[p] ^= 0x55;
        }
        assert_eq!(blk.rectify(), Err(QRError::Uncorrectable));
    }

    #[test]
    fn test_rectify_at_capacity() {
        let data = [32, 91, 11, 45, 89, 123, 77, 44, 56, 99, 202];
        let mut blk = Block::new(&data, 21);
        let original = blk;
        for p in [0, 2, 4, 6, 8] {
            blk.data[p] ^= 0x55;
        }
        assert_eq!(blk.rectify(), Ok(5));
        assert_eq!(blk.full(), original.full());
    }
}

// Rectifier for format and version infos
//------------------------------------------------------------------------------

// Nearest valid codeword by Hamming distance, along with the distance
pub(crate) fn rectify_info(info: u32, valid: &[u32], err_capacity: u32) -> Option<(u32, u32)> {
    let res = *valid.iter().min_by_key(|&n| (info ^ n).count_ones())?;
    let dist = (info ^ res).count_ones();

    if dist <= err_capacity {
        Some((res, dist))
    } else {
        None
    }
}

#[cfg(test)]
mod rectify_info_tests {
    use super::rectify_info;
    use crate::common::metadata::{FORMAT_ERROR_CAPACITY, FORMAT_INFOS_QR};

    #[test]
    fn test_rectify_info_exact() {
        for &f in FORMAT_INFOS_QR.iter() {
            assert_eq!(rectify_info(f, &FORMAT_INFOS_QR, FORMAT_ERROR_CAPACITY), Some((f, 0)));
        }
    }

    #[test]
    fn test_rectify_info_within_capacity() {
        let f = FORMAT_INFOS_QR[9];
        let corrupted = f ^ 0b101_0000_0000_0001;
        assert_eq!(
            rectify_info(corrupted, &FORMAT_INFOS_QR, FORMAT_ERROR_CAPACITY),
            Some((f, 3))
        );
    }

    #[test]
    fn test_rectify_info_beyond_capacity() {
        // BCH(15, 5) has minimum distance 7; flipping 4 bits lands nowhere
        let f = FORMAT_INFOS_QR[9] ^ 0b101_0100_0000_0001;
        assert_eq!(rectify_info(f, &FORMAT_INFOS_QR, FORMAT_ERROR_CAPACITY), None);
    }
}
