use std::ops::{Index, IndexMut};

use super::geometry::Point;
use crate::common::error::{QRError, QRResult};

// Homographic projection mapping symbol module coordinates onto image pixels
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Clone)]
pub struct Homography(pub [f64; 8]);

impl Index<usize> for Homography {
    type Output = f64;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IndexMut<usize> for Homography {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl Homography {
    /// Computes the projection from 4 point pairs source[i] -> destination[i],
    /// with the bottom-right matrix entry pinned to 1
    pub fn compute(src: [(f64, f64); 4], dst: [(f64, f64); 4]) -> QRResult<Self> {
        // u (h6 x + h7 y + 1) = h0 x + h1 y + h2 and likewise for v give two
        // constraint rows per pair; the right-hand side rides along as the
        // ninth column
        let mut m = [[0.0_f64; 9]; 8];
        for (i, (&(x, y), &(u, v))) in src.iter().zip(dst.iter()).enumerate() {
            m[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, u];
            m[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, v];
        }

        // Gauss-Jordan reduction with column-max pivoting; once the left
        // block is the identity, the augmented column is the solution
        for col in 0..8 {
            let pivot = (col..8)
                .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
                .expect("Non-empty pivot range");
            if m[pivot][col].abs() < f64::EPSILON {
                return Err(QRError::SamplingFailed);
            }
            m.swap(col, pivot);

            let scale = m[col][col];
            for entry in m[col].iter_mut() {
                *entry /= scale;
            }

            for row in 0..8 {
                let factor = m[row][col];
                if row == col || factor == 0.0 {
                    continue;
                }
                for k in col..9 {
                    m[row][k] -= factor * m[col][k];
                }
            }
        }

        let mut h = [0.0; 8];
        for (hi, row) in h.iter_mut().zip(m.iter()) {
            *hi = row[8];
        }
        Ok(Self(h))
    }

    /// Maps module coordinates (x, y) to the nearest image pixel
    pub fn map(&self, x: f64, y: f64) -> QRResult<Point> {
        let xp = self[0] * x + self[1] * y + self[2];
        let yp = self[3] * x + self[4] * y + self[5];
        let w = self[6] * x + self[7] * y + 1.0;

        if w.abs() <= f64::EPSILON {
            return Err(QRError::SamplingFailed);
        }

        let x = (xp / w).round() as i32;
        let y = (yp / w).round() as i32;

        Ok(Point { x, y })
    }
}

#[cfg(test)]
mod homography_tests {
    use super::{Homography, Point};

    #[test]
    fn test_identity_scale() {
        let src = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        let dst = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)];
        let h = Homography::compute(src, dst).unwrap();
        assert_eq!(h.map(5.0, 5.0).unwrap(), Point { x: 50, y: 50 });
        assert_eq!(h.map(2.5, 7.5).unwrap(), Point { x: 25, y: 75 });
    }

    #[test]
    fn test_projection() {
        let src = [(3.5, 3.5), (21.5, 3.5), (18.5, 18.5), (3.5, 21.5)];
        let dst = [(75.0, 75.0), (255.0, 75.0), (225.0, 225.0), (75.0, 255.0)];
        let h = Homography::compute(src, dst).unwrap();
        let pts = [(7.0, 7.0), (25.0, 0.0), (25.0, 25.0), (0.0, 25.0)];
        let expected = [(110, 110), (290, 40), (290, 290), (40, 290)];
        for (pt, exp) in pts.iter().zip(expected.iter()) {
            let proj = h.map(pt.0, pt.1).unwrap();
            assert_eq!(proj, Point { x: exp.0, y: exp.1 });
        }
    }

    #[test]
    fn test_anchors_map_back() {
        let src = [(3.5, 3.5), (29.5, 3.5), (26.5, 26.5), (3.5, 29.5)];
        let dst = [(61.0, 58.0), (240.0, 70.0), (214.0, 220.0), (70.0, 242.0)];
        let h = Homography::compute(src, dst).unwrap();
        for (s, d) in src.iter().zip(dst.iter()) {
            let p = h.map(s.0, s.1).unwrap();
            assert_eq!(p, Point { x: d.0 as i32, y: d.1 as i32 });
        }
    }

    #[test]
    fn test_degenerate_points() {
        // All four sources collinear: no unique solution
        let src = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
        let dst = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        assert!(Homography::compute(src, dst).is_err());
    }
}
