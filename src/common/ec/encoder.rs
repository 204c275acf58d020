use super::galois::G;

// Parity generation
//------------------------------------------------------------------------------

// g(x) = prod_{i=0}^{ec_len-1} (x - alpha^i), coefficients highest degree
// first, monic
pub(crate) fn generator_poly(ec_len: usize) -> Vec<G> {
    let mut gen = vec![G(1)];
    for i in 0..ec_len {
        let root = G::gen_pow(i);
        let mut next = vec![G(0); gen.len() + 1];
        for (j, &g) in gen.iter().enumerate() {
            next[j] += g;
            next[j + 1] += g * root;
        }
        gen = next;
    }
    gen
}

// Remainder of data(x) * x^ec_len divided by the generator polynomial. The
// remainder coefficients are the parity codewords in wire order.
pub(crate) fn ecc(data: &[u8], ec_len: usize) -> Vec<u8> {
    let gen = generator_poly(ec_len);

    let mut res: Vec<G> = data.iter().map(|&b| G(b)).collect();
    res.resize(data.len() + ec_len, G(0));

    for i in 0..data.len() {
        let lead = res[i];
        if lead == G(0) {
            continue;
        }
        for (r, &g) in res[i + 1..].iter_mut().zip(gen[1..].iter()) {
            *r += lead * g;
        }
    }

    res[data.len()..].iter().map(|&g| g.into()).collect()
}

#[cfg(test)]
mod ecc_tests {
    use super::*;

    #[test]
    fn test_generator_poly_2() {
        // x^2 + a^25 x + a^1
        assert_eq!(generator_poly(2), vec![G(1), G(3), G(2)]);
    }

    #[test]
    fn test_generator_poly_monic() {
        for n in 1..=30 {
            let gen = generator_poly(n);
            assert_eq!(gen.len(), n + 1);
            assert_eq!(gen[0], G(1));
        }
    }

    #[test]
    fn test_generator_poly_roots() {
        let gen = generator_poly(10);
        for i in 0..10 {
            let x = G::gen_pow(i);
            let mut acc = G(0);
            for &c in gen.iter() {
                acc = acc * x + c;
            }
            assert_eq!(acc, G(0), "alpha^{i} is not a root");
        }
    }

    #[test]
    fn test_ecc_simple() {
        let res = ecc(b" [\x0bx\xd1r\xdcMC@\xec\x11\xec\x11\xec\x11", 10);
        assert_eq!(&*res, b"\xc4#'w\xeb\xd7\xe7\xe2]\x17");
    }

    #[test]
    fn test_ecc_13() {
        let res = ecc(b" [\x0bx\xd1r\xdcMC@\xec\x11\xec", 13);
        assert_eq!(&*res, b"\xa8H\x16R\xd96\x9c\x00.\x0f\xb4z\x10");
    }

    #[test]
    fn test_ecc_18() {
        let res = ecc(b"CUF\x86W&U\xc2w2\x06\x12\x06g&", 18);
        assert_eq!(&*res, b"\xd5\xc7\x0b-s\xf7\xf1\xdf\xe5\xf8\x9au\x9aoV\xa1o'");
    }
}
