//! BN254 (alt_bn128) group operations backing the curve precompiles.
//!
//! Points are encoded as 32-byte big-endian field elements; the all-zero
//! encoding is the identity. Malformed points are errors, matching the
//! precompile contract.

use crate::CryptoError;
use ark_bn254::{Bn254, Fq, Fr, G1Affine, G2Affine};
use ark_ec::{AffineRepr as _, CurveGroup as _, pairing::Pairing as _};
use ark_ff::{BigInteger as _, One as _, PrimeField as _, QuadExtField, Zero as _};

/// The BN254 base field modulus, big-endian. Coordinates must be reduced.
const FIELD_MODULUS: [u8; 32] = [
    0x30, 0x64, 0x4e, 0x72, 0xe1, 0x31, 0xa0, 0x29, 0xb8, 0x50, 0x45, 0xb6, 0x81, 0x81, 0x58,
    0x5d, 0x97, 0x81, 0x6a, 0x91, 0x68, 0x71, 0xca, 0x8d, 0x3c, 0x20, 0x8c, 0x16, 0xd8, 0x7c,
    0xfd, 0x47,
];

fn parse_coordinate(bytes: &[u8]) -> Result<Fq, CryptoError> {
    if bytes.len() != 32 {
        return Err(CryptoError::InvalidInput("coordinate must be 32 bytes"));
    }
    if bytes >= FIELD_MODULUS.as_slice() {
        return Err(CryptoError::InvalidPoint("coordinate exceeds field modulus"));
    }
    Ok(Fq::from_be_bytes_mod_order(bytes))
}

fn parse_g1(bytes: &[u8]) -> Result<G1Affine, CryptoError> {
    if bytes.len() != 64 {
        return Err(CryptoError::InvalidInput("G1 point must be 64 bytes"));
    }
    let x = parse_coordinate(&bytes[..32])?;
    let y = parse_coordinate(&bytes[32..64])?;

    if x.is_zero() && y.is_zero() {
        return Ok(G1Affine::identity());
    }

    let point = G1Affine::new_unchecked(x, y);
    if !point.is_on_curve() {
        return Err(CryptoError::InvalidPoint("G1 point not on curve"));
    }
    Ok(point)
}

fn serialize_g1(point: &G1Affine) -> [u8; 64] {
    let mut out = [0u8; 64];
    if let Some((x, y)) = point.xy() {
        out[..32].copy_from_slice(&x.into_bigint().to_bytes_be());
        out[32..].copy_from_slice(&y.into_bigint().to_bytes_be());
    }
    out
}

/// Adds two G1 points encoded as x(32) || y(32).
pub fn g1_add(p1: &[u8], p2: &[u8]) -> Result<[u8; 64], CryptoError> {
    let pt1 = parse_g1(p1)?;
    let pt2 = parse_g1(p2)?;

    #[allow(clippy::arithmetic_side_effects)]
    let sum = (pt1 + pt2).into_affine();
    Ok(serialize_g1(&sum))
}

/// Multiplies a G1 point by a 32-byte big-endian scalar.
pub fn g1_mul(point: &[u8], scalar: &[u8]) -> Result<[u8; 64], CryptoError> {
    if scalar.len() != 32 {
        return Err(CryptoError::InvalidInput("scalar must be 32 bytes"));
    }
    let pt = parse_g1(point)?;
    let s = Fr::from_be_bytes_mod_order(scalar);

    if pt.is_zero() || s.is_zero() {
        return Ok([0u8; 64]);
    }

    #[allow(clippy::arithmetic_side_effects)]
    let product = (pt * s).into_affine();
    Ok(serialize_g1(&product))
}

/// Evaluates the pairing product over (G1, G2) pairs. G2 points are encoded
/// as x_im(32) || x_re(32) || y_im(32) || y_re(32).
pub fn pairing_check(pairs: &[(&[u8], &[u8])]) -> Result<bool, CryptoError> {
    let mut g1_points = Vec::with_capacity(pairs.len());
    let mut g2_points = Vec::with_capacity(pairs.len());

    for (g1_bytes, g2_bytes) in pairs {
        let g1 = parse_g1(g1_bytes)?;

        if g2_bytes.len() != 128 {
            return Err(CryptoError::InvalidInput("G2 point must be 128 bytes"));
        }
        let x_im = parse_coordinate(&g2_bytes[..32])?;
        let x_re = parse_coordinate(&g2_bytes[32..64])?;
        let y_im = parse_coordinate(&g2_bytes[64..96])?;
        let y_re = parse_coordinate(&g2_bytes[96..128])?;

        let g2 = if x_im.is_zero() && x_re.is_zero() && y_im.is_zero() && y_re.is_zero() {
            G2Affine::identity()
        } else {
            let point =
                G2Affine::new_unchecked(QuadExtField::new(x_re, x_im), QuadExtField::new(y_re, y_im));
            if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
                return Err(CryptoError::InvalidPoint("G2 point not on curve"));
            }
            point
        };

        g1_points.push(g1);
        g2_points.push(g2);
    }

    Ok(Bn254::multi_pairing(g1_points, g2_points).0 == QuadExtField::one())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_plus_identity_is_identity() {
        let zero = [0u8; 64];
        assert_eq!(g1_add(&zero, &zero), Ok([0u8; 64]));
    }

    #[test]
    fn off_curve_point_is_rejected() {
        let mut bad = [0u8; 64];
        bad[31] = 1;
        bad[63] = 9;
        assert!(matches!(g1_add(&bad, &[0u8; 64]), Err(CryptoError::InvalidPoint(_))));
    }

    #[test]
    fn generator_doubling_matches_addition() {
        // The BN254 G1 generator is (1, 2).
        let mut generator = [0u8; 64];
        generator[31] = 1;
        generator[63] = 2;

        let mut two = [0u8; 32];
        two[31] = 2;

        let doubled = g1_add(&generator, &generator).expect("add");
        let scaled = g1_mul(&generator, &two).expect("mul");
        assert_eq!(doubled, scaled);
    }

    #[test]
    fn empty_pairing_product_is_one() {
        assert_eq!(pairing_check(&[]), Ok(true));
    }

    #[test]
    fn pairing_with_identity_is_one() {
        assert_eq!(pairing_check(&[(&[0u8; 64], &[0u8; 128])]), Ok(true));
    }
}
