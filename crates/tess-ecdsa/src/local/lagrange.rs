//! Lagrange interpolation at zero over secp256k1 scalars.

use crate::error::ProtocolError;
use k256::elliptic_curve::Field;
use k256::Scalar;

/// Coefficients `λ_i = Π_{j ≠ i} x_j / (x_j − x_i)` for evaluating a shared
/// polynomial at zero from the points `(x_i, f(x_i))`.
///
/// Indices are the 1-based evaluation points and must be distinct and
/// nonzero.
pub(super) fn coefficients_at_zero(indices: &[u16]) -> Result<Vec<Scalar>, ProtocolError> {
    if indices.is_empty() {
        return Err(ProtocolError::key_material("no shares to interpolate"));
    }
    let points: Vec<Scalar> = indices.iter().map(|&i| Scalar::from(i as u64)).collect();
    let mut coefficients = Vec::with_capacity(points.len());
    for (i, x_i) in points.iter().enumerate() {
        if *x_i == Scalar::ZERO {
            return Err(ProtocolError::key_material("zero interpolation index"));
        }
        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;
        for (j, x_j) in points.iter().enumerate() {
            if i == j {
                continue;
            }
            numerator *= x_j;
            denominator *= x_j - x_i;
        }
        let inverse = Option::<Scalar>::from(denominator.invert()).ok_or_else(|| {
            ProtocolError::key_material("duplicate interpolation index")
        })?;
        coefficients.push(numerator * inverse);
    }
    Ok(coefficients)
}

/// Evaluate the shared polynomial at zero from `(index, share)` points.
pub(super) fn interpolate_at_zero(points: &[(u16, Scalar)]) -> Result<Scalar, ProtocolError> {
    let indices: Vec<u16> = points.iter().map(|(i, _)| *i).collect();
    let coefficients = coefficients_at_zero(&indices)?;
    Ok(points
        .iter()
        .zip(coefficients)
        .fold(Scalar::ZERO, |acc, ((_, share), coefficient)| {
            acc + *share * coefficient
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(coeffs: &[Scalar], x: u16) -> Scalar {
        let x = Scalar::from(x as u64);
        coeffs
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, c| acc * x + c)
    }

    #[test]
    fn coefficients_sum_to_one() {
        let coeffs = coefficients_at_zero(&[1, 3, 5]).expect("coefficients");
        let sum: Scalar = coeffs.into_iter().sum();
        assert_eq!(sum, Scalar::ONE);
    }

    #[test]
    fn recovers_constant_term_from_any_subset() {
        // f(x) = 7 + 2x + 9x^2
        let poly = [Scalar::from(7u64), Scalar::from(2u64), Scalar::from(9u64)];
        for subset in [[1u16, 2, 3], [2, 4, 5], [1, 3, 5]] {
            let points: Vec<(u16, Scalar)> =
                subset.iter().map(|&x| (x, eval(&poly, x))).collect();
            let secret = interpolate_at_zero(&points).expect("interpolation");
            assert_eq!(secret, Scalar::from(7u64));
        }
    }

    #[test]
    fn rejects_empty_and_duplicate_points() {
        assert!(coefficients_at_zero(&[]).is_err());
        assert!(coefficients_at_zero(&[1, 1]).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        proptest! {
            #[test]
            fn any_large_enough_subset_recovers_the_constant_term(
                constant in any::<u64>(),
                coeff_1 in any::<u64>(),
                coeff_2 in any::<u64>(),
                raw_indices in proptest::collection::btree_set(1u16..200, 3..8),
            ) {
                let poly = [
                    Scalar::from(constant),
                    Scalar::from(coeff_1),
                    Scalar::from(coeff_2),
                ];
                let indices: BTreeSet<u16> = raw_indices;
                let points: Vec<(u16, Scalar)> = indices
                    .into_iter()
                    .map(|x| (x, eval(&poly, x)))
                    .collect();
                let secret = interpolate_at_zero(&points).expect("interpolation");
                prop_assert_eq!(secret, Scalar::from(constant));
            }
        }
    }
}
