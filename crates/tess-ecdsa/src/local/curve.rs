//! secp256k1 conversions between wire bytes and curve types.

use crate::error::ProtocolError;
use crate::keyshare::GroupPublicKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{ProjectivePoint, Scalar};

/// Decode a scalar from its big-endian byte form.
pub(super) fn scalar_from_bytes(bytes: &[u8; 32]) -> Result<Scalar, ProtocolError> {
    Option::<Scalar>::from(Scalar::from_repr((*bytes).into()))
        .ok_or_else(|| ProtocolError::key_material("scalar out of field range"))
}

/// Encode a scalar to its big-endian byte form.
pub(super) fn scalar_to_bytes(scalar: &Scalar) -> [u8; 32] {
    scalar.to_bytes().into()
}

/// Project a point to the uncompressed coordinates published on-chain.
pub(super) fn point_to_public_key(
    point: &ProjectivePoint,
) -> Result<GroupPublicKey, ProtocolError> {
    let encoded = point.to_affine().to_encoded_point(false);
    let x = encoded
        .x()
        .ok_or_else(|| ProtocolError::key_material("group key is the identity point"))?;
    let y = encoded
        .y()
        .ok_or_else(|| ProtocolError::key_material("group key is the identity point"))?;
    let mut key = GroupPublicKey {
        x: [0u8; 32],
        y: [0u8; 32],
    };
    key.x.copy_from_slice(x);
    key.y.copy_from_slice(y);
    Ok(key)
}
