use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::DeviceAuthError;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Verifies an Ed25519-signed (`alg: EdDSA`) JWT: signature, `sub` equals
/// `expected_node_id`, and `exp` is within `max_age_secs` of `now`.
/// `public_key` is the raw 32-byte Ed25519 public key.
pub fn verify_ed25519_jwt(
    token: &str,
    expected_node_id: &str,
    public_key: &[u8],
    max_age_secs: i64,
    now_unix: i64,
) -> Result<i64, DeviceAuthError> {
    let decoding_key = DecodingKey::from_ed_der(public_key);

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_required_spec_claims(&["sub", "exp"]);
    validation.validate_exp = false; // exp is checked explicitly below, against jwtMaxAge rather than "now < exp" alone.

    let data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|_| DeviceAuthError::SignatureInvalid)?;

    validate_claims(&data.claims, expected_node_id, max_age_secs, now_unix)
}

fn validate_claims(
    claims: &Claims,
    expected_node_id: &str,
    max_age_secs: i64,
    now_unix: i64,
) -> Result<i64, DeviceAuthError> {
    if claims.sub != expected_node_id {
        return Err(DeviceAuthError::SubjectMismatch);
    }

    // Expired outright, or asserting validity further into the future than
    // jwtMaxAge permits — either way it's outside the accepted window.
    if claims.exp <= now_unix || claims.exp - now_unix > max_age_secs {
        return Err(DeviceAuthError::JwtExpired);
    }

    Ok(claims.exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_subject_mismatch() {
        let claims = Claims {
            sub: "n1".into(),
            exp: 2000,
        };
        assert_eq!(
            validate_claims(&claims, "n2", 300, 1000),
            Err(DeviceAuthError::SubjectMismatch)
        );
    }

    #[test]
    fn rejects_already_expired() {
        let claims = Claims {
            sub: "n1".into(),
            exp: 900,
        };
        assert_eq!(
            validate_claims(&claims, "n1", 300, 1000),
            Err(DeviceAuthError::JwtExpired)
        );
    }

    #[test]
    fn rejects_age_beyond_max() {
        let claims = Claims {
            sub: "n1".into(),
            exp: 2000,
        };
        // exp is 1000s ahead of now, but max_age is only 300s.
        assert_eq!(
            validate_claims(&claims, "n1", 300, 1000),
            Err(DeviceAuthError::JwtExpired)
        );
    }

    #[test]
    fn accepts_within_window() {
        let claims = Claims {
            sub: "n1".into(),
            exp: 1200,
        };
        assert_eq!(validate_claims(&claims, "n1", 300, 1000), Ok(1200));
    }
}
