//! Device authentication for `node.register`: legacy bearer tokens,
//! Ed25519-signed JWTs with Trust-On-First-Use key pinning, and a circuit
//! breaker in front of the policy-check path. Every rejection collapses to
//! one generic detail string before it reaches the wire.

mod circuit;
mod compare;
mod device_keys;
mod error;
mod jwt;

pub use circuit::AuthCircuitBreaker;
pub use compare::{secure_eq, secure_eq_bytes};
pub use device_keys::DeviceKeyRegistry;
pub use error::{DeviceAuthError, GENERIC_REJECTION_DETAIL};

use ag_domain::config::AuthMode;

/// Result of authenticating a `node.register` attempt.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub valid: bool,
    pub node_id: Option<String>,
    pub exp: Option<i64>,
    pub error: Option<DeviceAuthError>,
}

impl VerifyOutcome {
    fn ok(node_id: impl Into<String>, exp: Option<i64>) -> Self {
        Self {
            valid: true,
            node_id: Some(node_id.into()),
            exp,
            error: None,
        }
    }

    fn reject(error: DeviceAuthError) -> Self {
        Self {
            valid: false,
            node_id: None,
            exp: None,
            error: Some(error),
        }
    }
}

/// What a registering node presented.
#[derive(Clone, Copy)]
pub struct RegisterCredential<'a> {
    pub node_id: &'a str,
    pub token: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub public_key_b64: Option<&'a str>,
}

pub struct DeviceAuth {
    mode: AuthMode,
    expected_token: Option<String>,
    device_keys: DeviceKeyRegistry,
    circuit: AuthCircuitBreaker,
    jwt_max_age_secs: i64,
}

impl DeviceAuth {
    pub fn new(
        mode: AuthMode,
        expected_token: Option<String>,
        device_keys: DeviceKeyRegistry,
        circuit: AuthCircuitBreaker,
        jwt_max_age_secs: i64,
    ) -> Self {
        Self {
            mode,
            expected_token,
            device_keys,
            circuit,
            jwt_max_age_secs,
        }
    }

    pub fn device_keys(&self) -> &DeviceKeyRegistry {
        &self.device_keys
    }

    /// Verifies a `node.register` credential against the configured auth
    /// mode. `now_unix` is the caller-supplied wall clock (seconds since
    /// epoch) so this stays a pure function in tests.
    pub fn verify(&self, cred: RegisterCredential<'_>, now_unix: i64) -> VerifyOutcome {
        if self.circuit.is_open(cred.node_id) {
            return VerifyOutcome::reject(DeviceAuthError::CircuitOpen);
        }

        let result = self.verify_inner(cred.node_id, cred, now_unix);

        match &result {
            Ok(_) => self.circuit.record_success(cred.node_id),
            Err(_) => self.circuit.record_failure(cred.node_id),
        }

        match result {
            Ok(exp) => VerifyOutcome::ok(cred.node_id, exp),
            Err(e) => VerifyOutcome::reject(e),
        }
    }

    fn verify_inner(
        &self,
        node_id: &str,
        cred: RegisterCredential<'_>,
        now_unix: i64,
    ) -> Result<Option<i64>, DeviceAuthError> {
        let token_ok = matches!(self.mode, AuthMode::Legacy | AuthMode::Dual);
        let sig_ok = matches!(self.mode, AuthMode::Ed25519 | AuthMode::Dual);

        let mut exp = None;
        let mut authenticated = false;

        if sig_ok {
            if let (Some(signature), Some(public_key_b64)) = (cred.signature, cred.public_key_b64) {
                let public_key = decode_public_key(public_key_b64)?;
                self.device_keys.check_or_pin(node_id, &public_key)?;
                exp = Some(jwt::verify_ed25519_jwt(
                    signature,
                    node_id,
                    &public_key,
                    self.jwt_max_age_secs,
                    now_unix,
                )?);
                authenticated = true;
            }
        }

        if !authenticated && token_ok {
            if let (Some(presented), Some(expected)) = (cred.token, self.expected_token.as_deref())
            {
                if secure_eq(presented, expected) {
                    authenticated = true;
                } else {
                    return Err(DeviceAuthError::TokenMismatch);
                }
            }
        }

        if authenticated {
            Ok(exp)
        } else {
            Err(DeviceAuthError::NoCredential)
        }
    }
}

fn decode_public_key(b64: &str) -> Result<Vec<u8>, DeviceAuthError> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(b64)
        .map_err(|_| DeviceAuthError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(mode: AuthMode, token: Option<&str>) -> DeviceAuth {
        DeviceAuth::new(
            mode,
            token.map(String::from),
            DeviceKeyRegistry::new(true, 10),
            AuthCircuitBreaker::new(std::time::Duration::from_secs(30), 5),
            300,
        )
    }

    #[test]
    fn legacy_mode_accepts_matching_token() {
        let a = auth(AuthMode::Legacy, Some("secret"));
        let outcome = a.verify(
            RegisterCredential {
                node_id: "n1",
                token: Some("secret"),
                signature: None,
                public_key_b64: None,
            },
            1000,
        );
        assert!(outcome.valid);
    }

    #[test]
    fn legacy_mode_rejects_mismatched_token() {
        let a = auth(AuthMode::Legacy, Some("secret"));
        let outcome = a.verify(
            RegisterCredential {
                node_id: "n1",
                token: Some("wrong"),
                signature: None,
                public_key_b64: None,
            },
            1000,
        );
        assert!(!outcome.valid);
        assert_eq!(outcome.error, Some(DeviceAuthError::TokenMismatch));
    }

    #[test]
    fn legacy_mode_rejects_no_credential() {
        let a = auth(AuthMode::Legacy, Some("secret"));
        let outcome = a.verify(
            RegisterCredential {
                node_id: "n1",
                token: None,
                signature: None,
                public_key_b64: None,
            },
            1000,
        );
        assert!(!outcome.valid);
        assert_eq!(outcome.error, Some(DeviceAuthError::NoCredential));
    }

    #[test]
    fn ed25519_mode_ignores_presented_token() {
        let a = auth(AuthMode::Ed25519, Some("secret"));
        let outcome = a.verify(
            RegisterCredential {
                node_id: "n1",
                token: Some("secret"),
                signature: None,
                public_key_b64: None,
            },
            1000,
        );
        assert!(!outcome.valid);
        assert_eq!(outcome.error, Some(DeviceAuthError::NoCredential));
    }

    #[test]
    fn repeated_failures_open_circuit() {
        let a = DeviceAuth::new(
            AuthMode::Legacy,
            Some("secret".into()),
            DeviceKeyRegistry::new(true, 10),
            AuthCircuitBreaker::new(std::time::Duration::from_secs(30), 2),
            300,
        );
        for _ in 0..2 {
            a.verify(
                RegisterCredential {
                    node_id: "n1",
                    token: Some("wrong"),
                    signature: None,
                    public_key_b64: None,
                },
                1000,
            );
        }
        let outcome = a.verify(
            RegisterCredential {
                node_id: "n1",
                token: Some("secret"),
                signature: None,
                public_key_b64: None,
            },
            1000,
        );
        assert!(!outcome.valid);
        assert_eq!(outcome.error, Some(DeviceAuthError::CircuitOpen));
    }
}
