//! Webhook signature verification.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a hex-encoded HMAC-SHA256 signature over the raw request body.
/// Malformed hex or a length mismatch is simply a failed verification, never
/// an error. The comparison is constant-time (`Mac::verify_slice`).
#[must_use]
pub fn verify_signature(secret: &SecretString, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let secret = SecretString::from("whsec_test".to_string());
        let body = br#"{"id":"evt_1","type":"invoice.paid"}"#;
        let signature = sign("whsec_test", body);

        assert!(verify_signature(&secret, body, &signature));
        // Leading/trailing whitespace from header parsing is tolerated.
        assert!(verify_signature(&secret, body, &format!(" {signature}\n")));
    }

    #[test]
    fn rejects_wrong_secret_or_tampered_body() {
        let secret = SecretString::from("whsec_test".to_string());
        let body = br#"{"id":"evt_1","type":"invoice.paid"}"#;

        let signature = sign("whsec_other", body);
        assert!(!verify_signature(&secret, body, &signature));

        let signature = sign("whsec_test", br#"{"id":"evt_2"}"#);
        assert!(!verify_signature(&secret, body, &signature));
    }

    #[test]
    fn rejects_malformed_hex() {
        let secret = SecretString::from("whsec_test".to_string());
        assert!(!verify_signature(&secret, b"{}", "not-hex"));
        assert!(!verify_signature(&secret, b"{}", ""));
        assert!(!verify_signature(&secret, b"{}", "deadbeef"));
    }
}
