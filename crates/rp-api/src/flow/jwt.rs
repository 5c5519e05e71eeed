use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// `client_assertion_type` for `client_secret_jwt` client authentication.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of a client assertion.
pub const CLIENT_ASSERTION_TTL_MINUTES: i64 = 10;

/// HMAC algorithms accepted on ID tokens.
const ID_TOKEN_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Token signing and verification failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    /// Not a decodable JWT, or a required claim is missing or mistyped.
    #[error("is malformed: {0}")]
    Malformed(String),
    /// Signature does not match the shared secret.
    #[error("signature does not verify")]
    SignatureMismatch,
    /// Well formed but expired, or for another audience or issuer.
    #[error("claims rejected: {0}")]
    ClaimsRejected(String),
    /// Encoding a token failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::SignatureMismatch,
            ErrorKind::ExpiredSignature
            | ErrorKind::ImmatureSignature
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject => Self::ClaimsRejected(err.to_string()),
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Claims of the assertion the RP presents to the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    /// Client ID.
    pub iss: String,
    /// Client ID.
    pub sub: String,
    /// Token endpoint URL.
    pub aud: String,
    /// Random UUID, unique per assertion.
    pub jti: String,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

impl ClientAssertionClaims {
    /// Claims identifying `client_id` to `token_endpoint`, valid for ten minutes.
    pub fn new(client_id: &str, token_endpoint: &str) -> Self {
        let now = Utc::now();

        Self {
            iss: client_id.to_string(),
            sub: client_id.to_string(),
            aud: token_endpoint.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::minutes(CLIENT_ASSERTION_TTL_MINUTES)).timestamp(),
        }
    }
}

/// `aud` may be a single string or an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience string.
    Single(String),
    /// An array of audiences.
    Multiple(Vec<String>),
}

/// Required ID token claims; anything else the OP sends is kept in `additional`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer.
    pub iss: String,
    /// Subject identifier at the OP.
    pub sub: String,
    /// Must contain the effective client ID.
    pub aud: Audience,
    /// Token identifier.
    pub jti: String,
    /// Issued at.
    pub iat: i64,
    /// Expiry.
    pub exp: i64,
    /// Must equal the nonce sealed at login.
    pub nonce: String,
    /// Any other claims.
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

/// A signature-checked ID token.
#[derive(Clone, Debug, Serialize)]
pub struct VerifiedIdToken {
    /// Decoded JOSE header.
    pub header: Header,
    /// Decoded claims.
    pub claims: IdTokenClaims,
}

/// What an ID token must assert beyond a valid signature.
#[derive(Clone, Copy, Debug)]
pub struct IdTokenExpectations<'a> {
    /// Effective client ID; must appear in `aud`.
    pub audience: &'a str,
    /// Required `iss`, when configured.
    pub issuer: Option<&'a str>,
}

/// Sign `claims` with HS256 under a shared secret.
pub fn sign<C: Serialize>(claims: &C, secret: &[u8]) -> Result<String, JwtError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtError::Signing(e.to_string()))
}

/// Verify an HMAC-signed ID token and decode its header and claims.
///
/// `nonce` is only decoded here; comparing it with the flow's nonce is up
/// to the caller.
pub fn verify_id_token(
    token: &str,
    secret: &[u8],
    expect: &IdTokenExpectations<'_>,
) -> Result<VerifiedIdToken, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = ID_TOKEN_ALGORITHMS.to_vec();
    validation.set_audience(&[expect.audience]);
    if let Some(issuer) = expect.issuer {
        validation.set_issuer(&[issuer]);
    }
    validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);

    let data = jsonwebtoken::decode::<IdTokenClaims>(
        token,
        &DecodingKey::from_secret(secret),
        &validation,
    )?;

    Ok(VerifiedIdToken {
        header: data.header,
        claims: data.claims,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &[u8] = b"shared_client_secret";

    fn id_token_claims() -> serde_json::Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": "https://op.example.com",
            "sub": "subject-1",
            "aud": "client-1",
            "jti": "jti-1",
            "iat": now,
            "exp": now + 600,
            "nonce": "nonce-1",
            "email": "user@example.com",
        })
    }

    fn expectations() -> IdTokenExpectations<'static> {
        IdTokenExpectations {
            audience: "client-1",
            issuer: None,
        }
    }

    #[test]
    fn test_client_assertion_claims() {
        let claims = ClientAssertionClaims::new("client-1", "https://op.example.com/openId/token");

        assert_eq!(claims.iss, "client-1");
        assert_eq!(claims.sub, "client-1");
        assert_eq!(claims.aud, "https://op.example.com/openId/token");
        assert_eq!(claims.exp - claims.iat, 600);
        assert!(Uuid::parse_str(&claims.jti).is_ok());
    }

    #[test]
    fn test_client_assertion_jti_is_unique() {
        let first = ClientAssertionClaims::new("client-1", "https://op.example.com/token");
        let second = ClientAssertionClaims::new("client-1", "https://op.example.com/token");

        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn test_sign_produces_hs256_token() {
        let claims = ClientAssertionClaims::new("client-1", "https://op.example.com/token");
        let token = sign(&claims, SECRET).expect("Failed to sign");

        let header = jsonwebtoken::decode_header(&token).expect("Failed to decode header");
        assert_eq!(header.alg, Algorithm::HS256);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["https://op.example.com/token"]);
        let decoded = jsonwebtoken::decode::<ClientAssertionClaims>(
            &token,
            &DecodingKey::from_secret(SECRET),
            &validation,
        )
        .expect("Failed to decode assertion");
        assert_eq!(decoded.claims, claims);
    }

    #[test]
    fn test_verify_id_token() {
        let token = sign(&id_token_claims(), SECRET).expect("Failed to sign");

        let verified = verify_id_token(&token, SECRET, &expectations()).expect("Should verify");

        assert_eq!(verified.header.alg, Algorithm::HS256);
        assert_eq!(verified.claims.sub, "subject-1");
        assert_eq!(verified.claims.nonce, "nonce-1");
        assert_eq!(verified.claims.aud, Audience::Single("client-1".to_string()));
        assert_eq!(verified.claims.additional["email"], "user@example.com");
    }

    #[test]
    fn test_verify_accepts_audience_array() {
        let mut claims = id_token_claims();
        claims["aud"] = json!(["other-client", "client-1"]);
        let token = sign(&claims, SECRET).expect("Failed to sign");

        let verified = verify_id_token(&token, SECRET, &expectations()).expect("Should verify");

        assert_eq!(
            verified.claims.aud,
            Audience::Multiple(vec!["other-client".to_string(), "client-1".to_string()])
        );
    }

    #[test]
    fn test_verify_with_wrong_secret() {
        let token = sign(&id_token_claims(), SECRET).expect("Failed to sign");

        let result = verify_id_token(&token, b"another_secret", &expectations());

        assert_eq!(result.unwrap_err(), JwtError::SignatureMismatch);
    }

    #[test]
    fn test_verify_malformed_token() {
        for token in ["", "invalid.jwt.token", "not-a-jwt"] {
            let result = verify_id_token(token, SECRET, &expectations());
            assert!(
                matches!(result, Err(JwtError::Malformed(_))),
                "{token:?} should be malformed, got {result:?}"
            );
        }
    }

    #[test]
    fn test_verify_missing_nonce_is_malformed() {
        let mut claims = id_token_claims();
        claims.as_object_mut().unwrap().remove("nonce");
        let token = sign(&claims, SECRET).expect("Failed to sign");

        let result = verify_id_token(&token, SECRET, &expectations());

        assert!(matches!(result, Err(JwtError::Malformed(_))));
    }

    #[test]
    fn test_verify_wrongly_typed_claim_is_malformed() {
        let mut claims = id_token_claims();
        claims["iat"] = json!("yesterday");
        let token = sign(&claims, SECRET).expect("Failed to sign");

        let result = verify_id_token(&token, SECRET, &expectations());

        assert!(matches!(result, Err(JwtError::Malformed(_))));
    }

    #[test]
    fn test_verify_rejects_other_audience() {
        let mut claims = id_token_claims();
        claims["aud"] = json!("someone-else");
        let token = sign(&claims, SECRET).expect("Failed to sign");

        let result = verify_id_token(&token, SECRET, &expectations());

        assert!(matches!(result, Err(JwtError::ClaimsRejected(_))));
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let mut claims = id_token_claims();
        let now = Utc::now().timestamp();
        claims["iat"] = json!(now - 7200);
        claims["exp"] = json!(now - 3600);
        let token = sign(&claims, SECRET).expect("Failed to sign");

        let result = verify_id_token(&token, SECRET, &expectations());

        assert!(matches!(result, Err(JwtError::ClaimsRejected(_))));
    }

    #[test]
    fn test_verify_checks_issuer_when_configured() {
        let token = sign(&id_token_claims(), SECRET).expect("Failed to sign");

        let matching = IdTokenExpectations {
            issuer: Some("https://op.example.com"),
            ..expectations()
        };
        assert!(verify_id_token(&token, SECRET, &matching).is_ok());

        let other = IdTokenExpectations {
            issuer: Some("https://evil.example.com"),
            ..expectations()
        };
        assert!(matches!(
            verify_id_token(&token, SECRET, &other),
            Err(JwtError::ClaimsRejected(_))
        ));
    }

    #[test]
    fn test_verified_token_serializes_header_and_claims() {
        let token = sign(&id_token_claims(), SECRET).expect("Failed to sign");
        let verified = verify_id_token(&token, SECRET, &expectations()).expect("Should verify");

        let json = serde_json::to_value(&verified).expect("Failed to serialize");

        assert_eq!(json["header"]["alg"], "HS256");
        assert_eq!(json["claims"]["nonce"], "nonce-1");
        assert_eq!(json["claims"]["email"], "user@example.com");
        assert!(json["claims"].get("additional").is_none());
    }
}
