//! SASL mechanisms for SMTP AUTH.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};

use super::error::{ClientError, Result};

type HmacMd5 = Hmac<md5::Md5>;

/// Username and password for a relay.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// The mechanisms the client knows how to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    CramMd5,
    Plain,
}

impl Mechanism {
    /// CRAM-MD5 when the server offers it, PLAIN otherwise.
    pub fn select<'a>(mut advertised: impl Iterator<Item = &'a str>) -> Self {
        if advertised.any(|mechanism| mechanism.eq_ignore_ascii_case("CRAM-MD5")) {
            Self::CramMd5
        } else {
            Self::Plain
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CramMd5 => "CRAM-MD5",
            Self::Plain => "PLAIN",
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The initial response for `AUTH PLAIN` (RFC 4616), base64 encoded.
#[must_use]
pub fn plain_response(credentials: &Credentials) -> String {
    STANDARD.encode(format!(
        "\0{}\0{}",
        credentials.username, credentials.password
    ))
}

/// Answer a base64 CRAM-MD5 challenge (RFC 2195).
///
/// # Errors
///
/// Returns `ClientError::AuthError` if the challenge is not valid base64.
pub fn cram_md5_response(credentials: &Credentials, challenge: &str) -> Result<String> {
    let challenge = STANDARD
        .decode(challenge.trim())
        .map_err(|e| ClientError::AuthError(format!("Invalid CRAM-MD5 challenge: {e}")))?;

    let mut mac = HmacMd5::new_from_slice(credentials.password.as_bytes())
        .map_err(|e| ClientError::AuthError(e.to_string()))?;
    mac.update(&challenge);
    let digest = hex::encode(mac.finalize().into_bytes());

    Ok(STANDARD.encode(format!("{} {digest}", credentials.username)))
}
