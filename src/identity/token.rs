//! Opaque bearer tokens.

use anyhow::{Result, anyhow, bail};
use base64::Engine;
use std::fmt;

/// Lower bound on token entropy; anything weaker is refused at construction.
pub const MIN_TOKEN_BITS: u32 = 130;

/// An issued bearer token, URL-safe base64 without padding.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }

    /// Reverse the text encoding back to the random bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(self.0.as_bytes())
            .map_err(|e| anyhow!("token is not url-safe base64: {}", e))
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self { Token(s) }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str { &self.0 }
}

// Never print the full secret in logs
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "Token({}…)", prefix)
    }
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self) -> Result<Token>;
}

/// Draws tokens from the OS CSPRNG. Safe to share between threads.
#[derive(Debug, Clone)]
pub struct RandomTokenIssuer {
    bits: u32,
}

impl Default for RandomTokenIssuer {
    fn default() -> Self { Self { bits: MIN_TOKEN_BITS } }
}

impl RandomTokenIssuer {
    pub fn new(bits: u32) -> Result<Self> {
        if bits < MIN_TOKEN_BITS {
            bail!("token entropy must be at least {} bits, got {}", MIN_TOKEN_BITS, bits);
        }
        if bits > 1024 {
            bail!("token entropy of {} bits is unreasonable", bits);
        }
        Ok(Self { bits })
    }

    pub fn bits(&self) -> u32 { self.bits }
}

impl TokenIssuer for RandomTokenIssuer {
    fn issue(&self) -> Result<Token> {
        let len = self.bits.div_ceil(8) as usize;
        let mut buf = vec![0u8; len];
        getrandom::getrandom(&mut buf).map_err(|e| anyhow!("random source unavailable: {}", e))?;
        // Clear the surplus high bits so the token carries exactly `bits` of entropy
        let surplus = (len as u32) * 8 - self.bits;
        if surplus > 0 {
            buf[0] &= 0xFFu8 >> surplus;
        }
        Ok(Token(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn weak_entropy_refused() {
        assert!(RandomTokenIssuer::new(128).is_err());
        assert!(RandomTokenIssuer::new(130).is_ok());
        assert!(RandomTokenIssuer::new(256).is_ok());
    }

    #[test]
    fn tokens_are_url_safe_and_reversible() {
        let issuer = RandomTokenIssuer::default();
        let t = issuer.issue().unwrap();
        assert!(t.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        let raw = t.decode().unwrap();
        // 130 bits -> 17 bytes with the top 6 bits cleared
        assert_eq!(raw.len(), 17);
        assert_eq!(raw[0] & 0b1111_1100, 0);
    }

    #[test]
    fn tokens_do_not_repeat() {
        let issuer = RandomTokenIssuer::default();
        let seen: HashSet<String> = (0..2000).map(|_| issuer.issue().unwrap().into_string()).collect();
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn debug_hides_the_secret() {
        let t = Token::from("abcdefghijklmnop".to_string());
        let shown = format!("{:?}", t);
        assert!(!shown.contains("efgh"));
    }
}
