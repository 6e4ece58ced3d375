//! HMAC-SHA256 request signing for the evaluation engine.
//!
//! The vendor authenticates each request by an HMAC over a canonical string
//! made of the host, the date and the request line, plus a body digest when
//! a body is present:
//!
//! ```text
//! host: <host>
//! date: <date>
//! <METHOD> <path> HTTP/1.1
//! digest: SHA-256=<base64 sha256 of body>
//! ```
//!
//! The resulting authorization value is itself base64-encoded before it is
//! sent, either as a header (HTTP) or as a query parameter (WebSocket upgrade).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{ProxyError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "hmac-sha256";

/// Render a timestamp in the RFC 1123 form the vendor signs over.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `SHA-256=<base64>` digest header value for a request body.
pub fn body_digest(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64.encode(Sha256::digest(body)))
}

/// `host[:port]` as it appears in the `Host` header for `url`.
pub fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| ProxyError::Config(format!("vendor URL has no host: {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Everything produced by one signing pass. Built per outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub host: String,
    pub path: String,
    pub method: String,
    pub date: String,
    pub canonical: String,
    pub signature: String,
    /// Base64 of the full `api_key=..., signature=...` value.
    pub authorization: String,
    /// `SHA-256=...`, present only when the body was non-empty.
    pub digest: Option<String>,
}

impl SignedRequest {
    /// Append `authorization`, `date` and `host` to a WebSocket upgrade URL.
    pub fn apply_to_url(&self, url: &Url) -> Url {
        let mut signed = url.clone();
        signed
            .query_pairs_mut()
            .append_pair("authorization", &self.authorization)
            .append_pair("date", &self.date)
            .append_pair("host", &self.host);
        signed
    }
}

/// Signs requests with an API key / secret pair.
#[derive(Clone)]
pub struct HmacSigner {
    api_key: String,
    api_secret: String,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl HmacSigner {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Build the canonical string for the given request parts.
    ///
    /// Returns the string, the signed header names and the digest, if any.
    pub fn canonical_string(
        host: &str,
        path: &str,
        method: &str,
        date: &str,
        body: &[u8],
    ) -> (String, &'static str, Option<String>) {
        let mut canonical = format!(
            "host: {}\ndate: {}\n{} {} HTTP/1.1",
            host,
            date,
            method.to_ascii_uppercase(),
            path
        );
        if body.is_empty() {
            return (canonical, "host date request-line", None);
        }
        let digest = body_digest(body);
        canonical.push_str("\ndigest: ");
        canonical.push_str(&digest);
        (canonical, "host date request-line digest", Some(digest))
    }

    pub fn sign(
        &self,
        host: &str,
        path: &str,
        method: &str,
        date: &str,
        body: &[u8],
    ) -> Result<SignedRequest> {
        let (canonical, headers, digest) =
            Self::canonical_string(host, path, method, date, body);

        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ProxyError::Config(format!("invalid signing secret: {}", e)))?;
        mac.update(canonical.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        let origin = format!(
            "api_key=\"{}\", algorithm=\"{}\", headers=\"{}\", signature=\"{}\"",
            self.api_key, ALGORITHM, headers, signature
        );

        Ok(SignedRequest {
            host: host.to_string(),
            path: path.to_string(),
            method: method.to_ascii_uppercase(),
            date: date.to_string(),
            canonical,
            signature,
            authorization: BASE64.encode(origin),
            digest,
        })
    }

    /// Sign a WebSocket upgrade (GET, no body) and return the signed URL.
    pub fn sign_url(&self, url: &Url, date: &str) -> Result<Url> {
        let host = host_header(url)?;
        let signed = self.sign(&host, url.path(), "GET", date, &[])?;
        Ok(signed.apply_to_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DATE: &str = "Wed, 01 May 2024 08:00:00 GMT";

    fn signer() -> HmacSigner {
        HmacSigner::new("test-api-key", "test-api-secret")
    }

    #[test]
    fn http_date_is_rfc1123() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        assert_eq!(http_date(at), DATE);
    }

    #[test]
    fn golden_vector_without_body() {
        let signed = signer()
            .sign("ise-api.xfyun.cn", "/v2/open-ise", "GET", DATE, &[])
            .unwrap();
        assert_eq!(
            signed.canonical,
            "host: ise-api.xfyun.cn\ndate: Wed, 01 May 2024 08:00:00 GMT\nGET /v2/open-ise HTTP/1.1"
        );
        assert_eq!(
            signed.signature,
            "7ear16SJClLmLpcG8c26NIeFRfEobJYYcWdxy5nKnFI="
        );
        assert_eq!(
            signed.authorization,
            "YXBpX2tleT0idGVzdC1hcGkta2V5IiwgYWxnb3JpdGhtPSJobWFjLXNoYTI1NiIsIGhlYWRlcnM9Imhvc3QgZGF0ZSByZXF1ZXN0LWxpbmUiLCBzaWduYXR1cmU9IjdlYXIxNlNKQ2xMbUxwY0c4YzI2TkllRlJmRW9iSllZY1dkeHk1bktuRkk9Ig=="
        );
        assert!(signed.digest.is_none());
    }

    #[test]
    fn golden_vector_with_body() {
        let signed = signer()
            .sign(
                "api-dx.xf-yun.com",
                "/v1/private/tts",
                "POST",
                DATE,
                br#"{"text":"cat"}"#,
            )
            .unwrap();
        assert_eq!(
            signed.digest.as_deref(),
            Some("SHA-256=Sgj5QsMF1mQmuHKamyKAsNB9goiR8zBinsuB4jK+b/E=")
        );
        assert_eq!(
            signed.signature,
            "fjiI9Z+G+qrWpFLSZCPekh+VtL7haqBeTu7EsaJD+eI="
        );
        assert_eq!(
            signed.authorization,
            "YXBpX2tleT0idGVzdC1hcGkta2V5IiwgYWxnb3JpdGhtPSJobWFjLXNoYTI1NiIsIGhlYWRlcnM9Imhvc3QgZGF0ZSByZXF1ZXN0LWxpbmUgZGlnZXN0Iiwgc2lnbmF0dXJlPSJmamlJOVorRytxcldwRkxTWkNQZWtoK1Z0TDdoYXFCZVR1N0VzYUpEK2VJPSI="
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let a = signer().sign("h", "/p", "POST", DATE, b"body").unwrap();
        let b = signer().sign("h", "/p", "POST", DATE, b"body").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn date_changes_signature() {
        let a = signer().sign("h", "/p", "GET", DATE, &[]).unwrap();
        let b = signer()
            .sign("h", "/p", "GET", "Wed, 01 May 2024 08:00:01 GMT", &[])
            .unwrap();
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn digest_line_only_with_body() {
        let (without, headers, digest) =
            HmacSigner::canonical_string("h", "/p", "GET", DATE, &[]);
        assert!(!without.contains("digest:"));
        assert_eq!(headers, "host date request-line");
        assert!(digest.is_none());

        let (with, headers, digest) =
            HmacSigner::canonical_string("h", "/p", "POST", DATE, b"x");
        assert!(with.ends_with(&format!("digest: {}", digest.unwrap())));
        assert_eq!(headers, "host date request-line digest");
    }

    #[test]
    fn method_is_uppercased() {
        let signed = signer().sign("h", "/p", "post", DATE, &[]).unwrap();
        assert!(signed.canonical.contains("POST /p HTTP/1.1"));
        assert_eq!(signed.method, "POST");
    }

    #[test]
    fn authorization_decodes_to_header_fields() {
        let signed = signer().sign("h", "/p", "GET", DATE, &[]).unwrap();
        let decoded = String::from_utf8(BASE64.decode(&signed.authorization).unwrap()).unwrap();
        assert!(decoded.starts_with("api_key=\"test-api-key\""));
        assert!(decoded.contains("algorithm=\"hmac-sha256\""));
        assert!(decoded.contains(&format!("signature=\"{}\"", signed.signature)));
    }

    #[test]
    fn sign_url_appends_query() {
        let url = Url::parse("wss://ise-api.xfyun.cn/v2/open-ise").unwrap();
        let signed = signer().sign_url(&url, DATE).unwrap();
        let pairs: Vec<(String, String)> = signed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs[0].0, "authorization");
        assert_eq!(pairs[1], ("date".to_string(), DATE.to_string()));
        assert_eq!(
            pairs[2],
            ("host".to_string(), "ise-api.xfyun.cn".to_string())
        );
    }

    #[test]
    fn host_header_keeps_explicit_port() {
        let url = Url::parse("ws://127.0.0.1:9001/v2/open-ise").unwrap();
        assert_eq!(host_header(&url).unwrap(), "127.0.0.1:9001");
    }

    #[test]
    fn debug_redacts_secret() {
        let dbg = format!("{:?}", signer());
        assert!(!dbg.contains("test-api-secret"));
    }
}
