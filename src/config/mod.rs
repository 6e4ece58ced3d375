//! Proxy configuration.
//!
//! Non-secret settings come from a TOML file (all keys optional). Vendor
//! secrets are only ever read from the process environment, see
//! [`Credentials`].

pub mod schema;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use schema::deserialize_duration;

pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const BAIDU_CLIENT_ID: &str = "BAIDU_CLIENT_ID";
pub const BAIDU_CLIENT_SECRET: &str = "BAIDU_CLIENT_SECRET";
pub const XUNFEI_APP_ID: &str = "XUNFEI_APP_ID";
pub const XUNFEI_API_KEY: &str = "XUNFEI_API_KEY";
pub const XUNFEI_API_SECRET: &str = "XUNFEI_API_SECRET";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub vendor: VendorConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Default location: `<config dir>/pronounce-proxy/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pronounce-proxy")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from [`Config::default_path`] when it exists.
    /// A missing default file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Value of `Access-Control-Allow-Origin`.
    pub allowed_origin: String,
    /// Upper bound on request bodies (base64 audio is large).
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
            allowed_origin: "*".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Which vendor backs the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum VendorKind {
    #[serde(rename = "gemini", alias = "generative-multimodal")]
    GenerativeMultimodal,
    #[serde(rename = "baidu", alias = "national-cloud-asr")]
    NationalCloudAsr,
    #[default]
    #[serde(rename = "xunfei", alias = "dedicated-evaluation-engine")]
    DedicatedEvaluationEngine,
}

impl VendorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerativeMultimodal => "gemini",
            Self::NationalCloudAsr => "baidu",
            Self::DedicatedEvaluationEngine => "xunfei",
        }
    }
}

impl FromStr for VendorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gemini" | "generative-multimodal" => Ok(Self::GenerativeMultimodal),
            "baidu" | "national-cloud-asr" => Ok(Self::NationalCloudAsr),
            "xunfei" | "dedicated-evaluation-engine" => Ok(Self::DedicatedEvaluationEngine),
            other => Err(format!(
                "unknown vendor: {other:?} (expected \"gemini\", \"baidu\" or \"xunfei\")"
            )),
        }
    }
}

impl std::fmt::Display for VendorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    pub kind: VendorKind,
    /// Budget for one vendor round trip or evaluation session.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Tokens are refreshed this long before they expire.
    #[serde(deserialize_with = "deserialize_duration")]
    pub token_safety_margin: Duration,
    pub gemini: GeminiConfig,
    pub baidu: BaiduConfig,
    pub xunfei: XunfeiConfig,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            kind: VendorKind::default(),
            timeout: Duration::from_secs(15),
            token_safety_margin: Duration::from_secs(60),
            gemini: GeminiConfig::default(),
            baidu: BaiduConfig::default(),
            xunfei: XunfeiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BaiduConfig {
    pub oauth_url: String,
    pub tts_url: String,
    pub asr_url: String,
    /// Client identifier sent as `cuid`.
    pub cuid: String,
    pub language: String,
    /// Voice id (`per`).
    pub person: u32,
    pub speed: u32,
    pub pitch: u32,
    pub volume: u32,
    /// Recognition model id (`dev_pid`); 1737 is English.
    pub dev_pid: u32,
    /// Announced for PCM clips; WAV clips report their own header rate.
    pub sample_rate: u32,
}

impl Default for BaiduConfig {
    fn default() -> Self {
        Self {
            oauth_url: "https://aip.baidubce.com/oauth/2.0/token".to_string(),
            tts_url: "https://tsn.baidu.com/text2audio".to_string(),
            asr_url: "https://vop.baidu.com/server_api".to_string(),
            cuid: "pronounce-proxy".to_string(),
            language: "zh".to_string(),
            person: 0,
            speed: 5,
            pitch: 5,
            volume: 5,
            dev_pid: 1737,
            sample_rate: 16000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct XunfeiConfig {
    /// WebSocket endpoint of the evaluation engine.
    pub ise_url: String,
    /// Signed HTTP endpoint for speech synthesis.
    pub tts_url: String,
    /// Evaluation language engine (`ent`).
    pub engine: String,
    /// Practice granularity, e.g. `read_word`, `read_sentence`.
    pub category: String,
    pub voice: String,
    /// Rate announced for mp3 and PCM clips and requested for synthesis.
    pub sample_rate: u32,
}

impl Default for XunfeiConfig {
    fn default() -> Self {
        Self {
            ise_url: "wss://ise-api.xfyun.cn/v2/open-ise".to_string(),
            tts_url: "https://api-dx.xf-yun.com/v1/private/tts".to_string(),
            engine: "en_vip".to_string(),
            category: "read_sentence".to_string(),
            voice: "x4_enus_catherine_profnews".to_string(),
            sample_rate: 16000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ── Secrets ──────────────────────────────────────────────────────

/// Vendor secrets held by the process. Never accepted from the client.
#[derive(Clone, Default)]
pub struct Credentials {
    pub gemini_api_key: Option<String>,
    pub baidu_client_id: Option<String>,
    pub baidu_client_secret: Option<String>,
    pub xunfei_app_id: Option<String>,
    pub xunfei_api_key: Option<String>,
    pub xunfei_api_secret: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let present = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("gemini_api_key", &present(&self.gemini_api_key))
            .field("baidu_client_id", &present(&self.baidu_client_id))
            .field("baidu_client_secret", &present(&self.baidu_client_secret))
            .field("xunfei_app_id", &present(&self.xunfei_app_id))
            .field("xunfei_api_key", &present(&self.xunfei_api_key))
            .field("xunfei_api_secret", &present(&self.xunfei_api_secret))
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            gemini_api_key: get(GEMINI_API_KEY),
            baidu_client_id: get(BAIDU_CLIENT_ID),
            baidu_client_secret: get(BAIDU_CLIENT_SECRET),
            xunfei_app_id: get(XUNFEI_APP_ID),
            xunfei_api_key: get(XUNFEI_API_KEY),
            xunfei_api_secret: get(XUNFEI_API_SECRET),
        }
    }

    pub fn gemini(&self) -> Result<String, ProxyError> {
        require(&[(GEMINI_API_KEY, &self.gemini_api_key)])?;
        Ok(self.gemini_api_key.clone().unwrap_or_default())
    }

    /// `(client_id, client_secret)`.
    pub fn baidu(&self) -> Result<(String, String), ProxyError> {
        require(&[
            (BAIDU_CLIENT_ID, &self.baidu_client_id),
            (BAIDU_CLIENT_SECRET, &self.baidu_client_secret),
        ])?;
        Ok((
            self.baidu_client_id.clone().unwrap_or_default(),
            self.baidu_client_secret.clone().unwrap_or_default(),
        ))
    }

    pub fn xunfei(&self) -> Result<XunfeiCredentials, ProxyError> {
        require(&[
            (XUNFEI_APP_ID, &self.xunfei_app_id),
            (XUNFEI_API_KEY, &self.xunfei_api_key),
            (XUNFEI_API_SECRET, &self.xunfei_api_secret),
        ])?;
        Ok(XunfeiCredentials {
            app_id: self.xunfei_app_id.clone().unwrap_or_default(),
            api_key: self.xunfei_api_key.clone().unwrap_or_default(),
            api_secret: self.xunfei_api_secret.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct XunfeiCredentials {
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
}

fn require(vars: &[(&str, &Option<String>)]) -> Result<(), ProxyError> {
    let missing: Vec<&str> = vars
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProxyError::Config(format!(
            "missing vendor credentials: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.allowed_origin, "*");
        assert_eq!(config.vendor.kind, VendorKind::DedicatedEvaluationEngine);
        assert_eq!(config.vendor.timeout, Duration::from_secs(15));
        assert_eq!(config.vendor.token_safety_margin, Duration::from_secs(60));
        assert_eq!(config.vendor.xunfei.category, "read_sentence");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000

            [vendor]
            kind = "baidu"
            timeout = "30s"

            [vendor.baidu]
            dev_pid = 1537
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.vendor.kind, VendorKind::NationalCloudAsr);
        assert_eq!(config.vendor.timeout, Duration::from_secs(30));
        assert_eq!(config.vendor.baidu.dev_pid, 1537);
        assert_eq!(config.vendor.baidu.cuid, "pronounce-proxy");
    }

    #[test]
    fn vendor_aliases_parse() {
        let config = Config::from_toml(
            r#"
            [vendor]
            kind = "generative-multimodal"
            "#,
        )
        .unwrap();
        assert_eq!(config.vendor.kind, VendorKind::GenerativeMultimodal);
        assert_eq!(
            "dedicated-evaluation-engine".parse::<VendorKind>().unwrap(),
            VendorKind::DedicatedEvaluationEngine
        );
        assert!("azure".parse::<VendorKind>().is_err());
    }

    #[test]
    fn bad_duration_is_rejected() {
        let result = Config::from_toml(
            r#"
            [vendor]
            timeout = "soon"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\njson = true\nlevel = \"debug\"").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn credentials_report_all_missing_names() {
        let creds = Credentials::from_lookup(lookup(&[(XUNFEI_APP_ID, "app")]));
        let err = creds.xunfei().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        let msg = err.to_string();
        assert!(msg.contains(XUNFEI_API_KEY));
        assert!(msg.contains(XUNFEI_API_SECRET));
        assert!(!msg.contains(XUNFEI_APP_ID));
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let creds = Credentials::from_lookup(lookup(&[(GEMINI_API_KEY, "  ")]));
        assert!(creds.gemini().is_err());
    }

    #[test]
    fn complete_credentials_resolve() {
        let creds = Credentials::from_lookup(lookup(&[
            (BAIDU_CLIENT_ID, "id"),
            (BAIDU_CLIENT_SECRET, "secret"),
        ]));
        assert_eq!(
            creds.baidu().unwrap(),
            ("id".to_string(), "secret".to_string())
        );
    }

    #[test]
    fn debug_hides_secret_values() {
        let creds = Credentials::from_lookup(lookup(&[(XUNFEI_API_SECRET, "hunter2")]));
        let dbg = format!("{:?}", creds);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<set>"));
    }
}
