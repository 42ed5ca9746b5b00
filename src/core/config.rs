use crate::core::currency::RatesMap;
use crate::core::price::AssetType;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

/// A holding owned by the surrounding portfolio application. Read-only here,
/// apart from best-effort currency and name repairs.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AssetPosition {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub quantity: f64,
    #[serde(default)]
    pub buy_price: f64,
    pub currency: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub rank: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    #[serde(default = "YahooProviderConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "YahooProviderConfig::default_chart_base_url")]
    pub chart_base_url: String,
    /// Upper bound of the random delay before a single-symbol quote call.
    #[serde(default = "YahooProviderConfig::default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl YahooProviderConfig {
    fn default_base_url() -> String {
        "https://query1.finance.yahoo.com".to_string()
    }

    fn default_chart_base_url() -> String {
        "https://query2.finance.yahoo.com".to_string()
    }

    fn default_jitter_ms() -> u64 {
        2000
    }
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        YahooProviderConfig {
            base_url: Self::default_base_url(),
            chart_base_url: Self::default_chart_base_url(),
            jitter_ms: Self::default_jitter_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiKeyProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiKeyProviderConfig {
    /// Configured key, or the named environment variable.
    pub fn resolve_api_key(&self, env_var: &str) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TefasProviderConfig {
    pub base_url: String,
    #[serde(default = "TefasProviderConfig::default_currency")]
    pub currency: String,
    /// Trailing window of daily prices pulled to find the latest one.
    #[serde(default = "TefasProviderConfig::default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TefasProviderConfig {
    fn default_currency() -> String {
        "TRY".to_string()
    }

    fn default_window_days() -> i64 {
        7
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrankfurterProviderConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub yahoo: YahooProviderConfig,
    pub alphavantage: Option<ApiKeyProviderConfig>,
    pub finnhub: Option<ApiKeyProviderConfig>,
    pub tefas: Option<TefasProviderConfig>,
    pub frankfurter: Option<FrankfurterProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: YahooProviderConfig::default(),
            alphavantage: Some(ApiKeyProviderConfig {
                base_url: "https://www.alphavantage.co".to_string(),
                api_key: None,
                timeout_secs: default_timeout_secs(),
            }),
            finnhub: Some(ApiKeyProviderConfig {
                base_url: "https://finnhub.io/api/v1".to_string(),
                api_key: None,
                timeout_secs: default_timeout_secs(),
            }),
            tefas: Some(TefasProviderConfig {
                base_url: "https://www.tefas.gov.tr/api".to_string(),
                currency: TefasProviderConfig::default_currency(),
                window_days: TefasProviderConfig::default_window_days(),
                timeout_secs: default_timeout_secs(),
            }),
            frankfurter: Some(FrankfurterProviderConfig {
                base_url: "https://api.frankfurter.app".to_string(),
                timeout_secs: default_timeout_secs(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub quote_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { quote_ttl_secs: 30 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    pub batch_size: usize,
    /// Pause between batch calls to stay under upstream rate limits.
    pub pause_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            batch_size: 50,
            pause_ms: 1500,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RatesConfig {
    /// IANA timezone the FX publication checkpoints are defined in.
    pub timezone: String,
    pub morning_checkpoint: String,
    pub evening_checkpoint: String,
    pub fallback_max_age_hours: i64,
    pub required: Vec<String>,
    pub emergency: RatesMap,
}

impl Default for RatesConfig {
    fn default() -> Self {
        RatesConfig {
            timezone: "Europe/Berlin".to_string(),
            morning_checkpoint: "08:00".to_string(),
            evening_checkpoint: "17:00".to_string(),
            fallback_max_age_hours: 12,
            required: vec!["USD".to_string(), "TRY".to_string()],
            emergency: RatesMap::from([("USD".to_string(), 1.09), ("TRY".to_string(), 37.5)]),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ValuationConfig {
    pub max_concurrency: usize,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        ValuationConfig { max_concurrency: 8 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "AppConfig::default_base_currency")]
    pub base_currency: String,
    #[serde(default)]
    pub positions: Vec<AssetPosition>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub valuation: ValuationConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    fn default_base_currency() -> String {
        "EUR".to_string()
    }

    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "portval", "portval")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "portval", "portval")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
