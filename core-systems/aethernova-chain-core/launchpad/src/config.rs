//! Configuration loader for a sale deployment.
//!
//! Layers (highest precedence last):
//!   1) Built-in defaults for optional fields
//!   2) Config file (explicit path, or `launchpad.{toml,yaml,json}` if present)
//!   3) Environment variables (optionally via .env)
//!
//! Environment keys use the prefix `AETHERNOVA_SALE` and `__` for nesting:
//!   AETHERNOVA_SALE__REFERRAL_RATE=25
//!   AETHERNOVA_SALE__CLIFF=30d
//!   AETHERNOVA_SALE__LOG__FILTER=info,aethernova_launchpad=debug

use std::fmt;
use std::path::Path;
use std::time::Duration;

use config as cfg;
use dotenvy::dotenv;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::{
    error::SaleError,
    referral::DEFAULT_REFERRAL_RATE,
    sale::SaleConfig,
    stage::StageParams,
    telemetry::LoggingConfig,
    Address, Balance, STAGE_COUNT,
};

/// Deployment settings as read from file/env. Addresses stay hex strings until
/// `to_sale_config`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaleSettings {
    pub owner: String,
    #[serde(default)]
    pub manager: Option<String>,
    /// Exactly three entries, in settlement order.
    pub stages: Vec<StageSettings>,
    /// Delay between the last stage end and the first claim, e.g. "30d".
    #[serde(with = "humantime_serde")]
    pub cliff: Duration,
    /// Linear release duration after the cliff, e.g. "180d".
    #[serde(with = "humantime_serde")]
    pub vesting: Duration,
    #[serde(default = "default_referral_rate")]
    pub referral_rate: Amount,
    /// Broadcast buffer for sale events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub log: LogSettings,
}

/// One stage block. Amounts go through `Amount` so values beyond the integer
/// range of file formats can be written as decimal strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSettings {
    pub price: Amount,
    pub token_supply: Amount,
    pub min_purchase: Amount,
    pub start_time: u64,
    pub end_time: u64,
    pub min_tokens_sold: Amount,
}

impl From<StageSettings> for StageParams {
    fn from(s: StageSettings) -> Self {
        StageParams {
            price: s.price.0,
            token_supply: s.token_supply.0,
            min_purchase: s.min_purchase.0,
            start_time: s.start_time,
            end_time: s.end_time,
            min_tokens_sold: s.min_tokens_sold.0,
        }
    }
}

/// Token/currency amount in config: accepts an integer or a decimal string,
/// serializes as a decimal string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(pub Balance);

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> de::Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount(Balance::from(v)))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(Amount(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                u64::try_from(v)
                    .map(|v| Amount(Balance::from(v)))
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.trim()
                    .parse::<Balance>()
                    .map(Amount)
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// RUST_LOG-like directive; empty means "read RUST_LOG".
    pub filter: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info,aethernova_launchpad=info".into(),
            json: true,
        }
    }
}

fn default_referral_rate() -> Amount {
    Amount(DEFAULT_REFERRAL_RATE)
}

fn default_event_capacity() -> usize {
    1024
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] cfg::ConfigError),
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error("expected 3 stages, got {0}")]
    StageCount(usize),
    #[error("event capacity must be > 0")]
    EventCapacity,
    #[error(transparent)]
    Sale(#[from] SaleError),
}

/// Load settings: defaults → file → environment, then validate.
pub fn load(explicit_file: Option<&Path>) -> Result<SaleSettings, ConfigError> {
    // no-op when .env is absent
    let _ = dotenv();

    let mut builder = cfg::Config::builder();
    builder = match explicit_file {
        Some(path) => builder.add_source(cfg::File::from(path)),
        None => builder.add_source(cfg::File::with_name("launchpad").required(false)),
    };
    builder = builder.add_source(
        cfg::Environment::with_prefix("AETHERNOVA_SALE")
            .separator("__")
            .try_parsing(true),
    );

    let settings: SaleSettings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

/// Parse settings from an in-memory TOML document (no file or env layers).
pub fn from_toml_str(doc: &str) -> Result<SaleSettings, ConfigError> {
    let settings: SaleSettings = cfg::Config::builder()
        .add_source(cfg::File::from_str(doc, cfg::FileFormat::Toml))
        .build()?
        .try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

fn parse_address(raw: &str) -> Result<Address, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidAddress(raw.to_string()))
}

impl SaleSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::EventCapacity);
        }
        self.to_sale_config().map(|_| ())
    }

    /// Engine config with parsed addresses; runs the engine's own validation.
    pub fn to_sale_config(&self) -> Result<SaleConfig, ConfigError> {
        let owner = parse_address(&self.owner)?;
        let manager = self.manager.as_deref().map(parse_address).transpose()?;
        let stages: [StageSettings; STAGE_COUNT] = self
            .stages
            .as_slice()
            .try_into()
            .map_err(|_| ConfigError::StageCount(self.stages.len()))?;
        let sale = SaleConfig {
            owner,
            manager,
            stages: stages.map(StageParams::from),
            cliff_seconds: self.cliff.as_secs(),
            vesting_seconds: self.vesting.as_secs(),
            referral_rate: self.referral_rate.0,
        };
        sale.validate()?;
        Ok(sale)
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            env_filter: (!self.log.filter.is_empty()).then(|| self.log.filter.clone()),
            json: self.log.json,
            ..LoggingConfig::default()
        }
    }
}
