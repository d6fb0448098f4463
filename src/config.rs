use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::OnceLock;
use std::time::Duration;

/// Global application configuration. Resolved once at startup from
/// process environment and/or `.env`; never mutated afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,

    // Upstream endpoints
    pub crypto_feed_url: String,
    pub fx_feed_url: String,
    pub market_data_url: String,
    /// Credential for the market-data vendor. Missing ⇒ any request to
    /// that upstream fails immediately with a configuration error.
    pub market_data_api_key: Option<String>,

    // Cache
    pub ttl_min: Duration,
    pub ttl_max: Duration,
    pub refresh_threshold: Duration,

    // Scheduler
    pub scheduler_interval: Duration,
    pub seed_on_startup: bool,

    // Rate limiting
    pub market_data_quota: u32,
    pub rate_limit_window: Duration,

    // Retry policy
    pub max_retries: u32,
    pub base_delay: Duration,

    // Per-attempt upstream timeout
    pub upstream_timeout: Duration,

    /// Overall deadline for a single `/api/prices/all` handler
    /// invocation. Exceeding it is a handler-level failure (503), distinct
    /// from any individual key's upstream failure.
    pub handler_timeout: Duration,

    // Declared fallback values, substituted when a key has neither a
    // fresh nor a stale cache entry. Configurable rather than hardcoded so
    // operators can tune them without a rebuild.
    pub fallback_btc: Decimal,
    pub fallback_eur_usd: Decimal,
    pub fallback_quote_price: Decimal,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,

            crypto_feed_url: "https://api.coinbase.com/v2/prices/BTC-USD/spot".to_string(),
            fx_feed_url: "https://api.exchangerate.host/latest?base=EUR&symbols=USD".to_string(),
            market_data_url: "https://api.marketdata.example.com/v1/quote".to_string(),
            market_data_api_key: None,

            ttl_min: Duration::from_secs(300),
            ttl_max: Duration::from_secs(600),
            refresh_threshold: Duration::from_secs(60),

            scheduler_interval: Duration::from_secs(30),
            seed_on_startup: true,

            market_data_quota: 5,
            rate_limit_window: Duration::from_secs(60),

            max_retries: 5,
            base_delay: Duration::from_secs(16),

            upstream_timeout: Duration::from_secs(5),
            handler_timeout: Duration::from_secs(30),

            fallback_btc: dec!(0),
            fallback_eur_usd: dec!(1.08),
            fallback_quote_price: dec!(0),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// the reference defaults for anything unset. Only `PORT` and the
    /// market-data credential are operationally significant; everything
    /// else is tunable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            host: env_or("BIND_HOST", defaults.host),
            port: env_parse_or("PORT", defaults.port),

            crypto_feed_url: env_or("CRYPTO_FEED_URL", defaults.crypto_feed_url),
            fx_feed_url: env_or("FX_FEED_URL", defaults.fx_feed_url),
            market_data_url: env_or("MARKET_DATA_URL", defaults.market_data_url),
            market_data_api_key: std::env::var("MARKET_DATA_API_KEY").ok(),

            ttl_min: Duration::from_secs(env_parse_or("TTL_MIN_SECS", defaults.ttl_min.as_secs())),
            ttl_max: Duration::from_secs(env_parse_or("TTL_MAX_SECS", defaults.ttl_max.as_secs())),
            refresh_threshold: Duration::from_secs(env_parse_or(
                "REFRESH_THRESHOLD_SECS",
                defaults.refresh_threshold.as_secs(),
            )),

            scheduler_interval: Duration::from_secs(env_parse_or(
                "SCHEDULER_INTERVAL_SECS",
                defaults.scheduler_interval.as_secs(),
            )),
            seed_on_startup: env_parse_or("SEED_ON_STARTUP", defaults.seed_on_startup),

            market_data_quota: env_parse_or("MARKET_DATA_QUOTA", defaults.market_data_quota),
            rate_limit_window: Duration::from_secs(env_parse_or(
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window.as_secs(),
            )),

            max_retries: env_parse_or("MAX_RETRIES", defaults.max_retries),
            base_delay: Duration::from_secs(env_parse_or(
                "BASE_DELAY_SECS",
                defaults.base_delay.as_secs(),
            )),

            upstream_timeout: Duration::from_secs(env_parse_or(
                "UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout.as_secs(),
            )),
            handler_timeout: Duration::from_secs(env_parse_or(
                "HANDLER_TIMEOUT_SECS",
                defaults.handler_timeout.as_secs(),
            )),

            fallback_btc: defaults.fallback_btc,
            fallback_eur_usd: defaults.fallback_eur_usd,
            fallback_quote_price: defaults.fallback_quote_price,
        }
    }

    /// Panics with a clear message if the configuration is internally
    /// inconsistent. Called once at startup, never during a request.
    pub fn validate(&self) {
        assert!(
            self.scheduler_interval < self.refresh_threshold,
            "SCHEDULER_INTERVAL must be < REFRESH_THRESHOLD to guarantee every entry is \
             inspected before it falls below the refresh threshold"
        );
        assert!(
            self.refresh_threshold <= self.ttl_min,
            "REFRESH_THRESHOLD must be <= TTL_MIN to guarantee refresh before expiry"
        );
        assert!(self.ttl_min <= self.ttl_max, "TTL_MIN must be <= TTL_MAX");
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Global config instance, resolved on first access.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get or initialise the global configuration from the process
/// environment.
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_satisfy_the_ordering_invariant() {
        Config::default().validate();
    }

    #[test]
    #[should_panic(expected = "SCHEDULER_INTERVAL")]
    fn validate_rejects_interval_above_threshold() {
        let mut cfg = Config::default();
        cfg.scheduler_interval = cfg.refresh_threshold;
        cfg.validate();
    }
}
