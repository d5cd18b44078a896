use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::debounce::DEFAULT_DEBOUNCE_LIMIT;
use crate::dispatch::{
    validate_endpoint, Backpressure, DispatcherConfig, DEFAULT_DISPATCH_WORKERS,
    DEFAULT_QUEUE_CAPACITY,
};
use crate::resolve::{ResolverConfig, DEFAULT_COUNT_MARGIN, DEFAULT_MIN_CONFIDENCE};
use crate::tracker::{
    TrackerConfig, DEFAULT_CROSSING_THRESHOLD, DEFAULT_ENTRY_ZONE_MAX, DEFAULT_ENTRY_ZONE_MIN,
};
use crate::DEFAULT_BACKEND_ENDPOINT;

const DEFAULT_SOURCE: &str = "stub://checkout_lane";

#[derive(Debug, Deserialize, Default)]
struct CheckoutConfigFile {
    backend: Option<BackendConfigFile>,
    cashier: Option<CashierConfigFile>,
    tracking: Option<TrackingConfigFile>,
    resolver: Option<ResolverConfigFile>,
    dispatch: Option<DispatchConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendConfigFile {
    endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CashierConfigFile {
    id: Option<i64>,
    token: Option<String>,
    token_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    crossing_threshold: Option<f32>,
    entry_zone_min: Option<f32>,
    entry_zone_max: Option<f32>,
    debounce_limit: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ResolverConfigFile {
    min_confidence: Option<f32>,
    count_margin: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DispatchConfigFile {
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    backpressure: Option<String>,
    normalize_plurals: Option<bool>,
    dry_run: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    path: Option<String>,
}

/// Cashier identity and bearer token supplied by the login collaborator.
///
/// Immutable for the process lifetime. The token is wiped on drop and never
/// printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CashierCredentials {
    cashier_id: i64,
    token: String,
}

impl CashierCredentials {
    pub fn new(cashier_id: i64, token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(anyhow!("auth token must not be empty"));
        }
        Ok(Self {
            cashier_id,
            token: token.to_string(),
        })
    }

    pub fn cashier_id(&self) -> i64 {
        self.cashier_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for CashierCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CashierCredentials")
            .field("cashier_id", &self.cashier_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub backend_endpoint: String,
    pub credentials: CashierCredentials,
    pub tracker: TrackerConfig,
    pub debounce_limit: u32,
    pub resolver: ResolverConfig,
    pub dispatch: DispatcherConfig,
    pub dry_run: bool,
    pub source: String,
}

impl CheckoutConfig {
    /// Load from the file named by `CHECKOUT_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CHECKOUT_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => CheckoutConfigFile::default(),
        };
        let env = EnvOverrides::capture()?;
        let mut cfg = Self::from_parts(file_cfg, &env)?;
        cfg.apply_env(&env)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_parts(file: CheckoutConfigFile, env: &EnvOverrides) -> Result<Self> {
        let backend_endpoint = file
            .backend
            .and_then(|backend| backend.endpoint)
            .unwrap_or_else(|| DEFAULT_BACKEND_ENDPOINT.to_string());

        let cashier = file.cashier.unwrap_or_default();
        let cashier_id = env
            .cashier_id
            .or(cashier.id)
            .ok_or_else(|| anyhow!("cashier id missing: set cashier.id or CHECKOUT_CASHIER_ID"))?;
        let token = match (&env.token, &env.token_path, cashier.token, cashier.token_path) {
            (Some(token), _, _, _) => token.clone(),
            (None, Some(path), _, _) => read_token_file(path)?,
            (None, None, Some(token), _) => token,
            (None, None, None, Some(path)) => read_token_file(&path)?,
            (None, None, None, None) => {
                return Err(anyhow!(
                    "auth token missing: set cashier.token, cashier.token_path, CHECKOUT_AUTH_TOKEN or CHECKOUT_AUTH_TOKEN_PATH"
                ))
            }
        };
        let credentials = CashierCredentials::new(cashier_id, &token)?;

        let tracking = file.tracking.unwrap_or_default();
        let tracker = TrackerConfig {
            crossing_threshold: tracking
                .crossing_threshold
                .unwrap_or(DEFAULT_CROSSING_THRESHOLD),
            entry_zone_min: tracking.entry_zone_min.unwrap_or(DEFAULT_ENTRY_ZONE_MIN),
            entry_zone_max: tracking.entry_zone_max.unwrap_or(DEFAULT_ENTRY_ZONE_MAX),
        };
        let debounce_limit = tracking.debounce_limit.unwrap_or(DEFAULT_DEBOUNCE_LIMIT);

        let resolver_file = file.resolver.unwrap_or_default();
        let resolver = ResolverConfig {
            min_confidence: resolver_file
                .min_confidence
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            count_margin: resolver_file.count_margin.unwrap_or(DEFAULT_COUNT_MARGIN),
        };

        let dispatch_file = file.dispatch.unwrap_or_default();
        let backpressure = match dispatch_file.backpressure.as_deref() {
            Some(policy) => policy.parse()?,
            None => Backpressure::default(),
        };
        let dispatch = DispatcherConfig {
            workers: dispatch_file.workers.unwrap_or(DEFAULT_DISPATCH_WORKERS),
            queue_capacity: dispatch_file
                .queue_capacity
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            backpressure,
            normalize_plurals: dispatch_file.normalize_plurals.unwrap_or(true),
        };

        let source = file
            .source
            .and_then(|source| source.path)
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());

        Ok(Self {
            backend_endpoint,
            credentials,
            tracker,
            debounce_limit,
            resolver,
            dispatch,
            dry_run: dispatch_file.dry_run.unwrap_or(false),
            source,
        })
    }

    fn apply_env(&mut self, env: &EnvOverrides) -> Result<()> {
        if let Some(url) = &env.backend_url {
            self.backend_endpoint = url.clone();
        }
        if let Some(threshold) = env.crossing_threshold {
            self.tracker.crossing_threshold = threshold;
        }
        if let Some(limit) = env.debounce_limit {
            self.debounce_limit = limit;
        }
        if let Some(workers) = env.workers {
            self.dispatch.workers = workers;
        }
        if let Some(policy) = env.backpressure {
            self.dispatch.backpressure = policy;
        }
        if let Some(source) = &env.source {
            self.source = source.clone();
        }
        if let Some(dry_run) = env.dry_run {
            self.dry_run = dry_run;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_endpoint(&self.backend_endpoint)?;
        self.tracker.validate()?;
        self.resolver.validate()?;
        if self.debounce_limit == 0 {
            return Err(anyhow!("debounce limit must be greater than zero"));
        }
        if self.dispatch.workers == 0 {
            return Err(anyhow!("dispatch workers must be greater than zero"));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(anyhow!("dispatch queue capacity must be greater than zero"));
        }
        if self.source.trim().is_empty() {
            return Err(anyhow!("detection source must not be empty"));
        }
        Ok(())
    }
}

/// Environment values, parsed once so that file and env layering see the same view.
#[derive(Default)]
struct EnvOverrides {
    backend_url: Option<String>,
    cashier_id: Option<i64>,
    token: Option<String>,
    token_path: Option<PathBuf>,
    crossing_threshold: Option<f32>,
    debounce_limit: Option<u32>,
    workers: Option<usize>,
    backpressure: Option<Backpressure>,
    source: Option<String>,
    dry_run: Option<bool>,
}

impl EnvOverrides {
    fn capture() -> Result<Self> {
        Ok(Self {
            backend_url: non_empty_var("CHECKOUT_BACKEND_URL"),
            cashier_id: parse_var("CHECKOUT_CASHIER_ID", "an integer cashier id")?,
            token: non_empty_var("CHECKOUT_AUTH_TOKEN"),
            token_path: non_empty_var("CHECKOUT_AUTH_TOKEN_PATH").map(PathBuf::from),
            crossing_threshold: parse_var("CHECKOUT_CROSSING_THRESHOLD", "a number")?,
            debounce_limit: parse_var("CHECKOUT_DEBOUNCE_LIMIT", "an integer frame count")?,
            workers: parse_var("CHECKOUT_DISPATCH_WORKERS", "an integer worker count")?,
            backpressure: non_empty_var("CHECKOUT_BACKPRESSURE")
                .map(|policy| policy.parse())
                .transpose()?,
            source: non_empty_var("CHECKOUT_SOURCE"),
            dry_run: non_empty_var("CHECKOUT_DRY_RUN").map(|v| parse_flag(&v)),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, expected: &str) -> Result<Option<T>> {
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be {}", key, expected)),
        None => Ok(None),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn read_config_file(path: &Path) -> Result<CheckoutConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn read_token_file(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read auth token file {}", path.display()))?;
    Ok(token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_reject_blank_token() {
        assert!(CashierCredentials::new(1, "   ").is_err());
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let creds = CashierCredentials::new(3, "very-secret").unwrap();
        let shown = format!("{:?}", creds);
        assert!(shown.contains("cashier_id: 3"));
        assert!(!shown.contains("very-secret"));
    }

    #[test]
    fn flags_accept_common_truthy_values() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }
}
