//! Server configuration, read from `SFP_*` environment variables.
//!
//! Invalid values never stop the server from starting. They are logged and the default is used instead.
use std::{env, net::IpAddr, path::PathBuf};

use chrono::Duration;
use log::*;
use sfp_common::{parse_boolean_flag, Secret};
use storefront_payment_engine::DEFAULT_MAX_PROVISIONING_ATTEMPTS;

const DEFAULT_SFP_HOST: &str = "127.0.0.1";
const DEFAULT_SFP_PORT: u16 = 8380;
const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::minutes(5);
const DEFAULT_PAYMENT_EXPIRY: Duration = Duration::hours(24);
const DEFAULT_PROVISIONING_SWEEP_INTERVAL: Duration = Duration::minutes(10);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// If supplied, requests against /webhook endpoints will be checked against this whitelist.
    /// To explicitly disable the whitelist, set `SFP_WEBHOOK_IP_WHITELIST` to "false", "none", or "0".
    pub webhook_whitelist: Option<Vec<IpAddr>>,
    /// How often unsettled payments are polled. A payment is only polled once it has not changed for this long.
    pub status_poll_interval: Duration,
    /// Pending payments older than this are expired locally.
    pub payment_expiry: Duration,
    pub provisioning_sweep_interval: Duration,
    pub max_provisioning_attempts: i64,
    pub provisioning: ProvisioningConfig,
    /// A JSON file with products and gateway configurations to load at start-up
    pub seed_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct ProvisioningConfig {
    pub url: String,
    pub api_key: Secret<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SFP_HOST.to_string(),
            port: DEFAULT_SFP_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            webhook_whitelist: None,
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
            payment_expiry: DEFAULT_PAYMENT_EXPIRY,
            provisioning_sweep_interval: DEFAULT_PROVISIONING_SWEEP_INTERVAL,
            max_provisioning_attempts: DEFAULT_MAX_PROVISIONING_ATTEMPTS,
            provisioning: ProvisioningConfig::default(),
            seed_file: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SFP_HOST").ok().unwrap_or_else(|| DEFAULT_SFP_HOST.into());
        let port = env::var("SFP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SFP_PORT. {e} Using the default, {DEFAULT_SFP_PORT}, instead."
                    );
                    DEFAULT_SFP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SFP_PORT);
        let database_url = env::var("SFP_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SFP_DATABASE_URL is not set. Please set it to the URL for the storefront database.");
            String::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("SFP_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("SFP_USE_FORWARDED").ok(), false);
        let webhook_whitelist = env::var("SFP_WEBHOOK_IP_WHITELIST").ok().and_then(|s| parse_whitelist(&s));
        log_whitelist(&webhook_whitelist);
        let status_poll_interval =
            duration_from_env("SFP_STATUS_POLL_INTERVAL", Duration::minutes, DEFAULT_STATUS_POLL_INTERVAL, "mins");
        let payment_expiry = duration_from_env("SFP_PAYMENT_EXPIRY", Duration::hours, DEFAULT_PAYMENT_EXPIRY, "hrs");
        let provisioning_sweep_interval = duration_from_env(
            "SFP_PROVISIONING_SWEEP_INTERVAL",
            Duration::minutes,
            DEFAULT_PROVISIONING_SWEEP_INTERVAL,
            "mins",
        );
        let max_provisioning_attempts = env::var("SFP_MAX_PROVISIONING_ATTEMPTS")
            .ok()
            .and_then(|s| match s.parse::<i64>() {
                Ok(v) if v > 0 => Some(v),
                _ => {
                    warn!("🪛️ Invalid configuration value for SFP_MAX_PROVISIONING_ATTEMPTS: {s}");
                    None
                },
            })
            .unwrap_or(DEFAULT_MAX_PROVISIONING_ATTEMPTS);
        let provisioning = ProvisioningConfig::from_env_or_default();
        let seed_file = env::var("SFP_SEED_FILE").ok().filter(|s| !s.trim().is_empty()).map(PathBuf::from);
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            webhook_whitelist,
            status_poll_interval,
            payment_expiry,
            provisioning_sweep_interval,
            max_provisioning_attempts,
            provisioning,
            seed_file,
        }
    }
}

impl ProvisioningConfig {
    pub fn from_env_or_default() -> Self {
        let url = env::var("SFP_PROVISIONING_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SFP_PROVISIONING_URL is not set. Paid orders cannot be provisioned until it is.");
            String::default()
        });
        let api_key = env::var("SFP_PROVISIONING_API_KEY").ok().unwrap_or_else(|| {
            warn!("🪛️ SFP_PROVISIONING_API_KEY is not set. Requests to the provisioning service will not be authorised.");
            String::default()
        });
        Self { url, api_key: Secret::new(api_key) }
    }
}

/// Parses a comma-separated list of IP addresses. "none", "false" and "0" disable the whitelist.
pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
        info!(
            "🪛️ Webhook IP whitelist is disabled. If this is not what you want, set SFP_WEBHOOK_IP_WHITELIST to a \
             comma-separated list of IP addresses to enable it."
        );
        return None;
    }
    let ip_addrs = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse()
                .map_err(|e| {
                    warn!("🪛️ Ignoring invalid IP address ({s}) in SFP_WEBHOOK_IP_WHITELIST: {e}");
                })
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}

fn log_whitelist(whitelist: &Option<Vec<IpAddr>>) {
    match whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The webhook IP whitelist was configured, but is empty. The server will run, but won't accept any \
                 payment processor notifications."
            );
        },
        None => {
            info!("🪛️ No webhook IP whitelist is set. Only signature validation will be used.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ Webhook IP whitelist: {addrs}");
        },
    }
}

fn duration_from_env(name: &str, unit: fn(i64) -> Duration, default: Duration, label: &str) -> Duration {
    let default_value = if label == "hrs" { default.num_hours() } else { default.num_minutes() };
    env::var(name)
        .map_err(|_| info!("🪛️ {name} is not set. Using the default value of {default_value} {label}."))
        .and_then(|s| match s.parse::<i64>() {
            Ok(v) if v > 0 => Ok(unit(v)),
            Ok(v) => Err(warn!("🪛️ Invalid configuration value for {name}. {v} is not positive.")),
            Err(e) => Err(warn!("🪛️ Invalid configuration value for {name}. {e}")),
        })
        .ok()
        .unwrap_or(default)
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}
