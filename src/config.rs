// --- File: src/config.rs ---

use actix_web::cookie::Key as CookieSignKey;
use sha2::{Digest, Sha512};
use std::env;

use crate::error::{Result, SystemPayError};

const MIN_COOKIE_SECRET_LEN: usize = 32;

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| SystemPayError::Config(format!("Missing {name} env var")))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| SystemPayError::Config(format!("Invalid {name}"))),
        Err(_) => Ok(default),
    }
}

/// Credentials and defaults of the SystemPay shop account.
#[derive(Clone)]
pub struct SystemPayConfig {
    pub sandbox_mode: bool,
    pub site_id: String,
    pub certificate: String,
    pub action_mode: String,
    /// ISO 4217 numeric code.
    pub currency: String,
}

impl SystemPayConfig {
    pub fn load() -> Result<Self> {
        crate::utils::ensure_dotenv_loaded();
        Ok(Self {
            sandbox_mode: env_flag("SYSTEMPAY_SANDBOX_MODE", true),
            site_id: required("SYSTEMPAY_SITE_ID")?,
            certificate: required("SYSTEMPAY_CERTIFICATE")?,
            action_mode: env::var("SYSTEMPAY_ACTION_MODE")
                .unwrap_or_else(|_| "INTERACTIVE".to_string()),
            currency: env::var("SYSTEMPAY_CURRENCY").unwrap_or_else(|_| "978".to_string()),
        })
    }
}

// --- Unified Configuration Struct ---
#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub governor_burst: u32,
    pub governor_per_second: u64,

    pub systempay: SystemPayConfig,

    /// Domain of the storefront site, used to build the absolute URLs
    /// handed to the gateway.
    pub site_domain: String,
    /// Running on a developer machine the gateway cannot reach.
    pub locale_server: bool,

    pub status_cancelled: String,
    pub thank_you_url: String,
    pub basket_url: String,

    pub admin_token: Option<String>,
    pub checkout_cookie_key: CookieSignKey,

    #[cfg(feature = "sqlite")]
    pub database_url: Option<String>,
}

impl AppConfig {
    // Load configuration from environment variables
    pub fn load() -> Result<Self> {
        crate::utils::ensure_dotenv_loaded();

        let server_port = parse_or("SERVER_PORT", 6666u16)?;
        let governor_burst = parse_or("GOVERNOR_BURST", 5u32)?;
        let governor_per_second = parse_or("GOVERNOR_PER_SECOND", 2u64)?;

        let systempay = SystemPayConfig::load()?;

        let checkout_cookie_key = checkout_cookie_key(&required("CHECKOUT_COOKIE_SECRET")?)?;

        let locale_server = env_flag("LOCALE_SERVER", false);
        if locale_server {
            tracing::warn!("LOCALE_SERVER=true: payment notifications will not be requested from SystemPay.");
        }

        Ok(AppConfig {
            server_port,
            governor_burst,
            governor_per_second,
            systempay,
            site_domain: required("SITE_DOMAIN")?,
            locale_server,
            status_cancelled: env::var("OSCAR_STATUS_CANCELLED")
                .unwrap_or_else(|_| "Cancelled".to_string()),
            thank_you_url: env::var("THANK_YOU_URL")
                .unwrap_or_else(|_| "/checkout/thank-you/".to_string()),
            basket_url: env::var("BASKET_URL").unwrap_or_else(|_| "/basket/".to_string()),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            checkout_cookie_key,
            #[cfg(feature = "sqlite")]
            database_url: env::var("DATABASE_URL").ok(),
        })
    }

    pub fn scheme(&self) -> &'static str {
        if self.locale_server {
            "http"
        } else {
            "https"
        }
    }

    /// `path` on the configured site, e.g. `https://shop.example.com/systempay/return/`.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}://{}{}", self.scheme(), self.site_domain, path)
    }
}

/// Secrets under 32 bytes are refused. Keys shorter than the 64 bytes the
/// private cookie jar needs are stretched with SHA-512.
pub fn checkout_cookie_key(secret: &str) -> Result<CookieSignKey> {
    if secret.len() < MIN_COOKIE_SECRET_LEN {
        return Err(SystemPayError::Config(format!(
            "CHECKOUT_COOKIE_SECRET is too short (need at least {MIN_COOKIE_SECRET_LEN} bytes)"
        )));
    }
    if secret.len() >= 64 {
        Ok(CookieSignKey::from(secret.as_bytes()))
    } else {
        let digest = Sha512::digest(secret.as_bytes());
        Ok(CookieSignKey::from(digest.as_slice()))
    }
}
