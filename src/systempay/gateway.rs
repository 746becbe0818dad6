use base64::{engine::general_purpose::STANDARD as base64_engine, Engine as _};
use chrono::{DateTime, Timelike, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use super::forms::{ReturnForm, SubmitForm, SIGNATURE_FIELD};
use crate::config::SystemPayConfig;
use crate::error::{Result, SystemPayError};

type HmacSha256 = Hmac<Sha256>;

const TRANS_ID_SPACE: u32 = 900_000;
const NO_TRANS_ID: u32 = u32::MAX;

/// Signs and checks the forms exchanged with the SystemPay payment page.
pub struct Gateway {
    sandbox_mode: bool,
    site_id: String,
    certificate: String,
    action_mode: String,
    currency: String,
    keyed_mac: HmacSha256,
    last_trans_id: AtomicU32,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("sandbox_mode", &self.sandbox_mode)
            .field("site_id", &self.site_id)
            .field("action_mode", &self.action_mode)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub const URL: &'static str = "https://paiement.systempay.fr/vads-payment/";
    pub const VERSION: &'static str = "V2";
    pub const DEFAULT_CURRENCY: &'static str = "978";

    pub fn new(
        sandbox_mode: bool,
        site_id: impl Into<String>,
        certificate: impl Into<String>,
        action_mode: impl Into<String>,
    ) -> Result<Self> {
        let certificate = certificate.into();
        let keyed_mac = HmacSha256::new_from_slice(certificate.as_bytes())
            .map_err(|e| SystemPayError::Config(format!("Invalid SystemPay certificate: {e}")))?;
        Ok(Self {
            sandbox_mode,
            site_id: site_id.into(),
            certificate,
            action_mode: action_mode.into(),
            currency: Self::DEFAULT_CURRENCY.to_string(),
            keyed_mac,
            last_trans_id: AtomicU32::new(NO_TRANS_ID),
        })
    }

    pub fn from_config(config: &SystemPayConfig) -> Result<Self> {
        Ok(Self::new(
            config.sandbox_mode,
            config.site_id.clone(),
            config.certificate.clone(),
            config.action_mode.clone(),
        )?
        .with_currency(config.currency.clone()))
    }

    /// ISO 4217 numeric code, `978` (EUR) unless configured otherwise.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn ctx_mode(&self) -> &'static str {
        if self.sandbox_mode {
            "TEST"
        } else {
            "PRODUCTION"
        }
    }

    /// Builds an unsigned payment form for `amount`. Caller supplied
    /// `params` override the defaults.
    pub fn get_submit_form(
        &self,
        amount: Decimal,
        params: BTreeMap<String, String>,
    ) -> Result<SubmitForm> {
        let now = Utc::now();
        let mut form = SubmitForm::default();
        form.set("vads_site_id", self.site_id.clone());
        form.set("vads_ctx_mode", self.ctx_mode());
        form.set("vads_version", Self::VERSION);
        form.set("vads_page_action", "PAYMENT");
        form.set("vads_action_mode", self.action_mode.clone());
        form.set("vads_payment_config", "SINGLE");
        form.set("vads_currency", self.currency.clone());
        form.set("vads_amount", to_minor_units(amount)?.to_string());
        form.set("vads_trans_date", now.format("%Y%m%d%H%M%S").to_string());
        form.set("vads_trans_id", self.next_trans_id(now));
        form.data.extend(params);
        Ok(form)
    }

    pub fn get_return_form<I, K, V>(&self, fields: I) -> ReturnForm
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ReturnForm::new(fields)
    }

    pub fn sign(&self, form: &mut SubmitForm) {
        let signature = self.compute_signature(&form.data);
        form.set(SIGNATURE_FIELD, signature);
    }

    /// Base64(HMAC-SHA-256) of the `vads_*` values sorted by field name,
    /// joined with `+` and followed by the certificate.
    pub fn compute_signature(&self, data: &BTreeMap<String, String>) -> String {
        let mut mac = self.keyed_mac.clone();
        mac.update(self.signing_message(data).as_bytes());
        base64_engine.encode(mac.finalize().into_bytes())
    }

    pub fn is_signature_valid(&self, form: &ReturnForm) -> bool {
        let Some(signature) = form.signature() else {
            return false;
        };
        let Ok(expected) = base64_engine.decode(signature) else {
            return false;
        };
        let mut mac = self.keyed_mac.clone();
        mac.update(self.signing_message(&form.data).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    fn signing_message(&self, data: &BTreeMap<String, String>) -> String {
        let mut parts: Vec<&str> = data
            .iter()
            .filter(|(name, _)| name.starts_with("vads_"))
            .map(|(_, value)| value.as_str())
            .collect();
        parts.push(&self.certificate);
        parts.join("+")
    }

    /// Six digit id below 900000, unique for the day. Uses the tenth of a
    /// second since midnight UTC, bumped past the last id handed out.
    fn next_trans_id(&self, now: DateTime<Utc>) -> String {
        let tenths = now.num_seconds_from_midnight() * 10 + (now.nanosecond() / 100_000_000).min(9);
        let candidate = tenths % TRANS_ID_SPACE;
        let mut last = self.last_trans_id.load(Ordering::Relaxed);
        loop {
            let next = if last == NO_TRANS_ID || candidate > last {
                candidate
            } else {
                (last + 1) % TRANS_ID_SPACE
            };
            match self.last_trans_id.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return format!("{next:06}"),
                Err(current) => last = current,
            }
        }
    }
}

/// Converts a decimal amount into integer minor units, rounding half away
/// from zero.
pub fn to_minor_units(amount: Decimal) -> Result<u64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(SystemPayError::Payment(format!(
            "Amount must not be negative: {amount}"
        )));
    }
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or_else(|| SystemPayError::Payment(format!("Amount out of range: {amount}")))
}

/// Inverse of [`to_minor_units`] for the `vads_amount` field.
pub fn from_minor_units(amount: u64) -> Decimal {
    Decimal::from(amount) / Decimal::ONE_HUNDRED
}
