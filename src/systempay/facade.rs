use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::forms::{printable_form_errors, ReturnForm, SubmitForm};
use super::gateway::{from_minor_units, Gateway};
use super::transaction::{
    result_code, NewTransaction, OperationType, SystemPayTransaction, TransactionMode,
};
use super::urls;
use crate::config::AppConfig;
use crate::error::{Result, SystemPayError};
use crate::shop::Order;
use crate::storage::TransactionStore;

/// Absolute URLs the gateway sends the shopper (and its notifications) to.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackUrls {
    pub return_url: String,
    pub cancel_url: String,
    /// `None` when the gateway cannot reach us (local development).
    pub check_url: Option<String>,
}

impl CallbackUrls {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            return_url: config.absolute_url(urls::RETURN),
            cancel_url: config.absolute_url(urls::CANCEL),
            check_url: (!config.locale_server).then(|| config.absolute_url(urls::HANDLE_IPN)),
        }
    }
}

/// Bridge between the shop's orders and the gateway.
#[derive(Clone)]
pub struct Facade {
    gateway: Arc<Gateway>,
    transactions: Arc<dyn TransactionStore>,
    callback_urls: Option<CallbackUrls>,
}

impl Facade {
    pub fn new(gateway: Arc<Gateway>, transactions: Arc<dyn TransactionStore>) -> Self {
        Self {
            gateway,
            transactions,
            callback_urls: None,
        }
    }

    pub fn with_callback_urls(mut self, urls: CallbackUrls) -> Self {
        self.callback_urls = Some(urls);
        self
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn get_order_number(&self, form: &ReturnForm) -> Option<String> {
        form.get("vads_order_id").map(str::to_string)
    }

    pub fn get_total_incl_tax(&self, form: &ReturnForm) -> Decimal {
        form.get("vads_amount")
            .and_then(|a| a.parse::<u64>().ok())
            .map(from_minor_units)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn get_result<'f>(&self, form: &'f ReturnForm) -> Option<&'f str> {
        form.get("vads_result")
    }

    pub fn get_extra_result<'f>(&self, form: &'f ReturnForm) -> Option<&'f str> {
        form.get("vads_extra_result")
    }

    pub fn get_auth_result<'f>(&self, form: &'f ReturnForm) -> Option<&'f str> {
        form.get("vads_auth_result")
    }

    /// Signed payment form for `order`. `extra` holds any further `vads_*`
    /// fields and overrides what is derived from the order.
    pub fn get_submit_form_populated_with_order(
        &self,
        order: &Order,
        extra: BTreeMap<String, String>,
    ) -> Result<SubmitForm> {
        let mut params = BTreeMap::new();
        let mut put = |name: &str, value: String| {
            params.insert(name.to_string(), value);
        };

        put("vads_order_id", order.number.clone());

        if let Some(user) = &order.user {
            put("vads_cust_name", user.full_name.clone());
            put("vads_cust_email", user.email.clone());
            put("vads_cust_id", user.id.to_string());
        }

        if let Some(billing) = &order.billing_address {
            put("vads_cust_title", billing.title.clone().unwrap_or_default());
            put("vads_cust_address", billing.line1.clone().unwrap_or_default());
            put("vads_cust_city", billing.city.clone().unwrap_or_default());
            put("vads_cust_state", billing.state.clone().unwrap_or_default());
            put("vads_cust_zip", billing.postcode.clone().unwrap_or_default());
            put("vads_cust_country", billing.country.clone());
        }

        if let Some(shipping) = &order.shipping_address {
            put("vads_ship_to_name", shipping.salutation.clone());
            put("vads_ship_to_street", shipping.line1.clone().unwrap_or_default());
            put("vads_ship_to_street2", shipping.line2.clone().unwrap_or_default());
            put("vads_ship_to_city", shipping.city.clone().unwrap_or_default());
            put("vads_ship_to_state", shipping.state.clone().unwrap_or_default());
            put("vads_ship_to_zip", shipping.postcode.clone().unwrap_or_default());
            put("vads_ship_to_country", shipping.country.clone());
        }

        if let Some(urls) = &self.callback_urls {
            put("vads_url_return", urls.return_url.clone());
            put("vads_url_cancel", urls.cancel_url.clone());
            // Shoppers come back with the signed result fields.
            put("vads_return_mode", "POST".to_string());
            if let Some(check_url) = &urls.check_url {
                put("vads_url_check", check_url.clone());
            }
        }

        params.extend(extra);

        let mut form = self.gateway.get_submit_form(order.total_incl_tax, params)?;
        self.gateway.sign(&mut form);
        Ok(form)
    }

    pub fn get_return_form_populated_with_request<I>(&self, fields: I) -> ReturnForm
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.gateway.get_return_form(fields)
    }

    /// Processes data posted back by the gateway, either the shopper
    /// coming back to the store or a server to server notification.
    ///
    /// A transaction is recorded before any check so that every incoming
    /// request can be audited. Returns the transaction when the payment
    /// went through.
    #[instrument(name = "facade::handle_request", skip_all)]
    pub async fn handle_request<I>(&self, fields: I) -> Result<SystemPayTransaction>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let form = self.get_return_form_populated_with_request(fields);

        let order_number = self.get_order_number(&form);
        let total_incl_tax = self.get_total_incl_tax(&form);
        let txn = self
            .save_txn_notification(order_number, total_incl_tax, &form.data)
            .await?;

        if !form.is_valid() {
            let errors = printable_form_errors(&form);
            self.transactions.set_error_message(txn.id, &errors).await?;
            warn!(txn_id = txn.id, %errors, "Incomplete data received from SystemPay");
            return Err(SystemPayError::FormNotValid(format!(
                "The data received are not complete: {errors}. See the transaction record #{} for more details",
                txn.id
            )));
        }

        if !self.gateway.is_signature_valid(&form) {
            let message = format!(
                "Signature not valid. Get '{}' instead of '{}'",
                form.signature().unwrap_or_default(),
                self.gateway.compute_signature(&form.data)
            );
            self.transactions.set_error_message(txn.id, &message).await?;
            warn!(txn_id = txn.id, "Incorrect signature received from SystemPay");
            return Err(SystemPayError::FormNotValid(format!(
                "Incorrect signature. Check SystemPayTransaction #{} for more details",
                txn.id
            )));
        }

        if !txn.is_complete() {
            return Err(match txn.result.as_deref().unwrap_or_default() {
                result_code::CONTACT_BANK => {
                    SystemPayError::PaymentRejected("The shop must contact the bank".to_string())
                }
                result_code::REJECTED => {
                    SystemPayError::PaymentRejected("The payment has been rejected".to_string())
                }
                result_code::PARAM_ERROR => SystemPayError::ParamError {
                    code: self.get_extra_result(&form).map(str::to_string),
                },
                result_code::TECHNICAL_ERROR => SystemPayError::ServerError(
                    "Technical error while processing the payment".to_string(),
                ),
                result_code::CANCELLED => SystemPayError::PaymentCancelled,
                other => SystemPayError::ServerError(format!("Unknown error: {other}")),
            });
        }

        info!(
            txn_id = txn.id,
            order_number = ?txn.order_number,
            auth_result = ?self.get_auth_result(&form),
            "SystemPay payment accepted"
        );
        Ok(txn)
    }

    pub async fn save_submit_txn(
        &self,
        order_number: &str,
        amount: Decimal,
        form: &SubmitForm,
    ) -> Result<SystemPayTransaction> {
        self.save_txn(
            Some(order_number.to_string()),
            amount,
            &form.data,
            TransactionMode::Submit,
        )
        .await
    }

    pub async fn save_txn_notification(
        &self,
        order_number: Option<String>,
        amount: Decimal,
        data: &BTreeMap<String, String>,
    ) -> Result<SystemPayTransaction> {
        self.save_txn(order_number, amount, data, TransactionMode::Return)
            .await
    }

    /// Records an exchange, keeping the full url-encoded request.
    pub async fn save_txn(
        &self,
        order_number: Option<String>,
        amount: Decimal,
        data: &BTreeMap<String, String>,
        mode: TransactionMode,
    ) -> Result<SystemPayTransaction> {
        let field = |name: &str| data.get(name).cloned();
        let txn = NewTransaction {
            mode,
            operation_type: data
                .get("vads_operation_type")
                .map(|op| OperationType::parse(op)),
            trans_id: field("vads_trans_id"),
            trans_date: field("vads_trans_date"),
            order_number,
            amount,
            currency: field("vads_currency"),
            auth_result: field("vads_auth_result"),
            result: field("vads_result"),
            raw_request: url_encode(data),
        };
        Ok(self.transactions.save_transaction(txn).await?)
    }
}

fn url_encode(data: &BTreeMap<String, String>) -> String {
    data.iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
