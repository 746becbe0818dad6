use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Direction of a recorded exchange with the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionMode {
    /// Form we signed and sent the shopper off with.
    Submit,
    /// Data posted back to us (browser return or IPN).
    Return,
}

impl TransactionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionMode::Submit => "SUBMIT",
            TransactionMode::Return => "RETURN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SUBMIT" => Some(TransactionMode::Submit),
            "RETURN" => Some(TransactionMode::Return),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OperationType {
    Debit,
    Credit,
    Other(String),
}

impl OperationType {
    pub fn parse(value: &str) -> Self {
        match value {
            "DEBIT" => OperationType::Debit,
            "CREDIT" => OperationType::Credit,
            other => OperationType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperationType::Debit => "DEBIT",
            OperationType::Credit => "CREDIT",
            OperationType::Other(s) => s,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `vads_result` codes.
pub mod result_code {
    pub const SUCCESS: &str = "00";
    pub const CONTACT_BANK: &str = "02";
    pub const REJECTED: &str = "05";
    pub const CANCELLED: &str = "17";
    pub const PARAM_ERROR: &str = "30";
    pub const TECHNICAL_ERROR: &str = "96";
}

/// Fields of a transaction before it gets an id from the store.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub mode: TransactionMode,
    pub operation_type: Option<OperationType>,
    pub trans_id: Option<String>,
    pub trans_date: Option<String>,
    pub order_number: Option<String>,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub auth_result: Option<String>,
    pub result: Option<String>,
    pub raw_request: String,
}

/// Every exchange with SystemPay, kept for auditing.
#[derive(Debug, Clone, Serialize)]
pub struct SystemPayTransaction {
    pub id: i64,
    pub mode: TransactionMode,
    pub operation_type: Option<OperationType>,
    pub trans_id: Option<String>,
    pub trans_date: Option<String>,
    pub order_number: Option<String>,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub auth_result: Option<String>,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub raw_request: String,
    pub date_created: DateTime<Utc>,
}

impl SystemPayTransaction {
    pub fn from_new(id: i64, new: NewTransaction, date_created: DateTime<Utc>) -> Self {
        Self {
            id,
            mode: new.mode,
            operation_type: new.operation_type,
            trans_id: new.trans_id,
            trans_date: new.trans_date,
            order_number: new.order_number,
            amount: new.amount,
            currency: new.currency,
            auth_result: new.auth_result,
            result: new.result,
            error_message: None,
            raw_request: new.raw_request,
            date_created,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.result.as_deref() == Some(result_code::SUCCESS)
    }

    /// Transaction ids roll over every day, the date makes them unique.
    pub fn reference(&self) -> String {
        format!(
            "{}-{}",
            self.trans_date.as_deref().unwrap_or_default(),
            self.trans_id.as_deref().unwrap_or_default()
        )
    }
}
