use serde::Serialize;
use std::collections::BTreeMap;

pub const SIGNATURE_FIELD: &str = "signature";

/// Fields posted to the gateway. Kept sorted by name, which is also the
/// order the signature is computed in.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmitForm {
    pub data: BTreeMap<String, String>,
}

impl SubmitForm {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.data.insert(name.into(), value.into());
    }

    pub fn signature(&self) -> Option<&str> {
        self.get(SIGNATURE_FIELD)
    }

    /// Hidden inputs to render, signature included.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

const REQUIRED_RETURN_FIELDS: [&str; 8] = [
    "vads_site_id",
    "vads_ctx_mode",
    "vads_trans_id",
    "vads_trans_date",
    "vads_order_id",
    "vads_amount",
    "vads_result",
    SIGNATURE_FIELD,
];

/// Fields posted back by the gateway, either through the shopper's browser
/// or server to server.
#[derive(Debug, Clone, Default)]
pub struct ReturnForm {
    pub data: BTreeMap<String, String>,
}

impl ReturnForm {
    pub fn new<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            data: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }

    pub fn signature(&self) -> Option<&str> {
        self.get(SIGNATURE_FIELD)
    }

    pub fn errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        for field in REQUIRED_RETURN_FIELDS {
            match self.get(field) {
                None | Some("") => errors.push(FieldError {
                    field,
                    message: "This field is required.",
                }),
                Some(value) if field == "vads_amount" => {
                    if !value.bytes().all(|b| b.is_ascii_digit()) {
                        errors.push(FieldError {
                            field,
                            message: "Enter a whole number.",
                        });
                    }
                }
                Some(_) => {}
            }
        }
        errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }
}

/// One line summary of the validation errors, stored on the transaction.
pub fn printable_form_errors(form: &ReturnForm) -> String {
    form.errors()
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}
