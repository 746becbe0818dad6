use actix_web::{http::header, web, HttpRequest, HttpResponse, HttpResponseBuilder};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tera::Tera;
use tracing::{error, info, instrument, warn};

use super::context::gateway_context;
use super::transaction::{OperationType, TransactionMode};
use super::{urls, SystemPayState};
use crate::config::AppConfig;
use crate::error::{Result, SystemPayError};
use crate::shop::{
    BillingAddress, Customer, Order, OrderDraft, PaymentSource, ShippingAddress, SourceType,
};
use crate::utils::checkout_cookie::{
    clear_checkout_order_id, read_checkout_order_id, set_checkout_order_id,
};
use rust_decimal::Decimal;

type HmacSha256 = Hmac<Sha256>;

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

const SECURE_REDIRECT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Redirecting to the secure payment page</title>
</head>
<body onload="document.forms['systempay'].submit()">
  <p>Order {{ order.number }}: you are being redirected to the secure payment page.</p>
  <form id="systempay" name="systempay" method="post" action="{{ SYSTEMPAY_GATEWAY_URL }}">
    {% for field in submit_form %}<input type="hidden" name="{{ field.name }}" value="{{ field.value }}">
    {% endfor %}<noscript><button type="submit">Proceed to payment</button></noscript>
  </form>
</body>
</html>
"#;

const MSG_NO_RESPONSE: &str = "No response received from your bank for the moment. Be patient, we'll get back to you as soon as we receive it.";
const MSG_VALIDATED: &str = "Your payment has been successfully validated.";
const MSG_REJECTED: &str = "Your payment has been rejected for the reason. You will not be charged. Contact the support for more details.";
const MSG_CANCELLED: &str = "The transaction has be canceled";

#[derive(Serialize)]
struct HiddenField<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(flatten)]
    pub order: OrderDraft,
}

#[derive(Debug, Serialize)]
pub struct OrderPreview {
    pub preview: bool,
    pub basket_id: i64,
    pub currency: String,
    pub total_incl_tax: Decimal,
    pub user: Option<Customer>,
    pub billing_address: Option<BillingAddress>,
    pub shipping_address: Option<ShippingAddress>,
    pub payment_method: &'static str,
    pub gateway_url: &'static str,
}

/// Trusted staff may force which order a page works on. Without a
/// configured token nobody qualifies.
pub fn is_admin(req: &HttpRequest, config: &AppConfig) -> bool {
    let Some(expected) = config.admin_token.as_deref() else {
        return false;
    };
    req.headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|given| tokens_match(given, expected))
}

/// Compares through HMAC verification so the time taken does not depend
/// on how many leading bytes match.
fn tokens_match(given: &str, expected: &str) -> bool {
    let Ok(mut reference) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    let mut candidate = reference.clone();
    reference.update(expected.as_bytes());
    candidate.update(given.as_bytes());
    candidate.verify_slice(&reference.finalize().into_bytes()).is_ok()
}

fn redirect(location: &str) -> HttpResponseBuilder {
    let mut resp = HttpResponse::Found();
    resp.append_header((header::LOCATION, location.to_string()));
    resp
}

fn with_query(base: &str, pairs: &[(&str, &str)]) -> String {
    let query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{query}")
}

fn no_order_found() -> SystemPayError {
    SystemPayError::OrderNotFound("No order found".to_string())
}

/// Order picked by an admin through `order_number` or `order_id`.
async fn admin_override(
    state: &SystemPayState,
    req: &HttpRequest,
    query: &HashMap<String, String>,
) -> Result<Option<Order>> {
    if !is_admin(req, &state.config) {
        return Ok(None);
    }
    let order = if let Some(number) = query.get("order_number") {
        state.orders.get_order_by_number(number).await?
    } else if let Some(id) = query.get("order_id") {
        let id = id.parse::<i64>().map_err(|_| no_order_found())?;
        state.orders.get_order(id).await?
    } else {
        return Ok(None);
    };
    order.map(Some).ok_or_else(no_order_found)
}

/// Order a shopper comes back for, named by `vads_order_id` in the posted
/// data or the query string.
async fn returning_order(
    state: &SystemPayState,
    req: &HttpRequest,
    query: &HashMap<String, String>,
    post: &HashMap<String, String>,
) -> Result<Order> {
    if let Some(order) = admin_override(state, req, query).await? {
        return Ok(order);
    }
    let order_number = post
        .get("vads_order_id")
        .or_else(|| query.get("vads_order_id"))
        .filter(|n| !n.is_empty())
        .ok_or_else(no_order_found)?;
    state
        .orders
        .get_order_by_number(order_number)
        .await?
        .ok_or_else(|| SystemPayError::OrderNotFound("The page requested seems outdated".to_string()))
}

/// Preview of the order, or placing it when `action` is `place_order`.
///
/// Payment is not taken here: the notification from SystemPay records it.
#[instrument(name = "handler::place_order", skip_all)]
pub async fn place_order(
    state: web::Data<SystemPayState>,
    body: web::Json<PlaceOrderRequest>,
) -> Result<HttpResponse> {
    let PlaceOrderRequest { action, order } = body.into_inner();

    if action.as_deref() != Some("place_order") {
        return Ok(HttpResponse::Ok().json(OrderPreview {
            preview: true,
            basket_id: order.basket_id,
            currency: order.currency,
            total_incl_tax: order.total_incl_tax,
            user: order.user,
            billing_address: order.billing_address,
            shipping_address: order.shipping_address,
            payment_method: "SystemPay",
            gateway_url: super::gateway::Gateway::URL,
        }));
    }

    let order = state.orders.place_order(order).await?;
    info!(order_number = %order.number, "Order placed, redirecting to SystemPay");

    let mut resp = redirect(urls::SECURE_REDIRECT);
    set_checkout_order_id(
        &mut resp,
        &state.config.checkout_cookie_key,
        order.id,
        !state.config.locale_server,
    );
    Ok(resp.finish())
}

/// Page with the signed payment form, submitted straight to the gateway.
#[instrument(name = "handler::secure_redirect", skip_all)]
pub async fn secure_redirect(
    req: HttpRequest,
    state: web::Data<SystemPayState>,
    query: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse> {
    let order = match admin_override(&state, &req, &query).await? {
        Some(order) => order,
        None => {
            let order_id = read_checkout_order_id(&req, &state.config.checkout_cookie_key)
                .ok_or_else(no_order_found)?;
            state
                .orders
                .get_order(order_id)
                .await?
                .ok_or_else(no_order_found)?
        }
    };

    let form = state
        .facade
        .get_submit_form_populated_with_order(&order, BTreeMap::new())?;
    state
        .facade
        .save_submit_txn(&order.number, order.total_incl_tax, &form)
        .await?;

    let mut ctx = gateway_context();
    ctx.insert("order", &order);
    ctx.insert(
        "submit_form",
        &form
            .fields()
            .map(|(name, value)| HiddenField { name, value })
            .collect::<Vec<_>>(),
    );
    let page = Tera::one_off(SECURE_REDIRECT_TEMPLATE, &ctx, true)?;

    info!(order_number = %order.number, "Rendered secure redirect to SystemPay");
    let mut resp = HttpResponse::Ok();
    clear_checkout_order_id(&mut resp);
    Ok(resp.content_type("text/html; charset=utf-8").body(page))
}

async fn return_response(
    req: HttpRequest,
    state: web::Data<SystemPayState>,
    query: HashMap<String, String>,
    post: HashMap<String, String>,
) -> Result<HttpResponse> {
    let order = returning_order(&state, &req, &query, &post).await?;

    let latest = state
        .transactions
        .latest_for_order(TransactionMode::Return, &order.number)
        .await?;
    let (status, message) = match latest {
        None => ("pending", MSG_NO_RESPONSE),
        Some(txn) if txn.is_complete() => ("success", MSG_VALIDATED),
        Some(_) => ("rejected", MSG_REJECTED),
    };
    info!(order_number = %order.number, status, "Shopper back from SystemPay");

    let location = with_query(
        &state.config.thank_you_url,
        &[
            ("order_number", order.number.as_str()),
            ("status", status),
            ("message", message),
        ],
    );
    let mut resp = redirect(&location);
    set_checkout_order_id(
        &mut resp,
        &state.config.checkout_cookie_key,
        order.id,
        !state.config.locale_server,
    );
    Ok(resp.finish())
}

#[instrument(name = "handler::return_response", skip_all)]
pub async fn return_response_get(
    req: HttpRequest,
    state: web::Data<SystemPayState>,
    query: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse> {
    return_response(req, state, query.into_inner(), HashMap::new()).await
}

#[instrument(name = "handler::return_response", skip_all)]
pub async fn return_response_post(
    req: HttpRequest,
    state: web::Data<SystemPayState>,
    query: web::Query<HashMap<String, String>>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse> {
    return_response(req, state, query.into_inner(), form.into_inner()).await
}

async fn cancel_response(
    req: HttpRequest,
    state: web::Data<SystemPayState>,
    query: HashMap<String, String>,
    post: HashMap<String, String>,
) -> Result<HttpResponse> {
    if !is_admin(&req, &state.config) {
        let fields = if post.is_empty() { &query } else { &post };
        let form = state.facade.gateway().get_return_form(fields.clone());
        if !state.facade.gateway().is_signature_valid(&form) {
            warn!("Cancel request without a valid SystemPay signature");
            return Err(SystemPayError::FormNotValid(
                "Incorrect signature on the cancel request".to_string(),
            ));
        }
    }
    let order = returning_order(&state, &req, &query, &post).await?;

    if !order.sources.is_empty() {
        return Err(SystemPayError::Payment(format!(
            "Order #{} has already been paid",
            order.number
        )));
    }

    state
        .orders
        .set_status(order.id, &state.config.status_cancelled)
        .await?;
    state.orders.delete_order(order.id).await?;
    state.orders.thaw_basket(order.basket_id).await?;
    warn!(order_number = %order.number, "Payment cancelled, order deleted and basket thawed");

    let location = with_query(
        &state.config.basket_url,
        &[("status", "cancelled"), ("message", MSG_CANCELLED)],
    );
    Ok(redirect(&location).finish())
}

#[instrument(name = "handler::cancel_response", skip_all)]
pub async fn cancel_response_get(
    req: HttpRequest,
    state: web::Data<SystemPayState>,
    query: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse> {
    cancel_response(req, state, query.into_inner(), HashMap::new()).await
}

#[instrument(name = "handler::cancel_response", skip_all)]
pub async fn cancel_response_post(
    req: HttpRequest,
    state: web::Data<SystemPayState>,
    query: web::Query<HashMap<String, String>>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse> {
    cancel_response(req, state, query.into_inner(), form.into_inner()).await
}

/// Records the payment notified by the gateway on the order.
async fn handle_ipn(state: &SystemPayState, fields: HashMap<String, String>) -> Result<()> {
    let txn = state.facade.handle_request(fields).await?;
    let order_number = txn.order_number.clone().unwrap_or_default();

    let order = state
        .orders
        .get_order_by_number(&order_number)
        .await?
        .ok_or_else(|| {
            SystemPayError::OrderNotFound(format!("Unable to retrieve Order #{order_number}"))
        })?;

    let reference = txn.reference();
    let (amount_debited, amount_refunded) = match &txn.operation_type {
        Some(OperationType::Debit) => (txn.amount, Decimal::ZERO),
        Some(OperationType::Credit) => (Decimal::ZERO, txn.amount),
        other => {
            return Err(SystemPayError::Payment(format!(
                "Unknown operation type '{}'",
                other.as_ref().map(|op| op.as_str()).unwrap_or_default()
            )))
        }
    };
    let source = PaymentSource {
        source_type: SourceType::systempay(),
        currency: txn.currency.clone(),
        amount_allocated: Decimal::ZERO,
        amount_debited,
        amount_refunded,
        reference: reference.clone(),
    };
    if state.orders.save_payment_details(order.id, vec![source]).await? == 0 {
        info!(%order_number, %reference, "Notification already recorded");
    } else {
        info!(%order_number, txn_id = txn.id, "Payment details saved");
    }
    Ok(())
}

async fn ipn_response(state: &SystemPayState, fields: HashMap<String, String>) -> Result<HttpResponse> {
    match handle_ipn(state, fields).await {
        Ok(()) => Ok(HttpResponse::Ok().finish()),
        Err(e) if e.is_payment_error() => {
            warn!(error = %e, "Payment notification refused");
            Ok(HttpResponse::BadRequest().body(e.to_string()))
        }
        Err(SystemPayError::OrderNotFound(message)) => {
            error!("{message}");
            Ok(HttpResponse::Ok().finish())
        }
        Err(e) => Err(e),
    }
}

/// Server to server payment notification.
#[instrument(name = "handler::handle_ipn", skip_all)]
pub async fn handle_ipn_post(
    state: web::Data<SystemPayState>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse> {
    ipn_response(&state, form.into_inner()).await
}

/// Admins may replay a notification from the query string.
#[instrument(name = "handler::handle_ipn", skip_all)]
pub async fn handle_ipn_get(
    req: HttpRequest,
    state: web::Data<SystemPayState>,
    query: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse> {
    if is_admin(&req, &state.config) {
        return ipn_response(&state, query.into_inner()).await;
    }
    Ok(HttpResponse::Ok().finish())
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
