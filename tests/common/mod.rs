#![allow(dead_code)]

use actix_web::{test, web, App};
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;

use systempay_gateway::{
    config::{checkout_cookie_key, AppConfig, SystemPayConfig},
    shop::{InMemoryOrderStore, Order, OrderDraft},
    storage::InMemoryTransactionStore,
    systempay::{self, SystemPayState},
};

pub const ADMIN_TOKEN: &str = "staff-only-token";

pub fn test_config() -> AppConfig {
    AppConfig {
        server_port: 0,
        governor_burst: 5,
        governor_per_second: 2,
        systempay: SystemPayConfig {
            sandbox_mode: true,
            site_id: "12345678".to_string(),
            certificate: "1122334455667788".to_string(),
            action_mode: "INTERACTIVE".to_string(),
            currency: "978".to_string(),
        },
        site_domain: "shop.example.com".to_string(),
        locale_server: false,
        status_cancelled: "Cancelled".to_string(),
        thank_you_url: "/checkout/thank-you/".to_string(),
        basket_url: "/basket/".to_string(),
        admin_token: Some(ADMIN_TOKEN.to_string()),
        checkout_cookie_key: checkout_cookie_key(&"s".repeat(64)).expect("valid cookie key"),
        #[cfg(feature = "sqlite")]
        database_url: None,
    }
}

pub fn test_state() -> SystemPayState {
    SystemPayState::new(
        test_config(),
        Arc::new(InMemoryTransactionStore::new()),
        Arc::new(InMemoryOrderStore::new()),
    )
    .expect("Failed to build SystemPayState")
}

pub async fn setup_test_app(
    state: SystemPayState,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = actix_web::dev::ServiceResponse,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(systempay::configure),
    )
    .await
}

pub fn draft(basket_id: i64) -> OrderDraft {
    OrderDraft {
        basket_id,
        currency: "EUR".to_string(),
        total_incl_tax: dec!(19.99),
        user: None,
        billing_address: None,
        shipping_address: None,
    }
}

pub async fn placed_order(state: &SystemPayState, basket_id: i64) -> Order {
    state
        .orders
        .place_order(draft(basket_id))
        .await
        .expect("Failed to place order")
}

/// Signed notification as SystemPay would post it for `order`.
pub fn notification(
    state: &SystemPayState,
    order: &Order,
    result: &str,
    operation_type: &str,
) -> Vec<(String, String)> {
    let mut data: BTreeMap<String, String> = [
        ("vads_site_id", "12345678"),
        ("vads_ctx_mode", "TEST"),
        ("vads_trans_id", "000042"),
        ("vads_trans_date", "20240101120000"),
        ("vads_amount", "1999"),
        ("vads_currency", "978"),
        ("vads_result", result),
        ("vads_auth_result", "00"),
        ("vads_operation_type", operation_type),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    data.insert("vads_order_id".to_string(), order.number.clone());
    let signature = state.facade.gateway().compute_signature(&data);
    data.insert("signature".to_string(), signature);
    data.into_iter().collect()
}
