// tests/systempay_flow.rs

use actix_web::{cookie::time::Duration, http::header, http::StatusCode, test};
use rust_decimal_macros::dec;
use serde_json::json;

use systempay_gateway::{
    shop::BasketStatus,
    systempay::{gateway::Gateway, transaction::TransactionMode, views::ADMIN_TOKEN_HEADER},
    utils::checkout_cookie::CHECKOUT_COOKIE_NAME,
};

mod common;
use common::{notification, placed_order, setup_test_app, test_state, ADMIN_TOKEN};

fn location(resp: &actix_web::dev::ServiceResponse) -> String {
    resp.headers()
        .get(header::LOCATION)
        .expect("Redirect location header missing")
        .to_str()
        .unwrap()
        .to_string()
}

#[actix_web::test]
async fn test_preview_does_not_place_the_order() {
    let state = test_state();
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/systempay/preview/")
        .set_json(json!({
            "basket_id": 1,
            "currency": "EUR",
            "total_incl_tax": "19.99",
            "user": {"id": 3, "full_name": "Ada Lovelace", "email": "ada@example.com"},
            "billing_address": {"title": "Ms", "line1": "1 Rue de la Paix", "city": "Paris", "country": "FR"},
            "shipping_address": {"salutation": "Ms Lovelace", "line1": "2 Quai Branly", "city": "Paris", "country": "FR"}
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["preview"], true);
    assert_eq!(body["payment_method"], "SystemPay");
    assert_eq!(body["total_incl_tax"], "19.99");
    assert_eq!(body["user"]["full_name"], "Ada Lovelace");
    assert_eq!(body["billing_address"]["line1"], "1 Rue de la Paix");
    assert_eq!(body["billing_address"]["country"], "FR");
    assert_eq!(body["shipping_address"]["salutation"], "Ms Lovelace");
    assert_eq!(body["shipping_address"]["line1"], "2 Quai Branly");
    assert!(state.orders.get_order(1).await.unwrap().is_none());
}

#[actix_web::test]
async fn test_place_order_then_secure_redirect() {
    let state = test_state();
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/systempay/preview/")
        .set_json(json!({
            "action": "place_order",
            "basket_id": 7,
            "currency": "EUR",
            "total_incl_tax": "19.99",
            "user": {"id": 3, "full_name": "Ada Lovelace", "email": "ada@example.com"}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/systempay/secure-redirect/");
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == CHECKOUT_COOKIE_NAME)
        .expect("checkout cookie missing")
        .into_owned();
    assert_ne!(cookie.value(), "1", "order id must not travel in clear");

    let basket = state.orders.get_basket(7).await.unwrap().unwrap();
    assert_eq!(basket.status, BasketStatus::Frozen);

    let req = test::TestRequest::get()
        .uri("/systempay/secure-redirect/")
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cleared = resp
        .response()
        .cookies()
        .find(|c| c.name() == CHECKOUT_COOKIE_NAME)
        .expect("checkout cookie should be cleared");
    assert_eq!(cleared.max_age(), Some(Duration::ZERO));

    let page = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(page.contains(Gateway::URL));
    assert!(page.contains(r#"name="vads_order_id" value="100001""#));
    assert!(page.contains(r#"name="vads_amount" value="1999""#));
    assert!(page.contains(r#"name="vads_cust_email" value="ada@example.com""#));
    assert!(page.contains(
        r#"name="vads_url_check" value="https:&#x2F;&#x2F;shop.example.com&#x2F;systempay&#x2F;handle-ipn&#x2F;""#
    ));
    assert!(page.contains(r#"name="signature""#));

    let submitted = state
        .transactions
        .latest_for_order(TransactionMode::Submit, "100001")
        .await
        .unwrap()
        .expect("submit transaction recorded");
    assert_eq!(submitted.amount, dec!(19.99));
}

#[actix_web::test]
async fn test_secure_redirect_without_order_is_not_found() {
    let app = setup_test_app(test_state()).await;
    let req = test::TestRequest::get()
        .uri("/systempay/secure-redirect/?order_number=100001")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_admin_can_force_secure_redirect_order() {
    let state = test_state();
    let order = placed_order(&state, 1).await;
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::get()
        .uri(&format!("/systempay/secure-redirect/?order_number={}", order.number))
        .insert_header((ADMIN_TOKEN_HEADER, ADMIN_TOKEN))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/systempay/secure-redirect/?order_number=100001")
        .insert_header((ADMIN_TOKEN_HEADER, "wrong"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_ipn_debit_adds_payment_source_once() {
    let state = test_state();
    let order = placed_order(&state, 1).await;
    let app = setup_test_app(state.clone()).await;

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/systempay/handle-ipn/")
            .set_form(notification(&state, &order, "00", "DEBIT"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let order = state.orders.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.sources.len(), 1);
    let source = &order.sources[0];
    assert_eq!(source.source_type.code, "systempay");
    assert_eq!(source.amount_debited, dec!(19.99));
    assert_eq!(source.amount_refunded, dec!(0));
    assert_eq!(source.reference, "20240101120000-000042");
}

#[actix_web::test]
async fn test_concurrent_duplicate_ipns_add_one_source() {
    let state = test_state();
    let order = placed_order(&state, 1).await;
    let app = setup_test_app(state.clone()).await;

    let first = test::TestRequest::post()
        .uri("/systempay/handle-ipn/")
        .set_form(notification(&state, &order, "00", "DEBIT"))
        .to_request();
    let second = test::TestRequest::post()
        .uri("/systempay/handle-ipn/")
        .set_form(notification(&state, &order, "00", "DEBIT"))
        .to_request();
    let (first, second) = futures::join!(
        test::call_service(&app, first),
        test::call_service(&app, second)
    );
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);

    let order = state.orders.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.sources.len(), 1);
}

#[actix_web::test]
async fn test_ipn_credit_records_refund() {
    let state = test_state();
    let order = placed_order(&state, 1).await;
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/systempay/handle-ipn/")
        .set_form(notification(&state, &order, "00", "CREDIT"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let order = state.orders.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.sources[0].amount_refunded, dec!(19.99));
    assert_eq!(order.sources[0].amount_debited, dec!(0));
}

#[actix_web::test]
async fn test_ipn_refusals_are_bad_requests() {
    let state = test_state();
    let order = placed_order(&state, 1).await;
    let app = setup_test_app(state.clone()).await;

    let mut tampered = notification(&state, &order, "00", "DEBIT");
    for (k, v) in tampered.iter_mut() {
        if k == "vads_amount" {
            *v = "1".to_string();
        }
    }
    let req = test::TestRequest::post()
        .uri("/systempay/handle-ipn/")
        .set_form(tampered)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).starts_with("Incorrect signature"));

    let req = test::TestRequest::post()
        .uri("/systempay/handle-ipn/")
        .set_form(notification(&state, &order, "05", "DEBIT"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = test::read_body(resp).await;
    assert_eq!(body, "The payment has been rejected");

    let req = test::TestRequest::post()
        .uri("/systempay/handle-ipn/")
        .set_form(notification(&state, &order, "00", "VERIFY"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = test::read_body(resp).await;
    assert_eq!(body, "Unknown operation type 'VERIFY'");

    let order = state.orders.get_order(order.id).await.unwrap().unwrap();
    assert!(order.sources.is_empty());
}

#[actix_web::test]
async fn test_ipn_for_unknown_order_is_acknowledged() {
    let state = test_state();
    let ghost = placed_order(&state, 1).await;
    state.orders.delete_order(ghost.id).await.unwrap();
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/systempay/handle-ipn/")
        .set_form(notification(&state, &ghost, "00", "DEBIT"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_ipn_get_is_admin_only() {
    let state = test_state();
    let order = placed_order(&state, 1).await;
    let app = setup_test_app(state.clone()).await;

    let query: String = notification(&state, &order, "00", "DEBIT")
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let uri = format!("/systempay/handle-ipn/?{query}");

    let req = test::TestRequest::get().uri(&uri).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    let unchanged = state.orders.get_order(order.id).await.unwrap().unwrap();
    assert!(unchanged.sources.is_empty());

    let req = test::TestRequest::get()
        .uri(&uri)
        .insert_header((ADMIN_TOKEN_HEADER, ADMIN_TOKEN))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    let paid = state.orders.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(paid.sources.len(), 1);
}

#[actix_web::test]
async fn test_return_reports_pending_then_success() {
    let state = test_state();
    let order = placed_order(&state, 1).await;
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::get()
        .uri(&format!("/systempay/return/?vads_order_id={}", order.number))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let target = location(&resp);
    assert!(target.starts_with("/checkout/thank-you/?order_number=100001&status=pending"));

    let req = test::TestRequest::post()
        .uri("/systempay/handle-ipn/")
        .set_form(notification(&state, &order, "00", "DEBIT"))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/systempay/return/")
        .set_form([("vads_order_id", order.number.as_str())])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(location(&resp).contains("status=success"));
    assert!(resp
        .response()
        .cookies()
        .any(|c| c.name() == CHECKOUT_COOKIE_NAME));
}

#[actix_web::test]
async fn test_return_after_rejection() {
    let state = test_state();
    let order = placed_order(&state, 1).await;
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/systempay/handle-ipn/")
        .set_form(notification(&state, &order, "05", "DEBIT"))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri(&format!("/systempay/return/?vads_order_id={}", order.number))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(location(&resp).contains("status=rejected"));
}

#[actix_web::test]
async fn test_return_for_missing_orders() {
    let app = setup_test_app(test_state()).await;

    let req = test::TestRequest::get().uri("/systempay/return/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "No order found");

    let req = test::TestRequest::get()
        .uri("/systempay/return/?vads_order_id=999")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "The page requested seems outdated");
}

#[actix_web::test]
async fn test_cancel_deletes_order_and_thaws_basket() {
    let state = test_state();
    let order = placed_order(&state, 4).await;
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/systempay/cancel/")
        .set_form(notification(&state, &order, "17", "DEBIT"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(location(&resp).starts_with("/basket/?status=cancelled"));

    assert!(state.orders.get_order(order.id).await.unwrap().is_none());
    let basket = state.orders.get_basket(4).await.unwrap().unwrap();
    assert_eq!(basket.status, BasketStatus::Open);
}

#[actix_web::test]
async fn test_cancel_without_signature_keeps_the_order() {
    let state = test_state();
    let order = placed_order(&state, 4).await;
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/systempay/cancel/")
        .set_form([("vads_order_id", order.number.as_str())])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let mut forged = notification(&state, &order, "17", "DEBIT");
    for (name, value) in forged.iter_mut() {
        if name == "vads_amount" {
            *value = "1".to_string();
        }
    }
    let req = test::TestRequest::get()
        .uri(&format!(
            "/systempay/cancel/?{}",
            forged
                .iter()
                .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&")
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(state.orders.get_order(order.id).await.unwrap().is_some());
    let basket = state.orders.get_basket(4).await.unwrap().unwrap();
    assert_eq!(basket.status, BasketStatus::Frozen);
}

#[actix_web::test]
async fn test_cancel_by_admin_needs_no_signature() {
    let state = test_state();
    let order = placed_order(&state, 4).await;
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::get()
        .uri(&format!("/systempay/cancel/?order_id={}", order.id))
        .insert_header((ADMIN_TOKEN_HEADER, ADMIN_TOKEN))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(state.orders.get_order(order.id).await.unwrap().is_none());
}

#[actix_web::test]
async fn test_cancel_refuses_paid_orders() {
    let state = test_state();
    let order = placed_order(&state, 4).await;
    let app = setup_test_app(state.clone()).await;

    let req = test::TestRequest::post()
        .uri("/systempay/handle-ipn/")
        .set_form(notification(&state, &order, "00", "DEBIT"))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/systempay/cancel/")
        .set_form(notification(&state, &order, "17", "DEBIT"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(state.orders.get_order(order.id).await.unwrap().is_some());
}

#[actix_web::test]
async fn test_health() {
    let app = setup_test_app(test_state()).await;
    let req = test::TestRequest::get().uri("/systempay/health").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
}
