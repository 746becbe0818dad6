// --- File: src/utils/checkout_cookie.rs ---

//! The order being checked out, remembered in a private (encrypted and
//! authenticated) cookie between placing the order and leaving for the
//! payment page.

use actix_web::cookie::{time::Duration, Cookie, CookieJar, Key as CookieSignKey, SameSite};
use actix_web::{HttpRequest, HttpResponseBuilder};

pub const CHECKOUT_COOKIE_NAME: &str = "systempay_checkout_order";

pub fn read_checkout_order_id(req: &HttpRequest, key: &CookieSignKey) -> Option<i64> {
    let cookie = req.cookie(CHECKOUT_COOKIE_NAME)?;
    let mut jar = CookieJar::new();
    jar.add_original(cookie);
    // A forged or stale cookie fails decryption and reads as absent.
    let decrypted = jar.private(key).get(CHECKOUT_COOKIE_NAME)?;
    decrypted.value().parse().ok()
}

pub fn set_checkout_order_id(
    resp: &mut HttpResponseBuilder,
    key: &CookieSignKey,
    order_id: i64,
    secure: bool,
) {
    let mut jar = CookieJar::new();
    jar.private_mut(key).add(
        Cookie::build(CHECKOUT_COOKIE_NAME, order_id.to_string())
            .path("/")
            .secure(secure)
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(Duration::hours(1))
            .finish(),
    );
    for cookie in jar.delta() {
        resp.cookie(cookie.clone());
    }
}

pub fn clear_checkout_order_id(resp: &mut HttpResponseBuilder) {
    resp.cookie(
        Cookie::build(CHECKOUT_COOKIE_NAME, "")
            .path("/")
            .max_age(Duration::ZERO)
            .finish(),
    );
}
