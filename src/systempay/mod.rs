//! # SystemPay
//!
//! Payment through the SystemPay hosted payment page: signed payment
//! forms, the shopper's return and cancel pages, and the server to server
//! payment notification (IPN).
//!
//! Mount the namespace onto the storefront's `App` with [`configure`]:
//!
//! ```ignore
//! App::new()
//!     .app_data(web::Data::new(systempay_state))
//!     .configure(systempay::configure)
//! ```

pub mod context;
pub mod facade;
pub mod forms;
pub mod gateway;
pub mod transaction;
pub mod views;

use actix_web::web;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::Result;
use crate::shop::OrderStore;
use crate::storage::TransactionStore;
use facade::{CallbackUrls, Facade};
use gateway::Gateway;

/// Paths of the `/systempay/` namespace.
pub mod urls {
    pub const PREFIX: &str = "/systempay";
    pub const PREVIEW: &str = "/systempay/preview/";
    pub const SECURE_REDIRECT: &str = "/systempay/secure-redirect/";
    pub const RETURN: &str = "/systempay/return/";
    pub const CANCEL: &str = "/systempay/cancel/";
    pub const HANDLE_IPN: &str = "/systempay/handle-ipn/";
}

/// Shared by every handler of the namespace.
#[derive(Clone)]
pub struct SystemPayState {
    pub config: AppConfig,
    pub facade: Facade,
    pub transactions: Arc<dyn TransactionStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl SystemPayState {
    pub fn new(
        config: AppConfig,
        transactions: Arc<dyn TransactionStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Result<Self> {
        let gateway = Arc::new(Gateway::from_config(&config.systempay)?);
        let facade = Facade::new(gateway, transactions.clone())
            .with_callback_urls(CallbackUrls::from_config(&config));
        Ok(Self {
            config,
            facade,
            transactions,
            orders,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope(urls::PREFIX)
            .route("/health", web::get().to(views::health_check))
            .route("/preview/", web::post().to(views::place_order))
            .route("/secure-redirect/", web::get().to(views::secure_redirect))
            .service(
                web::resource("/return/")
                    .route(web::get().to(views::return_response_get))
                    .route(web::post().to(views::return_response_post)),
            )
            .service(
                web::resource("/cancel/")
                    .route(web::get().to(views::cancel_response_get))
                    .route(web::post().to(views::cancel_response_post)),
            )
            .service(
                web::resource("/handle-ipn/")
                    .route(web::get().to(views::handle_ipn_get))
                    .route(web::post().to(views::handle_ipn_post)),
            ),
    );
}
