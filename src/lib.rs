//! # systempay_gateway
//!
//! `systempay_gateway` is an Actix-Web backend that takes storefront orders
//! to the [SystemPay](https://paiement.systempay.fr) hosted payment page and
//! records the outcome.
//!
//! ## ✅ Features
//!
//! - 🔏 HMAC-SHA-256 signed payment forms and signature checks on everything
//!   the gateway posts back
//! - 📬 Server to server payment notifications (IPN) turned into payment
//!   sources on the order
//! - ↩️ Return and cancel pages for the shopper (cancel thaws the basket)
//! - 🧾 Every exchange kept as a transaction record (in memory, or SQLite
//!   with `--features sqlite`)
//! - 🔐 Rate limiting with `actix-governor`
//!
//! ## 🔧 Configuration
//!
//! Start the app like this:
//!
//! ```bash
//! cargo run -- .env.production
//! ```
//!
//! ### Required `.env` values
//!
//! - `SYSTEMPAY_SITE_ID`
//! - `SYSTEMPAY_CERTIFICATE`
//! - `SITE_DOMAIN=shop.example.com`
//! - `CHECKOUT_COOKIE_SECRET` (32+ bytes)
//!
//! ### Optional
//!
//! - `SYSTEMPAY_SANDBOX_MODE=true`
//! - `SYSTEMPAY_ACTION_MODE=INTERACTIVE`
//! - `SYSTEMPAY_CURRENCY=978`
//! - `LOCALE_SERVER=false`
//! - `OSCAR_STATUS_CANCELLED=Cancelled`
//! - `THANK_YOU_URL=/checkout/thank-you/`, `BASKET_URL=/basket/`
//! - `ADMIN_TOKEN`
//! - `SERVER_PORT=6666`, `GOVERNOR_BURST=5`, `GOVERNOR_PER_SECOND=2`
//! - `DATABASE_URL` (only with `--features sqlite`)
//!
//! ## 📚 Modules
//!
//! - [`systempay`](crate::systempay) — gateway, facade and HTTP views
//! - [`shop`](crate::shop) — orders, baskets and payment sources
//! - [`storage`](crate::storage) — transaction records
//!
//! ## 📄 License
//!
//! MIT License © [Holger Trahe](https://github.com/holg)

pub mod config;
pub mod error;
pub mod shop;
pub mod storage;
pub mod systempay;
pub mod utils;
