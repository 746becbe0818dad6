use tera::Context;

use super::gateway::Gateway;

/// Template context every SystemPay page is rendered with.
pub fn gateway_context() -> Context {
    let mut ctx = Context::new();
    ctx.insert("SYSTEMPAY_GATEWAY_URL", Gateway::URL);
    ctx
}
