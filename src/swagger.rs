use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{OrderStatus, PaymentMethod, TransactionStatus};
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::checkout::get_current_order,
        handlers::checkout::add_item,
        handlers::checkout::remove_item,
        handlers::checkout::update_item,
        handlers::checkout::apply_discount,
        handlers::checkout::submit_checkout,
        handlers::checkout::confirm_checkout,
        handlers::order::get_orders,
        handlers::order::get_order,
        handlers::discount::lookup_discount,
        handlers::admin::create_discount,
        handlers::admin::refund_order,
        handlers::admin::void_order,
        handlers::admin::cancel_subscription,
        handlers::admin::settle_transaction,
    ),
    components(
        schemas(
            OrderStatus,
            PaymentMethod,
            TransactionStatus,
            Address,
            CardDetails,
            BillingInfo,
            ProductRef,
            CartLine,
            CheckoutItems,
            AddItemRequest,
            RemoveItemRequest,
            UpdateQuantityRequest,
            ApplyDiscountRequest,
            ApplyDiscountResponse,
            CheckoutRequest,
            CheckoutResponse,
            ConfirmResponse,
            OrderResponse,
            LineItemResponse,
            OrderDetailResponse,
            OrderQuery,
            TransactionResponse,
            RefundRequest,
            SettleRequest,
            PaymentActionResponse,
            DiscountLookupResponse,
            CreateDiscountRequest,
            DiscountResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "checkout", description = "Cart and checkout API"),
        (name = "order", description = "Order history API"),
        (name = "discount", description = "Discount lookup API"),
        (name = "admin", description = "Discounts, refunds and settlement"),
    ),
    info(
        title = "Checkout Backend API",
        version = "1.0.0",
        description = "Order and checkout lifecycle REST API"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_checkout_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/checkout"));
        assert!(doc.paths.paths.contains_key("/checkout/confirm"));
        assert!(doc.paths.paths.contains_key("/admin/orders/{id}/refund"));
    }
}
