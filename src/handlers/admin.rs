use super::require_admin;
use crate::models::*;
use crate::services::{DiscountService, PaymentAdminService};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

fn ok(data: impl serde::Serialize) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "data": data
    }))
}

#[utoipa::path(
    post,
    path = "/admin/discounts",
    tag = "admin",
    request_body = CreateDiscountRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "优惠码已创建", body = DiscountResponse),
        (status = 400, description = "参数错误"),
        (status = 403, description = "需要管理员权限")
    )
)]
pub async fn create_discount(
    discount_service: web::Data<DiscountService>,
    req: HttpRequest,
    body: web::Json<CreateDiscountRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }
    match discount_service.create_discount(body.into_inner()).await {
        Ok(d) => Ok(ok(d)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/orders/{id}/refund",
    tag = "admin",
    params(("id" = i64, Path, description = "订单ID")),
    request_body = RefundRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "退款成功", body = PaymentActionResponse),
        (status = 402, description = "网关拒绝退款"),
        (status = 409, description = "订单状态不允许退款")
    )
)]
pub async fn refund_order(
    payment_admin_service: web::Data<PaymentAdminService>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: Option<web::Json<RefundRequest>>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    match payment_admin_service.refund(path.into_inner(), body).await {
        Ok(res) => Ok(ok(res)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/orders/{id}/void",
    tag = "admin",
    params(("id" = i64, Path, description = "订单ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已作废", body = PaymentActionResponse),
        (status = 402, description = "网关拒绝作废")
    )
)]
pub async fn void_order(
    payment_admin_service: web::Data<PaymentAdminService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }
    match payment_admin_service.void(path.into_inner()).await {
        Ok(res) => Ok(ok(res)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/orders/{id}/cancel",
    tag = "admin",
    params(("id" = i64, Path, description = "订单ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "订阅已取消", body = PaymentActionResponse),
        (status = 502, description = "网关取消失败")
    )
)]
pub async fn cancel_subscription(
    payment_admin_service: web::Data<PaymentAdminService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }
    match payment_admin_service
        .cancel_subscription(path.into_inner())
        .await
    {
        Ok(res) => Ok(ok(res)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/transactions/{id}/settle",
    tag = "admin",
    params(("id" = i64, Path, description = "交易ID")),
    request_body = SettleRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已结算", body = PaymentActionResponse),
        (status = 404, description = "交易不存在")
    )
)]
pub async fn settle_transaction(
    payment_admin_service: web::Data<PaymentAdminService>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: Option<web::Json<SettleRequest>>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    match payment_admin_service
        .settle(path.into_inner(), body)
        .await
    {
        Ok(res) => Ok(ok(res)),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/discounts", web::post().to(create_discount))
            .route("/orders/{id}/refund", web::post().to(refund_order))
            .route("/orders/{id}/void", web::post().to(void_order))
            .route("/orders/{id}/cancel", web::post().to(cancel_subscription))
            .route("/transactions/{id}/settle", web::post().to(settle_transaction)),
    );
}
