use super::{identity_from_request, session_response};
use crate::models::*;
use crate::services::CheckoutService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    get,
    path = "/checkout/order",
    tag = "checkout",
    params(("X-Session-Id" = Option<String>, Header, description = "会话标识")),
    responses(
        (status = 200, description = "当前订单，没有时为 null", body = OrderDetailResponse)
    )
)]
pub async fn get_current_order(
    checkout_service: web::Data<CheckoutService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let identity = identity_from_request(&req);
    match checkout_service.current_order(&identity).await {
        Ok(order) => Ok(session_response(&identity, order)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/checkout/items",
    tag = "checkout",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "商品已加入订单", body = OrderDetailResponse),
        (status = 400, description = "参数错误"),
        (status = 409, description = "订阅订单不能添加其他商品")
    )
)]
pub async fn add_item(
    checkout_service: web::Data<CheckoutService>,
    req: HttpRequest,
    body: web::Json<AddItemRequest>,
) -> Result<HttpResponse> {
    let identity = identity_from_request(&req);
    match checkout_service.add_item(&identity, body.into_inner()).await {
        Ok(order) => Ok(session_response(&identity, order)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/checkout/items",
    tag = "checkout",
    request_body = RemoveItemRequest,
    responses(
        (status = 200, description = "商品已移除", body = OrderDetailResponse),
        (status = 404, description = "订单中没有该商品")
    )
)]
pub async fn remove_item(
    checkout_service: web::Data<CheckoutService>,
    req: HttpRequest,
    body: web::Json<RemoveItemRequest>,
) -> Result<HttpResponse> {
    let identity = identity_from_request(&req);
    match checkout_service.remove_item(&identity, body.into_inner()).await {
        Ok(order) => Ok(session_response(&identity, order)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/checkout/items",
    tag = "checkout",
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "数量已更新", body = OrderDetailResponse),
        (status = 404, description = "订单中没有该商品")
    )
)]
pub async fn update_item(
    checkout_service: web::Data<CheckoutService>,
    req: HttpRequest,
    body: web::Json<UpdateQuantityRequest>,
) -> Result<HttpResponse> {
    let identity = identity_from_request(&req);
    match checkout_service
        .update_item_quantity(&identity, body.into_inner())
        .await
    {
        Ok(order) => Ok(session_response(&identity, order)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/checkout/discount",
    tag = "checkout",
    request_body = ApplyDiscountRequest,
    responses(
        (status = 200, description = "无效的优惠码不会报错，applied 为 false", body = ApplyDiscountResponse)
    )
)]
pub async fn apply_discount(
    checkout_service: web::Data<CheckoutService>,
    req: HttpRequest,
    body: web::Json<ApplyDiscountRequest>,
) -> Result<HttpResponse> {
    let identity = identity_from_request(&req);
    match checkout_service.apply_discount(&identity, body.into_inner()).await {
        Ok(res) => Ok(session_response(&identity, res)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/checkout",
    tag = "checkout",
    request_body = CheckoutRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已保存支付方式，或免费订单已完成", body = CheckoutResponse),
        (status = 401, description = "需要登录"),
        (status = 402, description = "支付方式被拒绝"),
        (status = 502, description = "支付网关不可用")
    )
)]
pub async fn submit_checkout(
    checkout_service: web::Data<CheckoutService>,
    req: HttpRequest,
    body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse> {
    let identity = identity_from_request(&req);
    match checkout_service.submit(&identity, body.into_inner()).await {
        Ok(res) => Ok(session_response(&identity, res)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/checkout/confirm",
    tag = "checkout",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "支付成功，订单完成", body = ConfirmResponse),
        (status = 402, description = "支付被拒绝，可重试"),
        (status = 409, description = "订单不在待支付状态"),
        (status = 422, description = "优惠码已失效")
    )
)]
pub async fn confirm_checkout(
    checkout_service: web::Data<CheckoutService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let identity = identity_from_request(&req);
    match checkout_service.confirm(&identity).await {
        Ok(res) => Ok(session_response(&identity, res)),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn checkout_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/checkout")
            .route("", web::post().to(submit_checkout))
            .route("/order", web::get().to(get_current_order))
            .route("/items", web::post().to(add_item))
            .route("/items", web::delete().to(remove_item))
            .route("/items", web::put().to(update_item))
            .route("/discount", web::post().to(apply_discount))
            .route("/confirm", web::post().to(confirm_checkout)),
    );
}
