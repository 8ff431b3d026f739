use super::current_user;
use crate::services::DiscountService;
use actix_web::{HttpRequest, HttpResponse, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/discounts/{code}",
    tag = "discount",
    params(("code" = String, Path, description = "优惠码，不区分大小写")),
    responses(
        (status = 200, description = "优惠码信息；无效时金额为 0", body = DiscountLookupResponse)
    )
)]
pub async fn lookup_discount(
    discount_service: web::Data<DiscountService>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = current_user(&req).map(|u| u.id);
    let info = discount_service.lookup(&path, user_id).await;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": info
    })))
}

pub fn discount_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/discounts").route("/{code}", web::get().to(lookup_discount)));
}
