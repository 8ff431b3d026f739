use actix_cors::Cors;
use actix_web::http::header::HeaderName;

pub fn create_cors() -> Cors {
    Cors::default()
        .allowed_origin_fn(|_, _req_head| {
            // 在生产环境中应该限制允许的域名
            true
        })
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_any_header()
        // 前端需要读取服务端分配的会话标识
        .expose_headers(vec![HeaderName::from_static("x-session-id")])
        .supports_credentials()
        .max_age(3600)
}
