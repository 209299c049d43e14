// Bearer-token extraction for proxied routes.
//
// The proxy does not validate tokens itself; it forwards whatever bearer the
// caller presents to the upstream API, which is the authority. Accepting
// `?token=` keeps manual testing easy.

use actix_web::http::header;
use actix_web::HttpRequest;

/// Extract a bearer token from an `Authorization` header value or a `token`
/// query parameter, header first.
pub fn bearer_from_parts(auth_header: Option<&str>, token_param: Option<&str>) -> Option<String> {
    if let Some(raw) = auth_header {
        let raw = raw.trim();
        let prefixed = raw
            .get(..7)
            .map(|p| p.eq_ignore_ascii_case("bearer "))
            .unwrap_or(false);
        if prefixed {
            if let Some(token) = raw.get(7..).map(str::trim).filter(|t| !t.is_empty()) {
                return Some(token.to_string());
            }
        }
    }
    token_param
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub fn bearer_token(req: &HttpRequest, token_param: Option<&str>) -> Option<String> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    bearer_from_parts(header, token_param)
}
