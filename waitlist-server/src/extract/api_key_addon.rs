//! Utoipa addon for the API key security scheme.

use crate::middleware::access::API_KEY_HEADER;
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify,
};

/// Utoipa addon declaring the `x-api-key` header scheme.
#[derive(Debug)]
pub struct ApiKeyAddon;

impl Modify for ApiKeyAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER.as_str()))),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::docs::ApiDoc;
    use utoipa::OpenApi;

    #[test]
    fn test_api_key_scheme_is_declared() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let scheme = &doc["components"]["securitySchemes"]["api_key"];

        assert_eq!(scheme["type"], "apiKey");
        assert_eq!(scheme["in"], "header");
        assert_eq!(scheme["name"], "x-api-key");
    }
}
