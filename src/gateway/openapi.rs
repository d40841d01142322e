//! OpenAPI document
//!
//! Served at `/api-docs/openapi.json`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::types::{
    AccountResponse, ErrorResponse, HealthResponse, TransferBody, TransferResponse,
    TransferStatusResponse,
};

/// HS256 JWT bearer scheme; `sub` is the caller's account id
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Funds Transfer API",
        version = "1.0.0",
        description = "Account-to-account transfers with compensating refunds.",
        license(name = "MIT")
    ),
    servers((url = "http://localhost:8080", description = "Development")),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::create_transfer,
        crate::gateway::handlers::get_transfer,
        crate::gateway::handlers::get_account,
    ),
    components(schemas(
        TransferBody,
        TransferResponse,
        TransferStatusResponse,
        AccountResponse,
        HealthResponse,
        ErrorResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Transfer", description = "Funds transfers (auth required)"),
        (name = "Account", description = "Account queries (auth required)"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
