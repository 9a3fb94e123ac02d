use crate::error::{ApiErrorBody, FieldError};
use crate::models::{NewTransaction, Transaction, TransactionPatch, UserProfile};
use crate::routes::{LoginRequest, RegisterRequest, TokenResponse};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::current_user,
        crate::routes::register,
        crate::routes::login,
        crate::routes::list_transactions,
        crate::routes::create_transaction,
        crate::routes::update_transaction,
        crate::routes::delete_transaction,
    ),
    components(schemas(
        UserProfile, Transaction, NewTransaction, TransactionPatch,
        RegisterRequest, LoginRequest, TokenResponse, ApiErrorBody, FieldError
    )),
    modifiers(&BearerScheme),
    tags(
        (name = "users", description = "Registration, login and profile"),
        (name = "transactions", description = "Income and expense records"),
    )
)]
pub struct ApiDoc;

struct BearerScheme;

impl Modify for BearerScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}
