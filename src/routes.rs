use std::sync::Arc;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{AuthUser, TokenService, LOGIN_TOKEN_TTL_HOURS, REGISTRATION_TOKEN_TTL_HOURS};
use crate::credentials::{self, hash_password, verify_password};
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::filter::{TransactionFilter, TransactionQuery};
use crate::models::*;
use crate::repo::Repo;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::Validation(vec![FieldError::message(format!("Malformed request body: {err}"))]).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::Validation(vec![FieldError::message(format!("Malformed query string: {err}"))]).into()
    }))
    .route("/", web::get().to(index))
    .service(
        web::resource("/users")
            .route(web::get().to(current_user))
            .route(web::post().to(register)),
    )
    .service(web::resource("/users/login").route(web::post().to(login)))
    .service(
        web::resource("/transactions")
            .route(web::get().to(list_transactions))
            .route(web::post().to(create_transaction)),
    )
    .service(
        web::resource("/transactions/{id}")
            .route(web::put().to(update_transaction))
            .route(web::delete().to(delete_transaction)),
    );
}

/// Shared handler state: the store client, token keys and hashing cost.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub tokens: TokenService,
    pub password_cost: u32,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, tokens: TokenService) -> Self {
        Self { repo, tokens, password_cost: credentials::DEFAULT_COST }
    }

    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

struct Registration {
    username: String,
    password: String,
    firstname: String,
    lastname: String,
}

impl RegisterRequest {
    fn validate(self) -> Result<Registration, Vec<FieldError>> {
        let mut errors = Vec::new();
        let firstname = required(self.firstname, "firstname", "First name is required", &mut errors);
        let lastname = required(self.lastname, "lastname", "Last name is required", &mut errors);
        let password = self.password.unwrap_or_default();
        if password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(FieldError::body("password", "Please enter a password with 6 or more characters"));
        }
        let username = required(self.username, "username", "Username is required", &mut errors);
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Registration { username, password, firstname, lastname })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl LoginRequest {
    fn validate(self) -> Result<(String, String), Vec<FieldError>> {
        let mut errors = Vec::new();
        let username = required(self.username, "username", "Username is required", &mut errors);
        let password = required(self.password, "password", "Password is required", &mut errors);
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok((username, password))
    }
}

fn required(value: Option<String>, param: &str, msg: &str, errors: &mut Vec<FieldError>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => {
            errors.push(FieldError::body(param, msg));
            String::new()
        }
    }
}

pub async fn index() -> &'static str {
    "hello"
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    responses(
        (status = 200, description = "Authenticated user without password, or null", body = UserProfile),
        (status = 401, description = "Missing or invalid token", body = ApiErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn current_user(auth: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let profile = data.repo.get_user(auth.id).await?.map(UserProfile::from);
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registered; token valid for 100 hours", body = TokenResponse),
        (status = 400, description = "Validation failed or username taken", body = ApiErrorBody)
    )
)]
pub async fn register(data: web::Data<AppState>, payload: web::Json<RegisterRequest>) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner().validate().map_err(ApiError::Validation)?;
    if data.repo.find_user_by_username(&form.username).await?.is_some() {
        return Err(ApiError::UserExists);
    }

    let cost = data.password_cost;
    let password = form.password;
    let password_hash = web::block(move || hash_password(&password, cost))
        .await?
        .map_err(ApiError::internal)?;

    let user = data.repo.create_user(NewUser {
        username: form.username,
        password_hash,
        firstname: form.firstname,
        lastname: form.lastname,
    }).await?;
    tracing::info!(user_id = %user.id, "registered user");

    let token = data.tokens
        .issue(user.id, None, chrono::Duration::hours(REGISTRATION_TOKEN_TTL_HOURS))
        .map_err(ApiError::internal)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[utoipa::path(
    post,
    path = "/users/login",
    tag = "users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token valid for 24 hours", body = TokenResponse),
        (status = 400, description = "Missing fields or invalid credentials", body = ApiErrorBody)
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let (username, password) = payload.into_inner().validate().map_err(ApiError::Validation)?;

    // Unknown user and wrong password must be indistinguishable.
    let Some(user) = data.repo.find_user_by_username(&username).await? else {
        return Err(ApiError::InvalidCredentials);
    };
    let stored = user.password.clone();
    let matches = web::block(move || verify_password(&password, &stored))
        .await?
        .map_err(ApiError::internal)?;
    if !matches {
        return Err(ApiError::InvalidCredentials);
    }

    let token = data.tokens
        .issue(user.id, Some(user.role), chrono::Duration::hours(LOGIN_TOKEN_TTL_HOURS))
        .map_err(ApiError::internal)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[utoipa::path(
    get,
    path = "/transactions",
    tag = "transactions",
    params(
        ("type" = Option<String>, Query, description = "Exact transaction type, e.g. income or expense"),
        ("date1" = Option<String>, Query, description = "Start date (inclusive); equal to date2 means that exact date"),
        ("date2" = Option<String>, Query, description = "End date (exclusive)")
    ),
    responses(
        (status = 200, description = "Matching transactions", body = [Transaction]),
        (status = 400, description = "Unparseable date", body = ApiErrorBody)
    )
)]
pub async fn list_transactions(data: web::Data<AppState>, query: web::Query<TransactionQuery>) -> Result<HttpResponse, ApiError> {
    let filter = TransactionFilter::from_query(&query).map_err(ApiError::Validation)?;
    let txs = data.repo.list_transactions(&filter).await?;
    Ok(HttpResponse::Ok().json(txs))
}

#[utoipa::path(
    post,
    path = "/transactions",
    tag = "transactions",
    request_body = NewTransaction,
    responses(
        (status = 200, description = "Created transaction", body = Transaction)
    )
)]
pub async fn create_transaction(data: web::Data<AppState>, payload: web::Json<NewTransaction>) -> Result<HttpResponse, ApiError> {
    let tx = data.repo.create_transaction(payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(tx))
}

#[utoipa::path(
    put,
    path = "/transactions/{id}",
    tag = "transactions",
    request_body = TransactionPatch,
    params(("id" = Id, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction after the update, or null if absent", body = Transaction)
    )
)]
pub async fn update_transaction(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<TransactionPatch>,
) -> Result<HttpResponse, ApiError> {
    let updated = data.repo.update_transaction(path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/transactions/{id}",
    tag = "transactions",
    params(("id" = Id, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Removed transaction, or null if absent", body = Transaction)
    )
)]
pub async fn delete_transaction(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let removed = data.repo.delete_transaction(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(removed))
}
