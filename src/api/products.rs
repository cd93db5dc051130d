use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bigdecimal::{RoundingMode, Signed};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::auth::MerchantKey;
use super::{api_error, load_merchant, AppState};
use crate::database::product_repository::{NewProduct, Product};
use crate::error::{AppError, DomainError, ValidationError};
use crate::middleware::error::success_response;
use crate::services::currency_converter::{self, NATIVE_DECIMALS};
use crate::services::validation::normalize_sui_address;

#[derive(Debug, Deserialize)]
pub struct CreateProductBody {
    pub merchant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// JSON number or numeric string
    pub price_in_sui: Value,
    /// Defaults to the merchant's payout wallet
    pub merchant_address: Option<String>,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub merchant_id: Option<Uuid>,
}

fn product_not_found(product_id: Uuid) -> AppError {
    AppError::domain(DomainError::ProductNotFound {
        product_id: product_id.to_string(),
    })
}

/// POST /api/products
pub async fn create_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    key: MerchantKey,
    Json(body): Json<CreateProductBody>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(api_error(&headers)(AppError::validation(
            ValidationError::MissingField {
                field: "name".to_string(),
            },
        )));
    }

    let price = currency_converter::parse_amount(&body.price_in_sui).map_err(api_error(&headers))?;
    if !price.is_positive() {
        return Err(api_error(&headers)(AppError::validation(
            ValidationError::InvalidAmount {
                amount: price.to_string(),
                reason: "Price must be greater than zero".to_string(),
            },
        )));
    }

    let merchant = load_merchant(&state, body.merchant_id)
        .await
        .map_err(api_error(&headers))?;
    key.authorize(&merchant).map_err(api_error(&headers))?;
    let merchant_address = body
        .merchant_address
        .as_deref()
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .unwrap_or(merchant.wallet_address.as_str());
    let merchant_address = normalize_sui_address(merchant_address).map_err(api_error(&headers))?;

    let id = Uuid::new_v4();
    let product = state
        .products
        .insert(NewProduct {
            id,
            merchant_id: merchant.id,
            name: name.to_string(),
            description: body.description.filter(|d| !d.trim().is_empty()),
            price_in_sui: price.with_scale_round(NATIVE_DECIMALS, RoundingMode::HalfUp),
            merchant_address,
            payment_link: product_link(&state.public_base_url, id),
            redirect_url: body.redirect_url.filter(|url| !url.trim().is_empty()),
        })
        .await
        .map_err(api_error(&headers))?;

    info!(
        product_id = %product.id,
        merchant_id = %product.merchant_id,
        price_sui = %product.price_in_sui,
        "Product created"
    );
    Ok((StatusCode::CREATED, success_response(product)))
}

/// GET /api/products?merchant_id=
pub async fn list_products(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<Value>, AppError> {
    let merchant_id = query.merchant_id.ok_or_else(|| {
        api_error(&headers)(AppError::validation(ValidationError::MissingField {
            field: "merchant_id".to_string(),
        }))
    })?;
    load_merchant(&state, merchant_id)
        .await
        .map_err(api_error(&headers))?;

    let products: Vec<Product> = state
        .products
        .list_by_merchant(merchant_id)
        .await
        .map_err(api_error(&headers))?;

    Ok(success_response(json!({
        "count": products.len(),
        "products": products,
    })))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let product = state
        .products
        .find_by_id(product_id)
        .await
        .map_err(api_error(&headers))?
        .ok_or_else(|| api_error(&headers)(product_not_found(product_id)))?;

    Ok(success_response(product))
}

/// DELETE /api/products/{id}
pub async fn delete_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    key: MerchantKey,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let product = state
        .products
        .find_by_id(product_id)
        .await
        .map_err(api_error(&headers))?
        .ok_or_else(|| api_error(&headers)(product_not_found(product_id)))?;
    let merchant = load_merchant(&state, product.merchant_id)
        .await
        .map_err(api_error(&headers))?;
    key.authorize(&merchant).map_err(api_error(&headers))?;

    let removed = state
        .products
        .delete(product_id)
        .await
        .map_err(api_error(&headers))?;
    if !removed {
        return Err(api_error(&headers)(product_not_found(product_id)));
    }

    info!(product_id = %product_id, "Product deleted");
    Ok(success_response(json!({ "deleted": true, "id": product_id })))
}

fn product_link(base_url: &str, product_id: Uuid) -> String {
    format!("{}/products/{}", base_url.trim_end_matches('/'), product_id)
}
