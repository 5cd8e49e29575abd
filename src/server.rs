use crate::domain::{CategoryMetrics, DailySales, ProductSales, Transaction};
use crate::error::SalesEtlError;
use crate::observability;
use crate::pipeline::storage::{DateRange, ProductFilter, SalesStore};
use axum::{
    extract::Query,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

type SharedStore = Arc<dyn SalesStore>;

/// Store failures surface as 500s with the error text.
pub struct ApiError(SalesEtlError);

impl From<SalesEtlError> for ApiError {
    fn from(err: SalesEtlError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Query failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "sales-etl-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Total sales per product, optionally filtered by product name and category
async fn sales_by_product(
    Extension(store): Extension<SharedStore>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<ProductSales>>, ApiError> {
    Ok(Json(store.sales_by_product(&filter).await?))
}

/// Total sales per day, optionally bounded by start/end date (inclusive)
async fn sales_by_day(
    Extension(store): Extension<SharedStore>,
    Query(range): Query<DateRange>,
) -> Result<Json<Vec<DailySales>>, ApiError> {
    Ok(Json(store.sales_by_day(&range).await?))
}

async fn category_metrics(Extension(store): Extension<SharedStore>) -> Result<Json<Vec<CategoryMetrics>>, ApiError> {
    Ok(Json(store.category_metrics().await?))
}

async fn outliers(Extension(store): Extension<SharedStore>) -> Result<Json<Vec<Transaction>>, ApiError> {
    Ok(Json(store.outliers().await?))
}

async fn metrics() -> impl IntoResponse {
    match observability::render() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Create the read-only query router over `store`
pub fn create_server(store: SharedStore) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/sales/product", get(sales_by_product))
        .route("/sales/day", get(sales_by_day))
        .route("/sales/category", get(category_metrics))
        .route("/sales/outliers", get(outliers))
        .layer(Extension(store))
        .layer(cors)
}

/// Bind and serve until the process is stopped
pub async fn serve(store: SharedStore, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_server(store);
    info!("Query API listening on http://{}", addr);
    Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}
