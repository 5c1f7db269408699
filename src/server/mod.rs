//! HTTP surface over the prediction service

pub mod error;
pub mod handlers;

use crate::config::ServerConfig;
use crate::service::EnsembleService;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EnsembleService>,
}

/// Create the router with all routes
pub fn create_router(service: Arc<EnsembleService>, config: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health))
        .route("/model_info", get(handlers::model_info))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service });

    if config.cors_allow_any {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::metrics::ServiceMetrics;
    use crate::models::loader::BinaryClassifier;
    use crate::models::registry::{LoadedModel, ModelRegistry};
    use crate::models::weights::WeightCalculator;
    use crate::types::ImageTensor;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageFormat, Luma, GrayImage};
    use serde_json::Value;
    use std::io::Cursor;
    use std::path::PathBuf;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XRAYBOUNDARY";

    struct Constant(f64);

    impl BinaryClassifier for Constant {
        fn predict_probability(&self, _input: &ImageTensor) -> anyhow::Result<f64> {
            Ok(self.0)
        }
    }

    fn app(models: Vec<(&str, f64)>) -> Router {
        let loaded = models
            .into_iter()
            .map(|(name, p)| LoadedModel {
                name: name.to_string(),
                path: PathBuf::from(name),
                model: Arc::new(Constant(p)),
                metrics: None,
            })
            .collect();
        let registry = ModelRegistry::from_loaded(loaded, &WeightCalculator::default());
        let config = AppConfig::default();
        let service = EnsembleService::from_config(
            &config,
            Arc::new(registry),
            Arc::new(ServiceMetrics::new()),
        );
        create_router(Arc::new(service), &config.server)
    }

    fn png() -> Vec<u8> {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([128])));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn multipart(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_predict_endpoint() {
        let app = app(vec![
            ("pneumonia_detection_model.onnx", 0.9),
            ("pneumonia_smoke.onnx", 0.1),
        ]);

        let response = app
            .oneshot(multipart("file", "chest.png", "image/png", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["prediction"], "PNEUMONIA");
        assert_eq!(json["filename"], "chest.png");
        assert_eq!(json["model_version"], "Enhanced Ensemble v2.0");
        assert_eq!(json["threshold_used"], 0.3);
        assert_eq!(
            json["individual_predictions"]["pneumonia_smoke.onnx"]["prediction"],
            "NORMAL"
        );
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let app = app(vec![("pneumonia_detection_model.onnx", 0.9)]);

        let response = app
            .oneshot(multipart("attachment", "chest.png", "image/png", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "No file provided");
        assert_eq!(json["status"], 400);
    }

    #[tokio::test]
    async fn test_undecodable_upload() {
        let app = app(vec![("pneumonia_detection_model.onnx", 0.9)]);

        let response = app
            .oneshot(multipart("file", "notes.txt", "text/plain", b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_no_models_is_unavailable() {
        let app = app(vec![]);

        let response = app
            .oneshot(multipart("file", "chest.png", "image/png", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["error"], "No models loaded");
    }

    #[tokio::test]
    async fn test_health_and_model_info() {
        let app = app(vec![("pneumonia_detection_model.onnx", 0.9)]);

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let health = json_body(health).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["models_loaded"], 1);

        let info = app
            .oneshot(Request::get("/model_info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let info = json_body(info).await;
        assert_eq!(info["weighting"], "heuristic");
        assert_eq!(info["model_weights"]["pneumonia_detection_model.onnx"], 0.8);
    }

    #[tokio::test]
    async fn test_degraded_health() {
        let response = app(vec![])
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["models_loaded"], 0);
    }
}
