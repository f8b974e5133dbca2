//! HTTP surface of the verification server.
//!
//! Endpoints:
//!
//! ```text
//! GET  /challenge       issue a fresh single-use challenge
//! POST /verify          stateless attestation verification
//! POST /nodes/register  register a node by attestation
//! POST /claims          verify and score a signed data submission
//! GET  /health          liveness probe
//! ```
//!
//! Rejections surface as `401` with the same JSON body shape as success,
//! so devices parse one schema either way. Bodies that fail to decode at
//! all, malformed or schema-mismatched, are `400`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use attestgate_core::{VerificationResult, VerifyError};

use crate::service::{NodeService, RegisterRequest, SubmitRequest};

/// Stateless verification request: a chain plus the challenge it embeds.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// The previously issued challenge, hex.
    pub challenge: String,
    /// Attestation certificate chain, leaf first, base64 DER.
    pub cert_chain: Vec<String>,
}

/// Build the application router over a shared service.
pub fn router(service: Arc<NodeService>) -> Router {
    Router::new()
        .route("/challenge", get(get_challenge))
        .route("/verify", post(post_verify))
        .route("/nodes/register", post(post_register))
        .route("/claims", post(post_claim))
        .route("/health", get(get_health))
        .with_state(service)
}

async fn get_challenge(State(service): State<Arc<NodeService>>) -> Response {
    match service.challenges().generate() {
        Ok(token) => Json(json!({ "challenge": token })).into_response(),
        Err(err) => {
            error!(error = %err, "challenge generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "challenge generation failed" })),
            )
                .into_response()
        },
    }
}

/// Any body the extractor rejects is a 400, not axum's default 422.
fn bad_request(rejection: &JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": rejection.body_text() })),
    )
        .into_response()
}

async fn post_verify(
    State(service): State<Arc<NodeService>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_request(&rejection),
    };

    if !service.challenges().verify(&req.challenge) {
        let result = VerificationResult::failure(&VerifyError::ChallengeExpiredOrUnknown);
        return (StatusCode::UNAUTHORIZED, Json(result)).into_response();
    }

    match service.verify_attestation(&req.cert_chain, &req.challenge) {
        Ok(result) => {
            let status = if result.success {
                StatusCode::OK
            } else {
                StatusCode::UNAUTHORIZED
            };
            (status, Json(result)).into_response()
        },
        Err(err) => {
            warn!(error = %err, "attestation verification failed");
            (
                StatusCode::UNAUTHORIZED,
                Json(VerificationResult::failure(&err)),
            )
                .into_response()
        },
    }
}

async fn post_register(
    State(service): State<Arc<NodeService>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_request(&rejection),
    };

    let now = chrono::Utc::now().timestamp();
    match service.register_node(&req, now) {
        Ok(response) => {
            let status = if response.success {
                StatusCode::OK
            } else {
                StatusCode::UNAUTHORIZED
            };
            (status, Json(response)).into_response()
        },
        Err(err) => {
            warn!(node_id = %req.node_id, error = %err, "registration failed");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "error": err.to_string() })),
            )
                .into_response()
        },
    }
}

async fn post_claim(
    State(service): State<Arc<NodeService>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_request(&rejection),
    };

    let now = chrono::Utc::now().timestamp();
    match service.submit_data(&req, now) {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            warn!(node_id = %req.node_id, error = %err, "submission rejected");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "error": err.to_string() })),
            )
                .into_response()
        },
    }
}

async fn get_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attestgate_core::{EngineConfig, ScoringConfig, TrustScorer};
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn app() -> Router {
        let service = Arc::new(NodeService::new(
            EngineConfig::default(),
            TrustScorer::new(ScoringConfig::default()),
        ));
        router(service)
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let response = app()
            .oneshot(json_post("/verify", "{ not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_bad_request() {
        // Well-formed JSON missing every required field.
        for uri in ["/verify", "/nodes/register", "/claims"] {
            let response = app().oneshot(json_post(uri, "{}")).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_unknown_challenge_is_unauthorized() {
        let body = r#"{"challenge":"deadbeef","cert_chain":["AAAA"]}"#;
        let response = app().oneshot(json_post("/verify", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_challenge_and_health_respond_ok() {
        let app = app();
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/challenge").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
