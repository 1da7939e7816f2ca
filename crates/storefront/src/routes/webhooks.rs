//! Stripe webhook endpoint.
//!
//! Mounted outside the session layer and the rate limiters. The body is
//! verified against the `Stripe-Signature` header before it is parsed.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::error::{AppError, Result};
use crate::services::Outcome;
use crate::stripe::{Event, verify_signature};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Receive a Stripe event.
///
/// Any reconciliation failure is a 500 so that Stripe redelivers.
#[instrument(skip_all)]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let stripe = &state.config().stripe;
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    if let Err(e) = verify_signature(
        &body,
        signature,
        stripe.webhook_secret.expose_secret(),
        chrono::Utc::now().timestamp(),
        stripe.webhook_tolerance_secs,
    ) {
        warn!(error = %e, "Rejected webhook with invalid signature");
        return Err(AppError::BadRequest("Invalid signature".to_string()));
    }

    let event: Event = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event payload: {e}")))?;

    let outcome = state.reconciler().handle_event(&event).await?;
    match &outcome {
        Outcome::Ignored => debug!(event_id = %event.id, kind = %event.kind, "Event ignored"),
        other => tracing::info!(event_id = %event.id, kind = %event.kind, outcome = ?other, "Event handled"),
    }

    Ok(Json(json!({ "received": true })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::stripe::webhook::sign;
    use crate::testing::{TestApp, WEBHOOK_SECRET};

    fn payload(payment_intent: &str) -> String {
        serde_json::json!({
            "id": "evt_test_1",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": payment_intent, "object": "payment_intent" } },
        })
        .to_string()
    }

    fn webhook(body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::post("/api/webhooks/stripe")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn signed(body: &str) -> Request<Body> {
        let header = sign(body.as_bytes(), WEBHOOK_SECRET, chrono::Utc::now().timestamp());
        webhook(body, Some(header))
    }

    #[tokio::test]
    async fn test_valid_event_creates_one_order() {
        let app = TestApp::new();
        let pi = app.payments.insert_succeeded_intent(None);
        let body = payload(&pi);

        let response = app.router.clone().oneshot(signed(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.store.order_count(), 1);

        // Redelivery is acknowledged without a second order
        let response = app.router.clone().oneshot(signed(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.store.order_count(), 1);
        assert_eq!(app.fulfillment.created_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_has_no_side_effects() {
        let app = TestApp::new();
        let pi = app.payments.insert_succeeded_intent(None);
        let body = payload(&pi);
        let forged = sign(body.as_bytes(), "whsec_attacker", chrono::Utc::now().timestamp());

        let response = app
            .router
            .clone()
            .oneshot(webhook(&body, Some(forged)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Invalid signature");

        let response = app.router.clone().oneshot(webhook(&body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(app.store.order_count(), 0);
        assert_eq!(app.payments.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fulfillment_failure_is_retried() {
        let app = TestApp::new();
        let pi = app.payments.insert_succeeded_intent(None);
        let body = payload(&pi);

        app.fulfillment.fail_orders(true);
        let response = app.router.clone().oneshot(signed(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.store.order_count(), 1);

        app.fulfillment.fail_orders(false);
        let response = app.router.clone().oneshot(signed(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.store.order_count(), 1);
        assert_eq!(app.fulfillment.created_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_unhandled_event_acknowledged() {
        let app = TestApp::new();
        let body = serde_json::json!({
            "id": "evt_test_2",
            "type": "customer.created",
            "data": { "object": { "id": "cus_1" } },
        })
        .to_string();

        let response = app.router.clone().oneshot(signed(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.store.order_count(), 0);
    }
}
