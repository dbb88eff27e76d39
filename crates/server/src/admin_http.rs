//! Admin listener exposing `/healthz` and `/metrics` next to the public API.

use axum::{http::StatusCode, routing::get, Router};

use crate::observability;

async fn healthz() -> &'static str {
    "OK"
}

async fn metrics() -> (StatusCode, String) {
    observability::encode_metrics()
}

pub fn admin_router() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthz_answers_ok() -> anyhow::Result<()> {
        let res = admin_router()
            .oneshot(Request::get("/healthz").body(Body::empty())?)
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"OK");
        Ok(())
    }

    #[tokio::test]
    async fn metrics_is_text_exposition() -> anyhow::Result<()> {
        observability::STATE_WRITES_TOTAL.with_label_values(&["ok"]).inc();
        let res = admin_router()
            .oneshot(Request::get("/metrics").body(Body::empty())?)
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await?;
        assert!(String::from_utf8_lossy(&body).contains("state_proxy_state_writes_total"));
        Ok(())
    }
}
