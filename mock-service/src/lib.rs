//! Stand-in for the svc.plus accounts service, plus a few routes for exercising failure modes.
use axum::{
    debug_handler,
    extract::Path,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lazy_static::lazy_static;
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock,
};
use std::{num::NonZeroU32, time::Duration};
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, info};

/// Bearer token accepted by the admin routes.
pub const ADMIN_TOKEN: &str = "mock-admin-token";

pub fn app() -> Router {
    Router::new()
        .route("/api/auth/session", get(session))
        .route("/api/admin/users/metrics", get(admin_metrics))
        .route("/status/:code", get(status))
        .route("/delay/ms/:delay_ms", get(delay))
        .route("/flaky/:percent", get(flaky))
        .route("/limited/:max_tps/key/:key", get(limited))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, app()).await?;
    Ok(())
}

/// Serve on an ephemeral localhost port in the background and return its address.
pub async fn spawn() -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app()).await {
            tracing::error!("Mock service stopped: {e}");
        }
    });
    Ok(addr)
}

#[derive(Serialize)]
pub struct Session {
    pub authenticated: bool,
    pub user: Option<String>,
}

#[debug_handler]
pub async fn session(headers: HeaderMap) -> Json<Session> {
    hit("session");
    let authenticated = is_admin(&headers);
    Json(Session {
        authenticated,
        user: authenticated.then(|| "admin".to_string()),
    })
}

#[derive(Serialize)]
pub struct UserMetrics {
    pub total: u64,
    pub active: u64,
    pub subscribed: u64,
}

#[debug_handler]
pub async fn admin_metrics(headers: HeaderMap) -> Result<Json<UserMetrics>, StatusCode> {
    hit("admin_metrics");
    if !is_admin(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(UserMetrics {
        total: 1_024,
        active: 512,
        subscribed: 64,
    }))
}

#[debug_handler]
pub async fn status(Path(code): Path<u16>) -> StatusCode {
    hit("status");
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

#[debug_handler]
pub async fn delay(Path(delay_ms): Path<u64>) {
    hit("delay");
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

/// Fails with a 500 for roughly `percent` percent of requests.
#[debug_handler]
pub async fn flaky(Path(percent): Path<u32>) -> StatusCode {
    hit("flaky");
    if rand::thread_rng().gen_range(0..100) < percent {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

lazy_static! {
    static ref LIMITED_MAP: RwLock<HashMap<String, Arc<DefaultDirectRateLimiter>>> =
        RwLock::new(HashMap::new());
}

/// Answers 429 once `max_tps` is exceeded for `key`.
#[debug_handler]
pub async fn limited(Path((max_tps, key)): Path<(u32, String)>) -> StatusCode {
    hit("limited");
    let Some(tps) = NonZeroU32::new(max_tps) else {
        return StatusCode::TOO_MANY_REQUESTS;
    };

    let read = LIMITED_MAP
        .read()
        .ok()
        .and_then(|map| map.get(&key).cloned());
    let limiter = match read {
        Some(limiter) => limiter,
        None => {
            let limiter = Arc::new(RateLimiter::direct(Quota::per_second(tps)));
            if let Ok(mut map) = LIMITED_MAP.write() {
                map.entry(key).or_insert(limiter).clone()
            } else {
                limiter
            }
        }
    };

    match limiter.check() {
        Ok(_) => StatusCode::OK,
        Err(_) => {
            debug!("Rate limited");
            StatusCode::TOO_MANY_REQUESTS
        }
    }
}

fn is_admin(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == ADMIN_TOKEN)
}

/** TPS Printer **/

static TPS_MEASURE: AtomicU64 = AtomicU64::new(0);

fn hit(route: &'static str) {
    counter!("mock-service.requests", "route" => route).increment(1);
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);
}

pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let transactions = TPS_MEASURE.swap(0, Ordering::Relaxed);
        if transactions > 0 {
            info!("{transactions} TPS");
        }
    }
}
