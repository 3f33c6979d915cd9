//! A constant 50 VUs capped at 100 requests per second, stoppable with Ctrl-C, with metrics
//! served for Prometheus on :8002.
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;
use surge::prelude::*;
use surge::stop_signal;

#[tokio::main]
async fn main() {
    demos::init_tracing();

    PrometheusBuilder::new()
        .with_http_listener("0.0.0.0:8002".parse::<SocketAddr>().unwrap())
        .install()
        .unwrap();

    let (handle, signal) = stop_signal();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        handle.stop();
    });

    let stats = delayed()
        .stage(Duration::ZERO, 50)
        .stage(Duration::from_secs(60), 50)
        .pause(Duration::ZERO)
        .rps(NonZeroU32::new(100).unwrap())
        .stop_signal(signal)
        .await
        .unwrap();

    println!("{}", Report(&stats));
}

#[scenario]
async fn delayed(http: Http) {
    let base = demos::target();
    http.get(&format!("{base}/delay/ms/10")).await;
}
