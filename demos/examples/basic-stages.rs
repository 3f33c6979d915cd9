//! Ramp to 20 VUs, hold, ramp down, against a local mock-service (`cargo run -p mock-service`).
use std::time::Duration;
use surge::prelude::*;

#[tokio::main]
async fn main() {
    demos::init_tracing();

    let stats = match accounts()
        .stage(Duration::from_secs(10), 20)
        .stage(Duration::from_secs(20), 20)
        .stage(Duration::from_secs(10), 0)
        .threshold("http_req_duration:p(95)<500".parse().unwrap())
        .threshold("http_req_failed:rate<0.01".parse().unwrap())
        .await
    {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(surge::EXIT_CONFIG_ERROR.into());
        }
    };

    println!("{}", Report(&stats));
    std::process::exit(surge::exit_code(&stats).into());
}

#[scenario]
async fn accounts(http: Http) {
    let base = demos::target();
    let res = http.get(&format!("{base}/api/auth/session")).await;
    http.check("session status is 200", res.status == Some(200));
}
