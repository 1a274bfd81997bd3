//! Throttled routes example
//!
//! Wraps two handlers with the throttler interceptor using the in-memory
//! store. Set `THROTTLE_LIMIT`, `THROTTLE_TTL` or `REDIS_URL` (with the
//! `redis` feature) to change the defaults.
//!
//! ```bash
//! RUST_LOG=armature_throttler=debug cargo run -p armature-throttler --example throttled_routes
//! ```

use armature_throttler::{
    ExecutionContext, HttpResponse, InterceptError, Next, PolicyOverride, RequestInfo, RouteId,
    ThrottlerConfig, ThrottlerInterceptor,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn login(attempt: u32) -> Next<String> {
    Box::pin(async move {
        // Every third attempt has the right password
        let response = if attempt % 3 == 0 {
            HttpResponse::ok().with_body("welcome")
        } else {
            HttpResponse::new(401).with_body("bad credentials")
        };
        Ok::<_, String>(response)
    })
}

fn list_orders() -> Next<String> {
    Box::pin(async { Ok::<_, String>(HttpResponse::ok().with_body("[]")) })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let login_route = RouteId::new("AuthController", "login");
    let orders_route = RouteId::new("OrdersController", "list");

    let throttler = ThrottlerConfig::from_env()
        .route(
            login_route.clone(),
            PolicyOverride::new()
                .limit(2)
                .window_seconds(30)
                .error_message("Too many successful logins, wait a bit"),
        )
        .route(
            orders_route.clone(),
            PolicyOverride::new().limit(3).count_all_requests(true),
        )
        .build()
        .await?;
    let interceptor = ThrottlerInterceptor::new(Arc::new(throttler));

    let client = RequestInfo::new().with_ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));

    println!("== orders (counts every request)");
    for i in 1..=5 {
        let ctx = ExecutionContext::new(orders_route.clone(), client.clone());
        let response = interceptor.intercept(ctx, list_orders()).await?;
        println!(
            "  #{i}: {} remaining={:?} retry-after={:?}",
            response.status,
            response.header("X-RateLimit-Remaining"),
            response.header("Retry-After"),
        );
    }

    println!("== login (counts successful requests only)");
    for attempt in 1..=9 {
        let ctx = ExecutionContext::new(login_route.clone(), client.clone());
        match interceptor.intercept(ctx, login(attempt)).await {
            Ok(response) => println!(
                "  attempt {attempt}: {} {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            ),
            Err(InterceptError::Handler(e)) => println!("  attempt {attempt}: handler error {e}"),
            Err(e) => return Err(e.into()),
        }
        // Give the detached settlement a chance to land before the next attempt
        tokio::task::yield_now().await;
    }

    Ok(())
}
