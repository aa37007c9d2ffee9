//! Service entry point.
//!
//! The service to run is the first argument or `SERVICE_KIND`
//! (`order`, `payment` or `notification`).

use services::config::{Config, ServiceKind};
use services::server;

#[tokio::main]
async fn main() {
    let kind = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SERVICE_KIND").ok());
    let kind: ServiceKind = match kind.as_deref().map(str::parse) {
        Some(Ok(kind)) => kind,
        Some(Err(e)) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
        None => {
            eprintln!("usage: service <order|payment|notification>");
            std::process::exit(2);
        }
    };

    let config = Config::from_env(kind);
    server::init_tracing(&config);

    if let Err(e) = server::run(config).await {
        tracing::error!(error = %e, "service failed");
        std::process::exit(1);
    }
}
