use dashboard_probe::ProbeSettings;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = ProbeSettings::from_env();
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{port}", settings.bind_host());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "probe listening");
    dashboard_probe::run(listener, settings).await
}
