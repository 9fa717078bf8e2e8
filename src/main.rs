use axum_server::tls_rustls::RustlsConfig;
use school_mdm::app_state::AppState;
use school_mdm::config::Config;
use school_mdm::routes;
use std::error::Error;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load_from(&config_path)?;
    config.create_storage_dirs()?;

    let state = AppState::with_config(config.clone())?;
    // Permission failures from any request or subscription end up in the log.
    state.store.errors().spawn_logger();

    let service = &config.service;
    let address = SocketAddr::new(service.bind_address, service.port);
    let app = routes::create_routes(state);

    tracing::info!(%address, organization = %service.organization_name, "starting up");
    match &service.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;
            axum_server::bind_rustls(address, rustls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            axum_server::bind(address)
                .serve(app.into_make_service())
                .await?;
        }
    }
    Ok(())
}
