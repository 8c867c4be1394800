mod routes;
mod services;
mod state;
mod tls;

use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("SOCKET_PORT")
        .unwrap_or_else(|_| "3001".into())
        .parse()
        .expect("invalid SOCKET_PORT");
    let https_port: u16 = std::env::var("SOCKET_HTTPS_PORT")
        .unwrap_or_else(|_| "3002".into())
        .parse()
        .expect("invalid SOCKET_HTTPS_PORT");

    // TLS is best-effort: a missing or broken certificate pair downgrades to
    // plain-only, never aborts startup.
    let tls_setup = match std::env::current_dir() {
        Ok(cwd) => match tls::find_cert_files(&cwd) {
            Some(pair) => {
                info!(cert = %pair.cert.display(), key = %pair.key.display(), "found localhost certificates");
                match tls::server_config(&pair) {
                    Ok(config) => match TcpListener::bind(("0.0.0.0", https_port)).await {
                        Ok(listener) => Some((listener, config)),
                        Err(e) => {
                            warn!(https_port, error = %e, "TLS bind failed; serving plain only");
                            None
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "certificate load failed; serving plain only");
                        None
                    }
                }
            }
            None => {
                info!("no localhost certificates found; serving plain only");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "cannot resolve working directory; serving plain only");
            None
        }
    };

    let state = state::AppState::new(tls_setup.is_some());
    let app = routes::app(state);

    if let Some((listener, config)) = tls_setup {
        info!(https_port, "relay listening (tls)");
        tokio::spawn(tls::serve_tls(listener, config, app.clone()));
    }

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("failed to bind");
    info!(port, "relay listening");
    axum::serve(listener, app).await.expect("server failed");
}
