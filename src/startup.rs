//! Application Startup
//!
//! Application building and server initialization. The collaboration hub
//! is constructed here, once, and injected into the handlers; there is no
//! process-global session state.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::application::{JwtTokenVerifier, TokenVerifier};
use crate::config::Settings;
use crate::domain::ScanOwnerAuthorizer;
use crate::infrastructure::database;
use crate::infrastructure::repositories::PgScanRepository;
use crate::presentation::http::handlers::health;
use crate::presentation::http::routes;
use crate::presentation::middleware::create_cors_layer;
use crate::presentation::websocket::{heartbeat, CollaborationHub};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub hub: Arc<CollaborationHub>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub settings: Arc<Settings>,
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        // Create database pool
        let db = database::create_pool(&settings.database).await?;
        tracing::info!("Database connection pool created");

        database::run_migrations(&db).await?;
        tracing::info!("Database migrations applied");

        // Wire the collaboration hub with its external collaborators
        let scans = Arc::new(PgScanRepository::new(db.clone()));
        let authorizer = Arc::new(ScanOwnerAuthorizer::new(scans.clone()));
        let hub = Arc::new(CollaborationHub::new(scans, authorizer));

        // Liveness probing runs for the life of the process
        heartbeat::spawn(hub.clone(), settings.collab.heartbeat_interval());

        let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtTokenVerifier::new(&settings.jwt));

        health::init_server_start();

        // Create app state
        let state = AppState {
            db,
            hub,
            verifier,
            settings: Arc::new(settings.clone()),
        };

        // Build router with middleware
        let router = routes::create_router(state)
            .layer(TraceLayer::new_for_http())
            .layer(create_cors_layer(&settings.cors));

        // Bind to address
        let addr = settings.server.socket_addr();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
