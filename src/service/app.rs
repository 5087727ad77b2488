//! Application state and lifecycle management
//!
//! Wires the pieces together: broker connection, publisher, coordinator,
//! the shared consumer, and the HTTP listener serving the WebSocket
//! endpoint and the health check. Shutdown runs in reverse: tell sessions
//! to close, stop consuming, abort match batches, then close the broker
//! connection.

use crate::amqp::{
    AmqpConfig, AmqpConnection, AmqpCoordinationPublisher, CoordinationConsumer, PublisherConfig,
};
use crate::config::AppConfig;
use crate::directory::InMemoryServerDirectory;
use crate::error::Result;
use crate::matchmaker::{CoordinatorConfig, MatcherConfig, QueueCoordinator};
use crate::service::health::{health_handler, HealthState};
use crate::session::{ws_handler, SessionContext};
use crate::ticket::{TicketCodec, TicketRegistry};
use anyhow::Context;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Main application state containing all service components
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<TicketRegistry>,
    pub directory: Arc<InMemoryServerDirectory>,
    coordinator: Option<Arc<QueueCoordinator>>,
    amqp_connection: Option<AmqpConnection>,
    consumer: Option<CoordinationConsumer>,
    server_task: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            registry: Arc::new(TicketRegistry::new()),
            directory: Arc::new(InMemoryServerDirectory::new()),
            coordinator: None,
            amqp_connection: None,
            consumer: None,
            server_task: None,
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    /// Connect to the broker, start the shared consumer, and begin serving
    pub async fn start(&mut self) -> Result<()> {
        info!("Connecting to AMQP broker at {}", self.config.amqp.host);
        let connection = AmqpConnection::new(AmqpConfig::from(&self.config.amqp)).await?;

        let publish_channel = connection.open_channel().await?;
        let publisher = Arc::new(
            AmqpCoordinationPublisher::new(publish_channel, PublisherConfig::default()).await?,
        );

        let coordinator = Arc::new(QueueCoordinator::new(
            self.registry.clone(),
            self.directory.clone(),
            publisher,
            CoordinatorConfig {
                allow_default_key_fallback: self.config.matchmaking.allow_default_key_fallback,
                matcher: MatcherConfig {
                    assignment_delay: self.config.assignment_delay(),
                    join_delay: self.config.join_delay(),
                    join_delay_hint_secs: self.config.matchmaking.join_delay_hint_secs,
                },
            },
        ));

        // One consumer per instance; connections never consume directly
        let consume_channel = connection.open_channel().await?;
        let consumer = CoordinationConsumer::new(coordinator.clone(), consume_channel);
        consumer.start(&self.config.amqp.queue_name).await?;

        let session_context = Arc::new(SessionContext {
            registry: self.registry.clone(),
            coordinator: coordinator.clone(),
            codec: TicketCodec::new(
                &self.config.matchmaking.ticket_key,
                self.config.freshness_window(),
            ),
            priority_offset: self.config.priority_offset(),
            shutdown: self.shutdown_tx.subscribe(),
        });

        let health_state = HealthState {
            registry: self.registry.clone(),
            started_at: self.started_at,
        };

        let router = Router::new()
            .route("/", get(ws_handler))
            .with_state(session_context)
            .merge(
                Router::new()
                    .route("/health", get(health_handler))
                    .with_state(health_state),
            );

        let bind_addr = format!("{}:{}", self.config.service.host, self.config.service.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", bind_addr))?;
        info!("Matchmaking gateway listening on {}", bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let server_task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    // Closed sender also means shut down
                    let _ = shutdown_rx.changed().await;
                })
                .await;
            if let Err(e) = result {
                warn!("HTTP server exited with error: {}", e);
            }
        });

        self.coordinator = Some(coordinator);
        self.amqp_connection = Some(connection);
        self.consumer = Some(consumer);
        self.server_task = Some(server_task);

        info!("Service '{}' started", self.config.service.name);
        Ok(())
    }

    /// Gracefully stop all components
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down service");

        // Sessions observe the flag and close with the shutdown reason
        let _ = self.shutdown_tx.send(true);

        if let Some(consumer) = self.consumer.take() {
            if let Err(e) = consumer.stop().await {
                warn!("Consumer did not stop cleanly: {}", e);
            }
        }

        if let Some(coordinator) = self.coordinator.take() {
            coordinator.shutdown().await;
        }

        if let Some(server_task) = self.server_task.take() {
            if let Err(e) = server_task.await {
                warn!("Server task join failed: {}", e);
            }
        }

        if let Some(connection) = self.amqp_connection.take() {
            if let Err(e) = connection.close().await {
                warn!("AMQP connection close failed: {}", e);
            }
        }

        info!("Shutdown complete");
        Ok(())
    }
}
