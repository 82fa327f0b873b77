use crate::{
    config::{Config, ServerConfig, SessionConfig, Validatable},
    labels::EmotionClasses,
    model_service::ModelService,
    ort_service::OrtModelService,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::Router;
use std::{error::Error, net::SocketAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    signal,
    sync::broadcast::{self, Receiver},
    task::JoinHandle,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub struct SharedState<M: ModelService> {
    pub model_service: Arc<M>,
    pub classes: Arc<EmotionClasses>,
    pub session_config: SessionConfig,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> SharedState<M> {
    pub fn new(
        model_service: M,
        classes: EmotionClasses,
        session_config: SessionConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            model_service: Arc::new(model_service),
            classes: Arc::new(classes),
            session_config,
            metrics: Arc::new(metrics),
        }
    }
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            classes: self.classes.clone(),
            session_config: self.session_config.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn build_router<M: ModelService>(state: SharedState<M>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(
        state: SharedState<M>,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let router = build_router(state);
        let listener = TcpListener::bind(config.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting server on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx;
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok::<(), anyhow::Error>(())
            }
        });

        Ok(server_handle)
    }
}

pub async fn start_server(config: Config) -> Result<(), Box<dyn Error>> {
    let model_service = OrtModelService::new(&config.model).map_err(|e| {
        tracing::error!(
            "Failed to load emotion detection model from {:?}: {}. \
             Make sure the file is an ONNX export compatible with this ONNX Runtime version.",
            config.model.get_path(),
            e
        );
        e
    })?;
    tracing::info!("Emotion detection model loaded");

    let classes = EmotionClasses::from_config(config.labels.as_ref())?;
    let metrics = Metrics::new()?;
    let state = SharedState::new(model_service, classes, config.session.clone(), metrics);

    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server_handle = server.run(shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
