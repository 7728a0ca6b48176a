use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

mod access;
mod ai;
mod app;
mod config;
mod db;
mod error;
mod models;
mod pipeline;
mod server;
mod services;

use app::App;
use config::Config;
use error::{AppError, Result};

enum Command {
    Serve,
    Analyze(String),
    Latest(Option<usize>),
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args.get(1).map(String::as_str) {
        None | Some("--serve") => Ok(Command::Serve),
        Some("--analyze") => args
            .get(2)
            .cloned()
            .map(Command::Analyze)
            .ok_or_else(|| AppError::Config("--analyze requires a URL".to_string())),
        Some("--latest") => {
            let limit = match args.get(2) {
                Some(n) => Some(
                    n.parse()
                        .map_err(|_| AppError::Config(format!("Invalid limit: {}", n)))?,
                ),
                None => None,
            };
            Ok(Command::Latest(limit))
        }
        Some(other) => Err(AppError::Config(format!("Unknown argument: {}", other))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;

    let config = Config::load()?;
    let mut app = App::new(&config).await?;

    match command {
        Command::Analyze(url) => {
            let article = app.process(&url).await?;
            println!("{}", serde_json::to_string_pretty(&article)?);
            app.shutdown().await
        }
        Command::Latest(limit) => {
            let articles = app.latest(limit).await;
            println!("{}", serde_json::to_string_pretty(&articles)?);
            app.shutdown().await
        }
        Command::Serve => {
            app.start_background_tasks();
            serve(app, &config.bind_addr).await
        }
    }
}

async fn serve(app: App, bind_addr: &str) -> Result<()> {
    let app = Arc::new(app);
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        server::router(Arc::clone(&app)).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutting down");
    match Arc::try_unwrap(app) {
        Ok(app) => app.shutdown().await,
        Err(_) => {
            tracing::warn!("Requests still running at shutdown; cache closes on drop");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
