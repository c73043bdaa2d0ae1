//! node-label-guard - Validating admission webhooks for node role labels.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Parses the command line
//! - `serve`: starts the health server and the webhook server
//! - `register`: applies the ValidatingWebhookConfiguration

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use node_label_guard::config::{Cli, Command, RegisterArgs, ServeArgs};
use node_label_guard::health::{HealthState, run_health_server};
use node_label_guard::registration::{ServiceTarget, register};
use node_label_guard::run_webhook_server;

/// Grace period for in-flight admission requests during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("node_label_guard=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    // Both axum-server and kube pull in rustls; pick the provider explicitly
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Register(args) => run_register(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting node-label-guard");

    let webhooks = args.policy.build_webhooks();
    let health_state = Arc::new(HealthState::new());

    // Start health server first so liveness works while the webhook binds
    let health_handle = {
        let health_state = health_state.clone();
        let port = args.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let webhook_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_webhook_server(
                webhooks,
                Some(health_state),
                args.webhook_port,
                &args.cert_path,
                &args.key_path,
            )
            .await
            {
                error!("Webhook server error: {}", e);
            }
        })
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = webhook_handle => {
            if let Err(e) = result {
                error!("Webhook server task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready so the endpoints are removed from the Service
            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;
            info!("Grace period complete, shutting down");
        }
    }

    info!("Webhook stopped");
    Ok(())
}

async fn run_register(args: RegisterArgs) -> Result<(), Box<dyn std::error::Error>> {
    let webhooks = args.policy.build_webhooks();

    let mut target = ServiceTarget {
        name: args.service_name,
        namespace: args.service_namespace,
        port: args.service_port,
        ca_bundle: None,
    };
    target.load_ca_bundle(args.ca_bundle_path.as_deref())?;

    register(&args.configuration_name, &webhooks, &target, args.dry_run).await?;
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
