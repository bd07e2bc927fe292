use courier_kv::cli::Cli;
use courier_kv::telemetry::{self, LogLevel};
use courier_kv::{Config, Server};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    telemetry::init_logging(LogLevel::from_flags(cli.verbose, cli.debug));

    let config = Config::from_sources(&cli)?;
    let metrics_service = telemetry::init_telemetry()?;

    let server = Server::bind(&config).await?;
    info!(
        addr = %server.local_addr()?,
        queue_capacity = ?config.replication.queue_capacity,
        max_replica_failures = ?config.replication.max_consecutive_failures,
        prune_on_disconnect = config.subscriptions.prune_on_disconnect,
        "Server started"
    );

    tokio::select! {
        _ = server.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        }
    }

    metrics_service.shutdown()?;
    Ok(())
}
