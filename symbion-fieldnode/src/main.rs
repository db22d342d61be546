/**
 * SYMBION FIELD NODE - Point d'entrée du noeud terrain
 *
 * ROLE : bootstrap of config, device registry, sink, acquisition scheduler and
 * MQTT gateway. The scheduler runs on its own task; the MQTT loop runs here
 * and dispatches commands inline.
 *
 * ARRET : Ctrl-C flips the shutdown channel, both loops stop, process exits.
 */

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use symbion_fieldnode::config::load_config;
use symbion_fieldnode::{
    AcquisitionScheduler, BusGateway, DeviceRegistry, DeviceSources, Dispatcher, FileSink, ReadingSimulator,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("symbion_fieldnode=info")),
        )
        .init();

    info!("Symbion field node starting...");
    let cfg = load_config();

    // registry depuis serial_config.json + <uuid>.json
    let registry = DeviceRegistry::new();
    let sources = DeviceSources::from_serial_config(&cfg.devices.serial_config, cfg.devices.config_dir.clone());
    let summary = sources.apply_to(&registry);
    info!(
        "[fieldnode] loaded {} device(s) from {} source(s) ({} failed)",
        registry.len(),
        summary.sources_read,
        summary.sources_failed
    );

    let sink = Arc::new(
        FileSink::new(cfg.storage.data_dir.clone())
            .with_context(|| format!("failed to open data dir {:?}", cfg.storage.data_dir))?,
    );

    // Sans broker, pas de noeud
    let gateway = match BusGateway::connect(&cfg.mqtt, &cfg.topics).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("[fieldnode] {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = AcquisitionScheduler::new(registry.clone(), Arc::new(ReadingSimulator::new()), sink.clone())
        .with_idle_wait(Duration::from_millis(cfg.devices.idle_wait_ms));
    let scheduler_handle = scheduler.spawn(shutdown_rx.clone());

    let dispatcher = Dispatcher::new(
        cfg.dispatch_settings(),
        registry,
        sources,
        sink,
        Arc::new(gateway.publisher()),
    );

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("[fieldnode] cannot listen for Ctrl-C: {}", e);
            // keep the sender alive, dropping it would stop both loops
            std::future::pending::<()>().await;
        }
        info!("[fieldnode] Ctrl-C received");
        let _ = shutdown_tx.send(true);
    });

    gateway.run(&dispatcher, shutdown_rx).await;
    scheduler_handle.await.context("acquisition task panicked")?;

    info!("Symbion field node stopped");
    Ok(())
}
