//! Bridge binary entrypoint

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use meshlink_bridge::{Bridge, BridgeCore, MessageStore, NameDirectory, Settings};
use meshlink_core::StateStore;
use meshlink_matrix::{HttpMatrixClient, MatrixRoom};
use meshlink_meshtastic::{DisabledSender, MeshSender, MqttSource, RadioLink};
use meshlink_state::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    let level = if settings.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    settings.validate()?;

    // Persistence first: an unreadable database is a startup failure
    let db = SqliteStore::open(&settings.node_db_path)
        .await
        .with_context(|| format!("cannot open state store at {}", settings.node_db_path))?;

    let states = db
        .load_states()
        .await
        .context("state store is corrupt")?;
    let nodes = db.load_nodes().await.context("state store is corrupt")?;
    let names = NameDirectory::from_entries(nodes);
    let store = MessageStore::rehydrate(states);
    info!(
        states = store.len(),
        nodes = names.len(),
        "Restored persisted bridge state"
    );

    let matrix = Arc::new(
        HttpMatrixClient::connect(&settings.matrix_config())
            .await
            .context("Matrix startup failed")?,
    );
    info!(room = %matrix.room_id(), user = %matrix.user_id(), "Matrix client ready");

    let (mesh_tx, mesh_rx) = mpsc::channel(256);
    let (matrix_tx, matrix_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The radio doubles as the Matrix→mesh sink; without one, outbound
    // sends are rejected and logged
    let mesh_sender: Arc<dyn MeshSender> = match settings.radio_config() {
        Some(radio_config) => {
            let (link, handle) = RadioLink::new(radio_config, mesh_tx.clone());
            link.spawn();
            Arc::new(handle)
        }
        None => {
            warn!("No radio configured; Matrix→mesh sending is disabled");
            Arc::new(DisabledSender)
        }
    };

    if let Some(mqtt_config) = settings.mqtt_config()? {
        MqttSource::spawn(mqtt_config, mesh_tx.clone());
    }
    drop(mesh_tx);

    matrix.spawn_sync(matrix_tx);

    let core = BridgeCore::new(
        Arc::clone(&matrix) as Arc<dyn MatrixRoom>,
        mesh_sender,
        Arc::new(db) as Arc<dyn StateStore>,
        settings.bridge_options(),
        store,
        names,
    );
    let bridge = Bridge::new(core, mesh_rx, matrix_rx, shutdown_rx);
    let bridge_task = tokio::spawn(bridge.run());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = bridge_task.await;

    Ok(())
}
