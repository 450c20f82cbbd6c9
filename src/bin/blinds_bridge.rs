use blinds_control::{
    bridge::Bridge,
    configuration::get_configuration,
    controller::NiceController,
    directory::Directory,
    logging::setup_tracing,
    mqtt::{start_mqtt_service, MqttStatePublisher},
    poller::StatusPoller,
};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Expose Nice window coverings over MQTT")]
struct Opts {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Repeat for more logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    setup_tracing(opts.verbose, opts.json_logs)?;

    let app_config = get_configuration(opts.config)?;
    let controller = NiceController::new(&app_config.controller)?;

    let directory = Directory::discover(&controller, app_config.groups.clone()).await?;
    let bridge = Arc::new(Bridge::build(&controller, &directory, &app_config));
    info!(
        "Bridging {} covers, {} groups and {} controller groups",
        bridge.covers.len(),
        bridge.groups.len(),
        bridge.controller_groups.len()
    );

    let (refresh_sender, refresh_receiver) = tokio::sync::mpsc::channel(1);
    let client = start_mqtt_service(&app_config.mqtt, bridge.clone(), refresh_sender)?;
    let publisher = MqttStatePublisher::new(client, &app_config.mqtt.base_route);

    let interval = if app_config.poller.enabled {
        Some(app_config.poller.interval())
    } else {
        info!("Periodic polling disabled, refreshing after commands only");
        None
    };
    let poller = StatusPoller::new(
        controller,
        bridge.covers.clone(),
        bridge.groups.clone(),
        interval,
    )
    .with_group_only_covers(bridge.group_only_covers());
    tokio::spawn(poller.run(publisher, refresh_receiver));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
