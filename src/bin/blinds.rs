use anyhow::Context;
use blinds_control::{
    configuration::{get_configuration, AppConfig},
    controller::NiceController,
    cover::{BlindsCover, ControllerGroupCover, CoverGroup},
    directory::{Directory, Target},
    logging::setup_tracing,
    poller::StatusPoller,
    protocol::{Command, DeviceInfo},
    status::CoverState,
};
use clap::{Parser, Subcommand};
use secrecy::Secret;
use std::{path::PathBuf, process::ExitCode};

const RULE: &str = "============================================================";

#[derive(Parser, Debug)]
#[command(author, version, about = "Control Nice window coverings from the command line")]
struct Opts {
    /// Configuration file, defaults to configuration/settings.yaml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Controller base url, e.g. http://192.168.10.235
    #[arg(long, env = "BLINDS_URL", global = true)]
    url: Option<String>,
    #[arg(long, env = "BLINDS_USER", global = true)]
    username: Option<String>,
    #[arg(long, env = "BLINDS_PASS", hide_env_values = true, global = true)]
    password: Option<String>,
    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
    /// Repeat for more logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: BlindsCommand,
}

#[derive(Subcommand, Debug)]
enum BlindsCommand {
    /// List installed devices
    List,
    /// List controller groups and configured groups
    Groups {
        /// Print groups generated from device names
        #[arg(long)]
        suggest: bool,
    },
    /// Show the status of a device, a group, or every device
    Status { target: Option<String> },
    /// Open (raise) a device or group
    Open { target: String },
    /// Close (lower) a device or group
    Close { target: String },
    /// Stop a device or group
    Stop { target: String },
    /// Move to a position between 0 (closed) and 100 (open)
    Position {
        target: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },
    /// Check that every configured group member exists on the controller
    Verify,
    /// Test connectivity, then device and group discovery
    Test,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Command(Command),
    Position(u8),
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Opts::parse();
    if let Err(e) = setup_tracing(opts.verbose, opts.json_logs) {
        eprintln!("Failed to set up logging {:?}", e);
    }

    match run(opts).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("✗ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(opts: &Opts) -> anyhow::Result<AppConfig> {
    let mut config = get_configuration(opts.config.clone())?;
    if let Some(url) = &opts.url {
        config.controller.base_url = url.clone();
    }
    if let Some(username) = &opts.username {
        config.controller.username = Some(username.clone());
    }
    if let Some(password) = &opts.password {
        config.controller.password = Some(Secret::new(password.clone()));
    }
    if let Some(timeout) = opts.timeout {
        config.controller.timeout_seconds = timeout;
    }
    Ok(config)
}

async fn run(opts: Opts) -> anyhow::Result<bool> {
    let config = load_config(&opts)?;
    let controller =
        NiceController::new(&config.controller).context("Failed to create controller client")?;

    match opts.command {
        BlindsCommand::List => {
            let devices = controller.discover_devices().await?;
            print_devices(&devices);
            Ok(true)
        }
        BlindsCommand::Groups { suggest } => {
            let directory = Directory::discover(&controller, config.groups.clone()).await?;
            print_groups(&directory, suggest);
            Ok(true)
        }
        BlindsCommand::Status { target } => {
            let directory = Directory::discover(&controller, config.groups.clone()).await?;
            status(&controller, &directory, &config, target.as_deref()).await
        }
        BlindsCommand::Open { target } => {
            dispatch(&controller, &config, &target, Action::Command(Command::Open)).await
        }
        BlindsCommand::Close { target } => {
            dispatch(&controller, &config, &target, Action::Command(Command::Close)).await
        }
        BlindsCommand::Stop { target } => {
            dispatch(&controller, &config, &target, Action::Command(Command::Stop)).await
        }
        BlindsCommand::Position { target, percent } => {
            dispatch(&controller, &config, &target, Action::Position(percent)).await
        }
        BlindsCommand::Verify => {
            let directory = Directory::discover(&controller, config.groups.clone()).await?;
            Ok(verify(&directory))
        }
        BlindsCommand::Test => test(&controller).await,
    }
}

fn print_devices(devices: &[DeviceInfo]) {
    println!("\n{}\nAvailable Devices\n{}\n", RULE, RULE);
    for (index, device) in devices.iter().enumerate() {
        println!(
            "{:2}. {:15} (ID: {:6}) - {}",
            index + 1,
            device.name,
            device.id.to_string(),
            device.module
        );
    }
    println!("\n{}\nTotal: {} devices\n{}\n", RULE, devices.len(), RULE);
}

fn print_groups(directory: &Directory, suggest: bool) {
    println!("\nController groups (target as group:<num>)");
    for group in directory.controller_groups() {
        println!("  {:>3}  {}", group.num, group.name);
    }

    println!("\nConfigured groups");
    for group in directory.groups() {
        println!(
            "  {} ({:?}): {}",
            group.name,
            group.dispatch,
            group.devices.join(", ")
        );
    }

    if suggest {
        println!("\nSuggested groups");
        for group in directory.suggest_groups() {
            println!("  {}: {}", group.name, group.devices.join(", "));
        }
    }
}

fn print_state(name: &str, state: &CoverState) {
    let position = state
        .position
        .map(|position| format!("{}%", position))
        .unwrap_or_else(|| String::from("unknown"));
    println!("{:20} {:8} position {}", name, state.label(), position);
}

fn covers_for(
    controller: &NiceController,
    config: &AppConfig,
    devices: &[DeviceInfo],
) -> Vec<BlindsCover> {
    devices
        .iter()
        .map(|device| {
            BlindsCover::new(device.clone(), controller.clone(), config.covers.move_time())
        })
        .collect()
}

async fn status(
    controller: &NiceController,
    directory: &Directory,
    config: &AppConfig,
    target: Option<&str>,
) -> anyhow::Result<bool> {
    let (covers, group) = match target.map(|target| directory.resolve(target)).transpose()? {
        None => (covers_for(controller, config, directory.devices()), None),
        Some(Target::Device(device)) => (covers_for(controller, config, &[device]), None),
        Some(Target::Group { config: group, members }) => {
            (covers_for(controller, config, &members), Some(group.name))
        }
        Some(Target::ControllerGroup(group)) => {
            println!("{} is kept by the controller and reports no status", group.name);
            return Ok(true);
        }
    };

    StatusPoller::new(controller.clone(), covers.clone(), vec![], None)
        .poll_once()
        .await?;

    for cover in &covers {
        print_state(cover.name(), &cover.state().await);
    }
    if let Some(name) = group {
        let group = CoverGroup::new(&name, covers, Default::default(), Default::default());
        print_state(&format!("{} (group)", name), &group.state().await);
    }
    Ok(true)
}

async fn dispatch(
    controller: &NiceController,
    config: &AppConfig,
    target: &str,
    action: Action,
) -> anyhow::Result<bool> {
    let directory = Directory::discover(controller, config.groups.clone()).await?;

    match directory.resolve(target)? {
        Target::Device(device) => {
            let cover = BlindsCover::new(device, controller.clone(), config.covers.move_time());
            match action {
                Action::Command(command) => cover.command(command).await?,
                Action::Position(position) => {
                    cover.update().await?;
                    cover.set_position(position).await?
                }
            }
            println!("✓ {} sent to {} ({})", describe(action), cover.name(), cover.id());
            Ok(true)
        }
        Target::Group {
            config: group,
            members,
        } => {
            let covers = covers_for(controller, config, &members);
            let group = CoverGroup::new(
                &group.name,
                covers.clone(),
                group.dispatch,
                config.covers.group_command_delay(),
            );
            let report = match action {
                Action::Command(command) => group.command(command).await,
                Action::Position(position) => {
                    StatusPoller::new(controller.clone(), covers, vec![], None)
                        .poll_once()
                        .await?;
                    group.set_position(position).await
                }
            };
            println!(
                "{} {} sent to group {} ({}/{} members)",
                if report.is_success() { "✓" } else { "✗" },
                describe(action),
                group.name(),
                report.attempted - report.failed.len(),
                report.attempted
            );
            for failed in &report.failed {
                println!("  ✗ {}", failed);
            }
            Ok(report.is_success())
        }
        Target::ControllerGroup(group) => {
            let group = ControllerGroupCover::new(group, controller.clone());
            match action {
                Action::Command(command) => group.command(command).await?,
                Action::Position(position) => group.set_position(position)?,
            }
            println!("✓ {} sent to controller group {} ({})", describe(action), group.name(), group.num());
            Ok(true)
        }
    }
}

fn describe(action: Action) -> String {
    match action {
        Action::Command(command) => command.to_string(),
        Action::Position(position) => format!("position {}%", position),
    }
}

fn verify(directory: &Directory) -> bool {
    println!("\n{}\nGROUP VERIFICATION\n{}", RULE, RULE);
    println!("✓ Found {} devices on controller", directory.devices().len());

    let report = directory.verify_groups();
    let mut total_found = 0;
    let mut total_missing = 0;

    for group in &report {
        println!(
            "\n{} ({} devices)",
            group.group,
            group.found.len() + group.missing.len()
        );
        for device in &group.found {
            println!(
                "  ✓ {:<20} → ID: {:<8} (adr={}, ept={})",
                device.name,
                device.id.to_string(),
                device.id.adr,
                device.id.ept
            );
        }
        for member in &group.missing {
            println!("  ✗ {:<20} → NOT FOUND ON CONTROLLER", member.name);
            if !member.similar.is_empty() {
                println!("     Similar devices: {}", member.similar.join(", "));
            }
        }
        total_found += group.found.len();
        total_missing += group.missing.len();
    }

    println!("\n{}\nSUMMARY\n{}", RULE, RULE);
    println!("Total devices in groups: {}", total_found + total_missing);
    println!("  ✓ Found:   {}", total_found);
    println!("  ✗ Missing: {}", total_missing);
    if total_missing > 0 {
        println!("\nRun 'blinds list' to see the names the controller reports");
    }
    total_missing == 0
}

async fn test(controller: &NiceController) -> anyhow::Result<bool> {
    println!("\n{}\nTesting Nice Controller Connection\n{}", RULE, RULE);

    if !controller.test_connection().await {
        println!("✗ Failed to connect to {}", controller.base_url());
        return Ok(false);
    }
    println!("✓ Base URL reachable: {}", controller.base_url());

    let devices = controller
        .discover_devices()
        .await
        .context("Device discovery failed")?;
    println!("✓ Device list: {} installed devices", devices.len());

    match controller.discover_groups().await {
        Ok(groups) => println!("✓ Group list: {} enabled groups", groups.len()),
        Err(e) => println!("✗ Group list unavailable: {}", e),
    }
    Ok(true)
}
