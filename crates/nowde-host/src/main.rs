//! `nowde` command-line tool.
//!
//! Offline helpers for the Nowde SysEx protocol: decode captured traffic,
//! build frames by hand, plan a firmware push, and replay a capture through a
//! bridge to see what the host would have done.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use nowde_host::{parse_media_index, Bridge, BridgeConfig, BridgeError, MemoryTransport, OtaError, OtaTransfer};
use nowde_protocol::{
    describe_frame, hex_dump, parse_hex, Command, DeviceConfig, MacAddress, PlaybackState, ProtocolError,
    SysExFramer, MAX_DELAY_MS,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Port name the replay bridge connects to.
const REPLAY_PORT: &str = "replay";

#[derive(Parser, Debug)]
#[command(name = "nowde", version, about = "Nowde SysEx protocol tool")]
struct Args {
    /// Bridge configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Describe every SysEx frame in a hex dump
    Decode {
        /// Hex bytes, e.g. `F0 7D 01 F7` (whitespace, commas and 0x prefixes are ignored)
        #[arg(required = true)]
        hex: Vec<String>,
    },

    /// Print the frame for a host command
    Encode {
        #[command(subcommand)]
        command: EncodeCommand,
    },

    /// Show how a firmware image would be transferred
    OtaPlan {
        /// Firmware image
        file: PathBuf,
    },

    /// Feed captured sender traffic through a bridge and print what it does
    Replay {
        /// File containing a hex dump of bytes received from the sender
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum EncodeCommand {
    /// QUERY_CONFIG
    QueryConfig,
    /// PUSH_FULL_CONFIG
    PushConfig {
        /// Enable RF delay simulation
        #[arg(long)]
        rf_simulation: bool,
        /// Maximum simulated delay in milliseconds
        #[arg(long, default_value_t = 400)]
        max_delay_ms: u16,
    },
    /// QUERY_RUNNING_STATE
    QueryRunningState,
    /// ENTER_BOOTLOADER
    EnterBootloader,
    /// MEDIA_SYNC
    MediaSync {
        /// Layer name
        layer: String,
        /// Media index, or a filename such as `012_intro.mp4`
        media: String,
        /// Position in milliseconds
        #[arg(long, default_value_t = 0)]
        position_ms: u32,
        /// Playback state
        #[arg(long, value_enum, default_value_t = StateArg::Playing)]
        state: StateArg,
    },
    /// CHANGE_RECEIVER_LAYER
    ChangeLayer {
        /// Receiver MAC address (AA:BB:CC:DD:EE:FF)
        mac: MacAddress,
        /// New layer name
        layer: String,
    },
    /// OTA_BEGIN
    OtaBegin {
        /// Image size in bytes
        total_size: u32,
    },
    /// OTA_END
    OtaEnd,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StateArg {
    Playing,
    Stopped,
}

impl From<StateArg> for PlaybackState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Playing => PlaybackState::Playing,
            StateArg::Stopped => PlaybackState::Stopped,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Ota(#[from] OtaError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no complete SysEx frame in input")]
    NoFrames,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    nowde_metrics::describe_metrics();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            BridgeConfig::load(path)?
        }
        None => BridgeConfig::default(),
    };

    match args.command {
        Commands::Decode { hex } => decode(&hex.join(" ")),
        Commands::Encode { command } => {
            encode(command);
            Ok(())
        }
        Commands::OtaPlan { file } => ota_plan(&file, config),
        Commands::Replay { file } => replay(&file, config),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn decode(hex: &str) -> Result<(), CliError> {
    let bytes = parse_hex(hex)?;
    let mut framer = SysExFramer::new();
    framer.push(&bytes);

    let mut frames = 0;
    while let Some(frame) = framer.decode() {
        frames += 1;
        println!("{}", describe_frame(&frame));
    }
    if framer.in_frame() {
        info!("{} trailing bytes form an incomplete frame", framer.buffered_len());
    }
    if frames == 0 {
        return Err(CliError::NoFrames);
    }
    Ok(())
}

fn encode(command: EncodeCommand) {
    let command = match command {
        EncodeCommand::QueryConfig => Command::QueryConfig,
        EncodeCommand::PushConfig {
            rf_simulation,
            max_delay_ms,
        } => Command::PushFullConfig(DeviceConfig {
            rf_simulation_enabled: rf_simulation,
            max_delay_ms: max_delay_ms.min(MAX_DELAY_MS),
        }),
        EncodeCommand::QueryRunningState => Command::QueryRunningState,
        EncodeCommand::EnterBootloader => Command::EnterBootloader,
        EncodeCommand::MediaSync {
            layer,
            media,
            position_ms,
            state,
        } => {
            let media_index = media.parse::<u8>().unwrap_or_else(|_| parse_media_index(&media));
            Command::MediaSync {
                layer,
                media_index,
                position_ms,
                state: state.into(),
            }
        }
        EncodeCommand::ChangeLayer { mac, layer } => Command::ChangeReceiverLayer { mac, layer },
        EncodeCommand::OtaBegin { total_size } => Command::OtaBegin { total_size },
        EncodeCommand::OtaEnd => Command::OtaEnd,
    };
    let frame = command.encode();
    println!("{}", hex_dump(&frame));
    println!("{}", describe_frame(&frame));
}

fn ota_plan(path: &Path, config: BridgeConfig) -> Result<(), CliError> {
    let firmware = read_file(path)?;
    let transfer = OtaTransfer::new(firmware, config.ota.clone())?;
    let chunk_count = transfer.chunk_count();

    println!("Image:     {} ({} bytes)", path.display(), transfer.total_size());
    println!("Chunks:    {} x {} bytes", chunk_count, config.ota.chunk_size());
    println!("Frames:    {} (OTA_BEGIN, {} OTA_DATA, OTA_END)", chunk_count + 2, chunk_count);
    println!(
        "Estimate:  {:.1}s plus {:.1}s reboot",
        transfer.estimated_duration().as_secs_f64(),
        config.ota.reboot_delay_ms as f64 / 1000.0
    );
    Ok(())
}

fn replay(path: &Path, config: BridgeConfig) -> Result<(), CliError> {
    let text = read_file(path)?;
    let bytes = parse_hex(&String::from_utf8_lossy(&text))?;

    let transport = MemoryTransport::new([REPLAY_PORT]);
    let bridge = Bridge::new(transport.clone(), config);
    let events = bridge.events();
    bridge.connect(REPLAY_PORT)?;
    bridge.receive(&bytes);

    println!("Events:");
    for event in events.try_iter() {
        println!("  {:?}", event);
    }
    println!("Sent:");
    for frame in transport.sent_frames() {
        println!("  {}", describe_frame(&frame));
    }
    println!("Receivers:");
    for receiver in bridge.receivers() {
        println!(
            "  {} {} layer '{}' v{} seen {}ms ago ({})",
            receiver.record.name(),
            receiver.record.mac,
            receiver.record.layer,
            receiver.record.version,
            receiver.record.last_seen_ms,
            receiver.status()
        );
    }
    bridge.shutdown();
    Ok(())
}
