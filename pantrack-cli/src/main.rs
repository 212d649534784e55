// pantrack command line interface
// Runs the servo loop, checks configuration, exercises the actuator link.

#[cfg(feature = "gui")]
mod tuning;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use pantrack_core::{ServoConfig, TelemetryFormat};
use pantrack_eye::processing::{frame_center, to_angle};
use pantrack_eye::{ColorSegmenter, FrameSource, ReplaySource, TargetLocator};
use pantrack_servo::{
    open_sink, ActuatorTransport, DryRunTransport, Headless, LoopSummary, ServoLoop, StaticConfig,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pantrack")]
#[command(about = "Single-axis visual servo: keep a colored target centered", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or JSON)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracking loop
    Run {
        /// Camera device index
        #[arg(long)]
        camera: Option<u32>,

        /// Replay image files from a directory instead of a camera
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Serial port of the actuator controller
        #[arg(long, short)]
        port: Option<String>,

        /// Log commands instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,

        /// Disable horizontal mirroring
        #[arg(long)]
        no_mirror: bool,

        /// Telemetry format
        #[arg(long, value_enum)]
        telemetry: Option<TelemetryArg>,

        /// Capture frames on a separate thread, always processing the newest
        #[arg(long)]
        capture_thread: bool,

        /// Show preview windows and threshold trackbars
        #[arg(long)]
        gui: bool,
    },

    /// Load, validate and print the effective configuration
    CheckConfig,

    /// Send a fixed list of angles to the actuator
    Sweep {
        /// Comma-separated angles
        #[arg(long, default_value = "90,60,120,90")]
        angles: String,

        /// Pause after each command, in milliseconds
        #[arg(long, default_value = "300")]
        delay_ms: u64,

        #[arg(long, short)]
        port: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Run segmentation and target location on a still image
    Detect {
        image: PathBuf,

        /// Mirror the image first, as the live loop does
        #[arg(long)]
        mirror: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TelemetryArg {
    Csv,
    Jsonl,
    Off,
}

impl From<TelemetryArg> for TelemetryFormat {
    fn from(arg: TelemetryArg) -> Self {
        match arg {
            TelemetryArg::Csv => TelemetryFormat::Csv,
            TelemetryArg::Jsonl => TelemetryFormat::Jsonl,
            TelemetryArg::Off => TelemetryFormat::Off,
        }
    }
}

/// Printed by `detect`.
#[derive(Serialize)]
struct DetectReport {
    frame_width: u32,
    frame_height: u32,
    found: bool,
    x: i32,
    y: i32,
    area: f64,
    angle_x_deg: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            camera,
            replay,
            port,
            dry_run,
            max_frames,
            no_mirror,
            telemetry,
            capture_thread,
            gui,
        } => {
            if let Some(index) = camera {
                config.camera.index = index;
            }
            if let Some(port) = port {
                config.transport.port = port;
            }
            if no_mirror {
                config.camera.mirror = false;
            }
            if let Some(format) = telemetry {
                config.telemetry.format = format.into();
            }
            config.validate()?;

            let source = open_source(&config, replay.as_deref(), capture_thread)?;
            let transport = open_transport(&config, dry_run)?;
            let summary = run_loop(source, transport, &config, max_frames, gui)?;
            println!(
                "frames: {}  detections: {}  commands sent: {}",
                summary.frames, summary.detections, summary.commands_sent
            );
        }
        Commands::CheckConfig => {
            config.validate()?;
            print!("{}", config.to_toml()?);
        }
        Commands::Sweep {
            angles,
            delay_ms,
            port,
            dry_run,
        } => {
            if let Some(port) = port {
                config.transport.port = port;
            }
            let angles = parse_angles(&angles)?;
            let mut transport = open_transport(&config, dry_run)?;
            sweep(transport.as_mut(), &angles, Duration::from_millis(delay_ms))?;
        }
        Commands::Detect { image, mirror } => {
            let report = detect(&image, &config, mirror)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// File (or defaults), then `PANTRACK_*` environment overrides.
fn load_config(path: Option<&Path>) -> anyhow::Result<ServoConfig> {
    let mut config = match path {
        Some(path) => ServoConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServoConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn open_source(
    config: &ServoConfig,
    replay: Option<&Path>,
    capture_thread: bool,
) -> anyhow::Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource + Send> = match replay {
        Some(dir) => Box::new(ReplaySource::from_dir(dir)?.with_mirror(config.camera.mirror)),
        None => open_camera(config)?,
    };

    if capture_thread {
        // The join handle is dropped; the thread ends when the receiver does.
        let (receiver, _handle) = pantrack_eye::spawn_capture(source)?;
        Ok(Box::new(receiver))
    } else {
        Ok(source)
    }
}

#[cfg(feature = "camera")]
fn open_camera(config: &ServoConfig) -> anyhow::Result<Box<dyn FrameSource + Send>> {
    Ok(Box::new(pantrack_eye::OpenCvCamera::open(&config.camera)?))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_config: &ServoConfig) -> anyhow::Result<Box<dyn FrameSource + Send>> {
    bail!("built without camera support; rebuild with --features camera or use --replay <dir>")
}

fn open_transport(config: &ServoConfig, dry_run: bool) -> anyhow::Result<Box<dyn ActuatorTransport>> {
    if dry_run {
        info!("Dry run: commands are logged, not sent");
        return Ok(Box::new(DryRunTransport::new()));
    }
    open_serial(config)
}

#[cfg(feature = "serial")]
fn open_serial(config: &ServoConfig) -> anyhow::Result<Box<dyn ActuatorTransport>> {
    match pantrack_servo::SerialTransport::open(&config.transport) {
        Ok(transport) => Ok(Box::new(transport)),
        Err(e) => {
            let ports = pantrack_servo::SerialTransport::available_ports();
            if !ports.is_empty() {
                warn!("Available serial ports: {}", ports.join(", "));
            }
            Err(e.into())
        }
    }
}

#[cfg(not(feature = "serial"))]
fn open_serial(config: &ServoConfig) -> anyhow::Result<Box<dyn ActuatorTransport>> {
    warn!("Cannot open {}: built without serial support", config.transport.port);
    bail!("built without serial support; rebuild with --features serial or pass --dry-run")
}

fn run_loop(
    source: Box<dyn FrameSource>,
    transport: Box<dyn ActuatorTransport>,
    config: &ServoConfig,
    max_frames: Option<u64>,
    gui: bool,
) -> anyhow::Result<LoopSummary> {
    let sink = open_sink(&config.telemetry)?;
    let mut servo = ServoLoop::new(source, transport, sink, config).with_max_frames(max_frames);

    info!(
        camera = config.camera.index,
        port = %config.transport.port,
        "Starting servo loop"
    );

    if gui {
        return run_gui(&mut servo, config);
    }
    Ok(servo.run(&mut StaticConfig(config.clone()), &mut Headless)?)
}

#[cfg(feature = "gui")]
fn run_gui(
    servo: &mut ServoLoop<Box<dyn FrameSource>, Box<dyn ActuatorTransport>>,
    config: &ServoConfig,
) -> anyhow::Result<LoopSummary> {
    let mut trackbars = tuning::TrackbarConfig::create(config.clone())?;
    let mut preview = tuning::Preview::create()?;
    Ok(servo.run(&mut trackbars, &mut preview)?)
}

#[cfg(not(feature = "gui"))]
fn run_gui(
    _servo: &mut ServoLoop<Box<dyn FrameSource>, Box<dyn ActuatorTransport>>,
    _config: &ServoConfig,
) -> anyhow::Result<LoopSummary> {
    bail!("built without GUI support; rebuild with --features gui")
}

fn parse_angles(list: &str) -> anyhow::Result<Vec<i32>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let angle: i32 = s.parse().with_context(|| format!("invalid angle '{}'", s))?;
            if !(0..=180).contains(&angle) {
                bail!("angle {} outside 0..=180", angle);
            }
            Ok(angle)
        })
        .collect()
}

/// Send each angle in turn, echoing the board's READY banner and any reply
/// that follows a command. Returns the replies in the order they arrived.
fn sweep(
    transport: &mut dyn ActuatorTransport,
    angles: &[i32],
    delay: Duration,
) -> anyhow::Result<Vec<String>> {
    let mut replies = Vec::new();
    match transport.read_reply()? {
        Some(banner) => {
            println!("{}: {}", transport.name(), banner);
            replies.push(banner);
        }
        None => info!("No banner from {}", transport.name()),
    }

    for &angle in angles {
        info!("Sweep -> {}", angle);
        transport.send_angle(angle)?;
        std::thread::sleep(delay);
        if let Some(reply) = transport.read_reply()? {
            println!("{} -> {}", angle, reply);
            replies.push(reply);
        }
    }
    println!("Sent {} commands on {}", angles.len(), transport.name());
    Ok(replies)
}

fn detect(path: &Path, config: &ServoConfig, mirror: bool) -> anyhow::Result<DetectReport> {
    let mut source = ReplaySource::from_frames(vec![image::open(path)
        .with_context(|| format!("reading {}", path.display()))?
        .to_rgb8()])
    .with_mirror(mirror);
    let frame = source.next_frame()?;

    let threshold = config.threshold.normalized();
    let mask = ColorSegmenter::new().segment(&frame, &threshold);
    let detection = TargetLocator::new().locate(&mask, threshold.min_area);

    let (width, height) = frame.dimensions();
    let (center_x, _) = frame_center(width, height);
    let angle_x_deg = detection
        .found
        .then(|| to_angle(detection.x, center_x, width, config.camera.fov_degrees));

    Ok(DetectReport {
        frame_width: width,
        frame_height: height,
        found: detection.found,
        x: detection.x,
        y: detection.y,
        area: detection.area,
        angle_x_deg,
    })
}
