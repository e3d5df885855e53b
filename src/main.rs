use std::io::BufRead;
use std::thread;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use followfly::config::FollowConfig;
use followfly::control::SimulatedVehicle;
use followfly::geometry::ned;
use followfly::io::{DetectionScript, ReplayFrameSource, ScriptedDetector, scripted_tracker_factory};
use followfly::system::{
    COMMAND_HELP, FollowSystem, TELEMETRY_CHANNEL_CAPACITY, TelemetryMsg, Worker, run_session,
};
use followfly::vision::FrameGeometry;

/// Follow a person with a drone, using a camera or a recorded detection log.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// YAML config file; missing keys use the built-in defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial tracking distance in meters
    #[arg(short, long)]
    distance: Option<f64>,

    /// Replay detections from a CSV log (frame,x,y,w,h,confidence)
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Stop at the end of the replay instead of looping
    #[arg(long)]
    no_loop: bool,

    /// Frame width used for replayed detections
    #[arg(long, default_value_t = 640)]
    frame_width: u32,

    /// Frame height used for replayed detections
    #[arg(long, default_value_t = 480)]
    frame_height: u32,

    /// Camera index
    #[cfg(feature = "opencv")]
    #[arg(long, default_value_t = 0)]
    camera: i32,

    /// Stream telemetry to a Rerun viewer
    #[cfg(feature = "viz")]
    #[arg(long)]
    viz: bool,

    /// Start following immediately instead of waiting for `start`
    #[arg(long)]
    start: bool,
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => FollowConfig::load(path)?,
        None => FollowConfig::default(),
    };
    if let Some(distance) = args.distance {
        config.initial_distance = distance;
    }

    // SIGINT/SIGTERM end the session like `quit`.
    let (signal_tx, signal_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(());
    })
    .context("Failed to install signal handler")?;

    let (telemetry_tx, telemetry_rx) = bounded::<TelemetryMsg>(TELEMETRY_CHANNEL_CAPACITY);
    let drain = spawn_telemetry_drain(telemetry_rx, &args)?;

    let mut system = FollowSystem::new(config)?.with_telemetry(telemetry_tx);
    start_vision(&mut system, &args)?;

    // No flight link in this build: commands go to a simulated vehicle.
    let vehicle = SimulatedVehicle::new(ned(0.0, 0.0, 0.0));
    info!("Running in simulation mode");

    if args.start {
        system.start_following(vehicle.clone(), vehicle.clone())?;
    }

    let lines = spawn_stdin_reader()?;

    println!("{}", COMMAND_HELP);
    let end = run_session(&mut system, &vehicle, &lines, &signal_rx, &mut std::io::stdout())?;
    info!("Shutting down ({:?})", end);
    let timeout = system.config().shutdown_timeout();
    system.shutdown();
    drop(system);
    drain.stop(timeout);
    Ok(())
}

fn start_vision(system: &mut FollowSystem, args: &Args) -> Result<()> {
    if let Some(path) = &args.replay {
        let geometry = FrameGeometry::new(args.frame_width, args.frame_height);
        return start_replay(system, path, geometry, !args.no_loop);
    }
    start_camera(system, args)
}

fn start_replay(
    system: &mut FollowSystem,
    path: &Path,
    geometry: FrameGeometry,
    looping: bool,
) -> Result<()> {
    let script = Arc::new(DetectionScript::from_path(path)?);
    system.start_vision(move || {
        Ok((
            ReplayFrameSource::new(Arc::clone(&script), geometry, looping),
            ScriptedDetector::new(Arc::clone(&script)),
            scripted_tracker_factory(script),
        ))
    })
}

#[cfg(feature = "opencv")]
fn start_camera(system: &mut FollowSystem, args: &Args) -> Result<()> {
    use followfly::vision::opencv_backend::{CameraFrameSource, HogPersonDetector, KcfTracker};

    let index = args.camera;
    system.start_vision(move || {
        let camera = CameraFrameSource::open(index)?;
        let detector = HogPersonDetector::new()?;
        Ok((camera, detector, KcfTracker::new))
    })
}

#[cfg(not(feature = "opencv"))]
fn start_camera(_system: &mut FollowSystem, _args: &Args) -> Result<()> {
    anyhow::bail!(
        "Built without camera support; pass --replay <csv> or rebuild with --features opencv"
    )
}

#[cfg(feature = "viz")]
type Visualizer = followfly::viz::RerunVisualizer;

#[cfg(feature = "viz")]
fn open_visualizer(args: &Args) -> Result<Option<Visualizer>> {
    if !args.viz {
        return Ok(None);
    }
    Ok(Some(Visualizer::new("followfly")?))
}

/// Stand-in when the viewer is not compiled in.
#[cfg(not(feature = "viz"))]
struct Visualizer;

#[cfg(not(feature = "viz"))]
impl Visualizer {
    fn log_telemetry(&self, _msg: &TelemetryMsg) {}
}

#[cfg(not(feature = "viz"))]
fn open_visualizer(_args: &Args) -> Result<Option<Visualizer>> {
    Ok(None)
}

/// Forward stdin lines to a channel; it disconnects at end of input.
///
/// The thread blocks on stdin, so it is left detached instead of joined.
fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = bounded::<String>(16);
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read command: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn stdin thread")?;
    Ok(rx)
}

/// Consume telemetry so the loops never see a full channel for long.
fn spawn_telemetry_drain(rx: Receiver<TelemetryMsg>, args: &Args) -> Result<Worker> {
    let viz = open_visualizer(args)?;

    Worker::spawn("telemetry", move |stop| {
        while !stop.is_cancelled() {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(msg) => {
                    debug!("{:?}", msg);
                    if let Some(viz) = &viz {
                        viz.log_telemetry(&msg);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })
    .context("Failed to spawn telemetry thread")
}
