//! visiond - vision node daemon
//!
//! This daemon:
//! 1. Brings up the camera and the local display (failure is fatal)
//! 2. Joins the network, or continues offline after the bounded join
//! 3. Selects an inference engine from the registry
//! 4. Runs the capture/infer/publish loop, serving the HTTP control surface
//!    and MJPEG streams between cycles, until Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use vision_node::{
    api::ControlSurface,
    detect::{EngineRegistry, InferenceEngine, ResultAggregator, StubEngine},
    display::{ConsoleDisplay, DisplayMode, DisplayPresenter},
    error::InitError,
    ingest::{open_camera, SharedCamera},
    network::{join_network, HostLink, NetworkLink, OfflineLink},
    scheduler::Scheduler,
    state::shared_state,
    status::SystemStatus,
    stream::StreamHub,
    VisionConfig,
};

#[derive(Parser, Debug)]
#[command(name = "visiond", about = "Vision node capture/inference daemon")]
struct Args {
    /// Path to a JSON or TOML config file
    #[arg(long, env = "VISION_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// UI mode for the console display (auto|plain|pretty)
    #[arg(long, value_name = "MODE")]
    ui: Option<String>,

    /// Skip the network join; no control surface or streaming
    #[arg(long)]
    offline: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let boot = Instant::now();
    let args = Args::parse();

    let mut config = VisionConfig::load_from(args.config.as_deref())?;
    if args.offline {
        config.network.offline = true;
    }
    if let Some(ui) = args.ui.as_deref() {
        config.display = DisplayMode::from_flag(Some(ui));
    }

    let (writer, reader) = shared_state();
    writer.publish_status(SystemStatus::Initializing)?;

    let (camera, display) = match init_hardware(&config) {
        Ok(hardware) => hardware,
        Err(err) => {
            writer.publish_status(err.status())?;
            log::error!("{}", err);
            return Err(err.into());
        }
    };
    writer.publish_status(SystemStatus::CameraReady)?;

    let network = {
        let mut link: Box<dyn NetworkLink> = if config.network.offline {
            Box::new(OfflineLink)
        } else {
            Box::new(HostLink::new(config.network.probe_addr.clone()))
        };
        join_network(link.as_mut(), config.join_policy(), std::thread::sleep)
    };
    let online = network.connected;
    writer.set_network(network)?;

    let mut engine = select_engine(&config)?;
    engine.warm_up()?;
    let native = camera.acquire()?.resolution();
    log::info!(
        "engine {} ({:?}) input {}; camera native {}; labels [{}]",
        engine.name(),
        engine.mode(),
        engine.input_resolution(),
        native,
        engine.labels().join(", ")
    );
    let aggregator = ResultAggregator::for_engine(config.aggregator_config(), engine.as_ref());

    let surface = if online {
        let hub = StreamHub::new(
            camera.clone(),
            config.http.stream_write_timeout,
            config.http.stream_frame_interval,
        );
        Some(ControlSurface::bind(config.api_config(), reader, hub)?)
    } else {
        // Offline is reported once; the first cycle replaces it.
        writer.publish_status(SystemStatus::WiFiFailed)?;
        log::warn!("offline: control surface and streaming disabled");
        None
    };
    if online {
        writer.publish_status(SystemStatus::Running)?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    log::info!("visiond running. camera {}", config.camera.url);
    let mut scheduler = Scheduler::new(
        camera,
        engine,
        aggregator,
        writer,
        display,
        surface,
        config.scheduler.clone(),
    )
    .with_boot(boot);
    scheduler.run(&shutdown)?;
    log::info!("visiond stopped");
    Ok(())
}

fn init_hardware(
    config: &VisionConfig,
) -> Result<(SharedCamera, Box<dyn DisplayPresenter>), InitError> {
    let mut camera = open_camera(&config.camera).map_err(InitError::Camera)?;
    camera.init().map_err(InitError::Camera)?;
    log::info!(
        "camera {} ready at {} ({})",
        camera.name(),
        camera.resolution(),
        config.camera.url
    );

    let mut display = ConsoleDisplay::new(config.display, std::io::stderr().is_terminal());
    display.init().map_err(InitError::Display)?;
    Ok((SharedCamera::new(camera), Box::new(display)))
}

fn select_engine(config: &VisionConfig) -> Result<Box<dyn InferenceEngine>> {
    let mut registry = EngineRegistry::new();
    registry.register(StubEngine::new(config.stub_engine_config()));

    #[cfg(feature = "backend-tract")]
    if let Some(path) = &config.engine.model_path {
        let engine = vision_node::detect::TractEngine::new(
            path,
            config.engine.input,
            config.engine.labels.clone(),
        )?;
        registry.register(engine);
    }

    log::info!("engines available: {}", registry.list().join(", "));
    registry.set_default(&config.engine.name)?;
    registry.take_default()
}
