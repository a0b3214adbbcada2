//! Headless probe arena: bake a probe grid and render frames to PNG

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use probe_arena::{init_logging, AppConfig, AppContext, FailurePolicy};

/// Light probe arena
#[derive(Parser, Debug)]
#[command(
    name = "probe-arena",
    about = "Bake a light probe grid and render the probe-lit scene",
    long_about = "Loads a scene (or builds the default arena), bakes a lattice of \
        irradiance probes once loading completes, turns off the direct light and \
        renders the scene lit by the probes.\n\n\
        EXAMPLES:\n\
          # Render 60 frames of the built-in arena\n\
          probe-arena --frames 60 --output arena.png\n\
        \n\
          # Denser grid over a custom model\n\
          probe-arena --model arena.glb --probes 6 3 6 --spacing 1.5",
    version
)]
struct Args {
    /// glTF/GLB model to load instead of the built-in arena.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Number of frames to render before exiting.
    #[arg(long, default_value = "60")]
    frames: u64,

    /// Output frame width in pixels.
    #[arg(long, default_value = "640")]
    width: u32,

    /// Output frame height in pixels.
    #[arg(long, default_value = "360")]
    height: u32,

    /// Write the final frame to this PNG file.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Probe counts along x, y and z.
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [3, 1, 3])]
    probes: Vec<u32>,

    /// Distance between neighbouring probes.
    #[arg(long, default_value = "4.0")]
    spacing: f32,

    /// Cube face resolution used for each probe capture.
    #[arg(long, default_value = "256")]
    capture_resolution: u32,

    /// Intensity of every probe.
    #[arg(long, default_value = "0.45")]
    intensity: f32,

    /// Show probe marker spheres.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    debug_probes: bool,

    /// Keep the directional light on after baking.
    #[arg(long)]
    keep_direct_light: bool,

    /// Keep baking remaining probes after a failed capture.
    #[arg(long)]
    continue_on_failure: bool,

    /// Advance time by a fixed step per frame (seconds) instead of wall-clock time.
    #[arg(long)]
    fixed_dt: Option<f32>,
}

impl From<Args> for AppConfig {
    fn from(args: Args) -> Self {
        let mut config = AppConfig::default()
            .with_size(args.width, args.height)
            .with_capture_resolution(args.capture_resolution)
            .with_probe_intensity(args.intensity)
            .with_debug_probes(args.debug_probes)
            .with_keep_direct_light(args.keep_direct_light)
            .with_failure_policy(if args.continue_on_failure {
                FailurePolicy::Continue
            } else {
                FailurePolicy::Abort
            });

        if let [x, y, z] = args.probes[..] {
            config = config.with_probes([x, y, z], args.spacing);
        }
        config.model = args.model;
        config.output = args.output;
        config.fixed_dt = args.fixed_dt;
        config
    }
}

fn main() -> ExitCode {
    init_logging();

    let args = Args::parse();
    let frames = args.frames;
    let config = AppConfig::from(args);

    let result = AppContext::new(config).and_then(|mut app| app.run(frames));
    match result {
        Ok(stats) => {
            log::info!(
                "Rendered {} frames ({:.1} fps average, {} rays)",
                stats.frames,
                stats.average_fps(),
                stats.rays_traced
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
