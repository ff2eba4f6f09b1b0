use anyhow::{Context, Result, ensure};
use clap::Parser;
use savanna_core::{AgentId, AwarenessState, ColorHint, SavannaConfig, ScenePresenter, WorldState};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Headless driver for the savanna hunt: stands in for the authoring-tool
/// host by supplying frame indices and a fixed frame time.
#[derive(Debug, Parser)]
#[command(name = "savanna", about = "Run the herd-and-pack simulation headlessly")]
struct Args {
    /// Scenario file (JSON `SavannaConfig`); defaults to the built-in demo
    /// hunt.
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Number of host frames to simulate.
    #[arg(long, default_value_t = 600)]
    frames: u64,
    /// Host frame rate in frames per second.
    #[arg(long, default_value_t = 24.0)]
    fps: f32,
    /// Reset the simulation after this many frames and play the remainder
    /// from the top of the timeline.
    #[arg(long)]
    reset_after: Option<u64>,
    /// How often (in frames) to log a progress summary.
    #[arg(long, default_value_t = 120)]
    report_every: u64,
}

/// Forwards restyle hints to the log; a real host would recolour the bound
/// scene objects instead.
#[derive(Debug, Default)]
struct StylePresenter;

impl ScenePresenter for StylePresenter {
    fn set_visual_state(&mut self, agent: AgentId, color: ColorHint) {
        debug!(?agent, ?color, "restyle hint");
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    ensure!(
        args.fps.is_finite() && args.fps > 0.0,
        "--fps must be a positive number"
    );

    let config = load_scenario(args.scenario.as_deref())?;
    let mut world = WorldState::with_presenter(config, Box::new(StylePresenter))?;
    info!(
        herd = world.herd().len(),
        pack = world.pack().len(),
        "savanna simulation ready"
    );

    let dt = 1.0 / args.fps;
    let (first_leg, second_leg) = match args.reset_after {
        Some(cut) if cut < args.frames => (cut, args.frames - cut),
        _ => (args.frames, 0),
    };

    run_frames(&mut world, first_leg, dt, args.report_every);
    if second_leg > 0 {
        info!(after = first_leg, "resetting simulation mid-run");
        world.reset();
        run_frames(&mut world, second_leg, dt, args.report_every);
    }

    let centroid = world.herd_centroid();
    info!(
        live_prey = world
            .herd()
            .iter()
            .filter(|prey| prey.state() != AwarenessState::Dead)
            .count(),
        centroid_x = centroid.x,
        centroid_z = centroid.z,
        "simulation finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_scenario(path: Option<&Path>) -> Result<SavannaConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading scenario {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing scenario {}", path.display()))
        }
        None => Ok(SavannaConfig::demo()),
    }
}

/// Drive the world from the top of the host timeline for `frames` frames.
fn run_frames(world: &mut WorldState, frames: u64, dt: f32, report_every: u64) {
    let mut kills = 0_usize;
    for frame in 2..2 + frames {
        let report = world.tick(frame, dt);
        kills += report.prey_killed;
        if report.prey_killed > 0 {
            info!(frame, live_prey = report.live_prey, "the pack made a kill");
        }
        if report_every > 0 && frame.is_multiple_of(report_every) {
            let states: Vec<String> = world
                .pack()
                .iter()
                .map(|predator| format!("{}={:?}", predator.name(), predator.state()))
                .collect();
            info!(
                frame,
                live_prey = report.live_prey,
                alerted = report.herd_alerted,
                pack = %states.join(" "),
                "progress"
            );
        }
    }
    info!(frames, kills, "leg complete");
}
