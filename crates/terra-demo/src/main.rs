//! Headless streaming demo.
//!
//! Walks a viewpoint across generated terrain for a fixed number of frames,
//! streaming chunks around it and carving a voxel under it now and then.
//! Configuration is loaded from `config.ron` and can be overridden via CLI
//! flags, e.g. `cargo run -p terra-demo -- --render-distance 6 --frames 900`.

mod fixed_step;

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use glam::{IVec3, Vec3};
use tracing::{error, info, warn};

use terra_config::{CliArgs, Config};
use terra_generation::cpu::default_thread_count;
use terra_generation::{BufferLayout, CpuBackend, HostMeshSink, MeshSink};
use terra_render::{GpuContext, GpuMeshSink};
use terra_stream::{StreamError, StreamingWorld};
use terra_voxel::{ChunkAddressing, Voxel, VoxelStore};

use crate::fixed_step::FixedStep;

/// Frame pacing for the headless loop.
const FRAME_TIME: Duration = Duration::from_millis(16);

/// Horizontal walking speed in chunks per second.
const WALK_CHUNKS_PER_SECOND: f32 = 1.5;

/// Simulation steps between carved voxels.
const CARVE_EVERY_STEPS: u64 = 40;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("failed to start generation workers: {0}")]
    Workers(#[source] std::io::Error),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Sinks the demo can drive; GPU sinks submit staged writes once per frame.
trait FrameSink: MeshSink {
    fn end_frame(&self) {}
}

impl FrameSink for HostMeshSink {}

impl FrameSink for GpuMeshSink {
    fn end_frame(&self) {
        self.flush();
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .unwrap_or_else(terra_config::default_config_dir);
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    terra_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let gpu = if args.gpu {
        GpuContext::new_blocking()
            .inspect_err(|e| warn!(error = %e, "no GPU available; counting meshes on the host"))
            .ok()
    } else {
        None
    };

    let result = match gpu {
        Some(context) => {
            let sink = GpuMeshSink::new(context, &BufferLayout::from_world(&config.world));
            run(&config, args.frames, sink, |sink| {
                info!(
                    live_meshes = sink.live(),
                    gpu_bytes = sink.pool().gpu_memory_in_use(),
                    adapter = %sink.context().adapter_info.name,
                    "gpu meshes resident"
                );
            })
        }
        None => run(&config, args.frames, HostMeshSink::new(), |sink| {
            info!(
                live_meshes = sink.live(),
                uploads = sink.uploads(),
                vertices = sink.total_vertices(),
                "host meshes resident"
            );
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "streaming stopped");
            ExitCode::FAILURE
        }
    }
}

/// Walk the viewpoint for `frames` frames, then report on the sink and shut down.
fn run<S: FrameSink>(
    config: &Config,
    frames: u64,
    sink: S,
    report: impl FnOnce(&S),
) -> Result<(), DemoError> {
    let store = VoxelStore::new(ChunkAddressing::from_world(&config.world));
    let threads = match config.generation.worker_threads {
        0 => default_thread_count(),
        n => n,
    };
    let backend =
        CpuBackend::new(&config.world, store.clone(), threads).map_err(DemoError::Workers)?;
    let mut world = StreamingWorld::start(config, store, Box::new(backend), sink)?;

    let chunk = config.world.chunk_size as f32;
    let speed = WALK_CHUNKS_PER_SECOND * chunk;
    let heading = Vec3::new(1.0, 0.0, 0.35).normalize();
    let carve_height = config.world.max_height as i32 / 4;
    let mut position = Vec3::new(0.5, config.world.max_height as f32 * 0.6, 0.5);
    world.set_viewpoint(position);

    let mut stepper = FixedStep::new(config.world.tick_ms.max(1) as f64 / 1000.0);
    let mut steps = 0_u64;
    let log_every = config.debug.log_stats_every_frames;
    for frame in 1..=frames {
        let mut carve = None;
        stepper.tick(|dt| {
            position += heading * speed * dt as f32;
            steps += 1;
            if steps % CARVE_EVERY_STEPS == 0 {
                let at = position.floor().as_ivec3();
                carve = Some(IVec3::new(at.x, carve_height, at.z));
            }
        });
        world.set_viewpoint(position);
        if let Some(at) = carve {
            world.set_world_voxel(at, Voxel::AIR)?;
        }

        world.tick()?;
        world.sink().end_frame();

        if log_every > 0 && frame % log_every == 0 {
            let driver = world.driver();
            info!(
                frame,
                cell = ?world.viewpoint_cell(),
                desired = world.desired_anchors().len(),
                in_flight = driver.in_flight(),
                pool_buffers = driver.pool().allocated(),
                edits = world.store().active_voxel_count(),
                stats = %world.stats(),
                "streaming"
            );
        }
        thread::sleep(FRAME_TIME);
    }

    let aggregate = world.refresh_aggregates();
    info!(
        populated = aggregate.populated,
        trees = aggregate.tree_count,
        water = aggregate.contains_water,
        average_height = aggregate.average_height,
        simulated_steps = stepper.steps(),
        "world summary"
    );
    report(world.sink());
    world.shutdown();
    Ok(())
}
