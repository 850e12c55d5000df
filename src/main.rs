#[cfg(not(target_arch = "wasm32"))]
use gridlife::{
    config::LifeConfig,
    schedule::StepCounter,
    sim::{Grid, gpucompute::ComputeContext},
};

#[cfg(not(target_arch = "wasm32"))]
const DEFAULT_BENCH_STEPS: usize = 1000;

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    let level = std::env::var("GRIDLIFE_LOG")
        .ok()
        .and_then(|l| l.parse().ok())
        .unwrap_or(log::LevelFilter::Info);
    gridlife::util::setup_logging(level);

    let config = LifeConfig::from_env()?;
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("bench") => {
            let steps = match args.next() {
                Some(steps) => steps.parse()?,
                None => DEFAULT_BENCH_STEPS,
            };
            run_benchmark(config, steps)
        }
        Some(other) => anyhow::bail!("unknown command `{other}`, expected `bench [steps]`"),
        None => gridlife::run(config),
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

/// Step the headless compute pipeline and check it against the CPU model.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_benchmark(config: LifeConfig, steps: usize) -> anyhow::Result<()> {
    use std::time::Instant;

    let params = config.grid;
    let mut ctx = pollster::block_on(ComputeContext::create(
        params,
        &config.seed_a,
        &config.seed_b,
        StepCounter::new(),
    ))?;
    let start_grid = pollster::block_on(ctx.read_current())?;

    println!("running {steps} steps on a {params} grid");
    let start = Instant::now();
    for _ in 0..steps {
        ctx.step();
    }
    let gpu_grid = pollster::block_on(ctx.read_current())?;
    let gpu_time = start.elapsed();

    let start = Instant::now();
    let cpu_grid: Grid = start_grid.step_n(steps);
    let cpu_time = start.elapsed();

    println!(
        "gpu: {}μs per step, cpu: {}μs per step",
        (gpu_time / steps.max(1) as u32).as_micros(),
        (cpu_time / steps.max(1) as u32).as_micros()
    );
    println!(
        "population after {} steps: {} (cpu {})",
        ctx.steps(),
        gpu_grid.population(),
        cpu_grid.population()
    );
    if gpu_grid != cpu_grid {
        anyhow::bail!("device and CPU model diverged after {steps} steps");
    }
    Ok(())
}
