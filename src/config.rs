use std::time::Duration;

use anyhow::{Context, bail};

use crate::{
    rendering::BACKGROUND,
    sim::{GridParameters, SeedPolicy},
    util::Color,
};

pub const DEFAULT_GRID_SIZE: u32 = 32;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Startup configuration of a run. Nothing here changes once the first tick
/// has been scheduled.
#[derive(Clone, Debug, PartialEq)]
pub struct LifeConfig {
    pub grid: GridParameters,
    /// Wall-clock time between two ticks
    pub tick_interval: Duration,
    /// Initial contents of cell buffer A
    pub seed_a: SeedPolicy,
    /// Initial contents of cell buffer B
    pub seed_b: SeedPolicy,
    pub background: Color,
    /// Id of the `<canvas>` element rendered into on the web
    pub canvas_id: String,
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            grid: GridParameters::square(DEFAULT_GRID_SIZE),
            tick_interval: DEFAULT_TICK_INTERVAL,
            seed_a: SeedPolicy::default(),
            seed_b: SeedPolicy::Alternating,
            background: BACKGROUND,
            canvas_id: "life-surface".to_string(),
        }
    }
}

impl LifeConfig {
    /// Defaults overridden by `GRIDLIFE_GRID`, `GRIDLIFE_TICK`,
    /// `GRIDLIFE_SEED_A` and `GRIDLIFE_SEED_B`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(grid) = lookup("GRIDLIFE_GRID") {
            config.grid = parse_grid(&grid).context("GRIDLIFE_GRID")?;
        }
        if let Some(tick) = lookup("GRIDLIFE_TICK") {
            let interval = humantime::parse_duration(tick.trim())
                .with_context(|| format!("GRIDLIFE_TICK: invalid duration `{tick}`"))?;
            if interval.is_zero() {
                bail!("GRIDLIFE_TICK must be greater than zero");
            }
            config.tick_interval = interval;
        }
        if let Some(seed) = lookup("GRIDLIFE_SEED_A") {
            config.seed_a = seed.parse().context("GRIDLIFE_SEED_A")?;
        }
        if let Some(seed) = lookup("GRIDLIFE_SEED_B") {
            config.seed_b = seed.parse().context("GRIDLIFE_SEED_B")?;
        }
        Ok(config)
    }
}

/// Parse `N` (square) or `WxH`
fn parse_grid(s: &str) -> anyhow::Result<GridParameters> {
    let s = s.trim();
    let params = match s.split_once(['x', 'X']) {
        Some((w, h)) => GridParameters::new(
            w.trim().parse().with_context(|| format!("invalid width in `{s}`"))?,
            h.trim().parse().with_context(|| format!("invalid height in `{s}`"))?,
        ),
        None => GridParameters::square(s.parse().with_context(|| format!("invalid size `{s}`"))?),
    };
    if params.width == 0 || params.height == 0 {
        bail!("grid {params} has no cells");
    }
    Ok(params)
}
