use std::{fmt, str::FromStr};

use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};

pub mod gpucompute;

/// Dimensions of the simulated grid, fixed for the lifetime of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridParameters {
    pub width: u32,
    pub height: u32,
}

impl GridParameters {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of workgroups needed to cover the grid with `tile x tile` groups
    pub fn workgroups(&self, tile: u32) -> (u32, u32) {
        (self.width.div_ceil(tile), self.height.div_ceil(tile))
    }

    /// Row-major linear index of a cell
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn coordinates(&self, index: usize) -> (u32, u32) {
        let width = self.width as usize;
        ((index % width) as u32, (index / width) as u32)
    }
}

impl fmt::Display for GridParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Next state of a single cell given its current state and the sum of its
/// eight neighbors.
#[inline(always)]
pub fn next_cell_state(current: u32, neighbors: u32) -> u32 {
    match neighbors {
        2 => current,
        3 => 1,
        _ => 0,
    }
}

/// A full grid snapshot on the CPU side.
///
/// This is the host mirror of one cell buffer: it seeds the device and is the
/// reference the device output is compared against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    params: GridParameters,
    cells: Vec<u32>,
}

impl Grid {
    pub fn new(params: GridParameters) -> Self {
        Self {
            params,
            cells: vec![0; params.cell_count()],
        }
    }

    pub fn seeded(params: GridParameters, policy: &SeedPolicy) -> Self {
        Self {
            params,
            cells: policy.seed(params),
        }
    }

    /// Wrap raw cell values read back from the device.
    pub fn from_cells(params: GridParameters, cells: Vec<u32>) -> Option<Self> {
        (cells.len() == params.cell_count()).then_some(Self { params, cells })
    }

    pub fn params(&self) -> GridParameters {
        self.params
    }

    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.cells[self.params.index(x, y)] != 0
    }

    pub fn set(&mut self, x: u32, y: u32, alive: bool) {
        let idx = self.params.index(x, y);
        self.cells[idx] = alive as u32;
    }

    pub fn population(&self) -> usize {
        self.cells.iter().filter(|c| **c != 0).count()
    }

    /// Coordinates of every live cell in row-major order
    pub fn live_cells(&self) -> Vec<(u32, u32)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != 0)
            .map(|(i, _)| self.params.coordinates(i))
            .collect()
    }

    /// Sum of the eight Moore neighbors. Edges wrap to the opposite side.
    #[inline(always)]
    pub fn live_neighbors(&self, x: u32, y: u32) -> u32 {
        let GridParameters { width, height } = self.params;

        const N: [(u32, u32); 8] = [
            (0, 0),
            (1, 0),
            (2, 0),
            (0, 1),
            (2, 1),
            (0, 2),
            (1, 2),
            (2, 2),
        ];

        // Offsets are shifted by +1 so the arithmetic stays unsigned; adding
        // `width - 1` is the same as subtracting one modulo `width`.
        N.iter()
            .map(|(dx, dy)| {
                let nx = (x + width + dx - 1) % width;
                let ny = (y + height + dy - 1) % height;
                self.cells[self.params.index(nx, ny)]
            })
            .sum()
    }

    /// Advance the whole grid by one generation, producing a new snapshot.
    pub fn step(&self) -> Grid {
        if self.cells.is_empty() {
            return self.clone();
        }
        let width = self.params.width as usize;
        let mut next = vec![0; self.cells.len()];
        next.par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    let (x, y) = (x as u32, y as u32);
                    let current = self.cells[self.params.index(x, y)];
                    *cell = next_cell_state(current, self.live_neighbors(x, y));
                }
            });
        Grid {
            params: self.params,
            cells: next,
        }
    }

    pub fn step_n(&self, steps: usize) -> Grid {
        let mut grid = self.clone();
        for _ in 0..steps {
            grid = grid.step();
        }
        grid
    }
}

/// How the initial contents of a cell buffer are produced.
#[derive(Clone, Debug, PartialEq)]
pub enum SeedPolicy {
    /// Every cell starts dead
    Empty,
    /// Cells with an odd index start alive
    Alternating,
    /// Each cell is alive with probability `density`. A fixed `seed` makes
    /// the layout reproducible.
    Random { density: f32, seed: Option<u64> },
    /// Exactly the listed cells start alive
    Pattern(Vec<(u32, u32)>),
}

impl Default for SeedPolicy {
    fn default() -> Self {
        SeedPolicy::Random {
            density: 0.4,
            seed: None,
        }
    }
}

impl SeedPolicy {
    /// The standard five cell glider, heading towards +x/+y, placed with its
    /// bounding box starting at `(x, y)`.
    pub fn glider(x: u32, y: u32) -> Self {
        SeedPolicy::Pattern(
            [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)]
                .into_iter()
                .map(|(dx, dy)| (x + dx, y + dy))
                .collect(),
        )
    }

    /// Build the seed array for a grid. The per-cell seed function is called
    /// exactly once per cell, in index order.
    pub fn seed(&self, params: GridParameters) -> Vec<u32> {
        let count = params.cell_count();
        match self {
            SeedPolicy::Empty => vec![0; count],
            SeedPolicy::Alternating => (0..count).map(|i| (i % 2) as u32).collect(),
            SeedPolicy::Random { density, seed } => {
                let mut rng = match seed {
                    Some(seed) => fastrand::Rng::with_seed(*seed),
                    None => fastrand::Rng::new(),
                };
                (0..count)
                    .map(|_| (rng.f32() < *density) as u32)
                    .collect()
            }
            SeedPolicy::Pattern(cells) => {
                let mut out = vec![0; count];
                for &(x, y) in cells {
                    if x < params.width && y < params.height {
                        out[params.index(x, y)] = 1;
                    } else {
                        log::warn!("seed cell ({x}, {y}) lies outside the {params} grid");
                    }
                }
                out
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid seed policy `{0}`: expected empty, alternating or random[:density[@seed]]")]
pub struct ParseSeedPolicyError(String);

impl FromStr for SeedPolicy {
    type Err = ParseSeedPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSeedPolicyError(s.to_string());
        let s = s.trim();
        match s {
            "empty" => return Ok(SeedPolicy::Empty),
            "alternating" => return Ok(SeedPolicy::Alternating),
            "random" => return Ok(SeedPolicy::default()),
            _ => {}
        }
        let rest = s.strip_prefix("random:").ok_or_else(err)?;
        let (density, seed) = match rest.split_once('@') {
            Some((density, seed)) => (density, Some(seed.parse().map_err(|_| err())?)),
            None => (rest, None),
        };
        let density: f32 = density.parse().map_err(|_| err())?;
        if !(0.0..=1.0).contains(&density) {
            return Err(err());
        }
        Ok(SeedPolicy::Random { density, seed })
    }
}
