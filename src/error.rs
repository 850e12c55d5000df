/// Errors raised while building the device resources for a run.
///
/// None of these are transient: they are reported once and the run does not
/// start.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("no suitable GPU adapter found: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    #[error("adapter does not support {0}")]
    MissingCapability(&'static str),

    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("failed to create presentation surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("grid {0} has no cells")]
    EmptyGrid(crate::sim::GridParameters),

    #[error("grid of {cells} cells needs {bytes} bytes per buffer, device allows {limit}")]
    GridTooLarge { cells: usize, bytes: u64, limit: u64 },

    #[error("seed of {cells} cells does not fit a cell buffer of {capacity} bytes")]
    SeedOverflow { cells: usize, capacity: u64 },

    #[error("{stage} pipeline does not match the cell binding layout: {message}")]
    PipelineLayout {
        stage: &'static str,
        message: String,
    },

    #[error("cell buffer readback did not complete")]
    ReadbackIncomplete,

    #[error("cell buffer readback failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),
}
