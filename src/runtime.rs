//! Process-wide startup steps. Call these once from the training entry point,
//! before any dataset is built.

use std::sync::OnceLock;

use burn::backend::ndarray::NdArrayDevice;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CPU backend the loader hands tensors to.
pub type CpuBackend = burn::backend::NdArray<f32>;

/// Autodiff wrapper of [`CpuBackend`] for training loops.
pub type CpuAutodiffBackend = burn::backend::Autodiff<CpuBackend>;

static CPU_DEVICE: OnceLock<NdArrayDevice> = OnceLock::new();
static TRACING: OnceLock<()> = OnceLock::new();

/// Pins numeric work for this process to the CPU.
///
/// The first call selects the device; every later call returns the same one.
pub fn pin_cpu_device() -> &'static NdArrayDevice {
    CPU_DEVICE.get_or_init(|| {
        info!("pinning tensor backend to the cpu device");
        NdArrayDevice::Cpu
    })
}

/// Installs the fmt subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let result = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
        if let Err(err) = result {
            warn!("failed to initialise tracing subscriber: {err}");
        }
    });
}
