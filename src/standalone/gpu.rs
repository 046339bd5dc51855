//! CUDA-vs-CPU classification for controller image selection.

use std::path::Path;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuSupport {
    None,
    Cuda,
}

/// Classifies GPU support on the host. CUDA is assumed when the NVIDIA
/// driver is present or `nvidia-smi` answers; anything else is CPU.
pub async fn detect() -> GpuSupport {
    if Path::new("/proc/driver/nvidia/version").exists() {
        debug!("NVIDIA driver detected via /proc");
        return GpuSupport::Cuda;
    }

    match tokio::process::Command::new("nvidia-smi")
        .arg("--list-gpus")
        .output()
        .await
    {
        Ok(output) if output.status.success() && !output.stdout.is_empty() => {
            debug!("NVIDIA driver detected via nvidia-smi");
            GpuSupport::Cuda
        }
        _ => GpuSupport::None,
    }
}
