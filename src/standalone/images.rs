//! Controller image selection.

use std::sync::OnceLock;

use super::gpu::GpuSupport;

/// Repository of the standalone controller image.
pub const CONTROLLER_IMAGE: &str = "docker/model-runner";

static CPU_TAG: OnceLock<String> = OnceLock::new();
static CUDA_TAG: OnceLock<String> = OnceLock::new();

// Tags are resolved once per process so a single run never mixes variants.

fn cpu_tag() -> &'static str {
    CPU_TAG.get_or_init(|| "latest".to_string())
}

fn cuda_tag() -> &'static str {
    CUDA_TAG.get_or_init(|| "latest-cuda".to_string())
}

/// The fully-qualified controller image for the detected GPU support.
pub fn controller_image(gpu: GpuSupport) -> String {
    match gpu {
        GpuSupport::Cuda => format!("{CONTROLLER_IMAGE}:{}", cuda_tag()),
        GpuSupport::None => format!("{CONTROLLER_IMAGE}:{}", cpu_tag()),
    }
}
