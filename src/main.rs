#[cfg(any(
    feature = "ndarray",
    feature = "ndarray-blas-netlib",
    feature = "ndarray-blas-openblas",
    feature = "ndarray-blas-accelerate",
))]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };

    pub fn run() {
        image_classification::run::<Autodiff<NdArray>>(NdArrayDevice::Cpu);
    }
}

#[cfg(any(feature = "tch-cpu", feature = "tch-gpu"))]
mod tch {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };

    pub fn run() {
        #[cfg(feature = "tch-cpu")]
        let device = LibTorchDevice::Cpu;
        #[cfg(all(feature = "tch-gpu", not(target_os = "macos")))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(all(feature = "tch-gpu", target_os = "macos"))]
        let device = LibTorchDevice::Mps;

        image_classification::run::<Autodiff<LibTorch>>(device);
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };

    pub fn run() {
        image_classification::run::<Autodiff<Wgpu>>(WgpuDevice::default());
    }
}

fn main() {
    env_logger::init();

    #[cfg(any(
        feature = "ndarray",
        feature = "ndarray-blas-netlib",
        feature = "ndarray-blas-openblas",
        feature = "ndarray-blas-accelerate",
    ))]
    ndarray::run();
    #[cfg(any(feature = "tch-cpu", feature = "tch-gpu"))]
    tch::run();
    #[cfg(feature = "wgpu")]
    wgpu::run();
}
