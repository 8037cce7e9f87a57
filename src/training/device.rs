//! Compute device handle
//!
//! Training and evaluation require a dedicated accelerator. The handle can
//! only be acquired for a device that passes its probe, and is then passed
//! explicitly to the trainer and every batcher.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::wgpu::WgpuDevice;
use burn::backend::Wgpu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::{PretrainError, Result};

/// Device types that may or may not be a usable accelerator
pub trait Accelerator: Clone + fmt::Debug {
    /// Ok if the device is a dedicated accelerator that accepts work
    fn probe(&self) -> std::result::Result<(), String>;
}

impl Accelerator for WgpuDevice {
    fn probe(&self) -> std::result::Result<(), String> {
        if matches!(self, WgpuDevice::Cpu) {
            return Err("the wgpu CPU adapter is not an accelerator".to_string());
        }

        // wgpu panics when no adapter matches the requested device
        let device = self.clone();
        panic::catch_unwind(AssertUnwindSafe(move || {
            Tensor::<Wgpu<f32, i32>, 1>::zeros([1], &device).into_data();
        }))
        .map_err(|_| format!("no GPU adapter available for {:?}", self))
    }
}

impl Accelerator for NdArrayDevice {
    fn probe(&self) -> std::result::Result<(), String> {
        Err("the ndarray backend runs on the host CPU".to_string())
    }
}

/// wgpu devices tried for the configured device id, in order of preference
pub fn wgpu_candidates(device_id: usize) -> [WgpuDevice; 2] {
    [
        WgpuDevice::DiscreteGpu(device_id),
        WgpuDevice::IntegratedGpu(device_id),
    ]
}

/// Exclusively owned compute device for one trainer
#[derive(Debug, Clone)]
pub struct DeviceHandle<B: Backend> {
    device: B::Device,
}

impl<B: Backend> DeviceHandle<B> {
    /// Acquire an accelerator, failing immediately if none is usable
    pub fn acquire(device: B::Device) -> Result<Self>
    where
        B::Device: Accelerator,
    {
        device.probe().map_err(PretrainError::NoAccelerator)?;
        log::info!("Using accelerator: {:?}", device);
        Ok(DeviceHandle { device })
    }

    /// Acquire the first candidate that passes its probe
    pub fn acquire_first(candidates: impl IntoIterator<Item = B::Device>) -> Result<Self>
    where
        B::Device: Accelerator,
    {
        let mut failures = Vec::new();
        for device in candidates {
            match device.probe() {
                Ok(()) => {
                    log::info!("Using accelerator: {:?}", device);
                    return Ok(DeviceHandle { device });
                }
                Err(reason) => {
                    log::debug!("Skipping {:?}: {}", device, reason);
                    failures.push(reason);
                }
            }
        }

        if failures.is_empty() {
            failures.push("no candidate devices".to_string());
        }
        Err(PretrainError::NoAccelerator(failures.join("; ")))
    }

    /// Host device for unit tests, skipping the accelerator requirement
    #[cfg(test)]
    pub(crate) fn host(device: B::Device) -> Self {
        DeviceHandle { device }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn test_host_device_rejected() {
        let result = DeviceHandle::<Autodiff<NdArray<f32>>>::acquire(NdArrayDevice::Cpu);
        assert!(matches!(result, Err(PretrainError::NoAccelerator(_))));
    }

    #[test]
    fn test_wgpu_cpu_adapter_rejected() {
        let result = DeviceHandle::<Wgpu<f32, i32>>::acquire(WgpuDevice::Cpu);
        assert!(matches!(result, Err(PretrainError::NoAccelerator(_))));
    }

    #[test]
    fn test_device_id_prefers_discrete_then_integrated() {
        assert_eq!(
            wgpu_candidates(1),
            [WgpuDevice::DiscreteGpu(1), WgpuDevice::IntegratedGpu(1)]
        );
        assert!(!wgpu_candidates(0).contains(&WgpuDevice::Cpu));
    }

    #[test]
    fn test_acquire_first_reports_every_rejection() {
        let result = DeviceHandle::<NdArray<f32>>::acquire_first([NdArrayDevice::Cpu, NdArrayDevice::Cpu]);
        match result {
            Err(PretrainError::NoAccelerator(message)) => {
                assert_eq!(message.matches("host CPU").count(), 2);
            }
            other => panic!("expected NoAccelerator, got {:?}", other.map(|h| h.device().clone())),
        }
    }

    #[test]
    fn test_acquire_first_without_candidates_fails() {
        let result = DeviceHandle::<NdArray<f32>>::acquire_first(Vec::new());
        assert!(matches!(result, Err(PretrainError::NoAccelerator(_))));
    }

    #[test]
    fn test_acquire_first_skips_cpu_adapter() {
        // Cpu is rejected before any adapter is requested
        let result = DeviceHandle::<Wgpu<f32, i32>>::acquire_first([WgpuDevice::Cpu]);
        assert!(matches!(result, Err(PretrainError::NoAccelerator(_))));
    }
}
