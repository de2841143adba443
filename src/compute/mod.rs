//! Compute backends: everything that runs the three N-body kernels.
//!
//! A backend owns the device-side particle and image buffers. Dispatches return a
//! completion handle right away; callers decide where to block on them with
//! [`ComputeBackend::wait`]. The GPU implementation lives in [`gpu`]; [`software`]
//! runs the same kernels on the host.

pub(crate) mod gpu;
pub(crate) mod image;
pub(crate) mod kernel;
pub(crate) mod software;

use std::fmt;

use crate::error::ComputeError;

pub(crate) use image::{HostImage, ImageLayout};

/// Names shown in the overlay for the selected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeviceInfo {
    pub platform: String,
    pub device: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.device, self.platform)
    }
}

/// Per-frame operations of a compute backend.
pub(crate) trait ComputeBackend {
    /// Opaque token for one dispatched operation.
    type Handle: Clone + fmt::Debug;

    fn device_info(&self) -> &DeviceInfo;

    fn layout(&self) -> ImageLayout;

    /// Clears the image. Does not block.
    fn dispatch_background_render(&mut self) -> Result<Self::Handle, ComputeError>;

    /// Integrates one sub-step of the particle buffer in place. Does not block;
    /// callers must wait on the handle before dispatching the next sub-step.
    fn dispatch_simulation_step(&mut self) -> Result<Self::Handle, ComputeError>;

    /// Blocks until every listed dispatch has completed.
    fn wait(&mut self, handles: &[Self::Handle]) -> Result<(), ComputeError>;

    /// Sets the zoom factor read by the next particle render.
    fn set_zoom(&mut self, zoom: f32) -> Result<(), ComputeError>;

    /// Draws the particles over the image once all of `wait_on` have completed.
    fn dispatch_particle_render(&mut self, wait_on: &[Self::Handle]) -> Result<Self::Handle, ComputeError>;

    /// Copies the full image into `dst` after `wait_on` completes. Blocks.
    fn read_image(&mut self, wait_on: &Self::Handle, dst: &mut [u8]) -> Result<(), ComputeError>;
}
