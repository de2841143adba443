//! Error types for the viewer.
//!
//! Every error in this crate is fatal: startup errors abort before the frame
//! loop, per-frame errors end it. Nothing is retried.

use std::fmt;
use std::path::PathBuf;

/// Errors raised by a compute backend during setup or while running a frame.
#[derive(Debug)]
pub(crate) enum ComputeError {
    /// No GPU adapter was found.
    DeviceUnavailable,
    /// The adapter refused to create a device.
    DeviceRequest(wgpu::RequestDeviceError),
    /// None of the kernel source candidates could be read.
    KernelSource { path: PathBuf, source: std::io::Error },
    /// An `#include` directive named a file missing from every include dir.
    Include { name: String, from: PathBuf },
    /// The kernel module failed to compile. `log` holds the full diagnostics.
    CompileError { log: String },
    /// The compiled module lacks a required entry point.
    EntryPointMissing { name: String },
    /// The device could not allocate a buffer.
    AllocationFailed { buffer: &'static str, size: u64 },
    /// A dispatch, wait or transfer failed after setup.
    DeviceOperationFailed { operation: &'static str, code: String },
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeError::DeviceUnavailable => write!(f, "no GPU compute device available"),
            ComputeError::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            ComputeError::KernelSource { path, source } => {
                write!(f, "failed to read kernel source {}: {source}", path.display())
            }
            ComputeError::Include { name, from } => {
                write!(f, "include \"{name}\" from {} not found in any include dir", from.display())
            }
            ComputeError::CompileError { log } => write!(f, "kernel build failed:\n{log}"),
            ComputeError::EntryPointMissing { name } => {
                write!(f, "kernel entry point `{name}` not found")
            }
            ComputeError::AllocationFailed { buffer, size } => {
                write!(f, "failed to allocate {size} bytes for {buffer}")
            }
            ComputeError::DeviceOperationFailed { operation, code } => {
                write!(f, "device operation `{operation}` failed: {code}")
            }
        }
    }
}

impl std::error::Error for ComputeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComputeError::DeviceRequest(e) => Some(e),
            ComputeError::KernelSource { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for ComputeError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        ComputeError::DeviceRequest(e)
    }
}

/// Errors from loading and validating the startup configuration.
#[derive(Debug)]
pub(crate) enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse(e) => write!(f, "failed to parse config: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Top level error returned by [`crate::app::run`].
#[derive(Debug)]
pub(crate) enum AppError {
    Config(ConfigError),
    Compute(ComputeError),
    EventLoop(winit::error::EventLoopError),
    Window(winit::error::OsError),
    Surface(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "{e}"),
            AppError::Compute(e) => write!(f, "compute error: {e}"),
            AppError::EventLoop(e) => write!(f, "event loop error: {e}"),
            AppError::Window(e) => write!(f, "failed to create window: {e}"),
            AppError::Surface(msg) => write!(f, "presentation failed: {msg}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Compute(e) => Some(e),
            AppError::EventLoop(e) => Some(e),
            AppError::Window(e) => Some(e),
            AppError::Surface(_) => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<ComputeError> for AppError {
    fn from(e: ComputeError) -> Self {
        AppError::Compute(e)
    }
}

impl From<winit::error::EventLoopError> for AppError {
    fn from(e: winit::error::EventLoopError) -> Self {
        AppError::EventLoop(e)
    }
}

impl From<winit::error::OsError> for AppError {
    fn from(e: winit::error::OsError) -> Self {
        AppError::Window(e)
    }
}
