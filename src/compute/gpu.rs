use std::sync::{Arc, Mutex};

use wgpu::util::DeviceExt;

use crate::compute::kernel::{self, EntryPoints};
use crate::compute::{ComputeBackend, DeviceInfo, ImageLayout};
use crate::config::Config;
use crate::error::ComputeError;
use crate::simulation::types::{
    COMPUTE_WORKGROUP_SIZE, IMAGE_WORKGROUP_SIZE, ImageParams, Particle, SimulationParams, ViewParams,
};

/// Completion handle of one queue submission.
#[derive(Debug, Clone)]
pub(crate) struct CompletionHandle(wgpu::SubmissionIndex);

// The three kernels, created from one module
struct Kernels {
    simulate: wgpu::ComputePipeline,
    render_background: wgpu::ComputePipeline,
    render_particles: wgpu::ComputePipeline,
}

/// wgpu implementation of the compute backend.
///
/// Fields drop top to bottom, which is the teardown order: bindings and buffers,
/// then kernels and their module, then queue, device and instance. A setup that
/// fails half way drops the locals it already created in reverse order, so
/// nothing leaks on early exit.
pub(crate) struct GpuBackend {
    bind_group: wgpu::BindGroup,
    image_buffer: wgpu::Buffer,
    _particle_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    _image_params_buffer: wgpu::Buffer,
    _simulation_params_buffer: wgpu::Buffer,
    view_params_buffer: wgpu::Buffer,
    kernels: Kernels,
    _bind_group_layout: wgpu::BindGroupLayout,
    _module: wgpu::ShaderModule,
    queue: wgpu::Queue,
    device: wgpu::Device,
    _instance: wgpu::Instance,

    // Errors raised by the device outside an error scope, checked after every wait
    device_errors: Arc<Mutex<Vec<String>>>,
    layout: ImageLayout,
    particle_count: u32,
    info: DeviceInfo,
}

impl GpuBackend {
    pub(crate) fn new(config: &Config, layout: ImageLayout, particles: &[Particle]) -> Result<Self, ComputeError> {
        pollster::block_on(Self::init_async(config, layout, particles))
    }

    async fn init_async(config: &Config, layout: ImageLayout, particles: &[Particle]) -> Result<Self, ComputeError> {
        // 1. Pick the first GPU adapter in enumeration order
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .enumerate_adapters(wgpu::Backends::PRIMARY)
            .into_iter()
            .find(|adapter| {
                let info = adapter.get_info();
                log::debug!("Found adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
                is_gpu(info.device_type)
            })
            .ok_or(ComputeError::DeviceUnavailable)?;

        let adapter_info = adapter.get_info();
        let info = DeviceInfo {
            platform: platform_name(&adapter_info),
            device: adapter_info.name.clone(),
        };
        log::info!("Selected compute device: {info}");

        // 2. Device and its in-order queue
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("N-Body Compute Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let device_errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&device_errors);
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("Uncaptured device error: {error}");
            if let Ok(mut errors) = sink.lock() {
                errors.push(error.to_string());
            }
        }));

        // 3. - 5. Load, compile and resolve entry points on the host, then build
        // the device module, blocking until the device reports a result
        let prepared = kernel::prepare(&config.kernel_paths, &config.include_dirs)?;
        let entry_points = prepared.entry_points;
        let module = create_module(&device, &prepared.compiled.source).await?;

        // 6. Buffers
        let image_size = layout.byte_len() as u64;
        let image_buffer = allocate(&device, "image buffer", image_size, || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Image Buffer"),
                size: image_size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        })
        .await?;

        let particle_bytes: &[u8] = bytemuck::cast_slice(particles);
        let particle_buffer = allocate(&device, "particle buffer", particle_bytes.len() as u64, || {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Particle Buffer"),
                contents: particle_bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            })
        })
        .await?;

        let staging_buffer = allocate(&device, "staging buffer", image_size, || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Image Staging Buffer"),
                size: image_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })
        .await?;

        let particle_count = particles.len() as u32;
        let image_params = ImageParams {
            width: layout.width,
            height: layout.height,
            pitch: layout.pitch,
            _padding: 0,
        };
        let simulation_params = SimulationParams {
            count: particle_count,
            step_width: config.step_width(),
            _padding: [0; 2],
        };
        let view_params = ViewParams {
            zoom: 1.0,
            _padding: [0.0; 3],
        };

        let image_params_buffer = create_uniform(&device, "Image Params Buffer", &image_params);
        let simulation_params_buffer = create_uniform(&device, "Simulation Params Buffer", &simulation_params);
        let view_params_buffer = create_uniform(&device, "View Params Buffer", &view_params);

        // 7. Bind everything once
        let bind_group_layout = create_bind_group_layout(&device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("N-Body Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: image_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: image_params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: particle_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: simulation_params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: view_params_buffer.as_entire_binding(),
                },
            ],
        });

        let kernels = create_kernels(&device, &module, &bind_group_layout, entry_points).await?;

        log::info!(
            "Compute backend ready: {particle_count} particles, {}x{} image (pitch {}), step width {}",
            layout.width,
            layout.height,
            layout.pitch,
            simulation_params.step_width
        );

        Ok(Self {
            bind_group,
            image_buffer,
            _particle_buffer: particle_buffer,
            staging_buffer,
            _image_params_buffer: image_params_buffer,
            _simulation_params_buffer: simulation_params_buffer,
            view_params_buffer,
            kernels,
            _bind_group_layout: bind_group_layout,
            _module: module,
            queue,
            device,
            _instance: instance,
            device_errors,
            layout,
            particle_count,
            info,
        })
    }

    fn submit_kernel(&self, label: &str, pipeline: &wgpu::ComputePipeline, workgroups: (u32, u32)) -> CompletionHandle {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, &self.bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroups.0, workgroups.1, 1);
        }

        CompletionHandle(self.queue.submit(std::iter::once(encoder.finish())))
    }

    fn particle_workgroups(&self) -> (u32, u32) {
        (self.particle_count.div_ceil(COMPUTE_WORKGROUP_SIZE), 1)
    }

    fn poll(&self, operation: &'static str, index: wgpu::SubmissionIndex) -> Result<(), ComputeError> {
        self.device
            .poll(wgpu::PollType::WaitForSubmissionIndex(index))
            .map_err(|e| ComputeError::DeviceOperationFailed {
                operation,
                code: e.to_string(),
            })?;
        self.check_device_errors(operation)
    }

    fn check_device_errors(&self, operation: &'static str) -> Result<(), ComputeError> {
        let mut errors = self.device_errors.lock().map_err(|_| ComputeError::DeviceOperationFailed {
            operation,
            code: "device error sink poisoned".to_string(),
        })?;
        if errors.is_empty() {
            return Ok(());
        }
        let code = errors.drain(..).collect::<Vec<_>>().join("; ");
        Err(ComputeError::DeviceOperationFailed { operation, code })
    }
}

impl ComputeBackend for GpuBackend {
    type Handle = CompletionHandle;

    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn layout(&self) -> ImageLayout {
        self.layout
    }

    fn dispatch_background_render(&mut self) -> Result<CompletionHandle, ComputeError> {
        let workgroups = (
            self.layout.width.div_ceil(IMAGE_WORKGROUP_SIZE),
            self.layout.height.div_ceil(IMAGE_WORKGROUP_SIZE),
        );
        let handle = self.submit_kernel("Render Background", &self.kernels.render_background, workgroups);
        self.check_device_errors("render_background")?;
        Ok(handle)
    }

    fn dispatch_simulation_step(&mut self) -> Result<CompletionHandle, ComputeError> {
        let handle = self.submit_kernel("Simulate", &self.kernels.simulate, self.particle_workgroups());
        self.check_device_errors("simulate")?;
        Ok(handle)
    }

    fn wait(&mut self, handles: &[CompletionHandle]) -> Result<(), ComputeError> {
        for handle in handles {
            self.poll("wait", handle.0.clone())?;
        }
        Ok(())
    }

    fn set_zoom(&mut self, zoom: f32) -> Result<(), ComputeError> {
        let view_params = ViewParams {
            zoom,
            _padding: [0.0; 3],
        };
        // Staged; takes effect at the next submission
        self.queue
            .write_buffer(&self.view_params_buffer, 0, bytemuck::cast_slice(&[view_params]));
        Ok(())
    }

    fn dispatch_particle_render(&mut self, wait_on: &[CompletionHandle]) -> Result<CompletionHandle, ComputeError> {
        // Submissions on one queue execute in order, so everything in `wait_on`
        // finishes before this dispatch starts without stalling the host.
        log::trace!("Particle render after {} dependencies", wait_on.len());
        let handle = self.submit_kernel("Render Particles", &self.kernels.render_particles, self.particle_workgroups());
        self.check_device_errors("render_particles")?;
        Ok(handle)
    }

    fn read_image(&mut self, wait_on: &CompletionHandle, dst: &mut [u8]) -> Result<(), ComputeError> {
        let size = self.layout.byte_len();
        if dst.len() != size {
            return Err(ComputeError::DeviceOperationFailed {
                operation: "read_image",
                code: format!("destination holds {} bytes, image needs {size}", dst.len()),
            });
        }

        self.poll("read_image", wait_on.0.clone())?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Image Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.image_buffer, 0, &self.staging_buffer, 0, size as u64);
        let index = self.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.poll("read_image", index)?;

        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(ComputeError::DeviceOperationFailed {
                    operation: "read_image",
                    code: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ComputeError::DeviceOperationFailed {
                    operation: "read_image",
                    code: "buffer map callback was dropped".to_string(),
                });
            }
        }

        {
            let data = slice.get_mapped_range();
            dst.copy_from_slice(&data);
        }
        self.staging_buffer.unmap();
        Ok(())
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        log::info!("Releasing compute resources on {}", self.info.device);
    }
}

fn is_gpu(device_type: wgpu::DeviceType) -> bool {
    matches!(
        device_type,
        wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu | wgpu::DeviceType::VirtualGpu
    )
}

fn platform_name(info: &wgpu::AdapterInfo) -> String {
    if info.driver.is_empty() {
        format!("{:?}", info.backend)
    } else {
        format!("{:?} ({})", info.backend, info.driver)
    }
}

/// Formats device compilation messages as a build log.
fn compilation_log(info: &wgpu::CompilationInfo) -> String {
    info.messages
        .iter()
        .map(|message| match &message.location {
            Some(location) => format!(
                "{:?} at {}:{}: {}",
                message.message_type, location.line_number, location.line_position, message.message
            ),
            None => format!("{:?}: {}", message.message_type, message.message),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn create_module(device: &wgpu::Device, source: &str) -> Result<wgpu::ShaderModule, ComputeError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("N-Body Kernels"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let info = module.get_compilation_info().await;
    let log = compilation_log(&info);

    if let Some(error) = device.pop_error_scope().await {
        let log = if log.is_empty() { error.to_string() } else { format!("{log}\n{error}") };
        return Err(ComputeError::CompileError { log });
    }
    if !log.is_empty() {
        log::warn!("Kernel build log:\n{log}");
    }
    Ok(module)
}

async fn create_kernels(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    bind_group_layout: &wgpu::BindGroupLayout,
    entry_points: EntryPoints,
) -> Result<Kernels, ComputeError> {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("N-Body Pipeline Layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    let create = |entry_point: &str| {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&pipeline_layout),
            module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        })
    };

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let kernels = Kernels {
        simulate: create(entry_points.simulate),
        render_background: create(entry_points.render_background),
        render_particles: create(entry_points.render_particles),
    };
    match device.pop_error_scope().await {
        Some(error) => Err(ComputeError::CompileError { log: error.to_string() }),
        None => Ok(kernels),
    }
}

/// Runs `create` inside error scopes and maps any failure to `AllocationFailed`.
async fn allocate(
    device: &wgpu::Device,
    buffer: &'static str,
    size: u64,
    create: impl FnOnce() -> wgpu::Buffer,
) -> Result<wgpu::Buffer, ComputeError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let created = create();
    let out_of_memory = device.pop_error_scope().await;
    let invalid = device.pop_error_scope().await;

    match out_of_memory.or(invalid) {
        Some(error) => {
            log::error!("Allocating {buffer} ({size} bytes) failed: {error}");
            Err(ComputeError::AllocationFailed { buffer, size })
        }
        None => Ok(created),
    }
}

fn create_uniform<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, value: &T) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("N-Body Bind Group Layout"),
        entries: &[
            // pixels
            storage_entry(0),
            // image_params
            uniform_entry(1),
            // particles
            storage_entry(2),
            // sim_params
            uniform_entry(3),
            // view_params
            uniform_entry(4),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::HostImage;
    use crate::simulation::init::{create_random_particles, create_rng};

    #[test]
    fn only_gpu_adapters_are_selected() {
        assert!(is_gpu(wgpu::DeviceType::DiscreteGpu));
        assert!(is_gpu(wgpu::DeviceType::IntegratedGpu));
        assert!(is_gpu(wgpu::DeviceType::VirtualGpu));
        assert!(!is_gpu(wgpu::DeviceType::Cpu));
        assert!(!is_gpu(wgpu::DeviceType::Other));
    }

    // GPU integration tests need a real adapter; run with `cargo test -- --include-ignored`.

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn gpu_frame_renders_background_and_central_particle() {
        let config = Config {
            seed: Some(11),
            ..Config::default()
        };
        let layout = ImageLayout::new(64, 48);
        let particles = create_random_particles(1, &mut create_rng(config.seed));
        let mut backend = GpuBackend::new(&config, layout, &particles).expect("GPU backend");

        let background = backend.dispatch_background_render().unwrap();
        let step = backend.dispatch_simulation_step().unwrap();
        backend.wait(&[step.clone()]).unwrap();
        backend.set_zoom(1.0).unwrap();
        let rendered = backend.dispatch_particle_render(&[background, step]).unwrap();

        let mut image = HostImage::new(layout);
        backend.read_image(&rendered, image.bytes_mut()).unwrap();

        assert_eq!(image.pixel(0, 0), [0.0, 0.0, 0.02, 1.0]);
        assert_eq!(image.pixel(32, 24), [1.0, 0.85, 0.3, 1.0]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn gpu_setup_reports_compile_log() {
        let dir = std::env::temp_dir().join(format!("nbody-viewer-{}-gpu-broken", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("kernel.wgsl");
        std::fs::write(&path, "@compute @workgroup_size(64)\nfn simulate( {\n").unwrap();

        let config = Config {
            kernel_paths: vec![path],
            ..Config::default()
        };
        let particles = create_random_particles(4, &mut create_rng(Some(1)));
        match GpuBackend::new(&config, ImageLayout::new(16, 16), &particles) {
            Err(ComputeError::CompileError { log }) => assert!(!log.is_empty()),
            Err(other) => panic!("expected compile error, got {other:?}"),
            Ok(_) => panic!("broken kernel was accepted"),
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn gpu_setup_rejects_missing_kernel() {
        let config = Config {
            kernel_paths: vec!["does/not/exist.wgsl".into()],
            ..Config::default()
        };
        let particles = create_random_particles(4, &mut create_rng(Some(1)));
        let result = GpuBackend::new(&config, ImageLayout::new(16, 16), &particles);
        assert!(matches!(result, Err(ComputeError::KernelSource { .. })));
    }
}
