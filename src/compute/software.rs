//! Host implementation of the kernels in `shaders/kernel.wgsl`.
//!
//! Runs every dispatch to completion immediately, so a handle is only a sequence
//! number. Used for headless runs and as the reference the GPU kernels follow.

use glam::Vec2;

use crate::compute::{ComputeBackend, DeviceInfo, ImageLayout};
use crate::error::ComputeError;
use crate::simulation::types::{PARTICLE_ATTRACTOR, Particle};

// Kernel constants, kept equal to shaders/kernel.wgsl
const GRAVITY: f32 = 1.0;
const SOFTENING: f32 = 25.0;
const MAX_RADIUS: f32 = 16.0;
const LIGHT_MASS: f32 = 10.0;
const HEAVY_MASS: f32 = 200.0;
pub(crate) const BACKGROUND_COLOR: [f32; 4] = [0.0, 0.0, 0.02, 1.0];
pub(crate) const FIXED_COLOR: [f32; 4] = [1.0, 0.85, 0.3, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SoftwareHandle(u64);

pub(crate) struct SoftwareBackend {
    particles: Vec<Particle>,
    pixels: Vec<[f32; 4]>,
    layout: ImageLayout,
    step_width: f32,
    zoom: f32,
    issued: u64,
    info: DeviceInfo,
}

impl SoftwareBackend {
    pub(crate) fn new(layout: ImageLayout, particles: Vec<Particle>, step_width: f32) -> Self {
        log::info!(
            "Using software compute backend ({} particles, {}x{} image)",
            particles.len(),
            layout.width,
            layout.height
        );
        Self {
            particles,
            pixels: vec![[0.0; 4]; layout.pixel_count()],
            layout,
            step_width,
            zoom: 1.0,
            issued: 0,
            info: DeviceInfo {
                platform: "Software".to_string(),
                device: "Host CPU".to_string(),
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn particles(&self) -> &[Particle] {
        &self.particles
    }

    fn complete(&mut self) -> SoftwareHandle {
        let handle = SoftwareHandle(self.issued);
        self.issued += 1;
        handle
    }

    fn check(&self, handle: &SoftwareHandle, operation: &'static str) -> Result<(), ComputeError> {
        if handle.0 < self.issued {
            Ok(())
        } else {
            Err(ComputeError::DeviceOperationFailed {
                operation,
                code: format!("unknown completion handle {}", handle.0),
            })
        }
    }
}

impl ComputeBackend for SoftwareBackend {
    type Handle = SoftwareHandle;

    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn layout(&self) -> ImageLayout {
        self.layout
    }

    fn dispatch_background_render(&mut self) -> Result<SoftwareHandle, ComputeError> {
        render_background(&mut self.pixels, self.layout);
        Ok(self.complete())
    }

    fn dispatch_simulation_step(&mut self) -> Result<SoftwareHandle, ComputeError> {
        simulate(&mut self.particles, self.step_width);
        Ok(self.complete())
    }

    fn wait(&mut self, handles: &[SoftwareHandle]) -> Result<(), ComputeError> {
        handles.iter().try_for_each(|handle| self.check(handle, "wait"))
    }

    fn set_zoom(&mut self, zoom: f32) -> Result<(), ComputeError> {
        self.zoom = zoom;
        Ok(())
    }

    fn dispatch_particle_render(&mut self, wait_on: &[SoftwareHandle]) -> Result<SoftwareHandle, ComputeError> {
        self.wait(wait_on)?;
        render_particles(&mut self.pixels, self.layout, &self.particles, self.zoom);
        Ok(self.complete())
    }

    fn read_image(&mut self, wait_on: &SoftwareHandle, dst: &mut [u8]) -> Result<(), ComputeError> {
        self.check(wait_on, "read_image")?;
        let src: &[u8] = bytemuck::cast_slice(&self.pixels);
        if dst.len() != src.len() {
            return Err(ComputeError::DeviceOperationFailed {
                operation: "read_image",
                code: format!("destination holds {} bytes, image needs {}", dst.len(), src.len()),
            });
        }
        dst.copy_from_slice(src);
        Ok(())
    }
}

/// One integration sub-step. Fixed particles never move.
pub(crate) fn simulate(particles: &mut [Particle], step_width: f32) {
    let accelerations: Vec<Vec2> = (0..particles.len())
        .map(|i| acceleration_on(particles, i))
        .collect();

    for (p, acceleration) in particles.iter_mut().zip(accelerations) {
        if p.is_fixed() {
            continue;
        }
        let velocity = Vec2::from_array(p.velocity) + acceleration * step_width;
        let position = Vec2::from_array(p.position) + velocity * step_width;
        p.velocity = velocity.to_array();
        p.position = position.to_array();
    }
}

fn acceleration_on(particles: &[Particle], i: usize) -> Vec2 {
    let position = Vec2::from_array(particles[i].position);
    particles
        .iter()
        .enumerate()
        .filter(|&(j, other)| j != i && other.has_flag(PARTICLE_ATTRACTOR))
        .map(|(_, other)| {
            let d = Vec2::from_array(other.position) - position;
            let r2 = d.length_squared() + SOFTENING;
            d * (GRAVITY * other.mass / (r2 * r2.sqrt()))
        })
        .sum()
}

pub(crate) fn render_background(pixels: &mut [[f32; 4]], layout: ImageLayout) {
    for y in 0..layout.height {
        let row = layout.index(0, y);
        pixels[row..row + layout.width as usize].fill(BACKGROUND_COLOR);
    }
}

pub(crate) fn particle_color(p: &Particle) -> [f32; 4] {
    if p.is_fixed() {
        return FIXED_COLOR;
    }
    let t = ((p.mass - LIGHT_MASS) / (HEAVY_MASS - LIGHT_MASS)).clamp(0.0, 1.0);
    let light = glam::Vec3::new(0.3, 0.5, 1.0);
    let rgb = light.lerp(glam::Vec3::ONE, t);
    [rgb.x, rgb.y, rgb.z, 1.0]
}

/// Draws every particle as a filled disc centred on its projected position.
pub(crate) fn render_particles(pixels: &mut [[f32; 4]], layout: ImageLayout, particles: &[Particle], zoom: f32) {
    let width = layout.width as i32;
    let height = layout.height as i32;

    for p in particles {
        let sx = width as f32 * 0.5 + p.position[0] * zoom;
        let sy = height as f32 * 0.5 - p.position[1] * zoom;
        if sx < -MAX_RADIUS || sy < -MAX_RADIUS || sx > width as f32 + MAX_RADIUS || sy > height as f32 + MAX_RADIUS {
            continue;
        }

        let radius = (p.radius() * zoom).clamp(1.0, MAX_RADIUS) as i32;
        let (cx, cy) = (sx.floor() as i32, sy.floor() as i32);
        let color = particle_color(p);

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
                let (x, y) = (cx + dx, cy + dy);
                if x < 0 || y < 0 || x >= width || y >= height {
                    continue;
                }
                pixels[layout.index(x as u32, y as u32)] = color;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::Zeroable;

    use super::*;
    use crate::simulation::init::{create_random_particles, create_rng};
    use crate::simulation::types::{PARTICLE_CRUNCHER, PARTICLE_FIXED, PARTICLE_KIND_DEFAULT};

    fn free_particle(position: [f32; 2], mass: f32) -> Particle {
        Particle {
            kind: PARTICLE_KIND_DEFAULT,
            mass,
            density: 10.0,
            position,
            flags: PARTICLE_ATTRACTOR | PARTICLE_CRUNCHER,
            ..Particle::zeroed()
        }
    }

    #[test]
    fn fixed_particle_never_moves() {
        let mut particles = create_random_particles(64, &mut create_rng(Some(3)));
        let start = particles[0].position;
        for _ in 0..100 {
            simulate(&mut particles, 1.0);
        }
        assert_eq!(particles[0].position, start);
        assert_eq!(particles[0].velocity, [0.0, 0.0]);
    }

    #[test]
    fn free_particle_falls_toward_attractor() {
        let mut particles = create_random_particles(1, &mut create_rng(Some(5)));
        particles.push(free_particle([100.0, 0.0], 10.0));

        simulate(&mut particles, 1.0);

        let p = particles[1];
        assert!(p.velocity[0] < 0.0, "velocity {:?}", p.velocity);
        assert!(p.position[0] < 100.0);
        assert_eq!(p.position[1], 0.0);
    }

    #[test]
    fn non_attractors_exert_no_force() {
        let mut inert = free_particle([10.0, 0.0], 200.0);
        inert.flags = 0;
        let mut particles = vec![free_particle([0.0, 0.0], 10.0), inert];
        particles[0].flags = PARTICLE_ATTRACTOR;

        simulate(&mut particles, 1.0);

        assert_eq!(particles[0].velocity, [0.0, 0.0]);
        assert!(particles[1].velocity[0] < 0.0);
    }

    #[test]
    fn background_fills_logical_pixels_only() {
        let layout = ImageLayout::new(10, 3);
        let mut pixels = vec![[0.0; 4]; layout.pixel_count()];
        render_background(&mut pixels, layout);

        assert_eq!(pixels[layout.index(9, 2)], BACKGROUND_COLOR);
        // Pitch padding is left untouched
        assert_eq!(pixels[layout.index(10, 0)], [0.0; 4]);
    }

    #[test]
    fn particles_are_drawn_around_the_centre() {
        let layout = ImageLayout::new(64, 64);
        let mut pixels = vec![[0.0; 4]; layout.pixel_count()];
        let mut central = free_particle([0.0, 0.0], 10000.0);
        central.flags |= PARTICLE_FIXED;

        render_particles(&mut pixels, layout, &[central], 1.0);

        assert_eq!(pixels[layout.index(32, 32)], FIXED_COLOR);
        assert_eq!(pixels[layout.index(0, 0)], [0.0; 4]);
    }

    #[test]
    fn zoom_scales_projection() {
        let layout = ImageLayout::new(64, 64);
        let mut pixels = vec![[0.0; 4]; layout.pixel_count()];
        let p = free_particle([40.0, 0.0], 10.0);

        // Off screen at 1:1, visible at 1:2
        render_particles(&mut pixels, layout, &[p], 1.0);
        assert!(pixels.iter().all(|px| *px == [0.0; 4]));

        render_particles(&mut pixels, layout, &[p], 0.5);
        assert_eq!(pixels[layout.index(52, 32)], particle_color(&p));
    }

    #[test]
    fn heavier_particles_are_brighter() {
        let light = particle_color(&free_particle([0.0, 0.0], LIGHT_MASS));
        let heavy = particle_color(&free_particle([0.0, 0.0], HEAVY_MASS));
        assert!(heavy[0] > light[0]);
        assert!(heavy.iter().all(|c| (c - 1.0).abs() < 1e-6), "{heavy:?}");
    }

    #[test]
    fn read_image_rejects_wrong_destination_size() {
        let layout = ImageLayout::new(16, 2);
        let mut backend = SoftwareBackend::new(layout, create_random_particles(1, &mut create_rng(Some(1))), 1.0);
        let handle = backend.dispatch_background_render().unwrap();

        let mut short = vec![0u8; 8];
        assert!(backend.read_image(&handle, &mut short).is_err());

        let mut full = vec![0u8; layout.byte_len()];
        backend.read_image(&handle, &mut full).unwrap();
        assert_eq!(&full[..16], bytemuck::cast_slice::<f32, u8>(&BACKGROUND_COLOR));
    }

    #[test]
    fn unknown_handle_is_an_error() {
        let layout = ImageLayout::new(16, 2);
        let mut backend = SoftwareBackend::new(layout, Vec::new(), 1.0);
        assert!(backend.wait(&[SoftwareHandle(3)]).is_err());
    }
}
