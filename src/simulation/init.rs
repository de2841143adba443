use bytemuck::Zeroable;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::simulation::types::{
    PARTICLE_ATTRACTOR, PARTICLE_CRUNCHER, PARTICLE_FIXED, PARTICLE_KIND_DEFAULT, Particle,
};

// Initial condition bounds
pub(crate) const POSITION_RANGE: std::ops::Range<f32> = -1000.0..1000.0;
pub(crate) const VELOCITY_RANGE: std::ops::Range<f32> = -1.0..1.0;
pub(crate) const MASS_RANGE: std::ops::Range<f32> = 10.0..200.0;
const PARTICLE_DENSITY: f32 = 10.0;

const CENTRAL_MASS: f32 = 10000.0;
const CENTRAL_DENSITY: f32 = 50.0;

/// Creates the process-wide random source. A configured seed makes runs reproducible.
pub(crate) fn create_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => {
            log::info!("Seeding particle generator with {seed}");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    }
}

/// Builds the initial particle array.
///
/// Index 0 is the fixed central attractor at the origin; every other particle is a
/// free attractor with random mass, position and velocity. `count` must be positive.
pub(crate) fn create_random_particles<R: Rng + ?Sized>(count: u32, rng: &mut R) -> Vec<Particle> {
    let mut particles = Vec::with_capacity(count as usize);

    // Create a central "sun" with dominant mass
    particles.push(Particle {
        kind: PARTICLE_KIND_DEFAULT,
        mass: CENTRAL_MASS,
        density: CENTRAL_DENSITY,
        position: [0.0, 0.0],
        velocity: [0.0, 0.0],
        flags: PARTICLE_FIXED | PARTICLE_ATTRACTOR | PARTICLE_CRUNCHER,
        ..Particle::zeroed()
    });

    for _ in 1..count {
        let mass = rng.gen_range(MASS_RANGE);
        let position = [rng.gen_range(POSITION_RANGE), rng.gen_range(POSITION_RANGE)];
        let velocity = [rng.gen_range(VELOCITY_RANGE), rng.gen_range(VELOCITY_RANGE)];

        particles.push(Particle {
            kind: PARTICLE_KIND_DEFAULT,
            mass,
            density: PARTICLE_DENSITY,
            position,
            velocity,
            flags: PARTICLE_ATTRACTOR | PARTICLE_CRUNCHER,
            ..Particle::zeroed()
        });
    }

    log::debug!(
        "Created {} particles ({} bytes each)",
        particles.len(),
        std::mem::size_of::<Particle>()
    );

    particles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_fixed_particle() {
        let mut rng = create_rng(Some(7));
        for count in [1, 2, 10, 500] {
            let particles = create_random_particles(count, &mut rng);
            assert_eq!(particles.len(), count as usize);

            let fixed = particles.iter().filter(|p| p.is_fixed()).count();
            assert_eq!(fixed, 1);
            assert!(particles[0].is_fixed());
            assert!(particles.iter().all(|p| p.has_flag(PARTICLE_ATTRACTOR)));
            assert!(particles.iter().all(|p| p.has_flag(PARTICLE_CRUNCHER)));
        }
    }

    #[test]
    fn central_particle_dominates() {
        let mut rng = create_rng(Some(1));
        let particles = create_random_particles(500, &mut rng);
        let central = particles[0];

        assert_eq!(central.position, [0.0, 0.0]);
        assert_eq!(central.velocity, [0.0, 0.0]);
        assert!(particles[1..].iter().all(|p| p.mass < central.mass));
    }

    #[test]
    fn randomized_values_stay_in_bounds() {
        let mut rng = create_rng(Some(42));
        for _ in 0..20 {
            let particles = create_random_particles(500, &mut rng);
            for p in &particles[1..] {
                assert!(MASS_RANGE.contains(&p.mass), "mass {}", p.mass);
                assert!(p.position.iter().all(|v| POSITION_RANGE.contains(v)));
                assert!(p.velocity.iter().all(|v| VELOCITY_RANGE.contains(v)));
                assert_eq!(p.density, PARTICLE_DENSITY);
                assert_eq!(p.kind, PARTICLE_KIND_DEFAULT);
            }
        }
    }

    #[test]
    fn same_seed_same_particles() {
        let a = create_random_particles(64, &mut create_rng(Some(99)));
        let b = create_random_particles(64, &mut create_rng(Some(99)));
        let c = create_random_particles(64, &mut create_rng(Some(100)));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
