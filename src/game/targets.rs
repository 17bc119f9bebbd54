//! Target spawning

use rand::Rng;

use crate::config::GameConfig;

use super::room::TargetState;

fn sample_range<R: Rng + ?Sized>(rng: &mut R, (min, max): (f64, f64)) -> f64 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}

/// Spawn a live target with the given id at a uniformly random position
/// inside the configured ranges
pub fn spawn_target<R: Rng + ?Sized>(rng: &mut R, config: &GameConfig, id: u64) -> TargetState {
    TargetState {
        id,
        x: sample_range(rng, config.target_x_range),
        y: sample_range(rng, config.target_y_range),
        r: config.target_radius,
        alive: true,
    }
}

/// Spawn `count` targets with sequential ids starting at `start_id`
pub fn create_initial_targets<R: Rng + ?Sized>(
    rng: &mut R,
    config: &GameConfig,
    count: usize,
    start_id: u64,
) -> Vec<TargetState> {
    (0..count as u64)
        .map(|offset| spawn_target(rng, config, start_id + offset))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn spawned_targets_stay_inside_configured_ranges() {
        let config = GameConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for id in 0..500 {
            let target = spawn_target(&mut rng, &config, id);
            assert!(target.alive);
            assert_eq!(target.id, id);
            assert_eq!(target.r, config.target_radius);
            assert!((0.15..0.85).contains(&target.x));
            assert!((0.15..0.85).contains(&target.y));
        }
    }

    #[test]
    fn initial_targets_use_sequential_ids() {
        let config = GameConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let targets = create_initial_targets(&mut rng, &config, 4, 10);

        let ids: Vec<u64> = targets.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![10, 11, 12, 13]);
    }

    #[test]
    fn same_seed_reproduces_positions() {
        let config = GameConfig::default();
        let a = create_initial_targets(&mut ChaCha8Rng::seed_from_u64(9), &config, 5, 1);
        let b = create_initial_targets(&mut ChaCha8Rng::seed_from_u64(9), &config, 5, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn degenerate_range_pins_coordinate() {
        let config = GameConfig {
            target_x_range: (0.3, 0.3),
            ..GameConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(spawn_target(&mut rng, &config, 1).x, 0.3);
    }
}
