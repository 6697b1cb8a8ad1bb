use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::config::EnvInfo;

#[derive(Debug)]
pub struct EnvStep {
    pub obs: Vec<f32>,
    pub reward: f32,
    pub is_done: bool,
}

/// Contract the trainer expects from an environment. The rollout loop only
/// ever calls these; everything behind them is a black box.
pub trait GymEnv {
    fn reset(&mut self) -> Vec<f32>;
    fn step(&mut self, action: &[f32]) -> EnvStep;
    fn seed(&mut self, seed: u64);
    /// Maps a normalized observation back to raw state units. Identity when
    /// `state_normalization` is false.
    fn denormalize(&self, obs: &[f32]) -> Vec<f32>;
    fn state_normalization(&self) -> bool;
    fn observation_space(&self) -> i64;
    fn action_space(&self) -> i64;
}

/// Velocity-integrator box environment: a point mass on a bounded 2d plane.
/// Observations are (position, velocity), optionally normalized to [-1, 1].
pub struct PointMassEnv {
    pos: [f32; 2],
    vel: [f32; 2],
    bound: f32,
    max_vel: f32,
    dt: f32,
    episode_steps: u64,
    max_episode_steps: u64,
    state_normalization: bool,
    rng: SmallRng,
}

impl PointMassEnv {
    pub fn new(env_info: &EnvInfo) -> Self {
        Self {
            pos: [0., 0.],
            vel: [0., 0.],
            bound: 5.,
            max_vel: 2.,
            dt: 0.1,
            episode_steps: 0,
            max_episode_steps: env_info.max_episode_steps,
            state_normalization: env_info.state_normalization,
            rng: SmallRng::seed_from_u64(0),
        }
    }

    fn observe(&self) -> Vec<f32> {
        let raw = [self.pos[0], self.pos[1], self.vel[0], self.vel[1]];
        if self.state_normalization {
            vec![
                raw[0] / self.bound,
                raw[1] / self.bound,
                raw[2] / self.max_vel,
                raw[3] / self.max_vel,
            ]
        } else {
            raw.to_vec()
        }
    }
}

impl GymEnv for PointMassEnv {
    fn reset(&mut self) -> Vec<f32> {
        // small jitter around the origin so rollouts from the same skill differ
        self.pos = [
            self.rng.gen_range(-0.1..0.1),
            self.rng.gen_range(-0.1..0.1),
        ];
        self.vel = [0., 0.];
        self.episode_steps = 0;
        self.observe()
    }

    fn step(&mut self, action: &[f32]) -> EnvStep {
        assert!(
            action.len() == 2,
            "point mass env expects 2d actions, got {}",
            action.len()
        );
        for i in 0..2 {
            let accel = action[i].clamp(-1., 1.);
            self.vel[i] = (self.vel[i] + accel * self.dt).clamp(-self.max_vel, self.max_vel);
            self.pos[i] += self.vel[i] * self.dt;
        }
        self.episode_steps += 1;

        let out_of_bounds = self.pos.iter().any(|p| p.abs() > self.bound);
        let is_done = out_of_bounds || self.episode_steps >= self.max_episode_steps;
        let reward = -(self.pos[0].powi(2) + self.pos[1].powi(2)).sqrt();

        EnvStep {
            obs: self.observe(),
            reward,
            is_done,
        }
    }

    fn seed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    fn denormalize(&self, obs: &[f32]) -> Vec<f32> {
        if !self.state_normalization {
            return obs.to_vec();
        }
        vec![
            obs[0] * self.bound,
            obs[1] * self.bound,
            obs[2] * self.max_vel,
            obs[3] * self.max_vel,
        ]
    }

    fn state_normalization(&self) -> bool {
        self.state_normalization
    }

    fn observation_space(&self) -> i64 {
        4
    }

    fn action_space(&self) -> i64 {
        2
    }
}
