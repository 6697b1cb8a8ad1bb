use std::path::Path;

use rand::{rngs::SmallRng, Rng, SeedableRng};
use tch::{nn, Device, Kind, TchError, Tensor};

use crate::config::SkillPolicyConfig;
use crate::models::model_base::build_mlp;

/// Frozen pretrained policy conditioned on a discrete skill. The trainer
/// treats this as a black box: select a skill, ask for actions.
pub trait SkillPolicy {
    fn set_skill(&mut self, skill: usize);
    /// `obs` is the denormalized observation when the env normalizes state.
    fn get_action(&mut self, obs: &[f32]) -> Vec<f32>;
    fn num_skills(&self) -> usize;
}

/// Skill policy restored from a VarStore checkpoint: an MLP over the
/// observation concatenated with a one-hot skill vector, tanh-squashed
/// actions. Parameters are frozen after loading.
pub struct LoadedSkillPolicy {
    // owns the parameters referenced by `seq`
    _vs: nn::VarStore,
    seq: nn::Sequential,
    num_skills: usize,
    skill: usize,
    device: Device,
}

impl LoadedSkillPolicy {
    pub fn new(
        config: &SkillPolicyConfig,
        path: &Path,
        obs_dim: i64,
        action_dim: i64,
        device: Device,
    ) -> Result<Self, TchError> {
        let mut vs = nn::VarStore::new(device);
        let hidden = vec![config.layer_size; config.num_layers];
        let seq = build_mlp(
            &vs.root(),
            "p",
            obs_dim + config.num_skills as i64,
            &hidden,
            action_dim,
            "relu",
            None,
        );
        vs.load(path)?;
        vs.freeze();
        Ok(Self {
            _vs: vs,
            seq,
            num_skills: config.num_skills,
            skill: 0,
            device,
        })
    }
}

impl SkillPolicy for LoadedSkillPolicy {
    fn set_skill(&mut self, skill: usize) {
        assert!(
            skill < self.num_skills,
            "skill {skill} out of range, policy has {} skills",
            self.num_skills
        );
        self.skill = skill;
    }

    fn get_action(&mut self, obs: &[f32]) -> Vec<f32> {
        let mut one_hot = vec![0f32; self.num_skills];
        one_hot[self.skill] = 1.;
        let mut input = obs.to_vec();
        input.extend_from_slice(&one_hot);

        let action = tch::no_grad(|| {
            Tensor::from_slice(&input)
                .to_kind(Kind::Float)
                .to_device(self.device)
                .unsqueeze(0)
                .apply(&self.seq)
                .tanh()
                .squeeze()
                .to_device(Device::Cpu)
        });
        Vec::<f32>::try_from(&action).unwrap()
    }

    fn num_skills(&self) -> usize {
        self.num_skills
    }
}

/// Checkpoint-free stand-in used when no pretrained policy is configured and
/// by the tests: each skill steers the point mass along a fixed heading with
/// a little noise, which yields cleanly separable behavioral modes.
pub struct ScriptedSkillPolicy {
    num_skills: usize,
    skill: usize,
    rng: SmallRng,
}

impl ScriptedSkillPolicy {
    pub fn new(num_skills: usize, seed: u64) -> Self {
        Self {
            num_skills,
            skill: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl SkillPolicy for ScriptedSkillPolicy {
    fn set_skill(&mut self, skill: usize) {
        assert!(
            skill < self.num_skills,
            "skill {skill} out of range, policy has {} skills",
            self.num_skills
        );
        self.skill = skill;
    }

    fn get_action(&mut self, _obs: &[f32]) -> Vec<f32> {
        let angle = 2. * std::f32::consts::PI * self.skill as f32 / self.num_skills as f32;
        let nx = self.rng.gen_range(-0.1..0.1f32);
        let ny = self.rng.gen_range(-0.1..0.1f32);
        vec![
            (angle.cos() + nx).clamp(-1., 1.),
            (angle.sin() + ny).clamp(-1., 1.),
        ]
    }

    fn num_skills(&self) -> usize {
        self.num_skills
    }
}
