use std::path::{Path, PathBuf};

/* Mode-disentanglement trainer.

   Samples skill-balanced rollouts from a frozen skill policy, then trains the
   mode latent model with the Info-VAE objective (KL + MMD regularization) so
   the latent space separates behavioral modes per skill.
*/
use tch::Device;

use mode_disent::{
    agent::DisentAgent,
    config::{Configuration, EnvType},
    gym_env::{GymEnv, PointMassEnv},
    skill_policy::{LoadedSkillPolicy, ScriptedSkillPolicy, SkillPolicy},
};

pub fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let config = match Configuration::load_configuration(config_path.as_path()) {
        Ok(config) => config,
        Err(error) => {
            panic!(
                "Error loading configuration from '{}': {}",
                config_path.display(),
                error
            );
        }
    };

    let device = if config.device.to_lowercase() == "cuda" {
        Device::cuda_if_available()
    } else {
        Device::Cpu
    };

    let env: Box<dyn GymEnv> = match config.env.env_type {
        EnvType::PointMass => Box::new(PointMassEnv::new(&config.env)),
    };
    println!("action space: {}", env.action_space());
    println!("observation space: {}", env.observation_space());

    let skill_policy: Box<dyn SkillPolicy> = match &config.skill_policy.path {
        Some(path) => {
            let policy = match LoadedSkillPolicy::new(
                &config.skill_policy,
                Path::new(path),
                env.observation_space(),
                env.action_space(),
                device,
            ) {
                Ok(policy) => policy,
                Err(error) => {
                    panic!("Error loading skill policy from '{}': {}", path, error);
                }
            };
            println!("loaded skill policy from {path}");
            Box::new(policy)
        }
        None => {
            println!("no skill policy checkpoint configured, using scripted skills");
            Box::new(ScriptedSkillPolicy::new(
                config.skill_policy.num_skills,
                config.seed as u64,
            ))
        }
    };

    let agent = match DisentAgent::new(&config, env, skill_policy, device) {
        Ok(agent) => agent,
        Err(error) => panic!("Error building agent: {error}"),
    };

    let summary = match agent.run() {
        Ok(summary) => summary,
        Err(error) => panic!("Training run failed: {error}"),
    };
    println!(
        "run finished: {} episodes sampled, {} learn steps, model saved under {}",
        summary.episodes,
        summary.learn_steps,
        summary.model_dir.display()
    );
}
