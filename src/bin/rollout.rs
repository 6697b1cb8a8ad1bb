use std::path::PathBuf;

/* Rolls out a trained mode model through the ActionSampler.

   Loads the checkpoint written by the trainer binary and runs a few episodes,
   staging a mode switch mid-episode and committing it later to show the
   two-phase mode commit in action.
*/
use tch::{nn, Device, Tensor};

use mode_disent::{
    action_sampler::ActionSampler,
    config::{Configuration, EnvType},
    gym_env::{GymEnv, PointMassEnv},
    models::mode::mode_model::ModeLatentNetwork,
    models::model_base::{Model, ObsEncoder},
};

const EPISODES: u64 = 3;

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

    let mut env: Box<dyn GymEnv> = match config.env.env_type {
        EnvType::PointMass => Box::new(PointMassEnv::new(&config.env)),
    };
    env.seed(config.seed as u64);

    let model_dir = PathBuf::from(&config.log_dir)
        .join("model")
        .join(config.run_id());

    let mut vs_mode = nn::VarStore::new(device);
    let mode_model = ModeLatentNetwork::new(
        &vs_mode.root(),
        config.hyperparameters.mode_dim,
        env.observation_space(),
        env.action_space(),
        &config.network,
    );
    let model_path = model_dir.join("mode_model.ot");
    if let Err(error) = vs_mode.load(&model_path) {
        panic!(
            "Error loading mode model from '{}': {}",
            model_path.display(),
            error
        );
    }
    vs_mode.freeze();

    let mut vs_encoder = nn::VarStore::new(device);
    let mut obs_encoder = ObsEncoder::new(
        &vs_encoder.root(),
        env.observation_space(),
        &config.network.hidden_units_obs_encoder,
        &config.network.act_func,
    );
    let encoder_path = model_dir.join("obs_encoder.ot");
    if let Err(error) = vs_encoder.load(&encoder_path) {
        panic!(
            "Error loading obs encoder from '{}': {}",
            encoder_path.display(),
            error
        );
    }
    vs_encoder.freeze();

    let mut sampler = ActionSampler::new(mode_model, device);

    let stage_at = config.env.max_episode_steps / 2;
    let commit_at = 3 * config.env.max_episode_steps / 4;

    for episode in 0..EPISODES {
        sampler.reset(None);
        let mut obs = env.reset();
        let mut episode_return = 0f32;
        let mut episode_steps = 0u64;

        loop {
            if episode_steps == stage_at {
                // decide the new mode now, apply it later
                let flipped = sampler.mode() * -1.;
                sampler.set_mode_next(flipped);
            }
            if episode_steps == commit_at {
                sampler.update_mode_to_next();
            }

            let state_rep = tch::no_grad(|| {
                obs_encoder.forward(&Tensor::from_slice(&obs).unsqueeze(0).to_device(device))
            });
            let action = sampler.get_action(&state_rep);
            let action_vec =
                Vec::<f32>::try_from(&action.squeeze().to_device(Device::Cpu)).unwrap();

            let step = env.step(&action_vec);
            episode_return += step.reward;
            episode_steps += 1;
            obs = step.obs;
            if step.is_done {
                break;
            }
        }

        println!(
            "episode: {:<3}  episode_steps: {:<5}  return: {:.2}",
            episode, episode_steps, episode_return
        );
    }
}
