use std::fs;
use std::path::PathBuf;

use tch::Device;

use mode_disent::agent::DisentAgent;
use mode_disent::config::{
    Configuration, EnvInfo, EnvType, Hyperparameters, InfoLossParams, Network, SkillPolicyConfig,
};
use mode_disent::gym_env::PointMassEnv;
use mode_disent::skill_policy::ScriptedSkillPolicy;

const NUM_SKILLS: usize = 2;
const MIN_STEPS: u64 = 100;
const NUM_SEQUENCES: usize = 6;

fn smoke_config(log_dir: &str) -> Configuration {
    Configuration {
        hyperparameters: Hyperparameters {
            min_steps_sampling: MIN_STEPS,
            batch_size: 8,
            num_sequences: NUM_SEQUENCES,
            train_steps: 1,
            lr: 1e-4,
            mode_dim: 2,
            memory_size: 1000,
            log_interval: 1,
        },
        info_loss: InfoLossParams {
            alpha: 0.95,
            lamda: 1.0,
            kld_diff_desired: None,
        },
        network: Network {
            rnn_dim: 16,
            num_rnn_layers: 1,
            rnn_dropout: 0.,
            hidden_units_mode_encoder: vec![32],
            hidden_units_obs_encoder: vec![32],
            hidden_units_action_decoder: vec![32],
            num_mode_repetitions: 3,
            std_decoder: 0.1,
            act_func: "relu".to_string(),
        },
        env: EnvInfo {
            env_type: EnvType::PointMass,
            max_episode_steps: 20,
            state_normalization: true,
        },
        skill_policy: SkillPolicyConfig {
            path: None,
            num_skills: NUM_SKILLS,
            num_layers: 2,
            layer_size: 16,
        },
        device: "cpu".to_string(),
        seed: 3,
        log_dir: log_dir.to_string(),
        run_comment: Some("smoke".to_string()),
        mode_model_path: None,
    }
}

fn unique_log_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mode_disent_{}_{}", tag, std::process::id()))
}

#[test]
fn full_pipeline_samples_trains_and_saves() {
    let log_dir = unique_log_dir("e2e");
    let _ = fs::remove_dir_all(&log_dir);
    let config = smoke_config(log_dir.to_str().unwrap());

    let env = Box::new(PointMassEnv::new(&config.env));
    let skill_policy = Box::new(ScriptedSkillPolicy::new(NUM_SKILLS, config.seed as u64));
    let agent = DisentAgent::new(&config, env, skill_policy, Device::Cpu).unwrap();
    let summary = agent.run().unwrap();

    // sampling filled the requested budget, balanced over skills
    assert_eq!(summary.step_counts.len(), NUM_SKILLS);
    let total: u64 = summary.step_counts.iter().sum();
    assert!(total >= MIN_STEPS, "only {total} transitions sampled");
    let max = summary.step_counts.iter().max().copied().unwrap();
    let min = summary.step_counts.iter().min().copied().unwrap();
    assert!(
        max - min <= (NUM_SEQUENCES - 1) as u64,
        "skill step counts drifted apart: {:?}",
        summary.step_counts
    );
    assert!(summary.episodes > 0);

    assert_eq!(summary.learn_steps, config.hyperparameters.train_steps);

    // checkpoint plus hyperparameter snapshot next to it
    assert!(summary.model_dir.join("mode_model.ot").is_file());
    assert!(summary.model_dir.join("obs_encoder.ot").is_file());
    assert!(summary.model_dir.join("run_hyperparameter.json").is_file());
    let snapshot = fs::read_to_string(summary.model_dir.join("run_hyperparameter.json")).unwrap();
    let parsed: Configuration = serde_json::from_str(&snapshot).unwrap();
    assert_eq!(parsed.hyperparameters.train_steps, 1);

    // the event file with the scalar set and the mode map figure
    let summary_dir = log_dir.join("summary").join(config.run_id());
    let entries: Vec<_> = fs::read_dir(&summary_dir).unwrap().collect();
    assert!(!entries.is_empty(), "no event files under {summary_dir:?}");

    let _ = fs::remove_dir_all(&log_dir);
}

#[test]
fn too_many_skills_for_the_palette_is_a_config_error() {
    let log_dir = unique_log_dir("palette");
    let config = smoke_config(log_dir.to_str().unwrap());

    let env = Box::new(PointMassEnv::new(&config.env));
    let skill_policy = Box::new(ScriptedSkillPolicy::new(11, config.seed as u64));
    let result = DisentAgent::new(&config, env, skill_policy, Device::Cpu);
    assert!(result.is_err());

    let _ = fs::remove_dir_all(&log_dir);
}
