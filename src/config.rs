use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Serialize, Deserialize, Clone)]
pub struct Configuration {
    pub hyperparameters: Hyperparameters,
    pub info_loss: InfoLossParams,
    pub network: Network,
    pub env: EnvInfo,
    pub skill_policy: SkillPolicyConfig,
    pub device: String,
    #[serde(default)]
    pub seed: i64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub run_comment: Option<String>,
    #[serde(default)]
    pub mode_model_path: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Hyperparameters {
    pub min_steps_sampling: u64,
    pub batch_size: usize,
    pub num_sequences: usize,
    pub train_steps: u64,
    pub lr: f64,
    pub mode_dim: i64,
    pub memory_size: usize,
    pub log_interval: u64,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct InfoLossParams {
    pub alpha: f64,
    pub lamda: f64,
    #[serde(default)]
    pub kld_diff_desired: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Network {
    pub rnn_dim: i64,
    pub num_rnn_layers: i64,
    #[serde(default)]
    pub rnn_dropout: f64,
    pub hidden_units_mode_encoder: Vec<i64>,
    pub hidden_units_obs_encoder: Vec<i64>,
    pub hidden_units_action_decoder: Vec<i64>,
    pub num_mode_repetitions: i64,
    pub std_decoder: f64,
    #[serde(default = "default_act_func")]
    pub act_func: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct EnvInfo {
    pub env_type: EnvType,
    pub max_episode_steps: u64,
    #[serde(default = "default_true")]
    pub state_normalization: bool,
}

// closed set of supported environments, unknown ids fail at deserialization
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum EnvType {
    PointMass,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct SkillPolicyConfig {
    #[serde(default)]
    pub path: Option<String>,
    pub num_skills: usize,
    pub num_layers: usize,
    pub layer_size: i64,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_act_func() -> String {
    "relu".to_string()
}

fn default_true() -> bool {
    true
}

impl Configuration {
    pub fn load_configuration(config_file: &Path) -> Result<Configuration, serde_json::Error> {
        let mut file = match File::open(config_file) {
            Ok(file) => file,
            Err(error) => {
                panic!("Error opening file {}: {}", config_file.display(), error);
            }
        };
        let mut contents = String::new();
        match file.read_to_string(&mut contents) {
            Ok(_) => (), // Reading was successful
            Err(error) => {
                panic!("Error reading contents of {}: {}", config_file.display(), error);
            }
        };
        serde_json::from_str(&contents)
    }

    /// Stable identifier for the run, used for the model and summary directories.
    pub fn run_id(&self) -> String {
        let mut run_id = format!("mode_disent{}", self.seed);
        if let Some(comment) = &self.run_comment {
            run_id.push('-');
            run_id.push_str(comment);
        }
        run_id
    }
}
