use std::fs;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use tch::{
    nn::{self, OptimizerConfig},
    Device, Tensor,
};
use tensorboard_rs::summary_writer::SummaryWriter;

use crate::algorithms::common_utils::is_interval;
use crate::algorithms::disent::disent_learn::{DisentLearner, LossStats};
use crate::config::Configuration;
use crate::error::DisentError;
use crate::gym_env::GymEnv;
use crate::memory::SequenceMemory;
use crate::models::mode::mode_model::ModeLatentNetwork;
use crate::models::model_base::ObsEncoder;
use crate::plotting::{save_mode_map, SaveTarget, PLOT_DIM, SKILL_PALETTE};
use crate::skill_policy::SkillPolicy;

/// What a finished run leaves behind, mostly for the end-to-end tests.
pub struct RunSummary {
    pub model_dir: PathBuf,
    pub step_counts: Vec<u64>,
    pub episodes: u64,
    pub learn_steps: u64,
}

/// Drives the whole pipeline: skill-balanced rollouts into the sequence
/// memory, the Info-VAE training loop, and the final checkpoint. The phases
/// run strictly linearly, `run` consumes the agent so nothing re-enters.
pub struct DisentAgent {
    env: Box<dyn GymEnv>,
    skill_policy: Box<dyn SkillPolicy>,
    memory: SequenceMemory,
    obs_encoder: ObsEncoder,
    vs_encoder: nn::VarStore,
    mode_model: ModeLatentNetwork,
    vs_mode: nn::VarStore,
    optim: nn::Optimizer,
    learner: DisentLearner,
    writer: SummaryWriter,
    model_dir: PathBuf,

    num_skills: usize,
    mode_dim: i64,
    min_steps_sampling: u64,
    batch_size: usize,
    train_steps: u64,
    log_interval: u64,

    learn_steps: u64,
    episodes: u64,
    plot_warned: bool,
}

impl DisentAgent {
    pub fn new(
        config: &Configuration,
        mut env: Box<dyn GymEnv>,
        skill_policy: Box<dyn SkillPolicy>,
        device: Device,
    ) -> Result<Self, DisentError> {
        let num_skills = skill_policy.num_skills();
        if num_skills > SKILL_PALETTE.len() {
            return Err(DisentError::Config(format!(
                "not more than {} skills supported for mode plotting (more colors needed), got {}",
                SKILL_PALETTE.len(),
                num_skills
            )));
        }

        let seed = config.seed;
        tch::manual_seed(seed);
        tch::Cuda::manual_seed_all(seed as u64);
        env.seed(seed as u64);

        let obs_dim = env.observation_space();
        let action_dim = env.action_space();
        let hp = &config.hyperparameters;

        let mut vs_encoder = nn::VarStore::new(device);
        let obs_encoder = ObsEncoder::new(
            &vs_encoder.root(),
            obs_dim,
            &config.network.hidden_units_obs_encoder,
            &config.network.act_func,
        );
        // the encoder is fixed-purpose, it is never optimized
        vs_encoder.freeze();

        let mut vs_mode = nn::VarStore::new(device);
        let mode_model = ModeLatentNetwork::new(
            &vs_mode.root(),
            hp.mode_dim,
            obs_dim,
            action_dim,
            &config.network,
        );
        if let Some(path) = &config.mode_model_path {
            vs_mode.load(path)?;
            println!("loaded pretrained mode model from {path}");
        }
        let optim = nn::Adam::default().build(&vs_mode, hp.lr)?;

        let memory = SequenceMemory::new(hp.memory_size, hp.num_sequences, device, seed as u64);

        let run_id = config.run_id();
        let log_dir = PathBuf::from(&config.log_dir);
        let model_dir = log_dir.join("model").join(&run_id);
        let summary_dir = log_dir.join("summary").join(&run_id);
        for dir in [&model_dir, &summary_dir] {
            fs::create_dir_all(dir).map_err(|source| DisentError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        // snapshot the full hyperparameter set next to the model
        let hparam_path = model_dir.join("run_hyperparameter.json");
        let hparam_json = serde_json::to_string_pretty(config)?;
        fs::write(&hparam_path, hparam_json).map_err(|source| DisentError::Io {
            path: hparam_path.clone(),
            source,
        })?;

        let writer = SummaryWriter::new(&summary_dir);

        Ok(Self {
            env,
            skill_policy,
            memory,
            obs_encoder,
            vs_encoder,
            mode_model,
            vs_mode,
            optim,
            learner: DisentLearner::new(&config.info_loss),
            writer,
            model_dir,
            num_skills,
            mode_dim: hp.mode_dim,
            min_steps_sampling: hp.min_steps_sampling,
            batch_size: hp.batch_size,
            train_steps: hp.train_steps,
            log_interval: hp.log_interval,
            learn_steps: 0,
            episodes: 0,
            plot_warned: false,
        })
    }

    /// Sampling -> Training -> Saved.
    pub fn run(mut self) -> Result<RunSummary, DisentError> {
        let step_counts = self.sample_sequences();
        println!("per-skill steps after sampling: {step_counts:?}");
        self.memory.skill_histogram(&mut self.writer, 0);

        self.train()?;

        self.save_models()?;
        self.writer.flush();

        Ok(RunSummary {
            model_dir: self.model_dir,
            step_counts,
            episodes: self.episodes,
            learn_steps: self.learn_steps,
        })
    }

    /// Fills the memory until `min_steps_sampling` transitions were taken,
    /// round-robin over skills. The counters live in an explicit accumulator,
    /// one slot per skill.
    fn sample_sequences(&mut self) -> Vec<u64> {
        let mut step_cnt = vec![0u64; self.num_skills];
        let mut skill = 0;
        while step_cnt.iter().sum::<u64>() < self.min_steps_sampling {
            self.sample_equal_skill_dist(skill, &mut step_cnt);
            skill = (skill + 1) % self.num_skills;
            self.episodes += 1;
        }
        step_cnt
    }

    /// Rolls out the given skill until one sequence is committed. A skill
    /// only keeps stepping while it has not caught up with the current
    /// maximum counter, so counters never drift apart by more than one
    /// sequence worth of steps.
    fn sample_equal_skill_dist(&mut self, skill: usize, step_cnt: &mut [u64]) {
        let mut episode_steps = 0u64;
        self.skill_policy.set_skill(skill);

        let obs = self.env.reset();
        self.memory.set_initial_state(obs.clone());

        let mut next_obs = obs;
        let mut done = false;
        while step_cnt[skill] <= step_cnt.iter().max().copied().unwrap_or(0) {
            if done {
                next_obs = self.env.reset();
            }

            let policy_obs = if self.env.state_normalization() {
                self.env.denormalize(&next_obs)
            } else {
                next_obs.clone()
            };
            let action = self.skill_policy.get_action(&policy_obs);
            let step = self.env.step(&action);

            episode_steps += 1;
            step_cnt[skill] += 1;
            done = step.is_done;
            next_obs = step.obs.clone();

            let seq_pushed = self.memory.append(action, skill as u8, step.obs, done);
            if seq_pushed {
                break;
            }
        }

        println!(
            "episode: {:<4}  episode_steps: {:<4}  skill: {:<4}",
            self.episodes, episode_steps, skill
        );
    }

    fn train(&mut self) -> Result<(), DisentError> {
        let prog_bar = ProgressBar::new(self.train_steps);
        prog_bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} [{per_sec}]").unwrap());
        prog_bar.set_message("training mode model");
        for _ in 0..self.train_steps {
            self.learn_step()?;
            prog_bar.inc(1);
        }
        prog_bar.finish_and_clear();
        Ok(())
    }

    fn learn_step(&mut self) -> Result<(), DisentError> {
        let batch = self.memory.sample_sequence(self.batch_size);
        let (stats, mode_post_samples) =
            self.learner
                .do_calc(&mut self.obs_encoder, &self.mode_model, &mut self.optim, &batch);

        if is_interval(self.log_interval, self.learn_steps) {
            self.log_stats(&stats);
            self.plot_mode_map(&batch.skill_seq, &mode_post_samples)?;
        }

        self.learn_steps += 1;
        Ok(())
    }

    fn log_stats(&mut self, stats: &LossStats) {
        let step = self.learn_steps as usize;
        self.writer
            .add_scalar("mode_model/stats/log_likelihood", stats.log_likelihood, step);
        self.writer.add_scalar("mode_model/stats/mse", stats.mse, step);
        self.writer.add_scalar("mode_model/stats/kld", stats.kld, step);
        self.writer.add_scalar("mode_model/stats/mmd", stats.mmd, step);

        self.writer
            .add_scalar("mode_model/info_vae/kld_info_weighted", stats.kld_info, step);
        self.writer
            .add_scalar("mode_model/info_vae/mmd_info_weighted", stats.mmd_info, step);
        self.writer.add_scalar(
            "mode_model/info_vae/loss_on_latent",
            stats.kld_info + stats.mmd_info,
            step,
        );
    }

    /// Scatter of posterior mode samples colored by skill. Only defined for
    /// 2d mode latents, other dimensionalities warn once and skip.
    fn plot_mode_map(&mut self, skill_seq: &Tensor, mode_post_samples: &Tensor) -> Result<(), DisentError> {
        if self.mode_dim != PLOT_DIM {
            if !self.plot_warned {
                eprintln!(
                    "warning: mode dimension is {} not {}, no mode map is plotted",
                    self.mode_dim, PLOT_DIM
                );
                self.plot_warned = true;
            }
            return Ok(());
        }

        assert!(
            mode_post_samples.size() == vec![self.batch_size as i64, PLOT_DIM],
            "unexpected mode sample shape {:?}",
            mode_post_samples.size()
        );

        // skill is constant within a sequence, the first entry is enough
        let skills: Vec<u8> = Vec::<f32>::try_from(&skill_seq.select(2, 0).select(1, 0))
            .unwrap()
            .iter()
            .map(|s| *s as u8)
            .collect();
        let samples: Vec<(f32, f32)> = Vec::<Vec<f32>>::try_from(mode_post_samples)
            .unwrap()
            .iter()
            .map(|row| (row[0], row[1]))
            .collect();

        save_mode_map(
            &samples,
            &skills,
            SaveTarget::Writer(&mut self.writer, self.learn_steps as usize),
        )
    }

    fn save_models(&mut self) -> Result<(), DisentError> {
        let model_path = self.model_dir.join("mode_model.ot");
        self.vs_mode.save(&model_path)?;
        self.vs_encoder.save(self.model_dir.join("obs_encoder.ot"))?;
        println!("saved mode model to {}", model_path.display());
        Ok(())
    }
}
