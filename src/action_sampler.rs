use tch::{Device, Tensor};

use crate::models::mode::mode_model::ModeLatentNetwork;

/// Inference-time companion to the trained mode model. Holds the active mode
/// latent and a staged successor: `set_mode_next` decides the new mode,
/// `update_mode_to_next` makes it take effect. The two-slot commit lets a
/// control loop pick the exact step at which a mode switch becomes visible.
pub struct ActionSampler {
    mode_model: ModeLatentNetwork,
    mode: Option<Tensor>,
    mode_next: Option<Tensor>,
    device: Device,
}

impl ActionSampler {
    pub fn new(mode_model: ModeLatentNetwork, device: Device) -> Self {
        Self {
            mode_model,
            mode: None,
            mode_next: None,
            device,
        }
    }

    /// Starts from the given mode, or a fresh prior draw when none is given.
    /// Both slots are set, so a following `update_mode_to_next` is a no-op
    /// until something new is staged.
    pub fn reset(&mut self, mode: Option<Tensor>) {
        let mode_to_set = match mode {
            Some(mode) => mode,
            None => tch::no_grad(|| self.mode_model.sample_mode_prior(1).sample),
        };
        self.set_mode(mode_to_set);
    }

    fn set_mode(&mut self, mode: Tensor) {
        let mode = mode.to_device(self.device);
        self.mode_next = Some(mode.shallow_clone());
        self.mode = Some(mode);
    }

    /// Stages a mode switch without applying it.
    pub fn set_mode_next(&mut self, mode: Tensor) {
        self.mode_next = Some(mode.to_device(self.device));
    }

    /// Commits the staged mode.
    pub fn update_mode_to_next(&mut self) {
        if let Some(next) = &self.mode_next {
            self.mode = Some(next.shallow_clone());
        }
    }

    /// The currently active mode latent, (1, mode_dim).
    pub fn mode(&self) -> &Tensor {
        self.mode.as_ref().expect("action sampler used before reset")
    }

    /// Decodes one action from the active mode and a state representation of
    /// shape (1, state_rep_dim). Returns (1, action_dim).
    pub fn get_action(&self, state_rep: &Tensor) -> Tensor {
        let mode = self.mode.as_ref().expect("action sampler used before reset");
        tch::no_grad(|| self.mode_model.action_decoder(state_rep, mode).sample)
    }
}
