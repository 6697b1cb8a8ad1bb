use tch::{
    nn::{self, RNNConfig, RNN},
    Device, Kind, Tensor,
};

use crate::config::Network;
use crate::models::distributions::Normal;
use crate::models::model_base::{activation_from_str, build_mlp};

/// Distribution over the mode latent together with one reparameterized draw.
pub struct ModeSample {
    pub dist: Normal,
    pub sample: Tensor,
}

/// Per-step action distribution and a reconstructed action sequence.
pub struct ActionRecon {
    pub dist: Normal,
    pub sample: Tensor,
}

/// Latent mode model: a GRU posterior over feature sequences, an
/// input-independent prior and an action decoder conditioned on per-step
/// state representations plus one mode sample.
///
/// All three heads are pure functions of the current parameters, nothing here
/// mutates state outside the owning optimizer step.
pub struct ModeLatentNetwork {
    rnn: nn::GRU,
    num_rnn_layers: i64,
    encoder_hidden: nn::Sequential,
    mean_head: nn::Linear,
    log_std_head: nn::Linear,
    decoder: nn::Sequential,
    num_mode_repetitions: i64,
    std_decoder: f64,
    mode_dim: i64,
    device: Device,
}

impl ModeLatentNetwork {
    pub fn new(
        p: &nn::Path,
        mode_dim: i64,
        feature_dim: i64,
        action_dim: i64,
        net: &Network,
    ) -> Self {
        let rnn_config = RNNConfig {
            num_layers: net.num_rnn_layers,
            dropout: net.rnn_dropout,
            ..Default::default()
        };
        let rnn = nn::gru(p / "rnn", feature_dim, net.rnn_dim, rnn_config);

        // hidden stack between the last rnn state and the distribution heads,
        // activation after every layer so the heads see a nonlinear embedding
        let activation_func = activation_from_str(&net.act_func);
        let mut encoder_hidden = nn::seq();
        let mut last_hidden = net.rnn_dim;
        for (i, dim) in net.hidden_units_mode_encoder.iter().enumerate() {
            let layer_str = format!("ml{i}");
            encoder_hidden = encoder_hidden.add(nn::linear(
                p / "mode_encoder" / layer_str,
                last_hidden,
                *dim,
                Default::default(),
            ));
            encoder_hidden = encoder_hidden.add_fn(move |xs| activation_func(xs));
            last_hidden = *dim;
        }
        let mean_head = nn::linear(p / "mode_mean", last_hidden, mode_dim, Default::default());
        let log_std_head = nn::linear(p / "mode_log_std", last_hidden, mode_dim, Default::default());

        let decoder_in = feature_dim + mode_dim * net.num_mode_repetitions;
        let decoder = build_mlp(
            &(p / "action_decoder"),
            "d",
            decoder_in,
            &net.hidden_units_action_decoder,
            action_dim,
            &net.act_func,
            None,
        );

        Self {
            rnn,
            num_rnn_layers: net.num_rnn_layers,
            encoder_hidden,
            mean_head,
            log_std_head,
            decoder,
            num_mode_repetitions: net.num_mode_repetitions,
            std_decoder: net.std_decoder,
            mode_dim,
            device: p.device(),
        }
    }

    pub fn mode_dim(&self) -> i64 {
        self.mode_dim
    }

    /// Posterior over the mode latent given an encoded observation sequence
    /// of shape (batch, seq, feature).
    pub fn sample_mode_posterior(&self, features_seq: &Tensor) -> ModeSample {
        assert!(
            features_seq.dim() == 3,
            "posterior expects (batch, seq, feature) input, got {:?}",
            features_seq.size()
        );
        let (_, nn::GRUState(hidden)) = self.rnn.seq(features_seq);
        // hidden is (num_layers, batch, rnn_dim), take the top layer
        let last = hidden.get(self.num_rnn_layers - 1);
        let encoded = last.apply(&self.encoder_hidden);

        let mean = encoded.apply(&self.mean_head);
        let std = encoded.apply(&self.log_std_head).clamp(-20., 2.).exp();
        let dist = Normal::new(mean, std);
        let sample = dist.rsample();
        ModeSample { dist, sample }
    }

    /// Input-independent prior over the mode latent, batched.
    pub fn sample_mode_prior(&self, batch_size: i64) -> ModeSample {
        let dist = Normal::new(
            Tensor::zeros([batch_size, self.mode_dim], (Kind::Float, self.device)),
            Tensor::ones([batch_size, self.mode_dim], (Kind::Float, self.device)),
        );
        let sample = dist.rsample();
        ModeSample { dist, sample }
    }

    /// Decodes an action distribution per time step from state representations
    /// (batch, seq, feature) or a single step (batch, feature), conditioned on
    /// one mode sample per batch element.
    pub fn action_decoder(&self, state_rep_seq: &Tensor, mode_sample: &Tensor) -> ActionRecon {
        let mode_rep = mode_sample.repeat([1, self.num_mode_repetitions]);
        let input = match state_rep_seq.dim() {
            2 => Tensor::cat(&[state_rep_seq, &mode_rep], 1),
            3 => {
                let seq_len = state_rep_seq.size()[1];
                let tiled = mode_rep.unsqueeze(1).repeat([1, seq_len, 1]);
                Tensor::cat(&[state_rep_seq, &tiled], 2)
            }
            d => panic!("action decoder expects 2d or 3d state reps, got {d}d"),
        };

        let mean = input.apply(&self.decoder).tanh();
        let std = mean.ones_like() * self.std_decoder;
        let dist = Normal::new(mean, std);
        let sample = dist.rsample();
        ActionRecon { dist, sample }
    }
}
