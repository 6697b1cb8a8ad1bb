use tch::{
    nn::{self, init, LinearConfig},
    Device, Tensor,
};

// technically this could just be a Module from tch but maybe in the future we want to add our own trait functions
pub trait Model {
    fn forward(&mut self, input: &Tensor) -> Tensor;
}

/// Maps the configured activation name onto a tensor op. Unknown names are a
/// configuration error and fail immediately.
pub fn activation_from_str(act_func: &str) -> fn(&Tensor) -> Tensor {
    match act_func {
        "relu" => |xs: &Tensor| xs.relu(),
        "tanh" => |xs: &Tensor| xs.tanh(),
        "gelu" => |xs: &Tensor| xs.gelu("none"),
        other => panic!("unsupported activation function in config: {other}"),
    }
}

/// Builds a plain MLP, one named linear layer per hidden entry plus an output
/// head with no activation.
pub fn build_mlp(
    p: &nn::Path,
    prefix: &str,
    n_in: i64,
    hidden_units: &[i64],
    n_out: i64,
    act_func: &str,
    config: Option<LinearConfig>,
) -> nn::Sequential {
    // default LinearConfig with kaiming
    let lin_conf = config.unwrap_or(LinearConfig {
        ws_init: init::DEFAULT_KAIMING_NORMAL,
        bs_init: None,
        bias: true,
    });
    let layer_func =
        |in_dim: i64, out_dim: i64, layer_str: String| nn::linear(p / layer_str, in_dim, out_dim, lin_conf);
    let activation_func = activation_from_str(act_func);

    let mut seq = nn::seq();
    let mut last_dim = n_in;
    for (i, dim) in hidden_units.iter().enumerate() {
        let layer_str = format!("{prefix}l{i}");
        seq = seq.add(layer_func(last_dim, *dim, layer_str));
        seq = seq.add_fn(move |xs| activation_func(xs));
        last_dim = *dim;
    }
    seq.add(layer_func(last_dim, n_out, format!("{prefix}out")))
}

/// Fixed-purpose observation encoder mapping raw observations to the feature
/// space consumed by the mode model. Its parameters are never optimized; the
/// owning VarStore is frozen after construction.
pub struct ObsEncoder {
    seq: nn::Sequential,
    device: Device,
    n_in: i64,
}

impl ObsEncoder {
    pub fn new(p: &nn::Path, obs_dim: i64, hidden_units: &[i64], act_func: &str) -> Self {
        // feature dim matches the observation dim, the encoder only reshapes the space
        let seq = build_mlp(p, "e", obs_dim, hidden_units, obs_dim, act_func, None);
        Self {
            seq,
            device: p.device(),
            n_in: obs_dim,
        }
    }

    pub fn get_device(&self) -> Device {
        self.device
    }

    pub fn get_n_in(&self) -> i64 {
        self.n_in
    }
}

impl Model for ObsEncoder {
    fn forward(&mut self, input: &Tensor) -> Tensor {
        input.apply(&self.seq)
    }
}
