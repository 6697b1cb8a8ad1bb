use tch::{Kind, Tensor};

/// Diagonal Gaussian over the last tensor dimension. Holds plain tensors so
/// the same struct serves batched latents (B, D) and per-step action
/// distributions (B, S, A).
pub struct Normal {
    loc: Tensor,
    scale: Tensor,
}

impl Normal {
    /// `scale` must be strictly positive, callers construct it via exp/softplus.
    pub fn new(loc: Tensor, scale: Tensor) -> Self {
        Self { loc, scale }
    }

    pub fn loc(&self) -> &Tensor {
        &self.loc
    }

    pub fn scale(&self) -> &Tensor {
        &self.scale
    }

    /// Reparameterized sample, gradients flow through loc and scale.
    pub fn rsample(&self) -> Tensor {
        &self.loc + self.loc.randn_like() * &self.scale
    }

    /// Elementwise log density of `value`.
    pub fn log_prob(&self, value: &Tensor) -> Tensor {
        let z = (value - &self.loc) / &self.scale;
        z.square() * -0.5 - self.scale.log() - 0.5 * (2. * std::f64::consts::PI).ln()
    }
}

/// KL(p || q) for diagonal Gaussians, summed over latent dimensions and
/// averaged over the batch (leading) dimension.
pub fn calc_kl_divergence(p: &Normal, q: &Normal) -> Tensor {
    assert!(
        p.loc.size() == q.loc.size(),
        "kl divergence between mismatched shapes: {:?} vs {:?}",
        p.loc.size(),
        q.loc.size()
    );
    let var_ratio = (p.scale() / q.scale()).square();
    let t1 = ((p.loc() - q.loc()) / q.scale()).square();
    let elementwise: Tensor = 0.5 * (&var_ratio + t1 - 1. - var_ratio.log());

    let batch_size = elementwise.size()[0];
    elementwise.sum(Kind::Float) / batch_size as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn unit_normal(batch: i64, dim: i64) -> Normal {
        Normal::new(
            Tensor::zeros([batch, dim], (Kind::Float, Device::Cpu)),
            Tensor::ones([batch, dim], (Kind::Float, Device::Cpu)),
        )
    }

    #[test]
    fn kl_with_self_is_zero() {
        let p = unit_normal(4, 3);
        let kl = f32::try_from(&calc_kl_divergence(&p, &p)).unwrap();
        assert!(kl.abs() < 1e-6, "kl was {kl}");
    }

    #[test]
    fn kl_is_positive_for_shifted_mean() {
        let p = Normal::new(
            Tensor::ones([4, 3], (Kind::Float, Device::Cpu)),
            Tensor::ones([4, 3], (Kind::Float, Device::Cpu)),
        );
        let q = unit_normal(4, 3);
        // KL(N(1,1) || N(0,1)) = 0.5 per dim, summed over 3 dims
        let kl = f32::try_from(&calc_kl_divergence(&p, &q)).unwrap();
        assert!((kl - 1.5).abs() < 1e-5, "kl was {kl}");
    }

    #[test]
    fn log_prob_matches_standard_normal_density_at_mean() {
        let p = unit_normal(1, 1);
        let lp = f32::try_from(
            &p.log_prob(&Tensor::zeros([1, 1], (Kind::Float, Device::Cpu)))
                .sum(Kind::Float),
        )
        .unwrap();
        let expected = -0.5 * (2. * std::f32::consts::PI).ln();
        assert!((lp - expected).abs() < 1e-5);
    }

    #[test]
    fn rsample_has_distribution_shape() {
        let p = unit_normal(8, 2);
        assert_eq!(p.rsample().size(), vec![8, 2]);
    }
}
