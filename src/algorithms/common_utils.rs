use tch::{Kind, Tensor};

/// Maximum mean discrepancy between two sample sets (n, d) and (m, d) under a
/// Gaussian kernel with bandwidth fixed to the latent dimension, the
/// "info-vae tutorial" estimator.
pub fn compute_mmd(x: &Tensor, y: &Tensor) -> Tensor {
    assert!(
        x.kind() == Kind::Float,
        "x samples in mmd calc were not of type float"
    );
    assert!(
        y.kind() == Kind::Float,
        "y samples in mmd calc were not of type float"
    );
    assert!(
        x.size()[1] == y.size()[1],
        "mmd sample sets disagree on latent dim: {:?} vs {:?}",
        x.size(),
        y.size()
    );

    let xx = gaussian_kernel(x, x).mean(Kind::Float);
    let yy = gaussian_kernel(y, y).mean(Kind::Float);
    let xy = gaussian_kernel(x, y).mean(Kind::Float);
    xx + yy - 2. * xy
}

// k(a, b) = exp(-||a - b||^2 / d) for every pair of rows
fn gaussian_kernel(x: &Tensor, y: &Tensor) -> Tensor {
    let dim = x.size()[1];
    // row-wise squared norms via matmul, avoids materializing (n, m, d)
    let ones = Tensor::ones([dim, 1], (Kind::Float, x.device()));
    let x_sq = x.square().matmul(&ones); // (n, 1)
    let y_sq = y.square().matmul(&ones); // (m, 1)
    let dist_sq: Tensor = &x_sq + y_sq.transpose(0, 1) - 2. * x.matmul(&y.transpose(0, 1));
    (dist_sq * (-1. / dim as f64)).exp()
}

/// True every `interval` steps, the logging cadence check.
pub fn is_interval(interval: u64, steps: u64) -> bool {
    steps % interval == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn mmd_with_itself_is_zero() {
        tch::manual_seed(0);
        let x = Tensor::randn([16, 2], (Kind::Float, Device::Cpu));
        let mmd = f32::try_from(&compute_mmd(&x, &x)).unwrap();
        assert!(mmd.abs() < 1e-5, "mmd was {mmd}");
    }

    #[test]
    fn mmd_grows_with_separated_sample_sets() {
        tch::manual_seed(0);
        let x = Tensor::randn([64, 2], (Kind::Float, Device::Cpu));
        let near = &x + 0.01;
        let far = &x + 5.;
        let mmd_near = f32::try_from(&compute_mmd(&x, &near)).unwrap();
        let mmd_far = f32::try_from(&compute_mmd(&x, &far)).unwrap();
        assert!(mmd_far > mmd_near);
        assert!(mmd_far > 0.5);
    }

    #[test]
    fn interval_cadence() {
        assert!(is_interval(100, 0));
        assert!(!is_interval(100, 99));
        assert!(is_interval(100, 300));
    }
}
