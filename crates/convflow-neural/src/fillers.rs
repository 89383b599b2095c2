//! Parameter initialisers.
//!
//! A filler is invoked exactly once per parameter, when a layer creates its weights and bias.
//! Fan-in follows the usual convention for convolution weights: `count / shape[0]`, i.e. the
//! number of inputs feeding one output channel.

use convflow_core::{ConvElement, Result, Tensor, TensorError};
use num_traits::FromPrimitive;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Named initialisation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FillerConfig {
    Constant { value: f64 },
    Uniform { min: f64, max: f64 },
    Gaussian { mean: f64, std: f64 },
    /// Uniform in `±sqrt(3 / fan_in)`
    Xavier,
    /// Gaussian with `std = sqrt(2 / fan_in)`
    Msra,
}

impl Default for FillerConfig {
    fn default() -> Self {
        FillerConfig::Constant { value: 0.0 }
    }
}

pub trait Filler<T> {
    fn fill(&mut self, tensor: &mut Tensor<T>) -> Result<()>;
}

fn cast<T: FromPrimitive>(value: f64) -> Result<T> {
    T::from_f64(value).ok_or_else(|| {
        TensorError::invalid_argument_op("fill", &format!("{value} is not representable"))
    })
}

fn fan_in(tensor: &Tensor<impl Sized>) -> Result<usize> {
    let leading = tensor.dims().first().copied().unwrap_or(0);
    if leading == 0 || tensor.numel() == 0 {
        return Err(TensorError::invalid_shape(
            "fill",
            "cannot derive fan-in from an empty tensor",
            Some(tensor.dims()),
        ));
    }
    Ok(tensor.numel() / leading)
}

pub struct ConstantFiller {
    value: f64,
}

impl<T: ConvElement> Filler<T> for ConstantFiller {
    fn fill(&mut self, tensor: &mut Tensor<T>) -> Result<()> {
        tensor.fill_(cast(self.value)?);
        Ok(())
    }
}

/// Uniform in `[min, max)`; `min == max` degenerates to a constant
pub struct UniformFiller {
    min: f64,
    max: f64,
    rng: StdRng,
}

impl UniformFiller {
    fn sample_into<T: ConvElement>(
        &mut self,
        tensor: &mut Tensor<T>,
        min: f64,
        max: f64,
    ) -> Result<()> {
        if !min.is_finite() || !max.is_finite() || !(max - min).is_finite() {
            return Err(TensorError::invalid_configuration(
                "uniform_filler",
                &format!("bounds [{min}, {max}) must be finite with a finite range"),
            ));
        }
        if min > max {
            return Err(TensorError::invalid_configuration(
                "uniform_filler",
                &format!("min {min} must not exceed max {max}"),
            ));
        }
        if min == max {
            tensor.fill_(cast(min)?);
            return Ok(());
        }
        let dist = Uniform::new(min, max);
        for v in tensor.data_mut() {
            *v = cast(dist.sample(&mut self.rng))?;
        }
        Ok(())
    }
}

impl<T: ConvElement> Filler<T> for UniformFiller {
    fn fill(&mut self, tensor: &mut Tensor<T>) -> Result<()> {
        let (min, max) = (self.min, self.max);
        self.sample_into(tensor, min, max)
    }
}

pub struct GaussianFiller {
    mean: f64,
    std: f64,
    rng: StdRng,
}

fn sample_gaussian<T: ConvElement>(
    rng: &mut StdRng,
    tensor: &mut Tensor<T>,
    mean: f64,
    std: f64,
) -> Result<()> {
    if !mean.is_finite() || !std.is_finite() || std < 0.0 {
        return Err(TensorError::invalid_configuration(
            "gaussian_filler",
            &format!("mean {mean} and std {std} must be finite, std non-negative"),
        ));
    }
    let dist = Normal::new(mean, std).map_err(|e| {
        TensorError::invalid_configuration("gaussian_filler", &format!("std {std}: {e}"))
    })?;
    for v in tensor.data_mut() {
        *v = cast(dist.sample(rng))?;
    }
    Ok(())
}

impl<T: ConvElement> Filler<T> for GaussianFiller {
    fn fill(&mut self, tensor: &mut Tensor<T>) -> Result<()> {
        sample_gaussian(&mut self.rng, tensor, self.mean, self.std)
    }
}

pub struct XavierFiller {
    inner: UniformFiller,
}

impl<T: ConvElement> Filler<T> for XavierFiller {
    fn fill(&mut self, tensor: &mut Tensor<T>) -> Result<()> {
        let scale = (3.0 / fan_in(tensor)? as f64).sqrt();
        self.inner.sample_into(tensor, -scale, scale)
    }
}

pub struct MsraFiller {
    rng: StdRng,
}

impl<T: ConvElement> Filler<T> for MsraFiller {
    fn fill(&mut self, tensor: &mut Tensor<T>) -> Result<()> {
        let std = (2.0 / fan_in(tensor)? as f64).sqrt();
        sample_gaussian(&mut self.rng, tensor, 0.0, std)
    }
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Build the filler described by `config`; a seed makes it deterministic
pub fn create_filler<T: ConvElement>(
    config: &FillerConfig,
    seed: Option<u64>,
) -> Box<dyn Filler<T>> {
    let rng = rng_from(seed);
    match *config {
        FillerConfig::Constant { value } => Box::new(ConstantFiller { value }),
        FillerConfig::Uniform { min, max } => Box::new(UniformFiller { min, max, rng }),
        FillerConfig::Gaussian { mean, std } => Box::new(GaussianFiller { mean, std, rng }),
        FillerConfig::Xavier => Box::new(XavierFiller {
            inner: UniformFiller {
                min: 0.0,
                max: 0.0,
                rng,
            },
        }),
        FillerConfig::Msra => Box::new(MsraFiller { rng }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_constant_filler() {
        let mut t = Tensor::<f32>::zeros(&[2, 3]);
        create_filler::<f32>(&FillerConfig::Constant { value: 0.5 }, None)
            .fill(&mut t)
            .unwrap();
        assert!(t.data().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn test_xavier_stays_within_bound() {
        // fan_in = 3 * 3 * 3 = 27 -> bound sqrt(3/27) = 1/3
        let mut t = Tensor::<f64>::zeros(&[8, 3, 3, 3]);
        create_filler::<f64>(&FillerConfig::Xavier, Some(1))
            .fill(&mut t)
            .unwrap();
        let bound = 1.0 / 3.0;
        assert!(t.data().iter().all(|&v| v.abs() <= bound));
        assert!(t.data().iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_seeded_fillers_are_reproducible() {
        let config = FillerConfig::Gaussian {
            mean: 0.0,
            std: 1.0,
        };
        let mut a = Tensor::<f32>::zeros(&[64]);
        let mut b = Tensor::<f32>::zeros(&[64]);
        create_filler::<f32>(&config, Some(42)).fill(&mut a).unwrap();
        create_filler::<f32>(&config, Some(42)).fill(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_msra_variance_is_plausible() {
        // fan_in = 50 -> std = 0.2
        let mut t = Tensor::<f64>::zeros(&[400, 50]);
        create_filler::<f64>(&FillerConfig::Msra, Some(3))
            .fill(&mut t)
            .unwrap();
        let n = t.numel() as f64;
        let mean = t.sum() / n;
        let var = t.data().iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 0.01);
        assert_abs_diff_eq!(var.sqrt(), 0.2, epsilon = 0.01);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut t = Tensor::<f32>::zeros(&[4]);
        let err = create_filler::<f32>(&FillerConfig::Uniform { min: 1.0, max: 0.0 }, Some(0))
            .fill(&mut t)
            .unwrap_err();
        assert!(err.is_configuration_error());

        let err = create_filler::<f32>(
            &FillerConfig::Gaussian {
                mean: 0.0,
                std: -1.0,
            },
            Some(0),
        )
        .fill(&mut t)
        .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_non_finite_bounds_rejected() {
        let configs = [
            FillerConfig::Uniform {
                min: 0.0,
                max: f64::INFINITY,
            },
            FillerConfig::Uniform {
                min: f64::NAN,
                max: 1.0,
            },
            FillerConfig::Uniform {
                min: -f64::MAX,
                max: f64::MAX,
            },
            FillerConfig::Gaussian {
                mean: 0.0,
                std: f64::NAN,
            },
            FillerConfig::Gaussian {
                mean: f64::INFINITY,
                std: 1.0,
            },
        ];
        for config in &configs {
            let mut t = Tensor::<f64>::zeros(&[4]);
            let err = create_filler::<f64>(config, Some(0)).fill(&mut t).unwrap_err();
            assert!(err.is_configuration_error(), "{config:?}");
        }
    }
}
