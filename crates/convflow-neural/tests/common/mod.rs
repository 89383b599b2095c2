#![allow(dead_code)]

use approx::assert_abs_diff_eq;
use convflow_core::{Result, Tensor};
use convflow_neural::layers::Layer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn random_tensor(shape: &[usize], seed: u64) -> Tensor<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let len = shape.iter().product();
    let data = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Tensor::from_vec(data, shape).expect("random tensor shape")
}

pub fn assert_tensor_close(actual: &Tensor<f64>, expected: &Tensor<f64>, epsilon: f64) {
    assert_eq!(actual.dims(), expected.dims());
    for (a, e) in actual.data().iter().zip(expected.data()) {
        assert_abs_diff_eq!(*a, *e, epsilon = epsilon);
    }
}

pub fn dot(a: &Tensor<f64>, b: &Tensor<f64>) -> f64 {
    a.data().iter().zip(b.data()).map(|(x, y)| x * y).sum()
}

/// Images `[start, end)` of a tensor whose first axis is the batch
pub fn batch_slice(t: &Tensor<f64>, start: usize, end: usize) -> Tensor<f64> {
    let per_image = t.count_from(1);
    let mut dims = t.dims().to_vec();
    dims[0] = end - start;
    Tensor::from_vec(t.data()[start * per_image..end * per_image].to_vec(), &dims)
        .expect("batch slice shape")
}

/// Channels `[start, end)` of an `[N, C, spatial...]` tensor
pub fn channel_slice(t: &Tensor<f64>, start: usize, end: usize) -> Tensor<f64> {
    let spatial = t.count_from(2);
    let per_image = t.count_from(1);
    let mut data = Vec::new();
    for n in 0..t.dim(0) {
        let base = n * per_image;
        data.extend_from_slice(&t.data()[base + start * spatial..base + end * spatial]);
    }
    let mut dims = t.dims().to_vec();
    dims[1] = end - start;
    Tensor::from_vec(data, &dims).expect("channel slice shape")
}

/// Results of one forward and backward pass
pub struct Pass {
    pub top: Tensor<f64>,
    pub bottom_diff: Tensor<f64>,
    pub weight_diff: Tensor<f64>,
    pub bias_diff: Option<Tensor<f64>>,
}

/// Forward `x`, back-propagate a random top gradient drawn from `grad_seed`
pub fn forward_backward<L: Layer<f64>>(
    layer: &mut L,
    x: &Tensor<f64>,
    grad_seed: u64,
) -> Result<Pass> {
    if !layer.is_setup() {
        layer.setup(&[x])?;
    }
    let mut top = vec![Tensor::zeros(&[0])];
    layer.forward(&[x], &mut top)?;
    let top = top.remove(0);
    let top_diff = random_tensor(top.dims(), grad_seed);

    let mut bottom_diff = vec![Tensor::zeros(&[0])];
    layer.backward(&[&top_diff], &[true], &[x], &mut bottom_diff)?;

    let grads = layer.gradients();
    Ok(Pass {
        top,
        bottom_diff: bottom_diff.remove(0),
        weight_diff: grads[0].clone(),
        bias_diff: grads.get(1).map(|g| (*g).clone()),
    })
}

pub fn assert_pass_close(actual: &Pass, expected: &Pass, epsilon: f64) {
    assert_tensor_close(&actual.top, &expected.top, epsilon);
    assert_tensor_close(&actual.bottom_diff, &expected.bottom_diff, epsilon);
    assert_tensor_close(&actual.weight_diff, &expected.weight_diff, epsilon);
    match (&actual.bias_diff, &expected.bias_diff) {
        (Some(a), Some(e)) => assert_tensor_close(a, e, epsilon),
        (None, None) => {}
        _ => panic!("bias presence differs"),
    }
}
