mod common;

use common::{assert_pass_close, forward_backward, random_tensor};
use convflow_neural::fillers::FillerConfig;
use convflow_neural::layers::{ConvEngine, Convolution, ConvolutionConfig, Deconvolution};
use proptest::prelude::*;

type Problem = (usize, usize, usize, usize, usize, usize, usize, usize, usize);

fn small_problem() -> impl Strategy<Value = Problem> {
    (
        1usize..3, // tiles
        1usize..4, // images per tile
        1usize..3, // group
        1usize..3, // input channels per group
        1usize..3, // outputs per group
        1usize..4, // kernel
        1usize..3, // stride
        0usize..2, // pad
        4usize..7, // spatial extent
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn tiled_engine_matches_per_image(
        (tiles, tile, group, cin, cout, kernel, stride, pad, size) in small_problem(),
        seed in 0u64..1000,
        reversed in any::<bool>(),
        bias_term in any::<bool>(),
    ) {
        let batch = tiles * tile;
        let config = ConvolutionConfig::new(group * cout)
            .with_kernel_size(kernel)
            .with_stride(&[stride])
            .with_pad(&[pad])
            .with_group(group)
            .with_bias_term(bias_term)
            .with_weight_filler(FillerConfig::Uniform { min: -1.0, max: 1.0 })
            .with_bias_filler(FillerConfig::Uniform { min: -1.0, max: 1.0 })
            .with_seed(seed);
        let tiled = config.clone().with_engine(ConvEngine::BatchTiled { max_tile_size: tile });
        let x = random_tensor(&[batch, group * cin, size, size - 1], seed);

        let (a, b) = if reversed {
            (
                forward_backward(&mut Deconvolution::new(config), &x, seed + 1).unwrap(),
                forward_backward(&mut Deconvolution::new(tiled), &x, seed + 1).unwrap(),
            )
        } else {
            (
                forward_backward(&mut Convolution::new(config), &x, seed + 1).unwrap(),
                forward_backward(&mut Convolution::new(tiled), &x, seed + 1).unwrap(),
            )
        };
        assert_pass_close(&b, &a, 1e-9);
    }
}
