//! Property tests for `bgrid-kernels`.
//!
//! 1. **Provider parity** – the parallel kernel matches the reference kernel
//!    for forward, guide gradient and grid gradient on random shapes.
//! 2. **Linearity in the grid** – scaling the grid scales the output.
//! 3. **Scatter mass** – with `dO = 1` the grid gradient sums to the total
//!    interpolation weight seen in forward.
//! 4. **Weight bound** – slicing an all-ones grid never exceeds 1.

use bgrid_common::{DepthMapping, OutputLayout, SliceConfig, SliceGeometry};
use bgrid_kernels::{ParallelKernel, ReferenceKernel, SliceKernel};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Case {
    geom: SliceGeometry,
    guide: Vec<f32>,
    grid: Vec<f32>,
    d_out: Vec<f32>,
}

fn case_strategy() -> impl Strategy<Value = Case> {
    (
        1usize..3,
        1usize..9,
        1usize..9,
        1usize..4,
        1usize..4,
        1usize..4,
        1usize..5,
        prop::bool::ANY,
        prop::bool::ANY,
    )
        .prop_flat_map(|(n, h, w, gh, gw, s, d, cell_count, channels_first)| {
            let config = SliceConfig {
                coefficient_len: s,
                depth: Some(d),
                depth_mapping: if cell_count {
                    DepthMapping::CellCount
                } else {
                    DepthMapping::EndpointAligned
                },
                output_layout: if channels_first {
                    OutputLayout::ChannelsFirst
                } else {
                    OutputLayout::ChannelsLast
                },
                ..SliceConfig::default()
            };
            let geom = SliceGeometry::from_shapes(&[n, h, w], &[n, s * d, gh, gw], &config)
                .expect("strategy builds consistent shapes");
            let guide = prop::collection::vec(-0.25f32..1.25, geom.guide_len());
            let grid = prop::collection::vec(-2.0f32..2.0, geom.grid_len());
            let d_out = prop::collection::vec(-1.0f32..1.0, geom.output_len());
            (Just(geom), guide, grid, d_out)
        })
        .prop_map(|(geom, guide, grid, d_out)| Case { geom, guide, grid, d_out })
}

fn run_forward(kernel: &dyn SliceKernel, case: &Case, grid: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; case.geom.output_len()];
    kernel.forward(&case.geom, &case.guide, grid, &mut out).unwrap();
    out
}

fn run_backward(kernel: &dyn SliceKernel, case: &Case, d_out: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let mut dg = vec![0.0; case.geom.guide_len()];
    let mut dgrid = vec![0.0; case.geom.grid_len()];
    kernel
        .backward(&case.geom, &case.guide, &case.grid, d_out, Some(&mut dg), Some(&mut dgrid))
        .unwrap();
    (dg, dgrid)
}

proptest! {
    #[test]
    fn prop_parallel_matches_reference(case in case_strategy()) {
        let parallel = ParallelKernel::with_threads(3).unwrap();

        let out_ref = run_forward(&ReferenceKernel, &case, &case.grid);
        let out_par = run_forward(&parallel, &case, &case.grid);
        prop_assert_eq!(&out_ref, &out_par);

        let (dg_ref, dgrid_ref) = run_backward(&ReferenceKernel, &case, &case.d_out);
        let (dg_par, dgrid_par) = run_backward(&parallel, &case, &case.d_out);
        for (i, (a, b)) in dg_ref.iter().zip(&dg_par).enumerate() {
            prop_assert!((a - b).abs() < 1e-4, "dguide[{}]: {} vs {}", i, a, b);
        }
        for (i, (a, b)) in dgrid_ref.iter().zip(&dgrid_par).enumerate() {
            prop_assert!((a - b).abs() < 1e-4, "dgrid[{}]: {} vs {}", i, a, b);
        }
    }
}

proptest! {
    #[test]
    fn prop_forward_is_linear_in_grid(case in case_strategy(), alpha in -3.0f32..3.0) {
        let scaled: Vec<f32> = case.grid.iter().map(|v| v * alpha).collect();
        let base = run_forward(&ReferenceKernel, &case, &case.grid);
        let out = run_forward(&ReferenceKernel, &case, &scaled);
        for (i, (o, b)) in out.iter().zip(&base).enumerate() {
            prop_assert!((o - alpha * b).abs() < 1e-4, "out[{}] = {} != {} * {}", i, o, alpha, b);
        }
    }
}

proptest! {
    #[test]
    fn prop_grid_gradient_mass_equals_forward_weight(case in case_strategy()) {
        let ones_grid = vec![1.0; case.geom.grid_len()];
        let total_weight: f32 = run_forward(&ReferenceKernel, &case, &ones_grid).iter().sum();

        let ones_out = vec![1.0; case.geom.output_len()];
        let (_, dgrid) = run_backward(&ReferenceKernel, &case, &ones_out);
        let mass: f32 = dgrid.iter().sum();

        prop_assert!(
            (mass - total_weight).abs() < 1e-3 * total_weight.max(1.0),
            "scatter mass {} != forward weight {}", mass, total_weight
        );
    }
}

proptest! {
    #[test]
    fn prop_weights_never_exceed_one(case in case_strategy()) {
        let ones_grid = vec![1.0; case.geom.grid_len()];
        for (i, v) in run_forward(&ReferenceKernel, &case, &ones_grid).iter().enumerate() {
            prop_assert!((0.0..=1.0 + 1e-5).contains(v), "out[{}] = {}", i, v);
        }
    }
}
