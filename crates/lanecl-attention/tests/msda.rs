use lanecl_attention::{
    AttentionError, BoundaryMode, MsdaInputs, MsdaOptions, multi_scale_deformable_attn,
    multi_scale_deformable_attn_backward,
};
use lanecl_common::rand::{Rng, get_seeded_rng, uniform_vec};
use lanecl_runtime::{DeviceProperties, GlobalTensor, LaneDevice, TensorShape};
use pretty_assertions::assert_eq;

fn device(lanes: usize, budget: usize) -> LaneDevice {
    LaneDevice::new(DeviceProperties::new(lanes, budget, 32, 1 << 20)).unwrap()
}

/// Inputs of a deformable attention, kept on the host so they can be perturbed.
#[derive(Clone)]
struct Problem {
    batch: usize,
    heads: usize,
    channels: usize,
    queries: usize,
    points: usize,
    /// `(height, width)` of every level.
    levels: Vec<(usize, usize)>,
    value: Vec<f64>,
    locations: Vec<f64>,
    weights: Vec<f64>,
}

struct Tensors {
    value: GlobalTensor<f64>,
    spatial_shapes: GlobalTensor<i64>,
    level_start_index: GlobalTensor<i64>,
    locations: GlobalTensor<f64>,
    weights: GlobalTensor<f64>,
}

impl Tensors {
    fn inputs(&self) -> MsdaInputs<'_, f64, i64> {
        MsdaInputs {
            value: &self.value,
            spatial_shapes: &self.spatial_shapes,
            level_start_index: &self.level_start_index,
            sampling_locations: &self.locations,
            attention_weights: &self.weights,
        }
    }
}

impl Problem {
    fn random(
        heads: usize,
        channels: usize,
        queries: usize,
        points: usize,
        levels: Vec<(usize, usize)>,
        locations: (f64, f64),
    ) -> Self {
        let mut rng = get_seeded_rng();
        let batch = 2;
        let keys: usize = levels.iter().map(|(h, w)| h * w).sum();
        let samples = batch * queries * heads * levels.len() * points;

        Self {
            value: uniform_vec(&mut rng, batch * keys * heads * channels, -1.0, 1.0),
            locations: uniform_vec(&mut rng, samples * 2, locations.0, locations.1),
            weights: uniform_vec(&mut rng, samples, 0.0, 1.0),
            batch,
            heads,
            channels,
            queries,
            points,
            levels,
        }
    }

    fn keys(&self) -> usize {
        self.levels.iter().map(|(h, w)| h * w).sum()
    }

    fn tensors(&self) -> Tensors {
        let levels = self.levels.len();
        let shapes: Vec<i64> = self
            .levels
            .iter()
            .flat_map(|(h, w)| [*h as i64, *w as i64])
            .collect();
        let starts: Vec<i64> = self
            .levels
            .iter()
            .scan(0, |start, (h, w)| {
                let current = *start;
                *start += (h * w) as i64;
                Some(current)
            })
            .collect();
        let sample_dims = [self.batch, self.queries, self.heads, levels, self.points];

        Tensors {
            value: GlobalTensor::from_slice(
                [self.batch, self.keys(), self.heads, self.channels],
                &self.value,
            ),
            spatial_shapes: GlobalTensor::from_slice([levels, 2], &shapes),
            level_start_index: GlobalTensor::from_slice([levels], &starts),
            locations: GlobalTensor::from_slice(
                [sample_dims.as_slice(), &[2]].concat(),
                &self.locations,
            ),
            weights: GlobalTensor::from_slice(sample_dims, &self.weights),
        }
    }

    fn forward(&self, device: &LaneDevice, boundary: BoundaryMode) -> Vec<f64> {
        let tensors = self.tensors();
        multi_scale_deformable_attn(
            device,
            &tensors.inputs(),
            MsdaOptions::default().with_boundary(boundary),
        )
        .unwrap()
        .to_vec()
    }

    /// Straightforward forward pass with corners read as zero outside of their level.
    fn reference(&self) -> Vec<f64> {
        let (heads, channels, points) = (self.heads, self.channels, self.points);
        let levels = self.levels.len();
        let keys = self.keys();
        let mut output = vec![0.0; self.batch * self.queries * heads * channels];

        for b in 0..self.batch {
            for q in 0..self.queries {
                for h in 0..heads {
                    let mut start = 0;
                    for (l, (height, width)) in self.levels.iter().enumerate() {
                        for p in 0..points {
                            let sample = (((b * self.queries + q) * heads + h) * levels + l) * points + p;
                            let x = self.locations[sample * 2] * *width as f64 - 0.5;
                            let y = self.locations[sample * 2 + 1] * *height as f64 - 0.5;
                            let weight = self.weights[sample];
                            if !(x > -1.0 && y > -1.0 && x < *width as f64 && y < *height as f64) {
                                continue;
                            }

                            let (x0, y0) = (x.floor(), y.floor());
                            let (fx, fy) = (x - x0, y - y0);
                            for (dy, dx, w) in [
                                (0, 0, (1.0 - fy) * (1.0 - fx)),
                                (0, 1, (1.0 - fy) * fx),
                                (1, 0, fy * (1.0 - fx)),
                                (1, 1, fy * fx),
                            ] {
                                let (cy, cx) = (y0 as i64 + dy, x0 as i64 + dx);
                                if cy < 0 || cx < 0 || cy >= *height as i64 || cx >= *width as i64 {
                                    continue;
                                }
                                let key = start + cy as usize * width + cx as usize;
                                for c in 0..channels {
                                    let v = self.value[((b * keys + key) * heads + h) * channels + c];
                                    output[((b * self.queries + q) * heads + h) * channels + c] +=
                                        weight * w * v;
                                }
                            }
                        }
                        start += height * width;
                    }
                }
            }
        }
        output
    }
}

fn assert_close(actual: &[f64], expected: &[f64], tolerance: f64) {
    assert_eq!(actual.len(), expected.len());
    for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance * (1.0 + e.abs()),
            "element {index}: {a} != {e}"
        );
    }
}

#[test_log::test]
fn forward_matches_the_reference() {
    let problem = Problem::random(2, 3, 5, 3, vec![(4, 6), (2, 3), (1, 1)], (-0.2, 1.2));

    let output = problem.forward(&device(3, 4096), BoundaryMode::Zeros);

    assert_close(&output, &problem.reference(), 1e-12);
}

#[test]
fn weights_of_inner_samples_sum_to_one() {
    let mut problem = Problem::random(1, 2, 6, 1, vec![(5, 7)], (0.1, 0.9));
    problem.value.fill(1.0);
    problem.weights.fill(1.0);

    for boundary in [BoundaryMode::Zeros, BoundaryMode::Border, BoundaryMode::Reflection] {
        let output = problem.forward(&device(2, 4096), boundary);
        assert_close(&output, &vec![1.0; output.len()], 1e-12);
    }
}

#[test]
fn samples_outside_every_level_read_zero() {
    let mut problem = Problem::random(2, 4, 3, 2, vec![(3, 3), (2, 2)], (0.0, 1.0));
    for (index, location) in problem.locations.iter_mut().enumerate() {
        *location = if index % 2 == 0 { 1.8 } else { -0.9 };
    }

    let output = problem.forward(&device(2, 4096), BoundaryMode::Zeros);

    assert_eq!(output, vec![0.0; output.len()]);
}

#[test]
fn cell_centers_average_their_neighbours() {
    let problem = Problem {
        batch: 1,
        heads: 1,
        channels: 1,
        queries: 1,
        points: 1,
        levels: vec![(2, 2)],
        value: vec![1.0, 2.0, 3.0, 4.0],
        locations: vec![0.5, 0.5],
        weights: vec![1.0],
    };

    assert_eq!(problem.forward(&device(1, 1024), BoundaryMode::Zeros), vec![2.5]);
}

#[test]
fn output_does_not_depend_on_the_partition() {
    // Eight channels of f64 fill whole blocks, exercising the aligned copies.
    let problem = Problem::random(2, 8, 13, 2, vec![(6, 5), (3, 2)], (-0.1, 1.1));
    let reference = problem.forward(&device(1, 1 << 20), BoundaryMode::Border);

    for (lanes, budget) in [(2, 4096), (5, 1024), (13, 2048), (64, 4096)] {
        let output = problem.forward(&device(lanes, budget), BoundaryMode::Border);
        assert_eq!(output, reference, "{lanes} lanes, {budget} bytes");
    }
}

// Loss of `sum(output * grad)`, whose gradients are the backward pass of `grad`.
fn loss(problem: &Problem, grad: &[f64], boundary: BoundaryMode) -> f64 {
    problem
        .forward(&device(2, 8192), boundary)
        .iter()
        .zip(grad)
        .map(|(output, grad)| output * grad)
        .sum()
}

fn numerical_grad<S: Fn(&mut Problem) -> &mut Vec<f64>>(
    problem: &Problem,
    grad: &[f64],
    boundary: BoundaryMode,
    select: S,
) -> Vec<f64> {
    let step = 1e-6;
    let len = select(&mut problem.clone()).len();

    (0..len)
        .map(|index| {
            let mut plus = problem.clone();
            select(&mut plus)[index] += step;
            let mut minus = problem.clone();
            select(&mut minus)[index] -= step;
            (loss(&plus, grad, boundary) - loss(&minus, grad, boundary)) / (2.0 * step)
        })
        .collect()
}

fn check_gradients(boundary: BoundaryMode, locations: (f64, f64)) {
    let problem = Problem::random(2, 3, 3, 2, vec![(3, 4), (2, 2)], locations);
    let mut rng = get_seeded_rng();
    let grad_len = problem.batch * problem.queries * problem.heads * problem.channels;
    let grad: Vec<f64> = (0..grad_len).map(|_| rng.random_range(-1.0..1.0)).collect();

    let tensors = problem.tensors();
    let grads = multi_scale_deformable_attn_backward(
        &device(3, 8192),
        &tensors.inputs(),
        &GlobalTensor::from_slice(
            [problem.batch, problem.queries, problem.heads * problem.channels],
            &grad,
        ),
        MsdaOptions::default().with_boundary(boundary),
    )
    .unwrap();

    assert_close(
        &grads.grad_attention_weights.to_vec(),
        &numerical_grad(&problem, &grad, boundary, |p| &mut p.weights),
        1e-6,
    );
    assert_close(
        &grads.grad_value.to_vec(),
        &numerical_grad(&problem, &grad, boundary, |p| &mut p.value),
        1e-6,
    );
    assert_close(
        &grads.grad_sampling_locations.to_vec(),
        &numerical_grad(&problem, &grad, boundary, |p| &mut p.locations),
        1e-5,
    );
}

#[test]
fn gradients_match_finite_differences_with_zeros() {
    check_gradients(BoundaryMode::Zeros, (-0.2, 1.2));
}

#[test]
fn gradients_match_finite_differences_with_border() {
    check_gradients(BoundaryMode::Border, (-0.3, 1.3));
}

#[test]
fn gradients_match_finite_differences_with_reflection() {
    check_gradients(BoundaryMode::Reflection, (-0.6, 1.6));
}

#[test]
fn weights_must_match_the_locations() {
    let problem = Problem::random(2, 3, 4, 2, vec![(3, 3)], (0.0, 1.0));
    let mut tensors = problem.tensors();
    tensors.weights = GlobalTensor::zeros([2, 4, 2, 1, 3]);

    let result = multi_scale_deformable_attn(&device(2, 4096), &tensors.inputs(), MsdaOptions::default());

    assert_eq!(
        result.err(),
        Some(AttentionError::Shape {
            name: "attention_weights",
            expected: TensorShape::new([2, 4, 2, 1, 2]),
            actual: TensorShape::new([2, 4, 2, 1, 3]),
        })
    );
}

#[test]
fn levels_must_fit_in_the_keys() {
    let problem = Problem::random(1, 2, 2, 1, vec![(2, 2), (1, 3)], (0.0, 1.0));
    let mut tensors = problem.tensors();
    tensors.level_start_index = GlobalTensor::from_slice([2], &[0i64, 5]);

    let result = multi_scale_deformable_attn(&device(2, 4096), &tensors.inputs(), MsdaOptions::default());

    assert!(matches!(result, Err(AttentionError::Level { level: 1, .. })));
}

#[test]
fn level_extents_must_not_overflow() {
    let problem = Problem::random(1, 2, 1, 1, vec![(2, 2)], (0.0, 1.0));
    let mut tensors = problem.tensors();
    tensors.spatial_shapes = GlobalTensor::from_slice([1, 2], &[1i64 << 40, 1i64 << 40]);

    let result = multi_scale_deformable_attn(&device(2, 4096), &tensors.inputs(), MsdaOptions::default());

    assert!(matches!(result, Err(AttentionError::Level { level: 0, .. })));
}
