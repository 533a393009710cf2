use lanecl_common::rand::{get_seeded_rng, uniform_vec};
use lanecl_runtime::{
    ConfigurationError, DeviceProperties, GlobalTensor, LaneDevice, TieBreak,
};
use lanecl_sampling::{
    FpsOptions, PointSource, SamplingError, SeedDistance, furthest_point_sampling,
    furthest_point_sampling_with_dist, sample,
};
use pretty_assertions::assert_eq;

fn device(lanes: usize, budget: usize) -> LaneDevice {
    LaneDevice::new(DeviceProperties::new(lanes, budget, 32, 1 << 20)).unwrap()
}

fn colinear() -> GlobalTensor<f32> {
    GlobalTensor::from_slice(
        [1, 4, 3],
        &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 3.0, 0.0, 0.0],
    )
}

fn random_cloud(batch: usize, points: usize) -> GlobalTensor<f32> {
    let mut rng = get_seeded_rng();
    let values: Vec<f32> = uniform_vec(&mut rng, batch * points * 3, -2.0, 2.0)
        .into_iter()
        .map(|v| v as f32)
        .collect();
    GlobalTensor::from_slice([batch, points, 3], &values)
}

// Same formula as the kernels, so both sides round identically.
fn pairwise(points: &GlobalTensor<f32>) -> GlobalTensor<f32> {
    let dims = points.shape().dims().to_vec();
    let (batch, count) = (dims[0], dims[1]);
    let xyz = points.to_vec();
    let mut dist = vec![0.0f32; batch * count * count];

    for b in 0..batch {
        for i in 0..count {
            for j in 0..count {
                let p = &xyz[(b * count + i) * 3..(b * count + i) * 3 + 3];
                let q = &xyz[(b * count + j) * 3..(b * count + j) * 3 + 3];
                let (dx, dy, dz) = (q[0] - p[0], q[1] - p[1], q[2] - p[2]);
                dist[(b * count + i) * count + j] = dx * dx + dy * dy + dz * dz;
            }
        }
    }
    GlobalTensor::from_slice([batch, count, count], &dist)
}

#[test_log::test]
fn colinear_points_pick_the_lowest_tie() {
    let output = furthest_point_sampling(&device(2, 1024), &colinear(), 3, FpsOptions::default())
        .unwrap();

    assert_eq!(output.indices.to_vec(), vec![0, 3, 1]);
    assert_eq!(output.distances.to_vec(), vec![f32::INFINITY, 9.0, 1.0]);
}

#[test]
fn colinear_points_can_pick_the_highest_tie() {
    let options = FpsOptions::default().with_tie_break(TieBreak::HighestIndex);
    let output = furthest_point_sampling(&device(3, 1024), &colinear(), 3, options).unwrap();

    assert_eq!(output.indices.to_vec(), vec![0, 3, 2]);
}

#[test]
fn selected_distances_never_increase() {
    let cloud = random_cloud(2, 300);
    let output =
        furthest_point_sampling(&device(4, 1024), &cloud, 40, FpsOptions::default()).unwrap();

    let distances = output.distances.to_vec();
    for batch in distances.chunks(40) {
        assert_eq!(batch[0], f32::INFINITY);
        for pair in batch.windows(2) {
            assert!(pair[1] <= pair[0], "{} then {}", pair[0], pair[1]);
        }
    }

    let indices = output.indices.to_vec();
    for batch in indices.chunks(40) {
        let mut unique = batch.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 40);
    }
}

#[test]
fn precomputed_distances_select_the_same_points() {
    let cloud = random_cloud(2, 64);
    let device = device(3, 2048);

    let from_points = furthest_point_sampling(&device, &cloud, 16, FpsOptions::default()).unwrap();
    let from_matrix =
        furthest_point_sampling_with_dist(&device, &pairwise(&cloud), 16, FpsOptions::default())
            .unwrap();

    assert_eq!(from_matrix.indices.to_vec(), from_points.indices.to_vec());
    assert_eq!(from_matrix.distances.to_vec(), from_points.distances.to_vec());
}

#[test]
fn spilled_distances_select_the_same_points() {
    let cloud = random_cloud(1, 1000);

    // 500 running distances per lane can't stay next to the tiles in 256 bytes.
    let spilled =
        furthest_point_sampling(&device(2, 256), &cloud, 24, FpsOptions::default()).unwrap();
    let resident =
        furthest_point_sampling(&device(2, 1 << 16), &cloud, 24, FpsOptions::default()).unwrap();

    assert_eq!(spilled.indices.to_vec(), resident.indices.to_vec());
    assert_eq!(spilled.distances.to_vec(), resident.distances.to_vec());
}

#[test]
fn seeds_bound_the_nearest_distances() {
    let cloud = random_cloud(1, 10);
    let mut seeds = vec![0.0f32; 10];
    seeds[5] = 1e10;
    let seeds = GlobalTensor::from_slice([1, 10], &seeds);

    let output = sample(
        &device(2, 1024),
        PointSource::Coordinates,
        &cloud,
        2,
        Some(&seeds),
        FpsOptions::default(),
    )
    .unwrap();

    assert_eq!(output.indices.to_vec(), vec![0, 5]);
}

#[test]
fn infinite_seed_behaves_like_the_large_one() {
    let cloud = random_cloud(1, 50);
    let device = device(3, 1024);

    let large = furthest_point_sampling(&device, &cloud, 10, FpsOptions::default()).unwrap();
    let infinite = furthest_point_sampling(
        &device,
        &cloud,
        10,
        FpsOptions::default().with_seed(SeedDistance::Infinity),
    )
    .unwrap();

    assert_eq!(infinite.indices.to_vec(), large.indices.to_vec());
}

#[test]
fn more_samples_than_points_is_rejected() {
    let result = furthest_point_sampling(&device(2, 1024), &colinear(), 5, FpsOptions::default());

    assert!(matches!(
        result,
        Err(SamplingError::Configuration(
            ConfigurationError::InvalidAttribute { .. }
        ))
    ));
}

#[test]
fn points_need_three_coordinates() {
    let points = GlobalTensor::<f32>::zeros([1, 4, 2]);
    let result = furthest_point_sampling(&device(2, 1024), &points, 2, FpsOptions::default());

    assert!(matches!(
        result,
        Err(SamplingError::Shape { name: "points", .. })
    ));
}

#[test]
fn no_samples_launches_nothing() {
    let output =
        furthest_point_sampling(&device(2, 1024), &colinear(), 0, FpsOptions::default()).unwrap();

    assert!(output.indices.is_empty());
    assert!(output.distances.is_empty());
}

// The selection doesn't depend on how the candidates are split.
macro_rules! selection_is_partition_independent {
    ($($lanes:literal x $budget:literal),*) => {
        paste::paste! {
            $(
                #[test]
                fn [<selection_on_ $lanes _lanes_ $budget _bytes_matches_one_lane>]() {
                    let cloud = random_cloud(2, 257);
                    let reference = furthest_point_sampling(&device(1, 1 << 20), &cloud, 32, FpsOptions::default()).unwrap();
                    let output = furthest_point_sampling(&device($lanes, $budget), &cloud, 32, FpsOptions::default()).unwrap();

                    assert_eq!(output.indices.to_vec(), reference.indices.to_vec());
                    assert_eq!(output.distances.to_vec(), reference.distances.to_vec());
                }
            )*
        }
    };
}

selection_is_partition_independent!(2 x 4096, 5 x 512, 8 x 128, 16 x 64, 300 x 64);
