use lanecl::prelude::*;
use pretty_assertions::assert_eq;

fn device() -> LaneDevice {
    LaneDevice::new(DeviceProperties::new(4, 4096, 32, 1 << 16)).unwrap()
}

#[test]
fn sampled_points_become_cluster_centers() {
    let device = device();
    // Two tight clusters on the x axis.
    let coordinates = [0.0f32, 0.1, 0.2, 10.0, 10.1, 10.2];
    let points: Vec<f32> = coordinates.iter().flat_map(|x| [*x, 0.0, 0.0]).collect();
    let rows = GlobalTensor::from_slice([6, 3], &points);
    let points = GlobalTensor::from_slice([1, 6, 3], &points);

    let samples = furthest_point_sampling(&device, &points, 2, FpsOptions::default()).unwrap();
    let centers: Vec<f32> = samples
        .indices
        .to_vec()
        .iter()
        .map(|index| coordinates[*index as usize])
        .collect();
    assert_eq!(centers, vec![0.0, 10.2]);

    let nearest: Vec<i64> = coordinates
        .iter()
        .map(|x| if (x - centers[0]).abs() < (x - centers[1]).abs() { 0 } else { 1 })
        .collect();
    let means = GlobalTensor::<f32>::zeros([2, 3]);
    scatter_mean(
        &device,
        &rows,
        &GlobalTensor::from_slice([6], &nearest),
        0,
        &means,
        ScatterOptions::default(),
    )
    .unwrap();

    let means = means.to_vec();
    assert!((means[0] - 0.1).abs() < 1e-6);
    assert!((means[3] - 10.1).abs() < 1e-5);
}

#[test]
fn attention_reads_through_the_umbrella() {
    let value = GlobalTensor::from_slice([1, 4, 1, 1], &[1.0f32, 2.0, 3.0, 4.0]);
    let spatial_shapes = GlobalTensor::from_slice([1, 2], &[2i32, 2]);
    let level_start_index = GlobalTensor::from_slice([1], &[0i32]);
    let sampling_locations = GlobalTensor::from_slice([1, 1, 1, 1, 1, 2], &[0.5f32, 0.5]);
    let attention_weights = GlobalTensor::from_slice([1, 1, 1, 1, 1], &[2.0f32]);

    let output = multi_scale_deformable_attn(
        &device(),
        &MsdaInputs {
            value: &value,
            spatial_shapes: &spatial_shapes,
            level_start_index: &level_start_index,
            sampling_locations: &sampling_locations,
            attention_weights: &attention_weights,
        },
        MsdaOptions::default(),
    )
    .unwrap();

    assert_eq!(output.to_vec(), vec![5.0]);
}
