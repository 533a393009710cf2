use lanecl_common::rand::{get_seeded_rng, integer_valued_vec, uniform_vec};
use lanecl_reduce::{
    ScatterError, ScatterOptions, ScatterStrategy, scatter_max, scatter_max_default, scatter_mean,
    scatter_sum,
};
use lanecl_runtime::{
    ConfigurationError, DeviceProperties, GlobalTensor, LaneDevice, TensorShape, TieBreak,
};
use pretty_assertions::assert_eq;

fn device(lanes: usize, budget: usize) -> LaneDevice {
    LaneDevice::new(DeviceProperties::new(lanes, budget, 32, 1 << 20)).unwrap()
}

fn options(strategy: ScatterStrategy) -> ScatterOptions {
    ScatterOptions::default().with_strategy(strategy)
}

const BOTH: [ScatterStrategy; 2] = [ScatterStrategy::OwnedRows, ScatterStrategy::Streaming];

#[test_log::test]
fn groups_of_a_vector_are_summed() {
    let src = GlobalTensor::from_slice([6], &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let index = GlobalTensor::from_slice([6], &[0i32, 0, 1, 2, 2, 2]);

    for strategy in BOTH {
        let out = GlobalTensor::<f32>::zeros([3]);
        scatter_sum(&device(4, 1024), &src, &index, 0, &out, options(strategy)).unwrap();
        assert_eq!(out.to_vec(), vec![3.0, 3.0, 15.0], "{strategy:?}");
    }
}

#[test]
fn masked_indices_contribute_nothing() {
    let src = GlobalTensor::from_slice([4], &[1.0f32, 10.0, 100.0, 1000.0]);
    let index = GlobalTensor::from_slice([4], &[-1i64, 0, 2, 1]);

    for strategy in BOTH {
        let out = GlobalTensor::<f32>::zeros([2]);
        scatter_sum(&device(2, 1024), &src, &index, 0, &out, options(strategy)).unwrap();
        assert_eq!(out.to_vec(), vec![10.0, 1000.0]);
    }
}

#[test]
fn rows_are_scattered_along_an_inner_axis() {
    // Two heads of three positions, rows of two values.
    let src: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let src = GlobalTensor::from_slice([2, 3, 2], &src);
    let index = GlobalTensor::from_slice([2, 3, 1], &[1i32, 0, 1, 0, 0, 1]);

    for strategy in BOTH {
        let out = GlobalTensor::<f32>::zeros([2, 2, 2]);
        scatter_sum(&device(3, 1024), &src, &index, 1, &out, options(strategy)).unwrap();
        assert_eq!(
            out.to_vec(),
            vec![2.0, 3.0, 4.0, 6.0, 14.0, 16.0, 10.0, 11.0]
        );
    }
}

#[test]
fn empty_groups_keep_their_initial_mean() {
    let src = GlobalTensor::from_slice([3], &[2.0f32, 2.0, 2.0]);
    let index = GlobalTensor::from_slice([3], &[1i32, 1, 1]);

    for strategy in BOTH {
        let out = GlobalTensor::from_slice([3], &[7.0f32, 0.0, -3.0]);
        let counts = scatter_mean(&device(2, 1024), &src, &index, 0, &out, options(strategy)).unwrap();

        assert_eq!(out.to_vec(), vec![7.0, 2.0, -3.0]);
        assert_eq!(counts.to_vec(), vec![0.0, 3.0, 0.0]);
    }
}

// The mean is the rounded sum divided by the count. 0.75 sums exactly, so the mean does too.
#[test]
fn mean_of_exactly_summing_values_is_exact() {
    let value = 0.75f32;
    let src = GlobalTensor::filled([7, 3], value);
    let index = GlobalTensor::from_slice([7], &[0u32; 7]);

    for strategy in BOTH {
        let out = GlobalTensor::<f32>::zeros([1, 3]);
        scatter_mean(&device(3, 1024), &src, &index, 0, &out, options(strategy)).unwrap();
        assert_eq!(out.to_vec(), vec![value; 3]);
    }
}

#[test]
fn mean_keeps_the_rounding_of_the_sum() {
    let src = GlobalTensor::filled([10], 0.1f32);
    let index = GlobalTensor::from_slice([10], &[0i32; 10]);
    let sum = (0..10).fold(0.0f32, |acc, _| acc + 0.1);
    assert_ne!(sum / 10.0, 0.1);

    for strategy in BOTH {
        let out = GlobalTensor::<f32>::zeros([1]);
        scatter_mean(&device(3, 1024), &src, &index, 0, &out, options(strategy)).unwrap();
        assert_eq!(out.to_vec(), vec![sum / 10.0], "{strategy:?}");
    }
}

#[test]
fn max_ties_go_to_the_lowest_position_by_default() {
    let src = GlobalTensor::from_slice([5], &[3.0f32, 5.0, 5.0, 1.0, 5.0]);
    let index = GlobalTensor::from_slice([5], &[0i32, 0, 0, 1, 0]);

    for strategy in BOTH {
        let out = GlobalTensor::<f32>::zeros([3]);
        let args: GlobalTensor<i32> =
            scatter_max(&device(5, 1024), &src, &index, 0, &out, options(strategy)).unwrap();

        assert_eq!(out.to_vec(), vec![5.0, 1.0, 0.0]);
        assert_eq!(args.to_vec(), vec![1, 3, 5]);
    }
}

#[test]
fn max_ties_can_go_to_the_highest_position() {
    let src = GlobalTensor::from_slice([5], &[3.0f32, 5.0, 5.0, 1.0, 5.0]);
    let index = GlobalTensor::from_slice([5], &[0i32, 0, 0, 1, 0]);

    for strategy in BOTH {
        let out = GlobalTensor::<f32>::zeros([2]);
        let args: GlobalTensor<i32> = scatter_max(
            &device(2, 1024),
            &src,
            &index,
            0,
            &out,
            options(strategy).with_tie_break(TieBreak::HighestIndex),
        )
        .unwrap();

        assert_eq!(args.to_vec(), vec![4, 3]);
    }
}

#[test]
fn initial_value_wins_over_smaller_contributions() {
    let src = GlobalTensor::from_slice([2], &[1.0f32, 2.0]);
    let index = GlobalTensor::from_slice([2], &[0i32, 0]);

    for strategy in BOTH {
        let out = GlobalTensor::from_slice([1], &[2.0f32]);
        let args: GlobalTensor<i32> =
            scatter_max(&device(2, 1024), &src, &index, 0, &out, options(strategy)).unwrap();

        assert_eq!(out.to_vec(), vec![2.0]);
        assert_eq!(args.to_vec(), vec![2]);
    }
}

#[test]
fn default_max_zeroes_empty_groups() {
    let src = GlobalTensor::from_slice([3, 2], &[-1.0f32, -5.0, -3.0, -2.0, 4.0, 0.5]);
    let index = GlobalTensor::from_slice([3], &[0i32, 0, 2]);

    let (out, args) = scatter_max_default::<f32, i32>(
        &device(2, 1024),
        &src,
        &index,
        0,
        3,
        ScatterOptions::default(),
    )
    .unwrap();

    assert_eq!(out.to_vec(), vec![-1.0, -2.0, 0.0, 0.0, 4.0, 0.5]);
    assert_eq!(args.to_vec(), vec![0, 1, 3, 3, 2, 2]);
}

#[test]
fn rows_larger_than_scratch_are_cut_in_chunks() {
    let mut rng = get_seeded_rng();
    let values = integer_valued_vec(&mut rng, 4 * 500, -8, 8);
    let values: Vec<f32> = values.iter().map(|v| *v as f32).collect();
    let src = GlobalTensor::from_slice([4, 500], &values);
    let index = GlobalTensor::from_slice([4, 1], &[1i32, 0, 1, 1]);

    let out = GlobalTensor::<f32>::zeros([2, 500]);
    scatter_sum(&device(3, 512), &src, &index, 0, &out, ScatterOptions::default()).unwrap();

    let expected: Vec<f32> = (0..500)
        .map(|c| values[500 + c])
        .chain((0..500).map(|c| values[c] + values[1000 + c] + values[1500 + c]))
        .collect();
    assert_eq!(out.to_vec(), expected);
}

#[test]
fn chunked_rows_keep_their_counts_and_args() {
    let src: Vec<f32> = (0..3 * 200).map(|v| (v % 7) as f32).collect();
    let src = GlobalTensor::from_slice([3, 200], &src);
    let index = GlobalTensor::from_slice([3], &[1i32, 1, 0]);

    let out = GlobalTensor::<f32>::zeros([2, 200]);
    let counts = scatter_mean(&device(2, 256), &src, &index, 0, &out, ScatterOptions::default())
        .unwrap();
    assert_eq!(counts.to_vec(), vec![1.0, 2.0]);

    let out = GlobalTensor::<f32>::filled([2, 200], -1.0);
    let args: GlobalTensor<i32> =
        scatter_max(&device(2, 256), &src, &index, 0, &out, ScatterOptions::default()).unwrap();
    let expected: Vec<i32> = (0..200)
        .map(|_| 2)
        .chain((0..200).map(|c| match (c % 7) >= ((200 + c) % 7) {
            true => 0,
            false => 1,
        }))
        .collect();
    assert_eq!(args.to_vec(), expected);
}

#[test]
fn owned_rows_need_one_element_in_scratch() {
    let src = GlobalTensor::<f32>::zeros([2, 500]);
    let index = GlobalTensor::from_slice([2], &[0i32, 1]);
    let out = GlobalTensor::<f32>::zeros([2, 500]);

    // One block for the accumulator and one for the staged source value.
    let result = scatter_sum(
        &device(2, 48),
        &src,
        &index,
        0,
        &out,
        options(ScatterStrategy::OwnedRows),
    );

    assert_eq!(
        result,
        Err(ScatterError::OwnedRowsUnavailable {
            element_bytes: 64,
            budget: 48,
        })
    );
}

#[test]
fn output_must_match_the_source_outside_the_axis() {
    let src = GlobalTensor::<f32>::zeros([4, 3]);
    let index = GlobalTensor::from_slice([4], &[0i32; 4]);
    let out = GlobalTensor::<f32>::zeros([2, 4]);

    let result = scatter_sum(&device(2, 1024), &src, &index, 0, &out, ScatterOptions::default());

    assert_eq!(
        result,
        Err(ScatterError::Shape {
            name: "output",
            expected: TensorShape::new([2, 3]),
            actual: TensorShape::new([2, 4]),
        })
    );
}

#[test]
fn axis_outside_the_source_is_rejected() {
    let src = GlobalTensor::<f32>::zeros([4]);
    let index = GlobalTensor::from_slice([4], &[0i32; 4]);
    let out = GlobalTensor::<f32>::zeros([4]);

    let result = scatter_sum(&device(2, 1024), &src, &index, 1, &out, ScatterOptions::default());

    assert_eq!(
        result,
        Err(ScatterError::Configuration(
            ConfigurationError::AxisOutOfRange { axis: 1, rank: 1 }
        ))
    );
}

#[test]
fn empty_source_leaves_the_output_untouched() {
    let src = GlobalTensor::<f32>::zeros([0, 4]);
    let index = GlobalTensor::from_slice([0], &[] as &[i32]);
    let out = GlobalTensor::filled([2, 4], 1.5f32);

    for strategy in BOTH {
        scatter_sum(&device(2, 1024), &src, &index, 0, &out, options(strategy)).unwrap();
        assert_eq!(out.to_vec(), vec![1.5; 8]);
    }
}

// Sums of arbitrary floats depend on the order of the additions. Owned rows always add in position
// order, so any lane count or scratch budget gives the same bits.
macro_rules! owned_rows_are_bit_identical {
    ($($lanes:literal x $budget:literal),*) => {
        paste::paste! {
            $(
                #[test]
                fn [<owned_rows_sum_is_bit_identical_on_ $lanes _lanes_ $budget _bytes>]() {
                    let (src, index) = random_scatter();
                    let reference = GlobalTensor::<f32>::zeros([5, 3]);
                    scatter_sum(&device(1, 1 << 16), &src, &index, 0, &reference, options(ScatterStrategy::OwnedRows)).unwrap();

                    let out = GlobalTensor::<f32>::zeros([5, 3]);
                    scatter_sum(&device($lanes, $budget), &src, &index, 0, &out, options(ScatterStrategy::OwnedRows)).unwrap();

                    let bits = |tensor: &GlobalTensor<f32>| -> Vec<u32> {
                        tensor.to_vec().iter().map(|value| value.to_bits()).collect()
                    };
                    assert_eq!(bits(&out), bits(&reference));
                }
            )*
        }
    };
}

owned_rows_are_bit_identical!(2 x 1024, 3 x 128, 5 x 96, 8 x 4096, 16 x 64);

// Rows of 300 values need 1200 bytes, so a 512 byte lane only holds column chunks of a row.
macro_rules! chunked_rows_are_bit_identical {
    ($($lanes:literal),*) => {
        paste::paste! {
            $(
                #[test]
                fn [<chunked_rows_sum_is_bit_identical_on_ $lanes _lanes>]() {
                    let (src, index) = random_wide_scatter();
                    let reference = GlobalTensor::<f32>::zeros([3, 300]);
                    scatter_sum(&device(1, 1 << 20), &src, &index, 0, &reference, ScatterOptions::default()).unwrap();

                    let out = GlobalTensor::<f32>::zeros([3, 300]);
                    scatter_sum(&device($lanes, 512), &src, &index, 0, &out, ScatterOptions::default()).unwrap();

                    let bits = |tensor: &GlobalTensor<f32>| -> Vec<u32> {
                        tensor.to_vec().iter().map(|value| value.to_bits()).collect()
                    };
                    assert_eq!(bits(&out), bits(&reference));
                }
            )*
        }
    };
}

chunked_rows_are_bit_identical!(2, 4, 8, 16);

fn random_scatter() -> (GlobalTensor<f32>, GlobalTensor<i32>) {
    let mut rng = get_seeded_rng();
    let values: Vec<f32> = uniform_vec(&mut rng, 64 * 3, -1.0, 1.0)
        .into_iter()
        .map(|v| v as f32)
        .collect();
    let groups: Vec<i32> = integer_valued_vec(&mut rng, 64, 0, 5)
        .into_iter()
        .map(|v| v as i32)
        .collect();
    (
        GlobalTensor::from_slice([64, 3], &values),
        GlobalTensor::from_slice([64, 1], &groups),
    )
}

fn random_wide_scatter() -> (GlobalTensor<f32>, GlobalTensor<i32>) {
    let mut rng = get_seeded_rng();
    let values: Vec<f32> = uniform_vec(&mut rng, 256 * 300, -1.0, 1.0)
        .into_iter()
        .map(|v| v as f32)
        .collect();
    let groups: Vec<i32> = integer_valued_vec(&mut rng, 256, 0, 3)
        .into_iter()
        .map(|v| v as i32)
        .collect();
    (
        GlobalTensor::from_slice([256, 300], &values),
        GlobalTensor::from_slice([256], &groups),
    )
}
