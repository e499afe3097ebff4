use ax3_flux::conditioning::EuclideanNormMinusOne;
use ax3_flux::features::{ActivityClasses, SpectralEntropy, TimeDomainSummaryStatistics, TotalEnergy};
use ax3_flux::postprocess::{merge_short_interruptions, FeatureConcat, NonWearInterval};
use ax3_flux::{Diagnostics, EpochSegmenter, FeatureSeries, Node, NodeExt, Parallel, Sequential, Signal};
use ndarray::Array2;
use proptest::prelude::*;

fn channels(count: usize, len: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(-4.0f64..4.0, len), count)
}

fn epoch_matrix(rows: usize, cols: usize, seed: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| seed[(r * cols + c) % seed.len()])
}

fn extractor(kind: u8) -> Box<dyn Node> {
    match kind % 4 {
        0 => TimeDomainSummaryStatistics::new().boxed(),
        1 => ActivityClasses::default().boxed(),
        2 => TotalEnergy.boxed(),
        _ => SpectralEntropy.boxed(),
    }
}

proptest! {
    #[test]
    fn segmented_channels_share_row_count(
        (epochs, width, data) in (1usize..12, 2usize..12, 1usize..4)
            .prop_flat_map(|(e, w, n)| (Just(e), Just(w), channels(n, e * w)))
    ) {
        let start = 1_600_000_000_000i64;
        let timestamps: Vec<i64> = (0..(epochs * width) as i64).map(|i| start + i * 10).collect();
        let segmenter = EpochSegmenter::with_timestamps(&timestamps, width, &Diagnostics::new()).unwrap();

        let inputs: Vec<Signal> = data.into_iter().map(Signal::channel).collect();
        let out = segmenter.process(&inputs, &Diagnostics::new()).unwrap();

        prop_assert_eq!(out.len(), inputs.len());
        for signal in &out {
            prop_assert_eq!(signal.as_epochs().unwrap().dim(), (epochs, width));
        }
        prop_assert_eq!(segmenter.timestamps().unwrap().len(), epochs);
    }

    #[test]
    fn single_gap_marks_exactly_one_epoch(
        epochs in 2usize..12,
        width in 2usize..12,
        gap_epoch in 0usize..12,
        offset in 1usize..12,
        gap_ms in 1i64..5_000,
    ) {
        let gap_epoch = gap_epoch % epochs;
        let offset = 1 + (offset - 1) % (width - 1);
        let n = epochs * width;
        let gap_at = gap_epoch * width + offset;

        let timestamps: Vec<i64> = (0..n)
            .map(|i| i as i64 * 10 + if i >= gap_at { gap_ms } else { 0 })
            .collect();
        let diagnostics = Diagnostics::new();
        let segmenter = EpochSegmenter::with_timestamps(&timestamps, width, &diagnostics).unwrap();
        prop_assert_eq!(segmenter.bad_epochs(), &[gap_epoch][..]);

        let x = Signal::channel((0..n).map(|i| i as f64).collect::<Vec<_>>());
        let y = Signal::channel((0..n).map(|i| -(i as f64)).collect::<Vec<_>>());
        let out = segmenter.process(&[x, y], &diagnostics).unwrap();
        let (ex, ey) = (out[0].as_epochs().unwrap(), out[1].as_epochs().unwrap());
        prop_assert_eq!(ex.nrows(), epochs - 1);
        prop_assert_eq!(ey.nrows(), epochs - 1);
        for row in 0..ex.nrows() {
            prop_assert_eq!(ex[[row, 0]], -ey[[row, 0]]);
            prop_assert_ne!(ex[[row, 0]] as usize / width, gap_epoch);
        }
        prop_assert_eq!(diagnostics.warnings().len(), 1);
    }

    #[test]
    fn sequential_of_one_node_is_identity(
        kind in 0u8..4,
        rows in 1usize..8,
        cols in 2usize..16,
        seed in prop::collection::vec(-2.0f64..2.0, 1..32),
    ) {
        let inputs = vec![Signal::Epochs(epoch_matrix(rows, cols, &seed))];
        let diagnostics = Diagnostics::new();
        let direct = extractor(kind).process(&inputs, &diagnostics).unwrap();
        let chained = Sequential::new(vec![extractor(kind)]).unwrap().process(&inputs, &diagnostics).unwrap();
        prop_assert_eq!(direct, chained);
    }

    #[test]
    fn parallel_output_is_concatenation(
        kinds in prop::collection::vec(0u8..4, 1..6),
        inputs_count in 1usize..4,
        seed in prop::collection::vec(-2.0f64..2.0, 1..32),
    ) {
        let inputs: Vec<Signal> = (0..inputs_count)
            .map(|i| Signal::Epochs(epoch_matrix(3, 8, &seed).mapv(|v| v + i as f64)))
            .collect();
        let diagnostics = Diagnostics::new();

        let mut expected = Vec::new();
        for &kind in &kinds {
            expected.extend(extractor(kind).process(&inputs, &diagnostics).unwrap());
        }
        let parallel = Parallel::new(kinds.iter().map(|&k| extractor(k)).collect()).unwrap();
        let out = parallel.process(&inputs, &diagnostics).unwrap();

        prop_assert_eq!(Some(out.len()), parallel.output_arity(Some(inputs_count)));
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn concatenated_columns_round_trip(
        columns in prop::collection::vec(prop::collection::vec(-1e6f64..1e6, 6), 1..6)
    ) {
        let index: Vec<i64> = (0..6).map(|i| i * 5_000).collect();
        let inputs: Vec<Signal> = columns
            .iter()
            .enumerate()
            .map(|(i, values)| Signal::Series(FeatureSeries::new(format!("f{}", i), values.clone())))
            .collect();

        let out = FeatureConcat::new(index).process(&inputs, &Diagnostics::new()).unwrap();
        let table = out[0].as_table().unwrap();
        for (i, values) in columns.iter().enumerate() {
            prop_assert_eq!(&table.column(&format!("f{}", i)).unwrap().values, values);
        }
    }

    #[test]
    fn enmo_is_never_negative(data in channels(3, 64)) {
        let inputs: Vec<Signal> = data.into_iter().map(Signal::channel).collect();
        let out = EuclideanNormMinusOne.process(&inputs, &Diagnostics::new()).unwrap();
        prop_assert!(out[0].as_channel().unwrap().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn merged_intervals_are_separated_by_long_wear(
        spans in prop::collection::vec((1i64..50, 1i64..50), 0..20),
        min_gap in 0i64..30,
    ) {
        let mut intervals = Vec::new();
        let mut t = 0;
        for (gap, length) in spans {
            intervals.push(NonWearInterval::new(t + gap, t + gap + length));
            t += gap + length;
        }

        let merged = merge_short_interruptions(&intervals, min_gap).unwrap();
        for pair in merged.windows(2) {
            prop_assert!(pair[1].start_ms - pair[0].end_ms >= min_gap);
        }
        for interval in &intervals {
            prop_assert!(merged
                .iter()
                .any(|m| m.start_ms <= interval.start_ms && interval.end_ms <= m.end_ms));
        }
    }
}
