use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::time::Duration;

use lot_monitor::detect::{AdaptiveThresholdClassifier, Region, RegionClassifier};
use lot_monitor::{
    Frame, LoopSettings, ManualClock, MemorySource, SourceEntry, SourceLoop, SourceStatus,
};

const BACKGROUND: u8 = 128;

fn regions() -> Vec<Region> {
    vec![
        Region::new(10, 10, 40, 40),
        Region::new(80, 10, 40, 40),
        Region::new(150, 10, 40, 40),
    ]
}

/// Flat background with a high-contrast 4x4 checker ("car") in `region`.
fn frame_with_car(region: Region) -> Frame {
    let mut image = RgbImage::from_pixel(200, 60, Rgb([BACKGROUND; 3]));
    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            let v = if ((x / 4) + (y / 4)) % 2 == 0 { 0 } else { 255 };
            image.put_pixel(x, y, Rgb([v, v, v]));
        }
    }
    Frame::new(image)
}

fn occupied_flags(classifier: &dyn RegionClassifier, frame: &Frame) -> Vec<bool> {
    classifier
        .classify(frame, &regions(), 0.2)
        .unwrap()
        .iter()
        .map(|r| r.occupied)
        .collect()
}

#[test]
fn two_frame_loop_alternates_occupied_regions() {
    let regions = regions();
    let frames = vec![frame_with_car(regions[0]), frame_with_car(regions[1])];
    let classifier = Arc::new(AdaptiveThresholdClassifier::default());

    assert_eq!(occupied_flags(classifier.as_ref(), &frames[0]), vec![true, false, false]);
    assert_eq!(occupied_flags(classifier.as_ref(), &frames[1]), vec![false, true, false]);

    let entry = Arc::new(SourceEntry::new("1", regions.len()));
    let source = MemorySource::new("two-frames", frames, Some(10.0)).unwrap();
    let clock = Arc::new(ManualClock::new());
    let mut source_loop = SourceLoop::new(
        entry.clone(),
        Box::new(source),
        regions,
        classifier,
        LoopSettings::default(),
    )
    .unwrap()
    .with_clock(clock.clone());

    let interval = source_loop.frame_interval();
    assert!(interval > Duration::from_millis(99) && interval <= Duration::from_millis(100));

    let report = source_loop.run_for(5).unwrap();
    assert_eq!(report.processed, 5);
    assert_eq!(report.failures, 0);
    assert_eq!(entry.status(), SourceStatus::Running);

    let snapshot = entry.lot().snapshot();
    assert_eq!(snapshot.total, 3);
    assert_eq!(snapshot.available + snapshot.occupied, snapshot.total);
    assert_eq!(snapshot.history.len(), 5);
    for record in &snapshot.history {
        assert_eq!(record.occupied, 1);
        assert_eq!(record.available, 2);
    }

    // Processing is instantaneous on the manual clock: every pause is a full
    // frame interval at the media's 10 fps.
    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len(), 5);
    assert!(sleeps.iter().all(|pause| *pause == interval));

    let jpeg = entry.frames().read().expect("published frame");
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 60));
}

#[test]
fn history_tracks_counts_as_cars_come_and_go() {
    let regions = regions();
    let frames = vec![
        frame_with_car(regions[0]),
        Frame::new(RgbImage::from_pixel(200, 60, Rgb([BACKGROUND; 3]))),
    ];
    let entry = Arc::new(SourceEntry::new("2", regions.len()));
    let mut source_loop = SourceLoop::new(
        entry.clone(),
        Box::new(MemorySource::new("blink", frames, None).unwrap()),
        regions,
        Arc::new(AdaptiveThresholdClassifier::default()),
        LoopSettings::default(),
    )
    .unwrap()
    .with_clock(Arc::new(ManualClock::new()));

    let first = source_loop.step().unwrap();
    let second = source_loop.step().unwrap();
    let third = source_loop.step().unwrap();
    assert_eq!((first.occupied, first.available), (1, 2));
    assert_eq!((second.occupied, second.available), (0, 3));
    assert_eq!((third.occupied, third.available), (1, 2));

    let history = entry.lot().snapshot().history;
    let occupied: Vec<usize> = history.iter().map(|h| h.occupied).collect();
    assert_eq!(occupied, vec![1, 0, 1]);
}
