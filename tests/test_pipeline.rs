//! Integration tests for the detector and the multi-frame executor.
//!
//! Tests cover:
//! - End-to-end detection with a scripted engine
//! - Warm-up, typed errors and top-k
//! - Ordered emission, per-frame errors, cancellation and the in-flight bound

mod common;
use common::*;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::DynamicImage;
use nasdet::{FrameDetections, PixelRect};

fn scripted_engine() -> MockEngine {
    MockEngine::new(raw_outputs(
        &[
            [100.0, 100.0, 200.0, 200.0],
            [102.0, 101.0, 201.0, 199.0],
            [300.0, 300.0, 320.0, 330.0],
        ],
        &[&[0.9, 0.1], &[0.8, 0.05], &[0.1, 0.2]],
    ))
}

#[test]
fn test_detect_end_to_end() -> anyhow::Result<()> {
    let mut detector = Detector::new(PipelineConfig::default(), scripted_engine())?;
    let result = detector.detect(&gradient_image(300, 200))?;

    assert_eq!((result.source_width, result.source_height), (300, 200));
    assert_eq!(result.detections.len(), 1);

    let det = &result.detections[0];
    assert_eq!(det.class_id, 0);
    assert!(approx_eq(det.score, 0.9, 1e-6));
    assert_eq!(
        det.rect,
        PixelRect {
            x: 46,
            y: -3,
            width: 47,
            height: 47
        }
    );

    let engine = detector.engine();
    assert_eq!(engine.calls, 1);
    assert_eq!(engine.input_shapes[0], vec![1, 3, 640, 640]);
    Ok(())
}

#[test]
fn test_warm_up_feeds_zero_tensors() -> anyhow::Result<()> {
    let mut detector = Detector::new(PipelineConfig::new(vec![Step::det_rescale()], 64, 32), scripted_engine())?;
    detector.warm_up(3)?;

    let engine = detector.engine();
    assert_eq!(engine.calls, 3);
    assert!(engine.input_shapes.iter().all(|s| s == &vec![1, 3, 32, 64]));
    assert!(engine.input_sums.iter().all(|s| *s == 0.0));
    Ok(())
}

#[test]
fn test_warm_up_then_detect() -> anyhow::Result<()> {
    let mut detector = Detector::new(PipelineConfig::default(), scripted_engine())?;
    detector.warm_up(3)?;
    let result = detector.detect(&gradient_image(300, 200))?;

    assert_eq!(result.detections.len(), 1);
    let engine = detector.engine();
    assert_eq!(engine.calls, 4);
    assert!(engine.input_sums[..3].iter().all(|s| *s == 0.0));
    assert!(engine.input_sums[3] > 0.0);
    Ok(())
}

#[test]
fn test_invalid_config_never_reaches_engine() {
    let config = PipelineConfig::default().with_thresholds(2.0, 0.45);
    assert!(matches!(
        Detector::new(config, scripted_engine()),
        Err(ConfigError::ThresholdOutOfRange { .. })
    ));
}

#[test]
fn test_errors_are_typed() -> anyhow::Result<()> {
    let mut detector = Detector::new(PipelineConfig::default(), MockEngine::failing())?;
    let err = detector.detect(&gradient_image(32, 32)).unwrap_err();
    assert!(matches!(err, Error::Inference(_)));

    let err = detector.detect(&DynamicImage::new_rgb8(0, 0)).unwrap_err();
    assert!(matches!(err, Error::Shape(ShapeError::EmptyImage { .. })));
    // Preprocessing failed, so the engine was not called again.
    assert_eq!(detector.engine().calls, 1);

    let engine = MockEngine::new(raw_outputs(&[[0.0, 0.0, 1.0, 1.0]], &[&[0.5], &[0.5]]));
    let mut detector = Detector::new(PipelineConfig::default(), engine)?;
    let err = detector.detect(&gradient_image(32, 32)).unwrap_err();
    assert!(matches!(err, Error::Shape(ShapeError::RowMismatch { scores: 2, boxes: 1 })));
    Ok(())
}

#[test]
fn test_no_candidates_gives_empty_result() -> anyhow::Result<()> {
    let pipeline = Pipeline::new(PipelineConfig::default())?;
    let mut engine = MockEngine::new(raw_outputs(&[], &[]));
    let result = pipeline.run(&mut engine, &gradient_image(50, 50))?;
    assert!(result.detections.is_empty());
    Ok(())
}

#[test]
fn test_top_k_from_config() -> anyhow::Result<()> {
    let boxes: Vec<[f32; 4]> = (0..5)
        .map(|i| {
            let x = i as f32 * 100.0;
            [x, 0.0, x + 50.0, 50.0]
        })
        .collect();
    let rows: Vec<[f32; 1]> = (0..5).map(|i| [0.5 + i as f32 * 0.1]).collect();
    let scores: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();

    let config = PipelineConfig::new(vec![Step::det_rescale()], 640, 640).with_top_k(Some(2));
    let mut detector = Detector::new(config, MockEngine::new(raw_outputs(&boxes, &scores)))?;
    let result = detector.detect(&gradient_image(640, 640))?;

    assert_eq!(result.detections.len(), 2);
    assert_eq!(result.detections[0].rect.x, 400);
    assert_eq!(result.detections[1].rect.x, 300);
    Ok(())
}

#[test]
fn test_detections_serialize() -> anyhow::Result<()> {
    let mut detector = Detector::new(PipelineConfig::default(), scripted_engine())?;
    let result = detector.detect(&gradient_image(300, 200))?;

    let value = serde_json::to_value(&result)?;
    assert_eq!(value["source_width"], 300);
    assert_eq!(value["detections"][0]["rect"]["y"], -3);
    assert_eq!(value["detections"][0]["class_id"], 0);
    Ok(())
}

#[test]
fn test_executor_emits_in_frame_order() -> anyhow::Result<()> {
    let mut detector = Detector::new(PipelineConfig::default(), scripted_engine())?;
    let frames: Vec<DynamicImage> = (0..8).map(|i| gradient_image(100 + 37 * i, 80)).collect();

    let mut seen: Vec<(usize, FrameDetections)> = Vec::new();
    let summary = detector.detect_stream(&FrameExecutor::new(3), frames, |index, result| {
        match result {
            Ok(detections) => seen.push((index, detections)),
            Err(e) => panic!("frame {index} failed: {e}"),
        }
        ControlFlow::Continue(())
    });

    assert_eq!(summary.emitted, 8);
    assert_eq!(summary.failed, 0);
    assert!(!summary.cancelled);
    for (expected, (index, detections)) in seen.iter().enumerate() {
        assert_eq!(*index, expected);
        assert_eq!(detections.source_width, 100 + 37 * expected as u32);
        assert_eq!(detections.detections.len(), 1);
    }
    assert_eq!(detector.engine().calls, 8);
    Ok(())
}

#[test]
fn test_executor_reports_frame_errors_and_continues() -> anyhow::Result<()> {
    let mut detector = Detector::new(PipelineConfig::default(), scripted_engine())?;
    let mut frames: Vec<DynamicImage> = (0..5).map(|_| gradient_image(64, 48)).collect();
    frames[2] = DynamicImage::new_rgb8(0, 0);

    let mut outcomes = Vec::new();
    let summary = detector.detect_stream(&FrameExecutor::new(2), frames, |index, result| {
        outcomes.push((index, result.is_ok()));
        ControlFlow::Continue(())
    });

    assert_eq!(summary.emitted, 5);
    assert_eq!(summary.failed, 1);
    assert_eq!(outcomes, vec![(0, true), (1, true), (2, false), (3, true), (4, true)]);
    assert_eq!(detector.engine().calls, 4);
    Ok(())
}

#[test]
fn test_executor_stops_on_break() -> anyhow::Result<()> {
    let mut detector = Detector::new(PipelineConfig::default(), scripted_engine())?;
    let frames: Vec<DynamicImage> = (0..20).map(|_| gradient_image(64, 48)).collect();

    let mut indices = Vec::new();
    let summary = detector.detect_stream(&FrameExecutor::new(4), frames, |index, _| {
        indices.push(index);
        if index == 1 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    assert!(summary.cancelled);
    assert_eq!(summary.emitted, 2);
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(detector.engine().calls, 2);
    Ok(())
}

#[test]
fn test_executor_with_no_frames() -> anyhow::Result<()> {
    let pipeline = Pipeline::new(PipelineConfig::default())?;
    let mut engine = scripted_engine();
    let summary = FrameExecutor::new(0).execute(
        &pipeline,
        &mut engine,
        Vec::<DynamicImage>::new(),
        |_, _| ControlFlow::Continue(()),
    );

    assert_eq!(summary, nasdet::ExecutionSummary::default());
    assert_eq!(engine.calls, 0);
    Ok(())
}

#[test]
fn test_executor_bounds_frames_in_flight() -> anyhow::Result<()> {
    let mut detector = Detector::new(PipelineConfig::default(), scripted_engine())?;
    let executor = FrameExecutor::new(2);
    let window = executor.max_in_flight();
    assert_eq!(window, 2 * executor.workers());

    // A large first frame keeps the sink waiting while the small ones finish.
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pulled);
    let frames = (0..120).map(move |i| {
        counter.fetch_add(1, Ordering::SeqCst);
        if i == 0 {
            gradient_image(1800, 1800)
        } else {
            gradient_image(16, 12)
        }
    });

    let mut max_ahead = 0;
    let summary = detector.detect_stream(&executor, frames, |index, result| {
        assert!(result.is_ok());
        let ahead = pulled.load(Ordering::SeqCst) - index;
        max_ahead = max_ahead.max(ahead);
        ControlFlow::Continue(())
    });

    assert_eq!(summary.emitted, 120);
    assert!(max_ahead <= window, "{max_ahead} frames pulled ahead of the sink, window is {window}");
    Ok(())
}
