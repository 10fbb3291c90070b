use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::{Condvar, Mutex, mpsc};

use image::DynamicImage;
use ndarray::Array4;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::detection::{Decoder, PostProcessor, PreProcessor, PreparedFrame, Suppressor};
use crate::engine::{InferenceEngine, RawOutputs};
use crate::error::{ConfigError, Result};
use crate::models::Detection;

/// Detections for one frame, in descending score order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameDetections {
    pub source_width: u32,
    pub source_height: u32,
    pub detections: Vec<Detection>,
}

/// The configured stages, without an engine. Shared read-only across frames.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    preprocessor: PreProcessor,
    decoder: Decoder,
    postprocessor: PostProcessor,
    suppressor: Suppressor,
}

impl Pipeline {
    /// Validate the configuration and build every stage. Nothing runs if this fails.
    pub fn new(config: PipelineConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let names: Vec<&str> = config.steps.iter().map(|s| s.name()).collect();
        log::info!(
            "pipeline configured: steps=[{}] target={}x{} score>={} iou>{} top_k={:?}",
            names.join(", "),
            config.target_width,
            config.target_height,
            config.score_thresh,
            config.iou_thresh,
            config.top_k
        );

        Ok(Self {
            preprocessor: PreProcessor::from_config(&config),
            decoder: Decoder::new(config.score_thresh),
            postprocessor: PostProcessor::new(config.steps.clone()),
            suppressor: Suppressor::new(config.score_thresh, config.iou_thresh).with_top_k(config.top_k),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Shape of the tensor handed to the engine.
    pub fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.config.target_height as usize, self.config.target_width as usize)
    }

    pub fn preprocess(&self, image: &DynamicImage) -> Result<PreparedFrame> {
        Ok(self.preprocessor.run(image)?)
    }

    /// Decode, recover and suppress the raw outputs for a prepared frame.
    pub fn finish(&self, prepared: &PreparedFrame, outputs: &RawOutputs) -> Result<FrameDetections> {
        let candidates = self.decoder.decode(outputs.scores.view(), outputs.boxes.view())?;
        let recovered = self.postprocessor.recover(candidates, &prepared.metadata)?;
        let selected = self.suppressor.select(&recovered);

        let detections = selected
            .into_iter()
            .map(|i| Detection::from(&recovered[i]))
            .collect();

        Ok(FrameDetections {
            source_width: prepared.source_width,
            source_height: prepared.source_height,
            detections,
        })
    }

    /// Run inference on a prepared frame and finish it.
    pub fn complete<E: InferenceEngine + ?Sized>(&self, engine: &mut E, prepared: &PreparedFrame) -> Result<FrameDetections> {
        let outputs = engine.infer(&prepared.tensor)?;
        self.finish(prepared, &outputs)
    }

    /// Process a single frame end to end.
    pub fn run<E: InferenceEngine + ?Sized>(&self, engine: &mut E, image: &DynamicImage) -> Result<FrameDetections> {
        let prepared = self.preprocess(image)?;
        self.complete(engine, &prepared)
    }
}

/// Pipeline plus the engine it feeds.
pub struct Detector<E: InferenceEngine> {
    pipeline: Pipeline,
    engine: E,
}

impl<E: InferenceEngine> Detector<E> {
    pub fn new(config: PipelineConfig, engine: E) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            pipeline: Pipeline::new(config)?,
            engine,
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Feed the engine `rounds` zero tensors of the input shape.
    pub fn warm_up(&mut self, rounds: usize) -> Result<()> {
        let dummy = Array4::<f32>::zeros(self.pipeline.input_shape());
        for _ in 0..rounds {
            self.engine.warm_up(&dummy)?;
        }
        log::debug!("{} warmed up with {} rounds", self.engine.name(), rounds);
        Ok(())
    }

    pub fn detect(&mut self, image: &DynamicImage) -> Result<FrameDetections> {
        self.pipeline.run(&mut self.engine, image)
    }

    /// Process a stream of frames, emitting results in frame order.
    pub fn detect_stream<I, F>(&mut self, executor: &FrameExecutor, frames: I, sink: F) -> ExecutionSummary
    where
        I: IntoIterator<Item = DynamicImage>,
        I::IntoIter: Send,
        F: FnMut(usize, Result<FrameDetections>) -> ControlFlow<()>,
    {
        executor.execute(&self.pipeline, &mut self.engine, frames, sink)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub emitted: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Preprocesses frames on worker threads while the calling thread runs inference
/// and post-processing. Results reach the sink strictly in frame order.
///
/// At most [`max_in_flight`](Self::max_in_flight) frames are pulled from the
/// source ahead of the last emitted one, so a slow frame stalls the workers
/// instead of letting prepared tensors pile up.
#[derive(Debug, Clone, Copy)]
pub struct FrameExecutor {
    workers: usize,
}

impl FrameExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Number of preprocessing threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Frames that may be pulled but not yet emitted at any moment.
    pub fn max_in_flight(&self) -> usize {
        self.workers * 2
    }

    /// Returning `ControlFlow::Break` from the sink stops the run: frames not yet
    /// started are skipped and any in-flight buffers are dropped.
    pub fn execute<E, I, F>(&self, pipeline: &Pipeline, engine: &mut E, frames: I, mut sink: F) -> ExecutionSummary
    where
        E: InferenceEngine + ?Sized,
        I: IntoIterator<Item = DynamicImage>,
        I::IntoIter: Send,
        F: FnMut(usize, Result<FrameDetections>) -> ControlFlow<()>,
    {
        let queue = FrameQueue::new(frames.into_iter(), self.max_in_flight());
        let mut summary = ExecutionSummary::default();

        std::thread::scope(|scope| {
            let (sender, receiver) = mpsc::sync_channel::<(usize, Result<PreparedFrame>)>(self.workers);

            for _ in 0..self.workers {
                let sender = sender.clone();
                let queue = &queue;
                scope.spawn(move || {
                    while let Some((index, image)) = queue.next() {
                        let prepared = pipeline.preprocess(&image);
                        drop(image);
                        if sender.send((index, prepared)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(sender);

            // Frames finish preprocessing out of order; hold them until their turn.
            let mut pending: BTreeMap<usize, Result<PreparedFrame>> = BTreeMap::new();
            let mut next_index = 0;

            'receive: for (index, prepared) in receiver.iter() {
                pending.insert(index, prepared);
                while let Some(prepared) = pending.remove(&next_index) {
                    let result = prepared.and_then(|p| pipeline.complete(engine, &p));
                    if let Err(e) = &result {
                        log::warn!("frame {} failed: {}", next_index, e);
                        summary.failed += 1;
                    }
                    summary.emitted += 1;
                    let flow = sink(next_index, result);
                    next_index += 1;
                    if flow.is_break() {
                        queue.stop();
                        summary.cancelled = true;
                        break 'receive;
                    }
                    queue.mark_emitted();
                }
            }

            drop(pending);
            drop(receiver);
        });

        log::debug!(
            "executor finished: emitted={} failed={} cancelled={}",
            summary.emitted,
            summary.failed,
            summary.cancelled
        );
        summary
    }
}

impl Default for FrameExecutor {
    fn default() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }
}

struct QueueState<I> {
    frames: I,
    pulled: usize,
    emitted: usize,
    stopped: bool,
}

/// Hands out frames in source order, never more than `window` ahead of the sink.
struct FrameQueue<I> {
    state: Mutex<QueueState<I>>,
    turn: Condvar,
    window: usize,
}

impl<I: Iterator<Item = DynamicImage>> FrameQueue<I> {
    fn new(frames: I, window: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames,
                pulled: 0,
                emitted: 0,
                stopped: false,
            }),
            turn: Condvar::new(),
            window: window.max(1),
        }
    }

    /// Blocks while the window is full. `None` once the source is exhausted or stopped.
    fn next(&self) -> Option<(usize, DynamicImage)> {
        let mut state = self.state.lock().ok()?;
        while !state.stopped && state.pulled >= state.emitted + self.window {
            state = self.turn.wait(state).ok()?;
        }
        if state.stopped {
            return None;
        }
        let image = state.frames.next()?;
        let index = state.pulled;
        state.pulled += 1;
        Some((index, image))
    }

    fn mark_emitted(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.emitted += 1;
        }
        self.turn.notify_all();
    }

    fn stop(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.stopped = true;
        }
        self.turn.notify_all();
    }
}
