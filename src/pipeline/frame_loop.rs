use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use super::{
    estimator::PoseEstimator,
    lifecycle::{LifecycleError, LoopControl, LoopState},
    source::FrameSource,
};
use crate::types::{Frame, Pose};

pub const DEFAULT_REFRESH: Duration = Duration::from_micros(16_667);
// Back-off when the source had nothing ready.
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Receives every processed frame, in order, before the frame goes back to
/// its source.
pub trait PoseSink: Send + 'static {
    fn deliver(&mut self, frame: &Frame, pose: Option<&Pose>);
}

#[derive(Clone, Copy, Debug)]
pub struct FrameLoopOptions {
    pub flip_horizontal: bool,
    pub refresh_interval: Duration,
    /// Enter `Running` as soon as the model and source are ready.
    pub autostart: bool,
}

impl Default for FrameLoopOptions {
    fn default() -> Self {
        Self {
            flip_horizontal: true,
            refresh_interval: DEFAULT_REFRESH,
            autostart: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cycle {
    Processed,
    NoPose,
    Failed,
    Idle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub poses: u64,
    pub failures: u64,
}

/// One pull, one inference, one delivery per cycle.
pub struct FrameLoop<S, E, K> {
    source: S,
    estimator: E,
    sink: K,
    flip_horizontal: bool,
    stats: LoopStats,
}

impl<S, E, K> FrameLoop<S, E, K>
where
    S: FrameSource,
    E: PoseEstimator,
    K: PoseSink,
{
    pub fn new(source: S, estimator: E, sink: K, flip_horizontal: bool) -> Self {
        Self {
            source,
            estimator,
            sink,
            flip_horizontal,
            stats: LoopStats::default(),
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn run_cycle(&mut self) -> Cycle {
        let Some(frame) = self.source.try_next() else {
            return Cycle::Idle;
        };
        self.stats.frames += 1;

        let cycle = match self.estimator.estimate(&frame, self.flip_horizontal) {
            Ok(Some(pose)) => {
                self.stats.poses += 1;
                self.sink.deliver(&frame, Some(&pose));
                Cycle::Processed
            }
            Ok(None) => {
                self.sink.deliver(&frame, None);
                Cycle::NoPose
            }
            Err(err) => {
                self.stats.failures += 1;
                log::warn!("pose estimation failed: {err:?}");
                Cycle::Failed
            }
        };

        self.source.release(frame);
        cycle
    }
}

/// Owns the frame loop thread. Dropping the handle shuts the loop down and
/// joins it.
pub struct FrameLoopHandle {
    control: Arc<LoopControl>,
    thread: Option<thread::JoinHandle<LoopStats>>,
}

impl FrameLoopHandle {
    pub fn start(&self) -> Result<(), LifecycleError> {
        self.control.start()
    }

    pub fn stop(&self) -> Result<(), LifecycleError> {
        self.control.stop()
    }

    pub fn state(&self) -> LoopState {
        self.control.state()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Shuts the loop down and waits for the in-flight cycle to finish.
    pub fn shutdown(mut self) -> Option<LoopStats> {
        self.finish()
    }

    fn finish(&mut self) -> Option<LoopStats> {
        self.control.shutdown();
        let handle = self.thread.take()?;
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                log::error!("frame loop thread panicked");
                None
            }
        }
    }
}

impl Drop for FrameLoopHandle {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Starts the frame loop thread. The estimator is built on that thread so a
/// slow model load never blocks the caller; a failed load leaves the loop in
/// `Initializing`, where `start` reports `NotReady`.
pub fn spawn_frame_loop<S, E, K, F>(
    control: Arc<LoopControl>,
    source: S,
    load_estimator: F,
    sink: K,
    options: FrameLoopOptions,
) -> FrameLoopHandle
where
    S: FrameSource,
    E: PoseEstimator,
    K: PoseSink,
    F: FnOnce() -> anyhow::Result<E> + Send + 'static,
{
    let loop_control = control.clone();
    let thread = thread::spawn(move || {
        let control = loop_control;
        let mut stats = LoopStats::default();
        if let Err(err) = control.begin_initialization() {
            log::error!("frame loop cannot initialize: {err}");
            return stats;
        }
        control.mark_source_attached();

        let estimator = match load_estimator() {
            Ok(estimator) => estimator,
            Err(err) => {
                log::error!("failed to load pose model: {err:?}");
                return stats;
            }
        };
        control.mark_model_loaded();
        log::info!("frame loop ready");

        if options.autostart {
            if let Err(err) = control.start() {
                log::warn!("frame loop autostart failed: {err}");
            }
        }

        let mut frame_loop = FrameLoop::new(source, estimator, sink, options.flip_horizontal);
        while control.wait_until_running() {
            let cycle_start = Instant::now();
            let wait = match frame_loop.run_cycle() {
                Cycle::Idle => IDLE_POLL,
                _ => options.refresh_interval,
            };
            control.wait_for_refresh(cycle_start + wait);
        }

        stats = frame_loop.stats();
        log::info!(
            "frame loop exited after {} frames ({} poses, {} failures)",
            stats.frames,
            stats.poses,
            stats.failures
        );
        stats
    });

    FrameLoopHandle {
        control,
        thread: Some(thread),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Keypoint, KeypointName};
    use anyhow::anyhow;
    use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    #[derive(Default)]
    struct Counters {
        pulled: AtomicUsize,
        released: AtomicUsize,
        started: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delivered: Mutex<Vec<u64>>,
    }

    /// Frames carry their sequence number in the first pixel bytes.
    struct SeqSource {
        next: u64,
        limit: Option<u64>,
        counters: Arc<Counters>,
    }

    impl FrameSource for SeqSource {
        fn try_next(&mut self) -> Option<Frame> {
            if self.limit.is_some_and(|limit| self.next >= limit) {
                return None;
            }
            let seq = self.next;
            self.next += 1;
            self.counters.pulled.fetch_add(1, Ordering::SeqCst);
            Some(Frame::new(seq.to_le_bytes().to_vec(), 1, 2))
        }

        fn release(&mut self, _frame: Frame) {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn seq_of(frame: &Frame) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&frame.rgba[..8]);
        u64::from_le_bytes(bytes)
    }

    fn pose() -> Pose {
        Pose::from_keypoints(vec![Keypoint::new(KeypointName::Nose, 1.0, 1.0, 0.9)])
    }

    /// Fails every third frame and finds nobody in every fifth.
    struct ScriptedEstimator {
        counters: Arc<Counters>,
        gate: Option<Receiver<()>>,
        entered: Option<Sender<()>>,
    }

    impl ScriptedEstimator {
        fn new(counters: Arc<Counters>) -> Self {
            Self {
                counters,
                gate: None,
                entered: None,
            }
        }
    }

    impl PoseEstimator for ScriptedEstimator {
        fn estimate(&mut self, frame: &Frame, _flip: bool) -> anyhow::Result<Option<Pose>> {
            let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.counters.started.fetch_add(1, Ordering::SeqCst);
            if let Some(entered) = &self.entered {
                let _ = entered.send(());
            }
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

            let seq = seq_of(frame);
            if seq % 3 == 2 {
                Err(anyhow!("scripted failure"))
            } else if seq % 5 == 4 {
                Ok(None)
            } else {
                Ok(Some(pose()))
            }
        }
    }

    struct RecordingSink(Arc<Counters>);

    impl PoseSink for RecordingSink {
        fn deliver(&mut self, frame: &Frame, _pose: Option<&Pose>) {
            self.0
                .delivered
                .lock()
                .unwrap()
                .push(seq_of(frame));
        }
    }

    fn fast_options() -> FrameLoopOptions {
        FrameLoopOptions {
            flip_horizontal: false,
            refresh_interval: Duration::from_millis(1),
            autostart: true,
        }
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn every_pulled_frame_is_released_once() {
        let counters = Arc::new(Counters::default());
        let source = SeqSource {
            next: 0,
            limit: Some(30),
            counters: counters.clone(),
        };
        let mut frame_loop = FrameLoop::new(
            source,
            ScriptedEstimator::new(counters.clone()),
            RecordingSink(counters.clone()),
            false,
        );

        let mut cycles = Vec::new();
        loop {
            let cycle = frame_loop.run_cycle();
            if cycle == Cycle::Idle {
                break;
            }
            cycles.push(cycle);
        }

        assert_eq!(counters.pulled.load(Ordering::SeqCst), 30);
        assert_eq!(counters.released.load(Ordering::SeqCst), 30);
        assert_eq!(cycles[2], Cycle::Failed);
        assert_eq!(cycles[4], Cycle::NoPose);
        assert_eq!(cycles[0], Cycle::Processed);
        let stats = frame_loop.stats();
        assert_eq!(stats.frames, 30);
        assert_eq!(stats.failures, 10);
        // failed frames are not delivered
        assert_eq!(counters.delivered.lock().unwrap().len(), 20);
    }

    #[test]
    fn threaded_loop_processes_frames_in_order() {
        let counters = Arc::new(Counters::default());
        let control = Arc::new(LoopControl::new());
        let source = SeqSource {
            next: 0,
            limit: None,
            counters: counters.clone(),
        };
        let estimator_counters = counters.clone();
        let handle = spawn_frame_loop(
            control,
            source,
            move || Ok(ScriptedEstimator::new(estimator_counters)),
            RecordingSink(counters.clone()),
            fast_options(),
        );

        wait_for(|| counters.delivered.lock().unwrap().len() >= 20);
        handle.shutdown();

        let delivered = counters.delivered.lock().unwrap().clone();
        assert!(delivered.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            counters.pulled.load(Ordering::SeqCst),
            counters.released.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn stop_lets_inflight_inference_finish_and_starts_no_more() {
        let counters = Arc::new(Counters::default());
        let control = Arc::new(LoopControl::new());
        let (gate_tx, gate_rx) = unbounded();
        let (entered_tx, entered_rx) = bounded(16);
        let source = SeqSource {
            next: 0,
            limit: None,
            counters: counters.clone(),
        };
        let estimator_counters = counters.clone();
        let handle = spawn_frame_loop(
            control,
            source,
            move || {
                let mut estimator = ScriptedEstimator::new(estimator_counters);
                estimator.gate = Some(gate_rx);
                estimator.entered = Some(entered_tx);
                Ok(estimator)
            },
            RecordingSink(counters.clone()),
            fast_options(),
        );

        entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        handle.stop().unwrap();
        assert_eq!(handle.state(), LoopState::Stopped);
        gate_tx.send(()).unwrap();

        // the in-flight frame still completes and is delivered
        wait_for(|| counters.released.load(Ordering::SeqCst) == 1);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counters.started.load(Ordering::SeqCst), 1);
        assert_eq!(*counters.delivered.lock().unwrap(), vec![0]);

        // only an explicit start resumes the loop
        gate_tx.send(()).unwrap();
        handle.start().unwrap();
        entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        wait_for(|| counters.released.load(Ordering::SeqCst) == 2);
        handle.stop().unwrap();
        drop(gate_tx);
        handle.shutdown();
        assert_eq!(
            counters.pulled.load(Ordering::SeqCst),
            counters.released.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn failed_model_load_blocks_start() {
        let counters = Arc::new(Counters::default());
        let control = Arc::new(LoopControl::new());
        let source = SeqSource {
            next: 0,
            limit: None,
            counters: counters.clone(),
        };
        let handle = spawn_frame_loop(
            control.clone(),
            source,
            || -> anyhow::Result<ScriptedEstimator> { Err(anyhow!("missing model")) },
            RecordingSink(counters.clone()),
            fast_options(),
        );

        handle.shutdown();
        assert_eq!(control.state(), LoopState::Initializing);
        assert!(matches!(
            control.start(),
            Err(LifecycleError::NotReady {
                model_loaded: false,
                source_attached: true
            })
        ));
        assert_eq!(counters.pulled.load(Ordering::SeqCst), 0);
    }
}
