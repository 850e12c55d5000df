//! Tick bookkeeping for the frame driver.
//!
//! The repeating trigger is an explicit [`TickTimer`] object, and the parity
//! logic lives in [`StepCounter`], so a run can be single-stepped without a
//! real timer.

use std::time::Duration;

use crate::{binding, sim::GridParameters, sim::gpucompute::WORKGROUP_SIZE};

/// Upper bound on ticks waiting to be rendered. Past this, timer fires are
/// dropped instead of building an unbounded backlog.
pub const MAX_BACKLOG: u32 = 100;

/// Number of simulation steps performed so far. Its parity selects the
/// binding set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepCounter {
    steps: u64,
}

/// Everything one tick needs to record its two passes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickPlan {
    pub step: u64,
    /// Binding set for the compute pass
    pub compute_set: usize,
    /// Binding set for the render pass, i.e. the parity after this step
    pub render_set: usize,
    pub workgroups: (u32, u32),
    pub instances: u32,
}

impl TickPlan {
    /// Index of the cell buffer the compute pass reads
    pub fn read_buffer(&self) -> usize {
        binding::set_buffers(self.compute_set).0
    }

    /// Index of the cell buffer the compute pass writes and the render pass
    /// then reads
    pub fn write_buffer(&self) -> usize {
        binding::set_buffers(self.compute_set).1
    }
}

impl StepCounter {
    pub const fn new() -> Self {
        Self { steps: 0 }
    }

    /// A counter whose first step reads the buffer selected by `step`'s parity
    pub const fn starting_at(step: u64) -> Self {
        Self { steps: step }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn parity(&self) -> usize {
        (self.steps % 2) as usize
    }

    pub fn plan(&self, params: GridParameters) -> TickPlan {
        let compute_set = self.parity();
        TickPlan {
            step: self.steps,
            compute_set,
            render_set: (compute_set + 1) % 2,
            workgroups: params.workgroups(WORKGROUP_SIZE),
            instances: params.cell_count() as u32,
        }
    }

    pub fn advance(&mut self) {
        self.steps += 1;
    }
}

/// Timer fires that have not been turned into a frame yet.
///
/// Fires queue up instead of coalescing, so a slow frame delays later ticks
/// rather than skipping them.
#[derive(Debug, Default)]
pub struct TickBacklog {
    pending: u32,
    dropped: u64,
}

impl TickBacklog {
    /// Queue one tick. Returns `false` when the backlog is full and the tick
    /// was dropped.
    pub fn push(&mut self) -> bool {
        if self.pending >= MAX_BACKLOG {
            self.dropped += 1;
            if self.dropped == 1 || self.dropped % 1000 == 0 {
                log::warn!("frame backlog full, {} ticks dropped so far", self.dropped);
            }
            return false;
        }
        self.pending += 1;
        true
    }

    /// Take one queued tick, if any.
    pub fn take(&mut self) -> bool {
        if self.pending == 0 {
            return false;
        }
        self.pending -= 1;
        true
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.pending = 0;
    }
}

/// Measures the achieved tick rate over fixed windows.
#[derive(Debug)]
pub struct TickRate {
    window_ms: f64,
    window_start: Option<f64>,
    ticks: u32,
}

impl TickRate {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_secs_f64() * 1000.0,
            window_start: None,
            ticks: 0,
        }
    }

    /// Count one tick at `now_ms`. Returns ticks per second once a window has
    /// elapsed.
    pub fn record(&mut self, now_ms: f64) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now_ms);
        self.ticks += 1;
        let elapsed = now_ms - start;
        if elapsed < self.window_ms {
            return None;
        }
        let rate = self.ticks as f64 / (elapsed / 1000.0);
        self.window_start = Some(now_ms);
        self.ticks = 0;
        Some(rate)
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_timer::TickTimer;
#[cfg(target_arch = "wasm32")]
pub use web_timer::TickTimer;

#[cfg(not(target_arch = "wasm32"))]
mod native_timer {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::{Duration, Instant},
    };

    /// Fixed-interval trigger running on its own thread until stopped.
    pub struct TickTimer {
        stop: Arc<AtomicBool>,
        join_handle: Option<thread::JoinHandle<()>>,
    }

    impl TickTimer {
        /// Call `on_tick` every `interval`. The timer ends by itself once
        /// `on_tick` returns `false`.
        pub fn start<F>(interval: Duration, mut on_tick: F) -> Self
        where
            F: FnMut() -> bool + Send + 'static,
        {
            let stop = Arc::new(AtomicBool::new(false));
            let s = Arc::clone(&stop);
            let handle = thread::Builder::new()
                .name("gridlife-tick".into())
                .spawn(move || {
                    let mut next = Instant::now() + interval;
                    loop {
                        let now = Instant::now();
                        if now < next {
                            thread::park_timeout(next - now);
                        }
                        if s.load(Ordering::Relaxed) {
                            break;
                        }
                        if Instant::now() < next {
                            // spurious wakeup
                            continue;
                        }
                        if !on_tick() {
                            break;
                        }
                        next += interval;
                    }
                })
                .map_err(|e| log::error!("failed to spawn tick timer thread: {e}"))
                .ok();
            Self {
                stop,
                join_handle: handle,
            }
        }

        pub fn is_running(&self) -> bool {
            self.join_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
        }

        pub fn stop(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
            if let Some(handle) = self.join_handle.take() {
                handle.thread().unpark();
                if handle.join().is_err() {
                    log::error!("tick timer thread panicked");
                }
            }
        }
    }

    impl Drop for TickTimer {
        fn drop(&mut self) {
            self.stop();
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod web_timer {
    use std::time::Duration;

    use gloo_timers::callback::Interval;

    /// Fixed-interval trigger backed by the browser's `setInterval`.
    pub struct TickTimer {
        interval: Option<Interval>,
    }

    impl TickTimer {
        /// Call `on_tick` every `interval`. The return value is ignored; the
        /// browser timer can only be cancelled through [`TickTimer::stop`].
        pub fn start<F>(interval: Duration, mut on_tick: F) -> Self
        where
            F: FnMut() -> bool + 'static,
        {
            let millis = interval.as_millis().clamp(1, u32::MAX as u128) as u32;
            let interval = Interval::new(millis, move || {
                let _ = on_tick();
            });
            Self {
                interval: Some(interval),
            }
        }

        pub fn is_running(&self) -> bool {
            self.interval.is_some()
        }

        pub fn stop(&mut self) {
            if let Some(interval) = self.interval.take() {
                interval.cancel();
            }
        }
    }

    impl Drop for TickTimer {
        fn drop(&mut self) {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_set_follows_parity() {
        let params = GridParameters::square(32);
        let mut counter = StepCounter::new();
        for n in 0..10u64 {
            let plan = counter.plan(params);
            assert_eq!(plan.step, n);
            assert_eq!(plan.compute_set as u64, n % 2);
            assert_eq!(plan.render_set as u64, (n + 1) % 2);
            counter.advance();
        }
        assert_eq!(counter.steps(), 10);
    }

    #[test]
    fn each_tick_reads_what_the_previous_wrote() {
        let params = GridParameters::new(20, 12);
        let mut counter = StepCounter::new();
        let mut previous: Option<TickPlan> = None;
        for _ in 0..9 {
            let plan = counter.plan(params);
            assert_ne!(plan.read_buffer(), plan.write_buffer());
            // render reads the buffer compute just wrote
            assert_eq!(binding::set_buffers(plan.render_set).0, plan.write_buffer());
            if let Some(prev) = previous {
                assert_eq!(plan.read_buffer(), prev.write_buffer());
                assert_ne!(plan.write_buffer(), prev.write_buffer());
            }
            previous = Some(plan);
            counter.advance();
        }
    }

    #[test]
    fn first_step_reads_buffer_chosen_by_parity() {
        let params = GridParameters::square(8);
        assert_eq!(StepCounter::new().plan(params).read_buffer(), 0);
        assert_eq!(StepCounter::starting_at(1).plan(params).read_buffer(), 1);
    }

    #[test]
    fn plan_covers_grid() {
        let plan = StepCounter::new().plan(GridParameters::new(33, 16));
        assert_eq!(plan.workgroups, (5, 2));
        assert_eq!(plan.instances, 33 * 16);
    }

    #[test]
    fn backlog_queues_and_caps() {
        let mut backlog = TickBacklog::default();
        assert!(!backlog.take());
        assert!(backlog.push());
        assert!(backlog.push());
        assert_eq!(backlog.pending(), 2);
        assert!(backlog.take());
        assert!(backlog.take());
        assert!(!backlog.take());

        for _ in 0..MAX_BACKLOG {
            assert!(backlog.push());
        }
        assert!(!backlog.push());
        assert_eq!(backlog.pending(), MAX_BACKLOG);
        assert_eq!(backlog.dropped(), 1);
        backlog.clear();
        assert_eq!(backlog.pending(), 0);
    }

    #[test]
    fn tick_rate_reports_after_window() {
        let mut rate = TickRate::new(Duration::from_secs(1));
        assert_eq!(rate.record(0.0), None);
        for i in 1..5 {
            assert_eq!(rate.record(i as f64 * 200.0), None);
        }
        let measured = rate.record(1000.0).unwrap();
        assert!((measured - 6.0).abs() < 1e-9);
        assert_eq!(rate.record(1100.0), None);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn timer_fires_until_stopped() {
        use std::sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        };

        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let mut timer = TickTimer::start(Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
            true
        });
        std::thread::sleep(Duration::from_millis(100));
        timer.stop();
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 1);
        assert!(!timer.is_running());
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), fired);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn timer_ends_when_callback_declines() {
        let timer = TickTimer::start(Duration::from_millis(1), || false);
        std::thread::sleep(Duration::from_millis(50));
        assert!(!timer.is_running());
    }
}
