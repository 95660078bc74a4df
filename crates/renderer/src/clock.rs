use std::time::Instant;

/// Time handed to `uTime` for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    pub seconds: f32,
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where animation time comes from.
pub trait TimeSource: Send {
    fn sample(&mut self) -> TimeSample;
}

/// Monotonic clock starting at construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    frame: u64,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.origin.elapsed().as_secs_f32(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Always reports the same time; the frame counter still advances.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f32,
    frame: u64,
}

impl FixedTimeSource {
    pub fn new(time: f32) -> Self {
        Self { time, frame: 0 }
    }
}

impl TimeSource for FixedTimeSource {
    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.time, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

pub fn time_source(fixed_time: Option<f32>) -> BoxedTimeSource {
    match fixed_time {
        Some(time) => Box::new(FixedTimeSource::new(time)),
        None => Box::new(SystemTimeSource::new()),
    }
}
