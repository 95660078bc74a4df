//! Frame producers: still images and a synthetic animated camera.

use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use renderer::{Frame, FrameSink, PixelLayout};
use settings::CameraPattern;

const BAR_COLORS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

const CHECKER_CELLS: u32 = 8;

pub fn load_image(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgba8();
    Ok(Frame::from_rgba_image(&image, Duration::ZERO))
}

/// Draws one frame of `pattern` at `time` seconds.
pub fn pattern_frame(
    pattern: CameraPattern,
    width: u32,
    height: u32,
    time: f32,
    timestamp: Duration,
) -> Frame {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let rgb = match pattern {
                CameraPattern::Bars => bars(x, width, time),
                CameraPattern::Checker => checker(x, y, width, height, time),
                CameraPattern::Gradient => gradient(x, y, width, height, time),
            };
            pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
    }
    Frame::new(width, height, PixelLayout::Rgba8, pixels, timestamp)
}

fn bars(x: u32, width: u32, time: f32) -> [u8; 3] {
    let offset = (time * 0.1).fract();
    let u = (x as f32 / width as f32 + offset).fract();
    let index = (u * BAR_COLORS.len() as f32) as usize;
    BAR_COLORS[index.min(BAR_COLORS.len() - 1)]
}

fn checker(x: u32, y: u32, width: u32, height: u32, time: f32) -> [u8; 3] {
    let cell = (width.max(height) / CHECKER_CELLS).max(1);
    let shift = (time * cell as f32) as u32;
    let on = ((x + shift) / cell + y / cell) % 2 == 0;
    if on {
        [240, 240, 240]
    } else {
        [24, 24, 24]
    }
}

fn gradient(x: u32, y: u32, width: u32, height: u32, time: f32) -> [u8; 3] {
    let u = x as f32 / width.max(1) as f32;
    let v = y as f32 / height.max(1) as f32;
    let pulse = 0.5 + 0.5 * (time * 1.5).sin();
    [
        (u * 255.0) as u8,
        (v * 255.0) as u8,
        (pulse * 255.0) as u8,
    ]
}

/// Background thread pushing pattern frames into a [`FrameSink`] at a fixed
/// rate until stopped.
pub struct SyntheticCamera {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SyntheticCamera {
    pub fn start(
        sink: FrameSink,
        pattern: CameraPattern,
        width: u32,
        height: u32,
        fps: f32,
    ) -> Result<Self> {
        let interval = Duration::from_secs_f32(1.0 / fps.max(1.0));
        let (stop, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("funhouse-camera".into())
            .spawn(move || {
                let started = Instant::now();
                let mut dropped = 0u64;
                loop {
                    let elapsed = started.elapsed();
                    let frame =
                        pattern_frame(pattern, width, height, elapsed.as_secs_f32(), elapsed);
                    if let Err(err) = sink.submit(Some(frame)) {
                        dropped += 1;
                        tracing::warn!(error = %err, dropped, "camera frame rejected");
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                tracing::debug!("synthetic camera stopped");
            })
            .context("failed to spawn camera thread")?;
        tracing::info!(?pattern, width, height, fps, "synthetic camera started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("camera thread panicked");
            }
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_frames_are_valid_rgba() {
        for pattern in [
            CameraPattern::Bars,
            CameraPattern::Checker,
            CameraPattern::Gradient,
        ] {
            let frame = pattern_frame(pattern, 16, 9, 0.5, Duration::from_millis(500));
            assert!(frame.validate().is_ok(), "{pattern:?}");
            assert_eq!(frame.pixels.len(), 16 * 9 * 4);
            assert!(frame.pixels.chunks(4).all(|px| px[3] == 255));
        }
    }

    #[test]
    fn bars_are_horizontally_asymmetric() {
        let frame = pattern_frame(CameraPattern::Bars, 8, 1, 0.0, Duration::ZERO);
        assert_eq!(&frame.pixels[0..3], &BAR_COLORS[0]);
        assert_eq!(&frame.pixels[28..31], &BAR_COLORS[7]);
    }

    #[test]
    fn checker_moves_over_time() {
        let a = pattern_frame(CameraPattern::Checker, 32, 32, 0.0, Duration::ZERO);
        let b = pattern_frame(CameraPattern::Checker, 32, 32, 1.0, Duration::from_secs(1));
        assert_ne!(a.pixels, b.pixels);
    }

    #[test]
    fn load_image_reads_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        let mut image = image::RgbaImage::new(3, 2);
        image.put_pixel(2, 1, image::Rgba([1, 2, 3, 255]));
        image.save(&path).unwrap();

        let frame = load_image(&path).unwrap();
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(frame.layout, PixelLayout::Rgba8);
        assert_eq!(&frame.pixels[20..24], &[1, 2, 3, 255]);
    }

    #[test]
    fn load_image_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_image(&dir.path().join("absent.png")).is_err());
    }
}
