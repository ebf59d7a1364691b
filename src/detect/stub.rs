//! Stand-in detectors for the demo binary and tests.
//! Luminance thresholding is a placeholder for a real person-detection
//! model; the scripted audio detector replays a fixed score sequence at
//! a fixed cadence, the way a real classifier streams windows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use super::{AudioDetector, DetectError, DetectionEvent, Frame, LabelScore, SoundEvent, VisionDetector};

/// Placeholder vision detector: mean luminance over the frame decides
/// whether a "person" is reported. In production, replace with a real
/// object-detection model adapter.
pub struct LuminanceDetector {
    /// Mean luminance (0-255) above which a person is reported.
    threshold: f32,
    label: String,
}

impl LuminanceDetector {
    pub fn new(threshold: f32, label: impl Into<String>) -> Self {
        Self {
            threshold,
            label: label.into(),
        }
    }
}

impl VisionDetector for LuminanceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionEvent, DetectError> {
        if frame.pixels.is_empty() {
            return Err(DetectError::new("empty frame buffer"));
        }
        let start = Instant::now();
        // RGBA: average the RGB channels, skip alpha.
        let mut sum = 0u64;
        let mut count = 0u64;
        for px in frame.pixels.chunks_exact(4) {
            sum += px[0] as u64 + px[1] as u64 + px[2] as u64;
            count += 3;
        }
        if count == 0 {
            return Err(DetectError::new("frame smaller than one pixel"));
        }
        let mean = sum as f32 / count as f32;

        let labels = if mean >= self.threshold {
            // Confidence scales with distance above the threshold.
            let confidence = ((mean - self.threshold) / (255.0 - self.threshold))
                .clamp(0.0, 1.0)
                .max(0.51);
            vec![LabelScore {
                label: self.label.clone(),
                confidence,
            }]
        } else {
            Vec::new()
        };
        debug!(mean_luminance = mean, labels = labels.len(), "stub vision inference");

        Ok(DetectionEvent {
            labels,
            frame_width: frame.width,
            frame_height: frame.height,
            inference_time_ms: start.elapsed().as_millis() as u64,
            at: Instant::now(),
        })
    }
}

/// Scripted audio detector: emits a fixed score sequence at a fixed
/// cadence on its own thread, then stops emitting.
pub struct ScriptedAudioDetector {
    scores: Vec<f32>,
    cadence: Duration,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ScriptedAudioDetector {
    pub fn new(scores: Vec<f32>, cadence: Duration) -> Self {
        Self {
            scores,
            cadence,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl AudioDetector for ScriptedAudioDetector {
    fn start(&mut self) -> Result<Receiver<SoundEvent>, DetectError> {
        let (tx, rx) = crossbeam_channel::bounded(64);
        let scores = self.scores.clone();
        let cadence = self.cadence;
        self.stop_flag.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop_flag);

        let worker = std::thread::Builder::new()
            .name("stub-audio".into())
            .spawn(move || {
                for score in scores {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    if tx
                        .send(SoundEvent {
                            score,
                            at: Instant::now(),
                        })
                        .is_err()
                    {
                        // Receiver gone: session ended.
                        break;
                    }
                    std::thread::sleep(cadence);
                }
                info!("stub audio detector stopped");
            })
            .map_err(|e| DetectError::new(format!("failed to spawn audio thread: {e}")))?;

        self.worker = Some(worker);
        Ok(rx)
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ScriptedAudioDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(value: u8) -> Frame {
        Frame {
            pixels: vec![value; 4 * 16],
            width: 4,
            height: 4,
            rotation_degrees: 0,
        }
    }

    #[test]
    fn bright_frame_reports_person() {
        let mut det = LuminanceDetector::new(100.0, "person");
        let event = det.detect(&solid_frame(200)).unwrap();
        assert!(event.has_label("person", 0.5));
    }

    #[test]
    fn dark_frame_reports_nothing() {
        let mut det = LuminanceDetector::new(100.0, "person");
        let event = det.detect(&solid_frame(10)).unwrap();
        assert!(event.labels.is_empty());
    }

    #[test]
    fn empty_frame_is_a_detector_error() {
        let mut det = LuminanceDetector::new(100.0, "person");
        let frame = Frame {
            pixels: Vec::new(),
            width: 0,
            height: 0,
            rotation_degrees: 0,
        };
        assert!(det.detect(&frame).is_err());
    }

    #[test]
    fn scripted_audio_replays_scores_then_disconnects() {
        let mut det =
            ScriptedAudioDetector::new(vec![0.1, 0.9], Duration::from_millis(1));
        let rx = det.start().unwrap();
        assert_eq!(rx.recv().unwrap().score, 0.1);
        assert_eq!(rx.recv().unwrap().score, 0.9);
        // Script exhausted: the sender side hangs up.
        assert!(rx.recv().is_err());
        det.stop();
    }
}
