use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::collections::HashSet;

pub struct Metrics {
    frames_processed: IntCounter,
    detections: IntCounterVec,
    inference_duration: Histogram,
    active_sessions: IntGauge,
    sessions_ended: IntCounterVec,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("emotion_detection".to_string()), None)?;

        let frames_processed =
            IntCounter::new("frames_processed_total", "Total number of frames processed")?;

        let detections = IntCounterVec::new(
            Opts::new("detections_total", "Total number of detections per emotion"),
            &["emotion"],
        )?;

        let boundaries = generate_boundaries((5, 25, 35, 295, 1000));
        let inference_duration = Histogram::with_opts(
            HistogramOpts::new(
                "inference_duration_ms",
                "Duration of inference calls in milliseconds",
            )
            .buckets(boundaries),
        )?;

        let active_sessions = IntGauge::new("active_sessions", "Number of open sessions")?;

        let sessions_ended = IntCounterVec::new(
            Opts::new("sessions_ended_total", "Sessions ended, by reason"),
            &["reason"],
        )?;

        registry.register(Box::new(frames_processed.clone()))?;
        registry.register(Box::new(detections.clone()))?;
        registry.register(Box::new(inference_duration.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(sessions_ended.clone()))?;

        Ok(Metrics {
            frames_processed,
            detections,
            inference_duration,
            active_sessions,
            sessions_ended,
            registry,
        })
    }

    pub fn record_frame(&self, duration_ms: u64, emotions: &[String]) {
        self.frames_processed.inc();
        self.inference_duration.observe(duration_ms as f64);
        for emotion in emotions {
            self.detections.with_label_values(&[emotion.as_str()]).inc();
        }
    }

    pub fn session_opened(&self) {
        self.active_sessions.inc();
    }

    pub fn session_ended(&self, reason: &str) {
        self.active_sessions.dec();
        self.sessions_ended.with_label_values(&[reason]).inc();
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 5;
    let middle_step: usize = 2;
    let end_step: usize = 20;
    let tail_step: usize = 100;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
