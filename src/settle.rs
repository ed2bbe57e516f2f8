//! Image-settle barrier.
//!
//! Every illustration is resolved and decoded on its own worker thread.
//! [`settle_illustrations`] waits until each pending load has reported
//! loaded-or-errored, or until the timeout elapses, whichever comes first.
//! Loads still pending at the deadline are abandoned: their threads finish
//! in the background and their results are dropped.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::layout::Illustrations;
use crate::lesson::{ImageRef, LessonDocument, SectionKind};

/// Default upper bound on waiting for illustrations.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_millis(500);

/// Outcome of waiting on the barrier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettleReport {
    pub loaded: Vec<SectionKind>,
    pub failed: Vec<SectionKind>,
    pub timed_out: Vec<SectionKind>,
}

impl SettleReport {
    pub fn all_settled(&self) -> bool {
        self.timed_out.is_empty()
    }
}

/// Decode one illustration into RGB pixels.
pub fn load_illustration(image_ref: &ImageRef) -> Result<image::RgbImage> {
    let bytes = image_ref.load_bytes()?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| Error::Image(format!("{}: {e}", image_ref.describe())))?;
    Ok(decoded.to_rgb8())
}

/// Load every illustration of `lesson` concurrently and wait for them to
/// settle, up to `timeout`.
pub fn settle_illustrations(
    lesson: &LessonDocument,
    timeout: Duration,
) -> (Illustrations, SettleReport) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut pending: Vec<SectionKind> = Vec::new();

    for kind in SectionKind::ALL {
        let Some(image_ref) = lesson.section(kind).illustration.clone() else {
            continue;
        };
        pending.push(kind);
        let tx = tx.clone();
        thread::spawn(move || {
            let result = load_illustration(&image_ref);
            // The barrier may already have given up on us.
            let _ = tx.send((kind, result));
        });
    }
    drop(tx);

    let mut illustrations = Illustrations::new();
    let mut report = SettleReport::default();
    let deadline = Instant::now() + timeout;

    while !pending.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((kind, result)) => {
                pending.retain(|k| *k != kind);
                match result {
                    Ok(pixels) => {
                        log::debug!(
                            "{} illustration settled ({}x{})",
                            kind.as_str(),
                            pixels.width(),
                            pixels.height()
                        );
                        illustrations.insert(kind, Arc::new(pixels));
                        report.loaded.push(kind);
                    }
                    Err(e) => {
                        log::warn!("Skipping {} illustration: {e}", kind.as_str());
                        report.failed.push(kind);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "{} illustration(s) not settled after {}ms, exporting without them",
                    pending.len(),
                    timeout.as_millis()
                );
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Keep render order in the report regardless of completion order.
    let order = |k: &SectionKind| SectionKind::ALL.iter().position(|x| x == k);
    report.loaded.sort_by_key(order);
    report.failed.sort_by_key(order);
    pending.sort_by_key(order);
    report.timed_out = pending;

    (illustrations, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples;

    #[test]
    fn lesson_without_illustrations_settles_immediately() {
        let lesson = samples::heart_lesson();
        let started = Instant::now();
        let (images, report) = settle_illustrations(&lesson, Duration::from_secs(5));
        assert!(images.is_empty());
        assert!(report.all_settled());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn loaded_and_failed_are_reported() {
        let mut lesson = samples::heart_lesson();
        lesson.anatomy.illustration = Some(samples::solid_png_data_uri(40, 30, [200, 0, 0]));
        lesson.risks.illustration = Some(ImageRef::new("data:image/png;base64,bm90IGFuIGltYWdl"));
        lesson.aftercare.illustration = Some(samples::solid_png_data_uri(10, 10, [0, 0, 200]));

        let (images, report) = settle_illustrations(&lesson, Duration::from_secs(5));
        assert_eq!(
            report.loaded,
            vec![SectionKind::Anatomy, SectionKind::Aftercare]
        );
        assert_eq!(report.failed, vec![SectionKind::Risks]);
        assert!(report.timed_out.is_empty());
        assert_eq!(images[&SectionKind::Anatomy].dimensions(), (40, 30));
        assert!(!images.contains_key(&SectionKind::Risks));
    }

    #[test]
    fn slow_illustrations_time_out() {
        let mut lesson = samples::heart_lesson();
        for kind in [SectionKind::Anatomy, SectionKind::Risks] {
            lesson.section_mut(kind).illustration =
                Some(samples::solid_png_data_uri(3000, 3000, [90, 90, 90]));
        }

        let started = Instant::now();
        let (images, report) = settle_illustrations(&lesson, Duration::ZERO);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!report.timed_out.is_empty());
        assert!(!report.all_settled());
        assert_eq!(report.loaded.len() + report.timed_out.len(), 2);
        for kind in &report.timed_out {
            assert!(!images.contains_key(kind));
        }
    }

    #[test]
    fn missing_file_counts_as_failed() {
        let mut lesson = samples::heart_lesson();
        lesson.technique.illustration = Some(ImageRef::new("/nonexistent/illustration.png"));
        let (images, report) = settle_illustrations(&lesson, Duration::from_secs(5));
        assert!(images.is_empty());
        assert_eq!(report.failed, vec![SectionKind::Technique]);
    }
}
