//! Tick diagnostics: timing, counts, and rejection tallies for each stage.
//!
//! Every call to [`DetectionPipeline::tick`](crate::DetectionPipeline::tick)
//! collects diagnostics alongside its result. They are permanent
//! instrumentation for threshold tuning; nothing in the pipeline reads
//! them back.
//!
//! Stage timings are taken with `web_time::Instant` (a monotonic clock)
//! and stored as [`Duration`]s. In JSON they appear as fractional seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::RejectReason;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single tick.
///
/// Stages after the sharpness gate are `None` when a blurry frame
/// short-circuited the tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickDiagnostics {
    /// Native frame width in pixels.
    pub frame_width: u32,
    /// Native frame height in pixels.
    pub frame_height: u32,
    /// Grayscale conversion.
    pub grayscale: Option<StageDiagnostics>,
    /// Laplacian variance.
    pub sharpness: Option<StageDiagnostics>,
    /// Gaussian blur.
    pub blur: Option<StageDiagnostics>,
    /// Canny edge detection.
    pub edge_detection: Option<StageDiagnostics>,
    /// Morphological closing of the edge map.
    pub closing: Option<StageDiagnostics>,
    /// External contour search.
    pub contour_tracing: Option<StageDiagnostics>,
    /// Polygon approximation and geometric validation.
    pub selection: Option<StageDiagnostics>,
    /// Contours found in the edge map.
    pub contour_count: usize,
    /// Contours that simplified to a convex quadrilateral.
    pub quadrilateral_count: usize,
    /// Why candidates were turned down this tick.
    pub rejections: RejectionCounts,
    /// Wall-clock duration of the whole tick (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Grayscale conversion metrics.
    Grayscale {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },
    /// Sharpness gate metrics.
    Sharpness {
        /// Laplacian variance of the frame.
        score: f64,
        /// Configured minimum.
        threshold: f64,
    },
    /// Gaussian blur metrics.
    Blur {
        /// Sigma value used for the blur kernel.
        sigma: f32,
    },
    /// Canny edge detection metrics.
    EdgeDetection {
        /// Low threshold as configured.
        low_threshold: f32,
        /// High threshold as configured.
        high_threshold: f32,
    },
    /// Morphological closing metrics.
    Closing {
        /// Structuring element half-width.
        radius: u8,
    },
    /// Contour search metrics.
    ContourTracing {
        /// Number of contours found.
        contour_count: usize,
        /// Total number of points across all contours.
        total_point_count: usize,
        /// Maximum points in any single contour.
        max_contour_points: usize,
    },
    /// Candidate selection metrics.
    Selection {
        /// Approximation tolerance as a fraction of perimeter.
        epsilon_factor: f64,
        /// Convex quadrilaterals examined.
        quadrilateral_count: usize,
        /// Whether any candidate passed validation.
        accepted: bool,
    },
}

/// Per-reason tallies of turned-down candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    /// Frame failed the sharpness gate.
    pub blurry: u32,
    /// Quadrilateral extended past the container.
    pub outside_container: u32,
    /// Quadrilateral was too small or too large.
    pub area: u32,
    /// Quadrilateral had the wrong proportions.
    pub aspect: u32,
}

impl RejectionCounts {
    /// Count one rejection.
    pub const fn record(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::Blurry { .. } => self.blurry += 1,
            RejectReason::OutsideContainer => self.outside_container += 1,
            RejectReason::AreaOutOfRange { .. } => self.area += 1,
            RejectReason::AspectOutOfRange { .. } => self.aspect += 1,
        }
    }

    /// Sum across all reasons.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.blurry + self.outside_container + self.area + self.aspect
    }
}

impl TickDiagnostics {
    /// One-line summary for status feedback and logs.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{}x{}", self.frame_width, self.frame_height)];

        if let Some(StageMetrics::Sharpness { score, threshold }) =
            self.sharpness.as_ref().map(|s| &s.metrics)
        {
            parts.push(format!("sharpness {score:.1}/{threshold:.1}"));
        }
        if self.contour_tracing.is_some() {
            parts.push(format!(
                "{} contours, {} quads",
                self.contour_count, self.quadrilateral_count
            ));
        }

        let r = &self.rejections;
        if r.total() > 0 {
            let mut reasons = Vec::new();
            for (label, count) in [
                ("blurry", r.blurry),
                ("outside", r.outside_container),
                ("area", r.area),
                ("aspect", r.aspect),
            ] {
                if count > 0 {
                    reasons.push(format!("{label}={count}"));
                }
            }
            parts.push(format!("rejected {}", reasons.join(" ")));
        }

        parts.push(format!("{:.3}ms", duration_ms(self.total_duration)));
        parts.join(" | ")
    }

    /// Multi-line per-stage breakdown.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Tick Diagnostics\n{}", "=".repeat(60)));
        lines.push(format!(
            "Frame: {}x{}  |  Total duration: {:.3}ms",
            self.frame_width,
            self.frame_height,
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());
        lines.push(format!(
            "{:<20} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(72));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Grayscale", &self.grayscale),
            ("Sharpness", &self.sharpness),
            ("Blur", &self.blur),
            ("Edge Detection", &self.edge_detection),
            ("Closing", &self.closing),
            ("Contour Tracing", &self.contour_tracing),
            ("Selection", &self.selection),
        ];

        for (name, diag) in stages {
            let Some(diag) = diag else {
                lines.push(format!("{name:<20} {:>10} {:>10}  skipped", "-", "-"));
                continue;
            };
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<20} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Grayscale { width, height } => format!("{width}x{height}"),
        StageMetrics::Sharpness { score, threshold } => {
            let verdict = if score < threshold { "blurry" } else { "sharp" };
            format!("score={score:.1} min={threshold:.1} ({verdict})")
        }
        StageMetrics::Blur { sigma } => format!("sigma={sigma:.2}"),
        StageMetrics::EdgeDetection {
            low_threshold,
            high_threshold,
        } => format!("low={low_threshold:.1} high={high_threshold:.1}"),
        StageMetrics::Closing { radius } => format!("radius={radius}"),
        StageMetrics::ContourTracing {
            contour_count,
            total_point_count,
            max_contour_points,
        } => format!("{contour_count} contours, {total_point_count} pts (max={max_contour_points})"),
        StageMetrics::Selection {
            epsilon_factor,
            quadrilateral_count,
            accepted,
        } => format!(
            "eps={epsilon_factor:.3} quads={quadrilateral_count} accepted={accepted}"
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stage(ms: u64, metrics: StageMetrics) -> Option<StageDiagnostics> {
        Some(StageDiagnostics {
            duration: Duration::from_millis(ms),
            metrics,
        })
    }

    fn blurry_tick() -> TickDiagnostics {
        let mut rejections = RejectionCounts::default();
        rejections.record(&RejectReason::Blurry {
            sharpness: 40.0,
            threshold: 120.0,
        });
        TickDiagnostics {
            frame_width: 384,
            frame_height: 272,
            grayscale: stage(
                1,
                StageMetrics::Grayscale {
                    width: 384,
                    height: 272,
                },
            ),
            sharpness: stage(
                2,
                StageMetrics::Sharpness {
                    score: 40.0,
                    threshold: 120.0,
                },
            ),
            rejections,
            total_duration: Duration::from_millis(3),
            ..TickDiagnostics::default()
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn rejection_counts_by_reason() {
        let mut counts = RejectionCounts::default();
        counts.record(&RejectReason::OutsideContainer);
        counts.record(&RejectReason::AreaOutOfRange { ratio: 0.2 });
        counts.record(&RejectReason::AreaOutOfRange { ratio: 0.95 });
        assert_eq!(
            counts,
            RejectionCounts {
                blurry: 0,
                outside_container: 1,
                area: 2,
                aspect: 0,
            }
        );
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn summary_of_blurry_tick() {
        let summary = blurry_tick().summary();
        assert_eq!(
            summary,
            "384x272 | sharpness 40.0/120.0 | rejected blurry=1 | 3.000ms"
        );
    }

    #[test]
    fn summary_mentions_contours_once_traced() {
        let diag = TickDiagnostics {
            contour_tracing: stage(
                4,
                StageMetrics::ContourTracing {
                    contour_count: 7,
                    total_point_count: 300,
                    max_contour_points: 120,
                },
            ),
            contour_count: 7,
            quadrilateral_count: 2,
            ..TickDiagnostics::default()
        };
        assert!(diag.summary().contains("7 contours, 2 quads"));
    }

    #[test]
    fn report_marks_skipped_stages() {
        let report = blurry_tick().report();
        assert!(report.contains("Tick Diagnostics"));
        assert!(report.contains("(blurry)"));
        let skipped = report.lines().filter(|l| l.ends_with("skipped")).count();
        assert_eq!(skipped, 5);
    }

    #[test]
    fn serde_durations_as_seconds() {
        let json = serde_json::to_value(blurry_tick()).unwrap();
        assert!((json["total_duration"].as_f64().unwrap() - 0.003).abs() < 1e-12);
        let back: TickDiagnostics = serde_json::from_value(json).unwrap();
        let drift = back.total_duration.abs_diff(Duration::from_millis(3));
        assert!(drift < Duration::from_micros(1), "drift {drift:?}");
        assert_eq!(back.rejections.blurry, 1);
    }

    #[test]
    fn negative_duration_is_refused() {
        let mut json = serde_json::to_value(blurry_tick()).unwrap();
        json["total_duration"] = serde_json::json!(-1.0);
        assert!(serde_json::from_value::<TickDiagnostics>(json).is_err());
    }
}
