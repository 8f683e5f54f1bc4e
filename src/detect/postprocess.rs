//! Post-processing for single-stage anchor-free detectors.
//!
//! The backend produces one prediction tensor per image with layout
//! `[1, 4+C, N]`: four box attributes (center-x, center-y, width, height in
//! model-input pixels) followed by C class logits, for N candidate boxes.
//!
//! Box convention: candidates are carried as center/width/height through
//! scoring and NMS, and converted to corner form exactly once while
//! rescaling into original-image coordinates.

use serde::Serialize;

/// Axis-aligned box in original-image pixel coordinates.
///
/// Invariant: `x_min <= x_max` and `y_min <= y_max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

/// One surviving detection.
#[derive(Clone, Debug, Serialize)]
pub struct Detection {
    pub class_id: usize,
    pub score: f32,
    pub bbox: BoundingBox,
}

/// Candidate box in model-input pixel space, before NMS.
#[derive(Clone, Copy, Debug)]
pub struct RawCandidate {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub score: f32,
    pub class_id: usize,
}

/// Score thresholds driving NMS and the final filter.
#[derive(Clone, Copy, Debug)]
pub struct PostprocessParams {
    /// Final filter: detections must score strictly above this.
    pub score_thresh: f32,
    /// Score floor applied before NMS.
    pub confidence_thresh: f32,
    /// IoU above which a lower-scoring candidate is suppressed.
    pub iou_thresh: f32,
}

/// Read candidates out of a flattened `[1, 4+C, N]` prediction tensor.
///
/// Class score is the maximum over the C logits; on ties the first class
/// wins.
pub fn decode_predictions(output: &[f32], candidates: usize, classes: usize) -> Vec<RawCandidate> {
    let attrs = 4 + classes;
    debug_assert!(output.len() >= attrs * candidates);
    let at = |attr: usize, n: usize| output[attr * candidates + n];

    let mut decoded = Vec::with_capacity(candidates);
    for n in 0..candidates {
        let mut class_id = 0usize;
        let mut score = f32::NEG_INFINITY;
        for c in 0..classes {
            let logit = at(4 + c, n);
            if logit > score {
                score = logit;
                class_id = c;
            }
        }
        decoded.push(RawCandidate {
            cx: at(0, n),
            cy: at(1, n),
            w: at(2, n),
            h: at(3, n),
            score,
            class_id,
        });
    }
    decoded
}

/// Intersection-over-union of two center/width/height boxes.
pub fn iou(a: &RawCandidate, b: &RawCandidate) -> f32 {
    let (ax1, ay1, ax2, ay2) = corners(a);
    let (bx1, by1, bx2, by2) = corners(b);

    let ix = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
    let iy = (ay2.min(by2) - ay1.max(by1)).max(0.0);
    let inter = ix * iy;
    let union = (ax2 - ax1) * (ay2 - ay1) + (bx2 - bx1) * (by2 - by1) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

fn corners(c: &RawCandidate) -> (f32, f32, f32, f32) {
    (
        c.cx - 0.5 * c.w,
        c.cy - 0.5 * c.h,
        c.cx + 0.5 * c.w,
        c.cy + 0.5 * c.h,
    )
}

/// Greedy NMS over all candidates.
///
/// Candidates below `confidence_thresh` never enter the engine. Survivors
/// are ordered strictly by descending score; equal scores keep first-seen
/// order (stable sort), which makes suppression deterministic.
pub fn non_max_suppression(
    candidates: &[RawCandidate],
    confidence_thresh: f32,
    iou_thresh: f32,
) -> Vec<RawCandidate> {
    let mut eligible: Vec<&RawCandidate> = candidates
        .iter()
        .filter(|c| c.score >= confidence_thresh)
        .collect();
    eligible.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<RawCandidate> = Vec::new();
    for candidate in eligible {
        if kept.iter().all(|k| iou(k, candidate) <= iou_thresh) {
            kept.push(*candidate);
        }
    }
    kept
}

/// Rescale NMS survivors into original-image pixels and apply the final
/// score filter. Output order is survivor order, not score order.
///
/// `input_factor` is `(orig_h / in_h, orig_w / in_w)`; boxes are clamped to
/// the original image bounds.
pub fn rescale_detections(
    survivors: &[RawCandidate],
    input_factor: (f32, f32),
    original_size: (u32, u32),
    score_thresh: f32,
) -> Vec<Detection> {
    let (factor_h, factor_w) = input_factor;
    let (orig_w, orig_h) = original_size;

    survivors
        .iter()
        .filter(|c| c.score > score_thresh)
        .map(|c| {
            let x_min = (c.cx - 0.5 * c.w) * factor_w;
            let y_min = (c.cy - 0.5 * c.h) * factor_h;
            let x_max = x_min + c.w * factor_w;
            let y_max = y_min + c.h * factor_h;

            let clamp_x = |v: f32| (v as i64).clamp(0, orig_w as i64);
            let clamp_y = |v: f32| (v as i64).clamp(0, orig_h as i64);
            let bbox = BoundingBox {
                x_min: clamp_x(x_min),
                y_min: clamp_y(y_min),
                x_max: clamp_x(x_max),
                y_max: clamp_y(y_max),
            };
            Detection {
                class_id: c.class_id,
                score: c.score,
                bbox,
            }
        })
        .collect()
}

/// Full post-processing stage: decode, NMS, rescale, filter.
pub fn postprocess(
    output: &[f32],
    candidates: usize,
    classes: usize,
    params: &PostprocessParams,
    input_size: (u32, u32),
    original_size: (u32, u32),
) -> Vec<Detection> {
    let decoded = decode_predictions(output, candidates, classes);
    let survivors = non_max_suppression(&decoded, params.confidence_thresh, params.iou_thresh);
    let input_factor = (
        original_size.1 as f32 / input_size.1 as f32,
        original_size.0 as f32 / input_size.0 as f32,
    );
    rescale_detections(&survivors, input_factor, original_size, params.score_thresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(cx: f32, cy: f32, w: f32, h: f32, score: f32, class_id: usize) -> RawCandidate {
        RawCandidate {
            cx,
            cy,
            w,
            h,
            score,
            class_id,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = cand(50.0, 50.0, 20.0, 20.0, 0.9, 0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = cand(10.0, 10.0, 10.0, 10.0, 0.9, 0);
        let b = cand(100.0, 100.0, 10.0, 10.0, 0.9, 0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_suppresses_overlapping_lower_score() {
        let boxes = vec![
            cand(50.0, 50.0, 20.0, 20.0, 0.7, 0),
            cand(51.0, 51.0, 20.0, 20.0, 0.9, 0),
            cand(150.0, 150.0, 20.0, 20.0, 0.8, 1),
        ];
        let kept = non_max_suppression(&boxes, 0.5, 0.5);
        assert_eq!(kept.len(), 2);
        // Highest score first, the overlapping 0.7 box suppressed.
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.8);
        for i in 0..kept.len() {
            for j in (i + 1)..kept.len() {
                assert!(iou(&kept[i], &kept[j]) <= 0.5);
            }
        }
    }

    #[test]
    fn nms_ties_keep_first_seen() {
        let boxes = vec![
            cand(50.0, 50.0, 20.0, 20.0, 0.8, 3),
            cand(50.5, 50.5, 20.0, 20.0, 0.8, 7),
        ];
        let kept = non_max_suppression(&boxes, 0.5, 0.5);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].class_id, 3);
    }

    #[test]
    fn nms_confidence_floor_drops_weak_candidates() {
        let boxes = vec![cand(50.0, 50.0, 20.0, 20.0, 0.3, 0)];
        assert!(non_max_suppression(&boxes, 0.5, 0.5).is_empty());
    }

    #[test]
    fn nms_of_nothing_is_nothing() {
        assert!(non_max_suppression(&[], 0.5, 0.5).is_empty());
    }

    #[test]
    fn decode_picks_max_class_first_seen_on_tie() {
        // 2 candidates, 3 classes, layout [4+C, N] flattened.
        let n = 2;
        let mut output = vec![0.0f32; (4 + 3) * n];
        // Candidate 0: box (10, 20, 4, 6), class scores [0.1, 0.9, 0.9].
        output[n] = 20.0;
        output[0] = 10.0;
        output[2 * n] = 4.0;
        output[3 * n] = 6.0;
        output[4 * n] = 0.1;
        output[5 * n] = 0.9;
        output[6 * n] = 0.9;
        let decoded = decode_predictions(&output, n, 3);
        assert_eq!(decoded[0].class_id, 1);
        assert_eq!(decoded[0].score, 0.9);
        assert_eq!(decoded[0].cx, 10.0);
        assert_eq!(decoded[0].h, 6.0);
    }

    #[test]
    fn rescale_produces_ordered_corners_within_bounds() {
        let survivors = vec![cand(320.0, 240.0, 640.0, 480.0, 0.9, 0)];
        // Model input 640x480, original 1280x960 -> factor 2 on both axes.
        let dets = rescale_detections(&survivors, (2.0, 2.0), (1280, 960), 0.25);
        assert_eq!(dets.len(), 1);
        let b = dets[0].bbox;
        assert!(b.x_min <= b.x_max && b.y_min <= b.y_max);
        assert_eq!((b.x_min, b.y_min, b.x_max, b.y_max), (0, 0, 1280, 960));
    }

    #[test]
    fn rescale_drops_scores_at_or_below_threshold() {
        let survivors = vec![
            cand(50.0, 50.0, 20.0, 20.0, 0.25, 0),
            cand(150.0, 150.0, 20.0, 20.0, 0.26, 1),
        ];
        let dets = rescale_detections(&survivors, (1.0, 1.0), (640, 480), 0.25);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
    }

    #[test]
    fn output_count_never_exceeds_input_count() {
        let boxes: Vec<RawCandidate> = (0..10)
            .map(|i| cand(50.0 + i as f32, 50.0, 20.0, 20.0, 0.9 - i as f32 * 0.01, 0))
            .collect();
        let kept = non_max_suppression(&boxes, 0.5, 0.5);
        assert!(kept.len() <= boxes.len());
    }
}
