//! Engine-side driver: walks an image folder through the detection
//! pipeline and publishes status and timing telemetry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use crate::detect::{class_name, Detector};
use crate::telemetry::{TelemetryMessage, TelemetrySink};

/// Image files accepted by the runner, case-insensitive.
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// List the benchmark images in a folder, sorted for a stable run order.
pub fn list_image_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(folder)
        .with_context(|| format!("failed to read images folder {}", folder.display()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Run the detector over every image in the folder, publishing one timing
/// message per image between an `active: true` / `active: false` pair.
///
/// `stop` allows a signal handler to end the run early; the inactive
/// status still goes out so the monitor terminates cleanly. Returns the
/// number of images processed.
pub fn run_folder(
    detector: &mut Detector,
    producer: &mut dyn TelemetrySink,
    images_folder: &Path,
    annotate_into: Option<&Path>,
    stop: &AtomicBool,
) -> Result<usize> {
    let images = list_image_files(images_folder)?;
    log::info!("benchmarking {} images from {}", images.len(), images_folder.display());

    producer.produce(&TelemetryMessage::status(true))?;
    let mut processed = 0usize;

    let result = (|| -> Result<()> {
        for path in &images {
            if stop.load(Ordering::SeqCst) {
                log::warn!("interrupted after {} images", processed);
                break;
            }
            let image = image::open(path)
                .with_context(|| format!("failed to decode {}", path.display()))?
                .to_rgb8();

            let (detections, timings) = detector.run(&image)?;
            producer.produce(&TelemetryMessage::data(timings))?;

            log::info!(
                "{}: {} detections in {}ms (pre {}ms, inference {}ms, post {}ms)",
                path.file_name().and_then(|n| n.to_str()).unwrap_or("?"),
                detections.len(),
                timings.total_ms(),
                timings.pre_ms,
                timings.inf_ms,
                timings.post_ms
            );
            for det in &detections {
                log::debug!(
                    "  {} {:.2} at [{}, {}, {}, {}]",
                    class_name(det.class_id),
                    det.score,
                    det.bbox.x_min,
                    det.bbox.y_min,
                    det.bbox.x_max,
                    det.bbox.y_max
                );
            }

            if let Some(output_folder) = annotate_into {
                write_annotated(path, &image, &detections, output_folder)?;
            }
            processed += 1;
        }
        Ok(())
    })();

    // The inactive status must go out even when a detection failed, so
    // the monitor side does not block forever.
    producer.produce(&TelemetryMessage::status(false))?;
    result?;
    Ok(processed)
}

#[cfg(feature = "annotate")]
fn write_annotated(
    source: &Path,
    image: &image::RgbImage,
    detections: &[crate::detect::Detection],
    output_folder: &Path,
) -> Result<()> {
    std::fs::create_dir_all(output_folder)
        .with_context(|| format!("failed to create {}", output_folder.display()))?;
    let mut annotated = image.clone();
    crate::plot::draw_detections(&mut annotated, detections);
    let name = source.file_name().and_then(|n| n.to_str()).unwrap_or("image");
    let path = output_folder.join(format!("output_{}", name));
    annotated
        .save(&path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    Ok(())
}

#[cfg(not(feature = "annotate"))]
fn write_annotated(
    _source: &Path,
    _image: &image::RgbImage,
    _detections: &[crate::detect::Detection],
    _output_folder: &Path,
) -> Result<()> {
    log::debug!("annotated output requested but the annotate feature is off");
    Ok(())
}
