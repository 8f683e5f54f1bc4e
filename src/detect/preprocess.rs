use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::RgbImage;

use super::backend::{ElementType, TensorData, TensorDescriptor};

/// Memory layout expected by the backend for image tensors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorLayout {
    /// Batch, height, width, channel (interpreter-style).
    Nhwc,
    /// Batch, channel, height, width (graph-session-style).
    Nchw,
}

/// Everything the pre-processing stage needs to turn a decoded image into
/// a backend input tensor.
///
/// `mean` is only consumed by backends that prepare their input natively
/// (blob-style pre-processing with per-channel mean subtraction); the
/// in-crate path normalizes to [0,1] without mean subtraction, matching
/// the interpreter convention.
#[derive(Clone, Debug)]
pub struct PreprocessSpec {
    pub width: u32,
    pub height: u32,
    pub layout: TensorLayout,
    pub swap_channels: bool,
    pub mean: [f32; 3],
}

impl PreprocessSpec {
    /// Derive layout and spatial dimensions from an input descriptor shape.
    ///
    /// Accepts `[1, H, W, 3]` (NHWC) or `[1, 3, H, W]` (NCHW).
    pub fn from_descriptor(desc: &TensorDescriptor) -> Result<Self> {
        let dims = &desc.shape;
        if dims.len() != 4 || dims[0] != 1 {
            return Err(anyhow!(
                "expected a [1, ...] rank-4 input shape, got {:?}",
                dims
            ));
        }
        let (layout, height, width) = if dims[1] == 3 {
            (TensorLayout::Nchw, dims[2], dims[3])
        } else if dims[3] == 3 {
            (TensorLayout::Nhwc, dims[1], dims[2])
        } else {
            return Err(anyhow!("input shape {:?} has no 3-channel axis", dims));
        };
        Ok(Self {
            width: width as u32,
            height: height as u32,
            layout,
            swap_channels: true,
            mean: [0.0; 3],
        })
    }
}

/// Resize (linear interpolation), optionally swap channel order, normalize
/// to [0,1] and lay the pixels out as requested.
pub fn format_image(image: &RgbImage, spec: &PreprocessSpec) -> Vec<f32> {
    let resized = if image.dimensions() == (spec.width, spec.height) {
        image.clone()
    } else {
        image::imageops::resize(image, spec.width, spec.height, FilterType::Triangle)
    };

    let (w, h) = (spec.width as usize, spec.height as usize);
    let mut out = vec![0.0f32; w * h * 3];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let src = if spec.swap_channels { 2 - c } else { c };
            let value = pixel.0[src] as f32 / 255.0;
            let idx = match spec.layout {
                TensorLayout::Nhwc => (y * w + x) * 3 + c,
                TensorLayout::Nchw => c * h * w + y * w + x,
            };
            out[idx] = value;
        }
    }
    out
}

/// Quantize a float tensor to the input descriptor's element type, or pass
/// it through unchanged for float models.
pub fn quantize_input(values: Vec<f32>, desc: &TensorDescriptor) -> TensorData {
    match desc.element {
        ElementType::F32 => TensorData::F32(values),
        ElementType::U8 => {
            TensorData::U8(values.iter().map(|&v| desc.quantize(v) as u8).collect())
        }
        ElementType::I8 => {
            TensorData::I8(values.iter().map(|&v| desc.quantize(v) as i8).collect())
        }
    }
}

/// Full pre-processing stage: format then quantize.
pub fn prepare_input(image: &RgbImage, spec: &PreprocessSpec, desc: &TensorDescriptor) -> TensorData {
    quantize_input(format_image(image, spec), desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid_image(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(rgb))
    }

    #[test]
    fn nhwc_layout_interleaves_channels() {
        let img = solid_image(2, 2, [255, 0, 0]);
        let spec = PreprocessSpec {
            width: 2,
            height: 2,
            layout: TensorLayout::Nhwc,
            swap_channels: false,
            mean: [0.0; 3],
        };
        let out = format_image(&img, &spec);
        assert_eq!(out.len(), 12);
        // First pixel: R=1, G=0, B=0.
        assert_eq!(&out[0..3], &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn nchw_layout_is_planar() {
        let img = solid_image(2, 2, [255, 0, 0]);
        let spec = PreprocessSpec {
            width: 2,
            height: 2,
            layout: TensorLayout::Nchw,
            swap_channels: false,
            mean: [0.0; 3],
        };
        let out = format_image(&img, &spec);
        // Red plane first, all ones; green and blue planes zero.
        assert!(out[0..4].iter().all(|&v| v == 1.0));
        assert!(out[4..12].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn channel_swap_reverses_rgb() {
        let img = solid_image(1, 1, [255, 128, 0]);
        let spec = PreprocessSpec {
            width: 1,
            height: 1,
            layout: TensorLayout::Nhwc,
            swap_channels: true,
            mean: [0.0; 3],
        };
        let out = format_image(&img, &spec);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(out[2], 1.0);
    }

    #[test]
    fn resize_changes_spatial_dims() {
        let img = solid_image(8, 4, [10, 20, 30]);
        let spec = PreprocessSpec {
            width: 4,
            height: 2,
            layout: TensorLayout::Nhwc,
            swap_channels: false,
            mean: [0.0; 3],
        };
        assert_eq!(format_image(&img, &spec).len(), 4 * 2 * 3);
    }

    #[test]
    fn quantized_input_uses_descriptor_params() {
        let desc = TensorDescriptor::quantized(vec![1, 1, 1, 3], ElementType::U8, 1.0 / 255.0, 0);
        match quantize_input(vec![1.0, 0.0, 0.5], &desc) {
            TensorData::U8(v) => assert_eq!(v, vec![255, 0, 128]),
            other => panic!("expected u8 tensor, got {:?}", other),
        }
    }

    #[test]
    fn descriptor_shape_resolves_layout() {
        let nhwc = TensorDescriptor::float(vec![1, 320, 240, 3]);
        let spec = PreprocessSpec::from_descriptor(&nhwc).unwrap();
        assert_eq!(spec.layout, TensorLayout::Nhwc);
        assert_eq!((spec.width, spec.height), (240, 320));

        let nchw = TensorDescriptor::float(vec![1, 3, 320, 240]);
        let spec = PreprocessSpec::from_descriptor(&nchw).unwrap();
        assert_eq!(spec.layout, TensorLayout::Nchw);
        assert_eq!((spec.width, spec.height), (240, 320));

        assert!(PreprocessSpec::from_descriptor(&TensorDescriptor::float(vec![1, 2])).is_err());
    }
}
