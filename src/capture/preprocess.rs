use fast_image_resize as fr;
use fr::images::Image;

use crate::capture::frame::Frame;
use crate::engine::backend::InputTensor;
use crate::pipeline::error::{PipelineError, Result};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Turns a captured frame into model input.
pub trait FramePreprocessor: Send + Sync {
    fn prepare(&self, frame: &Frame) -> Result<InputTensor>;
}

/// Scales an RGB frame to the model input size and normalises it with the
/// ImageNet mean/std into a `[1, 3, H, W]` tensor.
///
/// Uses `fast_image_resize` for SIMD-accelerated resizing.
#[derive(Debug, Clone)]
pub struct ResizeNormalize {
    width: u32,
    height: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ResizeNormalize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    pub fn with_normalisation(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    /// Resize raw RGB data to the target size. Frames already at the target
    /// size are passed through.
    fn resize(&self, frame: &Frame) -> Result<Vec<u8>> {
        if frame.width == self.width && frame.height == self.height {
            return Ok(frame.data.clone());
        }

        let src_image = Image::from_vec_u8(
            frame.width,
            frame.height,
            frame.data.clone(),
            fr::PixelType::U8x3,
        )
        .map_err(|e| PipelineError::Preprocess(e.to_string()))?;
        let mut dst_image = Image::new(self.width, self.height, fr::PixelType::U8x3);

        let mut resizer = fr::Resizer::new();
        resizer
            .resize(&src_image, &mut dst_image, None)
            .map_err(|e| PipelineError::Preprocess(e.to_string()))?;

        Ok(dst_image.into_vec())
    }
}

impl Default for ResizeNormalize {
    fn default() -> Self {
        Self::new(224, 224)
    }
}

impl FramePreprocessor for ResizeNormalize {
    fn prepare(&self, frame: &Frame) -> Result<InputTensor> {
        if frame.width == 0 || frame.height == 0 {
            return Err(PipelineError::Preprocess("frame has zero size".into()));
        }
        if frame.data.len() != frame.expected_len() {
            return Err(PipelineError::Preprocess(format!(
                "frame buffer is {} bytes, {}x{} RGB needs {}",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.expected_len()
            )));
        }

        let rgb = self.resize(frame)?;
        let plane = self.width as usize * self.height as usize;
        let mut data = vec![0.0f32; plane * 3];
        for (i, pixel) in rgb.chunks_exact(3).enumerate() {
            for (c, &byte) in pixel.iter().enumerate() {
                let value = f32::from(byte) / 255.0;
                data[c * plane + i] = (value - self.mean[c]) / self.std[c];
            }
        }

        Ok(InputTensor::new(
            [1, 3, self.height as usize, self.width as usize],
            data,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a synthetic RGB test frame (gradient pattern).
    fn make_test_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x % 256) as u8); // R
                data.push((y % 256) as u8); // G
                data.push(128); // B
            }
        }
        Frame {
            data,
            width,
            height,
            timestamp_us: 0,
        }
    }

    #[test]
    fn prepare_produces_nchw_tensor_of_target_size() {
        let pre = ResizeNormalize::new(32, 24);
        let tensor = pre.prepare(&make_test_frame(640, 480)).unwrap();
        assert_eq!(tensor.shape, [1, 3, 24, 32]);
        assert_eq!(tensor.data.len(), tensor.expected_len());
    }

    #[test]
    fn same_size_frame_is_not_resized() {
        let pre = ResizeNormalize::new(4, 4).with_normalisation([0.0; 3], [1.0; 3]);
        let frame = make_test_frame(4, 4);
        let tensor = pre.prepare(&frame).unwrap();
        // Red plane holds x / 255 for each row.
        assert_eq!(tensor.data[1], 1.0 / 255.0);
        // Blue plane is constant 128.
        let blue = &tensor.data[32..48];
        assert!(blue.iter().all(|v| (*v - 128.0 / 255.0).abs() < 1e-6));
    }

    #[test]
    fn normalisation_uses_imagenet_statistics() {
        let pre = ResizeNormalize::new(1, 1);
        let frame = Frame {
            data: vec![255, 255, 255],
            width: 1,
            height: 1,
            timestamp_us: 0,
        };
        let tensor = pre.prepare(&frame).unwrap();
        let expected_r = (1.0 - 0.485) / 0.229;
        assert!((tensor.data[0] - expected_r).abs() < 1e-5);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let pre = ResizeNormalize::default();
        let frame = Frame {
            data: vec![0; 10],
            width: 4,
            height: 4,
            timestamp_us: 0,
        };
        assert!(matches!(
            pre.prepare(&frame),
            Err(PipelineError::Preprocess(_))
        ));
    }

    #[test]
    fn zero_sized_frame_is_rejected() {
        let pre = ResizeNormalize::default();
        let frame = Frame {
            data: vec![],
            width: 0,
            height: 0,
            timestamp_us: 0,
        };
        assert!(pre.prepare(&frame).is_err());
    }
}
