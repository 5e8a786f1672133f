//! Image to input tensor conversion

use candle_core::{DType, Device, Tensor};
use geolens_core::{Error, Result};
use image::imageops::FilterType;
use image::DynamicImage;

/// Edge length of the model input
pub const INPUT_SIZE: usize = 224;

/// Canonical input shape, batch-first and channels-last
pub const INPUT_SHAPE: (usize, usize, usize, usize) = (1, INPUT_SIZE, INPUT_SIZE, 3);

/// Resize to 224×224 (bilinear), convert to RGB, scale into [0, 1] and add a
/// batch axis. Output shape `[1, 224, 224, 3]`, dtype f32.
pub fn to_input_tensor(image: &DynamicImage, device: &Device) -> Result<Tensor> {
    let size = INPUT_SIZE as u32;
    let rgb = image
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8()
        .into_raw();

    Tensor::from_vec(rgb, (INPUT_SIZE, INPUT_SIZE, 3), device)
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.affine(1.0 / 255.0, 0.0))
        .and_then(|t| t.unsqueeze(0))
        .map_err(|e| Error::inference(format!("preprocessing failed: {}", e)))
}

/// All-zero input used for warmup
pub fn zeros(device: &Device) -> Result<Tensor> {
    Tensor::zeros(INPUT_SHAPE, DType::F32, device)
        .map_err(|e| Error::warmup(format!("failed to allocate warmup input: {}", e)))
}
