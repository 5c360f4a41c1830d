//! Gaussian blur with radius and sigma in 0..=50

use super::{int_in_range, key_values};
use crate::edits::ConvolveEdit;
use crate::error::ImageHandlerError;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;

/// Largest explicit kernel side; bigger kernels go to the engine blur
const MAX_KERNEL_SIZE: usize = 51;
/// sqrt(-ln(0.1))
const SQRT_LN_01: f64 = 1.51743;
/// Engine blur rejects smaller sigmas
const MIN_SIGMA: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlurOpts {
    pub r: u32,
    pub s: u32,
}

impl BlurOpts {
    pub fn sigma(&self) -> f64 {
        let s = self.s as f64;
        -0.0057 * s * s + 1.1787 * s - 0.0694
    }
}

/// Square, unnormalized Gaussian kernel of odd side `n`
pub fn gauss_matrix(n: usize, sigma: f64) -> Vec<f64> {
    let half = (n / 2) as i64;
    let mut kernel = Vec::with_capacity(n * n);
    for y in 0..n as i64 {
        for x in 0..n as i64 {
            let (xo, yo) = (x - half, y - half);
            let distance = (xo * xo + yo * yo) as f64;
            kernel.push((-distance / (sigma * sigma)).exp());
        }
    }
    kernel
}

pub struct BlurAction;

impl BlurAction {
    pub fn parse(params: &[&str]) -> Result<BlurOpts, ImageHandlerError> {
        if params.len() < 2 {
            return Err(ImageHandlerError::invalid_argument(
                "blur param error, e.g: blur,r_3,s_2",
            ));
        }
        let mut opts = BlurOpts::default();
        for (key, value) in key_values(params) {
            let slot = match key {
                "r" => &mut opts.r,
                "s" => &mut opts.s,
                _ => return Err(ImageHandlerError::unknown_param(key)),
            };
            *slot = int_in_range(value, 0, 50).ok_or_else(|| {
                ImageHandlerError::invalid_argument(format!(
                    "Blur param '{}' must be between 0 and 50",
                    key
                ))
            })? as u32;
        }
        Ok(opts)
    }
}

#[async_trait]
impl Action for BlurAction {
    fn name(&self) -> &'static str {
        "blur"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let opts = Self::parse(params)?;
        let sigma = opts.sigma();
        if sigma < MIN_SIGMA {
            return Ok(());
        }

        let max_x = (sigma * SQRT_LN_01).floor() as i64;
        let max_n = (2 * (max_x - 1).max(0) + 1) as usize;
        let n = 2 * opts.r as usize + 1;

        if n < max_n && n <= MAX_KERNEL_SIZE {
            tracing::debug!(size = n, sigma = sigma, "Blur with explicit kernel");
            ctx.image.convolve(&ConvolveEdit {
                width: n,
                height: n,
                kernel: gauss_matrix(n, sigma),
                scale: None,
                offset: None,
            })?;
        } else {
            ctx.image.blur(Some(sigma));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::actions::test_support::{context, pixel};
    use rstest::rstest;

    #[rstest]
    #[case(&["blur"])]
    #[case(&["blur", "r_51"])]
    #[case(&["blur", "s_-1"])]
    #[case(&["blur", "x_3"])]
    fn test_rejects(#[case] params: &[&str]) {
        assert!(BlurAction.validate(params).unwrap_err().is_invalid_edit());
    }

    #[test]
    fn test_sigma_curve() {
        let opts = BlurOpts { r: 3, s: 2 };
        assert!((opts.sigma() - 2.2652).abs() < 1e-4);
        assert!(BlurOpts { r: 0, s: 0 }.sigma() < 0.0);
    }

    #[test]
    fn test_gauss_matrix_peaks_in_center() {
        let kernel = gauss_matrix(3, 1.0);
        assert_eq!(kernel.len(), 9);
        assert_eq!(kernel[4], 1.0);
        assert!(kernel[0] < kernel[1]);
    }

    #[tokio::test]
    async fn test_blur_spreads_a_point() {
        let mut ctx = context(21, 21);
        let mut source = image::RgbaImage::from_pixel(21, 21, image::Rgba([0, 0, 0, 255]));
        source.put_pixel(10, 10, image::Rgba([255, 255, 255, 255]));
        ctx.image = Box::new(crate::engine::RasterImage::from_rgba(source));

        BlurAction.process(&mut ctx, &["blur", "r_2", "s_10"]).await.unwrap();
        assert!(pixel(&ctx, 10, 10)[0] < 255);
        assert!(pixel(&ctx, 11, 10)[0] > 0);
    }
}
