use super::{int_in_range, key_values};
use crate::engine::{Blend, Layer, LayerInput};
use crate::error::ImageHandlerError;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;

pub struct RoundedCornersAction;

impl RoundedCornersAction {
    pub fn parse(params: &[&str]) -> Result<u32, ImageHandlerError> {
        if params.len() != 2 {
            return Err(ImageHandlerError::invalid_argument(
                "RoundedCorners param error, e.g: rounded-corners,r_30",
            ));
        }
        let mut radius = 1;
        for (key, value) in key_values(params) {
            match key {
                "r" => {
                    radius = int_in_range(value, 1, 4096).ok_or_else(|| {
                        ImageHandlerError::invalid_argument(
                            "RoundedCorners param 'r' must be between 1 and 4096",
                        )
                    })? as u32
                }
                _ => return Err(ImageHandlerError::unknown_param(key)),
            }
        }
        Ok(radius)
    }
}

#[async_trait]
impl Action for RoundedCornersAction {
    fn name(&self) -> &'static str {
        "rounded-corners"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let radius = Self::parse(params)?;
        let mask = Layer::new(LayerInput::RoundedRect { radius }).with_blend(Blend::DestIn);
        ctx.image.composite(&[mask])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::actions::test_support::{context, pixel, size};

    #[test]
    fn test_validation() {
        assert_eq!(RoundedCornersAction::parse(&["rounded-corners", "r_30"]).unwrap(), 30);
        assert!(RoundedCornersAction::parse(&["rounded-corners", "r_0"]).is_err());
        assert!(RoundedCornersAction::parse(&["rounded-corners", "r_4097"]).is_err());
        assert!(RoundedCornersAction::parse(&["rounded-corners", "x_3"]).is_err());
        assert!(RoundedCornersAction::parse(&["rounded-corners"]).is_err());
    }

    #[tokio::test]
    async fn test_corners_become_transparent() {
        let mut ctx = context(40, 40);
        RoundedCornersAction
            .process(&mut ctx, &["rounded-corners", "r_10"])
            .await
            .unwrap();
        assert_eq!(size(&ctx), (40, 40));
        assert_eq!(pixel(&ctx, 0, 0)[3], 0);
        assert_eq!(pixel(&ctx, 20, 20)[3], 255);
        assert_eq!(pixel(&ctx, 20, 0)[3], 255);
    }
}
