use super::{int_in_range, single_value};
use crate::edits::Rgba;
use crate::error::ImageHandlerError;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;

pub struct RotateAction;

impl RotateAction {
    pub fn parse(params: &[&str]) -> Result<u32, ImageHandlerError> {
        let value = single_value(params, "Rotate param error, e.g: rotate,90")?;
        int_in_range(value, 0, 360)
            .map(|d| d as u32)
            .ok_or_else(|| ImageHandlerError::invalid_argument("Rotate must be between 0 and 360"))
    }
}

#[async_trait]
impl Action for RotateAction {
    fn name(&self) -> &'static str {
        "rotate"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let degrees = Self::parse(params)?;
        ctx.image.rotate(degrees as f64, Rgba::white());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::actions::test_support::{context, size};

    #[test]
    fn test_range() {
        assert_eq!(RotateAction::parse(&["rotate", "360"]).unwrap(), 360);
        assert!(RotateAction::parse(&["rotate", "361"]).is_err());
        assert!(RotateAction::parse(&["rotate", "-1"]).is_err());
        assert!(RotateAction::parse(&["rotate"]).is_err());
    }

    #[tokio::test]
    async fn test_quarter_turn_swaps_sides() {
        let mut ctx = context(30, 10);
        RotateAction.process(&mut ctx, &["rotate", "90"]).await.unwrap();
        assert_eq!(size(&ctx), (10, 30));
    }
}
