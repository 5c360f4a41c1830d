use super::{int_in_range, single_value};
use crate::error::ImageHandlerError;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;

pub struct SharpenAction;

impl SharpenAction {
    pub fn parse(params: &[&str]) -> Result<u32, ImageHandlerError> {
        let value = single_value(params, "Sharpen param error, e.g: sharpen,100")?;
        int_in_range(value, 50, 399)
            .map(|s| s as u32)
            .ok_or_else(|| ImageHandlerError::invalid_argument("Sharpen be between 50 and 399"))
    }
}

#[async_trait]
impl Action for SharpenAction {
    fn name(&self) -> &'static str {
        "sharpen"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let amount = Self::parse(params)?;
        ctx.image.sharpen(amount as f64 / 100.0, 0.5, 1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range() {
        assert_eq!(SharpenAction::parse(&["sharpen", "100"]).unwrap(), 100);
        assert!(SharpenAction::parse(&["sharpen", "49"]).is_err());
        assert!(SharpenAction::parse(&["sharpen", "400"]).is_err());
    }
}
