use super::single_value;
use crate::error::ImageHandlerError;
use crate::format::ImageFormat;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;

pub struct FormatAction;

impl FormatAction {
    pub fn parse(params: &[&str]) -> Result<ImageFormat, ImageHandlerError> {
        let value = single_value(params, "Format param error, e.g: format,jpg   (jpg,png,webp)")?;
        match value {
            "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "webp" => Ok(ImageFormat::Webp),
            _ => Err(ImageHandlerError::invalid_argument(
                "Format must be one of 'jpg,png,webp'",
            )),
        }
    }
}

#[async_trait]
impl Action for FormatAction {
    fn name(&self) -> &'static str {
        "format"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        ctx.image.output_mut().format = Some(Self::parse(params)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::actions::test_support::context;

    #[test]
    fn test_accepts_three_formats() {
        assert_eq!(FormatAction::parse(&["format", "jpg"]).unwrap(), ImageFormat::Jpeg);
        assert_eq!(FormatAction::parse(&["format", "webp"]).unwrap(), ImageFormat::Webp);
        assert!(FormatAction::parse(&["format", "jpeg"]).is_err());
        assert!(FormatAction::parse(&["format", "gif"]).is_err());
        assert!(FormatAction::parse(&["format"]).is_err());
    }

    #[tokio::test]
    async fn test_sets_output_format() {
        let mut ctx = context(4, 4);
        FormatAction.process(&mut ctx, &["format", "png"]).await.unwrap();
        assert_eq!(ctx.image.output().format, Some(ImageFormat::Png));
        assert_eq!(ctx.image.encode().unwrap().format, ImageFormat::Png);
    }
}
