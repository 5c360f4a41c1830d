use super::{int_in_range, key_values};
use crate::error::ImageHandlerError;
use crate::format::ImageFormat;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityOpts {
    /// Relative quality
    pub q: Option<u8>,
    /// Absolute quality
    pub big_q: Option<u8>,
}

impl QualityOpts {
    pub fn quality(&self) -> Option<u8> {
        self.q.or(self.big_q)
    }
}

pub struct QualityAction;

impl QualityAction {
    pub fn parse(params: &[&str]) -> Result<QualityOpts, ImageHandlerError> {
        let mut opts = QualityOpts::default();
        for (key, value) in key_values(params) {
            let slot = match key {
                "q" => &mut opts.q,
                "Q" => &mut opts.big_q,
                _ => return Err(ImageHandlerError::unknown_param(key)),
            };
            let quality = int_in_range(value, 1, 100).ok_or_else(|| {
                ImageHandlerError::invalid_argument("Quality must be between 1 and 100")
            })?;
            *slot = Some(quality as u8);
        }
        Ok(opts)
    }
}

#[async_trait]
impl Action for QualityAction {
    fn name(&self) -> &'static str {
        "quality"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    /// Only lossy outputs carry a quality setting
    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        let opts = Self::parse(params)?;
        let format = ctx.image.output().format.or(ctx.image.metadata().format);
        if matches!(format, Some(ImageFormat::Jpeg | ImageFormat::Webp)) {
            ctx.image.output_mut().quality = opts.quality();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::actions::test_support::context;

    #[test]
    fn test_relative_quality_wins() {
        let opts = QualityAction::parse(&["quality", "Q_50", "q_70"]).unwrap();
        assert_eq!(opts.quality(), Some(70));
    }

    #[test]
    fn test_range() {
        assert!(QualityAction.validate(&["quality", "q_0"]).is_err());
        assert!(QualityAction.validate(&["quality", "Q_101"]).is_err());
        assert!(QualityAction.validate(&["quality", "z_10"]).is_err());
        assert!(QualityAction.validate(&["quality", "q_100"]).is_ok());
    }

    #[tokio::test]
    async fn test_applies_to_jpeg_output_only() {
        let mut ctx = context(4, 4);
        QualityAction.process(&mut ctx, &["quality", "q_30"]).await.unwrap();
        assert_eq!(ctx.image.output().quality, None);

        ctx.image.output_mut().format = Some(ImageFormat::Jpeg);
        QualityAction.process(&mut ctx, &["quality", "q_30"]).await.unwrap();
        assert_eq!(ctx.image.output().quality, Some(30));
    }
}
