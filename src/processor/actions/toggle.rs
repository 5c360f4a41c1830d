//! On/off actions: `interlace`, `auto-orient`, `grey`

use super::{single_value, switch};
use crate::error::ImageHandlerError;
use crate::processor::{Action, ImageContext};
use async_trait::async_trait;

fn parse_switch(params: &[&str], usage: &str, message: &str) -> Result<bool, ImageHandlerError> {
    let value = single_value(params, usage)?;
    switch(value).ok_or_else(|| ImageHandlerError::invalid_argument(message))
}

/// Progressive output; recorded on the output settings
pub struct InterlaceAction;

impl InterlaceAction {
    fn parse(params: &[&str]) -> Result<bool, ImageHandlerError> {
        parse_switch(params, "Interlace param error, e.g: interlace,1", "Interlace must be 0 or 1")
    }
}

#[async_trait]
impl Action for InterlaceAction {
    fn name(&self) -> &'static str {
        "interlace"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        if Self::parse(params)? {
            ctx.image.output_mut().progressive = true;
        }
        Ok(())
    }
}

pub struct AutoOrientAction;

impl AutoOrientAction {
    fn parse(params: &[&str]) -> Result<bool, ImageHandlerError> {
        parse_switch(
            params,
            "Auto-orient param error, e.g: auto-orient,1",
            "Auto-orient param must be 0 or 1",
        )
    }
}

#[async_trait]
impl Action for AutoOrientAction {
    fn name(&self) -> &'static str {
        "auto-orient"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        if Self::parse(params)? {
            ctx.image.auto_orient();
        }
        Ok(())
    }
}

pub struct GreyAction;

impl GreyAction {
    fn parse(params: &[&str]) -> Result<bool, ImageHandlerError> {
        parse_switch(params, "Grey param error, e.g: grey,1", "Grey must be 0 or 1")
    }
}

#[async_trait]
impl Action for GreyAction {
    fn name(&self) -> &'static str {
        "grey"
    }

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError> {
        Self::parse(params).map(|_| ())
    }

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError> {
        if Self::parse(params)? {
            ctx.image.grayscale();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::actions::test_support::{context, pixel, solid};
    use rstest::rstest;

    #[rstest]
    #[case(&["interlace", "2"])]
    #[case(&["auto-orient"])]
    #[case(&["grey", "1", "0"])]
    #[case(&["grey", "yes"])]
    fn test_rejects(#[case] params: &[&str]) {
        let err = match params[0] {
            "interlace" => InterlaceAction.validate(params),
            "auto-orient" => AutoOrientAction.validate(params),
            _ => GreyAction.validate(params),
        }
        .unwrap_err();
        assert!(err.is_invalid_edit());
    }

    #[tokio::test]
    async fn test_interlace_sets_progressive() {
        let mut ctx = context(2, 2);
        InterlaceAction.process(&mut ctx, &["interlace", "0"]).await.unwrap();
        assert!(!ctx.image.output().progressive);
        InterlaceAction.process(&mut ctx, &["interlace", "1"]).await.unwrap();
        assert!(ctx.image.output().progressive);
    }

    #[tokio::test]
    async fn test_grey_removes_color() {
        let mut ctx = context(2, 2);
        ctx.image = solid(2, 2, [200, 40, 40, 255]);
        GreyAction.process(&mut ctx, &["grey", "1"]).await.unwrap();
        let [r, g, b, _] = pixel(&ctx, 0, 0);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }
}
