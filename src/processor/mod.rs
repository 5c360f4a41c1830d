//! Named action pipeline
//!
//! An action string such as `image/resize,w_100,h_100/quality,q_80` is a
//! `/`-separated list whose first entry names a [`Processor`] and whose
//! remaining entries are `name,key_value,...` action tokens.
//!
//! # Processors
//!
//! - `image` runs registered [`Action`]s in order against an [`ImageContext`]
//! - `style` looks up a stored action string by name and runs it through
//!   the image processor
//!
//! # Validation
//!
//! Every token in a chain is validated before the first one touches the
//! image, so a bad parameter anywhere fails the request without partial
//! work.

pub mod actions;

use crate::engine::{EngineImage, ImageEngine};
use crate::error::ImageHandlerError;
use crate::store::{BufferStore, StyleStore};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Query parameter carrying the action string
pub const PROCESS_QUERY_PARAM: &str = "x-oss-process";

/// Per-request state shared by the actions of one chain
pub struct ImageContext {
    pub image: Box<dyn EngineImage>,
    pub engine: Arc<dyn ImageEngine>,
    /// Source of image watermarks
    pub buffers: Arc<dyn BufferStore>,
}

impl ImageContext {
    pub fn new(
        image: Box<dyn EngineImage>,
        engine: Arc<dyn ImageEngine>,
        buffers: Arc<dyn BufferStore>,
    ) -> Self {
        Self {
            image,
            engine,
            buffers,
        }
    }
}

/// A named, independently validated image operation
///
/// `params` is the whole comma-split token, action name included.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, params: &[&str]) -> Result<(), ImageHandlerError>;

    async fn process(&self, ctx: &mut ImageContext, params: &[&str]) -> Result<(), ImageHandlerError>;
}

/// Actions by name; read-only once built
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<&'static str, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the full action catalogue
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for action in actions::catalogue() {
            registry.register(action);
        }
        registry
    }

    /// Register an action; the first registration of a name wins
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.entry(action.name()).or_insert(action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.actions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, ctx: &mut ImageContext, actions: &[String]) -> Result<(), ImageHandlerError>;
}

pub struct ImageProcessor {
    registry: Arc<ActionRegistry>,
}

impl ImageProcessor {
    pub const NAME: &'static str = "image";

    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self { registry }
    }

    fn resolve<'a>(
        &self,
        actions: &'a [String],
    ) -> Result<Vec<(Arc<dyn Action>, Vec<&'a str>)>, ImageHandlerError> {
        actions
            .iter()
            .filter(|token| !token.is_empty() && token.as_str() != Self::NAME)
            .map(|token| {
                let params: Vec<&str> = token.split(',').collect();
                let name = params[0];
                let action = self
                    .registry
                    .get(name)
                    .ok_or_else(|| ImageHandlerError::UnknownAction {
                        name: name.to_string(),
                    })?;
                action.validate(&params)?;
                Ok((action, params))
            })
            .collect()
    }
}

#[async_trait]
impl Processor for ImageProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn process(&self, ctx: &mut ImageContext, actions: &[String]) -> Result<(), ImageHandlerError> {
        let chain = self.resolve(actions)?;
        for (action, params) in chain {
            tracing::debug!(action = action.name(), params = ?params, "Applying action");
            action.process(ctx, &params).await?;
        }
        Ok(())
    }
}

static STYLE_NAME: OnceLock<Regex> = OnceLock::new();

fn style_name_regex() -> &'static Regex {
    STYLE_NAME.get_or_init(|| {
        Regex::new(r"^[\w\-.]{1,63}$").expect("Invalid style name regex - this is a compile-time bug")
    })
}

pub fn is_valid_style_name(name: &str) -> bool {
    style_name_regex().is_match(name)
}

/// Expands a stored style into its action string
pub struct StyleProcessor {
    styles: Arc<dyn StyleStore>,
    image: Arc<ImageProcessor>,
}

impl StyleProcessor {
    pub const NAME: &'static str = "style";

    pub fn new(styles: Arc<dyn StyleStore>, image: Arc<ImageProcessor>) -> Self {
        Self { styles, image }
    }
}

#[async_trait]
impl Processor for StyleProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn process(&self, ctx: &mut ImageContext, actions: &[String]) -> Result<(), ImageHandlerError> {
        let name = match actions {
            [_, name] => name.as_str(),
            _ => {
                return Err(ImageHandlerError::InvalidStyleName {
                    name: actions.get(1..).map(|a| a.join("/")).unwrap_or_default(),
                })
            }
        };
        if !is_valid_style_name(name) {
            return Err(ImageHandlerError::InvalidStyleName {
                name: name.to_string(),
            });
        }

        let record = self.styles.get_style(name).await?;
        let style = match record.as_ref().and_then(|r| r.get("style")) {
            Some(Value::String(style)) if !style.is_empty() => style,
            _ => {
                return Err(ImageHandlerError::StyleNotFound {
                    name: name.to_string(),
                })
            }
        };

        tracing::debug!(style = %name, actions = %style, "Expanding style");
        let expanded: Vec<String> = style
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.image.process(ctx, &expanded).await
    }
}

/// Top-level processors by name
pub struct ProcessorMap {
    processors: HashMap<&'static str, Arc<dyn Processor>>,
}

impl ProcessorMap {
    pub fn new(registry: Arc<ActionRegistry>, styles: Arc<dyn StyleStore>) -> Self {
        let image = Arc::new(ImageProcessor::new(registry));
        let style = Arc::new(StyleProcessor::new(styles, image.clone()));

        let mut processors: HashMap<&'static str, Arc<dyn Processor>> = HashMap::new();
        processors.insert(image.name(), image);
        processors.insert(style.name(), style);
        Self { processors }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Processor>, ImageHandlerError> {
        self.processors
            .get(name)
            .cloned()
            .ok_or_else(|| ImageHandlerError::UnknownAction {
                name: name.to_string(),
            })
    }

    /// Run a parsed action list; lists with no actions beyond the
    /// processor name leave the image untouched
    pub async fn run(&self, ctx: &mut ImageContext, actions: &[String]) -> Result<(), ImageHandlerError> {
        let Some(first) = actions.first() else {
            return Ok(());
        };
        let processor = self.get(first)?;
        if actions.len() < 2 {
            return Ok(());
        }
        processor.process(ctx, actions).await
    }
}

/// Object key plus action list extracted from a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub uri: String,
    pub actions: Vec<String>,
}

impl ProcessRequest {
    pub fn has_actions(&self) -> bool {
        self.actions.len() > 1
    }
}

/// Split a request into object key and actions
///
/// `key!style` and `key@!style` select a stored style; otherwise the
/// actions come from the `x-oss-process` query parameter.
pub fn parse_request(
    path: &str,
    query: &HashMap<String, String>,
) -> Result<ProcessRequest, ImageHandlerError> {
    let uri = path.strip_prefix('/').unwrap_or(path);

    let Some(bang) = uri.find('!') else {
        let actions = query
            .get(PROCESS_QUERY_PARAM)
            .map(|value| {
                value
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        return Ok(ProcessRequest {
            uri: uri.to_string(),
            actions,
        });
    };

    let key = &uri[..bang];
    let key = key.strip_suffix('@').unwrap_or(key);
    let rest = &uri[bang + 1..];
    let style = rest.split('!').next().unwrap_or_default().trim();
    if style.is_empty() {
        return Err(ImageHandlerError::InvalidStyleName {
            name: String::new(),
        });
    }

    Ok(ProcessRequest {
        uri: key.to_string(),
        actions: vec![StyleProcessor::NAME.to_string(), style.to_string()],
    })
}
