//! Registered primitives bound to their handlers

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::template::{TemplateError, UriTemplate};
use crate::types::{Prompt, Resource, ResourceAddress, Tool};

/// Named arguments passed to a handler
pub type Arguments = Map<String, Value>;

pub type HandlerResult = anyhow::Result<Value>;

/// Callable behind a tool, resource or prompt.
///
/// Arguments arrive exactly as decoded from the request; any coercion is the
/// handler's business.
pub trait Handler: Send + Sync {
    fn call(&self, arguments: Arguments) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(Arguments) -> HandlerResult + Send + Sync,
{
    fn call(&self, arguments: Arguments) -> HandlerResult {
        self(arguments)
    }
}

/// Kind of primitive an item exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Tool,
    Resource,
    Prompt,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Tool, Category::Resource, Category::Prompt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tool => "tool",
            Category::Resource => "resource",
            Category::Prompt => "prompt",
        }
    }

    /// Capitalized form used in error messages
    pub fn title(&self) -> &'static str {
        match self {
            Category::Tool => "Tool",
            Category::Resource => "Resource",
            Category::Prompt => "Prompt",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor of an item
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Tool(Tool),
    Resource(Resource),
    Prompt(Prompt),
}

impl Primitive {
    pub fn name(&self) -> &str {
        match self {
            Primitive::Tool(tool) => &tool.name,
            Primitive::Resource(resource) => &resource.name,
            Primitive::Prompt(prompt) => &prompt.name,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Primitive::Tool(_) => Category::Tool,
            Primitive::Resource(_) => Category::Resource,
            Primitive::Prompt(_) => Category::Prompt,
        }
    }
}

impl From<Tool> for Primitive {
    fn from(tool: Tool) -> Self {
        Primitive::Tool(tool)
    }
}

impl From<Resource> for Primitive {
    fn from(resource: Resource) -> Self {
        Primitive::Resource(resource)
    }
}

impl From<Prompt> for Primitive {
    fn from(prompt: Prompt) -> Self {
        Primitive::Prompt(prompt)
    }
}

/// A primitive plus the handler that serves it.
///
/// Items run on the host's execution thread unless marked any-thread.
pub struct Item {
    primitive: Primitive,
    handler: Arc<dyn Handler>,
    main_thread_only: bool,
    template: Option<UriTemplate>,
}

impl Item {
    /// Bind a descriptor to its handler. Resource templates are compiled here.
    pub fn new(
        primitive: impl Into<Primitive>,
        handler: impl Handler + 'static,
    ) -> Result<Self, TemplateError> {
        let primitive = primitive.into();
        let template = match &primitive {
            Primitive::Resource(Resource {
                address: ResourceAddress::Template(raw),
                ..
            }) => Some(UriTemplate::parse(raw)?),
            _ => None,
        };

        Ok(Self {
            primitive,
            handler: Arc::new(handler),
            main_thread_only: true,
            template,
        })
    }

    pub fn tool(tool: Tool, handler: impl Handler + 'static) -> Self {
        Self {
            primitive: Primitive::Tool(tool),
            handler: Arc::new(handler),
            main_thread_only: true,
            template: None,
        }
    }

    pub fn resource(
        resource: Resource,
        handler: impl Handler + 'static,
    ) -> Result<Self, TemplateError> {
        Self::new(resource, handler)
    }

    pub fn prompt(prompt: Prompt, handler: impl Handler + 'static) -> Self {
        Self {
            primitive: Primitive::Prompt(prompt),
            handler: Arc::new(handler),
            main_thread_only: true,
            template: None,
        }
    }

    /// Allow the handler to run on any worker thread
    pub fn any_thread(mut self) -> Self {
        self.main_thread_only = false;
        self
    }

    pub fn with_main_thread_only(mut self, main_thread_only: bool) -> Self {
        self.main_thread_only = main_thread_only;
        self
    }

    pub fn name(&self) -> &str {
        self.primitive.name()
    }

    pub fn category(&self) -> Category {
        self.primitive.category()
    }

    pub fn primitive(&self) -> &Primitive {
        &self.primitive
    }

    pub fn main_thread_only(&self) -> bool {
        self.main_thread_only
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }

    pub fn as_tool(&self) -> Option<&Tool> {
        match &self.primitive {
            Primitive::Tool(tool) => Some(tool),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match &self.primitive {
            Primitive::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    pub fn as_prompt(&self) -> Option<&Prompt> {
        match &self.primitive {
            Primitive::Prompt(prompt) => Some(prompt),
            _ => None,
        }
    }

    /// Concrete URI of a resource item
    pub fn uri(&self) -> Option<&str> {
        self.as_resource().and_then(Resource::uri)
    }

    pub fn template(&self) -> Option<&UriTemplate> {
        self.template.as_ref()
    }

    /// Run the handler on the calling thread
    pub fn call(&self, arguments: Arguments) -> HandlerResult {
        self.handler.call(arguments)
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("category", &self.category())
            .field("name", &self.name())
            .field("main_thread_only", &self.main_thread_only)
            .field("template", &self.template.as_ref().map(UriTemplate::as_str))
            .finish()
    }
}
