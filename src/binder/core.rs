use crate::app::AppHandle;
use crate::context::{RequestContext, Unit};
use crate::dispatcher::ResponseSink;
use crate::router::ParamVec;
use serde_json::Value;
use std::sync::Arc;

/// Framework objects a handler can ask for by parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserved {
    /// The framework instance (`app`, or its alias `self`)
    App,
    /// The decoded request (`request`)
    Request,
    /// The response sink for status and headers (`response`)
    Response,
    /// The request's execution unit in the context store (`context`)
    Context,
}

impl Reserved {
    /// Map a declared parameter name to a reserved object, if it is a keyword.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "app" | "self" => Some(Self::App),
            "request" => Some(Self::Request),
            "response" => Some(Self::Response),
            "context" => Some(Self::Context),
            _ => None,
        }
    }
}

/// A parameter declared by a handler at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: Arc<str>,
    pub default: Option<Value>,
}

impl ParamDecl {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(name: &str, default: Value) -> Self {
        Self {
            name: Arc::from(name),
            default: Some(default),
        }
    }
}

/// The objects the dispatcher offers for reserved parameter names.
#[derive(Debug, Clone)]
pub struct ReservedObjects {
    pub app: AppHandle,
    pub request: Arc<RequestContext>,
    pub response: ResponseSink,
    pub context: Unit,
}

impl ReservedObjects {
    fn object(&self, reserved: Reserved) -> Arg {
        match reserved {
            Reserved::App => Arg::App(self.app.clone()),
            Reserved::Request => Arg::Request(Arc::clone(&self.request)),
            Reserved::Response => Arg::Response(self.response.clone()),
            Reserved::Context => Arg::Context(self.context.clone()),
        }
    }
}

/// One bound handler argument.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Captured from the request path
    Captured(String),
    App(AppHandle),
    Request(Arc<RequestContext>),
    Response(ResponseSink),
    Context(Unit),
    /// The declared default value
    Default(Value),
    /// Nothing matched and no default was declared
    Absent,
}

impl Arg {
    /// Textual view of a captured value or a string default.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Captured(s) => Some(s.as_str()),
            Arg::Default(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// JSON view of the argument; captured strings become `Value::String`.
    #[must_use]
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Arg::Captured(s) => Some(Value::String(s.clone())),
            Arg::Default(v) => Some(v.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Arg::Absent)
    }
}

/// Ordered handler arguments, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Args {
    names: Vec<Arc<str>>,
    values: Vec<Arg>,
}

impl Args {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument at a declaration position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.values.get(index)
    }

    /// Argument bound to a declared name.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&Arg> {
        self.names
            .iter()
            .position(|n| n.as_ref() == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Shorthand for `named(name).and_then(Arg::as_str)`.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.named(name).and_then(Arg::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.names.iter().map(|n| n.as_ref()).zip(self.values.iter())
    }

    /// First argument bound to the framework instance.
    #[must_use]
    pub fn app(&self) -> Option<&AppHandle> {
        self.values.iter().find_map(|a| match a {
            Arg::App(app) => Some(app),
            _ => None,
        })
    }

    #[must_use]
    pub fn request(&self) -> Option<&Arc<RequestContext>> {
        self.values.iter().find_map(|a| match a {
            Arg::Request(req) => Some(req),
            _ => None,
        })
    }

    #[must_use]
    pub fn response(&self) -> Option<&ResponseSink> {
        self.values.iter().find_map(|a| match a {
            Arg::Response(sink) => Some(sink),
            _ => None,
        })
    }

    #[must_use]
    pub fn context(&self) -> Option<&Unit> {
        self.values.iter().find_map(|a| match a {
            Arg::Context(unit) => Some(unit),
            _ => None,
        })
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Arg> {
        self.values
    }
}

#[derive(Debug, Clone)]
struct Slot {
    decl: ParamDecl,
    /// The route defines a placeholder with this name
    captured: bool,
    reserved: Option<Reserved>,
}

/// Parameter descriptors resolved once against a route's placeholder names.
#[derive(Debug, Clone, Default)]
pub struct BindingPlan {
    slots: Vec<Slot>,
}

impl BindingPlan {
    /// Resolve declarations against the placeholder names a route can capture.
    #[must_use]
    pub fn resolve(decls: Vec<ParamDecl>, placeholders: &[Arc<str>]) -> Self {
        let slots = decls
            .into_iter()
            .map(|decl| Slot {
                captured: placeholders.iter().any(|p| *p == decl.name),
                reserved: Reserved::from_name(&decl.name),
                decl,
            })
            .collect();
        Self { slots }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.decl.name.as_ref())
    }

    /// Bind one request's captures and framework objects.
    ///
    /// A placeholder that did not participate in the match (an optional group of a
    /// raw pattern) falls through to the next precedence level.
    #[must_use]
    pub fn bind(&self, captures: &ParamVec, reserved: &ReservedObjects) -> Args {
        let mut names = Vec::with_capacity(self.slots.len());
        let mut values = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let captured = if slot.captured {
                lookup(captures, &slot.decl.name)
            } else {
                None
            };
            names.push(Arc::clone(&slot.decl.name));
            values.push(resolve(captured, slot.reserved, &slot.decl, reserved));
        }
        Args { names, values }
    }
}

/// Bind declared parameters without a precomputed plan.
///
/// Same precedence as [`BindingPlan::bind`]: captures, reserved objects, declared
/// default, absent.
#[must_use]
pub fn bind(decls: &[ParamDecl], captures: &ParamVec, reserved: &ReservedObjects) -> Args {
    let mut names = Vec::with_capacity(decls.len());
    let mut values = Vec::with_capacity(decls.len());
    for decl in decls {
        let captured = lookup(captures, &decl.name);
        names.push(Arc::clone(&decl.name));
        values.push(resolve(
            captured,
            Reserved::from_name(&decl.name),
            decl,
            reserved,
        ));
    }
    Args { names, values }
}

fn lookup(captures: &ParamVec, name: &str) -> Option<String> {
    captures
        .iter()
        .rfind(|(k, _)| k.as_ref() == name)
        .map(|(_, v)| v.clone())
}

fn resolve(
    captured: Option<String>,
    keyword: Option<Reserved>,
    decl: &ParamDecl,
    reserved: &ReservedObjects,
) -> Arg {
    if let Some(value) = captured {
        return Arg::Captured(value);
    }
    if let Some(keyword) = keyword {
        return reserved.object(keyword);
    }
    match &decl.default {
        Some(default) => Arg::Default(default.clone()),
        None => Arg::Absent,
    }
}
