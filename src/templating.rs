//! Template rendering hook.
//!
//! vial ships no template language. Plug one in by implementing
//! [`TemplateEngine`] and registering it with
//! [`App::template_engine`](crate::App::template_engine); the framework's
//! only job is to hand the engine a context that already contains
//! `request`, `session` and `g` for the current request.

use serde_json::{Map, Value};

use crate::context::{REQUEST_STACK, RequestContext};
use crate::error::{Error, Result};

/// A template renderer.
pub trait TemplateEngine: Send + Sync {
    /// Renders the template registered under `name`.
    fn render(&self, name: &str, context: &Map<String, Value>) -> anyhow::Result<String>;

    /// Renders `source` directly.
    fn render_str(&self, source: &str, context: &Map<String, Value>) -> anyhow::Result<String>;
}

/// Variables every template sees.
pub(crate) fn default_context(ctx: &RequestContext) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert("request".to_owned(), ctx.request().template_value());
    context.insert(
        "session".to_owned(),
        ctx.session().map_or(Value::Null, |s| Value::Object(s.to_map())),
    );
    context.insert("g".to_owned(), Value::Object(ctx.globals().to_map()));
    context
}

/// Renders the named template with `context`, after the application's
/// context processors have added their variables.
pub fn render_template(name: &str, context: Map<String, Value>) -> Result<String> {
    render_with(context, |engine, context| engine.render(name, context))
}

/// Renders a template given as source text.
pub fn render_template_string(source: &str, context: Map<String, Value>) -> Result<String> {
    render_with(context, |engine, context| engine.render_str(source, context))
}

fn render_with(
    mut context: Map<String, Value>,
    render: impl FnOnce(&dyn TemplateEngine, &Map<String, Value>) -> anyhow::Result<String>,
) -> Result<String> {
    let ctx = REQUEST_STACK.top()?;
    let app = ctx.app();
    app.update_template_context(&ctx, &mut context);
    let engine = app.templates().ok_or(Error::NoTemplateEngine)?;
    render(engine, &context).map_err(Error::Template)
}
