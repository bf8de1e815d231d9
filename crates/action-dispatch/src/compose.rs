//! # Composition
//!
//! Helpers for building replies out of several actions.
//!
//! [`resolve_context`] fills a JSON context from actions. The context may carry a
//! `$resolve` object mapping dotted paths to action messages; every action runs
//! concurrently and its result is written at its path:
//!
//! ```text
//! { "title": "Users",                       { "title": "Users",
//!   "$resolve": {                             "users": { "first": {...} } }
//!     "users.first": "role:users,cmd:get,id:1"
//!   } }                               ──▶
//! ```
//!
//! [`render_act_template`] turns a pattern template such as
//! `"role:users,cmd:get,id:{params.id}"` into a concrete pattern string using the
//! fields of a [`RequestMeta`]; [`render_act_message`] renders the same template
//! directly into a message.

use crate::error::{DispatchError, Result};
use crate::message::{parse_scalar, scalar_text, IntoMessage, Message, RequestMeta};
use crate::transport::ActionTransport;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::debug;

/// Key of the action table inside a context.
pub const RESOLVE_KEY: &str = "$resolve";

/// Runs the actions listed under `$resolve` and writes their results into the
/// context. The first failing action fails the whole context.
pub async fn resolve_context<T>(transport: &T, context: Value) -> Result<Value>
where
    T: ActionTransport + ?Sized,
{
    let Value::Object(mut context) = context else {
        return Err(DispatchError::InvalidPattern(
            "context must be a JSON object".into(),
        ));
    };

    let actions = match context.remove(RESOLVE_KEY) {
        None => return Ok(Value::Object(context)),
        Some(Value::Object(actions)) => actions,
        Some(other) => {
            return Err(DispatchError::InvalidPattern(format!(
                "{RESOLVE_KEY} must be an object, got {other}"
            )))
        }
    };

    let pending = actions.into_iter().map(|(path, action)| async move {
        let message = action.into_message()?;
        debug!(%path, %message, "Resolving context entry");
        let value = transport.act(message).await?;
        Ok::<_, DispatchError>((path, value))
    });
    let resolved = try_join_all(pending).await?;

    for (path, value) in resolved {
        set_path(&mut context, &path, value)?;
    }
    Ok(Value::Object(context))
}

fn set_path(root: &mut Map<String, Value>, path: &str, value: Value) -> Result<()> {
    let mut segments = path.split('.').peekable();
    let mut node = root;
    while let Some(segment) = segments.next() {
        if segment.is_empty() {
            return Err(DispatchError::InvalidPattern(format!(
                "empty segment in path '{path}'"
            )));
        }
        if segments.peek().is_none() {
            node.insert(segment.to_string(), value);
            return Ok(());
        }
        let child = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        node = match child {
            Value::Object(map) => map,
            _ => {
                return Err(DispatchError::InvalidPattern(format!(
                    "'{segment}' in path '{path}' is not an object"
                )))
            }
        };
    }
    Ok(())
}

/// Interpolates `{params.x}`, `{query.x}` and `{payload.x}` placeholders.
///
/// `payload` lookups may be dotted (`{payload.user.name}`) and must land on a
/// scalar. A placeholder with no value is an [`DispatchError::InvalidPattern`],
/// and so is a value containing `,` or `:`, which would change the fields of the
/// rendered pattern. Use [`render_act_message`] to accept such values.
pub fn render_act_template(template: &str, request: &RequestMeta) -> Result<String> {
    interpolate(template, request, |placeholder, value| {
        if value.contains([',', ':']) {
            return Err(DispatchError::InvalidPattern(format!(
                "value for {{{placeholder}}} contains a pattern separator: '{value}'"
            )));
        }
        Ok(())
    })
}

/// Renders a template straight into a [`Message`], one field at a time.
///
/// The template's own `key:value` structure is split first and placeholders are
/// filled inside each value, so request data can only ever set the value it
/// stands in for. Rendered values are typed like [`Message::parse`] types them.
pub fn render_act_message(template: &str, request: &RequestMeta) -> Result<Message> {
    let mut message = Message::new();
    for segment in template.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (key, value) = segment.split_once(':').ok_or_else(|| {
            DispatchError::InvalidPattern(format!("expected key:value, got '{segment}'"))
        })?;
        let key = key.trim();
        if key.is_empty() || key.contains('{') {
            return Err(DispatchError::InvalidPattern(format!(
                "template key must be literal, got '{key}'"
            )));
        }
        let rendered = interpolate(value.trim(), request, |_, _| Ok(()))?;
        message.insert(key, parse_scalar(&rendered));
    }
    Ok(message)
}

fn interpolate<F>(template: &str, request: &RequestMeta, check: F) -> Result<String>
where
    F: Fn(&str, &str) -> Result<()>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            DispatchError::InvalidPattern(format!("unclosed placeholder in '{template}'"))
        })?;
        let placeholder = after[..end].trim();
        let value = lookup(placeholder, request)?;
        check(placeholder, &value)?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn lookup(placeholder: &str, request: &RequestMeta) -> Result<String> {
    let missing = || DispatchError::InvalidPattern(format!("no value for {{{placeholder}}}"));
    let (source, name) = placeholder.split_once('.').ok_or_else(missing)?;
    match source {
        "params" => request.params.get(name).cloned().ok_or_else(missing),
        "query" => request.query.get(name).cloned().ok_or_else(missing),
        "payload" => {
            let mut value = &request.payload;
            for segment in name.split('.') {
                value = value.get(segment).ok_or_else(missing)?;
            }
            scalar_text(value).ok_or_else(missing)
        }
        _ => Err(DispatchError::InvalidPattern(format!(
            "unknown placeholder source '{source}' in {{{placeholder}}}"
        ))),
    }
}
