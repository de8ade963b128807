//! The endpoint table: which HTTP request each `resource/action` pair is.

use reqwest::Method;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// A fully resolved request, relative to the API root.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
  pub method: Method,
  pub path:   String,
  pub query:  Vec<(String, String)>,
  pub body:   Option<Value>,
}

/// `(resource, action, method, path template)`. `:name` segments are filled
/// from, and removed from, the call parameters.
static ENDPOINTS: &[(&str, &str, Method, &str)] = &[
  ("people", "show", Method::GET, "/people/:id"),
  ("people", "match", Method::GET, "/people/match"),
  ("people", "create", Method::POST, "/people"),
  ("people", "update", Method::PUT, "/people/:id"),
  ("sites", "index", Method::GET, "/sites"),
  ("events", "index", Method::GET, "/sites/:site_slug/pages/events"),
  ("events", "rsvps", Method::GET, "/sites/:site_slug/pages/events/:id/rsvps"),
  ("events", "rsvp_create", Method::POST, "/sites/:site_slug/pages/events/:id/rsvps"),
  ("events", "rsvp_update", Method::PUT, "/sites/:site_slug/pages/events/:id/rsvps/:rsvp_id"),
  ("lists", "index", Method::GET, "/lists"),
  ("lists", "create", Method::POST, "/lists"),
  ("lists", "add_people", Method::POST, "/lists/:list_id/people"),
  ("lists", "add_tag", Method::POST, "/lists/:list_id/tag/:tag"),
  ("tags", "people", Method::GET, "/tags/:tag/people"),
];

/// Parameters that always travel in the query string.
const QUERY_ONLY: &[&str] = &["fire_webhooks"];

/// Resolve a call onto its request. GET parameters go in the query string;
/// for other methods they form the JSON body.
pub fn route(resource: &str, action: &str, params: Value) -> Result<Route> {
  let (_, _, method, template) = ENDPOINTS
    .iter()
    .find(|(r, a, ..)| *r == resource && *a == action)
    .ok_or_else(|| Error::UnknownEndpoint {
      resource: resource.to_owned(),
      action:   action.to_owned(),
    })?;

  let mut params = match params {
    Value::Object(map) => map,
    Value::Null => Map::new(),
    other => Map::from_iter([("data".to_string(), other)]),
  };

  let mut segments = Vec::new();
  for segment in template.split('/').skip(1) {
    match segment.strip_prefix(':') {
      Some(name) => {
        let value = params
          .remove(name)
          .and_then(|v| scalar(&v))
          .ok_or_else(|| Error::MissingParam {
            endpoint: format!("{resource}/{action}"),
            param:    name.to_owned(),
          })?;
        segments.push(value);
      }
      None => segments.push(segment.to_owned()),
    }
  }
  let path = format!("/{}", segments.join("/"));

  let mut query: Vec<(String, String)> = QUERY_ONLY
    .iter()
    .filter_map(|k| params.remove(*k).and_then(|v| scalar(&v)).map(|v| (k.to_string(), v)))
    .collect();

  let method = method.clone();
  let body = if method == Method::GET {
    query.extend(params.into_iter().filter_map(|(k, v)| scalar(&v).map(|v| (k, v))));
    None
  } else {
    Some(Value::Object(params))
  };

  Ok(Route { method, path, query, body })
}

/// Render a scalar for a path segment or query value.
fn scalar(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}
