use crate::ipc::error::err;
use crate::ipc::types::Request;

/// Lookup keys are plain strings. An absent or null key reads as "", which
/// the store reports as not found instead of rejecting the request.
pub fn lookup_key<'a>(req: &'a Request, key: &str) -> Result<&'a str, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(""),
        Some(v) if v.is_null() => Ok(""),
        Some(v) => v.as_str().ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a string", key),
                None,
            )
        }),
    }
}

pub fn required_path(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

pub fn optional_path(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(_) => required_path(req, key).map(Some),
    }
}

pub fn optional_bool(req: &Request, key: &str, default: bool) -> Result<bool, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v.as_bool().ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a boolean", key),
                None,
            )
        }),
    }
}
