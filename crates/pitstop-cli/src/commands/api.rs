//! Authenticated API calls through the request gateway.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::{Context as _, Result};
use serde::Serialize;
use session_engine::{ApiRequest, Method};

#[derive(Serialize)]
struct CallResult {
    status: u16,
    body: serde_json::Value,
}

impl std::fmt::Display for CallResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "HTTP {}", self.status)?;
        match &self.body {
            serde_json::Value::String(text) => write!(f, "{}", text),
            value => match serde_json::to_string_pretty(value) {
                Ok(pretty) => write!(f, "{}", pretty),
                Err(_) => write!(f, "{}", value),
            },
        }
    }
}

fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {raw}"))
}

/// Send one request with the stored session attached.
pub async fn call(
    ctx: &Context,
    method: &str,
    path: &str,
    body: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let mut request = ApiRequest::new(parse_method(method)?, path);
    if let Some(raw) = body {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("request body is not valid JSON")?;
        request = request.with_body(value);
    }

    ctx.session.hydrate().await;

    match ctx.gateway.send(&request).await {
        Ok(response) => {
            let body = serde_json::from_str(&response.body)
                .unwrap_or(serde_json::Value::String(response.body.clone()));
            output::print(
                &CallResult {
                    status: response.status,
                    body,
                },
                format,
            );
        }
        Err(e) => output::print_error(e.user_message(), format),
    }

    Ok(())
}
