use crate::utils::error::{EtlError, Result};
use crate::utils::logger::log_json_response;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_client() -> Result<Client> {
    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("ops-etl/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// 非 2xx 轉成 `ApiStatusError`，body 一併帶出
pub async fn ensure_success(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!("{} API error response ({}): {}", service, status, body);
    Err(EtlError::ApiStatusError {
        service: service.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Success body as JSON; an empty body becomes `Value::Null`.
pub async fn read_json(service: &str, context: &str, response: Response) -> Result<Value> {
    let response = ensure_success(service, response).await?;
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    let body: Value = serde_json::from_str(&text)?;
    log_json_response(context, &body);
    Ok(body)
}

/// JSON id 可能是數字或字串
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
