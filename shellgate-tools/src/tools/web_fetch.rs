use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use crate::tools::truncate_chars;
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

const NAME: &str = "fetch_url";
const USER_AGENT: &str = concat!("shellgate/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "text/html,application/json,application/xml,*/*";
const RETRIES: u32 = 2;
const DEFAULT_MAX_CHARS: usize = 10_000;

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        NAME,
        "Fetch content from a URL. Supports GET/POST, custom headers, JSON parsing, and HTML-to-text extraction.",
    )
    .arg(ToolArgument::required("url", ArgKind::String, "The URL to fetch"))
    .arg(
        ToolArgument::optional("method", ArgKind::String, "HTTP method: GET, POST, PUT, DELETE (default: GET)")
            .with_default(json!("GET"))
            .one_of(&["GET", "POST", "PUT", "DELETE"]),
    )
    .arg(ToolArgument::optional(
        "headers",
        ArgKind::Object,
        "Custom headers as key-value pairs",
    ))
    .arg(ToolArgument::optional(
        "body",
        ArgKind::String,
        "Request body for POST/PUT requests",
    ))
    .arg(
        ToolArgument::optional("parse_json", ArgKind::Boolean, "Parse response as JSON (default: false)")
            .with_default(json!(false)),
    )
    .arg(
        ToolArgument::optional("extract_text", ArgKind::Boolean, "Strip HTML tags from the response (default: false)")
            .with_default(json!(false)),
    )
    .arg(
        ToolArgument::optional("max_chars", ArgKind::Integer, "Maximum characters to return (default: 10000)")
            .with_default(json!(DEFAULT_MAX_CHARS)),
    )
}

#[derive(Deserialize)]
struct FetchInput {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    body: Option<String>,
    #[serde(default)]
    parse_json: bool,
    #[serde(default)]
    extract_text: bool,
    #[serde(default = "default_max_chars")]
    max_chars: usize,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

pub struct WebFetchTool {
    client: Client,
}

impl WebFetchTool {
    pub fn new(timeout: Duration) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ToolError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn fetch(&self, input: &FetchInput) -> Result<Value, ToolError> {
        let method = Method::from_bytes(input.method.to_uppercase().as_bytes())
            .map_err(|_| ToolError::Validation(format!("Unsupported method: {}", input.method)))?;

        let mut last_error = String::new();
        for attempt in 0..=RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
            }

            match self.send_once(method.clone(), input).await {
                Ok(value) => return Ok(value),
                Err(Attempt::Fatal(message)) => return Err(ToolError::ExecutionFailed(message)),
                Err(Attempt::Retryable(message)) => {
                    warn!(url = %input.url, attempt, "Fetch failed: {}", message);
                    last_error = message;
                }
            }
        }

        Err(ToolError::ExecutionFailed(last_error))
    }

    async fn send_once(&self, method: Method, input: &FetchInput) -> Result<Value, Attempt> {
        let mut request = self
            .client
            .request(method, &input.url)
            .header(reqwest::header::ACCEPT, ACCEPT);

        let has_content_type = input
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"));
        if input.body.is_some() && !has_content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, "application/json");
        }
        for (key, value) in &input.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &input.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_builder() {
                Attempt::Fatal(format!("Invalid request: {}", e))
            } else {
                Attempt::Retryable(format!("Connection failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = http_error(status);
            return Err(if status.is_server_error() {
                Attempt::Retryable(message)
            } else {
                Attempt::Fatal(message)
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Attempt::Retryable(format!("Failed to read response body: {}", e)))?;
        let content = String::from_utf8_lossy(&bytes).to_string();
        debug!(url = %input.url, status = status.as_u16(), bytes = bytes.len(), "Fetched");

        Ok(shape_response(input, status, &content_type, content))
    }
}

enum Attempt {
    Retryable(String),
    Fatal(String),
}

fn http_error(status: StatusCode) -> String {
    format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

fn shape_response(input: &FetchInput, status: StatusCode, content_type: &str, content: String) -> Value {
    if input.parse_json || content_type.contains("application/json") {
        if let Ok(parsed) = serde_json::from_str::<Value>(&content) {
            let compact = parsed.to_string();
            let data = if compact.chars().count() < input.max_chars {
                parsed
            } else {
                let pretty = serde_json::to_string_pretty(&parsed).unwrap_or(compact);
                let (mut cut, _) = truncate_chars(&pretty, input.max_chars);
                cut.push_str("\n... [truncated]");
                Value::String(cut)
            };
            return json!({
                "url": input.url,
                "status": status.as_u16(),
                "content_type": "json",
                "data": data,
            });
        }
    }

    let text = if input.extract_text || content_type.contains("text/html") {
        html_to_text(&content)
    } else {
        content
    };

    let (mut text, truncated) = truncate_chars(&text, input.max_chars);
    if truncated {
        text.push_str("\n... [truncated]");
    }

    json!({
        "url": input.url,
        "status": status.as_u16(),
        "content_type": "text",
        "content": text,
        "truncated": truncated,
    })
}

/// Drops script and style bodies, strips remaining tags and collapses
/// whitespace.
pub(crate) fn html_to_text(html: &str) -> String {
    static SKIPPED: OnceLock<Option<Regex>> = OnceLock::new();
    static TAGS: OnceLock<Option<Regex>> = OnceLock::new();
    static SPACES: OnceLock<Option<Regex>> = OnceLock::new();

    let skipped = SKIPPED.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|head|noscript)\b.*?</(script|style|head|noscript)\s*>").ok()
    });
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").ok());
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").ok());

    let mut text = html.to_string();
    if let Some(re) = skipped {
        text = re.replace_all(&text, " ").into_owned();
    }
    if let Some(re) = tags {
        text = re.replace_all(&text, " ").into_owned();
    }
    if let Some(re) = spaces {
        text = re.replace_all(&text, " ").into_owned();
    }
    text.trim().to_string()
}

#[async_trait]
impl ToolHandler for WebFetchTool {
    async fn run(
        &self,
        _ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let input: FetchInput = parse_args(args)?;
        let outcome = self.fetch(&input).await;
        Ok(ToolResult::from_outcome(NAME, outcome))
    }
}
