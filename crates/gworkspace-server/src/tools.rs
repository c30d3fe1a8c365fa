//! Tool definitions and handlers.
//!
//! Every handler that talks to Google goes through [`GoogleApiClient`], so
//! the bearer-token gate runs on each call. Handler errors are returned to the
//! caller as a tool result with `isError` set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use gworkspace_auth::{
    AccessTokenGate, AuthError, CALENDAR_API_BASE, GoogleApiClient, HttpTimeouts, OAuthManager,
    TASKS_API_BASE,
};

const DEFAULT_MAX_RESULTS: u32 = 100;

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: &'static str,
    pub text: String,
}

impl CallToolResult {
    /// A successful result carrying pretty-printed JSON.
    pub fn json(value: &Value) -> Self {
        Self {
            content: vec![ToolContent {
                content_type: "text",
                text: serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            }],
            is_error: false,
        }
    }

    /// An error result with `{"error": message}` text.
    pub fn error(message: impl Into<String>) -> Self {
        let body = json!({ "error": message.into() });
        Self {
            is_error: true,
            ..Self::json(&body)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListArgs {
    #[serde(default)]
    max_results: Option<u32>,
}

/// The tool table and the clients its handlers use.
#[derive(Debug, Clone)]
pub struct Toolbox {
    manager: Arc<OAuthManager>,
    api: GoogleApiClient,
    calendar_base: String,
    tasks_base: String,
}

impl Toolbox {
    pub fn new(manager: Arc<OAuthManager>, timeouts: HttpTimeouts) -> Result<Self, AuthError> {
        let api = GoogleApiClient::new(AccessTokenGate::new(Arc::clone(&manager)), timeouts)?;
        Ok(Self {
            manager,
            api,
            calendar_base: CALENDAR_API_BASE.to_string(),
            tasks_base: TASKS_API_BASE.to_string(),
        })
    }

    /// Points the Calendar and Tasks handlers at other base URLs.
    pub fn with_api_bases(mut self, calendar: impl Into<String>, tasks: impl Into<String>) -> Self {
        self.calendar_base = calendar.into();
        self.tasks_base = tasks.into();
        self
    }

    /// Tools advertised by `tools/list`.
    pub fn definitions(&self) -> Vec<Tool> {
        let list_schema = json!({
            "type": "object",
            "properties": {
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of entries to return (default 100)"
                }
            },
            "required": []
        });

        vec![
            Tool {
                name: "get_auth_status",
                description: "Report whether a Google OAuth token is stored and usable",
                input_schema: json!({"type": "object", "properties": {}, "required": []}),
            },
            Tool {
                name: "list_calendars",
                description: "List the calendars in the user's calendar list",
                input_schema: list_schema.clone(),
            },
            Tool {
                name: "list_task_lists",
                description: "List the user's Google Tasks lists",
                input_schema: list_schema,
            },
        ]
    }

    /// Dispatches a tool call.
    pub async fn call(&self, request: CallToolRequest) -> CallToolResult {
        debug!(tool = %request.name, "tool call");
        let args = request.arguments.unwrap_or(Value::Null);

        let result = match request.name.as_str() {
            "get_auth_status" => self.get_auth_status().await,
            "list_calendars" => self.list_calendars(parse_args(args)).await,
            "list_task_lists" => self.list_task_lists(parse_args(args)).await,
            other => return CallToolResult::error(format!("Unknown tool: {}", other)),
        };

        match result {
            Ok(value) => CallToolResult::json(&value),
            Err(e) => {
                warn!(tool = %request.name, error = %e, "tool failed");
                CallToolResult::error(e.user_message())
            }
        }
    }

    async fn get_auth_status(&self) -> Result<Value, AuthError> {
        let (status, stored) = self.manager.get_status().await?;
        let mut body = json!({
            "status": status.as_str(),
            "service": self.manager.service_name(),
            "token_path": self.manager.token_path().display().to_string(),
        });
        if let Some(stored) = stored {
            body["expires_at"] = json!(stored.token.expires_at);
            body["scopes"] = json!(stored.token.scopes);
            body["has_refresh_token"] = json!(stored.token.refresh_token.is_some());
            body["last_refreshed"] = json!(stored.metadata.last_refreshed);
        }
        Ok(body)
    }

    async fn list_calendars(&self, args: ListArgs) -> Result<Value, AuthError> {
        let url = format!("{}/users/me/calendarList", self.calendar_base);
        let max = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        let body = self.api.get_json(&url, &[("maxResults", max.to_string())]).await?;

        let calendars: Vec<Value> = items(&body)
            .map(|item| {
                json!({
                    "id": item.get("id"),
                    "summary": item.get("summary"),
                    "primary": item.get("primary").and_then(Value::as_bool).unwrap_or(false),
                    "access_role": item.get("accessRole"),
                })
            })
            .collect();
        Ok(json!({ "count": calendars.len(), "calendars": calendars }))
    }

    async fn list_task_lists(&self, args: ListArgs) -> Result<Value, AuthError> {
        let url = format!("{}/users/@me/lists", self.tasks_base);
        let max = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        let body = self.api.get_json(&url, &[("maxResults", max.to_string())]).await?;

        let lists: Vec<Value> = items(&body)
            .map(|item| {
                json!({
                    "id": item.get("id"),
                    "title": item.get("title"),
                    "updated": item.get("updated"),
                })
            })
            .collect();
        Ok(json!({ "count": lists.len(), "task_lists": lists }))
    }
}

fn parse_args(args: Value) -> ListArgs {
    if args.is_null() {
        return ListArgs::default();
    }
    serde_json::from_value(args).unwrap_or_default()
}

fn items(body: &Value) -> impl Iterator<Item = &Value> {
    body.get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use gworkspace_auth::{
        DEFAULT_SERVICE_NAME, LoopbackFlow, OAuthCredentials, OAuthToken, TokenMetadata,
        TokenStorage,
    };
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn toolbox(tmp: &TempDir) -> Toolbox {
        let storage = Arc::new(TokenStorage::new(tmp.path().join("tokens.json")).unwrap());
        let flow = LoopbackFlow::new(HttpTimeouts::default()).unwrap().without_browser();
        let manager = OAuthManager::new(storage, Arc::new(flow))
            .with_client_credentials(OAuthCredentials::new("id", "secret"));
        Toolbox::new(Arc::new(manager), HttpTimeouts::default()).unwrap()
    }

    fn seed_valid(toolbox: &Toolbox) {
        let token = OAuthToken::new(
            "live-token",
            Some("rt".to_string()),
            Utc::now() + Duration::hours(1),
            vec!["https://www.googleapis.com/auth/tasks".to_string()],
        );
        toolbox
            .manager
            .storage()
            .store(DEFAULT_SERVICE_NAME, &token, &TokenMetadata::new(DEFAULT_SERVICE_NAME))
            .unwrap();
    }

    fn call(name: &str, arguments: Option<Value>) -> CallToolRequest {
        CallToolRequest {
            name: name.to_string(),
            arguments,
        }
    }

    fn text(result: &CallToolResult) -> Value {
        serde_json::from_str(&result.content[0].text).unwrap()
    }

    #[test]
    fn definitions_list_three_tools() {
        let tmp = TempDir::new().unwrap();
        let names: Vec<&str> = toolbox(&tmp).definitions().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["get_auth_status", "list_calendars", "list_task_lists"]);
    }

    #[tokio::test]
    async fn auth_status_reports_missing_token() {
        let tmp = TempDir::new().unwrap();
        let result = toolbox(&tmp).call(call("get_auth_status", None)).await;
        assert!(!result.is_error);
        let body = text(&result);
        assert_eq!(body["status"], "missing");
        assert!(body.get("expires_at").is_none());
    }

    #[tokio::test]
    async fn auth_status_reports_valid_token() {
        let tmp = TempDir::new().unwrap();
        let toolbox = toolbox(&tmp);
        seed_valid(&toolbox);

        let body = text(&toolbox.call(call("get_auth_status", None)).await);
        assert_eq!(body["status"], "valid");
        assert_eq!(body["has_refresh_token"], true);
        assert_eq!(body["scopes"][0], "https://www.googleapis.com/auth/tasks");
    }

    #[tokio::test]
    async fn api_tools_without_token_return_setup_hint() {
        let tmp = TempDir::new().unwrap();
        let result = toolbox(&tmp).call(call("list_calendars", None)).await;
        assert!(result.is_error);
        let body = text(&result);
        assert!(body["error"].as_str().unwrap().contains("gworkspace-mcp setup"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let tmp = TempDir::new().unwrap();
        let result = toolbox(&tmp).call(call("send_email", None)).await;
        assert!(result.is_error);
        assert_eq!(text(&result)["error"], "Unknown tool: send_email");
    }

    #[tokio::test]
    async fn list_task_lists_uses_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/v1/users/@me/lists"))
            .and(header("authorization", "Bearer live-token"))
            .and(query_param("maxResults", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "l1", "title": "Inbox", "updated": "2025-01-01T00:00:00Z"},
                    {"id": "l2", "title": "Errands", "updated": "2025-01-02T00:00:00Z"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let toolbox = toolbox(&tmp).with_api_bases(
            format!("{}/calendar/v3", server.uri()),
            format!("{}/tasks/v1", server.uri()),
        );
        seed_valid(&toolbox);

        let result = toolbox
            .call(call("list_task_lists", Some(json!({"max_results": 5}))))
            .await;
        assert!(!result.is_error, "{:?}", result);
        let body = text(&result);
        assert_eq!(body["count"], 2);
        assert_eq!(body["task_lists"][1]["title"], "Errands");
    }

    #[tokio::test]
    async fn list_calendars_maps_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendar/v3/users/me/calendarList"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "me@example.com", "summary": "Me", "primary": true, "accessRole": "owner"}]
            })))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let toolbox = toolbox(&tmp).with_api_bases(
            format!("{}/calendar/v3", server.uri()),
            format!("{}/tasks/v1", server.uri()),
        );
        seed_valid(&toolbox);

        let body = text(&toolbox.call(call("list_calendars", None)).await);
        assert_eq!(body["calendars"][0]["primary"], true);
        assert_eq!(body["calendars"][0]["access_role"], "owner");
    }
}
