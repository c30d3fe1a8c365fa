//! The newline-delimited JSON-RPC loop.
//!
//! Each request line is handled on its own task so a slow Google call does
//! not hold up others. Responses go through one channel to a single writer,
//! so output lines never interleave. Stdout carries protocol frames only; all
//! logging goes to stderr.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::protocol::{
    INTERNAL_ERROR, INVALID_PARAMS, InitializeResult, METHOD_NOT_FOUND, Request, Response,
    parse_line,
};
use crate::tools::{CallToolRequest, Toolbox};

/// Serves MCP requests against a [`Toolbox`].
#[derive(Debug, Clone)]
pub struct McpServer {
    tools: Arc<Toolbox>,
}

impl McpServer {
    pub fn new(tools: Toolbox) -> Self {
        Self {
            tools: Arc::new(tools),
        }
    }

    /// Serves stdin/stdout until EOF or Ctrl-C.
    pub async fn run_stdio(&self) -> ServerResult<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        let shutdown = async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl-C, shutting down");
            }
        };
        self.serve(stdin, stdout, shutdown).await
    }

    /// Serves requests read from `reader`, writing responses to `writer`.
    ///
    /// Returns once the input ends (or `shutdown` completes) and every
    /// in-flight request has been answered.
    pub async fn serve<R, W, S>(&self, reader: R, mut writer: W, shutdown: S) -> ServerResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let read_loop = async move {
            let mut lines = reader.lines();
            tokio::pin!(shutdown);
            loop {
                let line = tokio::select! {
                    line = lines.next_line() => line,
                    _ = &mut shutdown => break,
                };
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to read request");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let tools = Arc::clone(&self.tools);
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(response) = handle_line(&tools, &line).await {
                        match serde_json::to_string(&response) {
                            Ok(text) => {
                                let _ = tx.send(text);
                            }
                            Err(e) => error!(error = %e, "failed to serialize response"),
                        }
                    }
                });
            }
            // Dropping the last sender lets the writer finish once tasks are done.
            drop(tx);
        };

        let write_loop = async {
            while let Some(text) = rx.recv().await {
                writer.write_all(text.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<_, ServerError>(())
        };

        let ((), written) = tokio::join!(read_loop, write_loop);
        written
    }
}

/// Handles one input line; `None` means nothing is sent back.
pub async fn handle_line(tools: &Toolbox, line: &str) -> Option<Response> {
    match parse_line(line) {
        Ok(request) => handle_request(tools, request).await,
        Err(response) => {
            warn!("rejected malformed request");
            Some(response)
        }
    }
}

/// Dispatches a parsed request.
pub async fn handle_request(tools: &Toolbox, request: Request) -> Option<Response> {
    let Some(id) = request.id.clone() else {
        debug!(method = %request.method, "notification");
        return None;
    };

    debug!(method = %request.method, %id, "request");
    let response = match request.method.as_str() {
        "initialize" => to_response(id, &InitializeResult::default()),
        "ping" => Response::success(id, json!({})),
        "tools/list" => Response::success(id, json!({ "tools": tools.definitions() })),
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            match serde_json::from_value::<CallToolRequest>(params) {
                Ok(call) => to_response(id, &tools.call(call).await),
                Err(e) => Response::error(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
            }
        }
        other => Response::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
    };
    Some(response)
}

fn to_response<T: serde::Serialize>(id: Value, result: &T) -> Response {
    match serde_json::to_value(result) {
        Ok(value) => Response::success(id, value),
        Err(e) => Response::error(id, INTERNAL_ERROR, format!("Internal error: {}", e)),
    }
}
