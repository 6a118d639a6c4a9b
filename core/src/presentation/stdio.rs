// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Line-delimited JSON-RPC transport on stdio.
//!
//! One persistent child process per client connection; one request per
//! line, one response per line. Two methods: `list_tools` and
//! `call_tool(name, arguments)`. Calls run as independent tasks so a parked
//! `query_agent` never blocks the client's heartbeats; responses are
//! correlated by JSON-RPC id and may arrive out of order.
//!
//! On SIGINT/SIGTERM the loop stops reading, in-flight handlers drain, and
//! the process exits cleanly.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::tools::Dispatcher;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

pub async fn serve(dispatcher: Dispatcher) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if stdout.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    info!("broker serving on stdio");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("reading stdin")? {
                    Some(line) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        handle_line(line, &dispatcher, &tx).await;
                    }
                    None => {
                        debug!("stdin closed");
                        break;
                    }
                }
            }
            _ = shutdown_signal() => {
                info!("shutdown signal received; draining handlers");
                break;
            }
        }
    }

    // Dropping the sender lets the writer finish once in-flight calls have
    // sent their responses.
    drop(tx);
    let _ = writer.await;
    Ok(())
}

async fn handle_line(line: String, dispatcher: &Dispatcher, tx: &mpsc::Sender<String>) {
    let request: RpcRequest = match serde_json::from_str(&line) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "unparseable request line");
            let _ = tx
                .send(error_response(Value::Null, -32700, &format!("parse error: {err}")))
                .await;
            return;
        }
    };

    let id = request.id.unwrap_or(Value::Null);
    match request.method.as_str() {
        "list_tools" => {
            let _ = tx
                .send(ok_response(id, json!({"tools": dispatcher.list_tools()})))
                .await;
        }
        "call_tool" => {
            let Some(name) = request.params.get("name").and_then(Value::as_str) else {
                let _ = tx
                    .send(error_response(id, -32602, "params.name is required"))
                    .await;
                return;
            };
            let name = name.to_string();
            let args = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let dispatcher = dispatcher.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = dispatcher.call_tool(&name, &args).await;
                let _ = tx.send(ok_response(id, result)).await;
            });
        }
        other => {
            let _ = tx
                .send(error_response(id, -32601, &format!("unknown method {other}")))
                .await;
        }
    }
}

fn ok_response(id: Value, result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

fn error_response(id: Value, code: i32, message: &str) -> String {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}).to_string()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
