use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::tools::handlers::HaloTools;
use crate::tools::protocol::{
    CallToolParams, IncomingMessage, InitializeResult, JsonRpcError, JsonRpcResponse,
    ListToolsResult,
};

/// Serve newline-delimited JSON-RPC until the reader reaches EOF
pub async fn serve<R, W>(tools: &HaloTools, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Tool server ready on stdio");
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response) = handle_line(tools, &line).await {
            let mut payload = serde_json::to_vec(&response)?;
            payload.push(b'\n');
            writer.write_all(&payload).await?;
            writer.flush().await?;
        }
    }

    info!("Input closed, shutting down");
    Ok(())
}

/// Handle one line of input; notifications produce no response
pub async fn handle_line(tools: &HaloTools, line: &str) -> Option<JsonRpcResponse> {
    let message: IncomingMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Unparseable message: {}", e);
            return Some(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("Parse error: {}", e)),
            ));
        }
    };

    let Some(id) = message.id.clone() else {
        debug!("Ignoring notification {}", message.method);
        return None;
    };

    if message.jsonrpc.as_deref() != Some("2.0") {
        return Some(JsonRpcResponse::failure(
            id,
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        ));
    }

    Some(match dispatch(tools, message).await {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

async fn dispatch(tools: &HaloTools, message: IncomingMessage) -> Result<Value, JsonRpcError> {
    debug!("Handling {}", message.method);
    match message.method.as_str() {
        "initialize" => to_value(InitializeResult::default()),
        "ping" => Ok(Value::Object(Default::default())),
        "tools/list" => to_value(ListToolsResult {
            tools: HaloTools::definitions(),
        }),
        "tools/call" => {
            let params: CallToolParams = message
                .params
                .ok_or_else(|| JsonRpcError::new(JsonRpcError::INVALID_PARAMS, "Missing params"))
                .and_then(|p| {
                    serde_json::from_value(p).map_err(|e| {
                        JsonRpcError::new(
                            JsonRpcError::INVALID_PARAMS,
                            format!("Invalid params: {}", e),
                        )
                    })
                })?;
            to_value(tools.call(&params.name, params.arguments).await)
        }
        other => Err(JsonRpcError::new(
            JsonRpcError::METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        )),
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()))
}
