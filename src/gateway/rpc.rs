//! Remote procedures: room creation and explicit start.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::Gateway;

/// An RPC failure carrying the status code the transport reports back.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RpcError {
    pub code: u16,
    pub message: String,
}

impl RpcError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: 400,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            message: message.into(),
        }
    }

    pub fn method_not_found() -> Self {
        Self {
            code: 404,
            message: "method not found".to_string(),
        }
    }
}

/// Successful `createRoom` reply.
#[derive(Debug, Serialize)]
pub struct RoomCreated {
    pub code: String,
    #[serde(rename = "startedAt")]
    pub started_at: i64,
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(default)]
    hash: String,
}

impl Gateway {
    pub async fn handle_rpc(
        &self,
        method: &str,
        data: &[u8],
        user: &str,
    ) -> Result<Value, RpcError> {
        tracing::info!(%user, %method, "rpc");

        match method {
            "createRoom" => {
                let request: CreateRequest = serde_json::from_slice(data).map_err(|_| {
                    RpcError::bad_request("data provided to the remote procedure is invalid")
                })?;
                if request.hash.is_empty() {
                    return Err(RpcError::bad_request(
                        "data provided to the remote procedure is invalid",
                    ));
                }

                let created = self
                    .create_room(user, &request.hash)
                    .await
                    .map_err(|err| RpcError::internal(err.to_string()))?;
                serde_json::to_value(&created).map_err(|err| RpcError::internal(err.to_string()))
            }

            "startRoom" => {
                let room = self
                    .manager
                    .by_owner(user)
                    .await
                    .ok_or_else(|| RpcError::bad_request("user does not own any room"))?;
                room.write()
                    .await
                    .start(false)
                    .map_err(|err| RpcError::internal(err.to_string()))?;
                Ok(Value::Null)
            }

            _ => Err(RpcError::method_not_found()),
        }
    }
}
