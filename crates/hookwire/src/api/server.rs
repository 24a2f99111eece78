//! Host-side dispatcher for plugin to host calls.

use std::sync::Arc;

use serde_json::Value;

use super::{ApiError, CommandRegistration, HostApi};
use crate::channel::{Channel, IncomingHandler, RpcError, codes, decode_params, encode_result};
use crate::protocol::{self, KvKeyParams, KvSetParams, LogParams, UnregisterCommandParams};

/// Serves `api.*` requests from one plugin process.
pub struct ApiServer {
    host_api: Option<Arc<dyn HostApi>>,
}

impl ApiServer {
    /// Serves `host_api`; with `None` every call fails as unavailable.
    #[must_use]
    pub fn new(host_api: Option<Arc<dyn HostApi>>) -> Self {
        Self { host_api }
    }

    fn serve(api: &dyn HostApi, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            protocol::API_LOAD_PLUGIN_CONFIGURATION => {
                api.load_plugin_configuration().map_err(api_failure)
            }
            protocol::API_REGISTER_COMMAND => {
                let command: CommandRegistration = decode_params(params)?;
                api.register_command(&command).map_err(api_failure)?;
                Ok(Value::Null)
            }
            protocol::API_UNREGISTER_COMMAND => {
                let request: UnregisterCommandParams = decode_params(params)?;
                api.unregister_command(&request.trigger)
                    .map_err(api_failure)?;
                Ok(Value::Null)
            }
            protocol::API_KV_SET => {
                let request: KvSetParams = decode_params(params)?;
                api.kv_set(&request.key, &request.value)
                    .map_err(api_failure)?;
                Ok(Value::Null)
            }
            protocol::API_KV_GET => {
                let request: KvKeyParams = decode_params(params)?;
                let value = api.kv_get(&request.key).map_err(api_failure)?;
                encode_result(&value)
            }
            protocol::API_KV_DELETE => {
                let request: KvKeyParams = decode_params(params)?;
                api.kv_delete(&request.key).map_err(api_failure)?;
                Ok(Value::Null)
            }
            protocol::API_LOG => {
                let request: LogParams = decode_params(params)?;
                api.log(request.level, &request.message)
                    .map_err(api_failure)?;
                Ok(Value::Null)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

fn unavailable() -> RpcError {
    RpcError::new(codes::HOST_API_UNAVAILABLE, ApiError::Unavailable.to_string())
}

fn api_failure(error: ApiError) -> RpcError {
    match error {
        ApiError::Unavailable => unavailable(),
        ApiError::Host { message } => RpcError::application(message),
        other @ ApiError::Transport { .. } => RpcError::internal(other.to_string()),
    }
}

impl IncomingHandler for ApiServer {
    fn handle_request(
        &self,
        _channel: &Channel,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RpcError> {
        if !method.starts_with("api.") {
            return Err(RpcError::method_not_found(method));
        }
        match &self.host_api {
            Some(api) => Self::serve(api.as_ref(), method, params),
            None => Err(unavailable()),
        }
    }
}
