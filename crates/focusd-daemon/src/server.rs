//! Request handling for the IPC server.

use serde_json::{Value, json};
use tracing::{debug, info};

use focusd_core::{Error, FocusArbiter, FocusRequest};
use focusd_ipc::messages::{ErrorInfo, Method};

/// Handle an IPC request and return a response value.
///
/// Runs arbiter operations synchronously; callers keep it off the reactor.
pub fn handle_request(method: &Method, arbiter: &FocusArbiter) -> Result<Value, ErrorInfo> {
    match method {
        Method::Register { pid, handle_id, stream_type, is_for_session } => {
            let id = arbiter
                .register(*pid, *handle_id, stream_type, *is_for_session)
                .map_err(|e| error_info(&e))?;
            Ok(json!({"node_id": id.0}))
        }

        Method::Unregister { pid, handle_id, is_for_session } => {
            arbiter.unregister(*pid, *handle_id, *is_for_session).map_err(|e| error_info(&e))?;
            Ok(json!({"success": true}))
        }

        Method::SetReacquisition { pid, handle_id, enabled } => {
            arbiter.set_reacquisition(*pid, *handle_id, *enabled).map_err(|e| error_info(&e))?;
            Ok(json!({"success": true}))
        }

        Method::GetReacquisition { pid, handle_id } => {
            let enabled = arbiter.reacquisition(*pid, *handle_id).map_err(|e| error_info(&e))?;
            Ok(json!({"enabled": enabled}))
        }

        Method::Acquire { pid, handle_id, focus_type, name, is_for_session } => {
            let request = FocusRequest::new(*pid, *handle_id, *focus_type)
                .with_option(name.clone())
                .for_session(*is_for_session);
            arbiter.acquire(&request).map_err(|e| error_info(&e))?;
            Ok(json!({"success": true}))
        }

        Method::Release { pid, handle_id, focus_type, name, is_for_session } => {
            let request = FocusRequest::new(*pid, *handle_id, *focus_type)
                .with_option(name.clone())
                .for_session(*is_for_session);
            arbiter.release(&request).map_err(|e| error_info(&e))?;
            Ok(json!({"success": true}))
        }

        Method::Deliver { pid, src_handle_id, dst_handle_id, focus_type } => {
            arbiter
                .deliver(*pid, *src_handle_id, *dst_handle_id, *focus_type)
                .map_err(|e| error_info(&e))?;
            Ok(json!({"success": true}))
        }

        Method::Watch { pid, handle_id, focus_type, is_for_session } => {
            let id = arbiter
                .watch(*pid, *handle_id, *focus_type, *is_for_session)
                .map_err(|e| error_info(&e))?;
            Ok(json!({"node_id": id.0}))
        }

        Method::Unwatch { pid, handle_id, is_for_session } => {
            arbiter.unwatch(*pid, *handle_id, *is_for_session).map_err(|e| error_info(&e))?;
            Ok(json!({"success": true}))
        }

        Method::GetAcquiredFocusInfo { focus_type } => {
            let info = arbiter.acquired_focus_info(*focus_type).map_err(|e| error_info(&e))?;
            serde_json::to_value(info)
                .map_err(|e| ErrorInfo::new(ErrorInfo::INTERNAL, e.to_string()))
        }

        Method::GetNodes => serde_json::to_value(arbiter.snapshot())
            .map_err(|e| ErrorInfo::new(ErrorInfo::INTERNAL, e.to_string())),

        Method::EmergencyExit { pid } => {
            arbiter.emergency_exit(*pid);
            Ok(json!({"success": true}))
        }

        Method::Shutdown => {
            info!("Shutdown requested via IPC");
            Ok(json!({"success": true}))
        }
    }
}

/// Map a core error onto a response error code.
fn error_info(error: &Error) -> ErrorInfo {
    let code = match error {
        Error::InvalidArgument(_) | Error::InvalidStreamType(_) => ErrorInfo::INVALID_ARGUMENT,
        Error::PolicyBlocked { .. } => ErrorInfo::POLICY_BLOCKED,
        Error::NotFound { .. } | Error::NoHolder(_) => ErrorInfo::NOT_FOUND,
        Error::AlreadyExists { .. } => ErrorInfo::ALREADY_EXISTS,
        Error::InvalidState(_) => ErrorInfo::INVALID_STATE,
        Error::Internal(_) | Error::SerializationError(_) => ErrorInfo::INTERNAL,
    };
    debug!(code, error = %error, "Request failed");
    ErrorInfo::new(code, error.to_string())
}
