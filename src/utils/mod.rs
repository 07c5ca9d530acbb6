use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::service::ServiceError;

/// 通用的API响应结构
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 错误码，0表示成功，非0表示失败
    pub code: i32,
    /// 错误消息，成功时为"success"
    pub msg: String,
    /// 响应数据，错误时为None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_data: Option<T>,
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

/// 服务层错误映射为状态码与响应体
pub fn service_error_response<T>(err: &ServiceError) -> (StatusCode, Json<ApiResponse<T>>) {
    let (status, code) = match err {
        ServiceError::InvalidCoordinates(_)
        | ServiceError::EmptyText
        | ServiceError::TextTooLong { .. } => {
            (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR)
        }
        // 可由用户自行修正，不算错误
        ServiceError::LocationRequired(_) => (StatusCode::OK, error_codes::PRECONDITION_FAILED),
        ServiceError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
        ),
    };
    (status, error_to_api_response(code, err.user_message()))
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const PRECONDITION_FAILED: i32 = 1006;
    pub const INTERNAL_ERROR: i32 = 5000;
}
