pub mod admin;
pub mod documents;
pub mod server;
pub mod wordcount;

use serde::Serialize;

/// Structured error codes for the query surface / 查询接口错误码
pub const ERR_NO_PAGE_SPECIFIED: i32 = 4001;
pub const ERR_MULTI_METHODS: i32 = 4002;
pub const ERR_TASK_RUNNING: i32 = 4091;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            code: 400,
            message: message.to_string(),
            data: None,
        }
    }

    /// Error with a distinguishable code / 带错误码的失败响应
    pub fn error_code(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: None,
        }
    }
}
