//! 错误类型定义

use thiserror::Error;

/// Home Assistant 访问错误
#[derive(Debug, Error)]
pub enum HassError {
    /// 网络/传输层错误
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// 服务端返回非成功状态码
    #[error("home assistant returned {status}: {body}")]
    Status { status: u16, body: String },

    /// 响应体无法解析
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// 未连接或对话框已关闭
    #[error("not connected to home assistant")]
    NotConnected,

    /// 服务调用被拒绝（测试替身及其他实现使用）
    #[error("service call rejected: {0}")]
    Rejected(String),
}

pub type HassResult<T> = Result<T, HassError>;

/// `remote.send_command` 命令解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    /// 某个 token 不是 `key:value` 形式
    #[error("invalid command token: {0}")]
    InvalidToken(String),

    #[error("command has no type")]
    MissingType,

    #[error("unknown command type: {0}")]
    UnknownType(String),

    #[error("command {command} is missing {field}")]
    MissingField {
        command: String,
        field: &'static str,
    },
}
