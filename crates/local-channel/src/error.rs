//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为本地代理通道（Local Proxy Channel）驱动对外暴露的错误语义提供集中定义；
//! - 归档目的端解析、帧转发、身份迁移（optimize-away）、生命周期管理等路径上的异常，
//!   方便运维与观测定位故障来源。
//!
//! ## 设计要求（What）
//! - 所有变体实现 `thiserror::Error`，与 `std::error::Error` 兼容；
//! - 变体携带诊断所需的上下文（Call-ID、通道名、选项字母等），避免日志丢失定位信息；
//! - 契约违例（如未持锁调用转发器）归入 `Internal`/`ForwarderPreconditionViolated`，
//!   以日志 + 错误码的方式暴露，不触发 panic。

use thiserror::Error;

/// 驱动对外暴露的统一错误类型。
///
/// # 教案式说明
/// - **意图 (Why)**：聚合解析、会话生命周期、并发协调等关键路径的异常；
/// - **契约 (What)**：所有变体均实现 `Send + Sync + 'static`，可安全跨线程传播；
/// - **风险 (Trade-offs)**：上下文字段使用 `String`，牺牲少量堆分配换取可读性。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LocalError {
    /// `devicestate` 收到缺少 `@context` 的目的地字符串。
    #[error("destination `{input}` is missing an `@context` suffix")]
    BadDestination { input: String },

    /// 拨号计划中不存在该分机。
    #[error("extension `{extension}`@`{context}` does not exist in the dialplan")]
    ExtensionNotFound { context: String, extension: String },

    /// 管理动作引用了未知的通道名。
    #[error("no such channel `{name}`")]
    UnknownChannel { name: String },

    /// 管理动作引用的通道不是本驱动创建的。
    #[error("channel `{name}` is not a Local channel")]
    NotALocalChannel { name: String },

    /// 管理动作缺少必填的请求头。
    #[error("missing required header `{header}`")]
    MissingHeader { header: &'static str },

    /// 选项字母的组合非法（例如 `j` 未伴随 `n`）。
    #[error("option `{option}` requires option `{requires}`; ignoring `{option}`")]
    OptionRequiresOption { option: char, requires: char },

    /// `answer` 被错误地发往 `A` 侧。
    #[error("answer() is not valid on the A leg of call `{call_id}`")]
    AnswerOnALeg { call_id: String },

    /// `query_option` 收到不支持的查询项。
    #[error("query-option `{option}` is not supported")]
    UnsupportedQueryOption { option: String },

    /// 分配新的 Pair（或其内部端点）失败。
    #[error("failed to allocate local channel pair: {detail}")]
    AllocationFailed { detail: String },

    /// `fixup` 收到了既不匹配 `A` 也不匹配 `B` 的旧句柄。
    #[error("fixup() could not find old channel `{call_id}` on either leg")]
    FixupUnknownHandle { call_id: String },

    /// 转发器在未持有 Pair 互斥锁的情况下被调用。
    #[error("queue_frame precondition violated: {detail}")]
    ForwarderPreconditionViolated { detail: String },

    /// 转发遭遇 glare：挂断在帧转发回退等待期间完成。
    #[error("glare on call `{call_id}`: pair was hung up while a frame was in flight")]
    Glare { call_id: String },

    /// 未归类的内部异常，仅作为兜底，避免错误链因 `unreachable!` 而 panic。
    #[error("internal local-channel failure: {detail}")]
    Internal { detail: String },
}

/// 驱动内部统一使用的 `Result` 别名。
pub type LocalResult<T> = Result<T, LocalError>;
