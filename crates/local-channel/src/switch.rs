//! # switch 模块说明
//!
//! ## 角色定位（Why）
//! - 定义本驱动与宿主交换机之间的契约边界：端点句柄需要实现哪些访问器，交换机需要
//!   提供哪些原语；
//! - 本驱动从不直接操作媒体、编解码协商、拨号计划语义或持久化——那些都经由
//!   [`Switch`] trait 的方法委托给宿主。
//!
//! ## 架构定位（Where）
//! - `Endpoint`/`EndpointHandle` 建模对外不透明的端点句柄；
//! - `Switch` 建模宿主提供的跨端点原语集合：`trylock`/`lock`/`unlock` 已下放到
//!   `Endpoint` 自身（每个端点自带互斥锁），其余跨端点操作（排队帧、拼接、挂断等）
//!   留在 `Switch` 上，因为它们需要宿主的全局视角。

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::LocalResult;

/// 端点句柄：对外不透明的共享引用。
pub type EndpointHandle = Arc<dyn Endpoint>;

/// 通道状态，覆盖本驱动需要感知的子集。
///
/// # 教案式说明
/// - **契约 (What)**：`Down` 是 `A` 侧的初始态，`Ring` 是 `B` 侧的初始态；
///   转发 `RINGING` 控制帧时接收端会被置为 `Ringing`（而非 `Ring`——两者分别对应
///   "正在振铃中" 与 "刚创建、尚未开始振铃" 两个不同阶段）。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelState {
    Down,
    Reserved,
    Ring,
    Ringing,
    Up,
    Busy,
    Hangup,
}

/// 主叫/被叫/重定向/呼出方的身份数据，建模为统一的"party"结构。
///
/// # 教案式说明
/// - **意图 (Why)**：caller-id、connected-line、redirecting、dialed 四类数据在
///   spec 中均被描述为"整份序列化后转发"，共用同一形状可以让 `indicate` 的
///   转发逻辑保持单一实现；
/// - **风险 (Trade-offs)**：未建模 SIP/ISDP 级别的精细字段（如 presentation
///   indicator），调用方可通过 `extra` 携带协议特定附加信息。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Party {
    pub number: Option<String>,
    pub name: Option<String>,
    pub extra: Vec<(String, String)>,
}

/// 录音挂载点，建模为不透明标签；真实的录音实现由宿主交换机提供。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MonitorSlot(pub String);

/// 音频钩子（旁路抓取点），建模为不透明标签。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AudioHook(pub String);

/// 抖动缓冲配置，详见 SPEC_FULL.md §10.3。
#[derive(Clone, Debug, PartialEq)]
pub struct JitterBufferConfig {
    pub enabled: bool,
    pub max_size_ms: u32,
    pub resync_threshold_ms: u32,
    pub impl_name: String,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_size_ms: 200,
            resync_threshold_ms: 1000,
            impl_name: "fixed".to_owned(),
        }
    }
}

/// 控制帧的具体种类。
#[derive(Clone, Debug, PartialEq)]
pub enum ControlKind {
    Answer,
    Ringing,
    Hold,
    Unhold,
    ConnectedLine(Party),
    Redirecting(Party),
    /// 其余控制条件，原样携带条件码与数据。
    Other { condition: i32, data: Vec<u8> },
}

/// 端点之间转发的帧。
///
/// # 教案式说明
/// - **契约 (What)**：`Null` 是 `read()` 返回的哨兵帧——本驱动从不直接产生帧，
///   一切帧都经由另一端点的 `write` 到达。
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Null,
    Audio(Vec<u8>),
    Video(Vec<u8>),
    Control(ControlKind),
    DtmfBegin(char),
    DtmfEnd { digit: char, duration_ms: u32 },
    Text(String),
    Html { subclass: i32, data: Vec<u8> },
    Hangup { cause: i32 },
}

impl Frame {
    pub fn is_media(&self) -> bool {
        matches!(self, Frame::Audio(_) | Frame::Video(_))
    }

    pub fn is_ringing_control(&self) -> bool {
        matches!(self, Frame::Control(ControlKind::Ringing))
    }
}

/// 端点的入站帧队列：其它端点的 `write` 落地于此，端点自身的 `read()` 只返回
/// [`Frame::Null`]——真正的出队由宿主交换机的调度循环完成，不在本
/// 驱动职责范围内，因此这里只暴露 `push`/`len`/`is_empty` 供转发器与测试使用。
#[derive(Debug, Default)]
pub struct FrameQueue(Mutex<VecDeque<Frame>>);

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Frame) {
        self.0.lock().push_back(frame);
    }

    pub fn pop(&self) -> Option<Frame> {
        self.0.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// 交换机供给本驱动使用的端点句柄契约。
///
/// # 教案式说明
/// - **契约 (What)**：实现方需保证 `try_lock`/`lock`/`unlock` 与真实的并发访问
///   互斥绑定；`name()` 必须在宿主范围内唯一，本驱动以其作为句柄相等性判据。
/// - **风险 (Trade-offs)**：trait 方法较多，是 spec 枚举的端点访问器的直接映射；
///   未来如需精简，应先确认哪些字段在本驱动之外确无消费者。
pub trait Endpoint: Send + Sync + fmt::Debug {
    fn name(&self) -> String;
    fn state(&self) -> ChannelState;
    fn set_state(&self, state: ChannelState);

    fn bridge_partner(&self) -> Option<EndpointHandle>;

    fn queue(&self) -> &FrameQueue;

    fn monitor(&self) -> Option<MonitorSlot>;
    fn set_monitor(&self, monitor: Option<MonitorSlot>);

    fn audio_hooks(&self) -> Vec<AudioHook>;
    fn set_audio_hooks(&self, hooks: Vec<AudioHook>);

    fn caller(&self) -> Party;
    fn set_caller(&self, party: Party);

    fn connected_line(&self) -> Party;
    fn set_connected_line(&self, party: Party);

    fn redirecting(&self) -> Party;
    fn set_redirecting(&self, party: Party);

    fn dialed(&self) -> Party;
    fn set_dialed(&self, party: Party);

    fn groups(&self) -> Vec<String>;
    fn set_groups(&self, groups: Vec<String>);

    fn variables(&self) -> Vec<(String, String)>;
    fn set_variable(&self, key: &str, value: &str);
    fn get_variable(&self, key: &str) -> Option<String>;

    fn context(&self) -> String;
    fn set_context(&self, context: &str);
    fn extension(&self) -> String;
    fn set_extension(&self, extension: &str);
    fn priority(&self) -> i32;

    fn language(&self) -> String;
    fn set_language(&self, language: &str);
    fn accountcode(&self) -> String;
    fn set_accountcode(&self, accountcode: &str);
    fn musicclass(&self) -> String;
    fn set_musicclass(&self, musicclass: &str);
    fn linkedid(&self) -> String;

    fn answered_elsewhere(&self) -> bool;
    fn set_answered_elsewhere(&self, value: bool);

    fn hangup_cause(&self) -> i32;
    fn set_hangup_cause(&self, cause: i32);

    /// 挂断检查谓词：宿主可能在端点层面独立标记"已挂断"，与 Pair 的句柄清空
    /// 是两条独立的信息（端点可能已挂断但 Pair 还未来得及 `detach`）。
    fn is_hungup(&self) -> bool;

    /// 是否挂载了生成器（音乐放音、彩铃等）；转发器据此决定是否丢弃媒体帧。
    fn has_generator(&self) -> bool;

    fn try_lock(&self) -> bool;
    fn lock(&self);
    fn unlock(&self);

    fn start_moh(&self);
    fn stop_moh(&self);

    /// 回答 `T38_STATE` 查询；`None` 表示该端点不支持此查询项。
    ///
    /// 调用方必须在调用前已持有本端点的锁（`query_option` 的"见穿"解析路径以此
    /// 代表把查询转给任意类型的远端驱动作答）。
    fn query_t38_state(&self) -> Option<String>;

    /// 按 `jb_conf` 在端点上配置抖动缓冲；仅 `A` 侧在分配时调用。
    fn configure_jitter_buffer(&self, config: &JitterBufferConfig);
}

impl PartialEq for dyn Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

/// 宿主交换机提供的跨端点原语。
///
/// # 教案式说明
/// - **契约 (What)**：每个方法对应宿主暴露的一个跨端点原语；`queue_frame`/`masquerade`/
///   `pbx_start` 均可能阻塞，调用方必须确保调用时未持有
///   Pair 互斥锁之外的更低层级锁；
/// - **死锁规避原语 (How)**：`deadlock_backoff_endpoint` 对应"释放我的锁、让出
///   调度、重新获取"语义，`deadlock_backoff_sleep` 对应"释放 Pair 互斥锁并短暂
///   休眠"语义，转发器按 `self_locked` 在两者间二选一。
pub trait Switch: Send + Sync {
    fn queue_frame(&self, target: &EndpointHandle, frame: Frame);
    fn queue_hangup(&self, target: &EndpointHandle);
    fn masquerade(&self, into: &EndpointHandle, from: &EndpointHandle) -> LocalResult<()>;
    fn hangup(&self, target: &EndpointHandle, cause: i32);
    fn pbx_start(&self, target: &EndpointHandle) -> LocalResult<()>;
    fn best_codec(&self, requested: &str) -> String;
    fn datastore_inherit(&self, from: &EndpointHandle, to: &EndpointHandle);
    fn group_update(&self, target: &EndpointHandle);
    fn copy_vars(&self, from: &EndpointHandle, to: &EndpointHandle);
    fn extension_exists(&self, context: &str, extension: &str) -> bool;

    /// 以给定名称与初始状态创建一个新的端点句柄（`request()` 用它来创建 `A`/`B`）。
    fn create_endpoint(&self, name: &str, initial_state: ChannelState) -> LocalResult<EndpointHandle>;

    /// 解析某端点"穿透中间代理后"的真实桥接伙伴。
    ///
    /// - **意图 (Why)**：Optimize-Away 只应在 `B` 确已桥接到一个具体的远端——而非又一个
    ///   中间代理（例如嵌套的 Local Channel）——时才触发；
    /// - **契约 (What)**：与 [`Endpoint::bridge_partner`] 的"单跳"结果比较：两者相等
    ///   即视为"真实对端"，详见 [`crate::optimize`]。
    fn resolved_bridge_peer(&self, handle: &EndpointHandle) -> Option<EndpointHandle>;

    /// "释放我的锁、让出调度、重新获取"，用于 `self_locked` 为真的回退路径。
    fn deadlock_backoff_endpoint(&self, handle: &EndpointHandle);
    /// "释放 Pair 互斥锁并短暂休眠一个调度周期"，用于 `self_locked` 为假的回退路径。
    fn deadlock_backoff_sleep(&self);
}
