//! # local-channel
//!
//! ## 定位与职责（Why）
//! - 实现一种虚拟通道类型：一对背靠背的端点（`A`/`B`）共享同一份私有状态记录，
//!   供宿主交换机用作拨号计划的交接点；
//! - 当 `B` 侧的拨号计划把它桥接到具体的远端时，本驱动可以把 `A` 直接拼接到该
//!   远端身上（"optimize-away"），让这对端点从调用图中退出。
//!
//! ## 架构嵌入（Where）
//! - `pair`/`registry` 承载共享状态与进程范围内的存活集合；
//! - `switch` 定义与宿主交换机之间的契约边界，本驱动从不绕过它直接触达媒体、
//!   编解码协商或拨号计划语义；
//! - `forwarder`/`optimize`/`endpoint`/`lifecycle`/`control` 依次是帧转发、
//!   身份拼接、通道驱动操作、生命周期管理与运维入口。
//!
//! ## 风险提示（Trade-offs）
//! - 本驱动只建模同步、阻塞式的入口点，不引入异步运行时；媒体处理、编解码协商、
//!   拨号计划语义与持久化均委托给宿主（见各模块的契约说明）。

/// CLI 列举与 `LocalOptimizeAway` 管理动作的入口。
///
/// - **意图 (Why)**：给运维提供只读可见性与一个写操作入口；
/// - **契约 (What)**：枚举存活 Pair 供 `local show channels` 展示，清除
///   `NO_OPTIMIZATION` 供下一次媒体写入重新评估拼接资格；
/// - **架构位置 (Where)**：只读取 [`registry`] 与单个 [`pair::Pair`] 的锁，从不
///   直接操作端点。
pub mod control;

/// 目的地字符串 `EXTEN[/OPTS][@CONTEXT]` 的解析与重组。
///
/// - **意图 (Why)**：把请求字符串翻译成分机、上下文与 [`pair::PairFlags`]；
/// - **契约 (What)**：`/OPTS` 先于 `@CONTEXT` 解析，未识别的选项字母记录调试日志
///   后忽略；`Display` 实现可逆地重组回同一语法。
pub mod destination;

/// 交换机通道驱动侧的操作集合：`answer`/`read`/`write`/`indicate`/数字/文本/
/// HTML/`fixup`/`query_option`/`bridged_channel`/`devicestate`。
///
/// - **意图 (Why)**：把驱动对外暴露的每个操作实现为接受共享状态的自由函数，
///   不绑定 `self`；
/// - **契约 (What)**：`write` 是 Optimize-Away 的触发点，其余操作原样转发或
///   查询 [`pair::PairState`]；
/// - **架构位置 (Where)**：协同 [`forwarder`]、[`optimize`] 与 [`switch`] 完成
///   每次调用。
pub mod endpoint;

/// 驱动统一的错误类型。
///
/// - **意图 (Why)**：集中声明每条失败路径，携带诊断所需的上下文字段；
/// - **契约 (What)**：`thiserror::Error` 派生，`Send + Sync + 'static`，可跨
///   线程传递与记录；
/// - **风险提示 (Trade-offs)**：内部契约违反统一归入 `Internal`，记录 `error!`
///   级别日志，从不 panic。
pub mod error;

/// `queue_frame`：跨端点的死锁安全帧转发。
///
/// - **意图 (Why)**：驱动里唯一需要同时持有 Pair 互斥锁与某个端点锁的路径；
/// - **契约 (What)**：尝试锁 + 回退协议获取伙伴端点的锁，`CANCEL_QUEUE` 置位
///   时销毁 Pair 并返回失败；
/// - **风险提示 (Trade-offs)**：失败返回时 Pair 已经被销毁，调用方不得再访问它。
pub mod forwarder;

/// `request`/`call`/`hangup`：Pair 的分配、拨号计划启动与挂断。
///
/// - **意图 (Why)**：把一次 Local 通道请求的完整生命周期集中在一处管理；
/// - **契约 (What)**：`request` 注册新 Pair 并生成唯一标签，`call` 记录拨号计划
///   已启动，`hangup` 按剩余槽位决定直接挂断还是转发控制帧并销毁 Pair。
pub mod lifecycle;

/// 身份拼接（masquerade）引擎。
///
/// - **意图 (Why)**：当 `B` 侧已经桥接到具体远端时，把 `A` 的外部对端直接拼接
///   到该远端身上；
/// - **契约 (What)**：资格判定失败或锁争用都静默放弃，调用方照常转发；命中后
///   交换录音挂载点、音频钩子、身份信息，拷贝群组成员关系，再委托宿主完成
///   `masquerade`。
pub mod optimize;

/// 一对端点共享的私有状态记录。
///
/// - **意图 (Why)**：建模 `A ↔ Pair ↔ B` 的关系而不引入循环引用——Pair 不拥有
///   任何一个端点，调用方始终显式传入 `&Arc<Pair>`；
/// - **契约 (What)**：`PairState` 持有两个端点句柄、选项标志、拨号计划目标、
///   抖动缓冲配置与模块引用令牌，由 `parking_lot::Mutex` 保护。
pub mod pair;

/// 进程范围内存活 Pair 的并发安全集合。
///
/// - **意图 (Why)**：支撑 CLI 列举、设备状态查询与管理动作对存活 Pair 的枚举；
/// - **契约 (What)**：基于 `DashMap` 的 `insert`/`get`/`remove`/`snapshot`，
///   Pair 从分配到挂断完成期间始终出现在该集合中。
pub mod registry;

/// 本驱动与宿主交换机之间的契约边界。
///
/// - **意图 (Why)**：定义端点句柄需要实现哪些访问器，交换机需要提供哪些跨端点
///   原语；
/// - **契约 (What)**：`Endpoint` 建模对外不透明的端点句柄（含自带的 `lock`/
///   `try_lock`/`unlock`），`Switch` 建模 `queue_frame`/`masquerade`/`hangup`
///   等需要宿主全局视角的原语。
pub mod switch;

#[cfg(test)]
mod testutil;
