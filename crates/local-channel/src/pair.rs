//! # Pair State：本地代理通道的共享私有记录
//!
//! ## 核心意图（Why）
//! - 建模一对 Local 端点（`A`/`B`）共享的私有状态：互斥锁、两个端点句柄、选项标志、
//!   拨号计划目标、抖动缓冲配置与模块引用令牌；
//! - 将 `A ↔ Pair ↔ B` 的循环引用处理为：Pair 不拥有任何一个端点（均由交换机拥有），
//!   仅持有朴素引用；调用方（转发器、优化引擎、生命周期模块）始终显式传入
//!   `&Arc<Pair>`，端点本身不回指 Pair，避免引入弱引用簿记。
//!
//! ## 架构定位（Where）
//! - 隶属 `local_channel::pair`，由 [`crate::registry::PairRegistry`] 持有并发安全的
//!   `Arc<Pair>` 集合，由 [`crate::forwarder`]、[`crate::optimize`]、[`crate::lifecycle`]
//!   协同访问。
//!
//! ## 不变量（What）
//! 1. `a_handle` 永不等于 `b_handle`；
//! 2. 存于 Pair 中的句柄要么存活，要么已通过 `fixup` 替换，从不悬空；
//! 3. `ALREADY_MASQED` 置位期间不再转发任何帧；
//! 4. `GLARE_DETECT` 仅在单次 `queue_frame` 调用期间持有；`CANCEL_QUEUE` 只能在
//!    `GLARE_DETECT` 置位时设置；
//! 5. Pair 恰好销毁一次；
//! 6. 模块引用令牌的获取与释放次数相等；
//! 7. 源自请求字符串的标志在分配时设置且此后不变，唯一例外是 `NO_OPTIMIZATION`，
//!    可被管理动作清除。

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::switch::{EndpointHandle, JitterBufferConfig};

/// 呼叫腿标识：区分桥接外呼方的 `A` 与运行拨号计划的 `B`。
///
/// # 教案式说明
/// - **契约 (What)**：仅两个枚举值，满足 `Copy + Eq + Hash`，可作为日志字段或 HashMap Key。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Leg {
    A,
    B,
}

impl Leg {
    /// 返回另一条腿。
    pub fn other(self) -> Self {
        match self {
            Leg::A => Leg::B,
            Leg::B => Leg::A,
        }
    }
}

/// Pair 标志位集合。
///
/// # 教案式说明
/// - **意图 (Why)**：以单个 `u8` 承载八个布尔标志，避免为每个标志单独分配字段；
/// - **契约 (What)**：`JITTER_BUFFER` 对应 "jitter-buffer enable"，是随请求字符串派生的
///   标志之一，纳入同一位集合管理；
/// - **风险 (Trade-offs)**：不使用第三方 `bitflags` crate（本工作区未引入该依赖），以手写
///   位运算换取零额外依赖。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PairFlags(u8);

impl PairFlags {
    pub const GLARE_DETECT: Self = Self(1 << 0);
    pub const CANCEL_QUEUE: Self = Self(1 << 1);
    pub const ALREADY_MASQED: Self = Self(1 << 2);
    pub const LAUNCHED_PBX: Self = Self(1 << 3);
    pub const NO_OPTIMIZATION: Self = Self(1 << 4);
    pub const BRIDGE_REPORT: Self = Self(1 << 5);
    pub const MOH_PASSTHRU: Self = Self(1 << 6);
    pub const JITTER_BUFFER: Self = Self(1 << 7);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// 将 `n`/`j`/`b`/`m` 对应的选项标志还原为字母序列，供 [`crate::destination::Destination`]
    /// 的 `Display` 实现拼装可逆的目的地字符串。
    pub fn option_letters(self) -> String {
        let mut out = String::new();
        if self.contains(Self::NO_OPTIMIZATION) {
            out.push('n');
        }
        if self.contains(Self::JITTER_BUFFER) {
            out.push('j');
        }
        if self.contains(Self::BRIDGE_REPORT) {
            out.push('b');
        }
        if self.contains(Self::MOH_PASSTHRU) {
            out.push('m');
        }
        out
    }
}

impl core::ops::BitOr for PairFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for PairFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// 模块引用令牌：防止宿主模块在任一端点存活期间被卸载。
///
/// # 教案式说明
/// - **契约 (What)**：两个端点各持有一个；丢弃时自动释放，保证获取/释放次数相等。
///   具体的引用计数实现由宿主交换机提供，这里只建模"持有即计数、
///   丢弃即释放"的 RAII 语义。`hangup` 通过把对应槽位置为 `None` 来显式触发释放，
///   而不是等到整个 Pair 析构。
#[derive(Debug)]
pub struct ModuleRef(Arc<()>);

impl ModuleRef {
    pub fn acquire() -> Self {
        Self(Arc::new(()))
    }
}

impl Drop for ModuleRef {
    fn drop(&mut self) {
        tracing::trace!("module reference token released");
    }
}

/// Pair 的共享私有状态，由 [`Pair::mutex`] 保护的所有字段都收敛在此结构中。
///
/// # 教案式说明
/// - **契约 (What)**：`a_handle`/`b_handle` 在拆线期间可被清为 `None`；`flags` 记录
///   §3 列出的全部位；`context`/`extension` 为解析自请求字符串的拨号目标；
///   `reqformat` 建模为不透明的格式标签字符串，媒体协商细节超出本驱动范围；
///   `jb_conf` 为 `A` 侧的抖动缓冲配置；`module_refs` 为一对引用令牌。
#[derive(Debug)]
pub struct PairState {
    pub a_handle: Option<EndpointHandle>,
    pub b_handle: Option<EndpointHandle>,
    pub flags: PairFlags,
    pub context: String,
    pub extension: String,
    pub reqformat: String,
    pub jb_conf: JitterBufferConfig,
    pub module_refs: (Option<ModuleRef>, Option<ModuleRef>),
}

impl PairState {
    /// 释放给定腿的模块引用令牌；对已释放的腿重复调用是无操作的幂等行为。
    pub fn release_module_ref(&mut self, leg: Leg) {
        match leg {
            Leg::A => self.module_refs.0 = None,
            Leg::B => self.module_refs.1 = None,
        }
    }

    /// 返回句柄所在的腿，若两者都不匹配则返回 `None`。
    pub fn direction_of(&self, handle: &EndpointHandle) -> Option<Leg> {
        if self.a_handle.as_ref().is_some_and(|h| h.name() == handle.name()) {
            Some(Leg::A)
        } else if self.b_handle.as_ref().is_some_and(|h| h.name() == handle.name()) {
            Some(Leg::B)
        } else {
            None
        }
    }

    /// 返回给定腿当前持有的句柄（可能为 `None`，因为端点可能已分离）。
    pub fn handle_of(&self, leg: Leg) -> Option<&EndpointHandle> {
        match leg {
            Leg::A => self.a_handle.as_ref(),
            Leg::B => self.b_handle.as_ref(),
        }
    }

    /// 返回给定腿的伙伴句柄（`A` 的伙伴是 `B`，反之亦然）。
    pub fn partner_of(&self, leg: Leg) -> Option<&EndpointHandle> {
        self.handle_of(leg.other())
    }

    /// 两个句柄是否均已清空，代表该结束生命周期了。
    pub fn both_gone(&self) -> bool {
        self.a_handle.is_none() && self.b_handle.is_none()
    }
}

/// Pair 的对外句柄：互斥锁 + 共享状态，配合 [`crate::registry::PairRegistry`] 使用。
///
/// # 教案式说明
/// - **意图 (Why)**：将锁与状态打包成单一可 `Arc` 共享的对象，满足 §5 锁层级中
///   "Pair 互斥锁" 这一级；
/// - **契约 (What)**：`id` 为分配时生成的随机 16 位十六进制标签，构成通道名
///   `Local/EXT@CTX-XXXX;N` 的 `XXXX` 部分，同时也是注册表的主键；
/// - **风险 (Trade-offs)**：`parking_lot::Mutex` 非可重入，调用方必须遵循 §5 的
///   锁获取顺序与回退协议，否则将自死锁。
#[derive(Debug)]
pub struct Pair {
    pub id: String,
    state: Mutex<PairState>,
}

impl Pair {
    pub fn new(id: String, state: PairState) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(state),
        })
    }

    /// 阻塞式获取 Pair 互斥锁。
    pub fn lock(&self) -> MutexGuard<'_, PairState> {
        self.state.lock()
    }

    /// 非阻塞尝试获取 Pair 互斥锁。
    pub fn try_lock(&self) -> Option<MutexGuard<'_, PairState>> {
        self.state.try_lock()
    }
}
