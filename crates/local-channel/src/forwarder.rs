//! # Frame Forwarder：`queue_frame`
//!
//! ## 核心意图（Why）
//! - 将一个端点 `write` 路径收到的帧，安全地送达伙伴端点的入站队列；
//! - 这是驱动里唯一需要同时持有 Pair 互斥锁与某个端点锁的路径，因此也是死锁规避
//!   协议的主要承载点。
//!
//! ## 行为契约（What）
//! 1. 计算 `other := partner_of(direction)`；若为空，直接成功返回；
//! 2. 若 A、B 两端均已挂载生成器，丢弃该帧（仍视为成功）；
//! 3. 置位 `GLARE_DETECT`；
//! 4. 采用"尝试锁 + 回退"协议获取 `other` 的锁，必要时释放 Pair 互斥锁、依
//!    `self_locked` 选择回退原语、重新获取 Pair 互斥锁并重新读取 `other`；
//! 5. 获取到 `other` 锁后检查 `CANCEL_QUEUE`：若置位说明挂断已在回退期间完成，
//!    释放 Pair 互斥锁、销毁 Pair、解锁 `other`、返回失败；
//! 6. 若帧是 RINGING 控制帧，先将 `other` 置为 RINGING 态；
//! 7. 入队、解锁 `other`、清除 `GLARE_DETECT`、返回成功。
//!
//! ## 可观测副作用（Trade-offs）
//! 失败返回时 Pair 已经被销毁，调用方不得再访问它。

use std::sync::Arc;

use parking_lot::MutexGuard;

use crate::error::{LocalError, LocalResult};
use crate::pair::{Leg, Pair, PairFlags, PairState};
use crate::registry::PairRegistry;
use crate::switch::{ChannelState, EndpointHandle, Frame, Switch};

/// 将 Pair 从注册表移除，令其在最后一个 `Arc` 引用释放时被销毁。
pub fn destroy(pair: &Arc<Pair>, registry: &PairRegistry) {
    registry.remove(&pair.id);
    tracing::debug!(call_id = %pair.id, "local channel pair destroyed");
}

/// 转发一帧，调用方必须已经持有 `pair` 的互斥锁（以 `guard` 形式传入）。
///
/// # 教案式说明
/// - **输入**：`direction` 是帧的发起端；`self_handle`/`self_locked` 描述调用方自身
///   是否也持有一个端点锁，决定回退路径选用哪种死锁规避原语；
/// - **返回值**：成功时归还同一把（仍然持有的）Pair 互斥锁守卫，供调用方继续使用；
///   失败（glare）时 Pair 已被销毁，不再归还守卫。
pub fn queue_frame<'p>(
    pair: &'p Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    mut guard: MutexGuard<'p, PairState>,
    direction: Leg,
    frame: Frame,
    self_handle: Option<&EndpointHandle>,
    self_locked: bool,
) -> LocalResult<MutexGuard<'p, PairState>> {
    let is_ringing = frame.is_ringing_control();
    let is_media = frame.is_media();

    loop {
        let Some(other) = guard.partner_of(direction).cloned() else {
            return Ok(guard);
        };

        if is_media {
            let both_have_generator = guard
                .a_handle
                .as_ref()
                .is_some_and(|h| h.has_generator())
                && guard.b_handle.as_ref().is_some_and(|h| h.has_generator());
            if both_have_generator {
                tracing::trace!(call_id = %pair.id, "dropping media frame: both legs have a generator attached");
                return Ok(guard);
            }
        }

        guard.flags.insert(PairFlags::GLARE_DETECT);

        if other.try_lock() {
            let cancelled = guard.flags.contains(PairFlags::CANCEL_QUEUE);
            if cancelled {
                drop(guard);
                other.unlock();
                destroy(pair, registry);
                tracing::warn!(call_id = %pair.id, "glare: hangup won the race with an in-flight frame");
                return Err(LocalError::Glare {
                    call_id: pair.id.clone(),
                });
            }

            if is_ringing {
                other.set_state(ChannelState::Ringing);
            }

            other.queue().push(frame);
            other.unlock();
            guard.flags.remove(PairFlags::GLARE_DETECT);
            return Ok(guard);
        }

        // 争用：释放 Pair 互斥锁，依 `self_locked` 选用回退原语，然后从头重试。
        drop(guard);
        match (self_locked, self_handle) {
            (true, Some(handle)) => switch.deadlock_backoff_endpoint(handle),
            _ => switch.deadlock_backoff_sleep(),
        }
        guard = pair.lock();
    }
}
