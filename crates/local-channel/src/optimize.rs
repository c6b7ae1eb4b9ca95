//! # Optimize-Away Engine：身份拼接（masquerade）
//!
//! ## 核心意图（Why）
//! - 当 `B` 侧的拨号计划已经把它桥接到一个具体的远端时，把 `A` 的外部对端直接
//!   拼接到该远端身上，令 Pair 从调用图中退出。
//!
//! ## 触发时机（Where）
//! - 由 [`crate::endpoint::write`] 在 `B` 侧收到首个媒体（音频/视频）帧时调用。
//!
//! ## 资格判定（What）
//! - `ALREADY_MASQED` 未置位，`NO_OPTIMIZATION` 未置位；
//! - `A`、`B` 均存活；
//! - `B` 的单跳桥接伙伴与其"穿透中间代理后"解析出的真实伙伴一致（确有远端，而非
//!   又一层代理）；
//! - `A` 的入站队列为空（否则拼接期间可能丢帧或乱序）。
//!
//! ## 拼接步骤（How）
//! 1. 若 `A` 有录音挂载点而远端没有，则在二者之间交换；
//! 2. 在 `B` 与 `A` 之间交换音频钩子列表；
//! 3. 对 `A` 拥有有效字段的身份信息（主叫、重定向、呼出），与远端交换（而非拷贝，
//!    以便将来若新桥接被放弃，远端仍能找回原值）；
//! 4. 将群组成员关系从 `B` 拷贝到 `A`；
//! 5. 调用宿主的 `masquerade(A, 远端)`；
//! 6. 置位 `ALREADY_MASQED`，释放两把额外的锁。
//!
//! 资格判定失败或锁争用都只是静默放弃——下一次媒体写入会重新评估。

use std::sync::Arc;

use parking_lot::MutexGuard;

use crate::pair::{Pair, PairFlags, PairState};
use crate::switch::{EndpointHandle, Party, Switch};

fn party_is_valid(party: &Party) -> bool {
    party.number.is_some() || party.name.is_some() || !party.extra.is_empty()
}

fn swap_party(a: &EndpointHandle, peer: &EndpointHandle, a_party: Party, peer_party: Party) {
    a.set_caller(peer_party);
    peer.set_caller(a_party);
}

/// 评估并（若符合条件）执行一次身份拼接。
///
/// # 教案式说明
/// - **返回值 (What)**：`true` 表示本次调用触发了拼接（调用方应随即丢弃正在转发
///   的那一帧，因为身份已经迁移）；`false` 表示未拼接（不符合条件或锁争用），
///   调用方应继续走正常的转发路径。
/// - **前置条件**：调用方必须已经持有 `pair` 的互斥锁（`guard`）。
pub fn try_optimize_away(pair: &Arc<Pair>, switch: &dyn Switch, guard: &mut MutexGuard<'_, PairState>) -> bool {
    if guard.flags.contains(PairFlags::ALREADY_MASQED) || guard.flags.contains(PairFlags::NO_OPTIMIZATION) {
        return false;
    }

    let (Some(a), Some(b)) = (guard.a_handle.clone(), guard.b_handle.clone()) else {
        return false;
    };

    let Some(one_hop) = b.bridge_partner() else {
        return false;
    };
    let Some(resolved) = switch.resolved_bridge_peer(&b) else {
        return false;
    };
    if one_hop.name() != resolved.name() {
        // B 桥接的是另一层代理，而非具体远端；暂不拼接。
        return false;
    }
    let far_peer = resolved;

    if !a.queue().is_empty() {
        return false;
    }

    if !far_peer.try_lock() {
        return false;
    }
    if !a.try_lock() {
        far_peer.unlock();
        return false;
    }

    if a.is_hungup() || far_peer.is_hungup() {
        a.unlock();
        far_peer.unlock();
        return false;
    }

    // 1. 录音挂载点：A 有、远端没有时才交换。
    if let Some(monitor) = a.monitor() {
        if far_peer.monitor().is_none() {
            a.set_monitor(None);
            far_peer.set_monitor(Some(monitor));
        }
    }

    // 2. 音频钩子：在 B 与 A 之间交换。
    let b_hooks = b.audio_hooks();
    let a_hooks = a.audio_hooks();
    b.set_audio_hooks(a_hooks);
    a.set_audio_hooks(b_hooks);

    // 3. 身份信息：A 有有效字段时与远端交换（caller / redirecting / dialed）。
    let a_caller = a.caller();
    if party_is_valid(&a_caller) {
        swap_party(&a, &far_peer, a_caller, far_peer.caller());
    }
    let a_redirecting = a.redirecting();
    if party_is_valid(&a_redirecting) {
        let peer_redirecting = far_peer.redirecting();
        a.set_redirecting(far_peer.redirecting());
        far_peer.set_redirecting(a_redirecting);
        let _ = peer_redirecting;
    }
    let a_dialed = a.dialed();
    if party_is_valid(&a_dialed) {
        let peer_dialed = far_peer.dialed();
        a.set_dialed(far_peer.dialed());
        far_peer.set_dialed(a_dialed);
        let _ = peer_dialed;
    }

    // 4. 群组成员关系：从 B 拷贝到 A。
    a.set_groups(b.groups());

    let masquerade_result = switch.masquerade(&a, &far_peer);

    a.unlock();
    far_peer.unlock();

    match masquerade_result {
        Ok(()) => {
            guard.flags.insert(PairFlags::ALREADY_MASQED);
            tracing::info!(call_id = %pair.id, a = %a.name(), peer = %far_peer.name(), "local channel pair optimized away");
            true
        }
        Err(err) => {
            tracing::warn!(call_id = %pair.id, error = %err, "masquerade failed; pair remains in the call graph");
            false
        }
    }
}
