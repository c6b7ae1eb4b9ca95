//! # Endpoint Adapter：面向交换机的通道驱动操作集
//!
//! ## 核心意图（Why）
//! - 把交换机对任一端点发起的每一类操作（应答、读、写、指示、DTMF、文本/HTML、
//!   `fixup`、选项查询、桥接伙伴查询、设备状态）翻译为对 Pair 共享状态与帧转发器
//!   的调用，按 `direction_of(ast)` 分派到 `A`/`B` 两侧各自的语义。
//!
//! ## 架构定位（Where）
//! - 本模块不持有任何状态，所有函数都接收 `&Arc<Pair>` 与外部协作者
//!   （[`crate::registry::PairRegistry`]、`dyn Switch`）作为参数，与
//!   [`crate::forwarder`]、[`crate::optimize`] 保持同样的无状态风格。

use std::sync::Arc;

use crate::destination::Destination;
use crate::error::{LocalError, LocalResult};
use crate::forwarder;
use crate::optimize;
use crate::pair::{Leg, Pair, PairFlags};
use crate::registry::PairRegistry;
use crate::switch::{ControlKind, EndpointHandle, Frame, Switch};

/// `answer(ast)`：只在 `B` 侧合法，向 `A` 转发一个控制应答帧。
pub fn answer(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    ast: &EndpointHandle,
) -> LocalResult<()> {
    let guard = pair.lock();
    let leg = guard.direction_of(ast);
    match leg {
        Some(Leg::B) => {
            forwarder::queue_frame(
                pair,
                registry,
                switch,
                guard,
                Leg::B,
                Frame::Control(ControlKind::Answer),
                Some(ast),
                false,
            )?;
            Ok(())
        }
        _ => {
            tracing::warn!(call_id = %pair.id, "answer() rejected on the A leg");
            Err(LocalError::AnswerOnALeg {
                call_id: pair.id.clone(),
            })
        }
    }
}

/// `read(ast)`：本驱动从不直接产生帧，调用方总是拿到哨兵帧。
pub fn read(_ast: &EndpointHandle) -> Frame {
    Frame::Null
}

/// `exception(ast)`：与 `read` 行为完全一致，供宿主在异常通道上复用同一只读路径。
pub fn exception(ast: &EndpointHandle) -> Frame {
    read(ast)
}

/// `write(ast, frame)`：先尝试 Optimize-Away（仅当 `B` 侧收到媒体帧时），再转发。
pub fn write(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    ast: &EndpointHandle,
    frame: Frame,
) -> LocalResult<()> {
    let mut guard = pair.lock();
    let leg = guard.direction_of(ast);

    if leg == Some(Leg::B) && frame.is_media() {
        if optimize::try_optimize_away(pair, switch, &mut guard) {
            // 身份已迁移，这一帧连同此后的写入都不再转发。
            return Ok(());
        }
    }

    let Some(leg) = leg else {
        return Err(LocalError::Internal {
            detail: format!("write() called with unknown endpoint `{}`", ast.name()),
        });
    };

    forwarder::queue_frame(pair, registry, switch, guard, leg, frame, Some(ast), false)?;
    Ok(())
}

/// `write_video(ast, frame)`：与 `write` 行为完全一致，视频帧走同一条 Optimize-Away
/// 判定与转发路径。
pub fn write_video(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    ast: &EndpointHandle,
    frame: Frame,
) -> LocalResult<()> {
    write(pair, registry, switch, ast, frame)
}

/// `indicate(ast, control)`：HOLD/UNHOLD 的本地化 vs 透传、CONNECTED_LINE/REDIRECTING
/// 的权威数据转发、其余条件的原样转发。
pub fn indicate(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    ast: &EndpointHandle,
    control: ControlKind,
) -> LocalResult<()> {
    let mut guard = pair.lock();
    let Some(leg) = guard.direction_of(ast) else {
        return Err(LocalError::Internal {
            detail: format!("indicate() called with unknown endpoint `{}`", ast.name()),
        });
    };

    match control {
        ControlKind::Hold | ControlKind::Unhold => {
            if guard.flags.contains(PairFlags::MOH_PASSTHRU) {
                drop(guard);
                forward_control(pair, registry, switch, leg, control, Some(ast))?;
            } else {
                match control {
                    ControlKind::Hold => ast.start_moh(),
                    ControlKind::Unhold => ast.stop_moh(),
                    _ => unreachable!(),
                }
            }
            Ok(())
        }
        ControlKind::ConnectedLine(_) => {
            let authoritative = ast.connected_line();
            if leg == Leg::B {
                if let Some(a) = guard.handle_of(Leg::A) {
                    a.set_caller(authoritative.clone());
                }
            }
            drop(guard);
            forward_control(
                pair,
                registry,
                switch,
                leg,
                ControlKind::ConnectedLine(authoritative),
                Some(ast),
            )?;
            Ok(())
        }
        ControlKind::Redirecting(_) => {
            let authoritative = ast.redirecting();
            drop(guard);
            forward_control(
                pair,
                registry,
                switch,
                leg,
                ControlKind::Redirecting(authoritative),
                Some(ast),
            )?;
            Ok(())
        }
        other => {
            drop(guard);
            forward_control(pair, registry, switch, leg, other, Some(ast))?;
            Ok(())
        }
    }
}

fn forward_control(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    leg: Leg,
    control: ControlKind,
    self_handle: Option<&EndpointHandle>,
) -> LocalResult<()> {
    let guard = pair.lock();
    forwarder::queue_frame(
        pair,
        registry,
        switch,
        guard,
        leg,
        Frame::Control(control),
        self_handle,
        false,
    )?;
    Ok(())
}

/// `digit_begin(ast, digit)`：转发一个 DTMF-begin 帧。
pub fn digit_begin(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    ast: &EndpointHandle,
    digit: char,
) -> LocalResult<()> {
    forward_from(pair, registry, switch, ast, Frame::DtmfBegin(digit))
}

/// `digit_end(ast, digit, duration)`：转发一个 DTMF-end 帧。
pub fn digit_end(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    ast: &EndpointHandle,
    digit: char,
    duration_ms: u32,
) -> LocalResult<()> {
    forward_from(
        pair,
        registry,
        switch,
        ast,
        Frame::DtmfEnd { digit, duration_ms },
    )
}

/// `sendtext(ast, text)`：转发一个文本帧。
pub fn sendtext(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    ast: &EndpointHandle,
    text: String,
) -> LocalResult<()> {
    forward_from(pair, registry, switch, ast, Frame::Text(text))
}

/// `sendhtml(ast, subclass, data)`：转发一个 HTML 帧。
pub fn sendhtml(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    ast: &EndpointHandle,
    subclass: i32,
    data: Vec<u8>,
) -> LocalResult<()> {
    forward_from(pair, registry, switch, ast, Frame::Html { subclass, data })
}

fn forward_from(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    ast: &EndpointHandle,
    frame: Frame,
) -> LocalResult<()> {
    let guard = pair.lock();
    let Some(leg) = guard.direction_of(ast) else {
        return Err(LocalError::Internal {
            detail: format!("write path called with unknown endpoint `{}`", ast.name()),
        });
    };
    forwarder::queue_frame(pair, registry, switch, guard, leg, frame, Some(ast), false)?;
    Ok(())
}

/// `fixup(old, new)`：把匹配 `old` 的槽位替换为 `new`；两侧都不匹配时失败。
pub fn fixup(pair: &Arc<Pair>, old: &EndpointHandle, new: EndpointHandle) -> LocalResult<()> {
    let mut guard = pair.lock();
    if guard.a_handle.as_ref().is_some_and(|h| h.name() == old.name()) {
        guard.a_handle = Some(new);
        Ok(())
    } else if guard.b_handle.as_ref().is_some_and(|h| h.name() == old.name()) {
        guard.b_handle = Some(new);
        Ok(())
    } else {
        Err(LocalError::FixupUnknownHandle {
            call_id: pair.id.clone(),
        })
    }
}

/// `query_option(ast, option)`：仅支持 `T38_STATE`，答案来自对侧端点的桥接伙伴（`far`）。
///
/// 锁序：pair 互斥锁 → `far` → `far` 的桥接伙伴，与并发模型的锁层级一致；`far`
/// 的桥接伙伴仅用于占位这一级锁，不作为答案来源。
pub fn query_option(
    pair: &Arc<Pair>,
    switch: &dyn Switch,
    ast: &EndpointHandle,
    option: &str,
) -> LocalResult<String> {
    if option != "T38_STATE" {
        return Err(LocalError::UnsupportedQueryOption {
            option: option.to_owned(),
        });
    }

    let not_supported = || LocalError::UnsupportedQueryOption {
        option: option.to_owned(),
    };

    let mut guard = pair.lock();
    loop {
        let Some(leg) = guard.direction_of(ast) else {
            return Err(LocalError::Internal {
                detail: format!("query_option() called with unknown endpoint `{}`", ast.name()),
            });
        };
        let Some(remote) = guard.partner_of(leg).cloned() else {
            return Err(not_supported());
        };
        let Some(far) = remote.bridge_partner() else {
            return Err(not_supported());
        };

        if !far.try_lock() {
            drop(guard);
            switch.deadlock_backoff_sleep();
            guard = pair.lock();
            continue;
        }

        let far_bridge = far.bridge_partner();
        let far_bridge_locked = match &far_bridge {
            Some(fb) => fb.try_lock(),
            None => true,
        };
        if !far_bridge_locked {
            far.unlock();
            drop(guard);
            switch.deadlock_backoff_sleep();
            guard = pair.lock();
            continue;
        }

        let answer = far.query_t38_state();

        if let Some(fb) = &far_bridge {
            fb.unlock();
        }
        far.unlock();

        return answer.ok_or_else(not_supported);
    }
}

/// `bridged_channel(ast, bridge)`：`BRIDGE_REPORT` 置位时见穿到远端伙伴，否则原样返回。
pub fn bridged_channel(
    pair: &Arc<Pair>,
    ast: &EndpointHandle,
    bridge: EndpointHandle,
) -> EndpointHandle {
    let guard = pair.lock();
    if !guard.flags.contains(PairFlags::BRIDGE_REPORT) {
        return bridge;
    }
    let Some(leg) = guard.direction_of(ast) else {
        return bridge;
    };
    guard
        .partner_of(leg)
        .and_then(|partner| partner.bridge_partner())
        .unwrap_or(bridge)
}

/// 设备状态查询结果，对应交换机通道驱动约定的三态子集。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceState {
    Invalid,
    InUse,
    NotInUse,
}

/// `devicestate(dest_string)`：解析目的地，校验分机存在性，再扫描注册表判定占用状态。
pub fn devicestate(registry: &PairRegistry, switch: &dyn Switch, dest_string: &str) -> DeviceState {
    let dest = match Destination::require_explicit_context(dest_string) {
        Ok(dest) => dest,
        Err(err) => {
            tracing::warn!(%err, "devicestate: bad destination");
            return DeviceState::Invalid;
        }
    };

    if !switch.extension_exists(dest.context(), dest.extension()) {
        return DeviceState::Invalid;
    }

    let in_use = registry.snapshot().into_iter().any(|pair| {
        let guard = pair.lock();
        guard.context == dest.context() && guard.extension == dest.extension() && guard.a_handle.is_some()
    });

    if in_use {
        DeviceState::InUse
    } else {
        DeviceState::NotInUse
    }
}
