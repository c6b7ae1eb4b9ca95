//! 仅供 `#[cfg(test)]` 单元测试使用的内存端点/交换机替身。
//!
//! 不是生产代码的一部分；真实交换机需实现 [`crate::switch::Endpoint`] 与
//! [`crate::switch::Switch`]，把各原语接到真正的调度器、锁表与媒体栈上。

#![cfg(test)]

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::LocalResult;
use crate::switch::{
    AudioHook, ChannelState, Endpoint, EndpointHandle, Frame, FrameQueue, JitterBufferConfig,
    MonitorSlot, Party, Switch,
};

#[derive(Debug)]
pub(crate) struct TestEndpoint {
    name: String,
    state: Mutex<ChannelState>,
    partner: Mutex<Option<EndpointHandle>>,
    queue: FrameQueue,
    monitor: Mutex<Option<MonitorSlot>>,
    audio_hooks: Mutex<Vec<AudioHook>>,
    caller: Mutex<Party>,
    connected_line: Mutex<Party>,
    redirecting: Mutex<Party>,
    dialed: Mutex<Party>,
    groups: Mutex<Vec<String>>,
    variables: Mutex<Vec<(String, String)>>,
    context: Mutex<String>,
    extension: Mutex<String>,
    language: Mutex<String>,
    accountcode: Mutex<String>,
    musicclass: Mutex<String>,
    linkedid: Mutex<String>,
    answered_elsewhere: AtomicBool,
    hangup_cause: AtomicI32,
    hungup: AtomicBool,
    generator: AtomicBool,
    locked: Mutex<bool>,
    moh_running: AtomicBool,
    t38_state: Mutex<Option<String>>,
    jitter_buffer: Mutex<Option<JitterBufferConfig>>,
}

impl TestEndpoint {
    pub(crate) fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(ChannelState::Down),
            partner: Mutex::new(None),
            queue: FrameQueue::new(),
            monitor: Mutex::new(None),
            audio_hooks: Mutex::new(Vec::new()),
            caller: Mutex::new(Party::default()),
            connected_line: Mutex::new(Party::default()),
            redirecting: Mutex::new(Party::default()),
            dialed: Mutex::new(Party::default()),
            groups: Mutex::new(Vec::new()),
            variables: Mutex::new(Vec::new()),
            context: Mutex::new(String::new()),
            extension: Mutex::new(String::new()),
            language: Mutex::new("en".to_owned()),
            accountcode: Mutex::new(String::new()),
            musicclass: Mutex::new(String::new()),
            linkedid: Mutex::new(String::new()),
            answered_elsewhere: AtomicBool::new(false),
            hangup_cause: AtomicI32::new(0),
            hungup: AtomicBool::new(false),
            generator: AtomicBool::new(false),
            locked: Mutex::new(false),
            moh_running: AtomicBool::new(false),
            t38_state: Mutex::new(None),
            jitter_buffer: Mutex::new(None),
        })
    }

    pub(crate) fn set_bridge_partner(&self, partner: Option<EndpointHandle>) {
        *self.partner.lock() = partner;
    }

    pub(crate) fn set_generator(&self, attached: bool) {
        self.generator.store(attached, Ordering::SeqCst);
    }

    pub(crate) fn moh_running(&self) -> bool {
        self.moh_running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_t38_state(&self, state: Option<String>) {
        *self.t38_state.lock() = state;
    }

    pub(crate) fn set_hungup(&self, value: bool) {
        self.hungup.store(value, Ordering::SeqCst);
    }

    pub(crate) fn configured_jitter_buffer(&self) -> Option<JitterBufferConfig> {
        self.jitter_buffer.lock().clone()
    }
}

impl Endpoint for TestEndpoint {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.lock() = state;
    }

    fn bridge_partner(&self) -> Option<EndpointHandle> {
        self.partner.lock().clone()
    }

    fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    fn monitor(&self) -> Option<MonitorSlot> {
        self.monitor.lock().clone()
    }

    fn set_monitor(&self, monitor: Option<MonitorSlot>) {
        *self.monitor.lock() = monitor;
    }

    fn audio_hooks(&self) -> Vec<AudioHook> {
        self.audio_hooks.lock().clone()
    }

    fn set_audio_hooks(&self, hooks: Vec<AudioHook>) {
        *self.audio_hooks.lock() = hooks;
    }

    fn caller(&self) -> Party {
        self.caller.lock().clone()
    }

    fn set_caller(&self, party: Party) {
        *self.caller.lock() = party;
    }

    fn connected_line(&self) -> Party {
        self.connected_line.lock().clone()
    }

    fn set_connected_line(&self, party: Party) {
        *self.connected_line.lock() = party;
    }

    fn redirecting(&self) -> Party {
        self.redirecting.lock().clone()
    }

    fn set_redirecting(&self, party: Party) {
        *self.redirecting.lock() = party;
    }

    fn dialed(&self) -> Party {
        self.dialed.lock().clone()
    }

    fn set_dialed(&self, party: Party) {
        *self.dialed.lock() = party;
    }

    fn groups(&self) -> Vec<String> {
        self.groups.lock().clone()
    }

    fn set_groups(&self, groups: Vec<String>) {
        *self.groups.lock() = groups;
    }

    fn variables(&self) -> Vec<(String, String)> {
        self.variables.lock().clone()
    }

    fn set_variable(&self, key: &str, value: &str) {
        let mut vars = self.variables.lock();
        if let Some(existing) = vars.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value.to_owned();
        } else {
            vars.push((key.to_owned(), value.to_owned()));
        }
    }

    fn get_variable(&self, key: &str) -> Option<String> {
        self.variables
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn context(&self) -> String {
        self.context.lock().clone()
    }

    fn set_context(&self, context: &str) {
        *self.context.lock() = context.to_owned();
    }

    fn extension(&self) -> String {
        self.extension.lock().clone()
    }

    fn set_extension(&self, extension: &str) {
        *self.extension.lock() = extension.to_owned();
    }

    fn priority(&self) -> i32 {
        1
    }

    fn language(&self) -> String {
        self.language.lock().clone()
    }

    fn set_language(&self, language: &str) {
        *self.language.lock() = language.to_owned();
    }

    fn accountcode(&self) -> String {
        self.accountcode.lock().clone()
    }

    fn set_accountcode(&self, accountcode: &str) {
        *self.accountcode.lock() = accountcode.to_owned();
    }

    fn musicclass(&self) -> String {
        self.musicclass.lock().clone()
    }

    fn set_musicclass(&self, musicclass: &str) {
        *self.musicclass.lock() = musicclass.to_owned();
    }

    fn linkedid(&self) -> String {
        self.linkedid.lock().clone()
    }

    fn answered_elsewhere(&self) -> bool {
        self.answered_elsewhere.load(Ordering::SeqCst)
    }

    fn set_answered_elsewhere(&self, value: bool) {
        self.answered_elsewhere.store(value, Ordering::SeqCst);
    }

    fn hangup_cause(&self) -> i32 {
        self.hangup_cause.load(Ordering::SeqCst)
    }

    fn set_hangup_cause(&self, cause: i32) {
        self.hangup_cause.store(cause, Ordering::SeqCst);
    }

    fn is_hungup(&self) -> bool {
        self.hungup.load(Ordering::SeqCst)
    }

    fn has_generator(&self) -> bool {
        self.generator.load(Ordering::SeqCst)
    }

    fn try_lock(&self) -> bool {
        let mut locked = self.locked.lock();
        if *locked {
            false
        } else {
            *locked = true;
            true
        }
    }

    fn lock(&self) {
        loop {
            if self.try_lock() {
                return;
            }
            std::thread::yield_now();
        }
    }

    fn unlock(&self) {
        *self.locked.lock() = false;
    }

    fn start_moh(&self) {
        self.moh_running.store(true, Ordering::SeqCst);
    }

    fn stop_moh(&self) {
        self.moh_running.store(false, Ordering::SeqCst);
    }

    fn query_t38_state(&self) -> Option<String> {
        self.t38_state.lock().clone()
    }

    fn configure_jitter_buffer(&self, config: &JitterBufferConfig) {
        *self.jitter_buffer.lock() = Some(config.clone());
    }
}

/// 双向绑定两个测试端点为彼此的桥接伙伴。
pub(crate) fn bridge(a: &Arc<TestEndpoint>, b: &Arc<TestEndpoint>) {
    let handle_a: EndpointHandle = Arc::clone(a) as EndpointHandle;
    let handle_b: EndpointHandle = Arc::clone(b) as EndpointHandle;
    a.set_bridge_partner(Some(handle_b));
    b.set_bridge_partner(Some(handle_a));
}

/// 一个极简的内存交换机替身：`queue_frame`/`queue_hangup` 直接落地到端点自身的队列，
/// `masquerade` 只记录一次调用用于断言，拨号计划存在性由预置集合判定。
#[derive(Debug, Default)]
pub(crate) struct TestSwitch {
    pub(crate) known_extensions: Mutex<Vec<(String, String)>>,
    pub(crate) masquerade_calls: Mutex<Vec<(String, String)>>,
}

impl TestSwitch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_extension(&self, context: &str, extension: &str) {
        self.known_extensions
            .lock()
            .push((context.to_owned(), extension.to_owned()));
    }
}

impl Switch for TestSwitch {
    fn queue_frame(&self, target: &EndpointHandle, frame: Frame) {
        target.queue().push(frame);
    }

    fn queue_hangup(&self, target: &EndpointHandle) {
        target.queue().push(Frame::Hangup { cause: 16 });
    }

    fn masquerade(&self, into: &EndpointHandle, from: &EndpointHandle) -> LocalResult<()> {
        self.masquerade_calls.lock().push((into.name(), from.name()));
        Ok(())
    }

    fn hangup(&self, target: &EndpointHandle, cause: i32) {
        target.set_hangup_cause(cause);
    }

    fn pbx_start(&self, _target: &EndpointHandle) -> LocalResult<()> {
        Ok(())
    }

    fn best_codec(&self, requested: &str) -> String {
        requested.to_owned()
    }

    fn datastore_inherit(&self, _from: &EndpointHandle, _to: &EndpointHandle) {}

    fn group_update(&self, _target: &EndpointHandle) {}

    fn copy_vars(&self, from: &EndpointHandle, to: &EndpointHandle) {
        for (key, value) in from.variables() {
            to.set_variable(&key, &value);
        }
    }

    fn extension_exists(&self, context: &str, extension: &str) -> bool {
        self.known_extensions
            .lock()
            .iter()
            .any(|(c, e)| c == context && e == extension)
    }

    fn create_endpoint(&self, name: &str, initial_state: ChannelState) -> LocalResult<EndpointHandle> {
        let endpoint = TestEndpoint::new(name);
        endpoint.set_state(initial_state);
        Ok(endpoint as EndpointHandle)
    }

    fn resolved_bridge_peer(&self, handle: &EndpointHandle) -> Option<EndpointHandle> {
        // 测试替身不建模嵌套代理，单跳伙伴即是"真实"对端。
        handle.bridge_partner()
    }

    fn deadlock_backoff_endpoint(&self, handle: &EndpointHandle) {
        handle.unlock();
        std::thread::yield_now();
        handle.lock();
    }

    fn deadlock_backoff_sleep(&self) {
        std::thread::yield_now();
    }
}
