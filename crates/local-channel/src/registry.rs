//! # PairRegistry：进程范围内存活 Pair 的枚举表
//!
//! ## 核心意图（Why）
//! - 提供基于 `DashMap` 的并发安全存储，支撑 CLI 列举、设备状态查询与管理动作对
//!   存活 Pair 的枚举；
//! - Pair 从分配到挂断完成期间始终出现在该集合中。
//!
//! ## 行为契约（What）
//! - `insert`：注册新分配的 Pair；
//! - `remove`：挂断完成后原子移除；
//! - `iter`/`len`：供 CLI 与设备状态只读遍历。
//!
//! ## 风险提示（Trade-offs）
//! - 注册表自身的锁与 Pair 互斥锁是两把不同的锁；注册表锁必须先于 Pair 互斥锁
//!   获取，从不反向。

use std::sync::Arc;

use dashmap::DashMap;

use crate::pair::Pair;

/// 进程范围内存活 Pair 的并发安全集合。
#[derive(Debug, Default)]
pub struct PairRegistry {
    pairs: DashMap<String, Arc<Pair>>,
}

impl PairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册新分配的 Pair。
    ///
    /// - **前置条件 (What)**：`pair.id` 应是分配时生成的唯一标签；重复插入会覆盖旧条目，
    ///   调用方需自行保证 ID 唯一（生命周期分配器负责生成不冲突的随机标签）。
    pub fn insert(&self, pair: Arc<Pair>) {
        self.pairs.insert(pair.id.clone(), pair);
    }

    /// 按 ID 查询 Pair 的共享引用。
    pub fn get(&self, id: &str) -> Option<Arc<Pair>> {
        self.pairs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// 挂断完成后移除并返回 Pair。
    pub fn remove(&self, id: &str) -> Option<Arc<Pair>> {
        self.pairs.remove(id).map(|(_, pair)| pair)
    }

    /// 当前存活 Pair 数量。
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// 遍历所有存活 Pair 的共享引用快照，供 CLI/设备状态只读扫描。
    ///
    /// - **风险 (Trade-offs)**：返回值是插入当时的快照克隆（`Arc` 克隆，非深拷贝），
    ///   遍历期间新增/移除的 Pair 不会出现在本次快照里，避免迭代器与 `DashMap`
    ///   分片锁互相阻塞。
    pub fn snapshot(&self) -> Vec<Arc<Pair>> {
        self.pairs.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}
