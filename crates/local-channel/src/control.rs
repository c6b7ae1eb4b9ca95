//! # Control Surface：CLI 列举与管理动作
//!
//! ## 核心意图（Why）
//! - 给运维提供只读可见性（`local show channels`）与一个写操作入口（清除
//!   `NO_OPTIMIZATION`，以便下一次媒体写入时重新评估 Optimize-Away）。
//!
//! ## 锁序（How）
//! - 两条路径都先取注册表锁（隐含于 [`PairRegistry::snapshot`] 的分片遍历），
//!   再对单个 Pair 取互斥锁，绝不反向——与并发模型的锁层级一致。

use crate::error::{LocalError, LocalResult};
use crate::pair::PairFlags;
use crate::registry::PairRegistry;

/// `local show channels` 的一行输出。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelListingLine {
    pub a_name_or_unowned: String,
    pub extension: String,
    pub context: String,
}

impl core::fmt::Display for ChannelListingLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} -- {}@{}",
            self.a_name_or_unowned, self.extension, self.context
        )
    }
}

/// 枚举注册表，生成 CLI 展示所需的行；调用方负责在空集合时打印字面量
/// `No local channels in use`。
pub fn list_channels(registry: &PairRegistry) -> Vec<ChannelListingLine> {
    registry
        .snapshot()
        .into_iter()
        .map(|pair| {
            let guard = pair.lock();
            let a_name_or_unowned = guard
                .a_handle
                .as_ref()
                .map(|a| a.name())
                .unwrap_or_else(|| "<unowned>".to_owned());
            ChannelListingLine {
                a_name_or_unowned,
                extension: guard.extension.clone(),
                context: guard.context.clone(),
            }
        })
        .collect()
}

/// 渲染 `local show channels` 的完整文本输出（含"无通道"字面量）。
pub fn render_channel_listing(registry: &PairRegistry) -> String {
    let lines = list_channels(registry);
    if lines.is_empty() {
        return "No local channels in use".to_owned();
    }
    lines
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// 管理动作 `LocalOptimizeAway` 成功时的字面量响应。
pub const OPTIMIZE_AWAY_QUEUED: &str = "Queued channel to be optimized away";

/// 管理动作 `LocalOptimizeAway`：解析 `Channel` 请求头，校验其属于本驱动的注册表，
/// 清除 `NO_OPTIMIZATION`，使下一次符合条件的媒体写入触发自拼接。
pub fn optimize_away_action(registry: &PairRegistry, channel_header: Option<&str>) -> LocalResult<&'static str> {
    let name = match channel_header {
        Some(name) if !name.is_empty() => name,
        _ => {
            return Err(LocalError::MissingHeader { header: "Channel" });
        }
    };

    if !name.starts_with("Local/") {
        return Err(LocalError::NotALocalChannel {
            name: name.to_owned(),
        });
    }
    let Some((_prefix, tag_and_suffix)) = name.rsplit_once('-') else {
        return Err(LocalError::NotALocalChannel {
            name: name.to_owned(),
        });
    };
    let tag = tag_and_suffix.split(';').next().unwrap_or(tag_and_suffix);

    let Some(pair) = registry.get(tag) else {
        return Err(LocalError::UnknownChannel {
            name: name.to_owned(),
        });
    };

    let mut guard = pair.lock();
    let owns_name = guard
        .a_handle
        .as_ref()
        .is_some_and(|a| a.name() == name)
        || guard.b_handle.as_ref().is_some_and(|b| b.name() == name);
    if !owns_name {
        return Err(LocalError::NotALocalChannel {
            name: name.to_owned(),
        });
    }

    guard.flags.remove(PairFlags::NO_OPTIMIZATION);
    tracing::debug!(call_id = %pair.id, %name, "NO_OPTIMIZATION cleared by management action");
    Ok(OPTIMIZE_AWAY_QUEUED)
}
