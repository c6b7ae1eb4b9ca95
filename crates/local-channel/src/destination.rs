//! # destination 模块说明
//!
//! ## 角色定位（Why）
//! - 解析 `request()`/`devicestate()` 收到的目的地字符串 `EXTEN[/OPTS][@CONTEXT]`；
//! - 将字符串形式的选项字母翻译为 [`crate::pair::PairFlags`]，供 Pair 分配时一次性写入。
//!
//! ## 解析顺序（How）——已解决的 Open Question
//! 源实现先剥离 `/OPTS`，再在剩余部分中寻找 `@`，这意味着 `/` 必须出现在 `@` 之前；
//! 本模块按此顺序实现，以保持位兼容，即便 `@CONTEXT/OPTS` 同样自然。

use crate::error::{LocalError, LocalResult};
use crate::pair::PairFlags;

/// 默认拨号计划上下文，当目的地字符串未携带 `@CONTEXT` 时使用。
pub const DEFAULT_CONTEXT: &str = "default";

/// 解析后的目的地，携带分机、上下文与派生的选项标志。
///
/// # 教案式说明
/// - **契约 (What)**：`extension`/`context` 均为拥有所有权的 `String`，便于跨线程传递；
///   `flags` 是从 `/OPTS` 派生的只读标志集合，参见 [`PairFlags`]。
/// - **风险 (Trade-offs)**：保留原始 `raw` 字符串，仅用于 CC-interfaces 变量与诊断日志。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Destination {
    extension: String,
    context: String,
    flags: PairFlags,
    raw: String,
}

impl Destination {
    /// 解析 `EXTEN[/OPTS][@CONTEXT]` 形式的目的地字符串。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：`request()` 与 `devicestate()` 共用同一套解析规则；
    /// - **执行 (How)**：先在原始字符串中寻找 `/`，若存在则其后、`@` 之前的部分视为
    ///   选项字母序列；再在去除 `/OPTS` 的剩余部分中寻找 `@CONTEXT`；
    /// - **契约 (What)**：
    ///   - 未识别的选项字母被忽略（不报错，仅跳过），保持与历史行为兼容；
    ///   - `j` 选项若未伴随 `n`，记录到返回值的 `ignored_option_errors` 附注中，
    ///     由调用方决定是否记录 `warn!` 日志；
    ///   - 缺失 `@CONTEXT` 时默认为 [`DEFAULT_CONTEXT`]。
    pub fn parse(raw: &str) -> (Self, Vec<LocalError>) {
        let mut warnings = Vec::new();

        let (before_opts, opts_and_rest) = match raw.split_once('/') {
            Some((ext, rest)) => (ext, Some(rest)),
            None => (raw, None),
        };

        // 未出现 `/`：整个字符串是 `EXTEN[@CONTEXT]`。
        let (extension, context) = match opts_and_rest {
            None => split_context(before_opts),
            Some(rest) => {
                // `rest` 形如 `OPTS[@CONTEXT]`：选项字母在 `@` 之前。
                let (opts, context_part) = split_context(rest);
                let mut flags = PairFlags::empty();
                // `n` 与 `j` 的相对书写顺序不影响判定：只要同一个 `/OPTS` 片段里两者共存即可。
                let has_n = opts.contains('n');

                for ch in opts.chars() {
                    match ch {
                        'n' => flags |= PairFlags::NO_OPTIMIZATION,
                        'j' => {
                            if has_n {
                                flags |= PairFlags::JITTER_BUFFER;
                            } else {
                                warnings.push(LocalError::OptionRequiresOption {
                                    option: 'j',
                                    requires: 'n',
                                });
                            }
                        }
                        'b' => flags |= PairFlags::BRIDGE_REPORT,
                        'm' => flags |= PairFlags::MOH_PASSTHRU,
                        _ => {
                            tracing::debug!(option = %ch, "ignoring unrecognized Local option letter");
                        }
                    }
                }

                return (
                    Self {
                        extension: before_opts.to_owned(),
                        context: context_part.unwrap_or(DEFAULT_CONTEXT).to_owned(),
                        flags,
                        raw: raw.to_owned(),
                    },
                    warnings,
                );
            }
        };

        (
            Self {
                extension: extension.to_owned(),
                context: context.unwrap_or(DEFAULT_CONTEXT).to_owned(),
                flags: PairFlags::empty(),
                raw: raw.to_owned(),
            },
            warnings,
        )
    }

    /// 严格解析，将解析过程中的告警直接转化为 `tracing::warn!` 日志。
    ///
    /// - **意图 (Why)**：多数调用点不关心告警列表本身，只需要它们被记录；
    /// - **契约 (What)**：返回值与 [`Destination::parse`] 相同的 `Self`，告警已被消费。
    pub fn parse_logged(raw: &str) -> Self {
        let (dest, warnings) = Self::parse(raw);
        for warning in warnings {
            tracing::warn!(%warning, "destination option ignored");
        }
        dest
    }

    /// 要求目的地包含显式 `@CONTEXT`，否则返回 [`LocalError::BadDestination`]。
    ///
    /// - **意图 (Why)**：`devicestate()` 按 §7 要求在缺少上下文时记录告警并返回 INVALID；
    /// - **契约 (What)**：本方法只做存在性校验，默认上下文的填充逻辑保持不变。
    pub fn require_explicit_context(raw: &str) -> LocalResult<Self> {
        if !raw.contains('@') {
            return Err(LocalError::BadDestination {
                input: raw.to_owned(),
            });
        }
        Ok(Self::parse_logged(raw))
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn flags(&self) -> PairFlags {
        self.flags
    }

    /// CC-interfaces 变量使用的字符串：原始目的地去除任何 `/...` 后缀。
    pub fn cc_interfaces(&self) -> String {
        match self.raw.split_once('/') {
            Some((before, _)) => before.to_owned(),
            None => self.raw.clone(),
        }
    }
}

impl core::fmt::Display for Destination {
    /// 重新拼装为 `EXTEN[/OPTS]@CONTEXT`，用于可测试属性 7（解析-再序列化幂等）。
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.extension)?;
        let opts = self.flags.option_letters();
        if !opts.is_empty() {
            write!(f, "/{opts}")?;
        }
        write!(f, "@{}", self.context)
    }
}

/// 在 `@` 处切分，返回 `(前缀, 可选的上下文)`。
fn split_context(s: &str) -> (&str, Option<&str>) {
    match s.split_once('@') {
        Some((before, after)) => (before, Some(after)),
        None => (s, None),
    }
}
