//! 批处理流水线: 重标注 -> 评估 -> 队列汇总.
//!
//! 病例之间相互独立. 开启 `rayon` feature 时病例被并行处理, 各线程之间只共享只读的配置.
//! 单个病例的致命错误 (几何错误, 网格不一致, 超时, 取消, 读取失败) 只会使该病例进入失败列表.
//! 汇总总是在所有病例结束之后, 按病例 id 排序后分块进行, 各块的部分汇总再按顺序合并,
//! 因此结果与完成顺序无关.

use crate::eval::{CaseScore, CohortStats, EvalConfig, Evaluator};
use crate::relabel::{RelabelConfig, Relabeled, Relabeler, Warning};
use crate::taxonomy::Taxonomy;
use crate::{Budget, CancelToken, Error, LabelVolume, Result};
use std::sync::Arc;
use std::time::Duration;

/// 队列汇总时每个分块的病例数.
const COHORT_CHUNK: usize = 64;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 流水线配置. 在整个批次中只读.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct PipelineConfig {
    /// 重标注配置. `None` 表示跳过重标注, 直接评估原始预测 (通常配合 `MatchMode::Overlap`).
    pub relabel: Option<RelabelConfig>,

    /// 评估配置.
    pub eval: EvalConfig,

    /// 结构分类表.
    pub taxonomy: Taxonomy,

    /// 单个病例的时间预算 (秒).
    pub case_timeout_secs: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            relabel: Some(RelabelConfig::ribcage()),
            eval: EvalConfig::default(),
            taxonomy: Taxonomy::ribcage(),
            case_timeout_secs: None,
        }
    }
}

impl PipelineConfig {
    /// 设置重标注配置.
    pub fn with_relabel(mut self, relabel: Option<RelabelConfig>) -> Self {
        self.relabel = relabel;
        self
    }

    /// 设置评估配置.
    pub fn with_eval(mut self, eval: EvalConfig) -> Self {
        self.eval = eval;
        self
    }

    /// 设置分类表.
    pub fn with_taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    /// 设置单个病例的时间预算.
    pub fn with_case_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.case_timeout_secs = timeout.map(|d| d.as_secs_f64());
        self
    }

    /// 单个病例的时间预算. 非法的秒数 (负数, NaN) 视为不限时.
    #[inline]
    pub fn case_timeout(&self) -> Option<Duration> {
        self.case_timeout_secs
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }
}

/// 一个待处理的病例.
#[derive(Clone, Debug)]
pub struct Case {
    /// 病例 id, 在批次内唯一.
    pub id: String,
    /// 预测.
    pub prediction: LabelVolume,
    /// 真值.
    pub truth: LabelVolume,
    /// 基线分割 (可选), 用于整体 Hausdorff 对比.
    pub baseline: Option<LabelVolume>,
    /// 取消标记.
    pub cancel: Option<CancelToken>,
}

impl Case {
    /// 创建病例.
    pub fn new<S: Into<String>>(id: S, prediction: LabelVolume, truth: LabelVolume) -> Self {
        Self {
            id: id.into(),
            prediction,
            truth,
            baseline: None,
            cancel: None,
        }
    }

    /// 附加基线分割.
    pub fn with_baseline(mut self, baseline: LabelVolume) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// 附加取消标记.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// 成功处理的病例.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CaseOutcome {
    /// 病例 id.
    pub id: String,
    /// 评估结果.
    pub score: CaseScore,
    /// 重标注产生的警告.
    pub warnings: Vec<Warning>,
    /// 重标注后没有分配到的分类表标签. 跳过重标注时为空.
    pub missing: Vec<u8>,
    /// 作为噪声丢弃的分量个数.
    pub discarded: usize,
    /// 保留但无法分配的分量个数.
    pub unassigned: usize,
}

/// 失败的病例.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CaseFailure {
    /// 病例 id.
    pub id: String,
    /// 失败原因.
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_error"))]
    pub error: Error,
}

#[cfg(feature = "serde")]
fn serialize_error<S: serde::Serializer>(e: &Error, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(e)
}

/// 单个病例的完整产物.
#[derive(Clone, Debug)]
pub struct ProcessedCase {
    /// 报告条目.
    pub outcome: CaseOutcome,
    /// 重标注后的体数据. 跳过重标注时为 `None`.
    pub relabeled: Option<LabelVolume>,
}

/// 整个批次的报告.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BatchReport {
    /// 成功的病例, 按 id 升序.
    pub outcomes: Vec<CaseOutcome>,
    /// 失败的病例, 按 id 升序.
    pub failures: Vec<CaseFailure>,
    /// 队列汇总.
    pub cohort: CohortStats,
}

impl BatchReport {
    /// 由各病例的结果组装报告.
    fn assemble(results: Vec<(String, Result<CaseOutcome>)>) -> Self {
        let mut ans = Self::default();
        for (id, r) in results {
            match r {
                Ok(o) => ans.outcomes.push(o),
                Err(error) => ans.failures.push(CaseFailure { id, error }),
            }
        }
        ans.outcomes.sort_by(|a, b| a.id.cmp(&b.id));
        ans.failures.sort_by(|a, b| a.id.cmp(&b.id));
        ans.cohort = cohort_of(&ans.outcomes, COHORT_CHUNK);
        ans
    }

    /// 是否有病例失败?
    #[inline]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// 病例总数 (包括失败的).
    #[inline]
    pub fn len(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }

    /// 是否为空批次?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 流水线.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    /// 以 `config` 创建流水线.
    #[inline]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// 获取配置.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 处理单个病例.
    pub fn run_case(&self, case: &Case) -> Result<ProcessedCase> {
        let cfg = &*self.config;
        let budget = Budget::new(cfg.case_timeout(), case.cancel.clone());
        budget.check()?;

        let relabeled: Option<Relabeled> = match &cfg.relabel {
            Some(rc) => Some(Relabeler::new(rc).relabel_with_budget(&case.prediction, &budget)?),
            None => {
                case.prediction.affine().validate()?;
                None
            }
        };
        budget.check()?;

        let pred = relabeled.as_ref().map_or(&case.prediction, Relabeled::volume);
        let score = Evaluator::new(&cfg.eval, &cfg.taxonomy).evaluate_with_baseline(
            pred,
            &case.truth,
            case.baseline.as_ref(),
            &budget,
        )?;

        for w in relabeled.iter().flat_map(|r| r.warnings()) {
            log::warn!("case {}: {w}", case.id);
        }
        log::info!(
            "case {}: overall dice {:.4} ({})",
            case.id,
            score.overall_dice(),
            score.verdict()
        );
        if let Some(b) = score.baseline() {
            log::info!(
                "case {}: {:+.2}% hausdorff vs baseline ({})",
                case.id,
                b.improvement_pct,
                b.severity
            );
        }

        let outcome = CaseOutcome {
            id: case.id.clone(),
            score,
            warnings: relabeled.as_ref().map_or_else(Vec::new, |r| r.warnings().to_vec()),
            missing: relabeled
                .as_ref()
                .map_or_else(Vec::new, |r| r.missing_from(&cfg.taxonomy)),
            discarded: relabeled.as_ref().map_or(0, Relabeled::discarded),
            unassigned: relabeled.as_ref().map_or(0, |r| r.unassigned().len()),
        };
        Ok(ProcessedCase {
            outcome,
            relabeled: relabeled.map(Relabeled::into_volume),
        })
    }

    /// 处理单个病例, 把重标注结果交给 `sink`, 只返回报告条目.
    /// `sink` 失败 (通常是 [`Error::Unwritable`]) 时该病例失败.
    fn process<F>(&self, case: &Case, sink: &F) -> Result<CaseOutcome>
    where
        F: Fn(&str, &LabelVolume) -> Result<()> + Sync,
    {
        let ProcessedCase { outcome, relabeled } = self.run_case(case)?;
        if let Some(v) = relabeled {
            sink(&case.id, &v)?;
        }
        Ok(outcome)
    }

    /// 处理整个批次.
    #[inline]
    pub fn run_batch(&self, cases: &[Case]) -> BatchReport {
        self.run_batch_with(cases, |_, _| Ok(()))
    }

    /// 处理整个批次, 每个病例的重标注结果在处理完后立即交给 `sink` (例如写盘).
    pub fn run_batch_with<F>(&self, cases: &[Case], sink: F) -> BatchReport
    where
        F: Fn(&str, &LabelVolume) -> Result<()> + Sync,
    {
        log::info!("running {} cases", cases.len());
        let results = map_cases(cases, |case| {
            let r = self.process(case, &sink);
            log_failure(&case.id, &r);
            (case.id.clone(), r)
        });
        BatchReport::assemble(results)
    }

    /// 按需加载病例并处理. 每个病例只在处理它的线程上被加载, 处理完即释放.
    ///
    /// `load` 失败 (通常是 [`Error::Unreadable`]) 只会使该病例失败.
    pub fn run_lazy<L, F>(&self, ids: &[String], load: L, sink: F) -> BatchReport
    where
        L: Fn(&str) -> Result<Case> + Sync,
        F: Fn(&str, &LabelVolume) -> Result<()> + Sync,
    {
        log::info!("running {} cases", ids.len());
        let results = map_cases(ids, |id| {
            let r = load(id).and_then(|case| self.process(&case, &sink));
            log_failure(id, &r);
            (id.clone(), r)
        });
        BatchReport::assemble(results)
    }
}

/// 按 `chunk` 个病例一块分别汇总, 再按顺序合并各块.
fn cohort_of(outcomes: &[CaseOutcome], chunk: usize) -> CohortStats {
    let mut ans = CohortStats::default();
    for part in chunk_stats(outcomes, chunk.max(1)) {
        ans.merge(&part);
    }
    ans
}

#[inline]
fn log_failure<T>(id: &str, r: &Result<T>) {
    if let Err(e) = r {
        log::warn!("case {id} failed: {e}");
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;

        /// 借助 `rayon`, 并行地对每个元素执行 `op`. 结果与输入顺序一致.
        fn map_cases<T, R, F>(items: &[T], op: F) -> Vec<R>
        where
            T: Sync,
            R: Send,
            F: Fn(&T) -> R + Sync + Send,
        {
            items.par_iter().map(op).collect()
        }

        fn chunk_stats(outcomes: &[CaseOutcome], chunk: usize) -> Vec<CohortStats> {
            outcomes
                .par_chunks(chunk)
                .map(|c| c.iter().map(|o| &o.score).collect())
                .collect()
        }
    } else {
        fn map_cases<T, R, F>(items: &[T], op: F) -> Vec<R>
        where
            F: Fn(&T) -> R,
        {
            items.iter().map(op).collect()
        }

        fn chunk_stats(outcomes: &[CaseOutcome], chunk: usize) -> Vec<CohortStats> {
            outcomes
                .chunks(chunk)
                .map(|c| c.iter().map(|o| &o.score).collect())
                .collect()
        }
    }
}
