//! 程序运行函数.

use crate::result::EvalResult;
use anyhow::{bail, Context};
use clap::Parser;
use rib_berry::pipeline::{Pipeline, PipelineConfig};
use rib_berry::Error;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use utils::loader::{self, CasePaths};

/// 批量评估胸廓分割结果.
///
/// 目录缺省时分别取 `$RIB_TRUTH_DIR` 与 `$RIB_PRED_DIR`, 再缺省则为
/// `$HOME/dataset/ribcage/{truth,pred}`.
#[derive(Parser, Clone, Debug)]
#[command(name = "ribeval", version)]
pub struct Args {
    /// Ground truth directory
    pub truth_dir: Option<PathBuf>,

    /// Prediction directory
    pub pred_dir: Option<PathBuf>,

    /// TOML pipeline configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write relabeled predictions here
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Baseline segmentations to compare whole-volume Hausdorff distance against
    #[arg(short, long)]
    pub baseline_dir: Option<PathBuf>,

    /// Per-case dice table
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Per-structure cohort summary
    #[arg(long)]
    pub cohort_csv: Option<PathBuf>,

    /// Per-case baseline comparison table
    #[arg(long)]
    pub baseline_csv: Option<PathBuf>,

    /// Evaluate raw predictions without relabeling
    #[arg(long = "no-relabel")]
    pub no_relabel: bool,

    /// Per-case time budget in seconds
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Worker threads (default: all cores)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// error, warn, info, debug or trace
    #[arg(long, default_value = "info")]
    pub log_level: log::Level,
}

fn parse_timeout(s: &str) -> anyhow::Result<Duration> {
    let secs: f64 = s.parse()?;
    Ok(Duration::try_from_secs_f64(secs)?)
}

impl Args {
    /// 根据参数与配置文件得到流水线配置. 命令行参数优先.
    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(p) => load_config(p)?,
            None => PipelineConfig::default(),
        };
        if self.no_relabel {
            cfg.relabel = None;
        }
        if self.timeout.is_some() {
            cfg = cfg.with_case_timeout(self.timeout);
        }
        Ok(cfg)
    }
}

/// 读取 TOML 格式的流水线配置.
pub fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn parse_config(text: &str) -> anyhow::Result<PipelineConfig> {
    Ok(toml::from_str(text)?)
}

fn resolve_dir(given: &Option<PathBuf>, fallback: Option<PathBuf>, what: &str) -> anyhow::Result<PathBuf> {
    let dir = given
        .clone()
        .or(fallback)
        .with_context(|| format!("cannot locate the {what} directory"))?;
    if !dir.is_dir() {
        bail!("{what} directory {} does not exist", dir.display());
    }
    Ok(dir)
}

/// 实际运行.
pub fn run(args: &Args) -> anyhow::Result<EvalResult> {
    let truth_dir = resolve_dir(&args.truth_dir, loader::truth_dir_from_env_or_home(), "truth")?;
    let pred_dir = resolve_dir(&args.pred_dir, loader::pred_dir_from_env_or_home(), "prediction")?;
    let config = args.pipeline_config()?;

    let threads = args.threads.unwrap_or_else(utils::cpus);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("building the worker pool")?;

    if let Some(out) = &args.out_dir {
        std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    }

    let baseline_dir = args
        .baseline_dir
        .as_ref()
        .map(|_| resolve_dir(&args.baseline_dir, None, "baseline"))
        .transpose()?;
    let cases: BTreeMap<String, CasePaths> =
        loader::discover_cases(&truth_dir, &pred_dir, baseline_dir.as_deref())?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();
    let ids: Vec<String> = cases.keys().cloned().collect();
    log::info!("evaluating {} cases on {threads} threads", ids.len());

    let taxonomy = config.taxonomy.clone();
    let pipeline = Pipeline::new(config);
    let report = pipeline.run_lazy(
        &ids,
        |id| {
            let paths = cases
                .get(id)
                .ok_or_else(|| Error::Unreadable(format!("unknown case {id}")))?;
            loader::load_case(paths)
        },
        |id, volume| {
            let Some(out) = &args.out_dir else {
                return Ok(());
            };
            let path = out.join(format!("{id}.nii.gz"));
            volume
                .save(&path)
                .map_err(|e| Error::Unwritable(format!("{}: {e}", path.display())))?;
            log::debug!("case {id}: saved {}", path.display());
            Ok(())
        },
    );
    Ok(EvalResult::new(report, taxonomy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rib_berry::eval::MatchMode;

    fn args(v: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("ribeval").chain(v.iter().copied()))
    }

    #[test]
    fn test_parse_args() {
        let a = args(&["--csv", "out.csv", "t", "p", "--timeout", "2.5", "--log-level", "debug"]).unwrap();
        assert_eq!(a.truth_dir, Some(PathBuf::from("t")));
        assert_eq!(a.pred_dir, Some(PathBuf::from("p")));
        assert_eq!(a.csv, Some(PathBuf::from("out.csv")));
        assert_eq!(a.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(a.log_level, log::Level::Debug);
        assert_eq!(a.baseline_dir, None);
        assert!(!a.no_relabel);

        let a = args(&["-b", "ts", "--baseline-csv", "hd.csv", "-j", "3"]).unwrap();
        assert_eq!(a.baseline_dir, Some(PathBuf::from("ts")));
        assert_eq!(a.baseline_csv, Some(PathBuf::from("hd.csv")));
        assert_eq!(a.threads, Some(3));
        assert_eq!(a.log_level, log::Level::Info);

        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["--csv"]).is_err());
        assert!(args(&["a", "b", "c"]).is_err());
        assert!(args(&["--timeout", "-1"]).is_err());
        assert!(args(&["--timeout", "soon"]).is_err());
        assert!(args(&["--log-level", "loud"]).is_err());
    }

    /// 帮助信息由 clap 生成, 且包含所有选项.
    #[test]
    fn test_help_lists_options() {
        let err = args(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        let help = err.to_string();
        for opt in ["--baseline-dir", "--no-relabel", "--cohort-csv", "--timeout", "--log-level"] {
            assert!(help.contains(opt), "{opt} missing from help");
        }
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_config() {
        let cfg = parse_config(
            r#"
            case_timeout_secs = 30.0

            [relabel]
            keep = 20
            ribs_per_side = 10

            [eval]
            mode = "Overlap"
            surface_distance = true
            "#,
        )
        .unwrap();
        let relabel = cfg.relabel.as_ref().unwrap();
        assert_eq!(relabel.keep, 20);
        assert_eq!(relabel.ribs_per_side, 10);
        assert_eq!(cfg.eval.mode, MatchMode::Overlap);
        assert!(cfg.eval.surface_distance);
        assert!(cfg.eval.missing_as_zero);
        assert_eq!(cfg.case_timeout(), Some(Duration::from_secs(30)));

        assert_eq!(parse_config("").unwrap(), PipelineConfig::default());
        assert!(parse_config("[relabel]\nribs_per_side = 3").is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let a = args(&["--no-relabel", "--timeout", "1"]).unwrap();
        let cfg = a.pipeline_config().unwrap();
        assert!(cfg.relabel.is_none());
        assert_eq!(cfg.case_timeout(), Some(Duration::from_secs(1)));
    }
}
