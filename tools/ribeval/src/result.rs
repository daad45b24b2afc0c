//! 评估结果.

use crate::runner::Args;
use anyhow::Context;
use rib_berry::pipeline::BatchReport;
use rib_berry::report;
use rib_berry::taxonomy::Taxonomy;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// 一次批量评估的最终结果.
pub struct EvalResult {
    report: BatchReport,
    taxonomy: Taxonomy,
}

fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(f))
}

impl EvalResult {
    pub fn new(report: BatchReport, taxonomy: Taxonomy) -> Self {
        Self { report, taxonomy }
    }

    #[inline]
    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    /// 按参数写出 CSV 表格.
    pub fn write_csvs(&self, args: &Args) -> anyhow::Result<()> {
        if let Some(p) = &args.csv {
            report::write_csv(&self.report, &self.taxonomy, create(p)?)?;
            log::info!("per-case table written to {}", p.display());
        }
        if let Some(p) = &args.cohort_csv {
            report::write_cohort_csv(&self.report, create(p)?)?;
            log::info!("cohort table written to {}", p.display());
        }
        if let Some(p) = &args.baseline_csv {
            report::write_baseline_csv(&self.report, create(p)?)?;
            log::info!("baseline comparison written to {}", p.display());
        }
        Ok(())
    }

    /// 分析运行结果.
    pub fn analyze(&self) -> anyhow::Result<()> {
        utils::sep();
        let mut buf = Vec::with_capacity(4096);
        report::describe_into(&self.report, &mut buf)?;
        println!("{}", std::str::from_utf8(&buf)?);
        utils::sep();
        Ok(())
    }
}
