//! 报告输出: CSV 表格与纯文本摘要.

use crate::eval::{Outcome, Severity, Summary};
use crate::pipeline::BatchReport;
use crate::taxonomy::Taxonomy;
use csv::Writer;
use itertools::Itertools;
use std::io::{self, Write};

const S4: &str = "    ";

#[inline]
fn f64_to_cell(f: Option<f64>) -> String {
    f.map_or_else(String::new, |f| format!("{f:.6}"))
}

#[inline]
fn f64_to_display(f: Option<f64>) -> String {
    match f {
        Some(f) => format!("{f:.4}"),
        None => "/".to_string(),
    }
}

/// 将每个成功病例的逐结构 Dice 写成 CSV.
///
/// 列依次为 `case`, `ribcage_overall`, 然后是 `taxonomy` 中各结构的名字
/// (胸骨, 肋软骨, 左侧肋骨, 右侧肋骨). 不适用的结构留空. 失败的病例不出现在表中.
pub fn write_csv<W: Write>(report: &BatchReport, taxonomy: &Taxonomy, w: W) -> csv::Result<()> {
    let mut wtr = Writer::from_writer(w);
    let order = taxonomy.report_order();

    let mut header = vec!["case".to_string(), "ribcage_overall".to_string()];
    header.extend(order.iter().map(|l| taxonomy.name(*l).into_owned()));
    wtr.write_record(&header)?;

    for o in &report.outcomes {
        let mut record = vec![o.id.clone(), f64_to_cell(Some(o.score.overall_dice()))];
        record.extend(order.iter().map(|l| {
            f64_to_cell(o.score.structure(*l).and_then(|s| s.outcome.dice()))
        }));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// 将队列汇总写成 CSV, 每个结构一行, 最后是整体胸廓 Dice 和病例平均 Dice.
pub fn write_cohort_csv<W: Write>(report: &BatchReport, w: W) -> csv::Result<()> {
    let mut wtr = Writer::from_writer(w);
    wtr.write_record([
        "structure",
        "label",
        "count",
        "mean",
        "variance",
        "missing",
        "not_applicable",
        "hausdorff_mean",
    ])?;

    let row = |name: &str, label: String, s: &Summary| {
        vec![
            name.to_string(),
            label,
            s.count().to_string(),
            f64_to_cell(s.mean()),
            f64_to_cell(s.variance()),
        ]
    };

    for (label, st) in &report.cohort.structures {
        let mut record = row(&st.name, label.to_string(), &st.dice);
        record.push(st.missing.to_string());
        record.push(st.not_applicable.to_string());
        record.push(f64_to_cell(st.hausdorff.mean()));
        wtr.write_record(&record)?;
    }
    for (name, s) in [
        ("ribcage_overall", &report.cohort.overall_dice),
        ("case_mean", &report.cohort.mean_dice),
    ] {
        let mut record = row(name, String::new(), s);
        record.extend([String::new(), String::new(), String::new()]);
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// 将提供了基线的病例写成 CSV, 按病例 id 升序. 没有任何基线时只有表头.
///
/// 列依次为 `case`, `hd_prediction_mm`, `hd_baseline_mm`, `hd_improvement_pct`,
/// `severity`, `recommendation`.
pub fn write_baseline_csv<W: Write>(report: &BatchReport, w: W) -> csv::Result<()> {
    let mut wtr = Writer::from_writer(w);
    wtr.write_record([
        "case",
        "hd_prediction_mm",
        "hd_baseline_mm",
        "hd_improvement_pct",
        "severity",
        "recommendation",
    ])?;
    for o in &report.outcomes {
        let Some(b) = o.score.baseline() else {
            continue;
        };
        wtr.write_record([
            o.id.clone(),
            b.hd_prediction.map_or_else(String::new, |h| format!("{h:.4}")),
            b.hd_baseline.map_or_else(String::new, |h| format!("{h:.4}")),
            format!("{:.2}", b.improvement_pct),
            b.severity.to_string(),
            b.severity.recommendation().to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// 将批次报告的文本摘要写进 `w` 中.
pub fn describe_into<W: Write>(report: &BatchReport, w: &mut W) -> io::Result<()> {
    writeln!(
        w,
        "Cases: {} scored, {} failed",
        report.outcomes.len(),
        report.failures.len()
    )?;

    for o in &report.outcomes {
        let s = &o.score;
        writeln!(
            w,
            "{S4}{:<16} {}  overall {:.4}  mean {}  n/a {}",
            o.id,
            s.verdict(),
            s.overall_dice(),
            f64_to_display(s.mean_dice()),
            s.not_applicable()
        )?;
        let missing = s
            .structures()
            .iter()
            .filter(|x| x.outcome == Outcome::Missing)
            .map(|x| x.name.as_str())
            .join(", ");
        if !missing.is_empty() {
            writeln!(w, "{S4}{S4}missing: {missing}")?;
        }
        if let Some(b) = s.baseline() {
            writeln!(
                w,
                "{S4}{S4}baseline: hd {} vs {} mm, {:+.2}% {} ({})",
                f64_to_display(b.hd_prediction),
                f64_to_display(b.hd_baseline),
                b.improvement_pct,
                b.severity,
                b.severity.recommendation()
            )?;
        }
        for warn in &o.warnings {
            writeln!(w, "{S4}{S4}warning: {warn}")?;
        }
    }
    for f in &report.failures {
        writeln!(w, "{S4}{:<16} ERROR [{}] {}", f.id, f.error.kind(), f.error)?;
    }

    let c = &report.cohort;
    writeln!(w, "Cohort:")?;
    writeln!(w, "{S4}Passed: {}/{}", c.passed, c.cases)?;
    writeln!(
        w,
        "{S4}Overall dice: {} ± {}",
        f64_to_display(c.overall_dice.mean()),
        f64_to_display(c.overall_dice.std_dev())
    )?;
    writeln!(
        w,
        "{S4}Case mean dice: {} ± {}",
        f64_to_display(c.mean_dice.mean()),
        f64_to_display(c.mean_dice.std_dev())
    )?;
    if c.improvement.count() > 0 {
        writeln!(
            w,
            "{S4}Baseline improvement: {} ± {} % over {} cases",
            f64_to_display(c.improvement.mean()),
            f64_to_display(c.improvement.std_dev()),
            c.improvement.count()
        )?;
        let breakdown = [Severity::Pass, Severity::Mild, Severity::Moderate, Severity::Severe]
            .into_iter()
            .map(|k| format!("{k} {}", c.severity_count(k)))
            .join(", ");
        writeln!(w, "{S4}{S4}{breakdown}")?;
    }
    let pooled = c.pooled_dice();
    write!(
        w,
        "{S4}Structure dice: {} over {} scores",
        f64_to_display(pooled.mean()),
        pooled.count()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Case, Pipeline, PipelineConfig};
    use crate::relabel::RelabelConfig;
    use crate::{Affine, LabelVolume};
    use ndarray::{s, Array3};

    fn report() -> BatchReport {
        let mut truth = Array3::<u8>::zeros((6, 3, 20));
        truth.slice_mut(s![1..3, .., 14..18]).fill(1);
        truth.slice_mut(s![1..3, .., 2..6]).fill(13);
        let mut pred = truth.clone();
        pred.slice_mut(s![1..3, .., 2..6]).fill(0);
        let truth = LabelVolume::new(truth, Affine::identity());
        let pred = LabelVolume::new(pred, Affine::identity());

        let cfg = PipelineConfig::default()
            .with_relabel(Some(RelabelConfig::new(2)))
            .with_taxonomy(Taxonomy::from_pairs([(1u8, "rib_right_1"), (13, "rib_left_1"), (25, "sternum")]));
        let mut bad = Case::new("bad", pred.clone(), truth.clone());
        bad.truth = LabelVolume::new(Array3::zeros((1, 1, 1)), Affine::identity());
        Pipeline::new(cfg).run_batch(&[Case::new("case01", pred, truth), bad])
    }

    #[test]
    fn test_write_csv() {
        let r = report();
        let mut buf = vec![];
        write_csv(&r, &Taxonomy::from_pairs([(1u8, "rib_right_1"), (13, "rib_left_1"), (25, "sternum")]), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "case,ribcage_overall,sternum,rib_left_1,rib_right_1");
        assert_eq!(lines[1], "case01,0.666667,,0.000000,1.000000");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_cohort_csv_and_summary() {
        let r = report();
        let mut buf = vec![];
        write_cohort_csv(&r, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("rib_left_1,13,1,0.000000,0.000000,1,0,"));
        assert!(text.contains("sternum,25,0,,,0,1,"));

        let mut buf = vec![];
        describe_into(&r, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Cases: 1 scored, 1 failed"));
        assert!(text.contains("FAIL"));
        assert!(text.contains("missing: rib_left_1"));
        assert!(text.contains("ERROR [ShapeMismatch]"));
        assert!(text.contains("Passed: 0/1"));
        assert!(!text.contains("Baseline improvement"));
    }

    /// 基线对比写入独立的 CSV 和摘要; 没有基线的病例不出现在 CSV 中.
    #[test]
    fn test_baseline_csv_and_summary() {
        let mut truth = Array3::<u8>::zeros((6, 3, 20));
        truth.slice_mut(s![1..3, .., 14..18]).fill(1);
        let mut far = Array3::<u8>::zeros((6, 3, 20));
        far.slice_mut(s![1..3, .., 10..14]).fill(1);
        let mut near = Array3::<u8>::zeros((6, 3, 20));
        near.slice_mut(s![1..3, .., 13..17]).fill(1);
        let v = |d: Array3<u8>| LabelVolume::new(d, Affine::identity());

        let cfg = PipelineConfig::default()
            .with_relabel(None)
            .with_taxonomy(Taxonomy::from_pairs([(1u8, "rib_right_1")]));
        let cases = [
            // 预测偏移 1, 基线偏移 4: 改进 75%.
            Case::new("p01", v(near.clone()), v(truth.clone())).with_baseline(v(far.clone())),
            // 反过来: 改进 -300%.
            Case::new("p02", v(far), v(truth.clone())).with_baseline(v(near.clone())),
            Case::new("p03", v(near), v(truth)),
        ];
        let r = Pipeline::new(cfg).run_batch(&cases);

        let mut buf = vec![];
        write_baseline_csv(&r, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "case,hd_prediction_mm,hd_baseline_mm,hd_improvement_pct,severity,recommendation"
        );
        assert_eq!(lines[1], "p01,1.0000,4.0000,75.00,PASS,no intervention needed");
        assert_eq!(lines[2], "p02,4.0000,1.0000,-300.00,SEVERE,manual correction required");
        assert_eq!(lines.len(), 3);

        let mut buf = vec![];
        describe_into(&r, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("baseline: hd 1.0000 vs 4.0000 mm, +75.00% PASS"));
        assert!(text.contains("Baseline improvement: -112.5000 ± 187.5000 % over 2 cases"));
        assert!(text.contains("PASS 1, MILD 0, MODERATE 0, SEVERE 1"));
    }
}
