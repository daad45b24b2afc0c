//! 对 `rib_berry::LabelVolume` 的更一层封装. 在磁盘上配对预测与真值文件, 并按需加载病例.

use rib_berry::pipeline::Case;
use rib_berry::{Error, LabelVolume, Result};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// 获取 `$HOME/dataset/ribcage/<sub>`.
fn home_dataset_dir_with(sub: &str) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.extend(["dataset", "ribcage", sub]);
    Some(ans)
}

fn dir_from_env_or_home(var: &str, sub: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir_with(sub),
    }
}

/// 获取真值标签目录.
///
/// 1. 若环境变量 `$RIB_TRUTH_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/ribcage/truth`.
pub fn truth_dir_from_env_or_home() -> Option<PathBuf> {
    dir_from_env_or_home("RIB_TRUTH_DIR", "truth")
}

/// 获取预测标签目录.
///
/// 1. 若环境变量 `$RIB_PRED_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/ribcage/pred`.
pub fn pred_dir_from_env_or_home() -> Option<PathBuf> {
    dir_from_env_or_home("RIB_PRED_DIR", "pred")
}

/// 去掉 `.nii` 或 `.nii.gz` 后缀, 得到病例 id. 其它文件返回 `None`.
pub fn case_id(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(".nii.gz")
        .or_else(|| file_name.strip_suffix(".nii"))
        .filter(|s| !s.is_empty())
}

/// 一个病例在磁盘上的文件.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CasePaths {
    pub id: String,
    pub truth: PathBuf,
    pub pred: PathBuf,
    /// 基线分割, 仅在给出基线目录且其中有同名文件时存在.
    pub baseline: Option<PathBuf>,
}

fn scan(dir: &Path) -> std::io::Result<BTreeMap<String, PathBuf>> {
    let mut ans = BTreeMap::new();
    for entry in dir.read_dir()? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(id) = case_id(name) {
            ans.insert(id.to_string(), path.clone());
        }
    }
    Ok(ans)
}

/// 在 `truth_dir` 与 `pred_dir` 中按病例 id 配对 nii 文件, 结果按 id 升序排列.
/// 给出 `baseline_dir` 时, 同名的基线文件一并配对.
///
/// 只在真值或预测一侧出现的文件会被跳过并记录警告. 缺少基线文件的病例照常评估,
/// 只是不做基线对比.
pub fn discover_cases<P: AsRef<Path>, Q: AsRef<Path>>(
    truth_dir: P,
    pred_dir: Q,
    baseline_dir: Option<&Path>,
) -> std::io::Result<Vec<CasePaths>> {
    let truth = scan(truth_dir.as_ref())?;
    let mut pred = scan(pred_dir.as_ref())?;
    let mut baseline = match baseline_dir {
        Some(d) => Some(scan(d)?),
        None => None,
    };

    let mut ans = Vec::with_capacity(truth.len());
    for (id, t) in truth {
        let Some(p) = pred.remove(&id) else {
            log::warn!("case {id}: no prediction found, skipped");
            continue;
        };
        let b = baseline.as_mut().and_then(|m| m.remove(&id));
        if baseline.is_some() && b.is_none() {
            log::warn!("case {id}: no baseline found, comparison skipped");
        }
        ans.push(CasePaths {
            id,
            truth: t,
            pred: p,
            baseline: b,
        });
    }
    for id in pred.keys() {
        log::warn!("case {id}: no ground truth found, skipped");
    }
    log::info!("discovered {} cases", ans.len());
    Ok(ans)
}

fn open(path: &Path) -> Result<LabelVolume> {
    LabelVolume::open(path).map_err(|e| Error::Unreadable(format!("{}: {e}", path.display())))
}

/// 从磁盘加载一个病例.
pub fn load_case(paths: &CasePaths) -> Result<Case> {
    log::debug!("loading case {}", paths.id);
    let case = Case::new(paths.id.clone(), open(&paths.pred)?, open(&paths.truth)?);
    Ok(match &paths.baseline {
        Some(b) => case.with_baseline(open(b)?),
        None => case,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};
    use rib_berry::Affine;
    use std::fs;

    #[test]
    fn test_case_id() {
        assert_eq!(case_id("case01.nii.gz"), Some("case01"));
        assert_eq!(case_id("case02.nii"), Some("case02"));
        assert_eq!(case_id("notes.txt"), None);
        assert_eq!(case_id(".nii"), None);
    }

    #[test]
    fn test_discover_and_load_unreadable() {
        let root = tempfile::tempdir().unwrap();
        let (t, p) = (root.path().join("truth"), root.path().join("pred"));
        fs::create_dir_all(&t).unwrap();
        fs::create_dir_all(&p).unwrap();
        for name in ["b.nii.gz", "a.nii", "only_truth.nii"] {
            fs::write(t.join(name), b"not a nifti file").unwrap();
        }
        for name in ["a.nii.gz", "b.nii.gz", "only_pred.nii", "readme.md"] {
            fs::write(p.join(name), b"not a nifti file").unwrap();
        }

        let cases = discover_cases(&t, &p, None).unwrap();
        let ids: Vec<_> = cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(cases[0].truth, t.join("a.nii"));
        assert_eq!(cases[0].pred, p.join("a.nii.gz"));
        assert_eq!(cases[0].baseline, None);

        let err = load_case(&cases[0]).unwrap_err();
        assert_eq!(err.kind(), "Unreadable");
    }

    /// 基线目录中只有部分病例时, 其余病例照常配对, 只是没有基线.
    #[test]
    fn test_discover_and_load_with_baseline() {
        let root = tempfile::tempdir().unwrap();
        let dirs: Vec<_> = ["truth", "pred", "baseline"]
            .iter()
            .map(|d| root.path().join(d))
            .collect();
        for d in &dirs {
            fs::create_dir_all(d).unwrap();
        }

        let mut data = Array3::<u8>::zeros((3, 4, 5));
        data.slice_mut(s![1, 1..3, 1..4]).fill(1);
        let v = LabelVolume::new(data, Affine::identity());
        for id in ["c1", "c2"] {
            v.save(dirs[0].join(format!("{id}.nii.gz"))).unwrap();
            v.save(dirs[1].join(format!("{id}.nii.gz"))).unwrap();
        }
        v.save(dirs[2].join("c2.nii.gz")).unwrap();

        let cases = discover_cases(&dirs[0], &dirs[1], Some(dirs[2].as_path())).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].baseline, None);
        assert_eq!(cases[1].baseline, Some(dirs[2].join("c2.nii.gz")));

        assert!(load_case(&cases[0]).unwrap().baseline.is_none());
        let c2 = load_case(&cases[1]).unwrap();
        let b = c2.baseline.unwrap();
        assert_eq!(b.shape(), (3, 4, 5));
        assert_eq!(b.count(1), 6);
        assert!(b.same_grid(&c2.truth).is_ok());
    }
}
