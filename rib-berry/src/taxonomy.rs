//! 标准标签分类表: 标签值 -> 结构名.

use crate::consts::canonical::*;
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 完整胸廓分类表 (24 根肋骨, 胸骨, 肋软骨).
static RIBCAGE: Lazy<BTreeMap<u8, String>> = Lazy::new(|| {
    let mut names = BTreeMap::new();
    for label in RIB_RIGHT_FIRST..=RIB_LEFT_LAST {
        if let Some((side, rank)) = rib_position(label) {
            names.insert(label, format!("rib_{}_{rank}", side.name()));
        }
    }
    names.insert(STERNUM, "sternum".to_string());
    names.insert(COSTAL_CARTILAGE, "costal_cartilage".to_string());
    names
});

/// 序列化时使用的单个条目.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaxonomyEntry {
    /// 标签值.
    pub label: u8,
    /// 结构名.
    pub name: String,
}

/// 标准标签分类表. 背景 `0` 永远不在表中.
///
/// 评估时, 表中的每个标签都是 "期望存在" 的结构: 即使真值和预测都不包含它,
/// 报告中也会显式记录为不适用.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(from = "Vec<TaxonomyEntry>", into = "Vec<TaxonomyEntry>")
)]
pub struct Taxonomy {
    names: BTreeMap<u8, String>,
}

impl Default for Taxonomy {
    #[inline]
    fn default() -> Self {
        Self::ribcage()
    }
}

impl From<Vec<TaxonomyEntry>> for Taxonomy {
    fn from(v: Vec<TaxonomyEntry>) -> Self {
        Self::from_pairs(v.into_iter().map(|e| (e.label, e.name)))
    }
}

impl From<Taxonomy> for Vec<TaxonomyEntry> {
    fn from(t: Taxonomy) -> Self {
        t.names
            .into_iter()
            .map(|(label, name)| TaxonomyEntry { label, name })
            .collect()
    }
}

impl Taxonomy {
    /// 完整胸廓: `rib_right_1..=12`, `rib_left_1..=12`, `sternum`, `costal_cartilage`.
    #[inline]
    pub fn ribcage() -> Self {
        Self {
            names: RIBCAGE.clone(),
        }
    }

    /// 仅包含 24 根肋骨.
    pub fn ribs_only() -> Self {
        Self {
            names: RIBCAGE
                .iter()
                .filter(|(l, _)| is_rib(**l))
                .map(|(l, n)| (*l, n.clone()))
                .collect(),
        }
    }

    /// 由 (标签值, 结构名) 对创建. 背景标签会被忽略, 重复标签以最后一次为准.
    pub fn from_pairs<S: Into<String>, I: IntoIterator<Item = (u8, S)>>(it: I) -> Self {
        Self {
            names: it
                .into_iter()
                .filter(|(l, _)| !is_background(*l))
                .map(|(l, n)| (l, n.into()))
                .collect(),
        }
    }

    /// 获取结构名. 不在表中的标签返回 `label_{n}`.
    pub fn name(&self, label: u8) -> Cow<'_, str> {
        match self.names.get(&label) {
            Some(n) => Cow::Borrowed(n.as_str()),
            None => Cow::Owned(format!("label_{label}")),
        }
    }

    /// 按升序迭代所有标签值.
    #[inline]
    pub fn labels(&self) -> impl Iterator<Item = u8> + '_ {
        self.names.keys().copied()
    }

    /// 是否包含 `label`?
    #[inline]
    pub fn contains(&self, label: u8) -> bool {
        self.names.contains_key(&label)
    }

    /// 结构个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// 是否为空表?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 报告中的列顺序: 胸骨, 肋软骨, 左侧肋骨 (自上而下), 右侧肋骨 (自上而下),
    /// 最后是表中的其它标签 (升序). 只包含表中存在的标签.
    pub fn report_order(&self) -> Vec<u8> {
        let fixed = [STERNUM, COSTAL_CARTILAGE]
            .into_iter()
            .chain(RIB_LEFT_FIRST..=RIB_LEFT_LAST)
            .chain(RIB_RIGHT_FIRST..=RIB_RIGHT_LAST);
        let mut ans: Vec<u8> = fixed.filter(|l| self.contains(*l)).collect();
        let rest: Vec<u8> = self.labels().filter(|l| !ans.contains(l)).collect();
        ans.extend(rest);
        ans
    }
}
