//! 通用常量.

/// 标准 (canonical) 标签.
pub mod canonical {
    use super::Side;

    /// 背景.
    pub const BACKGROUND: u8 = 0;

    /// 右侧第一肋.
    pub const RIB_RIGHT_FIRST: u8 = 1;

    /// 右侧第十二肋.
    pub const RIB_RIGHT_LAST: u8 = 12;

    /// 左侧第一肋.
    pub const RIB_LEFT_FIRST: u8 = 13;

    /// 左侧第十二肋.
    pub const RIB_LEFT_LAST: u8 = 24;

    /// 胸骨.
    pub const STERNUM: u8 = 25;

    /// 肋软骨.
    pub const COSTAL_CARTILAGE: u8 = 26;

    /// 单侧肋骨数.
    pub const RIBS_PER_SIDE: usize = 12;

    /// 双侧肋骨总数.
    pub const RIB_COUNT: usize = 2 * RIBS_PER_SIDE;

    /// 是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, BACKGROUND)
    }

    /// 是否是肋骨?
    #[inline]
    pub const fn is_rib(p: u8) -> bool {
        matches!(p, RIB_RIGHT_FIRST..=RIB_LEFT_LAST)
    }

    /// 给定侧别和自上而下的序号 (从 1 开始), 获取标准肋骨标签.
    /// 序号不在 `1..=12` 范围内时返回 `None`.
    #[inline]
    pub const fn rib(side: Side, rank: usize) -> Option<u8> {
        if rank == 0 || rank > RIBS_PER_SIDE {
            return None;
        }
        Some(match side {
            Side::Right => RIB_RIGHT_FIRST + (rank - 1) as u8,
            Side::Left => RIB_LEFT_FIRST + (rank - 1) as u8,
        })
    }

    /// [`rib`] 的逆操作: 获取肋骨标签的侧别和序号. 非肋骨标签返回 `None`.
    #[inline]
    pub const fn rib_position(p: u8) -> Option<(Side, usize)> {
        match p {
            RIB_RIGHT_FIRST..=RIB_RIGHT_LAST => Some((Side::Right, (p - RIB_RIGHT_FIRST) as usize + 1)),
            RIB_LEFT_FIRST..=RIB_LEFT_LAST => Some((Side::Left, (p - RIB_LEFT_FIRST) as usize + 1)),
            _ => None,
        }
    }
}

/// 默认的 Dice 通过阈值. 整体胸廓 Dice 不低于该值的病例视为通过.
pub const PASS_THRESHOLD: f64 = 0.9;

/// 相对基线的 Hausdorff 改进百分比阈值: 不低于该值视为通过.
pub const IMPROVEMENT_PASS_PCT: f64 = 30.0;

/// 改进百分比不低于该值 (且未通过) 时为轻度.
pub const IMPROVEMENT_MILD_PCT: f64 = 20.0;

/// 改进百分比不低于该值 (且未达轻度) 时为中度; 再低为重度.
pub const IMPROVEMENT_MODERATE_PCT: f64 = 10.0;

/// 默认的中线歧义距离 (毫米). 质心距中线小于该值的分量会被标注为侧别可疑.
pub const AMBIGUITY_MM: f64 = 5.0;

/// 解剖学侧别 (以患者自身为参照).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    /// 患者右侧.
    Right,

    /// 患者左侧.
    Left,
}

impl Side {
    /// 小写名称, 与标准结构命名一致.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Right => "right",
            Self::Left => "left",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::canonical::*;
    use super::Side;

    #[test]
    fn test_rib_label_round_trip_bounds() {
        assert_eq!(rib(Side::Right, 1), Some(1));
        assert_eq!(rib(Side::Right, 12), Some(12));
        assert_eq!(rib(Side::Left, 1), Some(13));
        assert_eq!(rib(Side::Left, 12), Some(24));
        assert_eq!(rib(Side::Left, 0), None);
        assert_eq!(rib(Side::Right, 13), None);

        assert_eq!(rib_position(14), Some((Side::Left, 2)));
        assert_eq!(rib_position(STERNUM), None);
        assert!(is_rib(24) && !is_rib(25) && !is_rib(0));
    }
}
