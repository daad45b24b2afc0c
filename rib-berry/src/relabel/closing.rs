//! 单个标签的三维形态学闭运算 (先膨胀后腐蚀), 只向背景体素中填充.

use crate::components::{BoundingBox, Connectivity};
use crate::consts::canonical::is_background;
use crate::LabelVolume;
use ndarray::Array3;

/// 一步 6-邻接膨胀或腐蚀. 越界位置视为背景.
fn step(mask: &Array3<bool>, dilate: bool) -> Array3<bool> {
    let shape = mask.dim();
    let offsets = Connectivity::Face6.offsets();
    Array3::from_shape_fn(shape, |pos| {
        let mut neigh = offsets
            .iter()
            .map(|d| LabelVolume::offset(pos, *d, shape).is_some_and(|n| mask[n]));
        if dilate {
            mask[pos] || neigh.any(|b| b)
        } else {
            mask[pos] && neigh.all(|b| b)
        }
    })
}

/// 对 `data` 中值为 `label`, 位于 `bbox` 内的体素做半径为 `radius` 的闭运算.
///
/// 闭运算新增的体素只有原先是背景时才会被写入. 返回新写入的体素个数.
pub(crate) fn close_label(data: &mut Array3<u8>, label: u8, radius: usize, bbox: BoundingBox) -> usize {
    if radius == 0 {
        return 0;
    }
    let region = bbox.expand(radius + 1, data.dim());
    let (z0, h0, w0) = region.min;
    let at = |(z, h, w): (usize, usize, usize)| (z + z0, h + h0, w + w0);

    let mut mask = Array3::from_shape_fn(region.dim(), |p| data[at(p)] == label);
    for _ in 0..radius {
        mask = step(&mask, true);
    }
    for _ in 0..radius {
        mask = step(&mask, false);
    }

    let mut filled = 0;
    for (p, _) in mask.indexed_iter().filter(|(_, m)| **m) {
        let pos = at(p);
        if is_background(data[pos]) {
            data[pos] = label;
            filled += 1;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    #[test]
    fn test_close_fills_gap_only_in_background() {
        let mut data = Array3::<u8>::zeros((5, 5, 9));
        // 3x3 截面的棒, 中间断开一层.
        data.slice_mut(s![1..4, 1..4, 1..4]).fill(3);
        data.slice_mut(s![1..4, 1..4, 5..8]).fill(3);
        let bbox = BoundingBox {
            min: (1, 1, 1),
            max: (3, 3, 7),
        };

        let mut closed = data.clone();
        assert_eq!(close_label(&mut closed, 3, 1, bbox), 1);
        assert_eq!(closed[(2, 2, 4)], 3);
        assert_eq!(closed.iter().filter(|p| **p == 3).count(), 55);

        // 缺口被其它标签占据时保持不变.
        data[(2, 2, 4)] = 9;
        assert_eq!(close_label(&mut data, 3, 1, bbox), 0);
        assert_eq!(data[(2, 2, 4)], 9);
    }
}
