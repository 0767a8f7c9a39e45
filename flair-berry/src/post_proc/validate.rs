//! 自动脑掩膜与真值掩膜的体素重叠度量.

use crate::consts::gray::*;
use crate::error::{BrainError, BrainResult};
use crate::{BrainMask, VolumeAttr};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 以真值为参考的 2x2 混淆矩阵. 类别 0 为背景, 类别 1 为脑组织.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConfusionMatrix {
    /// 真值与预测均为背景.
    pub tn: usize,

    /// 真值为背景, 预测为脑组织.
    pub fp: usize,

    /// 真值为脑组织, 预测为背景.
    pub fn_: usize,

    /// 真值与预测均为脑组织.
    pub tp: usize,
}

impl ConfusionMatrix {
    /// 按 `[[tn, fp], [fn, tp]]` 布局输出. 行为真值类别, 列为预测类别.
    #[inline]
    pub fn as_array(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }

    /// 体素总数.
    #[inline]
    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    /// 逐项相加.
    #[inline]
    pub fn merge(&mut self, other: &ConfusionMatrix) {
        self.tn += other.tn;
        self.fp += other.fp;
        self.fn_ += other.fn_;
        self.tp += other.tp;
    }

    /// 以 `class` 为正类时的 `(命中, 预测为该类, 真值为该类)` 计数.
    fn class_counts(&self, class: u8) -> (usize, usize, usize) {
        if is_brain(class) {
            (self.tp, self.tp + self.fp, self.tp + self.fn_)
        } else {
            (self.tn, self.tn + self.fn_, self.tn + self.fp)
        }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[[{}, {}], [{}, {}]]", self.tn, self.fp, self.fn_, self.tp)
    }
}

/// 单个类别的分类得分.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClassScores {
    /// 查准率.
    pub precision: f64,

    /// 查全率.
    pub recall: f64,

    /// 查准率与查全率的调和平均.
    pub f_score: f64,

    /// 真值中该类别的体素个数.
    pub support: usize,
}

impl ClassScores {
    fn from_confusion(cm: &ConfusionMatrix, class: u8) -> Self {
        let (hit, predicted, actual) = cm.class_counts(class);
        let precision = ratio(hit, predicted);
        let recall = ratio(hit, actual);
        let f_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f_score,
            support: actual,
        }
    }
}

/// 一次验证得到的全部度量.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Metrics {
    /// Dice 系数, `2|A∩B| / (|A| +|B|)`.
    pub dice: f64,

    /// Jaccard 指数, `|A∩B| / |A∪B|`.
    pub jaccard: f64,

    /// 各类别得分, 下标 0 为背景, 下标 1 为脑组织.
    pub scores: [ClassScores; 2],

    /// 体素分类准确率.
    pub accuracy: f64,

    /// 混淆矩阵.
    pub confusion: ConfusionMatrix,
}

impl Metrics {
    /// 由混淆矩阵计算全部度量.
    ///
    /// 真值与预测都不含脑组织时, Dice 与 Jaccard 定义为 1.
    pub fn from_confusion(confusion: ConfusionMatrix) -> Self {
        let ConfusionMatrix { tn, fp, fn_, tp } = confusion;
        let (dice, jaccard) = if tp + fp + fn_ == 0 {
            (1.0, 1.0)
        } else {
            (ratio(2 * tp, 2 * tp + fp + fn_), ratio(tp, tp + fp + fn_))
        };
        Self {
            dice,
            jaccard,
            scores: [
                ClassScores::from_confusion(&confusion, MASK_BACKGROUND),
                ClassScores::from_confusion(&confusion, MASK_BRAIN),
            ],
            accuracy: ratio(tp + tn, confusion.total()),
            confusion,
        }
    }

    /// 背景类别得分.
    #[inline]
    pub fn background(&self) -> &ClassScores {
        &self.scores[MASK_BACKGROUND as usize]
    }

    /// 脑组织类别得分.
    #[inline]
    pub fn brain(&self) -> &ClassScores {
        &self.scores[MASK_BRAIN as usize]
    }
}

/// 分母为 0 时返回 0.
#[inline]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// 以 `truth` 为参考, 计算 `predicted` 的重叠度量.
///
/// # 错误
///
/// 依次检查:
///
/// 1. 两者形状不一致时返回 [`BrainError::ShapeMismatch`], 此时不做任何逐体素计算;
/// 2. 任一掩膜含非二值体素时返回 [`BrainError::NonBinary`];
/// 3. 体数据不含任何体素时返回 [`BrainError::EmptyVolume`].
pub fn validate_mask(truth: &BrainMask, predicted: &BrainMask) -> BrainResult<Metrics> {
    BrainError::check_shape(truth.shape(), predicted.shape())?;
    for mask in [truth, predicted] {
        if let Some(value) = mask.first_non_binary() {
            return Err(BrainError::NonBinary { value });
        }
    }
    if truth.is_empty() {
        return Err(BrainError::EmptyVolume);
    }

    let mut cm = ConfusionMatrix::default();
    for (&t, &p) in truth.data().iter().zip(predicted.data().iter()) {
        match (is_brain(t), is_brain(p)) {
            (false, false) => cm.tn += 1,
            (false, true) => cm.fp += 1,
            (true, false) => cm.fn_ += 1,
            (true, true) => cm.tp += 1,
        }
    }
    Ok(Metrics::from_confusion(cm))
}

/// 一批体数据的度量汇总: 各项得分取算术平均, 混淆矩阵逐项求和.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricsSummary {
    count: usize,
    dice: f64,
    jaccard: f64,
    accuracy: f64,
    scores: [ClassScores; 2],
    confusion: ConfusionMatrix,
}

impl MetricsSummary {
    /// 空汇总.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 计入一次验证结果.
    pub fn add(&mut self, m: &Metrics) {
        self.count += 1;
        self.dice += m.dice;
        self.jaccard += m.jaccard;
        self.accuracy += m.accuracy;
        for (acc, s) in self.scores.iter_mut().zip(m.scores.iter()) {
            acc.precision += s.precision;
            acc.recall += s.recall;
            acc.f_score += s.f_score;
            acc.support += s.support;
        }
        self.confusion.merge(&m.confusion);
    }

    /// 已计入的体数据个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// 是否尚未计入任何结果?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 平均 Dice 系数. 汇总为空时返回 `None`.
    #[inline]
    pub fn mean_dice(&self) -> Option<f64> {
        self.mean(self.dice)
    }

    /// 平均 Jaccard 指数. 汇总为空时返回 `None`.
    #[inline]
    pub fn mean_jaccard(&self) -> Option<f64> {
        self.mean(self.jaccard)
    }

    /// 平均准确率. 汇总为空时返回 `None`.
    #[inline]
    pub fn mean_accuracy(&self) -> Option<f64> {
        self.mean(self.accuracy)
    }

    /// 各类别的平均得分. `support` 为总和而非均值. 汇总为空时返回 `None`.
    pub fn mean_scores(&self) -> Option<[ClassScores; 2]> {
        if self.is_empty() {
            return None;
        }
        let n = self.count as f64;
        Some(self.scores.map(|s| ClassScores {
            precision: s.precision / n,
            recall: s.recall / n,
            f_score: s.f_score / n,
            support: s.support,
        }))
    }

    /// 逐项求和的混淆矩阵.
    #[inline]
    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    #[inline]
    fn mean(&self, sum: f64) -> Option<f64> {
        (!self.is_empty()).then(|| sum / self.count as f64)
    }
}

impl<'a> Extend<&'a Metrics> for MetricsSummary {
    fn extend<T: IntoIterator<Item = &'a Metrics>>(&mut self, iter: T) {
        iter.into_iter().for_each(|m| self.add(m));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    const EPS: f64 = 1e-12;

    fn mask_from(values: &[u8]) -> BrainMask {
        let data = Array3::from_shape_vec((1, 1, values.len()), values.to_vec()).unwrap();
        BrainMask::from_array(data).unwrap()
    }

    #[test]
    fn test_identical_masks() {
        let a = mask_from(&[0, 1, 1, 0, 1]);
        let m = validate_mask(&a, &a).unwrap();
        assert_eq!(m.dice, 1.0);
        assert_eq!(m.jaccard, 1.0);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.confusion.as_array(), [[2, 0], [0, 3]]);
        assert_eq!(m.brain().support, 3);
        assert_eq!(m.background().f_score, 1.0);
    }

    #[test]
    fn test_complement_masks() {
        let a = mask_from(&[0, 1, 1, 0, 1]);
        let b = mask_from(&[1, 0, 0, 1, 0]);
        let m = validate_mask(&a, &b).unwrap();
        assert_eq!(m.dice, 0.0);
        assert_eq!(m.jaccard, 0.0);
        assert_eq!(m.accuracy, 0.0);
        assert_eq!(m.confusion.as_array(), [[0, 2], [3, 0]]);
        assert_eq!(m.brain().f_score, 0.0);
    }

    #[test]
    fn test_known_counts() {
        // tn = 3, fp = 1, fn = 2, tp = 4
        let truth = mask_from(&[0, 0, 0, 0, 1, 1, 1, 1, 1, 1]);
        let pred = mask_from(&[0, 0, 0, 1, 0, 0, 1, 1, 1, 1]);
        let m = validate_mask(&truth, &pred).unwrap();
        assert_eq!(m.confusion.as_array(), [[3, 1], [2, 4]]);
        assert!((m.dice - 8.0 / 11.0).abs() < EPS);
        assert!((m.jaccard - 4.0 / 7.0).abs() < EPS);
        assert!((m.accuracy - 0.7).abs() < EPS);

        let brain = m.brain();
        assert!((brain.precision - 0.8).abs() < EPS);
        assert!((brain.recall - 4.0 / 6.0).abs() < EPS);
        assert_eq!(brain.support, 6);

        let bg = m.background();
        assert!((bg.precision - 0.6).abs() < EPS);
        assert!((bg.recall - 0.75).abs() < EPS);
        assert_eq!(bg.support, 4);
    }

    #[test]
    fn test_both_empty_masks() {
        let a = mask_from(&[0, 0, 0]);
        let m = validate_mask(&a, &a).unwrap();
        assert_eq!(m.dice, 1.0);
        assert_eq!(m.jaccard, 1.0);
        assert_eq!(m.brain().precision, 0.0);
        assert_eq!(m.brain().support, 0);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = BrainMask::zeros((2, 3, 3));
        let b = BrainMask::zeros((2, 3, 4));
        match validate_mask(&a, &b) {
            Err(BrainError::ShapeMismatch { expected, found }) => {
                assert_eq!(expected, (2, 3, 3));
                assert_eq!(found, (2, 3, 4));
            }
            other => panic!("期望 ShapeMismatch 错误, 实际为 {other:?}"),
        }
    }

    #[test]
    fn test_non_binary_rejected() {
        let a = mask_from(&[0, 1, 1]);
        let mut b = a.clone();
        b.data_mut()[(0, 0, 2)] = 7;
        assert!(matches!(
            validate_mask(&a, &b),
            Err(BrainError::NonBinary { value: 7 })
        ));
    }

    #[test]
    fn test_empty_volume_rejected() {
        let a = BrainMask::zeros((0, 4, 4));
        assert!(matches!(validate_mask(&a, &a), Err(BrainError::EmptyVolume)));
    }

    #[test]
    fn test_summary_mean() {
        let a = mask_from(&[0, 1, 1, 0]);
        let b = mask_from(&[1, 0, 0, 1]);
        let same = validate_mask(&a, &a).unwrap();
        let diff = validate_mask(&a, &b).unwrap();

        let mut summary = MetricsSummary::new();
        assert_eq!(summary.mean_dice(), None);
        summary.extend([&same, &diff]);

        assert_eq!(summary.len(), 2);
        assert!((summary.mean_dice().unwrap() - 0.5).abs() < EPS);
        assert!((summary.mean_jaccard().unwrap() - 0.5).abs() < EPS);
        assert!((summary.mean_accuracy().unwrap() - 0.5).abs() < EPS);
        assert_eq!(summary.confusion().as_array(), [[2, 2], [2, 2]]);
        assert_eq!(summary.mean_scores().unwrap()[1].support, 4);
    }
}
