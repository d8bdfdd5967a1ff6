use serde::Serialize;

use crate::classifier::ClassificationResult;
use crate::selection::argmax_first_by_key;

/// 需要做车牌识别的帧区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start_frame: usize,
    pub frame_count: usize,
}

/// 违章判定结果
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// 最大概率低于置信度下限
    NormalDriving { probability: f32 },
    Violation {
        category: String,
        probability: f32,
        window_index: usize,
        segment: Segment,
    },
}

impl Decision {
    pub fn probability(&self) -> f32 {
        match self {
            Decision::NormalDriving { probability } => *probability,
            Decision::Violation { probability, .. } => *probability,
        }
    }

    pub fn segment(&self) -> Option<Segment> {
        match self {
            Decision::NormalDriving { .. } => None,
            Decision::Violation { segment, .. } => Some(*segment),
        }
    }
}

/// 违章判定策略：全局取概率最大的 (窗口, 类别)，低于下限判为正常行驶
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    pub categories: Vec<String>,
    pub min_confidence: f32,
    pub window_length: usize,
    pub stride: usize,
}

impl DecisionPolicy {
    pub fn decide(&self, results: &[ClassificationResult]) -> Decision {
        let Some(best) = argmax_first_by_key(results, |r| r.probability).map(|i| results[i]) else {
            return Decision::NormalDriving { probability: 0.0 };
        };

        if best.probability < self.min_confidence {
            return Decision::NormalDriving {
                probability: best.probability,
            };
        }

        // 类别表比模型输出短时，不能当作违章上报
        let Some(category) = self.categories.get(best.category_index) else {
            return Decision::NormalDriving {
                probability: best.probability,
            };
        };

        Decision::Violation {
            category: category.clone(),
            probability: best.probability,
            window_index: best.window_index,
            segment: Segment {
                start_frame: best.window_index * self.stride,
                frame_count: self.window_length,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DecisionPolicy {
        DecisionPolicy {
            categories: vec![
                "신호위반".to_string(),
                "중앙선침범".to_string(),
                "진로변경위반".to_string(),
            ],
            min_confidence: 0.5,
            window_length: 50,
            stride: 10,
        }
    }

    fn result(window_index: usize, category_index: usize, probability: f32) -> ClassificationResult {
        ClassificationResult {
            window_index,
            category_index,
            probability,
        }
    }

    #[test]
    fn below_floor_is_normal_driving_without_segment() {
        let decision = policy().decide(&[result(0, 0, 0.3), result(1, 2, 0.49)]);
        assert_eq!(decision, Decision::NormalDriving { probability: 0.49 });
        assert_eq!(decision.segment(), None);
    }

    #[test]
    fn global_argmax_picks_segment_from_winning_window() {
        let decision = policy().decide(&[
            result(0, 0, 0.6),
            result(1, 1, 0.8),
            result(2, 2, 0.8),
        ]);
        assert_eq!(
            decision,
            Decision::Violation {
                category: "중앙선침범".to_string(),
                probability: 0.8,
                window_index: 1,
                segment: Segment {
                    start_frame: 10,
                    frame_count: 50
                },
            }
        );
    }

    #[test]
    fn exactly_at_floor_counts_as_violation() {
        let decision = policy().decide(&[result(3, 0, 0.5)]);
        assert_eq!(decision.segment().map(|s| s.start_frame), Some(30));
    }

    #[test]
    fn nan_window_never_wins() {
        let decision = policy().decide(&[result(0, 0, f32::NAN), result(1, 1, 0.3)]);
        assert_eq!(decision, Decision::NormalDriving { probability: 0.3 });

        let decision = policy().decide(&[result(0, 2, f32::NAN), result(4, 0, 0.8)]);
        assert_eq!(decision.segment().map(|s| s.start_frame), Some(40));
        assert_eq!(decision.probability(), 0.8);
    }

    #[test]
    fn all_nan_results_are_normal_driving() {
        assert_eq!(
            policy().decide(&[result(0, 0, f32::NAN)]),
            Decision::NormalDriving { probability: 0.0 }
        );
    }

    #[test]
    fn no_results_means_normal_driving() {
        assert_eq!(
            policy().decide(&[]),
            Decision::NormalDriving { probability: 0.0 }
        );
    }
}
