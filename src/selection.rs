use std::cmp::Ordering;

/// 取最大值的下标，相等时保留最先出现的那个
///
/// 最佳窗口、最佳 OCR 引擎、投票最多的车牌都走这里。
/// 无法比较的值（NaN）不会被选中；全部无法比较时返回 None。
pub fn argmax_first_by<T, F>(items: &[T], mut compare: F) -> Option<usize>
where
    F: FnMut(&T, &T) -> Option<Ordering>,
{
    let mut best: Option<usize> = None;
    for (i, item) in items.iter().enumerate() {
        match best {
            None => {
                if compare(item, item).is_some() {
                    best = Some(i);
                }
            }
            Some(b) => {
                if compare(item, &items[b]) == Some(Ordering::Greater) {
                    best = Some(i);
                }
            }
        }
    }
    best
}

/// 按 key 取最大值下标（相等时取第一个）
pub fn argmax_first_by_key<T, K, F>(items: &[T], mut key: F) -> Option<usize>
where
    K: PartialOrd,
    F: FnMut(&T) -> K,
{
    argmax_first_by(items, |a, b| key(a).partial_cmp(&key(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_resolve_to_first_index() {
        let values = [0.2_f32, 0.9, 0.4, 0.9];
        assert_eq!(argmax_first_by_key(&values, |v| *v), Some(1));
    }

    #[test]
    fn empty_input_has_no_winner() {
        let values: [f32; 0] = [];
        assert_eq!(argmax_first_by_key(&values, |v| *v), None);
    }

    #[test]
    fn nan_never_beats_a_real_value() {
        let values = [0.3_f32, f32::NAN, 0.1];
        assert_eq!(argmax_first_by_key(&values, |v| *v), Some(0));
    }

    #[test]
    fn leading_nan_is_not_a_winner() {
        let values = [f32::NAN, 0.9, 0.2];
        assert_eq!(argmax_first_by_key(&values, |v| *v), Some(1));
    }

    #[test]
    fn all_nan_has_no_winner() {
        let values = [f32::NAN, f32::NAN];
        assert_eq!(argmax_first_by_key(&values, |v| *v), None);
    }
}
