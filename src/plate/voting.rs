use std::fmt;

use crate::selection::argmax_first_by_key;

/// 跨帧投票得到的车牌结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlateVerdict {
    /// 至少 `min_votes` 帧识别出同一个号码
    Accepted(String),
    /// 最多的号码只出现了一次
    Uncertain(String),
    /// 没有任何有效识别
    Unidentifiable,
}

impl fmt::Display for PlateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlateVerdict::Accepted(text) => write!(f, "{}", text),
            PlateVerdict::Uncertain(text) => write!(f, "{}(불확실)", text),
            PlateVerdict::Unidentifiable => write!(f, "식별불가"),
        }
    }
}

/// 对有效车牌文本做众数投票，出现次数相同时取最先出现的
pub fn vote(pool: &[String], min_votes: usize) -> PlateVerdict {
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for text in pool {
        match tally.iter_mut().find(|(t, _)| *t == text.as_str()) {
            Some((_, count)) => *count += 1,
            None => tally.push((text.as_str(), 1)),
        }
    }

    let Some(best) = argmax_first_by_key(&tally, |(_, count)| *count) else {
        return PlateVerdict::Unidentifiable;
    };
    let (text, count) = tally[best];

    if count >= min_votes {
        PlateVerdict::Accepted(text.to_string())
    } else {
        PlateVerdict::Uncertain(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(entries: &[(&str, usize)]) -> Vec<String> {
        entries
            .iter()
            .flat_map(|(text, n)| std::iter::repeat(text.to_string()).take(*n))
            .collect()
    }

    #[test]
    fn majority_with_agreement_is_accepted() {
        let verdict = vote(&pool(&[("12가3455", 1), ("12가3456", 3)]), 2);
        assert_eq!(verdict, PlateVerdict::Accepted("12가3456".to_string()));
        assert_eq!(verdict.to_string(), "12가3456");
    }

    #[test]
    fn single_reading_is_uncertain() {
        let verdict = vote(&pool(&[("12가3456", 1)]), 2);
        assert_eq!(verdict, PlateVerdict::Uncertain("12가3456".to_string()));
        assert_eq!(verdict.to_string(), "12가3456(불확실)");
    }

    #[test]
    fn empty_pool_is_unidentifiable() {
        let verdict = vote(&[], 2);
        assert_eq!(verdict, PlateVerdict::Unidentifiable);
        assert_eq!(verdict.to_string(), "식별불가");
    }

    #[test]
    fn ties_go_to_first_seen_text() {
        let texts = vec![
            "34나5678".to_string(),
            "12가3456".to_string(),
            "12가3456".to_string(),
            "34나5678".to_string(),
        ];
        assert_eq!(vote(&texts, 2), PlateVerdict::Accepted("34나5678".to_string()));
    }

    #[test]
    fn stricter_threshold_downgrades_to_uncertain() {
        let verdict = vote(&pool(&[("12가3456", 2)]), 3);
        assert_eq!(verdict, PlateVerdict::Uncertain("12가3456".to_string()));
    }
}
