//! 车牌文本的规范化与格式校验

/// 常见的拉丁字母/数字混淆
const CONFUSIONS: [(char, char); 10] = [
    ('O', '0'),
    ('I', '1'),
    ('S', '5'),
    ('l', '1'),
    ('Z', '2'),
    ('B', '8'),
    ('G', '9'),
    ('A', '4'),
    ('T', '1'),
    ('o', '0'),
];

const MIN_PLATE_LENGTH: usize = 7;
const MIN_PLATE_DIGITS: usize = 6;

/// 韩文音节（가..힣）
pub fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// 去掉分隔符，纠正混淆字符，只保留韩文音节和数字
pub fn normalize_plate_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.'))
        .map(|c| {
            CONFUSIONS
                .iter()
                .find(|(wrong, _)| *wrong == c)
                .map(|(_, right)| *right)
                .unwrap_or(c)
        })
        .filter(|c| is_hangul_syllable(*c) || c.is_ascii_digit())
        .collect()
}

/// 校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateValidity {
    Valid,
    Empty,
    TooShort,
    NoHangul,
    TooFewDigits,
}

impl PlateValidity {
    pub fn is_valid(self) -> bool {
        self == PlateValidity::Valid
    }
}

/// 长度至少 7，至少一个韩文音节，至少 6 个数字
pub fn validate_plate_format(text: &str) -> PlateValidity {
    if text.is_empty() {
        return PlateValidity::Empty;
    }
    if text.chars().count() < MIN_PLATE_LENGTH {
        return PlateValidity::TooShort;
    }
    if !text.chars().any(is_hangul_syllable) {
        return PlateValidity::NoHangul;
    }
    if text.chars().filter(|c| c.is_ascii_digit()).count() < MIN_PLATE_DIGITS {
        return PlateValidity::TooFewDigits;
    }
    PlateValidity::Valid
}
