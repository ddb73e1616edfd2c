//! Health-topic relevance filter for candidate headlines.
//!
//! A headline is relevant when it contains any keyword from a fixed
//! Traditional-Chinese health vocabulary. First substring match wins; there
//! is no ranking or scoring, and match order only affects which keyword is
//! reported in the logs.

/// The fixed health vocabulary matched against candidate titles.
pub const KEYWORDS: &[&str] = &[
    "醫療", "健康", "醫師", "醫院", "診所", "疫苗", "流感", "癌症", "中醫",
    "健保", "過敏", "感冒", "糖尿病", "血壓", "減肥", "保健", "作息",
    "壓力", "焦慮", "失眠", "健身", "飲食", "營養", "養生", "睡眠",
    "運動", "瑜珈", "伸展", "放鬆", "心理", "療癒", "生活", "衛生", "醫:",
    "營養師", "脂肪", "心臟", "肺炎", "新冠", "新冠肺炎", "阿茲海默",
    "肺癌", "中風", "骨質疏鬆", "關節炎", "自律神經", "憂鬱症", "失智症",
    "帕金森氏症", "腦中風", "心肌梗塞", "高血壓", "高血脂", "痛風", "肝炎",
    "腎臟病", "胃潰瘍", "腸胃炎", "過動症", "過敏性鼻炎", "哮喘", "乳癌",
    "子宮頸癌", "大腸癌", "攝護腺癌", "甲狀腺", "更年期", "月經不調",
    "不孕症", "試管嬰兒", "避孕", "性病", "愛滋病", "牙周病", "蛀牙",
    "視力", "聽力", "失聰", "白內障", "青光眼", "罹癌", "猝死", "安眠藥",
    "抗生素", "止痛藥", "疫苗接種", "流感疫苗", "新冠疫苗", "基因檢測",
    "健康檢查", "體檢", "健保卡", "醫療保險",
];

/// Whether a headline matches the health vocabulary.
///
/// Empty titles are never relevant.
#[cfg_attr(not(test), allow(dead_code))]
pub fn is_relevant(title: &str) -> bool {
    matched_keyword(title).is_some()
}

/// The first keyword (in table order) found in the title, for logging.
pub fn matched_keyword(title: &str) -> Option<&'static str> {
    if title.is_empty() {
        return None;
    }
    KEYWORDS.iter().copied().find(|kw| title.contains(kw))
}
