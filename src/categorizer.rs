use crate::models::{Category, Direction, ParsedRecord};

/// Keyword set mapped to a category name. Within a table the first rule whose
/// keywords hit wins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryRule {
    pub keywords: &'static [&'static str],
    pub category: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleTables {
    pub outbound: &'static [CategoryRule],
    pub inbound: &'static [CategoryRule],
}

impl RuleTables {
    pub fn for_direction(&self, direction: Direction) -> &'static [CategoryRule] {
        match direction {
            Direction::Outbound => self.outbound,
            Direction::Inbound => self.inbound,
        }
    }
}

const OUTBOUND_RULES: &[CategoryRule] = &[
    CategoryRule {
        keywords: &[
            "美团", "饿了么", "外卖", "餐厅", "饭店", "肯德基", "kfc", "麦当劳", "星巴克", "瑞幸",
            "咖啡", "奶茶", "喜茶", "蜜雪冰城", "面馆", "食堂",
        ],
        category: "餐饮",
    },
    CategoryRule {
        keywords: &[
            "滴滴", "打车", "地铁", "公交", "单车", "哈啰", "12306", "铁路", "航空", "机票", "加油",
            "中石化", "中石油", "停车", "高速",
        ],
        category: "交通",
    },
    CategoryRule {
        keywords: &["淘宝", "天猫", "京东", "拼多多", "超市", "便利店", "唯品会", "商场", "盒马"],
        category: "购物",
    },
    CategoryRule {
        keywords: &["房租", "物业", "水费", "电费", "燃气", "国家电网", "自来水"],
        category: "居住",
    },
    CategoryRule {
        keywords: &["话费", "中国移动", "中国联通", "中国电信", "宽带", "流量"],
        category: "通讯",
    },
    CategoryRule {
        keywords: &[
            "电影", "猫眼", "爱奇艺", "腾讯视频", "优酷", "网易云", "bilibili", "哔哩哔哩", "游戏",
            "steam", "ktv",
        ],
        category: "娱乐",
    },
    CategoryRule {
        keywords: &["医院", "药房", "药店", "诊所", "体检"],
        category: "医疗",
    },
    CategoryRule {
        keywords: &["书店", "培训", "课程", "学费", "知网"],
        category: "教育",
    },
    CategoryRule {
        keywords: &["红包", "礼金"],
        category: "人情",
    },
];

const INBOUND_RULES: &[CategoryRule] = &[
    CategoryRule {
        keywords: &["工资", "薪资", "奖金", "salary"],
        category: "工资",
    },
    CategoryRule {
        keywords: &["红包"],
        category: "红包",
    },
    CategoryRule {
        keywords: &["利息", "收益", "分红", "理财"],
        category: "理财收益",
    },
    CategoryRule {
        keywords: &["退款"],
        category: "退款",
    },
    CategoryRule {
        keywords: &["转账"],
        category: "转账",
    },
];

pub const DEFAULT_RULES: RuleTables = RuleTables {
    outbound: OUTBOUND_RULES,
    inbound: INBOUND_RULES,
};

pub const GENERIC_OTHER: &str = "其他";
pub const UNCATEGORIZED: &str = "未分类";

pub fn direction_other(direction: Direction) -> &'static str {
    match direction {
        Direction::Outbound => "其他支出",
        Direction::Inbound => "其他收入",
    }
}

fn search_key(record: &ParsedRecord) -> String {
    format!("{} {} {}", record.counterparty, record.item, record.note).to_lowercase()
}

fn resolve(categories: &[Category], direction: Direction, name: &str) -> Option<i64> {
    categories
        .iter()
        .filter(|c| c.is_enabled && c.kind.applies_to(direction))
        .find(|c| c.name == name)
        .map(|c| c.id)
}

/// Suggest a category id for `record`.
///
/// A keyword hit whose category name does not resolve ends the rule scan;
/// later rules are not tried. Unresolved records fall back to the
/// direction's "other" category, then the generic one, then "uncategorized",
/// and finally stay unset.
pub fn suggest_category(record: &ParsedRecord, rules: &RuleTables, categories: &[Category]) -> Option<i64> {
    let key = search_key(record);
    let direction = record.direction;

    let hit = rules
        .for_direction(direction)
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| key.contains(&k.to_lowercase())));
    if let Some(id) = hit.and_then(|rule| resolve(categories, direction, rule.category)) {
        return Some(id);
    }

    [direction_other(direction), GENERIC_OTHER, UNCATEGORIZED]
        .iter()
        .find_map(|name| resolve(categories, direction, name))
}
