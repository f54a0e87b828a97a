use tracing::debug;

use crate::models::BillSource;

const WECHAT_TITLES: &[&str] = &["微信支付账单明细"];

/// The fixed WeChat Pay header; every token must be present.
const WECHAT_HEADER: &[&str] = &[
    "交易时间",
    "交易类型",
    "交易对方",
    "商品",
    "收/支",
    "金额(元)",
    "支付方式",
    "当前状态",
];

const ALIPAY_TITLES: &[&str] = &["支付宝交易明细", "支付宝交易记录明细", "支付宝（中国）网络技术有限公司", "支付宝"];

/// Alipay headers drift between export versions, so only a threshold of
/// these needs to appear.
const ALIPAY_HEADER: &[&str] = &[
    "交易时间",
    "交易创建时间",
    "交易分类",
    "交易对方",
    "对方账号",
    "商品说明",
    "商品名称",
    "收/支",
    "金额",
    "收/付款方式",
    "交易状态",
    "交易订单号",
    "商家订单号",
];

const ALIPAY_HEADER_THRESHOLD: usize = 3;

/// Classify normalized text by scanning its first `scan_lines` lines.
/// WeChat Pay is checked first: its header also clears the Alipay threshold.
pub fn detect_source(text: &str, scan_lines: usize) -> BillSource {
    let head: Vec<&str> = text.lines().take(scan_lines).collect();
    let source = if is_wechat(&head) {
        BillSource::WeChatPay
    } else if is_alipay(&head) {
        BillSource::Alipay
    } else {
        BillSource::Unknown
    };
    debug!(source = source.key(), scanned = head.len(), "detected bill source");
    source
}

fn is_wechat(head: &[&str]) -> bool {
    head.iter().any(|line| {
        WECHAT_TITLES.iter().any(|t| line.contains(t))
            || WECHAT_HEADER.iter().all(|t| line.contains(t))
    })
}

fn is_alipay(head: &[&str]) -> bool {
    head.iter().any(|line| {
        ALIPAY_TITLES.iter().any(|t| line.contains(t))
            || ALIPAY_HEADER.iter().filter(|t| line.contains(*t)).count() >= ALIPAY_HEADER_THRESHOLD
    })
}
