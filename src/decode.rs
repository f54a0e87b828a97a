use std::fmt;

use encoding_rs::{Encoding, GB18030, GBK, UTF_8};
use tracing::{debug, warn};

/// Header words that every genuine bill export contains somewhere.
/// A decode that does not produce any of them picked the wrong code page.
const SENTINELS: &[&str] = &["交易时间", "交易对方", "金额", "收/支", "微信支付", "支付宝"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Gbk,
    Gb2312,
    Gb18030,
}

/// Attempt order. The last entry doubles as the unconditional fallback.
const ATTEMPTS: &[TextEncoding] = &[
    TextEncoding::Utf8,
    TextEncoding::Gbk,
    TextEncoding::Gb2312,
    TextEncoding::Gb18030,
];

impl TextEncoding {
    fn encoding(&self) -> &'static Encoding {
        match self {
            Self::Utf8 => UTF_8,
            // gb2312 is a WHATWG label for gbk
            Self::Gbk | Self::Gb2312 => GBK,
            Self::Gb18030 => GB18030,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Gbk => "GBK",
            Self::Gb2312 => "GB2312",
            Self::Gb18030 => "GB18030",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: TextEncoding,
    pub truncated: bool,
}

pub fn contains_sentinel(text: &str) -> bool {
    SENTINELS.iter().any(|s| text.contains(s))
}

/// A truncated buffer may end inside a multi-byte sequence, so up to three
/// trailing bytes are dropped before giving up on an encoding.
fn strict_decode(encoding: TextEncoding, bytes: &[u8], truncated: bool) -> Option<String> {
    let max_cut = if truncated { bytes.len().min(3) } else { 0 };
    (0..=max_cut).find_map(|cut| {
        encoding
            .encoding()
            .decode_without_bom_handling_and_without_replacement(&bytes[..bytes.len() - cut])
            .map(|text| text.into_owned())
    })
}

/// Decode a bill export. Never fails: when no attempt yields sentinel-bearing
/// text the last encoding is used with replacement characters.
pub fn decode(bytes: &[u8], max_bytes: usize) -> DecodedText {
    let truncated = bytes.len() > max_bytes;
    let mut bytes = &bytes[..bytes.len().min(max_bytes)];
    if let Some(rest) = bytes.strip_prefix(b"\xEF\xBB\xBF") {
        bytes = rest;
    }

    for &encoding in ATTEMPTS {
        let Some(text) = strict_decode(encoding, bytes, truncated) else {
            continue;
        };
        if contains_sentinel(&text) {
            debug!(encoding = encoding.label(), truncated, "decoded bill text");
            return DecodedText {
                text,
                encoding,
                truncated,
            };
        }
    }

    let fallback = ATTEMPTS[ATTEMPTS.len() - 1];
    warn!(encoding = fallback.label(), "no encoding produced bill header words, using fallback");
    let (text, _) = fallback.encoding().decode_without_bom_handling(bytes);
    DecodedText {
        text: text.into_owned(),
        encoding: fallback,
        truncated,
    }
}
