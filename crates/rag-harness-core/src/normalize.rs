//! Text normalizer.
//!
//! Cleans and canonicalizes raw extracted text before chunking:
//!
//! 1. Unicode NFC canonicalization.
//! 2. Lower-casing.
//! 3. Removal of URLs (`http(s)://…`, `www.…`) and HTML-like tags (`<…>`).
//! 4. Removal of every character outside the keep alphabet: letters of any
//!    script, digits, whitespace, and optionally `. , ! ?`.
//! 5. Whitespace tokenization with exact-match stop-word removal.
//! 6. Re-joining with single spaces.
//!
//! Normalization is total and pure, and idempotent:
//! `normalize(normalize(x)) == normalize(x)`.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashSet;
//! use rag_harness_core::normalize::normalize;
//!
//! let stop: HashSet<String> = ["là".to_string()].into_iter().collect();
//! let out = normalize("Hà Nội <b>là</b> THỦ ĐÔ!  https://vi.wikipedia.org", &stop);
//! assert_eq!(out, "hà nội thủ đô!");
//! ```

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Sentence-terminal punctuation that survives when `keep_punctuation` is on.
const KEPT_PUNCTUATION: [char; 4] = ['.', ',', '!', '?'];

/// Default Vietnamese stop words (single tokens only).
const VIETNAMESE_STOPWORDS: &[&str] = &[
    "và", "là", "mà", "thì", "của", "ở", "tại", "bị", "bởi", "cả", "các", "cái", "cần", "càng",
    "chỉ", "chiếc", "cho", "chứ", "chưa", "có", "cùng", "cũng", "đã", "đang", "đây", "để", "đến",
    "đều", "điều", "do", "đó", "được", "gì", "khi", "không", "lại", "lên", "lúc", "mỗi", "một",
    "nên", "nếu", "ngay", "nhiều", "như", "nhưng", "những", "nơi", "nữa", "phải", "qua", "ra",
    "rằng", "rất", "rồi", "sau", "sẽ", "so", "sự", "theo", "trên", "trước", "từ", "từng", "vẫn",
    "vào", "vậy", "về", "vì", "việc", "với", "vừa",
];

fn url_pattern() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"https?://\S+|www\.\S+").expect("valid URL pattern"))
}

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*?>").expect("valid tag pattern"))
}

/// The default Vietnamese stop-word set.
pub fn vietnamese_stopwords() -> HashSet<String> {
    VIETNAMESE_STOPWORDS.iter().map(|w| canonical(w)).collect()
}

/// NFC + lower-case, the form stop words are compared in.
fn canonical(word: &str) -> String {
    word.nfc().collect::<String>().to_lowercase()
}

/// Configured normalizer: a stop-word set plus the punctuation policy.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stopwords: HashSet<String>,
    keep_punctuation: bool,
}

impl Default for Normalizer {
    /// Vietnamese stop words, sentence punctuation kept.
    fn default() -> Self {
        Self {
            stopwords: vietnamese_stopwords(),
            keep_punctuation: true,
        }
    }
}

impl Normalizer {
    pub fn new<I, S>(stopwords: I, keep_punctuation: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stopwords: stopwords.into_iter().map(|w| canonical(w.as_ref())).collect(),
            keep_punctuation,
        }
    }

    /// A normalizer with no stop words.
    pub fn without_stopwords(keep_punctuation: bool) -> Self {
        Self {
            stopwords: HashSet::new(),
            keep_punctuation,
        }
    }

    pub fn stopwords(&self) -> &HashSet<String> {
        &self.stopwords
    }

    pub fn keeps_punctuation(&self) -> bool {
        self.keep_punctuation
    }

    pub fn normalize(&self, text: &str) -> String {
        normalize_with(text, &self.stopwords, self.keep_punctuation)
    }
}

/// Normalize `text`, keeping sentence punctuation and dropping `stopwords`.
///
/// Stop words are matched against tokens exactly, after both have been
/// NFC-normalized and lower-cased.
pub fn normalize(text: &str, stopwords: &HashSet<String>) -> String {
    normalize_with(text, stopwords, true)
}

fn normalize_with(text: &str, stopwords: &HashSet<String>, keep_punctuation: bool) -> String {
    let canonical_text = canonical(text);

    let without_tags = tag_pattern().replace_all(&canonical_text, " ");
    let without_urls = url_pattern().replace_all(&without_tags, " ");

    let filtered: String = without_urls
        .chars()
        .filter(|c| {
            c.is_alphabetic()
                || c.is_numeric()
                || c.is_whitespace()
                || (keep_punctuation && KEPT_PUNCTUATION.contains(c))
        })
        .collect();

    // Dropping characters can leave decomposed sequences or expose a new
    // `www.` run (e.g. `w_ww.site`); settle both so a second pass is a no-op.
    let filtered: String = filtered.nfc().collect();
    let filtered = url_pattern().replace_all(&filtered, " ");

    filtered
        .split_whitespace()
        .filter(|token| !stopwords.contains(*token))
        .collect::<Vec<_>>()
        .join(" ")
}
