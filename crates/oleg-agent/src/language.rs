//! Dominant-language detection for a chat window.
//!
//! Texts are stripped of URLs, @mentions and #hashtags before detection so
//! that handles and links do not skew the result.  Detection falls back to
//! English whenever there is too little text or the detector gives up.

use oleg_store::Message;

/// Language used when detection is impossible.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Cleaned text shorter than this is not worth detecting.
const MIN_DETECTABLE_CHARS: usize = 3;

fn is_noise(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("www.")
        || token.starts_with('@')
        || token.starts_with('#')
}

/// Remove URLs, mentions and hashtags, then collapse whitespace.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .filter(|token| !is_noise(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// ISO 639-1 code of a single text, or [`DEFAULT_LANGUAGE`].
pub fn detect_text(text: &str) -> &'static str {
    let cleaned = clean_text(text);
    if cleaned.chars().count() < MIN_DETECTABLE_CHARS {
        return DEFAULT_LANGUAGE;
    }
    whatlang::detect(&cleaned)
        .and_then(|info| iso639_1(info.lang().code()))
        .unwrap_or(DEFAULT_LANGUAGE)
}

/// Dominant language of the human messages in a window.
///
/// The window's texts are concatenated and detected as one sample.
pub fn detect_language(window: &[Message]) -> &'static str {
    let joined = window
        .iter()
        .filter(|m| !m.from_bot && !m.text.trim().is_empty())
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let code = detect_text(&joined);
    tracing::debug!(language = code, "detected window language");
    code
}

/// Human-readable English name for a language code.
pub fn language_name(code: &str) -> &'static str {
    match code {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "uk" => "Ukrainian",
        "pl" => "Polish",
        "nl" => "Dutch",
        "tr" => "Turkish",
        "ja" => "Japanese",
        "zh" => "Chinese",
        "ko" => "Korean",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "he" => "Hebrew",
        _ => "Unknown",
    }
}

/// Map the detector's ISO 639-3 codes onto ISO 639-1.
fn iso639_1(code: &str) -> Option<&'static str> {
    let mapped = match code {
        "eng" => "en",
        "spa" => "es",
        "fra" => "fr",
        "deu" => "de",
        "ita" => "it",
        "por" => "pt",
        "rus" => "ru",
        "ukr" => "uk",
        "bel" => "be",
        "pol" => "pl",
        "ces" => "cs",
        "slk" => "sk",
        "slv" => "sl",
        "hrv" => "hr",
        "srp" => "sr",
        "bul" => "bg",
        "mkd" => "mk",
        "ron" => "ro",
        "hun" => "hu",
        "fin" => "fi",
        "est" => "et",
        "lav" => "lv",
        "lit" => "lt",
        "swe" => "sv",
        "dan" => "da",
        "nob" => "nb",
        "nld" => "nl",
        "afr" => "af",
        "cat" => "ca",
        "ell" => "el",
        "tur" => "tr",
        "aze" => "az",
        "uzb" => "uz",
        "tuk" => "tk",
        "kat" => "ka",
        "hye" => "hy",
        "heb" => "he",
        "yid" => "yi",
        "ara" => "ar",
        "pes" => "fa",
        "urd" => "ur",
        "hin" => "hi",
        "ben" => "bn",
        "mar" => "mr",
        "guj" => "gu",
        "pan" => "pa",
        "tam" => "ta",
        "tel" => "te",
        "kan" => "kn",
        "mal" => "ml",
        "ori" => "or",
        "nep" => "ne",
        "sin" => "si",
        "tha" => "th",
        "khm" => "km",
        "mya" => "my",
        "vie" => "vi",
        "ind" => "id",
        "jav" => "jv",
        "tgl" => "tl",
        "cmn" => "zh",
        "jpn" => "ja",
        "kor" => "ko",
        "amh" => "am",
        "aka" => "ak",
        "zul" => "zu",
        "sna" => "sn",
        "lat" => "la",
        "epo" => "eo",
        _ => return None,
    };
    Some(mapped)
}
