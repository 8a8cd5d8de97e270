//! Language codes accepted by the OCR stage.

use crate::core::{OCRError, OcrResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Supported languages as `(code, name)`, sorted by code.
pub const CODE_TO_LANGUAGE: &[(&str, &str)] = &[
    ("_math", "Math"),
    ("af", "Afrikaans"),
    ("am", "Amharic"),
    ("ar", "Arabic"),
    ("as", "Assamese"),
    ("az", "Azerbaijani"),
    ("be", "Belarusian"),
    ("bg", "Bulgarian"),
    ("bn", "Bengali"),
    ("br", "Breton"),
    ("bs", "Bosnian"),
    ("ca", "Catalan"),
    ("cs", "Czech"),
    ("cy", "Welsh"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("eo", "Esperanto"),
    ("es", "Spanish"),
    ("et", "Estonian"),
    ("eu", "Basque"),
    ("fa", "Persian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("fy", "Western Frisian"),
    ("ga", "Irish"),
    ("gd", "Scottish Gaelic"),
    ("gl", "Galician"),
    ("gu", "Gujarati"),
    ("ha", "Hausa"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hr", "Croatian"),
    ("hu", "Hungarian"),
    ("hy", "Armenian"),
    ("id", "Indonesian"),
    ("is", "Icelandic"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("jv", "Javanese"),
    ("ka", "Georgian"),
    ("kk", "Kazakh"),
    ("km", "Khmer"),
    ("kn", "Kannada"),
    ("ko", "Korean"),
    ("ku", "Kurdish"),
    ("ky", "Kyrgyz"),
    ("la", "Latin"),
    ("lo", "Lao"),
    ("lt", "Lithuanian"),
    ("lv", "Latvian"),
    ("mg", "Malagasy"),
    ("mk", "Macedonian"),
    ("ml", "Malayalam"),
    ("mn", "Mongolian"),
    ("mr", "Marathi"),
    ("ms", "Malay"),
    ("my", "Burmese"),
    ("ne", "Nepali"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("om", "Oromo"),
    ("or", "Oriya"),
    ("pa", "Punjabi"),
    ("pl", "Polish"),
    ("ps", "Pashto"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sa", "Sanskrit"),
    ("sd", "Sindhi"),
    ("si", "Sinhala"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("so", "Somali"),
    ("sq", "Albanian"),
    ("sr", "Serbian"),
    ("su", "Sundanese"),
    ("sv", "Swedish"),
    ("sw", "Swahili"),
    ("ta", "Tamil"),
    ("te", "Telugu"),
    ("th", "Thai"),
    ("tl", "Tagalog"),
    ("tr", "Turkish"),
    ("ug", "Uyghur"),
    ("uk", "Ukrainian"),
    ("ur", "Urdu"),
    ("uz", "Uzbek"),
    ("vi", "Vietnamese"),
    ("xh", "Xhosa"),
    ("yi", "Yiddish"),
    ("zh", "Chinese"),
];

/// Lowercased language name to code.
static LANGUAGE_TO_CODE: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    CODE_TO_LANGUAGE
        .iter()
        .map(|(code, name)| (name.to_lowercase(), *code))
        .collect()
});

/// Whether `code` is a supported language code.
pub fn is_language_code(code: &str) -> bool {
    CODE_TO_LANGUAGE
        .binary_search_by(|(c, _)| (*c).cmp(code))
        .is_ok()
}

/// Resolves each entry of `langs` to a language code.
///
/// Codes are kept as given, language names match case-insensitively. The
/// input is left untouched.
///
/// # Errors
///
/// Returns [`OCRError::UnsupportedLanguage`] for the first entry that is
/// neither.
pub fn replace_lang_with_code(langs: &[String]) -> OcrResult<Vec<String>> {
    langs
        .iter()
        .map(|lang| {
            let lang = lang.trim();
            if is_language_code(lang) {
                return Ok(lang.to_string());
            }
            LANGUAGE_TO_CODE
                .get(&lang.to_lowercase())
                .map(|code| code.to_string())
                .ok_or_else(|| OCRError::UnsupportedLanguage {
                    language: lang.to_string(),
                })
        })
        .collect()
}
