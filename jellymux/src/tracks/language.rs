//! Language tags found in track file names.

/// A language a track file can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Tag passed to mkvmerge (ISO 639-2 or BCP 47).
    pub code: &'static str,
    /// Human-readable name, used as the track name.
    pub name: &'static str,
}

/// Recognized spellings, lowercase, mapped to their language.
const LANGUAGES: &[(&[&str], Language)] = &[
    (
        &["en", "eng", "english"],
        Language { code: "eng", name: "English" },
    ),
    (
        &["ja", "jp", "jpn", "jap", "japanese"],
        Language { code: "jpn", name: "Japanese" },
    ),
    (
        &["ru", "rus", "russian"],
        Language { code: "rus", name: "Russian" },
    ),
    (
        &["uk", "ukr", "ukrainian"],
        Language { code: "ukr", name: "Ukrainian" },
    ),
    (
        &["de", "ger", "deu", "german"],
        Language { code: "ger", name: "German" },
    ),
    (
        &["fr", "fre", "fra", "french"],
        Language { code: "fre", name: "French" },
    ),
    (
        &["es", "spa", "spanish"],
        Language { code: "spa", name: "Spanish" },
    ),
    (
        &["it", "ita", "italian"],
        Language { code: "ita", name: "Italian" },
    ),
    (
        &["pt", "por", "portuguese"],
        Language { code: "por", name: "Portuguese" },
    ),
    (
        &["ko", "kor", "korean"],
        Language { code: "kor", name: "Korean" },
    ),
    (
        &["chs", "sc", "gb", "zh-hans"],
        Language { code: "zh-Hans", name: "Chinese (Simplified)" },
    ),
    (
        &["cht", "tc", "big5", "zh-hant"],
        Language { code: "zh-Hant", name: "Chinese (Traditional)" },
    ),
    (
        &["zh", "chi", "zho", "chinese"],
        Language { code: "chi", name: "Chinese" },
    ),
];

/// Code used when nothing in the path names a language.
pub const UNDETERMINED: &str = "und";

/// Look up a tag such as `en`, `JPN` or `big5`.
pub fn lookup(tag: &str) -> Option<Language> {
    let tag = tag.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(spellings, _)| spellings.contains(&tag.as_str()))
        .map(|(_, language)| *language)
}

/// Whether `tag` is a spelling of the language with `code`.
pub fn tag_matches(tag: &str, code: &str) -> bool {
    tag.eq_ignore_ascii_case(code) || lookup(tag).is_some_and(|l| l.code == code)
}
