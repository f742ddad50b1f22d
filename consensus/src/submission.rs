//! Submission schema and normalizer.
//!
//! Raw records come from the festival data store with every field optional and
//! loosely formatted. [`normalize`] turns one into an immutable [`Submission`]
//! or rejects it with a [`ValidationError`]; it never builds a partial value.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Highest accepted prior external rating.
pub const PRIOR_RATING_MAX: f64 = 10.0;

/// Known genres; anything unrecognized is tagged `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    Documentary,
    Drama,
    Thriller,
    Horror,
    Comedy,
    SciFi,
    Animation,
    Romance,
    SocialImpact,
    Experimental,
    Other,
}

impl Genre {
    /// Parse a free-form genre field.
    ///
    /// Store exports list several genres separated by commas or slashes; the
    /// first recognized one wins.
    pub fn parse(raw: &str) -> Self {
        raw.split([',', '/', ';'])
            .find_map(Self::from_label)
            .unwrap_or(Self::Other)
    }

    fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(['-', '_', ' '], "");
        let genre = match normalized.as_str() {
            "documentary" | "doc" | "docu" => Self::Documentary,
            "drama" => Self::Drama,
            "thriller" | "suspense" => Self::Thriller,
            "horror" => Self::Horror,
            "comedy" => Self::Comedy,
            "scifi" | "sciencefiction" | "sf" => Self::SciFi,
            "animation" | "animated" => Self::Animation,
            "romance" => Self::Romance,
            "socialimpact" => Self::SocialImpact,
            "experimental" | "avantgarde" => Self::Experimental,
            _ => return None,
        };
        Some(genre)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Documentary => "Documentary",
            Self::Drama => "Drama",
            Self::Thriller => "Thriller",
            Self::Horror => "Horror",
            Self::Comedy => "Comedy",
            Self::SciFi => "Sci-Fi",
            Self::Animation => "Animation",
            Self::Romance => "Romance",
            Self::SocialImpact => "Social Impact",
            Self::Experimental => "Experimental",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for Genre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Thematic tags detected from the synopsis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    MentalHealth,
    SocialJustice,
    ClimateChange,
    Health,
    Family,
    Identity,
    Love,
    War,
    Technology,
    Education,
}

impl Theme {
    pub fn all() -> &'static [Theme] {
        &[
            Theme::MentalHealth,
            Theme::SocialJustice,
            Theme::ClimateChange,
            Theme::Health,
            Theme::Family,
            Theme::Identity,
            Theme::Love,
            Theme::War,
            Theme::Technology,
            Theme::Education,
        ]
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::MentalHealth => &["mental", "depression", "anxiety", "suicide", "therapy", "psychological"],
            Self::SocialJustice => &["justice", "equality", "rights", "discrimination", "activism"],
            Self::ClimateChange => &["climate", "environment", "nature", "pollution", "sustainability"],
            Self::Health => &["health", "medical", "disease", "hospital", "doctor", "patient"],
            Self::Family => &["family", "mother", "father", "parent", "child", "son", "daughter"],
            Self::Identity => &["identity", "culture", "heritage", "who am i"],
            Self::Love => &["love", "romance", "relationship", "heart", "passion"],
            Self::War => &["war", "soldier", "military", "conflict", "battle"],
            Self::Technology => &["technology", "ai", "computer", "digital", "internet"],
            Self::Education => &["education", "school", "student", "learn", "teacher"],
        }
    }

    /// Detect themes by whole-word keyword match, in canonical order.
    pub fn detect(text: &str) -> Vec<Theme> {
        THEME_PATTERNS
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(theme, _)| *theme)
            .collect()
    }
}

/// One case-insensitive whole-word matcher per theme, plural forms included.
static THEME_PATTERNS: LazyLock<Vec<(Theme, Regex)>> = LazyLock::new(|| {
    Theme::all()
        .iter()
        .map(|theme| {
            let alternatives = theme
                .keywords()
                .iter()
                .map(|kw| regex::escape(kw))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?i)\b(?:{})s?\b", alternatives);
            (
                *theme,
                Regex::new(&pattern).expect("theme keyword pattern should compile"),
            )
        })
        .collect()
});

/// `HH:MM:SS` or `MM:SS`
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,3}):(\d{1,2})(?::(\d{1,2}))?\s*$")
        .expect("DURATION_RE regex should compile")
});

/// An external rating the submission already holds (e.g. a prior festival jury).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorRating {
    pub source: String,
    /// Score on a 0–10 scale
    pub score: f64,
}

/// Submission as exported by the data store. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSubmission {
    pub id: Option<String>,
    pub title: Option<String>,
    pub synopsis: Option<String>,
    pub genre: Option<String>,
    pub runtime_minutes: Option<f64>,
    /// `HH:MM:SS` or `MM:SS`, used when `runtime_minutes` is absent
    pub duration: Option<String>,
    pub technical_metadata: BTreeMap<String, String>,
    pub prior_ratings: Vec<PriorRating>,
}

impl RawSubmission {
    pub fn new(id: &str, title: &str, synopsis: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            synopsis: Some(synopsis.to_string()),
            ..Default::default()
        }
    }

    pub fn genre(mut self, genre: &str) -> Self {
        self.genre = Some(genre.to_string());
        self
    }

    pub fn runtime(mut self, minutes: f64) -> Self {
        self.runtime_minutes = Some(minutes);
        self
    }

    pub fn duration(mut self, duration: &str) -> Self {
        self.duration = Some(duration.to_string());
        self
    }

    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.technical_metadata
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn rating(mut self, source: &str, score: f64) -> Self {
        self.prior_ratings.push(PriorRating {
            source: source.to_string(),
            score,
        });
        self
    }
}

/// Normalized, immutable submission. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    id: String,
    title: String,
    synopsis: String,
    genre: Genre,
    runtime_minutes: f64,
    technical_metadata: BTreeMap<String, String>,
    prior_ratings: Vec<PriorRating>,
    themes: Vec<Theme>,
}

impl Submission {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn synopsis(&self) -> &str {
        &self.synopsis
    }

    pub fn genre(&self) -> Genre {
        self.genre
    }

    pub fn runtime_minutes(&self) -> f64 {
        self.runtime_minutes
    }

    pub fn technical_metadata(&self) -> &BTreeMap<String, String> {
        &self.technical_metadata
    }

    /// Case-insensitive metadata lookup.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.technical_metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn prior_ratings(&self) -> &[PriorRating] {
        &self.prior_ratings
    }

    /// Mean of prior external ratings on the 0–10 scale.
    pub fn prior_rating_mean(&self) -> Option<f64> {
        if self.prior_ratings.is_empty() {
            return None;
        }
        let sum: f64 = self.prior_ratings.iter().map(|r| r.score).sum();
        Some(sum / self.prior_ratings.len() as f64)
    }

    pub fn themes(&self) -> &[Theme] {
        &self.themes
    }

    pub fn has_theme(&self, theme: Theme) -> bool {
        self.themes.contains(&theme)
    }

    /// BLAKE3 digest over every field, hex-encoded.
    ///
    /// Each field is length-prefixed so adjacent fields cannot alias.
    pub fn fingerprint(&self) -> String {
        fn field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }

        let mut hasher = blake3::Hasher::new();
        field(&mut hasher, self.id.as_bytes());
        field(&mut hasher, self.title.as_bytes());
        field(&mut hasher, self.synopsis.as_bytes());
        field(&mut hasher, self.genre.label().as_bytes());
        field(&mut hasher, &self.runtime_minutes.to_bits().to_le_bytes());
        for (key, value) in &self.technical_metadata {
            field(&mut hasher, key.as_bytes());
            field(&mut hasher, value.as_bytes());
        }
        for rating in &self.prior_ratings {
            field(&mut hasher, rating.source.as_bytes());
            field(&mut hasher, &rating.score.to_bits().to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Convert a raw record into a [`Submission`].
pub fn normalize(raw: RawSubmission) -> Result<Submission, ValidationError> {
    let id = required_text("id", raw.id)?;
    let title = required_text("title", raw.title)?;
    let synopsis = required_text("synopsis", raw.synopsis)?;

    let runtime_minutes = match (raw.runtime_minutes, raw.duration.as_deref()) {
        (Some(minutes), _) => minutes,
        (None, Some(duration)) if !duration.trim().is_empty() => parse_duration(duration)
            .ok_or_else(|| {
                ValidationError::new("duration", format!("unrecognized duration '{}', expected HH:MM:SS or MM:SS", duration.trim()))
            })?,
        (None, _) => {
            return Err(ValidationError::new(
                "runtime_minutes",
                "missing; provide runtime_minutes or duration",
            ))
        }
    };
    if !runtime_minutes.is_finite() || runtime_minutes <= 0.0 {
        return Err(ValidationError::new(
            "runtime_minutes",
            format!("must be a positive number of minutes, got {}", runtime_minutes),
        ));
    }

    let genre = raw
        .genre
        .as_deref()
        .map(Genre::parse)
        .unwrap_or(Genre::Other);

    let mut technical_metadata = BTreeMap::new();
    for (key, value) in raw.technical_metadata {
        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::new(
                "technical_metadata",
                "metadata keys must not be empty",
            ));
        }
        technical_metadata.insert(key.to_string(), value.trim().to_string());
    }

    for (idx, rating) in raw.prior_ratings.iter().enumerate() {
        let field = format!("prior_ratings[{}]", idx);
        if rating.source.trim().is_empty() {
            return Err(ValidationError::new(field, "source must not be empty"));
        }
        if !rating.score.is_finite() || !(0.0..=PRIOR_RATING_MAX).contains(&rating.score) {
            return Err(ValidationError::new(
                field,
                format!("score {} outside [0, {}]", rating.score, PRIOR_RATING_MAX),
            ));
        }
    }

    let themes = Theme::detect(&format!("{} {}", title, synopsis));

    Ok(Submission {
        id,
        title,
        synopsis,
        genre,
        runtime_minutes,
        technical_metadata,
        prior_ratings: raw.prior_ratings,
        themes,
    })
}

fn required_text(field: &str, value: Option<String>) -> Result<String, ValidationError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::new(field, "must not be empty")),
    }
}

/// Parse `HH:MM:SS` or `MM:SS` into whole minutes.
///
/// More than 30 trailing seconds round up to the next minute.
pub fn parse_duration(raw: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(raw)?;
    let first: u32 = caps.get(1)?.as_str().parse().ok()?;
    let second: u32 = caps.get(2)?.as_str().parse().ok()?;

    let (hours, minutes, seconds) = match caps.get(3) {
        Some(third) => (first, second, third.as_str().parse::<u32>().ok()?),
        None => (0, first, second),
    };
    if seconds >= 60 || (caps.get(3).is_some() && minutes >= 60) {
        return None;
    }
    let rounding = if seconds > 30 { 1 } else { 0 };
    Some(f64::from(hours * 60 + minutes + rounding))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RawSubmission {
        RawSubmission::new(
            "sub-001",
            "The Lighthouse Keeper",
            "A daughter returns to the island where her family kept the light for three generations.",
        )
        .genre("Drama")
        .runtime(94.0)
    }

    #[test]
    fn test_normalize_valid_submission() {
        let sub = normalize(valid()).unwrap();
        assert_eq!(sub.id(), "sub-001");
        assert_eq!(sub.genre(), Genre::Drama);
        assert_eq!(sub.runtime_minutes(), 94.0);
        assert!(sub.has_theme(Theme::Family));
    }

    #[test]
    fn test_empty_title_rejected() {
        let mut raw = valid();
        raw.title = Some("   ".into());
        let err = normalize(raw).unwrap_err();
        assert_eq!(err.field, "title");
    }

    #[test]
    fn test_missing_synopsis_rejected() {
        let mut raw = valid();
        raw.synopsis = None;
        assert_eq!(normalize(raw).unwrap_err().field, "synopsis");
    }

    #[test]
    fn test_non_positive_runtime_rejected() {
        let zero = valid().runtime(0.0);
        assert_eq!(normalize(zero).unwrap_err().field, "runtime_minutes");
        let negative = valid().runtime(-12.0);
        assert_eq!(normalize(negative).unwrap_err().field, "runtime_minutes");
        let nan = valid().runtime(f64::NAN);
        assert!(normalize(nan).is_err());
    }

    #[test]
    fn test_missing_runtime_rejected() {
        let mut raw = valid();
        raw.runtime_minutes = None;
        assert_eq!(normalize(raw).unwrap_err().field, "runtime_minutes");
    }

    #[test]
    fn test_duration_string_used_as_fallback() {
        let mut raw = valid();
        raw.runtime_minutes = None;
        let sub = normalize(raw.duration("01:29:50")).unwrap();
        assert_eq!(sub.runtime_minutes(), 90.0);
    }

    #[test]
    fn test_bad_duration_rejected() {
        let mut raw = valid();
        raw.runtime_minutes = None;
        let err = normalize(raw.duration("ninety minutes")).unwrap_err();
        assert_eq!(err.field, "duration");
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("00:04:59"), Some(5.0));
        assert_eq!(parse_duration("00:04:30"), Some(4.0));
        assert_eq!(parse_duration("12:10"), Some(12.0));
        assert_eq!(parse_duration("1:75:00"), None);
        assert_eq!(parse_duration("00:00:00"), Some(0.0));
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_unknown_genre_tagged_other() {
        let sub = normalize(valid().genre("Mumblecore")).unwrap();
        assert_eq!(sub.genre(), Genre::Other);

        let mut raw = valid();
        raw.genre = None;
        assert_eq!(normalize(raw).unwrap().genre(), Genre::Other);
    }

    #[test]
    fn test_genre_list_takes_first_known() {
        assert_eq!(Genre::parse("Mumblecore, sci-fi, Drama"), Genre::SciFi);
        assert_eq!(Genre::parse("Social Impact / Documentary"), Genre::SocialImpact);
    }

    #[test]
    fn test_prior_rating_range_checked() {
        let err = normalize(valid().rating("Raindance", 11.0)).unwrap_err();
        assert_eq!(err.field, "prior_ratings[0]");
        let ok = normalize(valid().rating("Raindance", 7.5).rating("BFI", 8.5)).unwrap();
        assert_eq!(ok.prior_rating_mean(), Some(8.0));
    }

    #[test]
    fn test_theme_detection_uses_whole_words() {
        let themes = Theme::detect("He said goodbye to the soldiers and the war.");
        assert_eq!(themes, vec![Theme::War]);
        assert!(!themes.contains(&Theme::Technology));
    }

    #[test]
    fn test_fingerprint_stable_and_content_sensitive() {
        let a = normalize(valid()).unwrap();
        let b = normalize(valid()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        let c = normalize(valid().metadata("resolution", "4K")).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_metadata_lookup_is_case_insensitive() {
        let sub = normalize(valid().metadata("Resolution", " 4K ")).unwrap();
        assert_eq!(sub.metadata("resolution"), Some("4K"));
    }
}
