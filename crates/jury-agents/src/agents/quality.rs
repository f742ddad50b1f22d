//! Creative quality estimator.

use jury_consensus::{CriteriaSet, Genre, ScoreVector, Submission, Theme};

use super::{AgentKind, Assessment, AwardRecord, Signals};

const STRONG_FILM_CULTURES: &[&str] = &[
    "France",
    "Germany",
    "South Korea",
    "Japan",
    "Iran",
    "India",
    "USA",
    "UK",
];

const TRENDING_THEMES: &[Theme] = &[
    Theme::MentalHealth,
    Theme::ClimateChange,
    Theme::Identity,
    Theme::SocialJustice,
    Theme::Family,
];

/// Judges narrative and craft from runtime, origin, themes and track record.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityAgent;

impl QualityAgent {
    pub fn evaluate(&self, submission: &Submission, criteria: &CriteriaSet) -> ScoreVector {
        let signals = Signals::read(submission);
        let mut a = Assessment::uniform(signals.baseline());
        let mut notes = Vec::new();

        let runtime = signals.runtime;
        if (5.0..=20.0).contains(&runtime) || (75.0..=120.0).contains(&runtime) {
            a.craft += 0.5;
            a.narrative += 0.5;
            notes.push("runtime in the programming sweet spot");
        } else if runtime > 120.0 {
            a.craft -= 0.5;
            notes.push("long runtime, tighter edit advised");
        }

        if let Some(country) = signals.country.as_deref() {
            if STRONG_FILM_CULTURES.iter().any(|c| country.contains(c)) {
                a.craft += 0.3;
                notes.push("strong film culture of origin");
            }
        }

        let trending = signals
            .themes
            .iter()
            .filter(|t| TRENDING_THEMES.contains(t))
            .count();
        if trending > 0 {
            a.originality += 0.4 * trending as f64;
            a.narrative += 0.2 * trending as f64;
            notes.push("trending themes");
        }

        if matches!(
            submission.genre(),
            Genre::Documentary | Genre::Drama | Genre::Animation
        ) {
            a.narrative += 0.3;
            notes.push("strong festival genre");
        }

        if signals.first_time_filmmaker {
            a.originality += 0.2;
            notes.push("first-time filmmaker");
        }

        let track_record = match signals.awards {
            AwardRecord::Winner => 1.5,
            AwardRecord::OfficialSelection => 0.8,
            AwardRecord::Finalist => 0.5,
            AwardRecord::None => 0.0,
        };
        if track_record > 0.0 {
            a.narrative += track_record;
            a.craft += track_record;
            a.originality += track_record * 0.5;
            a.marketability += track_record * 0.5;
            notes.push("festival track record");
        }

        let mut confidence = 0.65;
        if signals.rich_synopsis {
            confidence += 0.1;
        }
        if signals.has_award_metadata {
            confidence += 0.15;
        }
        if runtime > 0.0 {
            confidence += 0.05;
        }

        let rationale = if notes.is_empty() {
            format!("Quality analysis for '{}': no distinguishing signals", submission.title())
        } else {
            format!("Quality analysis for '{}': {}", submission.title(), notes.join("; "))
        };
        a.into_vector(AgentKind::Quality, confidence, criteria, rationale)
    }
}
