//! Festival-circuit fit estimator.
//!
//! Matches the submission against a fixed circuit of festivals by genre,
//! runtime class and quality bar, and scores how well it would travel.

use jury_consensus::{CriteriaSet, Genre, ScoreVector, Submission, Theme};
use serde::Serialize;

use super::{AgentKind, Assessment, AwardRecord, Signals};

/// Runtime at or below which a film is programmed as a short.
const SHORT_MAX_MINUTES: f64 = 40.0;

/// Festivals kept on a submission's shortlist.
pub const SHORTLIST_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Short,
    Feature,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Programme {
    AllGenres,
    Genres(&'static [Genre]),
    Themes(&'static [Theme]),
}

struct Festival {
    name: &'static str,
    tier: u8,
    programme: Programme,
    format: Format,
    /// Minimum quality on the 1–10 scale
    bar: f64,
}

const CIRCUIT: &[Festival] = &[
    Festival { name: "Sundance", tier: 1, programme: Programme::Genres(&[Genre::Drama, Genre::Documentary]), format: Format::Feature, bar: 8.5 },
    Festival { name: "Berlinale", tier: 1, programme: Programme::Genres(&[Genre::Drama, Genre::Documentary]), format: Format::Feature, bar: 8.5 },
    Festival { name: "TIFF", tier: 1, programme: Programme::AllGenres, format: Format::Feature, bar: 8.0 },
    Festival { name: "IDFA", tier: 1, programme: Programme::Genres(&[Genre::Documentary]), format: Format::Both, bar: 7.5 },
    Festival { name: "Clermont-Ferrand", tier: 1, programme: Programme::AllGenres, format: Format::Short, bar: 7.0 },
    Festival { name: "Annecy", tier: 1, programme: Programme::Genres(&[Genre::Animation]), format: Format::Both, bar: 7.0 },
    Festival { name: "Tribeca", tier: 2, programme: Programme::Genres(&[Genre::Drama, Genre::Documentary]), format: Format::Both, bar: 7.5 },
    Festival { name: "BFI London", tier: 2, programme: Programme::AllGenres, format: Format::Feature, bar: 7.5 },
    Festival { name: "Hot Docs", tier: 2, programme: Programme::Genres(&[Genre::Documentary]), format: Format::Both, bar: 7.0 },
    Festival { name: "Palm Springs ShortFest", tier: 2, programme: Programme::AllGenres, format: Format::Short, bar: 6.5 },
    Festival { name: "Fantastic Fest", tier: 2, programme: Programme::Genres(&[Genre::Horror, Genre::SciFi, Genre::Thriller]), format: Format::Both, bar: 6.5 },
    Festival { name: "Tampere", tier: 2, programme: Programme::AllGenres, format: Format::Short, bar: 6.0 },
    Festival { name: "Sheffield DocFest", tier: 2, programme: Programme::Genres(&[Genre::Documentary]), format: Format::Both, bar: 6.5 },
    Festival { name: "Global Health Film Festival", tier: 3, programme: Programme::Themes(&[Theme::Health, Theme::MentalHealth]), format: Format::Both, bar: 5.0 },
    Festival { name: "Peekaboon", tier: 3, programme: Programme::Themes(&[Theme::Health, Theme::MentalHealth, Theme::SocialJustice]), format: Format::Both, bar: 4.0 },
];

/// One festival the submission qualifies for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FestivalMatch {
    pub name: &'static str,
    /// 1 = premier circuit, 3 = specialist
    pub tier: u8,
    /// Fit on the 0–100 scale
    pub fit: f64,
}

fn match_circuit(genre: Genre, themes: &[Theme], runtime: f64, quality: f64) -> Vec<FestivalMatch> {
    let format = if runtime <= SHORT_MAX_MINUTES {
        Format::Short
    } else {
        Format::Feature
    };
    let mut matches: Vec<FestivalMatch> = CIRCUIT
        .iter()
        .filter(|f| quality >= f.bar)
        .filter(|f| f.format == Format::Both || f.format == format)
        .filter_map(|f| {
            let programme_bonus = match f.programme {
                Programme::AllGenres => 15.0,
                Programme::Genres(genres) if genres.contains(&genre) => 25.0,
                Programme::Themes(wanted) if themes.iter().any(|t| wanted.contains(t)) => 20.0,
                _ => return None,
            };
            Some(FestivalMatch {
                name: f.name,
                tier: f.tier,
                fit: (50.0 + programme_bonus + (quality * 3.0).floor()).min(100.0),
            })
        })
        .collect();
    matches.sort_by(|a, b| b.fit.total_cmp(&a.fit).then(a.tier.cmp(&b.tier)));
    matches
}

/// Scores how well a submission fits the festival circuit.
#[derive(Debug, Clone, Copy, Default)]
pub struct FestivalAgent;

impl FestivalAgent {
    /// Best-fitting festivals for the submission, strongest first.
    pub fn shortlist(&self, submission: &Submission) -> Vec<FestivalMatch> {
        let signals = Signals::read(submission);
        let mut matches = circuit_for(submission, &signals, festival_quality(&signals));
        matches.truncate(SHORTLIST_LEN);
        matches
    }

    pub fn evaluate(&self, submission: &Submission, criteria: &CriteriaSet) -> ScoreVector {
        let signals = Signals::read(submission);
        let quality = festival_quality(&signals);
        let matches = circuit_for(submission, &signals, quality);

        let mut a = Assessment::uniform(quality);
        a.marketability = matches.first().map(|m| m.fit / 10.0).unwrap_or(3.0);
        if signals.first_time_filmmaker {
            // Discovery sections favour debuts.
            a.originality += 0.5;
        }
        if matches.iter().any(|m| m.tier == 1) {
            a.craft += 0.5;
        }

        let mut confidence = 0.6;
        if matches.len() >= 3 {
            confidence += 0.1;
        }
        if signals.has_award_metadata {
            confidence += 0.15;
        }
        if signals.prior_mean.is_some() {
            confidence += 0.1;
        }

        let rationale = if matches.is_empty() {
            format!(
                "Festival fit for '{}': no circuit matches at quality {:.1}",
                submission.title(),
                quality
            )
        } else {
            format!(
                "Festival fit for '{}': {} matches, shortlist {}",
                submission.title(),
                matches.len(),
                matches
                    .iter()
                    .take(SHORTLIST_LEN)
                    .map(|m| format!("{} (tier {}, fit {:.0})", m.name, m.tier, m.fit))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        a.into_vector(AgentKind::Festival, confidence, criteria, rationale)
    }
}

fn festival_quality(signals: &Signals) -> f64 {
    signals.baseline()
        + match signals.awards {
            AwardRecord::Winner => 1.5,
            AwardRecord::OfficialSelection => 0.8,
            AwardRecord::Finalist => 0.5,
            AwardRecord::None => 0.0,
        }
}

fn circuit_for(submission: &Submission, signals: &Signals, quality: f64) -> Vec<FestivalMatch> {
    match_circuit(submission.genre(), &signals.themes, signals.runtime, quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jury_consensus::{normalize, Criterion, RawSubmission};

    #[test]
    fn test_short_documentary_matches_doc_festivals() {
        let matches = match_circuit(Genre::Documentary, &[], 18.0, 7.5);
        let names: Vec<&str> = matches.iter().map(|m| m.name).collect();
        assert!(names.contains(&"IDFA"));
        assert!(names.contains(&"Clermont-Ferrand"));
        assert!(!names.contains(&"Sundance"), "features only");
        assert_eq!(matches[0].fit, 97.0);
    }

    #[test]
    fn test_theme_festivals_catch_unmatched_genres() {
        let matches = match_circuit(Genre::Comedy, &[Theme::MentalHealth], 95.0, 5.0);
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.tier == 3));
    }

    #[test]
    fn test_shortlist_is_capped_and_ordered() {
        let sub = normalize(
            RawSubmission::new("f2", "Ice Road", "Truckers cross a frozen lake before the thaw.")
                .genre("Documentary")
                .runtime(22.0)
                .rating("festival_reader", 8.0)
                .metadata("awards", "Winner, Best Short Documentary"),
        )
        .unwrap();
        let agent = FestivalAgent;
        let shortlist = agent.shortlist(&sub);
        assert_eq!(shortlist.len(), SHORTLIST_LEN);
        assert!(shortlist
            .windows(2)
            .all(|w| w[0].fit > w[1].fit || (w[0].fit == w[1].fit && w[0].tier <= w[1].tier)));

        let rationale = agent
            .evaluate(&sub, &CriteriaSet::default())
            .rationale
            .unwrap();
        for m in &shortlist {
            assert!(rationale.contains(m.name), "{rationale} missing {}", m.name);
        }
    }

    #[test]
    fn test_no_match_lowers_marketability() {
        let sub = normalize(
            RawSubmission::new("f1", "Static", "An unremarkable afternoon.")
                .genre("Romance")
                .runtime(95.0),
        )
        .unwrap();
        let v = FestivalAgent.evaluate(&sub, &CriteriaSet::default());
        assert_eq!(v.score(Criterion::Marketability), Some(30.0));
        assert!(v.rationale.unwrap().contains("no circuit matches"));
    }
}
