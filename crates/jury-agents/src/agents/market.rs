//! Commercial viability estimator.

use jury_consensus::{CriteriaSet, Genre, ScoreVector, Submission};

use super::{AgentKind, Assessment, AwardRecord, Signals};

/// Market momentum of a genre.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trend {
    Hot,
    Rising,
    Stable,
    Niche,
}

/// Genre demand on a 0–1 scale and its direction.
fn genre_outlook(genre: Genre) -> (f64, Trend) {
    match genre {
        Genre::Documentary => (0.85, Trend::Rising),
        Genre::Drama => (0.75, Trend::Stable),
        Genre::Thriller => (0.85, Trend::Rising),
        Genre::Horror => (0.90, Trend::Hot),
        Genre::Comedy => (0.70, Trend::Stable),
        Genre::SciFi => (0.80, Trend::Rising),
        Genre::SocialImpact => (0.75, Trend::Rising),
        Genre::Animation => (0.85, Trend::Hot),
        Genre::Romance => (0.65, Trend::Stable),
        Genre::Experimental => (0.45, Trend::Niche),
        Genre::Other => (0.60, Trend::Stable),
    }
}

/// Scores distribution potential from genre demand, runtime fit and awards.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketAgent;

impl MarketAgent {
    pub fn evaluate(&self, submission: &Submission, criteria: &CriteriaSet) -> ScoreVector {
        let signals = Signals::read(submission);
        let (demand, trend) = genre_outlook(submission.genre());
        let mut a = Assessment::uniform(signals.baseline());

        a.marketability = demand * 10.0;
        let runtime = signals.runtime;
        if (5.0..=15.0).contains(&runtime) || (85.0..=110.0).contains(&runtime) {
            a.marketability += 0.5;
        } else if runtime > 150.0 {
            a.marketability -= 1.0;
        }

        let awards_bonus = match signals.awards {
            AwardRecord::Winner => 1.5,
            AwardRecord::OfficialSelection => 0.8,
            _ => 0.0,
        };
        a.marketability += awards_bonus;
        a.narrative += awards_bonus * 0.5;
        a.craft += awards_bonus * 0.5;

        match trend {
            Trend::Hot | Trend::Rising => a.originality += 0.5,
            Trend::Niche => a.originality += 1.0,
            Trend::Stable => {}
        }

        let mut confidence = 0.60;
        if signals.has_award_metadata {
            confidence += 0.2;
        }
        if runtime > 0.0 {
            confidence += 0.1;
        }

        let rationale = format!(
            "Market analysis for '{}': {} demand {:.2} ({:?})",
            submission.title(),
            submission.genre(),
            demand,
            trend
        );
        a.into_vector(AgentKind::Market, confidence, criteria, rationale)
    }
}
