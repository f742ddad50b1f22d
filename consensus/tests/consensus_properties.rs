//! Consensus property tests: deterministic sweeps over varied inputs.
//!
//! Tests verify:
//! - Composite scores stay inside the observed min–max range
//! - Any permutation of the input yields a bit-identical result
//! - Agreement is 1 for identical inputs and falls as spread grows
//! - The S1 and S2 reference scenarios

use chrono::{TimeZone, Utc};
use jury_consensus::{
    normalize, AgentRoster, AuditKind, ConsensusConfig, ConsensusEngine, ConsensusResult,
    Criterion, RawSubmission, ScoreVector, Submission,
};

fn submission(id: &str) -> Submission {
    normalize(
        RawSubmission::new(id, "Northern Passage", "A ferry captain's last winter crossing.")
            .genre("Drama")
            .runtime(101.0),
    )
    .unwrap()
}

fn roster_of(agents: &[&str]) -> AgentRoster {
    agents
        .iter()
        .fold(AgentRoster::new("prop-v1"), |r, a| r.with_member(*a, 1.0))
}

/// Vector with `base` on every criterion, then per-criterion overrides.
fn vector(agent: &str, confidence: f64, base: f64, overrides: &[(Criterion, f64)]) -> ScoreVector {
    let ts = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
    let mut v = Criterion::all()
        .iter()
        .fold(ScoreVector::new(agent, confidence), |v, c| v.with_score(*c, base))
        .produced_at(ts);
    for (criterion, score) in overrides {
        v = v.with_score(*criterion, *score);
    }
    v
}

/// Small deterministic generator so sweeps are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn score(&mut self) -> f64 {
        (self.next_f64() * 100.0 * 4.0).round() / 4.0
    }
}

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

fn assert_bit_identical(a: &ConsensusResult, b: &ConsensusResult) {
    for (criterion, score) in &a.composite {
        assert_eq!(
            score.to_bits(),
            b.composite[criterion].to_bits(),
            "composite for {} differs",
            criterion
        );
    }
    assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
    assert_eq!(a.agreement.to_bits(), b.agreement.to_bits());
    assert_eq!(a.overall_score.to_bits(), b.overall_score.to_bits());
    assert_eq!(a, b);
}

// ── Property: composite inside observed range ──────────────────────

#[test]
fn prop_composite_within_observed_range() {
    let agents = ["alpha", "bravo", "charlie", "delta", "echo"];
    let engine = ConsensusEngine::new(roster_of(&agents)).unwrap();
    let sub = submission("range");
    let mut rng = Lcg(7);

    for trial in 0..200 {
        let count = 1 + trial % agents.len();
        let vectors: Vec<ScoreVector> = agents[..count]
            .iter()
            .map(|agent| {
                let confidence = rng.next_f64();
                let mut v = ScoreVector::new(*agent, confidence);
                for criterion in Criterion::all() {
                    v = v.with_score(*criterion, rng.score());
                }
                v
            })
            .collect();

        let result = engine.aggregate(&sub, &vectors).unwrap();
        for criterion in Criterion::all() {
            let observed: Vec<f64> = vectors.iter().filter_map(|v| v.score(*criterion)).collect();
            let min = observed.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = observed.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let composite = result.composite_for(*criterion).unwrap();
            assert!(
                (min..=max).contains(&composite),
                "trial={} {}: composite {} outside [{}, {}]",
                trial,
                criterion,
                composite,
                min,
                max
            );
        }
        assert!((0.0..=1.0).contains(&result.agreement));
        assert!((0.0..=1.0).contains(&result.confidence));
    }
}

// ── Property: order independence ───────────────────────────────────

#[test]
fn prop_permutation_yields_bit_identical_result() {
    let roster = AgentRoster::new("prop-v1")
        .with_member("quality", 1.0)
        .with_member("market", 0.85)
        .with_member("festival", 0.9)
        .with_member("technical", 0.7);
    let engine = ConsensusEngine::new(roster).unwrap();
    let sub = submission("perm");

    let mut rng = Lcg(42);
    for round in 0..5 {
        let vectors: Vec<ScoreVector> = ["quality", "market", "festival", "technical"]
            .iter()
            .map(|agent| {
                let mut v = vector(agent, 0.3 + rng.next_f64() * 0.7, 0.0, &[]);
                for criterion in Criterion::all() {
                    v = v.with_score(*criterion, rng.score());
                }
                v
            })
            .collect();

        let reference = engine.aggregate(&sub, &vectors).unwrap();
        for permuted in permutations(&vectors) {
            let result = engine.aggregate(&sub, &permuted).unwrap();
            assert_bit_identical(&reference, &result);
        }
        assert_eq!(
            reference.contributors.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
            vec!["festival", "market", "quality", "technical"],
            "round={}: contributors must be sorted",
            round
        );
    }
}

// ── Property: agreement monotonic in spread ────────────────────────

#[test]
fn prop_agreement_is_one_for_identical_inputs() {
    let engine = ConsensusEngine::new(roster_of(&["a", "b", "c"])).unwrap();
    let sub = submission("same");
    for score in [0.0, 33.5, 100.0] {
        let vectors = vec![
            vector("a", 0.9, score, &[]),
            vector("b", 0.4, score, &[]),
            vector("c", 0.7, score, &[]),
        ];
        let result = engine.aggregate(&sub, &vectors).unwrap();
        assert_eq!(result.agreement, 1.0, "score={}", score);
        assert!(result.divergent_criteria.is_empty());
    }
}

#[test]
fn prop_agreement_decreases_with_spread() {
    let engine = ConsensusEngine::new(roster_of(&["a", "b"])).unwrap();
    let sub = submission("spread");
    let mut previous = f64::INFINITY;

    for gap in (0..=50).step_by(5) {
        let gap = gap as f64;
        let vectors = vec![
            vector("a", 0.8, 50.0 - gap, &[]),
            vector("b", 0.8, 50.0 + gap, &[]),
        ];
        let result = engine.aggregate(&sub, &vectors).unwrap();
        assert!(
            result.agreement < previous,
            "gap={}: agreement {} should be below {}",
            gap,
            result.agreement,
            previous
        );
        previous = result.agreement;
    }
    assert_eq!(previous, 0.0);
}

// ── Reference scenarios ────────────────────────────────────────────

#[test]
fn test_s1_small_spread_no_escalation() {
    let engine = ConsensusEngine::new(roster_of(&["a", "b", "c"])).unwrap();
    let vectors = vec![
        vector("a", 0.9, 60.0, &[(Criterion::Narrative, 70.0)]),
        vector("b", 0.8, 60.0, &[(Criterion::Narrative, 75.0)]),
        vector("c", 0.95, 60.0, &[(Criterion::Narrative, 80.0)]),
    ];
    let result = engine.aggregate(&submission("S1"), &vectors).unwrap();

    let expected = (70.0 * 0.9 + 75.0 * 0.8 + 80.0 * 0.95) / (0.9 + 0.8 + 0.95);
    let narrative = result.composite_for(Criterion::Narrative).unwrap();
    assert!((narrative - expected).abs() < 1e-9, "narrative={}", narrative);
    assert!((narrative - 75.094).abs() < 1e-3);

    assert_eq!(result.spreads[&Criterion::Narrative], 10.0);
    assert!((result.agreement - 0.98).abs() < 1e-12);
    assert!(!result.high_disagreement);
    assert!(!result.escalation);
    assert!(!result.review_recommended);
}

#[test]
fn test_s2_large_spread_escalates_when_roster_incomplete() {
    let engine = ConsensusEngine::new(roster_of(&["a", "b", "c", "d"])).unwrap();
    let vectors = vec![
        vector("a", 0.8, 55.0, &[(Criterion::Originality, 20.0)]),
        vector("b", 0.8, 55.0, &[(Criterion::Originality, 90.0)]),
    ];
    let result = engine.aggregate(&submission("S2"), &vectors).unwrap();

    assert_eq!(result.divergent_criteria, vec![Criterion::Originality]);
    assert!(result.high_disagreement);
    assert!(result.escalation);
    assert_eq!(result.roster_size, 4);
    assert!(result
        .audit
        .iter()
        .any(|n| n.kind == AuditKind::Escalation && n.detail.contains("2/4")));
}

#[test]
fn test_full_roster_never_escalates() {
    let engine = ConsensusEngine::new(roster_of(&["a", "b"])).unwrap();
    let vectors = vec![
        vector("a", 0.8, 55.0, &[(Criterion::Originality, 20.0)]),
        vector("b", 0.8, 55.0, &[(Criterion::Originality, 90.0)]),
    ];
    let result = engine.aggregate(&submission("S2-full"), &vectors).unwrap();
    assert!(result.high_disagreement);
    assert!(!result.escalation);
}

#[test]
fn test_divergence_tolerance_is_configurable() {
    let config = ConsensusConfig {
        max_divergent_criteria: 1,
        ..Default::default()
    };
    let engine = ConsensusEngine::with_config(roster_of(&["a", "b", "c"]), config).unwrap();
    let vectors = vec![
        vector("a", 0.8, 55.0, &[(Criterion::Originality, 20.0)]),
        vector("b", 0.8, 55.0, &[(Criterion::Originality, 90.0)]),
    ];
    let result = engine.aggregate(&submission("tolerant"), &vectors).unwrap();
    assert_eq!(result.divergent_criteria.len(), 1);
    assert!(!result.high_disagreement);
    assert!(!result.escalation);
}

#[test]
fn test_low_confidence_recommends_review() {
    let engine = ConsensusEngine::new(roster_of(&["a", "b"])).unwrap();
    let vectors = vec![vector("a", 0.5, 40.0, &[]), vector("b", 0.55, 40.0, &[])];
    let result = engine.aggregate(&submission("shaky"), &vectors).unwrap();
    assert!(result.confidence < 0.6);
    assert!(result.review_recommended);
    assert!(result
        .audit
        .iter()
        .any(|n| n.kind == AuditKind::LowConfidence));
}

#[test]
fn test_reliability_weights_shift_composite() {
    let roster = AgentRoster::new("weighted")
        .with_member("trusted", 1.0)
        .with_member("noisy", 0.25);
    let engine = ConsensusEngine::new(roster).unwrap();
    let vectors = vec![vector("trusted", 0.8, 80.0, &[]), vector("noisy", 0.8, 40.0, &[])];
    let result = engine.aggregate(&submission("weights"), &vectors).unwrap();
    // (1.0 * 80 + 0.25 * 40) / 1.25
    assert!((result.overall_score - 72.0).abs() < 1e-9);
}

#[test]
fn test_as_of_is_latest_vector_timestamp() {
    let engine = ConsensusEngine::new(roster_of(&["a", "b"])).unwrap();
    let early = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
    let late = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 30).unwrap();
    let vectors = vec![
        vector("a", 0.8, 50.0, &[]).produced_at(late),
        vector("b", 0.8, 50.0, &[]).produced_at(early),
    ];
    let result = engine.aggregate(&submission("ts"), &vectors).unwrap();
    assert_eq!(result.as_of, late);
}
