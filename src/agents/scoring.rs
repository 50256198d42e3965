//! Scoring primitives shared by the recommenders and the critic.
//!
//! [`contextual_adjustment`] is the single place where session activity and
//! mood turn into score bonuses. [`ScoringPolicy`] bundles the four scoring
//! functions the pipeline needs so an alternative policy can be swapped in
//! without touching stage wiring.

use crate::library::Song;
use crate::memory::UserMemory;
use crate::pipeline::{Candidate, Intent, SessionContext, UserPreferences};

/// Which recommender is asking for a contextual adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Taste recommender: strong context weights
    Familiar,
    /// Explorer: softer weights plus a loose substring pass on the activity
    Discovery,
}

/// Bonus/penalty table for one polarity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextWeights {
    pub focus_low_energy: f64,
    pub focus_high_energy: f64,
    pub focus_instrumental: f64,
    pub party_high_energy: f64,
    pub party_danceable: f64,
    pub party_low_energy: f64,
    pub gym_very_high_energy: f64,
    pub gym_low_energy: f64,
    pub mood_calm: f64,
    pub mood_energetic: f64,
    pub mood_happy: f64,
    pub mood_sad: f64,
    /// Applied on substring matches (`gym`/`workout`, `chill`/`relax`)
    pub loose_activity: f64,
}

impl ContextWeights {
    pub const FAMILIAR: ContextWeights = ContextWeights {
        focus_low_energy: 1.5,
        focus_high_energy: -1.0,
        focus_instrumental: 1.0,
        party_high_energy: 1.5,
        party_danceable: 1.0,
        party_low_energy: -1.0,
        gym_very_high_energy: 2.0,
        gym_low_energy: -1.5,
        mood_calm: 1.5,
        mood_energetic: 1.5,
        mood_happy: 1.0,
        mood_sad: 1.0,
        loose_activity: 0.0,
    };

    pub const DISCOVERY: ContextWeights = ContextWeights {
        focus_low_energy: 1.0,
        focus_high_energy: -0.5,
        focus_instrumental: 0.0,
        party_high_energy: 1.0,
        party_danceable: 0.5,
        party_low_energy: -0.5,
        gym_very_high_energy: 1.5,
        gym_low_energy: -1.0,
        mood_calm: 0.8,
        mood_energetic: 0.8,
        mood_happy: 0.5,
        mood_sad: 0.5,
        loose_activity: 0.5,
    };

    pub fn for_polarity(polarity: Polarity) -> &'static ContextWeights {
        match polarity {
            Polarity::Familiar => &Self::FAMILIAR,
            Polarity::Discovery => &Self::DISCOVERY,
        }
    }
}

const FOCUS_TAGS: [&str; 3] = ["instrumental", "ambient", "acoustic"];

fn above(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|v| v > threshold)
}

fn below(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|v| v < threshold)
}

/// Score delta for how well `song` fits the session's activity and mood.
///
/// Activity buckets match exact lowercase names: `studying`/`work`,
/// `party`/`dancing`, `gym`/`workout`. Missing audio attributes never earn a
/// bonus or a penalty.
pub fn contextual_adjustment(song: &Song, ctx: &SessionContext, polarity: Polarity) -> f64 {
    let w = ContextWeights::for_polarity(polarity);
    let mut score = 0.0;

    if let Some(activity) = ctx.activity_lower() {
        match activity.as_str() {
            "studying" | "work" => {
                if below(song.energy, 0.5) {
                    score += w.focus_low_energy;
                } else if above(song.energy, 0.7) {
                    score += w.focus_high_energy;
                }
                if FOCUS_TAGS.iter().any(|t| song.has_tag(t)) {
                    score += w.focus_instrumental;
                }
            }
            "party" | "dancing" => {
                if above(song.energy, 0.7) {
                    score += w.party_high_energy;
                }
                if above(song.danceability, 0.6) {
                    score += w.party_danceable;
                } else if below(song.energy, 0.4) {
                    score += w.party_low_energy;
                }
            }
            "gym" | "workout" => {
                if above(song.energy, 0.8) {
                    score += w.gym_very_high_energy;
                } else if below(song.energy, 0.5) {
                    score += w.gym_low_energy;
                }
            }
            _ => {}
        }

        if w.loose_activity != 0.0 {
            if activity.contains("gym") || activity.contains("workout") {
                if above(song.energy, 0.7) {
                    score += w.loose_activity;
                }
            } else if (activity.contains("chill") || activity.contains("relax"))
                && below(song.energy, 0.4)
            {
                score += w.loose_activity;
            }
        }
    }

    if let Some(mood) = ctx.mood_lower() {
        match mood.as_str() {
            "calm" if below(song.energy, 0.4) => score += w.mood_calm,
            "energetic" if above(song.energy, 0.7) => score += w.mood_energetic,
            "happy" if above(song.valence, 0.6) => score += w.mood_happy,
            "sad" if below(song.valence, 0.4) => score += w.mood_sad,
            _ => {}
        }
    }

    score
}

/// Pluggable scoring strategy used by the taste recommender, explorer and critic
pub trait ScoringPolicy: Send + Sync {
    /// Additive familiarity score for one song
    fn taste_score(
        &self,
        song: &Song,
        prefs: &UserPreferences,
        memory: &UserMemory,
        ctx: &SessionContext,
    ) -> f64;

    /// Unfamiliarity in [0, 1]
    fn novelty(&self, song: &Song, memory: &UserMemory) -> f64;

    /// Discovery score starting from `novelty`
    fn exploration_score(
        &self,
        song: &Song,
        novelty: f64,
        memory: &UserMemory,
        ctx: &SessionContext,
    ) -> f64;

    /// Final multi-objective score for a candidate
    fn rerank_score(
        &self,
        candidate: &Candidate,
        intent: &Intent,
        prefs: &UserPreferences,
        ctx: &SessionContext,
    ) -> f64;
}

/// Weighted-sum heuristics
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPolicy;

impl ScoringPolicy for HeuristicPolicy {
    fn taste_score(
        &self,
        song: &Song,
        prefs: &UserPreferences,
        memory: &UserMemory,
        ctx: &SessionContext,
    ) -> f64 {
        super::taste::score_song_taste(song, prefs, memory, ctx)
    }

    fn novelty(&self, song: &Song, memory: &UserMemory) -> f64 {
        super::explorer::calculate_novelty(song, memory)
    }

    fn exploration_score(
        &self,
        song: &Song,
        novelty: f64,
        memory: &UserMemory,
        ctx: &SessionContext,
    ) -> f64 {
        super::explorer::exploration_score(song, novelty, memory, ctx)
    }

    fn rerank_score(
        &self,
        candidate: &Candidate,
        intent: &Intent,
        prefs: &UserPreferences,
        ctx: &SessionContext,
    ) -> f64 {
        super::critic::multi_objective_score(candidate, intent, prefs, ctx)
    }
}
