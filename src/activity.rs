//! Drill session state machine.
//!
//! Every question-and-answer feature (assessment, quiz, spelling, memory
//! cards) runs the same lifecycle: `idle → context_entry? → fetching →
//! in_progress → analyzing? → results → idle`. The machine here is the pure
//! transition core, generic over the item being drilled; the driver modules
//! own the async edges (generation calls, feedback delays, completion
//! mutations) and feed results back in.
//!
//! Each trip through `fetching` mints a fresh session token. Generation
//! results are installed against the token they were requested under, so a
//! reply that arrives after the user abandoned or restarted the session is
//! dropped instead of resurrecting it.

pub mod assessment;
pub mod memory;
pub mod quiz;
pub mod spelling;

use crate::sync::SyncError;
use crate::tutor::TutorError;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Tutor(#[from] TutorError),

    /// The requested transition is not legal from the current phase.
    #[error("drill is not in a state that allows this: {0}")]
    InvalidState(&'static str),
}

/// Identity of one drill session, minted on every entry into `fetching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken(Uuid);

impl SessionToken {
    fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Where a fetch was started from, and therefore where a failed or empty
/// fetch falls back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    Idle,
    ContextEntry,
}

/// How a completed answer sheet is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// Tally exact-match answers locally.
    Local,
    /// Ship the full answer sheet out for analysis before showing results.
    Analyzed,
}

impl ScoringMode {
    /// Longer tests get the full analysis treatment, short ones are tallied
    /// locally. Callers that want a fixed mode pass it explicitly instead.
    pub fn for_question_count(count: usize) -> Self {
        if count > 5 {
            Self::Analyzed
        } else {
            Self::Local
        }
    }
}

/// Something that can be asked and checked.
pub trait DrillItem {
    fn check(&self, answer: &str) -> bool;
}

impl DrillItem for crate::tutor::Question {
    fn check(&self, answer: &str) -> bool {
        answer == self.correct_answer
    }
}

impl DrillItem for crate::tutor::SpellingWord {
    fn check(&self, answer: &str) -> bool {
        answer.trim().eq_ignore_ascii_case(&self.word)
    }
}

impl DrillItem for crate::tutor::MemoryCard {
    fn check(&self, answer: &str) -> bool {
        answer.trim().eq_ignore_ascii_case(&self.answer)
    }
}

#[derive(Debug)]
enum Phase<I> {
    Idle,
    ContextEntry,
    Fetching {
        token: SessionToken,
        origin: FetchOrigin,
    },
    InProgress {
        token: SessionToken,
        items: Vec<I>,
        current: usize,
        answers: BTreeMap<usize, String>,
        correct: u32,
        mode: ScoringMode,
    },
    Analyzing {
        token: SessionToken,
        items: Vec<I>,
        answers: BTreeMap<usize, String>,
        correct: u32,
    },
    Results {
        correct: u32,
        total: u32,
    },
}

/// Outcome of installing fetched items.
#[derive(Debug, PartialEq, Eq)]
pub enum Install {
    /// Session is live; first item is current.
    Started,
    /// The token belongs to an abandoned session; nothing changed.
    StaleDropped,
    /// Generation produced nothing usable; fell back to the fetch origin.
    EmptyRejected,
}

/// What submitting an answer revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feedback {
    pub correct: bool,
}

/// Where `advance` took the session.
#[derive(Debug, PartialEq, Eq)]
pub enum Advance {
    /// Next item is current.
    Next,
    /// All items answered; the sheet needs remote analysis.
    Analyze(SessionToken),
    /// All items answered and locally scored.
    Finished { correct: u32, total: u32 },
}

/// The transition core shared by every drill feature.
#[derive(Debug)]
pub struct Drill<I> {
    phase: Phase<I>,
}

impl<I: DrillItem> Drill<I> {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.phase, Phase::Fetching { .. })
    }

    /// Move from `idle` into context entry (features that seed a session
    /// from learner-provided material).
    pub fn enter_context(&mut self) -> Result<(), ActivityError> {
        match self.phase {
            Phase::Idle => {
                self.phase = Phase::ContextEntry;
                Ok(())
            }
            _ => Err(ActivityError::InvalidState("enter_context requires idle")),
        }
    }

    /// Start fetching; mints and returns the session token the eventual
    /// result must present.
    pub fn begin_fetch(&mut self, origin: FetchOrigin) -> Result<SessionToken, ActivityError> {
        let legal = match (&self.phase, origin) {
            (Phase::Idle, FetchOrigin::Idle) => true,
            (Phase::ContextEntry, FetchOrigin::ContextEntry) => true,
            _ => false,
        };
        if !legal {
            return Err(ActivityError::InvalidState(
                "begin_fetch requires idle or context entry",
            ));
        }
        let token = SessionToken::mint();
        self.phase = Phase::Fetching { token, origin };
        Ok(token)
    }

    /// Install fetched items under `token`. Stale tokens are dropped; an
    /// empty batch rejects back to the fetch origin.
    pub fn install(&mut self, token: SessionToken, items: Vec<I>, mode: ScoringMode) -> Install {
        let origin = match &self.phase {
            Phase::Fetching {
                token: current,
                origin,
            } if *current == token => *origin,
            _ => return Install::StaleDropped,
        };
        if items.is_empty() {
            self.phase = Self::origin_phase(origin);
            return Install::EmptyRejected;
        }
        self.phase = Phase::InProgress {
            token,
            items,
            current: 0,
            answers: BTreeMap::new(),
            correct: 0,
            mode,
        };
        Install::Started
    }

    /// A fetch failed: fall back to where it started. Stale tokens are
    /// ignored.
    pub fn fail_fetch(&mut self, token: SessionToken) {
        if let Phase::Fetching {
            token: current,
            origin,
        } = &self.phase
        {
            if *current == token {
                self.phase = Self::origin_phase(*origin);
            }
        }
    }

    fn origin_phase(origin: FetchOrigin) -> Phase<I> {
        match origin {
            FetchOrigin::Idle => Phase::Idle,
            FetchOrigin::ContextEntry => Phase::ContextEntry,
        }
    }

    /// The item currently being asked, with its index.
    pub fn current_item(&self) -> Option<(usize, &I)> {
        match &self.phase {
            Phase::InProgress { items, current, .. } => Some((*current, &items[*current])),
            _ => None,
        }
    }

    /// Whether the current item has already been answered.
    pub fn current_answered(&self) -> bool {
        match &self.phase {
            Phase::InProgress {
                current, answers, ..
            } => answers.contains_key(current),
            _ => false,
        }
    }

    /// Record an answer for the current item. Answering is single-shot: a
    /// repeat submission for the same item returns `None` and changes
    /// nothing.
    pub fn submit_answer(&mut self, answer: &str) -> Option<Feedback> {
        let Phase::InProgress {
            items,
            current,
            answers,
            correct,
            ..
        } = &mut self.phase
        else {
            return None;
        };
        if answers.contains_key(current) {
            return None;
        }
        let is_correct = items[*current].check(answer);
        answers.insert(*current, answer.to_string());
        if is_correct {
            *correct += 1;
        }
        Some(Feedback {
            correct: is_correct,
        })
    }

    /// Move past an answered item: to the next one, into analysis, or to
    /// local results.
    pub fn advance(&mut self) -> Result<Advance, ActivityError> {
        let Phase::InProgress {
            current, answers, ..
        } = &self.phase
        else {
            return Err(ActivityError::InvalidState("advance requires in_progress"));
        };
        if !answers.contains_key(current) {
            return Err(ActivityError::InvalidState(
                "advance requires an answered item",
            ));
        }

        let Phase::InProgress {
            token,
            items,
            current,
            answers,
            correct,
            mode,
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            unreachable!("phase checked above");
        };

        if current + 1 < items.len() {
            self.phase = Phase::InProgress {
                token,
                items,
                current: current + 1,
                answers,
                correct,
                mode,
            };
            return Ok(Advance::Next);
        }

        match mode {
            ScoringMode::Analyzed => {
                self.phase = Phase::Analyzing {
                    token,
                    items,
                    answers,
                    correct,
                };
                Ok(Advance::Analyze(token))
            }
            ScoringMode::Local => {
                let total = items.len() as u32;
                self.phase = Phase::Results { correct, total };
                Ok(Advance::Finished { correct, total })
            }
        }
    }

    /// Snapshot of the answer sheet for remote analysis.
    pub fn answer_sheet(&self) -> Option<&BTreeMap<usize, String>> {
        match &self.phase {
            Phase::InProgress { answers, .. } | Phase::Analyzing { answers, .. } => Some(answers),
            _ => None,
        }
    }

    /// Analysis came back for `token`: show results. Stale tokens are
    /// dropped.
    pub fn finish_analysis(&mut self, token: SessionToken) -> bool {
        match &self.phase {
            Phase::Analyzing { token: current, .. } if *current == token => {}
            _ => return false,
        }
        let Phase::Analyzing { items, correct, .. } =
            std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            unreachable!("phase checked above");
        };
        self.phase = Phase::Results {
            correct,
            total: items.len() as u32,
        };
        true
    }

    /// Analysis failed: return to `in_progress` on the last item with the
    /// answer sheet intact, so the learner can retry the final step.
    pub fn fail_analysis(&mut self, token: SessionToken) -> bool {
        match &self.phase {
            Phase::Analyzing { token: current, .. } if *current == token => {}
            _ => return false,
        }
        let Phase::Analyzing {
            token,
            items,
            answers,
            correct,
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            unreachable!("phase checked above");
        };
        let last = items.len() - 1;
        self.phase = Phase::InProgress {
            token,
            items,
            current: last,
            answers,
            correct,
            mode: ScoringMode::Analyzed,
        };
        true
    }

    /// Final score, once in `results`.
    pub fn results(&self) -> Option<(u32, u32)> {
        match self.phase {
            Phase::Results { correct, total } => Some((correct, total)),
            _ => None,
        }
    }

    /// Leave the session from any phase. An in-flight fetch or analysis
    /// keeps running but its token is now stale, so its result is dropped.
    pub fn dismiss(&mut self) {
        self.phase = Phase::Idle;
    }
}

impl<I: DrillItem> Default for Drill<I> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tutor::mock::MockTutor;
    use crate::tutor::Question;

    fn started(count: usize, mode: ScoringMode) -> Drill<Question> {
        let mut drill = Drill::new();
        let token = drill.begin_fetch(FetchOrigin::Idle).unwrap();
        assert_eq!(
            drill.install(token, MockTutor::questions(count), mode),
            Install::Started
        );
        drill
    }

    #[test]
    fn full_local_session_reaches_results_with_tally() {
        let mut drill = started(3, ScoringMode::Local);
        let answers = ["right", "wrong", "right"];
        for (i, answer) in answers.iter().enumerate() {
            let feedback = drill.submit_answer(answer).unwrap();
            assert_eq!(feedback.correct, *answer == "right");
            let advance = drill.advance().unwrap();
            if i < answers.len() - 1 {
                assert_eq!(advance, Advance::Next);
            } else {
                assert_eq!(
                    advance,
                    Advance::Finished {
                        correct: 2,
                        total: 3
                    }
                );
            }
        }
        assert_eq!(drill.results(), Some((2, 3)));
        drill.dismiss();
        assert!(drill.is_idle());
    }

    #[test]
    fn answering_is_single_shot() {
        let mut drill = started(2, ScoringMode::Local);
        assert!(drill.submit_answer("wrong").is_some());
        // Second try at the same item changes nothing.
        assert!(drill.submit_answer("right").is_none());
        drill.advance().unwrap();
        drill.submit_answer("right").unwrap();
        assert_eq!(
            drill.advance().unwrap(),
            Advance::Finished {
                correct: 1,
                total: 2
            }
        );
    }

    #[test]
    fn advance_requires_an_answer() {
        let mut drill = started(2, ScoringMode::Local);
        assert!(matches!(
            drill.advance(),
            Err(ActivityError::InvalidState(_))
        ));
    }

    #[test]
    fn long_sheet_routes_through_analysis() {
        assert_eq!(ScoringMode::for_question_count(8), ScoringMode::Analyzed);
        assert_eq!(ScoringMode::for_question_count(5), ScoringMode::Local);

        let mut drill = started(6, ScoringMode::Analyzed);
        for _ in 0..5 {
            drill.submit_answer("right").unwrap();
            assert_eq!(drill.advance().unwrap(), Advance::Next);
        }
        drill.submit_answer("wrong").unwrap();
        let token = match drill.advance().unwrap() {
            Advance::Analyze(token) => token,
            other => panic!("expected analysis, got {other:?}"),
        };
        assert_eq!(drill.answer_sheet().unwrap().len(), 6);
        assert!(drill.finish_analysis(token));
        assert_eq!(drill.results(), Some((5, 6)));
    }

    #[test]
    fn failed_analysis_preserves_the_answer_sheet() {
        let mut drill = started(6, ScoringMode::Analyzed);
        for _ in 0..6 {
            drill.submit_answer("right").unwrap();
            if drill.current_answered() {
                let _ = drill.advance();
            }
        }
        let sheet_before = drill.answer_sheet().unwrap().clone();
        let token = match &drill.phase {
            Phase::Analyzing { token, .. } => *token,
            other => panic!("expected analyzing, got {other:?}"),
        };

        assert!(drill.fail_analysis(token));
        assert_eq!(drill.answer_sheet(), Some(&sheet_before));
        // Retry the final advance.
        assert!(matches!(drill.advance().unwrap(), Advance::Analyze(_)));
    }

    #[test]
    fn stale_install_is_dropped() {
        let mut drill: Drill<Question> = Drill::new();
        let stale = drill.begin_fetch(FetchOrigin::Idle).unwrap();
        drill.dismiss();

        assert_eq!(
            drill.install(stale, MockTutor::questions(3), ScoringMode::Local),
            Install::StaleDropped
        );
        assert!(drill.is_idle());

        // A restarted session's token still installs.
        let fresh = drill.begin_fetch(FetchOrigin::Idle).unwrap();
        assert_eq!(
            drill.install(fresh, MockTutor::questions(3), ScoringMode::Local),
            Install::Started
        );
    }

    #[test]
    fn empty_install_rejects_back_to_origin() {
        let mut drill: Drill<Question> = Drill::new();
        drill.enter_context().unwrap();
        let token = drill.begin_fetch(FetchOrigin::ContextEntry).unwrap();
        assert_eq!(
            drill.install(token, Vec::new(), ScoringMode::Local),
            Install::EmptyRejected
        );
        assert!(matches!(drill.phase, Phase::ContextEntry));
    }

    #[test]
    fn failed_fetch_falls_back_to_origin() {
        let mut drill: Drill<Question> = Drill::new();
        let token = drill.begin_fetch(FetchOrigin::Idle).unwrap();
        drill.fail_fetch(token);
        assert!(drill.is_idle());

        // A stale failure does not disturb a newer session.
        let old = drill.begin_fetch(FetchOrigin::Idle).unwrap();
        drill.dismiss();
        let newer = drill.begin_fetch(FetchOrigin::Idle).unwrap();
        drill.fail_fetch(old);
        assert!(drill.is_fetching());
        drill.fail_fetch(newer);
        assert!(drill.is_idle());
    }
}
