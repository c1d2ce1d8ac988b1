//! crates/learning_space_core/src/quiz.rs
//!
//! The quiz-taking flow: select, submit for feedback, move on, and a score at
//! the end. Answers and scores live only as long as the session.

use crate::domain::{Question, QuizData};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Points awarded per correct answer.
const POINTS_PER_QUESTION: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerKey {
    A,
    B,
    C,
    D,
}

impl AnswerKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerKey::A => "A",
            AnswerKey::B => "B",
            AnswerKey::C => "C",
            AnswerKey::D => "D",
        }
    }

    /// Whether this key is the question's correct answer.
    pub fn is_correct_for(&self, question: &Question) -> bool {
        question
            .correct_answer
            .trim()
            .eq_ignore_ascii_case(self.as_str())
    }
}

impl fmt::Display for AnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerKey {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(AnswerKey::A),
            "B" => Ok(AnswerKey::B),
            "C" => Ok(AnswerKey::C),
            "D" => Ok(AnswerKey::D),
            _ => Err(QuizError::InvalidOption(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    #[error("The quiz has no questions")]
    NoQuestions,
    #[error("Select an answer first")]
    NothingSelected,
    #[error("Submit the current answer first")]
    NotSubmitted,
    #[error("The quiz is already complete")]
    Complete,
    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub correct: bool,
    pub correct_answer: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub correct: usize,
    pub total: usize,
    pub score: usize,
    pub max_score: usize,
    pub percentage: u32,
}

/// What a quiz view renders at any moment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizView {
    pub title: String,
    pub index: usize,
    pub total: usize,
    pub progress_percent: u32,
    pub question: String,
    pub options: [(AnswerKey, String); 4],
    pub selected: Option<AnswerKey>,
    pub hint: Option<String>,
    pub feedback: Option<Feedback>,
    pub complete: bool,
    pub score: Option<ScoreSummary>,
    pub elapsed_secs: i64,
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    quiz: QuizData,
    current: usize,
    selected: Option<AnswerKey>,
    show_feedback: bool,
    show_hint: bool,
    answers: Vec<Option<AnswerKey>>,
    complete: bool,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl QuizSession {
    pub fn new(quiz: QuizData) -> Result<Self, QuizError> {
        if quiz.questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        let answers = vec![None; quiz.questions.len()];
        Ok(Self {
            quiz,
            current: 0,
            selected: None,
            show_feedback: false,
            show_hint: false,
            answers,
            complete: false,
            started_at: Utc::now(),
            finished_at: None,
        })
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> &Question {
        &self.quiz.questions[self.current]
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn is_last(&self) -> bool {
        self.current + 1 == self.quiz.questions.len()
    }

    /// Chooses an option. Ignored once feedback for the question is showing.
    pub fn select(&mut self, key: AnswerKey) -> bool {
        if self.show_feedback || self.complete {
            return false;
        }
        self.selected = Some(key);
        true
    }

    /// Records the selection and reveals whether it was right.
    pub fn submit(&mut self) -> Result<Feedback, QuizError> {
        if self.complete {
            return Err(QuizError::Complete);
        }
        let key = self.selected.ok_or(QuizError::NothingSelected)?;
        self.answers[self.current] = Some(key);
        self.show_feedback = true;
        Ok(self.feedback_for(key))
    }

    fn feedback_for(&self, key: AnswerKey) -> Feedback {
        let question = self.current_question();
        Feedback {
            correct: key.is_correct_for(question),
            correct_answer: question.correct_answer.trim().to_string(),
            explanation: question.explanation.clone(),
        }
    }

    /// Moves to the next question, or completes the quiz after the last one.
    pub fn next(&mut self) -> Result<(), QuizError> {
        if self.complete {
            return Err(QuizError::Complete);
        }
        if !self.show_feedback {
            return Err(QuizError::NotSubmitted);
        }
        if self.is_last() {
            self.complete = true;
            self.finished_at = Some(Utc::now());
        } else {
            self.current += 1;
            self.selected = None;
            self.show_feedback = false;
            self.show_hint = false;
        }
        Ok(())
    }

    /// Steps back, restoring the earlier answer as the selection.
    pub fn previous(&mut self) -> bool {
        if self.complete || self.current == 0 {
            return false;
        }
        self.current -= 1;
        self.selected = self.answers[self.current];
        self.show_feedback = false;
        self.show_hint = false;
        true
    }

    pub fn toggle_hint(&mut self) -> bool {
        self.show_hint = !self.show_hint;
        self.show_hint
    }

    pub fn restart(&mut self) {
        self.current = 0;
        self.selected = None;
        self.show_feedback = false;
        self.show_hint = false;
        self.answers = vec![None; self.quiz.questions.len()];
        self.complete = false;
        self.started_at = Utc::now();
        self.finished_at = None;
    }

    pub fn score(&self) -> ScoreSummary {
        let total = self.quiz.questions.len();
        let correct = self
            .answers
            .iter()
            .zip(&self.quiz.questions)
            .filter(|(answer, question)| answer.is_some_and(|key| key.is_correct_for(question)))
            .count();
        ScoreSummary {
            correct,
            total,
            score: correct * POINTS_PER_QUESTION,
            max_score: total * POINTS_PER_QUESTION,
            percentage: ((correct as f64 / total as f64) * 100.0).round() as u32,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    pub fn view(&self) -> QuizView {
        let question = self.current_question();
        let total = self.quiz.questions.len();
        QuizView {
            title: self.quiz.title.clone(),
            index: self.current,
            total,
            progress_percent: (((self.current + 1) as f64 / total as f64) * 100.0).round() as u32,
            question: question.question.clone(),
            options: [
                (AnswerKey::A, question.options.a.clone()),
                (AnswerKey::B, question.options.b.clone()),
                (AnswerKey::C, question.options.c.clone()),
                (AnswerKey::D, question.options.d.clone()),
            ],
            selected: self.selected,
            hint: self.show_hint.then(|| question.hint.clone()),
            feedback: if self.show_feedback {
                self.selected.map(|key| self.feedback_for(key))
            } else {
                None
            },
            complete: self.complete,
            score: self.complete.then(|| self.score()),
            elapsed_secs: self.elapsed().num_seconds(),
        }
    }
}
