use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::ids::{ChapterId, QuestionId};

/// One question in a chapter's quiz bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: QuestionId,
    pub chapter_id: ChapterId,
    pub correct_answer: String,
    pub points: u32,
    pub sort_order: i32,
}

/// A student's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAnswer {
    pub question_id: QuestionId,
    #[serde(default)]
    pub answer: Option<String>,
}

impl QuizAnswer {
    #[must_use]
    pub fn new(question_id: QuestionId, answer: impl Into<String>) -> Self {
        Self {
            question_id,
            answer: Some(answer.into()),
        }
    }
}

/// Outcome of grading one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizGrade {
    pub score: u32,
    pub total: u32,
    pub results: BTreeMap<QuestionId, bool>,
}

impl QuizGrade {
    /// `score * 100 / total`, or 0 for an empty quiz.
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            let pct = u64::from(self.score) * 100 / u64::from(self.total);
            u32::try_from(pct).unwrap_or(u32::MAX)
        }
    }
}

/// Grade answers against a quiz bank.
///
/// Comparison ignores surrounding whitespace and ASCII case. Unanswered
/// questions are wrong; when a question is answered twice the first answer
/// counts.
#[must_use]
pub fn grade_quiz(questions: &[QuizQuestion], answers: &[QuizAnswer]) -> QuizGrade {
    let mut by_question: HashMap<QuestionId, &str> = HashMap::with_capacity(answers.len());
    for answer in answers {
        by_question
            .entry(answer.question_id)
            .or_insert_with(|| answer.answer.as_deref().unwrap_or(""));
    }

    let mut score = 0_u32;
    let mut total = 0_u32;
    let mut results = BTreeMap::new();

    for question in questions {
        total = total.saturating_add(question.points);
        let given = by_question.get(&question.id).copied().unwrap_or("");
        let correct = question
            .correct_answer
            .trim()
            .eq_ignore_ascii_case(given.trim());
        if correct {
            score = score.saturating_add(question.points);
        }
        results.insert(question.id, correct);
    }

    QuizGrade {
        score,
        total,
        results,
    }
}
