// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use std::fmt;
use std::str::FromStr;

/// Fixed set of subject tags a question can carry.
///
/// `GenEd` and `ProfEd` are the two common licensure components; the rest are
/// the selectable majors/specializations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Subject {
    ProfEd,
    GenEd,
    Cp,
    Et,
    He,
    Ia,
    Ict,
}

impl Subject {
    pub const ALL: [Subject; 7] = [
        Subject::ProfEd,
        Subject::GenEd,
        Subject::Cp,
        Subject::Et,
        Subject::He,
        Subject::Ia,
        Subject::Ict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::ProfEd => "profed",
            Subject::GenEd => "gened",
            Subject::Cp => "cp",
            Subject::Et => "et",
            Subject::He => "he",
            Subject::Ia => "ia",
            Subject::Ict => "ict",
        }
    }

    /// True for the major/specialization tags (everything but the two common
    /// components).
    pub fn is_specialization(&self) -> bool {
        !matches!(self, Subject::ProfEd | Subject::GenEd)
    }
}

impl FromStr for Subject {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "profed" => Ok(Subject::ProfEd),
            "gened" => Ok(Subject::GenEd),
            "cp" => Ok(Subject::Cp),
            "et" => Ok(Subject::Et),
            "he" => Ok(Subject::He),
            "ia" => Ok(Subject::Ia),
            "ict" => Ok(Subject::Ict),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents the 'questions' table in the questions store.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub subject: Subject,

    /// The question stem. Uniqueness is enforced informally: the bulk import
    /// dedups on exact text match.
    pub question_text: String,

    pub choice_a: String,
    pub choice_b: String,
    pub choice_c: String,
    pub choice_d: String,

    /// Correct choice letter, always one of 'a'..'d' (lowercase).
    pub correct_answer: String,
}

/// DTO for sending a question to a student (the answer is withheld).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub subject: Subject,
    pub question_text: String,
    pub choice_a: String,
    pub choice_b: String,
    pub choice_c: String,
    pub choice_d: String,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            subject: q.subject,
            question_text: q.question_text,
            choice_a: q.choice_a,
            choice_b: q.choice_b,
            choice_c: q.choice_c,
            choice_d: q.choice_d,
        }
    }
}
