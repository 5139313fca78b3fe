// src/import/csv.rs

use crate::error::AppError;
use crate::import::{ParseOutcome, ParsedQuestion, is_valid_answer};

/// Parses an uploaded CSV of questions.
///
/// Expected layout: a header row, then rows of at least 6 columns
/// (question, choices a-d, answer letter). Rows with fewer than 6 columns
/// are skipped with a warning; they never abort the batch.
pub fn parse_csv(data: &[u8]) -> Result<ParseOutcome, AppError> {
    let mut reader = ::csv::ReaderBuilder::new().flexible(true).from_reader(data);

    let mut outcome = ParseOutcome::default();

    for record in reader.records() {
        let record =
            record.map_err(|e| AppError::BadRequest(format!("Error processing CSV: {}", e)))?;

        if record.len() < 6 {
            outcome.skipped += 1;
            outcome
                .warnings
                .push("Skipped row in CSV (Expected 6 columns).".to_string());
            continue;
        }

        let correct_answer = record[5].trim().to_lowercase();
        if !is_valid_answer(&correct_answer) {
            outcome.skipped += 1;
            outcome.warnings.push(format!(
                "Skipped row in CSV (answer '{}' is not one of a-d).",
                record[5].trim()
            ));
            continue;
        }

        outcome.questions.push(ParsedQuestion {
            question_text: record[0].trim().to_string(),
            choice_a: record[1].trim().to_string(),
            choice_b: record[2].trim().to_string(),
            choice_c: record[3].trim().to_string(),
            choice_d: record[4].trim().to_string(),
            correct_answer,
        });
    }

    Ok(outcome)
}
