// src/import/docx.rs

use std::io::{Cursor, Read};

use crate::error::AppError;
use crate::import::{ParseOutcome, ParsedQuestion, is_valid_answer};

/// Parses an uploaded .docx of questions.
///
/// Paragraphs carrying the full marker pattern
/// `Q: ... A) ... B) ... C) ... D) ... Ans: x` are split positionally on the
/// markers. A paragraph that is missing a marker or fails to split is
/// skipped and the scan continues; there is no recovery beyond that.
pub fn parse_docx(data: &[u8]) -> Result<ParseOutcome, AppError> {
    let paragraphs = extract_paragraphs(data)?;

    let mut outcome = ParseOutcome::default();
    for paragraph in &paragraphs {
        if let Some(question) = parse_paragraph(paragraph.trim()) {
            outcome.questions.push(question);
        }
    }

    Ok(outcome)
}

/// Extracts one flat question record from a marker-formatted paragraph.
/// Returns None unless every marker is present and the splits land.
pub fn parse_paragraph(text: &str) -> Option<ParsedQuestion> {
    let has_markers = text.contains("Q:")
        && text.contains("A)")
        && text.contains("B)")
        && text.contains("C)")
        && text.contains("D)")
        && text.contains("Ans:");
    if !has_markers {
        return None;
    }

    // Everything after the last "Ans:" holds the answer letter; everything
    // before the first "Ans:" holds the question and choices.
    let answer_part = text.rsplit("Ans:").next()?;
    let correct_answer = answer_part.split_whitespace().next()?.to_lowercase();
    if !is_valid_answer(&correct_answer) {
        return None;
    }

    let qc_part = text.split("Ans:").next()?.replace("Q:", "");
    let qc_part = qc_part.trim();

    let (question_text, after_a) = qc_part.split_once("A)")?;
    let (choice_a, after_b) = after_a.split_once(" B)")?;
    let (choice_b, after_c) = after_b.split_once(" C)")?;
    let (choice_c, choice_d) = after_c.split_once(" D)")?;

    Some(ParsedQuestion {
        question_text: question_text.trim().to_string(),
        choice_a: choice_a.trim().to_string(),
        choice_b: choice_b.trim().to_string(),
        choice_c: choice_c.trim().to_string(),
        choice_d: choice_d.trim().to_string(),
        correct_answer,
    })
}

/// Pulls paragraph texts out of the .docx container.
///
/// Only the text runs of the main document part are read; styling, tables
/// and everything else about the format is out of scope.
fn extract_paragraphs(data: &[u8]) -> Result<Vec<String>, AppError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| AppError::BadRequest(format!("Error processing DOCX: {}", e)))?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| AppError::BadRequest(format!("Error processing DOCX: {}", e)))?
        .read_to_string(&mut document_xml)
        .map_err(|e| AppError::BadRequest(format!("Error processing DOCX: {}", e)))?;

    Ok(document_xml
        .split("</w:p>")
        .map(paragraph_text)
        .filter(|p| !p.is_empty())
        .collect())
}

/// Concatenates the `<w:t>` text runs inside one paragraph chunk.
fn paragraph_text(chunk: &str) -> String {
    let mut out = String::new();
    let mut rest = chunk;

    while let Some(start) = rest.find("<w:t") {
        let after = &rest[start + 4..];

        // Guard against matching "<w:tbl" and friends.
        if !after.starts_with('>') && !after.starts_with(' ') && !after.starts_with('/') {
            rest = after;
            continue;
        }

        let Some(gt) = after.find('>') else { break };
        if after[..gt].ends_with('/') {
            // Self-closing, empty run.
            rest = &after[gt + 1..];
            continue;
        }

        let body = &after[gt + 1..];
        let Some(end) = body.find("</w:t>") else { break };
        out.push_str(&decode_entities(&body[..end]));
        rest = &body[end + "</w:t>".len()..];
    }

    out
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let mut body = String::new();
        for p in paragraphs {
            body.push_str(&format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p));
        }
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document><w:body>{}</w:body></w:document>",
            body
        );

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file("word/document.xml", FileOptions::default())
                .unwrap();
            writer.write_all(xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    const PARAGRAPH: &str =
        "Q: What is 2+2? A) 1 B) 2 C) 3 D) 4 Ans: d";

    #[test]
    fn parses_marker_paragraph() {
        let q = parse_paragraph(PARAGRAPH).unwrap();
        assert_eq!(q.question_text, "What is 2+2?");
        assert_eq!(q.choice_a, "1");
        assert_eq!(q.choice_b, "2");
        assert_eq!(q.choice_c, "3");
        assert_eq!(q.choice_d, "4");
        assert_eq!(q.correct_answer, "d");
    }

    #[test]
    fn answer_letter_keeps_first_word_only() {
        let q = parse_paragraph("Q: Stem A) w B) x C) y D) z Ans: B because reasons").unwrap();
        assert_eq!(q.correct_answer, "b");
    }

    #[test]
    fn missing_marker_skips_paragraph() {
        assert!(parse_paragraph("Q: Stem A) w B) x C) y Ans: a").is_none());
        assert!(parse_paragraph("Just an ordinary paragraph.").is_none());
    }

    #[test]
    fn invalid_answer_letter_skips_paragraph() {
        assert!(parse_paragraph("Q: Stem A) w B) x C) y D) z Ans: q").is_none());
    }

    #[test]
    fn parses_document_and_skips_prose() {
        let data = docx_with_paragraphs(&[
            "Chapter 1 notes, nothing to see here.",
            PARAGRAPH,
            "Q: Truncated A) only one choice Ans: a",
        ]);

        let outcome = parse_docx(&data).unwrap();
        assert_eq!(outcome.questions.len(), 1);
        assert_eq!(outcome.questions[0].question_text, "What is 2+2?");
    }

    #[test]
    fn decodes_xml_entities_in_runs() {
        let data = docx_with_paragraphs(&[
            "Q: Is 1 &lt; 2 &amp; 2 &gt; 1? A) yes B) no C) maybe D) unknowable Ans: a",
        ]);

        let outcome = parse_docx(&data).unwrap();
        assert_eq!(outcome.questions[0].question_text, "Is 1 < 2 & 2 > 1?");
    }

    #[test]
    fn not_a_zip_is_an_error() {
        assert!(parse_docx(b"plain text, not a docx").is_err());
    }
}
