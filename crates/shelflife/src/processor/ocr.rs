use std::sync::Arc;
use std::time::{Duration, Instant};

use image::GrayImage;
use serde::Serialize;

use crate::error::ProcessError;

/// Default cut-off below which a recognized token is dropped (0-100 scale).
pub const DEFAULT_MIN_TOKEN_CONFIDENCE: f32 = 30.0;

/// A single recognized word.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    /// Engine confidence on a 0-100 scale; negative or zero means unknown.
    pub confidence: f32,
    /// Reading-order index of the text line the token belongs to.
    pub line: u32,
}

impl OcrToken {
    pub fn new(text: impl Into<String>, confidence: f32, line: u32) -> Self {
        Self {
            text: text.into(),
            confidence,
            line,
        }
    }
}

pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    fn recognize(&self, image: &GrayImage) -> Result<Vec<OcrToken>, ProcessError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrOutput {
    pub text: String,
    /// Mean token confidence, 0.0-1.0.
    pub confidence: f32,
    pub elapsed_ms: u64,
}

impl OcrOutput {
    fn empty(elapsed_ms: u64) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            elapsed_ms,
        }
    }
}

/// Result of a text extraction. OCR trouble is reported as data, not as an
/// error: a degraded extraction carries empty or partial text and a reason.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Success(OcrOutput),
    Degraded { output: OcrOutput, reason: String },
}

impl Extraction {
    pub fn output(&self) -> &OcrOutput {
        match self {
            Extraction::Success(output) => output,
            Extraction::Degraded { output, .. } => output,
        }
    }

    pub fn into_output(self) -> OcrOutput {
        match self {
            Extraction::Success(output) => output,
            Extraction::Degraded { output, .. } => output,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Extraction::Degraded { .. })
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Extraction::Success(_) => None,
            Extraction::Degraded { reason, .. } => Some(reason),
        }
    }
}

#[derive(Clone)]
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
    min_token_confidence: f32,
}

impl TextExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            engine,
            min_token_confidence: DEFAULT_MIN_TOKEN_CONFIDENCE,
        }
    }

    pub fn with_min_token_confidence(mut self, min_token_confidence: f32) -> Self {
        self.min_token_confidence = min_token_confidence;
        self
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn extract(&self, image: &GrayImage) -> Extraction {
        let _span = tracing::info_span!("processor.ocr", engine = self.engine.name()).entered();
        let started = Instant::now();

        let tokens = match self.engine.recognize(image) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "OCR engine failed, continuing with empty text");
                return Extraction::Degraded {
                    output: OcrOutput::empty(elapsed_ms(started)),
                    reason: e.to_string(),
                };
            }
        };

        let output = OcrOutput {
            text: assemble_text(&tokens, self.min_token_confidence),
            confidence: mean_confidence(&tokens),
            elapsed_ms: elapsed_ms(started),
        };

        tracing::debug!(
            tokens = tokens.len(),
            confidence = output.confidence,
            elapsed_ms = output.elapsed_ms,
            "Text extracted"
        );

        if output.text.is_empty() {
            Extraction::Degraded {
                output,
                reason: "no text recognized".to_string(),
            }
        } else {
            Extraction::Success(output)
        }
    }

    /// Runs [`extract`](Self::extract) on a helper thread and gives up after
    /// `timeout`. Returns `None` on timeout; the helper thread is abandoned.
    pub fn extract_within(&self, image: GrayImage, timeout: Duration) -> Option<Extraction> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let extractor = self.clone();

        let spawned = std::thread::Builder::new()
            .name("ocr-extract".to_string())
            .spawn(move || {
                let _ = tx.send(extractor.extract(&image));
            });

        if let Err(e) = spawned {
            return Some(Extraction::Degraded {
                output: OcrOutput::empty(0),
                reason: format!("failed to start OCR thread: {}", e),
            });
        }

        match rx.recv_timeout(timeout) {
            Ok(extraction) => Some(extraction),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Some(Extraction::Degraded {
                output: OcrOutput::empty(0),
                reason: "OCR thread terminated unexpectedly".to_string(),
            }),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Mean of all positive token confidences, scaled to 0.0-1.0.
/// Low-confidence tokens count here even though they are dropped from the text.
pub fn mean_confidence(tokens: &[OcrToken]) -> f32 {
    let scores: Vec<f32> = tokens
        .iter()
        .map(|t| t.confidence)
        .filter(|c| *c > 0.0)
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f32>() / scores.len() as f32;
    (mean / 100.0).clamp(0.0, 1.0)
}

/// Joins tokens above `min_confidence` into lines and cleans the result.
pub fn assemble_text(tokens: &[OcrToken], min_confidence: f32) -> String {
    let mut raw = String::new();
    let mut current_line = None;

    for token in tokens {
        let word = token.text.trim();
        if word.is_empty() || token.confidence <= min_confidence {
            continue;
        }
        match current_line {
            Some(line) if line == token.line => raw.push(' '),
            Some(_) => raw.push('\n'),
            None => {}
        }
        current_line = Some(token.line);
        raw.push_str(word);
    }

    clean_text(&raw)
}

/// Collapses whitespace within each line, drops blank lines and repairs
/// common character confusions: `|` becomes `I`, and a letter `O` next to a
/// digit becomes `0`.
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(|line| fix_confusions(&line.split_whitespace().collect::<Vec<_>>().join(" ")))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn fix_confusions(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| match c {
            '|' => 'I',
            'O' | '0' => {
                let before = i > 0 && chars[i - 1].is_ascii_digit();
                let after = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
                if before || after {
                    '0'
                } else {
                    c
                }
            }
            _ => c,
        })
        .collect()
}

/// Parses Tesseract TSV output into word tokens.
///
/// Columns: level page_num block_num par_num line_num word_num left top
/// width height conf text. Only level-5 (word) rows are kept; each distinct
/// (block, paragraph, line) triple becomes its own line index.
pub fn parse_tsv(tsv: &str) -> Vec<OcrToken> {
    let mut tokens = Vec::new();
    let mut last_key = None;
    let mut line_index: u32 = 0;

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 || fields[0] != "5" {
            continue;
        }

        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        let confidence: f32 = match fields[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };

        let key = (fields[2], fields[3], fields[4]);
        match last_key {
            Some(previous) if previous != key => line_index += 1,
            _ => {}
        }
        last_key = Some(key);

        tokens.push(OcrToken::new(word, confidence.max(0.0), line_index));
    }

    tokens
}

/// Stand-in engine used when OCR is disabled or not compiled in.
/// Every extraction degrades to empty text.
#[derive(Debug, Default)]
pub struct DisabledOcrEngine;

impl OcrEngine for DisabledOcrEngine {
    fn name(&self) -> &str {
        "disabled"
    }

    fn recognize(&self, _image: &GrayImage) -> Result<Vec<OcrToken>, ProcessError> {
        Err(ProcessError::OcrFailed(
            "no OCR engine available".to_string(),
        ))
    }
}

/// Scripted engine for tests and dry runs. Ignores the image.
pub struct MockOcrEngine {
    tokens: Vec<OcrToken>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl MockOcrEngine {
    /// One token per whitespace-separated word, one line index per text line.
    pub fn from_text(text: &str, confidence: f32) -> Self {
        let tokens = text
            .lines()
            .enumerate()
            .flat_map(|(line, content)| {
                content
                    .split_whitespace()
                    .map(move |word| OcrToken::new(word, confidence, line as u32))
            })
            .collect();
        Self::from_tokens(tokens)
    }

    pub fn from_tokens(tokens: Vec<OcrToken>) -> Self {
        Self {
            tokens,
            failure: None,
            delay: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            tokens: Vec::new(),
            failure: Some(message.to_string()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl OcrEngine for MockOcrEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn recognize(&self, _image: &GrayImage) -> Result<Vec<OcrToken>, ProcessError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match &self.failure {
            Some(message) => Err(ProcessError::OcrFailed(message.clone())),
            None => Ok(self.tokens.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> GrayImage {
        GrayImage::new(10, 10)
    }

    fn extractor(engine: MockOcrEngine) -> TextExtractor {
        TextExtractor::new(Arc::new(engine))
    }

    #[test]
    fn test_low_confidence_tokens_are_dropped_but_counted() {
        let tokens = vec![
            OcrToken::new("MILK", 90.0, 0),
            OcrToken::new("~~", 20.0, 0),
            OcrToken::new("3.49", 70.0, 0),
        ];
        let extraction = extractor(MockOcrEngine::from_tokens(tokens)).extract(&blank());

        let output = extraction.output();
        assert_eq!(output.text, "MILK 3.49");
        assert!((output.confidence - 0.6).abs() < 1e-6);
        assert!(!extraction.is_degraded());
    }

    #[test]
    fn test_token_at_threshold_is_dropped() {
        let tokens = vec![
            OcrToken::new("EGGS", 30.0, 0),
            OcrToken::new("BREAD", 31.0, 1),
        ];
        let extraction = extractor(MockOcrEngine::from_tokens(tokens)).extract(&blank());
        assert_eq!(extraction.output().text, "BREAD");
    }

    #[test]
    fn test_lines_are_preserved() {
        let engine = MockOcrEngine::from_text("2 BANANAS 1.99\nMILK 3.49", 88.0);
        let extraction = extractor(engine).extract(&blank());
        assert_eq!(extraction.output().text, "2 BANANAS 1.99\nMILK 3.49");
        assert!((extraction.output().confidence - 0.88).abs() < 1e-6);
    }

    #[test]
    fn test_engine_failure_degrades_to_empty_text() {
        let extraction = extractor(MockOcrEngine::failing("tesseract crashed")).extract(&blank());
        match extraction {
            Extraction::Degraded { output, reason } => {
                assert_eq!(output.text, "");
                assert_eq!(output.confidence, 0.0);
                assert!(reason.contains("tesseract crashed"));
            }
            other => panic!("expected degraded extraction, got {:?}", other),
        }
    }

    #[test]
    fn test_no_tokens_degrades() {
        let extraction = extractor(MockOcrEngine::from_tokens(Vec::new())).extract(&blank());
        assert!(extraction.is_degraded());
        assert_eq!(extraction.output().confidence, 0.0);
    }

    #[test]
    fn test_disabled_engine_degrades() {
        let extraction = TextExtractor::new(Arc::new(DisabledOcrEngine)).extract(&blank());
        assert_eq!(extraction.degraded_reason(), Some("OCR failed: no OCR engine available"));
    }

    #[test]
    fn test_clean_text_repairs_confusions() {
        assert_eq!(clean_text("MI|K   2.O9"), "MIIK 2.09");
        assert_eq!(clean_text("1O EGGS"), "10 EGGS");
        assert_eq!(clean_text("O1"), "01");
        assert_eq!(clean_text("ORANGES"), "ORANGES");
    }

    #[test]
    fn test_clean_text_drops_blank_lines() {
        assert_eq!(clean_text("  A  \n\n   \n B "), "A\nB");
    }

    #[test]
    fn test_extract_within_times_out() {
        let engine = MockOcrEngine::from_text("SLOW", 90.0).with_delay(Duration::from_millis(500));
        let result = extractor(engine).extract_within(blank(), Duration::from_millis(20));
        assert!(result.is_none());
    }

    #[test]
    fn test_extract_within_returns_fast_result() {
        let engine = MockOcrEngine::from_text("FAST", 90.0);
        let result = extractor(engine).extract_within(blank(), Duration::from_secs(5));
        assert_eq!(result.unwrap().output().text, "FAST");
    }

    #[test]
    fn test_parse_tsv_groups_lines() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t91.5\t2\n\
                   5\t1\t1\t1\t1\t2\t70\t10\t90\t20\t88\tBANANAS\n\
                   5\t1\t1\t1\t2\t1\t10\t40\t60\t20\t-1\tMILK\n\
                   5\t1\t1\t1\t2\t2\t80\t40\t60\t20\t77\t \n";
        let tokens = parse_tsv(tsv);

        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], OcrToken::new("2", 91.5, 0));
        assert_eq!(tokens[1].line, 0);
        assert_eq!(tokens[2], OcrToken::new("MILK", 0.0, 1));
    }
}
