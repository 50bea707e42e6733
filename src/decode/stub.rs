//! Scripted decode engine for tests and the demo binary.

use anyhow::anyhow;

use crate::config::DecodeHints;
use crate::decode::{DecodeEngine, DecodeError, DecodeResult};
use crate::platform::FrameSource;
use crate::BarcodeFormat;

/// One step of a decode script.
#[derive(Clone, Debug)]
pub enum ScriptedOutcome {
    Success(String),
    NotFound,
    ChecksumMismatch,
    FormatInvalid,
    Unclassified,
    Fatal(String),
}

/// Plays back a fixed sequence of decode outcomes, ignoring frame content.
///
/// A cycling script repeats forever; a non-cycling script fails fatally once
/// exhausted, which terminates the scan loop.
pub struct ScriptedEngine {
    steps: Vec<ScriptedOutcome>,
    cursor: usize,
    cycle: bool,
    format: BarcodeFormat,
    hints: Option<DecodeHints>,
    on_attempt: Option<Box<dyn FnMut(usize) + Send>>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<ScriptedOutcome>) -> Self {
        Self {
            steps,
            cursor: 0,
            cycle: false,
            format: BarcodeFormat::QrCode,
            hints: None,
            on_attempt: None,
        }
    }

    pub fn cycling(steps: Vec<ScriptedOutcome>) -> Self {
        let mut engine = Self::new(steps);
        engine.cycle = true;
        engine
    }

    /// Hook invoked with the zero-based attempt index before each decode.
    /// Tests use this to invalidate a loop generation mid-attempt.
    pub fn with_attempt_hook(mut self, hook: impl FnMut(usize) + Send + 'static) -> Self {
        self.on_attempt = Some(Box::new(hook));
        self
    }

    pub fn attempts(&self) -> usize {
        self.cursor
    }

    /// The hints last applied via [`DecodeEngine::set_hints`], if any.
    pub fn hints(&self) -> Option<&DecodeHints> {
        self.hints.as_ref()
    }
}

impl DecodeEngine for ScriptedEngine {
    fn decode(&mut self, _source: &dyn FrameSource) -> Result<DecodeResult, DecodeError> {
        let index = self.cursor;
        if let Some(hook) = self.on_attempt.as_mut() {
            hook(index);
        }
        let step = if self.cycle {
            self.steps.get(index % self.steps.len().max(1))
        } else {
            self.steps.get(index)
        };
        self.cursor += 1;
        match step {
            Some(ScriptedOutcome::Success(text)) => {
                Ok(DecodeResult::new(text.clone(), self.format))
            }
            Some(ScriptedOutcome::NotFound) => Err(DecodeError::NotFound),
            Some(ScriptedOutcome::ChecksumMismatch) => Err(DecodeError::ChecksumMismatch),
            Some(ScriptedOutcome::FormatInvalid) => Err(DecodeError::FormatInvalid),
            Some(ScriptedOutcome::Unclassified) => Err(DecodeError::Unclassified),
            Some(ScriptedOutcome::Fatal(msg)) => Err(DecodeError::Fatal(anyhow!(msg.clone()))),
            None => Err(DecodeError::Fatal(anyhow!("decode script exhausted"))),
        }
    }

    fn set_hints(&mut self, hints: &DecodeHints) {
        self.hints = Some(hints.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StubFrameSource;

    #[test]
    fn scripted_engine_plays_back_in_order() {
        let source = StubFrameSource::new();
        let mut engine = ScriptedEngine::new(vec![
            ScriptedOutcome::NotFound,
            ScriptedOutcome::Success("hello".into()),
        ]);
        assert!(matches!(
            engine.decode(source.as_ref()),
            Err(DecodeError::NotFound)
        ));
        let result = engine.decode(source.as_ref()).expect("scripted success");
        assert_eq!(result.text, "hello");
        assert_eq!(result.format, BarcodeFormat::QrCode);
    }

    #[test]
    fn exhausted_script_fails_fatally() {
        let source = StubFrameSource::new();
        let mut engine = ScriptedEngine::new(vec![ScriptedOutcome::NotFound]);
        let _ = engine.decode(source.as_ref());
        assert!(matches!(
            engine.decode(source.as_ref()),
            Err(DecodeError::Fatal(_))
        ));
    }

    #[test]
    fn applied_hints_are_retained() {
        let mut engine = ScriptedEngine::new(vec![ScriptedOutcome::NotFound]);
        assert_eq!(engine.hints(), None);
        let hints = DecodeHints {
            formats: vec![BarcodeFormat::QrCode, BarcodeFormat::Ean13],
            try_harder: true,
        };
        engine.set_hints(&hints);
        assert_eq!(engine.hints(), Some(&hints));
    }

    #[test]
    fn cycling_script_repeats() {
        let source = StubFrameSource::new();
        let mut engine = ScriptedEngine::cycling(vec![
            ScriptedOutcome::NotFound,
            ScriptedOutcome::Success("loop".into()),
        ]);
        for _ in 0..3 {
            assert!(matches!(
                engine.decode(source.as_ref()),
                Err(DecodeError::NotFound)
            ));
            assert!(engine.decode(source.as_ref()).is_ok());
        }
    }
}
