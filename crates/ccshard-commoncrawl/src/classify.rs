//! Language identification of decoded record text

/// One ranked guess from a classifier
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Model label, e.g. `__label__ko`
    pub label: String,
    pub confidence: f32,
}

/// Language classifier used to double-check the crawler's language header.
///
/// Returns guesses ranked best-first. The pipeline only looks at the top one.
pub trait LanguageClassifier: Send + Sync {
    fn predict(&self, text: &str) -> Vec<Prediction>;

    /// Best label, if any
    fn top_label(&self, text: &str) -> Option<String> {
        self.predict(text).into_iter().next().map(|p| p.label)
    }
}

/// Writing systems told apart by [`ScriptClassifier`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Hangul,
    Kana,
    Han,
    Latin,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    Devanagari,
    Thai,
}

impl Script {
    const ALL: [Script; 10] = [
        Self::Hangul,
        Self::Kana,
        Self::Han,
        Self::Latin,
        Self::Cyrillic,
        Self::Greek,
        Self::Arabic,
        Self::Hebrew,
        Self::Devanagari,
        Self::Thai,
    ];

    fn of(c: char) -> Option<Self> {
        let script = match c as u32 {
            0x1100..=0x11FF | 0x3130..=0x318F | 0xA960..=0xA97F | 0xAC00..=0xD7AF => Self::Hangul,
            0x3040..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9D => Self::Kana,
            0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF => Self::Han,
            0x0400..=0x052F => Self::Cyrillic,
            0x0370..=0x03FF => Self::Greek,
            0x0600..=0x06FF | 0x0750..=0x077F => Self::Arabic,
            0x0590..=0x05FF => Self::Hebrew,
            0x0900..=0x097F => Self::Devanagari,
            0x0E00..=0x0E7F => Self::Thai,
            _ if c.is_ascii_alphabetic() => Self::Latin,
            0x00C0..=0x024F => Self::Latin,
            _ => return None,
        };
        Some(script)
    }

    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Self::Hangul => "__label__ko",
            Self::Kana => "__label__ja",
            Self::Han => "__label__zh",
            Self::Latin => "__label__en",
            Self::Cyrillic => "__label__ru",
            Self::Greek => "__label__el",
            Self::Arabic => "__label__ar",
            Self::Hebrew => "__label__he",
            Self::Devanagari => "__label__hi",
            Self::Thai => "__label__th",
        }
    }
}

/// Dependency-free classifier ranking languages by their script's share of letters.
///
/// Good enough to separate scripts, not languages sharing one: every Latin
/// text is labelled `en`. Japanese text mixes Kana with Han, so any Kana
/// share is credited with the Han letters too.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptClassifier;

impl LanguageClassifier for ScriptClassifier {
    fn predict(&self, text: &str) -> Vec<Prediction> {
        let mut counts = [0usize; Script::ALL.len()];
        for c in text.chars() {
            if let Some(script) = Script::of(c) {
                counts[script.index()] += 1;
            }
        }
        let letters: usize = counts.iter().sum();
        if letters == 0 {
            return Vec::new();
        }
        if counts[Script::Kana.index()] > 0 {
            counts[Script::Kana.index()] += counts[Script::Han.index()];
            counts[Script::Han.index()] = 0;
        }

        let mut ranked: Vec<Prediction> = Script::ALL
            .iter()
            .filter(|s| counts[s.index()] > 0)
            .map(|s| Prediction {
                label: s.label().to_string(),
                confidence: counts[s.index()] as f32 / letters as f32,
            })
            .collect();
        // stable sort keeps ALL order on ties, so results are deterministic
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        ranked
    }
}
