//! Seed data and small utilities related to default content.
//!
//! The letter catalog, the spoken-word list, and the built-in lessons live
//! here so the app is useful even without external config or the remote
//! recognizer.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::{BoolOption, ChoiceOption, Question, QuestionPayload, QuestionSource};
use crate::recognize::LexEntry;
use crate::util::normalize_answer;

/// One hijaiyah letter: Arabic form, spoken name, accepted alternate
/// spellings, and how many syllables the name carries.
pub struct LetterDef {
  pub arabic: &'static str,
  pub name: &'static str,
  pub variants: &'static [&'static str],
  pub syllables: u32,
}

/// One practice word for pronunciation drills.
pub struct WordDef {
  pub arabic: &'static str,
  pub latin: &'static str,
  pub variants: &'static [&'static str],
  pub syllables: u32,
}

macro_rules! letter {
  ($arabic:literal, $name:literal, [$($variant:literal),*], $syllables:literal) => {
    LetterDef { arabic: $arabic, name: $name, variants: &[$($variant),*], syllables: $syllables }
  };
}

macro_rules! word {
  ($arabic:literal, $latin:literal, [$($variant:literal),*], $syllables:literal) => {
    WordDef { arabic: $arabic, latin: $latin, variants: &[$($variant),*], syllables: $syllables }
  };
}

/// Lesson used when a session starts without naming one.
pub const DEFAULT_LESSON: &str = "letters-basic";

/// The 28 hijaiyah letters in alphabet order.
pub const LETTERS: [LetterDef; 28] = [
  letter!("ا", "alif", ["aleph", "alef"], 2),
  letter!("ب", "ba", ["baa", "beh"], 1),
  letter!("ت", "ta", ["taa", "teh"], 1),
  letter!("ث", "tsa", ["tha", "sa"], 1),
  letter!("ج", "jim", ["jeem", "djim"], 1),
  letter!("ح", "ha", ["haa", "hha"], 1),
  letter!("خ", "kha", ["kho", "khaa"], 1),
  letter!("د", "dal", ["daal", "del"], 1),
  letter!("ذ", "dzal", ["dhal", "zal"], 1),
  letter!("ر", "ra", ["ro", "raa"], 1),
  letter!("ز", "za", ["zay", "zaa"], 1),
  letter!("س", "sin", ["seen", "siin"], 1),
  letter!("ش", "syin", ["shin", "sheen"], 1),
  letter!("ص", "shad", ["sad", "shod"], 1),
  letter!("ض", "dhad", ["dad", "dhod"], 1),
  letter!("ط", "tha", ["to", "thaa"], 1),
  letter!("ظ", "zha", ["zho", "dho"], 1),
  letter!("ع", "ain", ["ayn", "ayin"], 2),
  letter!("غ", "ghain", ["ghayn", "gain"], 2),
  letter!("ف", "fa", ["faa", "feh"], 1),
  letter!("ق", "qaf", ["qof", "kof"], 1),
  letter!("ك", "kaf", ["kef", "kaaf"], 1),
  letter!("ل", "lam", ["laam", "lem"], 1),
  letter!("م", "mim", ["meem", "miim"], 1),
  letter!("ن", "nun", ["noon", "nuun"], 1),
  letter!("و", "waw", ["wau", "wow"], 1),
  letter!("ه", "ha", ["hah", "heh"], 1),
  letter!("ي", "ya", ["yaa", "yeh"], 1),
];

/// Short words the pronunciation lesson drills on.
pub const WORDS: [WordDef; 7] = [
  word!("قال", "qala", ["qaala", "kala"], 2),
  word!("بيت", "bayt", ["beyt", "bait"], 1),
  word!("كتاب", "kitab", ["kitaab", "ketab"], 2),
  word!("قمر", "qamar", ["kamar", "qomar"], 2),
  word!("شمس", "syams", ["shams", "sams"], 1),
  word!("نور", "nur", ["noor", "nour"], 1),
  word!("باب", "bab", ["baab", "beb"], 1),
];

fn mc(id: &str, prompt: &str, options: &[(&str, &str, bool)]) -> Question {
  Question {
    id: id.into(),
    prompt: prompt.into(),
    payload: QuestionPayload::MultipleChoice {
      options: options
        .iter()
        .map(|(oid, label, correct)| ChoiceOption {
          id: (*oid).into(),
          label: (*label).into(),
          correct: *correct,
        })
        .collect(),
    },
    source: QuestionSource::Seed,
  }
}

fn voice(id: &str, prompt: &str, target: &str, display: &str) -> Question {
  Question {
    id: id.into(),
    prompt: prompt.into(),
    payload: QuestionPayload::VoiceInput {
      target: target.into(),
      display: display.into(),
      tolerance: None,
      model_hint: None,
    },
    source: QuestionSource::Seed,
  }
}

/// Built-in lessons keyed by lesson id. These guarantee a playable quiz even
/// when no question config is loaded.
pub fn seed_question_bank() -> HashMap<String, Vec<Question>> {
  let letters_basic = vec![
    mc(
      "lb-01",
      "Which letter is this? ب",
      &[("a", "Alif", false), ("b", "Ba", true), ("c", "Ta", false)],
    ),
    mc(
      "lb-02",
      "Which letter is this? ق",
      &[("a", "Fa", false), ("b", "Qaf", true), ("c", "Kaf", false)],
    ),
    Question {
      id: "lb-03".into(),
      prompt: "The letter ش is called Syin.".into(),
      payload: QuestionPayload::TrueFalse {
        options: vec![
          BoolOption { value: true, label: "True".into(), correct: true },
          BoolOption { value: false, label: "False".into(), correct: false },
        ],
      },
      source: QuestionSource::Seed,
    },
    Question {
      id: "lb-04".into(),
      prompt: "Type the name of the letter م.".into(),
      payload: QuestionPayload::ShortAnswer {
        answer: "mim".into(),
        alternates: vec!["meem".into(), "miim".into()],
      },
      source: QuestionSource::Seed,
    },
    Question {
      id: "lb-05".into(),
      prompt: "Complete the sentence.".into(),
      payload: QuestionPayload::FillInBlank {
        template: "The first letter of the hijaiyah alphabet is ____.".into(),
        answer: "alif".into(),
        alternates: vec!["aleph".into(), "alef".into()],
      },
      source: QuestionSource::Seed,
    },
    Question {
      id: "lb-06".into(),
      prompt: "Drag the letter that completes bayt (house).".into(),
      payload: QuestionPayload::DragAndDrop {
        template: "ب __ ت".into(),
        choices: vec![
          ChoiceOption { id: "a".into(), label: "ي".into(), correct: true },
          ChoiceOption { id: "b".into(), label: "و".into(), correct: false },
          ChoiceOption { id: "c".into(), label: "ر".into(), correct: false },
        ],
        answer: None,
      },
      source: QuestionSource::Seed,
    },
    voice("lb-07", "Pronounce this letter aloud.", "ba", "ب"),
    voice("lb-08", "Pronounce this letter aloud.", "sin", "س"),
  ];

  let pronunciation_basic = vec![
    voice("pb-01", "Pronounce the word aloud.", "qala", "قال"),
    voice("pb-02", "Pronounce the word aloud.", "bayt", "بيت"),
    Question {
      id: "pb-03".into(),
      prompt: "Pronounce the word aloud.".into(),
      payload: QuestionPayload::VoiceInput {
        target: "kitab".into(),
        display: "كتاب".into(),
        tolerance: None,
        model_hint: Some("facebook/wav2vec2-large-xlsr-53-arabic".into()),
      },
      source: QuestionSource::Seed,
    },
    Question {
      id: "pb-04".into(),
      prompt: "Pronounce the word aloud.".into(),
      payload: QuestionPayload::VoiceInput {
        target: "qamar".into(),
        display: "قمر".into(),
        // Emphatic q is hard for beginners; accept a looser match.
        tolerance: Some(0.7),
        model_hint: None,
      },
      source: QuestionSource::Seed,
    },
    voice("pb-05", "Pronounce the word aloud.", "syams", "شمس"),
    voice("pb-06", "Pronounce this letter aloud.", "ain", "ع"),
  ];

  HashMap::from([
    ("letters-basic".to_string(), letters_basic),
    ("pronunciation-basic".to_string(), pronunciation_basic),
  ])
}

/// Absolute last-resort fallback: if a lesson has no questions, we inject this.
pub fn fallback_voice_question() -> Question {
  Question {
    id: Uuid::new_v4().to_string(),
    prompt: "Pronounce this letter aloud.".into(),
    payload: QuestionPayload::VoiceInput {
      target: "ba".into(),
      display: "ب".into(),
      tolerance: None,
      model_hint: None,
    },
    source: QuestionSource::Fallback,
  }
}

fn push_spellings(table: &mut HashMap<String, Vec<String>>, key: &str, spellings: &[&str]) {
  let entry = table.entry(normalize_answer(key)).or_default();
  for s in spellings {
    let s = (*s).to_string();
    if !entry.contains(&s) {
      entry.push(s);
    }
  }
}

/// Accepted spellings per target, keyed both ways: the Latin name maps to its
/// variants and the Arabic form, the Arabic form back to the Latin spellings.
pub fn transliteration_table() -> HashMap<String, Vec<String>> {
  let mut table = HashMap::new();
  for l in &LETTERS {
    let mut latin: Vec<&str> = vec![l.name];
    latin.extend_from_slice(l.variants);
    push_spellings(&mut table, l.arabic, &latin);
    latin.push(l.arabic);
    push_spellings(&mut table, l.name, &latin);
  }
  for w in &WORDS {
    let mut latin: Vec<&str> = vec![w.latin];
    latin.extend_from_slice(w.variants);
    push_spellings(&mut table, w.arabic, &latin);
    latin.push(w.arabic);
    push_spellings(&mut table, w.latin, &latin);
  }
  table
}

/// Everything the local recognizer can decode to.
pub fn lexicon() -> Vec<LexEntry> {
  let mut entries: Vec<LexEntry> = LETTERS
    .iter()
    .map(|l| LexEntry { arabic: l.arabic.into(), latin: l.name.into(), syllables: l.syllables })
    .collect();
  entries.extend(
    WORDS
      .iter()
      .map(|w| LexEntry { arabic: w.arabic.into(), latin: w.latin.into(), syllables: w.syllables }),
  );
  entries
}
