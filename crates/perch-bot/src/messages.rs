//! Canned replies.

use rand::seq::IndexedRandom;

pub const HELLO: &[&str] = &["hello!", "hi!", "greetings", "good day", "\\o"];

pub const GOODBYE: &[&str] = &["o/", "bye!", "adios", "au revoir"];

pub const HUGS: &[&str] = &[
    "⊂((・▽・))⊃",
    "⊂(◉‿◉)つ",
    "(づ｡◕‿‿◕｡)づ",
    "༼ つ ◕_◕ ༽つ",
    "(つ ͡° ͜ʖ ͡°)つ",
    "༼ つ ◕o◕ ༽つ",
];

/// Picks one entry at random; empty lists yield an empty string.
pub fn pick<S: AsRef<str>>(choices: &[S]) -> String {
    choices
        .choose(&mut rand::rng())
        .map(|choice| choice.as_ref().to_string())
        .unwrap_or_default()
}
