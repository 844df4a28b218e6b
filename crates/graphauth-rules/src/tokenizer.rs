//! Rule string tokenizer
//!
//! Splits a rule such as `filter(eq(authorId, $USER))` into its words:
//! `filter`, `eq`, `authorId`, `$USER`. Every character in [`PUNCTUATION`]
//! separates words and is otherwise discarded. There is no quoting or
//! escaping, so a field name or operand containing one of those characters
//! cannot be written in a rule.

/// Characters that separate words in a rule string
pub const PUNCTUATION: &[u8] = b"{}:(), ";

fn is_punctuation(byte: u8) -> bool {
    PUNCTUATION.contains(&byte)
}

/// Iterator over the words of a rule string
///
/// Punctuation is ASCII, so every split point falls on a char boundary and
/// words may contain arbitrary non-ASCII text.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    index: usize,
}

impl<'a> Tokenizer<'a> {
    /// Start tokenizing `input`
    pub fn new(input: &'a str) -> Self {
        let mut tokenizer = Self { input, index: 0 };
        tokenizer.skip_punctuation();
        tokenizer
    }

    /// True once every word has been consumed
    pub fn is_empty(&self) -> bool {
        self.index == self.input.len()
    }

    fn skip_punctuation(&mut self) {
        let bytes = self.input.as_bytes();
        while self.index < bytes.len() && is_punctuation(bytes[self.index]) {
            self.index += 1;
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_empty() {
            return None;
        }

        let bytes = self.input.as_bytes();
        let start = self.index;
        while self.index < bytes.len() && !is_punctuation(bytes[self.index]) {
            self.index += 1;
        }
        let word = &self.input[start..self.index];
        self.skip_punctuation();

        Some(word)
    }
}

/// Collect the words of a rule string
pub fn tokenize(input: &str) -> Vec<&str> {
    Tokenizer::new(input).collect()
}
